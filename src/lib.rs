//! Steward, a cluster optimization engine.
//!
//! Strategies read a snapshot of the compute cluster ([`model`]) and plan an
//! ordered list of [`actions`] (a [`solution::Solution`]). Audits
//! ([`audit`]) drive strategies once or on a schedule, apply the resulting
//! plans through an [`infra::InfraClient`] and report every state change
//! through [`notifications`].

pub mod actions;
pub mod audit;
pub mod config;
pub mod error;
pub mod infra;
pub mod model;
pub mod notifications;
pub mod solution;
pub mod strategies;

pub use error::{EngineError, EngineResult, ErrorKind};

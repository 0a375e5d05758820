pub mod cluster;
pub mod collector;
pub mod element;

pub use cluster::{ClusterModel, Scope};
pub use collector::{ClusterModelCollector, CollectorManager, FileCollector, StaticCollector};
pub use element::{Instance, InstanceState, Node, NodeState, Resources, ServiceStatus};

pub mod cluster;
pub mod distance;
pub mod memory;
pub mod selector;
pub mod store;

pub use cluster::ClusterStore;
pub use distance::{Distance, DistanceInfo};
pub use memory::MemoryStore;
pub use selector::NodeSelector;
pub use store::{ChangeSet, Store};

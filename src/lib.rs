pub mod algorithms;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod network;
pub mod protocol;
pub mod report;
pub mod tracker;

pub use config::SimulationConfig;
pub use coordinator::{Coordinator, RoundReport};
pub use error::{BarrierTimeoutError, ConfigError, ProtocolError, SimulationError, TopologyError};
pub use network::{Edge, Topology};
pub use protocol::{Cost, RoutingTable, TableEntry};
pub use tracker::ChangeTracker;

pub type NodeId = String;

/// Round counter. Round 0 is the freshly seeded state.
pub type Round = u32;

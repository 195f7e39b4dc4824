pub mod input;
pub mod topology;

pub use input::parse_topology;
pub use topology::{Edge, Topology};

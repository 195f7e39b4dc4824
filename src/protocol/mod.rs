pub mod mailbox;
pub mod router;
pub mod routing_table;
pub mod snapshot;

pub use mailbox::*;
pub use router::*;
pub use routing_table::*;
pub use snapshot::*;

use std::sync::Arc;

use super::routing_table::RoutingTable;
use crate::{NodeId, Round};

/// Frozen copy of a router's table as of the end of `round`, addressed to
/// its neighbors. Cloning shares the table and there is no way to get a
/// mutable reference back.
#[derive(Debug, Clone)]
pub struct Snapshot {
    sender: NodeId,
    round: Round,
    table: Arc<RoutingTable>,
}

impl Snapshot {
    pub fn new(sender: impl Into<NodeId>, round: Round, table: RoutingTable) -> Self {
        Self {
            sender: sender.into(),
            round,
            table: Arc::new(table),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }
}

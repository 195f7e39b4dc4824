use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::protocol::Router;
use crate::{NodeId, Round};

/// Read-only view of when every router last changed each of its entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeTracker {
    last_changed: BTreeMap<NodeId, BTreeMap<NodeId, Round>>,
}

impl ChangeTracker {
    pub fn from_routers<'a>(routers: impl IntoIterator<Item = &'a Router>) -> Self {
        let last_changed = routers
            .into_iter()
            .map(|router| (router.id().to_string(), router.last_changed_rounds().clone()))
            .collect();
        Self { last_changed }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.last_changed.keys()
    }

    pub fn last_changed(&self, node: &str, destination: &str) -> Option<Round> {
        self.last_changed.get(node)?.get(destination).copied()
    }

    /// Destinations of `node` whose entry was last changed in `round`.
    pub fn changed_in(&self, node: &str, round: Round) -> BTreeSet<NodeId> {
        self.last_changed
            .get(node)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, changed)| **changed == round)
                    .map(|(destination, _)| destination.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

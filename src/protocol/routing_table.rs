use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Add;

use crate::NodeId;

/// Path cost. Every finite cost orders below `Infinite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cost {
    Finite(u64),
    Infinite,
}

impl From<u64> for Cost {
    fn from(value: u64) -> Self {
        Cost::Finite(value)
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Cost::Finite(a), Cost::Finite(b)) => {
                a.checked_add(b).map_or(Cost::Infinite, Cost::Finite)
            }
            _ => Cost::Infinite,
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cost::Finite(value) => value.fmt(f),
            Cost::Infinite => "inf".fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub cost: Cost,
    pub next_hop: Option<NodeId>,
}

impl TableEntry {
    pub fn unreachable() -> Self {
        Self {
            cost: Cost::Infinite,
            next_hop: None,
        }
    }

    /// Finite route through `next_hop`.
    pub fn via(cost: u64, next_hop: impl Into<NodeId>) -> Self {
        Self {
            cost: Cost::Finite(cost),
            next_hop: Some(next_hop.into()),
        }
    }
}

/// A relaxation candidate: reach `destination` at `cost` by forwarding to
/// `neighbor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub destination: NodeId,
    pub cost: Cost,
    pub neighbor: NodeId,
}

/// Distance vector of one router. The entry for the owner is always
/// `(0, owner)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    owner: NodeId,
    entries: BTreeMap<NodeId, TableEntry>,
}

impl RoutingTable {
    pub fn new(owner: impl Into<NodeId>) -> Self {
        let owner = owner.into();
        let mut entries = BTreeMap::new();
        entries.insert(owner.clone(), TableEntry::via(0, owner.clone()));
        Self { owner, entries }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Never fails: unknown destinations are unreachable.
    pub fn get(&self, destination: &str) -> TableEntry {
        self.entries
            .get(destination)
            .cloned()
            .unwrap_or_else(TableEntry::unreachable)
    }

    /// Seeds the entry for a directly connected neighbor.
    pub fn seed_direct(&mut self, neighbor: impl Into<NodeId>, cost: u64) {
        let neighbor = neighbor.into();
        if neighbor == self.owner {
            return;
        }
        self.entries
            .insert(neighbor.clone(), TableEntry::via(cost, neighbor));
    }

    /// Registers a destination as known but unreachable, unless it already
    /// has an entry.
    pub fn seed_unreachable(&mut self, destination: impl Into<NodeId>) {
        self.entries
            .entry(destination.into())
            .or_insert_with(TableEntry::unreachable);
    }

    /// One Bellman-Ford step. Returns the relaxed table together with the
    /// destinations whose `(cost, next_hop)` changed. `self` is left as is.
    ///
    /// An existing entry is only replaced by a strictly cheaper candidate.
    /// Among equally cheap candidates the lowest neighbor id wins, so the
    /// outcome does not depend on candidate order.
    pub fn relax<I>(&self, candidates: I) -> (RoutingTable, BTreeSet<NodeId>)
    where
        I: IntoIterator<Item = Candidate>,
    {
        let mut best: BTreeMap<NodeId, (Cost, NodeId)> = BTreeMap::new();
        for candidate in candidates {
            if candidate.destination == self.owner {
                continue;
            }
            match best.get_mut(&candidate.destination) {
                Some((cost, neighbor)) => {
                    if (candidate.cost, &candidate.neighbor) < (*cost, &*neighbor) {
                        *cost = candidate.cost;
                        *neighbor = candidate.neighbor;
                    }
                }
                None => {
                    best.insert(candidate.destination, (candidate.cost, candidate.neighbor));
                }
            }
        }

        let mut relaxed = self.clone();
        let mut changed = BTreeSet::new();
        for (destination, (cost, neighbor)) in best {
            let current = self.get(&destination);
            if cost < current.cost {
                let entry = TableEntry {
                    cost,
                    next_hop: Some(neighbor),
                };
                if entry != current {
                    changed.insert(destination.clone());
                }
                relaxed.entries.insert(destination, entry);
            } else {
                relaxed.entries.entry(destination).or_insert(current);
            }
        }

        (relaxed, changed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in destination order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &TableEntry)> {
        self.entries.iter()
    }

    pub fn destinations(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.keys()
    }
}

use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::mailbox::Mailboxes;
use super::routing_table::{Candidate, Cost, RoutingTable};
use super::snapshot::Snapshot;
use crate::error::ProtocolError;
use crate::network::Topology;
use crate::{NodeId, Round};

/// What a router reports back to the barrier once a round has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundOutcome {
    pub node: NodeId,
    pub round: Round,
    pub changed: BTreeSet<NodeId>,
}

/// One DVR actor. Only its own round task ever mutates it.
#[derive(Debug, Clone)]
pub struct Router {
    id: NodeId,
    links: BTreeMap<NodeId, u64>,
    table: RoutingTable,
    round: Round,
    last_changed: BTreeMap<NodeId, Round>,
}

impl Router {
    /// Builds the router for `id` with every topology node known: direct
    /// neighbors at the link cost, everyone else unreachable.
    pub fn from_topology(id: impl Into<NodeId>, topology: &Topology) -> Self {
        let id = id.into();
        let links = topology.neighbors_of(&id);

        let mut table = RoutingTable::new(id.clone());
        for (neighbor, cost) in &links {
            table.seed_direct(neighbor.clone(), *cost);
        }
        for node in &topology.nodes {
            table.seed_unreachable(node.clone());
        }

        let last_changed = table.destinations().map(|d| (d.clone(), 0)).collect();

        Self {
            id,
            links,
            table,
            round: 0,
            last_changed,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &NodeId> {
        self.links.keys()
    }

    pub fn link_cost(&self, neighbor: &str) -> Option<u64> {
        self.links.get(neighbor).copied()
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn round(&self) -> Round {
        self.round
    }

    /// Round in which the entry for `destination` last changed; 0 if never.
    pub fn last_changed(&self, destination: &str) -> Round {
        self.last_changed.get(destination).copied().unwrap_or(0)
    }

    pub fn last_changed_rounds(&self) -> &BTreeMap<NodeId, Round> {
        &self.last_changed
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.id.clone(), self.round, self.table.clone())
    }

    /// Step 1: hands a snapshot of the committed table to every neighbor.
    pub async fn publish(&self, mailboxes: &Mailboxes) -> Result<(), ProtocolError> {
        let snapshot = self.snapshot();
        for neighbor in self.links.keys() {
            let mailbox = mailboxes
                .get(neighbor)
                .ok_or_else(|| ProtocolError::UnknownMailbox(neighbor.clone()))?;
            mailbox.deliver(snapshot.clone()).await?;
        }
        debug!("{} published round {} to {} neighbors", self.id, self.round, self.links.len());
        Ok(())
    }

    /// Step 3 input: the cost of reaching each destination through each
    /// neighbor that sent a snapshot. The hop is always the sender itself.
    pub fn candidates(&self, snapshots: &[Snapshot]) -> Result<Vec<Candidate>, ProtocolError> {
        let mut destinations: BTreeSet<&NodeId> = self.table.destinations().collect();
        for snapshot in snapshots {
            destinations.extend(snapshot.table().destinations());
        }

        let mut candidates = Vec::with_capacity(destinations.len() * snapshots.len());
        for snapshot in snapshots {
            let link = self
                .link_cost(snapshot.sender())
                .ok_or_else(|| ProtocolError::NotANeighbor {
                    receiver: self.id.clone(),
                    sender: snapshot.sender().to_string(),
                })?;

            for destination in &destinations {
                candidates.push(Candidate {
                    destination: (*destination).clone(),
                    cost: Cost::Finite(link) + snapshot.table().get(destination).cost,
                    neighbor: snapshot.sender().to_string(),
                });
            }
        }
        Ok(candidates)
    }

    /// Step 4: installs the relaxed table and stamps the changed entries with
    /// the new round number.
    pub fn commit(&mut self, table: RoutingTable, changed: BTreeSet<NodeId>) -> RoundOutcome {
        self.table = table;
        self.round += 1;
        for destination in self.table.destinations() {
            self.last_changed.entry(destination.clone()).or_insert(0);
        }
        for destination in &changed {
            self.last_changed.insert(destination.clone(), self.round);
        }

        RoundOutcome {
            node: self.id.clone(),
            round: self.round,
            changed,
        }
    }

    /// Publishes, waits for every neighbor, then relaxes and commits.
    pub async fn run_round(
        &mut self,
        mailboxes: &Mailboxes,
    ) -> Result<RoundOutcome, ProtocolError> {
        self.publish(mailboxes).await?;

        let own = mailboxes
            .get(&self.id)
            .ok_or_else(|| ProtocolError::UnknownMailbox(self.id.clone()))?;
        let snapshots = own.collect().await;

        let candidates = self.candidates(&snapshots)?;
        let (table, changed) = self.table.relax(candidates);
        let outcome = self.commit(table, changed);

        debug!(
            "{} committed round {} ({} entries changed)",
            self.id,
            outcome.round,
            outcome.changed.len()
        );
        Ok(outcome)
    }
}

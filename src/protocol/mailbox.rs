use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use super::snapshot::Snapshot;
use crate::error::ProtocolError;
use crate::{NodeId, Round};

/// Every router's mailbox, by owner.
pub type Mailboxes = BTreeMap<NodeId, Arc<Mailbox>>;

#[derive(Debug, Default)]
struct MailboxState {
    epoch: Round,
    slots: BTreeMap<NodeId, Snapshot>,
}

/// Inbound snapshots of one router for the current round. Many neighbors
/// deliver, only the owner collects.
#[derive(Debug)]
pub struct Mailbox {
    owner: NodeId,
    neighbors: BTreeSet<NodeId>,
    state: Mutex<MailboxState>,
    ready: Notify,
}

impl Mailbox {
    pub fn new(owner: impl Into<NodeId>, neighbors: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            owner: owner.into(),
            neighbors: neighbors.into_iter().collect(),
            state: Mutex::new(MailboxState::default()),
            ready: Notify::new(),
        }
    }

    pub async fn epoch(&self) -> Round {
        self.state.lock().await.epoch
    }

    pub async fn pending(&self) -> usize {
        self.state.lock().await.slots.len()
    }

    /// Accepts one snapshot from a neighbor for the current epoch.
    pub async fn deliver(&self, snapshot: Snapshot) -> Result<(), ProtocolError> {
        if !self.neighbors.contains(snapshot.sender()) {
            return Err(ProtocolError::NotANeighbor {
                receiver: self.owner.clone(),
                sender: snapshot.sender().to_string(),
            });
        }

        let mut state = self.state.lock().await;
        if snapshot.round() != state.epoch {
            return Err(ProtocolError::RoundMismatch {
                receiver: self.owner.clone(),
                sender: snapshot.sender().to_string(),
                expected: state.epoch,
                got: snapshot.round(),
            });
        }
        if state.slots.contains_key(snapshot.sender()) {
            return Err(ProtocolError::DuplicateSnapshot {
                receiver: self.owner.clone(),
                sender: snapshot.sender().to_string(),
                round: state.epoch,
            });
        }

        debug!(
            "{} <- {} (round {}, {}/{})",
            self.owner,
            snapshot.sender(),
            state.epoch,
            state.slots.len() + 1,
            self.neighbors.len()
        );
        state.slots.insert(snapshot.sender().to_string(), snapshot);
        let full = state.slots.len() == self.neighbors.len();
        drop(state);

        if full {
            self.ready.notify_one();
        }
        Ok(())
    }

    /// Waits until every neighbor has delivered, then drains the mailbox and
    /// opens the next epoch. Snapshots come back ordered by sender.
    pub async fn collect(&self) -> Vec<Snapshot> {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.slots.len() == self.neighbors.len() {
                    state.epoch += 1;
                    return std::mem::take(&mut state.slots).into_values().collect();
                }
            }
            // A permit left over from an earlier round only causes one extra
            // check of the slots.
            self.ready.notified().await;
        }
    }
}

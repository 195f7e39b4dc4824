use futures::stream::{self, FuturesUnordered};
use futures::{Stream, StreamExt};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::SimulationConfig;
use crate::error::{BarrierTimeoutError, ProtocolError, Result, SimulationError};
use crate::network::Topology;
use crate::protocol::{Mailbox, Mailboxes, RoundOutcome, Router, RoutingTable};
use crate::tracker::ChangeTracker;
use crate::{NodeId, Round};

/// State of every router after a round, handed to whoever presents results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub round: Round,
    pub tables: BTreeMap<NodeId, RoutingTable>,
    pub changed: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl RoundReport {
    pub fn changed_at(&self, node: &str) -> Option<&BTreeSet<NodeId>> {
        self.changed.get(node)
    }
}

/// Routers and mailboxes of one simulation. Round tasks get shared handles;
/// only the task of a router locks that router.
#[derive(Debug)]
struct Registry {
    routers: BTreeMap<NodeId, Arc<Mutex<Router>>>,
    mailboxes: Arc<Mailboxes>,
}

impl Registry {
    fn build(topology: &Topology) -> Self {
        let mut routers = BTreeMap::new();
        let mut mailboxes = Mailboxes::new();

        for node in &topology.nodes {
            let router = Router::from_topology(node.clone(), topology);
            let mailbox = Mailbox::new(node.clone(), router.neighbors().cloned());
            mailboxes.insert(node.clone(), Arc::new(mailbox));
            routers.insert(node.clone(), Arc::new(Mutex::new(router)));
        }

        Self {
            routers,
            mailboxes: Arc::new(mailboxes),
        }
    }
}

type RouterTask = JoinHandle<Result<RoundOutcome, ProtocolError>>;

/// Drives synchronized rounds: every router of round `k` commits before any
/// router starts round `k + 1`.
pub struct Coordinator {
    config: SimulationConfig,
    registry: Registry,
    completed: Round,
    halted: bool,
}

impl Coordinator {
    pub fn new(topology: Topology, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        topology.validate()?;
        let registry = Registry::build(&topology);
        info!(
            "Built {} routers from {} links, {} rounds scheduled",
            registry.routers.len(),
            topology.edges.len(),
            config.rounds
        );

        Ok(Self {
            config,
            registry,
            completed: 0,
            halted: false,
        })
    }

    pub fn rounds_completed(&self) -> Round {
        self.completed
    }

    pub fn rounds_remaining(&self) -> Round {
        self.config.rounds.saturating_sub(self.completed)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Tables as seeded from the topology, before any exchange.
    pub async fn initial_report(&self) -> RoundReport {
        let mut tables = BTreeMap::new();
        for (id, router) in &self.registry.routers {
            tables.insert(id.clone(), router.lock().await.table().clone());
        }
        RoundReport {
            round: 0,
            tables,
            changed: BTreeMap::new(),
        }
    }

    pub async fn change_tracker(&self) -> ChangeTracker {
        let mut routers = Vec::with_capacity(self.registry.routers.len());
        for router in self.registry.routers.values() {
            routers.push(router.lock().await.clone());
        }
        ChangeTracker::from_routers(&routers)
    }

    /// Runs one round: one task per router, joined on a barrier. Any failure
    /// halts the coordinator for good.
    pub async fn run_round(&mut self) -> Result<RoundReport> {
        if self.halted {
            return Err(SimulationError::Halted);
        }

        let round = self.completed + 1;
        info!("Starting round {}", round);

        let result = self.exchange(round).await;
        match &result {
            Ok(report) => {
                self.completed = round;
                let changed: usize = report.changed.values().map(BTreeSet::len).sum();
                info!("Round {} committed, {} entries changed", round, changed);
            }
            Err(e) => {
                self.halted = true;
                error!("Round {} failed: {}", round, e);
            }
        }
        result
    }

    /// Lazily runs the remaining scheduled rounds, one report per round. The
    /// stream ends after the last round or right after the first error.
    pub fn run_all(&mut self) -> impl Stream<Item = Result<RoundReport>> + '_ {
        stream::unfold(self, |coordinator| async move {
            if coordinator.halted || coordinator.rounds_remaining() == 0 {
                return None;
            }
            let report = coordinator.run_round().await;
            Some((report, coordinator))
        })
    }

    async fn exchange(&self, round: Round) -> Result<RoundReport> {
        let mut handles: BTreeMap<NodeId, RouterTask> = BTreeMap::new();
        for (id, router) in &self.registry.routers {
            let router = Arc::clone(router);
            let mailboxes = Arc::clone(&self.registry.mailboxes);
            let handle = tokio::spawn(async move {
                let mut router = router.lock().await;
                router.run_round(&mailboxes).await
            });
            handles.insert(id.clone(), handle);
        }

        let mut outcomes: BTreeMap<NodeId, RoundOutcome> = BTreeMap::new();
        let joined = barrier(&mut handles, &mut outcomes);
        let finished = match self.config.round_timeout() {
            Some(deadline) => tokio::time::timeout(deadline, joined).await.ok(),
            None => Some(joined.await),
        };

        match finished {
            Some(Ok(())) => Ok(self.report(round, outcomes).await),
            Some(Err(e)) => {
                abort_all(&handles);
                Err(e)
            }
            None => {
                settle(&mut handles, &mut outcomes).await;
                let stalled: Vec<NodeId> = handles
                    .keys()
                    .filter(|node| !outcomes.contains_key(*node))
                    .cloned()
                    .collect();
                warn!("Round {} timed out waiting for {:?}", round, stalled);

                let partial = if self.config.partial_results {
                    Some(Box::new(self.report(round, outcomes).await))
                } else {
                    None
                };
                Err(BarrierTimeoutError {
                    round,
                    stalled,
                    partial,
                }
                .into())
            }
        }
    }

    async fn report(&self, round: Round, outcomes: BTreeMap<NodeId, RoundOutcome>) -> RoundReport {
        let mut tables = BTreeMap::new();
        let mut changed = BTreeMap::new();
        for (node, outcome) in outcomes {
            if let Some(router) = self.registry.routers.get(&node) {
                tables.insert(node.clone(), router.lock().await.table().clone());
            }
            changed.insert(node, outcome.changed);
        }
        RoundReport {
            round,
            tables,
            changed,
        }
    }
}

/// Waits for every router task of a round, in completion order. Stops at the
/// first protocol error or crashed task so the caller never waits on
/// neighbors that can no longer be served.
async fn barrier(
    handles: &mut BTreeMap<NodeId, RouterTask>,
    outcomes: &mut BTreeMap<NodeId, RoundOutcome>,
) -> Result<()> {
    let mut pending: FuturesUnordered<_> = handles
        .iter_mut()
        .map(|(node, handle)| async move { (node, handle.await) })
        .collect();

    while let Some((node, joined)) = pending.next().await {
        match joined {
            Ok(Ok(outcome)) => {
                outcomes.insert(node.clone(), outcome);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(source) => {
                return Err(SimulationError::Join {
                    node: node.clone(),
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Aborts the tasks the barrier has not seen finish and waits for them to
/// stop. A task that committed before its abort landed counts as finished.
async fn settle(
    handles: &mut BTreeMap<NodeId, RouterTask>,
    outcomes: &mut BTreeMap<NodeId, RoundOutcome>,
) {
    for (node, handle) in handles.iter() {
        if !outcomes.contains_key(node) {
            handle.abort();
        }
    }
    for (node, handle) in handles.iter_mut() {
        if outcomes.contains_key(node) {
            continue;
        }
        if let Ok(Ok(outcome)) = handle.await {
            outcomes.insert(node.clone(), outcome);
        }
    }
}

fn abort_all(handles: &BTreeMap<NodeId, RouterTask>) {
    for handle in handles.values() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, TopologyError};
    use crate::protocol::{Snapshot, TableEntry};

    fn line() -> Topology {
        let mut topology = Topology::new();
        topology
            .add_node("A")
            .add_node("B")
            .add_node("C")
            .add_edge("A", "B", 1)
            .add_edge("B", "C", 1);
        topology
    }

    fn with_timeout(ms: u64, partial_results: bool) -> SimulationConfig {
        SimulationConfig {
            round_timeout_ms: Some(ms),
            partial_results,
            ..SimulationConfig::default()
        }
    }

    #[tokio::test]
    async fn rejects_invalid_topology() {
        let mut topology = line();
        topology.add_edge("A", "Q", 1);
        assert!(matches!(
            Coordinator::new(topology, SimulationConfig::default()),
            Err(SimulationError::Topology(TopologyError::UnknownNode { .. }))
        ));
    }

    #[tokio::test]
    async fn rejects_config_that_cannot_run() {
        let no_rounds = SimulationConfig {
            rounds: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            Coordinator::new(line(), no_rounds),
            Err(SimulationError::Config(ConfigError::ZeroRounds(0)))
        ));

        assert!(matches!(
            Coordinator::new(line(), with_timeout(0, false)),
            Err(SimulationError::Config(ConfigError::ZeroTimeout))
        ));
    }

    #[tokio::test]
    async fn line_scenario_settles_after_one_round() {
        let mut coordinator = Coordinator::new(line(), SimulationConfig::default()).unwrap();

        let initial = coordinator.initial_report().await;
        assert_eq!(initial.tables["A"].get("C"), TableEntry::unreachable());

        let first = coordinator.run_round().await.unwrap();
        assert_eq!(first.round, 1);
        assert_eq!(first.tables["A"].get("C"), TableEntry::via(2, "B"));
        assert_eq!(first.tables["C"].get("A"), TableEntry::via(2, "B"));
        assert_eq!(first.changed["A"], BTreeSet::from(["C".to_string()]));
        assert!(first.changed["B"].is_empty());

        let second = coordinator.run_round().await.unwrap();
        assert_eq!(second.tables, first.tables);
        assert!(second.changed.values().all(BTreeSet::is_empty));
    }

    #[tokio::test]
    async fn run_all_yields_configured_rounds_once() {
        let config = SimulationConfig {
            rounds: 3,
            ..SimulationConfig::default()
        };
        let mut coordinator = Coordinator::new(line(), config).unwrap();

        let rounds: Vec<Round> = coordinator
            .run_all()
            .map(|report| report.unwrap().round)
            .collect()
            .await;
        assert_eq!(rounds, vec![1, 2, 3]);

        assert_eq!(coordinator.run_all().count().await, 0);
        assert_eq!(coordinator.rounds_completed(), 3);
    }

    #[tokio::test]
    async fn tracker_reflects_commits() {
        let mut coordinator = Coordinator::new(line(), SimulationConfig::default()).unwrap();
        coordinator.run_round().await.unwrap();
        coordinator.run_round().await.unwrap();

        let tracker = coordinator.change_tracker().await;
        assert_eq!(tracker.last_changed("A", "C"), Some(1));
        assert_eq!(tracker.last_changed("A", "B"), Some(0));
        assert_eq!(tracker.changed_in("C", 1), BTreeSet::from(["A".to_string()]));
        assert!(tracker.changed_in("B", 1).is_empty());
        assert_eq!(tracker.nodes().count(), 3);
    }

    #[tokio::test]
    async fn stalled_router_surfaces_as_barrier_timeout() {
        let mut coordinator = Coordinator::new(line(), with_timeout(50, false)).unwrap();

        let held = Arc::clone(&coordinator.registry.routers["B"]);
        let guard = held.lock().await;

        let err = coordinator.run_round().await.unwrap_err();
        match err {
            SimulationError::BarrierTimeout(timeout) => {
                assert_eq!(timeout.round, 1);
                assert_eq!(timeout.stalled, vec!["A", "B", "C"]);
                assert!(timeout.partial.is_none());
            }
            other => panic!("expected barrier timeout, got {other:?}"),
        }
        drop(guard);

        assert!(coordinator.is_halted());
        assert!(matches!(coordinator.run_round().await, Err(SimulationError::Halted)));
    }

    #[tokio::test]
    async fn partial_results_carry_finished_routers() {
        let mut topology = line();
        topology.add_node("Z");
        let mut coordinator = Coordinator::new(topology, with_timeout(50, true)).unwrap();

        let held = Arc::clone(&coordinator.registry.routers["B"]);
        let _guard = held.lock().await;

        let Err(SimulationError::BarrierTimeout(timeout)) = coordinator.run_round().await else {
            panic!("expected barrier timeout");
        };
        assert_eq!(timeout.stalled, vec!["A", "B", "C"]);
        let partial = timeout.partial.expect("partial report requested");
        assert_eq!(partial.tables.keys().collect::<Vec<_>>(), vec!["Z"]);
        assert!(partial.changed["Z"].is_empty());
    }

    #[tokio::test]
    async fn forged_snapshot_aborts_the_round() {
        let mut coordinator = Coordinator::new(line(), SimulationConfig::default()).unwrap();

        // A's real publish to B is either a duplicate, or arrives after the
        // forged slot let B move on to the next round.
        let forged = Snapshot::new("A", 0, RoutingTable::new("A"));
        coordinator.registry.mailboxes["B"].deliver(forged).await.unwrap();

        let err = coordinator.run_round().await.unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Protocol(
                ProtocolError::DuplicateSnapshot { ref receiver, ref sender, .. }
                    | ProtocolError::RoundMismatch { ref receiver, ref sender, .. }
            ) if receiver == "B" && sender == "A"
        ));
        assert_eq!(coordinator.run_all().count().await, 0);
    }

    async fn crashed_router() -> Result<RoundOutcome, ProtocolError> {
        panic!("router task crashed")
    }

    async fn stuck_router() -> Result<RoundOutcome, ProtocolError> {
        std::future::pending().await
    }

    #[tokio::test]
    async fn crashed_router_ends_the_barrier_without_a_deadline() {
        let mut handles: BTreeMap<NodeId, RouterTask> = BTreeMap::from([
            ("A".to_string(), tokio::spawn(stuck_router())),
            ("B".to_string(), tokio::spawn(crashed_router())),
        ]);
        let mut outcomes = BTreeMap::new();

        let err = barrier(&mut handles, &mut outcomes).await.unwrap_err();
        assert!(matches!(err, SimulationError::Join { ref node, .. } if node == "B"));
        assert!(outcomes.is_empty());
        abort_all(&handles);
    }

    #[tokio::test]
    async fn settle_keeps_routers_that_finished_before_the_abort() {
        let finished: RouterTask = tokio::spawn(async {
            Ok(RoundOutcome {
                node: "A".to_string(),
                round: 1,
                changed: BTreeSet::from(["C".to_string()]),
            })
        });
        while !finished.is_finished() {
            tokio::task::yield_now().await;
        }
        let mut handles: BTreeMap<NodeId, RouterTask> = BTreeMap::from([
            ("A".to_string(), finished),
            ("B".to_string(), tokio::spawn(stuck_router())),
        ]);
        let mut outcomes = BTreeMap::new();

        settle(&mut handles, &mut outcomes).await;
        assert_eq!(outcomes.keys().collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(outcomes["A"].changed, BTreeSet::from(["C".to_string()]));
    }
}

use thiserror::Error;

use crate::NodeId;
use crate::coordinator::RoundReport;

/// Malformed or inconsistent topology input. Raised before any router exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("topology has no nodes")]
    Empty,

    #[error("duplicate node name `{0}`")]
    DuplicateNode(NodeId),

    #[error("edge {src} - {dst} references unknown node `{unknown}`")]
    UnknownNode {
        src: NodeId,
        dst: NodeId,
        unknown: NodeId,
    },

    #[error("edge {src} - {dst} has negative cost {cost}")]
    NegativeCost { src: NodeId, dst: NodeId, cost: i64 },

    #[error("edge {0} - {0} is a self-loop")]
    SelfLoop(NodeId),

    #[error("edge {src} - {dst} is declared more than once")]
    DuplicateEdge { src: NodeId, dst: NodeId },

    #[error("line {line}: expected a node count, found `{found}`")]
    BadNodeCount { line: usize, found: String },

    #[error("line {line}: node count says {declared} but {listed} names are listed")]
    NodeCountMismatch {
        line: usize,
        declared: usize,
        listed: usize,
    },

    #[error("line {line}: expected `<src> <dst> <cost>`, found `{found}`")]
    MalformedEdge { line: usize, found: String },

    #[error("missing {0} line")]
    MissingSection(&'static str),
}

/// Simulation settings that cannot drive a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("rounds must be at least 1, got {0}")]
    ZeroRounds(u32),

    #[error("round_timeout_ms must be positive")]
    ZeroTimeout,
}

/// A violation of the round exchange protocol. Always a bug in the
/// coordinator or a router, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{receiver} already holds a round {round} snapshot from {sender}")]
    DuplicateSnapshot {
        receiver: NodeId,
        sender: NodeId,
        round: u32,
    },

    #[error("{receiver} received a snapshot from non-neighbor {sender}")]
    NotANeighbor { receiver: NodeId, sender: NodeId },

    #[error("{receiver} is in round {expected} but got a round {got} snapshot from {sender}")]
    RoundMismatch {
        receiver: NodeId,
        sender: NodeId,
        expected: u32,
        got: u32,
    },

    #[error("no mailbox registered for {0}")]
    UnknownMailbox(NodeId),
}

/// One or more routers did not finish a round before the deadline.
#[derive(Debug, Error)]
#[error("round {round} stalled on {}", .stalled.join(", "))]
pub struct BarrierTimeoutError {
    pub round: u32,
    pub stalled: Vec<NodeId>,
    /// Report of the routers that did finish, only filled in when the
    /// caller opted into partial results.
    pub partial: Option<Box<RoundReport>>,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    BarrierTimeout(#[from] BarrierTimeoutError),

    #[error("router task for {node} failed: {source}")]
    Join {
        node: NodeId,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("simulation halted after an earlier failure")]
    Halted,
}

pub type Result<T, E = SimulationError> = std::result::Result<T, E>;

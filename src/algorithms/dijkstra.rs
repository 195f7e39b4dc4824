use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::NodeId;
use crate::network::Topology;
use crate::protocol::Cost;

#[derive(Debug, PartialEq, Eq)]
struct State {
    cost: u64,
    router: NodeId,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.router.cmp(&self.router))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// True shortest-path cost from `source` to every node of the topology.
/// Used to check what the distance vector exchange converges to.
pub fn shortest_paths(topology: &Topology, source: &str) -> HashMap<NodeId, Cost> {
    let mut distances: HashMap<NodeId, u64> = HashMap::new();
    let mut heap = BinaryHeap::new();

    distances.insert(source.to_string(), 0);
    heap.push(State {
        cost: 0,
        router: source.to_string(),
    });

    while let Some(State { cost, router }) = heap.pop() {
        // Skip if we've already found a better path
        if distances.get(&router).is_some_and(|best| cost > *best) {
            continue;
        }

        for (neighbor, link_cost) in topology.neighbors_of(&router) {
            let new_cost = cost.saturating_add(link_cost);
            if distances.get(&neighbor).is_none_or(|best| new_cost < *best) {
                distances.insert(neighbor.clone(), new_cost);
                heap.push(State {
                    cost: new_cost,
                    router: neighbor,
                });
            }
        }
    }

    topology
        .nodes
        .iter()
        .map(|node| {
            let cost = distances.get(node).map_or(Cost::Infinite, |c| Cost::Finite(*c));
            (node.clone(), cost)
        })
        .collect()
}

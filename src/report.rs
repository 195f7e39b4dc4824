use serde::Serialize;
use std::fmt::Write;

use crate::NodeId;
use crate::algorithms::dijkstra::shortest_paths;
use crate::coordinator::RoundReport;
use crate::network::Topology;
use crate::protocol::Cost;

const NO_PATH: &str = "[no path]";

/// Human readable dump of every router's table for one round. Entries that
/// changed during the round are marked with `*`.
pub fn render_round(report: &RoundReport, topology: &Topology) -> String {
    let mut output = String::new();
    writeln!(output, "\n******** Iteration {} *********\n", report.round).unwrap();

    for node in &topology.nodes {
        let Some(table) = report.tables.get(node) else {
            continue;
        };
        let changed = report.changed_at(node);
        let neighbours: Vec<NodeId> = topology.neighbors_of(node).into_keys().collect();

        writeln!(output, "{} => Router Object", node).unwrap();
        writeln!(output, "Name: {}", node).unwrap();
        writeln!(output, "Neighbours: [{}]", neighbours.join(", ")).unwrap();
        writeln!(output, "Routing Table: {{").unwrap();

        for (destination, entry) in table.iter() {
            let marker = if changed.is_some_and(|set| set.contains(destination)) {
                "*"
            } else {
                " "
            };
            let via = match &entry.next_hop {
                Some(hop) if hop == node => "-",
                Some(hop) => hop.as_str(),
                None => NO_PATH,
            };
            writeln!(
                output,
                "   {}{}: {:<10} via: {}",
                marker,
                destination,
                entry.cost.to_string(),
                via
            )
            .unwrap();
        }

        writeln!(output, "}}\n").unwrap();
    }

    output
}

pub fn render_json(report: &RoundReport) -> serde_json::Result<String> {
    serde_json::to_string(report)
}

/// A table entry whose cost differs from the true shortest path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    pub node: NodeId,
    pub destination: NodeId,
    pub actual: Cost,
    pub expected: Cost,
}

/// Compares every table in `report` against Dijkstra on the same topology.
pub fn divergences(report: &RoundReport, topology: &Topology) -> Vec<Divergence> {
    let mut found = Vec::new();
    for (node, table) in &report.tables {
        let expected = shortest_paths(topology, node);
        for destination in &topology.nodes {
            let actual = table.get(destination).cost;
            let want = expected.get(destination).copied().unwrap_or(Cost::Infinite);
            if actual != want {
                found.push(Divergence {
                    node: node.clone(),
                    destination: destination.clone(),
                    actual,
                    expected: want,
                });
            }
        }
    }
    found
}

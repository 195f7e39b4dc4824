use log::debug;

use super::topology::Topology;
use crate::error::TopologyError;

const END_MARKER: &str = "EOF";

/// Parses the adjacency text format:
///
/// ```text
/// 3
/// A B C
/// A B 1
/// B C 1
/// EOF
/// ```
///
/// The first line is the node count, the second the node names, then one
/// undirected edge per line. The trailing `EOF` line is optional. The result
/// is validated before it is returned.
pub fn parse_topology(text: &str) -> Result<Topology, TopologyError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (count_line, count_text) = lines.next().ok_or(TopologyError::MissingSection("node count"))?;
    let declared: usize = count_text.parse().map_err(|_| TopologyError::BadNodeCount {
        line: count_line,
        found: count_text.to_string(),
    })?;

    let (names_line, names_text) = lines.next().ok_or(TopologyError::MissingSection("node names"))?;
    let mut topology = Topology::new();
    for name in names_text.split_whitespace() {
        topology.add_node(name);
    }
    if topology.nodes.len() != declared {
        return Err(TopologyError::NodeCountMismatch {
            line: names_line,
            declared,
            listed: topology.nodes.len(),
        });
    }

    for (line_no, line) in lines {
        if line == END_MARKER {
            break;
        }

        let malformed = || TopologyError::MalformedEdge {
            line: line_no,
            found: line.to_string(),
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [src, dst, cost] = fields.as_slice() else {
            return Err(malformed());
        };
        let cost: i64 = cost.parse().map_err(|_| malformed())?;
        if cost < 0 {
            return Err(TopologyError::NegativeCost {
                src: src.to_string(),
                dst: dst.to_string(),
                cost,
            });
        }

        topology.add_edge(*src, *dst, cost as u64);
    }

    topology.validate()?;
    debug!(
        "Parsed topology with {} nodes and {} edges",
        topology.nodes.len(),
        topology.edges.len()
    );
    Ok(topology)
}

//! Layered auto-layout for the flow graph.
//!
//! Rank assignment by longest path from source nodes, crossing reduction
//! by alternating barycenter sweeps, then coordinate assignment on a fixed
//! 100×50 box per node. Deterministic: identical nodes/edges/direction in,
//! identical positions and port sides out. Topology is never mutated;
//! calling it again (the reflow gesture) discards manual drag positions.

use std::collections::{HashMap, VecDeque};

use crate::graph::{FlowGraph, PortSide, Vec2};

/// Fixed node box width, independent of label length.
pub const NODE_WIDTH: f64 = 100.0;
/// Fixed node box height.
pub const NODE_HEIGHT: f64 = 50.0;

const RANK_GAP: f64 = 50.0;
const NODE_GAP: f64 = 50.0;
const MARGIN: f64 = 40.0;

/// Flow direction of the layered layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
	/// Ranks grow downward; edges enter at the top, leave at the bottom.
	#[default]
	TopToBottom,
	/// Ranks grow rightward; edges enter at the left, leave at the right.
	LeftToRight,
}

/// Recompute every node position and port side in place.
pub fn layout(graph: &mut FlowGraph, direction: Direction) {
	if graph.nodes.is_empty() {
		return;
	}

	let ids: Vec<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
	// Self-links render fine but carry no layering information.
	let edges: Vec<(String, String)> = graph
		.edges
		.iter()
		.filter(|e| e.source != e.target)
		.map(|e| (e.source.clone(), e.target.clone()))
		.collect();

	let ranks = assign_ranks(&ids, &edges);
	let mut order = bucket_by_rank(&ids, &ranks);
	reduce_crossings(&mut order, &edges);

	let (box_main, box_cross) = match direction {
		Direction::TopToBottom => (NODE_HEIGHT, NODE_WIDTH),
		Direction::LeftToRight => (NODE_WIDTH, NODE_HEIGHT),
	};
	let span = |count: usize| count as f64 * (box_cross + NODE_GAP) - NODE_GAP;
	let widest = order.iter().map(|bucket| span(bucket.len())).fold(0.0, f64::max);

	let mut centers: HashMap<&str, (f64, f64)> = HashMap::new();
	for (rank, bucket) in order.iter().enumerate() {
		let main = MARGIN + rank as f64 * (box_main + RANK_GAP) + box_main / 2.0;
		let start = MARGIN + (widest - span(bucket.len())) / 2.0;
		for (index, id) in bucket.iter().enumerate() {
			let cross = start + index as f64 * (box_cross + NODE_GAP) + box_cross / 2.0;
			centers.insert(id.as_str(), (main, cross));
		}
	}

	for node in &mut graph.nodes {
		let Some(&(main, cross)) = centers.get(node.id.as_str()) else {
			continue;
		};
		// Centroid to top-left: back off half the box in each axis.
		match direction {
			Direction::TopToBottom => {
				node.position = Vec2::new(cross - NODE_WIDTH / 2.0, main - NODE_HEIGHT / 2.0);
				node.target_side = PortSide::Top;
				node.source_side = PortSide::Bottom;
			}
			Direction::LeftToRight => {
				node.position = Vec2::new(main - NODE_WIDTH / 2.0, cross - NODE_HEIGHT / 2.0);
				node.target_side = PortSide::Left;
				node.source_side = PortSide::Right;
			}
		}
	}
}

/// Longest-path ranking over a Kahn traversal. Nodes stuck in cycles are
/// appended in insertion order so the pass always terminates; their ranks
/// stay deterministic even though no monotone layering exists for them.
fn assign_ranks(ids: &[String], edges: &[(String, String)]) -> HashMap<String, usize> {
	let mut indegree: HashMap<&str, usize> = ids.iter().map(|id| (id.as_str(), 0)).collect();
	let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
	for (source, target) in edges {
		successors
			.entry(source.as_str())
			.or_default()
			.push(target.as_str());
		if let Some(count) = indegree.get_mut(target.as_str()) {
			*count += 1;
		}
	}

	let mut queue: VecDeque<&str> = ids
		.iter()
		.map(String::as_str)
		.filter(|id| indegree.get(id) == Some(&0))
		.collect();
	let mut order: Vec<&str> = Vec::with_capacity(ids.len());
	while let Some(id) = queue.pop_front() {
		order.push(id);
		for &next in successors.get(id).map(Vec::as_slice).unwrap_or_default() {
			if let Some(count) = indegree.get_mut(next) {
				*count -= 1;
				if *count == 0 {
					queue.push_back(next);
				}
			}
		}
	}
	for id in ids {
		if !order.contains(&id.as_str()) {
			order.push(id.as_str());
		}
	}

	let mut ranks: HashMap<String, usize> = HashMap::new();
	for id in &order {
		let rank = *ranks.get(*id).unwrap_or(&0);
		ranks.entry((*id).to_string()).or_insert(rank);
		for &next in successors.get(id).map(Vec::as_slice).unwrap_or_default() {
			let entry = ranks.entry(next.to_string()).or_insert(0);
			*entry = (*entry).max(rank + 1);
		}
	}
	ranks
}

/// Group ids into rank buckets, compressing unused rank values so cyclic
/// graphs leave no empty layers.
fn bucket_by_rank(ids: &[String], ranks: &HashMap<String, usize>) -> Vec<Vec<String>> {
	let mut used: Vec<usize> = ids.iter().filter_map(|id| ranks.get(id)).copied().collect();
	used.sort_unstable();
	used.dedup();
	let dense: HashMap<usize, usize> = used.iter().enumerate().map(|(i, &r)| (r, i)).collect();

	let mut buckets: Vec<Vec<String>> = vec![Vec::new(); used.len()];
	for id in ids {
		if let Some(rank) = ranks.get(id).and_then(|r| dense.get(r)) {
			buckets[*rank].push(id.clone());
		}
	}
	buckets
}

/// Two alternating barycenter sweeps (downward over incoming neighbors,
/// upward over outgoing), with stable tie-breaks on the current index.
fn reduce_crossings(order: &mut [Vec<String>], edges: &[(String, String)]) {
	if order.len() <= 1 {
		return;
	}

	let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
	let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
	for (source, target) in edges {
		outgoing.entry(source.as_str()).or_default().push(target.as_str());
		incoming.entry(target.as_str()).or_default().push(source.as_str());
	}

	let positions_of = |order: &[Vec<String>]| -> HashMap<String, usize> {
		let mut positions = HashMap::new();
		for bucket in order {
			for (index, id) in bucket.iter().enumerate() {
				positions.insert(id.clone(), index);
			}
		}
		positions
	};

	for _ in 0..2 {
		for rank in 1..order.len() {
			let positions = positions_of(order);
			sort_bucket(&mut order[rank], &incoming, &positions);
		}
		for rank in (0..order.len() - 1).rev() {
			let positions = positions_of(order);
			sort_bucket(&mut order[rank], &outgoing, &positions);
		}
	}
}

fn sort_bucket(
	bucket: &mut [String],
	neighbors: &HashMap<&str, Vec<&str>>,
	positions: &HashMap<String, usize>,
) {
	if bucket.len() <= 1 {
		return;
	}
	let current: HashMap<String, usize> = bucket
		.iter()
		.enumerate()
		.map(|(index, id)| (id.clone(), index))
		.collect();

	let score = |id: &str| -> f64 {
		let own = *current.get(id).unwrap_or(&0) as f64;
		let Some(list) = neighbors.get(id) else {
			return own;
		};
		let known: Vec<f64> = list
			.iter()
			.filter_map(|n| positions.get(*n))
			.map(|&p| p as f64)
			.collect();
		if known.is_empty() {
			own
		} else {
			known.iter().sum::<f64>() / known.len() as f64
		}
	};

	bucket.sort_by(|a, b| {
		score(a)
			.partial_cmp(&score(b))
			.unwrap_or(std::cmp::Ordering::Equal)
			.then_with(|| current[a].cmp(&current[b]))
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fixtures::{linked_record, valid_settings as settings};
	use crate::graph::build_graph;
	use crate::source::Record;

	fn record(id: &str, name: &str, targets: &[&str]) -> Record {
		let targets: Vec<(&str, &str)> = targets.iter().map(|t| (*t, *t)).collect();
		linked_record(id, name, &targets)
	}

	fn chain() -> FlowGraph {
		build_graph(
			&[
				record("a", "A", &["b"]),
				record("b", "B", &["c"]),
				record("c", "C", &[]),
			],
			&settings(),
		)
	}

	#[test]
	fn top_to_bottom_ranks_grow_downward() {
		let mut graph = chain();
		layout(&mut graph, Direction::TopToBottom);

		let (a, b, c) = (
			graph.node("a").unwrap().position,
			graph.node("b").unwrap().position,
			graph.node("c").unwrap().position,
		);
		assert!(a.y < b.y && b.y < c.y);
		assert_eq!(a.x, b.x);
		assert_eq!(b.x, c.x);
	}

	#[test]
	fn top_to_bottom_assigns_top_and_bottom_ports() {
		let mut graph = chain();
		layout(&mut graph, Direction::TopToBottom);
		for node in &graph.nodes {
			assert_eq!(node.target_side, PortSide::Top);
			assert_eq!(node.source_side, PortSide::Bottom);
		}
	}

	#[test]
	fn left_to_right_ranks_grow_rightward_with_side_ports() {
		let mut graph = chain();
		layout(&mut graph, Direction::LeftToRight);

		let (a, b) = (graph.node("a").unwrap(), graph.node("b").unwrap());
		assert!(a.position.x < b.position.x);
		assert_eq!(a.target_side, PortSide::Left);
		assert_eq!(a.source_side, PortSide::Right);
	}

	#[test]
	fn centroid_coordinates_become_top_left() {
		let mut graph = chain();
		layout(&mut graph, Direction::TopToBottom);
		// First rank centroid sits at MARGIN + box/2, so the top-left
		// corner lands exactly on the margin.
		let a = graph.node("a").unwrap().position;
		assert_eq!(a.y, MARGIN);
		assert_eq!(a.x, MARGIN);
	}

	#[test]
	fn diamond_parent_centers_over_children() {
		let mut graph = build_graph(
			&[
				record("a", "A", &["b", "c"]),
				record("b", "B", &["d"]),
				record("c", "C", &["d"]),
				record("d", "D", &[]),
			],
			&settings(),
		);
		layout(&mut graph, Direction::TopToBottom);

		let center = |id: &str| graph.node(id).unwrap().position.x + NODE_WIDTH / 2.0;
		assert_eq!(center("a"), (center("b") + center("c")) / 2.0);
		assert_eq!(center("a"), center("d"));
	}

	#[test]
	fn layout_is_deterministic() {
		let mut first = chain();
		let mut second = chain();
		layout(&mut first, Direction::TopToBottom);
		layout(&mut second, Direction::TopToBottom);

		for (a, b) in first.nodes.iter().zip(second.nodes.iter()) {
			assert_eq!(a.id, b.id);
			assert_eq!(a.position, b.position);
			assert_eq!(a.source_side, b.source_side);
		}
	}

	#[test]
	fn reflow_discards_dragged_positions() {
		let mut graph = chain();
		layout(&mut graph, Direction::TopToBottom);
		let before = graph.node("b").unwrap().position;

		graph.node_mut("b").unwrap().position = Vec2::new(900.0, 900.0);
		layout(&mut graph, Direction::TopToBottom);
		assert_eq!(graph.node("b").unwrap().position, before);
	}

	#[test]
	fn cycles_terminate_and_leave_no_empty_layer() {
		let mut graph = build_graph(
			&[record("a", "A", &["b"]), record("b", "B", &["a"])],
			&settings(),
		);
		layout(&mut graph, Direction::TopToBottom);

		let (a, b) = (graph.node("a").unwrap().position, graph.node("b").unwrap().position);
		assert!(a.y != b.y);
		// Dense ranks start at the margin even when longest-path ranks
		// left a hole behind.
		assert_eq!(a.y.min(b.y), MARGIN);
	}

	#[test]
	fn self_link_does_not_affect_ranking() {
		let mut graph = build_graph(
			&[record("a", "A", &["a", "b"]), record("b", "B", &[])],
			&settings(),
		);
		layout(&mut graph, Direction::TopToBottom);
		assert!(graph.node("a").unwrap().position.y < graph.node("b").unwrap().position.y);
	}
}

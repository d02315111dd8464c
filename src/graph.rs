//! Node/edge model and the record-set → graph transform.
//!
//! Nodes and edges are keyed by stable record id; the display name only
//! travels as the node label, so renames and duplicate names never collide.

use std::collections::HashSet;

use crate::settings::{EdgeStyle, NodeShape, ResolvedSettings};
use crate::source::Record;

/// A 2D point in graph space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
	pub x: f64,
	pub y: f64,
}

impl Vec2 {
	pub fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}

	pub fn distance(self, other: Self) -> f64 {
		let (dx, dy) = (other.x - self.x, other.y - self.y);
		(dx * dx + dy * dy).sqrt()
	}
}

/// Which side of a node box an edge attaches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortSide {
	Top,
	Bottom,
	Left,
	Right,
}

/// Whether an edge is persisted or a drag-in-progress candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
	/// Backed by a link in the remote store.
	Confirmed,
	/// Visual-only candidate shown while a drag is in progress.
	Provisional,
}

/// One record rendered as a box on the canvas.
#[derive(Clone, Debug)]
pub struct Node {
	/// Stable record id.
	pub id: String,
	/// Display name of the backing record.
	pub label: String,
	pub record: Record,
	/// Top-left corner in graph space.
	pub position: Vec2,
	pub source_side: PortSide,
	pub target_side: PortSide,
	pub shape: NodeShape,
}

/// One directed link from the link field of `source` to `target`.
#[derive(Clone, Debug)]
pub struct Edge {
	pub id: String,
	pub source: String,
	pub target: String,
	pub kind: EdgeKind,
	pub style: EdgeStyle,
	/// Snapshot of the record whose link field holds this edge.
	pub source_record: Record,
}

impl Edge {
	/// Derived edge identity, shared by builder- and gesture-created edges.
	pub fn derive_id(source: &str, target: &str) -> String {
		format!("{source}-{target}")
	}
}

/// The in-memory projection of the remote adjacency. Reconciled after
/// every mutating operation, never treated as authoritative.
#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
	pub nodes: Vec<Node>,
	pub edges: Vec<Edge>,
}

impl FlowGraph {
	pub fn node(&self, id: &str) -> Option<&Node> {
		self.nodes.iter().find(|n| n.id == id)
	}

	pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
		self.nodes.iter_mut().find(|n| n.id == id)
	}

	/// True when a confirmed edge for this exact (source, target) pair
	/// already exists.
	pub fn has_confirmed_edge(&self, source: &str, target: &str) -> bool {
		self.edges
			.iter()
			.any(|e| e.kind == EdgeKind::Confirmed && e.source == source && e.target == target)
	}
}

/// Build the node and edge lists for a record set under valid settings.
///
/// One node per record with a non-empty name; one confirmed edge per
/// distinct (record, linked-target) pair found in the link field. Link
/// targets that are not part of the record set produce no edge.
pub fn build_graph(records: &[Record], settings: &ResolvedSettings) -> FlowGraph {
	let Some(link_field) = settings.link_field_name() else {
		return FlowGraph::default();
	};

	let mut graph = FlowGraph::default();
	for record in records {
		if record.name.is_empty() {
			continue;
		}
		graph.nodes.push(Node {
			id: record.id.clone(),
			label: record.name.clone(),
			record: record.clone(),
			position: Vec2::default(),
			source_side: PortSide::Bottom,
			target_side: PortSide::Top,
			shape: settings.node_shape,
		});
	}

	let node_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
	let mut seen: HashSet<(String, String)> = HashSet::new();
	for record in records {
		if !node_ids.contains(record.id.as_str()) {
			continue;
		}
		for link in record.linked_records(link_field) {
			if !node_ids.contains(link.id.as_str()) {
				continue;
			}
			let pair = (record.id.clone(), link.id.clone());
			if !seen.insert(pair) {
				continue;
			}
			graph.edges.push(Edge {
				id: Edge::derive_id(&record.id, &link.id),
				source: record.id.clone(),
				target: link.id.clone(),
				kind: EdgeKind::Confirmed,
				style: settings.edge_style,
				source_record: record.clone(),
			});
		}
	}

	graph
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fixtures::{linked_record as linked, valid_settings};

	#[test]
	fn one_node_per_named_record_one_edge_per_link() {
		let records = vec![
			linked("rec1", "Start", &[("rec2", "Middle"), ("rec3", "End")]),
			linked("rec2", "Middle", &[("rec3", "End")]),
			Record::new("rec3", "End"),
		];

		let graph = build_graph(&records, &valid_settings());
		assert_eq!(graph.nodes.len(), 3);
		assert_eq!(graph.edges.len(), 3);
		assert!(graph.has_confirmed_edge("rec1", "rec2"));
		assert!(graph.has_confirmed_edge("rec1", "rec3"));
		assert!(graph.has_confirmed_edge("rec2", "rec3"));
	}

	#[test]
	fn unnamed_records_produce_no_node() {
		let records = vec![Record::new("rec1", ""), Record::new("rec2", "Named")];
		let graph = build_graph(&records, &valid_settings());

		assert_eq!(graph.nodes.len(), 1);
		assert_eq!(graph.nodes[0].id, "rec2");
	}

	#[test]
	fn same_name_records_stay_distinct() {
		// Stable-id keying: two records sharing a display name must not
		// collapse into one node.
		let records = vec![
			Record::new("rec1", "Task"),
			Record::new("rec2", "Task"),
		];
		let graph = build_graph(&records, &valid_settings());
		assert_eq!(graph.nodes.len(), 2);
	}

	#[test]
	fn links_to_absent_records_are_skipped() {
		let records = vec![linked("rec1", "Start", &[("recGone", "Deleted")])];
		let graph = build_graph(&records, &valid_settings());
		assert!(graph.edges.is_empty());
	}

	#[test]
	fn repeated_links_produce_one_edge() {
		let records = vec![
			linked("rec1", "Start", &[("rec2", "End"), ("rec2", "End")]),
			Record::new("rec2", "End"),
		];
		let graph = build_graph(&records, &valid_settings());
		assert_eq!(graph.edges.len(), 1);
	}

	#[test]
	fn edge_ids_derive_from_endpoint_ids() {
		let records = vec![
			linked("rec1", "Start", &[("rec2", "End")]),
			Record::new("rec2", "End"),
		];
		let graph = build_graph(&records, &valid_settings());
		assert_eq!(graph.edges[0].id, "rec1-rec2");
		assert_eq!(graph.edges[0].kind, EdgeKind::Confirmed);
		assert_eq!(graph.edges[0].source_record.id, "rec1");
	}
}

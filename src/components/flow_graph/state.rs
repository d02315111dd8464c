//! Live canvas state: the visual node/edge collection and the gesture
//! state machines that mutate it.
//!
//! This is the only owner of the visual graph. Every change goes through
//! the update functions below; the sync core never touches this state, it
//! only returns data for the canvas to apply. Remote outcomes therefore
//! reconcile here: confirmed edges are added on connect success, and
//! [`FlowGraphState::reconcile`] rebuilds the projection from a fresh
//! record query after a denied or failed mutation.

use crate::graph::{Edge, EdgeKind, FlowGraph, Node, PortSide, Vec2};
use crate::layout::{self, Direction, NODE_HEIGHT, NODE_WIDTH};
use crate::settings::{EdgeStyle, LinkStyle, ResolvedSettings};
use crate::source::Record;

/// Nodes closer than this (top-left to top-left) attract a provisional
/// edge while one of them is being dragged.
pub const MIN_NODE_DISTANCE: f64 = 100.0;

/// Hit slop around an edge polyline, in graph units.
const EDGE_HIT_DISTANCE: f64 = 6.0;
/// Hit slop around a source port when starting an explicit connect drag.
const PORT_HIT_RADIUS: f64 = 10.0;

/// Pan/zoom applied when mapping graph space onto the canvas.
#[derive(Clone, Debug)]
pub struct ViewTransform {
	pub x: f64,
	pub y: f64,
	pub k: f64,
}

impl Default for ViewTransform {
	fn default() -> Self {
		Self { x: 0.0, y: 0.0, k: 1.0 }
	}
}

/// An in-progress node drag.
#[derive(Clone, Debug, Default)]
pub struct DragState {
	pub active: bool,
	pub node_id: Option<String>,
	pub start_x: f64,
	pub start_y: f64,
	pub node_start: Vec2,
}

/// An in-progress background pan.
#[derive(Clone, Debug, Default)]
pub struct PanState {
	pub active: bool,
	pub start_x: f64,
	pub start_y: f64,
	pub transform_start_x: f64,
	pub transform_start_y: f64,
}

/// An in-progress explicit connect drag from a node's source port.
#[derive(Clone, Debug, Default)]
pub struct ConnectState {
	pub active: bool,
	pub source_id: Option<String>,
	pub cursor: Vec2,
}

/// What the canvas must persist after a drop confirmed a new connection:
/// the pair to connect, and the confirmed edges into the dragged node
/// that the drop replaced (already removed from visual state, each owed
/// one remote disconnect).
#[derive(Clone, Debug)]
pub struct DropPlan {
	pub source: String,
	pub target: String,
	pub replaced: Vec<Edge>,
}

pub struct FlowGraphState {
	pub graph: FlowGraph,
	pub transform: ViewTransform,
	pub drag: DragState,
	pub pan: PanState,
	pub connect: ConnectState,
	pub width: f64,
	pub height: f64,
	/// Last non-fatal error or notice, drawn as a banner.
	pub message: Option<String>,
}

impl FlowGraphState {
	pub fn new(graph: FlowGraph, width: f64, height: f64) -> Self {
		Self {
			graph,
			transform: ViewTransform::default(),
			drag: DragState::default(),
			pan: PanState::default(),
			connect: ConnectState::default(),
			width,
			height,
			message: None,
		}
	}

	pub fn screen_to_graph(&self, sx: f64, sy: f64) -> (f64, f64) {
		(
			(sx - self.transform.x) / self.transform.k,
			(sy - self.transform.y) / self.transform.k,
		)
	}

	pub fn resize(&mut self, width: f64, height: f64) {
		self.width = width;
		self.height = height;
	}

	pub fn set_message(&mut self, message: impl Into<String>) {
		self.message = Some(message.into());
	}

	/// Topmost node whose box contains the given screen position.
	pub fn node_at_position(&self, sx: f64, sy: f64) -> Option<String> {
		let (gx, gy) = self.screen_to_graph(sx, sy);
		self.graph
			.nodes
			.iter()
			.rev()
			.find(|node| {
				gx >= node.position.x
					&& gx <= node.position.x + NODE_WIDTH
					&& gy >= node.position.y
					&& gy <= node.position.y + NODE_HEIGHT
			})
			.map(|node| node.id.clone())
	}

	/// Node whose source port sits under the given screen position, for
	/// starting an explicit connect drag.
	pub fn source_port_at_position(&self, sx: f64, sy: f64) -> Option<String> {
		let (gx, gy) = self.screen_to_graph(sx, sy);
		let cursor = Vec2::new(gx, gy);
		self.graph
			.nodes
			.iter()
			.rev()
			.find(|node| port_point(node, node.source_side).distance(cursor) <= PORT_HIT_RADIUS)
			.map(|node| node.id.clone())
	}

	/// Confirmed edge whose polyline passes under the given screen
	/// position.
	pub fn edge_at_position(&self, sx: f64, sy: f64, link_style: LinkStyle) -> Option<String> {
		let (gx, gy) = self.screen_to_graph(sx, sy);
		let cursor = Vec2::new(gx, gy);
		for edge in self.graph.edges.iter().rev() {
			if edge.kind != EdgeKind::Confirmed {
				continue;
			}
			let (Some(source), Some(target)) =
				(self.graph.node(&edge.source), self.graph.node(&edge.target))
			else {
				continue;
			};
			let path = edge_path(source, target, edge.style, link_style);
			let near = path
				.windows(2)
				.any(|span| distance_to_segment(cursor, span[0], span[1]) <= EDGE_HIT_DISTANCE);
			if near {
				return Some(edge.id.clone());
			}
		}
		None
	}

	// ── Node drag + proximity auto-link ──

	pub fn begin_drag(&mut self, node_id: &str, sx: f64, sy: f64) {
		let Some(node) = self.graph.node(node_id) else {
			return;
		};
		self.drag = DragState {
			active: true,
			node_id: Some(node_id.to_string()),
			start_x: sx,
			start_y: sy,
			node_start: node.position,
		};
	}

	/// One drag-move tick: reposition the dragged node and refresh the
	/// provisional edge against the nearest candidate.
	pub fn drag_to(&mut self, sx: f64, sy: f64, edge_style: EdgeStyle) {
		let Some(node_id) = self.drag.node_id.clone() else {
			return;
		};
		let (dx, dy) = (
			(sx - self.drag.start_x) / self.transform.k,
			(sy - self.drag.start_y) / self.transform.k,
		);
		let position = Vec2::new(self.drag.node_start.x + dx, self.drag.node_start.y + dy);
		if let Some(node) = self.graph.node_mut(&node_id) {
			node.position = position;
		}
		self.refresh_provisional(&node_id, edge_style);
	}

	/// Nearest other node strictly under [`MIN_NODE_DISTANCE`], oriented
	/// top-to-bottom: the node with the smaller y coordinate is the
	/// source, whichever end was dragged.
	pub fn closest_candidate(&self, node_id: &str) -> Option<(String, String)> {
		let node = self.graph.node(node_id)?;
		let mut best: Option<(&Node, f64)> = None;
		for other in &self.graph.nodes {
			if other.id == node.id {
				continue;
			}
			let d = other.position.distance(node.position);
			if d < MIN_NODE_DISTANCE && best.map_or(true, |(_, bd)| d < bd) {
				best = Some((other, d));
			}
		}
		let (closest, _) = best?;
		if closest.position.y < node.position.y {
			Some((closest.id.clone(), node.id.clone()))
		} else {
			Some((node.id.clone(), closest.id.clone()))
		}
	}

	fn refresh_provisional(&mut self, node_id: &str, edge_style: EdgeStyle) {
		let candidate = self.closest_candidate(node_id);
		self.clear_provisional();
		let Some((source, target)) = candidate else {
			return;
		};
		if self.graph.has_confirmed_edge(&source, &target) {
			return;
		}
		let Some(source_record) = self.graph.node(&source).map(|n| n.record.clone()) else {
			return;
		};
		self.graph.edges.push(Edge {
			id: Edge::derive_id(&source, &target),
			source,
			target,
			kind: EdgeKind::Provisional,
			style: edge_style,
			source_record,
		});
	}

	pub fn clear_provisional(&mut self) {
		self.graph.edges.retain(|e| e.kind != EdgeKind::Provisional);
	}

	/// Finish a node drag. Recomputes the candidate once, drops every
	/// provisional edge, and — when a new connection is confirmed —
	/// removes the confirmed edges terminating at the dragged node (the
	/// drop replaces its incoming connection) and returns the plan for
	/// the canvas to persist. `None` means nothing to persist.
	pub fn end_drag(&mut self) -> Option<DropPlan> {
		let node_id = self.drag.node_id.take();
		self.drag = DragState::default();
		let node_id = node_id?;

		let candidate = self.closest_candidate(&node_id);
		self.clear_provisional();

		let (source, target) = candidate?;
		if self.graph.has_confirmed_edge(&source, &target) {
			return None;
		}

		let mut replaced = Vec::new();
		self.graph.edges.retain(|edge| {
			if edge.kind == EdgeKind::Confirmed && edge.target == node_id {
				replaced.push(edge.clone());
				false
			} else {
				true
			}
		});

		Some(DropPlan {
			source,
			target,
			replaced,
		})
	}

	// ── Explicit connect drag ──

	pub fn begin_connect(&mut self, source_id: &str, sx: f64, sy: f64) {
		let (gx, gy) = self.screen_to_graph(sx, sy);
		self.connect = ConnectState {
			active: true,
			source_id: Some(source_id.to_string()),
			cursor: Vec2::new(gx, gy),
		};
	}

	pub fn connect_drag_to(&mut self, sx: f64, sy: f64) {
		let (gx, gy) = self.screen_to_graph(sx, sy);
		self.connect.cursor = Vec2::new(gx, gy);
	}

	/// Finish an explicit connect drag over the given screen position.
	/// Returns the pair to connect when the drop landed on another node
	/// and the pair is not already confirmed.
	pub fn end_connect(&mut self, sx: f64, sy: f64) -> Option<(String, String)> {
		let source = self.connect.source_id.take();
		self.connect = ConnectState::default();
		let source = source?;
		let target = self.node_at_position(sx, sy)?;
		if target == source || self.graph.has_confirmed_edge(&source, &target) {
			return None;
		}
		Some((source, target))
	}

	// ── Applying results ──

	/// Add a confirmed edge, enforcing the no-duplicate-pair invariant.
	pub fn add_confirmed_edge(
		&mut self,
		source: &str,
		target: &str,
		style: EdgeStyle,
		source_record: Record,
	) {
		if self
			.graph
			.edges
			.iter()
			.any(|e| e.source == source && e.target == target)
		{
			return;
		}
		self.graph.edges.push(Edge {
			id: Edge::derive_id(source, target),
			source: source.to_string(),
			target: target.to_string(),
			kind: EdgeKind::Confirmed,
			style,
			source_record,
		});
	}

	/// Remove a node and every edge touching it, returning the node for
	/// the remote delete.
	pub fn remove_node(&mut self, node_id: &str) -> Option<Node> {
		let index = self.graph.nodes.iter().position(|n| n.id == node_id)?;
		let node = self.graph.nodes.remove(index);
		self.graph
			.edges
			.retain(|e| e.source != node_id && e.target != node_id);
		Some(node)
	}

	pub fn remove_edge(&mut self, edge_id: &str) -> Option<Edge> {
		let index = self.graph.edges.iter().position(|e| e.id == edge_id)?;
		Some(self.graph.edges.remove(index))
	}

	/// Append a freshly created, unlinked node near the view origin.
	pub fn add_node(&mut self, record: Record, settings: &ResolvedSettings) {
		let (gx, gy) = self.screen_to_graph(self.width / 2.0, self.height / 2.0);
		self.graph.nodes.push(Node {
			id: record.id.clone(),
			label: record.name.clone(),
			record,
			position: Vec2::new(gx - NODE_WIDTH / 2.0, gy - NODE_HEIGHT / 2.0),
			source_side: PortSide::Bottom,
			target_side: PortSide::Top,
			shape: settings.node_shape,
		});
	}

	pub fn apply_layout(&mut self, direction: Direction) {
		layout::layout(&mut self.graph, direction);
	}

	/// Rebuild the projection from a fresh record query, keeping the
	/// position and port sides of every surviving node. Run after a
	/// denied or failed mutation, and on record-set change notifications.
	pub fn reconcile(&mut self, records: &[Record], settings: &ResolvedSettings) {
		let previous = std::mem::take(&mut self.graph);
		let mut next = crate::graph::build_graph(records, settings);
		for node in &mut next.nodes {
			if let Some(old) = previous.node(&node.id) {
				node.position = old.position;
				node.source_side = old.source_side;
				node.target_side = old.target_side;
			}
		}
		self.graph = next;
	}
}

/// Center of the given side of a node's box.
pub fn port_point(node: &Node, side: PortSide) -> Vec2 {
	let Vec2 { x, y } = node.position;
	match side {
		PortSide::Top => Vec2::new(x + NODE_WIDTH / 2.0, y),
		PortSide::Bottom => Vec2::new(x + NODE_WIDTH / 2.0, y + NODE_HEIGHT),
		PortSide::Left => Vec2::new(x, y + NODE_HEIGHT / 2.0),
		PortSide::Right => Vec2::new(x + NODE_WIDTH, y + NODE_HEIGHT / 2.0),
	}
}

/// Waypoints for an edge from `source`'s source port to `target`'s
/// target port. Orthogonal styles route through the midpoint of the flow
/// axis; straight styles connect the ports directly. The smoothstep
/// corner rounding is applied at draw time on the same waypoints.
pub fn edge_path(source: &Node, target: &Node, style: EdgeStyle, link_style: LinkStyle) -> Vec<Vec2> {
	let from = port_point(source, source.source_side);
	let to = port_point(target, target.target_side);

	let orthogonal = match style {
		EdgeStyle::Step | EdgeStyle::SmoothStep => true,
		EdgeStyle::Straight => false,
		EdgeStyle::Default => link_style == LinkStyle::RightAngles,
	};
	if !orthogonal {
		return vec![from, to];
	}

	match source.source_side {
		PortSide::Bottom | PortSide::Top => {
			let mid = (from.y + to.y) / 2.0;
			vec![
				from,
				Vec2::new(from.x, mid),
				Vec2::new(to.x, mid),
				to,
			]
		}
		PortSide::Left | PortSide::Right => {
			let mid = (from.x + to.x) / 2.0;
			vec![
				from,
				Vec2::new(mid, from.y),
				Vec2::new(mid, to.y),
				to,
			]
		}
	}
}

fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f64 {
	let (abx, aby) = (b.x - a.x, b.y - a.y);
	let len_sq = abx * abx + aby * aby;
	if len_sq == 0.0 {
		return p.distance(a);
	}
	let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / len_sq).clamp(0.0, 1.0);
	p.distance(Vec2::new(a.x + t * abx, a.y + t * aby))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fixtures::{linked_record, valid_settings};
	use crate::graph::build_graph;
	use crate::source::Record;

	fn state_with(records: Vec<Record>) -> FlowGraphState {
		let graph = build_graph(&records, &valid_settings());
		FlowGraphState::new(graph, 800.0, 600.0)
	}

	fn place(state: &mut FlowGraphState, id: &str, x: f64, y: f64) {
		state.graph.node_mut(id).unwrap().position = Vec2::new(x, y);
	}

	#[test]
	fn dragging_near_a_single_candidate_creates_one_provisional_edge() {
		let mut state = state_with(vec![
			Record::new("x", "X"),
			Record::new("y", "Y"),
			Record::new("z", "Z"),
		]);
		place(&mut state, "x", 0.0, 0.0);
		place(&mut state, "y", 0.0, 80.0);
		place(&mut state, "z", 150.0, 0.0);

		state.begin_drag("x", 0.0, 0.0);
		state.drag_to(0.0, 0.0, EdgeStyle::Default);

		let provisional: Vec<&Edge> = state
			.graph
			.edges
			.iter()
			.filter(|e| e.kind == EdgeKind::Provisional)
			.collect();
		assert_eq!(provisional.len(), 1);
		// x sits above y, so the edge runs x -> y whichever end is dragged.
		assert_eq!(provisional[0].source, "x");
		assert_eq!(provisional[0].target, "y");
	}

	#[test]
	fn candidate_above_the_dragged_node_becomes_the_source() {
		let mut state = state_with(vec![Record::new("x", "X"), Record::new("y", "Y")]);
		place(&mut state, "x", 0.0, 80.0);
		place(&mut state, "y", 0.0, 0.0);

		assert_eq!(
			state.closest_candidate("x"),
			Some(("y".to_string(), "x".to_string()))
		);
	}

	#[test]
	fn moving_out_of_range_clears_the_provisional_edge() {
		let mut state = state_with(vec![Record::new("x", "X"), Record::new("y", "Y")]);
		place(&mut state, "x", 0.0, 0.0);
		place(&mut state, "y", 0.0, 80.0);

		state.begin_drag("x", 0.0, 0.0);
		state.drag_to(0.0, 0.0, EdgeStyle::Default);
		assert_eq!(state.graph.edges.len(), 1);

		state.drag_to(300.0, 0.0, EdgeStyle::Default);
		assert!(state.graph.edges.is_empty());
	}

	#[test]
	fn an_existing_confirmed_edge_suppresses_the_provisional_one() {
		let mut state = state_with(vec![
			linked_record("x", "X", &[("y", "Y")]),
			Record::new("y", "Y"),
		]);
		place(&mut state, "x", 0.0, 0.0);
		place(&mut state, "y", 0.0, 80.0);

		state.begin_drag("x", 0.0, 0.0);
		state.drag_to(0.0, 0.0, EdgeStyle::Default);

		assert_eq!(state.graph.edges.len(), 1);
		assert_eq!(state.graph.edges[0].kind, EdgeKind::Confirmed);
	}

	#[test]
	fn drop_near_a_new_candidate_yields_a_plan_and_no_provisional_leftovers() {
		let mut state = state_with(vec![Record::new("x", "X"), Record::new("y", "Y")]);
		place(&mut state, "x", 0.0, 80.0);
		place(&mut state, "y", 0.0, 0.0);

		state.begin_drag("x", 0.0, 80.0);
		state.drag_to(0.0, 80.0, EdgeStyle::Default);
		let plan = state.end_drag().expect("a new pair must produce a plan");

		assert_eq!((plan.source.as_str(), plan.target.as_str()), ("y", "x"));
		assert!(plan.replaced.is_empty());
		assert!(state.graph.edges.is_empty());
		assert!(!state.drag.active);
	}

	#[test]
	fn drop_replaces_confirmed_edges_into_the_dragged_node() {
		let mut state = state_with(vec![
			linked_record("w", "W", &[("x", "X")]),
			Record::new("x", "X"),
			Record::new("y", "Y"),
		]);
		place(&mut state, "w", 500.0, 500.0);
		place(&mut state, "x", 0.0, 80.0);
		place(&mut state, "y", 0.0, 0.0);

		state.begin_drag("x", 0.0, 80.0);
		let plan = state.end_drag().expect("plan");

		assert_eq!((plan.source.as_str(), plan.target.as_str()), ("y", "x"));
		assert_eq!(plan.replaced.len(), 1);
		assert_eq!(plan.replaced[0].id, "w-x");
		assert!(state.graph.edges.is_empty());
	}

	#[test]
	fn drop_on_an_already_confirmed_pair_yields_no_plan() {
		let mut state = state_with(vec![
			linked_record("y", "Y", &[("x", "X")]),
			Record::new("x", "X"),
		]);
		place(&mut state, "x", 0.0, 80.0);
		place(&mut state, "y", 0.0, 0.0);

		state.begin_drag("x", 0.0, 80.0);
		assert!(state.end_drag().is_none());
		// The confirmed edge survives untouched.
		assert_eq!(state.graph.edges.len(), 1);
		assert_eq!(state.graph.edges[0].kind, EdgeKind::Confirmed);
	}

	#[test]
	fn add_confirmed_edge_rejects_duplicates() {
		let mut state = state_with(vec![Record::new("x", "X"), Record::new("y", "Y")]);
		let record = state.graph.node("x").unwrap().record.clone();

		state.add_confirmed_edge("x", "y", EdgeStyle::Default, record.clone());
		state.add_confirmed_edge("x", "y", EdgeStyle::Default, record);
		assert_eq!(state.graph.edges.len(), 1);
	}

	#[test]
	fn removing_a_node_cascades_to_its_edges() {
		let mut state = state_with(vec![
			linked_record("x", "X", &[("y", "Y")]),
			linked_record("y", "Y", &[("z", "Z")]),
			Record::new("z", "Z"),
		]);

		let removed = state.remove_node("y").expect("node exists");
		assert_eq!(removed.id, "y");
		assert!(state.graph.node("y").is_none());
		assert!(state.graph.edges.is_empty());
	}

	#[test]
	fn reconcile_preserves_positions_of_surviving_nodes() {
		let mut state = state_with(vec![Record::new("x", "X"), Record::new("y", "Y")]);
		place(&mut state, "x", 123.0, 456.0);

		let fresh = vec![
			linked_record("x", "X", &[("z", "Z")]),
			Record::new("z", "Z"),
		];
		state.reconcile(&fresh, &valid_settings());

		assert_eq!(state.graph.node("x").unwrap().position, Vec2::new(123.0, 456.0));
		assert!(state.graph.node("y").is_none());
		assert!(state.graph.has_confirmed_edge("x", "z"));
	}

	#[test]
	fn end_connect_refuses_self_and_duplicate_pairs() {
		let mut state = state_with(vec![
			linked_record("x", "X", &[("y", "Y")]),
			Record::new("y", "Y"),
		]);
		place(&mut state, "x", 0.0, 0.0);
		place(&mut state, "y", 300.0, 0.0);

		state.begin_connect("x", 0.0, 0.0);
		// Dropped back on itself.
		assert!(state.end_connect(10.0, 10.0).is_none());

		state.begin_connect("x", 0.0, 0.0);
		// Dropped on y, but x -> y is already confirmed.
		assert!(state.end_connect(310.0, 10.0).is_none());
	}

	#[tokio::test]
	async fn confirmed_drop_issues_exactly_one_connect_write() {
		use std::rc::Rc;

		use crate::fixtures::{base_with_records, table_meta};
		use crate::sync::SyncCore;

		let records = vec![Record::new("x", "X"), Record::new("y", "Y")];
		let base = Rc::new(base_with_records(records.clone()));
		let core = SyncCore::new(base.clone());

		let mut state =
			FlowGraphState::new(build_graph(&records, &valid_settings()), 800.0, 600.0);
		place(&mut state, "x", 0.0, 80.0);
		place(&mut state, "y", 0.0, 0.0);

		// Drop x near y, then persist the plan the way the canvas does.
		state.begin_drag("x", 0.0, 80.0);
		let plan = state.end_drag().expect("plan");
		for edge in &plan.replaced {
			core.disconnect(edge, &edge.source_record, "Next", &table_meta())
				.await
				.unwrap();
		}
		let record = core
			.connect(&state.graph.nodes, &plan.source, &plan.target, &valid_settings())
			.await
			.unwrap();
		state.add_confirmed_edge(&plan.source, &plan.target, EdgeStyle::Default, record);

		assert_eq!(base.update_call_count(), 1);
		assert!(state.graph.has_confirmed_edge("y", "x"));

		// Dropping on the now-confirmed pair plans nothing, so the canvas
		// issues zero further remote calls.
		state.begin_drag("x", 0.0, 80.0);
		assert!(state.end_drag().is_none());
		assert_eq!(base.update_call_count(), 1);
	}

	#[test]
	fn straight_and_orthogonal_edge_paths() {
		let state = state_with(vec![Record::new("x", "X"), Record::new("y", "Y")]);
		let (x, y) = (state.graph.node("x").unwrap(), state.graph.node("y").unwrap());

		let straight = edge_path(x, y, EdgeStyle::Straight, LinkStyle::RightAngles);
		assert_eq!(straight.len(), 2);

		let step = edge_path(x, y, EdgeStyle::Step, LinkStyle::RightAngles);
		assert_eq!(step.len(), 4);
		// Orthogonal: the middle segment is horizontal for vertical flow.
		assert_eq!(step[1].y, step[2].y);
	}
}

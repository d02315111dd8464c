//! 2D-canvas drawing of the flow graph: shaped node boxes, port dots,
//! routed edges with arrowheads, and the status banner. Provisional
//! edges draw dashed so a drag candidate is visually distinct from a
//! persisted link.

use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use super::state::{FlowGraphState, edge_path, port_point};
use crate::graph::{EdgeKind, Node, Vec2};
use crate::layout::{NODE_HEIGHT, NODE_WIDTH};
use crate::settings::{EdgeStyle, NodeShape, ResolvedSettings};

const BACKGROUND: &str = "#f5f5f5";
const NODE_FILL: &str = "#ffffff";
const NODE_STROKE: &str = "#5c6370";
const LABEL_COLOR: &str = "#24292f";
const EDGE_COLOR: &str = "#6b7280";
const PROVISIONAL_COLOR: &str = "#4c8ffb";
const MESSAGE_COLOR: &str = "#b42318";

const PORT_RADIUS: f64 = 3.0;
const ARROW_SIZE: f64 = 7.0;
const CORNER_RADIUS: f64 = 8.0;

pub fn render(state: &FlowGraphState, settings: &ResolvedSettings, ctx: &CanvasRenderingContext2d) {
	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, state.width, state.height);
	ctx.save();
	let _ = ctx.translate(state.transform.x, state.transform.y);
	let _ = ctx.scale(state.transform.k, state.transform.k);
	draw_edges(state, settings, ctx);
	draw_connect_drag(state, ctx);
	draw_nodes(state, ctx);
	ctx.restore();
	draw_message(state, ctx);
}

fn draw_edges(state: &FlowGraphState, settings: &ResolvedSettings, ctx: &CanvasRenderingContext2d) {
	let k = state.transform.k;

	for edge in &state.graph.edges {
		let (Some(source), Some(target)) = (
			state.graph.node(&edge.source),
			state.graph.node(&edge.target),
		) else {
			continue;
		};
		let path = edge_path(source, target, edge.style, settings.link_style);
		if path.len() < 2 {
			continue;
		}

		let provisional = edge.kind == EdgeKind::Provisional;
		let color = if provisional { PROVISIONAL_COLOR } else { EDGE_COLOR };
		ctx.set_stroke_style_str(color);
		ctx.set_line_width(1.5 / k);
		if provisional {
			let _ = ctx.set_line_dash(&js_sys::Array::of2(
				&JsValue::from_f64(6.0 / k),
				&JsValue::from_f64(4.0 / k),
			));
		}

		trace_path(ctx, &path, edge.style);
		ctx.stroke();
		if provisional {
			let _ = ctx.set_line_dash(&js_sys::Array::new());
		}

		draw_arrowhead(ctx, &path, color);
	}
}

fn trace_path(ctx: &CanvasRenderingContext2d, path: &[Vec2], style: EdgeStyle) {
	ctx.begin_path();
	ctx.move_to(path[0].x, path[0].y);
	match style {
		EdgeStyle::SmoothStep => {
			for i in 1..path.len() - 1 {
				let _ = ctx.arc_to(path[i].x, path[i].y, path[i + 1].x, path[i + 1].y, CORNER_RADIUS);
			}
			let last = path[path.len() - 1];
			ctx.line_to(last.x, last.y);
		}
		_ => {
			for point in &path[1..] {
				ctx.line_to(point.x, point.y);
			}
		}
	}
}

fn draw_arrowhead(ctx: &CanvasRenderingContext2d, path: &[Vec2], color: &str) {
	let tip = path[path.len() - 1];
	let prev = path[path.len() - 2];
	let (dx, dy) = (tip.x - prev.x, tip.y - prev.y);
	let dist = (dx * dx + dy * dy).sqrt();
	if dist < 0.001 {
		return;
	}
	let (ux, uy) = (dx / dist, dy / dist);
	let (back_x, back_y) = (tip.x - ux * ARROW_SIZE, tip.y - uy * ARROW_SIZE);
	let (px, py) = (-uy * ARROW_SIZE * 0.5, ux * ARROW_SIZE * 0.5);

	ctx.set_fill_style_str(color);
	ctx.begin_path();
	ctx.move_to(tip.x, tip.y);
	ctx.line_to(back_x + px, back_y + py);
	ctx.line_to(back_x - px, back_y - py);
	ctx.close_path();
	ctx.fill();
}

fn draw_connect_drag(state: &FlowGraphState, ctx: &CanvasRenderingContext2d) {
	if !state.connect.active {
		return;
	}
	let Some(source) = state
		.connect
		.source_id
		.as_deref()
		.and_then(|id| state.graph.node(id))
	else {
		return;
	};
	let from = port_point(source, source.source_side);
	let k = state.transform.k;

	ctx.set_stroke_style_str(PROVISIONAL_COLOR);
	ctx.set_line_width(1.5 / k);
	let _ = ctx.set_line_dash(&js_sys::Array::of2(
		&JsValue::from_f64(6.0 / k),
		&JsValue::from_f64(4.0 / k),
	));
	ctx.begin_path();
	ctx.move_to(from.x, from.y);
	ctx.line_to(state.connect.cursor.x, state.connect.cursor.y);
	ctx.stroke();
	let _ = ctx.set_line_dash(&js_sys::Array::new());
}

fn draw_nodes(state: &FlowGraphState, ctx: &CanvasRenderingContext2d) {
	let k = state.transform.k;

	for node in &state.graph.nodes {
		trace_shape(ctx, node);
		ctx.set_fill_style_str(NODE_FILL);
		ctx.fill();
		ctx.set_stroke_style_str(NODE_STROKE);
		ctx.set_line_width(1.0 / k);
		ctx.stroke();

		ctx.set_fill_style_str(LABEL_COLOR);
		ctx.set_font("12px sans-serif");
		ctx.set_text_align("center");
		ctx.set_text_baseline("middle");
		let _ = ctx.fill_text_with_max_width(
			&node.label,
			node.position.x + NODE_WIDTH / 2.0,
			node.position.y + NODE_HEIGHT / 2.0,
			NODE_WIDTH - 12.0,
		);

		for side in [node.source_side, node.target_side] {
			let port = port_point(node, side);
			ctx.begin_path();
			let _ = ctx.arc(port.x, port.y, PORT_RADIUS, 0.0, 2.0 * std::f64::consts::PI);
			ctx.set_fill_style_str(NODE_STROKE);
			ctx.fill();
		}
	}
}

fn trace_shape(ctx: &CanvasRenderingContext2d, node: &Node) {
	let Vec2 { x, y } = node.position;
	let (w, h) = (NODE_WIDTH, NODE_HEIGHT);
	ctx.begin_path();
	match node.shape {
		NodeShape::Rectangle => {
			ctx.rect(x, y, w, h);
		}
		NodeShape::Rounded => {
			let r = CORNER_RADIUS;
			ctx.move_to(x + r, y);
			let _ = ctx.arc_to(x + w, y, x + w, y + h, r);
			let _ = ctx.arc_to(x + w, y + h, x, y + h, r);
			let _ = ctx.arc_to(x, y + h, x, y, r);
			let _ = ctx.arc_to(x, y, x + w, y, r);
			ctx.close_path();
		}
		NodeShape::Ellipse => {
			let _ = ctx.ellipse(
				x + w / 2.0,
				y + h / 2.0,
				w / 2.0,
				h / 2.0,
				0.0,
				0.0,
				2.0 * std::f64::consts::PI,
			);
		}
		NodeShape::Circle => {
			let _ = ctx.arc(
				x + w / 2.0,
				y + h / 2.0,
				h / 2.0,
				0.0,
				2.0 * std::f64::consts::PI,
			);
		}
		NodeShape::Diamond => {
			ctx.move_to(x + w / 2.0, y);
			ctx.line_to(x + w, y + h / 2.0);
			ctx.line_to(x + w / 2.0, y + h);
			ctx.line_to(x, y + h / 2.0);
			ctx.close_path();
		}
	}
}

fn draw_message(state: &FlowGraphState, ctx: &CanvasRenderingContext2d) {
	let Some(message) = &state.message else {
		return;
	};
	ctx.set_fill_style_str(MESSAGE_COLOR);
	ctx.set_font("13px sans-serif");
	ctx.set_text_align("left");
	ctx.set_text_baseline("alphabetic");
	let _ = ctx.fill_text(message, 12.0, 22.0);
}

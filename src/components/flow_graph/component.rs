//! The interactive canvas component: owns the state cell, wires mouse
//! gestures to the sync core, and re-renders on an animation-frame loop.
//!
//! All async outcomes are applied back through the state cell's own
//! update functions; nothing here blocks the interaction thread while a
//! remote write is pending, and a failed write surfaces as a banner
//! message instead of touching edge state.

use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent, WheelEvent, Window};

use super::render;
use super::state::{DropPlan, FlowGraphState};
use crate::graph::build_graph;
use crate::settings::{ResolvedSettings, SettingsValidationResult, resolve_settings};
use crate::source::{ConfigStore, DataSource, Record};
use crate::sync::{SyncCore, SyncError};

type StateCell = Rc<RefCell<Option<FlowGraphState>>>;
type SettingsCell = Rc<RefCell<SettingsValidationResult>>;

/// Query the record set for the current settings and rebuild the visual
/// graph from remote truth, keeping surviving node positions.
fn resync(state: &StateCell, source: &dyn DataSource, resolved: &ResolvedSettings) {
	let Some(query) = resolved.query.as_ref() else {
		return;
	};
	let records = source.query_records(query);
	if let Some(state) = state.borrow_mut().as_mut() {
		state.reconcile(&records, resolved);
	}
}

fn apply_sync_error(state: &StateCell, source: &dyn DataSource, resolved: &ResolvedSettings, err: &SyncError) {
	log::warn!("sync operation failed: {err}");
	if let Some(state) = state.borrow_mut().as_mut() {
		state.set_message(err.to_string());
	}
	// Skipped writes leave remote truth elsewhere; pull it back in so
	// the projection cannot drift.
	if matches!(err, SyncError::PermissionDenied | SyncError::Source(_)) {
		resync(state, source, resolved);
	}
}

/// Persist a drop plan: one disconnect per replaced edge, then the new
/// connection. The confirmed edge is only added once the store accepted
/// the write.
fn spawn_drop_plan(
	state: StateCell,
	sync: Rc<SyncCore>,
	source: Rc<dyn DataSource>,
	settings: SettingsCell,
	plan: DropPlan,
) {
	spawn_local(async move {
		let resolved = settings.borrow().settings.clone();
		let (Some(table), Some(field)) = (resolved.table.clone(), resolved.field.clone()) else {
			return;
		};
		let nodes = match state.borrow().as_ref() {
			Some(state) => state.graph.nodes.clone(),
			None => return,
		};

		for edge in &plan.replaced {
			if let Err(err) = sync.disconnect(edge, &edge.source_record, &field.name, &table).await {
				log::warn!("disconnect of replaced edge {} failed: {err}", edge.id);
			}
		}

		match sync.connect(&nodes, &plan.source, &plan.target, &resolved).await {
			Ok(record) => {
				if let Some(state) = state.borrow_mut().as_mut() {
					state.add_confirmed_edge(&plan.source, &plan.target, resolved.edge_style, record);
				}
			}
			Err(err) => apply_sync_error(&state, source.as_ref(), &resolved, &err),
		}
	});
}

fn spawn_connect(
	state: StateCell,
	sync: Rc<SyncCore>,
	source: Rc<dyn DataSource>,
	settings: SettingsCell,
	pair: (String, String),
) {
	spawn_drop_plan(
		state,
		sync,
		source,
		settings,
		DropPlan {
			source: pair.0,
			target: pair.1,
			replaced: Vec::new(),
		},
	);
}

fn spawn_delete_node(
	state: StateCell,
	sync: Rc<SyncCore>,
	source: Rc<dyn DataSource>,
	settings: SettingsCell,
	record: Record,
) {
	spawn_local(async move {
		let resolved = settings.borrow().settings.clone();
		let Some(table) = resolved.table.clone() else {
			return;
		};
		if let Err(err) = sync.delete_node(&table, &record).await {
			apply_sync_error(&state, source.as_ref(), &resolved, &err);
		}
	});
}

fn spawn_delete_edge(
	state: StateCell,
	sync: Rc<SyncCore>,
	source: Rc<dyn DataSource>,
	settings: SettingsCell,
	edge: crate::graph::Edge,
) {
	spawn_local(async move {
		let resolved = settings.borrow().settings.clone();
		let (Some(table), Some(field)) = (resolved.table.clone(), resolved.field.clone()) else {
			return;
		};
		if let Err(err) = sync.disconnect(&edge, &edge.source_record, &field.name, &table).await {
			apply_sync_error(&state, source.as_ref(), &resolved, &err);
		}
	});
}

fn spawn_create_node(
	state: StateCell,
	sync: Rc<SyncCore>,
	source: Rc<dyn DataSource>,
	settings: SettingsCell,
) {
	spawn_local(async move {
		let resolved = settings.borrow().settings.clone();
		let Some(table) = resolved.table.clone() else {
			return;
		};
		match sync.create_node(&table).await {
			Ok(created) => {
				let record = source
					.record_by_id(&table, &created.id)
					.unwrap_or_else(|| Record::new(created.id.clone(), created.name.clone()));
				if let Some(state) = state.borrow_mut().as_mut() {
					state.add_node(record, &resolved);
				}
			}
			Err(err) => apply_sync_error(&state, source.as_ref(), &resolved, &err),
		}
	});
}

/// Resolve settings, query records, and replace the whole visual graph
/// (initial load and every configuration change).
fn rebuild(
	state: &StateCell,
	settings: &SettingsCell,
	source: &Rc<dyn DataSource>,
	config: &Rc<dyn ConfigStore>,
	settings_visible: RwSignal<bool>,
) {
	let result = resolve_settings(config.as_ref(), source.as_ref());
	settings_visible.set(!result.is_valid);

	let mut graph = crate::graph::FlowGraph::default();
	if result.is_valid {
		if let Some(query) = result.settings.query.as_ref() {
			let records = source.query_records(query);
			graph = build_graph(&records, &result.settings);
		}
	}

	if let Some(state) = state.borrow_mut().as_mut() {
		state.graph = graph;
		state.apply_layout(result.settings.orientation.direction());
		state.message = result.message.clone();
	}
	*settings.borrow_mut() = result;
}

/// Interactive flow-graph canvas over a self-linked record table.
#[component]
pub fn FlowGraphCanvas(
	/// Handle to the record store.
	source: Rc<dyn DataSource>,
	/// Persisted, externally synced configuration.
	config: Rc<dyn ConfigStore>,
	#[prop(default = false)] fullscreen: bool,
	#[prop(default = None)] width: Option<f64>,
	#[prop(default = None)] height: Option<f64>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let state: StateCell = Rc::new(RefCell::new(None));
	let sync = Rc::new(SyncCore::new(source.clone()));
	let settings: SettingsCell = Rc::new(RefCell::new(resolve_settings(
		config.as_ref(),
		source.as_ref(),
	)));
	let settings_visible = RwSignal::new(false);
	let animate: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));

	let (state_init, settings_init, animate_init, resize_cb_init) = (
		state.clone(),
		settings.clone(),
		animate.clone(),
		resize_cb.clone(),
	);
	let (source_init, config_init) = (source.clone(), config.clone());

	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let window: Window = web_sys::window().unwrap();

		let (w, h) = if fullscreen {
			(
				window.inner_width().unwrap().as_f64().unwrap(),
				window.inner_height().unwrap().as_f64().unwrap(),
			)
		} else {
			(
				width.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_width() as f64)
						.unwrap_or(800.0)
				}),
				height.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_height() as f64)
						.unwrap_or(600.0)
				}),
			)
		};
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);

		let ctx: CanvasRenderingContext2d = canvas
			.get_context("2d")
			.unwrap()
			.unwrap()
			.dyn_into()
			.unwrap();

		*state_init.borrow_mut() = Some(FlowGraphState::new(Default::default(), w, h));
		rebuild(
			&state_init,
			&settings_init,
			&source_init,
			&config_init,
			settings_visible,
		);

		// Configuration edits (local or synced from elsewhere) rebuild
		// the graph; record-set changes reconcile it in place.
		let (state_cfg, settings_cfg, source_cfg, config_cfg) = (
			state_init.clone(),
			settings_init.clone(),
			source_init.clone(),
			config_init.clone(),
		);
		config_init.subscribe(Rc::new(move || {
			rebuild(&state_cfg, &settings_cfg, &source_cfg, &config_cfg, settings_visible);
		}));

		let (state_rec, settings_rec, source_rec) = (
			state_init.clone(),
			settings_init.clone(),
			source_init.clone(),
		);
		source_init.subscribe_records(Rc::new(move || {
			let resolved = settings_rec.borrow().settings.clone();
			resync(&state_rec, source_rec.as_ref(), &resolved);
		}));

		if fullscreen {
			let (state_resize, canvas_resize) = (state_init.clone(), canvas.clone());
			*resize_cb_init.borrow_mut() = Some(Closure::new(move || {
				let win: Window = web_sys::window().unwrap();
				let (nw, nh) = (
					win.inner_width().unwrap().as_f64().unwrap(),
					win.inner_height().unwrap().as_f64().unwrap(),
				);
				canvas_resize.set_width(nw as u32);
				canvas_resize.set_height(nh as u32);
				if let Some(ref mut s) = *state_resize.borrow_mut() {
					s.resize(nw, nh);
				}
			}));
			if let Some(ref cb) = *resize_cb_init.borrow() {
				let _ =
					window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}

		let (state_anim, settings_anim, animate_inner) = (
			state_init.clone(),
			settings_init.clone(),
			animate_init.clone(),
		);
		*animate_init.borrow_mut() = Some(Closure::new(move || {
			if let Some(ref s) = *state_anim.borrow() {
				render::render(s, &settings_anim.borrow().settings, &ctx);
			}
			if let Some(ref cb) = *animate_inner.borrow() {
				let _ = web_sys::window()
					.unwrap()
					.request_animation_frame(cb.as_ref().unchecked_ref());
			}
		}));
		if let Some(ref cb) = *animate_init.borrow() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
	});

	let state_md = state.clone();
	let on_mousedown = move |ev: MouseEvent| {
		if ev.button() != 0 {
			return;
		}
		let canvas: HtmlCanvasElement = canvas_ref.get().unwrap().into();
		let rect = canvas.get_bounding_client_rect();
		let (x, y) = (
			ev.client_x() as f64 - rect.left(),
			ev.client_y() as f64 - rect.top(),
		);

		if let Some(ref mut s) = *state_md.borrow_mut() {
			if let Some(source_id) = s.source_port_at_position(x, y) {
				s.begin_connect(&source_id, x, y);
			} else if let Some(node_id) = s.node_at_position(x, y) {
				s.begin_drag(&node_id, x, y);
			} else {
				s.pan.active = true;
				s.pan.start_x = x;
				s.pan.start_y = y;
				s.pan.transform_start_x = s.transform.x;
				s.pan.transform_start_y = s.transform.y;
			}
		}
	};

	let (state_mm, settings_mm) = (state.clone(), settings.clone());
	let on_mousemove = move |ev: MouseEvent| {
		let canvas: HtmlCanvasElement = canvas_ref.get().unwrap().into();
		let rect = canvas.get_bounding_client_rect();
		let (x, y) = (
			ev.client_x() as f64 - rect.left(),
			ev.client_y() as f64 - rect.top(),
		);

		if let Some(ref mut s) = *state_mm.borrow_mut() {
			if s.connect.active {
				s.connect_drag_to(x, y);
			} else if s.drag.active {
				let style = settings_mm.borrow().settings.edge_style;
				s.drag_to(x, y, style);
			} else if s.pan.active {
				s.transform.x = s.pan.transform_start_x + (x - s.pan.start_x);
				s.transform.y = s.pan.transform_start_y + (y - s.pan.start_y);
			}
		}
	};

	let (state_mu, sync_mu, source_mu, settings_mu) = (
		state.clone(),
		sync.clone(),
		source.clone(),
		settings.clone(),
	);
	let on_mouseup = move |ev: MouseEvent| {
		let canvas: HtmlCanvasElement = canvas_ref.get().unwrap().into();
		let rect = canvas.get_bounding_client_rect();
		let (x, y) = (
			ev.client_x() as f64 - rect.left(),
			ev.client_y() as f64 - rect.top(),
		);

		let mut plan = None;
		let mut pair = None;
		if let Some(ref mut s) = *state_mu.borrow_mut() {
			if s.connect.active {
				pair = s.end_connect(x, y);
			} else if s.drag.active {
				plan = s.end_drag();
			}
			s.pan.active = false;
		}
		if let Some(plan) = plan {
			spawn_drop_plan(
				state_mu.clone(),
				sync_mu.clone(),
				source_mu.clone(),
				settings_mu.clone(),
				plan,
			);
		}
		if let Some(pair) = pair {
			spawn_connect(
				state_mu.clone(),
				sync_mu.clone(),
				source_mu.clone(),
				settings_mu.clone(),
				pair,
			);
		}
	};

	let state_ml = state.clone();
	let on_mouseleave = move |_: MouseEvent| {
		if let Some(ref mut s) = *state_ml.borrow_mut() {
			s.clear_provisional();
			s.drag = Default::default();
			s.connect = Default::default();
			s.pan.active = false;
		}
	};

	let state_wh = state.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let canvas: HtmlCanvasElement = canvas_ref.get().unwrap().into();
		let rect = canvas.get_bounding_client_rect();
		let (x, y) = (
			ev.client_x() as f64 - rect.left(),
			ev.client_y() as f64 - rect.top(),
		);

		if let Some(ref mut s) = *state_wh.borrow_mut() {
			let factor = if ev.delta_y() > 0.0 { 0.9 } else { 1.1 };
			let new_k = (s.transform.k * factor).clamp(0.1, 10.0);
			let ratio = new_k / s.transform.k;
			s.transform.x = x - (x - s.transform.x) * ratio;
			s.transform.y = y - (y - s.transform.y) * ratio;
			s.transform.k = new_k;
		}
	};

	// Right-click deletes: a node together with every edge touching it,
	// or a single edge.
	let (state_cm, sync_cm, source_cm, settings_cm) = (
		state.clone(),
		sync.clone(),
		source.clone(),
		settings.clone(),
	);
	let on_contextmenu = move |ev: MouseEvent| {
		ev.prevent_default();
		let canvas: HtmlCanvasElement = canvas_ref.get().unwrap().into();
		let rect = canvas.get_bounding_client_rect();
		let (x, y) = (
			ev.client_x() as f64 - rect.left(),
			ev.client_y() as f64 - rect.top(),
		);

		let mut deleted_node = None;
		let mut deleted_edge = None;
		if let Some(ref mut s) = *state_cm.borrow_mut() {
			if let Some(node_id) = s.node_at_position(x, y) {
				deleted_node = s.remove_node(&node_id);
			} else {
				let link_style = settings_cm.borrow().settings.link_style;
				if let Some(edge_id) = s.edge_at_position(x, y, link_style) {
					deleted_edge = s.remove_edge(&edge_id);
				}
			}
		}
		if let Some(node) = deleted_node {
			spawn_delete_node(
				state_cm.clone(),
				sync_cm.clone(),
				source_cm.clone(),
				settings_cm.clone(),
				node.record,
			);
		}
		if let Some(edge) = deleted_edge {
			spawn_delete_edge(
				state_cm.clone(),
				sync_cm.clone(),
				source_cm.clone(),
				settings_cm.clone(),
				edge,
			);
		}
	};

	let state_layout = state.clone();
	let on_vertical = move |_| {
		if let Some(ref mut s) = *state_layout.borrow_mut() {
			s.apply_layout(crate::layout::Direction::TopToBottom);
		}
	};
	let state_layout_h = state.clone();
	let on_horizontal = move |_| {
		if let Some(ref mut s) = *state_layout_h.borrow_mut() {
			s.apply_layout(crate::layout::Direction::LeftToRight);
		}
	};

	let (state_add, sync_add, source_add, settings_add) = (state.clone(), sync, source, settings.clone());
	let on_add = move |_| {
		spawn_create_node(
			state_add.clone(),
			sync_add.clone(),
			source_add.clone(),
			settings_add.clone(),
		);
	};

	let settings_msg = settings.clone();
	view! {
		<div class="flow-graph" style="position: relative; width: 100%; height: 100%;">
			<canvas
				node_ref=canvas_ref
				class="flow-graph-canvas"
				on:mousedown=on_mousedown
				on:mousemove=on_mousemove
				on:mouseup=on_mouseup
				on:mouseleave=on_mouseleave
				on:wheel=on_wheel
				on:contextmenu=on_contextmenu
				style="display: block; cursor: grab;"
			/>
			<div class="flow-graph-controls" style="position: absolute; right: 10px; bottom: 10px;">
				<button on:click=on_vertical>"vertical layout"</button>
				<button on:click=on_horizontal>"horizontal layout"</button>
				<button on:click=on_add>"add record"</button>
			</div>
			{move || {
				settings_visible.get().then(|| {
					let message = settings_msg
						.borrow()
						.message
						.clone()
						.unwrap_or_default();
					view! {
						<div
							class="flow-graph-settings"
							style="position: absolute; top: 0; right: 0; width: 300px; padding: 16px; background: white; border-left: 1px solid #ddd;"
						>
							<h2>"Settings"</h2>
							<p>{message}</p>
							<p class="hint">
								"Choose a table, a view, and a linked record field that links back to the same table."
							</p>
						</div>
					}
				})
			}}
		</div>
	}
}

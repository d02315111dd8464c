use std::rc::Rc;

use leptos::prelude::*;

use crate::components::flow_graph::FlowGraphCanvas;
use crate::settings::ConfigKey;
use crate::source::{
	CellValue, ConfigStore, DataSource, FieldKind, FieldMeta, LinkRef, MemoryBase, MemoryConfig,
	MemoryTable, Record, TableMeta, ViewMeta,
};

/// Seed a small self-linked "Actions" table: a review workflow whose
/// `Next` field links each step to its successors.
fn sample_base() -> MemoryBase {
	let link = |targets: &[(&str, &str)]| {
		CellValue::Links(
			targets
				.iter()
				.map(|(id, name)| LinkRef::new(*id, *name))
				.collect(),
		)
	};

	MemoryBase::new().with_table(MemoryTable {
		meta: TableMeta {
			id: "tblActions".into(),
			name: "Actions".into(),
			primary_field: "Name".into(),
		},
		views: vec![ViewMeta {
			id: "viwAll".into(),
			name: "All actions".into(),
		}],
		fields: vec![FieldMeta {
			id: "fldNext".into(),
			name: "Next".into(),
			kind: FieldKind::MultiLink {
				linked_table_id: "tblActions".into(),
			},
		}],
		records: vec![
			Record::new("recIntake", "Intake")
				.with_cell("Next", link(&[("recReview", "Review")])),
			Record::new("recReview", "Review").with_cell(
				"Next",
				link(&[("recApprove", "Approve"), ("recReject", "Reject")]),
			),
			Record::new("recApprove", "Approve")
				.with_cell("Next", link(&[("recPublish", "Publish")])),
			Record::new("recReject", "Reject"),
			Record::new("recPublish", "Publish"),
		],
	})
}

fn sample_config() -> MemoryConfig {
	let config = MemoryConfig::new();
	config.set(ConfigKey::TableId.as_str(), "tblActions");
	config.set(ConfigKey::ViewId.as_str(), "viwAll");
	config.set(ConfigKey::FieldId.as_str(), "fldNext");
	config
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let source: Rc<dyn DataSource> = Rc::new(sample_base());
	let config: Rc<dyn ConfigStore> = Rc::new(sample_config());

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="fullscreen-graph">
				<FlowGraphCanvas source=source config=config fullscreen=true />
				<div class="graph-overlay">
					<h1>"Linked Record Flow"</h1>
					<p class="subtitle">
						"Drag a record near another to link them. Drag from a port to connect explicitly. Right-click removes a record or a link."
					</p>
				</div>
			</div>
		</ErrorBoundary>
	}
}

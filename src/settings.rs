//! Settings resolution and validation.
//!
//! Reads persisted raw configuration from the [`ConfigStore`], resolves the
//! stored ids against the live data source, and validates that the chosen
//! link field is a legal same-table multi-link field. Pure read + resolve:
//! nothing here fetches records or writes config.

use crate::layout::Direction;
use crate::source::{ConfigStore, DataSource, FieldKind, FieldMeta, RecordQuery, TableMeta, ViewMeta};

/// Keys under which configuration is persisted in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
	TableId,
	ViewId,
	FieldId,
	Orientation,
	LinkStyle,
	NodeShape,
	EdgeStyle,
}

impl ConfigKey {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::TableId => "tableId",
			Self::ViewId => "viewId",
			Self::FieldId => "fieldId",
			Self::Orientation => "chartOrientation",
			Self::LinkStyle => "linkStyle",
			Self::NodeShape => "recordShape",
			Self::EdgeStyle => "edgeType",
		}
	}
}

/// Which way the auto-layout flows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
	#[default]
	Vertical,
	Horizontal,
}

impl Orientation {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Vertical => "vertical",
			Self::Horizontal => "horizontal",
		}
	}

	fn parse(raw: Option<String>) -> Self {
		match raw.as_deref() {
			Some("horizontal") => Self::Horizontal,
			_ => Self::default(),
		}
	}

	pub fn direction(self) -> Direction {
		match self {
			Self::Vertical => Direction::TopToBottom,
			Self::Horizontal => Direction::LeftToRight,
		}
	}
}

/// How edges are routed between ports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkStyle {
	#[default]
	RightAngles,
	StraightLines,
}

impl LinkStyle {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::RightAngles => "rightAngles",
			Self::StraightLines => "straightLines",
		}
	}

	fn parse(raw: Option<String>) -> Self {
		match raw.as_deref() {
			Some("straightLines") => Self::StraightLines,
			_ => Self::default(),
		}
	}
}

/// Outline drawn for each record node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeShape {
	#[default]
	Rounded,
	Rectangle,
	Ellipse,
	Circle,
	Diamond,
}

impl NodeShape {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Rounded => "rounded",
			Self::Rectangle => "rectangle",
			Self::Ellipse => "ellipse",
			Self::Circle => "circle",
			Self::Diamond => "diamond",
		}
	}

	fn parse(raw: Option<String>) -> Self {
		match raw.as_deref() {
			Some("rectangle") => Self::Rectangle,
			Some("ellipse") => Self::Ellipse,
			Some("circle") => Self::Circle,
			Some("diamond") => Self::Diamond,
			_ => Self::default(),
		}
	}
}

/// Rendering style of confirmed edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EdgeStyle {
	#[default]
	Default,
	Step,
	SmoothStep,
	Straight,
}

impl EdgeStyle {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Default => "default",
			Self::Step => "step",
			Self::SmoothStep => "smoothstep",
			Self::Straight => "straight",
		}
	}

	fn parse(raw: Option<String>) -> Self {
		match raw.as_deref() {
			Some("step") => Self::Step,
			Some("smoothstep") => Self::SmoothStep,
			Some("straight") => Self::Straight,
			_ => Self::default(),
		}
	}
}

/// The resolved settings bundle. Identifier fields resolve to `None` when
/// the stored id no longer exists; style fields always carry a value
/// (documented defaults fill the gaps).
#[derive(Clone, Debug)]
pub struct ResolvedSettings {
	pub table: Option<TableMeta>,
	pub view: Option<ViewMeta>,
	pub field: Option<FieldMeta>,
	/// Present once table, view, and field all resolved.
	pub query: Option<RecordQuery>,
	pub orientation: Orientation,
	pub link_style: LinkStyle,
	pub node_shape: NodeShape,
	pub edge_style: EdgeStyle,
}

impl ResolvedSettings {
	/// Name of the link field, once resolved.
	pub fn link_field_name(&self) -> Option<&str> {
		self.field.as_ref().map(|f| f.name.as_str())
	}
}

/// Outcome of resolving and validating the persisted configuration.
#[derive(Clone, Debug)]
pub struct SettingsValidationResult {
	pub is_valid: bool,
	/// Human-readable reason when invalid.
	pub message: Option<String>,
	pub settings: ResolvedSettings,
}

/// Resolve the persisted configuration against the live source and
/// validate it. Dangling ids resolve silently to `None`; the result is
/// never an error.
pub fn resolve_settings(config: &dyn ConfigStore, source: &dyn DataSource) -> SettingsValidationResult {
	let table = config
		.get(ConfigKey::TableId.as_str())
		.and_then(|id| source.table_by_id(&id));
	let view = table.as_ref().and_then(|table| {
		config
			.get(ConfigKey::ViewId.as_str())
			.and_then(|id| source.view_by_id(table, &id))
	});
	let field = table.as_ref().and_then(|table| {
		config
			.get(ConfigKey::FieldId.as_str())
			.and_then(|id| source.field_by_id(table, &id))
	});

	let query = match (&table, &view, &field) {
		(Some(table), Some(view), Some(field)) => Some(RecordQuery {
			table_id: table.id.clone(),
			view_id: view.id.clone(),
			fields: vec![table.primary_field.clone(), field.name.clone()],
		}),
		_ => None,
	};

	let settings = ResolvedSettings {
		table,
		view,
		field,
		query,
		orientation: Orientation::parse(config.get(ConfigKey::Orientation.as_str())),
		link_style: LinkStyle::parse(config.get(ConfigKey::LinkStyle.as_str())),
		node_shape: NodeShape::parse(config.get(ConfigKey::NodeShape.as_str())),
		edge_style: EdgeStyle::parse(config.get(ConfigKey::EdgeStyle.as_str())),
	};
	validate(settings)
}

fn validate(settings: ResolvedSettings) -> SettingsValidationResult {
	let message = match (&settings.query, &settings.table, &settings.field) {
		(Some(_), Some(table), Some(field)) => match &field.kind {
			FieldKind::MultiLink { linked_table_id } if *linked_table_id == table.id => None,
			FieldKind::MultiLink { .. } => Some("Linked record field must be linked to same table"),
			_ => Some("Select a linked record field"),
		},
		_ => Some("Pick a table, view, and linked record field"),
	};

	SettingsValidationResult {
		is_valid: message.is_none(),
		message: message.map(Into::into),
		settings,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::source::{MemoryBase, MemoryConfig, MemoryTable};

	fn base_with_field(kind: FieldKind) -> MemoryBase {
		MemoryBase::new().with_table(MemoryTable {
			meta: TableMeta {
				id: "tbl1".into(),
				name: "Actions".into(),
				primary_field: "Name".into(),
			},
			views: vec![ViewMeta {
				id: "viw1".into(),
				name: "All actions".into(),
			}],
			fields: vec![FieldMeta {
				id: "fld1".into(),
				name: "Next".into(),
				kind,
			}],
			records: Vec::new(),
		})
	}

	fn full_config() -> MemoryConfig {
		let config = MemoryConfig::new();
		config.set(ConfigKey::TableId.as_str(), "tbl1");
		config.set(ConfigKey::ViewId.as_str(), "viw1");
		config.set(ConfigKey::FieldId.as_str(), "fld1");
		config
	}

	#[test]
	fn missing_table_selection_is_invalid() {
		let base = base_with_field(FieldKind::MultiLink {
			linked_table_id: "tbl1".into(),
		});
		let config = MemoryConfig::new();

		let result = resolve_settings(&config, &base);
		assert!(!result.is_valid);
		assert_eq!(
			result.message.as_deref(),
			Some("Pick a table, view, and linked record field")
		);
	}

	#[test]
	fn dangling_table_id_resolves_to_none() {
		let base = base_with_field(FieldKind::MultiLink {
			linked_table_id: "tbl1".into(),
		});
		let config = full_config();
		config.set(ConfigKey::TableId.as_str(), "tblDeleted");

		let result = resolve_settings(&config, &base);
		assert!(!result.is_valid);
		assert!(result.settings.table.is_none());
		assert!(result.settings.query.is_none());
	}

	#[test]
	fn non_link_field_is_invalid() {
		let base = base_with_field(FieldKind::Text);
		let config = full_config();

		let result = resolve_settings(&config, &base);
		assert!(!result.is_valid);
		assert_eq!(result.message.as_deref(), Some("Select a linked record field"));
	}

	#[test]
	fn field_linking_elsewhere_is_invalid() {
		let base = base_with_field(FieldKind::MultiLink {
			linked_table_id: "tblOther".into(),
		});
		let config = full_config();

		let result = resolve_settings(&config, &base);
		assert!(!result.is_valid);
		assert_eq!(
			result.message.as_deref(),
			Some("Linked record field must be linked to same table")
		);
	}

	#[test]
	fn self_linked_field_is_valid() {
		let base = base_with_field(FieldKind::MultiLink {
			linked_table_id: "tbl1".into(),
		});
		let config = full_config();

		let result = resolve_settings(&config, &base);
		assert!(result.is_valid);
		assert!(result.message.is_none());

		let query = result.settings.query.expect("valid settings carry a query");
		assert_eq!(query.fields, vec!["Name".to_string(), "Next".to_string()]);
	}

	#[test]
	fn missing_style_keys_fall_back_to_defaults() {
		let base = base_with_field(FieldKind::MultiLink {
			linked_table_id: "tbl1".into(),
		});
		let config = full_config();

		let settings = resolve_settings(&config, &base).settings;
		assert_eq!(settings.orientation, Orientation::Vertical);
		assert_eq!(settings.link_style, LinkStyle::RightAngles);
		assert_eq!(settings.node_shape, NodeShape::Rounded);
		assert_eq!(settings.edge_style, EdgeStyle::Default);
	}

	#[test]
	fn stored_style_keys_round_trip() {
		let base = base_with_field(FieldKind::MultiLink {
			linked_table_id: "tbl1".into(),
		});
		let config = full_config();
		config.set(ConfigKey::Orientation.as_str(), Orientation::Horizontal.as_str());
		config.set(ConfigKey::EdgeStyle.as_str(), EdgeStyle::SmoothStep.as_str());
		config.set(ConfigKey::NodeShape.as_str(), NodeShape::Diamond.as_str());

		let settings = resolve_settings(&config, &base).settings;
		assert_eq!(settings.orientation, Orientation::Horizontal);
		assert_eq!(settings.edge_style, EdgeStyle::SmoothStep);
		assert_eq!(settings.node_shape, NodeShape::Diamond);
	}
}

//! Shared fixtures for the unit tests: a one-table self-linked base and
//! the resolved settings that select it.

use crate::settings::{EdgeStyle, LinkStyle, NodeShape, Orientation, ResolvedSettings};
use crate::source::{
	CellValue, FieldKind, FieldMeta, LinkRef, MemoryBase, MemoryTable, Record, RecordQuery,
	TableMeta, ViewMeta,
};

pub(crate) fn table_meta() -> TableMeta {
	TableMeta {
		id: "tbl1".into(),
		name: "Actions".into(),
		primary_field: "Name".into(),
	}
}

pub(crate) fn link_field() -> FieldMeta {
	FieldMeta {
		id: "fld1".into(),
		name: "Next".into(),
		kind: FieldKind::MultiLink {
			linked_table_id: "tbl1".into(),
		},
	}
}

pub(crate) fn valid_settings() -> ResolvedSettings {
	ResolvedSettings {
		table: Some(table_meta()),
		view: Some(ViewMeta {
			id: "viw1".into(),
			name: "All actions".into(),
		}),
		field: Some(link_field()),
		query: Some(RecordQuery {
			table_id: "tbl1".into(),
			view_id: "viw1".into(),
			fields: vec!["Name".into(), "Next".into()],
		}),
		orientation: Orientation::Vertical,
		link_style: LinkStyle::RightAngles,
		node_shape: NodeShape::Rounded,
		edge_style: EdgeStyle::Default,
	}
}

/// A record whose link field points at `targets` ((id, name) pairs).
pub(crate) fn linked_record(id: &str, name: &str, targets: &[(&str, &str)]) -> Record {
	Record::new(id, name).with_cell(
		"Next",
		CellValue::Links(
			targets
				.iter()
				.map(|(id, name)| LinkRef::new(*id, *name))
				.collect(),
		),
	)
}

/// A base holding the fixture table seeded with `records`.
pub(crate) fn base_with_records(records: Vec<Record>) -> MemoryBase {
	MemoryBase::new().with_table(MemoryTable {
		meta: table_meta(),
		views: vec![ViewMeta {
			id: "viw1".into(),
			name: "All actions".into(),
		}],
		fields: vec![link_field()],
		records,
	})
}

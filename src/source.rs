//! Capability contract over the remote record store, plus the in-memory
//! adapter backing the demo page and the test suite.
//!
//! The remote store is the single source of truth for link existence. The
//! rest of the crate only ever sees [`Record`] snapshots and talks to the
//! store through [`DataSource`]; swapping in a real backend means
//! implementing that trait (reads are synchronous against the adapter's
//! cache, writes are async and independently fallible).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use thiserror::Error;

/// Stable identity of a record, assigned by the store and never reused.
pub type RecordId = String;

/// One entry of a link-field cell: a reference to another record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRef {
	pub id: RecordId,
	pub name: String,
}

impl LinkRef {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
		}
	}
}

/// A field value as read from a record cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellValue {
	Text(String),
	Links(Vec<LinkRef>),
}

/// Snapshot of a remote record: stable id, display name, cell values by
/// field name. The store owns the live entity; snapshots go stale the
/// moment a mutation lands.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
	pub id: RecordId,
	pub name: String,
	cells: HashMap<String, CellValue>,
}

impl Record {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			cells: HashMap::new(),
		}
	}

	/// Builder-style cell assignment, used when seeding adapters.
	pub fn with_cell(mut self, field: impl Into<String>, value: CellValue) -> Self {
		self.cells.insert(field.into(), value);
		self
	}

	pub fn cell(&self, field: &str) -> Option<&CellValue> {
		self.cells.get(field)
	}

	/// The link-field cell read as a list of references. An absent cell or
	/// a non-link cell reads as the empty list.
	pub fn linked_records(&self, field: &str) -> Vec<LinkRef> {
		match self.cells.get(field) {
			Some(CellValue::Links(links)) => links.clone(),
			_ => Vec::new(),
		}
	}

	fn set_cell(&mut self, field: &str, value: CellValue) {
		self.cells.insert(field.to_string(), value);
	}
}

/// Resolved table metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableMeta {
	pub id: String,
	pub name: String,
	/// Name of the primary (display name) field.
	pub primary_field: String,
}

/// Resolved view metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewMeta {
	pub id: String,
	pub name: String,
}

/// What kind of values a field holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
	/// A list of references to records in `linked_table_id`.
	MultiLink { linked_table_id: String },
	Text,
}

/// Resolved field metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMeta {
	pub id: String,
	pub name: String,
	pub kind: FieldKind,
}

/// A records query: one view, restricted to a field-name subset.
///
/// Built by the settings resolver and executed by the canvas, so the
/// resolver itself stays a pure read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordQuery {
	pub table_id: String,
	pub view_id: String,
	pub fields: Vec<String>,
}

/// Failures surfaced by the store adapter. All of them are non-fatal to
/// the session; callers convert them to a message.
#[derive(Debug, Error)]
pub enum SourceError {
	#[error("record {0} does not exist")]
	RecordNotFound(RecordId),
	#[error("table {0} does not exist")]
	TableNotFound(String),
	#[error("write rejected by store: {0}")]
	WriteRejected(String),
}

/// Capability set consumed from the data-source collaborator.
///
/// Resolution calls are nullable on miss (a deleted table or field must
/// not crash the canvas); mutating calls are async and independently
/// fallible.
#[async_trait(?Send)]
pub trait DataSource {
	fn table_by_id(&self, id: &str) -> Option<TableMeta>;
	fn view_by_id(&self, table: &TableMeta, id: &str) -> Option<ViewMeta>;
	fn field_by_id(&self, table: &TableMeta, id: &str) -> Option<FieldMeta>;

	/// Fresh snapshot of one record, `None` once it has been deleted.
	fn record_by_id(&self, table: &TableMeta, id: &str) -> Option<Record>;

	/// Snapshot of a view's records, cells restricted to `query.fields`.
	fn query_records(&self, query: &RecordQuery) -> Vec<Record>;

	/// Register a callback fired after every record-set change.
	fn subscribe_records(&self, listener: Rc<dyn Fn()>);

	fn can_update_record(&self, table: &TableMeta, record: &Record) -> bool;
	fn can_create_record(&self, table: &TableMeta) -> bool;
	fn can_delete_record(&self, table: &TableMeta, record: &Record) -> bool;

	async fn update_record(
		&self,
		table: &TableMeta,
		record: &RecordId,
		field: &str,
		value: CellValue,
	) -> Result<(), SourceError>;

	/// Create a record with the given display name, returning its id.
	async fn create_record(&self, table: &TableMeta, name: &str) -> Result<RecordId, SourceError>;

	async fn delete_record(&self, table: &TableMeta, record: &RecordId) -> Result<(), SourceError>;
}

/// Persisted key-value settings store, externally synced across
/// collaborators. Injected into the settings resolver rather than read as
/// ambient state.
pub trait ConfigStore {
	fn get(&self, key: &str) -> Option<String>;
	fn set(&self, key: &str, value: &str);
	/// Register a callback fired after every `set`, local or synced.
	fn subscribe(&self, listener: Rc<dyn Fn()>);
}

/// One table held by [`MemoryBase`].
#[derive(Clone, Debug)]
pub struct MemoryTable {
	pub meta: TableMeta,
	pub views: Vec<ViewMeta>,
	pub fields: Vec<FieldMeta>,
	pub records: Vec<Record>,
}

/// Which write permissions the adapter grants. Defaults to all.
#[derive(Clone, Copy, Debug)]
struct Permissions {
	update: bool,
	create: bool,
	delete: bool,
}

impl Default for Permissions {
	fn default() -> Self {
		Self {
			update: true,
			create: true,
			delete: true,
		}
	}
}

/// A mutating call the adapter has served, kept so tests can assert exact
/// remote-call counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationCall {
	Update { record: RecordId, field: String },
	Create { record: RecordId },
	Delete { record: RecordId },
}

/// In-memory [`DataSource`] adapter.
#[derive(Default)]
pub struct MemoryBase {
	tables: RefCell<Vec<MemoryTable>>,
	permissions: RefCell<Permissions>,
	calls: RefCell<Vec<MutationCall>>,
	listeners: RefCell<Vec<Rc<dyn Fn()>>>,
	next_id: RefCell<u32>,
}

impl MemoryBase {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_table(self, table: MemoryTable) -> Self {
		self.tables.borrow_mut().push(table);
		self
	}

	pub fn deny_updates(&self) {
		self.permissions.borrow_mut().update = false;
	}

	pub fn deny_creates(&self) {
		self.permissions.borrow_mut().create = false;
	}

	pub fn deny_deletes(&self) {
		self.permissions.borrow_mut().delete = false;
	}

	/// Every mutating call served so far, in order.
	pub fn calls(&self) -> Vec<MutationCall> {
		self.calls.borrow().clone()
	}

	pub fn update_call_count(&self) -> usize {
		self.calls
			.borrow()
			.iter()
			.filter(|c| matches!(c, MutationCall::Update { .. }))
			.count()
	}

	fn notify(&self) {
		let listeners = self.listeners.borrow().clone();
		for listener in listeners {
			listener();
		}
	}

	fn fresh_id(&self) -> RecordId {
		let mut next = self.next_id.borrow_mut();
		*next += 1;
		format!("recNew{next:04}")
	}
}

#[async_trait(?Send)]
impl DataSource for MemoryBase {
	fn table_by_id(&self, id: &str) -> Option<TableMeta> {
		self.tables
			.borrow()
			.iter()
			.find(|t| t.meta.id == id)
			.map(|t| t.meta.clone())
	}

	fn view_by_id(&self, table: &TableMeta, id: &str) -> Option<ViewMeta> {
		self.tables
			.borrow()
			.iter()
			.find(|t| t.meta.id == table.id)
			.and_then(|t| t.views.iter().find(|v| v.id == id).cloned())
	}

	fn field_by_id(&self, table: &TableMeta, id: &str) -> Option<FieldMeta> {
		self.tables
			.borrow()
			.iter()
			.find(|t| t.meta.id == table.id)
			.and_then(|t| t.fields.iter().find(|f| f.id == id).cloned())
	}

	fn record_by_id(&self, table: &TableMeta, id: &str) -> Option<Record> {
		self.tables
			.borrow()
			.iter()
			.find(|t| t.meta.id == table.id)
			.and_then(|t| t.records.iter().find(|r| r.id == id).cloned())
	}

	fn query_records(&self, query: &RecordQuery) -> Vec<Record> {
		let tables = self.tables.borrow();
		let Some(table) = tables
			.iter()
			.find(|t| t.meta.id == query.table_id && t.views.iter().any(|v| v.id == query.view_id))
		else {
			return Vec::new();
		};

		table
			.records
			.iter()
			.map(|record| {
				let mut restricted = Record::new(record.id.clone(), record.name.clone());
				for field in &query.fields {
					if let Some(value) = record.cell(field) {
						restricted.set_cell(field, value.clone());
					}
				}
				restricted
			})
			.collect()
	}

	fn subscribe_records(&self, listener: Rc<dyn Fn()>) {
		self.listeners.borrow_mut().push(listener);
	}

	fn can_update_record(&self, _table: &TableMeta, _record: &Record) -> bool {
		self.permissions.borrow().update
	}

	fn can_create_record(&self, _table: &TableMeta) -> bool {
		self.permissions.borrow().create
	}

	fn can_delete_record(&self, _table: &TableMeta, _record: &Record) -> bool {
		self.permissions.borrow().delete
	}

	async fn update_record(
		&self,
		table: &TableMeta,
		record: &RecordId,
		field: &str,
		value: CellValue,
	) -> Result<(), SourceError> {
		{
			let mut tables = self.tables.borrow_mut();
			let table = tables
				.iter_mut()
				.find(|t| t.meta.id == table.id)
				.ok_or_else(|| SourceError::TableNotFound(table.id.clone()))?;
			let stored = table
				.records
				.iter_mut()
				.find(|r| r.id == *record)
				.ok_or_else(|| SourceError::RecordNotFound(record.clone()))?;
			stored.set_cell(field, value);
			self.calls.borrow_mut().push(MutationCall::Update {
				record: record.clone(),
				field: field.to_string(),
			});
		}
		self.notify();
		Ok(())
	}

	async fn create_record(&self, table: &TableMeta, name: &str) -> Result<RecordId, SourceError> {
		let id = self.fresh_id();
		{
			let mut tables = self.tables.borrow_mut();
			let table = tables
				.iter_mut()
				.find(|t| t.meta.id == table.id)
				.ok_or_else(|| SourceError::TableNotFound(table.id.clone()))?;
			table.records.push(Record::new(id.clone(), name));
			self.calls
				.borrow_mut()
				.push(MutationCall::Create { record: id.clone() });
		}
		self.notify();
		Ok(id)
	}

	async fn delete_record(&self, table: &TableMeta, record: &RecordId) -> Result<(), SourceError> {
		{
			let mut tables = self.tables.borrow_mut();
			let table = tables
				.iter_mut()
				.find(|t| t.meta.id == table.id)
				.ok_or_else(|| SourceError::TableNotFound(table.id.clone()))?;
			let before = table.records.len();
			table.records.retain(|r| r.id != *record);
			if table.records.len() == before {
				return Err(SourceError::RecordNotFound(record.clone()));
			}

			// The store drops references to a deleted record from every
			// link cell in the table.
			for stored in &mut table.records {
				let scrubbed: Vec<(String, CellValue)> = stored
					.cells
					.iter()
					.filter_map(|(field, value)| match value {
						CellValue::Links(links) if links.iter().any(|l| l.id == *record) => {
							let kept: Vec<LinkRef> =
								links.iter().filter(|l| l.id != *record).cloned().collect();
							Some((field.clone(), CellValue::Links(kept)))
						}
						_ => None,
					})
					.collect();
				for (field, value) in scrubbed {
					stored.set_cell(&field, value);
				}
			}
			self.calls
				.borrow_mut()
				.push(MutationCall::Delete { record: record.clone() });
		}
		self.notify();
		Ok(())
	}
}

/// In-memory [`ConfigStore`].
#[derive(Default)]
pub struct MemoryConfig {
	values: RefCell<HashMap<String, String>>,
	listeners: RefCell<Vec<Rc<dyn Fn()>>>,
}

impl MemoryConfig {
	pub fn new() -> Self {
		Self::default()
	}
}

impl ConfigStore for MemoryConfig {
	fn get(&self, key: &str) -> Option<String> {
		self.values.borrow().get(key).cloned()
	}

	fn set(&self, key: &str, value: &str) {
		self.values
			.borrow_mut()
			.insert(key.to_string(), value.to_string());
		let listeners = self.listeners.borrow().clone();
		for listener in listeners {
			listener();
		}
	}

	fn subscribe(&self, listener: Rc<dyn Fn()>) {
		self.listeners.borrow_mut().push(listener);
	}
}

//! Reconciles graph-editing gestures with the remote store.
//!
//! Every mutating gesture goes through a guarded create/delete protocol:
//! duplicate links are rejected before a write is issued, writes require
//! the corresponding permission, and a (source, target) pair with a write
//! still in flight refuses a second one. The core always re-reads the
//! source record before deciding, so stale node snapshots cannot
//! double-link. It returns data only; applying results to visual state is
//! the canvas's job.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use thiserror::Error;

use crate::graph::{Edge, Node};
use crate::settings::ResolvedSettings;
use crate::source::{CellValue, DataSource, LinkRef, Record, SourceError, TableMeta};

/// Display name given to records created from the canvas.
pub const DEFAULT_NODE_NAME: &str = "New Node";

/// Why a sync operation did not apply. All variants are non-fatal; the
/// canvas converts them to a status message (and re-queries after
/// `PermissionDenied` so visual state cannot drift from remote state).
#[derive(Debug, Error)]
pub enum SyncError {
	#[error("records are already linked")]
	DuplicateLink,
	#[error("a write for this connection is still in flight")]
	InFlight,
	#[error("you don't have permission to change this table")]
	PermissionDenied,
	#[error("record no longer exists")]
	StaleReference,
	#[error(transparent)]
	Source(#[from] SourceError),
}

/// The stateful sync core. Holds the store handle and the in-flight
/// connection guard; owns no visual state.
pub struct SyncCore {
	source: Rc<dyn DataSource>,
	in_flight: RefCell<HashSet<(String, String)>>,
}

impl SyncCore {
	pub fn new(source: Rc<dyn DataSource>) -> Self {
		Self {
			source,
			in_flight: RefCell::new(HashSet::new()),
		}
	}

	/// Persist a new link from `source_id`'s record to `target_id`'s.
	///
	/// Looks up both nodes' backing records, re-reads the source record
	/// from the store, and appends the target to its link list unless it
	/// is already present. Returns the (pre-append) source record for
	/// caller-side edge annotation. A second identical request fails with
	/// [`SyncError::DuplicateLink`] (or [`SyncError::InFlight`] while the
	/// first is still pending) rather than double-linking.
	pub async fn connect(
		&self,
		nodes: &[Node],
		source_id: &str,
		target_id: &str,
		settings: &ResolvedSettings,
	) -> Result<Record, SyncError> {
		let pair = (source_id.to_string(), target_id.to_string());
		if !self.in_flight.borrow_mut().insert(pair.clone()) {
			return Err(SyncError::InFlight);
		}
		let result = self.connect_inner(nodes, source_id, target_id, settings).await;
		self.in_flight.borrow_mut().remove(&pair);
		result
	}

	async fn connect_inner(
		&self,
		nodes: &[Node],
		source_id: &str,
		target_id: &str,
		settings: &ResolvedSettings,
	) -> Result<Record, SyncError> {
		let (Some(table), Some(field)) = (settings.table.as_ref(), settings.field.as_ref()) else {
			return Err(SyncError::StaleReference);
		};
		let source_node = nodes
			.iter()
			.find(|n| n.id == source_id)
			.ok_or(SyncError::StaleReference)?;
		let target_node = nodes
			.iter()
			.find(|n| n.id == target_id)
			.ok_or(SyncError::StaleReference)?;

		// The node snapshots may predate other edits; decide on a fresh read.
		let source_record = self
			.source
			.record_by_id(table, &source_node.id)
			.ok_or(SyncError::StaleReference)?;
		let target_record = self
			.source
			.record_by_id(table, &target_node.id)
			.ok_or(SyncError::StaleReference)?;

		let mut links = source_record.linked_records(&field.name);
		if links.iter().any(|link| link.id == target_record.id) {
			return Err(SyncError::DuplicateLink);
		}
		if !self.source.can_update_record(table, &source_record) {
			return Err(SyncError::PermissionDenied);
		}

		links.push(LinkRef::new(target_record.id.clone(), target_record.name.clone()));
		self.source
			.update_record(table, &source_record.id, &field.name, CellValue::Links(links))
			.await?;
		Ok(source_record)
	}

	/// Remove `edge`'s target from its source record's link list.
	///
	/// A disconnect against a record whose link list no longer contains
	/// the target, or whose record is gone entirely, is a no-op.
	pub async fn disconnect(
		&self,
		edge: &Edge,
		source_record: &Record,
		link_field: &str,
		table: &TableMeta,
	) -> Result<(), SyncError> {
		let Some(current) = self.source.record_by_id(table, &source_record.id) else {
			return Ok(());
		};
		let links = current.linked_records(link_field);
		let kept: Vec<LinkRef> = links
			.iter()
			.filter(|link| link.id != edge.target)
			.cloned()
			.collect();
		if kept.len() == links.len() {
			return Ok(());
		}
		if !self.source.can_update_record(table, &current) {
			return Err(SyncError::PermissionDenied);
		}
		self.source
			.update_record(table, &current.id, link_field, CellValue::Links(kept))
			.await?;
		Ok(())
	}

	/// Delete a record. Cascading edge cleanup in visual state is the
	/// canvas's responsibility.
	pub async fn delete_node(&self, table: &TableMeta, record: &Record) -> Result<(), SyncError> {
		if !self.source.can_delete_record(table, record) {
			return Err(SyncError::PermissionDenied);
		}
		self.source.delete_record(table, &record.id).await?;
		Ok(())
	}

	/// Create a record with the default display name, returning its
	/// assigned identity for seeding a fresh unlinked node.
	pub async fn create_node(&self, table: &TableMeta) -> Result<LinkRef, SyncError> {
		if !self.source.can_create_record(table) {
			return Err(SyncError::PermissionDenied);
		}
		let id = self.source.create_record(table, DEFAULT_NODE_NAME).await?;
		Ok(LinkRef::new(id, DEFAULT_NODE_NAME))
	}
}

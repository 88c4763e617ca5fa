//! Normalized row change events, as delivered by the database's
//! change notification feed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
	Insert,
	Update,
	Delete,
}

/// One committed row change on one table.
///
/// `before` is `None` on [`Operation::Insert`] and `after` is `None` on
/// [`Operation::Delete`]. `sequence` is monotonic per channel connection and
/// opaque to consumers; no ordering may be assumed across tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
	pub operation: Operation,
	pub table: String,
	pub before: Option<Value>,
	pub after: Option<Value>,
	pub sequence: u64,
}

impl ChangeEvent {
	pub fn insert(table: impl Into<String>, after: Value, sequence: u64) -> Self {
		Self {
			operation: Operation::Insert,
			table: table.into(),
			before: None,
			after: Some(after),
			sequence,
		}
	}

	pub fn update(table: impl Into<String>, before: Option<Value>, after: Value, sequence: u64) -> Self {
		Self {
			operation: Operation::Update,
			table: table.into(),
			before,
			after: Some(after),
			sequence,
		}
	}

	pub fn delete(table: impl Into<String>, before: Value, sequence: u64) -> Self {
		Self {
			operation: Operation::Delete,
			table: table.into(),
			before: Some(before),
			after: None,
			sequence,
		}
	}

	/// The row this event is about: `after` when present, `before` otherwise.
	pub fn row(&self) -> Option<&Value> {
		self.after.as_ref().or(self.before.as_ref())
	}
}

//! Field-level change tracking for model values
//!
//! [`Tracked`] remembers the serialized field values of a model when it is
//! wrapped (or last marked clean) and reports which fields differ since.
//!
//! ```
//! use automigrate_db::tracking::Tracked;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! let mut user = Tracked::new(User { id: 1, name: "ada".into() }).unwrap();
//! user.name = "grace".into();
//!
//! let changes = user.changes().unwrap();
//! assert_eq!(changes.fields(), vec!["name"]);
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// The model did not serialize to a JSON object
	#[error("Tracked value must serialize to a map of fields, got {0}")]
	NotAnObject(&'static str),
}

pub type Result<T> = std::result::Result<T, TrackingError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
	pub field: String,
	pub old: Value,
	pub new: Value,
}

/// Changed fields in field-name order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
	changes: Vec<FieldChange>,
}

impl ChangeSet {
	pub fn is_empty(&self) -> bool {
		self.changes.is_empty()
	}

	pub fn len(&self) -> usize {
		self.changes.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
		self.changes.iter()
	}

	pub fn fields(&self) -> Vec<&str> {
		self.changes.iter().map(|c| c.field.as_str()).collect()
	}

	pub fn get(&self, field: &str) -> Option<&FieldChange> {
		self.changes.iter().find(|c| c.field == field)
	}
}

impl IntoIterator for ChangeSet {
	type Item = FieldChange;
	type IntoIter = std::vec::IntoIter<FieldChange>;

	fn into_iter(self) -> Self::IntoIter {
		self.changes.into_iter()
	}
}

/// A model value with a snapshot of its fields
#[derive(Debug, Clone)]
pub struct Tracked<M: Serialize> {
	value: M,
	snapshot: Map<String, Value>,
}

impl<M: Serialize> Tracked<M> {
	pub fn new(value: M) -> Result<Self> {
		let snapshot = fields_of(&value)?;
		Ok(Self { value, snapshot })
	}

	/// Fields whose serialized value differs from the snapshot.
	///
	/// Fields that appear or disappear (for example with
	/// `skip_serializing_if`) are reported with `null` on the missing side.
	pub fn changes(&self) -> Result<ChangeSet> {
		let current = fields_of(&self.value)?;
		let mut names: Vec<&String> = self.snapshot.keys().chain(current.keys()).collect();
		names.sort();
		names.dedup();

		let changes = names
			.into_iter()
			.filter_map(|name| {
				let old = self.snapshot.get(name).cloned().unwrap_or(Value::Null);
				let new = current.get(name).cloned().unwrap_or(Value::Null);
				(old != new).then(|| FieldChange {
					field: name.clone(),
					old,
					new,
				})
			})
			.collect();
		Ok(ChangeSet { changes })
	}

	pub fn is_dirty(&self) -> Result<bool> {
		Ok(!self.changes()?.is_empty())
	}

	/// Take a new snapshot of the current values
	pub fn mark_clean(&mut self) -> Result<()> {
		self.snapshot = fields_of(&self.value)?;
		Ok(())
	}

	pub fn into_inner(self) -> M {
		self.value
	}
}

impl<M: Serialize> Deref for Tracked<M> {
	type Target = M;

	fn deref(&self) -> &M {
		&self.value
	}
}

impl<M: Serialize> DerefMut for Tracked<M> {
	fn deref_mut(&mut self) -> &mut M {
		&mut self.value
	}
}

fn fields_of<M: Serialize>(value: &M) -> Result<Map<String, Value>> {
	match serde_json::to_value(value)? {
		Value::Object(map) => Ok(map),
		Value::Null => Err(TrackingError::NotAnObject("null")),
		Value::Bool(_) => Err(TrackingError::NotAnObject("a boolean")),
		Value::Number(_) => Err(TrackingError::NotAnObject("a number")),
		Value::String(_) => Err(TrackingError::NotAnObject("a string")),
		Value::Array(_) => Err(TrackingError::NotAnObject("an array")),
	}
}

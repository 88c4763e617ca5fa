//! Structured cache keys.
//!
//! A [`QueryKey`] identifies exactly one cached query result. Keys are
//! deterministic functions of the logical query parameters: two equivalent
//! queries must build byte-identical keys, so segment order and values
//! matter and nothing about the key is derived from runtime state.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One primitive element of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
	Int(i64),
	Uuid(Uuid),
	Str(Cow<'static, str>),
}

impl KeySegment {
	/// Segment for a row id taken from a JSON payload. Ids are UUIDs in our
	/// schema but the fallback keeps invalidation working for any id shape.
	pub fn id(raw: &str) -> Self {
		Uuid::parse_str(raw)
			.map(Self::Uuid)
			.unwrap_or_else(|_| Self::Str(Cow::Owned(raw.to_owned())))
	}
}

impl From<&'static str> for KeySegment {
	fn from(s: &'static str) -> Self {
		Self::Str(Cow::Borrowed(s))
	}
}

impl From<String> for KeySegment {
	fn from(s: String) -> Self {
		Self::Str(Cow::Owned(s))
	}
}

impl From<Uuid> for KeySegment {
	fn from(id: Uuid) -> Self {
		Self::Uuid(id)
	}
}

impl From<i64> for KeySegment {
	fn from(n: i64) -> Self {
		Self::Int(n)
	}
}

impl fmt::Display for KeySegment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Int(n) => write!(f, "{n}"),
			Self::Uuid(id) => write!(f, "{id}"),
			Self::Str(s) => write!(f, "\"{s}\""),
		}
	}
}

/// Ordered tuple of primitives identifying one cached query result,
/// e.g. `["deals"]` or `["company", <uuid>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
	pub fn new(segments: Vec<KeySegment>) -> Self {
		Self(segments)
	}

	/// Key of a list-level query: `["deals"]`.
	pub fn list(name: impl Into<Cow<'static, str>>) -> Self {
		Self(vec![KeySegment::Str(name.into())])
	}

	/// Key of a single-entity query: `["company", <id>]`.
	pub fn detail(name: impl Into<Cow<'static, str>>, id: impl Into<KeySegment>) -> Self {
		Self(vec![KeySegment::Str(name.into()), id.into()])
	}

	pub fn segments(&self) -> &[KeySegment] {
		&self.0
	}

	/// Whether `self` begins with every segment of `prefix`, in order.
	/// Used by predicate invalidation when trailing segments are unknown.
	pub fn starts_with(&self, prefix: &QueryKey) -> bool {
		self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
	}
}

impl fmt::Display for QueryKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[")?;
		for (i, segment) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{segment}")?;
		}
		write!(f, "]")
	}
}

//! Translates change events into cache key invalidations.
//!
//! Rules are pure: event in, key set out. The dispatcher applies the rule
//! and marks each key stale in the store. The policy always favors
//! staleness-avoidance over efficiency (invalidation is safe to
//! over-trigger, never safe to under-trigger), and no ordering is assumed
//! between events on different tables.

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::event::{ChangeEvent, Operation};
use crate::key::{KeySegment, QueryKey};
use crate::store::QueryCacheStore;

/// Per-entity mapping from one change event to the cache keys it staleness-poisons.
pub trait InvalidationRule: Send + Sync {
	/// Keys to mark stale for `event`. Must be pure and idempotent-safe.
	fn keys_for(&self, event: &ChangeEvent) -> Vec<QueryKey>;

	/// Key prefix whose cached entries hold data that can never be
	/// refetched after `event` (the row is gone). Dropped via the store's
	/// predicate form since trailing segments are unknown.
	fn evicted_prefix(&self, _event: &ChangeEvent) -> Option<QueryKey> {
		None
	}
}

/// Which parent detail entries a row change also poisons, e.g. a company
/// contact row that is joined into its company's detail view.
#[derive(Debug, Clone)]
pub struct ParentLink {
	/// Field on the row payload holding the parent id.
	pub foreign_key: Cow<'static, str>,
	/// Detail key prefix of the parent entity.
	pub detail_prefix: Cow<'static, str>,
}

/// Declarative [`InvalidationRule`] for one table.
///
/// - Insert: list keys only, since list consumers cannot yet know the new
///   row's identity; list keys are the minimum safe invalidation.
/// - Update: list keys plus the detail key built from `after.id`, so a
///   detail view refreshes without waiting for a list poll.
/// - Delete: list keys, built from `before` since `after` is absent; the
///   dead row's detail entries are evicted by prefix.
///
/// Parent links apply on every operation that carries a row payload.
#[derive(Debug, Clone, Default)]
pub struct TableRule {
	list_keys: Vec<Cow<'static, str>>,
	detail_prefix: Option<Cow<'static, str>>,
	parent_links: Vec<ParentLink>,
}

impl TableRule {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a list-level query name. An entity may serve several list
	/// queries; all of them go stale on any row change.
	pub fn list(mut self, name: impl Into<Cow<'static, str>>) -> Self {
		self.list_keys.push(name.into());
		self
	}

	/// Query name of the single-entity detail view.
	pub fn detail(mut self, name: impl Into<Cow<'static, str>>) -> Self {
		self.detail_prefix = Some(name.into());
		self
	}

	/// Also invalidate the parent detail entry named by `foreign_key` on
	/// the row payload.
	pub fn link(
		mut self,
		foreign_key: impl Into<Cow<'static, str>>,
		parent_detail: impl Into<Cow<'static, str>>,
	) -> Self {
		self.parent_links.push(ParentLink {
			foreign_key: foreign_key.into(),
			detail_prefix: parent_detail.into(),
		});
		self
	}
}

fn id_segment(row: &Value, field: &str) -> Option<KeySegment> {
	match row.get(field)? {
		Value::String(s) => Some(KeySegment::id(s)),
		Value::Number(n) => n.as_i64().map(KeySegment::Int),
		_ => None,
	}
}

impl InvalidationRule for TableRule {
	fn keys_for(&self, event: &ChangeEvent) -> Vec<QueryKey> {
		let mut keys = self
			.list_keys
			.iter()
			.map(|name| QueryKey::list(name.clone()))
			.collect::<Vec<_>>();

		if event.operation == Operation::Update {
			if let (Some(prefix), Some(id)) = (
				&self.detail_prefix,
				event.after.as_ref().and_then(|row| id_segment(row, "id")),
			) {
				keys.push(QueryKey::detail(prefix.clone(), id));
			}
		}

		if let Some(row) = event.row() {
			for parent in &self.parent_links {
				if let Some(id) = id_segment(row, &parent.foreign_key) {
					keys.push(QueryKey::detail(parent.detail_prefix.clone(), id));
				}
			}
		}

		keys
	}

	fn evicted_prefix(&self, event: &ChangeEvent) -> Option<QueryKey> {
		if event.operation != Operation::Delete {
			return None;
		}

		let prefix = self.detail_prefix.as_ref()?;
		let id = event.before.as_ref().and_then(|row| id_segment(row, "id"))?;

		Some(QueryKey::detail(prefix.clone(), id))
	}
}

/// Applies one entity's rule to incoming events and invalidates the store.
pub struct InvalidationDispatcher {
	store: Arc<dyn QueryCacheStore>,
	rule: Arc<dyn InvalidationRule>,
}

impl InvalidationDispatcher {
	pub fn new(store: Arc<dyn QueryCacheStore>, rule: Arc<dyn InvalidationRule>) -> Self {
		Self { store, rule }
	}

	/// Mark everything `event` makes stale. Returns the exact keys that were
	/// invalidated so callers can forward them, e.g. onto an event bus.
	pub fn dispatch(&self, event: &ChangeEvent) -> Vec<QueryKey> {
		let keys = self.rule.keys_for(event);

		for key in &keys {
			trace!(table = %event.table, %key, "invalidating query");
			self.store.invalidate(key);
		}

		if let Some(prefix) = self.rule.evicted_prefix(event) {
			trace!(table = %event.table, %prefix, "evicting dead detail entries");
			self.store.invalidate_matching(&|key| key.starts_with(&prefix));
		}

		keys
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::RecordingCache;
	use serde_json::json;

	fn deals_rule() -> TableRule {
		TableRule::new().list("deals").detail("deal")
	}

	#[test]
	fn insert_invalidates_list_keys_only() {
		let rule = deals_rule();
		let keys = rule.keys_for(&ChangeEvent::insert(
			"deals",
			json!({ "id": "d1", "title": "New deal" }),
			1,
		));

		assert_eq!(keys, vec![QueryKey::list("deals")]);
	}

	#[test]
	fn update_adds_the_detail_key() {
		let rule = TableRule::new().list("companyList").list("companies").detail("company");
		let keys = rule.keys_for(&ChangeEvent::update(
			"companies",
			None,
			json!({ "id": "c1", "name": "Acme" }),
			2,
		));

		assert_eq!(
			keys,
			vec![
				QueryKey::list("companyList"),
				QueryKey::list("companies"),
				QueryKey::detail("company", "c1".to_owned()),
			]
		);
	}

	#[test]
	fn delete_uses_before_for_list_keys() {
		let rule = TableRule::new().list("contracts").detail("contract");
		let event = ChangeEvent::delete("contracts", json!({ "id": "k1" }), 3);

		assert_eq!(rule.keys_for(&event), vec![QueryKey::list("contracts")]);
		assert_eq!(
			rule.evicted_prefix(&event),
			Some(QueryKey::detail("contract", "k1".to_owned()))
		);
	}

	#[test]
	fn parent_link_invalidates_the_joined_detail_view() {
		let rule = TableRule::new()
			.list("companyContacts")
			.detail("companyContact")
			.link("company_id", "company");
		let keys = rule.keys_for(&ChangeEvent::update(
			"company_contacts",
			None,
			json!({ "id": "ct1", "company_id": "c9" }),
			4,
		));

		assert!(keys.contains(&QueryKey::list("companyContacts")));
		assert!(keys.contains(&QueryKey::detail("company", "c9".to_owned())));
	}

	#[test]
	fn update_without_id_still_invalidates_lists() {
		let rule = deals_rule();
		let keys = rule.keys_for(&ChangeEvent::update("deals", None, json!({ "title": "?" }), 5));

		assert_eq!(keys, vec![QueryKey::list("deals")]);
	}

	#[test]
	fn numeric_ids_build_int_segments() {
		let rule = deals_rule();
		let keys = rule.keys_for(&ChangeEvent::update("deals", None, json!({ "id": 42 }), 6));

		assert!(keys.contains(&QueryKey::detail("deal", 42i64)));
	}

	#[test]
	fn dispatch_is_idempotent() {
		let cache = Arc::new(RecordingCache::new());
		let dispatcher = InvalidationDispatcher::new(cache.clone(), Arc::new(deals_rule()));
		let event = ChangeEvent::insert("deals", json!({ "id": "d1" }), 1);

		dispatcher.dispatch(&event);
		let once = cache.stale_keys();
		dispatcher.dispatch(&event);

		assert_eq!(cache.stale_keys(), once, "double invalidation must not change cache state");
		assert_eq!(cache.invalidations().len(), 2, "the store was still called each time");
	}

	#[test]
	fn delete_evicts_detail_entries_by_prefix() {
		let cache = Arc::new(RecordingCache::new());
		let nested = QueryKey::new(vec!["contract".into(), "k1".to_owned().into(), "lines".into()]);
		cache.seed(QueryKey::detail("contract", "k1".to_owned()));
		cache.seed(nested.clone());
		cache.seed(QueryKey::detail("contract", "k2".to_owned()));

		let rule = TableRule::new().list("contracts").detail("contract");
		let dispatcher = InvalidationDispatcher::new(cache.clone(), Arc::new(rule));
		dispatcher.dispatch(&ChangeEvent::delete("contracts", json!({ "id": "k1" }), 9));

		let stale = cache.stale_keys();
		assert!(stale.contains(&QueryKey::list("contracts")));
		assert!(stale.contains(&QueryKey::detail("contract", "k1".to_owned())));
		assert!(stale.contains(&nested));
		assert!(!stale.contains(&QueryKey::detail("contract", "k2".to_owned())));
	}
}

//! End-to-end tests for the live sync layer: fake change channel in, cache
//! invalidations and core events out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crew_core::{
	live_query::{
		testing::{FakeChannel, RecordingCache},
		ChangeChannel, ChangeEvent, QueryKey, SubscriptionRegistry,
	},
	sync::{self, SyncContext},
	CoreEvent, Entity, EventBus,
};

fn context(channel: &Arc<FakeChannel>) -> (SyncContext, Arc<RecordingCache>) {
	let registry = SubscriptionRegistry::new(
		Arc::clone(channel) as Arc<dyn ChangeChannel>,
		Entity::table_names(),
	);
	let cache = Arc::new(RecordingCache::new());
	let ctx = SyncContext::new(registry, cache.clone(), EventBus::default());
	(ctx, cache)
}

async fn settle() {
	tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn deal_insert_invalidates_the_deals_list() {
	let channel = FakeChannel::new();
	let (ctx, cache) = context(&channel);

	let _guard = sync::deals_sync(&ctx, true).unwrap();
	settle().await;

	channel
		.push(
			"deals",
			ChangeEvent::insert("deals", json!({ "id": "d1", "title": "New deal" }), 1),
		)
		.await;
	settle().await;

	assert_eq!(cache.invalidations(), vec![QueryKey::list("deals")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn company_update_invalidates_lists_and_detail() {
	let channel = FakeChannel::new();
	let (ctx, cache) = context(&channel);

	let _guard = sync::companies_sync(&ctx, true).unwrap();
	settle().await;

	channel
		.push(
			"companies",
			ChangeEvent::update("companies", None, json!({ "id": "c1", "name": "Acme" }), 1),
		)
		.await;
	settle().await;

	let stale = cache.stale_keys();
	assert!(stale.contains(&QueryKey::list("companyList")));
	assert!(stale.contains(&QueryKey::list("companies")));
	assert!(stale.contains(&QueryKey::detail("company", "c1".to_owned())));
	assert_eq!(stale.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn contract_delete_invalidates_the_list_only() {
	let channel = FakeChannel::new();
	let (ctx, cache) = context(&channel);

	let _guard = sync::contracts_sync(&ctx, true).unwrap();
	settle().await;

	channel
		.push(
			"contracts",
			ChangeEvent::delete("contracts", json!({ "id": "k1" }), 1),
		)
		.await;
	settle().await;

	assert_eq!(cache.invalidations(), vec![QueryKey::list("contracts")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn contact_update_reaches_the_company_detail_view() {
	let channel = FakeChannel::new();
	let (ctx, cache) = context(&channel);

	let _guard = sync::company_contacts_sync(&ctx, true).unwrap();
	settle().await;

	channel
		.push(
			"company_contacts",
			ChangeEvent::update(
				"company_contacts",
				None,
				json!({ "id": "ct1", "company_id": "c3" }),
				1,
			),
		)
		.await;
	settle().await;

	let stale = cache.stale_keys();
	assert!(stale.contains(&QueryKey::list("companyContacts")));
	assert!(stale.contains(&QueryKey::detail("company", "c3".to_owned())));
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_adapter_never_subscribes_or_invalidates() {
	let channel = FakeChannel::new();
	let (ctx, cache) = context(&channel);

	let guard = sync::deals_sync(&ctx, false).unwrap();
	settle().await;

	assert!(!guard.is_active());
	assert_eq!(channel.open_count(), 0);

	channel
		.push("deals", ChangeEvent::insert("deals", json!({ "id": "d1" }), 1))
		.await;
	settle().await;

	assert!(cache.invalidations().is_empty());
	assert!(cache.stale_keys().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn detached_adapter_stops_invalidating() {
	let channel = FakeChannel::new();
	let (ctx, cache) = context(&channel);

	let mut guard = sync::deals_sync(&ctx, true).unwrap();
	settle().await;

	guard.detach();

	channel
		.push("deals", ChangeEvent::insert("deals", json!({ "id": "d1" }), 1))
		.await;
	settle().await;

	assert!(cache.invalidations().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalidations_are_published_on_the_core_bus() {
	let channel = FakeChannel::new();
	let (ctx, _cache) = context(&channel);
	let mut events = ctx.events.subscribe();

	let _guard = sync::deals_sync(&ctx, true).unwrap();
	settle().await;

	channel
		.push("deals", ChangeEvent::insert("deals", json!({ "id": "d1" }), 1))
		.await;
	settle().await;

	let CoreEvent::InvalidateOperation(op) = events.try_recv().expect("a core event should be queued");
	assert_eq!(op.key(), &QueryKey::list("deals"));
}

#[tokio::test(flavor = "multi_thread")]
async fn adapters_on_different_tables_are_independent() {
	let channel = FakeChannel::new();
	let (ctx, cache) = context(&channel);

	let guards = sync::attach_all(&ctx, true).unwrap();
	assert_eq!(guards.len(), Entity::ALL.len());
	settle().await;

	// One failing table must not affect the others: events interleave in
	// arbitrary cross-table order.
	channel
		.push("deals", ChangeEvent::insert("deals", json!({ "id": "d1" }), 1))
		.await;
	channel
		.push(
			"time_entries",
			ChangeEvent::insert("time_entries", json!({ "id": "t1" }), 1),
		)
		.await;
	settle().await;

	let stale = cache.stale_keys();
	assert!(stale.contains(&QueryKey::list("deals")));
	assert!(stale.contains(&QueryKey::list("timeEntries")));
}

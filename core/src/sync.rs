//! Per-entity sync adapters.
//!
//! Each adapter subscribes one entity's table to the change feed, runs the
//! entity's invalidation rule on every event and publishes the resulting
//! invalidations on the core bus. Adapters are attached for the lifetime of
//! the owning scope and tear down when their [`SyncGuard`] drops.

use std::sync::Arc;

use tracing::debug;

use crew_live_query::{
	Callbacks, ChangeEvent, InvalidationDispatcher, QueryCacheStore, Result, SubscriptionHandle,
	SubscriptionRegistry,
};

use crate::entity::Entity;
use crate::event::{CoreEvent, EventBus, InvalidateOperationEvent};
use crate::rules;

/// Shared handles the adapters wire together: the subscription registry,
/// the query cache and the core event bus. Passed explicitly rather than
/// held as ambient globals so tests can inject fakes.
#[derive(Clone)]
pub struct SyncContext {
	pub registry: SubscriptionRegistry,
	pub store: Arc<dyn QueryCacheStore>,
	pub events: EventBus,
}

impl SyncContext {
	pub fn new(registry: SubscriptionRegistry, store: Arc<dyn QueryCacheStore>, events: EventBus) -> Self {
		Self {
			registry,
			store,
			events,
		}
	}
}

/// Keeps one entity's sync adapter alive; unsubscribes on drop.
pub struct SyncGuard {
	entity: Entity,
	handle: SubscriptionHandle,
}

impl SyncGuard {
	/// Detach early, before the owning scope exits. Idempotent.
	pub fn detach(&mut self) {
		self.handle.unsubscribe();
	}

	pub fn entity(&self) -> Entity {
		self.entity
	}

	pub fn is_active(&self) -> bool {
		self.handle.is_active()
	}
}

fn attach(ctx: &SyncContext, entity: Entity, enabled: bool) -> Result<SyncGuard> {
	let dispatcher = Arc::new(InvalidationDispatcher::new(
		Arc::clone(&ctx.store),
		Arc::new(rules::for_entity(entity)),
	));
	let events = ctx.events.clone();

	let on_event = Arc::new(move |event: &ChangeEvent| {
		for key in dispatcher.dispatch(event) {
			events.emit(CoreEvent::InvalidateOperation(InvalidateOperationEvent::new(key)));
		}
	});

	let callbacks = {
		let insert = Arc::clone(&on_event);
		let update = Arc::clone(&on_event);
		let delete = on_event;
		Callbacks::new()
			.on_insert(move |event| (*insert)(event))
			.on_update(move |event| (*update)(event))
			.on_delete(move |event| (*delete)(event))
	};

	let handle = ctx.registry.subscribe(entity.table_name(), callbacks, enabled)?;
	if enabled {
		debug!(%entity, "sync adapter attached");
	}

	Ok(SyncGuard { entity, handle })
}

pub fn companies_sync(ctx: &SyncContext, enabled: bool) -> Result<SyncGuard> {
	attach(ctx, Entity::Companies, enabled)
}

pub fn company_contacts_sync(ctx: &SyncContext, enabled: bool) -> Result<SyncGuard> {
	attach(ctx, Entity::CompanyContacts, enabled)
}

pub fn contracts_sync(ctx: &SyncContext, enabled: bool) -> Result<SyncGuard> {
	attach(ctx, Entity::Contracts, enabled)
}

pub fn deals_sync(ctx: &SyncContext, enabled: bool) -> Result<SyncGuard> {
	attach(ctx, Entity::Deals, enabled)
}

pub fn time_entries_sync(ctx: &SyncContext, enabled: bool) -> Result<SyncGuard> {
	attach(ctx, Entity::TimeEntries, enabled)
}

pub fn campaigns_sync(ctx: &SyncContext, enabled: bool) -> Result<SyncGuard> {
	attach(ctx, Entity::Campaigns, enabled)
}

/// Attach every entity's adapter at once, e.g. on app start.
pub fn attach_all(ctx: &SyncContext, enabled: bool) -> Result<Vec<SyncGuard>> {
	Entity::ALL
		.into_iter()
		.map(|entity| attach(ctx, entity, enabled))
		.collect()
}

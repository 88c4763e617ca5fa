//! # crew-core
//!
//! App-level wiring of the Crew workspace entities into the live query
//! sync layer. Each business entity gets a sync adapter that subscribes to
//! its table's change feed and runs its invalidation rule; the resulting
//! cache key invalidations are also published on the core event bus so a
//! connected UI can refetch in the same round trip.

pub mod entity;
pub mod event;
pub mod rules;
pub mod sync;

pub use crew_live_query as live_query;

pub use entity::Entity;
pub use event::{CoreEvent, EventBus, InvalidateOperationEvent, InvalidationBatcher};
pub use sync::{SyncContext, SyncGuard};

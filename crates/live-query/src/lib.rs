//! # crew-live-query
//!
//! Keeps query caches consistent across concurrent sessions without manual
//! refresh. The hosted database emits a row-level change feed per table; this
//! crate subscribes to those feeds, runs per-entity invalidation rules and
//! marks the affected cached query results stale so the next read refetches.
//!
//! The two external collaborators are injected at the seams:
//!
//! - [`ChangeChannel`]: the database's change notification feed
//! - [`QueryCacheStore`]: the query cache being invalidated into
//!
//! Everything in between is owned here: the [`SubscriptionRegistry`] manages
//! one reference-counted connection per table and fans events out to live
//! subscribers, and the [`InvalidationDispatcher`] translates each event into
//! cache key invalidations. Invalidation is idempotent and may over-trigger;
//! it must never under-trigger.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod key;
pub mod registry;
pub mod store;
pub mod testing;

pub use channel::{ChangeChannel, TableStream};
pub use dispatcher::{InvalidationDispatcher, InvalidationRule, TableRule};
pub use error::{LiveQueryError, Result};
pub use event::{ChangeEvent, Operation};
pub use key::{KeySegment, QueryKey};
pub use registry::{Callbacks, SubscriptionHandle, SubscriptionRegistry};
pub use store::QueryCacheStore;

//! Seam to the query cache being invalidated into.

use crate::key::QueryKey;

/// The query cache this engine invalidates into.
///
/// Invalidation marks an entry stale; the store refetches lazily on the next
/// read. Marking is idempotent, so concurrent invalidations of the same key
/// from different adapters are safe. This trait is the only mutation path
/// the sync layer is allowed: adapters never write cache contents, which
/// would race with a genuine refetch.
pub trait QueryCacheStore: Send + Sync {
	/// Mark one entry stale.
	fn invalidate(&self, key: &QueryKey);

	/// Mark every entry whose key matches `predicate` stale. Used when the
	/// full key structure is not known in advance, e.g. dropping all detail
	/// entries under a prefix regardless of trailing segments.
	fn invalidate_matching(&self, predicate: &dyn Fn(&QueryKey) -> bool);
}

//! In-memory fakes for exercising the sync layer without a live database
//! feed. Used by this crate's tests and by downstream crates' integration
//! tests.

use std::{
	collections::{HashMap, HashSet},
	io,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::{ChangeChannel, TableStream};
use crate::error::LiveQueryError;
use crate::event::ChangeEvent;
use crate::key::QueryKey;
use crate::store::QueryCacheStore;
use crate::Result;

/// [`ChangeChannel`] with a side door for pushing events, plus a per-table
/// failure mode for connection-error tests.
pub struct FakeChannel {
	senders: Mutex<HashMap<String, Vec<mpsc::Sender<ChangeEvent>>>>,
	failing: Mutex<HashSet<String>>,
	opened: AtomicUsize,
}

impl FakeChannel {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			senders: Mutex::new(HashMap::new()),
			failing: Mutex::new(HashSet::new()),
			opened: AtomicUsize::new(0),
		})
	}

	/// Make every future `open` for `table` fail.
	pub fn fail_table(&self, table: &str) {
		self.failing
			.lock()
			.expect("failed to lock the failing table set")
			.insert(table.to_owned());
	}

	/// Deliver `event` to every open stream for `table`.
	pub async fn push(&self, table: &str, event: ChangeEvent) {
		let targets = self
			.senders
			.lock()
			.expect("failed to lock the fake channel senders")
			.get(table)
			.cloned()
			.unwrap_or_default();

		for tx in targets {
			tx.send(event.clone()).await.ok();
		}
	}

	/// How many connections were successfully opened, across all tables.
	pub fn open_count(&self) -> usize {
		self.opened.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ChangeChannel for FakeChannel {
	async fn open(&self, table: &str) -> Result<TableStream> {
		if self
			.failing
			.lock()
			.expect("failed to lock the failing table set")
			.contains(table)
		{
			return Err(LiveQueryError::ChannelConnection {
				table: table.to_owned(),
				source: Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")),
			});
		}

		let (tx, rx) = mpsc::channel(64);
		self.senders
			.lock()
			.expect("failed to lock the fake channel senders")
			.entry(table.to_owned())
			.or_default()
			.push(tx);
		self.opened.fetch_add(1, Ordering::SeqCst);

		Ok(TableStream::new(rx))
	}
}

/// [`QueryCacheStore`] that records every invalidation.
///
/// `stale_keys` is the observable cache state (a set, so idempotence shows
/// up directly); `invalidations` is the raw call sequence. Entries must be
/// seeded before predicate invalidation can match them, mirroring a real
/// store that only knows keys it holds.
#[derive(Default)]
pub struct RecordingCache {
	entries: Mutex<HashSet<QueryKey>>,
	stale: Mutex<HashSet<QueryKey>>,
	log: Mutex<Vec<QueryKey>>,
}

impl RecordingCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Pretend `key` currently holds a cached result.
	pub fn seed(&self, key: QueryKey) {
		self.entries
			.lock()
			.expect("failed to lock the cache entries")
			.insert(key);
	}

	pub fn stale_keys(&self) -> HashSet<QueryKey> {
		self.stale
			.lock()
			.expect("failed to lock the stale key set")
			.clone()
	}

	pub fn is_stale(&self, key: &QueryKey) -> bool {
		self.stale
			.lock()
			.expect("failed to lock the stale key set")
			.contains(key)
	}

	/// Every exact-key invalidation, in call order.
	pub fn invalidations(&self) -> Vec<QueryKey> {
		self.log
			.lock()
			.expect("failed to lock the invalidation log")
			.clone()
	}
}

impl QueryCacheStore for RecordingCache {
	fn invalidate(&self, key: &QueryKey) {
		self.log
			.lock()
			.expect("failed to lock the invalidation log")
			.push(key.clone());
		self.stale
			.lock()
			.expect("failed to lock the stale key set")
			.insert(key.clone());
	}

	fn invalidate_matching(&self, predicate: &dyn Fn(&QueryKey) -> bool) {
		let matched = self
			.entries
			.lock()
			.expect("failed to lock the cache entries")
			.iter()
			.filter(|key| predicate(key))
			.cloned()
			.collect::<Vec<_>>();

		let mut stale = self.stale.lock().expect("failed to lock the stale key set");
		for key in matched {
			stale.insert(key);
		}
	}
}

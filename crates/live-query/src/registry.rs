//! Subscription lifecycle management.
//!
//! The registry owns one channel connection per table, shared and
//! reference-counted between concurrent subscribers, with a fan-out task
//! that delivers each event to every live subscriber of that table. The
//! connection is opened when the first subscriber arrives and torn down
//! when the last one unsubscribes.
//!
//! Teardown is race-safe: every subscriber carries a liveness flag that is
//! cleared before the handle is unlinked, and delivery checks the flag at
//! the callback entry point. An event already in flight when `unsubscribe`
//! returns is dropped, never delivered.

use std::{
	collections::{HashMap, HashSet},
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc, Mutex,
	},
};

use async_channel as chan;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn, Instrument};

use crate::channel::ChangeChannel;
use crate::error::LiveQueryError;
use crate::event::{ChangeEvent, Operation};
use crate::Result;

pub type EventCallback = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Partial set of per-operation callbacks. Missing ones are skipped.
#[derive(Default)]
pub struct Callbacks {
	pub on_insert: Option<EventCallback>,
	pub on_update: Option<EventCallback>,
	pub on_delete: Option<EventCallback>,
}

impl Callbacks {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_insert(mut self, f: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> Self {
		self.on_insert = Some(Box::new(f));
		self
	}

	pub fn on_update(mut self, f: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> Self {
		self.on_update = Some(Box::new(f));
		self
	}

	pub fn on_delete(mut self, f: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> Self {
		self.on_delete = Some(Box::new(f));
		self
	}
}

struct Subscriber {
	alive: AtomicBool,
	callbacks: Callbacks,
}

impl Subscriber {
	fn deliver(&self, event: &ChangeEvent) {
		// Liveness is checked here, at the entry point, rather than trusting
		// the channel to stop delivery synchronously on unsubscribe.
		if !self.alive.load(Ordering::Acquire) {
			return;
		}

		let callback = match event.operation {
			Operation::Insert => &self.callbacks.on_insert,
			Operation::Update => &self.callbacks.on_update,
			Operation::Delete => &self.callbacks.on_delete,
		};
		let Some(callback) = callback else { return };

		if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
			// One failing subscriber must not block the others.
			error!(
				"{}",
				LiveQueryError::Callback {
					table: event.table.clone()
				}
			);
		}
	}
}

type SubscriberMap = Arc<Mutex<HashMap<u64, Arc<Subscriber>>>>;

struct TableEntry {
	subscribers: SubscriberMap,
	stop_tx: chan::Sender<()>,
	task: JoinHandle<()>,
}

struct RegistryShared {
	channel: Arc<dyn ChangeChannel>,
	known_tables: HashSet<String>,
	tables: Mutex<HashMap<String, TableEntry>>,
	next_id: AtomicU64,
}

/// Maps table names to active channel subscriptions and owns the connection
/// lifecycle on behalf of the callers.
///
/// Cheap to clone; clones share state. Must be used within a Tokio runtime,
/// since connection setup runs on a spawned task (registration itself is
/// fire-and-forget and never waits for the connection).
#[derive(Clone)]
pub struct SubscriptionRegistry {
	shared: Arc<RegistryShared>,
}

impl SubscriptionRegistry {
	pub fn new(
		channel: Arc<dyn ChangeChannel>,
		known_tables: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		Self {
			shared: Arc::new(RegistryShared {
				channel,
				known_tables: known_tables.into_iter().map(Into::into).collect(),
				tables: Mutex::new(HashMap::new()),
				next_id: AtomicU64::new(0),
			}),
		}
	}

	/// Register `callbacks` for row changes on `table`.
	///
	/// With `enabled = false` this is a no-op that still returns a valid
	/// handle. Unknown table names fail fast; a channel that cannot connect
	/// does not: the subscription is simply never fed, which degrades to
	/// stale-until-manual-refresh.
	pub fn subscribe(&self, table: &str, callbacks: Callbacks, enabled: bool) -> Result<SubscriptionHandle> {
		if !self.shared.known_tables.contains(table) {
			return Err(LiveQueryError::UnknownTable(table.to_owned()));
		}

		if !enabled {
			trace!(table, "subscription disabled, skipping");
			return Ok(SubscriptionHandle { inner: None });
		}

		let subscriber = Arc::new(Subscriber {
			alive: AtomicBool::new(true),
			callbacks,
		});
		let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

		let mut tables = self
			.shared
			.tables
			.lock()
			.expect("failed to lock the subscription table map");

		let entry = tables.entry(table.to_owned()).or_insert_with(|| {
			let subscribers: SubscriberMap = Arc::default();
			let (stop_tx, stop_rx) = chan::bounded(1);

			let task = tokio::spawn(
				run_table_fanout(
					Arc::clone(&self.shared.channel),
					table.to_owned(),
					Arc::clone(&subscribers),
					stop_rx,
				)
				.instrument(tracing::Span::current()),
			);

			TableEntry {
				subscribers,
				stop_tx,
				task,
			}
		});

		entry
			.subscribers
			.lock()
			.expect("failed to lock the subscriber map")
			.insert(id, Arc::clone(&subscriber));

		debug!(table, id, "subscription registered");

		Ok(SubscriptionHandle {
			inner: Some(ActiveSubscription {
				id,
				table: table.to_owned(),
				subscriber,
				shared: Arc::clone(&self.shared),
			}),
		})
	}

	/// Tables with an open connection and their live subscriber counts.
	pub fn connections(&self) -> Vec<(String, usize)> {
		self.shared
			.tables
			.lock()
			.expect("failed to lock the subscription table map")
			.iter()
			.map(|(table, entry)| {
				(
					table.clone(),
					entry
						.subscribers
						.lock()
						.expect("failed to lock the subscriber map")
						.len(),
				)
			})
			.collect()
	}
}

async fn run_table_fanout(
	channel: Arc<dyn ChangeChannel>,
	table: String,
	subscribers: SubscriberMap,
	stop_rx: chan::Receiver<()>,
) {
	let mut stream = match channel.open(&table).await {
		Ok(stream) => stream,
		Err(e) => {
			// Degraded but functional: cached queries still work, they just
			// won't auto-invalidate until this table is resubscribed.
			warn!(table = %table, "live sync unavailable: {e}");
			return;
		}
	};

	debug!(table = %table, "change channel open");

	loop {
		tokio::select! {
			maybe_event = stream.recv() => {
				let Some(event) = maybe_event else {
					debug!(table = %table, "change channel closed");
					break;
				};

				let targets = subscribers
					.lock()
					.expect("failed to lock the subscriber map")
					.values()
					.cloned()
					.collect::<Vec<_>>();

				trace!(
					table = %table,
					operation = ?event.operation,
					sequence = event.sequence,
					fanout = targets.len(),
					"dispatching change event"
				);

				for subscriber in targets {
					subscriber.deliver(&event);
				}
			}
			_ = stop_rx.recv() => break,
		}
	}
}

struct ActiveSubscription {
	id: u64,
	table: String,
	subscriber: Arc<Subscriber>,
	shared: Arc<RegistryShared>,
}

/// Handle to one registered subscription.
///
/// Unsubscribes on drop; [`SubscriptionHandle::unsubscribe`] is idempotent
/// and safe to call at any time. After it returns, no further callbacks run
/// for this subscription.
pub struct SubscriptionHandle {
	inner: Option<ActiveSubscription>,
}

impl std::fmt::Debug for SubscriptionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SubscriptionHandle").finish_non_exhaustive()
	}
}

impl SubscriptionHandle {
	pub fn unsubscribe(&mut self) {
		let Some(active) = self.inner.take() else { return };

		// Cleared first so an event the fan-out task has already picked up
		// resolves by dropping.
		active.subscriber.alive.store(false, Ordering::Release);

		let mut tables = active
			.shared
			.tables
			.lock()
			.expect("failed to lock the subscription table map");

		let last = match tables.get(&active.table) {
			Some(entry) => {
				let mut subscribers = entry
					.subscribers
					.lock()
					.expect("failed to lock the subscriber map");
				subscribers.remove(&active.id);
				subscribers.is_empty()
			}
			None => false,
		};

		if last {
			if let Some(entry) = tables.remove(&active.table) {
				entry.stop_tx.try_send(()).ok();
				entry.task.abort();
				debug!(table = %active.table, "last subscriber gone, closing channel");
			}
		}
	}

	/// Whether this handle still feeds callbacks.
	pub fn is_active(&self) -> bool {
		self.inner.is_some()
	}
}

impl Drop for SubscriptionHandle {
	fn drop(&mut self) {
		self.unsubscribe();
	}
}

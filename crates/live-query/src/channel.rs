//! Seam to the database's change notification feed.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::event::ChangeEvent;
use crate::Result;

/// Live feed of committed row changes for one table.
///
/// Events arrive in commit order for this table; nothing is guaranteed
/// across tables. The stream ends when the underlying connection closes.
pub struct TableStream {
	rx: mpsc::Receiver<ChangeEvent>,
}

impl TableStream {
	pub fn new(rx: mpsc::Receiver<ChangeEvent>) -> Self {
		Self { rx }
	}

	pub async fn recv(&mut self) -> Option<ChangeEvent> {
		self.rx.recv().await
	}
}

/// The hosted database's notification mechanism.
///
/// Implementations own the wire connection, including reconnection and
/// backoff; this crate only consumes the normalized events.
#[async_trait]
pub trait ChangeChannel: Send + Sync {
	/// Open a change feed scoped to `table`.
	async fn open(&self, table: &str) -> Result<TableStream>;
}

use thiserror::Error;

/// Failures in the live sync layer.
///
/// Only [`LiveQueryError::UnknownTable`] ever reaches callers: it is a
/// development-time signal and fails fast at registration. The other
/// variants are logged and swallowed at the boundary where they occur, so
/// the app degrades to stale-until-manual-refresh instead of crashing.
#[derive(Debug, Error)]
pub enum LiveQueryError {
	#[error("failed to open change channel for table '{table}'")]
	ChannelConnection {
		table: String,
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},

	#[error("unknown table '{0}'")]
	UnknownTable(String),

	#[error("subscriber callback panicked while handling a '{table}' event")]
	Callback { table: String },
}

pub type Result<T> = std::result::Result<T, LiveQueryError>;

//! Cooperative shutdown signalling.

use tokio::sync::watch;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Receiver side of the shutdown channel.
///
/// A receiver observes a shutdown once [`watch::Receiver::has_changed`] returns `true` or
/// [`watch::Receiver::changed`] resolves.
pub type ShutdownRx = watch::Receiver<()>;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Signals shutdown to every subscribed receiver.
    ///
    /// Fails when no receiver is alive anymore.
    pub fn shutdown(&self) -> EtlResult<()> {
        self.0.send(()).map_err(|err| {
            etl_error!(
                ErrorKind::InvalidState,
                "Shutdown signal has no receivers",
                source: err
            )
        })
    }

    /// Returns a new receiver that observes only shutdowns signalled after this call.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Outcome of an operation that may be cut short by a shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult<T, I> {
    Ok(T),
    Shutdown(I),
}

impl<T, I> ShutdownResult<T, I> {
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown(_))
    }
}

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());

    (ShutdownTx(tx), rx)
}

/// Returns `true` once a shutdown was signalled on `rx`.
///
/// A closed channel counts as a shutdown, since nobody is left to keep the receiver running.
pub fn is_shutdown_requested(rx: &ShutdownRx) -> bool {
    rx.has_changed().unwrap_or(true)
}

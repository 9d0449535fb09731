//! Process-wide transport context.

use tokio_util::sync::CancellationToken;

/// Owner of every socket's lifetime.
///
/// Constructed once at process start and handed by reference to each socket.
/// [`Context::shutdown`] cancels all of them: accept loops stop, connection
/// tasks drop their streams, and every pending receive resolves to
/// [`crate::RecvError::Closed`]. Sessions treat that as a silent, graceful
/// exit.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
}

impl Context {
    /// A fresh, live context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminate every socket created from this context.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A child token that dies with this context.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}

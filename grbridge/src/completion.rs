use tokio::sync::oneshot;

use grbcore::handle::CompletionHandle;

use crate::registry::Registry;

/// Converts an eventual engine result into a handle the engine can be
/// signaled against exactly once.
///
/// A pending completion is consumed by the first [`signal`] for its
/// handle; signaling again, or signaling after a [`cancel`], is a
/// protocol violation between the host and the engine and panics
/// rather than being reported as an ordinary error.
///
/// [`signal`]: CompletionBridge::signal
/// [`cancel`]: CompletionBridge::cancel
pub struct CompletionBridge {
    pending: Registry<oneshot::Sender<i32>>,
}

impl CompletionBridge {
    pub fn new() -> Self {
        Self {
            pending: Registry::new(),
        }
    }

    pub fn create_pending(&self) -> (oneshot::Receiver<i32>, CompletionHandle) {
        let (sender, receiver) = oneshot::channel();
        let handle = CompletionHandle(self.pending.allocate(sender));
        (receiver, handle)
    }

    /// Resolves the pending completion with the engine's result code.
    ///
    /// # Panics
    ///
    /// If `handle` is not pending.
    pub fn signal(&self, handle: CompletionHandle, code: i32) {
        let Some(sender) = self.pending.release(handle.0) else {
            panic!("completion handle {handle} signaled but not pending");
        };
        trace!("completion {handle} signaled with code {code}");
        if sender.send(code).is_err() {
            // the awaiting side went away; the signal itself was valid
            debug!("completion {handle} signaled but no longer awaited");
        }
    }

    /// Discards the pending completion without resolving it, used only
    /// before the engine has accepted the call.  Returns whether the
    /// handle was still pending.
    pub fn cancel(&self, handle: CompletionHandle) -> bool {
        self.pending.release(handle.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for CompletionBridge {
    fn default() -> Self {
        Self::new()
    }
}

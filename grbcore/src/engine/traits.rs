use std::path::PathBuf;

use crate::{
    engine::EngineCall,
    error::HostError,
    handle::{ArrayHandle, BufferHandle, CompletionHandle, ConnectionHandle},
    repo::UpdateEntry,
};

/// Host-provided services the engine reaches back into while it runs.
///
/// Every method looks synchronous from the engine's side; the
/// implementation performs the real work asynchronously on the host
/// runtime.  Buffer and array lookups report a missing handle through
/// their return value so the engine can turn it into its own failure
/// code, while [`signal`](HostIo::signal) on a missing or already
/// consumed completion is a protocol violation between the two sides
/// and panics.
pub trait HostIo: Send + Sync {
    /// Opens a logical connection for the given URL.  `is_post`
    /// selects the request method and, by inspecting the URL for the
    /// upload-pack marker, the git content type.
    fn open_connection(&self, url: &str, is_post: bool) -> ConnectionHandle;

    /// Appends bytes to the outbound request body.
    fn write_connection(&self, conn: ConnectionHandle, data: &[u8]) -> Result<(), HostError>;

    /// Returns up to `max_len` response bytes, blocking the engine
    /// worker until data arrives.  The first call finalizes the
    /// outbound body; a zero-length result means the stream is
    /// exhausted.
    fn read_connection(&self, conn: ConnectionHandle, max_len: usize)
        -> Result<Vec<u8>, HostError>;

    /// Discards the connection, aborting any in-flight exchange.
    /// Never fails, including when called twice.
    fn close_connection(&self, conn: ConnectionHandle);

    /// Resolves a buffer handle to its text content.
    fn buffer_text(&self, buffer: BufferHandle) -> Option<String>;

    /// Appends one entry to a result array; `false` if the handle is
    /// unknown or already freed.
    fn push_update(&self, array: ArrayHandle, update: UpdateEntry) -> bool;

    /// Translates a sandbox mount name to the real host directory.
    fn resolve_path(&self, sandbox: &str) -> Option<PathBuf>;

    /// Signals the completion of an accepted call with the engine's
    /// final result code.
    ///
    /// # Panics
    ///
    /// If `completion` is not pending (never created, already
    /// signaled, or canceled).
    fn signal(&self, completion: CompletionHandle, code: i32);
}

/// The opaque protocol engine, invoked synchronously on a dedicated
/// worker while the bridge holds an admission permit for it.
///
/// A negative return from `invoke` means the call was rejected before
/// any work started and the completion will never fire.  A non-negative
/// return means the call was accepted, and the engine must have
/// signaled the completion exactly once (reporting success or a
/// negative engine error code) before `invoke` returned; a completion
/// still pending at that point counts as abandoned.
pub trait ProtocolEngine: Send + Sync {
    fn invoke(&self, io: &dyn HostIo, call: EngineCall) -> i32;
}

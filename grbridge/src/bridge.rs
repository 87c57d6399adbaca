use std::sync::Arc;
use tokio::runtime;

use grbcore::repo::UpdateEntry;

use crate::{
    completion::CompletionBridge,
    gate::EnginePool,
    registry::Registry,
    sandbox::MountTable,
    transport::Transport,
};

/// Host-owned state the engine addresses through opaque handles.
///
/// One context exists per engine instance; no global registries, so
/// independent engines never see each other's handles.
pub struct BridgeContext {
    pub(crate) buffers: Registry<Vec<u8>>,
    pub(crate) arrays: Registry<Vec<UpdateEntry>>,
    pub(crate) completions: CompletionBridge,
    pub(crate) transport: Transport,
    pub(crate) mounts: MountTable,
}

/// The synchronous face of the context handed to an engine worker.
///
/// Asynchronous work (transport reads and writes) is driven to
/// completion on the host runtime while the worker thread waits;
/// nothing else the host is doing blocks meanwhile.
pub struct BridgeIo {
    pub(crate) context: Arc<BridgeContext>,
    pub(crate) runtime: runtime::Handle,
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Engine workers available for blocking calls.
    pub workers: usize,
}

/// Host-facing entry into the engine: `clone` / `pull` /
/// `list_updates` over the resource bridge, plus the self-contained
/// repository metadata reader.
///
/// Callers must not run two bridged calls against the same working
/// directory concurrently; the bridge does not serialize by path.
pub struct Bridge<E> {
    pub(crate) engine: Arc<E>,
    pub(crate) context: Arc<BridgeContext>,
    pub(crate) pool: EnginePool,
}

mod impls;

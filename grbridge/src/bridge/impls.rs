use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{runtime, task};

use grbcore::{
    engine::{
        traits::{HostIo, ProtocolEngine},
        Argument, EngineCall, EntryPoint,
    },
    error::HostError,
    handle::{ArrayHandle, BufferHandle, CompletionHandle, ConnectionHandle},
    meta::RepositoryMeta,
    repo::UpdateEntry,
};

use crate::{
    completion::CompletionBridge,
    error::{BridgeError, DispatchError, EngineError, PreconditionError},
    gate::EnginePool,
    registry::Registry,
    sandbox::MountTable,
    transport::Transport,
};

use super::{Bridge, BridgeConfig, BridgeContext, BridgeIo};

/// A call value before marshalling; the tagged form is decided here at
/// the call site, never inferred from the value itself.
enum CallValue {
    Text(String),
    Numeric(i64),
}

impl BridgeContext {
    pub(crate) fn new() -> Self {
        Self {
            buffers: Registry::new(),
            arrays: Registry::new(),
            completions: CompletionBridge::new(),
            transport: Transport::new(),
            mounts: MountTable::new(),
        }
    }

    /// Handles currently allocated across every resource kind.
    pub fn outstanding_handles(&self) -> usize {
        self.buffers.len()
            + self.arrays.len()
            + self.completions.len()
            + self.mounts.len()
            + self.transport.open_connections()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

impl HostIo for BridgeIo {
    fn open_connection(&self, url: &str, is_post: bool) -> ConnectionHandle {
        self.context.transport.open(url, is_post)
    }

    fn write_connection(&self, conn: ConnectionHandle, data: &[u8]) -> Result<(), HostError> {
        self.runtime
            .block_on(self.context.transport.write(conn, data))
            .map_err(HostError::from)
    }

    fn read_connection(
        &self,
        conn: ConnectionHandle,
        max_len: usize,
    ) -> Result<Vec<u8>, HostError> {
        let bytes = self
            .runtime
            .block_on(self.context.transport.read(conn, max_len))?;
        Ok(bytes.to_vec())
    }

    fn close_connection(&self, conn: ConnectionHandle) {
        self.context.transport.close(conn);
    }

    fn buffer_text(&self, buffer: BufferHandle) -> Option<String> {
        self.context
            .buffers
            .with(buffer.0, |bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn push_update(&self, array: ArrayHandle, update: UpdateEntry) -> bool {
        self.context
            .arrays
            .with(array.0, |entries| entries.push(update))
            .is_some()
    }

    fn resolve_path(&self, sandbox: &str) -> Option<PathBuf> {
        self.context.mounts.resolve(sandbox)
    }

    fn signal(&self, completion: CompletionHandle, code: i32) {
        self.context.completions.signal(completion, code);
    }
}

impl<E: ProtocolEngine + 'static> Bridge<E> {
    pub fn new(engine: E, config: BridgeConfig) -> Self {
        let pool = EnginePool::new(config.workers);
        info!("bridge ready with {} engine worker(s)", pool.workers());
        Self {
            engine: Arc::new(engine),
            context: Arc::new(BridgeContext::new()),
            pool,
        }
    }

    pub fn context(&self) -> &BridgeContext {
        &self.context
    }

    /// Clones `repository` into `path`.  The target may not yet exist;
    /// anything other than a directory there is rejected before the
    /// engine is involved.  Only `http(s)` repository URLs are
    /// supported.
    pub async fn clone_repository(
        &self,
        repository: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), BridgeError> {
        let workdir = self.workdir(path.as_ref(), true)?;
        info!("cloning <{repository}> into {workdir:?}");
        let repository = repository.to_string();
        self.dispatch(EntryPoint::Clone, &workdir, false, move |sandbox| {
            vec![
                CallValue::Text(repository),
                CallValue::Text(sandbox.to_string()),
            ]
        })
        .await?;
        Ok(())
    }

    /// Pulls new commits into the repository at `path`.  `skip_fetch`
    /// applies already fetched refs without checking for new ones;
    /// `force` stashes local changes so the pull runs on a clean
    /// working tree.
    pub async fn pull(
        &self,
        path: impl AsRef<Path>,
        skip_fetch: bool,
        force: bool,
    ) -> Result<(), BridgeError> {
        let workdir = self.workdir(path.as_ref(), false)?;
        info!("pulling {workdir:?} (skip_fetch: {skip_fetch}, force: {force})");
        self.dispatch(EntryPoint::Pull, &workdir, false, move |sandbox| {
            vec![
                CallValue::Text(sandbox.to_string()),
                CallValue::Numeric(skip_fetch.into()),
                CallValue::Numeric(force.into()),
            ]
        })
        .await?;
        Ok(())
    }

    /// Fetches and lists commits not yet applied to the repository at
    /// `path`, oldest first.  A repository with nothing new yields an
    /// empty list, not an error.
    pub async fn list_updates(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<UpdateEntry>, BridgeError> {
        let workdir = self.workdir(path.as_ref(), false)?;
        info!("listing updates for {workdir:?}");
        self.dispatch(EntryPoint::ListUpdates, &workdir, true, move |sandbox| {
            vec![CallValue::Text(sandbox.to_string())]
        })
        .await
    }

    /// Reads branch/upstream state from the repository descriptor
    /// directory.  Runs entirely on the host side; the engine is not
    /// involved.
    pub async fn read_repository_meta(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Option<RepositoryMeta>, BridgeError> {
        Ok(grbcore::meta::read_repository_meta(path).await?)
    }

    fn workdir(&self, path: &Path, create: bool) -> Result<PathBuf, BridgeError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => (),
            Ok(_) => {
                return Err(PreconditionError::NotADirectory {
                    path: path.display().to_string(),
                }
                .into())
            }
            Err(e) if create && e.kind() == io::ErrorKind::NotFound => {
                std::fs::create_dir_all(path)?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(path.canonicalize()?)
    }

    /// Runs one marshalled call through the gate, the mount and the
    /// engine.  Buffers, the result array and the mount are released
    /// on every path, strictly after the completion outcome is known.
    async fn dispatch<F>(
        &self,
        entry: EntryPoint,
        workdir: &Path,
        wants_result: bool,
        build: F,
    ) -> Result<Vec<UpdateEntry>, BridgeError>
    where
        F: FnOnce(&str) -> Vec<CallValue>,
    {
        let context = &self.context;
        let _permit = self.pool.acquire().await?;
        let sandbox = context.mounts.mount(workdir)?;

        let mut buffers = Vec::new();
        let mut args = Vec::new();
        for value in build(&sandbox) {
            match value {
                CallValue::Text(text) => {
                    let handle = BufferHandle(context.buffers.allocate(text.into_bytes()));
                    buffers.push(handle);
                    args.push(Argument::Text(handle));
                }
                CallValue::Numeric(n) => args.push(Argument::Numeric(n)),
            }
        }
        let array = wants_result.then(|| ArrayHandle(context.arrays.allocate(Vec::new())));
        if let Some(array) = array {
            args.push(Argument::RawHandle(array.0));
        }

        let (receiver, completion) = context.completions.create_pending();
        let call = EngineCall {
            entry,
            args,
            completion,
        };
        let io = BridgeIo {
            context: Arc::clone(context),
            runtime: runtime::Handle::current(),
        };
        let engine = Arc::clone(&self.engine);
        debug!("dispatching `{entry}` to an engine worker");
        let admission = task::spawn_blocking(move || engine.invoke(&io, call)).await;

        let outcome = match admission {
            Err(e) => {
                // the worker died without a verdict; drop the pending
                // completion unless the engine already consumed it
                context.completions.cancel(completion);
                Err(BridgeError::from(EngineError::Crashed {
                    entry,
                    msg: e.to_string(),
                }))
            }
            Ok(code) if code < 0 => {
                context.completions.cancel(completion);
                Err(DispatchError::Rejected { entry, code }.into())
            }
            Ok(_) if context.completions.cancel(completion) => {
                // accepted, but the worker returned without signaling
                Err(EngineError::Abandoned { entry }.into())
            }
            Ok(_) => match receiver.await {
                Ok(code) if code < 0 => Err(EngineError::Failed { entry, code }.into()),
                Ok(code) => {
                    trace!("`{entry}` completed with code {code}");
                    Ok(())
                }
                Err(_) => Err(EngineError::Abandoned { entry }.into()),
            },
        };

        let updates = array
            .and_then(|array| context.arrays.release(array.0))
            .unwrap_or_default();
        for buffer in buffers {
            context.buffers.release(buffer.0);
        }
        context.mounts.unmount(&sandbox);

        outcome.map(|()| updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    mock! {
        Engine {}
        impl ProtocolEngine for Engine {
            fn invoke(&self, io: &dyn HostIo, call: EngineCall) -> i32;
        }
    }

    fn bridge(engine: MockEngine) -> Bridge<MockEngine> {
        Bridge::new(engine, BridgeConfig::default())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clone_marshals_and_releases_everything() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(|io, call| {
            assert_eq!(call.entry, EntryPoint::Clone);
            let &[Argument::Text(repo), Argument::Text(dir)] = &call.args[..] else {
                panic!("unexpected argument shape: {:?}", call.args);
            };
            assert_eq!(
                io.buffer_text(repo).as_deref(),
                Some("https://example.com/org/repo.git"),
            );
            let sandbox = io.buffer_text(dir).unwrap();
            let workdir = io.resolve_path(&sandbox).unwrap();
            std::fs::write(workdir.join("cloned"), b"ok").unwrap();
            io.signal(call.completion, 0);
            0
        });
        let bridge = bridge(engine);
        let target = td.path().join("checkout");
        bridge
            .clone_repository("https://example.com/org/repo.git", &target)
            .await?;
        assert!(target.join("cloned").is_file());
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn clone_rejects_non_directory_target() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let file = td.path().join("occupied");
        std::fs::write(&file, b"")?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(0);
        let bridge = bridge(engine);
        let err = bridge
            .clone_repository("https://example.com/org/repo.git", &file)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::PreconditionError(PreconditionError::NotADirectory { .. }),
        ));
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn synchronous_rejection_is_a_dispatch_fault() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(|_, _| -3);
        let bridge = bridge(engine);
        let err = bridge
            .clone_repository("https://example.com/org/repo.git", td.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::DispatchError(DispatchError::Rejected { code: -3, .. }),
        ));
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn negative_signal_is_an_engine_fault() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(|io, call| {
            io.signal(call.completion, -9);
            0
        });
        let bridge = bridge(engine);
        let err = bridge
            .clone_repository("https://example.com/org/repo.git", td.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::EngineError(EngineError::Failed { code: -9, .. }),
        ));
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn no_worker_ever_available_leaks_nothing() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(0);
        let bridge = Bridge::new(engine, BridgeConfig { workers: 0 });
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            bridge.clone_repository("https://example.com/org/repo.git", td.path()),
        )
        .await
        .expect("dispatch must fail, not suspend forever");
        assert!(matches!(
            result.unwrap_err(),
            BridgeError::DispatchError(DispatchError::Unavailable),
        ));
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_marshals_flags_as_numerics() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        std::fs::create_dir_all(td.path().join("repo"))?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(|io, call| {
            assert_eq!(call.entry, EntryPoint::Pull);
            assert!(matches!(call.args[0], Argument::Text(_)));
            assert_eq!(call.args[1], Argument::Numeric(1));
            assert_eq!(call.args[2], Argument::Numeric(0));
            io.signal(call.completion, 0);
            0
        });
        let bridge = bridge(engine);
        bridge.pull(td.path().join("repo"), true, false).await?;
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn pull_requires_an_existing_directory() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(0);
        let bridge = bridge(engine);
        let err = bridge
            .pull(td.path().join("missing"), false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::StdIoError(_)));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_updates_returns_pushed_entries_in_order() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(|io, call| {
            assert_eq!(call.entry, EntryPoint::ListUpdates);
            let Some(Argument::RawHandle(raw)) = call.args.last() else {
                panic!("missing result array: {:?}", call.args);
            };
            let array = ArrayHandle(*raw);
            assert!(io.push_update(
                array,
                UpdateEntry {
                    id: "one".to_string(),
                    message: "first".to_string(),
                    author: "a".to_string(),
                },
            ));
            assert!(io.push_update(
                array,
                UpdateEntry {
                    id: "two".to_string(),
                    message: "second".to_string(),
                    author: "b".to_string(),
                },
            ));
            io.signal(call.completion, 0);
            0
        });
        let bridge = bridge(engine);
        let updates = bridge.list_updates(td.path()).await?;
        assert_eq!(
            updates.iter().map(|u| u.id.as_str()).collect::<Vec<_>>(),
            ["one", "two"],
        );
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_updates_with_nothing_new_is_empty_not_an_error() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(|io, call| {
            io.signal(call.completion, 0);
            0
        });
        let bridge = bridge(engine);
        assert_eq!(bridge.list_updates(td.path()).await?, Vec::new());
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accepted_but_never_signaled_is_abandoned() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(|_, _| 0);
        let bridge = bridge(engine);
        let err = bridge
            .clone_repository("https://example.com/org/repo.git", td.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::EngineError(EngineError::Abandoned { .. }),
        ));
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_signal_crashes_the_worker_without_leaking() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(|io, call| {
            io.signal(call.completion, 0);
            // the second signal is a protocol violation and panics
            io.signal(call.completion, 0);
            0
        });
        let bridge = bridge(engine);
        let err = bridge
            .clone_repository("https://example.com/org/repo.git", td.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::EngineError(EngineError::Crashed { .. }),
        ));
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    /// An engine that records how many workers run it at once.
    struct GaugeEngine {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl ProtocolEngine for GaugeEngine {
        fn invoke(&self, io: &dyn HostIo, call: EngineCall) -> i32 {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(25));
            self.current.fetch_sub(1, Ordering::SeqCst);
            io.signal(call.completion, 0);
            0
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_worker_pool_never_overcommits() -> anyhow::Result<()> {
        let td = TempDir::new()?;
        let bridge = Bridge::new(
            GaugeEngine {
                current: AtomicUsize::new(0),
                max: AtomicUsize::new(0),
            },
            BridgeConfig { workers: 1 },
        );
        let (a, b) = tokio::join!(
            bridge.clone_repository("https://example.com/a.git", td.path().join("a")),
            bridge.clone_repository("https://example.com/b.git", td.path().join("b")),
        );
        a?;
        b?;
        assert_eq!(bridge.engine.max.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn engine_drives_transport_through_the_boundary() -> anyhow::Result<()> {
        use axum::{routing::get, Router};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let router = Router::new().route(
            "/info/refs",
            get(|| async { "001e# service=git-upload-pack\n0000" }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let td = TempDir::new()?;
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(1).returning(move |io, call| {
            let &[Argument::Text(repo), Argument::Text(dir)] = &call.args[..] else {
                panic!("unexpected argument shape: {:?}", call.args);
            };
            let url = io.buffer_text(repo).unwrap();
            let conn = io.open_connection(&format!("{url}/info/refs"), false);
            let mut advertised = Vec::new();
            loop {
                let chunk = io.read_connection(conn, 8).unwrap();
                if chunk.is_empty() {
                    break;
                }
                advertised.extend_from_slice(&chunk);
            }
            io.close_connection(conn);

            let sandbox = io.buffer_text(dir).unwrap();
            let workdir = io.resolve_path(&sandbox).unwrap();
            std::fs::write(workdir.join("refs"), &advertised).unwrap();
            io.signal(call.completion, 0);
            0
        });

        let bridge = bridge(engine);
        let target = td.path().join("checkout");
        bridge
            .clone_repository(&format!("http://{addr}"), &target)
            .await?;
        assert_eq!(
            std::fs::read_to_string(target.join("refs"))?,
            "001e# service=git-upload-pack\n0000",
        );
        assert_eq!(bridge.context().outstanding_handles(), 0);
        Ok(())
    }
}

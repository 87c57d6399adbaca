use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng};
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};

/// Scoped, per-operation bindings from sandbox-local names to real
/// host directories.
///
/// A mount lives for exactly one bridged call: it is created before
/// the engine starts and released on every exit path once the engine
/// is done, never reused, so a host path changing between calls can
/// not leave a stale binding behind.
pub struct MountTable {
    mounts: Mutex<HashMap<String, PathBuf>>,
}

fn random_name() -> String {
    rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(12)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            mounts: Mutex::new(HashMap::new()),
        }
    }

    /// Binds `host_path` under a fresh sandbox-local name, creating
    /// the host directory first if it does not exist.
    pub fn mount(&self, host_path: &Path) -> io::Result<String> {
        std::fs::create_dir_all(host_path)?;
        let mut mounts = self.mounts.lock();
        let name = loop {
            let candidate = random_name();
            if !mounts.contains_key(&candidate) {
                break candidate;
            }
        };
        debug!("mounted {host_path:?} as `{name}`");
        mounts.insert(name.clone(), host_path.to_path_buf());
        Ok(name)
    }

    /// The engine's view through the mount.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.mounts.lock().get(name).cloned()
    }

    /// Removes the binding; `false` if it was already gone.
    pub fn unmount(&self, name: &str) -> bool {
        let existed = self.mounts.lock().remove(name).is_some();
        if existed {
            debug!("unmounted `{name}`");
        }
        existed
    }

    pub fn len(&self) -> usize {
        self.mounts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

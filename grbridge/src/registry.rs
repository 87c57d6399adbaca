use parking_lot::Mutex;
use std::collections::HashMap;

struct Entries<T> {
    next: u64,
    map: HashMap<u64, T>,
}

/// Handle table for one kind of host-owned resource.
///
/// Keys are monotonically increasing and never reused, so a released
/// handle can never silently come back to life addressing a different
/// resource.  One registry is constructed per resource kind so that
/// handles of different kinds stay distinct even though all of them
/// are plain integers.
pub struct Registry<T> {
    entries: Mutex<Entries<T>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                next: 0,
                map: HashMap::new(),
            }),
        }
    }

    pub fn allocate(&self, resource: T) -> u64 {
        let mut entries = self.entries.lock();
        let handle = entries.next;
        entries.next += 1;
        entries.map.insert(handle, resource);
        handle
    }

    /// Runs `f` against the resource; `None` if the handle is unknown
    /// or already released.
    pub fn with<R>(&self, handle: u64, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.entries.lock().map.get_mut(&handle).map(f)
    }

    /// Removes the resource, returning it if the handle existed.
    pub fn release(&self, handle: u64) -> Option<T> {
        self.entries.lock().map.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

use std::fmt;

use crate::handle::{BufferHandle, CompletionHandle};

pub mod traits;

/// Entry points exported by the protocol engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryPoint {
    Clone,
    Pull,
    ListUpdates,
}

impl EntryPoint {
    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::Clone => "clone",
            EntryPoint::Pull => "pull",
            EntryPoint::ListUpdates => "list_updates",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A call argument marshalled for the engine.
///
/// The variant is decided at the call site, never inferred from the
/// value at marshal time.  Strings cross the boundary as buffer
/// handles, flags and counts as plain integers, and handles of other
/// kinds (e.g. a result array) travel raw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Argument {
    Text(BufferHandle),
    RawHandle(u64),
    Numeric(i64),
}

/// One marshalled invocation handed to the engine.
///
/// The engine must either reject the call synchronously by returning a
/// negative value from `invoke`, or accept it and signal `completion`
/// exactly once with its final result code.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineCall {
    pub entry: EntryPoint,
    pub args: Vec<Argument>,
    pub completion: CompletionHandle,
}

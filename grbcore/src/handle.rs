use serde::{Deserialize, Serialize};
use std::fmt;

// Each resource kind gets its own newtype so that a handle minted by one
// registry can never be passed where another kind is expected, even
// though every handle is a plain integer on the wire.

/// Opaque key addressing a host-owned byte buffer across the engine
/// boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct BufferHandle(pub u64);

/// Opaque key addressing a growable result array the engine appends to
/// before it signals completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ArrayHandle(pub u64);

/// Opaque key addressing a pending completion the engine must signal
/// exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct CompletionHandle(pub u64);

/// Opaque key addressing a logical network connection owned by the
/// transport manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ConnectionHandle(pub u64);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ArrayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

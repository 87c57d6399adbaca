use serde::{Deserialize, Serialize};

/// A single remote commit not yet present locally, as reported by the
/// engine while listing updates for a repository.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UpdateEntry {
    pub id: String,
    pub message: String,
    pub author: String,
}

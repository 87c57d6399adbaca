use serde::{Deserialize, Serialize};

/// The remote a local branch tracks, with the repository path derived
/// from the remote URL.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Upstream {
    pub name: String,
    pub url: String,
    pub repo: String,
}

/// Branch state read from the repository descriptor directory.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BranchMeta {
    pub branch: String,
    pub revision: Option<String>,
    pub upstream: Option<Upstream>,
}

/// What the repository's HEAD points at.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum RepositoryMeta {
    /// HEAD holds a raw commit id rather than a symbolic reference.
    Detached,
    /// HEAD is a symbolic reference to a local branch.
    Branch(BranchMeta),
}

mod config;
mod impls;

pub use impls::read_repository_meta;

use thiserror::Error;

/// Faults surfaced to the engine through the host I/O seam.
///
/// The engine checks these and maps them onto its own negative return
/// codes; they are never raised to the caller of the bridge directly.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown connection handle `{0}`")]
    UnknownConnection(u64),
    #[error("transport failure: {0}")]
    Transport(String),
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MetaError {
    #[error(transparent)]
    StdIo(#[from] std::io::Error),
    #[error("unrecognized upstream url `{0}`")]
    UpstreamUrl(String),
}

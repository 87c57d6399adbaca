use thiserror::Error;

use grbcore::{engine::EntryPoint, error::MetaError};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("DispatchError: {0}")]
    DispatchError(#[from] DispatchError),
    #[error("EngineError: {0}")]
    EngineError(#[from] EngineError),
    #[error("MetaError: {0}")]
    MetaError(#[from] MetaError),
    #[error("PreconditionError: {0}")]
    PreconditionError(#[from] PreconditionError),
    #[error("StdIoError: {0}")]
    StdIoError(#[from] std::io::Error),
}

/// The call never reached the engine's asynchronous work.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no engine worker available")]
    Unavailable,
    #[error("engine rejected `{entry}` before starting: code {code}")]
    Rejected { entry: EntryPoint, code: i32 },
}

/// The engine accepted the call and later reported failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("call to `{entry}` failed: error code {code}")]
    Failed { entry: EntryPoint, code: i32 },
    #[error("call to `{entry}` was abandoned before completion")]
    Abandoned { entry: EntryPoint },
    #[error("engine worker crashed during `{entry}`: {msg}")]
    Crashed { entry: EntryPoint, msg: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum PreconditionError {
    #[error("`{path}` exists and is not a directory")]
    NotADirectory { path: String },
}

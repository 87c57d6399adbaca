use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;

use crate::error::MetaError;

use super::{
    config::{GitConfig, Value},
    BranchMeta, RepositoryMeta, Upstream,
};

fn repo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Strips the scheme/host prefix (or scp-like user@host: prefix) and
    // an optional .git suffix from a remote URL.
    RE.get_or_init(|| {
        Regex::new(r"^(?:https?://[^/]+/|[^@]+@[^:]+:)(.*?)(?:\.git)?$")
            .expect("upstream url pattern")
    })
}

fn upstream(config: &GitConfig, branch: &str) -> Result<Option<Upstream>, MetaError> {
    let Some(remote) = config
        .get("branch", Some(branch), "remote")
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };
    let Some(url) = config
        .get("remote", Some(remote), "url")
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };
    let repo = repo_re()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| MetaError::UpstreamUrl(url.to_string()))?;
    Ok(Some(Upstream {
        name: remote.to_string(),
        url: url.to_string(),
        repo: repo.as_str().to_string(),
    }))
}

/// Reads branch, revision and upstream information out of the
/// repository's descriptor directory.
///
/// Returns `None` when `path` has no descriptor directory at all, and
/// [`RepositoryMeta::Detached`] when the ref pointer file is not a
/// symbolic reference.
pub async fn read_repository_meta(
    path: impl AsRef<Path>,
) -> Result<Option<RepositoryMeta>, MetaError> {
    let git_dir = path.as_ref().join(".git");
    match fs::metadata(&git_dir).await {
        Ok(_) => (),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let head = fs::read_to_string(git_dir.join("HEAD")).await?;
    let Some(reference) = head.strip_prefix("ref: ") else {
        return Ok(Some(RepositoryMeta::Detached));
    };
    let reference = reference.trim();
    let branch = reference.rsplit('/').next().unwrap_or(reference).to_string();

    let local_ref = git_dir.join(reference);
    let revision = match fs::read_to_string(&local_ref).await {
        Ok(raw) => raw.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Some(RepositoryMeta::Branch(BranchMeta {
                branch,
                revision: None,
                upstream: None,
            })));
        }
        Err(e) => return Err(e.into()),
    };

    let config = GitConfig::parse(&fs::read_to_string(git_dir.join("config")).await?);
    Ok(Some(RepositoryMeta::Branch(BranchMeta {
        upstream: upstream(&config, &branch)?,
        revision: Some(revision),
        branch,
    })))
}

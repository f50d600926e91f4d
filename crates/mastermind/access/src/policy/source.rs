//! Raw-content URL resolution for access documents.

use std::collections::BTreeMap;

use url::Url;

use crate::error::{AccessError, AccessResult};

/// Suffix stripped from clone URL paths.
const REPOSITORY_SUFFIX: &str = ".git";

/// Map a clone URL to the raw-content URL of `path` at `reference`.
///
/// `https://github.com/org/widgets.git` at `abc123` becomes
/// `https://raw.github.com/org/widgets/abc123/<path>`.
pub fn raw_content_url(
    clone_url: &str,
    reference: &str,
    path: &str,
    raw_hosts: &BTreeMap<String, String>,
) -> AccessResult<Url> {
    let parsed = Url::parse(clone_url)
        .map_err(|e| AccessError::UnsupportedSource(format!("{}: {}", clone_url, e)))?;

    if parsed.scheme() != "https" {
        return Err(AccessError::UnsupportedSource(format!(
            "{}: only https clone URLs are supported, got {}",
            clone_url,
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| AccessError::UnsupportedSource(format!("{}: no host", clone_url)))?;
    let raw_host = raw_hosts.get(&host).ok_or_else(|| {
        AccessError::UnsupportedSource(format!("{}: no raw-content host known for {}", clone_url, host))
    })?;

    let repo_path = parsed.path().trim_end_matches('/');
    let repo_path = repo_path.strip_suffix(REPOSITORY_SUFFIX).unwrap_or(repo_path);
    if repo_path.is_empty() {
        return Err(AccessError::UnsupportedSource(format!(
            "{}: no repository path",
            clone_url
        )));
    }

    let raw = format!(
        "https://{}{}/{}/{}",
        raw_host,
        repo_path,
        reference,
        path.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|e| AccessError::UnsupportedSource(format!("{}: {}", raw, e)))
}

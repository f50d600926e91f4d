//! Build environment collection
//!
//! The job sees every `BUILDKITE_*` variable of the agent plus the job's own
//! variables from `BUILDKITE_ENV_FILE`, which the agent writes with Go's `%q`
//! quoting.

use std::fs;

use anyhow::{bail, Context};
use mastermind_types::{vars, BuildEnvironment};

/// Build environment for the current job
pub fn collect(agent_env: &BuildEnvironment) -> anyhow::Result<BuildEnvironment> {
    let mut env: Vec<(String, String)> = agent_env
        .iter()
        .filter(|(name, _)| name.starts_with("BUILDKITE_") || *name == vars::ACCESS_DOCUMENT_PATH)
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    if let Some(path) = agent_env.get(vars::ENV_FILE) {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read job env file {}", path))?;
        env.extend(parse_env_file(&contents).with_context(|| format!("in {}", path))?);
    }

    // The file is not available inside the job container
    Ok(env
        .into_iter()
        .filter(|(name, _)| name != vars::ENV_FILE)
        .collect())
}

/// `NAME="value"` lines, later lines winning
fn parse_env_file(contents: &str) -> anyhow::Result<Vec<(String, String)>> {
    let mut parsed = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            bail!("line {}: expected NAME=value", index + 1);
        };
        parsed.push((name.to_string(), unescape(value)));
    }
    Ok(parsed)
}

/// Undo `%q` quoting: one pair of surrounding quotes, escaped quotes and backslashes
fn unescape(value: &str) -> String {
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_collects_buildkite_variables_only() {
        let agent = BuildEnvironment::from_iter([
            ("BUILDKITE_PIPELINE_SLUG", "widgets"),
            ("BUILDKITE_COMMIT", "abc123"),
            ("MASTERMIND_ACCESS_DOCUMENT_PATH", "ci/access.json"),
            ("MASTERMIND_API_KEY", "s3cret"),
            ("AWS_SECRET_ACCESS_KEY", "ambient"),
            ("HOME", "/root"),
        ]);

        let env = collect(&agent).unwrap();

        assert_eq!(env.iter().count(), 3);
        assert_eq!(env.pipeline_slug().unwrap(), "widgets");
        assert_eq!(env.access_document_path(), "ci/access.json");
        assert!(!env.contains("MASTERMIND_API_KEY"));
    }

    #[test]
    fn test_env_file_overrides_and_is_dropped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "BUILDKITE_COMMIT=\"def456\"").unwrap();
        writeln!(file, "DEPLOY_TARGET=\"staging\"").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "GREETING=\"say \\\"hi\\\"\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let agent = BuildEnvironment::from_iter([
            ("BUILDKITE_COMMIT", "abc123".to_string()),
            ("BUILDKITE_ENV_FILE", path),
        ]);
        let env = collect(&agent).unwrap();

        assert_eq!(env.commit().unwrap(), "def456");
        assert_eq!(env.get("DEPLOY_TARGET"), Some("staging"));
        assert_eq!(env.get("GREETING"), Some("say \"hi\""));
        assert!(!env.contains("BUILDKITE_ENV_FILE"));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\"plain\""), "plain");
        assert_eq!(unescape("\"a=b\""), "a=b");
        assert_eq!(unescape("\"\""), "");
        assert_eq!(unescape("\"\\\"quoted\\\"\""), "\"quoted\"");
        assert_eq!(unescape("\"C:\\\\build\""), "C:\\build");
        assert_eq!(unescape("\"line\\n\""), "line\\n");
        assert_eq!(unescape("bare"), "bare");
    }

    #[test]
    fn test_malformed_env_file_line() {
        let err = parse_env_file("GOOD=\"1\"\nBROKEN\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_missing_env_file() {
        let agent = BuildEnvironment::from_iter([("BUILDKITE_ENV_FILE", "/nonexistent/job.env")]);
        assert!(collect(&agent).is_err());
    }
}

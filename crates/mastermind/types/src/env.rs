//! Build environment and the patches applied to it
//!
//! A [`BuildEnvironment`] is never mutated while access is provisioned.
//! Provisioning returns an [`EnvPatch`] which the caller applies to produce
//! the environment handed to the job container.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::vars;

/// A required build variable was absent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("build environment is missing required variable {0}")]
pub struct MissingVariable(pub String);

/// Variables passed to a single job's container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildEnvironment(BTreeMap<String, String>);

impl BuildEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Look up a variable that must be present
    pub fn require(&self, name: &str) -> Result<&str, MissingVariable> {
        self.get(name).ok_or_else(|| MissingVariable(name.to_string()))
    }

    pub fn pipeline_slug(&self) -> Result<&str, MissingVariable> {
        self.require(vars::PIPELINE_SLUG)
    }

    pub fn job_id(&self) -> Result<&str, MissingVariable> {
        self.require(vars::JOB_ID)
    }

    pub fn repo(&self) -> Result<&str, MissingVariable> {
        self.require(vars::REPO)
    }

    pub fn commit(&self) -> Result<&str, MissingVariable> {
        self.require(vars::COMMIT)
    }

    /// Repository-relative path of the access document
    pub fn access_document_path(&self) -> &str {
        self.get(vars::ACCESS_DOCUMENT_PATH)
            .unwrap_or(vars::DEFAULT_ACCESS_DOCUMENT_PATH)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for BuildEnvironment {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K, V> FromIterator<(K, V)> for BuildEnvironment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Variables to add to and remove from a [`BuildEnvironment`]
///
/// A name is never both set and unset; the last call wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvPatch {
    #[serde(default)]
    set: BTreeMap<String, String>,
    #[serde(default)]
    unset: BTreeSet<String>,
}

impl EnvPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.unset.remove(&name);
        self.set.insert(name, value.into());
        self
    }

    pub fn unset(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.set.remove(&name);
        self.unset.insert(name);
        self
    }

    /// Variables assigned by this patch
    pub fn assignments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.set.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Variables removed by this patch
    pub fn removals(&self) -> impl Iterator<Item = &str> {
        self.unset.iter().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.set.get(name).map(String::as_str)
    }

    pub fn removes(&self, name: &str) -> bool {
        self.unset.contains(name)
    }

    /// Produce a new environment with this patch applied
    pub fn apply(&self, env: &BuildEnvironment) -> BuildEnvironment {
        let mut vars = env.0.clone();
        for name in &self.unset {
            vars.remove(name);
        }
        for (name, value) in &self.set {
            vars.insert(name.clone(), value.clone());
        }
        BuildEnvironment(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_env() -> BuildEnvironment {
        BuildEnvironment::from_iter([
            ("BUILDKITE_PIPELINE_SLUG", "widgets"),
            ("BUILDKITE_COMMIT", "abc123"),
            ("AWS_ACCESS_KEY_ID", "AKIAOLD"),
        ])
    }

    #[test]
    fn test_require_reports_variable_name() {
        let env = sample_env();
        assert_eq!(env.pipeline_slug().unwrap(), "widgets");

        let err = env.job_id().unwrap_err();
        assert_eq!(err, MissingVariable("BUILDKITE_JOB_ID".into()));
        assert!(err.to_string().contains("BUILDKITE_JOB_ID"));
    }

    #[test]
    fn test_access_document_path_default_and_override() {
        let env = sample_env();
        assert_eq!(env.access_document_path(), ".buildkite/aws_access.json");

        let env = BuildEnvironment::from_iter([(vars::ACCESS_DOCUMENT_PATH, "ci/access.json")]);
        assert_eq!(env.access_document_path(), "ci/access.json");
    }

    #[test]
    fn test_patch_apply_leaves_input_untouched() {
        let env = sample_env();
        let mut patch = EnvPatch::new();
        patch
            .set("MASTERMIND_ACCESS_KEY_ID", "AKIANEW")
            .unset("AWS_ACCESS_KEY_ID");

        let patched = patch.apply(&env);

        assert_eq!(patched.get("MASTERMIND_ACCESS_KEY_ID"), Some("AKIANEW"));
        assert!(!patched.contains("AWS_ACCESS_KEY_ID"));
        assert_eq!(env.get("AWS_ACCESS_KEY_ID"), Some("AKIAOLD"));
        assert_eq!(patched.get("BUILDKITE_COMMIT"), Some("abc123"));
    }

    #[test]
    fn test_patch_last_operation_wins() {
        let mut patch = EnvPatch::new();
        patch.set("A", "1").unset("A");
        assert!(patch.removes("A"));
        assert_eq!(patch.get("A"), None);

        patch.set("A", "2");
        assert!(!patch.removes("A"));
        assert_eq!(patch.get("A"), Some("2"));
    }
}

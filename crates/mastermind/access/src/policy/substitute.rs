//! `@@NAME@@` placeholder substitution.
//!
//! Placeholders are replaced in string values only. Object keys and
//! non-string leaves pass through unchanged.

use std::sync::LazyLock;

use mastermind_types::BuildEnvironment;
use regex::Regex;
use serde_json::Value;

use crate::error::{AccessError, AccessResult};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("@@([a-zA-Z0-9_]+)@@").expect("placeholder regex is valid"));

/// Replace every placeholder in `value` with the build variable it names.
pub fn substitute(value: Value, env: &BuildEnvironment) -> AccessResult<Value> {
    Ok(match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| substitute(v, env).map(|v| (k, v)))
                .collect::<AccessResult<_>>()?,
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute(v, env))
                .collect::<AccessResult<_>>()?,
        ),
        Value::String(s) => Value::String(substitute_str(&s, env)?),
        other => other,
    })
}

fn substitute_str(input: &str, env: &BuildEnvironment) -> AccessResult<String> {
    let mut output = String::with_capacity(input.len());
    let mut last = 0;

    for captures in PLACEHOLDER.captures_iter(input) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = env
            .get(name.as_str())
            .ok_or_else(|| AccessError::MissingVariable(name.as_str().to_string()))?;

        output.push_str(&input[last..whole.start()]);
        output.push_str(value);
        last = whole.end();
    }

    output.push_str(&input[last..]);
    Ok(output)
}

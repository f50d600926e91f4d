//! Output formatting utilities

use mastermind_types::EnvPatch;

/// How environment changes are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// `unset`/`export` lines for `eval` in a hook
    #[default]
    Exports,
    /// JSON `{"set": {...}, "unset": [...]}`
    Json,
}

/// Render a patch in the given format
pub fn render_patch(patch: &EnvPatch, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Exports => Ok(shell_exports(patch)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(patch)?),
    }
}

/// Removals first, then assignments, one per line
fn shell_exports(patch: &EnvPatch) -> String {
    let unsets = patch.removals().map(|name| format!("unset {}", name));
    let exports = patch
        .assignments()
        .map(|(name, value)| format!("export {}={}", name, shell_quote(value)));

    unsets.chain(exports).fold(String::new(), |mut out, line| {
        out.push_str(&line);
        out.push('\n');
        out
    })
}

/// Single-quote `value` for POSIX shells
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch() -> EnvPatch {
        let mut patch = EnvPatch::new();
        patch
            .set("MASTERMIND_ACCESS_KEY_ID", "ASIAEXAMPLE")
            .set("MASTERMIND_SESSION_TOKEN", "tok/en+=")
            .unset("AWS_SESSION_TOKEN");
        patch
    }

    #[test]
    fn test_shell_exports() {
        let out = render_patch(&patch(), OutputFormat::Exports).unwrap();
        assert_eq!(
            out,
            "unset AWS_SESSION_TOKEN\n\
             export MASTERMIND_ACCESS_KEY_ID='ASIAEXAMPLE'\n\
             export MASTERMIND_SESSION_TOKEN='tok/en+='\n"
        );
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("$HOME `id`"), "'$HOME `id`'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_json_output() {
        let out = render_patch(&patch(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["set"]["MASTERMIND_ACCESS_KEY_ID"], "ASIAEXAMPLE");
        assert_eq!(value["unset"], serde_json::json!(["AWS_SESSION_TOKEN"]));
    }

    #[test]
    fn test_empty_patch() {
        assert_eq!(render_patch(&EnvPatch::new(), OutputFormat::Exports).unwrap(), "");
    }
}

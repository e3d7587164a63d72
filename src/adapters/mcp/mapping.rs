//! Target selectors and the rules that place resolved values into a launch
//! descriptor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::config::McpClientConfig;

const VALUE_PLACEHOLDER: &str = "${value}";

/// Where a resolved credential or parameter value goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetSelector {
    /// `env:KEY`
    Env(String),
    /// `arg:PATTERN`
    Arg(String),
}

impl FromStr for TargetSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, target) = s
            .split_once(':')
            .ok_or_else(|| format!("target selector '{s}' must be env:KEY or arg:PATTERN"))?;
        if target.is_empty() {
            return Err(format!("target selector '{s}' has an empty target"));
        }
        match kind {
            "env" => Ok(TargetSelector::Env(target.to_string())),
            "arg" => Ok(TargetSelector::Arg(target.to_string())),
            other => Err(format!("unknown target selector kind '{other}'")),
        }
    }
}

impl TryFrom<String> for TargetSelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetSelector> for String {
    fn from(selector: TargetSelector) -> Self {
        selector.to_string()
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelector::Env(key) => write!(f, "env:{key}"),
            TargetSelector::Arg(pattern) => write!(f, "arg:{pattern}"),
        }
    }
}

impl TargetSelector {
    pub fn apply(&self, config: &mut McpClientConfig, value: &str) {
        match self {
            TargetSelector::Env(key) => {
                config.envs.insert(key.clone(), value.to_string());
            }
            TargetSelector::Arg(pattern) => apply_arg(&mut config.args, pattern, value),
        }
    }
}

fn apply_arg(args: &mut Vec<String>, pattern: &str, value: &str) {
    if let Some(slot) = args.iter_mut().find(|arg| arg.as_str() == pattern) {
        *slot = value.to_string();
        return;
    }

    let rendered = pattern.replace(VALUE_PLACEHOLDER, value);
    if rendered.contains('=') {
        args.push(rendered);
    } else if rendered.contains(char::is_whitespace) {
        args.extend(rendered.split_whitespace().map(str::to_string));
    } else {
        args.push(rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(args: &[&str]) -> McpClientConfig {
        McpClientConfig {
            command: "npx".into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            envs: Default::default(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn parses_selectors() {
        assert_eq!(
            "env:API_KEY".parse::<TargetSelector>().unwrap(),
            TargetSelector::Env("API_KEY".into())
        );
        assert_eq!(
            "arg:--token=${value}".parse::<TargetSelector>().unwrap(),
            TargetSelector::Arg("--token=${value}".into())
        );
        assert!("API_KEY".parse::<TargetSelector>().is_err());
        assert!("file:x".parse::<TargetSelector>().is_err());
        assert!("env:".parse::<TargetSelector>().is_err());
    }

    #[test]
    fn exact_placeholder_is_replaced_in_place() {
        let mut cfg = config(&["-y", "pkg", "--target", "PLACEHOLDER"]);
        TargetSelector::Arg("PLACEHOLDER".into()).apply(&mut cfg, "store_42");
        assert_eq!(cfg.args, vec!["-y", "pkg", "--target", "store_42"]);
    }

    #[test]
    fn key_value_pattern_is_appended_whole() {
        let mut cfg = config(&["server"]);
        TargetSelector::Arg("--token=${value}".into()).apply(&mut cfg, "abc def");
        assert_eq!(cfg.args, vec!["server", "--token=abc def"]);
    }

    #[test]
    fn whitespace_pattern_is_split() {
        let mut cfg = config(&["server"]);
        TargetSelector::Arg("--root ${value}".into()).apply(&mut cfg, "/data");
        assert_eq!(cfg.args, vec!["server", "--root", "/data"]);
    }

    #[test]
    fn plain_pattern_is_appended() {
        let mut cfg = config(&[]);
        TargetSelector::Arg("${value}".into()).apply(&mut cfg, "/srv/files");
        assert_eq!(cfg.args, vec!["/srv/files"]);
    }

    #[test]
    fn env_selector_overrides_variable() {
        let mut cfg = config(&[]);
        cfg.envs.insert("API_KEY".into(), "dummy".into());
        TargetSelector::Env("API_KEY".into()).apply(&mut cfg, "real");
        assert_eq!(cfg.envs["API_KEY"], "real");
    }
}

//! CLI subcommands for the `batch-orchestrator` binary.
//!
//! ## Usage
//!
//! ```bash
//! batch-orchestrator simulate --items 500 --burst 100   # Drive a simulated workload
//! batch-orchestrator config show                        # Print effective config
//! batch-orchestrator config validate --file orch.toml   # Validate a config file
//! ```

pub mod config_cmd;
pub mod simulate_cmd;

use std::path::PathBuf;

use crate::config::{self, ConfigError, OrchestratorConfig};

/// Value following `flag` in `args`, if present.
pub(crate) fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Config from `--file PATH` when given, otherwise from the environment.
pub fn resolve_config(args: &[String]) -> Result<OrchestratorConfig, ConfigError> {
    match flag_value(args, "--file") {
        Some(path) => config::load_file(&PathBuf::from(path)),
        None => Ok(config::load()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_reads_following_argument() {
        let a = args(&["--items", "10", "--burst", "5"]);
        assert_eq!(flag_value(&a, "--burst"), Some("5"));
        assert_eq!(flag_value(&a, "--missing"), None);
    }

    #[test]
    fn flag_without_value_is_none() {
        let a = args(&["--file"]);
        assert_eq!(flag_value(&a, "--file"), None);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let a = args(&["--file", "/nonexistent/orch.toml"]);
        assert!(matches!(resolve_config(&a), Err(ConfigError::Io { .. })));
    }
}

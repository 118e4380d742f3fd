//! Environment-driven defaults. `.env` is loaded before these are read;
//! command-line flags override them.

/// Log filter directive, e.g. `debug` or `sanity=trace`.
pub const LOG_ENV: &str = "CACHE_SANITY_LOG";
/// Attach size estimates to entries before checking.
pub const ESTIMATE_RAM_ENV: &str = "CACHE_SANITY_ESTIMATE_RAM";

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_filter: String,
    pub estimate_ram: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_filter = lookup(LOG_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let estimate_ram = lookup(ESTIMATE_RAM_ENV).is_some_and(|v| parse_flag(&v));

        Self {
            log_filter,
            estimate_ram,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            config(&[]),
            Config {
                log_filter: "warn".into(),
                estimate_ram: false,
            }
        );
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[(LOG_ENV, "sanity=debug"), (ESTIMATE_RAM_ENV, "TRUE")]);
        assert_eq!(cfg.log_filter, "sanity=debug");
        assert!(cfg.estimate_ram);
    }

    #[test]
    fn test_blank_filter_falls_back() {
        assert_eq!(config(&[(LOG_ENV, "  ")]).log_filter, "warn");
    }

    #[test]
    fn test_flag_values() {
        for yes in ["1", "true", "Yes", " on "] {
            assert!(parse_flag(yes), "{yes}");
        }
        for no in ["0", "false", "", "maybe"] {
            assert!(!parse_flag(no), "{no}");
        }
    }
}

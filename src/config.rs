use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "REPORTCARDD_WORKSPACE";
pub const ENV_LOG: &str = "REPORTCARDD_LOG";
pub const ENV_LOG_JSON: &str = "REPORTCARDD_LOG_JSON";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Opened before the first request when set.
    pub workspace: Option<PathBuf>,
    pub log_directive: Option<String>,
    pub log_json: bool,
}

impl Config {
    /// Reads the process environment, after an optional `.env` file.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
            log_directive: non_empty(ENV_LOG),
            log_json: non_empty(ENV_LOG_JSON)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), Config::default());
    }

    #[test]
    fn reads_workspace_and_log_settings() {
        let c = config(&[
            (ENV_WORKSPACE, "/tmp/ws"),
            (ENV_LOG, "reportcardd=debug"),
            (ENV_LOG_JSON, "TRUE"),
        ]);
        assert_eq!(c.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(c.log_directive.as_deref(), Some("reportcardd=debug"));
        assert!(c.log_json);
    }

    #[test]
    fn blank_values_are_ignored() {
        let c = config(&[(ENV_WORKSPACE, "  "), (ENV_LOG_JSON, "0")]);
        assert_eq!(c.workspace, None);
        assert!(!c.log_json);
    }
}

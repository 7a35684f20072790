use std::{env, path::PathBuf};

/// Platform path list searched for native module libraries.
pub const LIBRARY_PATH_ENV: &str = "CROSSCALL_LIBRARY_PATH";

/// When set to `1` or `true`, failed resolutions are retried after a new
/// module is loaded.
pub const RETRY_FAILED_RESOLUTIONS_ENV: &str = "CROSSCALL_RETRY_FAILED_RESOLUTIONS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Directories searched for libraries, in order. When empty the platform
    /// loader's own search rules apply.
    pub search_paths: Vec<PathBuf>,
    /// By default a failed resolution is cached for the life of the registry.
    pub retry_failed_after_load: bool,
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        let search_paths = env::var_os(LIBRARY_PATH_ENV)
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();
        let retry_failed_after_load = env::var(RETRY_FAILED_RESOLUTIONS_ENV)
            .map(|value| parse_flag(&value))
            .unwrap_or(false);
        Self {
            search_paths,
            retry_failed_after_load,
        }
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_retry_failed_after_load(mut self, retry: bool) -> Self {
        self.retry_failed_after_load = retry;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

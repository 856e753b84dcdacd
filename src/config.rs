//! Environment-derived daemon configuration.
//!
//! `watchd` takes no configuration file (see spec Non-goals); everything
//! it needs is read from a small set of environment variables at startup.

const DEFAULT_SOCKET: &str = "/tmp/watchd.sock";
const DEFAULT_NTFY_URL: &str = "https://ntfy.sh/watchd-alerts";
const DEFAULT_LOG_FILE: &str = "/tmp/watchd.log";

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub socket_path: String,
    pub ntfy_url: String,
    pub log_file: String,
}

impl Config {
    /// Build configuration from the process environment, falling back to
    /// the documented defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            socket_path: std::env::var("WATCHD_SOCKET")
                .unwrap_or_else(|_| DEFAULT_SOCKET.to_string()),
            ntfy_url: std::env::var("WATCHD_NTFY_URL")
                .unwrap_or_else(|_| DEFAULT_NTFY_URL.to_string()),
            log_file: std::env::var("WATCHD_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET.to_string(),
            ntfy_url: DEFAULT_NTFY_URL.to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_env_unset() {
        std::env::remove_var("WATCHD_SOCKET");
        std::env::remove_var("WATCHD_NTFY_URL");
        std::env::remove_var("WATCHD_LOG");

        let config = Config::from_env();
        assert_eq!(config.socket_path, DEFAULT_SOCKET);
        assert_eq!(config.ntfy_url, DEFAULT_NTFY_URL);
        assert_eq!(config.log_file, DEFAULT_LOG_FILE);
    }

    #[test]
    fn honors_overrides() {
        std::env::set_var("WATCHD_SOCKET", "/tmp/custom.sock");
        let config = Config::from_env();
        assert_eq!(config.socket_path, "/tmp/custom.sock");
        std::env::remove_var("WATCHD_SOCKET");
    }
}

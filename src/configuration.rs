//! Operational settings of the coordinator and of agents.
//!
//! Configuration can be created programmatically using [`Configuration::new()`], by reading
//! environment variables using [`Configuration::from_env()`], or from a JSON file using
//! [`Configuration::from_json_file()`].
//!
//! # Environment Variables
//!
//! All values are optional. Unset or unparsable values keep the default.
//!
//! - `PS_HOST` — Address to bind / connect to (default: `127.0.0.1`)
//! - `PS_PORT` — TCP port (default: `5555`)
//! - `PS_MSG_LENGTH` — Maximum frame payload in bytes (default: `4096`)
//! - `PS_INITIAL_DELAY_MS` — Pause after the reset is sent (default: `0`)
//! - `PS_FRAME_DELAY_MS` — Pause after each rendered frame (default: `0`)
//! - `PS_FINAL_DELAY_MS` — Pause before tearing an episode down (default: `0`)
//! - `PS_STEP_TIMEOUT_MS` — Per-message receive timeout, unset means wait forever
//! - `PS_ACTION_POLICY` — `clamp` or `reject` out of range actions (default: `clamp`)
//! - `PS_SEED` — Seed handed to the simulation reset (default: `0`)
//! - `PS_RENDER` — Set to `"true"` to render each frame (default: `false`)
//! - `PS_LOG` — Set to `"true"` to log to a file instead of stderr (default: `false`)

use std::{path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::simulation::ActionPolicy;

/// Settings shared by the server and the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) max_msg_len: usize,
    pub(crate) initial_delay: Duration,
    pub(crate) frame_delay: Duration,
    pub(crate) final_delay: Duration,
    pub(crate) step_timeout: Option<Duration>,
    pub(crate) action_policy: ActionPolicy,
    pub(crate) seed: u64,
    pub(crate) render: bool,
    pub(crate) max_episodes: Option<usize>,
    pub(crate) log_to_file: bool,
}

/// Layout of the JSON config file. Delays are in seconds.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    #[serde(rename = "msg length")]
    msg_length: Option<usize>,
    #[serde(rename = "initial time lapse")]
    initial_time_lapse: Option<f64>,
    #[serde(rename = "frame time lapse")]
    frame_time_lapse: Option<f64>,
    #[serde(rename = "final time lapse")]
    final_time_lapse: Option<f64>,
    #[serde(rename = "step timeout")]
    step_timeout: Option<f64>,
    #[serde(rename = "action policy")]
    action_policy: Option<String>,
    seed: Option<u64>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The server listens on `127.0.0.1:5555`.
    /// - Frames are limited to 4096 bytes.
    /// - No delays are applied and peers may take as long as they want.
    /// - Out of range actions are clamped.
    /// - Nothing is rendered and logs go to stderr.
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            max_msg_len: 4096,
            initial_delay: Duration::ZERO,
            frame_delay: Duration::ZERO,
            final_delay: Duration::ZERO,
            step_timeout: None,
            action_policy: ActionPolicy::Clamp,
            seed: 0,
            render: false,
            max_episodes: None,
            log_to_file: false,
        }
    }

    /// Create configuration from environment variables (see module documentation).
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn parse<T: FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok()?.trim().parse().ok()
        }

        fn parse_millis(var: &str) -> Option<Duration> {
            parse::<u64>(var).map(Duration::from_millis)
        }

        let default = Self::new();
        Self {
            host: std::env::var("PS_HOST").unwrap_or(default.host),
            port: parse("PS_PORT").unwrap_or(default.port),
            max_msg_len: parse("PS_MSG_LENGTH").unwrap_or(default.max_msg_len),
            initial_delay: parse_millis("PS_INITIAL_DELAY_MS").unwrap_or(default.initial_delay),
            frame_delay: parse_millis("PS_FRAME_DELAY_MS").unwrap_or(default.frame_delay),
            final_delay: parse_millis("PS_FINAL_DELAY_MS").unwrap_or(default.final_delay),
            step_timeout: parse_millis("PS_STEP_TIMEOUT_MS").or(default.step_timeout),
            action_policy: parse("PS_ACTION_POLICY").unwrap_or(default.action_policy),
            seed: parse("PS_SEED").unwrap_or(default.seed),
            render: get_env_flag("PS_RENDER", default.render),
            max_episodes: default.max_episodes,
            log_to_file: get_env_flag("PS_LOG", default.log_to_file),
        }
    }

    /// Read a JSON config file. Keys that are absent keep their default value.
    ///
    /// ```json
    /// {
    ///     "host": "127.0.0.1",
    ///     "port": 5555,
    ///     "msg length": 4096,
    ///     "initial time lapse": 1.0,
    ///     "frame time lapse": 0.05,
    ///     "final time lapse": 1.0
    /// }
    /// ```
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let file: FileConfig = serde_json::from_str(text).context("config is not valid JSON")?;

        fn secs(value: f64, key: &str) -> anyhow::Result<Duration> {
            Duration::try_from_secs_f64(value)
                .with_context(|| format!("'{key}' must be a non-negative number of seconds"))
        }

        let mut config = Self::new();
        if let Some(host) = file.host {
            config.host = host;
        }
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(len) = file.msg_length {
            config.max_msg_len = len;
        }
        if let Some(s) = file.initial_time_lapse {
            config.initial_delay = secs(s, "initial time lapse")?;
        }
        if let Some(s) = file.frame_time_lapse {
            config.frame_delay = secs(s, "frame time lapse")?;
        }
        if let Some(s) = file.final_time_lapse {
            config.final_delay = secs(s, "final time lapse")?;
        }
        if let Some(s) = file.step_timeout {
            config.step_timeout = Some(secs(s, "step timeout")?);
        }
        if let Some(policy) = file.action_policy {
            config.action_policy = policy.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(seed) = file.seed {
            config.seed = seed;
        }
        Ok(config)
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn max_msg_len(&self) -> usize {
        self.max_msg_len
    }

    pub fn action_policy(&self) -> ActionPolicy {
        self.action_policy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn render(&self) -> bool {
        self.render
    }

    pub fn log_to_file(&self) -> bool {
        self.log_to_file
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Port `0` lets the OS pick one, see [`Server::local_addr`](crate::server::Server::local_addr).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_msg_len(mut self, len: usize) -> Self {
        self.max_msg_len = len;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn with_final_delay(mut self, delay: Duration) -> Self {
        self.final_delay = delay;
        self
    }

    /// Abort the episode when a peer stays silent for longer than `timeout`.
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_action_policy(mut self, policy: ActionPolicy) -> Self {
        self.action_policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable rendering (and the per-frame delay that goes with it).
    pub fn with_render(mut self, value: bool) -> Self {
        self.render = value;
        self
    }

    /// Stop the episode driver after `n` episodes.
    pub fn with_max_episodes(mut self, n: Option<usize>) -> Self {
        self.max_episodes = n;
        self
    }

    pub fn with_log_to_file(mut self, value: bool) -> Self {
        self.log_to_file = value;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_file_layout_is_understood() {
        let config = Configuration::from_json_str(
            r#"{
                "host": "0.0.0.0",
                "port": 6000,
                "msg length": 2048,
                "initial time lapse": 1.5,
                "frame time lapse": 0.05,
                "final time lapse": 2
            }"#,
        )
        .unwrap();
        assert_eq!(config.address(), "0.0.0.0:6000");
        assert_eq!(config.max_msg_len, 2048);
        assert_eq!(config.initial_delay, Duration::from_millis(1500));
        assert_eq!(config.frame_delay, Duration::from_millis(50));
        assert_eq!(config.final_delay, Duration::from_secs(2));
        assert_eq!(config.step_timeout, None);
    }

    #[test]
    fn missing_keys_keep_defaults() {
        let config = Configuration::from_json_str(r#"{"port": 7000}"#).unwrap();
        assert_eq!(config, Configuration::new().with_port(7000));
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(Configuration::from_json_str(r#"{"frame time lapse": -1}"#).is_err());
        assert!(Configuration::from_json_str(r#"{"action policy": "ignore"}"#).is_err());
        assert!(Configuration::from_json_str("port = 5").is_err());
    }

    #[test]
    fn builder_chains() {
        let config = Configuration::new()
            .with_port(0)
            .with_action_policy(ActionPolicy::Reject)
            .with_step_timeout(Some(Duration::from_secs(1)))
            .with_max_episodes(Some(3));
        assert_eq!(config.port(), 0);
        assert_eq!(config.action_policy(), ActionPolicy::Reject);
        assert_eq!(config.max_episodes, Some(3));
    }
}

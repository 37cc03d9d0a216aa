//! Controller configuration
//!
//! Options are read from command-line flags with environment fallbacks so the
//! operator Deployment can configure them either way.

use std::time::Duration;

use clap::{Args, Parser};

use crate::{DEFAULT_RETRY_DELAY_SECS, DEFAULT_WATCH_TIMEOUT_SECS};

/// Runtime configuration of the VpnGw controller
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Only watch VpnGw resources in this namespace (all namespaces if unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Seconds to wait before redelivering a reconcile that asked for a retry
    #[arg(long, env = "VPNGW_RETRY_DELAY_SECS", default_value_t = DEFAULT_RETRY_DELAY_SECS)]
    pub retry_delay_secs: u64,

    /// Server-side watch timeout in seconds
    #[arg(long, env = "VPNGW_WATCH_TIMEOUT_SECS", default_value_t = DEFAULT_WATCH_TIMEOUT_SECS)]
    pub watch_timeout_secs: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
        }
    }
}

impl ControllerConfig {
    /// Delay before a retryable failure is redelivered
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Configuration from environment variables and defaults only
    ///
    /// Used when the binary is started without the `controller` subcommand.
    pub fn from_env() -> Self {
        #[derive(Parser)]
        struct EnvOnly {
            #[command(flatten)]
            config: ControllerConfig,
        }
        EnvOnly::parse_from(["vpngw-operator"]).config
    }
}

use crate::domain::platform::{Platform, PlatformProbe};
use clap::{Args, Parser, ValueEnum};
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub coordinator: CoordinatorConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct CoordinatorConfig {
    /// Application name passed to the transport and used as the local notification channel
    #[arg(long, env = "PUSH_LIFECYCLE_APP_NAME", default_value = "push-lifecycle")]
    pub app_name: String,

    /// Platform family profile. Detected from the host when omitted
    #[arg(long, env = "PUSH_LIFECYCLE_PLATFORM", value_enum)]
    pub platform: Option<Platform>,

    /// Delay before the single identity fetch retry
    #[arg(long, env = "PUSH_LIFECYCLE_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Capacity of the push stream broadcast buffer
    #[arg(long, env = "PUSH_LIFECYCLE_STREAM_CAPACITY", default_value_t = 64)]
    pub stream_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { app_name: "push-lifecycle".to_string(), platform: None, retry_delay_ms: 1000, stream_capacity: 64 }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// The configured platform, or the one the probe reports.
    #[must_use]
    pub fn resolve_platform(&self, probe: &dyn PlatformProbe) -> Platform {
        self.platform.unwrap_or_else(|| Platform::detect(probe))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "PUSH_LIFECYCLE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint. Traces and metrics are only exported when set
    #[arg(long, env = "PUSH_LIFECYCLE_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::platform::HostPlatform;

    #[test]
    fn test_defaults_parse() {
        let config = Config::try_parse_from(["push-lifecycle"]).unwrap();
        assert_eq!(config.coordinator.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.coordinator.stream_capacity, 64);
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
        assert!(config.telemetry.otlp_endpoint.is_none());
    }

    #[test]
    fn test_platform_override_wins_over_probe() {
        let config =
            Config::try_parse_from(["push-lifecycle", "--platform", "apple", "--retry-delay-ms", "5"]).unwrap();
        assert_eq!(config.coordinator.resolve_platform(&HostPlatform), Platform::Apple);
        assert_eq!(config.coordinator.retry_delay(), Duration::from_millis(5));
    }
}

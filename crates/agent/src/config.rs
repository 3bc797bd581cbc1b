// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Per-device control-plane agent: reconciles running configuration against
/// a controller-computed desired configuration, and measures peer RTT.
#[derive(Debug, Clone, Parser)]
#[command(name = "dz-agent", version, about)]
pub struct Config {
    /// This device's identity, as sent to the controller and device API.
    #[arg(long, env = "DZ_AGENT_DEVICE_ID")]
    pub device_id: String,

    /// This device's location identity.
    #[arg(long, env = "DZ_AGENT_LOCATION_ID")]
    pub location_id: String,

    /// Base URL of the controller RPC endpoint.
    #[arg(long, env = "DZ_AGENT_CONTROLLER_ADDR")]
    pub controller_addr: String,

    /// Base URL of the device management API.
    #[arg(long, env = "DZ_AGENT_DEVICE_ADDR")]
    pub device_addr: String,

    /// Reconciliation poll interval, in seconds.
    #[arg(long, env = "DZ_AGENT_POLL_INTERVAL_SECS", default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// Controller RPC timeout, in seconds.
    #[arg(long, env = "DZ_AGENT_CONTROLLER_TIMEOUT_SECS", default_value_t = 10)]
    pub controller_timeout_secs: u64,

    /// Maximum age, in seconds, beyond which a configuration lock may be
    /// forcibly released regardless of holder.
    #[arg(long, env = "DZ_AGENT_MAX_LOCK_AGE_SECS", default_value_t = 3600)]
    pub max_lock_age_secs: u64,

    /// Enable the telemetry collector.
    #[arg(long, env = "DZ_AGENT_TELEMETRY_ENABLED", default_value_t = true)]
    pub telemetry_enabled: bool,

    /// UDP port the telemetry collector listens on and probes from.
    #[arg(long, env = "DZ_AGENT_TELEMETRY_PORT", default_value_t = 29_531)]
    pub telemetry_port: u16,

    /// Telemetry sampling interval, in seconds.
    #[arg(long, env = "DZ_AGENT_TELEMETRY_SAMPLING_INTERVAL_SECS", default_value_t = 1)]
    pub telemetry_sampling_interval_secs: u64,

    /// Telemetry submission (flush) interval, in seconds.
    #[arg(long, env = "DZ_AGENT_TELEMETRY_SUBMISSION_INTERVAL_SECS", default_value_t = 60)]
    pub telemetry_submission_interval_secs: u64,

    /// Directory telemetry sample files are persisted under.
    #[arg(long, env = "DZ_AGENT_TELEMETRY_STORAGE_PATH", default_value = "./telemetry-data")]
    pub telemetry_storage_path: PathBuf,

    /// Optional path to a JSON peer file, re-read best-effort each cycle.
    #[arg(long, env = "DZ_AGENT_TELEMETRY_PEERS_FILE")]
    pub telemetry_peers_file: Option<PathBuf>,

    /// Maximum samples retained per link before rotation.
    #[arg(long, env = "DZ_AGENT_TELEMETRY_MAX_SAMPLES", default_value_t = 1000)]
    pub telemetry_max_samples_per_link: usize,

    /// Whether to probe peers flagged as internet peers.
    #[arg(long, env = "DZ_AGENT_TELEMETRY_INTERNET_PROBES", default_value_t = false)]
    pub telemetry_internet_probes: bool,

    /// Log format: `json` or `text`.
    #[arg(long, env = "DZ_AGENT_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DZ_AGENT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate configuration invariants. Fatal at startup per spec.md §7 —
    /// the process must exit before binding any resources if this fails.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.device_id.is_empty(), "device id must not be empty");
        anyhow::ensure!(!self.location_id.is_empty(), "location id must not be empty");
        anyhow::ensure!(!self.controller_addr.is_empty(), "controller address must not be empty");
        anyhow::ensure!(!self.device_addr.is_empty(), "device address must not be empty");
        anyhow::ensure!(self.poll_interval_secs >= 1, "poll interval must be at least one second");
        anyhow::ensure!(
            self.controller_timeout_secs >= 1,
            "controller timeout must be at least one second"
        );

        if self.telemetry_enabled {
            anyhow::ensure!(self.telemetry_port != 0, "telemetry port must be in 1..65535");
            anyhow::ensure!(
                self.telemetry_sampling_interval_secs >= 1,
                "telemetry sampling interval must be at least one second"
            );
            anyhow::ensure!(
                self.telemetry_submission_interval_secs >= self.telemetry_sampling_interval_secs,
                "telemetry submission interval must be >= sampling interval"
            );
            anyhow::ensure!(
                !self.telemetry_storage_path.as_os_str().is_empty(),
                "telemetry storage path must not be empty"
            );
            anyhow::ensure!(
                self.telemetry_max_samples_per_link >= 100,
                "telemetry max samples per link must be >= 100"
            );
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn controller_timeout(&self) -> Duration {
        Duration::from_secs(self.controller_timeout_secs)
    }

    pub fn max_lock_age(&self) -> Duration {
        Duration::from_secs(self.max_lock_age_secs)
    }

    pub fn telemetry_config(&self) -> dz_telemetry::CollectorConfig {
        dz_telemetry::CollectorConfig {
            local_device: self.device_id.clone(),
            local_location: self.location_id.clone(),
            udp_port: self.telemetry_port,
            sampling_interval_secs: self.telemetry_sampling_interval_secs,
            submission_interval_secs: self.telemetry_submission_interval_secs,
            storage_path: self.telemetry_storage_path.clone(),
            max_samples_per_link: self.telemetry_max_samples_per_link,
            internet_probes_enabled: self.telemetry_internet_probes,
        }
    }
}

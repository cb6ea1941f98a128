//! CLI argument definitions for netlog-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.
//! Flags given here take precedence over both the config file and
//! `NETLOG_*` environment variables.

use std::path::PathBuf;

use clap::Parser;

use netlog_core::config::NetlogConfig;

/// netlog network syslog daemon.
///
/// Receives device syslog over UDP/TCP, identifies the device OS,
/// extracts structured objects and publishes them to subscribers.
#[derive(Parser, Debug)]
#[command(name = "netlog-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to netlog.toml configuration file.
    #[arg(short, long, default_value = "/etc/netlog/netlog.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and device profiles, then exit.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path.
    #[arg(long)]
    pub pid_file: Option<String>,

    /// Override the device profile directory.
    #[arg(long)]
    pub profiles_dir: Option<String>,

    /// Publish without encryption and skip the key exchange server.
    #[arg(long)]
    pub disable_security: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut NetlogConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
        if let Some(dir) = &self.profiles_dir {
            config.engine.profiles_dir = dir.clone();
        }
        if self.disable_security {
            config.auth.disable_security = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_etc() {
        let cli = DaemonCli::parse_from(["netlog-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/netlog/netlog.toml"));
        assert!(!cli.validate);
        assert!(!cli.disable_security);
    }

    #[test]
    fn overrides_win_over_config() {
        let cli = DaemonCli::parse_from([
            "netlog-daemon",
            "--log-level",
            "debug",
            "--profiles-dir",
            "/tmp/profiles",
            "--disable-security",
        ]);
        let mut config = NetlogConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.engine.profiles_dir, "/tmp/profiles");
        assert!(config.auth.disable_security);
        // untouched fields keep their config value
        assert_eq!(config.general.log_format, NetlogConfig::default().general.log_format);
    }
}

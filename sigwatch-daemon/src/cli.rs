//! CLI argument definitions for sigwatch-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use sigwatch_core::config::SigwatchConfig;

/// Signature-based network intrusion detection daemon.
///
/// Captures frames on one interface, matches them against the signature
/// rule file, writes alerts and funnels unmatched traffic from tracked
/// sources to the anomaly collaborator.
#[derive(Parser, Debug, Default)]
#[command(name = "sigwatch-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to sigwatch.toml configuration file.
    #[arg(short, long, default_value = "/etc/sigwatch/sigwatch.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the capture interface.
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Override the rule file path.
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Compile a rule file, print accepted/rejected counts and exit.
    #[arg(long, value_name = "PATH")]
    pub check_rules: Option<PathBuf>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of file and environment settings.
    pub fn apply_overrides(&self, config: &mut SigwatchConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(interface) = &self.interface {
            config.sniffer.interface = interface.clone();
        }
        if let Some(rules) = &self.rules {
            config.sniffer.rule_path = rules.display().to_string();
        }
    }
}

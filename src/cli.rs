//! Command-line interface definitions for redirect-setup.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DnsMethod;

/// Redirect a set of domains on this host through a local TLS reverse proxy.
///
/// redirect-setup installs a trusted CA and leaf certificate, registers a local
/// reverse proxy and DNS proxy as services, points every active adapter's DNS at
/// loopback and maps the target domains to the best-performing upstream address.
///
/// Run without a subcommand for the interactive menu.
#[derive(Parser, Debug)]
#[command(name = "redirect-setup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to run (or omit for the interactive menu).
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to additional config file.
    ///
    /// This config file is merged on top of system and user configs,
    /// giving it the highest priority (except for CLI flags).
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Install base directory holding the bundled tools.
    ///
    /// Defaults to the directory containing the redirect-setup executable.
    #[arg(long = "base-dir", value_name = "PATH", global = true)]
    pub base_dir: Option<PathBuf>,

    /// DNS redirection mechanism.
    #[arg(long = "dns-method", value_enum, global = true)]
    pub dns_method: Option<DnsMethod>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Subcommands for redirect-setup.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Install certificates, services and DNS redirection.
    Install,

    /// Re-probe the upstream endpoint and rewrite the redirect map.
    Refresh {
        /// Use the other endpoint source for this run.
        #[arg(long)]
        alternate: bool,
    },

    /// Remove everything a previous install put in place.
    Uninstall,

    /// Show the install record and service registration state.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["redirect-setup"]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
        assert!(cli.dns_method.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_parse_refresh_alternate() {
        let cli = Cli::parse_from(["redirect-setup", "refresh", "--alternate"]);
        assert_eq!(cli.command, Some(Commands::Refresh { alternate: true }));

        let cli = Cli::parse_from(["redirect-setup", "refresh"]);
        assert_eq!(cli.command, Some(Commands::Refresh { alternate: false }));
    }

    #[test]
    fn test_cli_parse_global_options_after_subcommand() {
        let cli = Cli::parse_from([
            "redirect-setup",
            "install",
            "--base-dir",
            "/opt/redirect",
            "--dns-method",
            "adapter-config",
            "-vv",
        ]);

        assert_eq!(cli.command, Some(Commands::Install));
        assert_eq!(cli.base_dir, Some(PathBuf::from("/opt/redirect")));
        assert_eq!(cli.dns_method, Some(DnsMethod::AdapterConfig));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_rejects_unknown_dns_method() {
        let result = Cli::try_parse_from(["redirect-setup", "--dns-method", "netsh"]);
        assert!(result.is_err());
    }
}

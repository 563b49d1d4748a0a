//! redirect-setup: route a set of domains through a local TLS reverse proxy.
//!
//! Installing makes this host resolve the target domains to a locally running
//! reverse proxy that presents a certificate from a locally trusted CA, and
//! makes the proxy forward to the best-performing upstream address. Everything
//! installed can be removed again, including CAs trusted by earlier runs.
//!
//! # Architecture
//!
//! - **Config**: hierarchical TOML configuration and the resolved install layout
//! - **Process**: blocking external program invocation behind a trait
//! - **Endpoint**: upstream probing and the `hosts.txt` redirect map
//! - **Certs**: CA and leaf generation, trust store, bookkeeping
//! - **Service**: reverse proxy and DNS proxy service lifecycle
//! - **DNS**: per-adapter DNS redirection strategies
//! - **Orchestrator**: Install / Refresh / Uninstall state machine and install record
//! - **Telemetry**: structured audit events (file or syslog)
//! - **Menu**: interactive console front end

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod certs;
pub mod cli;
pub mod cli_handler;
pub mod config;
pub mod dns;
pub mod endpoint;
pub mod menu;
pub mod orchestrator;
pub mod process;
pub mod service;
pub mod telemetry;

//! Configuration system for redirect-setup.
//!
//! This module provides TOML configuration loading with hierarchy merging and
//! the resolved [`InstallLayout`] that turns relative tool paths into absolute
//! ones.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults (`config/default.toml`)
//! 2. System config: `%ProgramData%\redirect-setup\config.toml` (Windows) or
//!    `/etc/redirect-setup/config.toml`
//! 3. User config: `<config dir>/redirect-setup/config.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. CLI flags (highest priority)
//!
//! # Merge Behavior
//!
//! - **Scalars** (log_level, key_bits, service names) are **overridden** when set
//! - **Target patterns**, probe arguments and loopback addresses are **replaced**
//!   by a later non-empty list
//! - **Mirror map files** are **appended**
//! - **Service verb tables** are **merged** by verb
//!
//! ```toml
//! [target]
//! patterns = ["*.example.test"]
//!
//! [dns]
//! method = "registry"
//! ```

mod error;
mod layout;
mod loader;
mod schema;

pub use error::ConfigError;
pub use layout::{INSTALL_RECORD_FILE, InstallLayout};
pub use loader::ConfigLoader;
pub use schema::{
    AuditConfig, AuditSink, CertificateConfig, Config, DEFAULT_CONFIG, DnsConfig, DnsMethod,
    GeneralConfig, ProbeConfig, ProbeSource, RedirectConfig, ServiceConfig,
    ServiceControlKind, ServicesConfig, TargetConfig,
};

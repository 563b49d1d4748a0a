//! Configuration schema definitions.
//!
//! This module defines the structure of the redirect-setup configuration files.
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults (`config/default.toml`)
//! 2. System config
//! 3. User config: `<config dir>/redirect-setup/config.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. CLI flags (highest priority)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use super::error::ConfigError;
use crate::service::LifecycleVerb;

/// Embedded default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Domains to redirect.
    #[serde(default)]
    pub target: TargetConfig,

    /// Upstream endpoint probing.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Redirect map output.
    #[serde(default)]
    pub redirect: RedirectConfig,

    /// DNS redirection mechanism.
    #[serde(default)]
    pub dns: DnsConfig,

    /// CA and leaf certificate parameters.
    #[serde(default)]
    pub certificate: CertificateConfig,

    /// Managed background services.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Audit event sink.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    /// Parse the embedded defaults.
    pub fn embedded() -> Result<Self, ConfigError> {
        toml::from_str(DEFAULT_CONFIG).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<embedded:default.toml>"),
            source: e,
        })
    }

    /// Merge another config into this one.
    ///
    /// Scalars are overridden when the other value is set. The target pattern
    /// list, probe arguments, loopback and pinned adapter lists are replaced by
    /// a non-empty later list. Mirror map files are appended.
    pub fn merge(&mut self, other: Config) {
        self.general.merge(other.general);
        self.target.merge(other.target);
        self.probe.merge(other.probe);
        self.redirect.merge(other.redirect);
        self.dns.merge(other.dns);
        self.certificate.merge(other.certificate);
        self.services.reverse_proxy.merge(other.services.reverse_proxy);
        self.services.dns_proxy.merge(other.services.dns_proxy);
        self.audit.merge(other.audit);
    }

    /// Check values that cannot be expressed by the schema alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.patterns.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "target.patterns",
                "at least one domain pattern is required",
            ));
        }

        self.dns.loopback_addresses()?;

        self.redirect
            .bypass_address
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::invalid("redirect.bypass_address", e.to_string()))?;

        if self.certificate.key_bits == 0 {
            return Err(ConfigError::invalid("certificate.key_bits", "must be non-zero"));
        }
        if self.certificate.ca_validity_days == 0 || self.certificate.leaf_validity_days == 0 {
            return Err(ConfigError::invalid(
                "certificate.*_validity_days",
                "must be non-zero",
            ));
        }

        self.services
            .reverse_proxy
            .validate("services.reverse_proxy")?;
        self.services.dns_proxy.validate("services.dns_proxy")?;

        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GeneralConfig {
    /// Install base directory. Empty means the executable's directory.
    #[serde(default)]
    pub base_dir: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub log_level: String,
}

impl GeneralConfig {
    fn merge(&mut self, other: GeneralConfig) {
        if !other.base_dir.as_os_str().is_empty() {
            self.base_dir = other.base_dir;
        }
        if !other.log_level.is_empty() {
            self.log_level = other.log_level;
        }
    }
}

/// Redirection target configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TargetConfig {
    /// Domain glob patterns, e.g. `*.example.com`.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl TargetConfig {
    fn merge(&mut self, other: TargetConfig) {
        if !other.patterns.is_empty() {
            self.patterns = other.patterns;
        }
    }
}

/// Where upstream endpoint candidates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeSource {
    /// Run the external latency tool and take its best-ranked row.
    LatencyTool,
    /// Resolve a well-known anycast hostname and take every address.
    DnsLookup,
}

impl ProbeSource {
    /// The other source; used by the menu's alternate refresh.
    pub fn alternate(self) -> Self {
        match self {
            ProbeSource::LatencyTool => ProbeSource::DnsLookup,
            ProbeSource::DnsLookup => ProbeSource::LatencyTool,
        }
    }
}

impl fmt::Display for ProbeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeSource::LatencyTool => write!(f, "latency-tool"),
            ProbeSource::DnsLookup => write!(f, "dns-lookup"),
        }
    }
}

/// Endpoint probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProbeConfig {
    /// Default probe source.
    #[serde(default)]
    pub source: Option<ProbeSource>,

    /// Latency tool executable (relative to base_dir).
    #[serde(default)]
    pub tool: PathBuf,

    /// Latency tool arguments. `${OUTPUT}` and `${TARGET}` are expanded.
    #[serde(default)]
    pub tool_args: Vec<String>,

    /// CSV file the latency tool writes (relative to base_dir).
    #[serde(default)]
    pub result_file: PathBuf,

    /// Hostname resolved by the `dns-lookup` source.
    #[serde(default)]
    pub lookup_host: String,
}

impl ProbeConfig {
    fn merge(&mut self, other: ProbeConfig) {
        if other.source.is_some() {
            self.source = other.source;
        }
        if !other.tool.as_os_str().is_empty() {
            self.tool = other.tool;
        }
        if !other.tool_args.is_empty() {
            self.tool_args = other.tool_args;
        }
        if !other.result_file.as_os_str().is_empty() {
            self.result_file = other.result_file;
        }
        if !other.lookup_host.is_empty() {
            self.lookup_host = other.lookup_host;
        }
    }

    /// Configured source, defaulting to the latency tool.
    pub fn source(&self) -> ProbeSource {
        self.source.unwrap_or(ProbeSource::LatencyTool)
    }
}

/// Redirect map configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RedirectConfig {
    /// Hosts file consumed by the DNS proxy (relative to base_dir).
    #[serde(default)]
    pub hosts_file: PathBuf,

    /// Additional files that receive an identical copy of the map.
    #[serde(default)]
    pub mirror_files: Vec<PathBuf>,

    /// Address of the fixed bypass entry.
    #[serde(default)]
    pub bypass_address: String,

    /// Pattern of the fixed bypass entry.
    #[serde(default)]
    pub bypass_pattern: String,
}

impl RedirectConfig {
    fn merge(&mut self, other: RedirectConfig) {
        if !other.hosts_file.as_os_str().is_empty() {
            self.hosts_file = other.hosts_file;
        }
        self.mirror_files.extend(other.mirror_files);
        if !other.bypass_address.is_empty() {
            self.bypass_address = other.bypass_address;
        }
        if !other.bypass_pattern.is_empty() {
            self.bypass_pattern = other.bypass_pattern;
        }
    }
}

/// DNS redirection mechanism selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DnsMethod {
    /// Probe capabilities and pick the best available mechanism.
    Auto,
    /// Write per-adapter `NameServer` registry values.
    Registry,
    /// Call `SetDNSServerSearchOrder` on adapter configuration objects.
    AdapterConfig,
    /// Use the OS DNS-client cmdlets for all adapters at once.
    DnsClient,
}

impl fmt::Display for DnsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsMethod::Auto => write!(f, "auto"),
            DnsMethod::Registry => write!(f, "registry"),
            DnsMethod::AdapterConfig => write!(f, "adapter-config"),
            DnsMethod::DnsClient => write!(f, "dns-client"),
        }
    }
}

/// DNS redirection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DnsConfig {
    /// Mechanism to use.
    #[serde(default)]
    pub method: Option<DnsMethod>,

    /// Loopback addresses the adapters are pointed at.
    #[serde(default)]
    pub loopback: Vec<String>,

    /// Pin adapter IDs instead of enumerating active adapters.
    #[serde(default)]
    pub adapters: Vec<String>,
}

impl DnsConfig {
    fn merge(&mut self, other: DnsConfig) {
        if other.method.is_some() {
            self.method = other.method;
        }
        if !other.loopback.is_empty() {
            self.loopback = other.loopback;
        }
        if !other.adapters.is_empty() {
            self.adapters = other.adapters;
        }
    }

    /// Configured method, defaulting to `auto`.
    pub fn method(&self) -> DnsMethod {
        self.method.unwrap_or(DnsMethod::Auto)
    }

    /// Parsed loopback addresses.
    pub fn loopback_addresses(&self) -> Result<Vec<IpAddr>, ConfigError> {
        let addrs = self
            .loopback
            .iter()
            .map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|e| ConfigError::invalid("dns.loopback", format!("{s}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if addrs.is_empty() {
            return Err(ConfigError::invalid("dns.loopback", "no addresses configured"));
        }
        if let Some(bad) = addrs.iter().find(|a| !a.is_loopback()) {
            return Err(ConfigError::invalid(
                "dns.loopback",
                format!("{bad} is not a loopback address"),
            ));
        }
        Ok(addrs)
    }
}

/// Certificate generation parameters.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CertificateConfig {
    /// Common name of the root CA.
    #[serde(default)]
    pub ca_common_name: String,

    /// Common name of the leaf certificate.
    #[serde(default)]
    pub leaf_common_name: String,

    /// Requested key strength in bits.
    #[serde(default)]
    pub key_bits: u32,

    /// CA validity in days.
    #[serde(default)]
    pub ca_validity_days: u32,

    /// Leaf validity in days.
    #[serde(default)]
    pub leaf_validity_days: u32,

    /// Folder recording every CA added to the trust store (relative to base_dir).
    #[serde(default)]
    pub bookkeeping_dir: PathBuf,

    /// Folder the reverse proxy reads `cert.pem` / `cert.key` from.
    #[serde(default)]
    pub tls_dir: PathBuf,
}

impl CertificateConfig {
    fn merge(&mut self, other: CertificateConfig) {
        if !other.ca_common_name.is_empty() {
            self.ca_common_name = other.ca_common_name;
        }
        if !other.leaf_common_name.is_empty() {
            self.leaf_common_name = other.leaf_common_name;
        }
        if other.key_bits != 0 {
            self.key_bits = other.key_bits;
        }
        if other.ca_validity_days != 0 {
            self.ca_validity_days = other.ca_validity_days;
        }
        if other.leaf_validity_days != 0 {
            self.leaf_validity_days = other.leaf_validity_days;
        }
        if !other.bookkeeping_dir.as_os_str().is_empty() {
            self.bookkeeping_dir = other.bookkeeping_dir;
        }
        if !other.tls_dir.as_os_str().is_empty() {
            self.tls_dir = other.tls_dir;
        }
    }
}

/// The two managed services.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServicesConfig {
    /// The TLS reverse proxy.
    #[serde(default)]
    pub reverse_proxy: ServiceConfig,

    /// The DNS proxy answering for redirected names.
    #[serde(default)]
    pub dns_proxy: ServiceConfig,
}

/// How a service's registration is controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceControlKind {
    /// An nssm-style helper registers the executable as a service.
    Helper,
    /// The executable registers itself through verb arguments.
    SelfManaged,
}

/// One managed service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServiceConfig {
    /// Host-unique service name.
    #[serde(default)]
    pub name: String,

    /// Service executable (relative to base_dir).
    #[serde(default)]
    pub executable: PathBuf,

    /// Extra arguments passed to the executable when registered via a helper.
    #[serde(default)]
    pub args: Vec<String>,

    /// Control style.
    #[serde(default)]
    pub control: Option<ServiceControlKind>,

    /// Helper executable override. Empty selects the bundled nssm build.
    #[serde(default)]
    pub helper: PathBuf,

    /// Verb argument table for self-managed services.
    #[serde(default)]
    pub verbs: BTreeMap<LifecycleVerb, String>,

    /// Exit codes from `uninstall` that mean "was not installed".
    #[serde(default)]
    pub absent_exit_codes: Vec<i32>,
}

impl ServiceConfig {
    fn merge(&mut self, other: ServiceConfig) {
        if !other.name.is_empty() {
            self.name = other.name;
        }
        if !other.executable.as_os_str().is_empty() {
            self.executable = other.executable;
        }
        if !other.args.is_empty() {
            self.args = other.args;
        }
        if other.control.is_some() {
            self.control = other.control;
        }
        if !other.helper.as_os_str().is_empty() {
            self.helper = other.helper;
        }
        self.verbs.extend(other.verbs);
        if !other.absent_exit_codes.is_empty() {
            self.absent_exit_codes = other.absent_exit_codes;
        }
    }

    /// Configured control style, defaulting to helper-managed.
    pub fn control(&self) -> ServiceControlKind {
        self.control.unwrap_or(ServiceControlKind::Helper)
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid(&format!("{field}.name"), "must not be empty"));
        }
        if self.name.contains(char::is_whitespace) {
            return Err(ConfigError::invalid(
                &format!("{field}.name"),
                "must not contain whitespace",
            ));
        }
        if self.executable.as_os_str().is_empty() {
            return Err(ConfigError::invalid(
                &format!("{field}.executable"),
                "must not be empty",
            ));
        }
        if self.control() == ServiceControlKind::SelfManaged {
            for verb in [LifecycleVerb::Install, LifecycleVerb::Start, LifecycleVerb::Uninstall] {
                if !self.verbs.contains_key(&verb) {
                    return Err(ConfigError::invalid(
                        &format!("{field}.verbs"),
                        format!("self-managed service needs a `{verb}` verb"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Where audit events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditSink {
    /// Append JSON lines to `audit.file`.
    File,
    /// Send to the local syslog daemon (unix only).
    Syslog,
    /// Discard events.
    None,
}

/// Audit configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuditConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: Option<AuditSink>,

    /// Audit log file (relative to base_dir).
    #[serde(default)]
    pub file: PathBuf,
}

impl AuditConfig {
    fn merge(&mut self, other: AuditConfig) {
        if other.sink.is_some() {
            self.sink = other.sink;
        }
        if !other.file.as_os_str().is_empty() {
            self.file = other.file;
        }
    }

    /// Configured sink, defaulting to a file.
    pub fn sink(&self) -> AuditSink {
        self.sink.unwrap_or(AuditSink::File)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_empty() {
        let config = Config::default();

        assert!(config.general.base_dir.as_os_str().is_empty());
        assert!(config.target.patterns.is_empty());
        assert!(config.probe.source.is_none());
        assert_eq!(config.probe.source(), ProbeSource::LatencyTool);
        assert_eq!(config.dns.method(), DnsMethod::Auto);
    }

    #[test]
    fn test_embedded_defaults_parse_and_validate() {
        let config = Config::embedded().expect("default.toml should parse as Config");
        config.validate().unwrap();

        assert_eq!(config.target.patterns, vec!["*.iwara.tv".to_string()]);
        assert_eq!(config.probe.source(), ProbeSource::LatencyTool);
        assert_eq!(config.probe.tool_args, vec!["-o", "${OUTPUT}", "-p", "0"]);
        assert_eq!(config.redirect.bypass_address, "127.0.0.5");
        assert_eq!(config.dns.method(), DnsMethod::Auto);
        assert_eq!(config.services.reverse_proxy.control(), ServiceControlKind::Helper);
        assert_eq!(
            config.services.dns_proxy.control(),
            ServiceControlKind::SelfManaged
        );
        assert_eq!(
            config.services.dns_proxy.verbs.get(&LifecycleVerb::PurgeCache),
            Some(&"PurgeAcrylicCacheData".to_string())
        );
        assert_eq!(config.audit.sink(), AuditSink::File);
    }

    #[test]
    fn test_merge_scalars_override() {
        let mut base = Config::embedded().unwrap();
        let override_config: Config = toml::from_str(
            r#"
            [general]
            log_level = "debug"

            [probe]
            source = "dns-lookup"

            [certificate]
            key_bits = 256
        "#,
        )
        .unwrap();

        base.merge(override_config);

        assert_eq!(base.general.log_level, "debug");
        assert_eq!(base.probe.source(), ProbeSource::DnsLookup);
        assert_eq!(base.certificate.key_bits, 256);
        // Untouched values survive.
        assert_eq!(base.certificate.ca_validity_days, 30000);
    }

    #[test]
    fn test_merge_target_patterns_replace() {
        let mut base = Config::embedded().unwrap();
        let override_config: Config = toml::from_str(
            r#"
            [target]
            patterns = ["*.example.test", "example.test"]
        "#,
        )
        .unwrap();

        base.merge(override_config);

        assert_eq!(base.target.patterns, vec!["*.example.test", "example.test"]);
    }

    #[test]
    fn test_merge_mirror_files_append() {
        let mut base = Config::default();
        base.redirect.mirror_files = vec![PathBuf::from("a.txt")];
        let mut other = Config::default();
        other.redirect.mirror_files = vec![PathBuf::from("b.txt")];

        base.merge(other);

        assert_eq!(
            base.redirect.mirror_files,
            vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
        );
    }

    #[test]
    fn test_merge_service_verbs_extend() {
        let mut base = Config::embedded().unwrap();
        let other: Config = toml::from_str(
            r#"
            [services.dns_proxy.verbs]
            restart = "RestartIt"
        "#,
        )
        .unwrap();

        base.merge(other);

        let verbs = &base.services.dns_proxy.verbs;
        assert_eq!(verbs.get(&LifecycleVerb::Restart), Some(&"RestartIt".to_string()));
        assert_eq!(
            verbs.get(&LifecycleVerb::Install),
            Some(&"InstallAcrylicService".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_empty_patterns() {
        let mut config = Config::embedded().unwrap();
        config.target.patterns = vec![" ".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "target.patterns"
        ));
    }

    #[test]
    fn test_validate_rejects_non_loopback_dns() {
        let mut config = Config::embedded().unwrap();
        config.dns.loopback = vec!["8.8.8.8".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_self_managed_without_verbs() {
        let mut config = Config::embedded().unwrap();
        config.services.dns_proxy.verbs.remove(&LifecycleVerb::Install);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("install"));
    }

    #[test]
    fn test_validate_rejects_service_name_with_spaces() {
        let mut config = Config::embedded().unwrap();
        config.services.reverse_proxy.name = "my proxy".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_source_alternate() {
        assert_eq!(ProbeSource::LatencyTool.alternate(), ProbeSource::DnsLookup);
        assert_eq!(ProbeSource::DnsLookup.alternate(), ProbeSource::LatencyTool);
    }

    #[test]
    fn test_config_serialize_roundtrips_method() {
        let mut config = Config::default();
        config.dns.method = Some(DnsMethod::AdapterConfig);
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("adapter-config"));
    }
}

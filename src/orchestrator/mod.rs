//! Install, Refresh, Uninstall and Status.
//!
//! The orchestrator owns one instance of every component and walks them in
//! a fixed order. Progress is written to the [`InstallRecord`] after each
//! completed step; there is no rollback, and every step is safe to repeat,
//! so rerunning an operation converges on the intended state.
//!
//! ```text
//! Uninstalled ──install──▶ Installing ──▶ Installed ──uninstall──▶ Uninstalling ──▶ Uninstalled
//!                                           │    ▲
//!                                     refresh    │
//!                                           ▼    │
//!                                         Refreshing
//! ```

mod error;
mod record;

pub use error::{OrchestratorError, RecordError};
pub use record::{InstallRecord, InstallState};

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::certs::{CertError, CertificateInstaller, CertutilTrustStore, TrustStore, UninstallReport};
use crate::config::{CertificateConfig, Config, ConfigError, InstallLayout, ProbeSource};
use crate::dns::{
    AdapterSource, DnsRedirector, NetworkAdapterRef, StaticAdapters, SystemAdapters,
    create_redirector,
};
use crate::endpoint::{
    EndpointProber, HostResolver, LatencyTool, RedirectEntry, RedirectMapWriter,
    RedirectionTarget, SystemResolver, UpstreamEndpoint, entries_for, remove_map_files,
};
use crate::process::{CommandRunner, SystemRunner};
use crate::service::{ServiceControl, ServiceDescriptor, ServiceSupervisor};
use crate::telemetry::{AuditEvent, Operation, Outcome, audit};

/// The host-facing pieces an [`Orchestrator`] drives.
///
/// [`OrchestratorParts::system`] wires the real ones; tests substitute fakes.
pub struct OrchestratorParts {
    /// Runs every external program.
    pub runner: Arc<dyn CommandRunner>,
    /// Resolves the lookup host for DNS probing.
    pub resolver: Arc<dyn HostResolver>,
    /// Current-user Root store.
    pub trust_store: Arc<dyn TrustStore>,
    /// Chosen DNS redirection mechanism.
    pub redirector: Box<dyn DnsRedirector>,
    /// Adapter enumeration.
    pub adapters: Box<dyn AdapterSource>,
}

impl OrchestratorParts {
    /// Real processes, resolver, trust store and DNS mechanism.
    ///
    /// `dns.adapters`, when non-empty, pins the adapter list instead of
    /// enumerating the host.
    pub fn system(config: &Config) -> Result<Self, OrchestratorError> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
        let redirector = create_redirector(config.dns.method(), runner.clone())?;
        let adapters: Box<dyn AdapterSource> = if config.dns.adapters.is_empty() {
            Box::new(SystemAdapters)
        } else {
            Box::new(StaticAdapters::from_ids(config.dns.adapters.iter()))
        };
        Ok(Self {
            trust_store: Arc::new(CertutilTrustStore::new(runner.clone())),
            resolver: Arc::new(SystemResolver),
            runner,
            redirector,
            adapters,
        })
    }
}

/// Install state plus what the service manager reports right now.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Persisted record.
    pub record: InstallRecord,
    /// Configured services and whether they are registered, `None` if unknown.
    pub services: Vec<(String, Option<bool>)>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State: {}", self.record.state)?;
        if let Some(updated_at) = self.record.updated_at {
            writeln!(f, "Updated: {}", updated_at.to_rfc3339())?;
        }
        for endpoint in &self.record.endpoints {
            writeln!(f, "Endpoint: {} ({})", endpoint.address, endpoint.source)?;
        }
        for (name, installed) in &self.services {
            let state = match installed {
                Some(true) => "installed",
                Some(false) => "not installed",
                None => "unknown",
            };
            writeln!(f, "Service {name}: {state}")?;
        }
        for thumbprint in &self.record.ca_thumbprints {
            writeln!(f, "Trusted CA: {thumbprint}")?;
        }
        for adapter in &self.record.adapters {
            writeln!(f, "Redirected adapter: {adapter}")?;
        }
        for map in &self.record.redirect_maps {
            writeln!(f, "Redirect map: {}", map.display())?;
        }
        Ok(())
    }
}

/// Drives the lifecycle operations against one install layout.
pub struct Orchestrator {
    record_path: PathBuf,
    target: RedirectionTarget,
    probe_source: ProbeSource,
    loopback: Vec<IpAddr>,
    certificate: CertificateConfig,
    prober: EndpointProber,
    map_writer: RedirectMapWriter,
    certs: CertificateInstaller,
    supervisor: ServiceSupervisor,
    reverse_proxy: ServiceDescriptor,
    dns_proxy: ServiceDescriptor,
    helper: PathBuf,
    redirector: Box<dyn DnsRedirector>,
    adapters: Box<dyn AdapterSource>,
}

impl Orchestrator {
    /// Build an orchestrator wired to the real host.
    pub fn from_config(config: &Config, layout: InstallLayout) -> Result<Self, OrchestratorError> {
        let parts = OrchestratorParts::system(config)?;
        Self::new(config, layout, parts)
    }

    /// Build an orchestrator from explicit parts.
    pub fn new(
        config: &Config,
        layout: InstallLayout,
        parts: OrchestratorParts,
    ) -> Result<Self, OrchestratorError> {
        let target = RedirectionTarget::from_config(&config.target)?;
        let loopback = config.dns.loopback_addresses()?;
        let bypass_address: IpAddr = config.redirect.bypass_address.parse().map_err(|e| {
            ConfigError::invalid("redirect.bypass_address", format!("{e}"))
        })?;

        let prober = EndpointProber::new(
            parts.runner.clone(),
            parts.resolver,
            LatencyTool::from_config(&config.probe, &layout),
            config.probe.lookup_host.clone(),
        );
        let map_writer = RedirectMapWriter::new(
            layout.map_files(),
            RedirectEntry::new(bypass_address, config.redirect.bypass_pattern.clone()),
        );
        let reverse_proxy = ServiceDescriptor::from_config(&config.services.reverse_proxy, &layout);
        let dns_proxy = ServiceDescriptor::from_config(&config.services.dns_proxy, &layout);
        let helper = match &reverse_proxy.control {
            ServiceControl::Helper { helper } => helper.clone(),
            ServiceControl::SelfManaged { .. } => layout.default_helper(),
        };

        Ok(Self {
            record_path: layout.record_file.clone(),
            target,
            probe_source: config.probe.source(),
            loopback,
            certificate: config.certificate.clone(),
            prober,
            map_writer,
            certs: CertificateInstaller::new(parts.trust_store, &layout),
            supervisor: ServiceSupervisor::new(parts.runner),
            reverse_proxy,
            dns_proxy,
            helper,
            redirector: parts.redirector,
            adapters: parts.adapters,
        })
    }

    /// Load the persisted record.
    pub fn record(&self) -> Result<InstallRecord, OrchestratorError> {
        Ok(InstallRecord::load(&self.record_path)?)
    }

    /// Full install. Allowed from any state and safe to repeat.
    pub fn install(&self) -> Result<(), OrchestratorError> {
        self.audited(Operation::Install, || {
            let mut record = self.record()?;
            self.install_steps(&mut record)
        })
    }

    /// Re-probe and rewrite the redirect map. Requires a completed install.
    ///
    /// `alternate` probes with the other endpoint source.
    pub fn refresh(&self, alternate: bool) -> Result<(), OrchestratorError> {
        self.audited(Operation::Refresh, || {
            let mut record = self.record()?;
            if record.state != InstallState::Installed {
                return Err(OrchestratorError::InvalidTransition {
                    operation: Operation::Refresh,
                    state: record.state,
                });
            }
            let source = if alternate {
                self.probe_source.alternate()
            } else {
                self.probe_source
            };

            self.mark(&mut record, InstallState::Refreshing)?;
            let result = self.refresh_steps(&mut record, source);
            if result.is_err() {
                // Nothing structural changed; the install is still complete.
                if let Err(e) = self.mark(&mut record, InstallState::Installed) {
                    warn!("Failed to restore installed state: {}", e);
                }
            }
            result
        })
    }

    /// Remove everything this tool installed. Allowed from any state.
    pub fn uninstall(&self) -> Result<(), OrchestratorError> {
        self.audited(Operation::Uninstall, || {
            let mut record = self.record()?;
            self.uninstall_steps(&mut record)
        })
    }

    /// Persisted state and live service registration.
    pub fn status(&self) -> Result<StatusReport, OrchestratorError> {
        let record = self.record()?;
        let services = [&self.reverse_proxy, &self.dns_proxy]
            .into_iter()
            .map(|service| {
                let installed = match self.supervisor.is_installed(service) {
                    Ok(installed) => installed,
                    Err(e) => {
                        warn!("Could not query service {}: {}", service.name, e);
                        None
                    }
                };
                (service.name.clone(), installed)
            })
            .collect();
        Ok(StatusReport { record, services })
    }

    fn install_steps(&self, record: &mut InstallRecord) -> Result<(), OrchestratorError> {
        let endpoints = self.probe(self.probe_source)?;

        self.mark(record, InstallState::Installing)?;
        self.write_map(record, &endpoints)?;

        let mut ca = self.certs.install_ca(
            &self.certificate.ca_common_name,
            self.certificate.key_bits,
            self.certificate.ca_validity_days,
        )?;
        self.certs.remove_trusted(&record.ca_thumbprints, &mut ca.previous);
        self.report_ca_cleanup(record, &ca.previous);
        record.add_thumbprint(ca.thumbprint());
        self.save(record)?;
        audit().log(AuditEvent::CaTrusted {
            thumbprint: ca.thumbprint().to_string(),
            common_name: ca.authority.common_name().to_string(),
        });
        self.certs.install_leaf(
            &ca,
            &self.certificate.leaf_common_name,
            self.certificate.key_bits,
            self.certificate.leaf_validity_days,
            self.target.patterns(),
        )?;

        for service in [&self.reverse_proxy, &self.dns_proxy] {
            self.supervisor.ensure_installed_and_running(service)?;
            record.add_service(&service.name);
            self.save(record)?;
            audit().log(AuditEvent::ServiceInstalled {
                service: service.name.clone(),
            });
        }

        let adapters = self.adapters.active_adapters()?;
        record.add_adapters(adapters.iter().map(|a| a.id.clone()));
        self.save(record)?;
        self.redirect(&adapters, true)?;

        self.mark(record, InstallState::Installed)?;
        info!("Install complete for {}", self.target);
        Ok(())
    }

    fn refresh_steps(
        &self,
        record: &mut InstallRecord,
        source: ProbeSource,
    ) -> Result<(), OrchestratorError> {
        let endpoints = self.probe(source)?;
        self.write_map(record, &endpoints)?;
        self.supervisor.purge_cache(&self.dns_proxy)?;
        self.supervisor.restart(&self.dns_proxy)?;
        self.redirector.flush_cache()?;
        self.mark(record, InstallState::Installed)?;
        info!("Refresh complete via {}", source);
        Ok(())
    }

    fn uninstall_steps(&self, record: &mut InstallRecord) -> Result<(), OrchestratorError> {
        self.mark(record, InstallState::Uninstalling)?;

        // DNS first, so names stop resolving to loopback before the proxies go.
        let adapters = self.adapters_to_restore(record)?;
        self.redirect(&adapters, false)?;
        record.adapters.clear();
        self.save(record)?;

        for service in [&self.dns_proxy, &self.reverse_proxy] {
            self.remove_service(record, service)?;
        }
        let orphans: Vec<String> = record
            .services
            .iter()
            .filter(|name| **name != self.dns_proxy.name && **name != self.reverse_proxy.name)
            .cloned()
            .collect();
        for name in orphans {
            info!("Removing service {} left by an earlier configuration", name);
            let orphan = ServiceDescriptor::helper_managed(name, self.helper.clone());
            self.remove_service(record, &orphan)?;
        }

        // The record also covers CAs whose bookkeeping file is corrupt or gone.
        let mut report = self.certs.uninstall_ca()?;
        self.certs.remove_trusted(&record.ca_thumbprints, &mut report);
        self.report_ca_cleanup(record, &report);
        self.save(record)?;

        let mut maps = record.redirect_maps.clone();
        for file in self.map_writer.files() {
            if !maps.contains(file) {
                maps.push(file.clone());
            }
        }
        for failed in remove_map_files(&maps) {
            warn!("Redirect map {:?} was left behind", failed);
        }

        let still_trusted = std::mem::take(&mut record.ca_thumbprints);
        record.clear();
        if !still_trusted.is_empty() {
            warn!(
                "{} CA(s) are still trusted and stay in the install record: {}",
                still_trusted.len(),
                still_trusted.join(", ")
            );
        }
        record.ca_thumbprints = still_trusted;
        self.mark(record, InstallState::Uninstalled)?;
        info!("Uninstall complete");
        Ok(())
    }

    fn probe(&self, source: ProbeSource) -> Result<Vec<UpstreamEndpoint>, OrchestratorError> {
        let endpoints = self.prober.probe(&self.target, source)?;
        if let Some(best) = endpoints.first() {
            audit().log(AuditEvent::EndpointSelected {
                address: best.address.to_string(),
                source: best.source.to_string(),
            });
        }
        Ok(endpoints)
    }

    fn write_map(
        &self,
        record: &mut InstallRecord,
        endpoints: &[UpstreamEndpoint],
    ) -> Result<(), OrchestratorError> {
        let written = self.map_writer.write(&entries_for(&self.target, endpoints))?;
        record.endpoints = endpoints.to_vec();
        record.add_redirect_maps(&written);
        self.save(record)
    }

    /// Activate or deactivate, then always flush the resolver cache.
    fn redirect(&self, adapters: &[NetworkAdapterRef], active: bool) -> Result<(), OrchestratorError> {
        let changed = if active {
            self.redirector.activate(adapters, &self.loopback)
        } else {
            self.redirector.deactivate(adapters)
        };
        let flushed = self.redirector.flush_cache();

        match (changed, flushed) {
            (Err(e), flushed) => {
                if let Err(flush_error) = flushed {
                    warn!("Resolver cache flush also failed: {}", flush_error);
                }
                Err(e.into())
            }
            (Ok(()), Err(e)) => Err(e.into()),
            (Ok(()), Ok(())) => {
                audit().log(AuditEvent::DnsRedirected {
                    method: self.redirector.method().to_string(),
                    adapters: adapters.iter().map(|a| a.id.clone()).collect(),
                    active,
                });
                Ok(())
            }
        }
    }

    /// Adapters active now plus any recorded by an earlier run.
    fn adapters_to_restore(
        &self,
        record: &InstallRecord,
    ) -> Result<Vec<NetworkAdapterRef>, OrchestratorError> {
        let mut adapters = match self.adapters.active_adapters() {
            Ok(adapters) => adapters,
            Err(e) if !record.adapters.is_empty() => {
                warn!("Adapter enumeration failed, restoring recorded adapters only: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        for id in &record.adapters {
            if !adapters.iter().any(|a| a.id.eq_ignore_ascii_case(id)) {
                adapters.push(NetworkAdapterRef::from_id(id.clone()));
            }
        }
        debug!("Restoring DNS on {} adapter(s)", adapters.len());
        Ok(adapters)
    }

    fn remove_service(
        &self,
        record: &mut InstallRecord,
        service: &ServiceDescriptor,
    ) -> Result<(), OrchestratorError> {
        if self.supervisor.uninstall(service)? {
            audit().log(AuditEvent::ServiceRemoved {
                service: service.name.clone(),
            });
        }
        record.services.retain(|name| *name != service.name);
        self.save(record)
    }

    fn report_ca_cleanup(&self, record: &mut InstallRecord, report: &UninstallReport) {
        for thumbprint in &report.removed {
            audit().log(AuditEvent::CaRemoved {
                thumbprint: thumbprint.clone(),
            });
        }
        for corrupt in &report.corrupt {
            if let CertError::CorruptBookkeeping { path, reason } = corrupt {
                audit().log(AuditEvent::CorruptBookkeeping {
                    path: path.display().to_string(),
                    reason: reason.clone(),
                });
            }
        }
        for failed in &report.failed {
            warn!("CA cleanup incomplete: {}", failed);
        }
        for thumbprint in &report.kept {
            audit().log(AuditEvent::CaRemovalFailed {
                thumbprint: thumbprint.clone(),
            });
            record.add_thumbprint(thumbprint);
        }
        record.remove_thumbprints(&report.removed);
    }

    fn mark(&self, record: &mut InstallRecord, state: InstallState) -> Result<(), OrchestratorError> {
        debug!("State {} -> {}", record.state, state);
        record.state = state;
        self.save(record)
    }

    fn save(&self, record: &mut InstallRecord) -> Result<(), OrchestratorError> {
        Ok(record.save(&self.record_path)?)
    }

    fn audited<F>(&self, operation: Operation, run: F) -> Result<(), OrchestratorError>
    where
        F: FnOnce() -> Result<(), OrchestratorError>,
    {
        audit().log(AuditEvent::OperationStarted {
            operation,
            user: whoami(),
            pid: std::process::id(),
        });
        info!("Starting {}", operation);

        let result = run();
        let (outcome, error) = match &result {
            Ok(()) => (Outcome::Success, None),
            Err(e) => {
                let chain = error_chain(e);
                error!("{} failed: {}", operation, chain);
                (Outcome::Failure, Some(chain))
            }
        };
        audit().log(AuditEvent::OperationFinished {
            operation,
            outcome,
            error,
        });
        result
    }
}

/// `error: cause: cause` on one line.
///
/// Causes whose text is already part of the line are skipped.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !chain.contains(&text) {
            chain.push_str(": ");
            chain.push_str(&text);
        }
        source = cause.source();
    }
    chain
}

/// Get the current username for audit logging.
fn whoami() -> String {
    std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

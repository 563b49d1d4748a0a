//! Upstream endpoint selection.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info};

use super::error::ProbeError;
use super::latency_tool::LatencyTool;
use super::lookup::{HostResolver, dedup_in_order};
use super::target::{RedirectionTarget, UpstreamEndpoint};
use crate::config::ProbeSource;
use crate::process::CommandRunner;

/// Shown before the latency tool starts; a full run takes minutes.
pub const LATENCY_NOTICE: &str =
    "Testing upstream latency. This will take a while, do not close this window.";

/// Sink for user-facing progress notices.
pub type NoticeFn = dyn Fn(&str) + Send + Sync;

/// Produces candidate upstream addresses from the latency tool or DNS.
pub struct EndpointProber {
    runner: Arc<dyn CommandRunner>,
    resolver: Arc<dyn HostResolver>,
    tool: LatencyTool,
    lookup_host: String,
    notice: Box<NoticeFn>,
}

impl EndpointProber {
    /// Create a prober. Notices go to stdout.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        resolver: Arc<dyn HostResolver>,
        tool: LatencyTool,
        lookup_host: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            resolver,
            tool,
            lookup_host: lookup_host.into(),
            notice: Box::new(|msg| println!("{msg}")),
        }
    }

    /// Replace the notice sink.
    #[must_use]
    pub fn with_notice(mut self, notice: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.notice = Box::new(notice);
        self
    }

    /// Probe `source` for endpoints serving `target`.
    ///
    /// Never returns an empty list: no candidates is
    /// [`ProbeError::NoEndpointFound`].
    pub fn probe(
        &self,
        target: &RedirectionTarget,
        source: ProbeSource,
    ) -> Result<Vec<UpstreamEndpoint>, ProbeError> {
        let addresses: Vec<IpAddr> = match source {
            ProbeSource::LatencyTool => {
                (self.notice)(LATENCY_NOTICE);
                self.tool
                    .run(self.runner.as_ref(), &target.to_string())?
                    .into_iter()
                    .collect()
            }
            ProbeSource::DnsLookup => {
                debug!("Resolving {}", self.lookup_host);
                let addrs = self
                    .resolver
                    .resolve(&self.lookup_host)
                    .map_err(|e| ProbeError::Lookup {
                        host: self.lookup_host.clone(),
                        source: e,
                    })?;
                dedup_in_order(addrs)
            }
        };

        if addresses.is_empty() {
            return Err(ProbeError::NoEndpointFound { probe: source });
        }

        let endpoints: Vec<UpstreamEndpoint> = addresses
            .into_iter()
            .map(|address| UpstreamEndpoint { address, source })
            .collect();
        info!(
            "Probe via {} found {} endpoint(s), best {}",
            source,
            endpoints.len(),
            endpoints[0].address
        );
        Ok(endpoints)
    }
}

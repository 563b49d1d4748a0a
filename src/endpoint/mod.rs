//! Upstream endpoint selection and the redirect map.
//!
//! [`EndpointProber`] finds the real addresses that should stand behind the
//! redirected names, either from the external latency tool's ranked CSV or
//! from a DNS lookup of a well-known anycast host. [`RedirectMapWriter`]
//! turns the best one into the `hosts.txt` the DNS proxy answers from.

mod error;
mod latency_tool;
mod lookup;
mod prober;
mod redirect_map;
mod target;

pub use error::{ProbeError, RedirectMapError};
pub use latency_tool::{LatencyTool, OUTPUT_PLACEHOLDER, TARGET_PLACEHOLDER, parse_result};
pub use lookup::{HostResolver, SystemResolver, dedup_in_order};
pub use prober::{EndpointProber, LATENCY_NOTICE, NoticeFn};
pub use redirect_map::{RedirectEntry, RedirectMapWriter, entries_for, remove_map_files};
pub use target::{RedirectionTarget, UpstreamEndpoint};

//! Managed background services.
//!
//! Two services back a redirect: the TLS reverse proxy, registered through an
//! nssm-style helper, and the DNS proxy, which registers itself when run with
//! verb arguments. [`ServiceDescriptor`] maps each [`LifecycleVerb`] to one
//! command line and [`ServiceSupervisor`] runs them.
//!
//! Installing always removes any existing registration first, so repeated
//! installs never stack registrations.

mod descriptor;
mod error;
mod supervisor;

pub use descriptor::{LifecycleVerb, ServiceControl, ServiceDescriptor};
pub use error::ServiceError;
pub use supervisor::ServiceSupervisor;

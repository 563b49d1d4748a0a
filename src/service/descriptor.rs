//! Service descriptors and the command line each lifecycle verb maps to.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ServiceError;
use crate::config::{InstallLayout, ServiceConfig, ServiceControlKind};
use crate::process::Invocation;

/// Operations a service can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleVerb {
    /// Register the service.
    Install,
    /// Start the registered service.
    Start,
    /// Stop the running service.
    Stop,
    /// Remove the registration.
    Uninstall,
    /// Stop and start again.
    Restart,
    /// Drop any cached answers the service holds.
    PurgeCache,
    /// Query whether the service is registered.
    Status,
}

impl fmt::Display for LifecycleVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleVerb::Install => "install",
            LifecycleVerb::Start => "start",
            LifecycleVerb::Stop => "stop",
            LifecycleVerb::Uninstall => "uninstall",
            LifecycleVerb::Restart => "restart",
            LifecycleVerb::PurgeCache => "purge-cache",
            LifecycleVerb::Status => "status",
        };
        f.write_str(s)
    }
}

/// How a service's registration is driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceControl {
    /// nssm-style helper: `install <name> "<path>"`, `remove <name> confirm`, ...
    Helper {
        /// Helper executable.
        helper: PathBuf,
    },
    /// The executable takes one verb argument per operation.
    SelfManaged {
        /// Argument passed for each supported verb.
        verbs: BTreeMap<LifecycleVerb, String>,
    },
}

/// One managed background service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Host-unique service name.
    pub name: String,
    /// Service executable.
    pub executable: PathBuf,
    /// Extra arguments registered with the helper.
    pub args: Vec<String>,
    /// Working directory for control calls.
    pub working_dir: Option<PathBuf>,
    /// Control style.
    pub control: ServiceControl,
    /// `uninstall` exit codes meaning the service was not registered.
    pub absent_exit_codes: Vec<i32>,
}

impl ServiceDescriptor {
    /// Build a descriptor from configuration, resolving paths against the layout.
    ///
    /// Self-managed executables run with their own directory as working
    /// directory since they locate their data files relative to it.
    pub fn from_config(config: &ServiceConfig, layout: &InstallLayout) -> Self {
        let executable = layout.path(&config.executable);
        let (control, working_dir) = match config.control() {
            ServiceControlKind::Helper => {
                let helper = if config.helper.as_os_str().is_empty() {
                    layout.default_helper()
                } else {
                    layout.path(&config.helper)
                };
                (ServiceControl::Helper { helper }, None)
            }
            ServiceControlKind::SelfManaged => (
                ServiceControl::SelfManaged {
                    verbs: config.verbs.clone(),
                },
                executable.parent().map(Path::to_path_buf),
            ),
        };

        Self {
            name: config.name.clone(),
            executable,
            args: config.args.clone(),
            working_dir,
            control,
            absent_exit_codes: config.absent_exit_codes.clone(),
        }
    }

    /// Descriptor for a helper-registered service known only by name.
    ///
    /// Used to remove registrations left behind by a previous configuration.
    pub fn helper_managed(name: impl Into<String>, helper: PathBuf) -> Self {
        Self {
            name: name.into(),
            executable: PathBuf::new(),
            args: Vec::new(),
            working_dir: None,
            control: ServiceControl::Helper { helper },
            absent_exit_codes: Vec::new(),
        }
    }

    /// Whether `verb` maps to a command for this service.
    pub fn supports(&self, verb: LifecycleVerb) -> bool {
        match self.control {
            ServiceControl::Helper { .. } => verb != LifecycleVerb::PurgeCache,
            ServiceControl::SelfManaged { ref verbs } => verbs.contains_key(&verb),
        }
    }

    /// Command line that performs `verb`.
    pub fn invocation(&self, verb: LifecycleVerb) -> Result<Invocation, ServiceError> {
        let unsupported = || ServiceError::UnsupportedVerb {
            verb,
            service: self.name.clone(),
        };

        let invocation = match self.control {
            ServiceControl::Helper { ref helper } => {
                let base = Invocation::new(helper);
                match verb {
                    LifecycleVerb::Install => base
                        .arg("install")
                        .arg(&self.name)
                        .arg(&self.executable)
                        .args(&self.args),
                    LifecycleVerb::Uninstall => base.args(["remove", self.name.as_str(), "confirm"]),
                    LifecycleVerb::Start => base.args(["start", self.name.as_str()]),
                    LifecycleVerb::Stop => base.args(["stop", self.name.as_str()]),
                    LifecycleVerb::Restart => base.args(["restart", self.name.as_str()]),
                    LifecycleVerb::Status => base.args(["status", self.name.as_str()]),
                    LifecycleVerb::PurgeCache => return Err(unsupported()),
                }
            }
            ServiceControl::SelfManaged { ref verbs } => {
                let arg = verbs.get(&verb).ok_or_else(unsupported)?;
                Invocation::new(&self.executable).arg(arg)
            }
        };

        Ok(match self.working_dir {
            Some(ref dir) => invocation.current_dir(dir),
            None => invocation,
        })
    }
}

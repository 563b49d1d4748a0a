//! Drives service descriptors through their lifecycle.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::descriptor::{LifecycleVerb, ServiceDescriptor};
use super::error::ServiceError;
use crate::process::{CommandRunner, ProcessOutput};

/// Installs, starts, stops and removes managed services.
///
/// Every verb is one blocking external call.
pub struct ServiceSupervisor {
    runner: Arc<dyn CommandRunner>,
}

impl ServiceSupervisor {
    /// Create a supervisor that runs control programs through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Remove any existing registration, then install and start the service.
    pub fn ensure_installed_and_running(
        &self,
        service: &ServiceDescriptor,
    ) -> Result<(), ServiceError> {
        self.uninstall(service)?;
        self.run_verb(service, LifecycleVerb::Install)?;
        self.run_verb(service, LifecycleVerb::Start)?;
        info!("Service {} installed and started", service.name);
        Ok(())
    }

    /// Stop the service.
    pub fn stop(&self, service: &ServiceDescriptor) -> Result<(), ServiceError> {
        self.run_verb(service, LifecycleVerb::Stop)
    }

    /// Stop and remove the service registration.
    ///
    /// A service that is not registered counts as success. Returns whether a
    /// registration was actually removed.
    pub fn uninstall(&self, service: &ServiceDescriptor) -> Result<bool, ServiceError> {
        if service.supports(LifecycleVerb::Status) {
            let status = self.control(service, LifecycleVerb::Status)?;
            if !status.success() {
                debug!("Service {} is not installed", service.name);
                return Ok(false);
            }
            self.stop_for_removal(service)?;
            self.run_verb(service, LifecycleVerb::Uninstall)?;
            info!("Service {} removed", service.name);
            return Ok(true);
        }

        self.stop_for_removal(service)?;
        let output = self.control(service, LifecycleVerb::Uninstall)?;
        if output.success() {
            info!("Service {} removed", service.name);
            Ok(true)
        } else if service.absent_exit_codes.contains(&output.exit_code()) {
            debug!(
                "Service {} was not installed (exit code {})",
                service.name,
                output.exit_code()
            );
            Ok(false)
        } else {
            Err(control_error(service, LifecycleVerb::Uninstall, &output))
        }
    }

    /// Restart the service, falling back to stop + start.
    pub fn restart(&self, service: &ServiceDescriptor) -> Result<(), ServiceError> {
        if service.supports(LifecycleVerb::Restart) {
            return self.run_verb(service, LifecycleVerb::Restart);
        }
        self.run_verb(service, LifecycleVerb::Stop)?;
        self.run_verb(service, LifecycleVerb::Start)
    }

    /// Ask the service to drop its cache.
    pub fn purge_cache(&self, service: &ServiceDescriptor) -> Result<(), ServiceError> {
        self.run_verb(service, LifecycleVerb::PurgeCache)
    }

    /// Whether the service is registered, or `None` if it cannot be queried.
    pub fn is_installed(&self, service: &ServiceDescriptor) -> Result<Option<bool>, ServiceError> {
        if !service.supports(LifecycleVerb::Status) {
            return Ok(None);
        }
        let status = self.control(service, LifecycleVerb::Status)?;
        Ok(Some(status.success()))
    }

    /// A stopped service makes `stop` exit non-zero on some helpers; removal
    /// goes ahead regardless.
    fn stop_for_removal(&self, service: &ServiceDescriptor) -> Result<(), ServiceError> {
        if !service.supports(LifecycleVerb::Stop) {
            return Ok(());
        }
        let output = self.control(service, LifecycleVerb::Stop)?;
        if !output.success() {
            warn!(
                "Stopping {} before removal exited with {}, continuing",
                service.name,
                output.exit_code()
            );
        }
        Ok(())
    }

    fn run_verb(&self, service: &ServiceDescriptor, verb: LifecycleVerb) -> Result<(), ServiceError> {
        let output = self.control(service, verb)?;
        if output.success() {
            Ok(())
        } else {
            Err(control_error(service, verb, &output))
        }
    }

    fn control(
        &self,
        service: &ServiceDescriptor,
        verb: LifecycleVerb,
    ) -> Result<ProcessOutput, ServiceError> {
        let invocation = service.invocation(verb)?;
        debug!("Service {}: {}", service.name, verb);
        Ok(self.runner.run(&invocation)?)
    }
}

fn control_error(service: &ServiceDescriptor, verb: LifecycleVerb, output: &ProcessOutput) -> ServiceError {
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    ServiceError::Control {
        verb,
        service: service.name.clone(),
        exit_code: output.exit_code(),
        stderr: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{Invocation, ProcessError};
    use std::collections::{BTreeMap, HashMap};
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::service::ServiceControl;

    /// Records every call and answers with scripted exit codes keyed by the
    /// first argument.
    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<Vec<String>>>,
        codes: HashMap<String, i32>,
    }

    impl ScriptedRunner {
        fn with_codes(codes: &[(&str, i32)]) -> Self {
            Self {
                calls: Mutex::default(),
                codes: codes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            }
        }

        fn verbs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|args| args[0].clone())
                .collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
            let args = invocation.args_lossy();
            let code = self.codes.get(&args[0]).copied().unwrap_or(0);
            self.calls.lock().unwrap().push(args);
            Ok(ProcessOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: if code == 0 { String::new() } else { "boom".to_string() },
            })
        }
    }

    fn helper_service() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "proxy".to_string(),
            executable: PathBuf::from("/b/nginx/nginx.exe"),
            args: Vec::new(),
            working_dir: None,
            control: ServiceControl::Helper {
                helper: PathBuf::from("/b/nssm/win64/nssm.exe"),
            },
            absent_exit_codes: Vec::new(),
        }
    }

    fn self_managed_service(absent: Vec<i32>) -> ServiceDescriptor {
        let verbs: BTreeMap<LifecycleVerb, String> = [
            (LifecycleVerb::Install, "Install"),
            (LifecycleVerb::Start, "Start"),
            (LifecycleVerb::Stop, "Stop"),
            (LifecycleVerb::Uninstall, "Uninstall"),
            (LifecycleVerb::PurgeCache, "Purge"),
        ]
        .into_iter()
        .map(|(v, s)| (v, s.to_string()))
        .collect();
        ServiceDescriptor {
            name: "dns".to_string(),
            executable: PathBuf::from("/b/Acrylic/AcrylicUI.exe"),
            args: Vec::new(),
            working_dir: Some(PathBuf::from("/b/Acrylic")),
            control: ServiceControl::SelfManaged { verbs },
            absent_exit_codes: absent,
        }
    }

    #[test]
    fn test_ensure_on_absent_helper_service_skips_removal() {
        let runner = Arc::new(ScriptedRunner::with_codes(&[("status", 3)]));
        let supervisor = ServiceSupervisor::new(runner.clone());

        supervisor
            .ensure_installed_and_running(&helper_service())
            .unwrap();

        assert_eq!(runner.verbs(), vec!["status", "install", "start"]);
    }

    #[test]
    fn test_ensure_on_installed_helper_service_removes_first() {
        let runner = Arc::new(ScriptedRunner::default());
        let supervisor = ServiceSupervisor::new(runner.clone());

        supervisor
            .ensure_installed_and_running(&helper_service())
            .unwrap();

        assert_eq!(
            runner.verbs(),
            vec!["status", "stop", "remove", "install", "start"]
        );
    }

    #[test]
    fn test_uninstall_tolerates_failed_stop() {
        let runner = Arc::new(ScriptedRunner::with_codes(&[("stop", 1)]));
        let supervisor = ServiceSupervisor::new(runner.clone());

        assert!(supervisor.uninstall(&helper_service()).unwrap());
        assert_eq!(runner.verbs(), vec!["status", "stop", "remove"]);
    }

    #[test]
    fn test_self_managed_absent_exit_code_is_success() {
        let runner = Arc::new(ScriptedRunner::with_codes(&[("Uninstall", 5)]));
        let supervisor = ServiceSupervisor::new(runner.clone());

        let removed = supervisor.uninstall(&self_managed_service(vec![5])).unwrap();

        assert!(!removed);
        assert_eq!(runner.verbs(), vec!["Stop", "Uninstall"]);
    }

    #[test]
    fn test_self_managed_unknown_uninstall_failure_is_error() {
        let runner = Arc::new(ScriptedRunner::with_codes(&[("Uninstall", 7)]));
        let supervisor = ServiceSupervisor::new(runner);

        let err = supervisor
            .uninstall(&self_managed_service(vec![5]))
            .unwrap_err();

        match err {
            ServiceError::Control {
                verb,
                service,
                exit_code,
                stderr,
            } => {
                assert_eq!(verb, LifecycleVerb::Uninstall);
                assert_eq!(service, "dns");
                assert_eq!(exit_code, 7);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_install_failure_is_fatal() {
        let runner = Arc::new(ScriptedRunner::with_codes(&[("Install", 2)]));
        let supervisor = ServiceSupervisor::new(runner.clone());

        let result = supervisor.ensure_installed_and_running(&self_managed_service(vec![]));

        assert!(matches!(
            result,
            Err(ServiceError::Control {
                verb: LifecycleVerb::Install,
                ..
            })
        ));
        // Start must not run after a failed install.
        assert!(!runner.verbs().contains(&"Start".to_string()));
    }

    #[test]
    fn test_restart_falls_back_to_stop_start() {
        let runner = Arc::new(ScriptedRunner::default());
        let supervisor = ServiceSupervisor::new(runner.clone());

        supervisor.restart(&self_managed_service(vec![])).unwrap();

        assert_eq!(runner.verbs(), vec!["Stop", "Start"]);
    }

    #[test]
    fn test_purge_cache_unsupported_on_helper() {
        let runner = Arc::new(ScriptedRunner::default());
        let supervisor = ServiceSupervisor::new(runner.clone());

        let result = supervisor.purge_cache(&helper_service());

        assert!(matches!(result, Err(ServiceError::UnsupportedVerb { .. })));
        assert!(runner.verbs().is_empty());
    }

    #[test]
    fn test_is_installed() {
        let runner = Arc::new(ScriptedRunner::with_codes(&[("status", 3)]));
        let supervisor = ServiceSupervisor::new(runner);

        assert_eq!(supervisor.is_installed(&helper_service()).unwrap(), Some(false));
        assert_eq!(
            supervisor
                .is_installed(&self_managed_service(vec![]))
                .unwrap(),
            None
        );
    }
}

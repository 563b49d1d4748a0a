//! Current-user Root trust store access.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::bookkeeping::read_record;
use super::error::CertError;
use crate::process::{CommandRunner, Invocation, ProcessOutput};

/// `certutil` result code for an object that is not in the store.
const CRYPT_E_NOT_FOUND: &str = "0x80092004";

/// Adds and removes trusted root certificates.
pub trait TrustStore: Send + Sync {
    /// Trust the DER certificate in `cert_file`, known by `thumbprint`.
    fn add(&self, cert_file: &Path, thumbprint: &str) -> Result<(), CertError>;

    /// Remove the entry with `thumbprint`. An absent entry is success.
    fn remove(&self, thumbprint: &str) -> Result<(), CertError>;
}

/// [`TrustStore`] backed by `certutil -user`.
pub struct CertutilTrustStore {
    runner: Arc<dyn CommandRunner>,
}

impl CertutilTrustStore {
    /// Store that runs `certutil` through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn failure(action: &'static str, thumbprint: &str, output: &ProcessOutput) -> CertError {
        let message = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        CertError::TrustStore {
            action,
            thumbprint: thumbprint.to_string(),
            exit_code: output.exit_code(),
            stderr: message.to_string(),
        }
    }
}

impl TrustStore for CertutilTrustStore {
    fn add(&self, cert_file: &Path, thumbprint: &str) -> Result<(), CertError> {
        let invocation = Invocation::new("certutil")
            .args(["-user", "-f", "-addstore", "Root"])
            .arg(cert_file);
        debug!("Running {}", invocation);
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(Self::failure("add", thumbprint, &output));
        }
        info!("Added {} to the Root store", thumbprint);
        Ok(())
    }

    fn remove(&self, thumbprint: &str) -> Result<(), CertError> {
        let invocation =
            Invocation::new("certutil").args(["-user", "-delstore", "Root", thumbprint]);
        debug!("Running {}", invocation);
        let output = self.runner.run(&invocation)?;
        if output.success() {
            info!("Removed {} from the Root store", thumbprint);
            return Ok(());
        }
        if output.stdout.contains(CRYPT_E_NOT_FOUND) || output.stderr.contains(CRYPT_E_NOT_FOUND) {
            debug!("{} was not in the Root store", thumbprint);
            return Ok(());
        }
        Err(Self::failure("remove", thumbprint, &output))
    }
}

/// In-memory [`TrustStore`] for tests and dry runs.
///
/// `add` parses the file like the real store would, so a corrupt
/// certificate is rejected.
#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    trusted: Mutex<BTreeSet<String>>,
    refuse_removal: Mutex<BTreeSet<String>>,
}

impl MemoryTrustStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Thumbprints currently trusted, sorted.
    pub fn thumbprints(&self) -> Vec<String> {
        self.trusted
            .lock()
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `thumbprint` is trusted.
    pub fn contains(&self, thumbprint: &str) -> bool {
        self.trusted
            .lock()
            .is_ok_and(|t| t.contains(thumbprint))
    }

    /// Make every later removal of `thumbprint` fail.
    pub fn refuse_removal_of(&self, thumbprint: &str) {
        if let Ok(mut refused) = self.refuse_removal.lock() {
            refused.insert(thumbprint.to_string());
        }
    }
}

impl TrustStore for MemoryTrustStore {
    fn add(&self, cert_file: &Path, thumbprint: &str) -> Result<(), CertError> {
        let record = read_record(cert_file)?;
        if record.thumbprint != thumbprint {
            return Err(CertError::TrustStore {
                action: "add",
                thumbprint: thumbprint.to_string(),
                exit_code: 1,
                stderr: format!("file holds {}", record.thumbprint),
            });
        }
        if let Ok(mut trusted) = self.trusted.lock() {
            trusted.insert(record.thumbprint);
        }
        Ok(())
    }

    fn remove(&self, thumbprint: &str) -> Result<(), CertError> {
        if self
            .refuse_removal
            .lock()
            .is_ok_and(|r| r.contains(thumbprint))
        {
            return Err(CertError::TrustStore {
                action: "remove",
                thumbprint: thumbprint.to_string(),
                exit_code: 5,
                stderr: "access denied".to_string(),
            });
        }
        if let Ok(mut trusted) = self.trusted.lock() {
            trusted.remove(thumbprint);
        }
        Ok(())
    }
}

//! Trusting and untrusting the generated CA.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::authority::{CaAuthority, LeafMaterial};
use super::bookkeeping::{Bookkeeping, read_record};
use super::error::CertError;
use super::trust_store::TrustStore;
use crate::config::InstallLayout;

/// A CA that is now trusted, with its private key still in memory.
#[derive(Debug)]
pub struct InstalledCa {
    /// The generated authority.
    pub authority: CaAuthority,
    /// Bookkeeping file recording it.
    pub record: PathBuf,
    /// Cleanup of earlier CAs done before this one was added.
    pub previous: UninstallReport,
}

impl InstalledCa {
    /// Trust store thumbprint.
    pub fn thumbprint(&self) -> &str {
        self.authority.thumbprint()
    }
}

/// Outcome of a best-effort CA removal pass.
#[derive(Debug, Default)]
pub struct UninstallReport {
    /// Thumbprints removed from the trust store.
    pub removed: Vec<String>,
    /// Bookkeeping files that could not be parsed; left in place.
    pub corrupt: Vec<CertError>,
    /// Removals that failed; their files are kept for a later retry.
    pub failed: Vec<CertError>,
    /// Thumbprints whose removal failed and that are still trusted.
    pub kept: Vec<String>,
}

impl UninstallReport {
    /// True when nothing was corrupt and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty() && self.failed.is_empty()
    }
}

/// Generates, trusts and removes this tool's certificates.
pub struct CertificateInstaller {
    store: Arc<dyn TrustStore>,
    bookkeeping: Bookkeeping,
    cert_pem: PathBuf,
    cert_key: PathBuf,
}

impl CertificateInstaller {
    /// Installer using the layout's bookkeeping folder and leaf paths.
    pub fn new(store: Arc<dyn TrustStore>, layout: &InstallLayout) -> Self {
        Self {
            store,
            bookkeeping: Bookkeeping::new(&layout.bookkeeping_dir),
            cert_pem: layout.cert_pem.clone(),
            cert_key: layout.cert_key.clone(),
        }
    }

    /// The bookkeeping folder.
    pub fn bookkeeping(&self) -> &Bookkeeping {
        &self.bookkeeping
    }

    /// Replace any CA recorded earlier with a freshly generated one.
    ///
    /// Leftovers that cannot be removed are reported in
    /// [`InstalledCa::previous`] and do not stop the install.
    pub fn install_ca(
        &self,
        common_name: &str,
        key_bits: u32,
        validity_days: u32,
    ) -> Result<InstalledCa, CertError> {
        let previous = self.uninstall_ca()?;

        let authority = CaAuthority::generate(common_name, key_bits, validity_days)?;
        let record = self.bookkeeping.record(authority.der())?;
        if let Err(e) = self.store.add(&record, authority.thumbprint()) {
            // Nothing was trusted; the record would only point at nothing.
            if let Err(cleanup) = self.bookkeeping.forget(&record) {
                warn!("Failed to drop bookkeeping for untrusted CA: {}", cleanup);
            }
            return Err(e);
        }

        info!(
            "Trusted CA {:?} ({})",
            authority.common_name(),
            authority.thumbprint()
        );
        Ok(InstalledCa {
            authority,
            record,
            previous,
        })
    }

    /// Issue the reverse proxy's certificate and write `cert.pem` / `cert.key`.
    pub fn install_leaf(
        &self,
        ca: &InstalledCa,
        common_name: &str,
        key_bits: u32,
        validity_days: u32,
        patterns: &[String],
    ) -> Result<LeafMaterial, CertError> {
        let leaf = ca
            .authority
            .issue_leaf(common_name, key_bits, validity_days, patterns)?;
        write_file(&self.cert_pem, &leaf.cert_pem)?;
        write_key_file(&self.cert_key, &leaf.key_pem)?;
        info!("Wrote leaf certificate to {:?}", self.cert_pem);
        Ok(leaf)
    }

    /// Remove every recorded CA from the trust store.
    ///
    /// Works through the whole folder. Corrupt files are reported and kept;
    /// failed removals are reported and their files kept for a retry.
    pub fn uninstall_ca(&self) -> Result<UninstallReport, CertError> {
        let mut report = UninstallReport::default();

        for path in self.bookkeeping.entries()? {
            let recorded = match read_record(&path) {
                Ok(recorded) => recorded,
                Err(e) => {
                    warn!("Skipping bookkeeping file: {}", e);
                    report.corrupt.push(e);
                    continue;
                }
            };

            if let Err(e) = self.store.remove(&recorded.thumbprint) {
                warn!("Failed to remove CA {}: {}", recorded.thumbprint, e);
                report.failed.push(e);
                report.kept.push(recorded.thumbprint);
                continue;
            }

            match self.bookkeeping.forget(&path) {
                Ok(()) => debug!("Forgot {:?}", path),
                Err(e) => {
                    warn!("CA removed but bookkeeping kept: {}", e);
                    report.failed.push(e);
                }
            }
            report.removed.push(recorded.thumbprint);
        }

        if !report.removed.is_empty() {
            info!("Removed {} CA(s) from the trust store", report.removed.len());
        }
        Ok(report)
    }

    /// Remove CAs known only by thumbprint, adding the outcome to `report`.
    ///
    /// Covers CAs whose bookkeeping file is corrupt or gone. Thumbprints the
    /// report already settled are skipped.
    pub fn remove_trusted(&self, thumbprints: &[String], report: &mut UninstallReport) {
        for thumbprint in thumbprints {
            let settled = report
                .removed
                .iter()
                .chain(&report.kept)
                .any(|t| t.eq_ignore_ascii_case(thumbprint));
            if settled {
                continue;
            }
            match self.store.remove(thumbprint) {
                Ok(()) => {
                    info!("Removed CA {} without a bookkeeping file", thumbprint);
                    report.removed.push(thumbprint.clone());
                }
                Err(e) => {
                    warn!("Failed to remove CA {}: {}", thumbprint, e);
                    report.failed.push(e);
                    report.kept.push(thumbprint.clone());
                }
            }
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), CertError> {
    let write = || -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, contents)
    };
    write().map_err(|e| CertError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write a private key, owner-only where the platform supports it.
fn write_key_file(path: &Path, contents: &str) -> Result<(), CertError> {
    let write = || -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(contents.as_bytes())
    };
    write().map_err(|e| CertError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::trust_store::MemoryTrustStore;
    use crate::config::Config;
    use tempfile::tempdir;

    fn installer(base: &Path) -> (CertificateInstaller, Arc<MemoryTrustStore>) {
        let layout = InstallLayout::with_base(base, &Config::embedded().unwrap());
        let store = Arc::new(MemoryTrustStore::new());
        (CertificateInstaller::new(store.clone(), &layout), store)
    }

    #[test]
    fn test_install_twice_leaves_one_trusted_ca() {
        let dir = tempdir().unwrap();
        let (installer, store) = installer(dir.path());

        let first = installer.install_ca("Root", 256, 10).unwrap();
        let second = installer.install_ca("Root", 256, 10).unwrap();

        assert_eq!(second.previous.removed, vec![first.thumbprint().to_string()]);
        assert_eq!(store.thumbprints(), vec![second.thumbprint().to_string()]);
        assert_eq!(installer.bookkeeping().entries().unwrap(), vec![second.record.clone()]);
    }

    #[test]
    fn test_install_then_uninstall_empties_folder_and_store() {
        let dir = tempdir().unwrap();
        let (installer, store) = installer(dir.path());
        let ca = installer.install_ca("Root", 384, 10).unwrap();

        let report = installer.uninstall_ca().unwrap();

        assert_eq!(report.removed, vec![ca.thumbprint().to_string()]);
        assert!(report.is_clean());
        assert!(store.thumbprints().is_empty());
        assert!(installer.bookkeeping().entries().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_reported_and_valid_ca_still_removed() {
        let dir = tempdir().unwrap();
        let (installer, store) = installer(dir.path());
        let ca = installer.install_ca("Root", 256, 10).unwrap();
        let junk = installer.bookkeeping().dir().join("junk.cer");
        fs::write(&junk, b"garbage").unwrap();

        let report = installer.uninstall_ca().unwrap();

        assert_eq!(report.removed, vec![ca.thumbprint().to_string()]);
        assert_eq!(report.corrupt.len(), 1);
        assert!(!store.contains(ca.thumbprint()));
        assert_eq!(installer.bookkeeping().entries().unwrap(), vec![junk]);
    }

    #[test]
    fn test_failed_removal_keeps_file_for_retry() {
        let dir = tempdir().unwrap();
        let (installer, store) = installer(dir.path());
        let ca = installer.install_ca("Root", 256, 10).unwrap();
        store.refuse_removal_of(ca.thumbprint());

        let report = installer.uninstall_ca().unwrap();

        assert!(report.removed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.kept, vec![ca.thumbprint().to_string()]);
        assert!(store.contains(ca.thumbprint()));
        assert_eq!(installer.bookkeeping().entries().unwrap(), vec![ca.record.clone()]);
    }

    #[test]
    fn test_remove_trusted_handles_ca_without_bookkeeping() {
        let dir = tempdir().unwrap();
        let (installer, store) = installer(dir.path());
        let ca = installer.install_ca("Root", 256, 10).unwrap();
        fs::write(&ca.record, b"not der").unwrap();

        let mut report = installer.uninstall_ca().unwrap();
        assert!(report.removed.is_empty());
        installer.remove_trusted(&[ca.thumbprint().to_string()], &mut report);

        assert_eq!(report.removed, vec![ca.thumbprint().to_string()]);
        assert!(report.kept.is_empty());
        assert!(!store.contains(ca.thumbprint()));
    }

    #[test]
    fn test_remove_trusted_skips_already_failed_thumbprint() {
        let dir = tempdir().unwrap();
        let (installer, store) = installer(dir.path());
        let ca = installer.install_ca("Root", 256, 10).unwrap();
        store.refuse_removal_of(ca.thumbprint());

        let mut report = installer.uninstall_ca().unwrap();
        installer.remove_trusted(&[ca.thumbprint().to_string()], &mut report);

        assert_eq!(report.kept, vec![ca.thumbprint().to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(store.contains(ca.thumbprint()));
    }

    #[test]
    fn test_leaf_written_for_reverse_proxy() {
        let dir = tempdir().unwrap();
        let (installer, _store) = installer(dir.path());
        let ca = installer.install_ca("Root", 256, 10).unwrap();

        let leaf = installer
            .install_leaf(&ca, "Leaf", 256, 10, &["*.example.test".to_string()])
            .unwrap();

        let conf = dir.path().join("nginx").join("conf");
        assert_eq!(fs::read_to_string(conf.join("cert.pem")).unwrap(), leaf.cert_pem);
        assert_eq!(fs::read_to_string(conf.join("cert.key")).unwrap(), leaf.key_pem);
        // The leaf is not bookkept.
        assert_eq!(installer.bookkeeping().entries().unwrap().len(), 1);
    }
}

//! Resolved on-disk layout of an install.
//!
//! Every path the tools and the orchestrator touch is derived once from the
//! base directory and handed to components, so nothing looks up a global
//! base path at runtime.

use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::schema::Config;

/// Name of the persisted install record inside the base directory.
pub const INSTALL_RECORD_FILE: &str = "install-record.toml";

/// Absolute paths for one install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// Root directory holding the bundled tools.
    pub base_dir: PathBuf,
    /// Primary redirect map read by the DNS proxy.
    pub hosts_file: PathBuf,
    /// Mirror copies of the redirect map.
    pub mirror_files: Vec<PathBuf>,
    /// Folder recording every CA added to the trust store.
    pub bookkeeping_dir: PathBuf,
    /// Leaf certificate PEM read by the reverse proxy.
    pub cert_pem: PathBuf,
    /// Leaf private key PEM read by the reverse proxy.
    pub cert_key: PathBuf,
    /// Latency tool executable.
    pub latency_tool: PathBuf,
    /// CSV file the latency tool writes.
    pub latency_result: PathBuf,
    /// Persisted install record.
    pub record_file: PathBuf,
    /// JSON-lines audit log.
    pub audit_file: PathBuf,
}

impl InstallLayout {
    /// Resolve the layout from configuration.
    ///
    /// An empty `general.base_dir` means the directory containing the running
    /// executable.
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        let base_dir = if config.general.base_dir.as_os_str().is_empty() {
            executable_dir()?
        } else {
            config.general.base_dir.clone()
        };
        Ok(Self::with_base(&base_dir, config))
    }

    /// Build the layout for an explicit base directory.
    pub fn with_base(base_dir: &Path, config: &Config) -> Self {
        let tls_dir = join(base_dir, &config.certificate.tls_dir);
        Self {
            base_dir: base_dir.to_path_buf(),
            hosts_file: join(base_dir, &config.redirect.hosts_file),
            mirror_files: config
                .redirect
                .mirror_files
                .iter()
                .map(|p| join(base_dir, p))
                .collect(),
            bookkeeping_dir: join(base_dir, &config.certificate.bookkeeping_dir),
            cert_pem: tls_dir.join("cert.pem"),
            cert_key: tls_dir.join("cert.key"),
            latency_tool: join(base_dir, &config.probe.tool),
            latency_result: join(base_dir, &config.probe.result_file),
            record_file: base_dir.join(INSTALL_RECORD_FILE),
            audit_file: join(base_dir, &config.audit.file),
        }
    }

    /// Resolve a possibly relative path against the base directory.
    pub fn path(&self, relative: &Path) -> PathBuf {
        join(&self.base_dir, relative)
    }

    /// Every redirect map file, primary first.
    pub fn map_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.hosts_file.clone()];
        for mirror in &self.mirror_files {
            if !files.contains(mirror) {
                files.push(mirror.clone());
            }
        }
        files
    }

    /// Bundled nssm build matching the host's pointer width.
    pub fn default_helper(&self) -> PathBuf {
        let arch = if host_is_64_bit() { "win64" } else { "win32" };
        self.base_dir.join("nssm").join(arch).join("nssm.exe")
    }
}

fn join(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn executable_dir() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(ConfigError::NoBaseDirectory)?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        ConfigError::NoBaseDirectory(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "executable has no parent directory",
        ))
    })
}

/// A 32-bit build running under WOW64 still sees a 64-bit OS.
fn host_is_64_bit() -> bool {
    cfg!(target_pointer_width = "64") || std::env::var_os("PROCESSOR_ARCHITEW6432").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_embedded_defaults() {
        let config = Config::embedded().unwrap();
        let base = PathBuf::from("/opt/redirect");
        let layout = InstallLayout::with_base(&base, &config);

        assert_eq!(layout.hosts_file, base.join("Acrylic/hosts.txt"));
        assert_eq!(layout.bookkeeping_dir, base.join("cauninstallfolder"));
        assert_eq!(layout.cert_pem, base.join("nginx/conf").join("cert.pem"));
        assert_eq!(layout.cert_key, base.join("nginx/conf").join("cert.key"));
        assert_eq!(layout.record_file, base.join(INSTALL_RECORD_FILE));
        assert_eq!(layout.audit_file, base.join("audit.log"));
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let mut config = Config::embedded().unwrap();
        let abs = std::env::temp_dir().join("elsewhere-hosts.txt");
        config.redirect.mirror_files = vec![abs.clone()];

        let layout = InstallLayout::with_base(Path::new("/opt/redirect"), &config);

        assert_eq!(layout.mirror_files, vec![abs]);
    }

    #[test]
    fn test_map_files_primary_first_without_duplicates() {
        let mut config = Config::embedded().unwrap();
        config.redirect.mirror_files = vec![
            PathBuf::from("copy/hosts.txt"),
            PathBuf::from("Acrylic/hosts.txt"),
        ];
        let base = PathBuf::from("/b");

        let files = InstallLayout::with_base(&base, &config).map_files();

        assert_eq!(
            files,
            vec![base.join("Acrylic/hosts.txt"), base.join("copy/hosts.txt")]
        );
    }

    #[test]
    fn test_default_helper_under_nssm() {
        let config = Config::embedded().unwrap();
        let layout = InstallLayout::with_base(Path::new("/b"), &config);
        let helper = layout.default_helper();

        assert!(helper.ends_with("nssm.exe"));
        assert!(helper.starts_with("/b/nssm"));
        if cfg!(target_pointer_width = "64") {
            assert!(helper.to_string_lossy().contains("win64"));
        }
    }

    #[test]
    fn test_resolve_uses_configured_base_dir() {
        let mut config = Config::embedded().unwrap();
        config.general.base_dir = PathBuf::from("/configured");

        let layout = InstallLayout::resolve(&config).unwrap();

        assert_eq!(layout.base_dir, PathBuf::from("/configured"));
    }

    #[test]
    fn test_resolve_defaults_to_executable_dir() {
        let config = Config::embedded().unwrap();
        let layout = InstallLayout::resolve(&config).unwrap();
        let exe = std::env::current_exe().unwrap();

        assert_eq!(Some(layout.base_dir.as_path()), exe.parent());
    }
}

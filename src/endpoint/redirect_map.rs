//! Redirect map (`hosts.txt`) serialization.

use std::fmt;
use std::fs;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::error::RedirectMapError;
use super::target::{RedirectionTarget, UpstreamEndpoint};

/// One `<address> <pattern>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectEntry {
    /// Address the pattern resolves to.
    pub address: IpAddr,
    /// Domain glob pattern.
    pub pattern: String,
}

impl RedirectEntry {
    /// Pair `address` with `pattern`.
    pub fn new(address: IpAddr, pattern: impl Into<String>) -> Self {
        Self {
            address,
            pattern: pattern.into(),
        }
    }
}

impl fmt::Display for RedirectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.pattern)
    }
}

/// Pair the best endpoint with every target pattern.
///
/// Only one address is written per pattern; the rest are fallbacks the
/// DNS proxy never sees.
pub fn entries_for(target: &RedirectionTarget, endpoints: &[UpstreamEndpoint]) -> Vec<RedirectEntry> {
    let Some(best) = endpoints.first() else {
        return Vec::new();
    };
    target
        .patterns()
        .iter()
        .map(|pattern| RedirectEntry::new(best.address, pattern.clone()))
        .collect()
}

/// Writes the same redirect map to every configured file.
#[derive(Debug, Clone)]
pub struct RedirectMapWriter {
    files: Vec<PathBuf>,
    bypass: RedirectEntry,
}

impl RedirectMapWriter {
    /// Writer for `files`, primary first. `bypass` is always the first line.
    pub fn new(files: Vec<PathBuf>, bypass: RedirectEntry) -> Self {
        Self { files, bypass }
    }

    /// Files this writer maintains.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Map contents: the bypass line, then each pattern once in order.
    pub fn render(&self, entries: &[RedirectEntry]) -> String {
        let mut seen: Vec<&str> = vec![self.bypass.pattern.as_str()];
        let mut out = format!("{}\n", self.bypass);
        for entry in entries {
            if seen.iter().any(|p| p.eq_ignore_ascii_case(&entry.pattern)) {
                continue;
            }
            seen.push(&entry.pattern);
            out.push_str(&format!("{entry}\n"));
        }
        out
    }

    /// Replace every map file with the rendered entries.
    ///
    /// Each file is written to a temporary sibling and renamed over the
    /// target, so readers see the old map or the new one, never a mix.
    pub fn write(&self, entries: &[RedirectEntry]) -> Result<Vec<PathBuf>, RedirectMapError> {
        if entries.is_empty() {
            return Err(RedirectMapError::EmptyMapping);
        }
        let contents = self.render(entries);
        let mut written = Vec::with_capacity(self.files.len());
        for path in &self.files {
            write_atomic(path, &contents).map_err(|e| RedirectMapError::Write {
                path: path.clone(),
                source: e,
            })?;
            debug!("Wrote redirect map {:?}", path);
            written.push(path.clone());
        }
        info!(
            "Redirect map written to {} file(s) with {} entries",
            written.len(),
            entries.len()
        );
        Ok(written)
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Best-effort removal of map files; returns the ones that could not be removed.
pub fn remove_map_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut failed = Vec::new();
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed redirect map {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove redirect map {:?}: {}", path, e);
                failed.push(path.clone());
            }
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeSource;
    use tempfile::tempdir;

    fn bypass() -> RedirectEntry {
        RedirectEntry::new("127.0.0.5".parse().unwrap(), "*.hcaptcha.com")
    }

    fn endpoint(addr: &str) -> UpstreamEndpoint {
        UpstreamEndpoint {
            address: addr.parse().unwrap(),
            source: ProbeSource::LatencyTool,
        }
    }

    #[test]
    fn test_single_endpoint_single_pattern_exact_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts.txt");
        let writer = RedirectMapWriter::new(vec![path.clone()], bypass());
        let target = RedirectionTarget::new(["*.example.test"]).unwrap();

        let entries = entries_for(&target, &[endpoint("203.0.113.9")]);
        writer.write(&entries).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.lines().collect::<Vec<_>>(),
            vec!["127.0.0.5 *.hcaptcha.com", "203.0.113.9 *.example.test"]
        );
    }

    #[test]
    fn test_first_endpoint_paired_with_every_pattern() {
        let target = RedirectionTarget::new(["*.a.test", "a.test"]).unwrap();
        let entries = entries_for(&target, &[endpoint("203.0.113.9"), endpoint("203.0.113.10")]);

        assert_eq!(
            entries,
            vec![
                RedirectEntry::new("203.0.113.9".parse().unwrap(), "*.a.test"),
                RedirectEntry::new("203.0.113.9".parse().unwrap(), "a.test"),
            ]
        );
        assert!(entries_for(&target, &[]).is_empty());
    }

    #[test]
    fn test_each_pattern_written_once() {
        let writer = RedirectMapWriter::new(vec![], bypass());
        let entries = vec![
            RedirectEntry::new("203.0.113.9".parse().unwrap(), "*.a.test"),
            RedirectEntry::new("203.0.113.10".parse().unwrap(), "*.A.test"),
            RedirectEntry::new("203.0.113.11".parse().unwrap(), "*.hcaptcha.com"),
        ];

        let rendered = writer.render(&entries);

        assert_eq!(rendered, "127.0.0.5 *.hcaptcha.com\n203.0.113.9 *.a.test\n");
    }

    #[test]
    fn test_mirrors_receive_identical_content_and_old_content_replaced() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("Acrylic").join("hosts.txt");
        let mirror = dir.path().join("mirror").join("hosts.txt");
        fs::create_dir_all(primary.parent().unwrap()).unwrap();
        fs::write(&primary, "1.1.1.1 stale.test\n").unwrap();
        let writer = RedirectMapWriter::new(vec![primary.clone(), mirror.clone()], bypass());

        let written = writer
            .write(&[RedirectEntry::new("203.0.113.9".parse().unwrap(), "*.a.test")])
            .unwrap();

        assert_eq!(written, vec![primary.clone(), mirror.clone()]);
        let a = fs::read_to_string(&primary).unwrap();
        let b = fs::read_to_string(&mirror).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains("stale.test"));
    }

    #[test]
    fn test_empty_mapping_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts.txt");
        let writer = RedirectMapWriter::new(vec![path.clone()], bypass());

        assert!(matches!(writer.write(&[]), Err(RedirectMapError::EmptyMapping)));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_map_files_ignores_missing() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("a.txt");
        fs::write(&present, "x").unwrap();

        let failed = remove_map_files(&[present.clone(), dir.path().join("missing.txt")]);

        assert!(failed.is_empty());
        assert!(!present.exists());
    }
}

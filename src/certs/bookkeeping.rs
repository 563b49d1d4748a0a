//! Bookkeeping folder: one DER file per CA this tool has trusted.

use std::fs;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::debug;
use uuid::Uuid;
use x509_parser::prelude::*;

use super::error::CertError;

/// Extension of bookkeeping files.
pub const RECORD_EXTENSION: &str = "cer";

/// Uppercase hex SHA-1 of a DER certificate.
pub fn thumbprint(der: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(der))
}

/// A parsed bookkeeping file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCa {
    /// File the certificate was read from.
    pub path: PathBuf,
    /// Trust store thumbprint.
    pub thumbprint: String,
    /// Subject common name, when present.
    pub common_name: Option<String>,
}

/// The folder of recorded CA certificates.
#[derive(Debug, Clone)]
pub struct Bookkeeping {
    dir: PathBuf,
}

impl Bookkeeping {
    /// Bookkeeping rooted at `dir`. The folder is created on first record.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Folder holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `der` under a fresh random name and return its path.
    pub fn record(&self, der: &[u8]) -> Result<PathBuf, CertError> {
        fs::create_dir_all(&self.dir).map_err(|e| CertError::WriteFile {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self
            .dir
            .join(format!("{}.{}", Uuid::new_v4(), RECORD_EXTENSION));
        fs::write(&path, der).map_err(|e| CertError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        debug!("Recorded CA in {:?}", path);
        Ok(path)
    }

    /// Every file in the folder, sorted. A missing folder has no entries.
    pub fn entries(&self) -> Result<Vec<PathBuf>, CertError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CertError::Bookkeeping {
                    path: self.dir.clone(),
                    source: e,
                });
            }
        };

        let mut paths = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CertError::Bookkeeping {
                path: self.dir.clone(),
                source: e,
            })?;
            if entry.file_type().is_ok_and(|t| t.is_file()) {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Delete a record once its CA is gone from the trust store.
    pub fn forget(&self, path: &Path) -> Result<(), CertError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CertError::Bookkeeping {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

/// Read and parse one bookkeeping file.
///
/// Anything that is not a single DER certificate is
/// [`CertError::CorruptBookkeeping`].
pub fn read_record(path: &Path) -> Result<RecordedCa, CertError> {
    let corrupt = |reason: String| CertError::CorruptBookkeeping {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = fs::read(path).map_err(|e| corrupt(e.to_string()))?;
    let (rest, cert) = parse_x509_certificate(&bytes).map_err(|e| corrupt(e.to_string()))?;
    if !rest.is_empty() {
        return Err(corrupt(format!("{} trailing bytes after certificate", rest.len())));
    }

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    Ok(RecordedCa {
        path: path.to_path_buf(),
        thumbprint: thumbprint(&bytes),
        common_name,
    })
}

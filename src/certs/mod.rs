//! Certificate authority and leaf certificate management.
//!
//! Install generates a fresh root CA, records its public DER in the
//! bookkeeping folder under a random name and adds it to the current user's
//! Root store. The leaf for the reverse proxy is signed by that CA and
//! written as PEM. Uninstall walks the bookkeeping folder and removes each
//! CA by SHA-1 thumbprint, so a CA trusted by any earlier run is found again
//! even if this run generated a different one.
//!
//! # Security Model
//!
//! - The CA private key is never written to disk.
//! - Only CAs listed in the bookkeeping folder are ever removed.
//! - The leaf key is written owner-only where the platform allows it.

mod authority;
mod bookkeeping;
mod error;
mod installer;
mod trust_store;

pub use authority::{CaAuthority, LeafMaterial, signature_algorithm};
pub use bookkeeping::{Bookkeeping, RECORD_EXTENSION, RecordedCa, read_record, thumbprint};
pub use error::CertError;
pub use installer::{CertificateInstaller, InstalledCa, UninstallReport};
pub use trust_store::{CertutilTrustStore, MemoryTrustStore, TrustStore};

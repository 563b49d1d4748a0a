//! Root CA and leaf certificate generation.
//!
//! The CA is created fresh on every install. Its private key lives only in
//! [`CaAuthority`] and is dropped with it; only the public DER is persisted
//! (see [`super::bookkeeping`]). The leaf is signed while the authority is
//! alive and written out for the reverse proxy.

use std::fmt;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, SignatureAlgorithm,
};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::bookkeeping::thumbprint;
use super::error::CertError;

/// Organization written into every generated subject.
const ORGANIZATION: &str = "redirect-setup";

/// ECDSA curve standing in for a requested key size.
///
/// Up to 256 bits selects P-256; anything larger selects P-384.
pub fn signature_algorithm(key_bits: u32) -> &'static SignatureAlgorithm {
    if key_bits <= 256 {
        &rcgen::PKCS_ECDSA_P256_SHA256
    } else {
        &rcgen::PKCS_ECDSA_P384_SHA384
    }
}

/// A generated root CA, able to sign leaf certificates.
pub struct CaAuthority {
    common_name: String,
    key_pair: KeyPair,
    params: CertificateParams,
    der: Vec<u8>,
    pem: String,
    thumbprint: String,
}

/// PEM certificate and private key for the reverse proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct LeafMaterial {
    /// PEM-encoded certificate.
    pub cert_pem: String,
    /// PEM-encoded private key.
    pub key_pem: String,
}

impl fmt::Debug for LeafMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafMaterial")
            .field("cert_pem", &self.cert_pem)
            .finish_non_exhaustive()
    }
}

impl CaAuthority {
    /// Generate a self-signed CA valid for `validity_days` from now.
    pub fn generate(common_name: &str, key_bits: u32, validity_days: u32) -> Result<Self, CertError> {
        let key_pair = KeyPair::generate_for(signature_algorithm(key_bits))
            .map_err(|e| CertError::KeyGeneration(e.to_string()))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = subject(common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        set_validity(&mut params, validity_days);

        let cert = params
            .clone()
            .self_signed(&key_pair)
            .map_err(|e| CertError::CertGeneration(e.to_string()))?;

        let der = cert.der().to_vec();
        let thumbprint = thumbprint(&der);
        debug!("Generated CA {:?} ({})", common_name, thumbprint);

        Ok(Self {
            common_name: common_name.to_string(),
            key_pair,
            params,
            pem: cert.pem(),
            der,
            thumbprint,
        })
    }

    /// Subject common name.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// DER-encoded public certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// PEM-encoded public certificate.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// Uppercase hex SHA-1 of the DER, as the trust store reports it.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Issue a server certificate for `patterns`, signed by this CA.
    ///
    /// Every pattern becomes a DNS subject alternative name; wildcards such
    /// as `*.example.test` are kept as is.
    pub fn issue_leaf(
        &self,
        common_name: &str,
        key_bits: u32,
        validity_days: u32,
        patterns: &[String],
    ) -> Result<LeafMaterial, CertError> {
        if patterns.is_empty() {
            return Err(CertError::NoPatterns);
        }

        let key_pair = KeyPair::generate_for(signature_algorithm(key_bits))
            .map_err(|e| CertError::KeyGeneration(e.to_string()))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = subject(common_name);
        params.subject_alt_names = patterns
            .iter()
            .map(|pattern| {
                pattern
                    .as_str()
                    .try_into()
                    .map(SanType::DnsName)
                    .map_err(|e: rcgen::Error| CertError::InvalidSan {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        set_validity(&mut params, validity_days);

        let issuer = Issuer::from_params(&self.params, &self.key_pair);
        let cert = params
            .signed_by(&key_pair, &issuer)
            .map_err(|e| CertError::CertGeneration(e.to_string()))?;

        debug!("Issued leaf {:?} for {:?}", common_name, patterns);
        Ok(LeafMaterial {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}

impl fmt::Debug for CaAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaAuthority")
            .field("common_name", &self.common_name)
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

fn subject(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(ORGANIZATION.to_string()),
    );
    dn
}

fn set_validity(params: &mut CertificateParams, validity_days: u32) {
    // Backdate a day so clocks slightly behind ours still accept the cert.
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(1);
    params.not_after = now + Duration::days(i64::from(validity_days));
}

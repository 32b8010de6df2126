//! Reading back and checking the files the CA tool and VPN daemon produce.

use der::Decode;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePrivateKey;
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

use crate::error::{Result, VpnKitError};

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const PKCS8_TAG: &str = "PRIVATE KEY";
const STATIC_KEY_BEGIN: &str = "-----BEGIN OpenVPN Static key V1-----";
const STATIC_KEY_END: &str = "-----END OpenVPN Static key V1-----";

/// A certificate read back from the PKI root.
///
/// # Fields
/// * `pem` - The certificate alone, re-encoded as PEM with LF line endings.
/// * `der` - The DER encoding.
/// * `inner` - The decoded X.509 structure.
#[derive(Clone, Debug)]
pub struct CertificatePem {
    pub pem: String,
    pub der: Vec<u8>,
    pub inner: Certificate,
}

impl CertificatePem {
    /// Extracts the first `CERTIFICATE` block from `text`.
    ///
    /// The CA tool writes a human-readable dump of the certificate before the
    /// PEM block; anything outside the block is dropped.
    ///
    /// # Arguments
    /// * `text` - Contents of a certificate file.
    pub fn extract(text: &str) -> Result<Self> {
        let block = pem::parse_many(text)?
            .into_iter()
            .find(|p| p.tag() == CERTIFICATE_TAG)
            .ok_or_else(|| VpnKitError::decoding("certificate", "no CERTIFICATE block found"))?;

        let der = block.contents().to_vec();
        let inner = Certificate::from_der(&der)?;
        let pem = pem::encode_config(
            &block,
            pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
        );
        Ok(Self { pem, der, inner })
    }

    /// The subject common name, if present and textual.
    pub fn common_name(&self) -> Option<String> {
        self.inner
            .tbs_certificate
            .subject
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|attr| attr.oid == const_oid::db::rfc4519::COMMON_NAME)
            .and_then(|attr| std::str::from_utf8(attr.value.value()).ok())
            .map(str::to_string)
    }

    /// SHA-256 fingerprint of the DER encoding, as colon-separated hex.
    pub fn fingerprint(&self) -> String {
        Sha256::digest(&self.der)
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Fails unless the subject common name equals `name`.
    pub fn expect_common_name(&self, name: &str) -> Result<()> {
        match self.common_name() {
            Some(cn) if cn == name => Ok(()),
            Some(cn) => Err(VpnKitError::CertificateError(format!(
                "issued certificate has CN '{cn}', expected '{name}'"
            ))),
            None => Err(VpnKitError::CertificateError(format!(
                "issued certificate for '{name}' has no common name"
            ))),
        }
    }

    /// Checks that `key_pem` holds the private half of this certificate's key.
    ///
    /// Only PKCS#8 P-256 keys (what the CA tool produces with our settings)
    /// are compared; other key types are accepted without comparison.
    pub fn expect_key_match(&self, key_pem: &str) -> Result<()> {
        let block = pem::parse(key_pem)?;
        if block.tag() != PKCS8_TAG {
            log::debug!("skipping key match for '{}' key", block.tag());
            return Ok(());
        }

        let info = pkcs8::PrivateKeyInfo::try_from(block.contents())?;
        let is_p256 = info.algorithm.oid == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY
            && info.algorithm.parameters_oid().ok() == Some(const_oid::db::rfc5912::SECP_256_R_1);
        if !is_p256 {
            log::debug!("skipping key match for algorithm {}", info.algorithm.oid);
            return Ok(());
        }

        let secret = p256::SecretKey::from_pkcs8_der(block.contents())
            .map_err(|e| VpnKitError::decoding("P-256 private key", e))?;
        let derived = secret.public_key().to_encoded_point(false);
        let published = self
            .inner
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes();

        if derived.as_bytes() == published {
            Ok(())
        } else {
            Err(VpnKitError::CertificateError(
                "private key does not match the issued certificate".to_string(),
            ))
        }
    }
}

/// Validates a private key file and returns it with a trailing newline trimmed.
pub fn private_key_pem(text: &str) -> Result<String> {
    let block = pem::parse(text)?;
    if !block.tag().ends_with(PKCS8_TAG) {
        return Err(VpnKitError::decoding(
            "private key",
            format!("unexpected PEM block '{}'", block.tag()),
        ));
    }
    if block.tag().starts_with("ENCRYPTED") {
        return Err(VpnKitError::CertificateError(
            "client private key is passphrase protected".to_string(),
        ));
    }
    Ok(text.trim().to_string())
}

/// Extracts the OpenVPN static key block, dropping the comment header the
/// daemon writes above it.
pub fn static_key_block(text: &str) -> Result<String> {
    let start = text
        .find(STATIC_KEY_BEGIN)
        .ok_or_else(|| VpnKitError::decoding("tunnel key", "missing BEGIN marker"))?;
    let end = text[start..]
        .find(STATIC_KEY_END)
        .map(|i| start + i + STATIC_KEY_END.len())
        .ok_or_else(|| VpnKitError::decoding("tunnel key", "missing END marker"))?;

    let block = &text[start..end];
    let body_ok = block
        .lines()
        .skip(1)
        .take_while(|l| !l.starts_with("-----END"))
        .all(|l| !l.trim().is_empty() && l.trim().chars().all(|c| c.is_ascii_hexdigit()));
    if !body_ok {
        return Err(VpnKitError::decoding("tunnel key", "body is not hex"));
    }
    Ok(block.to_string())
}

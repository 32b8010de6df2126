//! use vpnkit::error::VpnKitError;

use std::path::PathBuf;

use thiserror::Error;

/// Represents errors that can occur while provisioning the VPN.
///
/// Precondition variants are detected before any external tool runs and their
/// messages carry the remediation the operator should take.
#[derive(Debug, Error)]
pub enum VpnKitError {
    /// The PKI root does not exist yet.
    #[error("Server not initialized ({}). First run: vpn setup", .0.display())]
    NotInitialized(PathBuf),

    /// `setup` was asked to run against an existing PKI root.
    #[error("PKI already initialized at {}. To reset: delete it and run setup again.", .0.display())]
    AlreadyInitialized(PathBuf),

    /// The server address is unset or still the placeholder.
    #[error("VPN_SERVER_IP not set{0}. Export the public server address and retry.")]
    MissingServerAddress(&'static str),

    /// A setting has a value that cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The client name failed validation.
    #[error("Invalid client name '{name}': {reason}")]
    InvalidClientName { name: String, reason: &'static str },

    /// The bundle for this client has already been exported.
    #[error("File {} already exists. Delete it or choose another name.", .0.display())]
    BundleExists(PathBuf),

    /// A live certificate is already issued for this name.
    #[error("A certificate for '{0}' is already issued. Revoke it first or choose another name.")]
    CertificateExists(String),

    /// No issued certificate exists for this name.
    #[error("Client '{0}' not found.")]
    ClientNotFound(String),

    /// The client was revoked earlier.
    #[error("Client '{0}' is already revoked.")]
    AlreadyRevoked(String),

    /// An external tool could not be started.
    #[error("Command '{command}' could not be started: {source}")]
    ToolSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited unsuccessfully.
    #[error("Command '{command}' failed ({status}){}", stderr_suffix(.stderr))]
    ToolFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during data decoding.
    #[error("Failed to decode {what}: {reason}")]
    DecodingError { what: String, reason: String },

    /// The material produced by the CA tool is inconsistent.
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// A line of the CA index could not be parsed.
    #[error("Malformed CA index at line {line}: {reason}")]
    IndexParse { line: usize, reason: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl VpnKitError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VpnKitError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decoding(what: impl Into<String>, reason: impl ToString) -> Self {
        VpnKitError::DecodingError {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<der::Error> for VpnKitError {
    /// Converts a `der::Error` into a `VpnKitError`.
    fn from(err: der::Error) -> Self {
        VpnKitError::decoding("DER structure", err)
    }
}

impl From<pem::PemError> for VpnKitError {
    fn from(err: pem::PemError) -> Self {
        VpnKitError::decoding("PEM block", err)
    }
}

impl From<pkcs8::Error> for VpnKitError {
    fn from(err: pkcs8::Error) -> Self {
        VpnKitError::decoding("PKCS#8 private key", err)
    }
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, VpnKitError>;

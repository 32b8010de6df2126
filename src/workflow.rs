//! The provisioning workflow: `setup`, `create`, `revoke` and `list`.
//!
//! Every operation re-derives its state from disk, checks its preconditions
//! before touching any external tool, and stops at the first failing step.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::error::{Result, VpnKitError};
use crate::name::ClientName;
use crate::ovpn::client::ClientBundle;
use crate::ovpn::server::{self, ServerConfig};
use crate::pki::index::{self, IndexEntry, RecordStatus};
use crate::pki::material::{self, CertificatePem};
use crate::pki::{CaTool, PkiPaths, SERVER_IDENTITY};
use crate::process::ProcessRunner;
use crate::settings::{Endpoint, SavedParams, Settings};

const SETUP_STEPS: usize = 6;

/// Outcome of a successful `setup`.
#[derive(Clone, Debug)]
pub struct SetupReport {
    pub endpoint: Endpoint,
    pub server_config: PathBuf,
    pub ca_fingerprint: String,
}

/// Outcome of a successful `create`.
#[derive(Clone, Debug)]
pub struct CreatedBundle {
    pub name: ClientName,
    pub path: PathBuf,
    pub endpoint: Endpoint,
    pub ca_fingerprint: String,
}

/// Outcome of a successful `revoke`.
#[derive(Clone, Debug)]
pub struct RevokeReport {
    pub name: ClientName,
    /// Whether an exported bundle was found and deleted.
    pub bundle_removed: bool,
}

/// Status of a client as reported by `list`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientStatus {
    Valid,
    Revoked,
    Expired,
}

/// One line of `list` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientEntry {
    pub name: String,
    pub status: ClientStatus,
    /// Path of the exported bundle, when one exists.
    pub bundle: Option<PathBuf>,
}

/// Runs the provisioning operations against the locations in [`Settings`].
///
/// # Example
/// ```no_run
/// use vpnkit::process::SystemRunner;
/// use vpnkit::settings::Settings;
/// use vpnkit::workflow::Provisioner;
///
/// # fn main() -> Result<(), vpnkit::error::VpnKitError> {
/// let provisioner = Provisioner::new(Settings::from_env()?, SystemRunner);
/// let bundle = provisioner.create("phone")?;
/// println!("{}", bundle.path.display());
/// # Ok(())
/// # }
/// ```
pub struct Provisioner<R: ProcessRunner> {
    settings: Settings,
    runner: R,
}

impl<R: ProcessRunner> Provisioner<R> {
    pub fn new(settings: Settings, runner: R) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn pki(&self) -> PkiPaths {
        PkiPaths::new(self.settings.layout.pki_dir())
    }

    fn ca_tool(&self) -> CaTool<'_, R> {
        CaTool::new(
            &self.runner,
            &self.settings.easyrsa_bin,
            &self.settings.openvpn_bin,
            self.pki(),
        )
    }

    /// Whether a PKI root already exists at the configured location.
    pub fn is_initialized(&self) -> bool {
        self.pki().exists()
    }

    fn require_initialized(&self) -> Result<PkiPaths> {
        let pki = self.pki();
        if pki.exists() {
            Ok(pki)
        } else {
            Err(VpnKitError::NotInitialized(pki.root().to_path_buf()))
        }
    }

    /// Initializes the PKI, the server certificate, the tunnel key and the
    /// server configuration.
    ///
    /// Refuses to run when the PKI root already exists. A step that fails
    /// leaves what was created so far in place for inspection.
    pub fn setup(&self) -> Result<SetupReport> {
        let endpoint = self.settings.setup_endpoint()?;
        let pki = self.pki();
        if pki.exists() {
            return Err(VpnKitError::AlreadyInitialized(pki.root().to_path_buf()));
        }
        let layout = &self.settings.layout;
        fs::create_dir_all(&layout.ovpn_dir).map_err(|e| VpnKitError::io(&layout.ovpn_dir, e))?;

        let ca = self.ca_tool();
        step(1, "Initializing PKI");
        ca.init_pki()?;
        ca.write_vars()?;

        step(2, "Building root CA (ECDSA P-256, no CA password)");
        ca.build_ca()?;

        step(3, "Issuing server certificate");
        ca.build_server()?;

        step(4, "Generating tunnel key and initial CRL");
        ca.gen_tls_crypt_key()?;
        ca.gen_crl()?;

        step(5, "Writing server config");
        let config = ServerConfig::for_pki(&pki, self.settings.dns.clone()).render();
        server::validate(&config)?;
        let config_path = layout.server_config();
        fs::write(&config_path, config).map_err(|e| VpnKitError::io(&config_path, e))?;

        step(6, "Saving connection parameters");
        endpoint.save(&layout.connection_params())?;

        let ca_cert = CertificatePem::extract(&pki.read(&pki.ca_cert())?)?;
        Ok(SetupReport {
            endpoint,
            server_config: config_path,
            ca_fingerprint: ca_cert.fingerprint(),
        })
    }

    /// Issues a certificate for `name` and exports its bundle.
    ///
    /// Fails without issuing anything if the bundle already exists, so a
    /// client's key material is never rotated silently.
    pub fn create(&self, name: &str) -> Result<CreatedBundle> {
        let pki = self.require_initialized()?;
        let name = ClientName::parse(name)?;
        let layout = &self.settings.layout;

        let bundle_path = layout.bundle(name.as_str());
        if bundle_path.exists() {
            return Err(VpnKitError::BundleExists(bundle_path));
        }
        if pki.issued_cert(name.as_str()).exists() {
            return Err(VpnKitError::CertificateExists(name.to_string()));
        }

        let saved = SavedParams::load(&layout.connection_params())?;
        let endpoint = self.settings.resolve_endpoint(&saved)?;
        fs::create_dir_all(&layout.clients_dir)
            .map_err(|e| VpnKitError::io(&layout.clients_dir, e))?;

        log::info!("Creating client: {name}");
        self.ca_tool().build_client(name.as_str())?;

        log::info!("Exporting {}", bundle_path.display());
        let ca_cert = CertificatePem::extract(&pki.read(&pki.ca_cert())?)?;
        let client_cert = CertificatePem::extract(&pki.read(&pki.issued_cert(name.as_str()))?)?;
        client_cert.expect_common_name(name.as_str())?;
        let client_key =
            material::private_key_pem(&pki.read(&pki.private_key(name.as_str()))?)?;
        client_cert.expect_key_match(&client_key)?;
        let tls_crypt_key = material::static_key_block(&pki.read(&pki.tls_crypt_key())?)?;

        let bundle = ClientBundle {
            endpoint: endpoint.clone(),
            ca_cert: ca_cert.pem.clone(),
            client_cert: client_cert.pem,
            client_key,
            tls_crypt_key,
        };
        write_private(&bundle_path, bundle.render().as_bytes())?;

        Ok(CreatedBundle {
            name,
            path: bundle_path,
            endpoint,
            ca_fingerprint: ca_cert.fingerprint(),
        })
    }

    /// Revokes `name`, regenerates the CRL and deletes the exported bundle.
    ///
    /// Revoking a client that is already revoked is an error.
    pub fn revoke(&self, name: &str) -> Result<RevokeReport> {
        let pki = self.require_initialized()?;
        let name = ClientName::parse(name)?;

        let entries = self.read_index(&pki)?;
        let revoked = latest_by_name(&entries)
            .into_iter()
            .any(|e| e.common_name == name.as_str() && e.status == RecordStatus::Revoked);
        if revoked {
            return Err(VpnKitError::AlreadyRevoked(name.to_string()));
        }
        if !pki.issued_cert(name.as_str()).exists() {
            return Err(VpnKitError::ClientNotFound(name.to_string()));
        }

        log::info!("Revoking client: {name}");
        let ca = self.ca_tool();
        ca.revoke(name.as_str())?;
        ca.gen_crl()?;

        let bundle_removed = remove_best_effort(&self.settings.layout.bundle(name.as_str()));
        Ok(RevokeReport {
            name,
            bundle_removed,
        })
    }

    /// Lists every issued client in index order, excluding the server.
    pub fn list(&self) -> Result<Vec<ClientEntry>> {
        let pki = self.require_initialized()?;
        let entries = self.read_index(&pki)?;
        let now = OffsetDateTime::now_utc();

        Ok(latest_by_name(&entries)
            .into_iter()
            .map(|entry| {
                let status = if entry.status == RecordStatus::Revoked {
                    ClientStatus::Revoked
                } else if entry.is_expired_at(now) {
                    ClientStatus::Expired
                } else {
                    ClientStatus::Valid
                };
                let bundle = self.settings.layout.bundle(&entry.common_name);
                ClientEntry {
                    name: entry.common_name.clone(),
                    status,
                    bundle: bundle.exists().then_some(bundle),
                }
            })
            .collect())
    }

    fn read_index(&self, pki: &PkiPaths) -> Result<Vec<IndexEntry>> {
        let path = pki.index();
        match fs::read_to_string(&path) {
            Ok(text) => index::parse_index(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(VpnKitError::io(path, e)),
        }
    }
}

fn step(n: usize, msg: &str) {
    log::info!("[{n}/{SETUP_STEPS}] {msg}");
}

/// Client records in first-seen order, each replaced by the latest record
/// for the same name. The server identity and records without a CN are
/// dropped.
fn latest_by_name(entries: &[IndexEntry]) -> Vec<&IndexEntry> {
    let mut latest: Vec<&IndexEntry> = Vec::new();
    for entry in entries {
        if entry.common_name.is_empty() || entry.common_name == SERVER_IDENTITY {
            continue;
        }
        match latest.iter_mut().find(|e| e.common_name == entry.common_name) {
            Some(slot) => *slot = entry,
            None => latest.push(entry),
        }
    }
    latest
}

/// Writes `contents` to a new file readable by the owner only.
///
/// Fails if the file already exists. A partially written file is removed.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => VpnKitError::BundleExists(path.to_path_buf()),
        _ => VpnKitError::io(path, e),
    })?;
    if let Err(e) = file.write_all(contents).and_then(|()| file.sync_all()) {
        drop(file);
        remove_best_effort(path);
        return Err(VpnKitError::io(path, e));
    }
    Ok(())
}

/// Deletes `path`, returning whether a file was removed. Absence is not an
/// error; other failures are logged.
fn remove_best_effort(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("could not remove {}: {e}", path.display());
            false
        }
    }
}

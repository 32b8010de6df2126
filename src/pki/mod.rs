pub mod index;
pub mod material;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, VpnKitError};
use crate::process::{Invocation, ProcessRunner};

/// Common name of the server certificate. Never a valid client name.
pub const SERVER_IDENTITY: &str = "server";
/// File stem of the CA key inside `private/`. Never a valid client name.
pub const CA_IDENTITY: &str = "ca";

/// Curve used for every key the CA tool generates.
pub const EC_CURVE: &str = "prime256v1";
/// Common name of the self-signed root.
pub const CA_COMMON_NAME: &str = "OpenVPN CA";
/// Lifetime of each generated CRL. The CA tool default (180 days) would
/// silently lock every client out once it lapses.
pub const CRL_DAYS: u32 = 3650;

/// On-disk layout of the PKI root maintained by easy-rsa.
#[derive(Clone, Debug)]
pub struct PkiPaths {
    root: PathBuf,
}

impl PkiPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The PKI root is the "server initialized" sentinel.
    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    pub fn ca_cert(&self) -> PathBuf {
        self.root.join("ca.crt")
    }

    pub fn ca_key(&self) -> PathBuf {
        self.private_key(CA_IDENTITY)
    }

    pub fn issued_dir(&self) -> PathBuf {
        self.root.join("issued")
    }

    pub fn issued_cert(&self, name: &str) -> PathBuf {
        self.issued_dir().join(format!("{name}.crt"))
    }

    pub fn private_key(&self, name: &str) -> PathBuf {
        self.root.join("private").join(format!("{name}.key"))
    }

    pub fn index(&self) -> PathBuf {
        self.root.join("index.txt")
    }

    pub fn crl(&self) -> PathBuf {
        self.root.join("crl.pem")
    }

    /// Tunnel pre-shared key used for tls-crypt.
    pub fn tls_crypt_key(&self) -> PathBuf {
        self.root.join("ta.key")
    }

    pub fn vars(&self) -> PathBuf {
        self.root.join("vars")
    }

    /// Reads a file below the root as text.
    pub fn read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| VpnKitError::io(path, e))
    }
}

/// Drives easy-rsa and the OpenVPN key generator against one PKI root.
///
/// Every call passes its parameters through an explicit environment map on
/// the [`Invocation`]; nothing is exported into the process environment.
pub struct CaTool<'a, R: ProcessRunner> {
    runner: &'a R,
    easyrsa_bin: String,
    openvpn_bin: String,
    paths: PkiPaths,
}

impl<'a, R: ProcessRunner> CaTool<'a, R> {
    pub fn new(
        runner: &'a R,
        easyrsa_bin: impl Into<String>,
        openvpn_bin: impl Into<String>,
        paths: PkiPaths,
    ) -> Self {
        Self {
            runner,
            easyrsa_bin: easyrsa_bin.into(),
            openvpn_bin: openvpn_bin.into(),
            paths,
        }
    }

    pub fn paths(&self) -> &PkiPaths {
        &self.paths
    }

    fn env(&self) -> BTreeMap<String, String> {
        [
            ("EASYRSA_BATCH", "1".to_string()),
            ("EASYRSA_PKI", self.paths.root().display().to_string()),
            ("EASYRSA_ALGO", "ec".to_string()),
            ("EASYRSA_CURVE", EC_CURVE.to_string()),
            ("EASYRSA_CRL_DAYS", CRL_DAYS.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn easyrsa<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new(&self.easyrsa_bin)
            .args(args)
            .envs(&self.env());
        self.runner.run_checked(&invocation).map(|_| ())
    }

    /// Creates an empty PKI root.
    pub fn init_pki(&self) -> Result<()> {
        self.easyrsa(["init-pki"])
    }

    /// Persists the key algorithm for later manual runs of easy-rsa.
    pub fn write_vars(&self) -> Result<()> {
        let path = self.paths.vars();
        let vars = format!("set_var EASYRSA_ALGO     ec\nset_var EASYRSA_CURVE    {EC_CURVE}\n");
        fs::write(&path, vars).map_err(|e| VpnKitError::io(path, e))
    }

    /// Builds the self-signed root without a passphrase.
    pub fn build_ca(&self) -> Result<()> {
        let invocation = Invocation::new(&self.easyrsa_bin)
            .args(["build-ca", "nopass"])
            .envs(&self.env())
            .envs(&BTreeMap::from([(
                "EASYRSA_REQ_CN".to_string(),
                CA_COMMON_NAME.to_string(),
            )]));
        self.runner.run_checked(&invocation).map(|_| ())
    }

    /// Issues the certificate of the reserved server identity.
    pub fn build_server(&self) -> Result<()> {
        self.easyrsa(["build-server-full", SERVER_IDENTITY, "nopass"])
    }

    /// Issues a client certificate without a passphrase.
    pub fn build_client(&self, name: &str) -> Result<()> {
        self.easyrsa(["build-client-full", name, "nopass"])
    }

    /// Marks `name` revoked in the CA index.
    pub fn revoke(&self, name: &str) -> Result<()> {
        self.easyrsa(["revoke", name])
    }

    /// Regenerates the CRL and makes it readable by the unprivileged daemon.
    pub fn gen_crl(&self) -> Result<()> {
        self.easyrsa(["gen-crl"])?;
        make_world_readable(&self.paths.crl())
    }

    /// Generates the tunnel pre-shared key with the VPN daemon.
    pub fn gen_tls_crypt_key(&self) -> Result<()> {
        let invocation = Invocation::new(&self.openvpn_bin)
            .args(["--genkey", "secret"])
            .arg(self.paths.tls_crypt_key().display().to_string());
        self.runner.run_checked(&invocation).map(|_| ())
    }
}

#[cfg(unix)]
fn make_world_readable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
        .map_err(|e| VpnKitError::io(path, e))
}

#[cfg(not(unix))]
fn make_world_readable(_path: &Path) -> Result<()> {
    Ok(())
}

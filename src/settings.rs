//! Runtime settings resolved from environment variables.
//!
//! Values are read through a lookup function rather than `std::env` directly so
//! callers (and tests) can supply an explicit map instead of mutating the
//! process environment.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bon::Builder;

use crate::error::{Result, VpnKitError};

/// Environment variable holding the public server address.
pub const ENV_SERVER_IP: &str = "VPN_SERVER_IP";
/// Environment variable holding the external port.
pub const ENV_PORT: &str = "VPN_PORT";
/// Environment variable holding the comma-separated DNS servers pushed to clients.
pub const ENV_DNS: &str = "VPN_DNS";
/// Environment variable overriding the daemon configuration directory.
pub const ENV_OVPN_DIR: &str = "VPN_OVPN_DIR";
/// Environment variable overriding the client bundle directory.
pub const ENV_CLIENTS_DIR: &str = "VPN_CLIENTS_DIR";
/// Environment variable overriding the CA tool executable.
pub const ENV_EASYRSA_BIN: &str = "VPN_EASYRSA_BIN";
/// Environment variable overriding the VPN daemon executable.
pub const ENV_OPENVPN_BIN: &str = "VPN_OPENVPN_BIN";

/// Placeholder shipped in sample `.env` files; treated as unset.
pub const ADDRESS_PLACEHOLDER: &str = "YOUR_SERVER_IP";
/// Well-known OpenVPN port.
pub const DEFAULT_PORT: u16 = 1194;

const DEFAULT_OVPN_DIR: &str = "/etc/openvpn";
const DEFAULT_CLIENTS_DIR: &str = "/clients";
const DEFAULT_DNS: [&str; 2] = ["1.1.1.1", "1.0.0.1"];

/// Fixed, well-known paths of every file the workflow touches.
#[derive(Clone, Debug)]
pub struct Layout {
    pub ovpn_dir: PathBuf,
    pub clients_dir: PathBuf,
}

impl Layout {
    pub fn new(ovpn_dir: impl Into<PathBuf>, clients_dir: impl Into<PathBuf>) -> Self {
        Self {
            ovpn_dir: ovpn_dir.into(),
            clients_dir: clients_dir.into(),
        }
    }

    /// The PKI root managed by the CA tool.
    pub fn pki_dir(&self) -> PathBuf {
        self.ovpn_dir.join("pki")
    }

    pub fn server_config(&self) -> PathBuf {
        self.ovpn_dir.join("openvpn.conf")
    }

    /// Key-value file holding the endpoint chosen at setup time.
    pub fn connection_params(&self) -> PathBuf {
        self.ovpn_dir.join("vpn.env")
    }

    /// Path of the exported bundle for `name`.
    pub fn bundle(&self, name: &str) -> PathBuf {
        self.clients_dir.join(format!("{name}.ovpn"))
    }
}

/// Address and port clients connect to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl Endpoint {
    /// Renders the connection-parameters file.
    pub fn to_params(&self) -> String {
        format!(
            "# Written by vpn setup; read by vpn create\n{ENV_SERVER_IP}={}\n{ENV_PORT}={}\n",
            self.address, self.port
        )
    }

    /// Persists the endpoint to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_params()).map_err(|e| VpnKitError::io(path, e))
    }
}

/// Partial endpoint recovered from the connection-parameters file.
///
/// The port is kept as written and only validated when it is actually used,
/// so a value supplied by the environment wins even over a corrupt file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SavedParams {
    pub address: Option<String>,
    pub port: Option<String>,
}

impl SavedParams {
    /// Parses `KEY=VALUE` lines. Comments, blank lines and unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut vars = parse_key_values(text);
        Ok(Self {
            address: vars.get(ENV_SERVER_IP).and_then(|v| usable_address(v)),
            port: vars.remove(ENV_PORT),
        })
    }

    /// The saved port, if any.
    pub fn port(&self) -> Result<Option<u16>> {
        self.port.as_deref().map(parse_port).transpose()
    }

    /// Loads the file at `path`; a missing file yields empty params.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(VpnKitError::io(path, e)),
        }
    }
}

fn parse_key_values(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn usable_address(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == ADDRESS_PLACEHOLDER {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_port(value: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(VpnKitError::InvalidConfig(format!(
            "{ENV_PORT} must be a port number between 1 and 65535, got '{value}'"
        ))),
    }
}

/// Everything the workflow needs from its environment.
///
/// # Fields
/// * `address` - Public server address, if supplied.
/// * `port` - External port, if supplied.
/// * `dns` - DNS servers pushed to clients.
/// * `layout` - On-disk locations.
/// * `easyrsa_bin` - CA tool executable.
/// * `openvpn_bin` - VPN daemon executable.
#[derive(Clone, Debug, Builder)]
pub struct Settings {
    pub address: Option<String>,
    pub port: Option<u16>,
    #[builder(default = DEFAULT_DNS.iter().map(|s| s.to_string()).collect())]
    pub dns: Vec<String>,
    #[builder(default = Layout::new(DEFAULT_OVPN_DIR, DEFAULT_CLIENTS_DIR))]
    pub layout: Layout,
    #[builder(default = "easyrsa".to_string())]
    pub easyrsa_bin: String,
    #[builder(default = "openvpn".to_string())]
    pub openvpn_bin: String,
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`.
    ///
    /// Empty values count as unset.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of an environment variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dns = match get(ENV_DNS) {
            Some(list) => {
                let servers: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if servers.iter().any(|s| s.contains(char::is_whitespace)) {
                    return Err(VpnKitError::InvalidConfig(format!(
                        "{ENV_DNS} must be a comma-separated list of addresses"
                    )));
                }
                servers
            }
            None => DEFAULT_DNS.iter().map(|s| s.to_string()).collect(),
        };

        let address = get(ENV_SERVER_IP).and_then(|v| usable_address(&v));
        if let Some(addr) = &address {
            if addr.contains(char::is_whitespace) {
                return Err(VpnKitError::InvalidConfig(format!(
                    "{ENV_SERVER_IP} must not contain whitespace"
                )));
            }
        }

        Ok(Settings {
            address,
            port: get(ENV_PORT).map(|v| parse_port(&v)).transpose()?,
            dns,
            layout: Layout::new(
                get(ENV_OVPN_DIR).unwrap_or_else(|| DEFAULT_OVPN_DIR.to_string()),
                get(ENV_CLIENTS_DIR).unwrap_or_else(|| DEFAULT_CLIENTS_DIR.to_string()),
            ),
            easyrsa_bin: get(ENV_EASYRSA_BIN).unwrap_or_else(|| "easyrsa".to_string()),
            openvpn_bin: get(ENV_OPENVPN_BIN).unwrap_or_else(|| "openvpn".to_string()),
        })
    }

    /// Endpoint for `setup`: the address must come from the environment.
    pub fn setup_endpoint(&self) -> Result<Endpoint> {
        let address = self.address.clone().ok_or(VpnKitError::MissingServerAddress(
            " (or still set to YOUR_SERVER_IP)",
        ))?;
        Ok(Endpoint {
            address,
            port: self.port.unwrap_or(DEFAULT_PORT),
        })
    }

    /// Endpoint for bundles: environment first, then the saved parameters.
    pub fn resolve_endpoint(&self, saved: &SavedParams) -> Result<Endpoint> {
        let address = self
            .address
            .clone()
            .or_else(|| saved.address.clone())
            .ok_or(VpnKitError::MissingServerAddress(
                " and no saved connection parameters were found",
            ))?;
        Ok(Endpoint {
            address,
            port: match self.port {
                Some(port) => port,
                None => saved.port()?.unwrap_or(DEFAULT_PORT),
            },
        })
    }
}

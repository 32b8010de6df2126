use std::path::PathBuf;

use bon::Builder;

use super::{AUTH_DIGEST, CIPHER, INTERNAL_PORT, PROTO, TLS_CIPHER, TLS_VERSION_MIN};
use crate::error::{Result, VpnKitError};
use crate::pki::{EC_CURVE, PkiPaths, SERVER_IDENTITY};

/// Parameters of the server configuration file.
///
/// # Fields
/// * `ca` - Root certificate path.
/// * `cert` - Server certificate path.
/// * `key` - Server private key path.
/// * `tls_crypt_key` - Tunnel pre-shared key path.
/// * `crl` - Revocation list checked on every connection.
/// * `network` / `netmask` - Subnet clients are addressed from.
/// * `dns` - DNS servers pushed to clients.
#[derive(Clone, Debug, Builder)]
pub struct ServerConfig {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub tls_crypt_key: PathBuf,
    pub crl: PathBuf,
    #[builder(default = "192.168.255.0".to_string())]
    pub network: String,
    #[builder(default = "255.255.255.0".to_string())]
    pub netmask: String,
    #[builder(default)]
    pub dns: Vec<String>,
}

impl ServerConfig {
    /// Server configuration referencing the files of `pki`.
    pub fn for_pki(pki: &PkiPaths, dns: Vec<String>) -> Self {
        ServerConfig::builder()
            .ca(pki.ca_cert())
            .cert(pki.issued_cert(SERVER_IDENTITY))
            .key(pki.private_key(SERVER_IDENTITY))
            .tls_crypt_key(pki.tls_crypt_key())
            .crl(pki.crl())
            .dns(dns)
            .build()
    }

    /// Renders the configuration file read by the daemon at start-up.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = vec![
            "# Generated by vpn setup".to_string(),
            format!("port {INTERNAL_PORT}"),
            format!("proto {PROTO}"),
            "dev tun".to_string(),
            String::new(),
            format!("ca {}", self.ca.display()),
            format!("cert {}", self.cert.display()),
            format!("key {}", self.key.display()),
            "dh none".to_string(),
            format!("ecdh-curve {EC_CURVE}"),
            format!("tls-crypt {}", self.tls_crypt_key.display()),
            format!("crl-verify {}", self.crl.display()),
            String::new(),
            "topology subnet".to_string(),
            format!("server {} {}", self.network, self.netmask),
            "keepalive 10 60".to_string(),
            "persist-key".to_string(),
            "persist-tun".to_string(),
            "user nobody".to_string(),
            "group nogroup".to_string(),
            String::new(),
            format!("cipher {CIPHER}"),
            format!("data-ciphers {CIPHER}"),
            format!("auth {AUTH_DIGEST}"),
            format!("tls-version-min {TLS_VERSION_MIN}"),
            format!("tls-cipher {TLS_CIPHER}"),
            String::new(),
            "push \"block-outside-dns\"".to_string(),
            "push \"redirect-gateway def1\"".to_string(),
        ];
        for server in &self.dns {
            lines.push(format!("push \"dhcp-option DNS {server}\""));
        }
        lines.push(String::new());
        lines.push("status /tmp/openvpn-status.log".to_string());
        lines.push("verb 3".to_string());

        lines.join("\n") + "\n"
    }
}

/// Checks a rendered server configuration before it is written.
///
/// The file must carry exactly the hardening the clients expect: a
/// `tls-cipher` line restricted to ECDHE suites and a `crl-verify` line.
pub fn validate(config: &str) -> Result<()> {
    let directives = |name: &str| -> Vec<&str> {
        config
            .lines()
            .map(str::trim)
            .filter(|l| l.split_whitespace().next() == Some(name))
            .collect()
    };

    let tls_ciphers = directives("tls-cipher");
    if tls_ciphers.is_empty() {
        return Err(VpnKitError::InvalidConfig(
            "tls-cipher directive missing from server config".to_string(),
        ));
    }
    for line in tls_ciphers {
        if !line.contains("TLS-ECDHE-") {
            return Err(VpnKitError::InvalidConfig(format!(
                "bad tls-cipher in server config: {line}"
            )));
        }
    }
    if directives("crl-verify").is_empty() {
        return Err(VpnKitError::InvalidConfig(
            "crl-verify directive missing from server config".to_string(),
        ));
    }
    Ok(())
}

use super::{AUTH_DIGEST, CIPHER, PROTO, TLS_CIPHER, TLS_VERSION_MIN, push_inline};
use crate::settings::Endpoint;

/// Material embedded in a client bundle.
///
/// All fields hold PEM (or OpenVPN static key) text.
#[derive(Clone, Debug)]
pub struct ClientBundle {
    pub endpoint: Endpoint,
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
    pub tls_crypt_key: String,
}

impl ClientBundle {
    /// Renders the self-contained `.ovpn` file.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = vec![
            "# Generated by vpn create".to_string(),
            "client".to_string(),
            "nobind".to_string(),
            "dev tun".to_string(),
            format!(
                "remote {} {} {PROTO}",
                self.endpoint.address, self.endpoint.port
            ),
            "resolv-retry infinite".to_string(),
            "persist-key".to_string(),
            "persist-tun".to_string(),
            "remote-cert-tls server".to_string(),
            format!("cipher {CIPHER}"),
            format!("data-ciphers {CIPHER}"),
            format!("auth {AUTH_DIGEST}"),
            format!("tls-version-min {TLS_VERSION_MIN}"),
            format!("tls-cipher {TLS_CIPHER}"),
            "verb 3".to_string(),
            String::new(),
        ];

        push_inline(&mut lines, "ca", &self.ca_cert);
        push_inline(&mut lines, "cert", &self.client_cert);
        push_inline(&mut lines, "key", &self.client_key);
        push_inline(&mut lines, "tls-crypt", &self.tls_crypt_key);

        lines.join("\n") + "\n"
    }
}

/// Reads the `remote` line back out of a rendered bundle.
pub fn remote_of(bundle: &str) -> Option<Endpoint> {
    bundle.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("remote") {
            return None;
        }
        let address = parts.next()?.to_string();
        let port = parts.next()?.parse().ok()?;
        Some(Endpoint { address, port })
    })
}

/// Returns the body of the inline `<tag>` block of a rendered bundle.
pub fn inline_block<'a>(bundle: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>\n");
    let close = format!("\n</{tag}>");
    let start = bundle.find(&open)? + open.len();
    let len = bundle[start..].find(&close)?;
    Some(&bundle[start..start + len])
}

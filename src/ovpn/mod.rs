//! OpenVPN configuration templates.
//!
//! The server and client sides must agree on cipher, digest and TLS settings,
//! so both templates read them from the constants below.

pub mod client;
pub mod server;

/// Port the daemon listens on inside its network namespace. The external
/// port chosen at setup time is only used on the client side.
pub const INTERNAL_PORT: u16 = 1194;
pub const PROTO: &str = "udp";
pub const CIPHER: &str = "AES-256-GCM";
pub const AUTH_DIGEST: &str = "SHA256";
pub const TLS_VERSION_MIN: &str = "1.2";
pub const TLS_CIPHER: &str = "TLS-ECDHE-ECDSA-WITH-AES-256-GCM-SHA384";

/// Appends `<tag>` ... `</tag>` around `body` to `lines`.
pub(crate) fn push_inline(lines: &mut Vec<String>, tag: &str, body: &str) {
    lines.push(format!("<{tag}>"));
    lines.push(body.trim_end().to_string());
    lines.push(format!("</{tag}>"));
}

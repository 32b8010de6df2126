use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, VpnKitError};
use crate::pki::{CA_IDENTITY, SERVER_IDENTITY};

static CLIENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").expect("valid regex"));

/// A client name that is safe to use as a certificate CN, a file stem and an
/// argument to the CA tool.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientName(String);

impl ClientName {
    /// Validates `name`.
    ///
    /// Accepts 1 to 64 characters from `[A-Za-z0-9._-]`, starting with a letter
    /// or digit, and rejects the identities reserved by the PKI.
    pub fn parse(name: &str) -> Result<Self> {
        let reject = |reason| VpnKitError::InvalidClientName {
            name: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(reject("name is empty"));
        }
        if name.len() > 64 {
            return Err(reject("name is longer than 64 characters"));
        }
        if !CLIENT_NAME.is_match(name) {
            return Err(reject(
                "use letters, digits, '.', '_' or '-', starting with a letter or digit",
            ));
        }
        if name.eq_ignore_ascii_case(SERVER_IDENTITY) || name.eq_ignore_ascii_case(CA_IDENTITY) {
            return Err(reject("name is reserved for the PKI"));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//! # VpnKit - Single-Server OpenVPN Provisioning
//!
//! VpnKit drives an existing certificate authority toolchain (easy-rsa) and the
//! OpenVPN daemon's key generator to provision a single VPN server. It never
//! performs cryptography of its own: keys, certificates and revocation lists
//! come from the external tools, and VpnKit invokes them with the right
//! arguments, checks what they wrote, and packages the result.
//!
//! ## Operations
//!
//! - **setup**: initialize the PKI, issue the server certificate, generate the
//!   tunnel key and CRL, and write the server configuration.
//! - **create**: issue a client certificate and export a self-contained
//!   `.ovpn` bundle (owner-only permissions).
//! - **revoke**: revoke a client, regenerate the CRL and delete its bundle.
//! - **list**: report every client with its bundle and revocation status.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vpnkit::process::SystemRunner;
//! use vpnkit::settings::Settings;
//! use vpnkit::workflow::Provisioner;
//!
//! # fn main() -> Result<(), vpnkit::error::VpnKitError> {
//! let settings = Settings::builder()
//!     .address("vpn.example.com".to_string())
//!     .port(1194)
//!     .build();
//! let provisioner = Provisioner::new(settings, SystemRunner);
//!
//! provisioner.setup()?;
//! let bundle = provisioner.create("phone")?;
//! println!("exported {}", bundle.path.display());
//!
//! for client in provisioner.list()? {
//!     println!("{} {:?}", client.name, client.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`error::VpnKitError`]. Precondition failures are
//! detected before any external tool runs:
//!
//! ```rust,no_run
//! use vpnkit::error::VpnKitError;
//! # use vpnkit::{process::SystemRunner, settings::Settings, workflow::Provisioner};
//! # let provisioner = Provisioner::new(Settings::builder().build(), SystemRunner);
//!
//! match provisioner.create("phone") {
//!     Ok(bundle) => println!("{}", bundle.path.display()),
//!     Err(VpnKitError::NotInitialized(_)) => println!("run setup first"),
//!     Err(VpnKitError::BundleExists(path)) => println!("{} exists", path.display()),
//!     Err(e) => println!("other error: {e}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`workflow`]: the four operations
//! - [`pki`]: PKI layout, CA tool driver, index parser, material checks
//! - [`ovpn`]: server configuration and client bundle templates
//! - [`process`]: external command invocation
//! - [`settings`]: environment-derived configuration
//! - [`name`]: client name validation
//! - [`error`]: error types

pub mod error;
pub mod name;
pub mod ovpn;
pub mod pki;
pub mod process;
pub mod settings;
pub mod workflow;

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509, X509Builder, X509NameBuilder};
use tempfile::TempDir;

use vpnkit::error::{Result, VpnKitError};
use vpnkit::process::{Invocation, ProcessOutput, ProcessRunner};
use vpnkit::settings::{Layout, Settings};
use vpnkit::workflow::Provisioner;

pub const EXPIRY: &str = "350101000000Z";
pub const REVOKED_AT: &str = "250301093000Z";

/// Stands in for easy-rsa and `openvpn --genkey`, producing the same on-disk
/// layout with real P-256 certificates.
#[derive(Default)]
pub struct FakeToolchain {
    /// Subcommand (first argument) that should exit non-zero.
    pub fail_on: RefCell<Option<String>>,
    /// When set, client keys written to disk do not match their certificate.
    pub mismatched_keys: Cell<bool>,
    pub calls: RefCell<Vec<Invocation>>,
}

impl FakeToolchain {
    pub fn fail_on(&self, subcommand: &str) {
        *self.fail_on.borrow_mut() = Some(subcommand.to_string());
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.args.first().cloned().unwrap_or_default())
            .collect()
    }

    fn easyrsa(&self, inv: &Invocation) -> std::result::Result<(), String> {
        let pki = PathBuf::from(inv.env.get("EASYRSA_PKI").ok_or("EASYRSA_PKI unset")?);
        if inv.env.get("EASYRSA_BATCH").map(String::as_str) != Some("1") {
            return Err("interactive mode not supported".to_string());
        }
        let arg = |i: usize| inv.args.get(i).cloned().ok_or("missing argument");

        match arg(0)?.as_str() {
            "init-pki" => {
                for dir in ["private", "issued", "reqs", "revoked/certs_by_serial"] {
                    fs::create_dir_all(pki.join(dir)).map_err(|e| e.to_string())?;
                }
                write(&pki.join("index.txt"), "")?;
                write(&pki.join("serial"), "01\n")
            }
            "build-ca" => {
                let cn = inv.env.get("EASYRSA_REQ_CN").cloned().unwrap_or("Easy-RSA CA".into());
                let key = ec_key();
                let cert = certificate(&cn, 0, &key, None);
                write(&pki.join("ca.crt"), &pem_text(&cert))?;
                write(&pki.join("private/ca.key"), &key_text(&key))
            }
            "build-server-full" | "build-client-full" => {
                let name = arg(1)?;
                self.issue(&pki, &name)
            }
            "revoke" => {
                let name = arg(1)?;
                revoke(&pki, &name)
            }
            "gen-crl" => write(
                &pki.join("crl.pem"),
                "-----BEGIN X509 CRL-----\nMA==\n-----END X509 CRL-----\n",
            ),
            other => Err(format!("unknown command '{other}'")),
        }
    }

    fn issue(&self, pki: &Path, name: &str) -> std::result::Result<(), String> {
        let cert_path = pki.join("issued").join(format!("{name}.crt"));
        if cert_path.exists() {
            return Err(format!("Request file already exists for {name}"));
        }
        let ca_cert = X509::from_pem(&fs::read(pki.join("ca.crt")).map_err(|e| e.to_string())?)
            .map_err(|e| e.to_string())?;
        let ca_key =
            PKey::private_key_from_pem(&fs::read(pki.join("private/ca.key")).map_err(|e| e.to_string())?)
                .map_err(|e| e.to_string())?;

        let serial_path = pki.join("serial");
        let serial_text = fs::read_to_string(&serial_path).map_err(|e| e.to_string())?;
        let serial = u32::from_str_radix(serial_text.trim(), 16).map_err(|e| e.to_string())?;
        write(&serial_path, &format!("{:02X}\n", serial + 1))?;

        let key = ec_key();
        let cert = certificate(name, serial, &key, Some((&ca_cert, &ca_key)));
        let stored_key = if self.mismatched_keys.get() { ec_key() } else { key };

        let preamble = format!(
            "Certificate:\n    Data:\n        Version: 3 (0x2)\n        Serial Number: {serial}\n        Subject: CN={name}\n"
        );
        write(&cert_path, &format!("{preamble}{}", pem_text(&cert)))?;
        write(&pki.join("private").join(format!("{name}.key")), &key_text(&stored_key))?;

        let mut index = fs::read_to_string(pki.join("index.txt")).map_err(|e| e.to_string())?;
        index.push_str(&format!("V\t{EXPIRY}\t\t{serial:02X}\tunknown\t/CN={name}\n"));
        write(&pki.join("index.txt"), &index)
    }

    fn genkey(&self, inv: &Invocation) -> std::result::Result<(), String> {
        match inv.args.as_slice() {
            [flag, kind, path] if flag == "--genkey" && kind == "secret" => {
                let mut bytes = [0u8; 256];
                openssl::rand::rand_bytes(&mut bytes).map_err(|e| e.to_string())?;
                let body: Vec<String> = bytes
                    .chunks(16)
                    .map(|c| c.iter().map(|b| format!("{b:02x}")).collect())
                    .collect();
                let text = format!(
                    "#\n# 2048 bit OpenVPN static key\n#\n-----BEGIN OpenVPN Static key V1-----\n{}\n-----END OpenVPN Static key V1-----\n",
                    body.join("\n")
                );
                write(Path::new(path), &text)
            }
            _ => Err(format!("unsupported arguments {:?}", inv.args)),
        }
    }
}

impl ProcessRunner for FakeToolchain {
    fn invoke(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.calls.borrow_mut().push(invocation.clone());

        let subcommand = invocation.args.first().cloned().unwrap_or_default();
        if self.fail_on.borrow().as_deref() == Some(subcommand.as_str()) {
            return Ok(failure(format!("Easy-RSA error:\n\nsimulated failure of {subcommand}")));
        }

        let outcome = match invocation.program.as_str() {
            "easyrsa" => self.easyrsa(invocation),
            "openvpn" => self.genkey(invocation),
            other => {
                return Err(VpnKitError::ToolSpawn {
                    command: other.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
        };
        Ok(match outcome {
            Ok(()) => ProcessOutput {
                code: Some(0),
                stdout: "Notice\n------\ndone\n".to_string(),
                stderr: String::new(),
            },
            Err(message) => failure(message),
        })
    }
}

fn failure(stderr: String) -> ProcessOutput {
    ProcessOutput {
        code: Some(1),
        stdout: String::new(),
        stderr,
    }
}

fn revoke(pki: &Path, name: &str) -> std::result::Result<(), String> {
    let index_path = pki.join("index.txt");
    let index = fs::read_to_string(&index_path).map_err(|e| e.to_string())?;
    let subject = format!("/CN={name}");

    let mut serial = None;
    let lines: Vec<String> = index
        .lines()
        .map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields[0] == "V" && fields[5] == subject {
                serial = Some(fields[3].to_string());
                format!("R\t{}\t{REVOKED_AT},superseded\t{}\t{}\t{}", fields[1], fields[3], fields[4], fields[5])
            } else {
                line.to_string()
            }
        })
        .collect();
    let serial = serial.ok_or(format!("Unable to revoke as no certificate was found for {name}"))?;
    write(&index_path, &(lines.join("\n") + "\n"))?;

    fs::rename(
        pki.join("issued").join(format!("{name}.crt")),
        pki.join("revoked/certs_by_serial").join(format!("{serial}.crt")),
    )
    .map_err(|e| e.to_string())
}

fn write(path: &Path, contents: &str) -> std::result::Result<(), String> {
    fs::write(path, contents).map_err(|e| format!("{}: {e}", path.display()))
}

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// Builds a certificate for `cn`, self-signed when `issuer` is `None`.
pub fn certificate(
    cn: &str,
    serial: u32,
    key: &PKey<Private>,
    issuer: Option<(&X509, &PKey<Private>)>,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(825).unwrap())
        .unwrap();

    match issuer {
        Some((ca_cert, ca_key)) => {
            builder.set_issuer_name(ca_cert.subject_name()).unwrap();
            builder.sign(ca_key, MessageDigest::sha256()).unwrap();
        }
        None => {
            builder
                .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                .unwrap();
            builder.set_issuer_name(&name).unwrap();
            builder.sign(key, MessageDigest::sha256()).unwrap();
        }
    }
    builder.build()
}

pub fn pem_text(cert: &X509) -> String {
    String::from_utf8(cert.to_pem().unwrap()).unwrap()
}

pub fn key_text(key: &PKey<Private>) -> String {
    String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap()
}

/// Isolated directories plus settings pointing at them.
pub struct Sandbox {
    pub dir: TempDir,
    pub layout: Layout,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("openvpn"), dir.path().join("clients"));
        Self { dir, layout }
    }

    /// Settings as if `VPN_SERVER_IP`/`VPN_PORT` were exported.
    pub fn settings(&self, address: Option<&str>, port: Option<u16>) -> Settings {
        Settings::builder()
            .maybe_address(address.map(str::to_string))
            .maybe_port(port)
            .layout(self.layout.clone())
            .build()
    }

    pub fn provisioner<'a>(
        &self,
        tools: &'a FakeToolchain,
        address: Option<&str>,
        port: Option<u16>,
    ) -> Provisioner<&'a FakeToolchain> {
        Provisioner::new(self.settings(address, port), tools)
    }

    /// A sandbox where `setup` already ran against `203.0.113.10:1194`.
    pub fn initialized(tools: &FakeToolchain) -> Self {
        let sandbox = Self::new();
        sandbox
            .provisioner(tools, Some("203.0.113.10"), None)
            .setup()
            .unwrap();
        tools.calls.borrow_mut().clear();
        sandbox
    }
}

//! vpn - OpenVPN server management

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use vpnkit::error::VpnKitError;
use vpnkit::process::SystemRunner;
use vpnkit::settings::Settings;
use vpnkit::workflow::{ClientEntry, ClientStatus, Provisioner};

const ENV_HELP: &str = "\
Environment variables:
  VPN_SERVER_IP     Public server IP (required for setup)
  VPN_PORT          External port (default 1194)
  VPN_DNS           DNS servers pushed to clients (default 1.1.1.1,1.0.0.1)
  VPN_OVPN_DIR      OpenVPN config directory (default /etc/openvpn)
  VPN_CLIENTS_DIR   Client bundle directory (default /clients)";

#[derive(Parser)]
#[command(name = "vpn")]
#[command(about = "OpenVPN server management", long_about = None)]
#[command(arg_required_else_help = true, after_help = ENV_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize server (one time)
    Setup,

    /// Create client and export <name>.ovpn
    Create {
        /// Client name
        name: String,
    },

    /// Revoke client
    Revoke {
        /// Client name
        name: String,
    },

    /// List clients
    List,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), VpnKitError> {
    let provisioner = Provisioner::new(Settings::from_env()?, SystemRunner);

    match command {
        Commands::Setup => {
            let settings = provisioner.settings();
            if let (Ok(endpoint), false) =
                (settings.setup_endpoint(), provisioner.is_initialized())
            {
                println!();
                println!("╔══════════════════════════════════════╗");
                println!("║  OpenVPN Setup                       ║");
                println!("║  IP:   {:<30}║", endpoint.address);
                println!("║  Port: {:<30}║", format!("{}/udp", endpoint.port));
                println!("╚══════════════════════════════════════╝");
                println!();
            }

            let report = provisioner.setup()?;
            println!();
            println!("{}", "✅ Server initialized!".green().bold());
            println!("   Endpoint:       {}", report.endpoint);
            println!("   Server config:  {}", report.server_config.display());
            println!("   CA fingerprint: {}", report.ca_fingerprint);
            println!();
            println!("   Next: vpn create <name>");
            println!();
        }

        Commands::Create { name } => {
            let created = provisioner.create(&name)?;
            println!();
            println!("{}", format!("✅ {}", created.path.display()).green().bold());
            println!("   Connects to {}.", created.endpoint);
            println!("   Copy to device → import into OpenVPN Connect.");
            println!(
                "   {}",
                "File contains all keys — store like a password!".yellow()
            );
            println!();
        }

        Commands::Revoke { name } => {
            let report = provisioner.revoke(&name)?;
            println!();
            println!(
                "{}",
                format!("✅ Client {} revoked. Its .ovpn no longer works.", report.name)
                    .green()
                    .bold()
            );
            if report.bundle_removed {
                println!("   Exported bundle deleted.");
            }
            println!();
        }

        Commands::List => {
            let clients = provisioner.list()?;
            println!("Clients:");
            if clients.is_empty() {
                println!("  (empty — create client: vpn create <name>)");
            }
            for client in &clients {
                println!("{}", list_row(client));
            }
            println!();
        }
    }

    Ok(())
}

/// Certificate state and bundle state of one client, side by side.
fn list_row(client: &ClientEntry) -> String {
    let state = match client.status {
        ClientStatus::Valid => "● valid".green(),
        ClientStatus::Revoked => "⊘ revoked".red(),
        ClientStatus::Expired => "⌛ expired".yellow(),
    };
    let bundle = match (&client.bundle, client.status) {
        (Some(path), ClientStatus::Valid) => format!("✓ {}", path.display()).green(),
        (Some(path), _) => format!("✓ {} (no longer works)", path.display()).normal(),
        (None, ClientStatus::Valid) => "✗ ovpn not exported".normal(),
        (None, _) => "✗ no ovpn".normal(),
    };
    format!("  • {:<20} {:<10} {}", client.name, state, bundle)
}

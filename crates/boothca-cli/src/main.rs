//! BoothCA CLI - bootstrap the fleet CA and issue device certificates.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use boothca_core::{AnchorRegistration, DeviceIdentity};
use boothca_pki::{AuthorityManager, AuthorityStatus, Config, IssuanceEngine, Ledger, ProvisionError};

/// BoothCA - device certificate provisioning
#[derive(Parser)]
#[command(name = "boothca")]
#[command(about = "Bootstrap the booth fleet CA and issue device certificates", long_about = None)]
struct Cli {
    /// Directory holding the CA certificate, key and passphrase
    #[arg(long, default_value = "certs/authority")]
    authority_dir: PathBuf,

    /// Directory receiving device keys and certificates
    #[arg(long, default_value = "certs/devices")]
    device_dir: PathBuf,

    /// Registration ledger (JSON lines)
    #[arg(long, default_value = "certs/ledger.jsonl")]
    ledger: PathBuf,

    /// DNS suffix for the asset tag claim
    #[arg(long, default_value = "booth.internal")]
    dns_suffix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the CA if it does not exist yet
    Init,

    /// Show CA fingerprint and validity
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the CA certificate (PEM)
    #[command(name = "ca-cert")]
    CaCert,

    /// Issue a certificate for one device
    Issue {
        /// Operator-assigned booth label, e.g. PB-005
        #[arg(long)]
        asset_tag: String,

        /// Hub (site) identifier
        #[arg(long)]
        hub_id: String,

        /// Equipment id assigned by the inventory store
        #[arg(long)]
        equipment_id: String,

        /// Replace an existing certificate for this asset tag
        #[arg(long)]
        force: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boothca=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ProvisionError>() {
                Some(provision) => {
                    error!(kind = %provision.kind(), error = %provision, "Provisioning failed");
                    eprintln!("error [{}]: {}", provision.kind(), provision);
                }
                None => eprintln!("error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = Config {
        authority_dir: cli.authority_dir,
        device_dir: cli.device_dir,
        dns_suffix: cli.dns_suffix,
        replace_existing_devices: matches!(cli.command, Commands::Issue { force: true, .. }),
        ..Config::default()
    };
    let authority = Arc::new(AuthorityManager::new(&config));
    let ledger = Ledger::open(cli.ledger);

    match cli.command {
        Commands::Init => {
            let status = ensure_authority(&authority, &ledger).await?;
            if status.is_new {
                println!("Certificate authority created:");
            } else {
                println!("Certificate authority already exists:");
            }
            println!("  Path:        {}", authority.certificate_path().display());
            print_info(&authority).await?;
        }
        Commands::Info { json } => {
            let info = blocking({
                let authority = authority.clone();
                move || authority.authority_info()
            })
            .await?;

            if json {
                let value = json!({
                    "fingerprint": info.fingerprint,
                    "notBefore": info.not_before.to_rfc3339(),
                    "notAfter": info.not_after.to_rfc3339(),
                    "subject": info.subject,
                    "serial": info.serial,
                    "certificatePath": authority.certificate_path(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_info(&authority).await?;
            }
        }
        Commands::CaCert => {
            let pem = blocking({
                let authority = authority.clone();
                move || authority.read_certificate()
            })
            .await?;
            print!("{}", pem);
        }
        Commands::Issue {
            asset_tag,
            hub_id,
            equipment_id,
            json,
            ..
        } => {
            let identity = DeviceIdentity::parse(&asset_tag, &hub_id, &equipment_id)
                .map_err(ProvisionError::from)?;

            ensure_authority(&authority, &ledger).await?;

            let engine = IssuanceEngine::new(&config, authority.clone());
            let issued = blocking({
                let identity = identity.clone();
                move || engine.issue_device_certificate(&identity)
            })
            .await?;

            ledger.record_device(&issued.registration(&identity))?;

            if json {
                let value = json!({
                    "deviceId": issued.device_id,
                    "equipmentId": issued.equipment_id,
                    "assetTag": identity.asset_tag,
                    "hubId": identity.hub_id,
                    "fingerprint": issued.fingerprint,
                    "serial": issued.serial,
                    "notAfter": issued.not_after.to_rfc3339(),
                    "certificatePath": issued.certificate_path,
                    "privateKeyPath": issued.private_key_path,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Device certificate issued:");
                println!("  Device ID:   {}", issued.device_id);
                println!("  Equipment:   {}", issued.equipment_id);
                println!("  Fingerprint: {}", issued.fingerprint);
                println!("  Expires:     {}", format_time(issued.not_after));
                println!("  Certificate: {}", issued.certificate_path.display());
                println!("  Private key: {}", issued.private_key_path.display());
            }
        }
    }

    Ok(())
}

/// Ensure the CA exists and is registered as a trust anchor.
async fn ensure_authority(
    authority: &Arc<AuthorityManager>,
    ledger: &Ledger,
) -> Result<AuthorityStatus, Box<dyn Error>> {
    let (status, record) = blocking({
        let authority = authority.clone();
        move || Ok((authority.ensure_authority()?, authority.trust_anchor_record()?))
    })
    .await?;

    match ledger.register_trust_anchor(&record)? {
        AnchorRegistration::Created => {
            info!(fingerprint = %record.fingerprint, "CA registered as trust anchor")
        }
        AnchorRegistration::AlreadyPresent => {
            info!(fingerprint = %record.fingerprint, "CA already registered")
        }
    }

    Ok(status)
}

async fn print_info(authority: &Arc<AuthorityManager>) -> Result<(), Box<dyn Error>> {
    let info = blocking({
        let authority = authority.clone();
        move || authority.authority_info()
    })
    .await?;

    println!("  Subject:     {}", info.subject);
    println!("  Fingerprint: {}", info.fingerprint);
    println!("  Not before:  {}", format_time(info.not_before));
    println!("  Not after:   {}", format_time(info.not_after));
    Ok(())
}

/// Run PKI work on the blocking pool; RSA key generation can take seconds.
async fn blocking<T, F>(f: F) -> Result<T, Box<dyn Error>>
where
    F: FnOnce() -> Result<T, ProvisionError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

fn format_time(t: chrono::DateTime<chrono::Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

//! Certchain node CLI
//!
//! Serves the ledger webhook and runs reconciliation sweeps for the tenants
//! listed in the configuration file.

use anyhow::Context;
use certchain_confirmation::ReconciliationReport;
use certchain_production::config::MASTER_KEY_ENV;
use certchain_production::telemetry::init_tracing;
use certchain_production::{Node, NodeConfig};
use certchain_tenancy::DescriptorCipher;
use certchain_types::{ConnectionDescriptor, TenantId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "certchain-node")]
#[command(about = "Ledger-backed credential issuance node")]
#[command(version)]
struct Cli {
    /// Path to the node configuration
    #[arg(short, long, default_value = "certchain.toml", global = true)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset (defaults to server.log_level)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the webhook endpoint and run the periodic sweep
    Serve,

    /// Run one reconciliation sweep and print the report
    Reconcile {
        /// Sweep only this tenant
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Encrypt a connection descriptor for the tenant directory
    EncryptDescriptor {
        descriptor: String,

        /// Hex master key (falls back to CERTCHAIN_MASTER_KEY)
        #[arg(long)]
        master_key: Option<String>,
    },

    /// Print a fresh hex master key
    GenerateKey,
}

fn load(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let config = NodeConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.server.log_level.clone());
    init_tracing(&filter)?;
    Ok(config)
}

fn print_report(report: &ReconciliationReport) {
    println!(
        "{}: examined {}, confirmed {}, already confirmed {}, unresolved {}, errors {}",
        report.tenant_id,
        report.examined,
        report.confirmed.len(),
        report.already_confirmed,
        report.unresolved.len(),
        report.errors.len(),
    );
    for item in report.unresolved.iter().chain(&report.errors) {
        println!("  {} ({}): {}", item.certificate_number, item.certificate_id, item.reason);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve => {
            let config = load(&cli)?;
            let bind = config.server.bind;
            let node = Node::build(config)?;
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            node.serve(listener, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }

        Commands::Reconcile { tenant } => {
            let config = load(&cli)?;
            let node = Node::build(config)?;
            let driver = node.sweep_driver();
            let reports = match tenant {
                Some(tenant) => vec![driver.reconcile_tenant(&TenantId::new(tenant.as_str())).await?],
                None => driver.run_once().await,
            };
            for report in &reports {
                print_report(report);
            }
            node.registry().shutdown().await;
            if reports.iter().any(|r| !r.is_clean()) {
                std::process::exit(2);
            }
        }

        Commands::EncryptDescriptor {
            descriptor,
            master_key,
        } => {
            // No tracing here, output goes to stdout
            let key = master_key
                .clone()
                .or_else(|| std::env::var(MASTER_KEY_ENV).ok())
                .with_context(|| format!("--master-key or {MASTER_KEY_ENV} is required"))?;
            let cipher = DescriptorCipher::from_hex(&key)?;
            let sealed = cipher.encrypt(&ConnectionDescriptor::new(descriptor.as_str()))?;
            println!("{}", sealed.expose());
        }

        Commands::GenerateKey => {
            println!("{}", DescriptorCipher::generate_key_hex());
        }
    }

    Ok(())
}

//! bLUSD bond engine CLI
//!
//! Command-line interface for the accrual/valuation engine and a demo bond
//! session against the in-memory chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::{style, Term};

use blusd::chain::memory::InMemoryChain;
use blusd::core::bond::{Bond, BondListing, BondRawRecord};
use blusd::core::config::SessionConfig;
use blusd::core::protocol::{ProtocolInfo, ProtocolRawState, VaultApys};
use blusd::core::token::{AccountId, Balances};
use blusd::engine::{
    bond_from_record, break_even_period_days, build_protocol_info, rebond_period_days,
    simulate_protocol_info,
};
use blusd::session::BondSession;
use blusd::sync::SyncOutcome;
use blusd::utils::math::Decimal;
use blusd::view::transitions::{BondEvent, ConfirmPayload};

/// bLUSD CLI - Chicken Bonds accrual and valuation
#[derive(Parser)]
#[command(name = "blusd")]
#[command(version = blusd::VERSION)]
#[command(about = "Command-line interface for the bLUSD bond engine", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Break-even and rebond periods
    Periods {
        /// Accrual parameter in days
        #[arg(long)]
        alpha: Decimal,
        /// Market price premium over the floor price
        #[arg(long)]
        premium: Decimal,
        /// Claim fee fraction
        #[arg(long, default_value = "0")]
        fee: Decimal,
    },

    /// Derive protocol economics from a raw snapshot
    Protocol {
        /// Raw protocol snapshot (JSON)
        #[arg(long)]
        snapshot: PathBuf,
        /// bLUSD market price in LUSD
        #[arg(long)]
        market_price: Decimal,
        /// What-if market price
        #[arg(long)]
        simulated_price: Option<Decimal>,
        /// Vault APYs (JSON)
        #[arg(long)]
        apys: Option<PathBuf>,
    },

    /// Derive a bond's figures
    Bond {
        /// Raw protocol snapshot (JSON)
        #[arg(long)]
        snapshot: PathBuf,
        /// Raw bond record (JSON)
        #[arg(long)]
        record: PathBuf,
        /// bLUSD market price in LUSD
        #[arg(long)]
        market_price: Decimal,
    },

    /// Run a create/claim cycle against the in-memory chain
    Demo {
        /// LUSD deposited into the bond
        #[arg(long, default_value = "1000")]
        deposit: Decimal,
        /// Days the bond accrues before it is claimed
        #[arg(long, default_value_t = 30)]
        days: u64,
        /// Session configuration (JSON)
        #[arg(short, long, env = "BLUSD_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let term = Term::stdout();

    if let Err(e) = run_command(&cli, &term) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Periods { alpha, premium, fee } => cmd_periods(cli, *alpha, *premium, *fee, term),
        Commands::Protocol {
            snapshot,
            market_price,
            simulated_price,
            apys,
        } => cmd_protocol(cli, snapshot, *market_price, *simulated_price, apys.as_deref(), term),
        Commands::Bond {
            snapshot,
            record,
            market_price,
        } => cmd_bond(cli, snapshot, record, *market_price, term),
        Commands::Demo { deposit, days, config } => {
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime.block_on(cmd_demo(*deposit, *days, config.as_deref(), term))
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(term: &Term, value: &T) -> anyhow::Result<()> {
    term.write_line(&serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn line(term: &Term, label: &str, value: impl std::fmt::Display) {
    let _ = term.write_line(&format!("  {:<24} {}", style(label).dim(), value));
}

fn optional(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".into())
}

fn cmd_periods(cli: &Cli, alpha: Decimal, premium: Decimal, fee: Decimal, term: &Term) -> anyhow::Result<()> {
    let break_even = break_even_period_days(alpha, premium, fee)?;
    let rebond = rebond_period_days(alpha, premium, fee)?;

    if cli.json {
        return print_json(
            term,
            &serde_json::json!({ "break_even": break_even, "rebond": rebond }),
        );
    }

    let _ = term.write_line(&format!("{} Bond periods", style("→").cyan()));
    line(term, "Break-even", style(break_even).yellow());
    line(term, "Rebond", style(rebond).yellow());
    Ok(())
}

fn cmd_protocol(
    cli: &Cli,
    snapshot: &Path,
    market_price: Decimal,
    simulated_price: Option<Decimal>,
    apys: Option<&Path>,
    term: &Term,
) -> anyhow::Result<()> {
    let raw: ProtocolRawState = read_json(snapshot)?;
    let apys: Option<VaultApys> = apys.map(read_json::<VaultApys>).transpose()?;

    let live = build_protocol_info(&raw, market_price, apys.as_ref())?;
    let info = match simulated_price {
        Some(price) => simulate_protocol_info(&live, price)?,
        None => live,
    };

    if cli.json {
        return print_json(term, &info);
    }
    print_protocol(term, &info);
    Ok(())
}

fn print_protocol(term: &Term, info: &ProtocolInfo) {
    let _ = term.write_line(&format!("{} Protocol", style("→").cyan()));
    if info.is_bootstrap() {
        let _ = term.write_line(&format!("  {}", style("Bootstrap: no bLUSD minted yet").yellow()));
    }
    line(term, "bLUSD supply", info.bond_token_supply);
    line(term, "Market price", info.market_price);
    line(term, "Simulated price", info.simulated_market_price);
    line(term, "Floor price", info.floor_price);
    line(term, "Fair price", format!("{} .. {}", info.fair_price.lower, info.fair_price.upper));
    line(term, "Premium", info.market_price_premium);
    line(term, "Break-even", info.break_even_period_in_days);
    line(term, "Rebond", info.rebond_period_in_days);
    line(term, "Average bond age", format!("{} days", info.average_bond_age));
    line(term, "bLUSD APR", optional(info.bond_token_apr));
}

fn cmd_bond(cli: &Cli, snapshot: &Path, record: &Path, market_price: Decimal, term: &Term) -> anyhow::Result<()> {
    let raw: ProtocolRawState = read_json(snapshot)?;
    let record: BondRawRecord = read_json(record)?;

    let info = build_protocol_info(&raw, market_price, None)?;
    let bond = bond_from_record(&record, &info, raw.timestamp)?;

    if cli.json {
        return print_json(term, &bond);
    }
    print_bond(term, &bond);
    Ok(())
}

fn print_bond(term: &Term, bond: &Bond) {
    let _ = term.write_line(&format!(
        "{} Bond {} ({:?})",
        style("→").cyan(),
        style(&bond.id).yellow(),
        bond.status
    ));
    line(term, "Deposit", bond.deposit);
    line(term, "Accrued", bond.accrued);
    line(term, "Age", format!("{} days", bond.bond_age_in_days));
    line(term, "Market value", bond.market_value);
    line(term, "Claim now return", bond.claim_now_return);
    line(term, "Rebond return", optional(bond.rebond_return));
    line(term, "Rebond ROI", optional(bond.rebond_roi));
    line(term, "Rebond APR", optional(bond.rebond_apr));
    line(term, "Until break-even", bond.remaining_break_even_days);
    line(term, "Until rebond", bond.remaining_rebond_days);
}

/// Refresh, waiting out a refresh the background service already started
async fn refresh(session: &BondSession) -> anyhow::Result<()> {
    while session.synchronize().await? == SyncOutcome::Coalesced {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    Ok(())
}

async fn cmd_demo(deposit: Decimal, days: u64, config: Option<&Path>, term: &Term) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::new(AccountId::from("0x00000000000000000000000000000000000000d1")),
    };

    let chain = Arc::new(InMemoryChain::new(config.account.clone()).with_balances(Balances {
        lusd: deposit,
        ..Default::default()
    }));
    let session = BondSession::start(chain.clone(), config).await?;

    let _ = term.write_line(&format!("{} Creating a {} LUSD bond", style("→").cyan(), deposit));
    session.dispatch(BondEvent::CreateBondPressed).await?;
    session.dispatch(BondEvent::ApprovePressed { key: None }).await?;
    session
        .dispatch(BondEvent::ConfirmPressed(ConfirmPayload::CreateBond { deposit }))
        .await?;
    refresh(&session).await?;

    let Some(BondListing::Confirmed(bond)) = session.snapshot().await.visible_bonds().into_iter().next() else {
        anyhow::bail!("created bond missing from the refreshed snapshot");
    };
    let _ = term.write_line(&format!("{} Bond {} created", style("✓").green(), style(&bond.id).yellow()));

    chain.advance_time(days * 86_400).await;
    refresh(&session).await?;
    let snapshot = session.snapshot().await;
    if let Some(bond) = snapshot.bonds.iter().find(|b| b.id == bond.id) {
        let _ = term.write_line(&format!("{} After {} days", style("ℹ").blue(), days));
        print_bond(term, bond);
    }

    session.dispatch(BondEvent::ClaimPressed { bond_id: bond.id.clone() }).await?;
    session
        .dispatch(BondEvent::ConfirmPressed(ConfirmPayload::ClaimBond))
        .await?;
    refresh(&session).await?;

    let snapshot = session.snapshot().await;
    if let Some(balances) = snapshot.balances {
        let _ = term.write_line(&format!(
            "{} Claimed, bLUSD balance {}",
            style("✓").green(),
            style(balances.blusd).yellow()
        ));
    }
    if let Some(info) = &snapshot.protocol_info {
        print_protocol(term, info);
    }

    session.shutdown().await;
    Ok(())
}

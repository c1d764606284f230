#![forbid(unsafe_code)]
//! Command-line front end for a HabitStake wallet ledger

use clap::{Parser, Subcommand};
use colored::*;
use habitstake::amount::{format_amount, from_f64, parse_amount};
use habitstake::cli::{balance_table, history_table, init_tracing, load_service_from_config};
use habitstake::config::Config;
use habitstake::error::LedgerError;
use habitstake::mission::MissionCatalog;
use habitstake::relay::{connect_with_failover, ReserveConnector};
use habitstake::service::LedgerService;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Wallet key the ledger is stored under
    #[arg(long, global = true)]
    wallet: Option<String>,
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shows all balances
    Show,
    /// Lists recent ledger entries
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Moves whole tokens from liquid into the voluntary stake
    Stake {
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Returns part of the voluntary stake to liquid
    Unstake {
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Returns the whole voluntary stake to liquid
    WithdrawVoluntary,
    /// Returns the locked stake to liquid once the lock has expired
    WithdrawObligatory,
    /// Lists today's missions
    Missions,
    /// Completes a mission and credits its reward
    Complete { id: String },
    /// Accrues yield for the minutes elapsed since the last accrual
    CatchUp,
    /// Sends liquid tokens to an external address
    Withdraw {
        destination: String,
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Keeps the ledger open and accrues yield every period until Ctrl+C
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let (config, service) = load_service_from_config(&cli.config, cli.wallet.as_deref())?;

    match run_command(cli.command, &config, service).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_user_facing() => {
            eprintln!("{} {}", "✗".red().bold(), e.to_string().red());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_command(
    command: Commands,
    config: &Config,
    service: LedgerService,
) -> Result<(), LedgerError> {
    match command {
        Commands::Show => show(&service).await,
        Commands::History { limit } => {
            let state = service.snapshot().await;
            if state.transactions.is_empty() {
                println!("{}", "No ledger entries yet.".yellow());
            } else {
                println!("{}", history_table(&state.transactions, limit));
            }
        }
        Commands::Stake { amount } => {
            let amount = parse_amount(&amount)?;
            service.stake_voluntary(amount).await?;
            println!("{}", format!("✓ Staked {} tokens", format_amount(amount, 0)).green());
            show(&service).await;
        }
        Commands::Unstake { amount } => {
            let amount = parse_amount(&amount)?;
            let credited = service.unstake_voluntary_partial(amount).await?;
            println!("{}", format!("✓ Unstaked {} tokens", format_amount(credited, 4)).green());
            show(&service).await;
        }
        Commands::WithdrawVoluntary => {
            let credited = service.withdraw_max_voluntary().await?;
            println!("{}", format!("✓ Returned {} tokens to liquid", format_amount(credited, 4)).green());
        }
        Commands::WithdrawObligatory => {
            let credited = service.withdraw_max_obligatory().await?;
            println!("{}", format!("✓ Unlocked {} tokens", format_amount(credited, 4)).green());
        }
        Commands::Missions => {
            let catalog = MissionCatalog::load(&config.missions.catalog_path)?;
            let completed = service.completed_today()?;
            if catalog.is_empty() {
                println!("{}", "No missions configured.".yellow());
                return Ok(());
            }
            println!(
                "{}",
                format!("{}/{} missions done today", completed.len(), catalog.len()).bright_cyan()
            );
            for mission in catalog.available(&completed) {
                println!(
                    "{} {} {} {}",
                    "•".bright_cyan(),
                    mission.id.bright_white().bold(),
                    mission.title,
                    format!("+{}", format_amount(mission.reward, 0)).bright_yellow()
                );
            }
            if completed.is_empty() {
                println!("{}", "Nothing completed yet today.".dimmed());
            }
        }
        Commands::Complete { id } => {
            let catalog = MissionCatalog::load(&config.missions.catalog_path)?;
            let split = service.complete_mission(&catalog, &id).await?;
            println!(
                "{}",
                format!(
                    "✓ Mission complete: +{} liquid, +{} locked, +{} spending",
                    format_amount(split.liquid, 2),
                    format_amount(split.obligatory, 2),
                    format_amount(split.spending, 2)
                )
                .green()
            );
        }
        Commands::CatchUp => {
            let outcome = service.catch_up().await;
            println!(
                "Accrued {} locked / {} voluntary",
                format_amount(outcome.obligatory, 6),
                format_amount(outcome.voluntary, 6)
            );
        }
        Commands::Withdraw { destination, amount } => {
            let amount = parse_amount(&amount)?;
            let relay = &config.relay;
            let connector = ReserveConnector::new(from_f64(relay.reserve)?);
            let backend = connect_with_failover(
                &connector,
                &relay.endpoints,
                relay.connect_attempts,
                Duration::from_millis(relay.connect_backoff_ms),
            )
            .await
            .map_err(|e| LedgerError::TransferFailed(e.to_string()))?;
            let signature = service
                .withdraw_external(backend.as_ref(), &destination, amount)
                .await?;
            println!("{}", format!("✓ Sent {} tokens", format_amount(amount, 0)).green());
            println!("  Signature: {}", signature.bright_white());
        }
        Commands::Run => {
            let service = Arc::new(service);
            let period = Duration::from_secs(config.ledger.accrual_period_secs);
            let handle = service.spawn_accrual(period);
            println!(
                "{}",
                format!("Accruing every {}s for '{}'. Press Ctrl+C to stop.", period.as_secs(), service.wallet_key())
                    .bright_cyan()
            );
            tokio::signal::ctrl_c().await?;
            handle.stop();
            service.flush().await;
            show(&service).await;
        }
    }
    Ok(())
}

async fn show(service: &LedgerService) {
    let state = service.snapshot().await;
    println!("{}", balance_table(&state));
    println!(
        "{} {}",
        "Total value:".bright_white().bold(),
        format_amount(service.total_value().await, 4).bright_green()
    );
    if let Some(end) = state.lock_end {
        println!("{} {}", "Locked until:".yellow(), end.format("%Y-%m-%d %H:%M UTC"));
    }
}

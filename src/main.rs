use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vision_pay::app_state::AppState;
use vision_pay::config::PayConfig;
use vision_pay::flow::FlowState;
use vision_pay::{metrics, OptionsProvider, PaymentPurpose, PaymentRequest};

#[derive(Parser, Debug)]
#[command(name = "vision-pay", version, about = "Vision crypto payment helper")]
struct Cli {
    /// Config file (TOML); defaults to VISION_PAY_CONFIG or the user config dir
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fetch live USD prices before running the command
    #[arg(long, global = true)]
    live_prices: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List payment options with balances and network fees
    Options,

    /// Price a USD amount in one asset
    Quote {
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        asset: String,
    },

    /// Run a payment through the full select/confirm/process flow
    Pay {
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        asset: String,
        /// marketplace, freelance, tip, subscription, reward or p2p
        #[arg(long, default_value = "marketplace")]
        purpose: String,
        /// Wallet PIN
        #[arg(long, env = "VISION_PAY_PIN", hide_env_values = true)]
        pin: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Show recorded payments, newest first
    History {
        #[arg(long)]
        purpose: Option<String>,
    },

    /// Show cached exchange rates
    Prices {
        /// Keep refreshing live prices every `oracle.refresh_secs` until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Print Prometheus metrics
    Metrics,
}

fn parse_purpose(raw: &str) -> Result<PaymentPurpose> {
    PaymentPurpose::from_str(raw).ok_or_else(|| anyhow!("unknown purpose: {}", raw))
}

fn print_prices(state: &AppState) {
    for p in state.oracle.snapshot() {
        println!(
            "{:<5} ${:<12} {} {}",
            p.symbol,
            p.usd,
            p.observed_at.to_rfc3339(),
            if p.stale { "stale" } else { "fresh" }
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing from env VISION_LOG or RUST_LOG
    let filter = std::env::var("VISION_LOG")
        .unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = PayConfig::load(cli.config.as_deref())?;
    let state = AppState::from_config(&cfg)?;
    info!(wallet = %state.wallet.id(), "Vision pay starting up");

    if cli.live_prices {
        if let Err(e) = state.oracle.refresh(&state.catalog).await {
            tracing::warn!("live price refresh failed, continuing with cached prices: {}", e);
        }
    }

    match cli.cmd {
        Commands::Options => {
            let options = state.options.available_options().await?;
            for o in options {
                println!(
                    "{} {:<5} {:<10} balance={} fee=${} confirm={}",
                    o.icon, o.id, o.name, o.balance, o.network_fee_usd, o.confirmation_time
                );
            }
        }

        Commands::Quote { amount, asset } => {
            let cost = state.calculator.calculate_total_cost(amount, &asset)?;
            let options = state.options.available_options().await?;
            let affordable = options
                .iter()
                .find(|o| o.id.eq_ignore_ascii_case(&asset))
                .map(|o| vision_pay::can_afford(o, &cost))
                .unwrap_or(false);
            println!("{}", serde_json::to_string_pretty(&cost)?);
            println!("affordable: {}", affordable);
        }

        Commands::Pay {
            amount,
            asset,
            purpose,
            pin,
            description,
        } => {
            let mut request = PaymentRequest::new(amount, parse_purpose(&purpose)?)?;
            if let Some(desc) = description {
                request = request.with_description(desc);
            }

            let mut modal = state.modal(request);
            modal.open().await?;
            modal.select(&asset)?;
            if let Some(alert) = modal.alert() {
                println!("⚠️  {}", alert);
            }
            modal.proceed()?;
            modal.enter_pin(&pin)?;
            if !modal.can_submit() {
                return Err(anyhow!("payment cannot be submitted"));
            }

            match modal.submit().await? {
                FlowState::Success { payment } => {
                    println!("✅ Paid {} {}", payment.crypto_amount, payment.crypto_currency);
                    println!("   tx: {}", payment.transaction_hash);
                    println!("   request: {}", payment.request_id);
                }
                FlowState::Error { message } => {
                    println!("❌ {}", message);
                    modal.close()?;
                    return Err(anyhow!("payment failed"));
                }
                other => return Err(anyhow!("unexpected payment state: {:?}", other.step())),
            }
            modal.close()?;
        }

        Commands::History { purpose } => {
            let purpose = purpose.as_deref().map(parse_purpose).transpose()?;
            for e in state.ledger().history(purpose)? {
                println!(
                    "{} {:<12} ${:<10} {} {} {}",
                    e.recorded_at.to_rfc3339(),
                    e.purpose,
                    e.amount_usd,
                    e.payment.crypto_amount,
                    e.payment.crypto_currency,
                    e.payment.transaction_hash
                );
            }
            let totals = state.ledger().totals_by_purpose()?;
            let sum: Decimal = totals.iter().map(|(_, usd)| *usd).sum();
            for (p, usd) in totals {
                println!("total {:<12} ${}", p, usd);
            }
            println!("total all          ${}", sum);
        }

        Commands::Prices { watch: false } => print_prices(&state),

        Commands::Prices { watch: true } => {
            let refresher = state.start_price_refresh(cfg.oracle.refresh_secs);
            let mut ticker =
                tokio::time::interval(Duration::from_secs(cfg.oracle.refresh_secs.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => print_prices(&state),
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            refresher.abort();
            info!("price watch stopped");
        }

        Commands::Metrics => print!("{}", metrics::gather_text()),
    }

    Ok(())
}

mod app;
mod cli;
mod config;

use app::EscrowApp;
use clap::Parser;
use cli::{Cli, Commands};
use config::AppConfig;
use escrow_types::{data_ids, EscrowRequest, RawTxArtifact};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("escrowd: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    init_tracing(&config.logging.level, &config.logging.format);
    info!("Configuration loaded from {}", cli.config);
    info!("  Identity: {}", config.node.identity);
    info!("  Database: {}", config.node.db_path);
    info!("  Marketplace version: {}", config.escrow.marketplace_version);

    let app = EscrowApp::new(config)?;

    match cli.command {
        Some(Commands::Run) | None => app.run().await?,
        Some(Commands::Status { item }) => show_status(&app, item).await?,
        Some(command) => {
            if let Some((request, dry_run)) = command.request() {
                submit(&app, &request, dry_run).await?;
            }
        }
    }

    Ok(())
}

async fn submit(app: &EscrowApp, request: &EscrowRequest, dry_run: bool) -> anyhow::Result<()> {
    info!(
        "Submitting {} for order item {}{}",
        request.action_type(),
        request.order_item_id,
        if dry_run { " (dry run)" } else { "" }
    );

    if dry_run {
        let artifact = app.dry_run(request).await?;
        println!("\nDry run: {}", request.action_type());
        println!("─────────────────────────────────────");
        println!("  Phase:       {}", artifact.phase);
        println!("  Raw tx:      {}", artifact.value);
        return Ok(());
    }

    let outcome = app.execute(request).await?;
    println!("\n{} sent", request.action_type());
    println!("─────────────────────────────────────");
    println!("  Order item:  {}", outcome.order_item.id);
    println!("  Status:      {}", outcome.order_item.status);
    println!("  Raw tx:      {} {}", outcome.rawtx.phase, outcome.rawtx.value);
    println!("  Message ID:  {}", outcome.send.msgid);

    Ok(())
}

async fn show_status(app: &EscrowApp, order_item_id: i64) -> anyhow::Result<()> {
    let item = app.order_item(order_item_id).await?;

    println!("\nOrder Item {}", item.id);
    println!("─────────────────────────────────────");
    println!("  Listing:     {}", item.item_hash);
    println!("  Status:      {}", item.status);
    println!("  Role:        {}", if item.is_seller() { "seller" } else { "buyer" });
    println!("  Buyer:       {}", item.order.buyer);
    println!("  Seller:      {}", item.order.seller);
    match item.escrow() {
        Some(escrow) => println!("  Escrow:      {} (#{})", escrow.escrow_type.as_str(), escrow.id),
        None => println!("  Escrow:      none"),
    }

    if let Some(object) = item.object(data_ids::RAWTX) {
        match RawTxArtifact::parse(&object.data_value) {
            Ok(rawtx) => println!("  Raw tx:      {} {}", rawtx.phase, rawtx.value),
            Err(e) => println!("  Raw tx:      unreadable ({})", e),
        }
    }
    if let Some(object) = item.object(data_ids::ESCROW_ADDRESS) {
        println!("  Multisig:    {}", object.data_value);
    }
    if let Some(object) = item.object(data_ids::ADDRESS) {
        println!("  Payout to:   {}", object.data_value);
    }

    Ok(())
}

fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

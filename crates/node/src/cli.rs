use clap::{Parser, Subcommand};
use escrow_types::EscrowRequest;

#[derive(Parser)]
#[command(name = "escrowd")]
#[command(version, about = "Marketplace escrow daemon: multisig lock, release and refund", long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        env = "ESCROW_CONFIG",
        default_value = "config/default",
        help = "Config file path without the .toml extension"
    )]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the inbox and process escrow messages until Ctrl-C (default mode)
    Run,

    /// Lock the buyer's funds into the escrow multisig
    Lock {
        #[arg(short, long, help = "Order item ID")]
        item: i64,

        #[arg(long, help = "Nonce forwarded to the seller")]
        nonce: Option<String>,

        #[arg(short, long, default_value = "", help = "Memo forwarded to the seller")]
        memo: String,

        #[arg(long, help = "Sign without persisting or broadcasting")]
        dry_run: bool,
    },

    /// Sign the escrow release (seller first, then buyer)
    Release {
        #[arg(short, long, help = "Order item ID")]
        item: i64,

        #[arg(short, long, default_value = "")]
        memo: String,

        #[arg(long, help = "Sign without persisting or broadcasting")]
        dry_run: bool,
    },

    /// Ask the seller for a refund (buyer)
    RequestRefund {
        #[arg(short, long, help = "Order item ID")]
        item: i64,

        #[arg(short, long, default_value = "")]
        memo: String,
    },

    /// Sign the escrow refund (seller first, then buyer), or decline it (seller)
    Refund {
        #[arg(short, long, help = "Order item ID")]
        item: i64,

        #[arg(short, long, default_value = "")]
        memo: String,

        #[arg(
            long,
            conflicts_with = "dry_run",
            help = "Turn the buyer's refund request down without signing"
        )]
        decline: bool,

        #[arg(long, help = "Sign without persisting or broadcasting")]
        dry_run: bool,
    },

    /// Show an order item's status and escrow artifacts
    Status {
        #[arg(short, long, help = "Order item ID")]
        item: i64,
    },
}

impl Commands {
    /// The escrow request for an action command, with its dry-run flag.
    pub fn request(&self) -> Option<(EscrowRequest, bool)> {
        match self {
            Commands::Lock {
                item,
                nonce,
                memo,
                dry_run,
            } => Some((
                EscrowRequest::lock(*item, nonce.clone(), memo.clone()),
                *dry_run,
            )),
            Commands::Release {
                item,
                memo,
                dry_run,
            } => Some((EscrowRequest::release(*item, memo.clone()), *dry_run)),
            Commands::RequestRefund { item, memo } => {
                Some((EscrowRequest::request_refund(*item, memo.clone()), false))
            }
            Commands::Refund {
                item,
                memo,
                decline,
                dry_run,
            } => Some((
                EscrowRequest::refund(*item, !*decline, memo.clone()),
                *dry_run,
            )),
            Commands::Run | Commands::Status { .. } => None,
        }
    }
}

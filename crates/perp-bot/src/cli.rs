//! Command line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

/// Paper trading, market making and RSI strategies on perpetual futures.
#[derive(Parser, Debug)]
#[command(name = "perpbot", version, about, long_about = None)]
pub struct Cli {
    /// Settings file (can also be set via PERPBOT_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Top of book for a symbol
    Price { symbol: String },

    /// Account equity, positions and open orders
    Status { symbol: Option<String> },

    /// Manual orders
    #[command(subcommand)]
    Trade(TradeCommand),

    /// Open positions marked at the mid
    Positions,

    /// Resting orders
    Orders { symbol: Option<String> },

    /// Run market maker and strategy configs
    Run(RunArgs),
}

#[derive(Subcommand, Debug)]
pub enum TradeCommand {
    /// Market buy
    Buy(OrderArgs),
    /// Market sell
    Sell(OrderArgs),
    /// Close a position, fully or partly
    Close {
        symbol: String,
        #[arg(long)]
        size: Option<Decimal>,
    },
    /// Close every position and cancel every resting order
    CloseAll,
}

#[derive(Args, Debug)]
pub struct OrderArgs {
    pub symbol: String,

    /// Notional in USD
    #[arg(long, conflicts_with = "size", required_unless_present = "size")]
    pub usd: Option<Decimal>,

    /// Size in base units
    #[arg(long)]
    pub size: Option<Decimal>,

    /// Worst acceptable fill price
    #[arg(long)]
    pub price: Option<Decimal>,

    /// Leverage to set before the order (defaults to the settings value)
    #[arg(long)]
    pub leverage: Option<u32>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Market maker or strategy JSON configs
    #[arg(required = true)]
    pub configs: Vec<PathBuf>,

    /// Keep running instead of a single cycle
    #[arg(long = "loop")]
    pub looping: bool,

    /// Compute and log but send no orders
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore the strategy timeframe gate on a single run
    #[arg(long)]
    pub force: bool,

    /// Stop looping after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_trade_buy_usd() {
        let cli = Cli::parse_from(["perpbot", "trade", "buy", "ETH", "--usd", "25", "--price", "2100"]);
        match cli.command {
            Command::Trade(TradeCommand::Buy(args)) => {
                assert_eq!(args.symbol, "ETH");
                assert_eq!(args.usd, Some(dec!(25)));
                assert_eq!(args.price, Some(dec!(2100)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_trade_requires_amount() {
        assert!(Cli::try_parse_from(["perpbot", "trade", "sell", "ETH"]).is_err());
        assert!(Cli::try_parse_from([
            "perpbot", "trade", "sell", "ETH", "--usd", "10", "--size", "1"
        ])
        .is_err());
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "perpbot", "run", "mm.json", "rsi.json", "--loop", "--dry-run", "--duration", "60",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.configs.len(), 2);
        assert!(args.looping && args.dry_run && !args.force);
        assert_eq!(args.duration, Some(60));
    }
}

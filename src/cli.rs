//! Local, in-process CLI for interacting with a `MatchingEngine` directly —
//! no HTTP round-trip. Kept alongside the networked adapters (`api`,
//! `market_maker`, `simulate`) as the teacher's original `clap`-based demo
//! tool, generalized from a single hard-coded pair/u64 book to the
//! multi-symbol, decimal-quantity engine.

use clap::{Parser, Subcommand, builder::PossibleValuesParser};
use rust_decimal::Decimal;

use crate::engine::MatchingEngine;
use crate::orders::{Order, OrderType, Side};
use crate::symbol::Symbol;

#[derive(Parser)]
#[command(name = "Order Book CLI")]
#[command(version = "0.1", about = "A local demo of the order book engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a LIMIT order to the book
    Add {
        symbol: String,
        #[arg(value_parser = PossibleValuesParser::new(["buy", "sell"]))]
        side: String,
        price: Decimal,
        quantity: Decimal,
    },
    /// Submit a MARKET order against the book
    Match {
        symbol: String,
        #[arg(value_parser = PossibleValuesParser::new(["buy", "sell"]))]
        side: String,
        quantity: Decimal,
    },
    /// Print the top-of-book depth for a symbol
    Book { symbol: String },
}

fn parse_side(s: &str) -> Side {
    match s {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        _ => unreachable!("clap restricts this to buy|sell"),
    }
}

fn handle_add(engine: &mut MatchingEngine, symbol: String, side: String, price: Decimal, quantity: Decimal) {
    let order = Order::new(
        Symbol::new(symbol),
        OrderType::Limit,
        parse_side(&side),
        quantity,
        Some(price),
        None,
        None,
    );
    match engine.submit(order) {
        Ok(trades) if trades.is_empty() => println!("limit order resting, no trades"),
        Ok(trades) => {
            println!("limit order produced {} trade(s):", trades.len());
            for t in trades {
                println!("  {t:?}");
            }
        }
        Err(e) => println!("order rejected: {e}"),
    }
}

fn handle_match(engine: &mut MatchingEngine, symbol: String, side: String, quantity: Decimal) {
    let order = Order::new(
        Symbol::new(symbol),
        OrderType::Market,
        parse_side(&side),
        quantity,
        None,
        None,
        None,
    );
    match engine.submit(order) {
        Ok(trades) if trades.is_empty() => println!("no trades occurred"),
        Ok(trades) => {
            println!("trades generated:");
            for t in trades {
                println!("  {t:?}");
            }
        }
        Err(e) => println!("order rejected: {e}"),
    }
}

fn print_book(engine: &MatchingEngine, symbol: &str) {
    let view = engine.depth(&Symbol::new(symbol), 10);
    println!("------ {symbol} ------");
    println!("Bids (highest first):");
    for (price, qty) in &view.bids {
        println!("  price={price} qty={qty}");
    }
    println!("Asks (lowest first):");
    for (price, qty) in &view.asks {
        println!("  price={price} qty={qty}");
    }
    println!("----------------------");
}

/// Parses argv and runs one command against a fresh, in-process engine.
pub fn run_cli() {
    let cli = Cli::parse();
    let mut engine = MatchingEngine::default();
    match cli.command {
        Commands::Add {
            symbol,
            side,
            price,
            quantity,
        } => handle_add(&mut engine, symbol, side, price, quantity),
        Commands::Match {
            symbol,
            side,
            quantity,
        } => handle_match(&mut engine, symbol, side, quantity),
        Commands::Book { symbol } => print_book(&engine, &symbol),
    }
}

use std::env;
use std::io::{self, BufRead, IsTerminal};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use spendtag::{Config, Resolver, Transaction};

fn main() -> Result<()> {
    env_logger::init();

    let descriptions = collect_descriptions()?;
    if descriptions.is_empty() {
        eprintln!("usage: spendtag DESCRIPTION [DESCRIPTION ...]");
        eprintln!("       (or pipe one description per line on stdin)");
        return Ok(());
    }

    let config = Config::from_env();
    let resolver = Resolver::from_config(&config);

    let now = now_millis();
    let transactions: Vec<Transaction> = descriptions
        .iter()
        .map(|description| Transaction::new(description, 0.0, now, "USD"))
        .collect();

    for transaction in resolver.resolve(&transactions) {
        let category = transaction.category.unwrap_or_default();
        println!("{}\t{}", category, transaction.description);
    }

    resolver.shutdown();
    Ok(())
}

/// Descriptions come from the argument list, or one per line on stdin when
/// no arguments were given.
fn collect_descriptions() -> Result<Vec<String>> {
    let args: Vec<String> = env::args().skip(1).collect();
    if !args.is_empty() {
        return Ok(args);
    }

    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }

    let mut descriptions = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            descriptions.push(line);
        }
    }
    Ok(descriptions)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

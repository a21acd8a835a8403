use std::env;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use yap_bank::csv::{read_clients, write_balances, write_rates};
use yap_bank::simulation::{RATE_EVERY, Schedule};
use yap_bank::{Bank, BankConfig, LogObserver};

const DEFAULT_ROUNDS: u64 = 30;
const DEFAULT_TICK_MS: u64 = 100;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .expect("usage: yap-bank <clients.csv> [rounds] [tick_ms]");
    let rounds: u64 = args
        .next()
        .map(|r| r.parse().expect("rounds must be a number"))
        .unwrap_or(DEFAULT_ROUNDS);
    let tick_ms: u64 = args
        .next()
        .map(|t| t.parse().expect("tick_ms must be a number"))
        .unwrap_or(DEFAULT_TICK_MS);

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let config = BankConfig::default();
    let cross_rate = config.cross_rate.clone();
    let bank = Bank::with_config(config).expect("failed to open the bank");
    bank.add_observer(LogObserver);

    let mut clients = Vec::new();
    for result in read_clients(&path).expect("failed to read clients") {
        match result {
            Ok((client, balances)) => match bank.add_client(client, balances) {
                Ok(_) => clients.push(client),
                Err(e) => warn!("{e}"),
            },
            Err(e) => {
                warn!("{e}");
            }
        }
    }

    info!(
        clients = clients.len(),
        cashiers = bank.cashier_count(),
        rounds,
        "simulation started"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    for (round, actions) in Schedule::new(clients, cross_rate)
        .take(rounds as usize)
        .enumerate()
    {
        ticker.tick().await;
        for action in actions {
            if let Err(e) = action.apply(&bank) {
                warn!("{e}");
            }
        }
        if (round as u64 + 1) % RATE_EVERY == 0 {
            eprint!("{}", bank.display_balances());
        }
    }

    let report = bank.shutdown().await;
    if report.abandoned > 0 {
        warn!(abandoned = report.abandoned, "some cashiers did not finish in time");
    }

    let snapshot = bank.display_balances();
    write_rates(&snapshot, std::io::stderr().lock()).expect("failed to write rates");
    write_balances(&snapshot, std::io::stdout().lock()).expect("failed to write balances");
}

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::model::{EUR, RAI_STONE, USD};
use crate::{Amount, ClientId, Currency, Snapshot};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: negative opening balance {amount} {currency}")]
    NegativeBalance {
        line: usize,
        currency: &'static str,
        amount: f64,
    },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush csv: {0}")]
    Flush(#[from] io::Error),
}

/// Opening balances of one client.
pub type ClientRow = (ClientId, Vec<(Currency, Amount)>);

#[derive(Debug, Deserialize)]
struct InputRow {
    client: ClientId,
    #[serde(rename = "RaiStone")]
    rai_stone: f64,
    #[serde(rename = "USD")]
    usd: f64,
    #[serde(rename = "EUR")]
    eur: f64,
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    client: ClientId,
    #[serde(rename = "RaiStone")]
    rai_stone: String,
    #[serde(rename = "USD")]
    usd: String,
    #[serde(rename = "EUR")]
    eur: String,
}

#[derive(Debug, Serialize)]
struct RateRow<'a> {
    pair: &'a str,
    rate: String,
}

/// Read clients and their opening balances from a csv file
pub fn read_clients(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<ClientRow, CsvError>>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path.as_ref())
        .map_err(|source| CsvError::Open {
            path: path.as_ref().display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let balances = [(RAI_STONE, row.rai_stone), (USD, row.usd), (EUR, row.eur)];
            if let Some((currency, amount)) = balances.iter().find(|(_, a)| *a < 0.0) {
                return Err(CsvError::NegativeBalance {
                    line,
                    currency: *currency,
                    amount: *amount,
                });
            }
            Ok((
                row.client,
                balances
                    .into_iter()
                    .map(|(c, a)| (c.to_string(), Amount::new(a)))
                    .collect(),
            ))
        }))
}

/// Write client balances in csv format
pub fn write_balances(snapshot: &Snapshot, writer: impl io::Write) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for client in &snapshot.clients {
        let row = BalanceRow {
            client: client.client,
            rai_stone: client.get(RAI_STONE).to_string(),
            usd: client.get(USD).to_string(),
            eur: client.get(EUR).to_string(),
        };
        writer.serialize(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write exchange rates in csv format
pub fn write_rates(snapshot: &Snapshot, writer: impl io::Write) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for (pair, rate) in &snapshot.rates {
        writer.serialize(RateRow {
            pair,
            rate: format!("{rate:.4}"),
        })?;
    }

    writer.flush()?;
    Ok(())
}

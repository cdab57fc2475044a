// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use fare_ledger_rs::{
    Engine, FixedDelayGateway, JsonFileStore, MemoryStore, MethodId, PaymentMethodInput,
    PaymentMethodKind, PricingConstants, RideRequest, RiderId, ServiceTier,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Fare Ledger - Process booking CSV files
///
/// Reads booking operations from a CSV file, runs them through the fare
/// and ledger engine, and outputs the recorded transactions to stdout.
/// Supports pricing, payment-method management, and checkout.
#[derive(Parser, Debug)]
#[command(name = "fare-ledger-rs")]
#[command(about = "A fare engine that processes booking CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with booking operations
    ///
    /// Expected format: op,rider,tier,distance_km,pickup,dropoff,kind,suffix,expiry,method
    /// Example: cargo run -- bookings.csv > transactions.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Directory for persisted rider data; in-memory when omitted
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Per-kilometre rate for non-pooled tiers
    #[arg(long, default_value = "2.15")]
    per_km_rate: Decimal,

    /// Rate multiplier for pooled tiers, in (0, 1]
    #[arg(long, default_value = "0.35")]
    pooling_discount: Decimal,

    /// Flat taxes and fees added to every fare
    #[arg(long, default_value = "10.00")]
    taxes_and_fees: Decimal,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args = Args::parse();

    let constants = match PricingConstants::new(
        args.per_km_rate,
        args.pooling_discount,
        args.taxes_and_fees,
    ) {
        Ok(constants) => constants,
        Err(e) => {
            eprintln!("Error in pricing constants: {}", e);
            process::exit(1);
        }
    };

    let store: Arc<dyn fare_ledger_rs::BlobStore> = match &args.data_dir {
        Some(dir) => match JsonFileStore::new(dir) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                eprintln!("Error opening data dir '{}': {}", dir.display(), e);
                process::exit(1);
            }
        },
        None => Arc::new(MemoryStore::new()),
    };

    let engine = match Engine::new(store, Arc::new(FixedDelayGateway::instant()), constants) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error creating engine: {}", e);
            process::exit(1);
        }
    };

    // Open input file
    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    // Process bookings from CSV
    if let Err(e) = process_bookings(BufReader::new(file), &engine) {
        eprintln!("Error processing bookings: {}", e);
        process::exit(1);
    }

    // Write results to stdout
    if let Err(e) = write_transactions(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, rider, tier, distance_km, pickup, dropoff, kind, suffix, expiry, method`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    rider: u64,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    distance_km: Option<Decimal>,
    #[serde(default)]
    pickup: Option<String>,
    #[serde(default)]
    dropoff: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    suffix: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
    #[serde(default)]
    method: Option<String>,
}

/// One booking operation, decoded from a CSV row.
#[derive(Debug)]
enum BookingOp {
    Price { rider: RiderId, request: RideRequest },
    AddMethod { rider: RiderId, input: PaymentMethodInput },
    RemoveMethod { rider: RiderId, method: String },
    Checkout { rider: RiderId, method: Option<String> },
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

impl CsvRecord {
    /// Converts the CSV record to a booking operation.
    ///
    /// Returns `None` for unknown operations or missing required fields.
    fn into_op(self) -> Option<BookingOp> {
        let rider = RiderId(self.rider);

        match self.op.to_lowercase().as_str() {
            "price" => {
                let tier: ServiceTier = non_empty(self.tier)?.parse().ok()?;
                let distance_km = self.distance_km?;
                Some(BookingOp::Price {
                    rider,
                    request: RideRequest {
                        pickup_label: non_empty(self.pickup)?,
                        dropoff_label: non_empty(self.dropoff)?,
                        tier,
                        distance_km,
                    },
                })
            }
            "add-method" => {
                let kind = match non_empty(self.kind)?.to_lowercase().as_str() {
                    "credit-card" => PaymentMethodKind::CreditCard,
                    "debit-card" => PaymentMethodKind::DebitCard,
                    "digital-wallet" => PaymentMethodKind::DigitalWallet,
                    _ => return None,
                };
                Some(BookingOp::AddMethod {
                    rider,
                    input: PaymentMethodInput {
                        kind,
                        display_suffix: non_empty(self.suffix)?,
                        expiry: non_empty(self.expiry),
                    },
                })
            }
            "remove-method" => Some(BookingOp::RemoveMethod {
                rider,
                method: non_empty(self.method)?,
            }),
            "checkout" => Some(BookingOp::Checkout {
                rider,
                method: non_empty(self.method),
            }),
            _ => None,
        }
    }
}

/// Resolves a method reference: a method id, or a unique display suffix.
fn resolve_method(engine: &Engine, rider: RiderId, reference: &str) -> Option<MethodId> {
    if let Ok(id) = reference.parse::<MethodId>() {
        return Some(id);
    }
    let matches: Vec<MethodId> = engine
        .payment_methods(rider)
        .ok()?
        .iter()
        .filter(|m| m.display_suffix == reference)
        .map(|m| m.id)
        .collect();
    match matches.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

fn apply_op(engine: &Engine, op: BookingOp) -> Result<(), fare_ledger_rs::EngineError> {
    match op {
        BookingOp::Price { rider, request } => {
            engine.price(rider, request)?;
        }
        BookingOp::AddMethod { rider, input } => {
            engine.add_payment_method(rider, input)?;
        }
        BookingOp::RemoveMethod { rider, method } => {
            let id = resolve_method(engine, rider, &method)
                .ok_or(fare_ledger_rs::EngineError::NotFound)?;
            engine.remove_payment_method(rider, id)?;
        }
        BookingOp::Checkout { rider, method } => {
            let id = match method {
                Some(reference) => resolve_method(engine, rider, &reference)
                    .ok_or(fare_ledger_rs::EngineError::NotFound)?,
                None => engine
                    .default_payment_method(rider)?
                    .ok_or(fare_ledger_rs::EngineError::NoMethodSelected)?
                    .id,
            };
            engine.select_method(rider, id)?;
            engine.checkout(rider)?;
        }
    }
    Ok(())
}

/// Process booking operations from a CSV reader.
///
/// Streams rows so arbitrarily large files never load fully into
/// memory. Malformed rows and failed operations are logged and skipped;
/// processing continues.
///
/// # CSV Format
///
/// Columns: `op, rider, tier, distance_km, pickup, dropoff, kind, suffix, expiry, method`
/// - `op`: price, add-method, remove-method, checkout
/// - `rider`: Rider ID (u64)
/// - `tier`: private, pooled, women-only-pooled, women-only-private
/// - `method`: a method id, or a unique display suffix
///
/// # Example
///
/// ```csv
/// op,rider,tier,distance_km,pickup,dropoff,kind,suffix,expiry,method
/// price,1,private,50,Toronto,Ottawa,,,,
/// add-method,1,,,,,credit-card,4242,12/27,
/// checkout,1,,,,,,,,4242
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is
/// invalid. Individual operation failures don't stop processing.
pub fn process_bookings<R: Read>(reader: R, engine: &Engine) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " price "
        .flexible(true) // Allow missing trailing fields
        .has_headers(true) // Skip first row as header
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(op) = record.into_op() else {
                    tracing::warn!("skipping invalid booking record");
                    continue;
                };

                if let Err(e) = apply_op(engine, op) {
                    tracing::warn!(error = %e, "skipping failed operation");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed row");
                continue;
            }
        }
    }

    Ok(())
}

/// Output row: one successful transaction.
#[derive(Debug, Serialize)]
struct OutputRecord {
    rider: u64,
    route: String,
    occurred_at: String,
    amount: Decimal,
    tier: String,
    status: String,
}

/// Write all riders' successful transactions to a CSV writer.
///
/// Riders are ordered by id, transactions chronologically. Amounts are
/// rounded to 2 decimal places here, at the presentation edge; stored
/// values keep full precision.
///
/// # CSV Format
///
/// Columns: `rider, route, occurred_at, amount, tier, status`
pub fn write_transactions<W: Write>(
    engine: &Engine,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);

    for rider in engine.riders() {
        for transaction in engine.transactions(rider)? {
            wtr.serialize(OutputRecord {
                rider: rider.0,
                route: transaction.route_label().to_string(),
                occurred_at: transaction.occurred_at().to_rfc3339(),
                amount: transaction.amount().round_dp(2),
                tier: transaction.tier().to_string(),
                status: transaction.status().as_str().to_string(),
            })?;
        }
    }

    // Flush to ensure all data is written
    wtr.flush()?;
    Ok(())
}

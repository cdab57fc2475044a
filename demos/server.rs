//! Simple REST API server example for the fare and ledger engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /riders/{id}/price` - Price a ride request (fills the booking slot)
//! - `GET /riders/{id}/booking` - Inspect the in-progress priced booking
//! - `DELETE /riders/{id}/booking` - Abandon the in-progress booking
//! - `POST /riders/{id}/methods` - Add a payment method
//! - `GET /riders/{id}/methods` - List saved payment methods
//! - `DELETE /riders/{id}/methods/{method_id}` - Remove a payment method
//! - `POST /riders/{id}/checkout` - Authorize and record the charge
//! - `GET /riders/{id}/transactions` - List successful transactions
//!
//! ## Example Usage
//!
//! ```bash
//! # Price a private ride
//! curl -X POST http://localhost:3000/riders/1/price \
//!   -H "Content-Type: application/json" \
//!   -d '{"pickup_label": "Toronto", "dropoff_label": "Ottawa", "tier": "private", "distance_km": "50"}'
//!
//! # Add a card
//! curl -X POST http://localhost:3000/riders/1/methods \
//!   -H "Content-Type: application/json" \
//!   -d '{"kind": "credit-card", "display_suffix": "4242", "expiry": "12/27"}'
//!
//! # Check out with the saved card
//! curl -X POST http://localhost:3000/riders/1/checkout \
//!   -H "Content-Type: application/json" \
//!   -d '{"method": null}'
//!
//! # Transaction history
//! curl http://localhost:3000/riders/1/transactions
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use fare_ledger_rs::{
    Engine, EngineError, FixedDelayGateway, MemoryStore, MethodId, PaymentMethodInput,
    PricingConstants, RideRequest, RiderId, ServiceTier,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

/// Request body for pricing a ride.
///
/// ```json
/// {"pickup_label": "Toronto", "dropoff_label": "Ottawa", "tier": "private", "distance_km": "50"}
/// ```
#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub pickup_label: String,
    pub dropoff_label: String,
    pub tier: ServiceTier,
    pub distance_km: Decimal,
}

/// Request body for adding a payment method.
#[derive(Debug, Deserialize)]
pub struct AddMethodRequest {
    pub kind: fare_ledger_rs::PaymentMethodKind,
    pub display_suffix: String,
    pub expiry: Option<String>,
}

/// Request body for checkout; `method` falls back to the default.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub method: Option<MethodId>,
}

/// Response body for a fare breakdown.
#[derive(Debug, Serialize)]
pub struct FareResponse {
    pub base_fare: Decimal,
    pub taxes_and_fees: Decimal,
    pub total: Decimal,
    pub tier: ServiceTier,
    pub discount_applied: bool,
}

/// Response body for a recorded transaction.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub route: String,
    pub occurred_at: String,
    pub amount: Decimal,
    pub tier: ServiceTier,
    pub status: String,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the fare engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `EngineError` into HTTP responses.
pub struct AppError(EngineError);

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            EngineError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            EngineError::NotFound => (StatusCode::NOT_FOUND, "METHOD_NOT_FOUND"),
            EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_FAILURE"),
            EngineError::UnsupportedSchema(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "UNSUPPORTED_SCHEMA")
            }
            EngineError::AuthorizationDeclined => {
                (StatusCode::PAYMENT_REQUIRED, "AUTHORIZATION_DECLINED")
            }
            EngineError::CheckoutInFlight => (StatusCode::CONFLICT, "CHECKOUT_IN_FLIGHT"),
            EngineError::NoPricedBooking => (StatusCode::CONFLICT, "NO_PRICED_BOOKING"),
            EngineError::NoMethodSelected => (StatusCode::CONFLICT, "NO_METHOD_SELECTED"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn fare_response(breakdown: &fare_ledger_rs::FareBreakdown) -> FareResponse {
    FareResponse {
        base_fare: breakdown.base_fare(),
        taxes_and_fees: breakdown.taxes_and_fees(),
        total: breakdown.total(),
        tier: breakdown.tier(),
        discount_applied: breakdown.discount_applied(),
    }
}

fn transaction_response(tx: &fare_ledger_rs::Transaction) -> TransactionResponse {
    TransactionResponse {
        id: tx.id().to_string(),
        route: tx.route_label().to_string(),
        occurred_at: tx.occurred_at().to_rfc3339(),
        amount: tx.amount(),
        tier: tx.tier(),
        status: tx.status().as_str().to_string(),
    }
}

// === Handlers ===

/// POST /riders/{id}/price - Price a ride request.
async fn price(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<PriceRequest>,
) -> Result<Json<FareResponse>, AppError> {
    let breakdown = state.engine.price(
        RiderId(id),
        RideRequest {
            pickup_label: request.pickup_label,
            dropoff_label: request.dropoff_label,
            tier: request.tier,
            distance_km: request.distance_km,
        },
    )?;
    Ok(Json(fare_response(&breakdown)))
}

/// GET /riders/{id}/booking - Inspect the in-progress booking.
async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Option<FareResponse>>, AppError> {
    let booking = state.engine.current_booking(RiderId(id))?;
    Ok(Json(booking.map(|b| fare_response(&b.breakdown))))
}

/// DELETE /riders/{id}/booking - Abandon the in-progress booking.
async fn abandon_booking(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.engine.abandon_booking(RiderId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /riders/{id}/methods - Add a payment method.
async fn add_method(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<AddMethodRequest>,
) -> Result<(StatusCode, Json<fare_ledger_rs::PaymentMethod>), AppError> {
    let method = state.engine.add_payment_method(
        RiderId(id),
        PaymentMethodInput {
            kind: request.kind,
            display_suffix: request.display_suffix,
            expiry: request.expiry,
        },
    )?;
    Ok((StatusCode::CREATED, Json(method)))
}

/// GET /riders/{id}/methods - List saved payment methods.
async fn list_methods(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<fare_ledger_rs::PaymentMethod>>, AppError> {
    Ok(Json(state.engine.payment_methods(RiderId(id))?))
}

/// DELETE /riders/{id}/methods/{method_id} - Remove a payment method.
async fn remove_method(
    State(state): State<AppState>,
    Path((id, method_id)): Path<(u64, MethodId)>,
) -> Result<StatusCode, AppError> {
    state.engine.remove_payment_method(RiderId(id), method_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /riders/{id}/checkout - Authorize and record the charge.
async fn checkout(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let rider = RiderId(id);
    let engine = Arc::clone(&state.engine);

    let method = match request.method {
        Some(method) => method,
        None => engine
            .default_payment_method(rider)?
            .ok_or(EngineError::NoMethodSelected)?
            .id,
    };
    engine.select_method(rider, method)?;

    // The gateway call blocks; keep it off the async worker threads.
    let transaction =
        tokio::task::spawn_blocking(move || engine.checkout(rider))
            .await
            .map_err(|_| EngineError::Storage("checkout task panicked".to_string()))??;

    Ok((StatusCode::CREATED, Json(transaction_response(&transaction))))
}

/// GET /riders/{id}/transactions - List successful transactions.
async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let transactions = state.engine.transactions(RiderId(id))?;
    Ok(Json(transactions.iter().map(transaction_response).collect()))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/riders/{id}/price", post(price))
        .route("/riders/{id}/booking", get(get_booking).delete(abandon_booking))
        .route("/riders/{id}/methods", post(add_method).get(list_methods))
        .route("/riders/{id}/methods/{method_id}", delete(remove_method))
        .route("/riders/{id}/checkout", post(checkout))
        .route("/riders/{id}/transactions", get(list_transactions))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    let engine = Engine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(FixedDelayGateway::new(Duration::from_secs(2))),
        PricingConstants::default(),
    )
    .expect("default pricing constants are valid");

    let state = AppState {
        engine: Arc::new(engine),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Fare ledger API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST   /riders/{{id}}/price         - Price a ride request");
    println!("  GET    /riders/{{id}}/booking       - Inspect the priced booking");
    println!("  DELETE /riders/{{id}}/booking       - Abandon the booking");
    println!("  POST   /riders/{{id}}/methods       - Add a payment method");
    println!("  GET    /riders/{{id}}/methods       - List payment methods");
    println!("  DELETE /riders/{{id}}/methods/{{mid}} - Remove a payment method");
    println!("  POST   /riders/{{id}}/checkout      - Authorize and record the charge");
    println!("  GET    /riders/{{id}}/transactions  - List successful transactions");

    axum::serve(listener, app).await.unwrap();
}

//! Credit balance endpoint.

use axum::{Json, extract::State};
use serde::Serialize;

use questline_common::constants::RECENT_TRANSACTIONS;
use questline_common::{CreditTransaction, Identity};

use super::ApiError;
use crate::clients::Caller;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BalanceResponse {
    identity: Identity,
    balance: i64,
    transactions: Vec<CreditTransaction>,
}

/// The caller's balance and most recent transactions
pub async fn balance(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.balance(&caller.identity).await?;
    let transactions = state
        .ledger
        .recent_transactions(&caller.identity, RECENT_TRANSACTIONS)
        .await?;

    Ok(Json(BalanceResponse {
        identity: caller.identity,
        balance,
        transactions,
    }))
}

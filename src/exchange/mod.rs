//! Exchange capability: the trading surface the execution layer sees.
//!
//! The core never talks HTTP or WebSocket; it calls this trait and lets
//! the connector implementation deal with the venue. Errors are
//! discriminated so callers can tell transient network trouble from bad
//! parameters and from fatal conditions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured exchange error taxonomy.
///
/// `Network` failures are retryable at the next cycle, `Logical` failures
/// are parameter problems surfaced as validation failures, `Fatal`
/// failures halt the cycle.
#[derive(Debug, Clone)]
pub enum ExchangeError {
    Network(String),
    Logical(String),
    Fatal(String),
}

impl ExchangeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Network(_))
    }
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeError::Network(e) => write!(f, "network error: {}", e),
            ExchangeError::Logical(e) => write!(f, "logical error: {}", e),
            ExchangeError::Fatal(e) => write!(f, "fatal error: {}", e),
        }
    }
}

impl std::error::Error for ExchangeError {}

/// Account balance snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountBalance {
    pub total: f64,
    pub available: f64,
    pub used_margin: f64,
}

/// One open position as reported by the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub mark_price: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Margin mode for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// Order record returned by open/close calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub order_id: String,
    pub filled_quantity: f64,
    pub avg_price: f64,
}

/// The venue operations the execution layer relies on. All calls block
/// the cycle; a quantity of zero on a close means "close everything".
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_balance(&self) -> Result<AccountBalance, ExchangeError>;

    async fn get_positions(&self) -> Result<Vec<PositionInfo>, ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<(), ExchangeError>;

    async fn open_long(
        &self,
        symbol: &str,
        quantity: f64,
        leverage: u32,
    ) -> Result<ExchangeOrder, ExchangeError>;

    async fn open_short(
        &self,
        symbol: &str,
        quantity: f64,
        leverage: u32,
    ) -> Result<ExchangeOrder, ExchangeError>;

    async fn close_long(&self, symbol: &str, quantity: f64)
        -> Result<ExchangeOrder, ExchangeError>;

    async fn close_short(
        &self,
        symbol: &str,
        quantity: f64,
    ) -> Result<ExchangeOrder, ExchangeError>;

    async fn set_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError>;

    async fn set_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
    ) -> Result<(), ExchangeError>;

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError>;

    async fn get_market_price(&self, symbol: &str) -> Result<f64, ExchangeError>;
}

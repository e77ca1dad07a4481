//! Raw per-symbol market data as delivered by the exchange connector.
//!
//! These types are transient, per-cycle inputs. The core never mutates a
//! snapshot it was handed; the cleaner works on its own copy.

mod cleaner;

pub use cleaner::{DataCleaner, ValidationReport};

use serde::{Deserialize, Serialize};

/// Open-interest readings: latest sample and rolling average.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenInterestData {
    pub latest: f64,
    pub average: f64,
}

/// Intraday indicator series, most recent sample last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntradaySeries {
    pub mid_prices: Vec<f64>,
    pub ema20_values: Vec<f64>,
    pub macd_values: Vec<f64>,
    pub rsi7_values: Vec<f64>,
    pub rsi14_values: Vec<f64>,
}

/// Slower-moving context computed over a longer lookback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LongerTermContext {
    pub ema50: f64,
    pub atr14: f64,
    pub current_volume: f64,
    pub average_volume: f64,
}

/// One raw market snapshot for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,

    pub current_price: f64,
    pub price_change_1h: f64,
    pub price_change_4h: f64,

    pub current_ema20: f64,
    pub current_macd: f64,
    pub current_rsi7: f64,

    pub funding_rate: f64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub open_interest: Option<OpenInterestData>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub intraday: Option<IntradaySeries>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub longer_term: Option<LongerTermContext>,
}

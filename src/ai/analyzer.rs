//! Market condition classification (what kind of market is this?).
//!
//! First choice is the oracle; when the call fails or the response does
//! not carry a valid tag, the caller falls back to
//! [`MarketAnalyzer::classify_with_technicals`].

use std::sync::Arc;

use crate::ai::oracle::{Oracle, OracleError};
use crate::ai::parse;
use crate::config::AiLayerConfig;
use crate::logger::{self, LogTag};
use crate::types::{CleanedMarketData, MarketCondition};

const CONDITION_SYSTEM_PROMPT: &str = "You are a professional market analyst. \
Classify the current market condition. Return only JSON: \
{\"condition\":\"trending/ranging/volatile/consolidate/breakout\",\"reason\":\"under 100 words\"}";

pub struct MarketAnalyzer {
    #[allow(dead_code)]
    config: AiLayerConfig,
    oracle: Arc<dyn Oracle>,
}

impl MarketAnalyzer {
    pub fn new(config: AiLayerConfig, oracle: Arc<dyn Oracle>) -> Self {
        Self { config, oracle }
    }

    /// Ask the oracle for a market-condition tag.
    ///
    /// Errors when the oracle fails or no valid tag can be recovered from
    /// the response; the caller decides what to do next.
    pub async fn classify(
        &self,
        market_data: &CleanedMarketData,
    ) -> Result<(MarketCondition, String), OracleError> {
        let user_prompt = format!(
            "Classify this market:\n{}\n\nRules:\n\
             1. condition must be one of trending/ranging/volatile/consolidate/breakout\n\
             2. keep the reason under 100 words\n\
             3. return only JSON",
            market_data.compressed_summary
        );

        let response = self.oracle.call(CONDITION_SYSTEM_PROMPT, &user_prompt).await?;

        if let Some(value) = parse::extract_json(&response) {
            let tag = parse::str_field(&value, "condition").unwrap_or_default();
            if let Some(condition) = MarketCondition::parse(&tag) {
                let reason = parse::str_field(&value, "reason").unwrap_or_default();
                return Ok((condition, reason));
            }
            logger::debug(
                LogTag::Ai,
                &format!("{}: oracle returned unknown condition '{}'", market_data.symbol, tag),
            );
        }

        // No JSON: scan the text for a condition keyword
        for condition in [
            MarketCondition::Trending,
            MarketCondition::Breakout,
            MarketCondition::Volatile,
            MarketCondition::Consolidate,
            MarketCondition::Ranging,
        ] {
            if parse::contains_keyword(&response, condition.as_str()) {
                return Ok((condition, "parsed from unstructured oracle response".to_string()));
            }
        }

        Err(OracleError::InvalidResponse(
            "no market condition tag in response".to_string(),
        ))
    }

    /// Indicator-only classification used when the oracle is unavailable.
    pub fn classify_with_technicals(
        &self,
        data: &CleanedMarketData,
    ) -> (MarketCondition, String) {
        // Strong trend: EMA spread over 2% with MACD sign agreement
        if data.ema20 > 0.0 && data.ema50 > 0.0 {
            let ema_spread = (data.ema20 - data.ema50) / data.ema50 * 100.0;
            if ema_spread.abs() > 2.0 {
                let macd_confirms =
                    (ema_spread > 0.0 && data.macd > 0.0) || (ema_spread < 0.0 && data.macd < 0.0);
                if macd_confirms {
                    let reason = if ema_spread > 0.0 {
                        "EMA20 above EMA50 with MACD confirming the uptrend"
                    } else {
                        "EMA20 below EMA50 with MACD confirming the downtrend"
                    };
                    return (MarketCondition::Trending, reason.to_string());
                }
            }
        }

        // Breakout: price above the EMA stack on expanding volume
        if data.current_price > data.ema20
            && data.ema20 > data.ema50
            && data.volume_change > 50.0
        {
            return (
                MarketCondition::Breakout,
                "price broke above the EMA stack on expanding volume".to_string(),
            );
        }

        // High volatility
        if data.atr > 0.0 && data.current_price > 0.0 {
            let volatility = data.atr / data.current_price * 100.0;
            if volatility > 5.0 {
                return (
                    MarketCondition::Volatile,
                    format!("ATR volatility at {:.2}%", volatility),
                );
            }
        }

        // Consolidation: neutral RSI with MACD pinned at zero
        if (40.0..=60.0).contains(&data.rsi14) && data.macd.abs() < 1e-4 {
            return (
                MarketCondition::Consolidate,
                "RSI neutral and MACD flat at the zero line".to_string(),
            );
        }

        (
            MarketCondition::Ranging,
            "no clear trend or breakout, treating as a range".to_string(),
        )
    }
}

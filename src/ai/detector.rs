//! Trading opportunity identification (what should be done right now?).
//!
//! Same oracle-first, technicals-second pattern as the market analyzer.
//! The technical rules are keyed on the previously classified condition.

use std::sync::Arc;

use crate::ai::oracle::{Oracle, OracleError};
use crate::ai::parse;
use crate::config::AiLayerConfig;
use crate::logger::{self, LogTag};
use crate::types::{CleanedMarketData, MarketCondition, Opportunity};

const OPPORTUNITY_SYSTEM_PROMPT: &str = "You are a trade opportunity spotter. \
Identify the current opportunity. Return only JSON: \
{\"opportunity\":\"long_entry/short_entry/long_exit/short_exit/scalp/none\",\"reason\":\"under 100 words\"}";

pub struct OpportunityDetector {
    #[allow(dead_code)]
    config: AiLayerConfig,
    oracle: Arc<dyn Oracle>,
}

impl OpportunityDetector {
    pub fn new(config: AiLayerConfig, oracle: Arc<dyn Oracle>) -> Self {
        Self { config, oracle }
    }

    /// Ask the oracle for an opportunity tag. Errors when the oracle
    /// fails or no valid tag can be recovered.
    pub async fn detect(
        &self,
        condition: MarketCondition,
        market_data: &CleanedMarketData,
    ) -> Result<(Opportunity, String), OracleError> {
        let user_prompt = format!(
            "Market condition: {}\nMarket data: {}\n\n\
             Identify the opportunity:\n\
             - long_entry: open a long\n\
             - short_entry: open a short\n\
             - long_exit: close an existing long\n\
             - short_exit: close an existing short\n\
             - scalp: short-lived mean-reversion trade\n\
             - none: no opportunity\n\n\
             Return only JSON",
            condition, market_data.compressed_summary
        );

        let response = self
            .oracle
            .call(OPPORTUNITY_SYSTEM_PROMPT, &user_prompt)
            .await?;

        if let Some(value) = parse::extract_json(&response) {
            let tag = parse::str_field(&value, "opportunity").unwrap_or_default();
            if let Some(opportunity) = Opportunity::parse(&tag) {
                let reason = parse::str_field(&value, "reason").unwrap_or_default();
                return Ok((opportunity, reason));
            }
            logger::debug(
                LogTag::Ai,
                &format!(
                    "{}: oracle returned unknown opportunity '{}'",
                    market_data.symbol, tag
                ),
            );
        }

        // Keyword scan; specific tags first so "long_exit" does not
        // match as "long_entry"
        for opportunity in [
            Opportunity::LongExit,
            Opportunity::ShortExit,
            Opportunity::LongEntry,
            Opportunity::ShortEntry,
            Opportunity::Scalp,
        ] {
            if parse::contains_keyword(&response, opportunity.as_str()) {
                return Ok((
                    opportunity,
                    "parsed from unstructured oracle response".to_string(),
                ));
            }
        }

        Err(OracleError::InvalidResponse(
            "no opportunity tag in response".to_string(),
        ))
    }

    /// Indicator-only detection used when the oracle is unavailable.
    pub fn detect_with_technicals(
        &self,
        condition: MarketCondition,
        data: &CleanedMarketData,
    ) -> (Opportunity, String) {
        match condition {
            MarketCondition::Trending => detect_trending(data),
            MarketCondition::Breakout => detect_breakout(data),
            MarketCondition::Ranging => detect_ranging(data),
            MarketCondition::Consolidate => (
                Opportunity::None,
                "consolidation phase, waiting for direction".to_string(),
            ),
            MarketCondition::Volatile => detect_volatile(data),
        }
    }
}

fn detect_trending(data: &CleanedMarketData) -> (Opportunity, String) {
    // Uptrend
    if data.ema20 > data.ema50 {
        if data.current_price < data.ema20 && data.rsi14 < 40.0 {
            return (
                Opportunity::LongEntry,
                "uptrend pullback to EMA20 with RSI oversold".to_string(),
            );
        }

        if data.macd > data.macd_signal && data.macd > 0.0 {
            return (
                Opportunity::LongEntry,
                "bullish MACD cross inside an uptrend".to_string(),
            );
        }

        if data.current_price > data.ema20 && data.rsi14 > 50.0 && data.rsi14 < 70.0 {
            return (
                Opportunity::LongEntry,
                "uptrend continuation above EMA20 with healthy RSI".to_string(),
            );
        }
    }

    // Downtrend
    if data.ema20 < data.ema50 {
        if data.current_price > data.ema20 && data.rsi14 > 60.0 {
            return (
                Opportunity::ShortEntry,
                "downtrend bounce into EMA20 with RSI overbought".to_string(),
            );
        }

        if data.macd < data.macd_signal && data.macd < 0.0 {
            return (
                Opportunity::ShortEntry,
                "bearish MACD cross inside a downtrend".to_string(),
            );
        }

        if data.current_price < data.ema20 && data.rsi14 < 50.0 && data.rsi14 > 30.0 {
            return (
                Opportunity::ShortEntry,
                "downtrend continuation below EMA20".to_string(),
            );
        }
    }

    (
        Opportunity::None,
        "trending market but no clean entry".to_string(),
    )
}

fn detect_breakout(data: &CleanedMarketData) -> (Opportunity, String) {
    if data.current_price > data.ema20 && data.current_price > data.ema50 {
        if data.volume_change > 50.0 && data.rsi14 > 55.0 {
            return (
                Opportunity::LongEntry,
                "upside breakout on expanding volume".to_string(),
            );
        }
    }

    if data.current_price < data.ema20 && data.current_price < data.ema50 {
        if data.volume_change > 50.0 && data.rsi14 < 45.0 {
            return (
                Opportunity::ShortEntry,
                "downside breakout on expanding volume".to_string(),
            );
        }
    }

    (Opportunity::None, "breakout not confirmed yet".to_string())
}

fn detect_ranging(data: &CleanedMarketData) -> (Opportunity, String) {
    // Mean reversion at the RSI extremes
    if data.rsi14 < 30.0 {
        return (
            Opportunity::LongEntry,
            "range-bound RSI oversold, buying the low".to_string(),
        );
    }

    if data.rsi14 > 70.0 {
        return (
            Opportunity::ShortEntry,
            "range-bound RSI overbought, selling the high".to_string(),
        );
    }

    // Near the EMA50 support/resistance band
    if data.current_price < data.ema50 && data.rsi14 < 40.0 {
        return (
            Opportunity::LongEntry,
            "price near EMA50 support with soft RSI".to_string(),
        );
    }

    if data.current_price > data.ema50 && data.rsi14 > 60.0 {
        return (
            Opportunity::ShortEntry,
            "price near EMA50 resistance with stretched RSI".to_string(),
        );
    }

    (
        Opportunity::None,
        "ranging market, waiting for a better level".to_string(),
    )
}

fn detect_volatile(data: &CleanedMarketData) -> (Opportunity, String) {
    if data.rsi7 < 25.0 || data.rsi7 > 75.0 {
        return (
            Opportunity::Scalp,
            "short-term reversal setup in a volatile market".to_string(),
        );
    }

    (
        Opportunity::None,
        "volatile market without an edge, staying out".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    struct CannedOracle(Result<String, OracleError>);

    #[async_trait]
    impl Oracle for CannedOracle {
        async fn call(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
            self.0.clone()
        }
    }

    fn data() -> CleanedMarketData {
        CleanedMarketData {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            current_price: 45_000.0,
            price_change_1h: 2.5,
            price_change_4h: 5.8,
            price_change_24h: 1.1,
            ema20: 44_800.0,
            ema50: 44_200.0,
            macd: 0.023,
            macd_signal: 0.018,
            rsi7: 65.5,
            rsi14: 62.0,
            atr: 250.0,
            volume_24h: 1_500_000.0,
            volume_change: 50.0,
            open_interest: 1_000_000_000.0,
            oi_change: 5.3,
            funding_rate: 0.0001,
            data_quality: 1.0,
            is_valid: true,
            compressed_summary: "BTCUSDT|P:45000.00".to_string(),
        }
    }

    fn detector(response: Result<String, OracleError>) -> OpportunityDetector {
        OpportunityDetector::new(AiLayerConfig::default(), Arc::new(CannedOracle(response)))
    }

    #[tokio::test]
    async fn test_detect_parses_json_response() {
        let d = detector(Ok(
            r#"{"opportunity":"long_entry","reason":"pullback"}"#.to_string()
        ));
        let (opportunity, _) = d.detect(MarketCondition::Trending, &data()).await.unwrap();
        assert_eq!(opportunity, Opportunity::LongEntry);
    }

    #[tokio::test]
    async fn test_keyword_scan_prefers_specific_tags() {
        let d = detector(Ok("I would take the long_exit here".to_string()));
        let (opportunity, _) = d.detect(MarketCondition::Trending, &data()).await.unwrap();
        assert_eq!(opportunity, Opportunity::LongExit);
    }

    #[test]
    fn test_trending_up_macd_cross() {
        let d = detector(Err(OracleError::Timeout));
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Trending, &data());
        assert_eq!(opportunity, Opportunity::LongEntry);
    }

    #[test]
    fn test_trending_down_symmetric() {
        let d = detector(Err(OracleError::Timeout));
        let mut down = data();
        down.ema20 = 44_000.0;
        down.ema50 = 44_500.0;
        down.macd = -0.02;
        down.macd_signal = -0.01;
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Trending, &down);
        assert_eq!(opportunity, Opportunity::ShortEntry);
    }

    #[test]
    fn test_breakout_requires_volume_and_rsi() {
        let d = detector(Err(OracleError::Timeout));

        let mut confirmed = data();
        confirmed.volume_change = 60.0;
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Breakout, &confirmed);
        assert_eq!(opportunity, Opportunity::LongEntry);

        let mut unconfirmed = data();
        unconfirmed.volume_change = 20.0;
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Breakout, &unconfirmed);
        assert_eq!(opportunity, Opportunity::None);
    }

    #[test]
    fn test_ranging_mean_reversion() {
        let d = detector(Err(OracleError::Timeout));

        let mut oversold = data();
        oversold.rsi14 = 25.0;
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Ranging, &oversold);
        assert_eq!(opportunity, Opportunity::LongEntry);

        let mut overbought = data();
        overbought.rsi14 = 75.0;
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Ranging, &overbought);
        assert_eq!(opportunity, Opportunity::ShortEntry);
    }

    #[test]
    fn test_volatile_scalp_gate() {
        let d = detector(Err(OracleError::Timeout));

        let mut stretched = data();
        stretched.rsi7 = 20.0;
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Volatile, &stretched);
        assert_eq!(opportunity, Opportunity::Scalp);

        let mut neutral = data();
        neutral.rsi7 = 50.0;
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Volatile, &neutral);
        assert_eq!(opportunity, Opportunity::None);
    }

    #[test]
    fn test_consolidate_never_trades() {
        let d = detector(Err(OracleError::Timeout));
        let (opportunity, _) = d.detect_with_technicals(MarketCondition::Consolidate, &data());
        assert_eq!(opportunity, Opportunity::None);
    }
}

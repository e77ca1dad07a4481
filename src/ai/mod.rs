//! AI layer: market classification, opportunity detection and the final
//! direction/confidence decision.
//!
//! The decision maker orchestrates three oracle stages and degrades to
//! indicator rules whenever a stage fails. Oracle failures never escape
//! this layer; rate limiting is enforced before any work is done.

mod analyzer;
mod detector;
mod oracle;
mod parse;

pub use analyzer::MarketAnalyzer;
pub use detector::OpportunityDetector;
pub use oracle::{Oracle, OracleError};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::config::AiLayerConfig;
use crate::logger::{self, LogTag};
use crate::types::{AiDecision, CleanedMarketData, Direction, MarketCondition, Opportunity};

const FINAL_SYSTEM_PROMPT: &str = "You are a senior trading decision maker. \
Combine the market analysis and the identified opportunity into a final call. \
Return only JSON: {\"direction\":\"long/short/wait\",\"confidence\":0.75,\"reasoning\":\"short\"}";

/// Snapshot of the decision-rate limiter.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub decisions_this_hour: u32,
    pub max_decisions_per_hour: u32,
    pub cooldown_minutes: u32,
    pub can_decide_now: bool,
}

/// Produces one [`AiDecision`] per invocation, rate limited and fallback
/// protected.
pub struct DecisionMaker {
    config: AiLayerConfig,
    oracle: Arc<dyn Oracle>,
    analyzer: MarketAnalyzer,
    detector: OpportunityDetector,

    last_decision_time: Option<Instant>,
    decisions_this_hour: u32,
}

impl DecisionMaker {
    pub fn new(config: AiLayerConfig, oracle: Arc<dyn Oracle>) -> Self {
        let analyzer = MarketAnalyzer::new(config.clone(), oracle.clone());
        let detector = OpportunityDetector::new(config.clone(), oracle.clone());

        Self {
            config,
            oracle,
            analyzer,
            detector,
            last_decision_time: None,
            decisions_this_hour: 0,
        }
    }

    /// Run the full three-stage decision for one cleaned record.
    pub async fn make_decision(&mut self, market_data: &CleanedMarketData) -> AiDecision {
        let started = Instant::now();
        let timestamp = Utc::now();

        if !self.check_rate_limit() {
            return AiDecision {
                symbol: market_data.symbol.clone(),
                timestamp,
                market_condition: MarketCondition::Ranging,
                condition_reason: "rate limited: hourly decision budget reached".to_string(),
                opportunity: Opportunity::None,
                opportunity_reason: "waiting for cooldown".to_string(),
                direction: Direction::Wait,
                confidence: 0.0,
                chain_of_thought: String::new(),
                model_used: self.config.model.clone(),
                response_time_ms: started.elapsed().as_millis() as i64,
            };
        }

        // Stage A: market condition
        let (condition, condition_reason) = match self.analyzer.classify(market_data).await {
            Ok(result) => result,
            Err(e) => {
                logger::warning(
                    LogTag::Ai,
                    &format!("{}: condition stage fell back: {}", market_data.symbol, e),
                );
                self.analyzer.classify_with_technicals(market_data)
            }
        };

        // Stage B: opportunity
        let (opportunity, opportunity_reason) =
            match self.detector.detect(condition, market_data).await {
                Ok(result) => result,
                Err(e) => {
                    logger::warning(
                        LogTag::Ai,
                        &format!("{}: opportunity stage fell back: {}", market_data.symbol, e),
                    );
                    self.detector.detect_with_technicals(condition, market_data)
                }
            };

        // Stage C: final direction and confidence
        let (mut direction, confidence, mut chain_of_thought) = match self
            .final_call(condition, &condition_reason, opportunity, &opportunity_reason, market_data)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                logger::warning(
                    LogTag::Ai,
                    &format!("{}: final stage fell back: {}", market_data.symbol, e),
                );
                let (direction, confidence) =
                    self.rule_based_decision(opportunity, market_data);
                (
                    direction,
                    confidence,
                    "oracle unavailable, rule-based decision".to_string(),
                )
            }
        };

        // Confidence gate
        if confidence < self.config.min_confidence {
            direction = Direction::Wait;
            chain_of_thought.push_str(&format!(
                "\nconfidence {:.2} below threshold {:.2}, switching to wait",
                confidence, self.config.min_confidence
            ));
        }

        self.advance_rate_limit();

        AiDecision {
            symbol: market_data.symbol.clone(),
            timestamp,
            market_condition: condition,
            condition_reason,
            opportunity,
            opportunity_reason,
            direction,
            confidence,
            chain_of_thought: if self.config.enable_chain_of_thought {
                chain_of_thought
            } else {
                String::new()
            },
            model_used: self.config.model.clone(),
            response_time_ms: started.elapsed().as_millis() as i64,
        }
    }

    /// Stage C oracle call: merge the two prior stages into a direction.
    async fn final_call(
        &self,
        condition: MarketCondition,
        condition_reason: &str,
        opportunity: Opportunity,
        opportunity_reason: &str,
        market_data: &CleanedMarketData,
    ) -> Result<(Direction, f64, String), OracleError> {
        let mut user_prompt = format!(
            "Market analysis:\ncondition: {}\nreason: {}\n\n\
             Opportunity:\nkind: {}\nreason: {}\n\n\
             Market data: {}\n\n\
             Requirements:\n\
             1. direction: long/short/wait\n\
             2. confidence: 0.7-1.0 (below 0.7 means do not trade)\n\
             3. reasoning: under 100 words\n\n\
             Return only JSON",
            condition, condition_reason, opportunity, opportunity_reason,
            market_data.compressed_summary
        );

        user_prompt = truncate_prompt(user_prompt, self.config.max_prompt_length);

        let response = self.oracle.call(FINAL_SYSTEM_PROMPT, &user_prompt).await?;

        if let Some(value) = parse::extract_json(&response) {
            let direction = parse::str_field(&value, "direction")
                .and_then(|s| Direction::parse(&s))
                .unwrap_or(Direction::Wait);

            let confidence = parse::f64_field(&value, "confidence")
                .unwrap_or(0.7)
                .clamp(0.7, 1.0);

            let reasoning = parse::str_field(&value, "reasoning").unwrap_or_default();
            return Ok((direction, confidence, reasoning));
        }

        // Unstructured response: derive the direction from keywords
        let direction = if parse::contains_keyword(&response, "long") {
            Direction::Long
        } else if parse::contains_keyword(&response, "short") {
            Direction::Short
        } else {
            Direction::Wait
        };

        Ok((
            direction,
            0.75,
            "parsed from unstructured oracle response".to_string(),
        ))
    }

    /// Rule-engine decision used when the final oracle stage fails.
    fn rule_based_decision(
        &self,
        opportunity: Opportunity,
        data: &CleanedMarketData,
    ) -> (Direction, f64) {
        match opportunity {
            Opportunity::LongEntry => (Direction::Long, fallback_confidence(data, true)),
            Opportunity::ShortEntry => (Direction::Short, fallback_confidence(data, false)),
            Opportunity::Scalp => {
                if data.rsi7 < 30.0 {
                    (Direction::Long, 0.75)
                } else if data.rsi7 > 70.0 {
                    (Direction::Short, 0.75)
                } else {
                    (Direction::Wait, 0.0)
                }
            }
            _ => (Direction::Wait, 0.0),
        }
    }

    /// True when a decision may be made right now. Resets the hourly
    /// counter lazily once the window has passed.
    fn check_rate_limit(&mut self) -> bool {
        let now = Instant::now();

        if let Some(last) = self.last_decision_time {
            if now.duration_since(last) > Duration::from_secs(3600) {
                self.decisions_this_hour = 0;
            }
        }

        if self.decisions_this_hour >= self.config.max_decisions_per_hour {
            return false;
        }

        if let Some(last) = self.last_decision_time {
            let cooldown = Duration::from_secs(self.config.cooldown_minutes as u64 * 60);
            if now.duration_since(last) < cooldown {
                return false;
            }
        }

        true
    }

    fn advance_rate_limit(&mut self) {
        self.last_decision_time = Some(Instant::now());
        self.decisions_this_hour += 1;
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        let now = Instant::now();

        // Mirror check_rate_limit without mutating
        let effective_count = match self.last_decision_time {
            Some(last) if now.duration_since(last) > Duration::from_secs(3600) => 0,
            _ => self.decisions_this_hour,
        };

        let cooled_down = match self.last_decision_time {
            Some(last) => {
                now.duration_since(last)
                    >= Duration::from_secs(self.config.cooldown_minutes as u64 * 60)
            }
            None => true,
        };

        RateLimitStatus {
            decisions_this_hour: effective_count,
            max_decisions_per_hour: self.config.max_decisions_per_hour,
            cooldown_minutes: self.config.cooldown_minutes,
            can_decide_now: effective_count < self.config.max_decisions_per_hour && cooled_down,
        }
    }

    /// Clear the limiter (manual reset or tests).
    pub fn reset_rate_limit(&mut self) {
        self.decisions_this_hour = 0;
        self.last_decision_time = None;
    }
}

/// Fallback confidence: 0.75 base plus 0.05 per confirming indicator.
fn fallback_confidence(data: &CleanedMarketData, is_long: bool) -> f64 {
    let mut confidence: f64 = 0.75;

    if (is_long && data.rsi14 < 40.0) || (!is_long && data.rsi14 > 60.0) {
        confidence += 0.05;
    }

    if (is_long && data.macd > data.macd_signal) || (!is_long && data.macd < data.macd_signal) {
        confidence += 0.05;
    }

    if (is_long && data.current_price > data.ema20)
        || (!is_long && data.current_price < data.ema20)
    {
        confidence += 0.05;
    }

    if data.volume_change > 30.0 {
        confidence += 0.05;
    }

    confidence.min(1.0)
}

/// Truncate a prompt to `max` bytes, appending "..." when cut.
fn truncate_prompt(prompt: String, max: usize) -> String {
    if prompt.len() <= max {
        return prompt;
    }

    let mut cut = max.saturating_sub(3);
    while cut > 0 && !prompt.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut out = prompt[..cut].to_string();
    out.push_str("...");
    out
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

    fn test_config() -> AiLayerConfig {
        AiLayerConfig {
            max_decisions_per_hour: 100,
            cooldown_minutes: 0,
            enable_chain_of_thought: true,
            ..AiLayerConfig::default()
        }
    }

    fn maker(response: Result<String, OracleError>) -> DecisionMaker {
        DecisionMaker::new(test_config(), Arc::new(CannedOracle(response)))
    }

    #[tokio::test]
    async fn test_decision_from_healthy_oracle() {
        // Oracle answers every stage with the same body; stage parsers
        // pick out the fields they recognize
        let body = r#"{"condition":"trending","opportunity":"long_entry","direction":"long","confidence":0.85,"reason":"up","reasoning":"clean uptrend"}"#;
        let mut dm = maker(Ok(body.to_string()));

        let decision = dm.make_decision(&data()).await;
        assert_eq!(decision.direction, Direction::Long);
        assert_eq!(decision.market_condition, MarketCondition::Trending);
        assert_eq!(decision.opportunity, Opportunity::LongEntry);
        assert!((decision.confidence - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_oracle_failure_never_escapes() {
        let mut dm = maker(Err(OracleError::Provider("503".to_string())));
        let decision = dm.make_decision(&data()).await;

        // Technicals resolve to a range with price stretched above EMA50,
        // which maps to a short entry; fallback confidence picks up the
        // RSI and volume confirmations (0.75 + 0.05 + 0.05)
        assert_eq!(decision.market_condition, MarketCondition::Ranging);
        assert_eq!(decision.opportunity, Opportunity::ShortEntry);
        assert_eq!(decision.direction, Direction::Short);
        assert!((decision.confidence - 0.85).abs() < 1e-9);
        assert!(decision.chain_of_thought.contains("rule-based"));
    }

    #[tokio::test]
    async fn test_confidence_clamped_into_band() {
        let body = r#"{"direction":"long","confidence":1.7,"reasoning":"sure"}"#;
        let mut dm = maker(Ok(body.to_string()));
        let decision = dm.make_decision(&data()).await;
        assert!((decision.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_low_confidence_becomes_wait() {
        // 0.7 after clamping, below the 0.75 threshold
        let body = r#"{"direction":"long","confidence":0.6,"reasoning":"meh"}"#;
        let mut dm = maker(Ok(body.to_string()));
        let decision = dm.make_decision(&data()).await;

        assert_eq!(decision.direction, Direction::Wait);
        assert!(decision.chain_of_thought.contains("below threshold"));
    }

    #[tokio::test]
    async fn test_hourly_budget_enforced() {
        let body = r#"{"direction":"long","confidence":0.85,"reasoning":"go"}"#;
        let mut dm = DecisionMaker::new(
            AiLayerConfig {
                max_decisions_per_hour: 2,
                cooldown_minutes: 0,
                ..AiLayerConfig::default()
            },
            Arc::new(CannedOracle(Ok(body.to_string()))),
        );

        let d1 = dm.make_decision(&data()).await;
        let d2 = dm.make_decision(&data()).await;
        let d3 = dm.make_decision(&data()).await;

        assert_ne!(d1.direction, Direction::Wait);
        assert_ne!(d2.direction, Direction::Wait);
        assert_eq!(d3.direction, Direction::Wait);
        assert!(d3.condition_reason.contains("rate limited"));
        assert_eq!(d3.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_cooldown_enforced() {
        let body = r#"{"direction":"long","confidence":0.85,"reasoning":"go"}"#;
        let mut dm = DecisionMaker::new(
            AiLayerConfig {
                max_decisions_per_hour: 100,
                cooldown_minutes: 30,
                ..AiLayerConfig::default()
            },
            Arc::new(CannedOracle(Ok(body.to_string()))),
        );

        let d1 = dm.make_decision(&data()).await;
        assert_ne!(d1.direction, Direction::Wait);

        let d2 = dm.make_decision(&data()).await;
        assert_eq!(d2.direction, Direction::Wait);
        assert!(d2.condition_reason.contains("rate limited"));

        dm.reset_rate_limit();
        let d3 = dm.make_decision(&data()).await;
        assert_ne!(d3.direction, Direction::Wait);
    }

    #[tokio::test]
    async fn test_rate_limited_call_does_not_consume_budget() {
        let body = r#"{"direction":"long","confidence":0.85,"reasoning":"go"}"#;
        let mut dm = DecisionMaker::new(
            AiLayerConfig {
                max_decisions_per_hour: 5,
                cooldown_minutes: 30,
                ..AiLayerConfig::default()
            },
            Arc::new(CannedOracle(Ok(body.to_string()))),
        );

        let _ = dm.make_decision(&data()).await;
        let _ = dm.make_decision(&data()).await; // blocked by cooldown
        assert_eq!(dm.rate_limit_status().decisions_this_hour, 1);
    }

    #[test]
    fn test_truncate_prompt_appends_ellipsis() {
        let out = truncate_prompt("a".repeat(700), 650);
        assert_eq!(out.len(), 650);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_fallback_confidence_scoring() {
        let mut d = data();
        d.rsi14 = 35.0; // aligned for long
        // macd > signal, price > ema20, volume > 30: all aligned
        assert!((fallback_confidence(&d, true) - 0.95).abs() < 1e-9);

        d.volume_change = 10.0;
        assert!((fallback_confidence(&d, true) - 0.90).abs() < 1e-9);
    }
}

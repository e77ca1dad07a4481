//! Secondary pre-dispatch validation.
//!
//! The last line of defense before an order leaves the process. Six
//! independent checks run in order; the first failure wins. Funding-rate
//! extremes only warn.

use serde::Serialize;

use crate::config::ExecutionLayerConfig;
use crate::logger::{self, LogTag};
use crate::types::{
    AiDecision, CleanedMarketData, Direction, ExecutionPlan, Opportunity, RiskLevel, RiskMetrics,
    TradeAction,
};

/// Validation counters.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatorStats {
    pub total_validations: u64,
    pub passed_validations: u64,
    pub failed_validations: u64,
    pub pass_rate: f64,
}

pub struct RiskValidator {
    #[allow(dead_code)]
    config: ExecutionLayerConfig,

    total_validations: u64,
    passed_validations: u64,
    failed_validations: u64,
}

impl RiskValidator {
    pub fn new(config: ExecutionLayerConfig) -> Self {
        Self {
            config,
            total_validations: 0,
            passed_validations: 0,
            failed_validations: 0,
        }
    }

    /// Run all six checks against a draft plan. Returns the pass flag
    /// and a reason (the first failure, or a pass message).
    pub fn validate(
        &mut self,
        plan: &ExecutionPlan,
        decision: &AiDecision,
        risk_metrics: &RiskMetrics,
        market_data: &CleanedMarketData,
    ) -> (bool, String) {
        self.total_validations += 1;

        let checks = [
            check_basic_parameters(plan),
            check_risk_metrics(plan, risk_metrics),
            check_market_data(market_data),
            check_decision_consistency(plan, decision),
            check_stops_and_targets(plan, market_data),
            check_leverage_vs_volatility(plan, market_data),
        ];

        for check in checks {
            if let Err(reason) = check {
                self.failed_validations += 1;
                return (false, reason);
            }
        }

        warn_on_funding_extremes(plan, market_data);

        self.passed_validations += 1;
        (true, "secondary risk check passed".to_string())
    }

    pub fn stats(&self) -> ValidatorStats {
        let pass_rate = if self.total_validations > 0 {
            self.passed_validations as f64 / self.total_validations as f64 * 100.0
        } else {
            0.0
        };

        ValidatorStats {
            total_validations: self.total_validations,
            passed_validations: self.passed_validations,
            failed_validations: self.failed_validations,
            pass_rate,
        }
    }

    pub fn reset_stats(&mut self) {
        self.total_validations = 0;
        self.passed_validations = 0;
        self.failed_validations = 0;
    }
}

/// Check 1: structural sanity of the plan itself.
fn check_basic_parameters(plan: &ExecutionPlan) -> Result<(), String> {
    if plan.symbol.is_empty() {
        return Err("plan has no symbol".to_string());
    }

    if !plan.action.is_executable() {
        return Err(format!("invalid plan action: {}", plan.action));
    }

    if plan.quantity <= 0.0 {
        return Err(format!("invalid quantity: {:.6}", plan.quantity));
    }

    if plan.quantity_usd <= 0.0 {
        return Err(format!("invalid notional: {:.2}", plan.quantity_usd));
    }

    if plan.leverage < 1 || plan.leverage > 20 {
        return Err(format!("leverage out of range: {}", plan.leverage));
    }

    Ok(())
}

/// Check 2: the plan must stay inside the risk layer's envelope.
fn check_risk_metrics(plan: &ExecutionPlan, metrics: &RiskMetrics) -> Result<(), String> {
    if !metrics.can_trade {
        return Err(format!("risk metrics forbid trading: {}", metrics.risk_reason));
    }

    if metrics.risk_level == RiskLevel::Extreme {
        return Err("risk level extreme".to_string());
    }

    // 10% headroom over the recommended size
    if plan.quantity_usd > metrics.max_position_size_usd * 1.1 {
        return Err(format!(
            "notional exceeds recommendation: {:.2} > {:.2}",
            plan.quantity_usd, metrics.max_position_size_usd
        ));
    }

    if plan.leverage > metrics.recommended_leverage + 1 {
        return Err(format!(
            "leverage exceeds recommendation: {} > {}",
            plan.leverage, metrics.recommended_leverage
        ));
    }

    Ok(())
}

/// Check 3: the market data backing the plan must still be trustworthy.
fn check_market_data(data: &CleanedMarketData) -> Result<(), String> {
    if !data.is_valid {
        return Err("market data failed the quality gate".to_string());
    }

    if data.data_quality < 0.8 {
        return Err(format!("data quality too low: {:.2}", data.data_quality));
    }

    if data.current_price <= 0.0 {
        return Err("current price invalid".to_string());
    }

    if data.price_change_1h.abs() > 20.0 {
        return Err(format!(
            "abnormal 1h price move: {:.2}%",
            data.price_change_1h
        ));
    }

    Ok(())
}

/// Check 4: the plan must agree with the decision that spawned it.
fn check_decision_consistency(plan: &ExecutionPlan, decision: &AiDecision) -> Result<(), String> {
    let expected_action = match decision.direction {
        Direction::Long => TradeAction::OpenLong,
        Direction::Short => TradeAction::OpenShort,
        Direction::Wait => TradeAction::Wait,
    };

    if plan.action != expected_action {
        return Err(format!(
            "plan action disagrees with decision: {} != {}",
            plan.action, expected_action
        ));
    }

    if decision.confidence < 0.7 {
        return Err(format!("confidence too low: {:.2}", decision.confidence));
    }

    if decision.opportunity == Opportunity::None && plan.action != TradeAction::Wait {
        return Err("no opportunity identified but plan wants to trade".to_string());
    }

    Ok(())
}

/// Check 5: stops and targets must sit on the correct side of price and
/// the stop distance must be within [0.5%, 10%].
fn check_stops_and_targets(plan: &ExecutionPlan, data: &CleanedMarketData) -> Result<(), String> {
    let price = data.current_price;

    if plan.action == TradeAction::OpenLong {
        if plan.stop_loss >= price {
            return Err(format!(
                "invalid long stop: {:.2} >= {:.2}",
                plan.stop_loss, price
            ));
        }

        if plan.take_profit > 0.0 && plan.take_profit <= price {
            return Err(format!(
                "invalid long target: {:.2} <= {:.2}",
                plan.take_profit, price
            ));
        }

        let stop_percent = (price - plan.stop_loss) / price * 100.0;
        if stop_percent > 10.0 {
            return Err(format!("stop distance too wide: {:.2}%", stop_percent));
        }
        if stop_percent < 0.5 {
            return Err(format!("stop distance too tight: {:.2}%", stop_percent));
        }
    }

    if plan.action == TradeAction::OpenShort {
        if plan.stop_loss <= price {
            return Err(format!(
                "invalid short stop: {:.2} <= {:.2}",
                plan.stop_loss, price
            ));
        }

        if plan.take_profit > 0.0 && plan.take_profit >= price {
            return Err(format!(
                "invalid short target: {:.2} >= {:.2}",
                plan.take_profit, price
            ));
        }

        let stop_percent = (plan.stop_loss - price) / price * 100.0;
        if stop_percent > 10.0 {
            return Err(format!("stop distance too wide: {:.2}%", stop_percent));
        }
        if stop_percent < 0.5 {
            return Err(format!("stop distance too tight: {:.2}%", stop_percent));
        }
    }

    Ok(())
}

/// Check 6: leverage must respect volatility, and stretched RSI blocks
/// entries in the stretched direction.
fn check_leverage_vs_volatility(
    plan: &ExecutionPlan,
    data: &CleanedMarketData,
) -> Result<(), String> {
    if data.atr > 0.0 && data.current_price > 0.0 {
        let volatility = data.atr / data.current_price * 100.0;
        if volatility > 5.0 && plan.leverage > 3 {
            return Err(format!(
                "high volatility ({:.2}%) with excessive leverage: {}",
                volatility, plan.leverage
            ));
        }
    }

    if data.rsi14 > 80.0 && plan.action == TradeAction::OpenLong {
        return Err("RSI severely overbought, long entry blocked".to_string());
    }

    if data.rsi14 < 20.0 && plan.action == TradeAction::OpenShort {
        return Err("RSI severely oversold, short entry blocked".to_string());
    }

    Ok(())
}

/// Funding-rate extremes raise the carry cost of the position but are
/// not grounds for a block.
fn warn_on_funding_extremes(plan: &ExecutionPlan, data: &CleanedMarketData) {
    if data.funding_rate > 0.01 && plan.action == TradeAction::OpenLong {
        logger::warning(
            LogTag::Validator,
            &format!(
                "{}: funding rate {:.4}% makes longs expensive to carry",
                plan.symbol,
                data.funding_rate * 100.0
            ),
        );
    }

    if data.funding_rate < -0.01 && plan.action == TradeAction::OpenShort {
        logger::warning(
            LogTag::Validator,
            &format!(
                "{}: funding rate {:.4}% makes shorts expensive to carry",
                plan.symbol,
                data.funding_rate * 100.0
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketCondition, Priority};
    use chrono::Utc;

    fn market_data() -> CleanedMarketData {
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
            compressed_summary: String::new(),
        }
    }

    fn metrics() -> RiskMetrics {
        RiskMetrics {
            symbol: "BTCUSDT".to_string(),
            max_position_size_usd: 200.0,
            recommended_leverage: 3,
            stop_loss_price: 44_500.0,
            take_profit_price: 46_000.0,
            max_loss_usd: 2.2,
            required_margin: 66.7,
            margin_usage_percent: 20.7,
            risk_level: RiskLevel::Medium,
            can_trade: true,
            risk_reason: "risk checks passed".to_string(),
        }
    }

    fn decision() -> AiDecision {
        AiDecision {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            market_condition: MarketCondition::Trending,
            condition_reason: String::new(),
            opportunity: crate::types::Opportunity::LongEntry,
            opportunity_reason: String::new(),
            direction: Direction::Long,
            confidence: 0.85,
            chain_of_thought: String::new(),
            model_used: "test".to_string(),
            response_time_ms: 5,
        }
    }

    fn plan() -> ExecutionPlan {
        ExecutionPlan {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            action: TradeAction::OpenLong,
            quantity: 150.0 / 45_000.0,
            quantity_usd: 150.0,
            leverage: 3,
            stop_loss: 44_500.0,
            take_profit: 46_000.0,
            max_slippage_percent: 0.5,
            timeout_seconds: 30,
            risk_check_passed: false,
            risk_check_reason: String::new(),
            priority: Priority::Normal,
            source_decision: None,
        }
    }

    fn validator() -> RiskValidator {
        RiskValidator::new(ExecutionLayerConfig::default())
    }

    #[test]
    fn test_clean_plan_passes() {
        let mut v = validator();
        let (passed, reason) = v.validate(&plan(), &decision(), &metrics(), &market_data());
        assert!(passed, "{}", reason);

        let stats = v.stats();
        assert_eq!(stats.total_validations, 1);
        assert_eq!(stats.passed_validations, 1);
        assert_eq!(stats.pass_rate, 100.0);
    }

    #[test]
    fn test_rejects_zero_quantity() {
        let mut v = validator();
        let mut p = plan();
        p.quantity = 0.0;
        let (passed, reason) = v.validate(&p, &decision(), &metrics(), &market_data());
        assert!(!passed);
        assert!(reason.contains("quantity"));
    }

    #[test]
    fn test_rejects_oversized_notional() {
        let mut v = validator();
        let mut p = plan();
        p.quantity_usd = 250.0; // over 200 * 1.1
        let (passed, reason) = v.validate(&p, &decision(), &metrics(), &market_data());
        assert!(!passed);
        assert!(reason.contains("notional"));
    }

    #[test]
    fn test_allows_ten_percent_headroom() {
        let mut v = validator();
        let mut p = plan();
        p.quantity_usd = 215.0; // within 200 * 1.1
        let (passed, _) = v.validate(&p, &decision(), &metrics(), &market_data());
        assert!(passed);
    }

    #[test]
    fn test_rejects_excess_leverage() {
        let mut v = validator();
        let mut p = plan();
        p.leverage = 5; // recommended 3, +1 headroom allows 4
        let (passed, reason) = v.validate(&p, &decision(), &metrics(), &market_data());
        assert!(!passed);
        assert!(reason.contains("leverage"));
    }

    #[test]
    fn test_rejects_forbidden_metrics() {
        let mut v = validator();
        let mut m = metrics();
        m.can_trade = false;
        m.risk_reason = "circuit breaker active".to_string();
        let (passed, reason) = v.validate(&plan(), &decision(), &m, &market_data());
        assert!(!passed);
        assert!(reason.contains("circuit breaker"));
    }

    #[test]
    fn test_rejects_degraded_data() {
        let mut v = validator();
        let mut d = market_data();
        d.data_quality = 0.7;
        d.is_valid = false;
        let (passed, _) = v.validate(&plan(), &decision(), &metrics(), &d);
        assert!(!passed);
    }

    #[test]
    fn test_rejects_abnormal_price_move() {
        let mut v = validator();
        let mut d = market_data();
        d.price_change_1h = -25.0;
        let (passed, reason) = v.validate(&plan(), &decision(), &metrics(), &d);
        assert!(!passed);
        assert!(reason.contains("1h"));
    }

    #[test]
    fn test_rejects_direction_mismatch() {
        let mut v = validator();
        let mut p = plan();
        p.action = TradeAction::OpenShort;
        let (passed, reason) = v.validate(&p, &decision(), &metrics(), &market_data());
        assert!(!passed);
        assert!(reason.contains("disagrees"));
    }

    #[test]
    fn test_rejects_trade_without_opportunity() {
        let mut v = validator();
        let mut d = decision();
        d.opportunity = crate::types::Opportunity::None;
        let (passed, reason) = v.validate(&plan(), &d, &metrics(), &market_data());
        assert!(!passed);
        assert!(reason.contains("opportunity"));
    }

    #[test]
    fn test_rejects_long_stop_above_price() {
        let mut v = validator();
        let mut p = plan();
        p.stop_loss = 46_000.0;
        let (passed, reason) = v.validate(&p, &decision(), &metrics(), &market_data());
        assert!(!passed);
        assert!(reason.contains("invalid long stop"));
    }

    #[test]
    fn test_rejects_stop_distance_out_of_band() {
        let mut v = validator();

        let mut tight = plan();
        tight.stop_loss = 44_900.0; // 0.22%
        let (passed, reason) = v.validate(&tight, &decision(), &metrics(), &market_data());
        assert!(!passed);
        assert!(reason.contains("tight"));

        let mut wide = plan();
        wide.stop_loss = 40_000.0; // 11.1%
        let (passed, reason) = v.validate(&wide, &decision(), &metrics(), &market_data());
        assert!(!passed);
        assert!(reason.contains("wide"));
    }

    #[test]
    fn test_rejects_high_leverage_in_high_volatility() {
        let mut v = validator();
        let mut d = market_data();
        d.atr = 3_000.0; // 6.67%

        let mut m = metrics();
        m.recommended_leverage = 5;

        let mut p = plan();
        p.leverage = 5;
        p.stop_loss = 42_000.0; // keep the stop inside the 10% band

        let (passed, reason) = v.validate(&p, &decision(), &m, &d);
        assert!(!passed);
        assert!(reason.contains("volatility"));
        assert!(reason.contains("leverage"));
    }

    #[test]
    fn test_rsi_extremes_block_entries() {
        let mut v = validator();

        let mut overbought = market_data();
        overbought.rsi14 = 85.0;
        let (passed, reason) = v.validate(&plan(), &decision(), &metrics(), &overbought);
        assert!(!passed);
        assert!(reason.contains("overbought"));

        let mut oversold = market_data();
        oversold.rsi14 = 15.0;
        let mut short_plan = plan();
        short_plan.action = TradeAction::OpenShort;
        short_plan.stop_loss = 45_500.0;
        short_plan.take_profit = 44_000.0;
        let mut short_decision = decision();
        short_decision.direction = Direction::Short;
        short_decision.opportunity = crate::types::Opportunity::ShortEntry;
        let (passed, reason) = v.validate(&short_plan, &short_decision, &metrics(), &oversold);
        assert!(!passed);
        assert!(reason.contains("oversold"));
    }

    #[test]
    fn test_funding_extreme_warns_but_passes() {
        let mut v = validator();
        let mut d = market_data();
        d.funding_rate = 0.02;
        let (passed, _) = v.validate(&plan(), &decision(), &metrics(), &d);
        assert!(passed);
    }

    #[test]
    fn test_stats_accumulate_and_reset() {
        let mut v = validator();
        let _ = v.validate(&plan(), &decision(), &metrics(), &market_data());

        let mut bad = plan();
        bad.quantity = -1.0;
        let _ = v.validate(&bad, &decision(), &metrics(), &market_data());

        let stats = v.stats();
        assert_eq!(stats.total_validations, 2);
        assert_eq!(stats.passed_validations, 1);
        assert_eq!(stats.failed_validations, 1);

        v.reset_stats();
        assert_eq!(v.stats().total_validations, 0);
    }
}

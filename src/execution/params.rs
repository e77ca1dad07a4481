//! Parameter calculation: abstract signal in, concrete order shape out.
//!
//! Takes the AI decision plus the risk metrics and produces quantities,
//! leverage, stops and priority. A post-compute hook re-scales the result
//! for the assessed risk level.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{ExecutionLayerConfig, SizingMethod};
use crate::types::{
    AiDecision, CleanedMarketData, Direction, MarketCondition, Priority, RiskLevel, RiskMetrics,
    TradeAction,
};

/// Assumed payoff ratio for the Kelly sizing criterion.
const KELLY_PAYOFF_RATIO: f64 = 2.0;
/// Quarter-Kelly cap on the computed fraction.
const KELLY_FRACTION_CAP: f64 = 0.25;

/// Concrete order parameters before plan assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderParameters {
    pub action: TradeAction,
    pub quantity: f64,
    pub quantity_usd: f64,
    pub leverage: u32,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub max_slippage_percent: f64,
    pub timeout_seconds: u32,
    pub priority: Priority,
}

/// Converts decisions into order parameters.
pub struct ParameterCalculator {
    config: ExecutionLayerConfig,
}

impl ParameterCalculator {
    pub fn new(config: ExecutionLayerConfig) -> Self {
        Self { config }
    }

    /// Compute order parameters for one decision.
    pub fn compute(
        &self,
        decision: &AiDecision,
        risk_metrics: &RiskMetrics,
        market_data: &CleanedMarketData,
    ) -> Result<OrderParameters> {
        if decision.symbol.is_empty() {
            anyhow::bail!("decision has no symbol");
        }

        let action = match decision.direction {
            Direction::Long => TradeAction::OpenLong,
            Direction::Short => TradeAction::OpenShort,
            Direction::Wait => TradeAction::Wait,
        };

        let (quantity, quantity_usd) = self.position_size(decision, risk_metrics, market_data);

        Ok(OrderParameters {
            action,
            quantity,
            quantity_usd,
            leverage: self.leverage(decision, risk_metrics),
            stop_loss: self.stop_loss(decision, risk_metrics),
            take_profit: self.take_profit(decision, risk_metrics, market_data),
            max_slippage_percent: self.config.max_slippage_percent,
            timeout_seconds: self.config.order_timeout_seconds,
            priority: priority_for(decision),
        })
    }

    /// Base size comes from the risk metrics; the multiplier comes from
    /// confidence or from the configured sizing method.
    fn position_size(
        &self,
        decision: &AiDecision,
        risk_metrics: &RiskMetrics,
        market_data: &CleanedMarketData,
    ) -> (f64, f64) {
        let base_usd = risk_metrics.max_position_size_usd;

        // Linear confidence map: 0.7 -> 50%, 1.0 -> 100%
        let confidence_multiplier = if decision.confidence < 0.7 {
            0.5
        } else if decision.confidence > 1.0 {
            1.0
        } else {
            (decision.confidence - 0.7) / 0.3 * 0.5 + 0.5
        };

        let mut adjusted_usd = base_usd * confidence_multiplier;

        if self.config.enable_position_sizing {
            match self.config.position_sizing_method {
                SizingMethod::Fixed => {
                    adjusted_usd = base_usd * 0.5;
                }
                SizingMethod::Kelly => {
                    // f = (b*p - q) / b with the payoff ratio as b and the
                    // confidence standing in for the win rate
                    let win_rate = decision.confidence;
                    let loss_rate = 1.0 - win_rate;
                    let kelly = ((KELLY_PAYOFF_RATIO * win_rate - loss_rate) / KELLY_PAYOFF_RATIO)
                        .clamp(0.0, KELLY_FRACTION_CAP);
                    adjusted_usd = base_usd * kelly / KELLY_FRACTION_CAP;
                }
                SizingMethod::Volatility => {
                    if market_data.atr > 0.0 && market_data.current_price > 0.0 {
                        let volatility = market_data.atr / market_data.current_price;
                        adjusted_usd = base_usd / (1.0 + volatility * 10.0);
                    }
                }
            }
        }

        let quantity = if market_data.current_price > 0.0 {
            adjusted_usd / market_data.current_price
        } else {
            0.0
        };

        (quantity, adjusted_usd)
    }

    fn leverage(&self, decision: &AiDecision, risk_metrics: &RiskMetrics) -> u32 {
        let mut leverage = risk_metrics.recommended_leverage;

        if decision.confidence < 0.8 {
            leverage = leverage.saturating_sub(1);
        }

        if decision.market_condition == MarketCondition::Volatile {
            leverage = leverage.saturating_sub(1);
        }

        leverage.max(1)
    }

    /// Stop from the risk metrics, widened outward by 2% in volatile
    /// conditions.
    fn stop_loss(&self, decision: &AiDecision, risk_metrics: &RiskMetrics) -> f64 {
        let mut stop_loss = risk_metrics.stop_loss_price;

        if decision.market_condition == MarketCondition::Volatile {
            match decision.direction {
                Direction::Long => stop_loss *= 0.98,
                Direction::Short => stop_loss *= 1.02,
                Direction::Wait => {}
            }
        }

        stop_loss
    }

    /// Target from the risk metrics; very high confidence stretches it
    /// to a 2.5x multiple of the stop distance.
    fn take_profit(
        &self,
        decision: &AiDecision,
        risk_metrics: &RiskMetrics,
        market_data: &CleanedMarketData,
    ) -> f64 {
        let mut take_profit = risk_metrics.take_profit_price;

        if decision.confidence > 0.9 {
            match decision.direction {
                Direction::Long => {
                    let risk = market_data.current_price - risk_metrics.stop_loss_price;
                    take_profit = market_data.current_price + risk * 2.5;
                }
                Direction::Short => {
                    let risk = risk_metrics.stop_loss_price - market_data.current_price;
                    take_profit = market_data.current_price - risk * 2.5;
                }
                Direction::Wait => {}
            }
        }

        take_profit
    }

    /// Re-scale computed parameters for the assessed risk level. Returns
    /// an adjusted copy; the input stays untouched.
    pub fn adjust_for_risk(
        &self,
        params: &OrderParameters,
        risk_level: RiskLevel,
    ) -> OrderParameters {
        let mut adjusted = params.clone();

        match risk_level {
            RiskLevel::Extreme => {
                adjusted.action = TradeAction::Wait;
            }
            RiskLevel::High => {
                adjusted.quantity *= 0.5;
                adjusted.quantity_usd *= 0.5;
                adjusted.leverage = adjusted.leverage.saturating_sub(1).max(1);
            }
            RiskLevel::Medium => {
                adjusted.quantity *= 0.8;
                adjusted.quantity_usd *= 0.8;
            }
            RiskLevel::Low => {}
        }

        adjusted
    }
}

fn priority_for(decision: &AiDecision) -> Priority {
    if decision.confidence >= 0.9
        && matches!(
            decision.market_condition,
            MarketCondition::Breakout | MarketCondition::Trending
        )
    {
        return Priority::High;
    }

    if decision.confidence >= 0.75 {
        return Priority::Normal;
    }

    Priority::Low
}

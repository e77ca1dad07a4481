//! Risk layer: position sizing, stops/targets and account-level circuit
//! breakers.
//!
//! The calculator owns the mutable account view (balances, daily PnL,
//! loss streak, breaker flag). All mutation happens from the orchestrator
//! that owns the calculator; nothing here is shared across threads.

use anyhow::Result;
use serde::Serialize;

use crate::config::DataLayerConfig;
use crate::logger::{self, LogTag};
use crate::types::{CleanedMarketData, Direction, RiskLevel, RiskMetrics};

/// Assumed stop distance when translating risk budget into notional.
const SIZING_STOP_FRACTION: f64 = 0.02;

/// Snapshot of the circuit-breaker state.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub active: bool,
    pub daily_pnl: f64,
    pub daily_pnl_percent: f64,
    pub consecutive_losses: u32,
    pub max_daily_loss_percent: f64,
    pub max_consecutive_losses: u32,
}

/// Snapshot of the account risk state.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRiskSummary {
    pub total_balance: f64,
    pub available_balance: f64,
    pub used_margin: f64,
    pub margin_usage_percent: f64,
    pub daily_pnl: f64,
    pub historical_high_equity: f64,
    pub consecutive_losses: u32,
    pub circuit_breaker_active: bool,
}

/// Computes per-trade risk metrics and enforces account-level guards.
pub struct RiskCalculator {
    config: DataLayerConfig,

    total_balance: f64,
    available_balance: f64,
    used_margin: f64,

    daily_pnl: f64,
    historical_high_equity: f64,
    consecutive_losses: u32,
    circuit_breaker_active: bool,
}

impl RiskCalculator {
    pub fn new(config: DataLayerConfig) -> Self {
        Self {
            config,
            total_balance: 0.0,
            available_balance: 0.0,
            used_margin: 0.0,
            daily_pnl: 0.0,
            historical_high_equity: 0.0,
            consecutive_losses: 0,
            circuit_breaker_active: false,
        }
    }

    /// Refresh the account view from an exchange balance snapshot.
    pub fn update_account(&mut self, total: f64, available: f64, used_margin: f64) {
        self.total_balance = total;
        self.available_balance = available;
        self.used_margin = used_margin;

        if total > self.historical_high_equity {
            self.historical_high_equity = total;
        }
    }

    /// Record the running daily PnL. Trips the breaker when the loss
    /// exceeds the configured share of equity.
    pub fn update_daily_pnl(&mut self, pnl: f64) {
        self.daily_pnl = pnl;

        if self.config.circuit_breaker_enabled {
            let max_loss = self.total_balance * self.config.max_daily_loss_percent / 100.0;
            if self.daily_pnl < -max_loss {
                if !self.circuit_breaker_active {
                    logger::warning(
                        LogTag::Risk,
                        &format!(
                            "circuit breaker tripped: daily PnL {:.2} below -{:.2}",
                            self.daily_pnl, max_loss
                        ),
                    );
                }
                self.circuit_breaker_active = true;
            }
        }
    }

    /// Record a trade outcome. A win resets the loss streak; a loss
    /// advances it and may trip the breaker.
    pub fn record_trade(&mut self, win: bool) {
        if win {
            self.consecutive_losses = 0;
            return;
        }

        self.consecutive_losses += 1;

        if self.config.circuit_breaker_enabled
            && self.consecutive_losses >= self.config.max_consecutive_losses
        {
            if !self.circuit_breaker_active {
                logger::warning(
                    LogTag::Risk,
                    &format!(
                        "circuit breaker tripped: {} consecutive losses",
                        self.consecutive_losses
                    ),
                );
            }
            self.circuit_breaker_active = true;
        }
    }

    /// Manual (or daily) breaker reset. Clears the streak and daily PnL.
    pub fn reset_circuit_breaker(&mut self) {
        self.circuit_breaker_active = false;
        self.consecutive_losses = 0;
        self.daily_pnl = 0.0;
        logger::info(LogTag::Risk, "circuit breaker reset");
    }

    pub fn is_circuit_breaker_active(&self) -> bool {
        self.circuit_breaker_active
    }

    /// Compute risk metrics for a proposed direction.
    pub fn compute_metrics(
        &self,
        direction: Direction,
        market_data: &CleanedMarketData,
    ) -> Result<RiskMetrics> {
        if market_data.symbol.is_empty() {
            anyhow::bail!("market data has no symbol");
        }

        let mut metrics = RiskMetrics {
            symbol: market_data.symbol.clone(),
            max_position_size_usd: 0.0,
            recommended_leverage: 0,
            stop_loss_price: 0.0,
            take_profit_price: 0.0,
            max_loss_usd: 0.0,
            required_margin: 0.0,
            margin_usage_percent: 0.0,
            risk_level: RiskLevel::Low,
            can_trade: false,
            risk_reason: String::new(),
        };

        if self.circuit_breaker_active {
            metrics.risk_level = RiskLevel::Extreme;
            metrics.risk_reason = format!(
                "circuit breaker active: daily loss {:.2}%, {} consecutive losses",
                self.daily_loss_percent(),
                self.consecutive_losses
            );
            return Ok(metrics);
        }

        if self.total_balance <= 0.0 || self.available_balance <= 0.0 {
            metrics.risk_level = RiskLevel::Extreme;
            metrics.risk_reason = "insufficient balance".to_string();
            return Ok(metrics);
        }

        // Position budget: the single-trade risk allowance translated
        // through the sizing stop assumption, capped at the account-level
        // risk allowance.
        let single_trade_risk =
            self.total_balance * self.config.max_single_trade_risk_percent / 100.0;
        let account_risk_cap = self.total_balance * self.config.max_account_risk_percent / 100.0;
        metrics.max_position_size_usd =
            (single_trade_risk / SIZING_STOP_FRACTION).min(account_risk_cap);

        metrics.recommended_leverage = self.recommend_leverage(market_data);

        match direction {
            Direction::Long => {
                metrics.stop_loss_price = long_stop_loss(market_data);
                metrics.take_profit_price = long_take_profit(market_data);
            }
            Direction::Short => {
                metrics.stop_loss_price = short_stop_loss(market_data);
                metrics.take_profit_price = short_take_profit(market_data);
            }
            Direction::Wait => {}
        }

        if metrics.stop_loss_price > 0.0 && market_data.current_price > 0.0 {
            let price_diff = (market_data.current_price - metrics.stop_loss_price).abs();
            metrics.max_loss_usd =
                price_diff / market_data.current_price * metrics.max_position_size_usd;
        }

        metrics.required_margin =
            metrics.max_position_size_usd / metrics.recommended_leverage.max(1) as f64;
        metrics.margin_usage_percent =
            (self.used_margin + metrics.required_margin) / self.total_balance * 100.0;

        metrics.risk_level = self.assess_risk_level(&metrics);

        let (can_trade, reason) = self.can_trade(&metrics);
        metrics.can_trade = can_trade;
        metrics.risk_reason = reason;

        Ok(metrics)
    }

    /// Leverage recommendation: start at the configured default and back
    /// off on volatility and stretched RSI.
    fn recommend_leverage(&self, data: &CleanedMarketData) -> u32 {
        let mut leverage = self.config.default_leverage;

        if data.atr > 0.0 && data.current_price > 0.0 {
            let volatility = data.atr / data.current_price * 100.0;
            if volatility >= 5.0 {
                leverage = leverage.saturating_sub(2);
            } else if volatility >= 3.0 {
                leverage = leverage.saturating_sub(1);
            }
        }

        if data.rsi14 <= 30.0 || data.rsi14 >= 70.0 {
            leverage = leverage.saturating_sub(1);
        }

        leverage.clamp(1, self.config.max_leverage)
    }

    fn assess_risk_level(&self, metrics: &RiskMetrics) -> RiskLevel {
        let mut score = 0u32;

        if metrics.margin_usage_percent > 80.0 {
            score += 3;
        } else if metrics.margin_usage_percent > 60.0 {
            score += 2;
        } else if metrics.margin_usage_percent > 40.0 {
            score += 1;
        }

        if metrics.recommended_leverage >= 5 {
            score += 2;
        } else if metrics.recommended_leverage >= 3 {
            score += 1;
        }

        if self.total_balance > 0.0 {
            let loss_percent = metrics.max_loss_usd / self.total_balance * 100.0;
            if loss_percent > 2.0 {
                score += 2;
            } else if loss_percent > 1.0 {
                score += 1;
            }
        }

        if self.consecutive_losses >= 2 {
            score += 1;
        }

        match score {
            s if s >= 5 => RiskLevel::Extreme,
            s if s >= 3 => RiskLevel::High,
            s if s >= 1 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    fn can_trade(&self, metrics: &RiskMetrics) -> (bool, String) {
        if self.circuit_breaker_active {
            return (false, "circuit breaker active".to_string());
        }

        if self.available_balance < metrics.required_margin {
            return (
                false,
                format!(
                    "available balance too low: need {:.2}, have {:.2}",
                    metrics.required_margin, self.available_balance
                ),
            );
        }

        if metrics.margin_usage_percent > 90.0 {
            return (
                false,
                format!("margin usage too high: {:.1}%", metrics.margin_usage_percent),
            );
        }

        if metrics.risk_level == RiskLevel::Extreme {
            return (false, "risk level extreme".to_string());
        }

        if metrics.stop_loss_price <= 0.0 {
            return (false, "invalid stop loss price".to_string());
        }

        (true, "risk checks passed".to_string())
    }

    fn daily_loss_percent(&self) -> f64 {
        if self.total_balance > 0.0 {
            -self.daily_pnl / self.total_balance * 100.0
        } else {
            0.0
        }
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        BreakerStatus {
            active: self.circuit_breaker_active,
            daily_pnl: self.daily_pnl,
            daily_pnl_percent: if self.total_balance > 0.0 {
                self.daily_pnl / self.total_balance * 100.0
            } else {
                0.0
            },
            consecutive_losses: self.consecutive_losses,
            max_daily_loss_percent: self.config.max_daily_loss_percent,
            max_consecutive_losses: self.config.max_consecutive_losses,
        }
    }

    pub fn account_summary(&self) -> AccountRiskSummary {
        AccountRiskSummary {
            total_balance: self.total_balance,
            available_balance: self.available_balance,
            used_margin: self.used_margin,
            margin_usage_percent: if self.total_balance > 0.0 {
                self.used_margin / self.total_balance * 100.0
            } else {
                0.0
            },
            daily_pnl: self.daily_pnl,
            historical_high_equity: self.historical_high_equity,
            consecutive_losses: self.consecutive_losses,
            circuit_breaker_active: self.circuit_breaker_active,
        }
    }
}

/// Long stop: two ATRs below price, or -2% when ATR is unavailable.
fn long_stop_loss(data: &CleanedMarketData) -> f64 {
    if data.atr > 0.0 {
        data.current_price - data.atr * 2.0
    } else {
        data.current_price * 0.98
    }
}

/// Long target at a 1:2 risk:reward from the stop.
fn long_take_profit(data: &CleanedMarketData) -> f64 {
    let risk = data.current_price - long_stop_loss(data);
    data.current_price + risk * 2.0
}

fn short_stop_loss(data: &CleanedMarketData) -> f64 {
    if data.atr > 0.0 {
        data.current_price + data.atr * 2.0
    } else {
        data.current_price * 1.02
    }
}

fn short_take_profit(data: &CleanedMarketData) -> f64 {
    let risk = short_stop_loss(data) - data.current_price;
    data.current_price - risk * 2.0
}

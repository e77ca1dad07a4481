//! Orchestrator: sequences the three layers into one trading cycle.
//!
//! One `execute_cycle` call runs data cleaning, the account refresh, the
//! AI decision, risk sizing, parameter calculation, secondary validation
//! and dispatch, in that order. Later stages never loop back; any stage
//! can end the cycle. Soft rejections end a successful cycle with a
//! descriptive message; only fatal input, account and dispatch problems
//! are reported as errors.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ai::{DecisionMaker, Oracle, RateLimitStatus};
use crate::config::PipelineConfig;
use crate::data::DataProcessor;
use crate::exchange::Exchange;
use crate::execution::{OrderSender, ParameterCalculator, RiskValidator, ValidatorStats};
use crate::logger::{self, LogTag};
use crate::market::MarketSnapshot;
use crate::risk::{AccountRiskSummary, BreakerStatus, RiskCalculator};
use crate::types::{
    AiDecision, CleanedMarketData, Direction, ExecutionPlan, OrderResult, RiskMetrics,
};

/// Progression of one cycle through the pipeline. Aborts are terminal
/// transitions to `Done` from whatever stage the cycle reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Data,
    RiskPrecheck,
    Decision,
    RiskSizing,
    Params,
    Validation,
    Dispatch,
    Done,
}

/// Everything one cycle produced, including intermediate artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,

    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub stage_reached: CycleStage,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_data: Option<CleanedMarketData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_decision: Option<AiDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_metrics: Option<RiskMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_plan: Option<ExecutionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_result: Option<OrderResult>,
}

impl CycleResult {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            started_at: Utc::now(),
            duration_ms: 0,
            success: false,
            message: String::new(),
            error: None,
            stage_reached: CycleStage::Data,
            cleaned_data: None,
            ai_decision: None,
            risk_metrics: None,
            execution_plan: None,
            order_result: None,
        }
    }

    /// One-line rendering for the log channel.
    pub fn summary(&self) -> String {
        let status = if self.success { "ok" } else { "failed" };
        let mut summary = format!("{} | {} | {}ms", status, self.symbol, self.duration_ms);

        if let Some(decision) = &self.ai_decision {
            summary.push_str(&format!(
                " | decision: {} ({:.2})",
                decision.direction, decision.confidence
            ));
        }

        if let Some(order) = &self.order_result {
            if order.success {
                summary.push_str(&format!(" | order: {}", order.order_id));
            }
        }

        if let Some(error) = &self.error {
            summary.push_str(&format!(" | error: {}", error));
        } else if !self.message.is_empty() {
            summary.push_str(&format!(" | {}", self.message));
        }

        summary
    }
}

/// Cumulative orchestrator statistics.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub total_executions: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub rejected_by_risk: u64,
    pub win_rate: f64,

    pub circuit_breaker: BreakerStatus,
    pub account_risk: AccountRiskSummary,
    pub validation: ValidatorStats,
    pub rate_limit: RateLimitStatus,
}

/// Owns one symbol's pipeline and all of its mutable state. Run one
/// orchestrator per symbol; instances share nothing.
pub struct Orchestrator {
    config: PipelineConfig,

    data_processor: DataProcessor,
    risk_calculator: RiskCalculator,
    decision_maker: DecisionMaker,
    param_calculator: ParameterCalculator,
    risk_validator: RiskValidator,
    order_sender: OrderSender,
    exchange: Arc<dyn Exchange>,

    total_executions: u64,
    successful_trades: u64,
    failed_trades: u64,
    rejected_by_risk: u64,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        oracle: Arc<dyn Oracle>,
        exchange: Arc<dyn Exchange>,
    ) -> Self {
        let data_processor = DataProcessor::new(config.data_layer.clone());
        let risk_calculator = RiskCalculator::new(config.data_layer.clone());
        let decision_maker = DecisionMaker::new(config.ai_layer.clone(), oracle);
        let param_calculator = ParameterCalculator::new(config.execution_layer.clone());
        let risk_validator = RiskValidator::new(config.execution_layer.clone());
        let order_sender = OrderSender::new(config.execution_layer.clone(), exchange.clone());

        Self {
            config,
            data_processor,
            risk_calculator,
            decision_maker,
            param_calculator,
            risk_validator,
            order_sender,
            exchange,
            total_executions: 0,
            successful_trades: 0,
            failed_trades: 0,
            rejected_by_risk: 0,
        }
    }

    /// Run one full trading cycle for one raw snapshot.
    pub async fn execute_cycle(&mut self, raw: &MarketSnapshot) -> CycleResult {
        self.total_executions += 1;
        let started = Instant::now();

        let mut result = CycleResult::new(&raw.symbol);
        logger::info(LogTag::Orchestrator, &format!("cycle start: {}", raw.symbol));

        // Stage 1: data cleaning
        result.stage_reached = CycleStage::Data;
        let cleaned = match self.data_processor.process(raw) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                return self.finish_error(result, started, format!("data processing failed: {}", e))
            }
        };
        result.cleaned_data = Some(cleaned.clone());

        if !cleaned.is_valid {
            self.rejected_by_risk += 1;
            result.message = format!(
                "rejected: data quality {:.2} below threshold {:.2}",
                cleaned.data_quality, self.config.data_layer.min_data_quality
            );
            return self.finish_soft(result, started);
        }

        // Stage 2: account refresh
        result.stage_reached = CycleStage::RiskPrecheck;
        let balance = match self.exchange.get_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                return self.finish_error(result, started, format!("account fetch failed: {}", e))
            }
        };
        self.risk_calculator
            .update_account(balance.total, balance.available, balance.used_margin);

        // Stage 3: AI decision
        result.stage_reached = CycleStage::Decision;
        let decision = self.decision_maker.make_decision(&cleaned).await;
        logger::info(
            LogTag::Orchestrator,
            &format!(
                "{}: {} / {} -> {} ({:.2}) in {}ms",
                decision.symbol,
                decision.market_condition,
                decision.opportunity,
                decision.direction,
                decision.confidence,
                decision.response_time_ms
            ),
        );
        result.ai_decision = Some(decision.clone());

        if decision.direction == Direction::Wait {
            result.message = "decision is wait, no trade this cycle".to_string();
            return self.finish_soft(result, started);
        }

        // Stage 4: risk sizing for the decided direction
        result.stage_reached = CycleStage::RiskSizing;
        let metrics = match self
            .risk_calculator
            .compute_metrics(decision.direction, &cleaned)
        {
            Ok(metrics) => metrics,
            Err(e) => {
                return self.finish_error(result, started, format!("risk sizing failed: {}", e))
            }
        };
        result.risk_metrics = Some(metrics.clone());

        if !metrics.can_trade {
            self.rejected_by_risk += 1;
            result.message = format!("risk check blocked trade: {}", metrics.risk_reason);
            return self.finish_soft(result, started);
        }

        // Stage 5: concrete order parameters
        result.stage_reached = CycleStage::Params;
        let params = match self.param_calculator.compute(&decision, &metrics, &cleaned) {
            Ok(params) => params,
            Err(e) => {
                return self.finish_error(
                    result,
                    started,
                    format!("parameter calculation failed: {}", e),
                )
            }
        };
        let params = self.param_calculator.adjust_for_risk(&params, metrics.risk_level);

        // Stage 6: secondary validation
        result.stage_reached = CycleStage::Validation;
        let mut plan = self
            .order_sender
            .prepare_plan(&decision, &params, true, "pre-check passed");

        if self.config.execution_layer.enable_secondary_risk_check {
            let (passed, reason) =
                self.risk_validator
                    .validate(&plan, &decision, &metrics, &cleaned);
            plan.risk_check_passed = passed;
            plan.risk_check_reason = reason.clone();
            result.execution_plan = Some(plan.clone());

            if !passed {
                self.rejected_by_risk += 1;
                result.message = format!("secondary risk check failed: {}", reason);
                return self.finish_soft(result, started);
            }
        } else {
            plan.risk_check_reason = "secondary risk check disabled".to_string();
            result.execution_plan = Some(plan.clone());
        }

        logger::info(LogTag::Orchestrator, &plan.format_line());

        // Stage 7: dispatch
        result.stage_reached = CycleStage::Dispatch;
        match self.order_sender.send(&plan).await {
            Ok(order) => {
                self.successful_trades += 1;
                result.order_result = Some(order);
                result.message = "trade executed".to_string();
                result.stage_reached = CycleStage::Done;
                self.finish_soft(result, started)
            }
            Err(e) => {
                self.failed_trades += 1;
                self.finish_error(result, started, format!("dispatch failed: {}", e))
            }
        }
    }

    /// Successful cycle end (including soft rejections).
    fn finish_soft(&self, mut result: CycleResult, started: Instant) -> CycleResult {
        result.success = true;
        result.duration_ms = started.elapsed().as_millis() as i64;
        logger::info(LogTag::Orchestrator, &result.summary());
        result
    }

    /// Fatal cycle end: the error surfaces on the result.
    fn finish_error(&self, mut result: CycleResult, started: Instant, error: String) -> CycleResult {
        result.success = false;
        result.error = Some(error);
        result.duration_ms = started.elapsed().as_millis() as i64;
        logger::error(LogTag::Orchestrator, &result.summary());
        result
    }

    // Producer-interface mutators. All state lives in the sub-components
    // this orchestrator owns.

    pub fn update_account(&mut self, total: f64, available: f64, used_margin: f64) {
        self.risk_calculator.update_account(total, available, used_margin);
    }

    pub fn update_daily_pnl(&mut self, pnl: f64) {
        self.risk_calculator.update_daily_pnl(pnl);
    }

    /// Record a settled trade outcome. Intended for an external PnL
    /// reconciler; dispatch success alone says nothing about profit.
    pub fn record_trade_result(&mut self, win: bool) {
        self.risk_calculator.record_trade(win);
    }

    pub fn reset_circuit_breaker(&mut self) {
        self.risk_calculator.reset_circuit_breaker();
    }

    pub fn reset_rate_limit(&mut self) {
        self.decision_maker.reset_rate_limit();
    }

    pub fn stats(&self) -> OrchestratorStats {
        let finished = self.successful_trades + self.failed_trades;
        let win_rate = if finished > 0 {
            self.successful_trades as f64 / finished as f64 * 100.0
        } else {
            0.0
        };

        OrchestratorStats {
            total_executions: self.total_executions,
            successful_trades: self.successful_trades,
            failed_trades: self.failed_trades,
            rejected_by_risk: self.rejected_by_risk,
            win_rate,
            circuit_breaker: self.risk_calculator.breaker_status(),
            account_risk: self.risk_calculator.account_summary(),
            validation: self.risk_validator.stats(),
            rate_limit: self.decision_maker.rate_limit_status(),
        }
    }
}

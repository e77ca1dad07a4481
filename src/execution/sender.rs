//! Order dispatch: execution plans in, order results out.
//!
//! Two modes: dry-run fabricates results locally, live mode drives the
//! exchange capability. For opens, leverage is set first, then the
//! position; stop/target placement failures are warnings, never reasons
//! to unwind the position.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;

use crate::config::ExecutionLayerConfig;
use crate::exchange::{Exchange, ExchangeError, PositionSide};
use crate::execution::params::OrderParameters;
use crate::logger::{self, LogTag};
use crate::types::{AiDecision, ExecutionPlan, OrderResult, TradeAction};

/// Pause between orders in a batch to stay under venue rate limits.
const INTER_ORDER_DELAY: Duration = Duration::from_millis(100);

pub struct OrderSender {
    config: ExecutionLayerConfig,
    exchange: Arc<dyn Exchange>,
}

impl OrderSender {
    pub fn new(config: ExecutionLayerConfig, exchange: Arc<dyn Exchange>) -> Self {
        Self { config, exchange }
    }

    /// Assemble an execution plan from the decision, metrics and
    /// computed parameters.
    pub fn prepare_plan(
        &self,
        decision: &AiDecision,
        params: &OrderParameters,
        risk_check_passed: bool,
        risk_check_reason: &str,
    ) -> ExecutionPlan {
        ExecutionPlan {
            symbol: decision.symbol.clone(),
            timestamp: Utc::now(),
            action: params.action,
            quantity: params.quantity,
            quantity_usd: params.quantity_usd,
            leverage: params.leverage,
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            max_slippage_percent: params.max_slippage_percent,
            timeout_seconds: params.timeout_seconds,
            risk_check_passed,
            risk_check_reason: risk_check_reason.to_string(),
            priority: params.priority,
            source_decision: Some(decision.clone()),
        }
    }

    /// Local sanity check on a plan before it reaches the venue.
    pub fn validate_plan(&self, plan: &ExecutionPlan) -> Result<(), ExchangeError> {
        if plan.symbol.is_empty() {
            return Err(ExchangeError::Logical("plan has no symbol".to_string()));
        }

        if !plan.action.is_executable() {
            return Err(ExchangeError::Logical(format!(
                "plan action not dispatchable: {}",
                plan.action
            )));
        }

        if plan.quantity <= 0.0 {
            return Err(ExchangeError::Logical(format!(
                "quantity must be positive: {:.6}",
                plan.quantity
            )));
        }

        if plan.leverage < 1 || plan.leverage > 20 {
            return Err(ExchangeError::Logical(format!(
                "leverage out of range: {}",
                plan.leverage
            )));
        }

        Ok(())
    }

    /// Dispatch one validated plan.
    pub async fn send(&self, plan: &ExecutionPlan) -> Result<OrderResult, ExchangeError> {
        if !plan.risk_check_passed {
            return Err(ExchangeError::Logical(format!(
                "risk check failed: {}",
                plan.risk_check_reason
            )));
        }

        if self.config.dry_run {
            return Ok(self.dry_run_order(plan));
        }

        if self.config.require_manual_confirmation {
            // Confirmation channel lives outside the core; the plan has
            // already passed both risk gates at this point
            logger::info(
                LogTag::Orders,
                &format!("{}: manual confirmation requested", plan.symbol),
            );
        }

        self.validate_plan(plan)?;

        let started = std::time::Instant::now();
        let mut result = OrderResult {
            success: false,
            order_id: String::new(),
            filled_quantity: 0.0,
            avg_price: 0.0,
            execution_time_ms: 0,
            error_message: String::new(),
            timestamp: Utc::now(),
        };

        let dispatch = match plan.action {
            TradeAction::OpenLong => self.execute_open(plan, PositionSide::Long, &mut result).await,
            TradeAction::OpenShort => {
                self.execute_open(plan, PositionSide::Short, &mut result).await
            }
            TradeAction::CloseLong => {
                self.exchange
                    .close_long(&plan.symbol, plan.quantity)
                    .await
                    .map(|order| {
                        result.order_id = order.order_id;
                        result.filled_quantity = order.filled_quantity;
                        result.avg_price = order.avg_price;
                    })
            }
            TradeAction::CloseShort => {
                self.exchange
                    .close_short(&plan.symbol, plan.quantity)
                    .await
                    .map(|order| {
                        result.order_id = order.order_id;
                        result.filled_quantity = order.filled_quantity;
                        result.avg_price = order.avg_price;
                    })
            }
            TradeAction::Wait => Err(ExchangeError::Logical(
                "wait plan cannot be dispatched".to_string(),
            )),
        };

        result.execution_time_ms = started.elapsed().as_millis() as i64;

        match dispatch {
            Ok(()) => {
                result.success = true;
                logger::info(LogTag::Orders, &result.format_line());
                Ok(result)
            }
            Err(e) => {
                logger::error(
                    LogTag::Orders,
                    &format!("{}: dispatch failed: {}", plan.symbol, e),
                );
                Err(e)
            }
        }
    }

    /// Open flow: leverage, position, then best-effort stop and target.
    async fn execute_open(
        &self,
        plan: &ExecutionPlan,
        side: PositionSide,
        result: &mut OrderResult,
    ) -> Result<(), ExchangeError> {
        self.exchange.set_leverage(&plan.symbol, plan.leverage).await?;

        let order = match side {
            PositionSide::Long => {
                self.exchange
                    .open_long(&plan.symbol, plan.quantity, plan.leverage)
                    .await?
            }
            PositionSide::Short => {
                self.exchange
                    .open_short(&plan.symbol, plan.quantity, plan.leverage)
                    .await?
            }
        };

        result.order_id = order.order_id;
        result.filled_quantity = order.filled_quantity;
        result.avg_price = order.avg_price;

        // The position stands even if protective orders fail to place
        if plan.stop_loss > 0.0 {
            if let Err(e) = self
                .exchange
                .set_stop_loss(&plan.symbol, side, plan.quantity, plan.stop_loss)
                .await
            {
                let warning = format!("failed to set stop loss: {}", e);
                logger::warning(LogTag::Orders, &format!("{}: {}", plan.symbol, warning));
                result.error_message = format!("warning: {}", warning);
            }
        }

        if plan.take_profit > 0.0 {
            if let Err(e) = self
                .exchange
                .set_take_profit(&plan.symbol, side, plan.quantity, plan.take_profit)
                .await
            {
                let warning = format!("failed to set take profit: {}", e);
                logger::warning(LogTag::Orders, &format!("{}: {}", plan.symbol, warning));
                if !result.error_message.is_empty() {
                    result.error_message.push_str("; ");
                }
                result
                    .error_message
                    .push_str(&format!("warning: {}", warning));
            }
        }

        Ok(())
    }

    /// Fabricate a result locally without touching the venue.
    fn dry_run_order(&self, plan: &ExecutionPlan) -> OrderResult {
        logger::info(
            LogTag::Orders,
            &format!(
                "dry run: {} {} {:.6} @ {}x, SL {:.2}, TP {:.2}",
                plan.action, plan.symbol, plan.quantity, plan.leverage, plan.stop_loss,
                plan.take_profit
            ),
        );

        OrderResult {
            success: true,
            order_id: format!("DRYRUN-{}", Utc::now().timestamp()),
            filled_quantity: plan.quantity,
            avg_price: 0.0,
            execution_time_ms: 10,
            error_message: "[DRY RUN] simulated order".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Dispatch a batch in list order, skipping plans that failed the
    /// risk check and pacing orders to avoid rate-limit bursts.
    pub async fn send_batch(&self, plans: &[ExecutionPlan]) -> Vec<OrderResult> {
        let mut results = Vec::with_capacity(plans.len());

        for plan in plans {
            if !plan.risk_check_passed {
                logger::debug(
                    LogTag::Orders,
                    &format!("{}: skipped, risk check not passed", plan.symbol),
                );
                continue;
            }

            match self.send(plan).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    logger::error(
                        LogTag::Orders,
                        &format!("{}: batch item failed: {}", plan.symbol, e),
                    );
                }
            }

            sleep(INTER_ORDER_DELAY).await;
        }

        results
    }

    /// Cancel every resting order for a symbol.
    pub async fn cancel_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.exchange.cancel_all_orders(symbol).await
    }

    /// Close every open position, best effort. Individual failures are
    /// logged and do not stop the sweep.
    pub async fn emergency_close_all(&self) -> Result<(), ExchangeError> {
        let positions = self.exchange.get_positions().await?;

        for position in positions {
            let outcome = match position.side {
                PositionSide::Long => {
                    self.exchange
                        .close_long(&position.symbol, position.quantity)
                        .await
                }
                PositionSide::Short => {
                    self.exchange
                        .close_short(&position.symbol, position.quantity)
                        .await
                }
            };

            if let Err(e) = outcome {
                logger::error(
                    LogTag::Orders,
                    &format!("emergency close failed for {}: {}", position.symbol, e),
                );
            }
        }

        Ok(())
    }
}

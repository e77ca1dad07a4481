//! Core types shared across the three layers.
//!
//! Every artifact that crosses a layer boundary lives here: the cleaned
//! market record handed to the AI layer, the risk metrics handed to the
//! execution layer, the AI decision, the execution plan and the order
//! result. All tag-like fields are closed enums; raw strings only appear
//! at the serialization boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market regime classification produced by the AI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCondition {
    Trending,
    Ranging,
    Volatile,
    Consolidate,
    Breakout,
}

impl MarketCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCondition::Trending => "trending",
            MarketCondition::Ranging => "ranging",
            MarketCondition::Volatile => "volatile",
            MarketCondition::Consolidate => "consolidate",
            MarketCondition::Breakout => "breakout",
        }
    }

    /// Parse from a tag string (case-insensitive). Returns None for
    /// anything outside the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trending" => Some(MarketCondition::Trending),
            "ranging" => Some(MarketCondition::Ranging),
            "volatile" => Some(MarketCondition::Volatile),
            "consolidate" => Some(MarketCondition::Consolidate),
            "breakout" => Some(MarketCondition::Breakout),
            _ => None,
        }
    }
}

impl std::fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trade-intent classification produced by the AI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opportunity {
    LongEntry,
    ShortEntry,
    LongExit,
    ShortExit,
    Scalp,
    None,
}

impl Opportunity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Opportunity::LongEntry => "long_entry",
            Opportunity::ShortEntry => "short_entry",
            Opportunity::LongExit => "long_exit",
            Opportunity::ShortExit => "short_exit",
            Opportunity::Scalp => "scalp",
            Opportunity::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "long_entry" => Some(Opportunity::LongEntry),
            "short_entry" => Some(Opportunity::ShortEntry),
            "long_exit" => Some(Opportunity::LongExit),
            "short_exit" => Some(Opportunity::ShortExit),
            "scalp" => Some(Opportunity::Scalp),
            "none" => Some(Opportunity::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for Opportunity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Wait,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Wait => "wait",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "long" => Some(Direction::Long),
            "short" => Some(Direction::Short),
            "wait" => Some(Direction::Wait),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete order action on the execution plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    Wait,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::OpenLong => "open_long",
            TradeAction::OpenShort => "open_short",
            TradeAction::CloseLong => "close_long",
            TradeAction::CloseShort => "close_short",
            TradeAction::Wait => "wait",
        }
    }

    /// True for the four executable open/close tags.
    pub fn is_executable(&self) -> bool {
        !matches!(self, TradeAction::Wait)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TradeAction::OpenLong | TradeAction::OpenShort)
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Computed risk severity. `Extreme` forbids trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Extreme => "extreme",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dispatch scheduling hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cleaned market data produced by the data layer and consumed by every
/// layer above it. The `compressed_summary` is the single line handed to
/// the oracle; it is kept under 650 bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedMarketData {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,

    // Price data
    pub current_price: f64,
    pub price_change_1h: f64,
    pub price_change_4h: f64,
    pub price_change_24h: f64,

    // Technical indicators
    pub ema20: f64,
    pub ema50: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub rsi7: f64,
    pub rsi14: f64,
    pub atr: f64,

    // Volume and open interest
    pub volume_24h: f64,
    pub volume_change: f64,
    pub open_interest: f64,
    pub oi_change: f64,
    pub funding_rate: f64,

    // Quality flags
    pub data_quality: f64,
    pub is_valid: bool,

    pub compressed_summary: String,
}

/// Risk metrics computed by the data layer for a proposed direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub symbol: String,

    pub max_position_size_usd: f64,
    pub recommended_leverage: u32,

    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub max_loss_usd: f64,

    pub required_margin: f64,
    pub margin_usage_percent: f64,

    pub risk_level: RiskLevel,
    pub can_trade: bool,
    pub risk_reason: String,
}

/// AI layer output: regime, opportunity, direction and confidence.
///
/// Confidence below 0.7 means "do not trade"; the decision maker rewrites
/// the direction to `wait` when confidence falls under the configured
/// threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,

    pub market_condition: MarketCondition,
    pub condition_reason: String,

    pub opportunity: Opportunity,
    pub opportunity_reason: String,

    pub direction: Direction,
    pub confidence: f64,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub chain_of_thought: String,

    pub model_used: String,
    pub response_time_ms: i64,
}

/// Execution plan handed to the order sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,

    pub action: TradeAction,
    pub quantity: f64,
    pub quantity_usd: f64,
    pub leverage: u32,

    pub stop_loss: f64,
    pub take_profit: f64,

    pub max_slippage_percent: f64,
    pub timeout_seconds: u32,

    pub risk_check_passed: bool,
    pub risk_check_reason: String,

    pub priority: Priority,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_decision: Option<AiDecision>,
}

impl ExecutionPlan {
    /// One-line rendering for the log channel.
    pub fn format_line(&self) -> String {
        format!(
            "{} {} | qty: {:.6} ({:.2} USD) | {}x | SL: {:.2} | TP: {:.2} | priority: {} | risk check: {} ({})",
            self.symbol,
            self.action,
            self.quantity,
            self.quantity_usd,
            self.leverage,
            self.stop_loss,
            self.take_profit,
            self.priority,
            self.risk_check_passed,
            self.risk_check_reason,
        )
    }
}

/// Result of dispatching one execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: String,
    pub filled_quantity: f64,
    pub avg_price: f64,
    pub execution_time_ms: i64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

impl OrderResult {
    pub fn format_line(&self) -> String {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        format!(
            "{} | order: {} | filled: {:.6} | {}ms | {}",
            status, self.order_id, self.filled_quantity, self.execution_time_ms, self.error_message,
        )
    }
}

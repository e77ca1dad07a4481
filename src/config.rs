//! Pipeline configuration
//!
//! One struct per layer, grouped under [`PipelineConfig`]. Configuration
//! is plain data: it is loaded once, validated, and handed by value to
//! the component constructors. Nothing here is global.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

/// Position sizing strategy for the execution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMethod {
    Fixed,
    Kelly,
    Volatility,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_layer: DataLayerConfig,
    pub ai_layer: AiLayerConfig,
    pub execution_layer: ExecutionLayerConfig,
}

/// Data-layer settings: quality gates, sizing limits and the circuit
/// breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLayerConfig {
    /// Minimum acceptable data quality, 0-1
    pub min_data_quality: f64,

    /// Max share of account equity at risk across the account, percent
    pub max_account_risk_percent: f64,
    /// Max share of account equity at risk in one trade, percent
    pub max_single_trade_risk_percent: f64,
    pub default_leverage: u32,
    pub max_leverage: u32,

    pub circuit_breaker_enabled: bool,
    pub max_daily_loss_percent: f64,
    pub max_consecutive_losses: u32,
}

impl Default for DataLayerConfig {
    fn default() -> Self {
        Self {
            min_data_quality: 0.8,
            max_account_risk_percent: 2.0,
            max_single_trade_risk_percent: 1.0,
            default_leverage: 3,
            max_leverage: 5,
            circuit_breaker_enabled: true,
            max_daily_loss_percent: 5.0,
            max_consecutive_losses: 3,
        }
    }
}

/// AI-layer settings. Provider/model/credentials are opaque to the core
/// and only travel into whatever [`crate::ai::Oracle`] implementation the
/// caller wires up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiLayerConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,

    pub min_confidence: f64,
    pub enable_chain_of_thought: bool,
    /// Hard cap on the user prompt, in bytes
    pub max_prompt_length: usize,

    pub max_decisions_per_hour: u32,
    pub cooldown_minutes: u32,
}

impl Default for AiLayerConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: String::new(),
            base_url: String::new(),
            min_confidence: 0.75,
            enable_chain_of_thought: false,
            max_prompt_length: 650,
            max_decisions_per_hour: 2,
            cooldown_minutes: 30,
        }
    }
}

/// Execution-layer settings: secondary risk check, sizing method and
/// dispatch behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLayerConfig {
    pub enable_secondary_risk_check: bool,
    pub max_slippage_percent: f64,
    pub order_timeout_seconds: u32,

    pub enable_position_sizing: bool,
    pub position_sizing_method: SizingMethod,

    pub dry_run: bool,
    pub require_manual_confirmation: bool,
}

impl Default for ExecutionLayerConfig {
    fn default() -> Self {
        Self {
            enable_secondary_risk_check: true,
            max_slippage_percent: 0.5,
            order_timeout_seconds: 30,
            enable_position_sizing: true,
            position_sizing_method: SizingMethod::Fixed,
            dry_run: false,
            require_manual_confirmation: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_layer: DataLayerConfig::default(),
            ai_layer: AiLayerConfig::default(),
            execution_layer: ExecutionLayerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.data_layer.min_data_quality) {
            anyhow::bail!("data_layer.min_data_quality must be within [0, 1]");
        }

        if self.data_layer.max_account_risk_percent <= 0.0 {
            anyhow::bail!("data_layer.max_account_risk_percent must be positive");
        }

        if self.data_layer.max_single_trade_risk_percent <= 0.0 {
            anyhow::bail!("data_layer.max_single_trade_risk_percent must be positive");
        }

        if self.data_layer.default_leverage < 1
            || self.data_layer.default_leverage > self.data_layer.max_leverage
        {
            anyhow::bail!(
                "data_layer.default_leverage must be within [1, {}]",
                self.data_layer.max_leverage
            );
        }

        if !(0.0..=1.0).contains(&self.ai_layer.min_confidence) {
            anyhow::bail!("ai_layer.min_confidence must be within [0, 1]");
        }

        if self.ai_layer.max_prompt_length == 0 {
            anyhow::bail!("ai_layer.max_prompt_length must be positive");
        }

        if self.execution_layer.max_slippage_percent < 0.0 {
            anyhow::bail!("execution_layer.max_slippage_percent must not be negative");
        }

        if self.execution_layer.order_timeout_seconds == 0 {
            anyhow::bail!("execution_layer.order_timeout_seconds must be positive");
        }

        Ok(())
    }
}

//! Validation and cleaning of raw market snapshots.
//!
//! The cleaner is the first gate of the data layer: it rejects snapshots
//! that cannot be trusted at all and repairs the ones that merely carry
//! out-of-range values. Repairs never widen a value, only clamp it.

use super::MarketSnapshot;
use crate::logger::{self, LogTag};

/// Outcome of validating one snapshot. Errors are fatal; warnings are
/// informational and surface on the log channel only.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validates and repairs raw market data before it enters the pipeline.
#[derive(Debug, Default)]
pub struct DataCleaner;

impl DataCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Validate a snapshot for completeness and plausibility.
    pub fn validate(&self, data: &MarketSnapshot) -> ValidationReport {
        let mut report = ValidationReport {
            is_valid: true,
            ..Default::default()
        };

        if data.symbol.is_empty() {
            report.is_valid = false;
            report.errors.push("symbol is empty".to_string());
        }

        if data.current_price <= 0.0 {
            report.is_valid = false;
            report
                .errors
                .push(format!("current price invalid: {:.4}", data.current_price));
        }

        // Extreme hourly moves are almost always feed glitches
        if data.price_change_1h.abs() > 50.0 {
            report.warnings.push(format!(
                "1h price change out of range: {:.2}%",
                data.price_change_1h
            ));
        }
        if data.price_change_4h.abs() > 100.0 {
            report.warnings.push(format!(
                "4h price change out of range: {:.2}%",
                data.price_change_4h
            ));
        }

        if data.current_ema20 <= 0.0 {
            report.warnings.push("EMA20 is zero or negative".to_string());
        }

        if !(0.0..=100.0).contains(&data.current_rsi7) {
            report
                .warnings
                .push(format!("RSI7 out of range: {:.2}", data.current_rsi7));
        }

        if let Some(oi) = &data.open_interest {
            if oi.latest < 0.0 {
                report.warnings.push("open interest is negative".to_string());
            }
        }

        if let Some(series) = &data.intraday {
            if series.mid_prices.is_empty() {
                report.warnings.push("intraday price series is empty".to_string());
            }
        }

        if let Some(ctx) = &data.longer_term {
            if ctx.ema50 <= 0.0 {
                report.warnings.push("longer-term EMA data incomplete".to_string());
            }
        }

        report
    }

    /// Repair out-of-range values on a copy of the snapshot.
    pub fn clean(&self, data: &MarketSnapshot) -> MarketSnapshot {
        let mut cleaned = data.clone();

        cleaned.current_rsi7 = cleaned.current_rsi7.clamp(0.0, 100.0);

        if let Some(oi) = &mut cleaned.open_interest {
            oi.latest = oi.latest.max(0.0);
            oi.average = oi.average.max(0.0);
        }

        if cleaned.price_change_1h.abs() > 50.0 {
            cleaned.price_change_1h = 50.0_f64.copysign(cleaned.price_change_1h);
        }
        if cleaned.price_change_4h.abs() > 100.0 {
            cleaned.price_change_4h = 100.0_f64.copysign(cleaned.price_change_4h);
        }

        cleaned
    }

    /// Standard entry point: validate, then clean. Fails only when
    /// validation found fatal errors.
    pub fn validate_and_clean(
        &self,
        data: &MarketSnapshot,
    ) -> Result<(MarketSnapshot, ValidationReport), String> {
        let report = self.validate(data);

        if !report.is_valid {
            return Err(format!("market data validation failed: {:?}", report.errors));
        }

        for warning in &report.warnings {
            logger::warning(LogTag::Data, &format!("{}: {}", data.symbol, warning));
        }

        Ok((self.clean(data), report))
    }

    /// Check whether open-interest notional satisfies a liquidity floor.
    /// Returns the pass flag and the notional in millions of USD.
    pub fn check_liquidity(
        &self,
        data: &MarketSnapshot,
        min_oi_value_millions: f64,
    ) -> (bool, f64) {
        let Some(oi) = &data.open_interest else {
            return (false, 0.0);
        };

        if data.current_price <= 0.0 {
            return (false, 0.0);
        }

        let oi_value_millions = oi.latest * data.current_price / 1_000_000.0;
        (oi_value_millions >= min_oi_value_millions, oi_value_millions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::OpenInterestData;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTCUSDT".to_string(),
            current_price: 45_000.0,
            price_change_1h: 2.5,
            price_change_4h: 5.8,
            current_ema20: 44_800.0,
            current_macd: 0.0234,
            current_rsi7: 65.5,
            funding_rate: 0.0001,
            open_interest: Some(OpenInterestData {
                latest: 1_000_000_000.0,
                average: 950_000_000.0,
            }),
            intraday: None,
            longer_term: None,
        }
    }

    #[test]
    fn test_valid_snapshot_passes() {
        let cleaner = DataCleaner::new();
        let report = cleaner.validate(&snapshot());
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_zero_price_is_fatal() {
        let cleaner = DataCleaner::new();
        let mut data = snapshot();
        data.current_price = 0.0;
        let report = cleaner.validate(&data);
        assert!(!report.is_valid);
        assert!(cleaner.validate_and_clean(&data).is_err());
    }

    #[test]
    fn test_clean_clamps_rsi_and_changes() {
        let cleaner = DataCleaner::new();
        let mut data = snapshot();
        data.current_rsi7 = 130.0;
        data.price_change_1h = -80.0;
        data.price_change_4h = 150.0;

        let cleaned = cleaner.clean(&data);
        assert_eq!(cleaned.current_rsi7, 100.0);
        assert_eq!(cleaned.price_change_1h, -50.0);
        assert_eq!(cleaned.price_change_4h, 100.0);
    }

    #[test]
    fn test_clean_floors_open_interest() {
        let cleaner = DataCleaner::new();
        let mut data = snapshot();
        data.open_interest = Some(OpenInterestData {
            latest: -5.0,
            average: -1.0,
        });

        let cleaned = cleaner.clean(&data);
        let oi = cleaned.open_interest.unwrap();
        assert_eq!(oi.latest, 0.0);
        assert_eq!(oi.average, 0.0);
    }

    #[test]
    fn test_liquidity_check() {
        let cleaner = DataCleaner::new();
        let data = snapshot();
        // 1e9 * 45000 = 4.5e13 USD -> 4.5e7 millions
        let (ok, millions) = cleaner.check_liquidity(&data, 10.0);
        assert!(ok);
        assert!(millions > 10.0);

        let mut thin = data.clone();
        thin.open_interest = Some(OpenInterestData {
            latest: 10.0,
            average: 10.0,
        });
        let (ok, _) = cleaner.check_liquidity(&thin, 10.0);
        assert!(!ok);
    }
}

//! Data layer: turns raw market snapshots into cleaned records.
//!
//! The processor re-projects a snapshot into [`CleanedMarketData`],
//! computes the derived indicators the upper layers expect, scores data
//! quality and emits the compressed single-line summary consumed by the
//! oracle prompts.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::config::DataLayerConfig;
use crate::logger::{self, LogTag};
use crate::market::{DataCleaner, MarketSnapshot};
use crate::types::CleanedMarketData;

/// Hard cap on the compressed summary, in bytes.
pub const MAX_SUMMARY_BYTES: usize = 650;

/// Per-record quality report for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct DataQualityReport {
    pub symbol: String,
    pub quality: f64,
    pub is_valid: bool,
    pub summary_len: usize,
    /// Share of the 15 tracked fields carrying a usable value
    pub completeness: f64,
}

/// Cleans and enriches raw market data for the layers above.
pub struct DataProcessor {
    config: DataLayerConfig,
    cleaner: DataCleaner,
}

impl DataProcessor {
    pub fn new(config: DataLayerConfig) -> Self {
        Self {
            config,
            cleaner: DataCleaner::new(),
        }
    }

    /// Process one raw snapshot into a cleaned record.
    ///
    /// Quality is scored on the raw values so feed anomalies are visible
    /// in the score; the emitted record itself carries repaired values.
    pub fn process(&self, raw: &MarketSnapshot) -> Result<CleanedMarketData> {
        if raw.symbol.is_empty() {
            anyhow::bail!("raw market data has no symbol");
        }

        let quality = self.assess_quality(raw);
        let repaired = self.cleaner.clean(raw);

        let mut cleaned = CleanedMarketData {
            symbol: repaired.symbol.clone(),
            timestamp: Utc::now(),
            current_price: repaired.current_price,
            price_change_1h: repaired.price_change_1h,
            price_change_4h: repaired.price_change_4h,
            price_change_24h: price_change_24h(&repaired),
            ema20: repaired.current_ema20,
            ema50: 0.0,
            macd: repaired.current_macd,
            macd_signal: macd_signal(&repaired),
            rsi7: repaired.current_rsi7,
            rsi14: rsi14(&repaired),
            atr: 0.0,
            volume_24h: 0.0,
            volume_change: 0.0,
            open_interest: 0.0,
            oi_change: 0.0,
            funding_rate: repaired.funding_rate,
            data_quality: quality,
            is_valid: quality >= self.config.min_data_quality,
            compressed_summary: String::new(),
        };

        if let Some(ctx) = &repaired.longer_term {
            cleaned.ema50 = ctx.ema50;
            cleaned.atr = ctx.atr14;
            cleaned.volume_24h = ctx.current_volume;
            cleaned.volume_change = relative_change(ctx.current_volume, ctx.average_volume);
        }

        if let Some(oi) = &repaired.open_interest {
            cleaned.open_interest = oi.latest;
            cleaned.oi_change = relative_change(oi.latest, oi.average);
        }

        cleaned.compressed_summary = build_summary(&cleaned);

        if cleaned.data_quality < 1.0 {
            logger::warning(
                LogTag::Data,
                &format!(
                    "{}: degraded data quality {:.2}",
                    cleaned.symbol, cleaned.data_quality
                ),
            );
        }

        Ok(cleaned)
    }

    /// Process a batch, dropping items that fail validation or end up
    /// below the quality threshold. Fails only when nothing survives.
    pub fn process_batch(&self, raw: &[MarketSnapshot]) -> Result<Vec<CleanedMarketData>> {
        let mut cleaned = Vec::with_capacity(raw.len());

        for snapshot in raw {
            if !self.cleaner.validate(snapshot).is_valid {
                continue;
            }

            match self.process(snapshot) {
                Ok(record) if record.is_valid => cleaned.push(record),
                Ok(record) => {
                    logger::debug(
                        LogTag::Data,
                        &format!(
                            "{}: dropped from batch, quality {:.2}",
                            record.symbol, record.data_quality
                        ),
                    );
                }
                Err(e) => {
                    logger::warning(LogTag::Data, &format!("batch item failed: {}", e));
                }
            }
        }

        if cleaned.is_empty() {
            anyhow::bail!("no valid data after cleaning");
        }

        Ok(cleaned)
    }

    /// Produce a completeness/quality report for one cleaned record.
    pub fn quality_report(&self, data: &CleanedMarketData) -> DataQualityReport {
        let populated = [
            data.current_price > 0.0,
            data.ema20 > 0.0,
            data.ema50 > 0.0,
            data.macd != 0.0,
            data.macd_signal != 0.0,
            data.rsi7 > 0.0,
            data.rsi14 > 0.0,
            data.atr > 0.0,
            data.volume_24h > 0.0,
            data.open_interest > 0.0,
            data.price_change_1h != 0.0,
            data.price_change_4h != 0.0,
            data.price_change_24h != 0.0,
            data.volume_change != 0.0,
            data.oi_change != 0.0,
        ];

        let filled = populated.iter().filter(|&&p| p).count();

        DataQualityReport {
            symbol: data.symbol.clone(),
            quality: data.data_quality,
            is_valid: data.is_valid,
            summary_len: data.compressed_summary.len(),
            completeness: filled as f64 / populated.len() as f64,
        }
    }

    /// Score raw data quality: start at 1.0 and deduct per anomaly.
    fn assess_quality(&self, data: &MarketSnapshot) -> f64 {
        let mut quality: f64 = 1.0;

        if data.current_price <= 0.0 {
            quality -= 0.5;
        }
        if data.current_ema20 <= 0.0 {
            quality -= 0.1;
        }
        if data.current_rsi7 < 0.0 || data.current_rsi7 > 100.0 {
            quality -= 0.1;
        }

        // Thin intraday history means stale or partial feeds
        let intraday_len = data
            .intraday
            .as_ref()
            .map(|s| s.mid_prices.len())
            .unwrap_or(0);
        if intraday_len < 10 {
            quality -= 0.2;
        }

        quality.clamp(0.0, 1.0)
    }
}

/// 24h change from the first intraday mid-price, zero when unavailable.
fn price_change_24h(data: &MarketSnapshot) -> f64 {
    if let Some(series) = &data.intraday {
        if let Some(&first) = series.mid_prices.first() {
            if first > 0.0 {
                return (data.current_price - first) / first * 100.0;
            }
        }
    }
    0.0
}

/// Percent change of current vs average, zero when average is not positive.
fn relative_change(current: f64, average: f64) -> f64 {
    if average > 0.0 {
        (current - average) / average * 100.0
    } else {
        0.0
    }
}

/// MACD signal approximated as the mean of the last 9 MACD samples, with
/// a 0.9x approximation when the series is too short.
fn macd_signal(data: &MarketSnapshot) -> f64 {
    if let Some(series) = &data.intraday {
        let values = &series.macd_values;
        if values.len() >= 9 {
            let tail = &values[values.len() - 9..];
            return tail.iter().sum::<f64>() / 9.0;
        }
    }
    data.current_macd * 0.9
}

/// RSI14 from the last intraday sample, falling back to RSI7.
fn rsi14(data: &MarketSnapshot) -> f64 {
    if let Some(series) = &data.intraday {
        if let Some(&last) = series.rsi14_values.last() {
            return last.clamp(0.0, 100.0);
        }
    }
    data.current_rsi7.clamp(0.0, 100.0)
}

/// Build the pipe-delimited one-line summary, capped at 650 bytes.
fn build_summary(data: &CleanedMarketData) -> String {
    let summary = format!(
        "{}|P:{:.2}|1h:{:.2}%|4h:{:.2}%|24h:{:.2}%|EMA20:{:.2}|EMA50:{:.2}|MACD:{:.4}|Sig:{:.4}|RSI7:{:.1}|RSI14:{:.1}|ATR:{:.2}|Vol24h:{:.0}|VolChg:{:.1}%|OI:{:.0}|OIChg:{:.1}%|FR:{:.4}%|Q:{:.2}",
        data.symbol,
        data.current_price,
        data.price_change_1h,
        data.price_change_4h,
        data.price_change_24h,
        data.ema20,
        data.ema50,
        data.macd,
        data.macd_signal,
        data.rsi7,
        data.rsi14,
        data.atr,
        data.volume_24h,
        data.volume_change,
        data.open_interest,
        data.oi_change,
        data.funding_rate * 100.0,
        data.data_quality,
    );

    truncate_bytes(summary, MAX_SUMMARY_BYTES)
}

/// Truncate a string to `max` bytes, appending "..." when cut. The cut
/// point backs up to a char boundary so the result stays valid UTF-8.
fn truncate_bytes(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }

    let mut cut = max - 3;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut out = s[..cut].to_string();
    out.push_str("...");
    out
}

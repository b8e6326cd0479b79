//! Z-Score Engine — pair discovery, cointegration testing, and rolling
//! z-score signal extraction for statistical arbitrage.

pub mod stats;

use crate::config::ZScoreSettings;
use crate::types::{now_secs, CointegrationStats, Pair, PairKind, PriceRing, PriceSample};
use alloy::primitives::Address;
use dashmap::DashMap;

/// Cointegration tests are re-run at most this often per pair
/// ("cointegration is re-tested on a cooldown, not every tick").
const COINTEGRATION_RETEST_SECS: u64 = 3600;

/// A ratio series needs at least this fraction of the configured window
/// filled before a signal can be extracted from it.
const MIN_RATIO_SAMPLE_FRACTION: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ShortALongB,
    LongAShortB,
    ClosePosition,
    Hold,
}

#[derive(Debug, Clone, Copy)]
pub struct ZScoreSignal {
    pub signal: Signal,
    pub z: f64,
    pub confidence: f64,
    pub half_life: f64,
    pub hurst_exponent: f64,
}

pub struct ZScoreEngine {
    settings: ZScoreSettings,
    pairs: DashMap<(Address, Address), Pair>,
    prices_a: DashMap<(Address, Address), PriceRing>,
    prices_b: DashMap<(Address, Address), PriceRing>,
}

impl ZScoreEngine {
    pub fn new(settings: ZScoreSettings) -> Self {
        Self {
            settings,
            pairs: DashMap::new(),
            prices_a: DashMap::new(),
            prices_b: DashMap::new(),
        }
    }

    pub fn register_pair(&self, token_a: Address, token_b: Address, kind: PairKind) {
        let key = (token_a, token_b);
        self.pairs
            .entry(key)
            .or_insert_with(|| Pair::new(token_a, token_b, kind));
        self.prices_a
            .entry(key)
            .or_insert_with(|| PriceRing::new(self.settings.window_size));
        self.prices_b
            .entry(key)
            .or_insert_with(|| PriceRing::new(self.settings.window_size));
    }

    pub fn record_prices(&self, token_a: Address, token_b: Address, price_a: f64, price_b: f64) {
        let key = (token_a, token_b);
        let now = now_secs();
        if let Some(mut ring) = self.prices_a.get_mut(&key) {
            ring.push(PriceSample {
                price_usd: price_a,
                timestamp: now,
            });
        }
        if let Some(mut ring) = self.prices_b.get_mut(&key) {
            ring.push(PriceSample {
                price_usd: price_b,
                timestamp: now,
            });
        }
    }

    /// Re-test cointegration for a pair if its window is full and the
    /// cooldown has elapsed. Returns the freshly computed stats, if any.
    pub fn maybe_retest_cointegration(
        &self,
        token_a: Address,
        token_b: Address,
    ) -> Option<CointegrationStats> {
        let key = (token_a, token_b);
        let due = self
            .pairs
            .get(&key)
            .map(|p| {
                p.cointegration_tested_at
                    .map(|t| now_secs().saturating_sub(t) >= COINTEGRATION_RETEST_SECS)
                    .unwrap_or(true)
            })
            .unwrap_or(false);
        if !due {
            return None;
        }

        let ring_a = self.prices_a.get(&key)?;
        let ring_b = self.prices_b.get(&key)?;
        if ring_a.len() < self.settings.window_size || ring_b.len() < self.settings.window_size {
            return None;
        }
        let x: Vec<f64> = ring_a.all().iter().map(|s| s.price_usd).collect();
        let y: Vec<f64> = ring_b.all().iter().map(|s| s.price_usd).collect();
        drop(ring_a);
        drop(ring_b);

        let fit = stats::ols(&x, &y)?;
        let residuals = stats::residuals(&x, &y, &fit);
        let adf = stats::adf_statistic(&residuals)?;
        let hl = stats::half_life(&residuals).unwrap_or(f64::INFINITY);
        let hurst = stats::hurst_exponent(&residuals).unwrap_or(0.5);

        if !stats::is_cointegrated(adf) {
            if let Some(mut pair) = self.pairs.get_mut(&key) {
                pair.cointegration = None;
                pair.cointegration_tested_at = Some(now_secs());
            }
            return None;
        }

        let result = CointegrationStats {
            half_life: hl,
            hurst_exponent: hurst,
            slope: fit.slope,
            intercept: fit.intercept,
            adf_statistic: adf,
            r_squared: fit.r_squared,
        };
        if let Some(mut pair) = self.pairs.get_mut(&key) {
            pair.cointegration = Some(result);
            pair.cointegration_tested_at = Some(now_secs());
        }
        Some(result)
    }

    /// Extract the current signal from the latest price ratio `a/b` vs. the
    /// pair's rolling ratio mean/std, against the configured entry/exit
    /// thresholds.
    pub fn signal(&self, token_a: Address, token_b: Address) -> Option<ZScoreSignal> {
        let key = (token_a, token_b);
        let pair = self.pairs.get(&key)?;
        let coint = pair.cointegration?;
        drop(pair);

        let ring_a = self.prices_a.get(&key)?;
        let ring_b = self.prices_b.get(&key)?;
        let recent_a = ring_a.recent(self.settings.window_size);
        let recent_b = ring_b.recent(self.settings.window_size);
        drop(ring_a);
        drop(ring_b);

        let min_samples = ((self.settings.window_size as f64) * MIN_RATIO_SAMPLE_FRACTION).ceil() as usize;
        if recent_a.len() < min_samples.max(2) || recent_b.len() < min_samples.max(2) {
            return None;
        }

        let ratio_series: Vec<f64> = recent_a
            .iter()
            .zip(recent_b.iter())
            .filter(|(_, b)| b.price_usd != 0.0)
            .map(|(a, b)| a.price_usd / b.price_usd)
            .collect();
        if ratio_series.len() < 2 {
            return None;
        }

        let mean = ratio_series.iter().sum::<f64>() / ratio_series.len() as f64;
        let variance = ratio_series.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (ratio_series.len() - 1).max(1) as f64;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            return Some(ZScoreSignal {
                signal: Signal::Hold,
                z: 0.0,
                confidence: 0.0,
                half_life: coint.half_life,
                hurst_exponent: coint.hurst_exponent,
            });
        }

        let current_ratio = *ratio_series.last()?;
        let z = (current_ratio - mean) / std_dev;

        let signal = if z.abs() <= self.settings.exit_threshold {
            Signal::ClosePosition
        } else if z >= self.settings.entry_threshold {
            Signal::ShortALongB
        } else if z <= -self.settings.entry_threshold {
            Signal::LongAShortB
        } else {
            Signal::Hold
        };

        let confidence = stats::confidence(z, coint.hurst_exponent, coint.half_life);

        Some(ZScoreSignal {
            signal,
            z,
            confidence,
            half_life: coint.half_life,
            hurst_exponent: coint.hurst_exponent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    fn settings(window: usize) -> ZScoreSettings {
        ZScoreSettings {
            window_size: window,
            entry_threshold: 2.0,
            exit_threshold: 0.5,
        }
    }

    #[test]
    fn cointegration_not_retested_before_window_fills() {
        let engine = ZScoreEngine::new(settings(100));
        let (a, b) = (addr(1), addr(2));
        engine.register_pair(a, b, PairKind::BaseAlt);
        engine.record_prices(a, b, 1.0, 2.0);
        assert!(engine.maybe_retest_cointegration(a, b).is_none());
    }

    #[test]
    fn signal_is_none_before_cointegration_established() {
        let engine = ZScoreEngine::new(settings(10));
        let (a, b) = (addr(1), addr(2));
        engine.register_pair(a, b, PairKind::BaseAlt);
        for i in 0..10 {
            engine.record_prices(a, b, 1.0 + i as f64 * 0.01, 2.0 + i as f64 * 0.02);
        }
        assert!(engine.signal(a, b).is_none());
    }

    #[test]
    fn hold_signal_within_bands() {
        let engine = ZScoreEngine::new(settings(20));
        let (a, b) = (addr(1), addr(2));
        engine.register_pair(a, b, PairKind::BaseAlt);
        for mut pair in engine.pairs.iter_mut() {
            if pair.key() == &(a, b) {
                pair.cointegration = Some(CointegrationStats {
                    half_life: 10.0,
                    hurst_exponent: 0.3,
                    slope: 2.0,
                    intercept: 0.0,
                    adf_statistic: -4.0,
                    r_squared: 0.9,
                });
            }
        }
        // b held fixed so the ratio series is a/b; alternating a puts the
        // last ratio about one standard deviation off its own mean — past
        // the exit band but well short of the entry threshold.
        for i in 0..20 {
            let a_price = 1.0 + (i % 2) as f64 * 0.002;
            engine.record_prices(a, b, a_price, 2.0);
        }
        let signal = engine.signal(a, b).unwrap();
        assert_eq!(signal.signal, Signal::Hold);
    }

    #[test]
    fn entry_signal_fires_on_sharp_ratio_move() {
        let engine = ZScoreEngine::new(settings(20));
        let (a, b) = (addr(1), addr(2));
        engine.register_pair(a, b, PairKind::BaseAlt);
        for mut pair in engine.pairs.iter_mut() {
            if pair.key() == &(a, b) {
                pair.cointegration = Some(CointegrationStats {
                    half_life: 5.0,
                    hurst_exponent: 0.3,
                    slope: 2.0,
                    intercept: 0.0,
                    adf_statistic: -4.0,
                    r_squared: 0.9,
                });
            }
        }
        for i in 0..19 {
            let a_price = 1.0 + (i % 2) as f64 * 0.0001;
            engine.record_prices(a, b, a_price, 2.0);
        }
        engine.record_prices(a, b, 1.05, 2.0);
        let signal = engine.signal(a, b).unwrap();
        assert_eq!(signal.signal, Signal::ShortALongB);
        assert!(signal.confidence > 0.0);
        assert_eq!(signal.half_life, 5.0);
        assert_eq!(signal.hurst_exponent, 0.3);
    }
}

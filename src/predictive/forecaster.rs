//! Forecaster implementations backing the Predictive Cache (spec §4.8).
//!
//! Each model operates on a key's inter-access interval series (seconds
//! between successive touches) and produces a probability/confidence pair
//! for "this key will be accessed again within the requested horizon". The
//! reference leaves the actual math loosely specified; what's fixed is the
//! interface and the ensemble-averaging rule (arithmetic mean across active
//! models) in `Hybrid`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

pub const MIN_TRAINING_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Arima,
    Exponential,
    Lstm,
    Hybrid,
}

#[derive(Debug, Clone, Copy)]
pub struct ForecastOutput {
    pub probability: f64,
    pub confidence: f64,
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn stddev(xs: &[f64], mean_val: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let variance = xs.iter().map(|x| (x - mean_val).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    variance.sqrt()
}

/// Maps a predicted next-interval (seconds) against a requested horizon
/// into a probability: the closer the predicted interval is to (or under)
/// the horizon, the more likely the next access falls within it.
fn interval_to_probability(predicted_interval: f64, horizon_seconds: f64) -> f64 {
    if predicted_interval <= 0.0 {
        return 1.0;
    }
    (horizon_seconds / (horizon_seconds + predicted_interval)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArimaParams {
    ar_coefficient: f64,
    ma_coefficient: f64,
    drift: f64,
}

impl ArimaParams {
    /// ARIMA(1,1,1): difference once, fit a first-order AR+MA recursion on
    /// the differenced series via closed-form lag-1 correlation (no
    /// external ARIMA crate is in the pack; this is the same
    /// hand-rolled-numerics approach the rest of the crate takes over
    /// pulling in an ML framework for one recursion).
    pub fn fit(series: &[f64]) -> Self {
        let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
        if diffs.len() < 2 {
            return Self { ar_coefficient: 0.0, ma_coefficient: 0.0, drift: mean(series) };
        }
        let m = mean(&diffs);
        let centered: Vec<f64> = diffs.iter().map(|d| d - m).collect();
        let mut num = 0.0;
        let mut den = 0.0;
        for w in centered.windows(2) {
            num += w[0] * w[1];
            den += w[0] * w[0];
        }
        let ar_coefficient = if den.abs() > f64::EPSILON { (num / den).clamp(-0.95, 0.95) } else { 0.0 };
        Self { ar_coefficient, ma_coefficient: ar_coefficient * 0.5, drift: m }
    }

    pub fn forecast(&self, series: &[f64]) -> f64 {
        let last = *series.last().unwrap_or(&0.0);
        let prev = series.get(series.len().wrapping_sub(2)).copied().unwrap_or(last);
        let predicted_diff = self.drift + self.ar_coefficient * (last - prev) + self.ma_coefficient * self.drift;
        (last + predicted_diff).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialParams {
    level: f64,
    trend: f64,
    alpha: f64,
    beta: f64,
}

impl ExponentialParams {
    /// Double exponential smoothing (Holt's method), fixed smoothing
    /// factors chosen by the reference's documented defaults.
    pub fn fit(series: &[f64]) -> Self {
        let alpha = 0.3;
        let beta = 0.1;
        let mut level = series[0];
        let mut trend = series.get(1).map_or(0.0, |v| v - series[0]);
        for window in series.windows(2) {
            let observed = window[1];
            let prev_level = level;
            level = alpha * observed + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        }
        Self { level, trend, alpha, beta }
    }

    pub fn forecast(&self, _series: &[f64]) -> f64 {
        (self.level + self.trend).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmParams {
    w_forget: f64,
    w_input: f64,
    w_output: f64,
    w_candidate: f64,
    bias: f64,
}

impl LstmParams {
    /// A shallow single-cell LSTM evaluated in plain `f64` arithmetic.
    /// Weights are fit by a handful of plain gradient steps (no autodiff
    /// crate in the pack) against a min-max-normalized copy of the series;
    /// `seed` makes the initialization deterministic (spec §9's open
    /// question about reference nondeterminism).
    pub fn fit(series: &[f64], epochs: u32, learning_rate: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut w_forget: f64 = rng.gen_range(-0.5..0.5);
        let mut w_input: f64 = rng.gen_range(-0.5..0.5);
        let mut w_output: f64 = rng.gen_range(-0.5..0.5);
        let mut w_candidate: f64 = rng.gen_range(-0.5..0.5);
        let mut bias: f64 = 0.0;

        let max_val = series.iter().cloned().fold(f64::MIN, f64::max).max(1.0);
        let normalized: Vec<f64> = series.iter().map(|v| v / max_val).collect();

        for _ in 0..epochs.max(1) {
            let mut cell = 0.0;
            let mut hidden = 0.0;
            for window in normalized.windows(2) {
                let x = window[0];
                let target = window[1];
                let forget_gate = sigmoid(w_forget * x + bias);
                let input_gate = sigmoid(w_input * x + bias);
                let output_gate = sigmoid(w_output * x + bias);
                let candidate = (w_candidate * x + bias).tanh();
                cell = forget_gate * cell + input_gate * candidate;
                hidden = output_gate * cell.tanh();

                let error = hidden - target;
                w_forget -= learning_rate * error * x;
                w_input -= learning_rate * error * x;
                w_output -= learning_rate * error * x;
                w_candidate -= learning_rate * error * x;
                bias -= learning_rate * error;
            }
        }

        Self { w_forget, w_input, w_output, w_candidate, bias }
    }

    pub fn forecast(&self, series: &[f64]) -> f64 {
        let max_val = series.iter().cloned().fold(f64::MIN, f64::max).max(1.0);
        let mut cell = 0.0;
        let mut hidden = 0.0;
        for &v in series {
            let x = v / max_val;
            let forget_gate = sigmoid(self.w_forget * x + self.bias);
            let input_gate = sigmoid(self.w_input * x + self.bias);
            let output_gate = sigmoid(self.w_output * x + self.bias);
            let candidate = (self.w_candidate * x + self.bias).tanh();
            cell = forget_gate * cell + input_gate * candidate;
            hidden = output_gate * cell.tanh();
        }
        (hidden * max_val).max(0.0)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyModel {
    pub model_type: ModelType,
    arima: Option<ArimaParams>,
    exponential: Option<ExponentialParams>,
    lstm: Option<LstmParams>,
}

impl KeyModel {
    pub fn fit(series: &[f64], model_type: ModelType, epochs: u32, learning_rate: f64, seed: u64) -> Result<Self> {
        if series.len() < MIN_TRAINING_SAMPLES {
            return Err(CacheError::InsufficientData { required: MIN_TRAINING_SAMPLES, got: series.len() });
        }
        let (arima, exponential, lstm) = match model_type {
            ModelType::Arima => (Some(ArimaParams::fit(series)), None, None),
            ModelType::Exponential => (None, Some(ExponentialParams::fit(series)), None),
            ModelType::Lstm => (None, None, Some(LstmParams::fit(series, epochs, learning_rate, seed))),
            ModelType::Hybrid => (
                Some(ArimaParams::fit(series)),
                Some(ExponentialParams::fit(series)),
                Some(LstmParams::fit(series, epochs, learning_rate, seed)),
            ),
        };
        Ok(Self { model_type, arima, exponential, lstm })
    }

    /// Forecast the next inter-access interval, then convert it to a
    /// probability/confidence pair for the given horizon. `Hybrid` applies
    /// the fixed arithmetic-mean ensemble rule across whichever of the
    /// three sub-models were fit.
    pub fn forecast(&self, series: &[f64], horizon_seconds: f64) -> ForecastOutput {
        let mut predicted_intervals = Vec::new();
        if let Some(arima) = &self.arima {
            predicted_intervals.push(arima.forecast(series));
        }
        if let Some(exponential) = &self.exponential {
            predicted_intervals.push(exponential.forecast(series));
        }
        if let Some(lstm) = &self.lstm {
            predicted_intervals.push(lstm.forecast(series));
        }
        if predicted_intervals.is_empty() {
            return ForecastOutput { probability: 0.0, confidence: 0.0 };
        }

        let probabilities: Vec<f64> = predicted_intervals
            .iter()
            .map(|interval| interval_to_probability(*interval, horizon_seconds))
            .collect();
        let probability = mean(&probabilities);

        let series_mean = mean(series);
        let series_stddev = stddev(series, series_mean);
        let dispersion_confidence = if series_mean <= f64::EPSILON {
            0.5
        } else {
            (1.0 - (series_stddev / series_mean).min(1.0)).clamp(0.0, 1.0)
        };
        let agreement_confidence = if probabilities.len() <= 1 {
            1.0
        } else {
            1.0 - (stddev(&probabilities, probability)).min(1.0)
        };
        let confidence = ((dispersion_confidence + agreement_confidence) / 2.0).clamp(0.0, 1.0);

        ForecastOutput { probability, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_series() -> Vec<f64> {
        (0..20).map(|i| (i * 10) as f64).collect()
    }

    #[test]
    fn arima_fits_and_forecasts_a_nonnegative_interval() {
        let diffs: Vec<f64> = regular_series().windows(2).map(|w| w[1] - w[0]).collect();
        let model = ArimaParams::fit(&diffs);
        assert!(model.forecast(&diffs) >= 0.0);
    }

    #[test]
    fn exponential_tracks_a_rising_trend() {
        let series: Vec<f64> = (0..15).map(|i| i as f64).collect();
        let model = ExponentialParams::fit(&series);
        assert!(model.forecast(&series) > 0.0);
    }

    #[test]
    fn lstm_forecast_is_deterministic_for_a_fixed_seed() {
        let series: Vec<f64> = (0..15).map(|i| (i as f64).sin().abs() * 10.0).collect();
        let a = LstmParams::fit(&series, 20, 0.05, 42);
        let b = LstmParams::fit(&series, 20, 0.05, 42);
        assert_eq!(a.forecast(&series), b.forecast(&series));
    }

    #[test]
    fn key_model_rejects_short_series() {
        let series = vec![1.0, 2.0, 3.0];
        let err = KeyModel::fit(&series, ModelType::Hybrid, 10, 0.05, 1).unwrap_err();
        assert!(matches!(err, CacheError::InsufficientData { .. }));
    }

    #[test]
    fn hybrid_forecast_averages_active_models() {
        let series: Vec<f64> = (0..20).map(|i| 10.0 + (i as f64) * 0.1).collect();
        let model = KeyModel::fit(&series, ModelType::Hybrid, 10, 0.05, 7).unwrap();
        let forecast = model.forecast(&series, 60.0);
        assert!(forecast.probability >= 0.0 && forecast.probability <= 1.0);
        assert!(forecast.confidence >= 0.0 && forecast.confidence <= 1.0);
    }
}

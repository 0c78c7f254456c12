//! Hold-out evaluation and outlier diagnostics

use serde::{Deserialize, Serialize};

/// Signed error magnitude beyond which a row is reported as an outlier
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 100_000.0;

/// One row of the evaluation frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedRow {
    pub index: usize,
    pub y_true: f64,
    pub y_pred: f64,
    /// `y_true - y_pred`
    pub diff: f64,
    /// `diff / y_true`, zero when the true value is zero
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub rows: usize,
    pub mae: f64,
    /// Fraction, not percent
    pub mape: f64,
    pub rmse: f64,
    pub frame: Vec<EvaluatedRow>,
    /// Actual cost far above the prediction
    pub under_predicted: Vec<EvaluatedRow>,
    /// Actual cost far below the prediction
    pub over_predicted: Vec<EvaluatedRow>,
}

impl Evaluation {
    pub fn compute(y_true: &[f64], y_pred: &[f64], outlier_threshold: f64) -> Self {
        let frame: Vec<EvaluatedRow> = y_true
            .iter()
            .zip(y_pred)
            .enumerate()
            .map(|(index, (&t, &p))| {
                let diff = t - p;
                EvaluatedRow {
                    index,
                    y_true: t,
                    y_pred: p,
                    diff,
                    error_rate: if t == 0.0 { 0.0 } else { diff / t },
                }
            })
            .collect();

        let n = frame.len().max(1) as f64;
        let mae = frame.iter().map(|r| r.diff.abs()).sum::<f64>() / n;
        let mape = frame
            .iter()
            .map(|r| r.diff.abs() / r.y_true.abs().max(f64::EPSILON))
            .sum::<f64>()
            / n;
        let rmse = (frame.iter().map(|r| r.diff * r.diff).sum::<f64>() / n).sqrt();

        let under_predicted = frame
            .iter()
            .filter(|r| r.diff >= outlier_threshold)
            .cloned()
            .collect();
        let over_predicted = frame
            .iter()
            .filter(|r| r.diff <= -outlier_threshold)
            .cloned()
            .collect();

        Self {
            rows: frame.len(),
            mae,
            mape,
            rmse,
            frame,
            under_predicted,
            over_predicted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let eval = Evaluation::compute(&[100.0, 200.0], &[110.0, 180.0], DEFAULT_OUTLIER_THRESHOLD);
        assert_eq!(eval.rows, 2);
        assert!((eval.mae - 15.0).abs() < 1e-9);
        assert!((eval.mape - 0.1).abs() < 1e-9);
        assert!((eval.rmse - (250.0f64).sqrt()).abs() < 1e-9);
        assert!((eval.frame[1].error_rate - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_outlier_groups_are_separate() {
        let eval = Evaluation::compute(
            &[500_000.0, 10_000.0, 50_000.0],
            &[300_000.0, 150_000.0, 49_000.0],
            DEFAULT_OUTLIER_THRESHOLD,
        );
        assert_eq!(eval.under_predicted.len(), 1);
        assert_eq!(eval.under_predicted[0].index, 0);
        assert_eq!(eval.over_predicted.len(), 1);
        assert_eq!(eval.over_predicted[0].index, 1);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let eval = Evaluation::compute(&[100_000.0], &[0.0], DEFAULT_OUTLIER_THRESHOLD);
        assert_eq!(eval.under_predicted.len(), 1);
    }
}

use chrono::Utc;

use super::{AnalysisResult, Outlier, Severity, TimeRange, Trend};
use crate::session::Batch;

/// A reading is an outlier when |value - mean| / stddev exceeds this
const OUTLIER_SIGMA: f64 = 2.0;

/// Slope magnitude below which a batch is considered flat
const TREND_SLOPE_EPSILON: f64 = 0.1;

/// Domain thresholds feeding the textual warnings; the engine itself fixes
/// nothing domain-specific
#[derive(Debug, Clone, Copy)]
pub struct WarningThresholds {
    pub safe_max: f64,
    pub safe_min: f64,
}

/// Analyze one batch. Pure: same batch and thresholds, same result.
///
/// Panics if the batch is empty; the accumulator never produces one.
pub fn analyze(batch: &Batch, thresholds: &WarningThresholds) -> AnalysisResult {
    assert!(!batch.is_empty(), "batch must contain at least one reading");

    let values: Vec<f64> = batch.readings.iter().map(|r| r.value).collect();
    let count = values.len();

    let mean = values.iter().sum::<f64>() / count as f64;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    // Population variance over the full batch
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let stddev = variance.sqrt();

    // With zero spread every reading equals the mean; nothing can deviate
    let outliers: Vec<Outlier> = if stddev > 0.0 {
        batch
            .readings
            .iter()
            .filter_map(|reading| {
                let deviation_score = (reading.value - mean).abs() / stddev;
                (deviation_score > OUTLIER_SIGMA).then(|| Outlier {
                    value: reading.value,
                    timestamp: reading.collected_at,
                    deviation_score,
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    let trend = classify_trend(&values);
    let outlier_ratio = outliers.len() as f64 / count as f64;
    let severity = classify_severity(outlier_ratio);
    let warnings = build_warnings(min, max, outliers.len(), thresholds);

    AnalysisResult {
        device_id: batch.device_id.clone(),
        batch_id: batch.id.clone(),
        reading_count: count,
        time_range: TimeRange {
            start: batch.readings[0].collected_at,
            end: batch.readings[count - 1].collected_at,
        },
        mean,
        min,
        max,
        stddev,
        outliers,
        trend,
        severity,
        warnings,
        risk: None,
        ledger_tx_id: None,
        analyzed_at: Utc::now(),
    }
}

fn classify_trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }
    let slope = (values[values.len() - 1] - values[0]) / (values.len() - 1) as f64;
    if slope > TREND_SLOPE_EPSILON {
        Trend::Rising
    } else if slope < -TREND_SLOPE_EPSILON {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

fn classify_severity(outlier_ratio: f64) -> Severity {
    if outlier_ratio >= 0.5 {
        Severity::Critical
    } else if outlier_ratio >= 0.3 {
        Severity::High
    } else if outlier_ratio >= 0.2 {
        Severity::Medium
    } else if outlier_ratio >= 0.1 {
        Severity::Low
    } else {
        Severity::Normal
    }
}

fn build_warnings(
    min: f64,
    max: f64,
    outlier_count: usize,
    thresholds: &WarningThresholds,
) -> Vec<String> {
    let mut warnings = Vec::new();
    if max > thresholds.safe_max {
        warnings.push(format!(
            "value {max:.1} exceeds safe maximum {:.1}",
            thresholds.safe_max
        ));
    }
    if min < thresholds.safe_min {
        warnings.push(format!(
            "value {min:.1} below safe minimum {:.1}",
            thresholds.safe_min
        ));
    }
    if outlier_count > 0 {
        warnings.push(format!("{outlier_count} outlier(s) detected"));
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Reading;
    use chrono::Utc;

    const THRESHOLDS: WarningThresholds = WarningThresholds {
        safe_max: 50.0,
        safe_min: 0.0,
    };

    fn batch_of(values: &[f64]) -> Batch {
        let readings = values
            .iter()
            .map(|&value| Reading {
                device_id: "dev-a".to_string(),
                value,
                unit: "celsius".to_string(),
                collected_at: Utc::now(),
                location: None,
            })
            .collect();
        Batch {
            id: "dev-a-1".to_string(),
            device_id: "dev-a".to_string(),
            readings,
        }
    }

    #[test]
    fn test_spike_is_flagged_as_outlier() {
        let batch = batch_of(&[20.0, 21.0, 19.0, 22.0, 21.0, 20.0, 50.0, 21.0, 19.0, 20.0]);
        let result = analyze(&batch, &THRESHOLDS);

        assert!((result.mean - 23.3).abs() < 1e-9);
        assert_eq!(result.outliers.len(), 1);
        assert_eq!(result.outliers[0].value, 50.0);
        assert!(result.outliers[0].deviation_score > 2.0);
        assert!(result.severity >= Severity::Low);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("outlier(s) detected")));
    }

    #[test]
    fn test_identical_readings_have_no_outliers() {
        let batch = batch_of(&[21.0; 10]);
        let result = analyze(&batch, &THRESHOLDS);

        assert_eq!(result.stddev, 0.0);
        assert!(result.outliers.is_empty());
        assert_eq!(result.severity, Severity::Normal);
        assert_eq!(result.trend, Trend::Stable);
    }

    #[test]
    fn test_trend_rising() {
        let batch = batch_of(&[20.0, 20.5, 21.0, 21.5, 22.0]);
        assert_eq!(analyze(&batch, &THRESHOLDS).trend, Trend::Rising);
    }

    #[test]
    fn test_trend_falling() {
        let batch = batch_of(&[22.0, 21.5, 21.0, 20.5, 20.0]);
        assert_eq!(analyze(&batch, &THRESHOLDS).trend, Trend::Falling);
    }

    #[test]
    fn test_trend_stable_for_near_flat() {
        let batch = batch_of(&[21.0, 21.05, 21.1, 21.15, 21.2]);
        assert_eq!(analyze(&batch, &THRESHOLDS).trend, Trend::Stable);
    }

    #[test]
    fn test_single_reading_batch_is_stable() {
        let batch = batch_of(&[21.0]);
        let result = analyze(&batch, &THRESHOLDS);
        assert_eq!(result.trend, Trend::Stable);
        assert_eq!(result.reading_count, 1);
    }

    #[test]
    fn test_severity_ladder() {
        assert_eq!(super::classify_severity(0.5), Severity::Critical);
        assert_eq!(super::classify_severity(0.3), Severity::High);
        assert_eq!(super::classify_severity(0.2), Severity::Medium);
        assert_eq!(super::classify_severity(0.1), Severity::Low);
        assert_eq!(super::classify_severity(0.05), Severity::Normal);
    }

    #[test]
    fn test_boundary_warnings() {
        let batch = batch_of(&[-5.0, 20.0, 60.0]);
        let result = analyze(&batch, &THRESHOLDS);

        assert!(result.warnings.iter().any(|w| w.contains("safe maximum")));
        assert!(result.warnings.iter().any(|w| w.contains("safe minimum")));
    }

    #[test]
    fn test_time_range_spans_batch() {
        let batch = batch_of(&[20.0, 21.0, 22.0]);
        let result = analyze(&batch, &THRESHOLDS);
        assert!(result.time_range.start <= result.time_range.end);
        assert_eq!(result.reading_count, 3);
    }
}

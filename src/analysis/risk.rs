use serde::{Deserialize, Serialize};

use super::{AnalysisResult, Trend};

/// Features handed to the risk-scoring capability
#[derive(Debug, Clone)]
pub struct RiskFeatures {
    pub mean: f64,
    pub stddev: f64,
    pub outlier_ratio: f64,
    /// Spread between the batch minimum and maximum
    pub span: f64,
    pub trend: Trend,
    pub reading_count: usize,
}

impl RiskFeatures {
    pub fn from_result(result: &AnalysisResult) -> Self {
        Self {
            mean: result.mean,
            stddev: result.stddev,
            outlier_ratio: result.outlier_ratio(),
            span: result.max - result.min,
            trend: result.trend,
            reading_count: result.reading_count,
        }
    }
}

/// Output of the risk-scoring capability, merged into the analysis result
/// as auxiliary fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    /// Risk in [0, 1]
    pub risk_score: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub label: String,
}

/// Pluggable risk-scoring capability. Implementations may be deterministic
/// or learned; their output never overrides the deterministic severity.
pub trait RiskScorer: Send + Sync {
    fn score(&self, features: &RiskFeatures) -> RiskScore;
}

/// Deterministic default scorer: weighs the outlier ratio against the
/// relative spread, with a small bump for a moving trend.
#[derive(Debug, Clone)]
pub struct ThresholdScorer {
    outlier_weight: f64,
    spread_weight: f64,
    trend_bump: f64,
}

impl Default for ThresholdScorer {
    fn default() -> Self {
        Self {
            outlier_weight: 0.6,
            spread_weight: 0.3,
            trend_bump: 0.1,
        }
    }
}

impl RiskScorer for ThresholdScorer {
    fn score(&self, features: &RiskFeatures) -> RiskScore {
        // Spread relative to the mean magnitude, saturating at 1
        let relative_spread = if features.mean.abs() > f64::EPSILON {
            (features.span / features.mean.abs()).min(1.0)
        } else if features.span > 0.0 {
            1.0
        } else {
            0.0
        };

        let mut risk = self.outlier_weight * features.outlier_ratio
            + self.spread_weight * relative_spread;
        if features.trend != Trend::Stable {
            risk += self.trend_bump;
        }
        let risk_score = risk.clamp(0.0, 1.0);

        // Larger batches give the score more backing
        let confidence = (features.reading_count as f64 / 10.0).clamp(0.1, 1.0);

        let label = if risk_score >= 0.7 {
            "anomalous"
        } else if risk_score >= 0.3 {
            "elevated"
        } else {
            "nominal"
        };

        RiskScore {
            risk_score,
            confidence,
            label: label.to_string(),
        }
    }
}

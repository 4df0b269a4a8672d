mod engine;
mod risk;

pub use engine::{analyze, WarningThresholds};
pub use risk::{RiskFeatures, RiskScore, RiskScorer, ThresholdScorer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{BatchId, DeviceId};

/// Direction of the batch trend line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Rising => write!(f, "rising"),
            Trend::Falling => write!(f, "falling"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Batch severity, driven by the outlier ratio. Ordered from quietest to
/// most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Normal => write!(f, "normal"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A reading whose deviation from the batch mean, normalized by standard
/// deviation, exceeded the outlier threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outlier {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub deviation_score: f64,
}

/// Covered time span of a batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Analysis of one batch. Created once per batch, updated exactly once with
/// the ledger transaction id after submission, never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub device_id: DeviceId,
    pub batch_id: BatchId,
    pub reading_count: usize,
    pub time_range: TimeRange,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
    pub outliers: Vec<Outlier>,
    pub trend: Trend,
    pub severity: Severity,
    pub warnings: Vec<String>,
    /// Auxiliary score from the pluggable risk capability; never overrides
    /// the deterministic severity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_tx_id: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Ratio of outliers to readings in the batch
    pub fn outlier_ratio(&self) -> f64 {
        if self.reading_count == 0 {
            return 0.0;
        }
        self.outliers.len() as f64 / self.reading_count as f64
    }
}

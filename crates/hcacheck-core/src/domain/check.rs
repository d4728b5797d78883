//! Check results and the aggregated health report.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Normal,
    Abnormal,
    /// Nothing to compare against (no adapter, no spec field, IPv6-only).
    Skipped,
}

/// Severity attached to an abnormal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckLevel {
    Info,
    Warning,
    Critical,
}

/// Outcome of one check item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub level: CheckLevel,
    /// Comma-separated devices that failed.
    pub device: String,
    pub current: String,
    pub expected: String,
    pub detail: String,
}

impl CheckResult {
    pub fn new(name: &str, level: CheckLevel) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Normal,
            level,
            device: String::new(),
            current: String::new(),
            expected: String::new(),
            detail: String::new(),
        }
    }

    pub fn skipped(name: &str, detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Skipped,
            detail: detail.into(),
            ..Self::new(name, CheckLevel::Info)
        }
    }

    pub fn is_abnormal(&self) -> bool {
        self.status == CheckStatus::Abnormal
    }
}

/// All check results of one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub results: Vec<CheckResult>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl CheckReport {
    pub fn new(results: Vec<CheckResult>) -> Self {
        Self {
            results,
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn status(&self) -> CheckStatus {
        if self.results.iter().any(CheckResult::is_abnormal) {
            CheckStatus::Abnormal
        } else {
            CheckStatus::Normal
        }
    }

    /// Highest level among abnormal results.
    pub fn level(&self) -> CheckLevel {
        self.results
            .iter()
            .filter(|r| r.is_abnormal())
            .map(|r| r.level)
            .max()
            .unwrap_or(CheckLevel::Info)
    }
}

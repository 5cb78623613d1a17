//! Study-level views: risk summary, dashboard metrics and the matrix
//! reference table.

use crate::{
    access::{authorize, Scope},
    config::RiskMatrixConfig,
    error::HazopResult,
    hierarchy::AssessmentPhase,
    rating::ImpactCategory,
    risk_engine::{RiskColor, RiskLevel},
    store::{AssessedItem, HazopStore, NodeDeviationCount, StudyTotals},
    types::{EntityId, TenantContext},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Most severe items listed in a risk summary.
pub const HIGH_RISK_ITEM_LIMIT: usize = 10;

/// Per-level counts. Keys serialize as "Low" … "Critical".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskCounts {
    #[serde(rename = "Low")]
    pub low: usize,
    #[serde(rename = "Medium")]
    pub medium: usize,
    #[serde(rename = "High")]
    pub high: usize,
    #[serde(rename = "Critical")]
    pub critical: usize,
    #[serde(rename = "Not Assessed")]
    pub not_assessed: usize,
}

impl RiskCounts {
    fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Low      => self.low += 1,
            RiskLevel::Medium   => self.medium += 1,
            RiskLevel::High     => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }

    pub fn get(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::Low      => self.low,
            RiskLevel::Medium   => self.medium,
            RiskLevel::High     => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRiskSummary {
    pub study_id: EntityId,
    pub total_deviations: usize,
    /// Deviations bucketed by their worst assessed item.
    pub risk_counts: RiskCounts,
    pub high_risk_items: Vec<AssessedItem>,
    /// Share of deviations with at least one assessment, 0–100.
    pub assessment_completion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMetrics {
    pub study_id: EntityId,
    pub title: String,
    pub facility_name: Option<String>,
    #[serde(flatten)]
    pub totals: StudyTotals,
    /// Assessments per level, lowercase keys.
    pub risk_distribution: BTreeMap<String, usize>,
    pub deviations_by_node: Vec<NodeDeviationCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBand {
    pub level: RiskLevel,
    pub min_score: u8,
    pub max_score: u8,
    pub color: RiskColor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMatrixReference {
    pub bands: Vec<RiskBand>,
    pub impact_descriptions: BTreeMap<ImpactCategory, BTreeMap<u8, String>>,
    pub likelihood_descriptions: BTreeMap<u8, String>,
}

/// Band table plus the configured wording for each rating step.
pub fn risk_matrix(config: &RiskMatrixConfig) -> RiskMatrixReference {
    let bands = RiskLevel::ALL
        .into_iter()
        .map(|level| {
            let (min_score, max_score) = level.score_range();
            RiskBand {
                level,
                min_score,
                max_score,
                color: level.color(),
            }
        })
        .collect();
    RiskMatrixReference {
        bands,
        impact_descriptions: config.impact_descriptions.clone(),
        likelihood_descriptions: config.likelihood_descriptions.clone(),
    }
}

pub struct StudyReporter<'a> {
    store: &'a HazopStore,
}

impl<'a> StudyReporter<'a> {
    pub fn new(store: &'a HazopStore) -> Self {
        Self { store }
    }

    /// Initial-phase risk picture of a study.
    pub fn risk_summary(&self, ctx: &TenantContext, study_id: &str) -> HazopResult<StudyRiskSummary> {
        authorize(self.store, ctx, Scope::Study(study_id))?;

        let peaks = self
            .store
            .deviation_peak_scores(study_id, AssessmentPhase::Initial)?;
        let mut risk_counts = RiskCounts::default();
        for (_, peak) in &peaks {
            match peak {
                Some(score) => risk_counts.record(RiskLevel::from_score(*score)),
                None => risk_counts.not_assessed += 1,
            }
        }

        let mut high_risk_items: Vec<AssessedItem> = self
            .store
            .assessed_items(study_id, AssessmentPhase::Initial)?
            .into_iter()
            .filter(|item| item.risk_level.is_elevated())
            .collect();
        high_risk_items.truncate(HIGH_RISK_ITEM_LIMIT);

        let total = peaks.len();
        let assessment_completion = if total == 0 {
            0.0
        } else {
            (total - risk_counts.not_assessed) as f64 / total as f64 * 100.0
        };

        Ok(StudyRiskSummary {
            study_id: study_id.to_string(),
            total_deviations: total,
            risk_counts,
            high_risk_items,
            assessment_completion,
        })
    }

    /// Dashboard numbers for a study.
    pub fn metrics(&self, ctx: &TenantContext, study_id: &str) -> HazopResult<StudyMetrics> {
        authorize(self.store, ctx, Scope::Study(study_id))?;
        let study = self.store.get_study(study_id)?;

        let mut risk_distribution: BTreeMap<String, usize> = RiskLevel::ALL
            .into_iter()
            .map(|l| (l.as_str().to_lowercase(), 0))
            .collect();
        for item in self.store.assessed_items(study_id, AssessmentPhase::Initial)? {
            *risk_distribution
                .entry(item.risk_level.as_str().to_lowercase())
                .or_default() += 1;
        }

        Ok(StudyMetrics {
            study_id: study.id,
            title: study.title,
            facility_name: study.facility_name,
            totals: self.store.study_totals(study_id)?,
            risk_distribution,
            deviations_by_node: self.store.deviations_per_node(study_id)?,
        })
    }
}

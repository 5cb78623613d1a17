//! Read-only aggregates for study dashboards.

use super::HazopStore;
use crate::{
    error::HazopResult,
    hierarchy::{AssessmentPhase, AssessmentTarget},
    risk_engine::{RiskColor, RiskLevel, RiskOutcome},
    types::EntityId,
};
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudyTotals {
    pub total_nodes: i64,
    pub total_deviations: i64,
    pub total_causes: i64,
    pub total_consequences: i64,
    pub total_safeguards: i64,
    pub total_recommendations: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDeviationCount {
    pub node_id: EntityId,
    pub node_name: String,
    pub count: i64,
}

/// One stored assessment joined with what it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessedItem {
    pub target: AssessmentTarget,
    pub deviation_id: EntityId,
    pub description: String,
    pub node_number: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub risk_color: RiskColor,
}

impl HazopStore {
    pub fn study_totals(&self, study_id: &str) -> HazopResult<StudyTotals> {
        Ok(self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM node WHERE study_id = ?1),
                (SELECT COUNT(*) FROM deviation d JOIN node n ON n.id = d.node_id
                  WHERE n.study_id = ?1),
                (SELECT COUNT(*) FROM cause c JOIN deviation d ON d.id = c.deviation_id
                  JOIN node n ON n.id = d.node_id WHERE n.study_id = ?1),
                (SELECT COUNT(*) FROM consequence_lineage l JOIN deviation d ON d.id = l.deviation_id
                  JOIN node n ON n.id = d.node_id WHERE n.study_id = ?1),
                (SELECT COUNT(*) FROM safeguard_lineage l JOIN deviation d ON d.id = l.deviation_id
                  JOIN node n ON n.id = d.node_id WHERE n.study_id = ?1),
                (SELECT COUNT(*) FROM recommendation_lineage l JOIN deviation d ON d.id = l.deviation_id
                  JOIN node n ON n.id = d.node_id WHERE n.study_id = ?1)",
            params![study_id],
            |row| {
                Ok(StudyTotals {
                    total_nodes: row.get(0)?,
                    total_deviations: row.get(1)?,
                    total_causes: row.get(2)?,
                    total_consequences: row.get(3)?,
                    total_safeguards: row.get(4)?,
                    total_recommendations: row.get(5)?,
                })
            },
        )?)
    }

    /// Busiest nodes first; creation order among equals.
    pub fn deviations_per_node(&self, study_id: &str) -> HazopResult<Vec<NodeDeviationCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT n.id, n.node_name, COUNT(d.id) AS cnt
             FROM node n LEFT JOIN deviation d ON d.node_id = n.id
             WHERE n.study_id = ?1
             GROUP BY n.id
             ORDER BY cnt DESC, n.rowid ASC",
        )?;
        let rows = stmt.query_map(params![study_id], |row| {
            Ok(NodeDeviationCount {
                node_id: row.get(0)?,
                node_name: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every deviation of the study with the highest score recorded for it
    /// in `phase`, counting consequence-level and legacy deviation-level rows.
    /// `None` when nothing in the deviation is assessed.
    pub fn deviation_peak_scores(
        &self,
        study_id: &str,
        phase: AssessmentPhase,
    ) -> HazopResult<Vec<(EntityId, Option<u8>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, MAX(ra.risk_score)
             FROM deviation d
             JOIN node n ON n.id = d.node_id
             LEFT JOIN consequence_lineage cl ON cl.deviation_id = d.id
             LEFT JOIN risk_assessment ra
                    ON ra.phase = ?2
                   AND (ra.deviation_id = d.id OR ra.consequence_id = cl.consequence_id)
             WHERE n.study_id = ?1
             GROUP BY d.id
             ORDER BY d.rowid ASC",
        )?;
        let rows = stmt.query_map(params![study_id, phase.as_str()], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Assessments of one phase in the study, highest score first.
    pub fn assessed_items(
        &self,
        study_id: &str,
        phase: AssessmentPhase,
    ) -> HazopResult<Vec<AssessedItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT ra.consequence_id, ra.deviation_id, d.id,
                    COALESCE(c.consequence_description, d.deviation_description),
                    n.node_number, ra.max_impact, ra.risk_score
             FROM risk_assessment ra
             LEFT JOIN consequence c ON c.id = ra.consequence_id
             LEFT JOIN consequence_lineage cl ON cl.consequence_id = ra.consequence_id
             JOIN deviation d ON d.id = COALESCE(cl.deviation_id, ra.deviation_id)
             JOIN node n ON n.id = d.node_id
             WHERE n.study_id = ?1 AND ra.phase = ?2
             ORDER BY ra.risk_score DESC, ra.rowid ASC",
        )?;
        let rows = stmt.query_map(params![study_id, phase.as_str()], |row| {
            let consequence_id: Option<String> = row.get(0)?;
            let legacy_deviation: Option<String> = row.get(1)?;
            let deviation_id: String = row.get(2)?;
            let target = match consequence_id {
                Some(id) => AssessmentTarget::Consequence(id),
                None => AssessmentTarget::Deviation(legacy_deviation.unwrap_or_else(|| deviation_id.clone())),
            };
            // Level and colour are re-derived, never read back.
            let outcome = RiskOutcome::from_parts(row.get(5)?, row.get(6)?);
            Ok(AssessedItem {
                target,
                deviation_id,
                description: row.get(3)?,
                node_number: row.get(4)?,
                risk_score: outcome.risk_score,
                risk_level: outcome.risk_level,
                risk_color: outcome.risk_color,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

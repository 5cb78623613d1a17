//! Risk assessment rows.

use super::{analysis::prefixed, bump_revision_on, deviation_of_on, HazopStore};
use crate::{
    assessment::StoredAssessment,
    error::{HazopError, HazopResult},
    hierarchy::{AssessmentPhase, AssessmentTarget},
    rating::{AssessmentInput, ImpactRatingSet, LikelihoodRating},
    risk_engine::RiskOutcome,
    types::{new_id, now_timestamp},
};
use rusqlite::{params, OptionalExtension};

/// Columns as stored. Ratings are re-validated on the way out so a row
/// edited behind our back cannot produce an out-of-range value.
struct AssessmentRow {
    id: String,
    consequence_id: Option<String>,
    deviation_id: Option<String>,
    phase: String,
    input: AssessmentInput,
    notes: Option<String>,
    assessed_by: Option<String>,
    assessed_at: String,
}

const ASSESSMENT_COLUMNS: &str = "id, consequence_id, deviation_id, phase, \
     safety_impact, financial_impact, environmental_impact, reputation_impact, \
     schedule_impact, performance_impact, likelihood, assessment_notes, assessed_by, assessed_at";

fn assessment_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssessmentRow> {
    Ok(AssessmentRow {
        id: row.get(0)?,
        consequence_id: row.get(1)?,
        deviation_id: row.get(2)?,
        phase: row.get(3)?,
        input: AssessmentInput {
            safety_impact: row.get(4)?,
            financial_impact: row.get(5)?,
            environmental_impact: row.get(6)?,
            reputation_impact: row.get(7)?,
            schedule_impact: row.get(8)?,
            performance_impact: row.get(9)?,
            likelihood: row.get(10)?,
        },
        notes: row.get(11)?,
        assessed_by: row.get(12)?,
        assessed_at: row.get(13)?,
    })
}

impl AssessmentRow {
    fn into_stored(self) -> HazopResult<StoredAssessment> {
        let target = match (self.consequence_id, self.deviation_id) {
            (Some(id), _) => AssessmentTarget::Consequence(id),
            (None, Some(id)) => AssessmentTarget::Deviation(id),
            (None, None) => {
                return Err(HazopError::InvalidInput {
                    field: "risk_assessment",
                    reason: format!("row {} has no target", self.id),
                })
            }
        };
        let phase = match self.phase.as_str() {
            "initial" => AssessmentPhase::Initial,
            "residual" => AssessmentPhase::Residual,
            other => {
                return Err(HazopError::InvalidInput {
                    field: "phase",
                    reason: format!("unknown phase '{other}'"),
                })
            }
        };
        let (impacts, likelihood) = self.input.validate()?;
        Ok(StoredAssessment {
            id: self.id,
            target,
            phase,
            outcome: crate::risk_engine::assess(&impacts, likelihood),
            impacts,
            likelihood,
            notes: self.notes,
            assessed_by: self.assessed_by,
            assessed_at: self.assessed_at,
        })
    }
}

fn target_column(target: &AssessmentTarget) -> (&'static str, &str) {
    match target {
        AssessmentTarget::Consequence(id) => ("consequence_id", id),
        AssessmentTarget::Deviation(id) => ("deviation_id", id),
    }
}

impl HazopStore {
    /// Create or fully replace the assessment for (target, phase).
    /// Derived fields are written from `outcome`, never patched.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_assessment(
        &self,
        target: &AssessmentTarget,
        phase: AssessmentPhase,
        impacts: &ImpactRatingSet,
        likelihood: LikelihoodRating,
        outcome: &RiskOutcome,
        notes: Option<&str>,
        assessed_by: Option<&str>,
    ) -> HazopResult<StoredAssessment> {
        let owner = deviation_of_on(&self.conn, &target.as_entity())?;
        let (column, target_id) = target_column(target);
        let (consequence_id, deviation_id) = match target {
            AssessmentTarget::Consequence(id) => (Some(id.as_str()), None),
            AssessmentTarget::Deviation(id) => (None, Some(id.as_str())),
        };

        let tx = self.conn.unchecked_transaction()?;
        let existing: Option<String> = tx
            .query_row(
                &format!("SELECT id FROM risk_assessment WHERE {column} = ?1 AND phase = ?2"),
                params![target_id, phase.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let id = existing.clone().unwrap_or_else(new_id);
        let now = now_timestamp();

        if existing.is_some() {
            tx.execute(
                "UPDATE risk_assessment SET
                    safety_impact = ?1, financial_impact = ?2, environmental_impact = ?3,
                    reputation_impact = ?4, schedule_impact = ?5, performance_impact = ?6,
                    likelihood = ?7, max_impact = ?8, risk_score = ?9, risk_level = ?10,
                    risk_color = ?11, assessment_notes = ?12, assessed_by = ?13, assessed_at = ?14
                 WHERE id = ?15",
                params![
                    impacts.safety.value(),
                    impacts.financial.value(),
                    impacts.environmental.value(),
                    impacts.reputation.value(),
                    impacts.schedule.value(),
                    impacts.performance.value(),
                    likelihood.value(),
                    outcome.max_impact,
                    outcome.risk_score,
                    outcome.risk_level.as_str(),
                    outcome.risk_color.as_str(),
                    notes,
                    assessed_by,
                    now,
                    id,
                ],
            )?;
        } else {
            tx.execute(
                "INSERT INTO risk_assessment (
                    id, consequence_id, deviation_id, phase,
                    safety_impact, financial_impact, environmental_impact,
                    reputation_impact, schedule_impact, performance_impact,
                    likelihood, max_impact, risk_score, risk_level, risk_color,
                    assessment_notes, assessed_by, assessed_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    id,
                    consequence_id,
                    deviation_id,
                    phase.as_str(),
                    impacts.safety.value(),
                    impacts.financial.value(),
                    impacts.environmental.value(),
                    impacts.reputation.value(),
                    impacts.schedule.value(),
                    impacts.performance.value(),
                    likelihood.value(),
                    outcome.max_impact,
                    outcome.risk_score,
                    outcome.risk_level.as_str(),
                    outcome.risk_color.as_str(),
                    notes,
                    assessed_by,
                    now,
                ],
            )?;
        }
        bump_revision_on(&tx, &owner)?;
        tx.commit()?;

        Ok(StoredAssessment {
            id,
            target: target.clone(),
            phase,
            impacts: *impacts,
            likelihood,
            outcome: *outcome,
            notes: notes.map(str::to_string),
            assessed_by: assessed_by.map(str::to_string),
            assessed_at: now,
        })
    }

    pub fn get_assessment(
        &self,
        target: &AssessmentTarget,
        phase: AssessmentPhase,
    ) -> HazopResult<Option<StoredAssessment>> {
        let (column, target_id) = target_column(target);
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ASSESSMENT_COLUMNS} FROM risk_assessment
                     WHERE {column} = ?1 AND phase = ?2"
                ),
                params![target_id, phase.as_str()],
                assessment_row_mapper,
            )
            .optional()?;
        row.map(AssessmentRow::into_stored).transpose()
    }

    /// Returns false when there was nothing to delete.
    pub fn delete_assessment(
        &self,
        target: &AssessmentTarget,
        phase: AssessmentPhase,
    ) -> HazopResult<bool> {
        let owner = deviation_of_on(&self.conn, &target.as_entity())?;
        let (column, target_id) = target_column(target);
        let n = self.conn.execute(
            &format!("DELETE FROM risk_assessment WHERE {column} = ?1 AND phase = ?2"),
            params![target_id, phase.as_str()],
        )?;
        if n > 0 {
            bump_revision_on(&self.conn, &owner)?;
        }
        Ok(n > 0)
    }

    pub fn assessment_count(&self) -> HazopResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM risk_assessment", [], |row| row.get(0))?)
    }

    /// Every assessment of one phase whose target lies inside the study.
    pub fn assessments_for_study(
        &self,
        study_id: &str,
        phase: AssessmentPhase,
    ) -> HazopResult<Vec<StoredAssessment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM risk_assessment ra
             LEFT JOIN consequence_lineage cl ON cl.consequence_id = ra.consequence_id
             JOIN deviation d ON d.id = COALESCE(cl.deviation_id, ra.deviation_id)
             JOIN node n ON n.id = d.node_id
             WHERE n.study_id = ?1 AND ra.phase = ?2
             ORDER BY ra.rowid ASC",
            prefixed("ra", ASSESSMENT_COLUMNS)
        ))?;
        let rows = stmt
            .query_map(params![study_id, phase.as_str()], assessment_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AssessmentRow::into_stored).collect()
    }
}

//! Causes, consequences, safeguards and recommendations.
//!
//! The `*_on` functions take a bare connection so the copy walker can run
//! them inside its transaction.

use super::{bool_flag, bump_revision_on, deviation_of_on, HazopStore};
use crate::{
    error::{HazopError, HazopResult},
    hierarchy::{
        AiProvenance, Cause, Consequence, ConsequenceParent, EntityRef, MitigationParent,
        NewCause, NewConsequence, NewRecommendation, NewSafeguard, Recommendation,
        RecommendationStatus, Safeguard,
    },
    types::{new_id, now_timestamp},
};
use rusqlite::{params, types::Type, Connection, OptionalExtension};

fn provenance(row: &rusqlite::Row<'_>, flag_col: usize) -> rusqlite::Result<AiProvenance> {
    Ok(AiProvenance {
        ai_suggested: row.get::<_, i32>(flag_col)? != 0,
        ai_confidence: row.get(flag_col + 1)?,
    })
}

/// Rebuild a two-column parent reference. The schema CHECK guarantees
/// exactly one of the two is set.
fn parent_columns(
    row: &rusqlite::Row<'_>,
    first: usize,
) -> rusqlite::Result<(Option<String>, Option<String>)> {
    Ok((row.get(first)?, row.get(first + 1)?))
}

fn cause_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cause> {
    Ok(Cause {
        id: row.get(0)?,
        deviation_id: row.get(1)?,
        cause_description: row.get(2)?,
        likelihood: row.get(3)?,
        provenance: provenance(row, 4)?,
    })
}

fn consequence_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Consequence> {
    let parent = match parent_columns(row, 1)? {
        (Some(cause_id), _) => ConsequenceParent::Cause(cause_id),
        (None, Some(deviation_id)) => ConsequenceParent::Deviation(deviation_id),
        (None, None) => return Err(rusqlite::Error::InvalidColumnType(
            1,
            "cause_id".into(),
            Type::Null,
        )),
    };
    Ok(Consequence {
        id: row.get(0)?,
        parent,
        consequence_description: row.get(3)?,
        severity: row.get(4)?,
        category: row.get(5)?,
        provenance: provenance(row, 6)?,
    })
}

fn mitigation_parent(row: &rusqlite::Row<'_>) -> rusqlite::Result<MitigationParent> {
    match parent_columns(row, 1)? {
        (Some(consequence_id), _) => Ok(MitigationParent::Consequence(consequence_id)),
        (None, Some(deviation_id)) => Ok(MitigationParent::Deviation(deviation_id)),
        (None, None) => Err(rusqlite::Error::InvalidColumnType(
            1,
            "consequence_id".into(),
            Type::Null,
        )),
    }
}

fn safeguard_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Safeguard> {
    Ok(Safeguard {
        id: row.get(0)?,
        parent: mitigation_parent(row)?,
        safeguard_description: row.get(3)?,
        safeguard_type: row.get(4)?,
        effectiveness: row.get(5)?,
        provenance: provenance(row, 6)?,
    })
}

fn recommendation_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recommendation> {
    let target_date = row
        .get::<_, Option<String>>(6)?
        .map(|d| {
            chrono::NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
            })
        })
        .transpose()?;
    let status: String = row.get(7)?;
    let status = RecommendationStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Text,
            format!("unknown recommendation status {status:?}").into(),
        )
    })?;
    Ok(Recommendation {
        id: row.get(0)?,
        parent: mitigation_parent(row)?,
        recommendation_description: row.get(3)?,
        priority: row.get(4)?,
        responsible_party: row.get(5)?,
        target_date,
        status,
        provenance: provenance(row, 8)?,
    })
}

const CAUSE_COLUMNS: &str =
    "id, deviation_id, cause_description, likelihood, ai_suggested, ai_confidence";
const CONSEQUENCE_COLUMNS: &str = "id, cause_id, deviation_id, consequence_description, \
     severity, category, ai_suggested, ai_confidence";
const SAFEGUARD_COLUMNS: &str = "id, consequence_id, deviation_id, safeguard_description, \
     safeguard_type, effectiveness, ai_suggested, ai_confidence";
const RECOMMENDATION_COLUMNS: &str = "id, consequence_id, deviation_id, \
     recommendation_description, priority, responsible_party, target_date, status, \
     ai_suggested, ai_confidence";

// ── Inserts ────────────────────────────────────────────────────────

pub(crate) fn insert_cause_on(
    conn: &Connection,
    deviation_id: &str,
    c: &NewCause,
    created_by: Option<&str>,
) -> HazopResult<Cause> {
    let cause = Cause {
        id: new_id(),
        deviation_id: deviation_id.to_string(),
        cause_description: c.cause_description.clone(),
        likelihood: c.likelihood.clone(),
        provenance: c.provenance.clone(),
    };
    conn.execute(
        "INSERT INTO cause (id, deviation_id, cause_description, likelihood,
                            ai_suggested, ai_confidence, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &cause.id,
            &cause.deviation_id,
            &cause.cause_description,
            cause.likelihood.as_deref(),
            bool_flag(cause.provenance.ai_suggested),
            cause.provenance.ai_confidence,
            created_by,
            now_timestamp(),
        ],
    )?;
    Ok(cause)
}

pub(crate) fn insert_consequence_on(
    conn: &Connection,
    parent: &ConsequenceParent,
    c: &NewConsequence,
    created_by: Option<&str>,
) -> HazopResult<Consequence> {
    let (cause_id, deviation_id) = match parent {
        ConsequenceParent::Cause(id) => (Some(id.as_str()), None),
        ConsequenceParent::Deviation(id) => (None, Some(id.as_str())),
    };
    let consequence = Consequence {
        id: new_id(),
        parent: parent.clone(),
        consequence_description: c.consequence_description.clone(),
        severity: c.severity.clone(),
        category: c.category.clone(),
        provenance: c.provenance.clone(),
    };
    conn.execute(
        "INSERT INTO consequence (id, cause_id, deviation_id, consequence_description,
                                  severity, category, ai_suggested, ai_confidence,
                                  created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &consequence.id,
            cause_id,
            deviation_id,
            &consequence.consequence_description,
            consequence.severity.as_deref(),
            consequence.category.as_deref(),
            bool_flag(consequence.provenance.ai_suggested),
            consequence.provenance.ai_confidence,
            created_by,
            now_timestamp(),
        ],
    )?;
    Ok(consequence)
}

fn mitigation_columns(parent: &MitigationParent) -> (Option<&str>, Option<&str>) {
    match parent {
        MitigationParent::Consequence(id) => (Some(id.as_str()), None),
        MitigationParent::Deviation(id) => (None, Some(id.as_str())),
    }
}

pub(crate) fn insert_safeguard_on(
    conn: &Connection,
    parent: &MitigationParent,
    s: &NewSafeguard,
    created_by: Option<&str>,
) -> HazopResult<Safeguard> {
    let (consequence_id, deviation_id) = mitigation_columns(parent);
    let safeguard = Safeguard {
        id: new_id(),
        parent: parent.clone(),
        safeguard_description: s.safeguard_description.clone(),
        safeguard_type: s.safeguard_type.clone(),
        effectiveness: s.effectiveness.clone(),
        provenance: s.provenance.clone(),
    };
    conn.execute(
        "INSERT INTO safeguard (id, consequence_id, deviation_id, safeguard_description,
                                safeguard_type, effectiveness, ai_suggested, ai_confidence,
                                created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &safeguard.id,
            consequence_id,
            deviation_id,
            &safeguard.safeguard_description,
            safeguard.safeguard_type.as_deref(),
            safeguard.effectiveness.as_deref(),
            bool_flag(safeguard.provenance.ai_suggested),
            safeguard.provenance.ai_confidence,
            created_by,
            now_timestamp(),
        ],
    )?;
    Ok(safeguard)
}

/// New recommendations always start `open`.
pub(crate) fn insert_recommendation_on(
    conn: &Connection,
    parent: &MitigationParent,
    r: &NewRecommendation,
    created_by: Option<&str>,
) -> HazopResult<Recommendation> {
    let (consequence_id, deviation_id) = mitigation_columns(parent);
    let recommendation = Recommendation {
        id: new_id(),
        parent: parent.clone(),
        recommendation_description: r.recommendation_description.clone(),
        priority: r.priority.clone(),
        responsible_party: r.responsible_party.clone(),
        target_date: r.target_date,
        status: RecommendationStatus::Open,
        provenance: r.provenance.clone(),
    };
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO recommendation (id, consequence_id, deviation_id,
                                     recommendation_description, priority, responsible_party,
                                     target_date, status, ai_suggested, ai_confidence,
                                     created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            &recommendation.id,
            consequence_id,
            deviation_id,
            &recommendation.recommendation_description,
            recommendation.priority.as_deref(),
            recommendation.responsible_party.as_deref(),
            recommendation.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
            recommendation.status.as_str(),
            bool_flag(recommendation.provenance.ai_suggested),
            recommendation.provenance.ai_confidence,
            created_by,
            now,
        ],
    )?;
    Ok(recommendation)
}

// ── Child listings (connection-level, used by the copy walker) ─────

pub(crate) fn causes_for_deviation_on(conn: &Connection, deviation_id: &str) -> HazopResult<Vec<Cause>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CAUSE_COLUMNS} FROM cause WHERE deviation_id = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params![deviation_id], cause_row_mapper)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn consequences_under_on(
    conn: &Connection,
    parent: &ConsequenceParent,
) -> HazopResult<Vec<Consequence>> {
    let (column, id) = match parent {
        ConsequenceParent::Cause(id) => ("cause_id", id),
        ConsequenceParent::Deviation(id) => ("deviation_id", id),
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONSEQUENCE_COLUMNS} FROM consequence WHERE {column} = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params![id], consequence_row_mapper)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn mitigation_filter(parent: &MitigationParent) -> (&'static str, &str) {
    match parent {
        MitigationParent::Consequence(id) => ("consequence_id", id),
        MitigationParent::Deviation(id) => ("deviation_id", id),
    }
}

pub(crate) fn safeguards_under_on(
    conn: &Connection,
    parent: &MitigationParent,
) -> HazopResult<Vec<Safeguard>> {
    let (column, id) = mitigation_filter(parent);
    let mut stmt = conn.prepare(&format!(
        "SELECT {SAFEGUARD_COLUMNS} FROM safeguard WHERE {column} = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params![id], safeguard_row_mapper)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn recommendations_under_on(
    conn: &Connection,
    parent: &MitigationParent,
) -> HazopResult<Vec<Recommendation>> {
    let (column, id) = mitigation_filter(parent);
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECOMMENDATION_COLUMNS} FROM recommendation WHERE {column} = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params![id], recommendation_row_mapper)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

impl HazopStore {
    // ── Cause ──────────────────────────────────────────────────────

    pub fn insert_cause(
        &self,
        deviation_id: &str,
        c: &NewCause,
        created_by: Option<&str>,
    ) -> HazopResult<Cause> {
        let cause = insert_cause_on(&self.conn, deviation_id, c, created_by)?;
        bump_revision_on(&self.conn, deviation_id)?;
        Ok(cause)
    }

    pub fn causes_for_deviation(&self, deviation_id: &str) -> HazopResult<Vec<Cause>> {
        causes_for_deviation_on(&self.conn, deviation_id)
    }

    // ── Consequence ────────────────────────────────────────────────

    pub fn insert_consequence(
        &self,
        parent: &ConsequenceParent,
        c: &NewConsequence,
        created_by: Option<&str>,
    ) -> HazopResult<Consequence> {
        let owner = match parent {
            ConsequenceParent::Cause(id) => deviation_of_on(&self.conn, &EntityRef::Cause(id.clone()))?,
            ConsequenceParent::Deviation(id) => id.clone(),
        };
        let consequence = insert_consequence_on(&self.conn, parent, c, created_by)?;
        bump_revision_on(&self.conn, &owner)?;
        Ok(consequence)
    }

    pub fn consequences_for_cause(&self, cause_id: &str) -> HazopResult<Vec<Consequence>> {
        consequences_under_on(&self.conn, &ConsequenceParent::Cause(cause_id.to_string()))
    }

    /// Every consequence in the deviation's tree, including legacy ones.
    pub fn consequences_for_deviation(&self, deviation_id: &str) -> HazopResult<Vec<Consequence>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM consequence cq
             JOIN consequence_lineage cl ON cl.consequence_id = cq.id
             WHERE cl.deviation_id = ?1 ORDER BY cq.rowid ASC",
            prefixed("cq", CONSEQUENCE_COLUMNS)
        ))?;
        let rows = stmt.query_map(params![deviation_id], consequence_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Safeguard ──────────────────────────────────────────────────

    pub fn insert_safeguard(
        &self,
        parent: &MitigationParent,
        s: &NewSafeguard,
        created_by: Option<&str>,
    ) -> HazopResult<Safeguard> {
        let owner = self.mitigation_owner(parent)?;
        let safeguard = insert_safeguard_on(&self.conn, parent, s, created_by)?;
        bump_revision_on(&self.conn, &owner)?;
        Ok(safeguard)
    }

    pub fn safeguards_for_consequence(&self, consequence_id: &str) -> HazopResult<Vec<Safeguard>> {
        safeguards_under_on(
            &self.conn,
            &MitigationParent::Consequence(consequence_id.to_string()),
        )
    }

    /// Every safeguard in the deviation's tree, including legacy ones.
    pub fn safeguards_for_deviation(&self, deviation_id: &str) -> HazopResult<Vec<Safeguard>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM safeguard s
             JOIN safeguard_lineage sl ON sl.safeguard_id = s.id
             WHERE sl.deviation_id = ?1 ORDER BY s.rowid ASC",
            prefixed("s", SAFEGUARD_COLUMNS)
        ))?;
        let rows = stmt.query_map(params![deviation_id], safeguard_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Recommendation ─────────────────────────────────────────────

    pub fn insert_recommendation(
        &self,
        parent: &MitigationParent,
        r: &NewRecommendation,
        created_by: Option<&str>,
    ) -> HazopResult<Recommendation> {
        let owner = self.mitigation_owner(parent)?;
        let recommendation = insert_recommendation_on(&self.conn, parent, r, created_by)?;
        bump_revision_on(&self.conn, &owner)?;
        Ok(recommendation)
    }

    pub fn get_recommendation(&self, recommendation_id: &str) -> HazopResult<Recommendation> {
        self.conn
            .query_row(
                &format!("SELECT {RECOMMENDATION_COLUMNS} FROM recommendation WHERE id = ?1"),
                params![recommendation_id],
                recommendation_row_mapper,
            )
            .optional()?
            .ok_or_else(|| HazopError::not_found("recommendation", recommendation_id))
    }

    pub fn recommendations_for_consequence(
        &self,
        consequence_id: &str,
    ) -> HazopResult<Vec<Recommendation>> {
        recommendations_under_on(
            &self.conn,
            &MitigationParent::Consequence(consequence_id.to_string()),
        )
    }

    /// Every recommendation in the deviation's tree, including legacy ones.
    pub fn recommendations_for_deviation(
        &self,
        deviation_id: &str,
    ) -> HazopResult<Vec<Recommendation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM recommendation r
             JOIN recommendation_lineage rl ON rl.recommendation_id = r.id
             WHERE rl.deviation_id = ?1 ORDER BY r.rowid ASC",
            prefixed("r", RECOMMENDATION_COLUMNS)
        ))?;
        let rows = stmt.query_map(params![deviation_id], recommendation_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_recommendation_status(
        &self,
        recommendation_id: &str,
        status: RecommendationStatus,
    ) -> HazopResult<()> {
        let owner = deviation_of_on(
            &self.conn,
            &EntityRef::Recommendation(recommendation_id.to_string()),
        )?;
        self.conn.execute(
            "UPDATE recommendation SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_timestamp(), recommendation_id],
        )?;
        bump_revision_on(&self.conn, &owner)?;
        Ok(())
    }

    // ── Deletes ────────────────────────────────────────────────────

    /// Delete any record below a deviation; children go by cascade.
    pub fn delete_entity(&self, entity: &EntityRef) -> HazopResult<()> {
        let owner = deviation_of_on(&self.conn, entity)?;
        let table = match entity {
            EntityRef::Deviation(_) => return self.delete_deviation(entity.id()),
            EntityRef::Cause(_) => "cause",
            EntityRef::Consequence(_) => "consequence",
            EntityRef::Safeguard(_) => "safeguard",
            EntityRef::Recommendation(_) => "recommendation",
        };
        self.conn.execute(
            &format!("DELETE FROM {table} WHERE id = ?1"),
            params![entity.id()],
        )?;
        bump_revision_on(&self.conn, &owner)?;
        Ok(())
    }

    fn mitigation_owner(&self, parent: &MitigationParent) -> HazopResult<String> {
        match parent {
            MitigationParent::Consequence(id) => {
                deviation_of_on(&self.conn, &EntityRef::Consequence(id.clone()))
            }
            MitigationParent::Deviation(id) => Ok(id.clone()),
        }
    }
}

/// Qualify a comma-separated column list with a table alias.
pub(super) fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

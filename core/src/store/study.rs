//! Organizations, studies, nodes and deviations.

use super::HazopStore;
use crate::{
    error::{HazopError, HazopResult},
    hierarchy::{Deviation, NewDeviation, NewNode, NewStudy, Node, Organization, Study},
    types::{new_id, now_timestamp},
};
use rusqlite::{params, Connection, OptionalExtension};

fn study_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Study> {
    Ok(Study {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        facility_name: row.get(4)?,
        status: row.get(5)?,
    })
}

fn node_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        study_id: row.get(1)?,
        node_number: row.get(2)?,
        node_name: row.get(3)?,
        description: row.get(4)?,
        design_intent: row.get(5)?,
        status: row.get(6)?,
    })
}

fn deviation_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Deviation> {
    Ok(Deviation {
        id: row.get(0)?,
        node_id: row.get(1)?,
        parameter: row.get(2)?,
        guide_word: row.get(3)?,
        deviation_description: row.get(4)?,
        revision: row.get::<_, i64>(5)? as u64,
    })
}

const DEVIATION_COLUMNS: &str =
    "id, node_id, parameter, guide_word, deviation_description, revision";

/// Trim and reject blank (parameter, guide word) values. Matching is exact,
/// so both sides must be normalised the same way at write and at query.
pub(crate) fn normalize_pair(parameter: &str, guide_word: &str) -> HazopResult<(String, String)> {
    let parameter = parameter.trim();
    let guide_word = guide_word.trim();
    if parameter.is_empty() {
        return Err(HazopError::InvalidInput {
            field: "parameter",
            reason: "must not be blank".into(),
        });
    }
    if guide_word.is_empty() {
        return Err(HazopError::InvalidInput {
            field: "guide_word",
            reason: "must not be blank".into(),
        });
    }
    Ok((parameter.to_string(), guide_word.to_string()))
}

pub(crate) fn insert_node_on(conn: &Connection, study_id: &str, n: &NewNode) -> HazopResult<Node> {
    let node = Node {
        id: new_id(),
        study_id: study_id.to_string(),
        node_number: n.node_number.clone(),
        node_name: n.node_name.clone(),
        description: n.description.clone(),
        design_intent: n.design_intent.clone(),
        status: "pending".into(),
    };
    conn.execute(
        "INSERT INTO node (id, study_id, node_number, node_name, description, design_intent, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &node.id,
            &node.study_id,
            &node.node_number,
            &node.node_name,
            node.description.as_deref(),
            node.design_intent.as_deref(),
            &node.status,
            now_timestamp(),
        ],
    )?;
    Ok(node)
}

pub(crate) fn insert_deviation_on(
    conn: &Connection,
    node_id: &str,
    d: &NewDeviation,
) -> HazopResult<Deviation> {
    let (parameter, guide_word) = normalize_pair(&d.parameter, &d.guide_word)?;
    let deviation = Deviation {
        id: new_id(),
        node_id: node_id.to_string(),
        parameter,
        guide_word,
        deviation_description: d.deviation_description.clone(),
        revision: 0,
    };
    conn.execute(
        "INSERT INTO deviation (id, node_id, parameter, guide_word, deviation_description, revision, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            &deviation.id,
            &deviation.node_id,
            &deviation.parameter,
            &deviation.guide_word,
            &deviation.deviation_description,
            now_timestamp(),
        ],
    )?;
    Ok(deviation)
}

pub(crate) fn deviations_for_node_on(conn: &Connection, node_id: &str) -> HazopResult<Vec<Deviation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DEVIATION_COLUMNS} FROM deviation WHERE node_id = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params![node_id], deviation_row_mapper)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

impl HazopStore {
    // ── Organization ───────────────────────────────────────────────

    pub fn insert_organization(&self, name: &str) -> HazopResult<Organization> {
        let org = Organization {
            id: new_id(),
            name: name.to_string(),
            slug: Organization::slug_for(name),
            is_active: true,
        };
        self.conn.execute(
            "INSERT INTO organization (id, name, slug, is_active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![&org.id, &org.name, &org.slug, now_timestamp()],
        )?;
        Ok(org)
    }

    /// Organization with `name`'s slug, created if missing.
    pub fn ensure_organization(&self, name: &str) -> HazopResult<Organization> {
        let existing = self
            .conn
            .query_row(
                "SELECT id FROM organization WHERE slug = ?1",
                params![Organization::slug_for(name)],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match existing {
            Some(id) => self.get_organization(&id),
            None => self.insert_organization(name),
        }
    }

    pub fn get_organization(&self, organization_id: &str) -> HazopResult<Organization> {
        self.conn
            .query_row(
                "SELECT id, name, slug, is_active FROM organization WHERE id = ?1",
                params![organization_id],
                |row| {
                    Ok(Organization {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        slug: row.get(2)?,
                        is_active: row.get::<_, i32>(3)? != 0,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| HazopError::not_found("organization", organization_id))
    }

    // ── Study ──────────────────────────────────────────────────────

    pub fn insert_study(
        &self,
        organization_id: &str,
        created_by: Option<&str>,
        s: &NewStudy,
    ) -> HazopResult<Study> {
        let study = Study {
            id: new_id(),
            organization_id: organization_id.to_string(),
            title: s.title.clone(),
            description: s.description.clone(),
            facility_name: s.facility_name.clone(),
            status: "draft".into(),
        };
        self.conn.execute(
            "INSERT INTO study (id, organization_id, title, description, facility_name, status, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &study.id,
                &study.organization_id,
                &study.title,
                study.description.as_deref(),
                study.facility_name.as_deref(),
                &study.status,
                created_by,
                now_timestamp(),
            ],
        )?;
        Ok(study)
    }

    pub fn get_study(&self, study_id: &str) -> HazopResult<Study> {
        self.conn
            .query_row(
                "SELECT id, organization_id, title, description, facility_name, status
                 FROM study WHERE id = ?1",
                params![study_id],
                study_row_mapper,
            )
            .optional()?
            .ok_or_else(|| HazopError::not_found("study", study_id))
    }

    pub fn studies_for_organization(&self, organization_id: &str) -> HazopResult<Vec<Study>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, organization_id, title, description, facility_name, status
             FROM study WHERE organization_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![organization_id], study_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a study and, by cascade, everything beneath it.
    pub fn delete_study(&self, study_id: &str) -> HazopResult<()> {
        let n = self
            .conn
            .execute("DELETE FROM study WHERE id = ?1", params![study_id])?;
        if n == 0 {
            return Err(HazopError::not_found("study", study_id));
        }
        Ok(())
    }

    // ── Node ───────────────────────────────────────────────────────

    pub fn insert_node(&self, study_id: &str, n: &NewNode) -> HazopResult<Node> {
        insert_node_on(&self.conn, study_id, n)
    }

    pub fn get_node(&self, node_id: &str) -> HazopResult<Node> {
        self.conn
            .query_row(
                "SELECT id, study_id, node_number, node_name, description, design_intent, status
                 FROM node WHERE id = ?1",
                params![node_id],
                node_row_mapper,
            )
            .optional()?
            .ok_or_else(|| HazopError::not_found("node", node_id))
    }

    pub fn nodes_for_study(&self, study_id: &str) -> HazopResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, study_id, node_number, node_name, description, design_intent, status
             FROM node WHERE study_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![study_id], node_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_node(&self, node_id: &str) -> HazopResult<()> {
        let n = self
            .conn
            .execute("DELETE FROM node WHERE id = ?1", params![node_id])?;
        if n == 0 {
            return Err(HazopError::not_found("node", node_id));
        }
        Ok(())
    }

    // ── Deviation ──────────────────────────────────────────────────

    pub fn insert_deviation(&self, node_id: &str, d: &NewDeviation) -> HazopResult<Deviation> {
        insert_deviation_on(&self.conn, node_id, d)
    }

    pub fn get_deviation(&self, deviation_id: &str) -> HazopResult<Deviation> {
        self.conn
            .query_row(
                &format!("SELECT {DEVIATION_COLUMNS} FROM deviation WHERE id = ?1"),
                params![deviation_id],
                deviation_row_mapper,
            )
            .optional()?
            .ok_or_else(|| HazopError::not_found("deviation", deviation_id))
    }

    pub fn deviations_for_node(&self, node_id: &str) -> HazopResult<Vec<Deviation>> {
        deviations_for_node_on(&self.conn, node_id)
    }

    /// Delete a deviation and its whole analysis tree.
    pub fn delete_deviation(&self, deviation_id: &str) -> HazopResult<()> {
        let n = self
            .conn
            .execute("DELETE FROM deviation WHERE id = ?1", params![deviation_id])?;
        if n == 0 {
            return Err(HazopError::not_found("deviation", deviation_id));
        }
        Ok(())
    }

    /// Owning organization of a study, if the study exists.
    pub fn organization_of_study(&self, study_id: &str) -> HazopResult<String> {
        Ok(self.get_study(study_id)?.organization_id)
    }

    /// Owning organization of a node, if the node exists.
    pub fn organization_of_node(&self, node_id: &str) -> HazopResult<String> {
        self.conn
            .query_row(
                "SELECT s.organization_id FROM node n
                 JOIN study s ON s.id = n.study_id
                 WHERE n.id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| HazopError::not_found("node", node_id))
    }
}

//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Services call store methods and never execute SQL directly.

use crate::{
    error::{HazopError, HazopResult},
    event::{AuditLogEntry, HazopEvent},
    hierarchy::EntityRef,
    types::{now_timestamp, OrganizationId, TenantContext},
};
use rusqlite::{params, Connection, OptionalExtension};

mod analysis;
mod assessment;
mod reporting;
mod similarity;
mod study;

pub use reporting::{AssessedItem, NodeDeviationCount, StudyTotals};

pub struct HazopStore {
    conn: Connection,
}

impl HazopStore {
    pub fn open(path: &str) -> HazopResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> HazopResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> HazopResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_analysis.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_risk_assessment.sql"))?;
        Ok(())
    }

    // ── Audit log ──────────────────────────────────────────────

    pub fn append_event(&self, ctx: &TenantContext, event: &HazopEvent) -> HazopResult<()> {
        append_event_on(&self.conn, ctx, event)
    }

    pub fn audit_log(&self, organization_id: &str) -> HazopResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, organization_id, user_id, event_type, payload, created_at
             FROM audit_log WHERE organization_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![organization_id], |row| {
                Ok(AuditLogEntry {
                    id: Some(row.get(0)?),
                    organization_id: row.get(1)?,
                    user_id: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Tree walking ───────────────────────────────────────────

    /// The deviation that owns `entity`, derived by walking parent links.
    pub fn deviation_of(&self, entity: &EntityRef) -> HazopResult<String> {
        deviation_of_on(&self.conn, entity)
    }

    /// Organization owning `entity` through study → node → deviation.
    pub fn organization_of(&self, entity: &EntityRef) -> HazopResult<OrganizationId> {
        let deviation_id = self.deviation_of(entity)?;
        self.conn
            .query_row(
                "SELECT s.organization_id
                 FROM deviation d
                 JOIN node n  ON n.id = d.node_id
                 JOIN study s ON s.id = n.study_id
                 WHERE d.id = ?1",
                params![deviation_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| HazopError::not_found("deviation", deviation_id))
    }
}

pub(crate) fn append_event_on(
    conn: &Connection,
    ctx: &TenantContext,
    event: &HazopEvent,
) -> HazopResult<()> {
    conn.execute(
        "INSERT INTO audit_log (organization_id, user_id, event_type, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            ctx.organization_id,
            ctx.user_id,
            event.type_name(),
            serde_json::to_string(event)?,
            now_timestamp(),
        ],
    )?;
    Ok(())
}

pub(crate) fn bump_revision_on(conn: &Connection, deviation_id: &str) -> HazopResult<()> {
    conn.execute(
        "UPDATE deviation SET revision = revision + 1 WHERE id = ?1",
        params![deviation_id],
    )?;
    Ok(())
}

pub(crate) fn deviation_of_on(conn: &Connection, entity: &EntityRef) -> HazopResult<String> {
    let sql = match entity {
        EntityRef::Deviation(_) => "SELECT id FROM deviation WHERE id = ?1",
        EntityRef::Cause(_) => "SELECT deviation_id FROM cause WHERE id = ?1",
        EntityRef::Consequence(_) => {
            "SELECT deviation_id FROM consequence_lineage WHERE consequence_id = ?1"
        }
        EntityRef::Safeguard(_) => {
            "SELECT deviation_id FROM safeguard_lineage WHERE safeguard_id = ?1"
        }
        EntityRef::Recommendation(_) => {
            "SELECT deviation_id FROM recommendation_lineage WHERE recommendation_id = ?1"
        }
    };
    conn.query_row(sql, params![entity.id()], |row| row.get::<_, Option<String>>(0))
        .optional()?
        .flatten()
        .ok_or_else(|| HazopError::not_found(entity.kind(), entity.id()))
}

fn bool_flag(v: bool) -> i32 {
    if v { 1 } else { 0 }
}

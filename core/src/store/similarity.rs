//! Similar-deviation lookup and the subtree copy walker.
//!
//! Copies run inside one `unchecked_transaction`. The walker only sees a
//! `&Connection`, so an early `?` drops the transaction and SQLite rolls
//! every insert back. The audit row is written on the same transaction.

use super::{
    analysis::{
        causes_for_deviation_on, consequences_under_on, insert_cause_on, insert_consequence_on,
        insert_recommendation_on, insert_safeguard_on, recommendations_under_on,
        safeguards_under_on,
    },
    append_event_on, bump_revision_on,
    study::{deviations_for_node_on, insert_deviation_on, insert_node_on, normalize_pair},
    HazopStore,
};
use crate::{
    error::{HazopError, HazopResult},
    event::HazopEvent,
    hierarchy::{
        AiProvenance, Consequence, ConsequenceParent, MitigationParent, NewCause,
        NewConsequence, NewDeviation, NewNode, NewRecommendation, NewSafeguard,
    },
    similarity::{CancelToken, CopyOptions, CopyResult, DeviationSummary, DuplicatedNode},
    types::TenantContext,
};
use rusqlite::{params, Connection};

fn summary_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviationSummary> {
    Ok(DeviationSummary {
        deviation_id: row.get(0)?,
        node_id: row.get(1)?,
        node_number: row.get(2)?,
        node_name: row.get(3)?,
        study_id: row.get(4)?,
        study_name: row.get(5)?,
        parameter: row.get(6)?,
        guide_word: row.get(7)?,
        deviation_description: row.get(8)?,
        causes_count: row.get(9)?,
        consequences_count: row.get(10)?,
        safeguards_count: row.get(11)?,
        recommendations_count: row.get(12)?,
    })
}

/// Copy every mitigation row (safeguards, recommendations) hanging off
/// `from` onto `to`, as allowed by `options`.
fn copy_mitigations_on(
    conn: &Connection,
    from: &MitigationParent,
    to: &MitigationParent,
    options: &CopyOptions,
    created_by: Option<&str>,
    cancel: &CancelToken,
) -> HazopResult<CopyResult> {
    let mut copied = CopyResult::default();
    if options.copy_safeguards {
        for s in safeguards_under_on(conn, from)? {
            cancel.check()?;
            let new = NewSafeguard {
                safeguard_description: s.safeguard_description,
                safeguard_type: s.safeguard_type,
                effectiveness: s.effectiveness,
                provenance: AiProvenance::default(),
            };
            insert_safeguard_on(conn, to, &new, created_by)?;
            copied.safeguards += 1;
        }
    }
    if options.copy_recommendations {
        for r in recommendations_under_on(conn, from)? {
            cancel.check()?;
            let new = NewRecommendation {
                recommendation_description: r.recommendation_description,
                priority: r.priority,
                responsible_party: r.responsible_party,
                target_date: r.target_date,
                provenance: AiProvenance::default(),
            };
            insert_recommendation_on(conn, to, &new, created_by)?;
            copied.recommendations += 1;
        }
    }
    Ok(copied)
}

fn copy_consequence_on(
    conn: &Connection,
    source: Consequence,
    parent: &ConsequenceParent,
    options: &CopyOptions,
    created_by: Option<&str>,
    cancel: &CancelToken,
) -> HazopResult<CopyResult> {
    cancel.check()?;
    let new = NewConsequence {
        consequence_description: source.consequence_description,
        severity: source.severity,
        category: source.category,
        provenance: AiProvenance::default(),
    };
    let created = insert_consequence_on(conn, parent, &new, created_by)?;
    let mut copied = copy_mitigations_on(
        conn,
        &MitigationParent::Consequence(source.id),
        &MitigationParent::Consequence(created.id),
        options,
        created_by,
        cancel,
    )?;
    copied.consequences += 1;
    Ok(copied)
}

/// Walk `source`'s tree and recreate it under `target`.
pub(crate) fn copy_tree_on(
    conn: &Connection,
    source: &str,
    target: &str,
    options: &CopyOptions,
    created_by: Option<&str>,
    cancel: &CancelToken,
) -> HazopResult<CopyResult> {
    let mut copied = CopyResult::default();

    if options.copy_causes {
        for cause in causes_for_deviation_on(conn, source)? {
            cancel.check()?;
            let new = NewCause {
                cause_description: cause.cause_description,
                likelihood: cause.likelihood,
                provenance: AiProvenance::default(),
            };
            let created = insert_cause_on(conn, target, &new, created_by)?;
            copied.causes += 1;

            if options.copy_consequences {
                let under = ConsequenceParent::Cause(created.id);
                for c in consequences_under_on(conn, &ConsequenceParent::Cause(cause.id))? {
                    copied += copy_consequence_on(conn, c, &under, options, created_by, cancel)?;
                }
            }
        }
    }

    // Legacy rows attached straight to the deviation.
    if options.copy_consequences {
        let under = ConsequenceParent::Deviation(target.to_string());
        for c in consequences_under_on(conn, &ConsequenceParent::Deviation(source.to_string()))? {
            copied += copy_consequence_on(conn, c, &under, options, created_by, cancel)?;
        }
    }
    copied += copy_mitigations_on(
        conn,
        &MitigationParent::Deviation(source.to_string()),
        &MitigationParent::Deviation(target.to_string()),
        options,
        created_by,
        cancel,
    )?;

    Ok(copied)
}

impl HazopStore {
    /// Deviations of `organization_id` sharing the exact (trimmed) pair,
    /// newest first, with child counts derived through the lineage views.
    pub fn similar_deviations(
        &self,
        organization_id: &str,
        parameter: &str,
        guide_word: &str,
        exclude: Option<&str>,
    ) -> HazopResult<Vec<DeviationSummary>> {
        let (parameter, guide_word) = normalize_pair(parameter, guide_word)?;
        let mut stmt = self.conn.prepare(
            "SELECT d.id, n.id, n.node_number, n.node_name, s.id, s.title,
                    d.parameter, d.guide_word, d.deviation_description,
                    (SELECT COUNT(*) FROM cause c WHERE c.deviation_id = d.id),
                    (SELECT COUNT(*) FROM consequence_lineage cl WHERE cl.deviation_id = d.id),
                    (SELECT COUNT(*) FROM safeguard_lineage sl WHERE sl.deviation_id = d.id),
                    (SELECT COUNT(*) FROM recommendation_lineage rl WHERE rl.deviation_id = d.id)
             FROM deviation d
             JOIN node n  ON n.id = d.node_id
             JOIN study s ON s.id = n.study_id
             WHERE s.organization_id = ?1
               AND d.parameter = ?2
               AND d.guide_word = ?3
               AND (?4 IS NULL OR d.id <> ?4)
             ORDER BY d.created_at DESC, d.rowid DESC",
        )?;
        let rows = stmt.query_map(
            params![organization_id, parameter, guide_word, exclude],
            summary_row_mapper,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Copy `source`'s analysis tree onto `target` in one transaction,
    /// audited as `ctx`.
    pub fn copy_subtree(
        &self,
        ctx: &TenantContext,
        source: &str,
        target: &str,
        options: &CopyOptions,
        cancel: &CancelToken,
    ) -> HazopResult<CopyResult> {
        if source == target {
            return Err(HazopError::InvalidInput {
                field: "source_deviation_id",
                reason: "a deviation cannot be copied onto itself".into(),
            });
        }
        // Both must exist before anything is written.
        self.get_deviation(source)?;
        self.get_deviation(target)?;

        let created_by = ctx.user_id.as_deref();
        let tx = self.conn.unchecked_transaction()?;
        let result = (|| -> HazopResult<CopyResult> {
            let copied = copy_tree_on(&tx, source, target, options, created_by, cancel)?;
            if !copied.is_empty() {
                bump_revision_on(&tx, target)?;
            }
            append_event_on(
                &tx,
                ctx,
                &HazopEvent::SubtreeCopied {
                    source_deviation_id: source.to_string(),
                    target_deviation_id: target.to_string(),
                    copied,
                },
            )?;
            Ok(copied)
        })();

        match result {
            Ok(copied) => {
                tx.commit()?;
                Ok(copied)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    /// Duplicate a node into the same study, optionally with its deviations.
    pub fn duplicate_node(
        &self,
        ctx: &TenantContext,
        source_node: &str,
        new_node: &NewNode,
        include_deviations: bool,
        options: &CopyOptions,
        cancel: &CancelToken,
    ) -> HazopResult<DuplicatedNode> {
        let source = self.get_node(source_node)?;
        if new_node.node_number.trim().is_empty() {
            return Err(HazopError::InvalidInput {
                field: "node_number",
                reason: "must not be blank".into(),
            });
        }
        let fields = NewNode {
            node_number: new_node.node_number.clone(),
            node_name: new_node.node_name.clone(),
            description: new_node.description.clone().or(source.description),
            design_intent: new_node.design_intent.clone().or(source.design_intent),
        };

        let created_by = ctx.user_id.as_deref();
        let tx = self.conn.unchecked_transaction()?;
        let result = (|| -> HazopResult<DuplicatedNode> {
            let node = insert_node_on(&tx, &source.study_id, &fields)?;
            let mut deviations = 0;
            let mut copied = CopyResult::default();
            let listed = if include_deviations {
                deviations_for_node_on(&tx, source_node)?
            } else {
                Vec::new()
            };
            for d in listed {
                cancel.check()?;
                let new = NewDeviation {
                    parameter: d.parameter,
                    guide_word: d.guide_word,
                    deviation_description: d.deviation_description,
                };
                let created = insert_deviation_on(&tx, &node.id, &new)?;
                let tree = copy_tree_on(&tx, &d.id, &created.id, options, created_by, cancel)?;
                if !tree.is_empty() {
                    bump_revision_on(&tx, &created.id)?;
                }
                copied += tree;
                deviations += 1;
            }
            append_event_on(
                &tx,
                ctx,
                &HazopEvent::NodeDuplicated {
                    source_node_id: source_node.to_string(),
                    new_node_id: node.id.clone(),
                    deviations,
                    copied,
                },
            )?;
            Ok(DuplicatedNode { node, deviations, copied })
        })();

        match result {
            Ok(duplicated) => {
                tx.commit()?;
                Ok(duplicated)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }
}

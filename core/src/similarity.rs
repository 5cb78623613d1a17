//! Similarity matching and "copy from previous".
//!
//! A new deviation is matched against earlier deviations of the same
//! organization that share its (parameter, guide word) pair. Picking a match
//! deep-copies the match's analysis tree onto the new deviation.
//!
//! RULES:
//!   - Matching never crosses organizations.
//!   - A copy is one transaction, its audit row included. Any failure,
//!     cancellation included, leaves the target exactly as it was.
//!   - A deviation is never copied onto itself.
//!   - Risk assessments and AI provenance stay with the source.

use crate::{
    access::{authorize, Scope},
    config::SimilarityConfig,
    error::{HazopError, HazopResult},
    hierarchy::{EntityRef, NewNode, Node},
    store::HazopStore,
    types::{EntityId, TenantContext},
};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// One prior deviation offered as a copy source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationSummary {
    pub deviation_id: EntityId,
    pub node_id: EntityId,
    pub node_number: String,
    pub node_name: String,
    pub study_id: EntityId,
    pub study_name: String,
    pub parameter: String,
    pub guide_word: String,
    pub deviation_description: String,
    pub causes_count: i64,
    pub consequences_count: i64,
    pub safeguards_count: i64,
    pub recommendations_count: i64,
}

impl DeviationSummary {
    /// Recommendations alone do not count as reusable analysis.
    pub fn has_content(&self) -> bool {
        self.causes_count > 0 || self.consequences_count > 0 || self.safeguards_count > 0
    }
}

/// Which levels of the tree to copy. A level is only reached through a
/// copied parent; legacy deviation-level rows need only their own flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOptions {
    #[serde(default = "yes")]
    pub copy_causes: bool,
    #[serde(default = "yes")]
    pub copy_consequences: bool,
    #[serde(default = "yes")]
    pub copy_safeguards: bool,
    #[serde(default)]
    pub copy_recommendations: bool,
}

fn yes() -> bool {
    true
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            copy_causes: true,
            copy_consequences: true,
            copy_safeguards: true,
            copy_recommendations: false,
        }
    }
}

impl CopyOptions {
    pub fn nothing() -> Self {
        Self {
            copy_causes: false,
            copy_consequences: false,
            copy_safeguards: false,
            copy_recommendations: false,
        }
    }

    pub fn everything() -> Self {
        Self {
            copy_recommendations: true,
            ..Self::default()
        }
    }
}

/// Rows created by a copy, per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CopyResult {
    pub causes: usize,
    pub consequences: usize,
    pub safeguards: usize,
    pub recommendations: usize,
}

impl CopyResult {
    pub fn total(&self) -> usize {
        self.causes + self.consequences + self.safeguards + self.recommendations
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for CopyResult {
    fn add_assign(&mut self, other: Self) {
        self.causes += other.causes;
        self.consequences += other.consequences;
        self.safeguards += other.safeguards;
        self.recommendations += other.recommendations;
    }
}

/// Cooperative cancellation for long copies. Checked before every insert.
/// Clones share the flag, so another thread can cancel a running copy.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels itself once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub fn check(&self) -> HazopResult<()> {
        if self.is_cancelled() {
            Err(HazopError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Request to duplicate a node. Unlike copy-from-previous, every level
/// is carried over unless switched off, recommendations included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateNodeRequest {
    pub new_node_number: String,
    pub new_node_name: String,
    #[serde(default = "yes")]
    pub include_deviations: bool,
    #[serde(default = "yes")]
    pub copy_causes: bool,
    #[serde(default = "yes")]
    pub copy_consequences: bool,
    #[serde(default = "yes")]
    pub copy_safeguards: bool,
    #[serde(default = "yes")]
    pub copy_recommendations: bool,
}

impl DuplicateNodeRequest {
    pub fn new(new_node_number: impl Into<String>, new_node_name: impl Into<String>) -> Self {
        Self {
            new_node_number: new_node_number.into(),
            new_node_name: new_node_name.into(),
            include_deviations: true,
            copy_causes: true,
            copy_consequences: true,
            copy_safeguards: true,
            copy_recommendations: true,
        }
    }

    pub fn with_copy(mut self, options: CopyOptions) -> Self {
        self.copy_causes = options.copy_causes;
        self.copy_consequences = options.copy_consequences;
        self.copy_safeguards = options.copy_safeguards;
        self.copy_recommendations = options.copy_recommendations;
        self
    }

    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            copy_causes: self.copy_causes,
            copy_consequences: self.copy_consequences,
            copy_safeguards: self.copy_safeguards,
            copy_recommendations: self.copy_recommendations,
        }
    }
}

/// Outcome of duplicating a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatedNode {
    pub node: Node,
    pub deviations: usize,
    pub copied: CopyResult,
}

pub struct SimilarityMatcher<'a> {
    store: &'a HazopStore,
    config: &'a SimilarityConfig,
}

impl<'a> SimilarityMatcher<'a> {
    pub fn new(store: &'a HazopStore, config: &'a SimilarityConfig) -> Self {
        Self { store, config }
    }

    /// Prior deviations of the caller's organization with the same pair,
    /// newest first. `exclude` is normally the deviation being edited.
    pub fn find_similar(
        &self,
        ctx: &TenantContext,
        parameter: &str,
        guide_word: &str,
        exclude: Option<&str>,
    ) -> HazopResult<Vec<DeviationSummary>> {
        let rows = self
            .store
            .similar_deviations(&ctx.organization_id, parameter, guide_word, exclude)?;
        let found = rows.len();
        let mut matches: Vec<DeviationSummary> = rows
            .into_iter()
            .filter(|m| !self.config.require_content || m.has_content())
            .collect();
        if let Some(max) = self.config.max_results {
            matches.truncate(max);
        }
        log::debug!(
            "find_similar org={} ({parameter:?}, {guide_word:?}): {found} rows, {} returned",
            ctx.organization_id,
            matches.len()
        );
        Ok(matches)
    }

    /// Deep-copy `source`'s analysis tree onto `target`.
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
        authorize(self.store, ctx, Scope::Entity(&EntityRef::Deviation(source.to_string())))?;
        authorize(self.store, ctx, Scope::Entity(&EntityRef::Deviation(target.to_string())))?;

        let copied = self
            .store
            .copy_subtree(ctx, source, target, options, cancel)
            .map_err(|cause| {
                log::warn!("copy {source} -> {target} rolled back: {cause}");
                HazopError::CopyRolledBack {
                    source_deviation: source.to_string(),
                    cause: Box::new(cause),
                }
            })?;
        log::info!(
            "copied {source} -> {target}: {} causes, {} consequences, {} safeguards, {} recommendations",
            copied.causes,
            copied.consequences,
            copied.safeguards,
            copied.recommendations
        );
        Ok(copied)
    }

    /// Copy a node, its deviations and their trees into the same study.
    /// Recommendations come back as `open`.
    pub fn duplicate_node(
        &self,
        ctx: &TenantContext,
        source_node: &str,
        request: &DuplicateNodeRequest,
        cancel: &CancelToken,
    ) -> HazopResult<DuplicatedNode> {
        authorize(self.store, ctx, Scope::Node(source_node))?;
        let new_node = NewNode {
            node_number: request.new_node_number.clone(),
            node_name: request.new_node_name.clone(),
            ..NewNode::default()
        };
        let duplicated = self.store.duplicate_node(
            ctx,
            source_node,
            &new_node,
            request.include_deviations,
            &request.copy_options(),
            cancel,
        )?;
        log::info!(
            "duplicated node {source_node} as {} ({} deviations)",
            duplicated.node.id,
            duplicated.deviations
        );
        Ok(duplicated)
    }
}

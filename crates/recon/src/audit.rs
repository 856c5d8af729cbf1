use serde::Serialize;

use crate::cleaning::{CleaningStats, CoordinateCorrection, FlaggedGroup};
use crate::config::{CrossScopePolicy, ReconConfig};
use crate::conflicts::{Canonicalization, ConflictStats, CrossScopeCollision};
use crate::corrections::RuleApplication;
use crate::engine::Stage;

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub engine_version: String,
    pub run_at: String,
    pub input: String,
    pub config_name: Option<String>,
    pub stage: Stage,
    pub distance_threshold_m: f64,
    pub coordinate_decimals: u32,
    pub coordinate_precision: f64,
    pub cross_scope: CrossScopePolicy,
}

impl RunMeta {
    pub fn new(config: &ReconConfig, input: &str, stage: Stage) -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            input: input.to_string(),
            config_name: config.name.clone(),
            stage,
            distance_threshold_m: config.cleaning.distance_threshold_m,
            coordinate_decimals: config.cleaning.coordinate_decimals,
            coordinate_precision: config.conflicts.coordinate_precision,
            cross_scope: config.conflicts.cross_scope,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub cleaning: Option<CleaningStats>,
    pub conflicts: Option<ConflictStats>,
    pub rules_applied: usize,
    pub rows_touched_by_rules: usize,
    /// Cross-scope collisions counted against the run (only under `fail`).
    pub unresolved_conflicts: usize,
}

/// Everything one run decided, and everything it left for a human.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub meta: RunMeta,
    pub summary: AuditSummary,
    pub rule_applications: Vec<RuleApplication>,
    pub corrections: Vec<CoordinateCorrection>,
    pub flagged: Vec<FlaggedGroup>,
    pub canonicalizations: Vec<Canonicalization>,
    pub cross_scope: Vec<CrossScopeCollision>,
}

impl AuditReport {
    pub fn new(meta: RunMeta) -> Self {
        Self {
            meta,
            summary: AuditSummary::default(),
            rule_applications: Vec::new(),
            corrections: Vec::new(),
            flagged: Vec::new(),
            canonicalizations: Vec::new(),
            cross_scope: Vec::new(),
        }
    }

    pub fn record_rules(&mut self, applied: Vec<RuleApplication>) {
        self.summary.rules_applied = applied.len();
        self.summary.rows_touched_by_rules = applied.iter().map(|a| a.rows_matched).sum();
        self.rule_applications = applied;
    }

    pub fn record_cleaning(
        &mut self,
        stats: CleaningStats,
        corrections: Vec<CoordinateCorrection>,
        flagged: Vec<FlaggedGroup>,
    ) {
        self.summary.cleaning = Some(stats);
        self.corrections = corrections;
        self.flagged = flagged;
    }

    pub fn record_conflicts(
        &mut self,
        stats: ConflictStats,
        canonicalizations: Vec<Canonicalization>,
        cross_scope: Vec<CrossScopeCollision>,
    ) {
        self.summary.unresolved_conflicts = match self.meta.cross_scope {
            CrossScopePolicy::Fail => cross_scope.len(),
            CrossScopePolicy::Ignore | CrossScopePolicy::Report => 0,
        };
        self.summary.conflicts = Some(stats);
        self.canonicalizations = canonicalizations;
        self.cross_scope = cross_scope;
    }

    /// Flagged groups remain, or unresolved conflicts under the `fail` policy.
    pub fn requires_manual_review(&self) -> bool {
        !self.flagged.is_empty() || self.summary.unresolved_conflicts > 0
    }
}

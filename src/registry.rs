//! # Registry Engine Module
//!
//! ## Purpose
//! The engine that keeps stored case identity consistent. It owns the only
//! write path to the case collection: every create, update, and delete goes
//! through here, and each one ends with the affected partitions renumbered
//! so numbers stay gapless and slugs stay truthful.
//!
//! ## Input/Output Specification
//! - **Input**: Case create/update/delete requests, batch run triggers
//! - **Output**: Stored cases, renumber and dedup reports, registry stats
//! - **Guarantee**: Snapshots are cached; every mutation invalidates them
//!
//! ## Key Features
//! - Chronological sequence assignment on create
//! - Two-phase key migration (copy, verify, then delete the old key)
//! - Per-document failures are logged and skipped; the batch carries on
//! - Batch runs are journaled to a separate collection for auditing

use crate::cache::{CacheStats, SnapshotCache};
use crate::config::Config;
use crate::dedup::{self, DedupAction, DedupActionKind, DedupReport, DuplicateReport};
use crate::errors::{RegistryError, Result};
use crate::numbering::{compute_sequence, desired_identity, ChronoKey};
use crate::renumber::{plan_renumber, CaseChange, ChangeSummary, RenumberReport};
use crate::storage::{Document, DocumentStore, StorageStats};
use crate::utils::{TextUtils, Timer, ValidationUtils};
use crate::{CaseRecord, CaseType, StoredCase, CASES_COLLECTION, RUNS_COLLECTION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Input for creating a case. Identity fields (slug, title, number) are
/// derived, never accepted from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCase {
    pub name: String,
    pub case_type: CaseType,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    /// Domain fields stored on the document verbatim.
    #[serde(flatten)]
    pub extra: Document,
}

impl NewCase {
    pub fn new(name: impl Into<String>, case_type: CaseType) -> Self {
        Self {
            name: name.into(),
            case_type,
            year: None,
            month: None,
            extra: Document::new(),
        }
    }
}

/// Partial update. `None` fields keep their stored value; `extra` entries
/// are merged over the stored pass-through fields. Clearing a field is not
/// supported through patches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CasePatch {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub case_type: Option<CaseType>,
    #[serde(flatten)]
    pub extra: Document,
}

/// Document keys the engine owns. Request bodies echoing a previous read
/// carry them back; the flattened `extra` map serializes after the typed
/// fields, so any such entry would shadow the real value in every response.
const RESERVED_KEYS: [&str; 7] = [
    "id",
    "slug",
    "title",
    "number",
    "is_new_case",
    "created_at",
    "updated_at",
];

fn strip_reserved_keys(extra: &mut Document) {
    for key in RESERVED_KEYS {
        extra.remove(key);
    }
}

/// Collection-wide counters reported by the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_cases: usize,
    pub antigo: usize,
    pub novo: usize,
    pub futuro: usize,
    /// Cases whose partition still comes from the legacy boolean flag.
    pub legacy_typed: usize,
    pub cache: CacheStats,
    pub storage: StorageStats,
}

/// Journal entry for one batch run, stored in the runs collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    /// "renumber" or "dedup".
    pub operation: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The full report the run produced.
    pub summary: serde_json::Value,
}

/// The case identity engine.
///
/// Holds the document store, the snapshot cache, and the numbering policy.
/// All handles are shared, so the engine itself is cheap to clone into an
/// `Arc` and use from every request handler.
pub struct CaseRegistry {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<SnapshotCache>,
}

impl CaseRegistry {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        cache: Arc<SnapshotCache>,
    ) -> Self {
        Self { config, store, cache }
    }

    /// The full case collection, parsed, through the snapshot cache.
    ///
    /// Documents that cannot be parsed at all are skipped with a warning so
    /// one corrupt record cannot take the whole collection offline. A failed
    /// listing is fatal: renumbering against a partial snapshot would assign
    /// wrong numbers everywhere.
    pub async fn snapshot(&self) -> Result<Arc<Vec<StoredCase>>> {
        let store = Arc::clone(&self.store);
        self.cache
            .get_or_fetch(CASES_COLLECTION, move || async move {
                load_cases(store).await
            })
            .await
    }

    /// Looks a case up by slug. Falls back to scanning for a document that
    /// claims the slug but lives under a drifted storage key.
    pub async fn get_case(&self, slug: &str) -> Result<StoredCase> {
        if let Some(document) = self.store.get(CASES_COLLECTION, slug).await? {
            let record = CaseRecord::from_document(&document)?;
            return Ok(StoredCase::new(slug, record));
        }
        let snapshot = self.snapshot().await?;
        snapshot
            .iter()
            .find(|case| case.record.slug == slug)
            .cloned()
            .ok_or_else(|| RegistryError::CaseNotFound { slug: slug.to_string() })
    }

    pub async fn list_cases(&self, case_type: Option<CaseType>) -> Result<Vec<StoredCase>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .iter()
            .filter(|case| case_type.map_or(true, |t| case.record.effective_type() == t))
            .cloned()
            .collect())
    }

    /// Creates a case: validates the input, ranks it among its partition
    /// peers, derives title and slug, writes the document, and settles the
    /// partition. Returns the case under its final identity, which can
    /// differ from the initially derived one when the insertion shifted a
    /// tie.
    pub async fn create_case(&self, input: NewCase) -> Result<StoredCase> {
        let name = TextUtils::sanitize(&input.name).trim().to_string();
        if !ValidationUtils::is_valid_case_name(&name) {
            return Err(crate::validation_error!("name", "must not be empty"));
        }
        if let Some(year) = input.year {
            if !ValidationUtils::is_valid_year(year) {
                return Err(crate::validation_error!("year", "must be a four-digit year"));
            }
        }
        if let Some(month) = input.month {
            if !ValidationUtils::is_valid_month(month) {
                return Err(crate::validation_error!("month", "must be between 1 and 12"));
            }
        }

        let snapshot = self.snapshot().await?;
        let prefix = self.config.numbering.prefix_for(input.case_type);
        let candidate = ChronoKey::new(input.year, input.month, &name);
        let peers: Vec<ChronoKey> = snapshot
            .iter()
            .filter(|case| case.record.effective_type() == input.case_type)
            .map(|case| case.record.chrono_key())
            .collect();
        let number = compute_sequence(&candidate, &peers);
        let (title, slug) = desired_identity(prefix, number, &name, input.year);

        if self.store.get(CASES_COLLECTION, &slug).await?.is_some()
            || snapshot
                .iter()
                .any(|case| case.id == slug || case.record.slug == slug)
        {
            return Err(RegistryError::SlugCollision { slug });
        }

        let now = Utc::now();
        let mut extra = input.extra;
        strip_reserved_keys(&mut extra);
        let record = CaseRecord {
            slug: slug.clone(),
            title,
            name,
            year: input.year,
            month: input.month,
            case_type: Some(input.case_type),
            is_new_case: None,
            number: Some(number),
            created_at: Some(now),
            updated_at: Some(now),
            extra,
        };
        self.store
            .upsert(CASES_COLLECTION, &slug, record.to_document()?)
            .await?;
        self.cache.invalidate(CASES_COLLECTION);
        tracing::info!(slug = %slug, case_type = %input.case_type, "case created");

        // The insertion can shift later peers, and an equal-key tie can even
        // shift the new case itself.
        let report = self.renumber_type(input.case_type, false).await?;
        let final_slug = follow_moves(&report, slug);
        self.get_case(&final_slug).await
    }

    /// Applies a partial update, then renumbers the affected partitions.
    /// Returns the case under its post-renumber identity.
    pub async fn update_case(&self, slug: &str, patch: CasePatch) -> Result<StoredCase> {
        let existing = self.get_case(slug).await?;
        let old_type = existing.record.effective_type();

        let mut record = existing.record.clone();
        if let Some(name) = patch.name {
            let name = TextUtils::sanitize(&name).trim().to_string();
            if !ValidationUtils::is_valid_case_name(&name) {
                return Err(crate::validation_error!("name", "must not be empty"));
            }
            record.name = name;
        }
        if let Some(year) = patch.year {
            if !ValidationUtils::is_valid_year(year) {
                return Err(crate::validation_error!("year", "must be a four-digit year"));
            }
            record.year = Some(year);
        }
        if let Some(month) = patch.month {
            if !ValidationUtils::is_valid_month(month) {
                return Err(crate::validation_error!("month", "must be between 1 and 12"));
            }
            record.month = Some(month);
        }
        if let Some(case_type) = patch.case_type {
            record.case_type = Some(case_type);
            // An explicit partition supersedes the legacy flag for good.
            record.is_new_case = None;
        }
        for (key, value) in patch.extra {
            record.extra.insert(key, value);
        }
        // Also heals documents that picked shadow keys up before the strip
        // existed.
        strip_reserved_keys(&mut record.extra);
        record.updated_at = Some(Utc::now());

        self.store
            .upsert(CASES_COLLECTION, &existing.id, record.to_document()?)
            .await?;
        self.cache.invalidate(CASES_COLLECTION);

        let new_type = record.effective_type();
        let mut current_id = existing.id.clone();
        let report = self.renumber_type(old_type, false).await?;
        current_id = follow_moves(&report, current_id);
        if new_type != old_type {
            let report = self.renumber_type(new_type, false).await?;
            current_id = follow_moves(&report, current_id);
        }
        self.get_case(&current_id).await
    }

    /// Deletes a case and closes the numbering gap it leaves behind. The
    /// follow-up renumber is forced so every remaining peer is rewritten
    /// against the post-delete ordering, drift included. Returns the
    /// renumber report, or `None` when renumber-on-delete is disabled in
    /// the configuration.
    pub async fn delete_case(&self, slug: &str) -> Result<Option<RenumberReport>> {
        let existing = self.get_case(slug).await?;
        let case_type = existing.record.effective_type();
        self.store.delete(CASES_COLLECTION, &existing.id).await?;
        self.cache.invalidate(CASES_COLLECTION);
        tracing::info!(slug = %existing.id, case_type = %case_type, "case deleted");

        if self.config.numbering.renumber_on_delete {
            Ok(Some(self.renumber_type(case_type, true).await?))
        } else {
            Ok(None)
        }
    }

    /// Renumbers one partition. Plans against a full snapshot, applies the
    /// changes in two phases, and journals the run when anything happened.
    pub async fn renumber_type(&self, case_type: CaseType, force: bool) -> Result<RenumberReport> {
        let timer = Timer::new(format!("renumber {}", case_type));
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let snapshot = self.snapshot().await?;
        let prefix = self.config.numbering.prefix_for(case_type);
        let plan = plan_renumber(prefix, case_type, &snapshot, force);

        for conflict in &plan.conflicts {
            tracing::warn!(
                id = %conflict.id,
                wanted = %conflict.wanted_slug,
                held_by = %conflict.held_by,
                "desired slug held by another partition; change skipped"
            );
        }

        // Keys the plan claims. An old key that reappears as some change's
        // new key must survive the cleanup phase.
        let new_keys: HashSet<&str> = plan.changes.iter().map(|c| c.new_slug.as_str()).collect();

        let mut changed = 0usize;
        let mut migrated = 0usize;
        let mut failed = 0usize;
        let mut summaries = Vec::with_capacity(plan.changes.len());
        let mut applied: Vec<&CaseChange> = Vec::with_capacity(plan.changes.len());

        // Phase one: every document is written under its new key. No old
        // key is deleted yet, so a crash here leaves duplicates, never a
        // missing case. The dedup pass cleans such residue up.
        for change in &plan.changes {
            match self.apply_change(change).await {
                Ok(()) => {
                    changed += 1;
                    if change.migrate {
                        migrated += 1;
                    }
                    summaries.push(ChangeSummary {
                        from_id: change.id.clone(),
                        to_slug: change.new_slug.clone(),
                        number: change.new_number,
                        title: change.new_title.clone(),
                        migrated: change.migrate,
                    });
                    applied.push(change);
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        id = %change.id,
                        slug = %change.new_slug,
                        error = %e,
                        "case rewrite failed; keeping old identity"
                    );
                }
            }
        }

        // Phase two: drop the old keys of successfully migrated documents.
        for change in applied.iter().filter(|c| c.migrate) {
            if new_keys.contains(change.id.as_str()) {
                continue;
            }
            if let Err(e) = self.store.delete(CASES_COLLECTION, &change.id).await {
                failed += 1;
                tracing::warn!(id = %change.id, error = %e, "stale key cleanup failed");
            }
        }

        if changed > 0 || failed > 0 {
            self.cache.invalidate(CASES_COLLECTION);
        }

        let report = RenumberReport {
            run_id,
            case_type,
            forced: force,
            examined: plan.examined,
            changed,
            migrated,
            failed,
            conflicts: plan.conflicts,
            changes: summaries,
            elapsed_ms: timer.stop(),
            finished_at: Utc::now(),
        };

        if !report.is_noop() {
            tracing::info!(
                case_type = %case_type,
                changed = report.changed,
                migrated = report.migrated,
                failed = report.failed,
                "renumbering finished"
            );
            self.record_run(run_id, "renumber", started_at, serde_json::to_value(&report)?)
                .await;
        }

        Ok(report)
    }

    /// Renumbers every partition, in the fixed partition order.
    pub async fn renumber_all(&self, force: bool) -> Result<Vec<RenumberReport>> {
        let mut reports = Vec::with_capacity(CaseType::ALL.len());
        for case_type in CaseType::ALL {
            reports.push(self.renumber_type(case_type, force).await?);
        }
        Ok(reports)
    }

    /// Read-only duplicate scan over the current snapshot.
    pub async fn find_duplicates(&self) -> Result<DuplicateReport> {
        let snapshot = self.snapshot().await?;
        Ok(crate::time_block!("duplicate scan", {
            dedup::find_duplicates(&snapshot)
        }))
    }

    /// Merges duplicate groups by deleting every non-canonical member. With
    /// `dry_run` the report lists what would be deleted and the store is
    /// left untouched.
    pub async fn deduplicate(&self, dry_run: bool) -> Result<DedupReport> {
        let timer = Timer::new("dedup");
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let snapshot = self.snapshot().await?;
        let decisions = dedup::plan_dedup(&snapshot);

        let mut deleted = 0usize;
        let mut failed = 0usize;
        let mut actions = Vec::new();
        for decision in &decisions {
            for target in &decision.delete_ids {
                let mut action = DedupAction {
                    action: DedupActionKind::Delete,
                    target_slug: target.clone(),
                    kept_slug: decision.keep_id.clone(),
                    kind: decision.kind,
                    error: None,
                };
                if dry_run {
                    deleted += 1;
                } else {
                    match self.store.delete(CASES_COLLECTION, target).await {
                        Ok(()) => {
                            deleted += 1;
                            tracing::info!(slug = %target, kept = %decision.keep_id, "duplicate removed");
                        }
                        Err(e) => {
                            failed += 1;
                            tracing::warn!(slug = %target, error = %e, "duplicate removal failed");
                            action.error = Some(e.to_string());
                        }
                    }
                }
                actions.push(action);
            }
        }

        if !dry_run && deleted > 0 {
            self.cache.invalidate(CASES_COLLECTION);
        }

        let report = DedupReport {
            run_id,
            dry_run,
            success: failed == 0,
            deleted,
            failed,
            actions,
            elapsed_ms: timer.stop(),
            finished_at: Utc::now(),
        };

        if !dry_run && !report.actions.is_empty() {
            self.record_run(run_id, "dedup", started_at, serde_json::to_value(&report)?)
                .await;
        }

        Ok(report)
    }

    /// Most recent batch runs, newest first.
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let raw = self.store.list_all(RUNS_COLLECTION).await?;
        let mut runs = Vec::with_capacity(raw.len());
        for (id, document) in raw {
            match serde_json::from_value(serde_json::Value::Object(document)) {
                Ok(run) => runs.push(run),
                Err(e) => tracing::warn!(id = %id, error = %e, "skipping unreadable run entry"),
            }
        }
        runs.sort_by(|a: &RunRecord, b: &RunRecord| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    pub async fn stats(&self) -> Result<RegistryStats> {
        let snapshot = self.snapshot().await?;
        let mut antigo = 0;
        let mut novo = 0;
        let mut futuro = 0;
        let mut legacy_typed = 0;
        for case in snapshot.iter() {
            match case.record.effective_type() {
                CaseType::Antigo => antigo += 1,
                CaseType::Novo => novo += 1,
                CaseType::Futuro => futuro += 1,
            }
            if case.record.case_type.is_none() && case.record.is_new_case.is_some() {
                legacy_typed += 1;
            }
        }

        Ok(RegistryStats {
            total_cases: snapshot.len(),
            antigo,
            novo,
            futuro,
            legacy_typed,
            cache: self.cache.stats(),
            storage: self.store.stats().await?,
        })
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }

    /// Writes one planned change. A migration copies the document to its
    /// new key and verifies the copy landed before the old key becomes
    /// eligible for cleanup.
    async fn apply_change(&self, change: &CaseChange) -> Result<()> {
        let mut record = change.record.clone();
        record.updated_at = Some(Utc::now());
        let document = record.to_document()?;
        self.store
            .upsert(CASES_COLLECTION, &change.new_slug, document)
            .await?;
        if change.migrate && self.store.get(CASES_COLLECTION, &change.new_slug).await?.is_none() {
            return Err(RegistryError::MigrationFailed {
                from: change.id.clone(),
                to: change.new_slug.clone(),
                reason: "document missing after copy".to_string(),
            });
        }
        Ok(())
    }

    /// Journals a batch run. Best effort: a journaling failure is logged
    /// but never fails the run that produced it.
    async fn record_run(
        &self,
        run_id: Uuid,
        operation: &str,
        started_at: DateTime<Utc>,
        summary: serde_json::Value,
    ) {
        let entry = RunRecord {
            run_id,
            operation: operation.to_string(),
            started_at,
            finished_at: Utc::now(),
            summary,
        };
        let document = match serde_json::to_value(&entry) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => {
                tracing::warn!(%run_id, "run entry did not serialize to an object");
                return;
            }
        };
        if let Err(e) = self
            .store
            .upsert(RUNS_COLLECTION, &run_id.to_string(), document)
            .await
        {
            tracing::warn!(%run_id, error = %e, "failed to journal run");
        }
    }
}

async fn load_cases(store: Arc<dyn DocumentStore>) -> Result<Vec<StoredCase>> {
    let raw = store.list_all(CASES_COLLECTION).await?;
    let mut cases = Vec::with_capacity(raw.len());
    for (id, document) in raw {
        match CaseRecord::from_document(&document) {
            Ok(record) => cases.push(StoredCase::new(id, record)),
            Err(e) => tracing::warn!(id = %id, error = %e, "skipping unreadable case document"),
        }
    }
    Ok(cases)
}

/// Where a document ended up after a renumber run moved it, if it moved.
fn follow_moves(report: &RenumberReport, id: String) -> String {
    report
        .changes
        .iter()
        .find(|change| change.from_id == id)
        .map(|change| change.to_slug.clone())
        .unwrap_or(id)
}

//! # Duplicate Detection Module
//!
//! ## Purpose
//! Finds case records describing the same matter and plans their merger.
//! Duplicates crept in through legacy imports and a historic bug that wrote
//! a fresh document instead of updating the existing one; this module is
//! what cleans them up, and what heals documents left behind by an
//! interrupted key migration.
//!
//! ## Input/Output Specification
//! - **Input**: Full case snapshot
//! - **Output**: Duplicate groups per strategy, merge decisions, reports
//! - **Strategies**: same slug, exact same title, same name + year
//!
//! ## Key Features
//! - Three independent clustering passes with per-strategy statistics
//! - Canonical survivor = most complete record, ties broken by earliest
//!   `created_at`, then by first appearance in the snapshot
//! - Merge phases run slug, then title, then name+year; a record deleted by
//!   an earlier phase no longer participates in later ones

use crate::{CaseRecord, StoredCase};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Clustering strategy that produced a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    Slug,
    Title,
    NameYear,
}

impl DuplicateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateKind::Slug => "slug",
            DuplicateKind::Title => "title",
            DuplicateKind::NameYear => "name_year",
        }
    }
}

/// A set of cases sharing one clustering key.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub kind: DuplicateKind,
    /// The value the members collided on: a slug, a title, or `name|year`.
    pub key: String,
    /// Storage ids of the members, in snapshot order.
    pub members: Vec<String>,
}

/// Aggregate numbers for a detection pass.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateStats {
    pub total_cases: usize,
    pub slug_groups: usize,
    pub title_groups: usize,
    pub name_year_groups: usize,
    /// Distinct cases appearing in at least one group.
    pub cases_involved: usize,
    /// Cases that would remain if every merge decision were applied.
    pub unique_after_dedup: usize,
}

/// Full output of a detection pass.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub by_slug: Vec<DuplicateGroup>,
    pub by_title: Vec<DuplicateGroup>,
    pub by_name_year: Vec<DuplicateGroup>,
    pub stats: DuplicateStats,
}

impl DuplicateReport {
    pub fn group_count(&self) -> usize {
        self.by_slug.len() + self.by_title.len() + self.by_name_year.len()
    }

    pub fn is_clean(&self) -> bool {
        self.group_count() == 0
    }
}

/// Resolution of one duplicate group: which record survives and which are
/// removed.
#[derive(Debug, Clone, Serialize)]
pub struct MergeDecision {
    pub kind: DuplicateKind,
    pub key: String,
    pub keep_id: String,
    pub delete_ids: Vec<String>,
}

/// Kind of mutation a dedup run performs. Only deletions today; merges that
/// rewrite the survivor would extend this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupActionKind {
    Delete,
}

/// One attempted mutation from a dedup run. `error` is set when the store
/// rejected the action; the run carries on with the remaining actions.
#[derive(Debug, Clone, Serialize)]
pub struct DedupAction {
    pub action: DedupActionKind,
    pub target_slug: String,
    pub kept_slug: String,
    pub kind: DuplicateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a dedup run against the store.
#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    /// False when at least one action failed.
    pub success: bool,
    pub deleted: usize,
    pub failed: usize,
    pub actions: Vec<DedupAction>,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Runs the three clustering passes over a snapshot and computes the
/// aggregate statistics. Detection is read-only.
pub fn find_duplicates(cases: &[StoredCase]) -> DuplicateReport {
    let by_slug = build_groups(cases, DuplicateKind::Slug, |c| {
        non_empty(&c.record.slug)
    });
    let by_title = build_groups(cases, DuplicateKind::Title, |c| {
        non_empty(&c.record.title)
    });
    let by_name_year = build_groups(cases, DuplicateKind::NameYear, |c| {
        name_year_key(&c.record)
    });

    let mut involved: HashSet<&str> = HashSet::new();
    for group in by_slug.iter().chain(&by_title).chain(&by_name_year) {
        involved.extend(group.members.iter().map(String::as_str));
    }
    let deletions: usize = decide_merges(cases, [&by_slug, &by_title, &by_name_year])
        .iter()
        .map(|d| d.delete_ids.len())
        .sum();

    let stats = DuplicateStats {
        total_cases: cases.len(),
        slug_groups: by_slug.len(),
        title_groups: by_title.len(),
        name_year_groups: by_name_year.len(),
        cases_involved: involved.len(),
        unique_after_dedup: cases.len() - deletions,
    };

    DuplicateReport {
        by_slug,
        by_title,
        by_name_year,
        stats,
    }
}

/// Plans the merge of every duplicate group found in the snapshot.
pub fn plan_dedup(cases: &[StoredCase]) -> Vec<MergeDecision> {
    let report = find_duplicates(cases);
    decide_merges(cases, [&report.by_slug, &report.by_title, &report.by_name_year])
}

/// How many informative fields a record carries. Drives canonical-survivor
/// selection: richer records win.
pub fn completeness_score(record: &CaseRecord) -> usize {
    let mut score = 0;
    score += usize::from(!record.slug.is_empty());
    score += usize::from(!record.title.is_empty());
    score += usize::from(!record.name.is_empty());
    score += usize::from(record.year.is_some());
    score += usize::from(record.month.is_some());
    score += usize::from(record.case_type.is_some());
    score += usize::from(record.is_new_case.is_some());
    score += usize::from(record.number.is_some());
    score += usize::from(record.created_at.is_some());
    score += usize::from(record.updated_at.is_some());
    score += record.extra.values().filter(|v| !v.is_null()).count();
    score
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn name_year_key(record: &CaseRecord) -> Option<String> {
    let name = record.name.trim();
    if name.is_empty() {
        return None;
    }
    Some(format!("{}|{}", name.to_lowercase(), record.year_label()))
}

fn build_groups<F>(cases: &[StoredCase], kind: DuplicateKind, key_fn: F) -> Vec<DuplicateGroup>
where
    F: Fn(&StoredCase) -> Option<String>,
{
    // BTreeMap keeps group order deterministic across runs.
    let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for case in cases {
        if let Some(key) = key_fn(case) {
            buckets.entry(key).or_default().push(case.id.clone());
        }
    }
    buckets
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, members)| DuplicateGroup { kind, key, members })
        .collect()
}

/// Resolves groups phase by phase. Ids deleted by an earlier phase are
/// treated as gone, so a group whose survivors thin out below two produces
/// no decision.
fn decide_merges(cases: &[StoredCase], phases: [&[DuplicateGroup]; 3]) -> Vec<MergeDecision> {
    let by_id: HashMap<&str, (usize, &CaseRecord)> = cases
        .iter()
        .enumerate()
        .map(|(index, case)| (case.id.as_str(), (index, &case.record)))
        .collect();

    let mut deleted: HashSet<&str> = HashSet::new();
    let mut decisions = Vec::new();
    for groups in phases {
        for group in groups {
            let survivors: Vec<&str> = group
                .members
                .iter()
                .map(String::as_str)
                .filter(|id| !deleted.contains(id))
                .collect();
            if survivors.len() < 2 {
                continue;
            }
            let keep = match pick_canonical(&survivors, &by_id) {
                Some(id) => id,
                None => continue,
            };
            let delete_ids: Vec<String> = survivors
                .iter()
                .filter(|id| **id != keep)
                .map(|id| id.to_string())
                .collect();
            for survivor in &survivors {
                if *survivor != keep {
                    deleted.insert(survivor);
                }
            }
            decisions.push(MergeDecision {
                kind: group.kind,
                key: group.key.clone(),
                keep_id: keep.to_string(),
                delete_ids,
            });
        }
    }
    decisions
}

fn pick_canonical<'a>(
    ids: &[&'a str],
    by_id: &HashMap<&str, (usize, &CaseRecord)>,
) -> Option<&'a str> {
    ids.iter()
        .copied()
        .filter_map(|id| {
            by_id.get(id).map(|(index, record)| {
                let created = record.created_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
                ((Reverse(completeness_score(record)), created, *index), id)
            })
        })
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, id)| id)
}

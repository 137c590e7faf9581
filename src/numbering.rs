//! # Numbering Module
//!
//! ## Purpose
//! Chronological ordering and identity derivation for cases. Every case in a
//! type partition holds a 1-based sequence number determined by when the
//! matter was opened; this module defines the ordering key, the rank
//! computation, and the canonical title format built from the rank.
//!
//! ## Input/Output Specification
//! - **Input**: Case year/month/name triples, peer collections
//! - **Output**: Ordering keys, 1-based sequence ranks, display titles
//! - **Ordering**: `(year, month, lowercased name)`, lexicographic
//!
//! ## Key Features
//! - Total order with explicit fallbacks: unknown years sort last (9999),
//!   unknown months sort as December (12)
//! - Rank = number of strictly smaller peers + 1, so inserting a case never
//!   renumbers the cases that precede it
//! - Title format `"{prefix}.{sequence} - {name} / {year}"`, invertible via
//!   [`parse_title`]

use crate::CaseRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Sort-order stand-in for records without a usable year; sorts after every
/// real year.
pub const YEAR_SORT_FALLBACK: i32 = 9999;

/// Sort-order stand-in for records without a usable month (December).
pub const MONTH_SORT_FALLBACK: u32 = 12;

/// Ordering key for chronological ranking inside a type partition.
///
/// Derives `Ord`, so the field order here is load-bearing: year first, then
/// month, then the lowercased name as the alphabetical tiebreaker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChronoKey {
    pub year: i32,
    pub month: u32,
    pub name: String,
}

impl ChronoKey {
    /// Builds a key, substituting the sort fallbacks for absent or
    /// out-of-range components. The name is lowercased so ranking ignores
    /// capitalization differences.
    pub fn new(year: Option<i32>, month: Option<u32>, name: &str) -> Self {
        let year = match year {
            Some(y) if (1000..=9999).contains(&y) => y,
            _ => YEAR_SORT_FALLBACK,
        };
        let month = match month {
            Some(m) if (1..=12).contains(&m) => m,
            _ => MONTH_SORT_FALLBACK,
        };
        Self {
            year,
            month,
            name: name.to_lowercase(),
        }
    }
}

impl CaseRecord {
    /// Ordering key for this record within its type partition.
    pub fn chrono_key(&self) -> ChronoKey {
        ChronoKey::new(self.year, self.month, &self.name)
    }
}

/// 1-based rank of `candidate` among `peers`: the count of strictly smaller
/// peer keys plus one. Peers with a key equal to the candidate's do not push
/// it back, so two matters opened the same month under the same name share
/// a rank until a batch renumber spreads them.
pub fn compute_sequence<'a, I>(candidate: &ChronoKey, peers: I) -> u32
where
    I: IntoIterator<Item = &'a ChronoKey>,
{
    peers.into_iter().filter(|k| *k < candidate).count() as u32 + 1
}

/// Renders the canonical display title. Cases without a year omit the
/// trailing ` / {year}` segment rather than printing a placeholder.
pub fn format_title(prefix: u32, sequence: u32, name: &str, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("{}.{} - {} / {}", prefix, sequence, name, year),
        None => format!("{}.{} - {}", prefix, sequence, name),
    }
}

/// Recovers `(prefix, sequence)` from a well-formed title. Titles that do
/// not match the canonical layout yield `None`.
pub fn parse_title(title: &str) -> Option<(u32, u32)> {
    static TITLE_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = TITLE_PATTERN
        .get_or_init(|| Regex::new(r"^(\d+)\.(\d+) - .+$").expect("static title pattern"));
    let captures = pattern.captures(title)?;
    let prefix = captures.get(1)?.as_str().parse().ok()?;
    let sequence = captures.get(2)?.as_str().parse().ok()?;
    Some((prefix, sequence))
}

/// Derives the `(title, slug)` pair for one case identity. The two are
/// always generated together so they cannot drift apart.
pub fn desired_identity(
    prefix: u32,
    sequence: u32,
    name: &str,
    year: Option<i32>,
) -> (String, String) {
    let title = format_title(prefix, sequence, name, year);
    let year_label = year.map(|y| y.to_string()).unwrap_or_default();
    let slug = crate::slug::make_slug(prefix, sequence, name, &year_label);
    (title, slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(year: Option<i32>, month: Option<u32>, name: &str) -> ChronoKey {
        ChronoKey::new(year, month, name)
    }

    #[test]
    fn test_chrono_key_fallbacks() {
        assert_eq!(key(None, None, "Silva").year, YEAR_SORT_FALLBACK);
        assert_eq!(key(None, None, "Silva").month, MONTH_SORT_FALLBACK);
        // out-of-range components behave like absent ones
        assert_eq!(key(Some(50), Some(0), "Silva").year, YEAR_SORT_FALLBACK);
        assert_eq!(key(Some(2023), Some(13), "Silva").month, MONTH_SORT_FALLBACK);
        assert_eq!(key(Some(2023), Some(3), "Silva").month, 3);
    }

    #[test]
    fn test_chrono_key_ordering() {
        assert!(key(Some(2022), Some(12), "Zeta") < key(Some(2023), Some(1), "Alves"));
        assert!(key(Some(2023), Some(1), "Alves") < key(Some(2023), Some(3), "Silva"));
        assert!(key(Some(2023), Some(3), "Alves") < key(Some(2023), Some(3), "Silva"));
        // capitalization does not affect rank
        assert_eq!(key(Some(2023), Some(3), "SILVA"), key(Some(2023), Some(3), "silva"));
        // unknown year sorts after every dated case
        assert!(key(Some(2099), Some(12), "Silva") < key(None, Some(1), "Alves"));
    }

    #[test]
    fn test_sequence_counts_strictly_smaller_peers() {
        let peers = vec![
            key(Some(2023), Some(3), "Silva"),
            key(Some(2023), Some(1), "Alves"),
        ];
        let candidate = key(Some(2023), Some(2), "Costa");
        assert_eq!(compute_sequence(&candidate, &peers), 2);
    }

    #[test]
    fn test_sequence_of_earliest_case_is_one() {
        let peers = vec![key(Some(2023), Some(5), "Silva")];
        assert_eq!(compute_sequence(&key(Some(2020), Some(1), "Alves"), &peers), 1);
        assert_eq!(compute_sequence(&key(Some(2020), Some(1), "Alves"), &[]), 1);
    }

    #[test]
    fn test_sequence_ignores_equal_keys() {
        let peers = vec![key(Some(2023), Some(1), "Alves")];
        assert_eq!(compute_sequence(&key(Some(2023), Some(1), "Alves"), &peers), 1);
    }

    #[test]
    fn test_title_format() {
        assert_eq!(format_title(1, 2, "Costa", Some(2023)), "1.2 - Costa / 2023");
        assert_eq!(format_title(2, 7, "Silva", None), "2.7 - Silva");
    }

    #[test]
    fn test_title_round_trip() {
        for (prefix, sequence) in [(1, 1), (2, 14), (1, 999), (3, 42)] {
            let title = format_title(prefix, sequence, "Pereira Filho", Some(2021));
            assert_eq!(parse_title(&title), Some((prefix, sequence)));
        }
        let no_year = format_title(2, 3, "Silva", None);
        assert_eq!(parse_title(&no_year), Some((2, 3)));
    }

    #[test]
    fn test_parse_title_rejects_malformed() {
        assert_eq!(parse_title("Silva / 2023"), None);
        assert_eq!(parse_title("1x2 - Silva"), None);
        assert_eq!(parse_title("1.2 -"), None);
        assert_eq!(parse_title(". - Silva"), None);
        assert_eq!(parse_title(""), None);
    }

    #[test]
    fn test_desired_identity_pairs_title_and_slug() {
        let (title, slug) = desired_identity(1, 2, "Costa", Some(2023));
        assert_eq!(title, "1.2 - Costa / 2023");
        assert_eq!(slug, "1-2-costa-2023");

        let (title, slug) = desired_identity(2, 5, "Ação Popular", None);
        assert_eq!(title, "2.5 - Ação Popular");
        assert_eq!(slug, "2-5-acao-popular");
    }
}

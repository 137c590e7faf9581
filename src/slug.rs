//! # Slug Generation Module
//!
//! ## Purpose
//! Builds the URL-safe identifiers that name case documents in storage and
//! in client URLs. A slug folds the numbering prefix, the sequence number,
//! the client name, and the opening year into one lowercase token chain.
//!
//! ## Input/Output Specification
//! - **Input**: Prefix digit, 1-based sequence, raw case name, year label
//! - **Output**: Lowercase ASCII slug with single-hyphen separators
//! - **Normalization**: NFD decomposition with combining marks stripped
//!
//! ## Key Features
//! - Diacritic folding for Portuguese names (Ação -> acao)
//! - Separator collapsing with no leading/trailing hyphens
//! - Deterministic: equal inputs always produce equal slugs

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalizes arbitrary text into slug form.
///
/// Characters are NFD-decomposed and combining marks dropped, which folds
/// accented letters to their ASCII base. Runs of anything that is not an
/// ASCII letter or digit collapse into a single `-`. Letters that have no
/// ASCII base form after decomposition are dropped entirely.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut gap = false;
    for ch in input.nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_ascii_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('-');
            }
            gap = false;
            slug.push(ch.to_ascii_lowercase());
        } else if !ch.is_alphanumeric() {
            gap = true;
        }
    }
    slug
}

/// Assembles the canonical slug for a case identity.
///
/// The layout is `{prefix}-{sequence}-{name...}-{year}`. `year_label` is the
/// rendered year (`"2023"`) or an empty string when the year is unknown, in
/// which case the trailing token is simply omitted.
pub fn make_slug(prefix: u32, sequence: u32, name: &str, year_label: &str) -> String {
    slugify(&format!("{}-{} {} {}", prefix, sequence, name, year_label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_strips_accents() {
        assert_eq!(slugify("Ação Trabalhista"), "acao-trabalhista");
        assert_eq!(slugify("José"), "jose");
        assert_eq!(slugify("São Paulo"), "sao-paulo");
        assert_eq!(slugify("Müller & Associados"), "muller-associados");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("  Silva -- & Filhos  "), "silva-filhos");
        assert_eq!(slugify("a///b___c"), "a-b-c");
        assert_eq!(slugify("--edge--"), "edge");
    }

    #[test]
    fn test_slugify_keeps_digits() {
        assert_eq!(slugify("Processo 123/2023"), "processo-123-2023");
        assert_eq!(slugify("0"), "0");
    }

    #[test]
    fn test_slugify_degenerate_input() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("///"), "");
        assert_eq!(slugify("   "), "");
    }

    #[test]
    fn test_make_slug_layout() {
        assert_eq!(make_slug(1, 2, "Costa", "2023"), "1-2-costa-2023");
        assert_eq!(make_slug(2, 14, "Ação Popular", "1999"), "2-14-acao-popular-1999");
    }

    #[test]
    fn test_make_slug_without_year() {
        assert_eq!(make_slug(2, 7, "Silva", ""), "2-7-silva");
    }

    #[test]
    fn test_make_slug_is_deterministic() {
        let a = make_slug(1, 3, "Pereira Filho", "2020");
        let b = make_slug(1, 3, "Pereira Filho", "2020");
        assert_eq!(a, b);
    }
}

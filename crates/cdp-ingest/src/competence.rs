//! Competence (reference month) handling
//!
//! A file's competence is stored as `YYYY-MM`, or [`UNKNOWN_COMPETENCE`] when
//! it could not be determined.

use regex::Regex;
use std::sync::LazyLock;

pub const UNKNOWN_COMPETENCE: &str = "UNKNOWN";

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^(\d{4})-(\d{1,2})(?:-\d{1,2})?(?:[T ].*)?$"));
static BR_DATE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^(?:\d{1,2}/)?(\d{1,2})/(\d{4})$"));
static COMPACT_DATE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^(\d{4})(\d{2})$"));
static WELL_FORMED: LazyLock<Regex> = LazyLock::new(|| pattern(r"^\d{4}-\d{2}$"));
static FILE_NAME_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?:^|[^0-9])((?:19|20)\d{2})[-_]?(0[1-9]|1[0-2])(?:[^0-9]|$)")
});

#[allow(clippy::expect_used)]
fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("hard-coded pattern compiles")
}

/// Normalize a competence value from row content to `YYYY-MM`.
///
/// Accepts `YYYY-MM`, `YYYY-MM-DD` (optionally with a time), `MM/YYYY`,
/// `DD/MM/YYYY` and `YYYYMM`. Anything else, including an out-of-range month,
/// yields `None`.
pub fn normalize_competence(value: &str) -> Option<String> {
    let value = value.trim();

    let (year, month) = if let Some(caps) = ISO_DATE.captures(value) {
        (caps[1].to_string(), caps[2].to_string())
    } else if let Some(caps) = BR_DATE.captures(value) {
        (caps[2].to_string(), caps[1].to_string())
    } else if let Some(caps) = COMPACT_DATE.captures(value) {
        (caps[1].to_string(), caps[2].to_string())
    } else {
        return None;
    };

    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(format!("{year}-{month:02}"))
}

/// True for a strictly formatted `YYYY-MM` value.
pub fn is_well_formed(value: &str) -> bool {
    WELL_FORMED.is_match(value)
}

/// Competence embedded in a file name, e.g. `202501_Imoveis.csv` gives `2025-01`.
pub fn competence_from_file_name(name: &str) -> Option<String> {
    let caps = FILE_NAME_MONTH.captures(name)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

/// Decide the reference date stored on a control record.
///
/// A well-formed value already on the record wins over the one found in the
/// content; otherwise the content value is used, falling back to
/// [`UNKNOWN_COMPETENCE`].
pub fn resolve_reference_date(existing: Option<&str>, from_content: Option<&str>) -> String {
    match existing {
        Some(value) if is_well_formed(value) => value.to_string(),
        _ => from_content
            .filter(|v| is_well_formed(v))
            .unwrap_or(UNKNOWN_COMPETENCE)
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_iso_forms() {
        assert_eq!(normalize_competence("2024-03").as_deref(), Some("2024-03"));
        assert_eq!(normalize_competence("2024-3").as_deref(), Some("2024-03"));
        assert_eq!(normalize_competence("2024-03-31").as_deref(), Some("2024-03"));
        assert_eq!(normalize_competence("2024-03-31 00:00:00").as_deref(), Some("2024-03"));
    }

    #[test]
    fn test_normalize_brazilian_forms() {
        assert_eq!(normalize_competence("03/2024").as_deref(), Some("2024-03"));
        assert_eq!(normalize_competence("31/12/2023").as_deref(), Some("2023-12"));
        assert_eq!(normalize_competence(" 1/2024 ").as_deref(), Some("2024-01"));
    }

    #[test]
    fn test_normalize_compact_form() {
        assert_eq!(normalize_competence("202501").as_deref(), Some("2025-01"));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize_competence(""), None);
        assert_eq!(normalize_competence("março de 2024"), None);
        assert_eq!(normalize_competence("2024-13"), None);
        assert_eq!(normalize_competence("00/2024"), None);
    }

    #[test]
    fn test_competence_from_file_name() {
        assert_eq!(competence_from_file_name("202501_Imoveis.csv").as_deref(), Some("2025-01"));
        assert_eq!(competence_from_file_name("Consorcios_2024-03_UF.csv").as_deref(), Some("2024-03"));
        assert_eq!(competence_from_file_name("uploads/raw/2023_12_Moveis.xlsx").as_deref(), Some("2023-12"));
        assert_eq!(competence_from_file_name("Administradoras.csv"), None);
        assert_eq!(competence_from_file_name("2025131_x.csv"), None);
    }

    #[test]
    fn test_resolve_prefers_existing_well_formed() {
        assert_eq!(resolve_reference_date(Some("2025-01"), Some("2024-03")), "2025-01");
    }

    #[test]
    fn test_resolve_falls_back_to_content_then_unknown() {
        assert_eq!(resolve_reference_date(Some("UNKNOWN"), Some("2024-03")), "2024-03");
        assert_eq!(resolve_reference_date(None, Some("2024-03")), "2024-03");
        assert_eq!(resolve_reference_date(Some("2025-1"), None), UNKNOWN_COMPETENCE);
        assert_eq!(resolve_reference_date(None, None), UNKNOWN_COMPETENCE);
    }
}

//! Raw rows, column lookup and Brazilian number parsing

use serde::Serialize;
use serde_json::{Map, Value};

use crate::normalize::normalize;

/// One data line as read from the source file.
///
/// Headers keep their original spelling and order. Duplicate headers are
/// kept; lookups return the first one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawRow {
    entries: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Pair `headers` with `values` positionally. Missing trailing values
    /// become empty strings and surplus values are dropped.
    pub fn from_parts(headers: &[String], values: &[String]) -> Self {
        let entries = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), values.get(i).cloned().unwrap_or_default()))
            .collect();
        Self { entries }
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(h, _)| h.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every value is blank.
    pub fn is_blank(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.trim().is_empty())
    }

    /// The row as a JSON object keyed by the original headers.
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.entries.len());
        for (header, value) in &self.entries {
            map.entry(header.clone())
                .or_insert_with(|| Value::String(value.clone()));
        }
        Value::Object(map)
    }

    /// The row as a JSON object keyed by normalized header tokens.
    pub fn to_normalized_json(&self) -> Value {
        let mut map = Map::with_capacity(self.entries.len());
        for (header, value) in &self.entries {
            let key = normalize(header);
            if key.is_empty() {
                continue;
            }
            map.entry(key)
                .or_insert_with(|| Value::String(value.clone()));
        }
        Value::Object(map)
    }
}

/// A way of recognizing a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// The normalized header equals the normalized name.
    Exact(&'static str),
    /// The normalized header contains every normalized fragment.
    Fragments(&'static [&'static str]),
}

impl Candidate {
    fn matches(&self, normalized_header: &str) -> bool {
        match self {
            Candidate::Exact(name) => normalize(name) == normalized_header,
            Candidate::Fragments(parts) => {
                !parts.is_empty()
                    && parts
                        .iter()
                        .all(|part| normalized_header.contains(normalize(part).as_str()))
            }
        }
    }
}

/// Return the raw value of the first column matched by `candidates`.
///
/// Candidates are tried strictly in order; within one candidate the first
/// matching header wins.
pub fn find_value<'a>(row: &'a RawRow, candidates: &[Candidate]) -> Option<&'a str> {
    let normalized: Vec<String> = row.headers().map(normalize).collect();

    candidates.iter().find_map(|candidate| {
        normalized
            .iter()
            .position(|header| candidate.matches(header))
            .map(|idx| row.entries[idx].1.as_str())
    })
}

/// Like [`find_value`], but treats blank values as absent and trims the rest.
pub fn find_text<'a>(row: &'a RawRow, candidates: &[Candidate]) -> Option<&'a str> {
    find_value(row, candidates)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Parse a Brazilian-formatted number such as `1.234,56` or `R$ 100.000,00`.
///
/// Absent, empty, `-` and unparsable values all yield `0.0`. When there is no
/// comma the dots are taken as thousands separators, so `1.5` reads as `15`.
pub fn parse_number(value: Option<&str>) -> f64 {
    parse_number_opt(value).unwrap_or(0.0)
}

/// [`parse_number`] without the zero fallback: `None` for absent, blank or
/// unparsable input.
pub fn parse_number_opt(value: Option<&str>) -> Option<f64> {
    let cleaned: String = value?
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%')
        .collect();

    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }

    let canonical = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned.replace('.', "")
    };

    canonical.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Integer reading of [`parse_number`], rounded to the nearest unit.
pub fn parse_count(value: Option<&str>) -> i64 {
    parse_number(value).round() as i64
}

/// Keep only ASCII digits, e.g. `12.345.678/0001-90` becomes `12345678000190`.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        RawRow::new(
            pairs
                .iter()
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_parse_number_brazilian_format() {
        assert_eq!(parse_number(Some("1.234,56")), 1234.56);
        assert_eq!(parse_number(Some("100.000,00")), 100000.0);
        assert_eq!(parse_number(Some("R$ 2.500,10")), 2500.1);
        assert_eq!(parse_number(Some("12,5%")), 12.5);
        assert_eq!(parse_number(Some("-3,25")), -3.25);
    }

    #[test]
    fn test_parse_number_without_comma_drops_dots() {
        assert_eq!(parse_number(Some("1.234")), 1234.0);
        assert_eq!(parse_number(Some("1.5")), 15.0);
        assert_eq!(parse_number(Some("42")), 42.0);
    }

    #[test]
    fn test_parse_number_malformed_is_zero() {
        assert_eq!(parse_number(None), 0.0);
        assert_eq!(parse_number(Some("")), 0.0);
        assert_eq!(parse_number(Some("   ")), 0.0);
        assert_eq!(parse_number(Some("-")), 0.0);
        assert_eq!(parse_number(Some("abc")), 0.0);
        assert_eq!(parse_number(Some("1,2,3")), 0.0);
    }

    #[test]
    fn test_parse_number_opt_distinguishes_absent() {
        assert_eq!(parse_number_opt(Some("0")), Some(0.0));
        assert_eq!(parse_number_opt(Some("")), None);
        assert_eq!(parse_number_opt(None), None);
        assert_eq!(parse_number_opt(Some("n/d")), None);
    }

    #[test]
    fn test_parse_count_rounds() {
        assert_eq!(parse_count(Some("5")), 5);
        assert_eq!(parse_count(Some("2,6")), 3);
        assert_eq!(parse_count(Some("x")), 0);
    }

    #[test]
    fn test_find_value_exact_ignores_accents_and_case() {
        let r = row(&[("CNPJ da Administradora", "123"), ("Código do Grupo", "G7")]);
        assert_eq!(
            find_value(&r, &[Candidate::Exact("codigo_do_grupo")]),
            Some("G7")
        );
    }

    #[test]
    fn test_find_value_candidates_in_order() {
        let r = row(&[("Segmento", "Imóveis"), ("Código do segmento", "1")]);
        let candidates = [
            Candidate::Fragments(&["codigo", "segmento"]),
            Candidate::Exact("Segmento"),
        ];
        assert_eq!(find_value(&r, &candidates), Some("1"));

        let reversed = [
            Candidate::Exact("Segmento"),
            Candidate::Fragments(&["codigo", "segmento"]),
        ];
        assert_eq!(find_value(&r, &reversed), Some("Imóveis"));
    }

    #[test]
    fn test_find_value_fragments_need_all_parts() {
        let r = row(&[("Quantidade de cotas ativas em dia", "5")]);
        assert_eq!(
            find_value(&r, &[Candidate::Fragments(&["cotas", "excluidas"])]),
            None
        );
        assert_eq!(
            find_value(&r, &[Candidate::Fragments(&["cotas ativas", "em dia"])]),
            Some("5")
        );
    }

    #[test]
    fn test_find_value_first_duplicate_wins() {
        let r = row(&[("UF", "SP"), ("uf", "RJ")]);
        assert_eq!(find_value(&r, &[Candidate::Exact("UF")]), Some("SP"));
    }

    #[test]
    fn test_find_text_treats_blank_as_absent() {
        let r = row(&[("Nome", "   ")]);
        assert_eq!(find_value(&r, &[Candidate::Exact("Nome")]), Some("   "));
        assert_eq!(find_text(&r, &[Candidate::Exact("Nome")]), None);
    }

    #[test]
    fn test_from_parts_pads_missing_values() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let r = RawRow::from_parts(&headers, &["1".to_string()]);
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "")]);
        assert!(!r.is_blank());
    }

    #[test]
    fn test_to_normalized_json() {
        let r = row(&[("Código do grupo", "G1"), ("???", "x")]);
        assert_eq!(
            r.to_normalized_json(),
            serde_json::json!({ "codigodogrupo": "G1" })
        );
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("12.345.678/0001-90"), "12345678000190");
        assert_eq!(digits_only("seg 31"), "31");
    }

    proptest! {
        #[test]
        fn parse_number_never_panics(s in "\\PC*") {
            let _ = parse_number(Some(&s));
        }

        #[test]
        fn parse_number_reads_formatted_integers(n in 0u32..10_000_000) {
            let formatted = format!("{},00", n);
            prop_assert_eq!(parse_number(Some(&formatted)), n as f64);
        }
    }
}

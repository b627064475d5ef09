//! File classification
//!
//! A file's layout is decided once, before any row is mapped. File name rules
//! run first, in order; header rules are a fallback for files whose name says
//! nothing useful. Order matters: `imoveis` contains `moveis`, so the real
//! estate rule must come before the movables rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::normalize::{base_name, normalize};

/// Layout family of a disclosure file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClassification {
    Segments,
    RealEstate,
    Movables,
    RegionalUf,
    Administrators,
    Unknown,
}

impl FileClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Segments => "segments",
            Self::RealEstate => "real_estate",
            Self::Movables => "movables",
            Self::RegionalUf => "regional_uf",
            Self::Administrators => "administrators",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for FileClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "segments" => Ok(Self::Segments),
            "real_estate" => Ok(Self::RealEstate),
            "movables" => Ok(Self::Movables),
            "regional_uf" => Ok(Self::RegionalUf),
            "administrators" => Ok(Self::Administrators),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown file classification: {other}")),
        }
    }
}

/// A file name rule: matches when the normalized base name contains any
/// keyword, or when one of the name's `_`/`-`/space separated parts
/// normalizes to one of `tokens`.
pub struct NameRule {
    pub keywords: &'static [&'static str],
    pub tokens: &'static [&'static str],
    pub tag: FileClassification,
}

impl NameRule {
    fn matches(&self, normalized: &str, parts: &[String]) -> bool {
        self.keywords.iter().any(|k| normalized.contains(k))
            || parts.iter().any(|p| self.tokens.contains(&p.as_str()))
    }
}

/// A header rule: matches when the predicate accepts the normalized headers.
pub struct HeaderRule {
    pub name: &'static str,
    pub predicate: fn(&[String]) -> bool,
    pub tag: FileClassification,
}

pub const NAME_RULES: &[NameRule] = &[
    NameRule {
        keywords: &["imoveis", "imovel"],
        tokens: &[],
        tag: FileClassification::RealEstate,
    },
    NameRule {
        keywords: &["moveis", "movel", "veiculos"],
        tokens: &[],
        tag: FileClassification::Movables,
    },
    NameRule {
        keywords: &["administradora"],
        tokens: &[],
        tag: FileClassification::Administrators,
    },
    NameRule {
        keywords: &["estados", "regional"],
        tokens: &["uf"],
        tag: FileClassification::RegionalUf,
    },
    NameRule {
        keywords: &["segmento", "consolidad"],
        tokens: &[],
        tag: FileClassification::Segments,
    },
];

pub const HEADER_RULES: &[HeaderRule] = &[
    HeaderRule {
        name: "uf with bid contemplations",
        predicate: |h| has_exact(h, "uf") && has_containing(h, "contempladosporlance"),
        tag: FileClassification::RegionalUf,
    },
    HeaderRule {
        name: "group code with segment code",
        predicate: |h| has_containing(h, "codigodogrupo") && has_containing(h, "codigodosegmento"),
        tag: FileClassification::Movables,
    },
    HeaderRule {
        name: "group code",
        predicate: |h| has_containing(h, "codigodogrupo"),
        tag: FileClassification::RealEstate,
    },
    HeaderRule {
        name: "segment name",
        predicate: |h| has_containing(h, "nomedosegmento") || has_containing(h, "descricaodosegmento"),
        tag: FileClassification::Segments,
    },
    HeaderRule {
        name: "administrator name",
        predicate: |h| {
            has_containing(h, "cnpj")
                && (has_containing(h, "nomedaadministradora") || has_containing(h, "razaosocial"))
        },
        tag: FileClassification::Administrators,
    },
];

fn has_exact(headers: &[String], token: &str) -> bool {
    headers.iter().any(|h| h == token)
}

fn has_containing(headers: &[String], fragment: &str) -> bool {
    headers.iter().any(|h| h.contains(fragment))
}

/// Classify by file name alone.
pub fn classify_name(file_name: &str) -> FileClassification {
    let base = base_name(file_name);
    let name = normalize(base);
    let parts: Vec<String> = base
        .split(['_', '-', ' '])
        .map(normalize)
        .filter(|p| !p.is_empty())
        .collect();
    NAME_RULES
        .iter()
        .find(|rule| rule.matches(&name, &parts))
        .map(|rule| rule.tag)
        .unwrap_or(FileClassification::Unknown)
}

/// Classify by header set alone. `headers` may be raw; they are normalized here.
pub fn classify_headers<S: AsRef<str>>(headers: &[S]) -> FileClassification {
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h.as_ref())).collect();
    HEADER_RULES
        .iter()
        .find(|rule| (rule.predicate)(&normalized))
        .map(|rule| {
            tracing::debug!(rule = rule.name, tag = %rule.tag, "Classified by headers");
            rule.tag
        })
        .unwrap_or(FileClassification::Unknown)
}

/// Classify a file, trying the name first and the headers second.
pub fn classify<S: AsRef<str>>(file_name: &str, headers: Option<&[S]>) -> FileClassification {
    match classify_name(file_name) {
        FileClassification::Unknown => headers
            .map(classify_headers)
            .unwrap_or(FileClassification::Unknown),
        tag => tag,
    }
}

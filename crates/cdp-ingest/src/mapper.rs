//! Row mapping into canonical records
//!
//! Each layout has one pure mapping function. A row missing a mandatory
//! identifier maps to `None` and is dropped without failing the file.

use std::collections::{BTreeMap, HashSet};

use crate::catalog::tables;
use crate::classify::FileClassification;
use crate::competence::normalize_competence;
use crate::records::{
    Administrator, AssetKind, CanonicalRecord, ConsolidatedSeries, DetailedGroup,
    RegionalQuarter, SegmentEntry,
};
use crate::values::{
    digits_only, find_text, parse_count, parse_number_opt, Candidate, Candidate::*, RawRow,
};

/// Signature shared by every mapping function: row and source file name.
pub type RowMapper = fn(&RawRow, &str) -> Option<CanonicalRecord>;

const CNPJ: &[Candidate] = &[
    Exact("CNPJ_da_Administradora"),
    Exact("CNPJ"),
    Fragments(&["cnpj"]),
];

const ADMINISTRATOR_NAME: &[Candidate] = &[
    Exact("Nome_da_Administradora"),
    Exact("Administradora"),
    Fragments(&["nome", "administradora"]),
    Fragments(&["razao", "social"]),
];

pub const COMPETENCE: &[Candidate] = &[
    Exact("Data_base"),
    Exact("Competencia"),
    Exact("Mes_ano"),
    Exact("Periodo"),
    Fragments(&["data", "base"]),
    Fragments(&["competencia"]),
];

const SEGMENT_CODE: &[Candidate] = &[
    Exact("Codigo_do_segmento"),
    Exact("Codigo_segmento"),
    Fragments(&["codigo", "segmento"]),
    Fragments(&["cod", "segmento"]),
];

const SEGMENT_NAME: &[Candidate] = &[
    Exact("Nome_do_segmento"),
    Exact("Descricao_do_segmento"),
    Fragments(&["nome", "segmento"]),
    Fragments(&["descricao", "segmento"]),
    Exact("Segmento"),
];

const GROUP_CODE: &[Candidate] = &[
    Exact("Codigo_do_grupo"),
    Exact("Codigo_grupo"),
    Exact("Grupo"),
    Fragments(&["codigo", "grupo"]),
];

const AVERAGE_ASSET_VALUE: &[Candidate] = &[
    Exact("Valor_medio_do_bem"),
    Fragments(&["valor", "medio", "bem"]),
    Fragments(&["valor", "bem"]),
];

const ADMIN_FEE: &[Candidate] = &[
    Exact("Taxa_de_administracao"),
    Fragments(&["taxa", "administracao"]),
];

const GROUP_TERM: &[Candidate] = &[
    Exact("Prazo_do_grupo_em_meses"),
    Fragments(&["prazo", "grupo"]),
    Fragments(&["prazo"]),
];

const QUOTAS_CURRENT: &[Candidate] = &[
    Exact("Quantidade_de_cotas_ativas_em_dia"),
    Fragments(&["cotas ativas", "em dia"]),
];

// "naocontempladas" also contains "contempladas"; the contiguous fragment
// below only matches the contemplated column.
const QUOTAS_CONTEMPLATED_DELINQUENT: &[Candidate] = &[
    Exact("Quantidade_de_cotas_ativas_contempladas_inadimplentes"),
    Fragments(&["ativas contempladas inadimplentes"]),
];

const QUOTAS_NOT_CONTEMPLATED_DELINQUENT: &[Candidate] = &[
    Exact("Quantidade_de_cotas_ativas_nao_contempladas_inadimplentes"),
    Fragments(&["nao contempladas", "inadimplentes"]),
];

const QUOTAS_EXCLUDED: &[Candidate] = &[
    Exact("Quantidade_de_cotas_excluidas"),
    Fragments(&["cotas", "excluidas"]),
    Fragments(&["consorciados", "excluidos"]),
];

const BID_CONTEMPLATIONS: &[Candidate] = &[
    Exact("Quantidade_de_contemplados_por_lance"),
    Fragments(&["contemplados por lance"]),
    Fragments(&["contemplacoes", "lance"]),
];

const DRAW_CONTEMPLATIONS: &[Candidate] = &[
    Exact("Quantidade_de_contemplados_por_sorteio"),
    Fragments(&["contemplados por sorteio"]),
    Fragments(&["contemplacoes", "sorteio"]),
];

const STATE: &[Candidate] = &[
    Exact("UF"),
    Exact("Unidade_da_Federacao"),
    Fragments(&["unidade", "federacao"]),
    Exact("Estado"),
];

const ACTIVE_MEMBERS: &[Candidate] = &[
    Exact("Quantidade_de_consorciados_ativos"),
    Fragments(&["consorciados", "ativos"]),
    Fragments(&["cotas", "ativas"]),
];

const NEW_MEMBERS: &[Candidate] = &[
    Exact("Quantidade_de_adesoes"),
    Fragments(&["adesoes"]),
];

/// The 8-digit root of an administrator's CNPJ.
///
/// Spreadsheet exports often lose leading zeros, so partial numbers are
/// left-padded: up to 8 digits as a root, 9 to 13 digits as a full CNPJ.
pub fn cnpj_root(value: &str) -> Option<String> {
    let digits = digits_only(value);
    match digits.len() {
        0 => None,
        1..=8 => Some(format!("{digits:0>8}")),
        9..=13 => Some(format!("{digits:0>14}")[..8].to_string()),
        _ => Some(digits[..8].to_string()),
    }
}

/// Digits-only reading of a segment code, e.g. `"Seg. 31"` gives `31`.
pub fn segment_code(value: &str) -> Option<i64> {
    digits_only(value).parse().ok()
}

/// Parent segment of a movables sub-segment: the leading digit of any code
/// of two or more digits, so `31` and `310` both belong to segment `3`.
pub fn parent_segment(code: i64) -> i64 {
    let mut parent = code;
    while parent >= 10 {
        parent /= 10;
    }
    parent
}

fn competence_value(row: &RawRow) -> Option<String> {
    find_text(row, COMPETENCE).map(|raw| normalize_competence(raw).unwrap_or_else(|| raw.to_string()))
}

fn text(row: &RawRow, candidates: &[Candidate]) -> Option<String> {
    find_text(row, candidates).map(str::to_string)
}

fn count(row: &RawRow, candidates: &[Candidate]) -> i64 {
    parse_count(find_text(row, candidates))
}

/// `segments` files: administrator series per segment.
pub fn map_consolidated_series(row: &RawRow, file_name: &str) -> Option<CanonicalRecord> {
    let cnpj_raiz = cnpj_root(find_text(row, CNPJ)?)?;

    Some(CanonicalRecord::ConsolidatedSeries(ConsolidatedSeries {
        cnpj_raiz,
        nome_administradora: text(row, ADMINISTRATOR_NAME),
        codigo_segmento: find_text(row, SEGMENT_CODE).and_then(segment_code),
        data_base: competence_value(row),
        volume_financeiro: 0.0,
        dados: row.to_normalized_json(),
        arquivo_origem: file_name.to_string(),
        linha_original: row.to_json(),
    }))
}

fn map_group(row: &RawRow, file_name: &str, kind: AssetKind) -> Option<CanonicalRecord> {
    let cnpj_raiz = cnpj_root(find_text(row, CNPJ)?)?;
    let codigo_grupo = text(row, GROUP_CODE)?;

    let codigo_segmento = match kind {
        AssetKind::RealEstate => Some(1),
        AssetKind::Movables => find_text(row, SEGMENT_CODE)
            .and_then(segment_code)
            .map(parent_segment),
    };

    let em_dia = count(row, QUOTAS_CURRENT);
    let contempladas_inadimplentes = count(row, QUOTAS_CONTEMPLATED_DELINQUENT);
    let nao_contempladas_inadimplentes = count(row, QUOTAS_NOT_CONTEMPLATED_DELINQUENT);

    Some(CanonicalRecord::DetailedGroup(DetailedGroup {
        cnpj_raiz,
        nome_administradora: text(row, ADMINISTRATOR_NAME),
        codigo_grupo,
        codigo_segmento,
        tipo_bem: kind,
        data_base: competence_value(row),
        valor_medio_bem: parse_number_opt(find_text(row, AVERAGE_ASSET_VALUE)),
        taxa_administracao: parse_number_opt(find_text(row, ADMIN_FEE)),
        prazo_grupo_meses: parse_number_opt(find_text(row, GROUP_TERM)).map(|n| n.round() as i64),
        cotas_ativas_em_dia: em_dia,
        cotas_contempladas_inadimplentes: contempladas_inadimplentes,
        cotas_nao_contempladas_inadimplentes: nao_contempladas_inadimplentes,
        cotas_ativas: em_dia + contempladas_inadimplentes + nao_contempladas_inadimplentes,
        cotas_excluidas: count(row, QUOTAS_EXCLUDED),
        contemplados_lance: count(row, BID_CONTEMPLATIONS),
        contemplados_sorteio: count(row, DRAW_CONTEMPLATIONS),
        arquivo_origem: file_name.to_string(),
        linha_original: row.to_json(),
    }))
}

/// `real_estate` files: groups always belong to segment 1.
pub fn map_real_estate_group(row: &RawRow, file_name: &str) -> Option<CanonicalRecord> {
    map_group(row, file_name, AssetKind::RealEstate)
}

/// `movables` files: sub-segments are folded into their parent segment.
pub fn map_movables_group(row: &RawRow, file_name: &str) -> Option<CanonicalRecord> {
    map_group(row, file_name, AssetKind::Movables)
}

pub fn map_regional(row: &RawRow, file_name: &str) -> Option<CanonicalRecord> {
    let cnpj_raiz = cnpj_root(find_text(row, CNPJ)?)?;
    let uf = find_text(row, STATE)?.to_uppercase();
    if uf.chars().count() != 2 || !uf.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    Some(CanonicalRecord::Regional(RegionalQuarter {
        cnpj_raiz,
        uf,
        codigo_segmento: find_text(row, SEGMENT_CODE).and_then(segment_code),
        data_base: competence_value(row),
        consorciados_ativos: count(row, ACTIVE_MEMBERS),
        contemplados_lance: count(row, BID_CONTEMPLATIONS),
        contemplados_sorteio: count(row, DRAW_CONTEMPLATIONS),
        adesoes: count(row, NEW_MEMBERS),
        cotas_excluidas: count(row, QUOTAS_EXCLUDED),
        arquivo_origem: file_name.to_string(),
        linha_original: row.to_json(),
    }))
}

pub fn map_administrator(row: &RawRow, file_name: &str) -> Option<CanonicalRecord> {
    let cnpj_raiz = cnpj_root(find_text(row, CNPJ)?)?;

    Some(CanonicalRecord::Administrator(Administrator {
        cnpj_raiz,
        nome_administradora: text(row, ADMINISTRATOR_NAME),
        data_base: competence_value(row),
        arquivo_origem: file_name.to_string(),
        linha_original: row.to_json(),
    }))
}

pub fn map_segment(row: &RawRow, file_name: &str) -> Option<CanonicalRecord> {
    let codigo_segmento = find_text(row, SEGMENT_CODE).and_then(segment_code)?;
    let nome_segmento = text(row, SEGMENT_NAME)?;
    // A bare number under "Segmento" is a code, not a name
    if nome_segmento.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(CanonicalRecord::Segment(SegmentEntry {
        codigo_segmento,
        nome_segmento,
        arquivo_origem: file_name.to_string(),
        linha_original: row.to_json(),
    }))
}

/// Mapping functions applied to every row of a classified file.
#[derive(Debug, Clone, Copy)]
pub struct MappingPlan {
    /// Table the primary records go to; recorded on the control record.
    pub table: &'static str,
    pub primary: RowMapper,
    /// Reference data collected from the same rows, deduplicated per file.
    pub secondary: Option<RowMapper>,
}

pub fn plan_for(classification: FileClassification) -> Option<MappingPlan> {
    let (table, primary, secondary): (&'static str, RowMapper, Option<RowMapper>) =
        match classification {
            FileClassification::Segments => (
                tables::SERIES_CONSOLIDADAS,
                map_consolidated_series,
                Some(map_segment),
            ),
            FileClassification::RealEstate => {
                (tables::GRUPOS_DETALHADOS, map_real_estate_group, None)
            }
            FileClassification::Movables => (tables::GRUPOS_DETALHADOS, map_movables_group, None),
            FileClassification::RegionalUf => (tables::DADOS_TRIMESTRAIS_UF, map_regional, None),
            FileClassification::Administrators => {
                (tables::ADMINISTRADORAS, map_administrator, None)
            }
            FileClassification::Unknown => return None,
        };
    Some(MappingPlan {
        table,
        primary,
        secondary,
    })
}

/// Result of mapping every row of one file.
#[derive(Debug)]
pub struct MappedFile {
    /// Records grouped by destination table.
    pub tables: BTreeMap<&'static str, Vec<CanonicalRecord>>,
    pub primary_table: &'static str,
    /// First non-empty competence value, normalized to `YYYY-MM` when possible.
    pub competence: Option<String>,
    pub rows_seen: usize,
    pub rows_skipped: usize,
}

impl MappedFile {
    pub fn primary_count(&self) -> usize {
        self.tables.get(self.primary_table).map_or(0, Vec::len)
    }

    pub fn total_records(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// Map every row with `plan`, tracking the file's competence on the way.
pub fn map_rows(plan: &MappingPlan, rows: &[RawRow], file_name: &str) -> MappedFile {
    let mut mapped = MappedFile {
        tables: BTreeMap::new(),
        primary_table: plan.table,
        competence: None,
        rows_seen: 0,
        rows_skipped: 0,
    };
    let mut first_competence: Option<&str> = None;
    let mut seen_keys: HashSet<String> = HashSet::new();

    for row in rows {
        mapped.rows_seen += 1;

        if first_competence.is_none() {
            first_competence = find_text(row, COMPETENCE);
        }

        match (plan.primary)(row, file_name) {
            Some(record) => mapped.tables.entry(record.table()).or_default().push(record),
            None => mapped.rows_skipped += 1,
        }

        if let Some(secondary) = plan.secondary {
            if let Some(record) = secondary(row, file_name) {
                let fresh = record.dedup_key().map_or(true, |k| seen_keys.insert(k));
                if fresh {
                    mapped.tables.entry(record.table()).or_default().push(record);
                }
            }
        }
    }

    mapped.competence = first_competence.and_then(normalize_competence);
    mapped
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        RawRow::new(
            pairs
                .iter()
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn group(record: Option<CanonicalRecord>) -> DetailedGroup {
        match record {
            Some(CanonicalRecord::DetailedGroup(g)) => g,
            other => panic!("expected detailed group, got {other:?}"),
        }
    }

    #[test]
    fn test_cnpj_root() {
        assert_eq!(cnpj_root("12345678").as_deref(), Some("12345678"));
        assert_eq!(cnpj_root("12.345.678/0001-90").as_deref(), Some("12345678"));
        assert_eq!(cnpj_root("1234567").as_deref(), Some("01234567"));
        assert_eq!(cnpj_root("1234567000190").as_deref(), Some("01234567"));
        assert_eq!(cnpj_root(" - "), None);
    }

    #[test]
    fn test_parent_segment() {
        assert_eq!(parent_segment(31), 3);
        assert_eq!(parent_segment(20), 2);
        assert_eq!(parent_segment(6), 6);
        assert_eq!(parent_segment(310), 3);
        assert_eq!(parent_segment(4521), 4);
    }

    #[test]
    fn test_real_estate_group_end_to_end_row() {
        let r = row(&[
            ("CNPJ_da_Administradora", "12345678"),
            ("Código_do_grupo", "G1"),
            ("Data_base", "2024-03"),
            ("Valor_médio_do_bem", "100.000,00"),
            ("Quantidade_de_cotas_ativas_em_dia", "5"),
        ]);
        let g = group(map_real_estate_group(&r, "202501_Imoveis.csv"));

        assert_eq!(g.cnpj_raiz, "12345678");
        assert_eq!(g.codigo_grupo, "G1");
        assert_eq!(g.data_base.as_deref(), Some("2024-03"));
        assert_eq!(g.valor_medio_bem, Some(100000.0));
        assert_eq!(g.cotas_ativas_em_dia, 5);
        assert_eq!(g.cotas_ativas, 5);
        assert_eq!(g.codigo_segmento, Some(1));
        assert_eq!(g.tipo_bem, AssetKind::RealEstate);
        assert_eq!(g.taxa_administracao, None);
        assert_eq!(g.arquivo_origem, "202501_Imoveis.csv");
    }

    #[test]
    fn test_real_estate_ignores_declared_segment() {
        let r = row(&[("CNPJ", "1"), ("Codigo do grupo", "7"), ("Código do segmento", "31")]);
        assert_eq!(group(map_real_estate_group(&r, "f.csv")).codigo_segmento, Some(1));
    }

    #[test]
    fn test_movables_sub_segment_reduced() {
        let r = row(&[("CNPJ", "1"), ("Codigo do grupo", "7"), ("Código do segmento", "31")]);
        let g = group(map_movables_group(&r, "f.csv"));
        assert_eq!(g.codigo_segmento, Some(3));
        assert_eq!(g.tipo_bem, AssetKind::Movables);
    }

    #[test]
    fn test_delinquent_columns_are_not_confused() {
        let r = row(&[
            ("CNPJ", "1"),
            ("Código do grupo", "G"),
            ("Quantidade de cotas ativas em dia", "10"),
            ("Quantidade de cotas ativas não contempladas inadimplentes", "2"),
            ("Quantidade de cotas ativas contempladas inadimplentes", "3"),
        ]);
        let g = group(map_real_estate_group(&r, "f.csv"));
        assert_eq!(g.cotas_contempladas_inadimplentes, 3);
        assert_eq!(g.cotas_nao_contempladas_inadimplentes, 2);
        assert_eq!(g.cotas_ativas, 15);
    }

    #[test]
    fn test_group_requires_tax_id_and_group_code() {
        let no_cnpj = row(&[("CNPJ", ""), ("Código do grupo", "G1")]);
        assert!(map_real_estate_group(&no_cnpj, "f.csv").is_none());
        let no_group = row(&[("CNPJ", "123"), ("Código do grupo", " ")]);
        assert!(map_movables_group(&no_group, "f.csv").is_none());
    }

    #[test]
    fn test_regional_requires_two_letter_state() {
        let ok = row(&[("CNPJ", "123"), ("UF", "sp"), ("Quantidade de consorciados ativos", "1.200")]);
        match map_regional(&ok, "uf.csv") {
            Some(CanonicalRecord::Regional(r)) => {
                assert_eq!(r.uf, "SP");
                assert_eq!(r.consorciados_ativos, 1200);
            }
            other => panic!("unexpected {other:?}"),
        }

        let bad = row(&[("CNPJ", "123"), ("UF", "São Paulo")]);
        assert!(map_regional(&bad, "uf.csv").is_none());
        let empty = row(&[("CNPJ", "123"), ("UF", "")]);
        assert!(map_regional(&empty, "uf.csv").is_none());
    }

    #[test]
    fn test_administrator_name_optional() {
        let with_name = row(&[("CNPJ", "123"), ("Razão Social", "ACME Consórcios")]);
        match map_administrator(&with_name, "adm.csv") {
            Some(CanonicalRecord::Administrator(a)) => {
                assert_eq!(a.nome_administradora.as_deref(), Some("ACME Consórcios"));
                assert_eq!(a.cnpj_raiz, "00000123");
            }
            other => panic!("unexpected {other:?}"),
        }
        let without = row(&[("CNPJ", "123")]);
        assert!(map_administrator(&without, "adm.csv").is_some());
    }

    #[test]
    fn test_consolidated_series_keeps_payload_and_zero_volume() {
        let r = row(&[("CNPJ", "123"), ("Código do segmento", "Seg 4"), ("Cotas ativas", "9")]);
        match map_consolidated_series(&r, "seg.csv") {
            Some(CanonicalRecord::ConsolidatedSeries(s)) => {
                assert_eq!(s.codigo_segmento, Some(4));
                assert_eq!(s.volume_financeiro, 0.0);
                assert_eq!(s.dados["cotasativas"], "9");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_segment_requires_code_and_name() {
        let ok = row(&[("Código do segmento", "3"), ("Nome do segmento", "Veículos")]);
        assert!(map_segment(&ok, "seg.csv").is_some());
        let no_name = row(&[("Código do segmento", "3")]);
        assert!(map_segment(&no_name, "seg.csv").is_none());
        let numeric_name = row(&[("Código do segmento", "3"), ("Segmento", "3")]);
        assert!(map_segment(&numeric_name, "seg.csv").is_none());
    }

    #[test]
    fn test_map_rows_skips_invalid_rows_only() {
        let rows = vec![
            row(&[("CNPJ", "111"), ("Código do grupo", "A"), ("Data base", "")]),
            row(&[("CNPJ", ""), ("Código do grupo", "B"), ("Data base", "03/2024")]),
            row(&[("CNPJ", "333"), ("Código do grupo", "C"), ("Data base", "04/2024")]),
        ];
        let plan = plan_for(FileClassification::RealEstate).unwrap();
        let mapped = map_rows(&plan, &rows, "imoveis.csv");

        assert_eq!(mapped.rows_seen, 3);
        assert_eq!(mapped.rows_skipped, 1);
        assert_eq!(mapped.primary_table, "grupos_detalhados");
        assert_eq!(mapped.primary_count(), 2);
        // First non-empty value wins, even from a dropped row
        assert_eq!(mapped.competence.as_deref(), Some("2024-03"));
    }

    #[test]
    fn test_map_rows_unparsable_competence_is_none() {
        let rows = vec![row(&[("CNPJ", "1"), ("Código do grupo", "A"), ("Data base", "março")])];
        let plan = plan_for(FileClassification::RealEstate).unwrap();
        assert_eq!(map_rows(&plan, &rows, "f.csv").competence, None);
    }

    #[test]
    fn test_segments_file_feeds_catalog_once_per_code() {
        let rows = vec![
            row(&[("CNPJ", "1"), ("Código do segmento", "3"), ("Nome do segmento", "Veículos")]),
            row(&[("CNPJ", "2"), ("Código do segmento", "3"), ("Nome do segmento", "Veículos")]),
            row(&[("CNPJ", "3"), ("Código do segmento", "1"), ("Nome do segmento", "Imóveis")]),
        ];
        let plan = plan_for(FileClassification::Segments).unwrap();
        let mapped = map_rows(&plan, &rows, "seg.csv");

        assert_eq!(mapped.primary_table, "series_consolidadas");
        assert_eq!(mapped.tables["series_consolidadas"].len(), 3);
        assert_eq!(mapped.tables["segmentos"].len(), 2);
        assert_eq!(mapped.total_records(), 5);
    }

    #[test]
    fn test_unknown_has_no_plan() {
        assert!(plan_for(FileClassification::Unknown).is_none());
    }
}

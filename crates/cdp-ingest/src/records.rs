//! Canonical record shapes
//!
//! One variant per destination table. Records are produced by the functions in
//! [`crate::mapper`]; the structs are `#[non_exhaustive]` so code outside this
//! crate can read them but not build unvalidated ones.

use serde::Serialize;
use serde_json::Value;

use crate::catalog::tables;
use crate::store::Row;

/// Kind of asset financed by a consortium group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetKind {
    #[serde(rename = "imoveis")]
    RealEstate,
    #[serde(rename = "moveis")]
    Movables,
}

/// Administrator-level series from the consolidated segment reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ConsolidatedSeries {
    pub cnpj_raiz: String,
    pub nome_administradora: Option<String>,
    pub codigo_segmento: Option<i64>,
    pub data_base: Option<String>,
    /// Always zero: these reports carry quota counts, not balances.
    pub volume_financeiro: f64,
    /// Every column of the source row, keyed by normalized header.
    pub dados: Value,
    pub arquivo_origem: String,
    pub linha_original: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct DetailedGroup {
    pub cnpj_raiz: String,
    pub nome_administradora: Option<String>,
    pub codigo_grupo: String,
    pub codigo_segmento: Option<i64>,
    pub tipo_bem: AssetKind,
    pub data_base: Option<String>,
    pub valor_medio_bem: Option<f64>,
    pub taxa_administracao: Option<f64>,
    pub prazo_grupo_meses: Option<i64>,
    pub cotas_ativas_em_dia: i64,
    pub cotas_contempladas_inadimplentes: i64,
    pub cotas_nao_contempladas_inadimplentes: i64,
    /// Current quotas plus both delinquent quota counts.
    pub cotas_ativas: i64,
    pub cotas_excluidas: i64,
    pub contemplados_lance: i64,
    pub contemplados_sorteio: i64,
    pub arquivo_origem: String,
    pub linha_original: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct RegionalQuarter {
    pub cnpj_raiz: String,
    pub uf: String,
    pub codigo_segmento: Option<i64>,
    pub data_base: Option<String>,
    pub consorciados_ativos: i64,
    pub contemplados_lance: i64,
    pub contemplados_sorteio: i64,
    pub adesoes: i64,
    pub cotas_excluidas: i64,
    pub arquivo_origem: String,
    pub linha_original: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct Administrator {
    pub cnpj_raiz: String,
    pub nome_administradora: Option<String>,
    pub data_base: Option<String>,
    pub arquivo_origem: String,
    pub linha_original: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct SegmentEntry {
    pub codigo_segmento: i64,
    pub nome_segmento: String,
    pub arquivo_origem: String,
    pub linha_original: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalRecord {
    ConsolidatedSeries(ConsolidatedSeries),
    DetailedGroup(DetailedGroup),
    Regional(RegionalQuarter),
    Administrator(Administrator),
    Segment(SegmentEntry),
}

impl CanonicalRecord {
    /// Destination table of this record.
    pub fn table(&self) -> &'static str {
        match self {
            Self::ConsolidatedSeries(_) => tables::SERIES_CONSOLIDADAS,
            Self::DetailedGroup(_) => tables::GRUPOS_DETALHADOS,
            Self::Regional(_) => tables::DADOS_TRIMESTRAIS_UF,
            Self::Administrator(_) => tables::ADMINISTRADORAS,
            Self::Segment(_) => tables::SEGMENTOS,
        }
    }

    pub fn source_file(&self) -> &str {
        match self {
            Self::ConsolidatedSeries(r) => &r.arquivo_origem,
            Self::DetailedGroup(r) => &r.arquivo_origem,
            Self::Regional(r) => &r.arquivo_origem,
            Self::Administrator(r) => &r.arquivo_origem,
            Self::Segment(r) => &r.arquivo_origem,
        }
    }

    /// Key used to drop repeated reference entries within one file.
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            Self::Segment(r) => Some(r.codigo_segmento.to_string()),
            _ => None,
        }
    }

    /// Column/value map ready for insertion.
    pub fn to_row(&self) -> Result<Row, serde_json::Error> {
        let value = match self {
            Self::ConsolidatedSeries(r) => serde_json::to_value(r)?,
            Self::DetailedGroup(r) => serde_json::to_value(r)?,
            Self::Regional(r) => serde_json::to_value(r)?,
            Self::Administrator(r) => serde_json::to_value(r)?,
            Self::Segment(r) => serde_json::to_value(r)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Row::new()),
        }
    }
}

//! Destination schema catalog
//!
//! The catalog is a value handed to the provisioner, not a global. It is read
//! only when a table has to be created and is shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the built-in catalog layout.
pub const CATALOG_VERSION: u32 = 1;

/// Default dataset name for the built-in catalog.
pub const DEFAULT_DATASET: &str = "consorcios";

/// Destination table identifiers.
pub mod tables {
    pub const SERIES_CONSOLIDADAS: &str = "series_consolidadas";
    pub const GRUPOS_DETALHADOS: &str = "grupos_detalhados";
    pub const DADOS_TRIMESTRAIS_UF: &str = "dados_trimestrais_uf";
    pub const ADMINISTRADORAS: &str = "administradoras";
    pub const SEGMENTOS: &str = "segmentos";
}

/// Column holding the source file name on every table.
pub const SOURCE_FILE_COLUMN: &str = "arquivo_origem";
/// Column holding the raw row on every table.
pub const RAW_ROW_COLUMN: &str = "linha_original";
/// Column stamped by the loader on every table.
pub const INGESTED_AT_COLUMN: &str = "data_ingestao";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Timestamp,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<FieldSpec>,
}

impl TableSchema {
    /// Build a schema from `(name, type)` pairs, appending the metadata columns
    /// every destination table carries.
    pub fn with_metadata(columns: &[(&str, FieldType)]) -> Self {
        let mut fields: Vec<FieldSpec> = columns
            .iter()
            .map(|(name, ty)| FieldSpec::new(*name, *ty))
            .collect();
        fields.push(FieldSpec::new(SOURCE_FILE_COLUMN, FieldType::String));
        fields.push(FieldSpec::new(RAW_ROW_COLUMN, FieldType::Json));
        fields.push(FieldSpec::new(INGESTED_AT_COLUMN, FieldType::Timestamp));
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub version: u32,
    pub dataset: String,
    pub tables: BTreeMap<String, TableSchema>,
}

impl SchemaCatalog {
    /// The catalog for the five consortium tables.
    pub fn standard(dataset: impl Into<String>) -> Self {
        use FieldType as F;

        let mut schemas = BTreeMap::new();
        schemas.insert(
            tables::SERIES_CONSOLIDADAS.to_string(),
            TableSchema::with_metadata(&[
                ("cnpj_raiz", F::String),
                ("nome_administradora", F::String),
                ("codigo_segmento", F::Integer),
                ("data_base", F::String),
                ("volume_financeiro", F::Float),
                ("dados", F::Json),
            ]),
        );
        schemas.insert(
            tables::GRUPOS_DETALHADOS.to_string(),
            TableSchema::with_metadata(&[
                ("cnpj_raiz", F::String),
                ("nome_administradora", F::String),
                ("codigo_grupo", F::String),
                ("codigo_segmento", F::Integer),
                ("tipo_bem", F::String),
                ("data_base", F::String),
                ("valor_medio_bem", F::Float),
                ("taxa_administracao", F::Float),
                ("prazo_grupo_meses", F::Integer),
                ("cotas_ativas_em_dia", F::Integer),
                ("cotas_contempladas_inadimplentes", F::Integer),
                ("cotas_nao_contempladas_inadimplentes", F::Integer),
                ("cotas_ativas", F::Integer),
                ("cotas_excluidas", F::Integer),
                ("contemplados_lance", F::Integer),
                ("contemplados_sorteio", F::Integer),
            ]),
        );
        schemas.insert(
            tables::DADOS_TRIMESTRAIS_UF.to_string(),
            TableSchema::with_metadata(&[
                ("cnpj_raiz", F::String),
                ("uf", F::String),
                ("codigo_segmento", F::Integer),
                ("data_base", F::String),
                ("consorciados_ativos", F::Integer),
                ("contemplados_lance", F::Integer),
                ("contemplados_sorteio", F::Integer),
                ("adesoes", F::Integer),
                ("cotas_excluidas", F::Integer),
            ]),
        );
        schemas.insert(
            tables::ADMINISTRADORAS.to_string(),
            TableSchema::with_metadata(&[
                ("cnpj_raiz", F::String),
                ("nome_administradora", F::String),
                ("data_base", F::String),
            ]),
        );
        schemas.insert(
            tables::SEGMENTOS.to_string(),
            TableSchema::with_metadata(&[
                ("codigo_segmento", F::Integer),
                ("nome_segmento", F::String),
            ]),
        );

        Self {
            version: CATALOG_VERSION,
            dataset: dataset.into(),
            tables: schemas,
        }
    }

    /// Parse a catalog from its JSON form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    pub fn table_ids(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::standard(DEFAULT_DATASET)
    }
}

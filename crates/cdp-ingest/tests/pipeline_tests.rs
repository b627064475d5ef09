//! End-to-end pipeline tests over the in-memory stores

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cdp_ingest::catalog::SchemaCatalog;
use cdp_ingest::control::{ControlFilter, ControlStore};
use cdp_ingest::controller::{
    Caller, DeleteRequest, IngestionController, ObjectOutcome, ReprocessRequest,
};
use cdp_ingest::memory::{MemoryAnalyticalStore, MemoryControlStore, MemoryObjectStore};
use cdp_ingest::{ControlStatus, FileClassification};
use serde_json::json;
use std::sync::Arc;

const DATASET: &str = "consorcios";

struct Pipeline {
    controller: Arc<IngestionController>,
    control: Arc<MemoryControlStore>,
    analytical: Arc<MemoryAnalyticalStore>,
    objects: Arc<MemoryObjectStore>,
}

fn pipeline() -> Pipeline {
    pipeline_with_batch_size(1000)
}

fn pipeline_with_batch_size(batch_size: usize) -> Pipeline {
    let control = Arc::new(MemoryControlStore::new());
    let analytical = Arc::new(MemoryAnalyticalStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let controller = IngestionController::new(
        control.clone(),
        analytical.clone(),
        objects.clone(),
        Arc::new(SchemaCatalog::default()),
    )
    .with_batch_size(batch_size);

    Pipeline {
        controller: Arc::new(controller),
        control,
        analytical,
        objects,
    }
}

const REAL_ESTATE: &str = "CNPJ_da_Administradora;Código_do_grupo;Data_base;Valor_médio_do_bem;Quantidade_de_cotas_ativas_em_dia\n\
\"12345678\";\"G1\";\"2024-03\";\"100.000,00\";\"5\"\n";

const MOVABLES: &str = "CNPJ_da_Administradora;Código_do_grupo;Código_do_segmento;Data_base;Quantidade_de_cotas_ativas_em_dia;Quantidade_de_cotas_excluídas\n\
11.222.333/0001-44;M1;31;03/2024;10;2\n\
;M2;31;03/2024;7;0\n\
11222333000144;M3;4;03/2024;1.234;-\n";

const REGIONAL: &str = "CNPJ_da_Administradora,UF,Código_do_segmento,Data_base,Quantidade_de_consorciados_ativos,Quantidade_de_contemplados_por_lance,Quantidade_de_contemplados_por_sorteio,Quantidade_de_adesões\n\
12345678,sp,3,2024-06,1500,12,8,40\n\
12345678,São Paulo,3,2024-06,1,1,1,1\n";

const SEGMENTS: &str = "CNPJ_da_Administradora;Nome_da_Administradora;Código_do_segmento;Nome_do_segmento;Data_base\n\
12345678;Alfa Consórcios;3;Veículos automotores;2024-03\n\
87654321;Beta Consórcios;3;Veículos automotores;2024-03\n\
87654321;Beta Consórcios;1;Imóveis;2024-03\n";

#[tokio::test]
async fn test_real_estate_csv_end_to_end() {
    let p = pipeline();
    p.objects.put("uploads/raw/Imoveis.csv", REAL_ESTATE).await;

    let outcome = p.controller.handle_object("uploads/raw/Imoveis.csv").await.unwrap();
    let report = match outcome {
        ObjectOutcome::Processed(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(report.status, ControlStatus::Success);
    assert_eq!(report.file_type, FileClassification::RealEstate);
    assert_eq!(report.rows_processed, 1);

    let rows = p.analytical.rows(DATASET, "grupos_detalhados").await;
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["cnpj_raiz"], json!("12345678"));
    assert_eq!(row["codigo_grupo"], json!("G1"));
    assert_eq!(row["data_base"], json!("2024-03"));
    assert_eq!(row["cotas_ativas_em_dia"], json!(5));
    assert_eq!(row["valor_medio_bem"], json!(100000.0));
    assert_eq!(row["codigo_segmento"], json!(1));
    assert_eq!(row["tipo_bem"], json!("imoveis"));
    assert_eq!(row["arquivo_origem"], json!("Imoveis.csv"));
    assert!(row["data_ingestao"].is_string());

    let record = p.control.get("Imoveis").await.unwrap().unwrap();
    assert_eq!(record.status, ControlStatus::Success);
    assert_eq!(record.rows_processed, 1);
    assert_eq!(record.reference_date, "2024-03");
    assert_eq!(record.storage_path, "uploads/raw/Imoveis.csv");
}

#[tokio::test]
async fn test_real_estate_spreadsheet_end_to_end() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("Imoveis_grupos.xlsx");
    let p = pipeline();
    p.objects
        .put("uploads/raw/Imoveis_grupos.xlsx", std::fs::read(path).unwrap())
        .await;

    let report = match p.controller.handle_object("uploads/raw/Imoveis_grupos.xlsx").await.unwrap() {
        ObjectOutcome::Processed(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(report.status, ControlStatus::Success);
    assert_eq!(report.file_type, FileClassification::RealEstate);
    assert_eq!(report.rows_processed, 1);
    assert_eq!(report.reference_date, "2024-03");

    let rows = p.analytical.rows(DATASET, "grupos_detalhados").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["codigo_grupo"], json!("G1"));
    assert_eq!(rows[0]["valor_medio_bem"], json!(100000.5));
}

#[tokio::test]
async fn test_movables_fold_segments_and_drop_rows_without_tax_id() {
    let p = pipeline();
    let report = p
        .controller
        .ingest(MOVABLES.as_bytes(), "Moveis_2024.csv", "uploads/raw/Moveis_2024.csv")
        .await
        .unwrap();

    assert_eq!(report.status, ControlStatus::Success);
    assert_eq!(report.rows_processed, 2);
    assert_eq!(report.rows_skipped, 1);

    let rows = p.analytical.rows(DATASET, "grupos_detalhados").await;
    assert_eq!(rows[0]["cnpj_raiz"], json!("11222333"));
    assert_eq!(rows[0]["codigo_segmento"], json!(3));
    assert_eq!(rows[0]["cotas_excluidas"], json!(2));
    assert_eq!(rows[0]["data_base"], json!("2024-03"));
    assert_eq!(rows[1]["codigo_grupo"], json!("M3"));
    assert_eq!(rows[1]["codigo_segmento"], json!(4));
    assert_eq!(rows[1]["cotas_ativas_em_dia"], json!(1234));
    assert_eq!(rows[1]["cotas_excluidas"], json!(0));
    assert_eq!(rows[1]["valor_medio_bem"], json!(null));
}

#[tokio::test]
async fn test_regional_file_classified_by_headers() {
    let p = pipeline();
    let report = p
        .controller
        .ingest(REGIONAL.as_bytes(), "dados_trimestrais.csv", "uploads/raw/dados_trimestrais.csv")
        .await
        .unwrap();

    assert_eq!(report.file_type, FileClassification::RegionalUf);
    assert_eq!(report.rows_processed, 1);
    assert_eq!(report.target_table.as_deref(), Some("dados_trimestrais_uf"));

    let rows = p.analytical.rows(DATASET, "dados_trimestrais_uf").await;
    assert_eq!(rows[0]["uf"], json!("SP"));
    assert_eq!(rows[0]["consorciados_ativos"], json!(1500));
    assert_eq!(rows[0]["adesoes"], json!(40));
}

#[tokio::test]
async fn test_segments_file_feeds_series_and_catalog() {
    let p = pipeline();
    let report = p
        .controller
        .ingest(SEGMENTS.as_bytes(), "Segmentos.csv", "uploads/raw/Segmentos.csv")
        .await
        .unwrap();

    assert_eq!(report.status, ControlStatus::Success);
    assert_eq!(report.rows_processed, 3);
    assert_eq!(report.tables["series_consolidadas"], 3);
    assert_eq!(report.tables["segmentos"], 2);

    let series = p.analytical.rows(DATASET, "series_consolidadas").await;
    assert_eq!(series[0]["volume_financeiro"], json!(0.0));
    assert_eq!(series[0]["nome_administradora"], json!("Alfa Consórcios"));
    assert_eq!(series[0]["dados"]["nomedosegmento"], json!("Veículos automotores"));

    let record = p.control.get("Segmentos").await.unwrap().unwrap();
    assert_eq!(record.target_table.as_deref(), Some("series_consolidadas"));
}

#[tokio::test]
async fn test_header_only_file_is_warning() {
    let p = pipeline();
    let header_only = "CNPJ_da_Administradora;Código_do_grupo;Data_base\n";
    let report = p
        .controller
        .ingest(header_only.as_bytes(), "Imoveis_vazio.csv", "uploads/raw/Imoveis_vazio.csv")
        .await
        .unwrap();

    assert_eq!(report.status, ControlStatus::Warning);
    let record = p.control.get("Imoveis_vazio").await.unwrap().unwrap();
    assert_eq!(record.status, ControlStatus::Warning);
    assert_eq!(record.rows_processed, 0);
    assert_eq!(record.reference_date, "UNKNOWN");
}

#[tokio::test]
async fn test_all_invalid_rows_is_warning() {
    let p = pipeline();
    let invalid = "CNPJ_da_Administradora;Código_do_grupo\n;G1\n12345678;\n";
    let report = p
        .controller
        .ingest(invalid.as_bytes(), "Imoveis.csv", "uploads/raw/Imoveis.csv")
        .await
        .unwrap();

    assert_eq!(report.status, ControlStatus::Warning);
    assert_eq!(report.rows_skipped, 2);
}

#[tokio::test]
async fn test_reprocess_twice_keeps_one_record_and_no_duplicates() {
    let p = pipeline();
    p.objects.put("uploads/raw/Imoveis.csv", REAL_ESTATE).await;
    p.controller
        .register_upload("Imoveis.csv", "uploads/raw/Imoveis.csv")
        .await
        .unwrap();

    let request = ReprocessRequest {
        file_id: Some("Imoveis".into()),
        storage_path: "uploads/raw/Imoveis.csv".into(),
    };
    for _ in 0..2 {
        let report = p.controller.reprocess(Caller::privileged(), &request).await.unwrap();
        assert_eq!(report.status, ControlStatus::Success);
    }

    assert_eq!(p.control.len().await, 1);
    let record = p.control.get("Imoveis").await.unwrap().unwrap();
    assert_eq!(record.rows_processed, 1);
    assert_eq!(p.analytical.rows(DATASET, "grupos_detalhados").await.len(), 1);
}

#[tokio::test]
async fn test_reupload_does_not_duplicate_rows() {
    let p = pipeline();
    for _ in 0..2 {
        p.controller
            .register_upload("Imoveis.csv", "uploads/raw/Imoveis.csv")
            .await
            .unwrap();
        p.controller
            .ingest(REAL_ESTATE.as_bytes(), "Imoveis.csv", "uploads/raw/Imoveis.csv")
            .await
            .unwrap();
    }
    assert_eq!(p.analytical.rows(DATASET, "grupos_detalhados").await.len(), 1);
}

#[tokio::test]
async fn test_delete_returns_per_table_results() {
    let p = pipeline();
    p.objects.put("uploads/raw/Imoveis.csv", REAL_ESTATE).await;
    p.controller.handle_object("uploads/raw/Imoveis.csv").await.unwrap();

    let outcome = p
        .controller
        .delete(
            Caller::privileged(),
            &DeleteRequest {
                file_id: "Imoveis".into(),
                storage_path: "uploads/raw/Imoveis.csv".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.tables.len(), 5);
    assert!(outcome.tables.iter().all(|t| t.is_ok()));
    let groups = outcome
        .tables
        .iter()
        .find(|t| t.table == "grupos_detalhados")
        .unwrap();
    assert_eq!(groups.deleted, 1);
    assert!(outcome.object_deleted);
    assert!(outcome.record_removed);

    assert!(p.analytical.rows(DATASET, "grupos_detalhados").await.is_empty());
    assert!(!p.objects.contains("uploads/raw/Imoveis.csv").await);
    assert!(p.control.get("Imoveis").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_continues_past_a_failing_table() {
    let p = pipeline();
    p.objects.put("uploads/raw/Segmentos.csv", SEGMENTS).await;
    p.controller.handle_object("uploads/raw/Segmentos.csv").await.unwrap();
    p.analytical.fail_deletes_on("segmentos").await;

    let outcome = p
        .controller
        .delete(
            Caller::privileged(),
            &DeleteRequest {
                file_id: "Segmentos".into(),
                storage_path: "uploads/raw/Segmentos.csv".into(),
            },
        )
        .await
        .unwrap();

    let failed: Vec<_> = outcome.tables.iter().filter(|t| !t.is_ok()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].table, "segmentos");
    assert!(failed[0].error.as_deref().unwrap().contains("delete rejected"));

    let series = outcome
        .tables
        .iter()
        .find(|t| t.table == "series_consolidadas")
        .unwrap();
    assert_eq!(series.deleted, 3);
    assert!(p.analytical.rows(DATASET, "series_consolidadas").await.is_empty());
    assert_eq!(p.analytical.rows(DATASET, "segmentos").await.len(), 2);

    assert!(outcome.object_deleted);
    assert!(outcome.record_removed);
    assert!(!p.objects.contains("uploads/raw/Segmentos.csv").await);
    assert!(p.control.get("Segmentos").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reset_all_purges_rows_and_keeps_uploads() {
    let p = pipeline();
    p.objects.put("uploads/raw/Imoveis.csv", REAL_ESTATE).await;
    p.objects.put("uploads/raw/Segmentos.csv", SEGMENTS).await;
    p.controller.handle_object("uploads/raw/Imoveis.csv").await.unwrap();
    p.controller.handle_object("uploads/raw/Segmentos.csv").await.unwrap();

    let summary = p.controller.reset_all(Caller::privileged()).await.unwrap();

    assert_eq!(summary.files_reset, 2);
    assert_eq!(summary.rows_deleted, 6);
    assert_eq!(summary.table_failures, 0);
    assert!(p.control.is_empty().await);
    assert!(p.objects.contains("uploads/raw/Imoveis.csv").await);
    let counts = p.analytical.counts(DATASET).await;
    assert!(counts.values().all(|&n| n == 0), "{counts:?}");
}

#[tokio::test]
async fn test_admin_operations_require_privilege() {
    let p = pipeline();
    let err = p
        .controller
        .reprocess(
            Caller::anonymous(),
            &ReprocessRequest {
                file_id: None,
                storage_path: "uploads/raw/Imoveis.csv".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "permission-denied");
}

#[tokio::test]
async fn test_small_batches_load_every_row() {
    let p = pipeline_with_batch_size(2);
    let mut csv = String::from("CNPJ_da_Administradora;Código_do_grupo;Data_base\n");
    for i in 0..7 {
        csv.push_str(&format!("12345678;G{i};2024-03\n"));
    }

    let report = p
        .controller
        .ingest(csv.as_bytes(), "Imoveis.csv", "uploads/raw/Imoveis.csv")
        .await
        .unwrap();

    assert_eq!(report.rows_processed, 7);
    assert_eq!(p.analytical.insert_calls().await, 4);
}

#[tokio::test]
async fn test_concurrent_files_share_tables() {
    let p = pipeline();
    let handles: Vec<_> = ["Imoveis_A.csv", "Imoveis_B.csv", "Imoveis_C.csv"]
        .into_iter()
        .map(|name| {
            let controller = p.controller.clone();
            tokio::spawn(async move {
                controller
                    .ingest(REAL_ESTATE.as_bytes(), name, &format!("uploads/raw/{name}"))
                    .await
            })
        })
        .collect();
    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.status, ControlStatus::Success);
    }

    assert_eq!(p.analytical.create_table_calls().await, 1);
    assert_eq!(p.analytical.rows(DATASET, "grupos_detalhados").await.len(), 3);
}

#[tokio::test]
async fn test_list_records_by_reference_date_and_status() {
    let p = pipeline();
    p.controller
        .ingest(REAL_ESTATE.as_bytes(), "Imoveis.csv", "uploads/raw/Imoveis.csv")
        .await
        .unwrap();
    p.controller
        .ingest(REGIONAL.as_bytes(), "dados_trimestrais.csv", "uploads/raw/dados_trimestrais.csv")
        .await
        .unwrap();
    p.controller
        .ingest(b"a;b\n1;2\n", "outros.csv", "uploads/raw/outros.csv")
        .await
        .unwrap();

    let march = p
        .controller
        .records(&ControlFilter {
            from: Some("2024-01".into()),
            to: Some("2024-03".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(march.len(), 1);
    assert_eq!(march[0].file_id, "Imoveis");

    let errors = p
        .controller
        .records(&ControlFilter {
            status: Some(ControlStatus::Error),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].file_id, "outros");
}

//! Splitting file content into header-keyed rows
//!
//! CSV content is decoded (UTF-8, falling back to Windows-1252), the delimiter
//! is sniffed from the header line and quotes are handled by the `csv` reader.
//! Spreadsheets are written to a temporary file and read with `calamine`; the
//! temporary file is removed when it goes out of scope on every return path.

use calamine::{open_workbook_auto, Data, Reader};
use std::io::Write;
use tracing::{debug, instrument};

use crate::error::{IngestError, Result};
use crate::normalize::file_name;
use crate::values::RawRow;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Header line plus data rows of one file.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Source format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Delimited,
    Spreadsheet,
}

impl ContentKind {
    pub fn from_file_name(name: &str) -> Self {
        let extension = file_name(name)
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
            ContentKind::Spreadsheet
        } else {
            ContentKind::Delimited
        }
    }
}

/// Read `bytes` into a [`Table`], picking the reader from the file name.
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn read_table(bytes: &[u8], name: &str) -> Result<Table> {
    let table = match ContentKind::from_file_name(name) {
        ContentKind::Delimited => read_delimited(bytes, name)?,
        ContentKind::Spreadsheet => read_spreadsheet(bytes, name)?,
    };
    debug!(
        columns = table.headers.len(),
        rows = table.rows.len(),
        "Content split into rows"
    );
    Ok(table)
}

/// Decode text content. A UTF-8 BOM is dropped; invalid UTF-8 is read as Windows-1252.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

/// `;` when the header line has one, `,` otherwise.
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if header.contains(';') {
        b';'
    } else {
        b','
    }
}

fn read_delimited(bytes: &[u8], name: &str) -> Result<Table> {
    let text = decode_text(bytes);
    let delimiter = sniff_delimiter(&text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::read(name, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestError::read(name, e))?;
        let values: Vec<String> = record.iter().map(str::to_string).collect();
        let row = RawRow::from_parts(&headers, &values);
        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(Table { headers, rows })
}

fn read_spreadsheet(bytes: &[u8], name: &str) -> Result<Table> {
    let extension = file_name(name)
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    let mut temp = tempfile::Builder::new()
        .prefix("cdp-upload-")
        .suffix(&extension)
        .tempfile()
        .map_err(|e| IngestError::read(name, e))?;
    temp.write_all(bytes)
        .and_then(|_| temp.flush())
        .map_err(|e| IngestError::read(name, e))?;

    let mut workbook = open_workbook_auto(temp.path()).map_err(|e| IngestError::read(name, e))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::read(name, "workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| IngestError::read(name, e))?;

    let mut lines = range
        .rows()
        .map(|cells| cells.iter().map(cell_text).collect::<Vec<String>>())
        .skip_while(|cells| cells.iter().all(|c| c.is_empty()));

    let headers = match lines.next() {
        Some(headers) => headers,
        None => return Ok(Table::default()),
    };

    let rows = lines
        .map(|values| RawRow::from_parts(&headers, &values))
        .filter(|row| !row.is_blank())
        .collect();

    Ok(Table { headers, rows })
}

/// Render a cell so that the text parsers read it back unchanged: numbers in
/// Brazilian notation, dates as `YYYY-MM-DD`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => brazilian_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => datetime.format("%Y-%m-%d").to_string(),
            None => brazilian_number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    }
}

fn brazilian_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string().replace('.', ",")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::values::{find_value, parse_number, Candidate};

    #[test]
    fn test_semicolon_csv_with_quotes() {
        let content = "CNPJ_da_Administradora;Código_do_grupo;Valor_médio_do_bem\n\
                       \"12345678\";\"G1\";\"100.000,00\"\n";
        let table = read_table(content.as_bytes(), "202501_Imoveis.csv").unwrap();

        assert_eq!(table.headers.len(), 3);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(find_value(row, &[Candidate::Exact("Código_do_grupo")]), Some("G1"));
        assert_eq!(
            parse_number(find_value(row, &[Candidate::Exact("Valor_médio_do_bem")])),
            100000.0
        );
    }

    #[test]
    fn test_comma_csv_and_blank_lines() {
        let content = "a,b\n1,2\n,\n3,4\n";
        let table = read_table(content.as_bytes(), "x.csv").unwrap();
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_header_only_csv_has_no_rows() {
        let table = read_table(b"CNPJ;UF\n", "uf.csv").unwrap();
        assert_eq!(table.headers, vec!["CNPJ", "UF"]);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = read_table(b"a;b;c\n1;2\n", "x.csv").unwrap();
        let cells: Vec<_> = table.rows[0].iter().collect();
        assert_eq!(cells, vec![("a", "1"), ("b", "2"), ("c", "")]);
    }

    #[test]
    fn test_windows_1252_fallback() {
        // "Código" in Windows-1252
        let bytes = b"C\xf3digo;UF\n1;SP\n";
        let table = read_table(bytes, "x.csv").unwrap();
        assert_eq!(table.headers[0], "Código");
    }

    #[test]
    fn test_bom_is_stripped() {
        let table = read_table(b"\xEF\xBB\xBFCNPJ;UF\n1;SP\n", "x.csv").unwrap();
        assert_eq!(table.headers[0], "CNPJ");
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("\n\na;b\n1,5;2"), b';');
        assert_eq!(sniff_delimiter("a,b"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_content_kind() {
        assert_eq!(ContentKind::from_file_name("uploads/raw/a.XLSX"), ContentKind::Spreadsheet);
        assert_eq!(ContentKind::from_file_name("a.csv"), ContentKind::Delimited);
        assert_eq!(ContentKind::from_file_name("noext"), ContentKind::Delimited);
    }

    #[test]
    fn test_invalid_spreadsheet_is_read_error() {
        let err = read_table(b"not a workbook", "broken.xlsx").unwrap_err();
        assert!(matches!(err, IngestError::Read { .. }));
    }

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name);
        std::fs::read(path).unwrap()
    }

    #[test]
    fn test_spreadsheet_cells_render_as_text() {
        let table = read_table(&fixture("Imoveis_grupos.xlsx"), "Imoveis_grupos.xlsx").unwrap();

        assert_eq!(
            table.headers,
            vec![
                "CNPJ_da_Administradora",
                "Código_do_grupo",
                "Data_base",
                "Valor_médio_do_bem",
                "Quantidade_de_cotas_ativas_em_dia",
            ]
        );
        assert_eq!(table.rows.len(), 1);

        let row = &table.rows[0];
        let cell = |header| find_value(row, &[Candidate::Exact(header)]);
        assert_eq!(cell("CNPJ_da_Administradora"), Some("12345678"));
        assert_eq!(cell("Código_do_grupo"), Some("G1"));
        assert_eq!(cell("Data_base"), Some("2024-03-01"));
        assert_eq!(cell("Valor_médio_do_bem"), Some("100000,5"));
        assert_eq!(cell("Quantidade_de_cotas_ativas_em_dia"), Some("5"));
    }

    #[test]
    fn test_brazilian_number_rendering() {
        assert_eq!(brazilian_number(5.0), "5");
        assert_eq!(brazilian_number(100000.5), "100000,5");
        assert_eq!(parse_number(Some(&brazilian_number(1234.56))), 1234.56);
    }
}

//! Excel import/export of the historical delivery tables
//!
//! Workbook layout:
//! - `Tasa_Entregas`: CIUDAD, TRANSPORTADORA, DEVOLUCIONES, ENTREGAS, TOTAL
//! - `Tiempo_Promedio`: CIUDAD, TRANSPORTADORA, DIAS
//!
//! Sheets are first read into plain `SheetTable`s so validation does not
//! depend on the workbook backend.

use calamine::{open_workbook_auto, open_workbook_from_rs, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::carrier_names::canonical_carrier;
use crate::cities::normalize_text;
use crate::error::ImportError;
use crate::models::{CarrierPerformance, HistoricalData};

pub const DELIVERY_SHEET: &str = "Tasa_Entregas";
pub const TIME_SHEET: &str = "Tiempo_Promedio";

pub const DELIVERY_COLUMNS: [&str; 5] = ["CIUDAD", "TRANSPORTADORA", "DEVOLUCIONES", "ENTREGAS", "TOTAL"];
pub const TIME_COLUMNS: [&str; 3] = ["CIUDAD", "TRANSPORTADORA", "DIAS"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.trim().to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }

    /// Numbers, or text such as "3,5 días" / "85%"
    fn number(&self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => {
                let numeric: String = s
                    .trim()
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect();
                numeric.parse().ok()
            }
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

/// One worksheet; the first row holds the headers
#[derive(Debug, Clone)]
pub struct SheetTable {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetTable {
    pub fn new(name: &str, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }
}

/// A rejected or adjusted row. `row` is the 1-based spreadsheet row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportIssue {
    pub sheet: String,
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub data: HistoricalData,
    pub issues: Vec<ImportIssue>,
}

/// Import an .xlsx/.xls/.ods file
pub fn import_workbook(path: &Path) -> Result<ImportReport, ImportError> {
    info!("Reading workbook {:?}", path);
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ImportError::Workbook(e.to_string()))?;
    let sheets = read_sheets(&mut workbook)?;
    build_historical_data(&sheets)
}

/// Import an .xlsx file held in memory (uploads)
pub fn import_workbook_bytes(bytes: &[u8]) -> Result<ImportReport, ImportError> {
    let mut workbook = open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(bytes))
        .map_err(|e| ImportError::Workbook(e.to_string()))?;
    let sheets = read_sheets(&mut workbook)?;
    build_historical_data(&sheets)
}

fn read_sheets<RS, R>(workbook: &mut R) -> Result<Vec<SheetTable>, ImportError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let mut tables = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ImportError::Workbook(format!("{}: {}", name, e)))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(Cell::from_data).collect())
            .collect();
        tables.push(SheetTable { name, rows });
    }
    Ok(tables)
}

fn find_sheet<'a>(sheets: &'a [SheetTable], name: &str) -> Option<&'a SheetTable> {
    let wanted = normalize_text(name);
    sheets.iter().find(|s| normalize_text(&s.name) == wanted)
}

/// Resolve required column positions from the header row
fn column_indexes(sheet: &SheetTable, required: &[&str]) -> Result<Vec<usize>, ImportError> {
    let headers: Vec<String> = sheet
        .rows
        .first()
        .map(|row| {
            row.iter()
                .map(|c| c.text().map(|t| normalize_text(&t)).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();

    let mut indexes = Vec::with_capacity(required.len());
    let mut missing = Vec::new();
    for column in required {
        match headers.iter().position(|h| h == column) {
            Some(i) => indexes.push(i),
            None => missing.push(column.to_string()),
        }
    }

    if missing.is_empty() {
        Ok(indexes)
    } else {
        Err(ImportError::MissingColumns {
            sheet: sheet.name.clone(),
            columns: missing,
        })
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

fn cell(row: &[Cell], index: usize) -> &Cell {
    row.get(index).unwrap_or(&EMPTY_CELL)
}

fn count(value: &Cell) -> Result<u32, String> {
    let n = value.number().ok_or_else(|| "valor no numérico".to_string())?;
    if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
        return Err(format!("cantidad inválida: {}", n));
    }
    Ok(n as u32)
}

struct Counts {
    deliveries: u32,
    returns: u32,
    total: u32,
}

fn parse_counts(row: &[Cell], cols: &[usize]) -> Result<Counts, String> {
    Ok(Counts {
        returns: count(cell(row, cols[2]))?,
        deliveries: count(cell(row, cols[3]))?,
        total: count(cell(row, cols[4]))?,
    })
}

/// Validate both sheets and build the city -> carrier table.
///
/// Rows with an empty city/carrier, a zero total, or more deliveries plus
/// returns than shipments are rejected and reported.
pub fn build_historical_data(sheets: &[SheetTable]) -> Result<ImportReport, ImportError> {
    let missing: Vec<&str> = [DELIVERY_SHEET, TIME_SHEET]
        .into_iter()
        .filter(|name| find_sheet(sheets, name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingSheet(missing.join(", ")));
    }

    let (Some(delivery_sheet), Some(time_sheet)) =
        (find_sheet(sheets, DELIVERY_SHEET), find_sheet(sheets, TIME_SHEET))
    else {
        return Err(ImportError::MissingSheet(DELIVERY_SHEET.to_string()));
    };

    let delivery_cols = column_indexes(delivery_sheet, &DELIVERY_COLUMNS)?;
    let time_cols = column_indexes(time_sheet, &TIME_COLUMNS)?;

    let mut issues = Vec::new();
    let mut issue = |sheet: &str, row: usize, message: String| {
        debug!("{} row {}: {}", sheet, row, message);
        issues.push(ImportIssue {
            sheet: sheet.to_string(),
            row,
            message,
        });
    };

    // (city, carrier) in first-seen order
    let mut order: Vec<(String, String)> = Vec::new();
    let mut counts: HashMap<(String, String), Counts> = HashMap::new();

    for (i, row) in delivery_sheet.rows.iter().enumerate().skip(1) {
        let row_number = i + 1;
        if row.iter().all(Cell::is_empty) {
            continue;
        }

        let city = cell(row, delivery_cols[0]).text().map(|c| normalize_text(&c));
        let carrier = cell(row, delivery_cols[1]).text().map(|c| canonical_carrier(&c));
        let (Some(city), Some(carrier)) = (city, carrier) else {
            issue(DELIVERY_SHEET, row_number, "ciudad o transportadora vacía".to_string());
            continue;
        };

        let row_counts = match parse_counts(row, &delivery_cols) {
            Ok(c) => c,
            Err(e) => {
                issue(DELIVERY_SHEET, row_number, e);
                continue;
            }
        };

        if row_counts.total == 0 {
            issue(DELIVERY_SHEET, row_number, "TOTAL es cero".to_string());
            continue;
        }
        if row_counts.deliveries as u64 + row_counts.returns as u64 > row_counts.total as u64 {
            issue(
                DELIVERY_SHEET,
                row_number,
                format!(
                    "ENTREGAS ({}) + DEVOLUCIONES ({}) supera TOTAL ({})",
                    row_counts.deliveries, row_counts.returns, row_counts.total
                ),
            );
            continue;
        }

        let key = (city, carrier);
        match counts.get_mut(&key) {
            Some(existing) => {
                let merged = (
                    existing.deliveries.checked_add(row_counts.deliveries),
                    existing.returns.checked_add(row_counts.returns),
                    existing.total.checked_add(row_counts.total),
                );
                let (Some(deliveries), Some(returns), Some(total)) = merged else {
                    issue(
                        DELIVERY_SHEET,
                        row_number,
                        format!(
                            "fila duplicada para {} / {}: la suma excede el máximo, se descartó",
                            key.0, key.1
                        ),
                    );
                    continue;
                };
                existing.deliveries = deliveries;
                existing.returns = returns;
                existing.total = total;
                issue(
                    DELIVERY_SHEET,
                    row_number,
                    format!("fila duplicada para {} / {}: se sumaron los valores", key.0, key.1),
                );
            }
            None => {
                order.push(key.clone());
                counts.insert(key, row_counts);
            }
        }
    }

    let mut data = HistoricalData::new();
    for key in &order {
        if let Some(c) = counts.get(key) {
            data.upsert(
                &key.0,
                CarrierPerformance::from_counts(&key.1, c.deliveries, c.returns, c.total, None),
            );
        }
    }

    let mut seen_times: HashMap<(String, String), usize> = HashMap::new();
    for (i, row) in time_sheet.rows.iter().enumerate().skip(1) {
        let row_number = i + 1;
        if row.iter().all(Cell::is_empty) {
            continue;
        }

        let city = cell(row, time_cols[0]).text().map(|c| normalize_text(&c));
        let carrier = cell(row, time_cols[1]).text().map(|c| canonical_carrier(&c));
        let (Some(city), Some(carrier)) = (city, carrier) else {
            issue(TIME_SHEET, row_number, "ciudad o transportadora vacía".to_string());
            continue;
        };

        let days = match cell(row, time_cols[2]).number() {
            Some(d) if d >= 0.0 => d,
            _ => {
                issue(TIME_SHEET, row_number, "DIAS inválido".to_string());
                continue;
            }
        };

        if let Some(previous) = seen_times.insert((city.clone(), carrier.clone()), row_number) {
            issue(
                TIME_SHEET,
                row_number,
                format!("reemplaza el tiempo de la fila {}", previous),
            );
        }

        match data.find_mut(&city, &carrier) {
            Some(perf) => perf.avg_time_value = Some(days),
            None => issue(
                TIME_SHEET,
                row_number,
                format!("{} / {} no existe en {}", city, carrier, DELIVERY_SHEET),
            ),
        }
    }

    if !issues.is_empty() {
        warn!("Workbook import finished with {} issues", issues.len());
    }
    info!(
        "Imported {} carrier rows across {} cities",
        data.row_count(),
        data.city_count()
    );

    Ok(ImportReport { data, issues })
}

fn build_workbook(data: &HistoricalData) -> Result<Workbook, ImportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(DELIVERY_SHEET)?;
        for (col, name) in DELIVERY_COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header)?;
        }
        let mut row: u32 = 1;
        for (city, rows) in data.iter() {
            for perf in rows {
                sheet.write_string(row, 0, city)?;
                sheet.write_string(row, 1, &perf.carrier)?;
                sheet.write_number(row, 2, perf.returns as f64)?;
                sheet.write_number(row, 3, perf.deliveries as f64)?;
                sheet.write_number(row, 4, perf.total as f64)?;
                row += 1;
            }
        }
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(TIME_SHEET)?;
        for (col, name) in TIME_COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header)?;
        }
        let mut row: u32 = 1;
        for (city, rows) in data.iter() {
            for perf in rows {
                let Some(days) = perf.avg_time_value else {
                    continue;
                };
                sheet.write_string(row, 0, city)?;
                sheet.write_string(row, 1, &perf.carrier)?;
                sheet.write_number(row, 2, days)?;
                row += 1;
            }
        }
    }

    Ok(workbook)
}

/// Write `data` using the import layout
pub fn write_workbook(data: &HistoricalData, path: &Path) -> Result<(), ImportError> {
    let mut workbook = build_workbook(data)?;
    workbook.save(path)?;
    info!("Wrote {} rows to {:?}", data.row_count(), path);
    Ok(())
}

pub fn workbook_bytes(data: &HistoricalData) -> Result<Vec<u8>, ImportError> {
    let mut workbook = build_workbook(data)?;
    Ok(workbook.save_to_buffer()?)
}

/// Sample rows written into the downloadable template
pub fn template_data() -> HistoricalData {
    let rows: [(&str, &str, u32, u32, u32, f64); 6] = [
        ("BOGOTA", "SERVIENTREGA", 850, 100, 1000, 2.5),
        ("BOGOTA", "COORDINADORA", 720, 180, 950, 3.1),
        ("MEDELLIN", "INTERRAPIDISIMO", 410, 60, 500, 3.8),
        ("MEDELLIN", "ENVIA", 150, 30, 200, 4.5),
        ("CALI", "TCC", 270, 25, 300, 4.2),
        ("BARRANQUILLA", "DEPRISA", 95, 20, 120, 6.0),
    ];

    let mut data = HistoricalData::new();
    for (city, carrier, deliveries, returns, total, days) in rows {
        data.upsert(
            city,
            CarrierPerformance::from_counts(carrier, deliveries, returns, total, Some(days)),
        );
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn n(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn delivery_header() -> Vec<Cell> {
        DELIVERY_COLUMNS.iter().map(|c| t(c)).collect()
    }

    fn time_header() -> Vec<Cell> {
        TIME_COLUMNS.iter().map(|c| t(c)).collect()
    }

    #[test]
    fn test_missing_sheets_are_listed() {
        let sheets = vec![SheetTable::new("Hoja1", vec![])];
        match build_historical_data(&sheets) {
            Err(ImportError::MissingSheet(names)) => {
                assert!(names.contains(DELIVERY_SHEET));
                assert!(names.contains(TIME_SHEET));
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.issues)),
        }
    }

    #[test]
    fn test_missing_columns_are_listed() {
        let sheets = vec![
            SheetTable::new(DELIVERY_SHEET, vec![vec![t("CIUDAD"), t("TRANSPORTADORA"), t("TOTAL")]]),
            SheetTable::new(TIME_SHEET, vec![time_header()]),
        ];
        match build_historical_data(&sheets) {
            Err(ImportError::MissingColumns { sheet, columns }) => {
                assert_eq!(sheet, DELIVERY_SHEET);
                assert_eq!(columns, vec!["DEVOLUCIONES".to_string(), "ENTREGAS".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.issues)),
        }
    }

    #[test]
    fn test_headers_match_case_and_accents() {
        let sheets = vec![
            SheetTable::new(
                "tasa_entregas",
                vec![
                    vec![t("Ciudad"), t("Transportadora"), t("Devoluciones"), t("Entregas"), t("Total")],
                    vec![t("Bogotá"), t("Servientrega"), n(10.0), n(85.0), n(100.0)],
                ],
            ),
            SheetTable::new(
                "Tiempo_Promedio",
                vec![
                    vec![t("Ciudad"), t("Transportadora"), t("Días")],
                    vec![t("BOGOTA"), t("SERVIENTREGA"), t("2,5 días")],
                ],
            ),
        ];
        let report = build_historical_data(&sheets).unwrap();
        assert!(report.issues.is_empty());
        let perf = report.data.find("BOGOTA", "SERVIENTREGA").unwrap();
        assert_eq!(perf.delivery_rate, 85.0);
        assert_eq!(perf.return_rate, 10.0);
        assert_eq!(perf.avg_time_value, Some(2.5));
    }

    #[test]
    fn test_rows_exceeding_total_are_rejected() {
        let sheets = vec![
            SheetTable::new(
                DELIVERY_SHEET,
                vec![
                    delivery_header(),
                    vec![t("CALI"), t("TCC"), n(30.0), n(80.0), n(100.0)],
                    vec![t("CALI"), t("ENVIA"), n(5.0), n(90.0), n(100.0)],
                    vec![t("CALI"), t("DEPRISA"), n(0.0), n(0.0), n(0.0)],
                ],
            ),
            SheetTable::new(TIME_SHEET, vec![time_header()]),
        ];
        let report = build_historical_data(&sheets).unwrap();

        assert!(report.data.find("CALI", "TCC").is_none());
        assert!(report.data.find("CALI", "DEPRISA").is_none());
        assert!(report.data.find("CALI", "ENVIA").is_some());
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.issues[0].row, 2);
        assert!(report.issues[0].message.contains("supera TOTAL"));

        for (_, rows) in report.data.iter() {
            assert!(rows.iter().all(|r| r.is_consistent()));
        }
    }

    #[test]
    fn test_duplicates_are_merged() {
        let sheets = vec![
            SheetTable::new(
                DELIVERY_SHEET,
                vec![
                    delivery_header(),
                    vec![t("PASTO"), t("Inter Rapidisimo"), n(5.0), n(40.0), n(50.0)],
                    vec![t("Pasto"), t("INTERRAPIDISIMO"), n(5.0), n(45.0), n(50.0)],
                ],
            ),
            SheetTable::new(
                TIME_SHEET,
                vec![
                    time_header(),
                    vec![t("PASTO"), t("INTERRAPIDISIMO"), n(4.0)],
                    vec![t("PASTO"), t("INTERRAPIDISIMO"), n(5.0)],
                    vec![t("NEIVA"), t("TCC"), n(3.0)],
                ],
            ),
        ];
        let report = build_historical_data(&sheets).unwrap();

        let perf = report.data.find("PASTO", "INTERRAPIDISIMO").unwrap();
        assert_eq!(perf.total, 100);
        assert_eq!(perf.deliveries, 85);
        assert_eq!(perf.avg_time_value, Some(5.0));
        assert_eq!(report.data.row_count(), 1);
        // duplicate delivery row, duplicate timing row, orphan timing row
        assert_eq!(report.issues.len(), 3);
    }

    #[test]
    fn test_duplicate_overflow_keeps_first_row() {
        let big = 3_000_000_000.0;
        let sheets = vec![
            SheetTable::new(
                DELIVERY_SHEET,
                vec![
                    delivery_header(),
                    vec![t("BOGOTA"), t("TCC"), n(0.0), n(big), n(big)],
                    vec![t("BOGOTA"), t("TCC"), n(0.0), n(big), n(big)],
                ],
            ),
            SheetTable::new(TIME_SHEET, vec![time_header()]),
        ];
        let report = build_historical_data(&sheets).unwrap();

        let perf = report.data.find("BOGOTA", "TCC").unwrap();
        assert_eq!(perf.total, 3_000_000_000);
        assert_eq!(perf.deliveries, 3_000_000_000);
        assert!(perf.is_consistent());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].row, 3);
        assert!(report.issues[0].message.contains("excede"));
    }

    #[test]
    fn test_invalid_counts_are_reported() {
        let sheets = vec![
            SheetTable::new(
                DELIVERY_SHEET,
                vec![
                    delivery_header(),
                    vec![t("TUNJA"), t("TCC"), t("muchas"), n(1.0), n(2.0)],
                    vec![t("TUNJA"), Cell::Empty, n(1.0), n(1.0), n(2.0)],
                    vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty],
                ],
            ),
            SheetTable::new(TIME_SHEET, vec![time_header()]),
        ];
        let report = build_historical_data(&sheets).unwrap();
        assert!(report.data.is_empty());
        assert_eq!(report.issues.len(), 2);
    }

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plantilla.xlsx");

        let original = template_data();
        write_workbook(&original, &path).unwrap();
        let report = import_workbook(&path).unwrap();

        assert!(report.issues.is_empty());
        assert_eq!(report.data, original);
    }

    #[test]
    fn test_bytes_round_trip_without_timing() {
        let mut data = template_data();
        data.upsert("IBAGUE", CarrierPerformance::from_counts("VELOCES", 7, 1, 9, None));

        let bytes = workbook_bytes(&data).unwrap();
        let report = import_workbook_bytes(&bytes).unwrap();

        assert_eq!(report.data, data);
        assert_eq!(report.data.find("IBAGUE", "VELOCES").unwrap().avg_time_value, None);
    }
}

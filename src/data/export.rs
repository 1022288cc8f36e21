//! Output Record projection and the two download encodings.
//!
//! The workbook is written as raw SpreadsheetML parts inside a ZIP archive:
//! a content-types manifest, package relationships, a workbook and one
//! worksheet using inline strings.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::filter::{Selection, Selections, Stage, StageLabels};
use super::model::{CellValue, Column, Table};
use super::schema::{self, MissingColumns, require_columns};

/// Display labels of the Output Record, in column order.
pub const OUTPUT_LABELS: [&str; 4] = ["Pays", "Etablissement", "SIRET", "Statut participant"];

const SHEET_NAME: &str = "Sheet1";

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Source columns of the Output Record, in output order.
pub fn required_columns(establishment_column: &str) -> [&str; 4] {
    [schema::COUNTRY, establishment_column, schema::SIRET, schema::STATUS]
}

/// Select the four required columns and rename them to their display labels.
///
/// Nothing is produced unless every required column is present.
pub fn project(table: &Table, establishment_column: &str) -> Result<Table, MissingColumns> {
    let required = required_columns(establishment_column);
    require_columns(table, &required)?;

    let columns = required
        .iter()
        .zip(OUTPUT_LABELS)
        .filter_map(|(source, label)| {
            let col = table.column(source)?;
            Some(Column::new(label, col.values.clone()))
        })
        .collect();
    // Columns come from one table, so they share its height.
    Ok(Table::new(columns).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Encodings
// ---------------------------------------------------------------------------

/// Comma-delimited text with a header row and no index column.
pub fn to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(table.column_names())
        .context("writing CSV header")?;
    for i in 0..table.height() {
        writer
            .write_record(table.row(i).map(|v| v.to_string()))
            .with_context(|| format!("writing CSV row {i}"))?;
    }
    writer.into_inner().context("flushing CSV buffer")
}

/// Single-sheet `.xlsx` workbook with a header row and no index column.
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", content_types_xml()),
        ("_rels/.rels", package_rels_xml()),
        ("xl/workbook.xml", workbook_xml()),
        ("xl/_rels/workbook.xml.rels", workbook_rels_xml()),
        ("xl/worksheets/sheet1.xml", sheet_xml(table)),
    ];
    for (name, body) in parts {
        zip.start_file(name, options)
            .with_context(|| format!("adding {name} to workbook"))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("writing {name}"))?;
    }

    let cursor = zip.finish().context("finishing workbook archive")?;
    Ok(cursor.into_inner())
}

fn content_types_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#
        .to_string()
}

fn package_rels_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#
        .to_string()
}

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="{SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#
    )
}

fn workbook_rels_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#
        .to_string()
}

fn sheet_xml(table: &Table) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    let header: Vec<CellValue> = table.column_names().map(CellValue::from).collect();
    push_row(&mut xml, 1, header.iter());
    for i in 0..table.height() {
        push_row(&mut xml, i + 2, table.row(i));
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_row<'a>(xml: &mut String, row_num: usize, cells: impl Iterator<Item = &'a CellValue>) {
    xml.push_str(&format!(r#"<row r="{row_num}">"#));
    for (col_idx, cell) in cells.enumerate() {
        let r = format!("{}{row_num}", column_letters(col_idx));
        match cell {
            CellValue::Null => {}
            CellValue::Integer(i) => xml.push_str(&format!(r#"<c r="{r}"><v>{i}</v></c>"#)),
            CellValue::Float(f) if f.is_finite() => {
                xml.push_str(&format!(r#"<c r="{r}"><v>{f}</v></c>"#))
            }
            // Numeric cells cannot hold inf or NaN; keep the CSV spelling as text.
            CellValue::Float(f) => xml.push_str(&format!(
                r#"<c r="{r}" t="inlineStr"><is><t>{f}</t></is></c>"#
            )),
            CellValue::Bool(b) => {
                xml.push_str(&format!(r#"<c r="{r}" t="b"><v>{}</v></c>"#, u8::from(*b)))
            }
            CellValue::Text(s) => xml.push_str(&format!(
                r#"<c r="{r}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                escape_xml(s)
            )),
        }
    }
    xml.push_str("</row>");
}

/// Zero-based column index to spreadsheet letters (0 → A, 26 → AA).
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Characters no file name may hold on Windows or Unix.
const RESERVED_FILE_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// `<group>_<country>_<status>_<establishment>`, placeholders for "all".
pub fn file_stem(group_name: &str, selections: &Selections, placeholders: &StageLabels) -> String {
    let mut parts = vec![safe_segment(&group_name.replace(' ', "_"))];
    for stage in Stage::ALL {
        let segment = match selections.get(stage) {
            Selection::All => placeholders.get(stage).to_string(),
            Selection::Value(v) => v.to_string(),
        };
        parts.push(safe_segment(&segment));
    }
    parts.join("_")
}

fn safe_segment(segment: &str) -> String {
    segment.replace(|c: char| RESERVED_FILE_CHARS.contains(&c) || c.is_control(), "_")
}

/// The two downloadable encodings of one Output Record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBundle {
    pub stem: String,
    pub csv: Vec<u8>,
    pub xlsx: Vec<u8>,
}

impl ExportBundle {
    pub fn build(stem: String, record: &Table) -> Result<Self> {
        Ok(Self {
            csv: to_csv(record)?,
            xlsx: to_xlsx(record)?,
            stem,
        })
    }

    pub fn csv_file_name(&self) -> String {
        format!("{}.csv", self.stem)
    }

    pub fn xlsx_file_name(&self) -> String {
        format!("{}.xlsx", self.stem)
    }

    /// Write both files into `dir`, returning their paths.
    pub fn write_to_dir(&self, dir: &Path) -> Result<[PathBuf; 2]> {
        let csv_path = dir.join(self.csv_file_name());
        let xlsx_path = dir.join(self.xlsx_file_name());
        std::fs::write(&csv_path, &self.csv)
            .with_context(|| format!("writing {}", csv_path.display()))?;
        std::fs::write(&xlsx_path, &self.xlsx)
            .with_context(|| format!("writing {}", xlsx_path.display()))?;
        log::info!("Exported {} and {}", csv_path.display(), xlsx_path.display());
        Ok([csv_path, xlsx_path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_bytes;

    fn text(s: &str) -> CellValue {
        CellValue::from(s)
    }

    fn filtered() -> Table {
        Table::new(vec![
            Column::new("extra", vec![text("x"), text("y")]),
            Column::new("statut_participant", vec![text("actif"), text("inactif")]),
            Column::new("demandeur_siret", vec![CellValue::Integer(111), CellValue::Integer(222)]),
            Column::new("EPLEFPA", vec![text("E1"), text("E2")]),
            Column::new("pays_accueil", vec![text("FR"), text("FR")]),
        ])
        .unwrap()
    }

    #[test]
    fn projection_orders_and_renames() {
        let record = project(&filtered(), "EPLEFPA").unwrap();
        assert_eq!(record.column_names().collect::<Vec<_>>(), OUTPUT_LABELS);
        assert_eq!(
            record.row(1).cloned().collect::<Vec<_>>(),
            vec![text("FR"), text("E2"), CellValue::Integer(222), text("inactif")]
        );
    }

    #[test]
    fn projection_lists_all_missing_columns() {
        let table = Table::new(vec![Column::new("EPLEFPA", vec![text("E1")])]).unwrap();
        let err = project(&table, "EPLEFPA").unwrap_err();
        assert_eq!(err.0, vec!["pays_accueil", "demandeur_siret", "statut_participant"]);
    }

    #[test]
    fn csv_round_trip_preserves_cells() {
        let record = project(&filtered(), "EPLEFPA").unwrap();
        let bytes = to_csv(&record).unwrap();
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            "Pays,Etablissement,SIRET,Statut participant\nFR,E1,111,actif\nFR,E2,222,inactif\n"
        );
        assert_eq!(load_bytes("out.csv", &bytes).unwrap(), record);
    }

    #[test]
    fn xlsx_round_trip_preserves_cells() {
        let mut record = project(&filtered(), "EPLEFPA").unwrap();
        let bytes = to_xlsx(&record).unwrap();
        assert_eq!(load_bytes("out.xlsx", &bytes).unwrap(), record);

        record = record.take_rows(&[]);
        let bytes = to_xlsx(&record).unwrap();
        let reloaded = load_bytes("empty.xlsx", &bytes).unwrap();
        assert_eq!(reloaded.height(), 0);
        assert_eq!(reloaded.column_names().collect::<Vec<_>>(), OUTPUT_LABELS);
    }

    #[test]
    fn xlsx_escapes_markup_in_text() {
        let table = Table::new(vec![Column::new("Pays", vec![text("R&D <Lyon>")])]).unwrap();
        let reloaded = load_bytes("t.xlsx", &to_xlsx(&table).unwrap()).unwrap();
        assert_eq!(reloaded.column("Pays").unwrap().values, vec![text("R&D <Lyon>")]);
    }

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn stem_uses_placeholders_for_every_unfiltered_stage() {
        let selections = Selections {
            country: Selection::Value(text("FR")),
            ..Default::default()
        };
        let stem = file_stem(
            "Consortium MOOW Pro",
            &selections,
            &StageLabels::default_placeholders(),
        );
        assert_eq!(stem, "Consortium_MOOW_Pro_FR_TousStatuts_TousEtablissements");
    }

    #[test]
    fn stem_never_contains_path_separators() {
        let selections = Selections {
            establishment: Selection::Value(text("Lycée A/B")),
            ..Default::default()
        };
        let stem = file_stem("Sup", &selections, &StageLabels::default_placeholders());
        assert_eq!(stem, "Sup_TousLesPays_TousStatuts_Lycée A_B");
    }

    #[test]
    fn stem_replaces_reserved_file_name_characters() {
        let selections = Selections {
            country: Selection::Value(text("FR: \"Nord\"")),
            status: Selection::Value(text("a*b?")),
            establishment: Selection::Value(text("<E1>|E2")),
        };
        let stem = file_stem("Sup", &selections, &StageLabels::default_placeholders());
        assert_eq!(stem, "Sup_FR_ _Nord__a_b___E1__E2");
        assert!(!stem.contains(RESERVED_FILE_CHARS));
    }

    #[test]
    fn non_finite_floats_export_as_text_cells() {
        let table = Table::new(vec![Column::new(
            "SIRET",
            vec![CellValue::Float(f64::INFINITY), CellValue::Float(2.5)],
        )])
        .unwrap();
        let xlsx = to_xlsx(&table).unwrap();
        let reloaded = load_bytes("t.xlsx", &xlsx).unwrap();
        assert_eq!(
            reloaded.column("SIRET").unwrap().values,
            vec![text("inf"), CellValue::Float(2.5)]
        );
        assert_eq!(String::from_utf8(to_csv(&table).unwrap()).unwrap(), "SIRET\ninf\n2.5\n");
    }

    #[test]
    fn bundle_writes_both_files() {
        let dir = std::env::temp_dir().join(format!("moow-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let record = project(&filtered(), "EPLEFPA").unwrap();
        let bundle = ExportBundle::build("Pro_FR".into(), &record).unwrap();
        let [csv_path, xlsx_path] = bundle.write_to_dir(&dir).unwrap();

        assert_eq!(csv_path.file_name().unwrap(), "Pro_FR.csv");
        assert_eq!(xlsx_path.file_name().unwrap(), "Pro_FR.xlsx");
        assert_eq!(std::fs::read(&csv_path).unwrap(), bundle.csv);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

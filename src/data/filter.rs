use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{CellValue, Table};
use super::schema::{self, resolve_column};

// ---------------------------------------------------------------------------
// Stages and selections
// ---------------------------------------------------------------------------

/// The three filter stages, applied in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Country,
    Status,
    Establishment,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Country, Stage::Status, Stage::Establishment];

    /// Column names this stage can filter on, most preferred first.
    pub fn candidate_columns(self) -> &'static [&'static str] {
        match self {
            Stage::Country => &[schema::COUNTRY],
            Stage::Status => &[schema::STATUS],
            Stage::Establishment => schema::ESTABLISHMENT_CANDIDATES,
        }
    }

    /// Short key used to namespace interactive widgets.
    pub fn key(self) -> &'static str {
        match self {
            Stage::Country => "pays",
            Stage::Status => "status",
            Stage::Establishment => "etab",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Country => "country",
            Stage::Status => "participant status",
            Stage::Establishment => "establishment",
        };
        f.write_str(label)
    }
}

/// One text per stage: "no filter" sentinels, filename placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLabels {
    pub country: String,
    pub status: String,
    pub establishment: String,
}

impl StageLabels {
    pub fn get(&self, stage: Stage) -> &str {
        match stage {
            Stage::Country => &self.country,
            Stage::Status => &self.status,
            Stage::Establishment => &self.establishment,
        }
    }

    pub fn default_sentinels() -> Self {
        Self {
            country: "Tous les Pays".into(),
            status: "Tous".into(),
            establishment: "Tous".into(),
        }
    }

    pub fn default_placeholders() -> Self {
        Self {
            country: "TousLesPays".into(),
            status: "TousStatuts".into(),
            establishment: "TousEtablissements".into(),
        }
    }
}

/// The choice made for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// The sentinel: do not restrict rows on this column.
    #[default]
    All,
    Value(CellValue),
}

impl Selection {
    /// Text shown for this choice, given the stage sentinel.
    pub fn label<'a>(&'a self, sentinel: &'a str) -> std::borrow::Cow<'a, str> {
        match self {
            Selection::All => sentinel.into(),
            Selection::Value(v) => v.to_string().into(),
        }
    }
}

/// One selection per stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selections {
    pub country: Selection,
    pub status: Selection,
    pub establishment: Selection,
}

impl Selections {
    pub fn get(&self, stage: Stage) -> &Selection {
        match stage {
            Stage::Country => &self.country,
            Stage::Status => &self.status,
            Stage::Establishment => &self.establishment,
        }
    }

    pub fn set(&mut self, stage: Stage, selection: Selection) {
        match stage {
            Stage::Country => self.country = selection,
            Stage::Status => self.status = selection,
            Stage::Establishment => self.establishment = selection,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no '{}' nor '{}' column was found in the file", schema::EPLEFPA, schema::ESTABLISHMENT)]
    MissingEstablishment,
}

/// Non-fatal findings surfaced next to the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An optional filter column is absent; its stage was skipped.
    MissingColumn { stage: Stage, column: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingColumn { stage, column } => {
                write!(f, "column '{column}' is missing from the file, {stage} filter skipped")
            }
        }
    }
}

/// What happened at one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    /// Column filtered on, `None` when the stage was skipped.
    pub column: Option<String>,
    /// Sorted distinct values offered after the sentinel.
    pub options: Vec<CellValue>,
    pub selection: Selection,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl StageReport {
    pub fn skipped(&self) -> bool {
        self.column.is_none()
    }

    /// Selectable labels: the sentinel first, then every option.
    pub fn option_labels(&self, sentinel: &str) -> Vec<String> {
        std::iter::once(sentinel.to_string())
            .chain(self.options.iter().map(|v| v.to_string()))
            .collect()
    }

    /// Whether the selection is the sentinel or one of the offered values.
    pub fn selection_is_offered(&self) -> bool {
        match &self.selection {
            Selection::All => true,
            Selection::Value(v) => self.options.contains(v),
        }
    }
}

/// Result of a full pipeline pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub rows_loaded: usize,
    pub stages: Vec<StageReport>,
    pub warnings: Vec<Diagnostic>,
    /// Resolved once, reused by the projection.
    pub establishment_column: String,
    pub selections: Selections,
    pub table: Table,
}

impl PipelineOutcome {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sentinels: StageLabels,
    /// Log each stage's row counts at info level instead of debug.
    pub report_stage_counts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sentinels: StageLabels::default_sentinels(),
            report_stage_counts: true,
        }
    }
}

/// Narrows a table through the country, status and establishment stages.
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    config: PipelineConfig,
}

impl FilterPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run every stage over `table`. The input is never modified.
    pub fn run(&self, table: &Table, selections: &Selections) -> Result<PipelineOutcome, PipelineError> {
        let establishment_column = resolve_column(table, schema::ESTABLISHMENT_CANDIDATES)
            .ok_or(PipelineError::MissingEstablishment)?
            .to_string();

        let mut current = table.clone();
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        let mut warnings = Vec::new();

        for stage in Stage::ALL {
            let selection = selections.get(stage).clone();
            let rows_before = current.height();

            let column = match stage {
                Stage::Establishment => Some(establishment_column.as_str()),
                _ => resolve_column(&current, stage.candidate_columns()),
            };
            let Some(column) = column else {
                let missing = stage.candidate_columns()[0].to_string();
                log::warn!("{stage} filter skipped: column '{missing}' is absent");
                warnings.push(Diagnostic::MissingColumn {
                    stage,
                    column: missing,
                });
                stages.push(StageReport {
                    stage,
                    column: None,
                    options: Vec::new(),
                    selection,
                    rows_before,
                    rows_after: rows_before,
                });
                continue;
            };

            // Only the establishment list narrows with the earlier choices.
            let option_source = match stage {
                Stage::Establishment => &current,
                _ => table,
            };
            let options = option_source.distinct_values(column).unwrap_or_default();
            if let Selection::Value(wanted) = &selection {
                current = filter_equal(&current, column, wanted);
            }
            let rows_after = current.height();
            self.log_stage(stage, &selection, rows_before, rows_after);

            stages.push(StageReport {
                stage,
                column: Some(column.to_string()),
                options,
                selection,
                rows_before,
                rows_after,
            });
        }

        Ok(PipelineOutcome {
            rows_loaded: table.height(),
            stages,
            warnings,
            establishment_column,
            selections: selections.clone(),
            table: current,
        })
    }

    fn log_stage(&self, stage: Stage, selection: &Selection, before: usize, after: usize) {
        let label = selection.label(self.config.sentinels.get(stage));
        if self.config.report_stage_counts {
            log::info!("{stage} = '{label}': {before} -> {after} rows");
        } else {
            log::debug!("{stage} = '{label}': {before} -> {after} rows");
        }
    }
}

/// Rows of `table` whose `column` cell equals `wanted` exactly.
pub fn filter_equal(table: &Table, column: &str, wanted: &CellValue) -> Table {
    let Some(col) = table.column(column) else {
        return table.clone();
    };
    let indices: Vec<usize> = col
        .values
        .iter()
        .enumerate()
        .filter(|(_, v)| *v == wanted)
        .map(|(i, _)| i)
        .collect();
    table.take_rows(&indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;

    fn text(s: &str) -> CellValue {
        CellValue::from(s)
    }

    fn texts(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|s| text(s)).collect()
    }

    /// Four-row fixture with every filter column.
    fn participants() -> Table {
        Table::new(vec![
            Column::new("pays_accueil", texts(&["FR", "FR", "DE", "ES"])),
            Column::new("statut_participant", texts(&["actif", "inactif", "actif", "actif"])),
            Column::new("EPLEFPA", texts(&["E1", "E2", "E1", "E3"])),
            Column::new(
                "demandeur_siret",
                vec![
                    CellValue::Integer(111),
                    CellValue::Integer(222),
                    CellValue::Integer(333),
                    CellValue::Integer(444),
                ],
            ),
        ])
        .unwrap()
    }

    fn select(country: Option<&str>, status: Option<&str>, etab: Option<&str>) -> Selections {
        let pick = |v: Option<&str>| v.map(|s| Selection::Value(text(s))).unwrap_or_default();
        Selections {
            country: pick(country),
            status: pick(status),
            establishment: pick(etab),
        }
    }

    #[test]
    fn sentinel_everywhere_keeps_every_row() {
        let table = participants();
        let outcome = FilterPipeline::default().run(&table, &Selections::default()).unwrap();
        assert_eq!(outcome.table, table);
        for report in &outcome.stages {
            assert_eq!(report.rows_before, 4);
            assert_eq!(report.rows_after, 4);
        }
    }

    #[test]
    fn concrete_selection_keeps_only_equal_rows() {
        let outcome = FilterPipeline::default()
            .run(&participants(), &select(None, Some("actif"), None))
            .unwrap();
        let status = outcome.table.column("statut_participant").unwrap();
        assert_eq!(status.values, texts(&["actif", "actif", "actif"]));

        let report = outcome.stage(Stage::Status).unwrap();
        assert_eq!((report.rows_before, report.rows_after), (4, 3));
    }

    #[test]
    fn matching_is_exact_not_substring_or_case_folded() {
        let outcome = FilterPipeline::default()
            .run(&participants(), &select(Some("fr"), None, None))
            .unwrap();
        assert_eq!(outcome.table.height(), 0);

        let outcome = FilterPipeline::default()
            .run(&participants(), &select(Some("F"), None, None))
            .unwrap();
        assert_eq!(outcome.table.height(), 0);
    }

    #[test]
    fn only_establishment_options_cascade() {
        let outcome = FilterPipeline::default()
            .run(&participants(), &select(Some("DE"), Some("actif"), None))
            .unwrap();
        assert_eq!(outcome.stage(Stage::Country).unwrap().options, texts(&["DE", "ES", "FR"]));
        // DE only has "actif" rows, yet status still lists the loaded table's values.
        assert_eq!(
            outcome.stage(Stage::Status).unwrap().options,
            texts(&["actif", "inactif"])
        );
        assert_eq!(
            outcome.stage(Stage::Establishment).unwrap().options,
            texts(&["E1"])
        );
    }

    #[test]
    fn option_labels_start_with_the_sentinel() {
        let outcome = FilterPipeline::default()
            .run(&participants(), &Selections::default())
            .unwrap();
        let labels = outcome.stage(Stage::Country).unwrap().option_labels("Tous les Pays");
        assert_eq!(labels, vec!["Tous les Pays", "DE", "ES", "FR"]);
    }

    #[test]
    fn row_counts_never_grow() {
        let outcome = FilterPipeline::default()
            .run(&participants(), &select(Some("FR"), Some("actif"), Some("E1")))
            .unwrap();
        let mut previous = outcome.rows_loaded;
        for report in &outcome.stages {
            assert_eq!(report.rows_before, previous);
            assert!(report.rows_after <= report.rows_before);
            previous = report.rows_after;
        }
        assert_eq!(outcome.table.height(), 1);
    }

    #[test]
    fn missing_country_column_is_a_warning() {
        let table = Table::new(vec![
            Column::new("statut_participant", texts(&["actif", "inactif"])),
            Column::new("etablissement", texts(&["E1", "E2"])),
        ])
        .unwrap();
        let outcome = FilterPipeline::default()
            .run(&table, &select(Some("FR"), None, None))
            .unwrap();

        assert_eq!(
            outcome.warnings,
            vec![Diagnostic::MissingColumn {
                stage: Stage::Country,
                column: "pays_accueil".into()
            }]
        );
        let country = outcome.stage(Stage::Country).unwrap();
        assert!(country.skipped());
        assert_eq!(outcome.table.height(), 2);
        assert_eq!(outcome.establishment_column, "etablissement");
    }

    #[test]
    fn missing_establishment_aborts() {
        let table = Table::new(vec![Column::new("pays_accueil", texts(&["FR"]))]).unwrap();
        let err = FilterPipeline::default()
            .run(&table, &Selections::default())
            .unwrap_err();
        assert_eq!(err, PipelineError::MissingEstablishment);
    }

    #[test]
    fn eplefpa_is_preferred_when_both_exist() {
        let table = Table::new(vec![
            Column::new("etablissement", texts(&["X", "Y"])),
            Column::new("EPLEFPA", texts(&["E1", "E2"])),
        ])
        .unwrap();
        let outcome = FilterPipeline::default()
            .run(&table, &select(None, None, Some("E2")))
            .unwrap();
        assert_eq!(outcome.establishment_column, "EPLEFPA");
        assert_eq!(outcome.table.column("etablissement").unwrap().values, texts(&["Y"]));
    }

    #[test]
    fn numeric_columns_filter_by_value() {
        let table = Table::new(vec![
            Column::new("EPLEFPA", vec![CellValue::Integer(7), CellValue::Integer(8)]),
        ])
        .unwrap();
        let selections = Selections {
            establishment: Selection::Value(CellValue::Integer(8)),
            ..Default::default()
        };
        let outcome = FilterPipeline::default().run(&table, &selections).unwrap();
        assert_eq!(outcome.table.height(), 1);
    }

    #[test]
    fn mixed_numeric_establishments_collapse_to_one_option() {
        let table = Table::new(vec![Column::new(
            "EPLEFPA",
            vec![CellValue::Integer(2), CellValue::Float(1.5), CellValue::Float(2.0)],
        )])
        .unwrap();
        let selections = Selections {
            establishment: Selection::Value(CellValue::Integer(2)),
            ..Default::default()
        };
        let outcome = FilterPipeline::default().run(&table, &selections).unwrap();
        let report = outcome.stage(Stage::Establishment).unwrap();
        assert_eq!(report.option_labels("Tous"), vec!["Tous", "1.5", "2"]);
        assert!(report.selection_is_offered());
        assert_eq!(outcome.table.height(), 2);
    }

    #[test]
    fn stale_selection_is_detected() {
        let outcome = FilterPipeline::default()
            .run(&participants(), &select(Some("DE"), Some("inactif"), Some("E2")))
            .unwrap();
        assert!(!outcome.stage(Stage::Establishment).unwrap().selection_is_offered());
        assert!(outcome.stage(Stage::Status).unwrap().selection_is_offered());
        assert!(outcome.stage(Stage::Country).unwrap().selection_is_offered());
    }
}

use std::path::Path;

use crate::config::GroupConfig;
use crate::data::export::{ExportBundle, file_stem, project};
use crate::data::filter::{FilterPipeline, PipelineError, PipelineOutcome, Selection, Selections, Stage};
use crate::data::loader::{LoadError, load_bytes, load_file};
use crate::data::model::Table;
use crate::data::schema::MissingColumns;

// ---------------------------------------------------------------------------
// Evaluation results
// ---------------------------------------------------------------------------

/// Everything one pipeline pass produced for display and export.
#[derive(Debug, Clone)]
pub struct Report {
    pub outcome: PipelineOutcome,
    /// The renamed four-column Output Record, or the columns it lacks.
    pub output: Result<Table, MissingColumns>,
    /// Download artifacts, present when the Output Record could be built.
    pub export: Option<ExportBundle>,
}

#[derive(Debug, Clone)]
pub enum Evaluation {
    /// The pipeline stopped before producing options or a table.
    Aborted(PipelineError),
    Ready(Box<Report>),
}

/// The file a table was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub file_name: String,
    pub table: Table,
}

// ---------------------------------------------------------------------------
// Group session state
// ---------------------------------------------------------------------------

/// State of one group tab, independent of rendering and of other groups.
pub struct GroupSession {
    pub config: GroupConfig,
    pipeline: FilterPipeline,

    /// Uploaded table (None until a file loads successfully).
    pub source: Option<LoadedSource>,

    /// Current dropdown choices.
    pub selections: Selections,

    /// Result of the last full pass.
    pub evaluation: Option<Evaluation>,

    /// Load or export error shown in the UI.
    pub status_message: Option<String>,
}

impl GroupSession {
    pub fn new(config: GroupConfig) -> Self {
        let pipeline = FilterPipeline::new(config.pipeline_config());
        Self {
            config,
            pipeline,
            source: None,
            selections: Selections::default(),
            evaluation: None,
            status_message: None,
        }
    }

    /// Widget id for a stage, namespaced by group key (e.g. `pays_pro`).
    pub fn widget_id(&self, stage: Stage) -> String {
        format!("{}_{}", stage.key(), self.config.key)
    }

    /// Widget id for the file upload control (e.g. `pro_file`).
    pub fn upload_id(&self) -> String {
        format!("{}_file", self.config.key)
    }

    /// Ingest an uploaded file, resetting every selection.
    pub fn load_bytes(&mut self, file_name: &str, bytes: &[u8]) {
        self.ingest(file_name, load_bytes(file_name, bytes));
    }

    /// Ingest a file picked from disk, resetting every selection.
    pub fn load_path(&mut self, path: &Path) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.ingest(&file_name, load_file(path));
    }

    fn ingest(&mut self, file_name: &str, loaded: Result<Table, LoadError>) {
        self.selections = Selections::default();
        match loaded {
            Ok(table) => {
                self.source = Some(LoadedSource {
                    file_name: file_name.to_string(),
                    table,
                });
                self.status_message = None;
                self.evaluate();
            }
            Err(e) => {
                log::error!("[{}] {e}", self.config.name);
                self.source = None;
                self.evaluation = None;
                self.status_message = Some(e.to_string());
            }
        }
    }

    /// Change one stage's choice and re-run the whole pipeline.
    pub fn set_selection(&mut self, stage: Stage, selection: Selection) {
        self.selections.set(stage, selection);
        self.evaluate();
    }

    /// Full top-to-bottom pass over the loaded table.
    ///
    /// Country and status choices always stay, since their options come from
    /// the whole table. An establishment that the earlier stages removed from
    /// its options falls back to "all", then the pass is repeated.
    pub fn evaluate(&mut self) {
        let Some(source) = &self.source else {
            self.evaluation = None;
            return;
        };

        let mut attempt = self.pipeline.run(&source.table, &self.selections);
        if let Ok(outcome) = &attempt {
            let stale = outcome
                .stage(Stage::Establishment)
                .is_some_and(|report| !report.selection_is_offered());
            if stale {
                log::debug!(
                    "[{}] {} selection no longer offered, resetting",
                    self.config.name,
                    Stage::Establishment
                );
                self.selections.set(Stage::Establishment, Selection::All);
                attempt = self.pipeline.run(&source.table, &self.selections);
            }
        }

        let evaluation = match attempt {
            Err(e) => {
                log::error!("[{}] {e}", self.config.name);
                Evaluation::Aborted(e)
            }
            Ok(outcome) => Evaluation::Ready(Box::new(self.build_report(outcome))),
        };
        self.evaluation = Some(evaluation);
    }

    fn build_report(&mut self, outcome: PipelineOutcome) -> Report {
        self.status_message = None;
        let output = project(&outcome.table, &outcome.establishment_column);
        let export = match &output {
            Ok(record) => {
                let stem = file_stem(&self.config.name, &outcome.selections, &self.config.placeholders);
                match ExportBundle::build(stem, record) {
                    Ok(bundle) => Some(bundle),
                    Err(e) => {
                        log::error!("[{}] Failed to encode export: {e:#}", self.config.name);
                        self.status_message = Some(format!("Export error: {e:#}"));
                        None
                    }
                }
            }
            Err(missing) => {
                log::warn!("[{}] {missing}", self.config.name);
                None
            }
        };
        Report {
            outcome,
            output,
            export,
        }
    }

    /// The last successful report, if any.
    pub fn report(&self) -> Option<&Report> {
        match &self.evaluation {
            Some(Evaluation::Ready(report)) => Some(report),
            _ => None,
        }
    }
}

use anyhow::{Context, Result};
use eframe::egui::{Color32, RichText, Ui};
use egui_extras::{Column, TableBuilder};

use crate::data::model::Table;
use crate::session::GroupSession;

const ROW_HEIGHT: f32 = 18.0;

// ---------------------------------------------------------------------------
// Output record (central panel)
// ---------------------------------------------------------------------------

/// Render the projected table and its download buttons.
pub fn output_table(ui: &mut Ui, session: &mut GroupSession) {
    if session.source.is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Upload a file to filter participants  (File → Open…)");
        });
        return;
    }
    // Aborted passes are reported in the side panel.
    let Some(report) = session.report() else {
        return;
    };

    let record = match &report.output {
        Ok(record) => record,
        Err(missing) => {
            ui.label(RichText::new(missing.to_string()).color(Color32::RED));
            return;
        }
    };

    let mut error = None;
    if let Some(bundle) = &report.export {
        ui.horizontal(|ui: &mut Ui| {
            if ui.button("Download CSV").clicked() {
                error = save_artifact(&bundle.csv_file_name(), &bundle.csv, "CSV", "csv").err();
            }
            ui.label("|");
            if ui.button("Download Excel").clicked() {
                error = save_artifact(&bundle.xlsx_file_name(), &bundle.xlsx, "Excel", "xlsx").err();
            }
            ui.label("|");
            if ui.button("Save both to folder…").clicked() {
                if let Some(dir) = rfd::FileDialog::new().set_title("Export folder").pick_folder() {
                    error = bundle.write_to_dir(&dir).err();
                }
            }
        });
        ui.separator();
    }

    record_grid(ui, record);

    if let Some(e) = error {
        log::error!("Export failed: {e:#}");
        session.status_message = Some(format!("Export error: {e:#}"));
    }
}

fn record_grid(ui: &mut Ui, record: &Table) {
    let columns = record.columns();
    TableBuilder::new(ui)
        .striped(true)
        .resizable(true)
        .columns(Column::auto().at_least(80.0), record.width())
        .header(ROW_HEIGHT + 4.0, |mut header| {
            for col in columns {
                header.col(|ui: &mut Ui| {
                    ui.strong(&col.name);
                });
            }
        })
        .body(|body| {
            body.rows(ROW_HEIGHT, record.height(), |mut row| {
                let idx = row.index();
                for col in columns {
                    row.col(|ui: &mut Ui| {
                        ui.label(col.values[idx].to_string());
                    });
                }
            });
        });
}

/// Ask where to save one artifact and write it there.
fn save_artifact(file_name: &str, bytes: &[u8], kind: &str, ext: &str) -> Result<()> {
    let Some(path) = rfd::FileDialog::new()
        .set_title(format!("Save {kind} export"))
        .set_file_name(file_name)
        .add_filter(kind, &[ext])
        .save_file()
    else {
        return Ok(());
    };

    std::fs::write(&path, bytes)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("Saved {}", path.display());
    Ok(())
}

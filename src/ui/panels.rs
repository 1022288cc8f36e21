use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::app::MoowApp;
use crate::data::filter::{Selection, Stage, StageReport};
use crate::session::{Evaluation, GroupSession};

const WARNING_COLOR: Color32 = Color32::from_rgb(230, 160, 40);

// ---------------------------------------------------------------------------
// Left side panel – upload and filter widgets
// ---------------------------------------------------------------------------

/// Render the upload control and the three filter dropdowns of one group.
pub fn side_panel(ui: &mut Ui, session: &mut GroupSession) {
    ui.heading(&session.config.name);
    ui.separator();

    ui.push_id(session.upload_id(), |ui: &mut Ui| {
        if ui.button("Upload data file…").clicked() {
            open_file_dialog(session);
        }
    });
    ui.small("CSV, XLS or XLSX. You can also drop a file on the window.");

    if let Some(msg) = &session.status_message {
        ui.label(RichText::new(msg).color(Color32::RED));
    }

    let Some(source) = &session.source else {
        ui.label(format!("Please upload a data file for {}.", session.config.name));
        return;
    };
    ui.label(format!("{}: {} records loaded", source.file_name, source.table.height()));
    ui.separator();

    // Clone what we need so we can mutate the session from the widgets.
    let (rows_loaded, stages): (usize, Vec<StageReport>) = match &session.evaluation {
        Some(Evaluation::Ready(report)) => {
            for warning in &report.outcome.warnings {
                ui.label(RichText::new(warning.to_string()).color(WARNING_COLOR));
            }
            (report.outcome.rows_loaded, report.outcome.stages.clone())
        }
        Some(Evaluation::Aborted(e)) => {
            ui.label(RichText::new(e.to_string()).color(Color32::RED));
            return;
        }
        None => return,
    };

    let mut changed: Option<(Stage, Selection)> = None;
    let view: &GroupSession = session;
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for report in stages.iter().filter(|r| !r.skipped()) {
                if let Some(selection) = stage_combo(ui, view, report) {
                    changed = Some((report.stage, selection));
                }
                if view.config.report_stage_counts && report.selection != Selection::All {
                    ui.label(format!(
                        "{} of {} records for '{}'",
                        report.rows_after,
                        report.rows_before,
                        report.selection.label(view.config.sentinels.get(report.stage))
                    ));
                }
                ui.add_space(4.0);
            }

            if let Some(last) = stages.last() {
                ui.separator();
                ui.strong(format!("{} of {rows_loaded} records after filtering", last.rows_after));
            }
        });

    if let Some((stage, selection)) = changed {
        session.set_selection(stage, selection);
    }
}

/// One dropdown: the sentinel first, then every distinct value.
fn stage_combo(ui: &mut Ui, session: &GroupSession, report: &StageReport) -> Option<Selection> {
    let sentinel = session.config.sentinels.get(report.stage);
    let mut picked = None;

    ui.strong(format!("Select the {}", report.stage));
    egui::ComboBox::from_id_salt(session.widget_id(report.stage))
        .selected_text(report.selection.label(sentinel).into_owned())
        .width(ui.available_width())
        .show_ui(ui, |ui: &mut Ui| {
            let choices = std::iter::once(Selection::All)
                .chain(report.options.iter().cloned().map(Selection::Value));
            for (choice, label) in choices.zip(report.option_labels(sentinel)) {
                if ui.selectable_label(report.selection == choice, label).clicked() {
                    picked = Some(choice);
                }
            }
        });

    picked.filter(|p| *p != report.selection)
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the menu and one tab per group.
pub fn top_bar(ui: &mut Ui, app: &mut MoowApp) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                if let Some(session) = app.sessions.get_mut(app.active) {
                    open_file_dialog(session);
                }
                ui.close_menu();
            }
        });

        ui.separator();

        for (idx, session) in app.sessions.iter().enumerate() {
            ui.selectable_value(&mut app.active, idx, &session.config.name);
        }
    });
}

// ---------------------------------------------------------------------------
// File input
// ---------------------------------------------------------------------------

pub fn open_file_dialog(session: &mut GroupSession) {
    let file = rfd::FileDialog::new()
        .set_title(format!("Open data for {}", session.config.name))
        .add_filter("Supported files", &["csv", "xlsx", "xls"])
        .add_filter("CSV", &["csv"])
        .add_filter("Excel", &["xlsx", "xls"])
        .pick_file();

    if let Some(path) = file {
        session.load_path(&path);
    }
}

/// Load the first file dropped onto the window into `session`.
pub fn handle_dropped_files(ctx: &egui::Context, session: &mut GroupSession) {
    let dropped = ctx.input(|i| i.raw.dropped_files.clone());
    let Some(file) = dropped.into_iter().next() else {
        return;
    };

    // Native drops carry a path, web drops carry the bytes.
    if let Some(path) = &file.path {
        session.load_path(path);
    } else if let Some(bytes) = &file.bytes {
        session.load_bytes(&file.name, bytes);
    }
}

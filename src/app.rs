use eframe::egui;

use crate::config::AppConfig;
use crate::session::GroupSession;
use crate::ui::{panels, table};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct MoowApp {
    /// One independent session per configured group.
    pub sessions: Vec<GroupSession>,
    /// Index of the visible tab.
    pub active: usize,
}

impl MoowApp {
    pub fn new(config: AppConfig) -> Self {
        Self {
            sessions: config.groups.into_iter().map(GroupSession::new).collect(),
            active: 0,
        }
    }
}

impl eframe::App for MoowApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Files dropped onto the window go to the visible tab ----
        if let Some(session) = self.sessions.get_mut(self.active) {
            panels::handle_dropped_files(ctx, session);
        }

        // ---- Top panel: tabs ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, self);
        });

        let Some(session) = self.sessions.get_mut(self.active) else {
            return;
        };

        // ---- Left side panel: upload and filters ----
        egui::SidePanel::left(egui::Id::new(("filter_panel", &session.config.key)))
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, session);
            });

        // ---- Central panel: output record ----
        egui::CentralPanel::default().show(ctx, |ui| {
            table::output_table(ui, session);
        });
    }
}

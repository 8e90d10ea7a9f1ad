use crate::analysis_api::HttpBackend;
use crate::config::ClientConfig;
use crate::display::{render_answer, AnswerSlot};
use crate::error::FlowError;
use crate::flows::{FlowKind, FlowPhase, FlowTracker, Flows};
use crate::input::{InputController, SelectedFile};
use anyhow::{anyhow, Context, Result};
use eframe::egui::{self, Color32, Frame, RichText, ScrollArea, Stroke, TextEdit};
use std::sync::Arc;

const ACCENT: Color32 = Color32::from_rgb(0, 123, 255);
const TITLE: Color32 = Color32::from_rgb(0, 170, 170);
const PANEL_BG: Color32 = Color32::from_rgb(249, 249, 249);
const PANEL_BORDER: Color32 = Color32::from_rgb(204, 204, 204);
const ERROR_TEXT: Color32 = Color32::from_rgb(170, 30, 30);

pub fn run_gui(config: ClientConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot create async runtime")?;
    let answer = AnswerSlot::new(config.answer_policy);
    let backend = HttpBackend::new(config).context("cannot create HTTP client")?;
    let flows = Flows::new(Arc::new(backend), answer);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 520.0])
            .with_min_inner_size([420.0, 360.0])
            .with_title("Data Analysis Chatbot")
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Data Analysis Chatbot",
        native_options,
        Box::new(move |cc| {
            configure_theme(&cc.egui_ctx);
            Ok(Box::new(AnalysisChatApp::new(flows, runtime)))
        }),
    )
    .map_err(|err| anyhow!("cannot start the window: {err}"))
}

fn configure_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style.visuals = egui::Visuals::light();
    style.spacing.item_spacing = egui::vec2(10.0, 10.0);
    style.spacing.button_padding = egui::vec2(20.0, 10.0);
    style
        .text_styles
        .insert(egui::TextStyle::Heading, egui::FontId::proportional(24.0));
    style
        .text_styles
        .insert(egui::TextStyle::Body, egui::FontId::proportional(15.0));
    style
        .text_styles
        .insert(egui::TextStyle::Button, egui::FontId::proportional(15.0));
    ctx.set_style(style);
}

fn bordered_panel<R>(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui) -> R) -> R {
    Frame::default()
        .fill(PANEL_BG)
        .stroke(Stroke::new(1.0, PANEL_BORDER))
        .inner_margin(egui::Margin::same(10))
        .show(ui, add_contents)
        .inner
}

/// Failures to show in the status line. A failed request stays listed
/// until the same flow succeeds.
fn error_summary(upload: &FlowTracker, chat: &FlowTracker, missing_file: bool) -> Option<String> {
    let upload_error = if missing_file {
        Some(FlowError::MissingFile.to_string())
    } else {
        upload.last_error()
    };
    let parts: Vec<String> = [
        upload_error.map(|err| format!("{}: {err}", FlowKind::Upload)),
        chat.last_error().map(|err| format!("{}: {err}", FlowKind::Chat)),
    ]
    .into_iter()
    .flatten()
    .collect();

    (!parts.is_empty()).then(|| parts.join("   "))
}

fn phase_label(phase: FlowPhase) -> &'static str {
    match phase {
        FlowPhase::Idle => "idle",
        FlowPhase::Requesting => "requesting...",
        FlowPhase::Succeeded => "done",
        FlowPhase::Failed => "failed",
    }
}

pub struct AnalysisChatApp {
    input: InputController,
    file_path: String,
    instruction: String,
    chat_query: String,
    flows: Flows<HttpBackend>,
    runtime: tokio::runtime::Runtime,
    /// Set when Upload was pressed with no file selected.
    missing_file: bool,
}

impl AnalysisChatApp {
    fn new(flows: Flows<HttpBackend>, runtime: tokio::runtime::Runtime) -> Self {
        Self {
            input: InputController::new(),
            file_path: String::new(),
            instruction: String::new(),
            chat_query: String::new(),
            flows,
            runtime,
            missing_file: false,
        }
    }

    fn select_file_from_field(&mut self) {
        let path = self.file_path.trim();
        let file = (!path.is_empty()).then(|| SelectedFile::from_path(path));
        self.missing_file &= file.is_none();
        self.input.set_file(file);
    }

    fn take_dropped_file(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .find_map(|file| file.path.clone())
        });
        if let Some(path) = dropped {
            self.file_path = path.display().to_string();
            self.input.set_file(Some(SelectedFile::from_path(path)));
            self.missing_file = false;
        }
    }

    fn trigger(&mut self, kind: FlowKind, ctx: &egui::Context) {
        let flows = self.flows.clone();
        let ctx = ctx.clone();
        let file = self.input.file().cloned();
        let instruction = self.input.instruction().to_string();
        let chat_query = self.input.chat_query().to_string();
        if kind == FlowKind::Upload {
            self.missing_file = file.is_none();
        }

        self.runtime.spawn(async move {
            // Failures are logged by the flow and kept by its tracker.
            let _ = match kind {
                FlowKind::Upload => flows.upload(file, instruction).await,
                FlowKind::Chat => flows.chat(chat_query).await,
            };
            ctx.request_repaint();
        });
    }

    fn status_line(&self) -> String {
        format!(
            "Upload: {}   Chat: {}",
            phase_label(self.flows.tracker(FlowKind::Upload).phase()),
            phase_label(self.flows.tracker(FlowKind::Chat).phase()),
        )
    }

    fn any_requesting(&self) -> bool {
        [FlowKind::Upload, FlowKind::Chat]
            .iter()
            .any(|kind| self.flows.tracker(*kind).phase() == FlowPhase::Requesting)
    }
}

impl eframe::App for AnalysisChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.take_dropped_file(ctx);

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(RichText::new(self.status_line()).small());
                let errors = error_summary(
                    self.flows.tracker(FlowKind::Upload),
                    self.flows.tracker(FlowKind::Chat),
                    self.missing_file,
                );
                if let Some(errors) = errors {
                    ui.label(RichText::new(errors).small().color(ERROR_TEXT));
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(RichText::new("Data Analysis Chatbot").color(TITLE).strong());
            });
            ui.add_space(10.0);

            ui.horizontal(|ui| {
                let path_edit = ui.add(
                    TextEdit::singleline(&mut self.file_path)
                        .hint_text("File path (or drop a file here)...")
                        .desired_width(ui.available_width() - 90.0),
                );
                let select = ui.button("Select").clicked();
                if path_edit.lost_focus() || select {
                    self.select_file_from_field();
                }
            });
            let selected = match self.input.file() {
                Some(file) => format!("Selected: {}", file.file_name),
                None => "No file selected".to_string(),
            };
            ui.label(RichText::new(selected).small());

            ui.horizontal(|ui| {
                let edit = ui.add(
                    TextEdit::singleline(&mut self.instruction)
                        .hint_text("Custom query for file analysis...")
                        .desired_width(ui.available_width() - 190.0),
                );
                if edit.changed() {
                    self.input.set_instruction(self.instruction.clone());
                }
                let upload =
                    egui::Button::new(RichText::new("Upload and Analyze").color(Color32::WHITE))
                        .fill(ACCENT);
                if ui.add(upload).clicked() {
                    self.trigger(FlowKind::Upload, ctx);
                }
            });

            ui.add_space(10.0);
            ui.horizontal(|ui| {
                let edit = ui.add(
                    TextEdit::singleline(&mut self.chat_query)
                        .hint_text("Ask a question...")
                        .desired_width(ui.available_width() - 90.0),
                );
                if edit.changed() {
                    self.input.set_chat_query(self.chat_query.clone());
                }
                let chat =
                    egui::Button::new(RichText::new("Chat").color(Color32::WHITE)).fill(ACCENT);
                if ui.add(chat).clicked() {
                    self.trigger(FlowKind::Chat, ctx);
                }
            });

            ui.add_space(20.0);
            bordered_panel(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.heading("Response");
                ScrollArea::vertical().show(ui, |ui| {
                    ui.add(egui::Label::new(render_answer(self.flows.answer())).wrap());
                });
            });
        });

        if self.any_requesting() {
            ctx.request_repaint_after(std::time::Duration::from_millis(250));
        }
    }
}

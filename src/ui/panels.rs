use egui::{Color32, Context, RichText, ScrollArea, Ui};

use crate::import::ModelType;
use crate::ui::theme::*;
use crate::viewer::StyleEdit;
use crate::viewer::style::{FOV_RANGE, THICKNESS_RANGE, THRESHOLD_RANGE};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UiActions {
    pub download: bool,
    pub reset_camera: bool,
}

/// What the panel reports about the displayed model.
#[derive(Debug, Default, Clone)]
pub struct PanelStatus<'a> {
    pub model_name: Option<&'a str>,
    pub triangles: usize,
    pub hard_edges: usize,
    pub conditional_edges: usize,
    pub fps: f32,
    pub loading: bool,
    pub error: Option<&'a str>,
    pub notice: Option<&'a str>,
    pub capture_supported: bool,
}

/// Draws the control panel over `edit`. The caller applies the edit and
/// reacts to the returned actions.
pub fn draw_side_panel(ctx: &Context, edit: &mut StyleEdit, status: &PanelStatus<'_>) -> UiActions {
    let mut actions = UiActions::default();

    egui::SidePanel::right("control_panel")
        .min_width(260.0)
        .max_width(360.0)
        .default_width(300.0)
        .frame(egui::Frame::default().fill(BG_PANEL).inner_margin(14.0))
        .show(ctx, |ui| {
            ScrollArea::vertical().show(ui, |ui| {
                ui.heading(RichText::new("Line Art").strong());
                ui.add_space(2.0);
                ui.label(
                    RichText::new(status.model_name.unwrap_or("no model"))
                        .color(TEXT_MUTED)
                        .size(11.0),
                );
                ui.add_space(12.0);

                section_header(ui, "LINES");
                ui.horizontal(|ui| {
                    ui.label("Color");
                    ui.color_edit_button_srgb(&mut edit.line_color.0);
                    ui.label(RichText::new(edit.line_color.to_hex()).color(TEXT_MUTED).monospace());
                });
                ui.add(
                    egui::Slider::new(&mut edit.threshold, THRESHOLD_RANGE)
                        .text("Threshold")
                        .suffix("°"),
                );
                ui.add(
                    egui::Slider::new(&mut edit.thickness, THICKNESS_RANGE)
                        .text("Thickness")
                        .suffix(" px"),
                );
                ui.add_space(12.0);

                section_header(ui, "CAMERA");
                ui.add(egui::Slider::new(&mut edit.fov, FOV_RANGE).text("FOV").suffix("°"));
                if ui.button("Reset view").clicked() {
                    actions.reset_camera = true;
                }
                ui.add_space(12.0);

                section_header(ui, "DISPLAY");
                ui.checkbox(&mut edit.use_shader, "Line-art shader");
                ui.add_space(12.0);

                section_header(ui, "IMPORT");
                model_type_combo(ui, &mut edit.model_type);
                ui.label(
                    RichText::new(import_hint(edit.model_type))
                        .color(TEXT_MUTED)
                        .size(11.0)
                        .italics(),
                );
                ui.add_space(12.0);

                section_header(ui, "EXPORT");
                let download = ui.add_enabled(
                    status.capture_supported,
                    egui::Button::new("Download PNG").min_size(egui::vec2(ui.available_width(), 28.0)),
                );
                if download.clicked() {
                    actions.download = true;
                }
                if !status.capture_supported {
                    ui.label(
                        RichText::new("This surface cannot be read back.")
                            .color(TEXT_MUTED)
                            .size(11.0),
                    );
                }
                ui.add_space(12.0);

                if let Some(notice) = status.notice {
                    ui.label(RichText::new(notice).color(ACCENT_GREEN).size(11.0));
                    ui.add_space(6.0);
                }
                if let Some(error) = status.error {
                    error_box(ui, error);
                    ui.add_space(6.0);
                }

                ui.separator();
                ui.add_space(8.0);
                stats_panel(ui, status);
            });
        });

    actions
}

fn section_header(ui: &mut Ui, text: &str) {
    ui.label(RichText::new(text).color(TEXT_MUTED).size(11.0).strong());
    ui.add_space(4.0);
}

fn model_type_combo(ui: &mut Ui, model_type: &mut ModelType) {
    egui::ComboBox::from_id_salt("model_type")
        .selected_text(model_type.to_string())
        .width(ui.available_width())
        .show_ui(ui, |ui| {
            for kind in ModelType::ALL {
                ui.selectable_value(model_type, kind, kind.to_string());
            }
        });
}

fn import_hint(model_type: ModelType) -> &'static str {
    match model_type {
        ModelType::Gltf => "Drop a folder or the .gltf with its buffers and textures.",
        ModelType::Glb => "Drop a .glb file.",
        ModelType::Fbx => "FBX files are not supported yet.",
        ModelType::Obj => "Drop an .obj file.",
    }
}

fn error_box(ui: &mut Ui, error: &str) {
    egui::Frame::default()
        .fill(Color32::from_rgb(252, 232, 232))
        .stroke(egui::Stroke::new(1.0, ACCENT_RED))
        .rounding(4.0)
        .inner_margin(8.0)
        .show(ui, |ui| {
            ui.label(RichText::new(error).color(ACCENT_RED).size(11.0));
        });
}

fn stats_panel(ui: &mut Ui, status: &PanelStatus<'_>) {
    section_header(ui, "STATISTICS");
    egui::Frame::default()
        .fill(BG_WIDGET)
        .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
        .rounding(6.0)
        .inner_margin(10.0)
        .show(ui, |ui| {
            ui.style_mut().override_font_id = Some(egui::FontId::new(11.0, egui::FontFamily::Monospace));

            let fps_color = if status.fps >= 50.0 {
                ACCENT_GREEN
            } else if status.fps >= 25.0 {
                ACCENT_ORANGE
            } else {
                ACCENT_RED
            };

            egui::Grid::new("stats").num_columns(2).spacing([20.0, 4.0]).show(ui, |ui| {
                ui.label(RichText::new("FPS").color(TEXT_MUTED));
                ui.label(RichText::new(format!("{:.0}", status.fps)).color(fps_color));
                ui.end_row();

                ui.label(RichText::new("Triangles").color(TEXT_MUTED));
                ui.label(fmt_num(status.triangles));
                ui.end_row();

                ui.label(RichText::new("Hard edges").color(TEXT_MUTED));
                ui.label(fmt_num(status.hard_edges));
                ui.end_row();

                ui.label(RichText::new("Conditional").color(TEXT_MUTED));
                ui.label(fmt_num(status.conditional_edges));
                ui.end_row();
            });
        });
}

pub fn draw_help_overlay(ctx: &Context) {
    egui::Area::new(egui::Id::new("help_overlay"))
        .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(12.0, -12.0))
        .show(ctx, |ui| {
            egui::Frame::default()
                .fill(Color32::from_white_alpha(220))
                .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
                .rounding(6.0)
                .inner_margin(8.0)
                .show(ui, |ui| {
                    ui.style_mut().override_font_id = Some(egui::FontId::new(11.0, egui::FontFamily::Monospace));
                    ui.label(
                        RichText::new("LMB drag - Orbit | RMB drag - Pan | Scroll - Zoom | Drop files to load")
                            .color(TEXT_MUTED),
                    );
                });
        });
}

/// Centered notice while a load is in flight.
pub fn draw_loading_overlay(ctx: &Context) {
    egui::Area::new(egui::Id::new("loading_overlay"))
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            egui::Frame::default()
                .fill(Color32::from_white_alpha(230))
                .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
                .rounding(6.0)
                .inner_margin(14.0)
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(RichText::new("Loading model...").color(TEXT_PRIMARY));
                    });
                });
        });
}

pub fn draw_drop_hint(ctx: &Context, model_type: ModelType) {
    egui::Area::new(egui::Id::new("drop_hint"))
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            egui::Frame::default()
                .fill(Color32::from_white_alpha(235))
                .stroke(egui::Stroke::new(2.0, BORDER_ACCENT))
                .rounding(8.0)
                .inner_margin(20.0)
                .show(ui, |ui| {
                    ui.label(
                        RichText::new(format!("Drop to load as {model_type}"))
                            .color(ACCENT_BLUE)
                            .size(16.0),
                    );
                });
        });
}

fn fmt_num(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_counts_are_abbreviated() {
        assert_eq!(fmt_num(999), "999");
        assert_eq!(fmt_num(12_345), "12.3K");
        assert_eq!(fmt_num(2_500_000), "2.50M");
    }

    #[test]
    fn panel_runs_headless_and_keeps_edit_untouched() {
        let ctx = Context::default();
        let mut edit = StyleEdit::default();
        let before = edit.clone();
        let status = PanelStatus {
            model_name: Some("demo"),
            capture_supported: true,
            ..Default::default()
        };
        let mut actions = UiActions::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            actions = draw_side_panel(ctx, &mut edit, &status);
            draw_help_overlay(ctx);
        });
        assert_eq!(edit, before);
        assert_eq!(actions, UiActions::default());
    }
}

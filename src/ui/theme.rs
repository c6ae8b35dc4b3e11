use egui::{Color32, FontFamily, FontId, Rounding, Stroke, Style, TextStyle, Visuals};

pub const BG_CANVAS: Color32 = Color32::from_rgb(255, 255, 255);
pub const BG_PANEL: Color32 = Color32::from_rgb(246, 246, 248);
pub const BG_WIDGET: Color32 = Color32::from_rgb(232, 232, 236);
pub const BG_WIDGET_HOVER: Color32 = Color32::from_rgb(220, 220, 226);
pub const BG_WIDGET_ACTIVE: Color32 = Color32::from_rgb(205, 205, 214);

pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(40, 40, 44);
pub const TEXT_MUTED: Color32 = Color32::from_rgb(120, 120, 128);
pub const TEXT_BRIGHT: Color32 = Color32::from_rgb(10, 10, 12);

pub const ACCENT_GREEN: Color32 = Color32::from_rgb(36, 140, 28);
pub const ACCENT_RED: Color32 = Color32::from_rgb(180, 35, 35);
pub const ACCENT_BLUE: Color32 = Color32::from_rgb(60, 84, 196);
pub const ACCENT_ORANGE: Color32 = Color32::from_rgb(190, 120, 30);

pub const BORDER_SUBTLE: Color32 = Color32::from_rgb(210, 210, 218);
pub const BORDER_ACCENT: Color32 = Color32::from_rgb(60, 84, 196);

fn widget(bg: Color32, stroke: Stroke, fg: Color32, expansion: f32) -> egui::style::WidgetVisuals {
    egui::style::WidgetVisuals {
        bg_fill: bg,
        weak_bg_fill: bg,
        bg_stroke: stroke,
        rounding: Rounding::same(4.0),
        fg_stroke: Stroke::new(1.0, fg),
        expansion,
    }
}

/// Light panel styling so the controls sit quietly next to the white canvas.
pub fn apply_theme(ctx: &egui::Context) {
    let mut style = Style::default();

    let mut visuals = Visuals::light();
    visuals.override_text_color = Some(TEXT_PRIMARY);
    visuals.widgets = egui::style::Widgets {
        noninteractive: egui::style::WidgetVisuals {
            weak_bg_fill: BG_PANEL,
            ..widget(BG_WIDGET, Stroke::new(1.0, BORDER_SUBTLE), TEXT_MUTED, 0.0)
        },
        inactive: widget(BG_WIDGET, Stroke::new(1.0, BORDER_SUBTLE), TEXT_PRIMARY, 0.0),
        hovered: widget(BG_WIDGET_HOVER, Stroke::new(1.0, BORDER_ACCENT), TEXT_BRIGHT, 1.0),
        active: widget(BG_WIDGET_ACTIVE, Stroke::new(2.0, ACCENT_BLUE), TEXT_BRIGHT, 1.0),
        open: widget(BG_WIDGET_ACTIVE, Stroke::new(1.0, BORDER_ACCENT), TEXT_BRIGHT, 0.0),
    };
    visuals.selection = egui::style::Selection {
        bg_fill: ACCENT_BLUE.gamma_multiply(0.3),
        stroke: Stroke::new(1.0, ACCENT_BLUE),
    };
    visuals.hyperlink_color = ACCENT_BLUE;
    visuals.faint_bg_color = BG_PANEL;
    visuals.extreme_bg_color = BG_CANVAS;
    visuals.warn_fg_color = ACCENT_ORANGE;
    visuals.error_fg_color = ACCENT_RED;
    visuals.window_rounding = Rounding::same(6.0);
    visuals.window_fill = BG_PANEL;
    visuals.window_stroke = Stroke::new(1.0, BORDER_SUBTLE);
    visuals.panel_fill = BG_PANEL;
    visuals.slider_trailing_fill = true;
    visuals.handle_shape = egui::style::HandleShape::Circle;
    visuals.numeric_color_space = egui::style::NumericColorSpace::GammaByte;
    style.visuals = visuals;

    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.window_margin = egui::Margin::same(12.0);
    style.spacing.button_padding = egui::vec2(8.0, 4.0);
    style.spacing.slider_width = 160.0;

    style.text_styles = [
        (TextStyle::Small, FontId::new(11.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(13.0, FontFamily::Proportional)),
        (TextStyle::Button, FontId::new(13.0, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(17.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(12.0, FontFamily::Monospace)),
    ]
    .into();

    ctx.set_style(style);
}

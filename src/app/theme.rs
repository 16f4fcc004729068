//! Theme definitions for the patch canvas
//!
//! Colour constants for boxes, edges and connections, and the egui style
//! applied on the first frame.

use eframe::egui::{self, Color32, Rounding, Stroke, Vec2};

use crate::engine::PortKind;
use crate::patch::TemplateColours;

/// Background colors
pub mod background {
    use super::Color32;

    /// Canvas background - deep dark blue
    pub const MAIN: Color32 = Color32::from_rgb(26, 26, 46);

    /// Grid dot color - subtle
    pub const GRID: Color32 = Color32::from_rgb(55, 55, 80);

    /// Panel background - slightly lighter than main
    pub const PANEL: Color32 = Color32::from_rgb(35, 35, 55);

    /// Widget background (buttons, inputs)
    pub const WIDGET: Color32 = Color32::from_rgb(45, 45, 70);

    /// Widget background when hovered
    pub const WIDGET_HOVERED: Color32 = Color32::from_rgb(55, 55, 85);

    /// Widget background when active/pressed
    pub const WIDGET_ACTIVE: Color32 = Color32::from_rgb(65, 65, 100);
}

/// Port kind colors - used for connections and edges
pub mod signal {
    use super::Color32;

    /// Audio-rate signal - blue
    pub const AUDIO: Color32 = Color32::from_rgb(66, 165, 245);

    /// Control messages - light grey
    pub const CONTROL: Color32 = Color32::from_rgb(200, 200, 210);
}

/// Box colors
pub mod object {
    use super::Color32;

    pub const FILL: Color32 = Color32::from_rgb(35, 35, 55);
    pub const OUTLINE: Color32 = Color32::from_rgb(120, 120, 150);

    /// Message boxes and atoms
    pub const MESSAGE_FILL: Color32 = Color32::from_rgb(45, 45, 70);

    /// Unknown class
    pub const BROKEN: Color32 = Color32::from_rgb(239, 83, 80);

    /// Edge highlighted as a connection target
    pub const TARGETED: Color32 = Color32::from_rgb(129, 199, 132);
}

/// Text colors
pub mod text {
    use super::Color32;

    /// Primary text - bright white
    pub const PRIMARY: Color32 = Color32::from_rgb(240, 240, 245);

    /// Secondary text - dimmed
    pub const SECONDARY: Color32 = Color32::from_rgb(160, 160, 175);

    /// Disabled text
    pub const DISABLED: Color32 = Color32::from_rgb(100, 100, 115);
}

/// UI accent colors
pub mod accent {
    use super::Color32;

    /// Primary accent - blue, also the selection colour
    pub const PRIMARY: Color32 = Color32::from_rgb(66, 165, 245);

    /// Success/active - green
    pub const SUCCESS: Color32 = Color32::from_rgb(129, 199, 132);

    /// Warning - orange
    pub const WARNING: Color32 = Color32::from_rgb(255, 183, 77);

    /// Error - red
    pub const ERROR: Color32 = Color32::from_rgb(239, 83, 80);
}

/// Standard rounding for UI elements
pub const ROUNDING: Rounding = Rounding {
    nw: 6.0,
    ne: 6.0,
    sw: 6.0,
    se: 6.0,
};

/// Smaller rounding for compact elements
pub const ROUNDING_SMALL: Rounding = Rounding {
    nw: 4.0,
    ne: 4.0,
    sw: 4.0,
    se: 4.0,
};

/// Connection colour for a port kind.
pub fn port_colour(kind: PortKind) -> Color32 {
    match kind {
        PortKind::Signal => signal::AUDIO,
        PortKind::Control => signal::CONTROL,
    }
}

/// Connection stroke; signal connections are drawn thicker.
pub fn connection_stroke(kind: PortKind, selected: bool) -> Stroke {
    let width = match kind {
        PortKind::Signal => 2.0,
        PortKind::Control => 1.0,
    };
    let colour = if selected { accent::PRIMARY } else { port_colour(kind) };
    Stroke::new(width, colour)
}

/// Colours substituted into GUI object templates.
pub fn template_colours() -> TemplateColours {
    let rgb = |colour: Color32| [colour.r(), colour.g(), colour.b()];
    TemplateColours {
        background: rgb(background::PANEL),
        foreground: rgb(text::PRIMARY),
    }
}

/// Apply the dark canvas theme to an egui context
pub fn apply_theme(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    let visuals = &mut style.visuals;
    visuals.dark_mode = true;

    visuals.window_fill = background::PANEL;
    visuals.window_stroke = Stroke::new(1.0, Color32::from_rgb(60, 60, 80));
    visuals.window_rounding = ROUNDING;
    visuals.panel_fill = background::MAIN;

    visuals.widgets.noninteractive.bg_fill = background::WIDGET;
    visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, text::SECONDARY);
    visuals.widgets.noninteractive.rounding = ROUNDING_SMALL;

    visuals.widgets.inactive.bg_fill = background::WIDGET;
    visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, text::PRIMARY);
    visuals.widgets.inactive.rounding = ROUNDING_SMALL;

    visuals.widgets.hovered.bg_fill = background::WIDGET_HOVERED;
    visuals.widgets.hovered.fg_stroke = Stroke::new(1.0, text::PRIMARY);
    visuals.widgets.hovered.rounding = ROUNDING_SMALL;

    visuals.widgets.active.bg_fill = background::WIDGET_ACTIVE;
    visuals.widgets.active.fg_stroke = Stroke::new(1.5, accent::PRIMARY);
    visuals.widgets.active.rounding = ROUNDING_SMALL;

    visuals.selection.bg_fill = accent::PRIMARY.gamma_multiply(0.3);
    visuals.selection.stroke = Stroke::new(1.0, accent::PRIMARY);

    visuals.extreme_bg_color = Color32::from_rgb(20, 20, 35);

    style.spacing.item_spacing = Vec2::new(8.0, 6.0);
    style.spacing.button_padding = Vec2::new(10.0, 4.0);
    style.spacing.window_margin = egui::Margin::same(10.0);

    ctx.set_style(style);
}

pub mod panels;
pub mod theme;

pub use panels::{
    PanelStatus, UiActions, draw_drop_hint, draw_help_overlay, draw_loading_overlay, draw_side_panel,
};
pub use theme::apply_theme;

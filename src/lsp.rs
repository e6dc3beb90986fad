pub mod bridge;
pub mod completion_cache;
pub mod mapping;
pub mod progress;
pub mod projection;

mod lsp_impl;
mod settings;
mod settings_manager;

pub use lsp_impl::RazorRouter;
pub use settings::{
    PROJECT_CONFIG_FILE, SettingsEvent, SettingsEventKind, SettingsLoadOutcome, SettingsSource,
    load_settings,
};

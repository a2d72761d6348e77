//! Configuration surface and connection resolution for the history feed.

pub mod crypto;
pub mod errors;
pub mod loader;
pub mod resolver;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path};
pub use resolver::{options_path, resolve_connection};
pub use types::FeedSettings;

pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod version;
pub mod watcher;

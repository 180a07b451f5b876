pub mod cli;
pub mod loader;

pub use cli::Args;
pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigWarnings};

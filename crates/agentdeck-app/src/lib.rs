pub mod app;
pub mod cli;
pub mod config;
pub mod logging;

pub use cli::{Cli, Commands, HostCommands, LaunchArgs};
pub use config::{setup_from_cli, AppConfig};

pub mod fleet;
pub mod hosts;
pub mod launch;
pub mod sessions;

pub use fleet::{run_fleet, FleetFile, LinePrefixer};
pub use hosts::run_hosts;
pub use launch::{run_launch, session_config_from_args};
pub use sessions::format_saved_sessions;

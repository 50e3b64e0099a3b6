pub mod app;
pub mod cli;

pub use app::{build_notify_manager, App, StartTargets};
pub use cli::{Cli, Command, KindArg};

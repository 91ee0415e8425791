pub mod app;
pub mod env;
pub mod run;
pub mod runtime;
pub mod serve;

pub use app::run;
pub use env::{CliArgs, Commands};

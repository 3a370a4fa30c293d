mod root;
mod simulate;

pub use root::Cli;
pub use simulate::{OutputFormat, SimulateCommand};

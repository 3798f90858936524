pub mod paths;
pub mod progress;
pub mod shell;

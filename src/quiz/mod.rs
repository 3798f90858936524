pub mod cli;
pub mod commands;
pub mod config;
pub mod doctor;
pub mod frame;
pub mod ledger;
pub mod narration;
pub mod render;
pub mod rows;
pub mod status;
pub mod support;
pub mod upload;

pub use cli::QuizCommands;
pub use commands::handle_quiz_command;

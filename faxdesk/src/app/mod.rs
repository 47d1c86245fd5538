pub mod application;
pub mod args;
pub mod cli_input;
pub mod commands;
pub mod settings;

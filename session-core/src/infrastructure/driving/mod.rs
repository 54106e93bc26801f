// Driving adapters: entry points that call into the application services

pub mod cli;

pub use cli::{Cli, Commands};

pub mod cli;
pub mod load_config;
pub mod output;
pub mod team_ids;

pub use cli::{run, Cli, Commands};

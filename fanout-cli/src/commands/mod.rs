pub mod config;
pub mod dataset;
pub mod search;

pub use config::{run_init_config, CliConfig};
pub use search::{run_search, run_validate};

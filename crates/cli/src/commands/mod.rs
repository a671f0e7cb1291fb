//! CLI command implementations

pub mod check_config;
pub mod percentile;
pub mod run;

pub use check_config::CheckConfigCommand;
pub use percentile::PercentileCommand;
pub use run::RunCommand;

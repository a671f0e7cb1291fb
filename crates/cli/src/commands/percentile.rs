//! Percentile command - evaluate the estimator on values from the command line

use clap::{Args, ValueEnum};
use colored::Colorize;
use processor::aggregation::Percentile;
use processor::config::Interpolation;

/// Estimator choice on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationArg {
    /// `p * (n + 1)` position, clamped at both ends
    Legacy,
    /// Linear interpolation between closest ranks
    R7,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Legacy => Interpolation::Legacy,
            InterpolationArg::R7 => Interpolation::R7,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PercentileCommand {
    /// Values to evaluate
    #[arg(required = true, allow_negative_numbers = true, value_name = "VALUE")]
    values: Vec<f64>,

    /// Percentile in (0, 100]
    #[arg(short, long, default_value_t = 95.0)]
    quantile: f64,

    /// Estimator
    #[arg(short, long, value_enum, default_value = "legacy")]
    interpolation: InterpolationArg,
}

impl PercentileCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        let value = self.evaluate()?;
        println!(
            "{} {}",
            format!("p{}:", self.quantile).bold().cyan(),
            value.to_string().green()
        );
        Ok(())
    }

    fn evaluate(&self) -> anyhow::Result<f64> {
        if let Some(bad) = self.values.iter().find(|v| !v.is_finite()) {
            anyhow::bail!("values must be finite, got {}", bad);
        }
        let estimator = Percentile::new(self.quantile)?.with_interpolation(self.interpolation.into());
        Ok(estimator.evaluate(&self.values))
    }
}

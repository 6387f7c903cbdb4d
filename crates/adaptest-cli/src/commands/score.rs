//! The `adaptest score` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::config::load_settings_from;
use adaptest_core::scoring::PlacementLevel;

pub fn execute(theta: f64, se: Option<f64>, config_path: Option<PathBuf>) -> Result<()> {
    anyhow::ensure!(theta.is_finite(), "theta must be a finite number");
    if let Some(se) = se {
        anyhow::ensure!(
            se.is_finite() && se > 0.0,
            "standard error must be a positive number"
        );
    }

    let settings = load_settings_from(config_path.as_deref())?;
    let scale = settings.scale;

    println!("Theta: {theta:.3}");
    println!("Scaled score: {}", scale.scaled_score(theta));
    if let Some(se) = se {
        let low = scale.scaled_score(theta - 1.96 * se);
        let high = scale.scaled_score(theta + 1.96 * se);
        println!("95% band: {low}-{high}");
    }
    println!("Percentile: {}", scale.percentile(theta));
    println!("Placement: {}", PlacementLevel::from_theta(theta));

    Ok(())
}

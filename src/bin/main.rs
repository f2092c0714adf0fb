use std::path::Path;

use log::{info, warn};
use qalloc::{
    Result,
    config::Config,
    scenario::{run_scenario, summarize, write_stats},
};

const DEFAULT_CONFIG: &str = "qalloc.toml";

fn load_config() -> Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::from_file(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::from_file(DEFAULT_CONFIG),
        None => {
            warn!("No {DEFAULT_CONFIG} found, using built-in defaults");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let config = load_config()?;
    info!(
        "Training {} scenario(s) for {} episodes each",
        config.scenarios.len(),
        config.num_episodes
    );

    for index in 0..config.scenarios.len() {
        let report = run_scenario(&config, index)?;
        if let Some((train_wealth, eval_wealth)) = summarize(&report, config.report_window) {
            println!(
                "{}: Avg. Wealth (last {} episodes): {:.2} | Avg. Greedy Wealth: {:.2}",
                report.name, config.report_window, train_wealth, eval_wealth
            );
        }
        if let Some(dir) = &config.output_dir {
            let path = write_stats(&report, dir)?;
            info!("Wrote training curves for {} to {}", report.name, path.display());
        }
    }
    Ok(())
}

use std::env;

use anyhow::Context;
use doubles_tournament::prelude::*;

/// Usage: `doubles-tournament [CONF_FILE [TIDE_FILE]]`
///
/// Without a configuration file, settings come from `TOURNAMENT_*` environment variables.
fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);

    let mut config = Configuration::from_env();
    if let Some(conf_file) = args.next() {
        config = config.with_conf_file(&conf_file)?;
    }
    if let Some(tide_file) = args.next() {
        config = config.with_tide(TideSchedule::from_file(&tide_file)?);
    }

    let report = Tournament::new(config)
        .context("could not set up the tournament")?
        .run()?;

    println!(
        "{} matches played, {} distinct pairings",
        report.matches.len(),
        report.partners.pairs().len()
    );
    println!("rank player points");
    for (rank, (player, points)) in report.standings.iter().enumerate() {
        println!("{:>4} {player:>6} {points:>6}", rank + 1);
    }
    Ok(())
}

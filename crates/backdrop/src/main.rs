mod cache;
mod cli;
mod config;
mod paths;
mod probe;
mod run;
mod simulate;

use anyhow::Result;
use cli::Command;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let paths = AppPaths::discover()?;
    let tuning = config::load_tuning(&paths)?;

    match cli.command {
        Command::Probe(args) => probe::run(args, tuning),
        Command::Simulate(args) => simulate::run(args, tuning),
        Command::Cache(args) => cache::run(args, &paths, &tuning),
        Command::Where => run::print_paths(&paths),
    }
}

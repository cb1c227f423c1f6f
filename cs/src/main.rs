use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use contextstore::cli::{Cli, Command};
use contextstore::config::Config;
use contextstore::{ContextCategory, ContextEntry, ContextStore};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store_path = cli.store.clone().unwrap_or_else(|| config.store_path.clone());

    info!("contextstore starting ({})", store_path.display());

    match cli.command {
        Command::Show => {
            let store = ContextStore::load(&store_path);
            println!("{}", store.render());
        }
        Command::Add {
            category,
            text,
            error,
            spec,
            iteration,
        } => {
            let category: ContextCategory = category.parse().map_err(|e: String| eyre::eyre!(e))?;
            let entry = match error {
                Some(error) => ContextEntry::error_fix(error, text),
                None => ContextEntry::note(text),
            };
            let entry = entry.with_origin(spec.unwrap_or_default(), iteration);

            let mut store = ContextStore::load(&store_path);
            store.append(category, entry);
            store.prune(&config.limits);
            store.save(&store_path)?;
            println!("{} Added {} entry", "✓".green(), category.to_string().cyan());
        }
        Command::Prune => {
            let mut store = ContextStore::load(&store_path);
            let evicted = store.prune(&config.limits);
            store.save(&store_path)?;
            println!("{} Evicted {} entries", "✓".green(), evicted);
        }
        Command::Stats => {
            let store = ContextStore::load(&store_path);
            let counts = store.counts();
            println!("Store: {}", store_path.display().to_string().cyan());
            for (category, count) in counts.by_category {
                let limit = config.limits.limit_for(category);
                println!("  {:<10} {:>4} / {}", category.as_str(), count, limit.to_string().dimmed());
            }
            println!("  {:<10} {:>4}", "total", counts.total);
        }
    }

    Ok(())
}

mod cli;
mod commands;
mod observability;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    observability::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan(args) => commands::scan::run(args),
        Commands::List { pending } => commands::quarantine::list(pending),
        Commands::Approve {
            id,
            actor,
            force_override,
            pipeline,
            reason,
        } => commands::quarantine::approve(&id, &actor, force_override, pipeline, reason),
        Commands::Reject { id, actor, reason } => commands::quarantine::reject(&id, &actor, reason),
        Commands::ClearCache => commands::cache::clear(),
        Commands::FetchSignatures => commands::fetch::fetch_signatures(),
        Commands::Diff { old, new, json } => commands::diff::run(&old, &new, json),
        Commands::Phases { signatures, rules } => commands::phases::run(signatures.as_deref(), rules.as_deref()),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(commands::EXIT_ERROR);
        }
    }
}

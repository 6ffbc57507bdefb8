pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use qgrep_core::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init { name, root } => handlers::handle_init(&name, &root),
        Commands::Build { projects } => handlers::handle_build(&projects),
        Commands::Update { projects } => handlers::handle_update(&projects),
        Commands::Search { projects, rest } => handlers::handle_search(&projects, rest),
        Commands::Files { projects, rest } => handlers::handle_files(&projects, rest),
        Commands::Filter { rest } => handlers::handle_filter(rest),
        Commands::Info { projects } => handlers::handle_info(&projects),
        Commands::Watch { projects } => handlers::handle_watch(&projects),
        Commands::Change { projects, files } => handlers::handle_change(&projects, files),
        Commands::Interactive { projects } => handlers::handle_interactive(&projects),
        Commands::Projects => handlers::handle_projects(),
        Commands::Version => handlers::handle_version(),
        Commands::Help => handlers::handle_help(),
    }
}

//! Command surface: `init`/`build`/`update`/`search`/`files`/`filter`/`info`/
//! `watch`/`change`/`interactive`/`projects`/`version`/`help`, built with
//! `clap`'s derive macros. The compact option-letter grammar (`iVCL5fi<re>`)
//! isn't representable as ordinary flags, so `search`/`files`/`filter` take
//! raw trailing tokens and hand them to `crate::options::resolve` instead.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qgrep", author, version, about = "persistent code search", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a project: indexes `root` under `name`
    Init { name: String, root: PathBuf },

    /// (Re)build the on-disk index for one or more projects from scratch
    Build {
        /// `*`/`%` for every registered project, or a comma-separated list
        projects: String,
    },

    /// Incrementally refresh a project's index against its current files
    Update { projects: String },

    /// Search file contents
    Search {
        projects: String,
        /// Option letters and the query, e.g. `iC foo.*bar`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        rest: Vec<String>,
    },

    /// Search (or list) file paths, backed by a project's `.qgf`
    Files {
        projects: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        rest: Vec<String>,
    },

    /// Filter newline-delimited paths from stdin (pipe `qgrep files` into it)
    Filter {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        rest: Vec<String>,
    },

    /// Print chunk/file/byte counts for one or more projects
    Info { projects: String },

    /// Watch a project's root for changes and keep its `.qgc` up to date
    Watch { projects: String },

    /// Record that the given files changed, without reingesting them yet
    Change { projects: String, files: Vec<String> },

    /// A minimal REPL re-dispatching `search`/`files` lines
    Interactive { projects: String },

    /// List every registered project name
    Projects,

    /// Print the version string
    Version,

    /// Print usage
    Help,
}

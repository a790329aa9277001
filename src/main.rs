//! # Curriculum CLI (`curriculum`)
//!
//! Starts the HTTP server and offers the same lookups from the command line.
//!
//! ## Usage
//!
//! ```bash
//! curriculum [--config ./config/curriculum.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `curriculum serve` | Start the HTTP server |
//! | `curriculum grades` | List grades present in the bucket |
//! | `curriculum structure <grade>` | Print the term/subject tree of a grade |
//! | `curriculum concepts <grade> <term> <subject>` | Print a subject's concepts |
//! | `curriculum concept <grade> <term> <subject> <name>` | Print one concept |
//! | `curriculum search "<query>" --grade <grade>` | Substring search |
//! | `curriculum map-grade <value>` | Print the bucket code for an informal grade |
//!
//! ## Examples
//!
//! ```bash
//! # Serve on a different port, reading credentials from the environment
//! CURRICULUM_BIND=0.0.0.0:9000 curriculum serve
//!
//! # What does grade "10" map to?
//! curriculum map-grade 10
//!
//! # Concepts for P5 Term1 Mathematics as API JSON
//! curriculum concepts 5 Term1 Mathematics --json
//!
//! # Search the whole of grade 6
//! curriculum search "energy" --grade 6 --limit 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use curriculum_content::{commands, config, server};

/// Curriculum content service.
///
/// Configuration is optional: without `--config`, built-in defaults apply and
/// `GCS_BUCKET_NAME`, `GOOGLE_APPLICATION_CREDENTIALS`, and `CURRICULUM_BIND`
/// are read from the environment (or a `.env` file).
#[derive(Parser)]
#[command(
    name = "curriculum",
    about = "Curriculum content service: grade/term/subject concepts from GCS with local fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the API's JSON body instead of a text summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` (or `CURRICULUM_BIND`) and serves the
    /// curriculum and search endpoints until interrupted.
    Serve,

    /// List grades present in the bucket.
    ///
    /// Falls back to the grades with bundled fallback files when the bucket
    /// cannot be listed.
    Grades,

    /// Print the term/subject tree of a grade.
    Structure {
        /// Grade code or informal value (`P5`, `5`, `kg1`).
        grade: String,
    },

    /// Print the concepts of one subject.
    Concepts {
        grade: String,
        /// `Term1`, `Term2`, or `1`/`2`.
        term: String,
        subject: String,
    },

    /// Print a single concept, matched by name ignoring case.
    Concept {
        grade: String,
        term: String,
        subject: String,
        name: String,
    },

    /// Substring search over a grade's concepts.
    Search {
        /// Text to look for in names, descriptions, and examples.
        query: String,

        /// Grade to search in.
        #[arg(long)]
        grade: String,

        /// Restrict to one term.
        #[arg(long)]
        term: Option<String>,

        /// Restrict to one subject.
        #[arg(long)]
        subject: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the bucket grade code for an informal grade value.
    MapGrade { value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Needs no configuration or network
    if let Commands::MapGrade { value } = &cli.command {
        return commands::run_map_grade(value);
    }

    let cfg = config::load_config(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Grades => {
            commands::run_grades(&cfg, json).await?;
        }
        Commands::Structure { grade } => {
            commands::run_structure(&cfg, &grade, json).await?;
        }
        Commands::Concepts {
            grade,
            term,
            subject,
        } => {
            commands::run_concepts(&cfg, &grade, &term, &subject, json).await?;
        }
        Commands::Concept {
            grade,
            term,
            subject,
            name,
        } => {
            commands::run_concept(&cfg, &grade, &term, &subject, &name, json).await?;
        }
        Commands::Search {
            query,
            grade,
            term,
            subject,
            limit,
        } => {
            commands::run_search(&cfg, &query, &grade, term.as_deref(), subject, limit, json)
                .await?;
        }
        Commands::MapGrade { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}

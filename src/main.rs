//! # Philosophy RAG CLI (`philo`)
//!
//! Socratic dialogue over philosophy schools, grounded in each school's own
//! documents.
//!
//! ## Usage
//!
//! ```bash
//! philo --config ./config/philo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `philo init` | Create the SQLite database and schema |
//! | `philo build [--school <id>]` | Chunk, embed and store school indexes |
//! | `philo status` | Show which schools have an index |
//! | `philo ask "<question>" --school <id>` | Answer one question |
//! | `philo eval --builtin` | Run the evaluation harness |
//! | `philo serve` | Start the HTTP chat server |
//! | `philo completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! philo init
//! philo build --school stoicism
//! philo ask "Làm thế nào để kiểm soát cảm xúc?" --school stoicism
//! philo ask "Hư vô chủ nghĩa là gì?" --school nihilism --mode direct --json
//! philo eval --scenarios ./config/scenarios.toml --out ./reports
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use philosophy_rag::progress::ProgressMode;
use philosophy_rag::{app, ask, build, config, eval, migrate, server, status};
use philosophy_rag_core::models::ResponseMode;

/// Philosophy RAG: grounded, scope-checked Socratic dialogue.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/philo.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "philo",
    about = "Socratic dialogue over philosophy schools, grounded in their texts",
    version,
    long_about = "Answers questions about philosophical schools (stoicism, nihilism, \
    existentialism, ...) from each school's own documents. Questions outside a school's \
    knowledge are refused, answers cite the passages they draw on, and an evaluation \
    harness scores both."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/philo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it again leaves stored indexes untouched.
    Init,

    /// Build school indexes from their data directories.
    ///
    /// Reuses a stored index when the school's documents and embedding
    /// model are unchanged, unless `--full` is given.
    Build {
        /// Build only this school.
        #[arg(long)]
        school: Option<String>,

        /// Re-embed even if the corpus is unchanged.
        #[arg(long)]
        full: bool,

        /// Progress output on stderr: human, json or off.
        /// Defaults to human on a TTY, off otherwise.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Show stored indexes for every configured school.
    Status,

    /// Ask one question of one school.
    Ask {
        /// The question.
        question: String,

        /// School id (see `philo status`).
        #[arg(long)]
        school: String,

        /// Response style: socratic or direct.
        #[arg(long, default_value = "socratic")]
        mode: ResponseMode,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run labeled scenarios through the engine and report quality metrics.
    Eval {
        /// Scenario file (.json or .toml) mapping ids to scenarios.
        #[arg(long)]
        scenarios: Option<PathBuf>,

        /// Use the evaluation questions from the config instead of a file.
        #[arg(long)]
        builtin: bool,

        /// Directory for the JSON report.
        #[arg(long, default_value = "./reports")]
        out: PathBuf,

        /// Scenarios in flight at once (overrides `[evaluation].concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Response style (overrides `[evaluation].mode`).
        #[arg(long)]
        mode: Option<ResponseMode>,
    },

    /// Start the HTTP chat server on `[server].bind`.
    Serve,

    /// Print shell completion script to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    app::init_tracing();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "philo", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Build {
            school,
            full,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            build::run_build(&cfg, school.as_deref(), full, progress).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Ask {
            question,
            school,
            mode,
            json,
        } => {
            ask::run_ask(&cfg, &question, &school, mode, json).await?;
        }
        Commands::Eval {
            scenarios,
            builtin,
            out,
            concurrency,
            mode,
        } => {
            eval::run_eval(&cfg, scenarios.as_deref(), builtin, &out, concurrency, mode).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

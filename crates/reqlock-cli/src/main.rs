mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    MarkerArgs, SourceArgs, EXIT_CONFLICT, EXIT_FAILURE, EXIT_LOCK_ERROR, EXIT_MANIFEST_ERROR,
};
use reqlock_core::{Engine, LockOptions};
use reqlock_schema::Category;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "reqlock",
    version,
    about = "Reconcile resolver output with a Python project's lock file"
)]
struct Cli {
    /// Path to the project manifest.
    #[arg(long, default_value = "Pipfile", global = true)]
    manifest: PathBuf,

    /// Path to the lock file. Defaults to Pipfile.lock next to the manifest.
    #[arg(long, global = true)]
    lock_file: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile resolver results into the lock file.
    Lock {
        /// Resolver results as JSON, or `-` for stdin.
        #[arg(long, default_value = "-")]
        results: PathBuf,
        /// Category to lock: packages, dev-packages, or a custom group.
        #[arg(long, default_value = "packages")]
        category: String,
        /// Extra PEP 508 constraint to check every locked version against.
        #[arg(long = "constraint")]
        constraints: Vec<String>,
        /// Require an existing lock file and fail if it would change.
        #[arg(long, default_value_t = false)]
        locked: bool,
        /// Reconcile and report without writing the lock file.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        markers: MarkerArgs,
    },
    /// Show the requirement trees of the installed packages.
    Graph {
        /// Show only the tree rooted at this package.
        package: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        markers: MarkerArgs,
    },
    /// Show which installed packages require each package.
    ReverseDeps {
        /// Show only this package's parents.
        package: Option<String>,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        markers: MarkerArgs,
    },
    /// Check the lock file against the manifest.
    Check,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
        /// Write the script to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("dependency conflict:") {
        EXIT_CONFLICT
    } else if msg.starts_with("manifest error:") {
        EXIT_MANIFEST_ERROR
    } else if msg.starts_with("lock error:") {
        EXIT_LOCK_ERROR
    } else {
        EXIT_FAILURE
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("REQLOCK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let engine = match cli.lock_file {
        Some(lock_file) => Engine::new(&cli.manifest, lock_file),
        None => Engine::for_manifest(&cli.manifest),
    };
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Lock {
            results,
            category,
            constraints,
            locked,
            dry_run,
            source,
            markers,
        } => {
            let source = source.source();
            commands::lock::run(
                &engine,
                commands::lock::LockArgs {
                    results: &results,
                    source: source.as_deref(),
                    options: LockOptions {
                        category: Category::from_user_input(&category),
                        overrides: markers.overrides(),
                        constraints,
                        locked,
                        dry_run,
                    },
                },
                json_output,
            )
        }
        Commands::Graph {
            package,
            source,
            markers,
        } => source.require_source().and_then(|s| {
            commands::graph::run(
                &engine,
                s.as_ref(),
                &markers.overrides(),
                package.as_deref(),
                json_output,
            )
        }),
        Commands::ReverseDeps {
            package,
            source,
            markers,
        } => source.require_source().and_then(|s| {
            commands::reverse_deps::run(
                &engine,
                s.as_ref(),
                &markers.overrides(),
                package.as_deref(),
                json_output,
            )
        }),
        Commands::Check => commands::check::run(&engine, json_output),
        Commands::Completions { shell, output } => {
            commands::completions::run::<Cli>(shell, output.as_deref())
        }
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

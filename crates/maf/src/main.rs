use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use maf::{RunConfig, SqliteSource, SynthConfig, init_logging, summary_table, write_results};
use maf_core::{Runner, required_columns};

#[derive(Parser, Debug)]
#[command(name = "maf")]
#[command(about = "Evaluate metrics over survey simulation output")]
struct Args {
    /// Directory for result files and the log
    #[arg(short, long, default_value = "maf_output", global = true)]
    out_dir: PathBuf,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Only log to the log file
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every bundle of a configuration and write the results
    Run {
        config: PathBuf,
        /// Database to read, overriding the configuration
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
    /// Print the source columns a configuration needs
    Columns {
        config: PathBuf,
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
    /// Write a synthetic survey database
    Synth {
        database: PathBuf,
        #[arg(long, default_value_t = 30)]
        nights: u32,
        #[arg(long, default_value_t = 200)]
        visits_per_night: usize,
        #[arg(long, default_value_t = 500)]
        fields: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value = "Summary")]
        table: String,
    },
}

fn open_source(config: &RunConfig, database: Option<PathBuf>) -> color_eyre::Result<SqliteSource> {
    let path = database
        .or_else(|| config.database.clone())
        .ok_or_else(|| eyre!("no database given on the command line or in the config"))?;
    let source = SqliteSource::open(&path, &config.table)
        .wrap_err_with(|| format!("opening {}", path.display()))?;
    Ok(source.with_time_columns(config.time_columns.iter().cloned()))
}

fn run(config_path: &Path, database: Option<PathBuf>, out_dir: &Path) -> color_eyre::Result<()> {
    let config = RunConfig::load(config_path)?;
    let source = open_source(&config, database)?;
    let available = config
        .declared_columns()
        .unwrap_or_else(|| source.columns());

    let mut bundles = config.build_bundles(&available)?;
    tracing::info!(
        run = %config.run_name,
        bundles = bundles.len(),
        "configuration loaded"
    );

    let report = Runner::new(&source).run(&mut bundles);
    write_results(out_dir, &config.run_name, &bundles, &report)?;
    print!("{}", summary_table(&bundles));

    if report.is_success() {
        Ok(())
    } else {
        let failed: usize = report.failures.iter().map(|f| f.bundles.len()).sum();
        Err(eyre!(
            "{failed} of {} bundles failed; see {}",
            bundles.len(),
            out_dir.join(maf::logging::LOG_FILE).display()
        ))
    }
}

fn columns(config_path: &Path, database: Option<PathBuf>) -> color_eyre::Result<()> {
    let config = RunConfig::load(config_path)?;
    let available = match config.declared_columns() {
        Some(columns) => columns,
        None => open_source(&config, database)?.columns(),
    };
    let bundles = config.build_bundles(&available)?;
    for column in required_columns(&bundles).iter() {
        println!("{column}");
    }
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    init_logging(&args.out_dir, &args.log_level, args.quiet)?;

    match args.command {
        Command::Run { config, database } => run(&config, database, &args.out_dir),
        Command::Columns { config, database } => columns(&config, database),
        Command::Synth {
            database,
            nights,
            visits_per_night,
            fields,
            seed,
            table,
        } => {
            let config = SynthConfig {
                nights,
                visits_per_night,
                num_fields: fields,
                seed,
                table,
            };
            let visits = maf::write_survey(&database, &config)?;
            println!("wrote {visits} visits to {}", database.display());
            Ok(())
        }
    }
}

//! rowcopy CLI - copy a referentially complete subset of rows between databases.

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rowcopy::{Copier, CopyError, CopyOptions, CopyReport, ParamFile, SchemaCacheMode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rowcopy")]
#[command(about = "Copy rows and everything they reference between relational databases")]
#[command(version)]
#[command(args_override_self = true)]
struct Cli {
    /// Read arguments and the seed query from a parameter file
    #[arg(short = 'p', long)]
    param_file: Option<PathBuf>,

    /// Source connection URL (sqlite:, postgres://, mysql://, mariadb://)
    #[arg(short = 's', long)]
    source_connection: Option<String>,

    /// Source user, overrides the URL
    #[arg(long)]
    source_user: Option<String>,

    /// Source password, overrides the URL
    #[arg(long)]
    source_password: Option<String>,

    /// Target connection URL, or file:<path> to write a SQL script
    #[arg(short = 't', long)]
    target_connection: Option<String>,

    /// Target user, overrides the URL
    #[arg(long)]
    target_user: Option<String>,

    /// Target password, overrides the URL
    #[arg(long)]
    target_password: Option<String>,

    /// Log verbosity: 0 = warnings, 1 = progress, 2 = details, 3 = SQL
    #[arg(short = 'v', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    verbose: u8,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Rows per relationship query and insert batch
    #[arg(long, default_value_t = 500)]
    chunk_size: usize,

    /// Prepare statements without writing anything
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// Comma separated tables the copy never enters
    #[arg(long, value_delimiter = ',')]
    skip_tables: Vec<String>,

    /// Drop source columns missing from the target instead of failing
    #[arg(long)]
    skip_missing_columns: bool,

    /// Update rows that already exist in the target
    #[arg(long = "update")]
    allow_update: bool,

    /// Print the tables reachable from each seed query and exit
    #[arg(long)]
    show_copy_tree: bool,

    /// Skip rows whose key already exists in the target
    #[arg(long)]
    ignore_existing: bool,

    /// Schema cache mode: none, use or clear
    #[arg(long, default_value = "none")]
    schema_cache: SchemaCacheMode,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    dump_configuration: bool,

    /// Output the copy report as JSON to stdout
    #[arg(long)]
    output_json: bool,

    /// Seed query, e.g. SELECT * FROM orders WHERE id = 42
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    query: Vec<String>,
}

impl Cli {
    /// Effective options. A query on the command line replaces the file's query.
    fn into_options(self, file_query: Option<String>) -> CopyOptions {
        let query = self.query.join(" ").trim().to_string();
        let query = if query.is_empty() {
            file_query.unwrap_or_default()
        } else {
            query
        };

        CopyOptions {
            source_connection: self.source_connection,
            source_user: self.source_user,
            source_password: self.source_password,
            target_connection: self.target_connection,
            target_user: self.target_user,
            target_password: self.target_password,
            chunk_size: self.chunk_size,
            dry_run: self.dry_run,
            verbosity: self.verbose,
            skip_tables: self.skip_tables,
            skip_missing_columns: self.skip_missing_columns,
            allow_update: self.allow_update,
            show_copy_tree: self.show_copy_tree,
            ignore_existing: self.ignore_existing,
            schema_cache: self.schema_cache,
            query,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();

    // Parameter file tokens go first so the real command line wins
    let (cli, file_query) = match &cli.param_file {
        Some(path) => {
            let file = ParamFile::load(path)?;
            let args: Vec<OsString> = std::env::args_os()
                .take(1)
                .chain(file.args.iter().map(OsString::from))
                .chain(std::env::args_os().skip(1))
                .collect();
            (Cli::parse_from(args), file.query_text())
        }
        None => (cli, None),
    };

    let output_json = cli.output_json;
    let dump_configuration = cli.dump_configuration;
    let log_format = cli.log_format.clone();
    let options = cli.into_options(file_query);

    if dump_configuration {
        print!("{}", options.to_masked_yaml()?);
        return Ok(());
    }

    setup_logging(options.verbosity, &log_format)?;
    options.validate()?;
    info!("Effective configuration: {:?}", options);

    let report = Copier::new(options.clone()).run().await?;
    print_report(&options, &report, output_json)?;
    Ok(())
}

fn print_report(
    options: &CopyOptions,
    report: &CopyReport,
    output_json: bool,
) -> Result<(), CopyError> {
    if let Some(tree) = &report.copy_tree {
        println!("{}", tree);
    }

    if output_json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    if options.schema_cache == SchemaCacheMode::Clear {
        if report.cleared_caches.is_empty() {
            eprintln!("No schema cache to clear");
        }
        for url in &report.cleared_caches {
            eprintln!("Cleared schema cache for {}", url);
        }
    } else if report.copy_tree.is_none() {
        let status = if report.dry_run { "Dry run completed" } else { "Copy completed" };
        eprintln!(
            "{}: {} rows written, {} retrieved, {} duplicates skipped in {:.2}s",
            status,
            report.rows_written,
            report.rows_retrieved,
            report.duplicates_skipped,
            report.duration_seconds
        );
    }
    Ok(())
}

fn report_error(e: &CopyError) {
    if e.is_expected() {
        eprintln!("{}", highlight(&e.to_string(), std::io::stderr().is_terminal()));
    } else {
        eprintln!("{}", e.format_detailed());
    }
}

/// Wrap `text` in red for terminal output.
fn highlight(text: &str, color: bool) -> String {
    if color {
        format!("\x1b[31m{}\x1b[0m", text)
    } else {
        text.to_string()
    }
}

fn setup_logging(verbosity: u8, format: &str) -> Result<(), CopyError> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // sqlx logs every statement on its own; keep it quiet unless asked
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", level)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => {
            return Err(CopyError::Config(format!(
                "unknown log format '{}', expected text or json",
                other
            )))
        }
    }

    Ok(())
}

//! Binary entry point for the `dg` temporal graph tool.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use dyngraph::cli::{
    batch_reports, coarsen_to_csv, stats_report, BatchReport, CliError, CoarsenReport, StatsReport,
};
use dyngraph::io::CsvOptions;
use dyngraph::{
    AggFunc, BackendKind, DgLoader, GraphConfig, GraphView, LoaderOptions, TimeDelta, TimeUnit,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::CliConfig;
use ui::{format_duration, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "dg",
    version,
    about = "Inspect, batch and coarsen temporal graph edge lists",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "DG_CONFIG",
        help = "Config file (defaults to the user config dir)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(long, global = true, value_enum, help = "Color theme for text output")]
    theme: Option<ThemeArg>,

    #[arg(long, global = true, help = "Plain, undecorated text output")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GraphArgs {
    #[arg(value_name = "CSV")]
    csv: PathBuf,

    #[arg(long, help = "Source node column name")]
    src_col: Option<String>,

    #[arg(long, help = "Destination node column name")]
    dst_col: Option<String>,

    #[arg(long, help = "Timestamp column name")]
    time_col: Option<String>,

    #[arg(
        long,
        value_name = "col1,col2",
        help = "Edge feature columns, one per dimension"
    )]
    feature_cols: Option<String>,

    #[arg(
        long,
        value_name = "UNIT",
        help = "Timestamp unit (Y, M, W, D, h, m, s, ms, us, ns or r)"
    )]
    time_unit: Option<String>,

    #[arg(long, value_name = "NAME", help = "Storage backend (bucket or list)")]
    backend: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Print graph statistics")]
    Stats(GraphArgs),
    #[command(about = "Iterate the graph in fixed windows")]
    Batches {
        #[command(flatten)]
        graph: GraphArgs,
        #[arg(long, help = "Events (ordered) or units (physical) per batch")]
        batch_size: Option<usize>,
        #[arg(long, value_name = "UNIT", help = "Unit of the batch size")]
        batch_unit: Option<String>,
        #[arg(long, help = "Drop a short trailing batch")]
        drop_last: bool,
        #[arg(long, help = "Skip feature materialization")]
        no_features: bool,
    },
    #[command(about = "Re-bucket timestamps into a coarser unit and write a new edge list")]
    Coarsen {
        #[command(flatten)]
        graph: GraphArgs,
        #[arg(long = "to", value_name = "UNIT", help = "Target time unit")]
        to: String,
        #[arg(long, default_value_t = 1, help = "Multiple of the target unit")]
        to_value: u64,
        #[arg(long, default_value = "sum", help = "Feature aggregation (sum, mean, max, min, last)")]
        agg: String,
        #[arg(long, value_name = "FILE", help = "Output CSV path")]
        out: PathBuf,
    },
    #[command(about = "Print shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
    Plain,
}

impl From<ThemeArg> for Theme {
    fn from(theme: ThemeArg) -> Self {
        match theme {
            ThemeArg::Auto => Theme::Auto,
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Plain => Theme::Plain,
        }
    }
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    if let Some(path) = config.path() {
        debug!(path = %path.display(), "cli.config.resolved");
    }
    let theme = match cli.theme {
        Some(theme) => theme.into(),
        None => config.theme()?,
    };
    let ui = Ui::new(theme, cli.quiet);

    match cli.command {
        Command::Stats(args) => {
            let (view, elapsed) = load_view(&args, &config, &ui)?;
            let report = stats_report(&view);
            emit(cli.format, &report, || print_stats_text(&ui, &report, elapsed))?;
        }
        Command::Batches {
            graph,
            batch_size,
            batch_unit,
            drop_last,
            no_features,
        } => {
            let (view, _) = load_view(&graph, &config, &ui)?;
            let options = build_loader_options(&config, batch_size, batch_unit, drop_last)?
                .materialize_features(!no_features);
            let loader = DgLoader::new(view, options)?;
            let reports = batch_reports(loader)?;
            emit(cli.format, &reports, || print_batches_text(&ui, &reports))?;
        }
        Command::Coarsen {
            graph,
            to,
            to_value,
            agg,
            out,
        } => {
            let (view, _) = load_view(&graph, &config, &ui)?;
            let target = TimeDelta::parse(&to, to_value)?;
            let agg: AggFunc = agg.parse()?;
            let csv = build_csv_options(&graph, &config);
            let report = coarsen_to_csv(&view, target, agg, &out, &csv)?;
            emit(cli.format, &report, || print_coarsen_text(&ui, &report))?;
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "dg", &mut io::stdout());
        }
    }
    Ok(())
}

fn load_view(
    args: &GraphArgs,
    config: &CliConfig,
    ui: &Ui,
) -> Result<(GraphView, Duration), CliError> {
    let csv = build_csv_options(args, config);
    let graph = build_graph_config(args, config)?;
    let task = ui.task(format!("loading {}", args.csv.display()));
    let view = GraphView::from_csv(&args.csv, &csv, graph)?;
    Ok((view, task.finish()))
}

fn build_csv_options(args: &GraphArgs, config: &CliConfig) -> CsvOptions {
    let section = config.csv();
    let defaults = CsvOptions::default();
    let feature_cols = args
        .feature_cols
        .as_deref()
        .map(|raw| split_list(raw, ','))
        .or_else(|| section.feature_cols.clone());
    CsvOptions {
        src_col: pick(&args.src_col, &section.src_col, defaults.src_col),
        dst_col: pick(&args.dst_col, &section.dst_col, defaults.dst_col),
        time_col: pick(&args.time_col, &section.time_col, defaults.time_col),
        edge_feature_cols: feature_cols,
    }
}

fn build_graph_config(args: &GraphArgs, config: &CliConfig) -> Result<GraphConfig, CliError> {
    let section = config.graph();
    let unit = pick(&args.time_unit, &section.time_unit, TimeUnit::Ordered.symbol().to_string());
    let time_delta = TimeDelta::parse(&unit, 1)?;
    let backend: BackendKind = match args.backend.as_ref().or(section.backend.as_ref()) {
        Some(name) => name.parse()?,
        None => BackendKind::default(),
    };
    Ok(GraphConfig::new().time_delta(time_delta).backend(backend))
}

fn build_loader_options(
    config: &CliConfig,
    batch_size: Option<usize>,
    batch_unit: Option<String>,
    drop_last: bool,
) -> Result<LoaderOptions, CliError> {
    let section = config.loader();
    let defaults = LoaderOptions::default();
    let unit = match batch_unit.as_ref().or(section.batch_unit.as_ref()) {
        Some(raw) => raw.parse::<TimeUnit>()?,
        None => defaults.batch_unit,
    };
    Ok(LoaderOptions::new(batch_size.or(section.batch_size).unwrap_or(defaults.batch_size))
        .batch_unit(unit)
        .drop_last(drop_last || section.drop_last.unwrap_or(defaults.drop_last)))
}

fn pick(flag: &Option<String>, file: &Option<String>, fallback: String) -> String {
    flag.clone().or_else(|| file.clone()).unwrap_or(fallback)
}

fn split_list(input: &str, delim: char) -> Vec<String> {
    input
        .split(delim)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), CliError>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn display_shape(shape: &Option<Vec<usize>>) -> String {
    shape.as_ref().map_or_else(|| "-".to_string(), |s| format!("{s:?}"))
}

fn print_stats_text(ui: &Ui, report: &StatsReport, elapsed: Duration) {
    ui.section(
        "Graph",
        [
            ("backend", report.backend.clone()),
            ("time delta", report.time_delta.clone()),
            ("start time", display_opt(report.start_time)),
            ("end time", display_opt(report.end_time)),
            ("granularity", display_opt(report.time_granularity)),
            ("load time", format_duration(elapsed)),
        ],
    );
    ui.section(
        "Counts",
        [
            ("nodes", report.num_nodes),
            ("edges", report.num_edges),
            ("events", report.num_events),
            ("timestamps", report.num_timestamps),
        ],
    );
    ui.section(
        "Features",
        [
            ("node", display_shape(&report.node_feats_shape)),
            ("edge", display_shape(&report.edge_feats_shape)),
            ("static", display_opt(report.static_node_feats_dim)),
        ],
    );
}

fn print_batches_text(ui: &Ui, reports: &[BatchReport]) {
    if reports.is_empty() {
        ui.warn("no batches produced");
        return;
    }
    ui.list(
        "Batches",
        reports.iter().map(|r| {
            format!(
                "#{} edges={} first={} last={}",
                r.index,
                r.edges,
                display_opt(r.first_time),
                display_opt(r.last_time)
            )
        }),
    );
}

fn print_coarsen_text(ui: &Ui, report: &CoarsenReport) {
    ui.success(&format!(
        "Coarsened {} events into {} at {} ({}) -> {}",
        report.source_events, report.coarse_events, report.time_delta, report.agg, report.out
    ));
}

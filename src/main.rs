// Entry point and high-level CLI flow.
//
// Every subcommand builds a fresh `Session` from the input files, so a run is
// one blocking pass: load, map, evaluate, then print or write the outputs.
use anyhow::{Context, Result};
use backoffice_diag::config::{
    Dimension, Filters, Thresholds, LONG_RUNNING_RANGE, LOOKBACK_RANGE, RISK_WINDOW_RANGE, SLA_RANGE,
    STALE_RANGE,
};
use backoffice_diag::loader::load_table;
use backoffice_diag::mapping::{propose_mapping, MappingProposal, Preset};
use backoffice_diag::normalize::normalize_headers;
use backoffice_diag::schema::DatasetKind;
use backoffice_diag::session::Session;
use backoffice_diag::types::Table;
use backoffice_diag::{output, reports, util};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "backoffice-diag")]
#[command(about = "Deadline and SLA diagnostics for back-office spreadsheet exports", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the proposed column mapping for one file
    Map {
        #[arg(long)]
        kind: DatasetKind,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        preset: Option<PathBuf>,
        #[arg(long)]
        interactive: bool,
        /// Store the confirmed mapping into this preset file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Print the dashboard for the loaded files
    Summary {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Write the Markdown analytical summary
    Report {
        #[command(flatten)]
        inputs: Inputs,
        #[command(flatten)]
        thresholds: ThresholdArgs,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write processed CSVs for every loaded dataset
    Export {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct Inputs {
    #[arg(long)]
    deliveries: Option<PathBuf>,
    #[arg(long)]
    requests: Option<PathBuf>,
    #[arg(long)]
    obligations: Option<PathBuf>,
    #[arg(long)]
    processes: Option<PathBuf>,
    #[arg(long)]
    responsibles: Option<PathBuf>,
    /// JSON preset with saved mappings and thresholds.
    #[arg(long)]
    preset: Option<PathBuf>,
    /// Confirm every mapping field on stdin.
    #[arg(long)]
    interactive: bool,
    /// Reference date (YYYY-MM-DD); defaults to the current UTC date.
    #[arg(long, value_parser = parse_today)]
    today: Option<NaiveDate>,
}

impl Inputs {
    fn files(&self) -> Vec<(DatasetKind, &Path)> {
        [
            (DatasetKind::Delivery, &self.deliveries),
            (DatasetKind::Request, &self.requests),
            (DatasetKind::Obligation, &self.obligations),
            (DatasetKind::Process, &self.processes),
            (DatasetKind::Responsible, &self.responsibles),
        ]
        .into_iter()
        .filter_map(|(kind, p)| p.as_deref().map(|p| (kind, p)))
        .collect()
    }
}

#[derive(Args, Debug)]
struct ThresholdArgs {
    #[arg(long, value_parser = clap::value_parser!(i64).range(RISK_WINDOW_RANGE.0..=RISK_WINDOW_RANGE.1))]
    risk_window_days: Option<i64>,
    #[arg(long, value_parser = clap::value_parser!(i64).range(LOOKBACK_RANGE.0..=LOOKBACK_RANGE.1))]
    lookback_days: Option<i64>,
    #[arg(long, value_parser = clap::value_parser!(i64).range(SLA_RANGE.0..=SLA_RANGE.1))]
    sla_days: Option<i64>,
    #[arg(long, value_parser = clap::value_parser!(i64).range(STALE_RANGE.0..=STALE_RANGE.1))]
    stale_high_priority_days: Option<i64>,
    #[arg(long, value_parser = clap::value_parser!(i64).range(LONG_RUNNING_RANGE.0..=LONG_RUNNING_RANGE.1))]
    long_running_days: Option<i64>,
}

impl ThresholdArgs {
    /// Flags win over `base` (the preset's thresholds or the defaults).
    fn resolve(&self, base: Thresholds) -> Thresholds {
        Thresholds {
            risk_window_days: self.risk_window_days.unwrap_or(base.risk_window_days),
            lookback_days: self.lookback_days.unwrap_or(base.lookback_days),
            sla_days: self.sla_days.unwrap_or(base.sla_days),
            stale_high_priority_days: self
                .stale_high_priority_days
                .unwrap_or(base.stale_high_priority_days),
            long_running_days: self.long_running_days.unwrap_or(base.long_running_days),
        }
    }
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Repeatable.
    #[arg(long = "company")]
    companies: Vec<String>,
    #[arg(long = "department")]
    departments: Vec<String>,
    #[arg(long = "owner")]
    owners: Vec<String>,
}

fn parse_today(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Read one trimmed line after printing `prompt`.
fn read_choice(prompt: &str) -> String {
    print!("{prompt}");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Walk every field of the proposal on stdin. Enter keeps the current
/// choice, `0` ignores the field, a number picks that header.
fn confirm_interactively(proposal: &mut MappingProposal) {
    println!("\nColumns in the {} file:", proposal.kind);
    for (i, h) in proposal.headers.iter().enumerate() {
        println!("  [{}] {}", i + 1, h);
    }
    println!("  [0] <ignore>\n");

    let fields: Vec<(&'static str, &'static str, Option<String>)> = proposal
        .choices
        .iter()
        .map(|c| (c.field.name, c.field.label, c.source.clone()))
        .collect();
    for (name, label, current) in fields {
        loop {
            let shown = current.as_deref().unwrap_or("<ignore>");
            let answer = read_choice(&format!("{label} [{shown}]: "));
            let source = match answer.as_str() {
                "" => break,
                "0" => None,
                n => match n.parse::<usize>().ok().and_then(|i| proposal.headers.get(i.wrapping_sub(1))) {
                    Some(h) => Some(h.clone()),
                    None => {
                        println!("Invalid choice. Enter a column number, 0 to ignore, or Enter to keep.");
                        continue;
                    }
                },
            };
            if let Err(e) = proposal.set(name, source) {
                println!("{e}");
                continue;
            }
            break;
        }
    }
}

fn load_preset(path: Option<&Path>) -> Result<Option<Preset>> {
    path.map(|p| Preset::load(p).with_context(|| format!("loading preset {}", p.display())))
        .transpose()
}

/// Load one file and build its mapping proposal with preset overrides
/// applied.
fn propose_for(
    kind: DatasetKind,
    path: &Path,
    preset: Option<&Preset>,
    interactive: bool,
) -> Result<(Table, MappingProposal)> {
    let table = load_table(path).with_context(|| format!("loading {kind} file"))?;
    let table = normalize_headers(table);
    let mut proposal = propose_mapping(&table.headers, kind);
    if let Some(entries) = preset.and_then(|p| p.mapping_for(kind)) {
        proposal
            .apply_preset(entries)
            .with_context(|| format!("applying preset mapping for {kind}"))?;
    }
    if interactive {
        confirm_interactively(&mut proposal);
    }
    Ok((table, proposal))
}

fn build_session(inputs: &Inputs, preset: Option<&Preset>) -> Result<Session> {
    let today = inputs.today.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let mut session = Session::new(today);
    for (kind, path) in inputs.files() {
        // A file that cannot be read leaves its slot empty; the rest still load.
        let (table, proposal) = match propose_for(kind, path, preset, inputs.interactive) {
            Ok(v) => v,
            Err(e) => {
                warn!(kind = %kind, error = %e, "dataset skipped");
                eprintln!("Skipping {}: {:#}", kind.title(), e);
                continue;
            }
        };
        session
            .ingest(kind, table, proposal.confirm())
            .with_context(|| format!("ingesting {kind}"))?;
    }
    Ok(session)
}

fn run_map(
    kind: DatasetKind,
    file: &Path,
    preset: Option<&Path>,
    interactive: bool,
    save: Option<&Path>,
) -> Result<()> {
    let loaded = load_preset(preset)?;
    let (table, proposal) = propose_for(kind, file, loaded.as_ref(), interactive)?;
    println!(
        "{}: {} rows, {} columns",
        file.display(),
        util::format_int(table.len()),
        table.headers.len()
    );
    output::preview_table(&format!("{} mapping", kind.title()), None, &proposal.rows(), usize::MAX);

    if let Some(save) = save {
        let mut target = Preset::load_or_default(save)
            .with_context(|| format!("reading existing preset {}", save.display()))?;
        target.store(&proposal.confirm());
        output::write_json(save, &target).context("saving preset")?;
        println!("Mapping saved to {}", save.display());
    }
    Ok(())
}

fn run_summary(inputs: &Inputs) -> Result<()> {
    let preset = load_preset(inputs.preset.as_deref())?;
    let session = build_session(inputs, preset.as_ref())?;
    let dash = reports::dashboard(&session);

    println!("Reference date: {}", session.today().format("%Y-%m-%d"));
    output::preview_table("Indicators", None, &dash.kpis, usize::MAX);
    if session.deliveries().is_some() {
        output::preview_table("Critical deliveries", None, &dash.critical_deliveries, 20);
        output::preview_table(
            "Top late companies",
            Some(&format!("last {} days", Thresholds::default().lookback_days)),
            &dash.top_late_companies,
            usize::MAX,
        );
    }
    if session.requests().is_some() {
        output::preview_table("Critical requests", None, &dash.critical_requests, 20);
    }
    if session.processes().is_some() {
        output::preview_table("Long-running processes", None, &dash.long_running, 20);
    }
    if session.is_loaded(DatasetKind::Obligation) {
        output::preview_table("Obligations by department", None, &dash.breakdown, 50);
    }
    Ok(())
}

fn run_report(inputs: &Inputs, thresholds: &ThresholdArgs, filters: &FilterArgs, out: &Path) -> Result<()> {
    let preset = load_preset(inputs.preset.as_deref())?;
    let base = preset.as_ref().and_then(|p| p.thresholds).unwrap_or_default();
    let thresholds = thresholds.resolve(base);
    thresholds.validate()?;

    let session = build_session(inputs, preset.as_ref())?;
    let filters = Filters::from_lists(
        filters.companies.clone(),
        filters.departments.clone(),
        filters.owners.clone(),
    );
    for (dim, selection) in [
        (Dimension::Company, &filters.companies),
        (Dimension::Department, &filters.departments),
        (Dimension::Owner, &filters.owners),
    ] {
        let Some(selection) = selection else { continue };
        let known = session.filter_options(dim);
        for value in selection.iter().filter(|v| !known.contains(*v)) {
            warn!(dimension = ?dim, value = %value, "filter value not present in any dataset");
        }
    }

    let report = reports::compose(&session, &thresholds, &filters, session.today())?;
    let markdown = report.to_markdown();
    std::fs::write(out, &markdown).with_context(|| format!("writing {}", out.display()))?;
    println!("{markdown}");
    println!("Report written to {}", out.display());
    Ok(())
}

fn run_export(inputs: &Inputs, out_dir: &Path) -> Result<()> {
    let preset = load_preset(inputs.preset.as_deref())?;
    let session = build_session(inputs, preset.as_ref())?;
    if session.loaded_kinds().next().is_none() {
        anyhow::bail!("no dataset loaded, nothing to export");
    }
    let written = output::export_all(&session, out_dir)?;
    for path in written {
        println!("(exported to {})", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match &cli.command {
        Commands::Map { kind, file, preset, interactive, save } => {
            run_map(*kind, file, preset.as_deref(), *interactive, save.as_deref())
        }
        Commands::Summary { inputs } => run_summary(inputs),
        Commands::Report { inputs, thresholds, filters, out } => run_report(inputs, thresholds, filters, out),
        Commands::Export { inputs, out_dir } => run_export(inputs, out_dir),
    }
}

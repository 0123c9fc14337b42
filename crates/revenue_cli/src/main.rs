//! Hotel revenue CLI
//!
//! In-process host for the revenue core: KPI summaries over the configured
//! dataset, single-booking revenue predictions, and model/layout inspection.
//! Results are written to stdout as JSON; logs go to stderr.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use hotel_revenue_core::{
    BookingRecord, BookingStatus, FilterSpec, RawValue, RevenueConfig, RevenueContext, Schema,
    VERSION,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hotel-revenue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hotel booking revenue prediction and KPI aggregation", long_about = None)]
struct Cli {
    /// TOML configuration file (HOTEL_REVENUE_* variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// KPIs over the filtered dataset
    Summarize(SummarizeArgs),
    /// Predict revenue for one booking
    Predict(PredictArgs),
    /// Describe the loaded model artifact
    ModelInfo,
    /// Print the feature layout of the active schema
    Layout,
}

#[derive(Args, Debug, Default)]
struct SummarizeArgs {
    /// Room types to keep (repeatable)
    #[arg(long = "room-type")]
    room_types: Vec<String>,

    /// Customer segments to keep (repeatable)
    #[arg(long = "segment")]
    segments: Vec<String>,

    /// Booking months to keep, 1-12 (repeatable)
    #[arg(long = "month", value_parser = clap::value_parser!(u8).range(1..=12))]
    months: Vec<u8>,

    /// Minimum booking lead time in days
    #[arg(long)]
    lead_min: Option<f64>,

    /// Maximum booking lead time in days
    #[arg(long)]
    lead_max: Option<f64>,

    /// Earliest check-in date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Latest check-in date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Booking status
    #[arg(long, value_enum, default_value_t = StatusArg::All)]
    status: StatusArg,

    /// JSON filter spec applied before the flags above
    #[arg(long)]
    filter: Option<PathBuf>,

    /// Break the KPIs down by the values of this field
    #[arg(long)]
    group_by: Option<String>,

    /// Break the KPIs down by calendar month of the date field
    #[arg(long)]
    monthly: bool,

    /// Numeric field to average per month alongside --monthly (repeatable)
    #[arg(long = "mean", value_name = "FIELD", requires = "monthly")]
    means: Vec<String>,

    /// Date field used by --from/--to and --monthly
    #[arg(long, default_value = "checkin_date")]
    date_field: String,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// JSON object with the booking fields
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Field assignment, applied after --input (repeatable)
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    sets: Vec<(String, RawValue)>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
enum StatusArg {
    #[default]
    All,
    Cancelled,
    Completed,
}

impl From<StatusArg> for BookingStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::All => BookingStatus::All,
            StatusArg::Cancelled => BookingStatus::Cancelled,
            StatusArg::Completed => BookingStatus::Completed,
        }
    }
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    dataset_version: &'a str,
    cache_key: String,
    filter: &'a FilterSpec,
    kpis: hotel_revenue_core::KpiResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<hotel_revenue_core::GroupSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    months: Option<Vec<hotel_revenue_core::MonthSummary>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    monthly_means: BTreeMap<String, Vec<hotel_revenue_core::MonthlyValue>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose)?;

    info!("Hotel revenue CLI v{} (core v{})", env!("CARGO_PKG_VERSION"), VERSION);
    for warning in config.validate().context("Invalid configuration")? {
        debug!("config: {warning}");
    }

    match cli.command {
        Command::Summarize(args) => summarize(&config, &args),
        Command::Predict(args) => predict(&config, &args),
        Command::ModelInfo => model_info(&config),
        Command::Layout => layout(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<RevenueConfig> {
    let mut config = match path {
        Some(path) => RevenueConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RevenueConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn init_logging(config: &RevenueConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_ascii_lowercase()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.context("Failed to set tracing subscriber")
}

fn bootstrap(config: &RevenueConfig) -> Result<RevenueContext> {
    RevenueContext::bootstrap(config).context("Failed to start revenue core")
}

fn summarize(config: &RevenueConfig, args: &SummarizeArgs) -> Result<()> {
    let context = bootstrap(config)?;
    let dataset = context
        .dataset()
        .ok_or_else(|| anyhow!("No dataset configured (set dataset.path or dataset.sqlite)"))?;
    let engine = context.aggregation();

    let base = match &args.filter {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read filter {}", path.display()))?;
            serde_json::from_str(&content).context("Failed to parse filter spec")?
        }
        None => FilterSpec::new(),
    };
    let spec = build_filter(base, args);

    let view = engine
        .aggregate(dataset, &spec)
        .map_err(|errors| anyhow!("Invalid filter: {errors}"))?;
    info!(rows = view.kpis.row_count, predicates = spec.len(), "summary computed");

    let groups = match &args.group_by {
        Some(field) => Some(
            engine
                .group_by(&view.rows, field)
                .with_context(|| format!("Cannot group by `{field}`"))?,
        ),
        None => None,
    };
    let months = if args.monthly {
        Some(
            engine
                .group_by_month(&view.rows, &args.date_field)
                .with_context(|| format!("Cannot group by month of `{}`", args.date_field))?,
        )
    } else {
        None
    };

    let mut monthly_means = BTreeMap::new();
    for field in &args.means {
        let series = engine
            .monthly_field_mean(&view.rows, &args.date_field, field)
            .with_context(|| format!("Cannot average `{field}` per month"))?;
        monthly_means.insert(field.clone(), series);
    }

    let report = SummaryReport {
        dataset_version: dataset.version(),
        cache_key: engine
            .cache_key(dataset, &spec)
            .context("Failed to fingerprint filter")?,
        filter: &spec,
        kpis: view.kpis,
        groups,
        months,
        monthly_means,
    };
    print_json(&report)
}

/// Layer the command-line flags over a base filter
fn build_filter(base: FilterSpec, args: &SummarizeArgs) -> FilterSpec {
    let mut spec = base;

    if !args.room_types.is_empty() {
        spec = spec.one_of("room_type", args.room_types.iter().map(String::as_str));
    }
    if !args.segments.is_empty() {
        spec = spec.one_of("customer_segment", args.segments.iter().map(String::as_str));
    }
    if !args.months.is_empty() {
        spec = spec.one_of("booking_month", args.months.iter().map(|m| f64::from(*m)));
    }
    if args.lead_min.is_some() || args.lead_max.is_some() {
        spec = spec.range("booking_lead_time", args.lead_min, args.lead_max);
    }
    if args.from.is_some() || args.to.is_some() {
        spec = spec.date_range(&args.date_field, args.from, args.to);
    }
    if args.status != StatusArg::All {
        spec = spec.status("cancellation_flag", args.status.into());
    }

    spec
}

fn predict(config: &RevenueConfig, args: &PredictArgs) -> Result<()> {
    let mut record = match &args.input {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read booking {}", path.display()))?;
            let value: serde_json::Value =
                serde_json::from_str(&content).context("Booking file is not JSON")?;
            BookingRecord::from_json(value).context("Booking must be a JSON object of fields")?
        }
        None => BookingRecord::new(),
    };
    for (field, value) in &args.sets {
        record.insert(field.clone(), value.clone());
    }
    if record.is_empty() {
        bail!("No booking fields given (use --input or --set)");
    }

    let context = bootstrap(config)?;
    match context.prediction().predict_revenue(record) {
        Ok(result) => print_json(&result),
        Err(err) => {
            warn!(stage = %err.stage(), "prediction rejected");
            print_json(&json!({
                "stage": err.stage(),
                "error": err.to_string(),
                "fields": err.field_errors(),
            }))?;
            bail!("Prediction failed at the {} stage", err.stage())
        }
    }
}

fn model_info(config: &RevenueConfig) -> Result<()> {
    let context = bootstrap(config)?;
    let layout = context.schema().layout();

    print_json(&json!({
        "model": context.model().info(),
        "schema": context.schema().name(),
        "schema_version": context.schema().version(),
        "layout_fingerprint": layout.fingerprint(),
        "dataset_rows": context.dataset().map(|d| d.len()),
    }))
}

fn layout(config: &RevenueConfig) -> Result<()> {
    let schema = match &config.schema.path {
        Some(path) => Schema::load(path)
            .with_context(|| format!("Failed to load schema {}", path.display()))?,
        None => Schema::hotel_bookings().context("Built-in schema is invalid")?,
    };
    let layout = schema.layout();

    print_json(&json!({
        "schema": schema.name(),
        "version": schema.version(),
        "width": layout.width(),
        "fingerprint": layout.fingerprint(),
        "required_fields": layout.required_fields(),
        "columns": layout.columns(),
    }))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}

/// `field=value`; the value is read as JSON when it parses, otherwise as text
fn parse_assignment(input: &str) -> Result<(String, RawValue), String> {
    let (field, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got `{input}`"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in `{input}`"));
    }

    let value = value.trim();
    let value = if value.is_empty() {
        RawValue::Null
    } else {
        serde_json::from_str::<RawValue>(value)
            .unwrap_or_else(|_| RawValue::Text(value.to_string()))
    };
    Ok((field.to_string(), value))
}

//! CLI binary for uae-mortgage-advisor.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AdvisorConfig`, runs one command and prints the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mortgage_advisor::{
    buy_vs_rent_recommendation, calculate_emi, enforce_ltv, format_amount, format_confirmation,
    monthly_income, resolve_document, validate, Advisor, AdvisorConfig, BuyVsRentInput,
    FailureReason, PipelineProgressCallback, PipelineResult, ProgressCallback, RawExtractedText,
    Scrubber, Stage,
};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that shows the current pipeline stage and logs one line per
/// finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.label().to_string());
        self.bar.set_message("…");
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<12} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_pipeline_complete(&self, failure: Option<FailureReason>) {
        self.bar.finish_and_clear();
        match failure {
            None => eprintln!("{} salary figures extracted", green("✔")),
            Some(reason) => eprintln!("{} {}", red("✘"), dim(reason.code())),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract salary figures from a payslip
  mortgage-advisor extract payslip.pdf

  # Structured JSON result
  mortgage-advisor extract --json salary-certificate.png

  # Redact a text file and show the gate verdict (no API key needed)
  mortgage-advisor scrub ocr-output.txt

  # Calculators (no API key needed)
  mortgage-advisor ltv --price 2000000 --down-payment 300000
  mortgage-advisor emi --loan 1600000 --rate 0.045 --tenure 25
  mortgage-advisor buy-vs-rent --stay 4 --rent 9000 --price 2000000

  # HTTP service for the web chat front end
  mortgage-advisor serve --addr 0.0.0.0:8080

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter; overrides -v / -q

A .env file in the working directory is loaded on startup.
"#;

/// UAE mortgage advisor: salary-document extraction and mortgage calculators.
#[derive(Parser, Debug)]
#[command(
    name = "mortgage-advisor",
    version,
    about = "UAE mortgage advisor: PII-safe salary extraction and mortgage calculators",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Reasoning model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Reasoning provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Vision model used for OCR. Defaults to --model.
    #[arg(long, global = true, env = "MORTGAGE_ADVISOR_OCR_MODEL")]
    ocr_model: Option<String>,

    /// Provider used for OCR. Defaults to --provider.
    #[arg(long, global = true, env = "MORTGAGE_ADVISOR_OCR_PROVIDER")]
    ocr_provider: Option<String>,

    /// OCR call timeout in seconds (1–120).
    #[arg(long, global = true, env = "MORTGAGE_ADVISOR_OCR_TIMEOUT", default_value_t = 30)]
    ocr_timeout: u64,

    /// Extraction call timeout in seconds (1–120).
    #[arg(long, global = true, env = "MORTGAGE_ADVISOR_EXTRACTION_TIMEOUT", default_value_t = 30)]
    extraction_timeout: u64,

    /// Chat reply timeout in seconds (1–120).
    #[arg(long, global = true, env = "MORTGAGE_ADVISOR_CHAT_TIMEOUT", default_value_t = 30)]
    chat_timeout: u64,

    /// HTTP download timeout in seconds, for URL inputs.
    #[arg(long, global = true, env = "MORTGAGE_ADVISOR_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Largest accepted document, in MiB.
    #[arg(long, global = true, env = "MORTGAGE_ADVISOR_MAX_DOCUMENT_MB", default_value_t = 10)]
    max_document_mb: usize,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "MORTGAGE_ADVISOR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MORTGAGE_ADVISOR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MORTGAGE_ADVISOR_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run OCR → scrub → gate → extraction on a payslip or salary certificate.
    Extract {
        /// Local image/PDF path or HTTP/HTTPS URL.
        input: String,

        /// Print the structured pipeline result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Redact PII from text (file or stdin) and report the gate verdict.
    Scrub {
        /// Text file to scrub. Reads stdin when omitted.
        input: Option<PathBuf>,
    },

    /// Apply the 80% loan-to-value cap.
    Ltv {
        #[arg(long)]
        price: f64,
        #[arg(long, default_value_t = 0.0)]
        down_payment: f64,
        #[arg(long)]
        json: bool,
    },

    /// Monthly instalment for a loan.
    Emi {
        #[arg(long)]
        loan: f64,
        /// Annual rate as a fraction (0.045 = 4.5%). Defaults to 4.5%.
        #[arg(long)]
        rate: Option<f64>,
        /// Tenure in years (clamped to 25).
        #[arg(long, default_value_t = 25)]
        tenure: u32,
        #[arg(long)]
        json: bool,
    },

    /// Recommend buying or renting.
    BuyVsRent {
        /// Expected years of stay.
        #[arg(long)]
        stay: f64,
        #[arg(long, default_value_t = 0.0)]
        rent: f64,
        #[arg(long, default_value_t = 0.0)]
        price: f64,
        #[arg(long)]
        down_payment: Option<f64>,
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long)]
        json: bool,
    },

    /// Serve the HTTP API.
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, env = "MORTGAGE_ADVISOR_ADDR", default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback an `extract` run needs; library
    // INFO logs would only interleave with it.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && matches!(cli.command, Command::Extract { json: false, .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Extract { input, json } => run_extract(&cli, input, *json, show_progress).await,
        Command::Scrub { input } => run_scrub(input.as_ref()),
        Command::Ltv {
            price,
            down_payment,
            json,
        } => {
            let result = enforce_ltv(*price, *down_payment)?;
            if *json {
                return print_json(&result);
            }
            println!("Loan amount:     {}", format_amount("AED", result.loan_amount));
            println!("Down payment:    {}", format_amount("AED", result.down_payment));
            println!(
                "Upfront costs:   {}",
                format_amount("AED", result.upfront_cost_estimate)
            );
            if !result.issues.is_empty() {
                eprintln!(
                    "{} down payment raised to the 20% minimum",
                    bold("note:")
                );
            }
            Ok(())
        }
        Command::Emi {
            loan,
            rate,
            tenure,
            json,
        } => {
            let result = calculate_emi(*loan, *rate, *tenure)?;
            if *json {
                return print_json(&result);
            }
            println!("Monthly EMI:     {}", format_amount("AED", result.monthly_emi));
            println!(
                "  interest:      {}",
                format_amount("AED", result.monthly_interest_portion)
            );
            println!(
                "  principal:     {}",
                format_amount("AED", result.monthly_principal_portion)
            );
            println!(
                "{}",
                dim(&format!(
                    "{} years at {:.2}%",
                    result.tenure_years,
                    result.annual_rate * 100.0
                ))
            );
            Ok(())
        }
        Command::BuyVsRent {
            stay,
            rent,
            price,
            down_payment,
            rate,
            json,
        } => {
            let result = buy_vs_rent_recommendation(&BuyVsRentInput {
                stay_years: *stay,
                monthly_rent: *rent,
                property_price: *price,
                down_payment: *down_payment,
                annual_rate: *rate,
            })?;
            if *json {
                return print_json(&result);
            }
            println!("{}  {}", bold(&result.recommendation.to_string()), result.reason);
            if let Some(cost) = result.monthly_ownership_cost {
                println!(
                    "{}",
                    dim(&format!("monthly interest + maintenance: {}", format_amount("AED", cost)))
                );
            }
            Ok(())
        }
        #[cfg(feature = "server")]
        Command::Serve { addr } => {
            let advisor = Arc::new(Advisor::from_config(build_config(&cli, None)?));
            mortgage_advisor::server::serve(*addr, advisor)
                .await
                .context("HTTP server failed")
        }
    }
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AdvisorConfig> {
    let mut builder = AdvisorConfig::builder()
        .ocr_timeout_secs(cli.ocr_timeout)
        .extraction_timeout_secs(cli.extraction_timeout)
        .chat_timeout_secs(cli.chat_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_document_bytes(cli.max_document_mb.saturating_mul(1024 * 1024));

    if let Some(ref m) = cli.model {
        builder = builder.model(m);
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref m) = cli.ocr_model {
        builder = builder.ocr_model(m);
    }
    if let Some(ref p) = cli.ocr_provider {
        builder = builder.ocr_provider_name(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn run_extract(cli: &Cli, input: &str, json: bool, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(cli, progress)?;

    let document = resolve_document(input, config.download_timeout_secs, config.max_document_bytes)
        .await
        .with_context(|| format!("Failed to load '{input}'"))?;

    let advisor = Advisor::from_config(config);
    let result = advisor.extract_salary_from_document(&document).await;

    if json {
        return print_json(&result);
    }

    match result {
        PipelineResult::Success(salary) => {
            let income = monthly_income(&salary);
            println!("{}", format_confirmation(&salary, income.as_ref()));
            Ok(())
        }
        PipelineResult::Failure(reason) => {
            eprintln!("{}", red(reason.user_message()));
            std::process::exit(2);
        }
    }
}

fn run_scrub(input: Option<&PathBuf>) -> Result<()> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let redaction = Scrubber::default().scrub(&RawExtractedText::new(text));
    let verdict = validate(redaction.text.as_str());
    println!("{}", redaction.text.as_str());

    for (kind, count) in &redaction.counts {
        eprintln!("  {} {:<8} {}", dim("•"), kind.label(), count);
    }
    if verdict.passed {
        eprintln!("{} gate: {}", green("✔"), verdict);
        Ok(())
    } else {
        eprintln!("{} gate: {}", red("✘"), verdict);
        std::process::exit(3);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize result")?
    );
    Ok(())
}

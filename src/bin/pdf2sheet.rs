//! CLI binary for pdf2sheet.
//!
//! A thin shim over the library crate: `serve` runs the upload form,
//! `process` runs one PDF through the whole pipeline, `extract` only writes
//! the images to a folder.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2sheet::{
    CredentialSource, ExtractionMethod, ImageExtractor, Outcome, PdfImageExtractor, Pipeline,
    PipelineConfig, PipelineProgress, ProgressCallback, RetryPolicy, ServerConfig, Stage,
    WorksheetAllowList,
};
use std::io;
use std::net::SocketAddr;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while extracting, a bar while uploading,
/// one log line per image and per upload.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize, prefix: &'static str, unit: &str) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  ⏱ {{elapsed_precise}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix);
    }
}

impl PipelineProgress for CliProgress {
    fn on_stage_start(&self, stage: Stage, items: Option<usize>) {
        match (stage, items) {
            (Stage::Extract, _) => {
                self.bar.set_prefix("Extracting");
                self.bar.set_message("rendering image placements…");
            }
            (Stage::Upload, Some(n)) => self.activate_bar(n, "Uploading", "images"),
            (Stage::Sheet, Some(n)) => {
                self.bar.set_prefix("Sheet");
                self.bar.set_message(format!("writing {n} rows…"));
            }
            (_, None) => {}
        }
    }

    fn on_image_extracted(&self, index: usize, page: usize, method: ExtractionMethod) {
        let how = match method {
            ExtractionMethod::NamedPlacement | ExtractionMethod::XrefPlacement => "rendered",
            ExtractionMethod::RawBytes => "raw bytes",
        };
        self.bar.println(format!(
            "  {} image_{index}.png  {}",
            green("✓"),
            dim(&format!("page {page}, {how}"))
        ));
    }

    fn on_upload_complete(&self, name: &str, _url: &str) {
        self.bar.println(format!("  {} {}  {}", green("↑"), name, dim("shared")));
        self.bar.inc(1);
    }

    fn on_upload_error(&self, name: &str, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_sheet_updated(&self, worksheet: &str, start_row: u32, rows: usize) {
        self.bar.println(format!(
            "  {} {} rows → '{}' from row {}",
            green("✓"),
            rows,
            worksheet,
            start_row
        ));
    }

    fn on_stage_complete(&self, stage: Stage) {
        if stage == Stage::Sheet {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the upload form on :5050
  pdf2sheet serve --spreadsheet-id 1pS7c5... --drive-folder-id 1qq-fm...

  # One PDF straight into a worksheet
  pdf2sheet process form.pdf --sheet bulco

  # Same, machine-readable report
  pdf2sheet process form.pdf --sheet bulco --json > report.json

  # Just look at what would be extracted (no Google credentials needed)
  pdf2sheet extract form.pdf -o images/

ENVIRONMENT VARIABLES:
  PDF2SHEET_SPREADSHEET_ID     Spreadsheet key
  PDF2SHEET_DRIVE_FOLDER_ID    Drive folder receiving the images
  PDF2SHEET_TOKEN_FILE         Authorized-user token.json (default: token.json)
  PDF2SHEET_SERVICE_ACCOUNT    Service-account key file (takes precedence)
  PDF2SHEET_ACCESS_TOKEN       Ready-made access token (takes precedence)
  PDF2SHEET_WORKSHEETS         Comma-separated worksheet list for the form
  PDF2SHEET_PDFIUM_LIB         Path to libpdfium (default: system library)
  RUST_LOG                     Overrides -v / -q log filtering
"#;

/// Extract PDF images, publish them on Drive and log them in Google Sheets.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2sheet",
    version,
    about = "Extract PDF images, publish them on Google Drive and append them to a Google Sheet",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to libpdfium. Defaults to the system library.
    #[arg(long, global = true, env = "PDF2SHEET_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2SHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2SHEET_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the upload form.
    Serve(ServeArgs),
    /// Run one PDF through extraction, upload and the sheet update.
    Process(ProcessArgs),
    /// Only extract the images of a PDF into a folder.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct GoogleArgs {
    /// Spreadsheet key (the long id in the sheet URL).
    #[arg(long, env = "PDF2SHEET_SPREADSHEET_ID")]
    spreadsheet_id: String,

    /// Drive folder id receiving the uploaded images.
    #[arg(long, env = "PDF2SHEET_DRIVE_FOLDER_ID")]
    drive_folder_id: String,

    /// Authorized-user token file (client id, secret, refresh token).
    #[arg(long, env = "PDF2SHEET_TOKEN_FILE", default_value = "token.json")]
    token_file: PathBuf,

    /// Service-account key file; used instead of --token-file when set.
    #[arg(long, env = "PDF2SHEET_SERVICE_ACCOUNT")]
    service_account: Option<PathBuf>,

    /// Access token to use as-is; used instead of any file when set.
    #[arg(long, env = "PDF2SHEET_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Render zoom for image placements (0.5–8.0).
    #[arg(long, env = "PDF2SHEET_ZOOM", default_value_t = 2.0)]
    zoom: f32,

    /// Retry immediately instead of pausing between attempts.
    #[arg(long)]
    no_wait: bool,
}

impl GoogleArgs {
    fn credentials(&self) -> CredentialSource {
        if let Some(token) = &self.access_token {
            CredentialSource::AccessToken(token.clone())
        } else if let Some(key_path) = &self.service_account {
            CredentialSource::ServiceAccount {
                key_path: key_path.clone(),
            }
        } else {
            CredentialSource::AuthorizedUser {
                token_path: self.token_file.clone(),
            }
        }
    }

    fn config(
        &self,
        pdfium_lib: Option<&PathBuf>,
        progress: Option<ProgressCallback>,
    ) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder()
            .spreadsheet_id(&self.spreadsheet_id)
            .drive_folder_id(&self.drive_folder_id)
            .zoom(self.zoom);
        if self.no_wait {
            builder = builder
                .upload_retry(RetryPolicy::immediate(3))
                .sheet_retry(RetryPolicy::immediate(3));
        }
        if let Some(path) = pdfium_lib {
            builder = builder.pdfium_library(path);
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }
        builder.build().context("Invalid configuration")
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    google: GoogleArgs,

    /// Listen address.
    #[arg(long, env = "PDF2SHEET_BIND", default_value = "0.0.0.0:5050")]
    bind: SocketAddr,

    /// Where submissions are staged while processed.
    #[arg(long, env = "PDF2SHEET_UPLOAD_DIR", default_value = "static/uploads")]
    upload_dir: PathBuf,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "PDF2SHEET_MAX_UPLOAD_MB", default_value_t = 20)]
    max_upload_mb: usize,

    /// Comma-separated worksheet names offered in the form.
    #[arg(long, env = "PDF2SHEET_WORKSHEETS")]
    worksheets: Option<String>,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    #[command(flatten)]
    google: GoogleArgs,

    /// PDF file to process.
    input: PathBuf,

    /// Worksheet to append the rows to.
    #[arg(short, long, env = "PDF2SHEET_SHEET")]
    sheet: String,

    /// Print the full report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2SHEET_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// PDF file to read.
    input: PathBuf,

    /// Folder to write image_<n>.png into.
    #[arg(short, long, default_value = "imagenes_extraidas")]
    output: PathBuf,

    /// Render zoom for image placements (0.5–8.0).
    #[arg(long, env = "PDF2SHEET_ZOOM", default_value_t = 2.0)]
    zoom: f32,

    /// Print the extraction report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for `process`; the server keeps them.
    let bar_active = matches!(&cli.command, Command::Process(p) if !p.no_progress && !p.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || bar_active {
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
        Command::Serve(args) => serve(&cli, args).await,
        Command::Process(args) => process(&cli, args, bar_active && !cli.quiet).await,
        Command::Extract(args) => extract(&cli, args).await,
    }
}

async fn serve(cli: &Cli, args: &ServeArgs) -> Result<()> {
    let config = args.google.config(cli.pdfium_lib.as_ref(), None)?;
    let pipeline = Pipeline::connect(config, args.google.credentials())
        .context("Failed to set up Google clients")?;

    let server = ServerConfig {
        bind: args.bind,
        upload_dir: args.upload_dir.clone(),
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
        worksheets: args
            .worksheets
            .as_deref()
            .map(WorksheetAllowList::parse)
            .unwrap_or_default(),
    };
    pdf2sheet::web::serve(server, pipeline)
        .await
        .context("Server stopped")
}

async fn process(cli: &Cli, args: &ProcessArgs, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn PipelineProgress>)
    } else {
        None
    };
    let config = args.google.config(cli.pdfium_lib.as_ref(), progress)?;
    let pipeline = Pipeline::connect(config, args.google.credentials())
        .context("Failed to set up Google clients")?;

    let report = pipeline
        .process_file(&args.input, &args.sheet)
        .await
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    }

    let outcome = report.outcome();
    if !cli.quiet && !args.json {
        let rows = report.sheet.as_ref().map_or(0, |s| s.rows_written);
        match &outcome {
            Outcome::Complete => eprintln!(
                "{}  {} images  →  {} rows in '{}'  {}",
                green("✔"),
                bold(&report.extraction.count().to_string()),
                bold(&rows.to_string()),
                args.sheet,
                dim(&format!("{}ms", report.duration_ms)),
            ),
            Outcome::Partial { failures } => {
                eprintln!(
                    "{}  {} rows in '{}', {} items lost:",
                    cyan("⚠"),
                    rows,
                    args.sheet,
                    red(&failures.len().to_string())
                );
                for f in failures {
                    eprintln!("   {} {}", red("✗"), f);
                }
            }
            Outcome::Failed { reason } => eprintln!("{}  {}", red("✘"), red(reason)),
        }
    }

    if let Outcome::Failed { reason } = outcome {
        anyhow::bail!("Sheet not updated: {reason}");
    }
    Ok(())
}

async fn extract(cli: &Cli, args: &ExtractArgs) -> Result<()> {
    let extractor = Arc::new(
        PdfImageExtractor::default()
            .with_zoom(args.zoom)
            .with_pdfium_library(cli.pdfium_lib.clone()),
    );
    let input = args.input.clone();
    let output = args.output.clone();
    let report = tokio::task::spawn_blocking(move || extractor.extract(&input, &output))
        .await
        .context("Extraction task panicked")?
        .with_context(|| format!("Failed to extract images from {}", args.input.display()))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        for image in &report.images {
            eprintln!(
                "  {} {}  {}",
                green("✓"),
                image.path.display(),
                dim(&format!("page {}, {:?}", image.page, image.method))
            );
        }
        for failure in &report.failures {
            eprintln!("  {} {}", red("✗"), failure);
        }
        eprintln!(
            "{}  {} images written to {}",
            if report.failures.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(&report.count().to_string()),
            args.output.display()
        );
    }
    Ok(())
}

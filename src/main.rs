use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use photomark::batch::{self, BatchItem, BatchJob, CancelToken, ItemOutcome};
use photomark::output::{self, Quality, Rename};
use photomark::preview::{self, Viewport};
use photomark::{source, CompositionConfig, Padding, Position, Watermarker};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "photomark", about = "Stamp a watermark onto a batch of photos")]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watermark images and write them to an output folder
    Apply(ApplyArgs),
    /// Render one image with the watermark, scaled to fit a viewport
    Preview(PreviewArgs),
}

#[derive(Args)]
struct ApplyArgs {
    /// Image files or folders of images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output folder (absolute path)
    #[arg(short, long)]
    output: String,

    /// Create the output folder if it doesn't exist
    #[arg(long)]
    create_output: bool,

    /// Replace files that already exist in the output folder
    #[arg(long)]
    overwrite: bool,

    /// Prepend "<PREFIX>_" to output file names
    #[arg(long, conflicts_with = "suffix")]
    prefix: Option<String>,

    /// Append "_<SUFFIX>" to output file stems
    #[arg(long)]
    suffix: Option<String>,

    /// JPEG quality: "lossless" or 1-100
    #[arg(long, default_value = "90")]
    quality: String,

    /// Worker threads; 0 uses every core
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    #[command(flatten)]
    mark: MarkArgs,
}

#[derive(Args)]
struct PreviewArgs {
    /// Image to preview
    input: PathBuf,

    /// Where to write the preview
    #[arg(short, long, default_value = "preview.png")]
    output: PathBuf,

    /// Viewport as WIDTHxHEIGHT; larger previews are scaled down
    #[arg(long, default_value = "780x540", value_parser = parse_viewport)]
    viewport: Viewport,

    #[command(flatten)]
    mark: MarkArgs,
}

#[derive(Args)]
struct MarkArgs {
    /// Watermark image
    #[arg(long, default_value = "logo.png")]
    logo: PathBuf,

    /// Corner: NW, NE, SW or SE
    #[arg(long, default_value = "SE")]
    position: Position,

    /// Horizontal padding, e.g. 20px or 5%
    #[arg(long, default_value = "20px")]
    pad_x: Padding,

    /// Vertical padding, e.g. 5px or 2%
    #[arg(long, default_value = "5px")]
    pad_y: Padding,

    /// Watermark opacity between 0 and 1
    #[arg(long, default_value_t = 0.5)]
    opacity: f32,

    /// Horizontal size multiplier (0.1-3.0)
    #[arg(long, default_value_t = 1.0)]
    scale_x: f32,

    /// Vertical size multiplier (0.1-3.0)
    #[arg(long, default_value_t = 1.0)]
    scale_y: f32,

    /// Use --scale-x for both axes
    #[arg(long)]
    keep_aspect: bool,

    /// Keep the watermark's own size instead of sizing it from each photo
    #[arg(long)]
    no_auto_scale: bool,
}

impl MarkArgs {
    fn config(&self) -> CompositionConfig {
        let scale_y = if self.keep_aspect {
            self.scale_x
        } else {
            self.scale_y
        };
        CompositionConfig {
            position: self.position,
            pad_x: self.pad_x,
            pad_y: self.pad_y,
            opacity: self.opacity,
            scale_x: self.scale_x,
            scale_y,
            auto_scale: !self.no_auto_scale,
        }
    }
}

fn parse_viewport(s: &str) -> Result<Viewport, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("bad width {:?}", w))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("bad height {:?}", h))?;
    if width == 0 || height == 0 {
        return Err("viewport must be at least 1x1".to_string());
    }
    Ok(Viewport { width, height })
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Apply(args) => run_apply(args),
        Command::Preview(args) => run_preview(args),
    }
}

fn run_apply(args: ApplyArgs) -> Result<()> {
    let config = args.mark.config();
    config.validate()?;
    let quality = output::parse_quality(&args.quality)?;
    let rename = match (&args.prefix, &args.suffix) {
        (Some(fix), _) => Rename::prefix(fix)?,
        (None, Some(fix)) => Rename::suffix(fix)?,
        (None, None) => Rename::Keep,
    };
    let out_dir = output::resolve_output_dir(&args.output, args.create_output)?;

    println!("  Logo:     {}", args.mark.logo.display());
    println!("  Position: {} ({}, {})", config.position, config.pad_x, config.pad_y);
    println!("  Opacity:  {}", config.opacity);
    println!("  Output:   {}", out_dir.display());
    println!();

    println!("[1/3] Loading watermark...");
    let mut engine = Watermarker::open(&args.mark.logo, args.overwrite)
        .context("Could not prepare the watermark")?
        .with_quality(quality);

    println!("[2/3] Collecting images...");
    let jobs = collect_jobs(&args.inputs, &out_dir, &rename)?;
    println!("  Found {} image(s)", jobs.len());

    println!("[3/3] Applying watermark...");
    let cancel = CancelToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag())
        .context("Could not install the interrupt handler")?;

    let total = jobs.len();
    let report = if args.jobs == 1 {
        batch::run_sequential(&mut engine, &jobs, &config, &cancel, |i, item| {
            print_item(i, total, item)
        })?
    } else {
        let report = batch::run_parallel(
            engine.asset().clone(),
            args.overwrite,
            quality,
            &jobs,
            &config,
            &cancel,
            args.jobs,
        )?;
        for (i, item) in report.items.iter().enumerate() {
            print_item(i, total, item);
        }
        report
    };

    println!(
        "Done: {} written, {} skipped, {} failed, {} cancelled.",
        report.written(),
        report.skipped(),
        report.failed(),
        report.cancelled()
    );
    if report.failed() > 0 {
        bail!("{} image(s) could not be watermarked", report.failed());
    }
    Ok(())
}

fn collect_jobs(inputs: &[PathBuf], out_dir: &Path, rename: &Rename) -> Result<Vec<BatchJob>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = source::list_images(input)
                .with_context(|| format!("Could not read folder {}", input.display()))?;
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }

    files
        .into_iter()
        .map(|input| {
            let output = rename.output_path(&input, out_dir)?;
            Ok::<_, anyhow::Error>(BatchJob { input, output })
        })
        .collect()
}

fn print_item(index: usize, total: usize, item: &BatchItem) {
    let name = item
        .job
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let status = match &item.outcome {
        ItemOutcome::Written => "✓".to_string(),
        ItemOutcome::SkippedExisting => "exists, skipped".to_string(),
        ItemOutcome::Cancelled => "cancelled".to_string(),
        ItemOutcome::Failed(e) => format!("error: {}", e),
    };
    println!("  {}/{} {} {}", index + 1, total, name, status);
}

fn run_preview(args: PreviewArgs) -> Result<()> {
    let config = args.mark.config();
    let engine = Watermarker::open(&args.mark.logo, false)
        .context("Could not prepare the watermark")?;

    let image = engine.render_preview(&args.input, &config)?;
    let fitted = preview::fit_to_viewport(image, args.viewport);
    output::save_image(&fitted, &args.output, None, Quality::Lossless)?;

    println!(
        "Preview {}x{} written to {}",
        fitted.width(),
        fitted.height(),
        args.output.display()
    );
    Ok(())
}

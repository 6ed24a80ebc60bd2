use std::{
    io::{Read, Write},
    path::PathBuf,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::Parser;
use textline_merge::{
    overlay::draw_regions, MergeParams, MergeRequest, MergeResponse, ParamOverrides,
    TextlineMergerBuilder,
};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Group detected text lines into text regions.
///
/// Reads a merge request (`width`, `height`, `textlines`) as JSON and writes the
/// merged regions in the same exchange format.
#[derive(Debug, Parser)]
#[command(name = "textline-merge", version)]
struct Args {
    /// Request file, `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: String,
    /// Response file, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Override the image width given in the request
    #[arg(long)]
    width: Option<u32>,
    /// Override the image height given in the request
    #[arg(long)]
    height: Option<u32>,
    /// Take width and height from this image's header
    #[arg(long)]
    image: Option<PathBuf>,
    /// Write a PNG with line and region outlines drawn over `--image`
    #[arg(long, requires = "image")]
    overlay: Option<PathBuf>,
    /// Skip malformed lines instead of failing the request
    #[arg(long)]
    lenient: bool,
    /// Round and clamp decoded lines into the image before merging
    #[arg(long)]
    clip: bool,
    #[arg(long)]
    pretty: bool,
    #[command(flatten)]
    params: ParamArgs,
}

// Each threshold set here wins over the same key in the request.
#[derive(Debug, clap::Args)]
struct ParamArgs {
    #[arg(long)]
    ratio: Option<f32>,
    #[arg(long)]
    gap_limit: Option<f32>,
    #[arg(long)]
    gap_tol: Option<f32>,
    #[arg(long)]
    gap_tol2: Option<f32>,
    #[arg(long)]
    font_ratio_tol: Option<f32>,
    #[arg(long)]
    aspect_tol: Option<f32>,
}

impl From<&ParamArgs> for ParamOverrides {
    fn from(args: &ParamArgs) -> Self {
        Self {
            ratio: args.ratio,
            gap_limit: args.gap_limit,
            gap_tol: args.gap_tol,
            gap_tol2: args.gap_tol2,
            font_ratio_tol: args.font_ratio_tol,
            aspect_tol: args.aspect_tol,
        }
    }
}

fn read_request(input: &str) -> Result<MergeRequest> {
    let raw = if input == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read request from stdin")?;
        raw
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))?
    };
    serde_json::from_str(&raw).context("Malformed merge request")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut request = read_request(&args.input)?;

    if let Some(path) = &args.image {
        let (width, height) = image::image_dimensions(path)
            .with_context(|| format!("Failed to read dimensions of {}", path.display()))?;
        request.width = width;
        request.height = height;
    }
    request.width = args.width.unwrap_or(request.width);
    request.height = args.height.unwrap_or(request.height);

    let merger = TextlineMergerBuilder::new()
        .params(MergeParams::default())
        .lenient(args.lenient)
        .clip(args.clip)
        .build();
    // flags given on the command line beat thresholds carried by the request
    let overrides = ParamOverrides::from(&args.params).or(request.overrides);

    let start = Instant::now();
    let outcome = merger.merge_exchange(
        &request.textlines,
        request.width,
        request.height,
        &overrides,
    )?;
    log::debug!(
        "Merged {} lines into {} regions in {:?}",
        request.textlines.len(),
        outcome.regions.len(),
        start.elapsed()
    );
    for skipped in &outcome.skipped {
        log::warn!("Skipped line {}: {}", skipped.index, skipped.reason);
    }

    if let (Some(overlay), Some(path)) = (&args.overlay, &args.image) {
        let image =
            image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        draw_regions(&image, &outcome.regions)
            .save(overlay)
            .with_context(|| format!("Failed to write overlay {}", overlay.display()))?;
    }

    let response = MergeResponse::from_outcome(&outcome, request.width, request.height)?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => writeln!(std::io::stdout(), "{json}")?,
    }
    Ok(())
}

//! # Mosh
//!
//! Glitch AVI files by rewriting their frame index.
//!
//! ## Usage
//! ```bash
//! # Container summary as JSON
//! mosh probe clip.avi
//!
//! # Index records, one per line
//! mosh frames clip.avi
//!
//! # Accelerating stutter, then replace keyframes with stale deltas
//! mosh glitch -i clip.avi -o moshed.avi --stutter --resync
//!
//! # Transforms from a JSON recipe, with debug logging
//! RUST_LOG=debug mosh glitch -i clip.avi -o moshed.avi --recipe recipe.json
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use mosh_core::transform::{DEFAULT_LOOKAHEAD_WINDOW, DEFAULT_STUTTER_CEILING, DEFAULT_STUTTER_STEP};
use mosh_core::{AviFile, FrameKind, Transform, TransformChain};
use serde::Serialize;
use tracing::info;

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, PartialEq)]
enum Command {
    Probe(PathBuf),
    Frames { input: PathBuf, json: bool },
    Glitch(GlitchOptions),
    Help,
}

#[derive(Debug, PartialEq)]
struct GlitchOptions {
    input: PathBuf,
    output: PathBuf,
    recipe: Option<PathBuf>,
    transforms: TransformChain,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.get(1) else {
        return Ok(Command::Help);
    };
    let rest = &args[2..];

    match command.as_str() {
        "probe" => {
            let input = rest.first().ok_or_else(|| anyhow!("Missing input file for probe"))?;
            Ok(Command::Probe(PathBuf::from(input)))
        }
        "frames" => {
            let json = rest.iter().any(|a| a == "--json");
            let input = rest
                .iter()
                .find(|a| !a.starts_with("--"))
                .ok_or_else(|| anyhow!("Missing input file for frames"))?;
            Ok(Command::Frames {
                input: PathBuf::from(input),
                json,
            })
        }
        "glitch" => parse_glitch_args(rest).map(Command::Glitch),
        "--help" | "-h" | "help" => Ok(Command::Help),
        other => bail!("Unknown command: {}", other),
    }
}

fn parse_glitch_args(args: &[String]) -> Result<GlitchOptions> {
    let mut input = None;
    let mut output = None;
    let mut recipe = None;
    let mut transforms = TransformChain::new();

    let mut i = 0;
    while i < args.len() {
        let (flag, inline) = match args[i].split_once('=') {
            Some((flag, value)) => (flag, Some(value)),
            None => (args[i].as_str(), None),
        };

        match flag {
            "--input" | "-i" | "--output" | "-o" | "--recipe" | "-r" => {
                let value = match inline {
                    Some(v) => v.to_string(),
                    None => {
                        i += 1;
                        args.get(i)
                            .cloned()
                            .ok_or_else(|| anyhow!("Missing value for {}", flag))?
                    }
                };
                let slot = match flag {
                    "--input" | "-i" => &mut input,
                    "--output" | "-o" => &mut output,
                    _ => &mut recipe,
                };
                *slot = Some(PathBuf::from(value));
            }
            "--identity" | "--strip-keyframes" | "--strip" | "--resync" => {
                if let Some(value) = inline {
                    bail!("{} takes no value (got {})", flag, value);
                }
                transforms.push(match flag {
                    "--identity" => Transform::Identity,
                    "--resync" => Transform::Resync,
                    _ => Transform::StripKeyframes,
                });
            }
            "--stutter" => transforms.push(parse_stutter(inline)?),
            "--lookahead" => {
                let window = match inline {
                    Some(v) => v
                        .parse::<usize>()
                        .map_err(|e| anyhow!("Invalid lookahead window {}: {}", v, e))?,
                    None => DEFAULT_LOOKAHEAD_WINDOW,
                };
                transforms.push(Transform::Lookahead { window });
            }
            other => bail!("Unknown option for glitch: {}", other),
        }
        i += 1;
    }

    let input = input.ok_or_else(|| anyhow!("Missing required --input"))?;
    let output = output.ok_or_else(|| anyhow!("Missing required --output"))?;
    for transform in &transforms.0 {
        transform.validate()?;
    }

    Ok(GlitchOptions {
        input,
        output,
        recipe,
        transforms,
    })
}

/// `STEP:CEILING`, `STEP`, or nothing for the defaults.
fn parse_stutter(value: Option<&str>) -> Result<Transform> {
    let Some(value) = value else {
        return Ok(Transform::stutter());
    };
    let (step, ceiling) = match value.split_once(':') {
        Some((step, ceiling)) => (step, Some(ceiling)),
        None => (value, None),
    };
    let step = step
        .parse::<f64>()
        .map_err(|e| anyhow!("Invalid stutter step {}: {}", step, e))?;
    let ceiling = match ceiling {
        Some(c) => c
            .parse::<f64>()
            .map_err(|e| anyhow!("Invalid stutter ceiling {}: {}", c, e))?,
        None => DEFAULT_STUTTER_CEILING,
    };
    Ok(Transform::Stutter { step, ceiling })
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  mosh probe <file.avi>\n  mosh frames <file.avi> [--json]\n  mosh glitch --input <in.avi> --output <out.avi> [transforms...] [--recipe <file.json>]\n\nTransforms (applied in order, after any recipe):\n  --strip-keyframes        clear the keyframe flag on every video frame\n  --resync                 replace keyframes with the previous delta frame\n  --stutter[=STEP:CEIL]    repeat delta/audio frames more and more (default {}:{})\n  --lookahead[=N]          emit an N-frame window at every position (default {})\n  --identity               rebuild without changes\n",
        DEFAULT_STUTTER_STEP, DEFAULT_STUTTER_CEILING, DEFAULT_LOOKAHEAD_WINDOW
    );
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Serialize)]
struct FrameRow {
    position: usize,
    tag: String,
    kind: FrameKind,
    keyframe: bool,
    flags: u32,
    offset: u32,
    size: u32,
}

fn run_probe(input: &PathBuf) -> Result<()> {
    let file = AviFile::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let info = file.info().with_context(|| format!("Failed to read headers of {}", input.display()))?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string_pretty(&info)?)?;
    Ok(())
}

fn run_frames(input: &PathBuf, json: bool) -> Result<()> {
    let file = AviFile::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let table = file
        .frame_table()
        .with_context(|| format!("Failed to read the index of {}", input.display()))?;

    let rows: Vec<FrameRow> = table
        .records()
        .iter()
        .enumerate()
        .map(|(position, r)| FrameRow {
            position,
            tag: r.tag().to_string(),
            kind: r.kind(),
            keyframe: r.is_keyframe(),
            flags: r.flags(),
            offset: r.offset(),
            size: r.size(),
        })
        .collect();

    let mut stdout = io::stdout().lock();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else {
        writeln!(stdout, "{:>8}  {:4}  {:18}  {:>10}  {:>10}  {:>8}", "#", "tag", "kind", "flags", "offset", "size")?;
        for row in &rows {
            writeln!(
                stdout,
                "{:>8}  {:4}  {:18}  {:#010x}  {:>10}  {:>8}{}",
                row.position,
                row.tag,
                format!("{:?}", row.kind),
                row.flags,
                row.offset,
                row.size,
                if row.keyframe { "  key" } else { "" }
            )?;
        }
    }
    Ok(())
}

fn run_glitch(options: GlitchOptions) -> Result<()> {
    let mut chain = match &options.recipe {
        Some(path) => TransformChain::load(path)
            .with_context(|| format!("Failed to load recipe {}", path.display()))?,
        None => TransformChain::new(),
    };
    chain.extend(options.transforms);
    if chain.is_empty() {
        bail!("No transforms given; pass --identity to rebuild unchanged");
    }

    let mut file = AviFile::open(&options.input)
        .with_context(|| format!("Failed to open {}", options.input.display()))?;
    info!(
        "Applying {} to {}",
        chain.0.iter().map(|t| t.name()).collect::<Vec<_>>().join(" -> "),
        options.input.display()
    );

    let report = file
        .mosh(&chain)
        .with_context(|| format!("Failed to rebuild {}", options.input.display()))?;
    file.save(&options.output)
        .with_context(|| format!("Failed to write {}", options.output.display()))?;

    info!(
        "Wrote {}: {} records ({} video frames), {} bytes",
        options.output.display(),
        report.records,
        report.video_frames,
        report.file_size
    );
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mosh=info".parse()?)
                .add_directive("mosh_core=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args).map_err(|e| {
        print_usage();
        e
    })?;

    match command {
        Command::Probe(input) => run_probe(&input),
        Command::Frames { input, json } => run_frames(&input, json),
        Command::Glitch(options) => run_glitch(options),
        Command::Help => {
            print_usage();
            Ok(())
        }
    }
}

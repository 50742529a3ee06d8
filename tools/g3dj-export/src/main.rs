//! g3dj-export - glTF to libGDX G3DJ converter
//!
//! Loads a glTF/GLB scene, splits meshes to fit the index-width limit and
//! writes the G3DJ JSON document to a file or stdout.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use g3dj::{ExportOptions, FloatPolicy};
use g3dj_export::load_gltf;

#[derive(Parser)]
#[command(name = "g3dj-export")]
#[command(about = "Convert glTF/GLB scenes to libGDX G3DJ documents")]
#[command(version)]
struct Cli {
    /// Input glTF/GLB file
    input: PathBuf,

    /// Output .g3dj file (stdout when omitted)
    output: Option<PathBuf>,

    /// Maximum distinct vertices per mesh part
    #[arg(long, default_value_t = g3dj::DEFAULT_INDEX_LIMIT)]
    max_vertices: u32,

    /// How to render non-finite floats
    #[arg(long, value_enum, default_value_t = FloatPolicyArg::Sentinel)]
    float_policy: FloatPolicyArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum FloatPolicyArg {
    /// Quoted "Infinity"/"-Infinity"/"NaN" tokens
    Sentinel,
    /// Replace non-finite values with 0.0
    Substitute,
}

impl From<FloatPolicyArg> for FloatPolicy {
    fn from(arg: FloatPolicyArg) -> Self {
        match arg {
            FloatPolicyArg::Sentinel => FloatPolicy::Sentinel,
            FloatPolicyArg::Substitute => FloatPolicy::Substitute,
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging (stderr, so stdout stays clean for the document)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let scene = load_gltf(&cli.input)?;
    let options = ExportOptions {
        index_limit: cli.max_vertices,
        float_policy: cli.float_policy.into(),
    };

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output: {:?}", path))?;
            g3dj::export(&scene, &options, BufWriter::new(file))
                .with_context(|| format!("Failed to export {:?}", cli.input))?;
            tracing::info!("Wrote {:?}", path);
        }
        None => {
            g3dj::export(&scene, &options, std::io::stdout().lock())
                .with_context(|| format!("Failed to export {:?}", cli.input))?;
        }
    }

    Ok(())
}

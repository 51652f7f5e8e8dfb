//! braw-probe - inspect and decode Blackmagic RAW clips.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use brawofx_core::RgbFrame;
use brawofx_reader::descriptor::names;
use brawofx_reader::{BrawReader, DecodeRequest, ParamStore, Quality, ReaderConfig};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "braw-probe", version, about = "Inspect and decode Blackmagic RAW clips")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print clip specs as JSON
    Info {
        file: PathBuf,
        /// Directory holding the codec library
        #[arg(long, env = "BRAWOFX_SDK_DIR")]
        sdk_dir: Option<PathBuf>,
    },
    /// Decode one frame to a PFM image
    Decode {
        file: PathBuf,
        /// One-based frame number
        #[arg(long, default_value_t = 1)]
        frame: u32,
        #[arg(long)]
        quality: Option<Quality>,
        #[arg(long, short, default_value = "frame.pfm")]
        output: PathBuf,
        #[arg(long, env = "BRAWOFX_SDK_DIR")]
        sdk_dir: Option<PathBuf>,
        /// JSON reader config
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Info { file, sdk_dir } => info_cmd(&file, load_config(None, sdk_dir)?),
        Command::Decode {
            file,
            frame,
            quality,
            output,
            sdk_dir,
            config,
        } => decode_cmd(&file, frame, quality, &output, load_config(config.as_deref(), sdk_dir)?),
    }
}

fn load_config(path: Option<&Path>, sdk_dir: Option<PathBuf>) -> Result<ReaderConfig> {
    let mut config = match path {
        Some(path) => ReaderConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?
            .overlay_env(|key| std::env::var_os(key)),
        None => ReaderConfig::from_env(),
    };
    if sdk_dir.is_some() {
        config.sdk_dir = sdk_dir;
    }
    Ok(config)
}

fn open(file: &Path, config: ReaderConfig) -> Result<BrawReader<ParamStore>> {
    let mut reader = BrawReader::with_native(ParamStore::new(), config)?;
    ensure!(reader.library_dir().is_some(), "Blackmagic RAW library not found");
    reader
        .set_file(file)
        .with_context(|| format!("binding {}", file.display()))?;
    Ok(reader)
}

fn info_cmd(file: &Path, config: ReaderConfig) -> Result<()> {
    let reader = open(file, config)?;
    println!("{}", serde_json::to_string_pretty(reader.specs())?);
    ensure!(reader.specs().is_usable(), "{} could not be read", file.display());
    Ok(())
}

fn decode_cmd(file: &Path, frame: u32, quality: Option<Quality>, output: &Path, config: ReaderConfig) -> Result<()> {
    let mut reader = open(file, config)?;
    if let Some(quality) = quality {
        reader.params_mut().set_choice(names::QUALITY, quality.index())?;
    }

    let bounds = reader
        .frame_bounds()
        .with_context(|| format!("{} has no usable picture", file.display()))?;
    let mut image = RgbFrame::new(bounds.rect.width(), bounds.rect.height());
    let request = DecodeRequest::rgb(file, frame as f64, bounds.rect);
    reader.decode(&request, &mut image.as_image_mut())?;

    write_pfm(output, &image).with_context(|| format!("writing {}", output.display()))?;
    info!(
        output = %output.display(),
        width = image.width,
        height = image.height,
        frame,
        "frame written"
    );
    Ok(())
}

/// Write a little-endian color PFM. Rows are stored bottom to top.
fn write_pfm(path: &Path, frame: &RgbFrame) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "PF\n{} {}\n-1.0\n", frame.width, frame.height)?;

    let row_len = frame.width as usize * 3;
    if row_len > 0 {
        for row in frame.data.chunks_exact(row_len).rev() {
            let le: Vec<f32> = row.iter().map(|v| f32::from_bits(v.to_bits().to_le())).collect();
            out.write_all(bytemuck::cast_slice(&le))?;
        }
    }
    out.flush()?;
    Ok(())
}

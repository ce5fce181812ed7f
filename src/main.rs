use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use rpi_volume::{
    Assembly, AssemblyOptions, CancelToken, DicomSliceDecoder, Orientation, Resolution, SortBy,
    TracingProgress, VolumeAssembler, collect_series, gantry_tilt,
};

#[derive(Parser)]
#[command(name = "rpi-volume")]
#[command(about = "Assemble DICOM series into RPI-ordered raw volumes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the .dcm files of a directory into one volume
    Assemble {
        /// Directory holding one series
        dir: PathBuf,

        /// JSON file with assembly options; flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Acquisition plane (axial, coronal, sagittal)
        #[arg(short, long)]
        orientation: Option<Orientation>,

        /// Scale of the in-plane resolution, 1.0 keeps full size
        #[arg(long, conflicts_with = "pixels")]
        fraction: Option<f64>,

        /// Explicit in-plane size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_pixels)]
        pixels: Option<(usize, usize)>,

        /// Slice ordering (position, table, instance, name)
        #[arg(long, default_value = "position")]
        sort: SortBy,

        /// Destination of the raw i16 volume
        #[arg(short = 'O', long, default_value = "volume.raw")]
        output: PathBuf,

        /// Undo the gantry tilt recorded in the first slice
        #[arg(long)]
        fix_tilt: bool,

        /// Write the central cross-section as a PNG
        #[arg(long)]
        preview: Option<PathBuf>,
    },
}

fn parse_pixels(value: &str) -> Result<(usize, usize), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let parse = |s: &str| s.trim().parse::<usize>().map_err(|e| e.to_string());
    Ok((parse(width)?, parse(height)?))
}

/// Directory the output lands in, so the backing file can be renamed into place.
fn output_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Assemble {
            dir,
            config,
            orientation,
            fraction,
            pixels,
            sort,
            output,
            fix_tilt,
            preview,
        } => {
            let mut options = match config {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str::<AssemblyOptions>(&text)
                        .with_context(|| format!("Invalid options in {}", path.display()))?
                }
                None => AssemblyOptions::default(),
            };
            if let Some(orientation) = orientation {
                options.orientation = orientation;
            }
            if let Some(fraction) = fraction {
                options.resolution = Resolution::Fraction(fraction);
            }
            if let Some((width, height)) = pixels {
                options.resolution = Resolution::Pixels { width, height };
            }
            if options.work_dir.is_none() {
                options.work_dir = Some(output_dir(&output));
            }

            assemble(dir, options, sort, output, fix_tilt, preview)?;
        }
    }

    Ok(())
}

fn assemble(
    dir: PathBuf,
    options: AssemblyOptions,
    sort: SortBy,
    output: PathBuf,
    fix_tilt: bool,
    preview: Option<PathBuf>,
) -> Result<()> {
    let files = collect_series(&dir, sort)
        .with_context(|| format!("Failed to list series in {}", dir.display()))?;
    if files.is_empty() {
        bail!("No .dcm files found in {}", dir.display());
    }
    info!(count = files.len(), "collected series");

    let orientation = options.orientation;
    let assembler = VolumeAssembler::new(DicomSliceDecoder, options);
    let mut progress = TracingProgress::new(files.len());
    let cancel = CancelToken::new();

    let (mut volume, scalar_range) = match assembler.assemble(&files, &mut progress, &cancel)? {
        Assembly::Completed {
            volume,
            scalar_range,
        } => (volume, scalar_range),
        Assembly::Cancelled { processed } => bail!("Assembly cancelled after {processed} slices"),
    };

    if fix_tilt {
        match gantry_tilt(&files[0])? {
            Some(tilt) if tilt != 0.0 && orientation == Orientation::Axial => {
                info!(tilt, "correcting gantry tilt");
                volume.correct_tilt(tilt)?;
            }
            Some(tilt) if tilt != 0.0 => warn!(tilt, %orientation, "gantry tilt ignored"),
            _ => info!("no gantry tilt recorded"),
        }
    }

    volume
        .persist(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    let sidecar = output.with_extension("json");
    fs::write(&sidecar, serde_json::to_string_pretty(&volume.info())?)
        .with_context(|| format!("Failed to write {}", sidecar.display()))?;

    if let Some(preview) = preview {
        let centre = match orientation {
            Orientation::Axial => volume.dim().0 / 2,
            Orientation::Coronal => volume.dim().1 / 2,
            Orientation::Sagittal => volume.dim().2 / 2,
        };
        volume.save_cross_section(centre, orientation, &preview)?;
    }

    println!(
        "{} -> {:?} voxels, spacing {:?}, range {:?}",
        output.display(),
        volume.dim(),
        volume.spacing(),
        scalar_range
    );
    Ok(())
}

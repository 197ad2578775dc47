use anyhow::{Context, Result};
use burn_ndarray::NdArray;
use clap::{Parser, Subcommand};
use nrk_core::points::tensor_to_points;
use nrk_core::transform::{ThinPlateSplineTransform, TransformDirection};
use nrk_io::{
    read_nrrd, read_nrrd_file, ErrorPolicy, ImportOptions, ImportOutput, ImportResult, OutputMode,
    Parallelism,
};
use std::path::{Path, PathBuf};
use tracing::info;

mod points_json;

use points_json::{LandmarkFile, PointsFile};

type Backend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "nrk")]
#[command(about = "Import NRRD neuron volumes and warp points with thin-plate splines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a NRRD file, a directory of NRRD files, or a list of files
    Import {
        /// Files or directories to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// JSON file with import options; flags override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Keep voxels >= threshold when building dotprops
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Scan directories recursively
        #[arg(long)]
        include_subdirs: bool,

        /// Worker policy (auto, on, off or a worker count)
        #[arg(short, long)]
        parallel: Option<Parallelism>,

        /// What to build from each file (voxels, dotprops, raw)
        #[arg(short, long)]
        output: Option<OutputMode>,

        /// What to do with files that fail to convert (raise, log, ignore)
        #[arg(short, long)]
        errors: Option<ErrorPolicy>,

        /// Neighbours per point for dotprops
        #[arg(short)]
        k: Option<usize>,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Print the header of a NRRD file
    Info {
        file: PathBuf,
    },

    /// Warp points with a thin-plate spline fitted to landmarks
    Xform {
        /// JSON file with "source" and "target" landmark lists
        #[arg(short, long)]
        landmarks: PathBuf,

        /// JSON file with points to warp
        #[arg(short, long)]
        points: PathBuf,

        /// Map target space back to source space
        #[arg(long)]
        inverse: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            paths,
            config,
            threshold,
            include_subdirs,
            parallel,
            output,
            errors,
            k,
            progress,
        } => {
            let mut options = match config {
                Some(path) => load_options(&path)?,
                None => ImportOptions::default(),
            };
            options.threshold = threshold.or(options.threshold);
            options.include_subdirs |= include_subdirs;
            options.show_progress |= progress;
            if let Some(parallel) = parallel {
                options.parallel = parallel;
            }
            if let Some(output) = output {
                options.output = output;
            }
            if let Some(errors) = errors {
                options.errors = errors;
            }
            if let Some(k) = k {
                options.dotprops.k = k;
            }
            import(paths, &options)?;
        }
        Commands::Info { file } => {
            info_file(&file)?;
        }
        Commands::Xform {
            landmarks,
            points,
            inverse,
        } => {
            xform(&landmarks, &points, inverse)?;
        }
    }

    Ok(())
}

fn load_options(path: &Path) -> Result<ImportOptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn import(mut paths: Vec<PathBuf>, options: &ImportOptions) -> Result<()> {
    let device = Default::default();
    let output = if paths.len() == 1 {
        read_nrrd::<Backend>(paths.remove(0), options, &device)?
    } else {
        read_nrrd::<Backend>(paths, options, &device)?
    };

    match output {
        ImportOutput::Single(result) => print_result(0, &result),
        ImportOutput::Collection(results) => {
            for (i, result) in results.iter().enumerate() {
                print_result(i, result);
            }
            info!("Imported {} neurons", results.len());
        }
        ImportOutput::RawBatch { data, headers } => {
            for (i, (array, header)) in data.iter().zip(&headers).enumerate() {
                println!(
                    "{i}\traw\t{:?}\t{}",
                    array.shape(),
                    header.field("type").unwrap_or("?")
                );
            }
        }
    }
    Ok(())
}

fn print_result(index: usize, result: &ImportResult<Backend>) {
    match result {
        ImportResult::Voxels(v) => {
            let [x, y, z] = v.neuron.shape();
            let units = v
                .neuron
                .units()
                .map(|u| u.to_string())
                .unwrap_or_else(|| format!("{:?}", v.neuron.spacing().to_array()));
            println!("{}\tvoxels\t{x}x{y}x{z}\t{units}", v.name);
        }
        ImportResult::Dotprops(d) => {
            println!("{}\tdotprops\t{} points\tk={}", d.name, d.neuron.len(), d.neuron.k());
        }
        ImportResult::Raw { data, header } => {
            println!(
                "{index}\traw\t{:?}\t{}",
                data.shape(),
                header.field("type").unwrap_or("?")
            );
        }
        ImportResult::Failure => println!("{index}\tfailed"),
    }
}

fn info_file(file: &Path) -> Result<()> {
    let (data, header) = read_nrrd_file(file)?;

    println!("{}", header.magic());
    for (name, value) in header.fields() {
        println!("{name}: {value}");
    }
    for (key, value) in header.key_values() {
        println!("{key}:={value}");
    }
    println!();
    println!("data shape: {:?}", data.shape());
    if let Some(spacing) = header.spacing()? {
        println!("voxel spacing: {:?}", spacing);
    }
    Ok(())
}

fn xform(landmarks: &Path, points: &Path, inverse: bool) -> Result<()> {
    let device = Default::default();
    let landmarks = LandmarkFile::load(landmarks)?;
    let points = PointsFile::load(points)?;

    let direction = if inverse {
        TransformDirection::Inverse
    } else {
        TransformDirection::Forward
    };
    let tps = ThinPlateSplineTransform::<Backend>::from_points(
        &landmarks.source_points(),
        &landmarks.target_points(),
        direction,
        &device,
    )?;
    info!("Fitted thin-plate spline to {} landmarks", tps.n_landmarks());

    let warped = tps.xform(points.clone().into_point_set::<Backend>(&device)?)?;
    let warped = points.with_points(&tensor_to_points(&warped)?);
    println!("{}", serde_json::to_string_pretty(&warped)?);
    Ok(())
}

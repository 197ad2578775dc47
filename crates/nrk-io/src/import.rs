//! Batch import of NRRD volumes as neurons.
//!
//! A single file, a directory, or an explicit list of files is converted
//! into voxel neurons, dotprops, or left as raw arrays. Batches can run on
//! a worker pool; results always come back in input order. Conversion
//! failures of individual files follow an [`ErrorPolicy`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::bail;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::ArrayD;
use nrk_core::neuron::voxel::voxel_points;
use nrk_core::neuron::{make_dotprops, Dotprops, DotpropsOptions, VoxelNeuron};
use nrk_core::points::tensor_to_points;
use nrk_core::spatial::{AxisUnits, Spacing};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::dispatch::{default_workers, ordered_map};
use crate::error::{IoError, Result};
use crate::nrrd_header::NrrdHeader;
use crate::nrrd_io::read_nrrd_file;
use crate::progress::{ConsoleProgressCallback, ProgressCallback, ProgressTracker, SilentProgress};

/// Batches smaller than this run sequentially under [`Parallelism::Auto`].
pub const AUTO_PARALLEL_MIN_FILES: usize = 10;

/// File extension picked up from directories (case-sensitive).
pub const NRRD_EXTENSION: &str = "nrrd";

/// What to import from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportSource {
    /// A single file, or a directory to scan.
    Path(PathBuf),
    /// Explicit list of files, used as given.
    Paths(Vec<PathBuf>),
}

impl From<PathBuf> for ImportSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImportSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<&str> for ImportSource {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<Vec<PathBuf>> for ImportSource {
    fn from(paths: Vec<PathBuf>) -> Self {
        Self::Paths(paths)
    }
}

/// Worker policy for batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parallelism {
    /// Parallel from [`AUTO_PARALLEL_MIN_FILES`] files on.
    #[default]
    Auto,
    Off,
    /// All cores but two.
    On,
    /// Exactly this many workers.
    Workers(usize),
}

impl FromStr for Parallelism {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "off" | "false" => Ok(Self::Off),
            "on" | "true" => Ok(Self::On),
            other => match other.parse::<usize>() {
                Ok(0) => Err(IoError::invalid_argument("worker count must be at least 1")),
                Ok(n) => Ok(Self::Workers(n)),
                Err(_) => Err(IoError::invalid_argument(format!(
                    "parallel must be auto, on, off or a worker count, got {s:?}"
                ))),
            },
        }
    }
}

/// What each file becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Decoded array and header, no neuron.
    Raw,
    #[default]
    Voxels,
    Dotprops,
}

impl FromStr for OutputMode {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raw" => Ok(Self::Raw),
            "voxels" => Ok(Self::Voxels),
            "dotprops" => Ok(Self::Dotprops),
            _ => Err(IoError::invalid_argument(format!(
                "output must be raw, voxels or dotprops, got {s:?}"
            ))),
        }
    }
}

/// What to do when a single file fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Abort with [`IoError::ImportError`].
    Raise,
    /// Log at error level and skip the file.
    #[default]
    Log,
    /// Skip the file silently.
    Ignore,
}

impl FromStr for ErrorPolicy {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raise" => Ok(Self::Raise),
            "log" => Ok(Self::Log),
            "ignore" => Ok(Self::Ignore),
            _ => Err(IoError::invalid_argument(format!(
                "errors must be raise, log or ignore, got {s:?}"
            ))),
        }
    }
}

/// Import configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Dotprops only: keep voxels `>= threshold` instead of all non-zero voxels.
    /// A threshold of zero behaves like no threshold.
    pub threshold: Option<f64>,
    /// Scan directories recursively.
    pub include_subdirs: bool,
    pub parallel: Parallelism,
    pub output: OutputMode,
    pub errors: ErrorPolicy,
    /// Forwarded to `make_dotprops`.
    pub dotprops: DotpropsOptions,
    /// Draw a terminal progress bar.
    pub show_progress: bool,
}

impl ImportOptions {
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_errors(mut self, errors: ErrorPolicy) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_parallel(mut self, parallel: Parallelism) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.parallel == Parallelism::Workers(0) {
            return Err(IoError::invalid_argument("worker count must be at least 1"));
        }
        if let Some(t) = self.threshold {
            if !t.is_finite() {
                return Err(IoError::invalid_argument(format!(
                    "threshold must be finite, got {t}"
                )));
            }
        }
        Ok(())
    }
}

/// A converted neuron with the metadata of the file it came from.
#[derive(Debug, Clone)]
pub struct Imported<N> {
    pub neuron: N,
    /// File name up to the first `.`.
    pub name: String,
    /// Path the neuron was read from.
    pub origin: PathBuf,
    pub header: NrrdHeader,
}

impl<N> Imported<N> {
    pub fn new(neuron: N, name: &str, origin: &Path, header: NrrdHeader) -> Self {
        Self {
            neuron,
            name: name.to_string(),
            origin: origin.to_path_buf(),
            header,
        }
    }
}

/// Outcome of importing one file.
#[derive(Debug, Clone)]
pub enum ImportResult<B: Backend> {
    Raw { data: ArrayD<f32>, header: NrrdHeader },
    Voxels(Imported<VoxelNeuron<B>>),
    Dotprops(Imported<Dotprops>),
    /// Conversion failed and the error policy swallowed it.
    Failure,
}

impl<B: Backend> ImportResult<B> {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }

    /// Neuron name, if this is a converted neuron.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Voxels(v) => Some(&v.name),
            Self::Dotprops(d) => Some(&d.name),
            _ => None,
        }
    }

    pub fn header(&self) -> Option<&NrrdHeader> {
        match self {
            Self::Raw { header, .. } => Some(header),
            Self::Voxels(v) => Some(&v.header),
            Self::Dotprops(d) => Some(&d.header),
            Self::Failure => None,
        }
    }
}

/// Result of [`read_nrrd`].
#[derive(Debug, Clone)]
pub enum ImportOutput<B: Backend> {
    /// A single file was given.
    Single(ImportResult<B>),
    /// Batch in raw mode: arrays and headers in input order.
    RawBatch {
        data: Vec<ArrayD<f32>>,
        headers: Vec<NrrdHeader>,
    },
    /// Batch of converted neurons in input order, failures removed.
    Collection(Vec<ImportResult<B>>),
}

impl<B: Backend> ImportOutput<B> {
    /// Number of items carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(result) => usize::from(!result.is_failure()),
            Self::RawBatch { data, .. } => data.len(),
            Self::Collection(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Import NRRD files with the options' own progress reporting.
pub fn read_nrrd<B: Backend>(
    source: impl Into<ImportSource>,
    options: &ImportOptions,
    device: &B::Device,
) -> Result<ImportOutput<B>> {
    if options.show_progress {
        read_nrrd_with_progress(source, options, device, &ConsoleProgressCallback::new())
    } else {
        read_nrrd_with_progress(source, options, device, &SilentProgress)
    }
}

/// Import NRRD files, reporting per-file progress to `progress`.
///
/// # Errors
/// * `InvalidArgument` for invalid options
/// * `Io` if a directory cannot be scanned
/// * `ImportError` for the first failing file under [`ErrorPolicy::Raise`]
/// * `Codec` for unreadable files in [`OutputMode::Raw`]
pub fn read_nrrd_with_progress<B: Backend>(
    source: impl Into<ImportSource>,
    options: &ImportOptions,
    device: &B::Device,
    progress: &dyn ProgressCallback,
) -> Result<ImportOutput<B>> {
    options.validate()?;

    let files = match source.into() {
        ImportSource::Path(path) if path.is_dir() => discover_files(&path, options.include_subdirs)?,
        ImportSource::Path(path) => {
            return import_file(&path, options, device).map(ImportOutput::Single);
        }
        ImportSource::Paths(paths) => paths,
    };

    let workers = resolve_workers(options.parallel, files.len())?;
    tracing::info!(files = files.len(), workers, "importing NRRD files");

    let tracker = ProgressTracker::start(progress, files.len());
    let results = match ordered_map(workers, &files, &tracker, |file| {
        import_file(file, options, device)
    }) {
        Ok(results) => results,
        Err(e) => {
            tracker.error(&e.to_string());
            return Err(e);
        }
    };
    tracker.complete();

    let output = match options.output {
        OutputMode::Raw => {
            let (data, headers) = results
                .into_iter()
                .filter_map(|r| match r {
                    ImportResult::Raw { data, header } => Some((data, header)),
                    _ => None,
                })
                .unzip();
            ImportOutput::RawBatch { data, headers }
        }
        OutputMode::Voxels | OutputMode::Dotprops => {
            let total = results.len();
            let neurons: Vec<_> = results.into_iter().filter(|r| !r.is_failure()).collect();
            if neurons.len() < total {
                tracing::warn!(
                    "{} of {} files could not be converted",
                    total - neurons.len(),
                    total
                );
            }
            ImportOutput::Collection(neurons)
        }
    };
    Ok(output)
}

/// Convert a single file. Never starts a worker pool.
pub fn import_file<B: Backend>(
    path: &Path,
    options: &ImportOptions,
    device: &B::Device,
) -> Result<ImportResult<B>> {
    tracing::debug!(path = %path.display(), output = ?options.output, "importing file");

    if options.output == OutputMode::Raw {
        let (data, header) = read_nrrd_file(path).map_err(IoError::Codec)?;
        return Ok(ImportResult::Raw { data, header });
    }

    let name = neuron_name(path);
    let converted = read_nrrd_file(path).and_then(|(data, header)| {
        // Signed for point coordinates, magnitudes for the voxel grid
        let diagonal = header.spacing()?.unwrap_or([1.0; 3]);
        let spacing = diagonal.map(f64::abs);
        let labels = header.space_units();
        let grid = grid_tensor::<B>(&data, device)?;

        Ok(match options.output {
            OutputMode::Dotprops => {
                let points = voxel_points(&grid, options.threshold, &Spacing::new(diagonal));
                let mut dotprops = make_dotprops(tensor_to_points(&points)?, &options.dotprops)?;
                if let Some(units) = labels
                    .as_deref()
                    .and_then(|l| AxisUnits::from_label_slice(Spacing::uniform(1.0), l))
                {
                    dotprops.set_units(units);
                }
                ImportResult::Dotprops(Imported::new(dotprops, &name, path, header))
            }
            _ => {
                let mut voxels = VoxelNeuron::new(grid, Spacing::new(spacing))?;
                if let Some(units) = labels
                    .as_deref()
                    .and_then(|l| AxisUnits::from_label_slice(Spacing::new(spacing), l))
                {
                    voxels = voxels.with_units(units);
                }
                ImportResult::Voxels(Imported::new(voxels, &name, path, header))
            }
        })
    });

    match converted {
        Ok(result) => Ok(result),
        Err(source) => match options.errors {
            ErrorPolicy::Raise => Err(IoError::import(path, source)),
            ErrorPolicy::Log => {
                tracing::error!("Error converting file {} to neuron: {:#}", name, source);
                Ok(ImportResult::Failure)
            }
            ErrorPolicy::Ignore => {
                tracing::debug!(path = %path.display(), "skipping file: {:#}", source);
                Ok(ImportResult::Failure)
            }
        },
    }
}

/// Dense `[x, y, z]` tensor from a decoded volume.
fn grid_tensor<B: Backend>(data: &ArrayD<f32>, device: &B::Device) -> anyhow::Result<Tensor<B, 3>> {
    let shape: [usize; 3] = match data.shape() {
        &[x, y, z] => [x, y, z],
        other => bail!("Expected a 3D volume, found {} dimensions", other.len()),
    };
    // Logical iteration order is row-major regardless of memory layout
    let values: Vec<f32> = data.iter().copied().collect();
    Ok(Tensor::from_data(TensorData::new(values, shape), device))
}

/// File name up to the first `.`.
fn neuron_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .and_then(|n| n.split('.').next().map(str::to_string))
        .unwrap_or_default()
}

/// NRRD files in `dir`, sorted by path.
pub fn discover_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let is_nrrd = |p: &Path| p.extension().is_some_and(|e| e == NRRD_EXTENSION);

    let mut files = Vec::new();
    if recursive {
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && is_nrrd(entry.path()) {
                files.push(entry.into_path());
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_nrrd(&path) {
                files.push(path);
            }
        }
    }
    files.sort();

    tracing::debug!(dir = %dir.display(), recursive, found = files.len(), "scanned for NRRD files");
    Ok(files)
}

/// Worker count for a batch of `n_files`.
pub fn resolve_workers(parallel: Parallelism, n_files: usize) -> Result<usize> {
    match parallel {
        Parallelism::Off => Ok(1),
        Parallelism::Auto if n_files < AUTO_PARALLEL_MIN_FILES => Ok(1),
        Parallelism::Auto | Parallelism::On => Ok(default_workers()),
        Parallelism::Workers(0) => Err(IoError::invalid_argument("worker count must be at least 1")),
        Parallelism::Workers(n) => Ok(n),
    }
}

//! NRRD volume codec and batch import of neuron volumes.

pub mod error;
pub mod nrrd_header;
pub mod nrrd_io;
pub mod progress;
pub mod dispatch;
pub mod import;

pub use error::{IoError, Result};
pub use nrrd_header::{Encoding, Endian, NrrdHeader, ScalarType};
pub use nrrd_io::{read_nrrd_file, write_nrrd, write_nrrd_batch, NrrdDestination};
pub use import::{
    discover_files, import_file, read_nrrd, read_nrrd_with_progress, ErrorPolicy, ImportOptions,
    ImportOutput, ImportResult, ImportSource, Imported, OutputMode, Parallelism,
};
pub use progress::{ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo, SilentProgress};

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use burn::tensor::backend::Backend;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array3, ArrayD, IxDyn, ShapeBuilder};
use nrk_core::neuron::VoxelNeuron;

use crate::error::IoError;
use crate::nrrd_header::{format_vector, Encoding, Endian, NrrdHeader, ScalarType};

/// Read a NRRD file into an array indexed in NRRD axis order.
///
/// The first axis of `sizes` is the fastest on disk, so a 3D volume comes
/// back indexed `[x, y, z]`. Samples are converted to `f32`.
pub fn read_nrrd_file<P: AsRef<Path>>(path: P) -> Result<(ArrayD<f32>, NrrdHeader)> {
    let path = path.as_ref();
    let file = File::open(path).context("Failed to open NRRD file")?;
    let mut reader = BufReader::new(file);

    let header = NrrdHeader::parse(&mut reader)?;
    if header.field("data file").is_some() || header.field("datafile").is_some() {
        bail!("Detached NRRD data files are not supported");
    }

    let mut payload = Vec::new();
    reader
        .read_to_end(&mut payload)
        .context("Failed to read NRRD data section")?;

    let data = decode_data(&header, &payload)?;
    Ok((data, header))
}

/// Decode the data section that follows `header`.
pub fn decode_data(header: &NrrdHeader, payload: &[u8]) -> Result<ArrayD<f32>> {
    let sizes = header.sizes()?;
    let scalar = header.scalar_type()?;
    let encoding = header.encoding()?;
    let endian = header.endian()?;
    let count = sizes
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| anyhow!("NRRD sizes {:?} overflow the sample count", sizes))?;
    let byte_count = count
        .checked_mul(scalar.size())
        .ok_or_else(|| anyhow!("NRRD sizes {:?} overflow the data length", sizes))?;

    let line_skip = skip_field(header, "line skip")?.unwrap_or(0);
    if line_skip < 0 {
        bail!("Invalid NRRD line skip {line_skip}");
    }
    let payload = skip_lines(payload, line_skip as usize)?;

    let byte_skip = skip_field(header, "byte skip")?.unwrap_or(0);
    let values = match encoding {
        Encoding::Raw => {
            let bytes = skip_bytes(payload, byte_skip, byte_count)?;
            decode_binary(bytes, scalar, endian, count)?
        }
        Encoding::Gzip => {
            if byte_skip < 0 {
                bail!("byte skip: -1 is only valid for raw encoding");
            }
            let mut inflated = Vec::new();
            GzDecoder::new(payload)
                .read_to_end(&mut inflated)
                .context("Failed to decompress NRRD gzip data")?;
            let bytes = skip_bytes(&inflated, byte_skip, byte_count)?;
            decode_binary(bytes, scalar, endian, count)?
        }
        Encoding::Ascii => decode_ascii(payload, count)?,
    };

    ArrayD::from_shape_vec(IxDyn(&sizes).f(), values).context("NRRD data does not match sizes")
}

fn skip_field(header: &NrrdHeader, name: &str) -> Result<Option<i64>> {
    header
        .field(name)
        .map(|v| v.parse::<i64>().with_context(|| format!("Invalid NRRD {name}")))
        .transpose()
}

fn skip_lines(payload: &[u8], lines: usize) -> Result<&[u8]> {
    let mut offset = 0;
    for _ in 0..lines {
        let newline = payload[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| anyhow!("NRRD line skip runs past end of data"))?;
        offset += newline + 1;
    }
    Ok(&payload[offset..])
}

/// Apply `byte skip`; `-1` means the samples sit at the end of the data.
fn skip_bytes(payload: &[u8], skip: i64, needed: usize) -> Result<&[u8]> {
    let start = match skip {
        -1 => payload
            .len()
            .checked_sub(needed)
            .ok_or_else(|| anyhow!("NRRD data too short: need {needed} bytes"))?,
        s if s >= 0 => s as usize,
        s => bail!("Invalid NRRD byte skip {s}"),
    };
    let bytes = payload
        .get(start..)
        .ok_or_else(|| anyhow!("NRRD byte skip runs past end of data"))?;
    if bytes.len() < needed {
        bail!(
            "NRRD data too short: need {} bytes, found {}",
            needed,
            bytes.len()
        );
    }
    Ok(&bytes[..needed])
}

fn decode_binary(bytes: &[u8], scalar: ScalarType, endian: Endian, count: usize) -> Result<Vec<f32>> {
    let values = match endian {
        Endian::Little => decode_samples::<LittleEndian>(bytes, scalar),
        Endian::Big => decode_samples::<BigEndian>(bytes, scalar),
    };
    if values.len() != count {
        bail!("Expected {} samples, decoded {}", count, values.len());
    }
    Ok(values)
}

fn decode_samples<E: ByteOrder>(bytes: &[u8], scalar: ScalarType) -> Vec<f32> {
    let chunks = bytes.chunks_exact(scalar.size());
    match scalar {
        ScalarType::Int8 => bytes.iter().map(|&b| b as i8 as f32).collect(),
        ScalarType::UInt8 => bytes.iter().map(|&b| b as f32).collect(),
        ScalarType::Int16 => chunks.map(|c| E::read_i16(c) as f32).collect(),
        ScalarType::UInt16 => chunks.map(|c| E::read_u16(c) as f32).collect(),
        ScalarType::Int32 => chunks.map(|c| E::read_i32(c) as f32).collect(),
        ScalarType::UInt32 => chunks.map(|c| E::read_u32(c) as f32).collect(),
        ScalarType::Int64 => chunks.map(|c| E::read_i64(c) as f32).collect(),
        ScalarType::UInt64 => chunks.map(|c| E::read_u64(c) as f32).collect(),
        ScalarType::Float => chunks.map(E::read_f32).collect(),
        ScalarType::Double => chunks.map(|c| E::read_f64(c) as f32).collect(),
    }
}

fn decode_ascii(payload: &[u8], count: usize) -> Result<Vec<f32>> {
    let text = std::str::from_utf8(payload).context("NRRD ascii data is not valid UTF-8")?;
    let values = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .take(count)
        .map(|t| t.parse::<f32>().with_context(|| format!("Invalid ascii sample {:?}", t)))
        .collect::<Result<Vec<_>>>()?;
    if values.len() != count {
        bail!("Expected {} ascii samples, found {}", count, values.len());
    }
    Ok(values)
}

/// Write a voxel neuron as a gzip-compressed NRRD file.
///
/// Existing files are overwritten. `compression_level` must be in `1..=9`
/// and is checked before anything touches the file system.
pub fn write_nrrd<B: Backend, P: AsRef<Path>>(
    path: P,
    neuron: &VoxelNeuron<B>,
    compression_level: u32,
) -> Result<(), IoError> {
    check_level(compression_level)?;
    write_volume(path.as_ref(), neuron, compression_level).map_err(IoError::Codec)
}

fn check_level(compression_level: u32) -> Result<(), IoError> {
    if !(1..=9).contains(&compression_level) {
        return Err(IoError::invalid_argument(format!(
            "compression level must be in 1..=9, got {compression_level}"
        )));
    }
    Ok(())
}

/// Where [`write_nrrd_batch`] puts its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NrrdDestination {
    /// Existing folder; each neuron is written to `{name}.nrrd`.
    Directory(PathBuf),
    /// File name template with `{name}` and/or `{index}` placeholders,
    /// e.g. `out/voxels-{name}.nrrd`. Without a placeholder it can only
    /// hold a single neuron.
    Pattern(String),
    /// One path per neuron, in order.
    Files(Vec<PathBuf>),
}

impl NrrdDestination {
    /// `Directory` if `path` is an existing folder, otherwise `Pattern`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.is_dir() {
            Self::Directory(path.to_path_buf())
        } else {
            Self::Pattern(path.to_string_lossy().into_owned())
        }
    }

    fn resolve(&self, names: &[&str]) -> Result<Vec<PathBuf>, IoError> {
        let paths: Vec<PathBuf> = match self {
            Self::Directory(dir) => {
                if !dir.is_dir() {
                    return Err(IoError::invalid_argument(format!(
                        "output folder {} does not exist",
                        dir.display()
                    )));
                }
                names.iter().map(|name| dir.join(format!("{name}.nrrd"))).collect()
            }
            Self::Pattern(pattern) => names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    PathBuf::from(pattern.replace("{name}", name).replace("{index}", &i.to_string()))
                })
                .collect(),
            Self::Files(files) => {
                if files.len() != names.len() {
                    return Err(IoError::invalid_argument(format!(
                        "got {} file names for {} neurons",
                        files.len(),
                        names.len()
                    )));
                }
                files.clone()
            }
        };

        let mut seen = HashSet::new();
        for path in &paths {
            if !seen.insert(path) {
                return Err(IoError::invalid_argument(format!(
                    "more than one neuron would be written to {}",
                    path.display()
                )));
            }
        }
        Ok(paths)
    }
}

/// Write several named voxel neurons, one NRRD file each.
///
/// The compression level and every output path are checked before the
/// first file is created: names must be non-empty and no two neurons may
/// share a path. Files are written in input order and their paths are
/// returned in that order.
pub fn write_nrrd_batch<'a, B, I>(
    neurons: I,
    destination: &NrrdDestination,
    compression_level: u32,
) -> Result<Vec<PathBuf>, IoError>
where
    B: Backend,
    I: IntoIterator<Item = (&'a str, &'a VoxelNeuron<B>)>,
{
    check_level(compression_level)?;

    let neurons: Vec<(&str, &VoxelNeuron<B>)> = neurons.into_iter().collect();
    if let Some(i) = neurons.iter().position(|(name, _)| name.is_empty()) {
        return Err(IoError::invalid_argument(format!("neuron {i} has an empty name")));
    }
    let names: Vec<&str> = neurons.iter().map(|(name, _)| *name).collect();
    let paths = destination.resolve(&names)?;

    for ((_, neuron), path) in neurons.iter().zip(&paths) {
        write_volume(path, neuron, compression_level)
            .with_context(|| format!("Failed to write {}", path.display()))
            .map_err(IoError::Codec)?;
    }
    tracing::info!(count = paths.len(), "wrote NRRD batch");
    Ok(paths)
}

fn write_volume<B: Backend>(path: &Path, neuron: &VoxelNeuron<B>, level: u32) -> Result<()> {
    let header = voxel_header(neuron);
    let [nx, ny, nz] = neuron.shape();

    let values: Vec<f32> = neuron.grid().to_data().iter::<f32>().collect();
    let grid = Array3::from_shape_vec((nx, ny, nz), values).context("Voxel grid has wrong size")?;

    let file = File::create(path).context("Failed to create NRRD file")?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(header.format().as_bytes())
        .context("Failed to write NRRD header")?;

    let mut encoder = GzEncoder::new(writer, Compression::new(level));
    let mut buf = [0u8; 4];
    // Reversed axes put x fastest, matching `sizes: nx ny nz`
    for &v in grid.t().iter() {
        LittleEndian::write_f32(&mut buf, v);
        encoder.write_all(&buf).context("Failed to write NRRD data")?;
    }
    encoder
        .finish()
        .context("Failed to finish gzip stream")?
        .flush()
        .context("Failed to flush NRRD file")?;

    tracing::debug!(path = %path.display(), level, "wrote NRRD volume");
    Ok(())
}

/// Header describing `neuron` as a float volume.
fn voxel_header<B: Backend>(neuron: &VoxelNeuron<B>) -> NrrdHeader {
    let [nx, ny, nz] = neuron.shape();

    let mut header = NrrdHeader::new();
    header.set_field("type", ScalarType::Float.name());
    header.set_field("dimension", "3");
    header.set_field("space dimension", "3");
    header.set_field("sizes", format!("{nx} {ny} {nz}"));
    let directions: Vec<String> = neuron
        .spacing()
        .to_diagonal()
        .iter()
        .map(|row| format_vector(row))
        .collect();
    header.set_field("space directions", directions.join(" "));
    if let Some(units) = neuron.units() {
        let labels: Vec<String> = units.labels().iter().map(|l| format!("\"{l}\"")).collect();
        header.set_field("space units", labels.join(" "));
    }
    header.set_field("endian", "little");
    header.set_field("encoding", "gzip");
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Tensor, TensorData};
    use burn_ndarray::NdArray;
    use nrk_core::spatial::{AxisUnits, Spacing};
    use std::io::Cursor;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    fn header(fields: &[(&str, &str)]) -> NrrdHeader {
        let mut header = NrrdHeader::new();
        for (name, value) in fields {
            header.set_field(*name, *value);
        }
        header
    }

    #[test]
    fn test_decode_big_endian_uint16() {
        let header = header(&[
            ("type", "ushort"),
            ("dimension", "2"),
            ("sizes", "2 2"),
            ("endian", "big"),
            ("encoding", "raw"),
        ]);
        let payload = [0u8, 1, 0, 2, 1, 0, 0xff, 0xff];
        let data = decode_data(&header, &payload).unwrap();

        // First axis fastest
        assert_eq!(data[[0, 0]], 1.0);
        assert_eq!(data[[1, 0]], 2.0);
        assert_eq!(data[[0, 1]], 256.0);
        assert_eq!(data[[1, 1]], 65535.0);
    }

    #[test]
    fn test_decode_ascii_with_line_skip() {
        let header = header(&[
            ("type", "int"),
            ("dimension", "1"),
            ("sizes", "3"),
            ("encoding", "ascii"),
            ("line skip", "1"),
        ]);
        let data = decode_data(&header, b"ignored line\n-4 5\n6\n").unwrap();
        assert_eq!(data.iter().copied().collect::<Vec<_>>(), vec![-4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_decode_raw_byte_skip_from_end() {
        let header = header(&[
            ("type", "uint8"),
            ("dimension", "1"),
            ("sizes", "2"),
            ("encoding", "raw"),
            ("byte skip", "-1"),
        ]);
        let data = decode_data(&header, &[9, 9, 9, 3, 4]).unwrap();
        assert_eq!(data.iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_truncated_data_rejected() {
        let header = header(&[
            ("type", "float"),
            ("dimension", "1"),
            ("sizes", "4"),
            ("encoding", "raw"),
        ]);
        assert!(decode_data(&header, &[0u8; 8]).is_err());
    }

    #[test]
    fn test_overflowing_sizes_rejected() {
        let header = header(&[
            ("type", "float"),
            ("dimension", "3"),
            ("sizes", "4294967296 4294967296 4294967296"),
            ("encoding", "raw"),
        ]);
        let err = decode_data(&header, &[0u8; 16]).unwrap_err();
        assert!(err.to_string().contains("overflow"), "{err}");

        // Sample count fits but the byte length does not
        let header = self::header(&[
            ("type", "double"),
            ("dimension", "1"),
            ("sizes", &(usize::MAX / 4).to_string()),
            ("encoding", "gzip"),
        ]);
        assert!(decode_data(&header, &[]).is_err());
    }

    #[test]
    fn test_unsupported_encoding_rejected() {
        let header = header(&[
            ("type", "float"),
            ("dimension", "1"),
            ("sizes", "1"),
            ("encoding", "bzip2"),
        ]);
        assert!(decode_data(&header, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_write_header_fields() {
        let device = Default::default();
        let grid = Tensor::<TestBackend, 3>::zeros([2, 3, 4], &device);
        let neuron = VoxelNeuron::new(grid, Spacing::new([0.5, 0.5, 2.0]))
            .unwrap()
            .with_units(AxisUnits::new(
                Spacing::new([0.5, 0.5, 2.0]),
                ["micron".to_string(), "micron".to_string(), "micron".to_string()],
            ));

        let header = voxel_header(&neuron);
        assert_eq!(header.field("sizes"), Some("2 3 4"));
        assert_eq!(
            header.field("space directions"),
            Some("(0.5,0,0) (0,0.5,0) (0,0,2)")
        );
        assert_eq!(
            header.field("space units"),
            Some("\"micron\" \"micron\" \"micron\"")
        );
        assert_eq!(header.field("encoding"), Some("gzip"));
    }

    #[test]
    fn test_write_then_read_preserves_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("volume.nrrd");

        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let grid = Tensor::<TestBackend, 3>::from_data(TensorData::new(values, [2, 3, 4]), &Default::default());
        let neuron = VoxelNeuron::new(grid, Spacing::uniform(1.0)).unwrap();

        write_nrrd(&path, &neuron, 5).unwrap();
        let (data, header) = read_nrrd_file(&path).unwrap();

        assert_eq!(data.shape(), &[2, 3, 4]);
        assert_eq!(data[[1, 2, 3]], 23.0);
        assert_eq!(data[[0, 1, 2]], 6.0);
        assert!(header.space_units().is_none());
    }

    #[test]
    fn test_invalid_compression_level_leaves_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.nrrd");
        let grid = Tensor::<TestBackend, 3>::zeros([1, 1, 1], &Default::default());
        let neuron = VoxelNeuron::new(grid, Spacing::uniform(1.0)).unwrap();

        for level in [0, 10] {
            let result = write_nrrd(&path, &neuron, level);
            assert!(matches!(result, Err(IoError::InvalidArgument(_))));
        }
        assert!(!path.exists());
    }

    fn cube(value: f32) -> VoxelNeuron<TestBackend> {
        let grid = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![value; 8], [2, 2, 2]),
            &Default::default(),
        );
        VoxelNeuron::new(grid, Spacing::uniform(1.0)).unwrap()
    }

    #[test]
    fn test_batch_into_folder_uses_names() {
        let dir = tempdir().unwrap();
        let (a, b) = (cube(1.0), cube(2.0));

        let destination = NrrdDestination::from_path(dir.path());
        assert_eq!(destination, NrrdDestination::Directory(dir.path().to_path_buf()));
        let paths = write_nrrd_batch([("b", &b), ("a", &a)], &destination, 1).unwrap();

        assert_eq!(paths, vec![dir.path().join("b.nrrd"), dir.path().join("a.nrrd")]);
        let (data, _) = read_nrrd_file(&paths[0]).unwrap();
        assert!(data.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_batch_pattern_placeholders() {
        let dir = tempdir().unwrap();
        let (a, b) = (cube(1.0), cube(2.0));
        let pattern = dir.path().join("voxels-{index}-{name}.nrrd");

        let destination = NrrdDestination::from_path(&pattern);
        let paths = write_nrrd_batch([("a", &a), ("b", &b)], &destination, 9).unwrap();

        assert_eq!(
            paths,
            vec![dir.path().join("voxels-0-a.nrrd"), dir.path().join("voxels-1-b.nrrd")]
        );
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_batch_rejects_before_writing() {
        let dir = tempdir().unwrap();
        let (a, b) = (cube(1.0), cube(2.0));
        let fixed = NrrdDestination::Pattern(dir.path().join("same.nrrd").to_string_lossy().into_owned());

        let result = write_nrrd_batch([("a", &a), ("b", &b)], &fixed, 1);
        assert!(matches!(result, Err(IoError::InvalidArgument(_))));

        let files = NrrdDestination::Files(vec![dir.path().join("only.nrrd")]);
        let result = write_nrrd_batch([("a", &a), ("b", &b)], &files, 1);
        assert!(matches!(result, Err(IoError::InvalidArgument(_))));

        let folder = NrrdDestination::Directory(dir.path().to_path_buf());
        let result = write_nrrd_batch([("a", &a)], &folder, 0);
        assert!(matches!(result, Err(IoError::InvalidArgument(_))));
        let result = write_nrrd_batch([("", &a)], &folder, 1);
        assert!(matches!(result, Err(IoError::InvalidArgument(_))));

        let missing = NrrdDestination::Directory(dir.path().join("missing"));
        let result = write_nrrd_batch([("a", &a)], &missing, 1);
        assert!(matches!(result, Err(IoError::InvalidArgument(_))));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_detached_data_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("detached.nhdr");
        std::fs::write(
            &path,
            "NRRD0004\ntype: float\ndimension: 1\nsizes: 1\nencoding: raw\ndata file: detached.raw\n\n",
        )
        .unwrap();
        let err = read_nrrd_file(&path).unwrap_err();
        assert!(err.to_string().contains("Detached"));
    }

    #[test]
    fn test_cursor_header_then_gzip_payload() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(1));
        encoder.write_all(&7.5f32.to_le_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut bytes = b"NRRD0005\ntype: float\ndimension: 1\nsizes: 1\nencoding: gz\n\n".to_vec();
        bytes.extend_from_slice(&compressed);

        let mut cursor = Cursor::new(bytes.as_slice());
        let header = NrrdHeader::parse(&mut cursor).unwrap();
        let offset = cursor.position() as usize;
        let data = decode_data(&header, &bytes[offset..]).unwrap();
        assert_eq!(data.iter().copied().collect::<Vec<_>>(), vec![7.5]);
    }
}

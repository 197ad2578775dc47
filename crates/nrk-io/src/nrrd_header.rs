//! NRRD header model.
//!
//! Fields are kept as an ordered list of raw `name: value` strings so that a
//! header read from disk can be handed back to callers unchanged. Typed
//! accessors parse the fields the codec and importer need.

use std::fmt::Write as _;
use std::io::BufRead;

use anyhow::{anyhow, bail, Context, Result};

/// Sample type of the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
}

impl ScalarType {
    /// Parse a `type:` value, accepting every alias NRRD allows.
    pub fn parse(name: &str) -> Option<Self> {
        let scalar = match name.trim() {
            "signed char" | "int8" | "int8_t" => Self::Int8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => Self::UInt8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                Self::Int16
            }
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                Self::UInt16
            }
            "int" | "signed int" | "int32" | "int32_t" => Self::Int32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => Self::UInt32,
            "longlong" | "long long" | "long long int" | "signed long long"
            | "signed long long int" | "int64" | "int64_t" => Self::Int64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64"
            | "uint64_t" => Self::UInt64,
            "float" => Self::Float,
            "double" => Self::Double,
            _ => return None,
        };
        Some(scalar)
    }

    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float => 4,
            Self::Int64 | Self::UInt64 | Self::Double => 8,
        }
    }

    /// Canonical name written to headers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

/// Data section encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Gzip,
    Ascii,
}

impl Encoding {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "raw" => Some(Self::Raw),
            "gzip" | "gz" => Some(Self::Gzip),
            "ascii" | "text" | "txt" => Some(Self::Ascii),
            _ => None,
        }
    }
}

/// Byte order of multi-byte raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Parsed NRRD header.
#[derive(Debug, Clone, PartialEq)]
pub struct NrrdHeader {
    magic: String,
    fields: Vec<(String, String)>,
    key_values: Vec<(String, String)>,
}

impl Default for NrrdHeader {
    fn default() -> Self {
        Self {
            magic: "NRRD0004".to_string(),
            fields: Vec::new(),
            key_values: Vec::new(),
        }
    }
}

impl NrrdHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a header up to and including the blank line that ends it.
    ///
    /// The reader is left positioned at the first byte of the data section.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .context("Failed to read NRRD magic line")?;
        let magic = line.trim_end().to_string();
        match magic.strip_prefix("NRRD000") {
            Some(v) if matches!(v, "1" | "2" | "3" | "4" | "5") => {}
            _ => bail!("Not a NRRD file: bad magic line {:?}", magic),
        }

        let mut header = Self {
            magic,
            fields: Vec::new(),
            key_values: Vec::new(),
        };

        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .context("Failed to read NRRD header")?;
            let text = line.trim_end_matches(['\n', '\r']);
            if read == 0 || text.is_empty() {
                break;
            }
            if text.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = text.split_once(":=") {
                header.key_values.push((key.to_string(), value.to_string()));
            } else if let Some((name, value)) = text.split_once(": ") {
                header.set_field(name.trim(), value.trim());
            } else {
                bail!("Malformed NRRD header line {:?}", text);
            }
        }

        Ok(header)
    }

    /// Serialise the header, including the terminating blank line.
    pub fn format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.magic);
        for (name, value) in &self.fields {
            let _ = writeln!(out, "{name}: {value}");
        }
        for (key, value) in &self.key_values {
            let _ = writeln!(out, "{key}:={value}");
        }
        out.push('\n');
        out
    }

    pub fn magic(&self) -> &str {
        &self.magic
    }

    /// Raw field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a field, replacing an existing one in place.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// All fields in file order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Free-form `key:=value` pairs in file order.
    pub fn key_values(&self) -> &[(String, String)] {
        &self.key_values
    }

    pub fn set_key_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.key_values.push((key.into(), value.into()));
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.field(name)
            .ok_or_else(|| anyhow!("NRRD header is missing required field '{name}'"))
    }

    pub fn dimension(&self) -> Result<usize> {
        self.required("dimension")?
            .parse()
            .context("Invalid NRRD dimension")
    }

    /// Axis sizes, fastest axis first.
    pub fn sizes(&self) -> Result<Vec<usize>> {
        let sizes = self
            .required("sizes")?
            .split_whitespace()
            .map(|s| s.parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Invalid NRRD sizes")?;
        let dimension = self.dimension()?;
        if sizes.len() != dimension {
            bail!(
                "NRRD sizes has {} entries but dimension is {}",
                sizes.len(),
                dimension
            );
        }
        Ok(sizes)
    }

    pub fn scalar_type(&self) -> Result<ScalarType> {
        let name = self.required("type")?;
        ScalarType::parse(name).ok_or_else(|| anyhow!("Unsupported NRRD type '{name}'"))
    }

    pub fn encoding(&self) -> Result<Encoding> {
        let name = self.required("encoding")?;
        Encoding::parse(name).ok_or_else(|| anyhow!("Unsupported NRRD encoding '{name}'"))
    }

    /// Byte order; little-endian when the field is absent.
    pub fn endian(&self) -> Result<Endian> {
        match self.field("endian") {
            None | Some("little") => Ok(Endian::Little),
            Some("big") => Ok(Endian::Big),
            Some(other) => bail!("Invalid NRRD endian '{other}'"),
        }
    }

    pub fn space_dimension(&self) -> Option<usize> {
        self.field("space dimension")?.parse().ok()
    }

    /// One entry per axis; `None` for axes written as `none`.
    pub fn space_directions(&self) -> Result<Option<Vec<Option<Vec<f64>>>>> {
        let Some(raw) = self.field("space directions") else {
            return Ok(None);
        };
        split_vectors(raw)
            .into_iter()
            .map(|token| {
                if token == "none" {
                    return Ok(None);
                }
                let inner = token
                    .strip_prefix('(')
                    .and_then(|t| t.strip_suffix(')'))
                    .ok_or_else(|| anyhow!("Malformed space direction {:?}", token))?;
                inner
                    .split(',')
                    .map(|v| v.trim().parse::<f64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Some)
                    .with_context(|| format!("Malformed space direction {:?}", token))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Unit label per world axis, quotes removed.
    pub fn space_units(&self) -> Option<Vec<String>> {
        let raw = self.field("space units")?;
        let quoted: Vec<String> = raw
            .split('"')
            .skip(1)
            .step_by(2)
            .map(str::to_string)
            .collect();
        if quoted.is_empty() {
            Some(raw.split_whitespace().map(str::to_string).collect())
        } else {
            Some(quoted)
        }
    }

    /// Voxel spacing from the diagonal of `space directions`.
    ///
    /// Entries keep their sign; a negative entry marks a mirrored axis.
    /// `None` unless the first three axes all have a direction vector of at
    /// least three components.
    pub fn spacing(&self) -> Result<Option<[f64; 3]>> {
        let Some(directions) = self.space_directions()? else {
            return Ok(None);
        };
        if directions.len() < 3 {
            return Ok(None);
        }
        let mut spacing = [0.0; 3];
        for (axis, direction) in directions.iter().take(3).enumerate() {
            match direction {
                Some(v) if v.len() >= 3 => spacing[axis] = v[axis],
                _ => return Ok(None),
            }
        }
        Ok(Some(spacing))
    }
}

/// Split a `space directions` value into per-axis tokens.
fn split_vectors(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() => {}
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Format a vector the way NRRD expects, e.g. `(0.5,0,0)`.
pub(crate) fn format_vector(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(","))
}

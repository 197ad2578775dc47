//! JSON formats for landmark and point files.

use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nrk_core::points::{PointSet, PointTable};
use nrk_core::spatial::Point3;
use serde::{Deserialize, Serialize};

/// Paired landmarks, `source[i]` maps to `target[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkFile {
    pub source: Vec<[f64; 3]>,
    pub target: Vec<[f64; 3]>,
}

impl LandmarkFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read landmarks from {}", path.display()))?;
        serde_json::from_str(&text).context("Landmark file must be {\"source\": [[x,y,z],..], \"target\": [[x,y,z],..]}")
    }

    pub fn source_points(&self) -> Vec<Point3> {
        self.source.iter().copied().map(Point3::from).collect()
    }

    pub fn target_points(&self) -> Vec<Point3> {
        self.target.iter().copied().map(Point3::from).collect()
    }
}

/// Query points: rows of coordinates or a table with x/y/z columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointsFile {
    Rows(Vec<Vec<f64>>),
    Table(PointTable),
}

impl PointsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read points from {}", path.display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .context("Points must be [[x,y,z],..] or {\"x\": [..], \"y\": [..], \"z\": [..]}")
    }

    /// Convert to a point set; column count is checked by the transform.
    pub fn into_point_set<B: Backend>(self, device: &B::Device) -> Result<PointSet<B>> {
        match self {
            Self::Rows(rows) => {
                let cols = rows.first().map_or(3, Vec::len);
                if rows.iter().any(|r| r.len() != cols) {
                    bail!("Point rows differ in length");
                }
                let flat: Vec<f64> = rows.iter().flatten().copied().collect();
                let data = TensorData::new(flat, [rows.len(), cols]);
                Ok(PointSet::Array(Tensor::from_data(data, device)))
            }
            Self::Table(table) => Ok(PointSet::Table(table)),
        }
    }

    /// Same layout as `self`, holding `points`.
    pub fn with_points(&self, points: &[Point3]) -> Self {
        match self {
            Self::Rows(_) => Self::Rows(points.iter().map(Point3::to_vec).collect()),
            Self::Table(_) => Self::Table(PointTable::from_points(points)),
        }
    }
}

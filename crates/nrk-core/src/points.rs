//! Point sets accepted by transforms.
//!
//! Points come either as a raw `(N, 3)` tensor or as a labeled table with
//! named `x`/`y`/`z` columns (any extra columns are ignored).

use std::collections::BTreeMap;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::spatial::Point3;

const XYZ: [&str; 3] = ["x", "y", "z"];

/// Column-oriented table of named numeric columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointTable {
    columns: BTreeMap<String, Vec<f64>>,
}

impl PointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with x/y/z columns filled from `points`.
    pub fn from_points(points: &[Point3]) -> Self {
        let mut table = Self::new();
        for (axis, name) in XYZ.iter().enumerate() {
            table.insert(*name, points.iter().map(|p| p[axis]).collect());
        }
        table
    }

    /// Builder-style column insertion.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Extract the x/y/z columns as points.
    ///
    /// Fails with `MissingColumns` if any of the three is absent and with
    /// `ShapeError` if they differ in length.
    pub fn xyz(&self) -> Result<Vec<Point3>> {
        let missing: Vec<String> = XYZ
            .iter()
            .filter(|c| !self.columns.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::MissingColumns { missing });
        }

        let [x, y, z] = XYZ.map(|c| &self.columns[c]);
        if x.len() != y.len() || x.len() != z.len() {
            return Err(CoreError::shape(format!(
                "x/y/z columns differ in length: {}, {}, {}",
                x.len(),
                y.len(),
                z.len()
            )));
        }

        Ok(x.iter()
            .zip(y)
            .zip(z)
            .map(|((&x, &y), &z)| Point3::new([x, y, z]))
            .collect())
    }
}

/// Query points for a transform.
#[derive(Debug, Clone)]
pub enum PointSet<B: Backend> {
    /// Raw `(N, 3)` coordinate tensor.
    Array(Tensor<B, 2>),
    /// Labeled table with `x`, `y`, `z` columns.
    Table(PointTable),
}

impl<B: Backend> From<Tensor<B, 2>> for PointSet<B> {
    fn from(points: Tensor<B, 2>) -> Self {
        Self::Array(points)
    }
}

impl<B: Backend> From<PointTable> for PointSet<B> {
    fn from(table: PointTable) -> Self {
        Self::Table(table)
    }
}

impl<B: Backend> PointSet<B> {
    /// Resolve into a validated `(N, 3)` tensor on `device`.
    pub fn into_tensor(self, device: &B::Device) -> Result<Tensor<B, 2>> {
        match self {
            Self::Array(points) => {
                let [_, cols] = points.dims();
                if cols != 3 {
                    return Err(CoreError::shape(format!(
                        "expected (N, 3) points, got {:?}",
                        points.dims()
                    )));
                }
                Ok(points)
            }
            Self::Table(table) => Ok(points_to_tensor(&table.xyz()?, device)),
        }
    }
}

/// Pack points into an `(N, 3)` tensor.
pub fn points_to_tensor<B: Backend>(points: &[Point3], device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f64> = points.iter().flat_map(|p| p.to_array()).collect();
    Tensor::<B, 2>::from_data(TensorData::new(flat, [points.len(), 3]), device)
}

/// Unpack an `(N, 3)` tensor into points.
pub fn tensor_to_points<B: Backend>(points: &Tensor<B, 2>) -> Result<Vec<Point3>> {
    let [rows, cols] = points.dims();
    if cols != 3 {
        return Err(CoreError::shape(format!(
            "expected (N, 3) points, got ({rows}, {cols})"
        )));
    }
    let values: Vec<f64> = points.to_data().iter::<f64>().collect();
    Ok(values
        .chunks_exact(3)
        .map(|c| Point3::new([c[0], c[1], c[2]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_table_xyz() {
        let table = PointTable::new()
            .with_column("x", vec![1.0, 4.0])
            .with_column("y", vec![2.0, 5.0])
            .with_column("z", vec![3.0, 6.0])
            .with_column("radius", vec![0.1, 0.2]);
        let points = table.xyz().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].to_array(), [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_table_missing_columns() {
        let table = PointTable::new()
            .with_column("x", vec![1.0])
            .with_column("y", vec![2.0]);
        match table.xyz() {
            Err(CoreError::MissingColumns { missing }) => assert_eq!(missing, vec!["z"]),
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_table_ragged_columns() {
        let table = PointTable::new()
            .with_column("x", vec![1.0, 2.0])
            .with_column("y", vec![2.0])
            .with_column("z", vec![3.0]);
        assert!(matches!(table.xyz(), Err(CoreError::ShapeError(_))));
    }

    #[test]
    fn test_point_set_rejects_wrong_width() {
        let device = Default::default();
        let points = Tensor::<TestBackend, 2>::zeros([4, 2], &device);
        let set: PointSet<TestBackend> = points.into();
        assert!(matches!(set.into_tensor(&device), Err(CoreError::ShapeError(_))));
    }

    #[test]
    fn test_tensor_points_conversion() {
        let device = Default::default();
        let points = vec![Point3::new([1.0, 2.0, 3.0]), Point3::new([-1.0, 0.5, 8.0])];
        let tensor = points_to_tensor::<TestBackend>(&points, &device);
        assert_eq!(tensor.dims(), [2, 3]);
        assert_eq!(tensor_to_points(&tensor).unwrap(), points);
    }
}

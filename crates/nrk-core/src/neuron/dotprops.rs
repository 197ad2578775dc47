//! Dotprops: point clouds with local tangent vectors.
//!
//! Every point gets a tangent vector and a collinearity score `alpha` from
//! a principal component analysis of its `k` nearest neighbours:
//!
//! * tangent = eigenvector of the largest eigenvalue
//! * `alpha = (λ1 - λ2) / (λ1 + λ2 + λ3)`, 1 for a perfect line, 0 for an
//!   isotropic blob

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use nalgebra::{Matrix3, SymmetricEigen, Vector3 as NaVector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::spatial::{AxisUnits, Point3, Vector, Vector3};

/// Options forwarded to [`make_dotprops`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DotpropsOptions {
    /// Number of nearest neighbours (including the point itself) used for
    /// the tangent estimate.
    pub k: usize,
}

impl Default for DotpropsOptions {
    fn default() -> Self {
        Self { k: 20 }
    }
}

impl DotpropsOptions {
    pub fn with_k(k: usize) -> Self {
        Self { k }
    }
}

/// Point cloud with per-point tangent vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dotprops {
    points: Vec<Point3>,
    vect: Vec<Vector3>,
    alpha: Vec<f64>,
    k: usize,
    units: Option<AxisUnits>,
}

impl Dotprops {
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Unit tangent vector per point.
    pub fn vect(&self) -> &[Vector3] {
        &self.vect
    }

    /// Collinearity per point, in `[0, 1]`.
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    /// Neighbour count actually used (clamped to the number of points).
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn units(&self) -> Option<&AxisUnits> {
        self.units.as_ref()
    }

    pub fn set_units(&mut self, units: AxisUnits) {
        self.units = Some(units);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Build dotprops from physical coordinates.
///
/// # Errors
/// * `EmptyPointCloud` if `points` is empty
/// * `InvalidParameter` if `options.k < 2`
pub fn make_dotprops(points: Vec<Point3>, options: &DotpropsOptions) -> Result<Dotprops> {
    if points.is_empty() {
        return Err(CoreError::empty("cannot build dotprops from zero points"));
    }
    if options.k < 2 {
        return Err(CoreError::invalid_parameter(format!(
            "dotprops need k >= 2 neighbours, got {}",
            options.k
        )));
    }

    let k = options.k.min(points.len());
    let coords: Vec<[f64; 3]> = points.iter().map(|p| p.to_array()).collect();
    let tree: ImmutableKdTree<f64, u64, 3, 32> = ImmutableKdTree::new_from_slice(&coords);

    let (vect, alpha): (Vec<Vector3>, Vec<f64>) = coords
        .par_iter()
        .map(|query| {
            let neighbours: Vec<NaVector3<f64>> = tree
                .nearest_n::<SquaredEuclidean>(query, k)
                .iter()
                .map(|n| NaVector3::from(coords[n.item as usize]))
                .collect();
            tangent(&neighbours)
        })
        .unzip();

    tracing::debug!(points = points.len(), k, "built dotprops");

    Ok(Dotprops {
        points,
        vect,
        alpha,
        k,
        units: None,
    })
}

/// Principal direction and collinearity of a neighbourhood.
fn tangent(neighbours: &[NaVector3<f64>]) -> (Vector3, f64) {
    let centroid = neighbours.iter().sum::<NaVector3<f64>>() / neighbours.len() as f64;

    let mut covariance = Matrix3::zeros();
    for p in neighbours {
        let d = p - centroid;
        covariance += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(covariance);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let [l1, l2, l3] = order.map(|i| eigen.eigenvalues[i].max(0.0));

    let principal = eigen.eigenvectors.column(order[0]).into_owned();
    let vect = Vector(principal)
        .normalized()
        .unwrap_or_else(|| Vector3::new([1.0, 0.0, 0.0]));

    let total = l1 + l2 + l3;
    let alpha = if total > 0.0 { (l1 - l2) / total } else { 0.0 };
    (vect, alpha)
}

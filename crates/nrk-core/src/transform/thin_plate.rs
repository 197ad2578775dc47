//! Thin-plate spline transform.
//!
//! A thin-plate spline (TPS) maps a set of source landmarks exactly onto a
//! set of target landmarks and interpolates smoothly everywhere else. The
//! mapping is an affine part plus a non-uniform (bending) part:
//!
//! ```text
//! f(x) = P(x) · A + U(x) · W
//! ```
//!
//! where `P(x) = [1, x, y, z]`, `U(x)_j = φ(|x - s_j|)` relates the query to
//! every source landmark `s_j`, and `φ(r) = -r` is the 3D TPS kernel.
//!
//! The coefficients `W` (M×3) and `A` (4×3) come from solving
//!
//! ```text
//! | K   P | | W |   | T |
//! | Pᵀ  0 | | A | = | 0 |
//! ```
//!
//! with `K_ij = φ(|s_i - s_j|)` and `T` the target landmarks. The solve
//! runs on the host in f64; the fitted coefficients live in tensors so
//! applying the warp is a pair of matmuls on the backend.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

use super::trait_::Transform;
use crate::error::{CoreError, Result};
use crate::points::{points_to_tensor, tensor_to_points, PointSet};
use crate::spatial::Point3;

/// Number of affine coefficients per output axis: constant + x, y, z.
const AFFINE_TERMS: usize = 4;

/// Relative eigenvalue floor below which the source landmarks are treated
/// as coplanar (or collinear).
const PLANARITY_TOLERANCE: f64 = 1e-10;

/// Minimum distance between two source landmarks.
const COINCIDENCE_TOLERANCE: f64 = 1e-9;

/// Which way the landmark pairs are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformDirection {
    /// Map source landmarks onto target landmarks.
    #[default]
    Forward,
    /// Map target landmarks onto source landmarks.
    Inverse,
}

/// The 3D thin-plate kernel.
fn kernel(r: f64) -> f64 {
    -r
}

/// Thin-plate spline between two sets of 3D landmarks.
///
/// Coefficients are computed once at construction. The value is immutable
/// afterwards: [`ThinPlateSplineTransform::inverted`] builds a new instance
/// instead of refitting in place.
///
/// # Examples
/// ```rust
/// use nrk_core::transform::{ThinPlateSplineTransform, TransformDirection};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let source = Tensor::<Backend, 2>::from_floats(
///     [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0, 1.0]],
///     &device,
/// );
/// let target = source.clone() * 2.0;
/// let tps = ThinPlateSplineTransform::new(source, target, TransformDirection::Forward).unwrap();
///
/// let warped = tps.xform(Tensor::<Backend, 2>::from_floats([[0.5, 0.5, 0.5]], &device)).unwrap();
/// assert_eq!(warped.dims(), [1, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct ThinPlateSplineTransform<B: Backend> {
    /// Source landmarks `[M, 3]`, already swapped for inverse direction.
    source: Tensor<B, 2>,
    /// Target landmarks `[M, 3]`.
    target: Tensor<B, 2>,
    /// Non-uniform weights `[M, 3]`.
    weights: Tensor<B, 2>,
    /// Affine coefficients `[4, 3]`.
    affine: Tensor<B, 2>,
}

impl<B: Backend> ThinPlateSplineTransform<B> {
    /// Fit a thin-plate spline between two landmark sets.
    ///
    /// # Arguments
    /// * `landmarks_source` - Tensor of shape `[M, 3]`
    /// * `landmarks_target` - Tensor of shape `[M, 3]`
    /// * `direction` - `Inverse` swaps source and target before anything else
    ///
    /// # Errors
    /// * `ShapeError` if either set is not `(M, 3)` or the row counts differ
    /// * `DegenerateLandmarks` if the source landmarks cannot determine the
    ///   affine part (fewer than 4, coincident, collinear or coplanar)
    pub fn new(
        landmarks_source: Tensor<B, 2>,
        landmarks_target: Tensor<B, 2>,
        direction: TransformDirection,
    ) -> Result<Self> {
        let (source, target) = match direction {
            TransformDirection::Forward => (landmarks_source, landmarks_target),
            TransformDirection::Inverse => (landmarks_target, landmarks_source),
        };

        for (name, landmarks) in [("source", &source), ("target", &target)] {
            let [_, cols] = landmarks.dims();
            if cols != 3 {
                return Err(CoreError::shape(format!(
                    "expected (N, 3) {name} landmarks, got {:?}",
                    landmarks.dims()
                )));
            }
        }

        let [n_source, _] = source.dims();
        let [n_target, _] = target.dims();
        if n_source != n_target {
            return Err(CoreError::shape(format!(
                "number of source landmarks ({n_source}) must match number of target landmarks ({n_target})"
            )));
        }

        Self::fit(source, target)
    }

    /// Fit from host-side landmark points.
    pub fn from_points(
        source: &[Point3],
        target: &[Point3],
        direction: TransformDirection,
        device: &B::Device,
    ) -> Result<Self> {
        Self::new(
            points_to_tensor(source, device),
            points_to_tensor(target, device),
            direction,
        )
    }

    fn fit(source: Tensor<B, 2>, target: Tensor<B, 2>) -> Result<Self> {
        let device = source.device();
        let source_points = tensor_to_points(&source)?;
        let target_points = tensor_to_points(&target)?;

        let (weights, affine) = solve_coefficients(&source_points, &target_points)?;
        tracing::debug!(landmarks = source_points.len(), "fitted thin-plate spline");

        Ok(Self {
            source,
            target,
            weights: matrix_to_tensor(&weights, &device),
            affine: matrix_to_tensor(&affine, &device),
        })
    }

    /// A new transform mapping in the opposite sense.
    ///
    /// Landmarks are swapped and the coefficients refitted; `self` is left
    /// untouched.
    pub fn inverted(&self) -> Result<Self> {
        Self::fit(self.target.clone(), self.source.clone())
    }

    /// Warp points.
    ///
    /// Accepts an `(N, 3)` tensor or a [`PointTable`](crate::points::PointTable)
    /// with `x`/`y`/`z` columns and returns the warped `(N, 3)` tensor.
    ///
    /// # Errors
    /// * `ShapeError` for a tensor that is not `(N, 3)`
    /// * `MissingColumns` for a table without all of `x`, `y`, `z`
    pub fn xform(&self, points: impl Into<PointSet<B>>) -> Result<Tensor<B, 2>> {
        let points = points.into().into_tensor(&self.weights.device())?;
        Ok(self.warp(points))
    }

    /// Warp host-side points.
    pub fn xform_points(&self, points: &[Point3]) -> Result<Vec<Point3>> {
        let tensor = points_to_tensor(points, &self.weights.device());
        tensor_to_points(&self.warp(tensor))
    }

    /// `P · A + U · W` for validated `(N, 3)` points.
    fn warp(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, _] = points.dims();
        if n == 0 {
            return points;
        }
        let [m, _] = self.source.dims();
        let device = points.device();

        // Pairwise distances [N, M] via broadcasting [N, 1, 3] - [1, M, 3]
        let diff = points.clone().reshape([n, 1, 3]) - self.source.clone().reshape([1, m, 3]);
        let distances = (diff.clone() * diff).sum_dim(2).sqrt().reshape([n, m]);
        let u = distances.neg();

        let p = Tensor::cat(vec![Tensor::<B, 2>::ones([n, 1], &device), points], 1);

        p.matmul(self.affine.clone()) + u.matmul(self.weights.clone())
    }

    /// Number of landmark pairs.
    pub fn n_landmarks(&self) -> usize {
        self.source.dims()[0]
    }

    pub fn source(&self) -> &Tensor<B, 2> {
        &self.source
    }

    pub fn target(&self) -> &Tensor<B, 2> {
        &self.target
    }

    /// Non-uniform weights `W`, shape `[M, 3]`.
    pub fn weights(&self) -> &Tensor<B, 2> {
        &self.weights
    }

    /// Affine coefficients `A`, shape `[4, 3]`.
    pub fn affine(&self) -> &Tensor<B, 2> {
        &self.affine
    }
}

impl<B: Backend> PartialEq for ThinPlateSplineTransform<B> {
    /// Exact landmark equality. Direction needs no comparison because it has
    /// already been folded into source/target.
    fn eq(&self, other: &Self) -> bool {
        self.n_landmarks() == other.n_landmarks()
            && same_values(&self.source, &other.source)
            && same_values(&self.target, &other.target)
    }
}

impl<B: Backend> Transform<B, 3> for ThinPlateSplineTransform<B> {
    /// Points must already be `[Batch, 3]`; use [`ThinPlateSplineTransform::xform`]
    /// for validated input.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        debug_assert_eq!(points.dims()[1], 3, "thin-plate spline points must be (N, 3)");
        self.warp(points)
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B, 3>>> {
        match self.inverted() {
            Ok(inverse) => Some(Box::new(inverse)),
            Err(e) => {
                tracing::warn!("thin-plate spline is not invertible: {}", e);
                None
            }
        }
    }
}

fn same_values<B: Backend>(a: &Tensor<B, 2>, b: &Tensor<B, 2>) -> bool {
    a.dims() == b.dims() && a.to_data().iter::<f64>().eq(b.to_data().iter::<f64>())
}

fn matrix_to_tensor<B: Backend>(matrix: &DMatrix<f64>, device: &B::Device) -> Tensor<B, 2> {
    // nalgebra is column-major, tensors are row-major
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    let data: Vec<f64> = matrix.transpose().as_slice().to_vec();
    Tensor::<B, 2>::from_data(TensorData::new(data, [rows, cols]), device)
}

/// Reject landmark sets whose affine part is underdetermined.
fn check_landmarks(source: &[Point3]) -> Result<()> {
    let m = source.len();
    if m < AFFINE_TERMS {
        return Err(CoreError::degenerate(format!(
            "need at least {AFFINE_TERMS} landmarks, got {m}"
        )));
    }

    for i in 0..m {
        for j in (i + 1)..m {
            if source[i].distance(&source[j]) < COINCIDENCE_TOLERANCE {
                return Err(CoreError::degenerate(format!(
                    "source landmarks {i} and {j} coincide"
                )));
            }
        }
    }

    let centroid: Vector3<f64> = source.iter().map(|p| p.0.coords).sum::<Vector3<f64>>() / m as f64;
    let mut covariance = Matrix3::zeros();
    for p in source {
        let d = p.0.coords - centroid;
        covariance += d * d.transpose();
    }
    let eigenvalues = SymmetricEigen::new(covariance).eigenvalues;
    let max = eigenvalues.max();
    let min = eigenvalues.min();
    if max <= 0.0 || min <= max * PLANARITY_TOLERANCE {
        return Err(CoreError::degenerate(
            "source landmarks are collinear or coplanar",
        ));
    }

    Ok(())
}

/// Solve the TPS system, returning `(W [M, 3], A [4, 3])`.
fn solve_coefficients(source: &[Point3], target: &[Point3]) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    check_landmarks(source)?;

    let m = source.len();
    let size = m + AFFINE_TERMS;

    let mut system = DMatrix::<f64>::zeros(size, size);
    for i in 0..m {
        for j in 0..m {
            system[(i, j)] = kernel(source[i].distance(&source[j]));
        }

        // Polynomial block: [1, x, y, z]
        system[(i, m)] = 1.0;
        system[(m, i)] = 1.0;
        for axis in 0..3 {
            system[(i, m + 1 + axis)] = source[i][axis];
            system[(m + 1 + axis, i)] = source[i][axis];
        }
    }

    let mut rhs = DMatrix::<f64>::zeros(size, 3);
    for (i, t) in target.iter().enumerate() {
        for axis in 0..3 {
            rhs[(i, axis)] = t[axis];
        }
    }

    let solution = system
        .lu()
        .solve(&rhs)
        .ok_or_else(|| CoreError::degenerate("thin-plate system is singular"))?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(CoreError::degenerate("thin-plate solve produced non-finite coefficients"));
    }

    let weights = solution.rows(0, m).into_owned();
    let affine = solution.rows(m, AFFINE_TERMS).into_owned();
    Ok((weights, affine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::PointTable;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn landmarks() -> Vec<Point3> {
        let mut points = Vec::new();
        for x in [0.0, 10.0] {
            for y in [0.0, 10.0] {
                for z in [0.0, 10.0] {
                    points.push(Point3::new([x, y, z]));
                }
            }
        }
        points.push(Point3::new([5.0, 5.0, 5.0]));
        points.push(Point3::new([2.0, 7.0, 4.0]));
        points
    }

    fn bend(p: &Point3) -> Point3 {
        Point3::new([
            p[0] + 0.1 * p[1] + 0.02 * p[2] * p[2],
            p[1] * 1.05 + 0.5,
            p[2] - 0.03 * p[0] * p[1],
        ])
    }

    fn fitted(direction: TransformDirection) -> ThinPlateSplineTransform<TestBackend> {
        let source = landmarks();
        let target: Vec<Point3> = source.iter().map(bend).collect();
        ThinPlateSplineTransform::from_points(&source, &target, direction, &Default::default())
            .unwrap()
    }

    fn assert_close(actual: &[Point3], expected: &[Point3], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            for axis in 0..3 {
                assert!(
                    (a[axis] - e[axis]).abs() < tol,
                    "axis {}: got {:?}, expected {:?}",
                    axis,
                    a,
                    e
                );
            }
        }
    }

    #[test]
    fn test_interpolates_landmarks() {
        let tps = fitted(TransformDirection::Forward);
        let source = landmarks();
        let target: Vec<Point3> = source.iter().map(bend).collect();

        let warped = tps.xform_points(&source).unwrap();
        assert_close(&warped, &target, 1e-3);
    }

    #[test]
    fn test_coefficient_shapes() {
        let tps = fitted(TransformDirection::Forward);
        assert_eq!(tps.n_landmarks(), 10);
        assert_eq!(tps.weights().dims(), [10, 3]);
        assert_eq!(tps.affine().dims(), [4, 3]);
    }

    #[test]
    fn test_inverse_direction_maps_target_to_source() {
        let tps = fitted(TransformDirection::Inverse);
        let source = landmarks();
        let target: Vec<Point3> = source.iter().map(bend).collect();

        let warped = tps.xform_points(&target).unwrap();
        assert_close(&warped, &source, 1e-3);
    }

    #[test]
    fn test_inverse_direction_equals_inverted_forward() {
        let forward = fitted(TransformDirection::Forward);
        let inverse = fitted(TransformDirection::Inverse);
        assert_eq!(forward.inverted().unwrap(), inverse);
        assert_ne!(forward, inverse);
    }

    #[test]
    fn test_double_inversion_is_identity() {
        let tps = fitted(TransformDirection::Forward);
        let twice = tps.inverted().unwrap().inverted().unwrap();
        assert_eq!(twice, tps);
    }

    #[test]
    fn test_inversion_leaves_original_untouched() {
        let tps = fitted(TransformDirection::Forward);
        let before = tps.clone();
        let _ = tps.inverted().unwrap();
        assert_eq!(tps, before);
    }

    #[test]
    fn test_affine_warp_is_reproduced_everywhere() {
        let source = landmarks();
        let affine = |p: &Point3| Point3::new([2.0 * p[0] + 1.0, p[1] - p[2], 0.5 * p[2] + 3.0]);
        let target: Vec<Point3> = source.iter().map(affine).collect();
        let tps = ThinPlateSplineTransform::<TestBackend>::from_points(
            &source,
            &target,
            TransformDirection::Forward,
            &Default::default(),
        )
        .unwrap();

        let queries = vec![Point3::new([3.0, 3.0, 3.0]), Point3::new([-4.0, 12.0, 1.5])];
        let expected: Vec<Point3> = queries.iter().map(affine).collect();
        assert_close(&tps.xform_points(&queries).unwrap(), &expected, 1e-3);
    }

    #[test]
    fn test_table_input_matches_array_input() {
        let device = Default::default();
        let tps = fitted(TransformDirection::Forward);
        let queries = vec![Point3::new([1.0, 2.0, 3.0]), Point3::new([7.5, 0.5, 9.0])];

        let from_array = tps.xform(points_to_tensor::<TestBackend>(&queries, &device)).unwrap();
        let from_table = tps.xform(PointTable::from_points(&queries)).unwrap();

        assert!(same_values(&from_array, &from_table));
    }

    #[test]
    fn test_table_missing_columns() {
        let tps = fitted(TransformDirection::Forward);
        let table = PointTable::new()
            .with_column("x", vec![1.0])
            .with_column("y", vec![1.0]);
        assert!(matches!(tps.xform(table), Err(CoreError::MissingColumns { .. })));
    }

    #[test]
    fn test_source_with_two_columns_is_rejected() {
        let device = Default::default();
        let source = Tensor::<TestBackend, 2>::zeros([5, 2], &device);
        let target = Tensor::<TestBackend, 2>::zeros([5, 3], &device);
        let result = ThinPlateSplineTransform::new(source, target, TransformDirection::Forward);
        assert!(matches!(result, Err(CoreError::ShapeError(_))));
    }

    #[test]
    fn test_row_count_mismatch_is_rejected() {
        let device = Default::default();
        let source = Tensor::<TestBackend, 2>::zeros([5, 3], &device);
        let target = Tensor::<TestBackend, 2>::zeros([4, 3], &device);
        let result = ThinPlateSplineTransform::new(source, target, TransformDirection::Forward);
        assert!(matches!(result, Err(CoreError::ShapeError(_))));
    }

    #[test]
    fn test_too_few_landmarks_are_degenerate() {
        let source = vec![
            Point3::new([0.0, 0.0, 0.0]),
            Point3::new([1.0, 0.0, 0.0]),
            Point3::new([0.0, 1.0, 0.0]),
        ];
        let result = ThinPlateSplineTransform::<TestBackend>::from_points(
            &source,
            &source,
            TransformDirection::Forward,
            &Default::default(),
        );
        assert!(matches!(result, Err(CoreError::DegenerateLandmarks(_))));
    }

    #[test]
    fn test_coplanar_landmarks_are_degenerate() {
        let source: Vec<Point3> = (0..6)
            .map(|i| Point3::new([i as f64, (i * i) as f64, 0.0]))
            .collect();
        let result = ThinPlateSplineTransform::<TestBackend>::from_points(
            &source,
            &source,
            TransformDirection::Forward,
            &Default::default(),
        );
        assert!(matches!(result, Err(CoreError::DegenerateLandmarks(_))));
    }

    #[test]
    fn test_empty_query_returns_empty() {
        let tps = fitted(TransformDirection::Forward);
        assert!(tps.xform_points(&[]).unwrap().is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "must be (N, 3)")]
    fn test_trait_rejects_two_column_points() {
        let tps = fitted(TransformDirection::Forward);
        let points = Tensor::<TestBackend, 2>::zeros([4, 2], &Default::default());
        let _ = tps.transform_points(points);
    }

    #[test]
    fn test_trait_inverse_available() {
        let tps = fitted(TransformDirection::Forward);
        let inverse = Transform::inverse(&tps).expect("invertible");
        let target: Vec<Point3> = landmarks().iter().map(bend).collect();
        let device = Default::default();
        let back = inverse.transform_points(points_to_tensor::<TestBackend>(&target, &device));
        assert_close(&tensor_to_points(&back).unwrap(), &landmarks(), 1e-3);
    }
}

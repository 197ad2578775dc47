//! Voxel neuron: a dense intensity grid with physical voxel spacing.

use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor, TensorData};

use crate::error::{CoreError, Result};
use crate::spatial::{AxisUnits, Spacing};

/// Neuron represented as a 3D voxel grid.
///
/// The grid is indexed `[x, y, z]`. Spacing is the physical size of one
/// voxel along each axis; index coordinates times spacing give physical
/// coordinates.
///
/// # Examples
/// ```rust
/// use nrk_core::neuron::VoxelNeuron;
/// use nrk_core::spatial::Spacing3;
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let grid = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let neuron = VoxelNeuron::new(grid, Spacing3::new([0.5, 0.5, 1.0])).unwrap();
/// assert_eq!(neuron.shape(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct VoxelNeuron<B: Backend> {
    /// Voxel intensities.
    grid: Tensor<B, 3>,
    /// Physical distance between voxels along each axis.
    spacing: Spacing<3>,
    /// Physical units of the axes, when known.
    units: Option<AxisUnits>,
}

impl<B: Backend> VoxelNeuron<B> {
    /// Create a voxel neuron.
    ///
    /// # Errors
    /// `InvalidParameter` if any spacing component is not a positive finite number.
    pub fn new(grid: Tensor<B, 3>, spacing: Spacing<3>) -> Result<Self> {
        if !spacing.is_valid() {
            return Err(CoreError::invalid_parameter(format!(
                "voxel spacing must be positive and finite, got {:?}",
                spacing.to_array()
            )));
        }
        Ok(Self {
            grid,
            spacing,
            units: None,
        })
    }

    /// Attach physical units.
    pub fn with_units(mut self, units: AxisUnits) -> Self {
        self.units = Some(units);
        self
    }

    pub fn grid(&self) -> &Tensor<B, 3> {
        &self.grid
    }

    pub fn spacing(&self) -> &Spacing<3> {
        &self.spacing
    }

    pub fn units(&self) -> Option<&AxisUnits> {
        self.units.as_ref()
    }

    /// Grid shape `[x, y, z]`.
    pub fn shape(&self) -> [usize; 3] {
        self.grid.dims()
    }

    /// Physical coordinates of every voxel that passes `threshold`.
    ///
    /// See [`voxel_points`].
    pub fn to_points(&self, threshold: Option<f64>) -> Tensor<B, 2> {
        voxel_points(&self.grid, threshold, &self.spacing)
    }
}

/// Voxels kept for a point cloud.
///
/// With a non-zero threshold, voxels `>= threshold` are kept. Without one,
/// or with a threshold of zero, every non-zero voxel is kept.
pub fn voxel_mask<B: Backend>(grid: &Tensor<B, 3>, threshold: Option<f64>) -> Tensor<B, 3, Bool> {
    match threshold {
        Some(t) if t != 0.0 => grid.clone().greater_equal_elem(t),
        _ => grid.clone().equal_elem(0.0).bool_not(),
    }
}

/// Physical `(N, 3)` coordinates of the voxels kept by [`voxel_mask`].
///
/// Index coordinates are multiplied by `spacing` here, before any
/// neighbourhood computation sees them, so that distances are physical.
/// Rows come out in index order (x slowest, z fastest).
pub fn voxel_points<B: Backend>(
    grid: &Tensor<B, 3>,
    threshold: Option<f64>,
    spacing: &Spacing<3>,
) -> Tensor<B, 2> {
    let device = grid.device();
    let indices = voxel_mask(grid, threshold).argwhere().float();

    let scale = Tensor::<B, 1>::from_data(TensorData::new(spacing.to_vec(), [3]), &device)
        .reshape([1, 3]);
    indices * scale
}

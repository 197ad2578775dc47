//! Core types for neuron volumes and landmark warping.
//!
//! * [`spatial`]: points, vectors, voxel spacing and axis units
//! * [`neuron`]: voxel neurons and dotprops point clouds
//! * [`points`]: point sets accepted by transforms
//! * [`transform`]: the thin-plate spline transform

pub mod error;
pub mod spatial;
pub mod points;
pub mod neuron;
pub mod transform;

pub use error::{CoreError, Result};
pub use spatial::{Point, Vector, Spacing, AxisUnits};
pub use neuron::{Dotprops, DotpropsOptions, VoxelNeuron};
pub use transform::{ThinPlateSplineTransform, TransformDirection};

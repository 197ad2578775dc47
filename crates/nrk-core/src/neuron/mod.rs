//! Neuron object model.
//!
//! A neuron arrives from disk as a dense voxel grid ([`VoxelNeuron`]) and
//! is often reduced to a sparse point cloud with local tangent vectors
//! ([`Dotprops`]).

pub mod voxel;
pub mod dotprops;

pub use voxel::VoxelNeuron;
pub use dotprops::{make_dotprops, Dotprops, DotpropsOptions};

//! Spatial transforms.
//!
//! Currently this is the landmark-driven thin-plate spline used to move
//! neurons between reference spaces.

pub mod trait_;
pub mod thin_plate;

pub use trait_::Transform;
pub use thin_plate::{ThinPlateSplineTransform, TransformDirection};

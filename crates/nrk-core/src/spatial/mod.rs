//! Spatial types for representing points, vectors, voxel spacing and units.
//!
//! Landmarks, dotprops points and tangent vectors are all expressed with
//! these types. All of them are thin wrappers around nalgebra.

pub mod point;
pub mod vector;
pub mod spacing;
pub mod units;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;
pub use units::AxisUnits;

pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;

//! Physical units attached to the axes of a neuron.

use serde::{Deserialize, Serialize};
use super::Spacing;

/// Per-axis physical units: a magnitude and a unit label for x, y and z.
///
/// A voxel neuron with 0.5 µm voxels carries magnitudes `(0.5, 0.5, 0.5)`
/// and labels `("micron", "micron", "micron")`. Dotprops are already in
/// physical coordinates and carry magnitude 1 on every axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisUnits {
    magnitudes: Spacing<3>,
    labels: [String; 3],
}

impl AxisUnits {
    pub fn new(magnitudes: Spacing<3>, labels: [String; 3]) -> Self {
        Self { magnitudes, labels }
    }

    /// Build from a label list, which must hold exactly three entries.
    pub fn from_label_slice(magnitudes: Spacing<3>, labels: &[String]) -> Option<Self> {
        match labels {
            [x, y, z] => Some(Self::new(magnitudes, [x.clone(), y.clone(), z.clone()])),
            _ => None,
        }
    }

    pub fn magnitudes(&self) -> &Spacing<3> {
        &self.magnitudes
    }

    pub fn labels(&self) -> &[String; 3] {
        &self.labels
    }

    /// Human-readable quantity per axis, e.g. `"0.5 micron"`.
    pub fn quantities(&self) -> [String; 3] {
        [0, 1, 2].map(|i| format!("{} {}", self.magnitudes[i], self.labels[i]))
    }
}

impl std::fmt::Display for AxisUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [x, y, z] = self.quantities();
        write!(f, "({x}, {y}, {z})")
    }
}

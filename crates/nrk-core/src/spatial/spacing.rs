//! Voxel spacing.
//!
//! Spacing is the physical distance represented by one grid step along
//! each axis of a voxel grid.

use super::Vector;

/// Spacing between adjacent voxels along each axis.
///
/// Type alias to Vector for semantic clarity.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Create uniform spacing (same value for all dimensions).
    pub fn uniform(value: f64) -> Self {
        Self::new([value; D])
    }

    /// True if every component is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|s| s.is_finite() && *s > 0.0)
    }

    /// Diagonal matrix rows with the spacing on the diagonal.
    ///
    /// This is how spacing is stored in NRRD `space directions`.
    pub fn to_diagonal(&self) -> [[f64; D]; D] {
        let mut rows = [[0.0; D]; D];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = self[i];
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Spacing3 = Spacing<3>;

    #[test]
    fn test_spacing_uniform() {
        let s = Spacing3::uniform(1.0);
        assert_eq!(s, Spacing3::new([1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_spacing_validity() {
        assert!(Spacing3::new([0.5, 1.0, 2.0]).is_valid());
        assert!(!Spacing3::new([0.0, 1.0, 2.0]).is_valid());
        assert!(!Spacing3::new([1.0, f64::NAN, 2.0]).is_valid());
        assert!(!Spacing3::new([1.0, -1.0, 2.0]).is_valid());
    }

    #[test]
    fn test_spacing_diagonal() {
        let d = Spacing3::new([0.5, 1.0, 2.0]).to_diagonal();
        assert_eq!(d, [[0.5, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 2.0]]);
    }
}

//! 2D periodic square lattice geometry.

use nalgebra::DMatrix;

/// Square lattice with periodic boundary conditions.
///
/// Sites are indexed row-major: `(x, y) -> x + ll * y`.
#[derive(Clone, Copy, Debug)]
pub struct SquareLattice {
    /// Linear size
    pub ll: usize,
    /// Number of sites, `ll * ll`
    pub ls: usize,
}

impl SquareLattice {
    pub fn new(ll: usize) -> Self {
        assert!(ll >= 2, "lattice linear size must be at least 2");
        Self { ll, ls: ll * ll }
    }

    /// Site index with periodic wrapping of both coordinates.
    #[inline]
    pub fn site(&self, x: usize, y: usize) -> usize {
        (x % self.ll) + self.ll * (y % self.ll)
    }

    /// Dense hopping matrix: `-t` on every nearest-neighbor bond.
    pub fn hopping_matrix(&self, t: f64) -> DMatrix<f64> {
        let mut k = DMatrix::zeros(self.ls, self.ls);
        for x in 0..self.ll {
            for y in 0..self.ll {
                let i = self.site(x, y);
                k[(i, self.site(x + 1, y))] += -t;
                k[(i, self.site(x + self.ll - 1, y))] += -t;
                k[(i, self.site(x, y + 1))] += -t;
                k[(i, self.site(x, y + self.ll - 1))] += -t;
            }
        }
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn site_indexing_wraps_periodically() {
        let lattice = SquareLattice::new(4);
        assert_eq!(lattice.site(0, 0), 0);
        assert_eq!(lattice.site(3, 2), 11);
        assert_eq!(lattice.site(4, 0), 0);
        assert_eq!(lattice.site(1, 4), 1);
    }

    #[test]
    fn hopping_matrix_is_symmetric_with_constant_row_sum() {
        let lattice = SquareLattice::new(4);
        let t = 1.0;
        let k = lattice.hopping_matrix(t);
        assert!((k.transpose() - &k).amax() < 1e-15);
        for i in 0..lattice.ls {
            assert_relative_eq!(k.row(i).sum(), -4.0 * t, epsilon = 1e-12);
        }
    }

    #[test]
    fn hopping_matrix_doubles_bonds_on_two_site_rings() {
        // On ll = 2 the +x and -x neighbors coincide, giving -2t per bond.
        let lattice = SquareLattice::new(2);
        let k = lattice.hopping_matrix(1.0);
        assert_relative_eq!(k[(0, 1)], -2.0, epsilon = 1e-12);
        assert_relative_eq!(k[(0, 2)], -2.0, epsilon = 1e-12);
        assert_relative_eq!(k[(0, 3)], 0.0, epsilon = 1e-12);
    }
}

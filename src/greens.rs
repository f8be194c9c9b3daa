//! Numerically stable Green's function builders.
//!
//! The equal-time Green's function `G = [1 + L R^T]^{-1}` cannot be formed
//! naively: the singular values of the propagator product span far more
//! than the range of `f64`. Both builders therefore split every singular
//! spectrum `D` into `D+ = max(D, 1)` and `D- = min(D, 1)`, factor the large
//! scales out of the matrix to be inverted, and invert only a piece whose
//! entries are bounded by construction.

use nalgebra::{DMatrix, DVector};

use crate::svd_stack::SvdStack;

/// Element-wise max-abs discrepancy between two matrices.
pub fn matrix_compare_error(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape(), "comparing matrices of different shape");
    (a - b).amax()
}

/// Factor triple of a stack, with the identity standing in for an empty one.
fn factors(stack: &SvdStack, n: usize) -> (DMatrix<f64>, DVector<f64>, DMatrix<f64>) {
    if stack.is_empty() {
        (
            DMatrix::identity(n, n),
            DVector::from_element(n, 1.0),
            DMatrix::identity(n, n),
        )
    } else {
        assert_eq!(stack.dim(), n, "stack dimension mismatch");
        (
            stack.matrix_u().clone(),
            stack.singular_values().clone(),
            stack.matrix_v(),
        )
    }
}

/// Split singular values into the scales above and below unity.
fn split_scales(d: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
    (d.map(|x| x.max(1.0)), d.map(|x| x.min(1.0)))
}

/// Equal-time Green's function `G(tau,tau) = [1 + L R^T]^{-1}`.
///
/// `left` represents `B(tau-1) ... B(0)` and `right` represents
/// `B(tau)^T ... B(lt-1)^T`. Writing `L = U_L D_L V_L^T`,
/// `R = U_R D_R V_R^T` and using the orthogonality of the U factors,
///
/// `G = U_R D_R+^{-1} [D_L+^{-1} (U_L^T U_R) D_R+^{-1}
///                      + D_L- (V_L^T V_R) D_R-]^{-1} D_L+^{-1} U_L^T`.
///
/// The bracket stays element-wise bounded even when `min(D)/max(D)` is far
/// below machine precision, so the result carries no NaNs.
pub fn compute_green_eqtime(left: &SvdStack, right: &SvdStack, g: &mut DMatrix<f64>) {
    let n = g.nrows();
    assert_eq!(g.ncols(), n);
    let (ul, dl, vl) = factors(left, n);
    let (ur, dr, vr) = factors(right, n);
    let (dl_big, dl_small) = split_scales(&dl);
    let (dr_big, dr_small) = split_scales(&dr);

    let x = ul.transpose() * &ur;
    let c = vl.transpose() * &vr;

    let mut inner = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            inner[(i, j)] =
                x[(i, j)] / (dl_big[i] * dr_big[j]) + dl_small[i] * c[(i, j)] * dr_small[j];
        }
    }
    let mut core = inner
        .try_inverse()
        .unwrap_or_else(|| DMatrix::identity(n, n));
    for i in 0..n {
        for j in 0..n {
            core[(i, j)] /= dr_big[i] * dl_big[j];
        }
    }
    *g = &ur * core * ul.transpose();
}

/// Time-displaced Green's functions `G(tau,0)` and `G(0,tau)` from the same
/// stacks as [`compute_green_eqtime`].
///
/// `G(tau,0) = [L^{-1} + R^T]^{-1}` and `G(0,tau) = -[R^{-T} + L]^{-1}`;
/// both are balanced with the same large/small scale split as the
/// equal-time builder. At `tau = 0` they reduce to `G(0,0)` and
/// `G(0,0) - 1` respectively.
pub fn compute_green_displaced(
    left: &SvdStack,
    right: &SvdStack,
    g_t0: &mut DMatrix<f64>,
    g_0t: &mut DMatrix<f64>,
) {
    let n = g_t0.nrows();
    assert_eq!(g_t0.ncols(), n);
    assert_eq!(g_0t.shape(), (n, n));
    let (ul, dl, vl) = factors(left, n);
    let (ur, dr, vr) = factors(right, n);
    let (dl_big, dl_small) = split_scales(&dl);
    let (dr_big, dr_small) = split_scales(&dr);

    let x = ul.transpose() * &ur;
    let c = vl.transpose() * &vr;

    // G(tau,0) = U_R D_R+^{-1} [inner]^{-1} D_L- V_L^T,
    // with the same inner bracket as the equal-time case.
    let mut inner = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            inner[(i, j)] =
                x[(i, j)] / (dl_big[i] * dr_big[j]) + dl_small[i] * c[(i, j)] * dr_small[j];
        }
    }
    let mut core = inner
        .try_inverse()
        .unwrap_or_else(|| DMatrix::identity(n, n));
    for i in 0..n {
        for j in 0..n {
            core[(i, j)] *= dl_small[j] / dr_big[i];
        }
    }
    *g_t0 = &ur * core * vl.transpose();

    // G(0,tau) = -V_L D_L+^{-1} [D_R+^{-1} (V_R^T V_L) D_L+^{-1}
    //                            + D_R- (U_R^T U_L) D_L-]^{-1} D_R- U_R^T.
    let mut inner = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            inner[(i, j)] =
                c[(j, i)] / (dr_big[i] * dl_big[j]) + dr_small[i] * x[(j, i)] * dl_small[j];
        }
    }
    let mut core = inner
        .try_inverse()
        .unwrap_or_else(|| DMatrix::identity(n, n));
    for i in 0..n {
        for j in 0..n {
            core[(i, j)] *= -dr_small[j] / dl_big[i];
        }
    }
    *g_0t = &vl * core * ur.transpose();
}

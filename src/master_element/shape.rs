//! Lagrange shape functions of the supported topologies on their reference domains.
use nalgebra::storage::RawStorage;
use nalgebra::{
    DMatrix, DVector, Dim, Matrix1x2, Matrix1x3, Matrix1x4, Matrix2x3, Matrix2x4, Matrix3x4, OMatrix, Point1, Point2,
    Point3, Vector2, Vector3, U1, U3, U5, U6, U8,
};
use numeric_literals::replace_float_literals;

use crate::topology::Topology;
use crate::Real;

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn segment2_basis<T: Real>(xi: &Point1<T>) -> Matrix1x2<T> {
    Matrix1x2::new((1.0 - xi[0]) / 2.0, (1.0 + xi[0]) / 2.0)
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn segment2_gradients<T: Real>(_xi: &Point1<T>) -> Matrix1x2<T> {
    Matrix1x2::new(-0.5, 0.5)
}

#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn quad4_basis<T: Real>(xi: &Point2<T>) -> Matrix1x4<T> {
    // N_{alpha, beta} evaluates to 1 at the node with reference coordinates [alpha, beta]
    let phi = |alpha, beta, xi: &Point2<T>| (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) / 4.0;
    Matrix1x4::new(
        phi(-1.0, -1.0, xi),
        phi( 1.0, -1.0, xi),
        phi( 1.0,  1.0, xi),
        phi(-1.0,  1.0, xi),
    )
}

#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn quad4_gradients<T: Real>(xi: &Point2<T>) -> Matrix2x4<T> {
    let phi_grad = |alpha, beta, xi: &Point2<T>|
        Vector2::new(
            alpha * (1.0 + beta * xi[1]) / 4.0,
            beta * (1.0 + alpha * xi[0]) / 4.0,
        );

    Matrix2x4::from_columns(&[
        phi_grad(-1.0, -1.0, xi),
        phi_grad( 1.0, -1.0, xi),
        phi_grad( 1.0,  1.0, xi),
        phi_grad(-1.0,  1.0, xi),
    ])
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn tri3_basis<T: Real>(xi: &Point2<T>) -> Matrix1x3<T> {
    Matrix1x3::new(1.0 - xi[0] - xi[1], xi[0], xi[1])
}

#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn tri3_gradients<T: Real>(_xi: &Point2<T>) -> Matrix2x3<T> {
    Matrix2x3::new(
        -1.0, 1.0, 0.0,
        -1.0, 0.0, 1.0,
    )
}

#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn hex8_basis<T: Real>(xi: &Point3<T>) -> OMatrix<T, U1, U8> {
    let phi = |alpha, beta, gamma, xi: &Point3<T>|
        (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) * (1.0 + gamma * xi[2]) / 8.0;
    OMatrix::<T, U1, U8>::from_row_slice(&[
        phi(-1.0, -1.0, -1.0, xi),
        phi( 1.0, -1.0, -1.0, xi),
        phi( 1.0,  1.0, -1.0, xi),
        phi(-1.0,  1.0, -1.0, xi),
        phi(-1.0, -1.0,  1.0, xi),
        phi( 1.0, -1.0,  1.0, xi),
        phi( 1.0,  1.0,  1.0, xi),
        phi(-1.0,  1.0,  1.0, xi),
    ])
}

#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn hex8_gradients<T: Real>(xi: &Point3<T>) -> OMatrix<T, U3, U8> {
    let phi_grad = |alpha, beta, gamma, xi: &Point3<T>|
        Vector3::new(
            alpha * (1.0 + beta * xi[1]) * (1.0 + gamma * xi[2]) / 8.0,
            beta * (1.0 + alpha * xi[0]) * (1.0 + gamma * xi[2]) / 8.0,
            gamma * (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) / 8.0,
        );

    OMatrix::<T, U3, U8>::from_columns(&[
        phi_grad(-1.0, -1.0, -1.0, xi),
        phi_grad( 1.0, -1.0, -1.0, xi),
        phi_grad( 1.0,  1.0, -1.0, xi),
        phi_grad(-1.0,  1.0, -1.0, xi),
        phi_grad(-1.0, -1.0,  1.0, xi),
        phi_grad( 1.0, -1.0,  1.0, xi),
        phi_grad( 1.0,  1.0,  1.0, xi),
        phi_grad(-1.0,  1.0,  1.0, xi),
    ])
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn tet4_basis<T: Real>(xi: &Point3<T>) -> Matrix1x4<T> {
    Matrix1x4::new(1.0 - xi[0] - xi[1] - xi[2], xi[0], xi[1], xi[2])
}

#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn tet4_gradients<T: Real>(_xi: &Point3<T>) -> Matrix3x4<T> {
    Matrix3x4::new(
        -1.0, 1.0, 0.0, 0.0,
        -1.0, 0.0, 1.0, 0.0,
        -1.0, 0.0, 0.0, 1.0,
    )
}

/// Wedge basis as the tensor product of the linear triangle in `(r, s)` and the linear
/// segment in `t`.
#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn wedge6_basis<T: Real>(xi: &Point3<T>) -> OMatrix<T, U1, U6> {
    let tri = tri3_basis(&Point2::new(xi[0], xi[1]));
    let bottom = (1.0 - xi[2]) / 2.0;
    let top = (1.0 + xi[2]) / 2.0;
    OMatrix::<T, U1, U6>::from_row_slice(&[
        tri[0] * bottom, tri[1] * bottom, tri[2] * bottom,
        tri[0] * top,    tri[1] * top,    tri[2] * top,
    ])
}

#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn wedge6_gradients<T: Real>(xi: &Point3<T>) -> OMatrix<T, U3, U6> {
    let tri = tri3_basis(&Point2::new(xi[0], xi[1]));
    let tri_grad = tri3_gradients(&Point2::new(xi[0], xi[1]));
    let bottom = (1.0 - xi[2]) / 2.0;
    let top = (1.0 + xi[2]) / 2.0;
    let column = |i: usize, t_factor: T, t_derivative: T| {
        Vector3::new(tri_grad[(0, i)] * t_factor, tri_grad[(1, i)] * t_factor, tri[i] * t_derivative)
    };
    OMatrix::<T, U3, U6>::from_columns(&[
        column(0, bottom, -0.5),
        column(1, bottom, -0.5),
        column(2, bottom, -0.5),
        column(0, top, 0.5),
        column(1, top, 0.5),
        column(2, top, 0.5),
    ])
}

/// Pyramid basis obtained by collapsing the top face of the trilinear hexahedron into the apex.
#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn pyramid5_basis<T: Real>(xi: &Point3<T>) -> OMatrix<T, U1, U5> {
    let phi = |alpha, beta, xi: &Point3<T>|
        (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) * (1.0 - xi[2]) / 8.0;
    OMatrix::<T, U1, U5>::from_row_slice(&[
        phi(-1.0, -1.0, xi),
        phi( 1.0, -1.0, xi),
        phi( 1.0,  1.0, xi),
        phi(-1.0,  1.0, xi),
        (1.0 + xi[2]) / 2.0,
    ])
}

#[rustfmt::skip]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn pyramid5_gradients<T: Real>(xi: &Point3<T>) -> OMatrix<T, U3, U5> {
    let phi_grad = |alpha, beta, xi: &Point3<T>|
        Vector3::new(
            alpha * (1.0 + beta * xi[1]) * (1.0 - xi[2]) / 8.0,
            beta * (1.0 + alpha * xi[0]) * (1.0 - xi[2]) / 8.0,
            -(1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) / 8.0,
        );
    OMatrix::<T, U3, U5>::from_columns(&[
        phi_grad(-1.0, -1.0, xi),
        phi_grad( 1.0, -1.0, xi),
        phi_grad( 1.0,  1.0, xi),
        phi_grad(-1.0,  1.0, xi),
        Vector3::new(0.0, 0.0, 0.5),
    ])
}

fn to_dvector<T, C, S>(row: &nalgebra::Matrix<T, U1, C, S>) -> DVector<T>
where
    T: Real,
    C: Dim,
    S: RawStorage<T, U1, C>,
{
    DVector::from_iterator(row.ncols(), row.iter().copied())
}

fn to_dmatrix<T, R, C, S>(m: &nalgebra::Matrix<T, R, C, S>) -> DMatrix<T>
where
    T: Real,
    R: Dim,
    C: Dim,
    S: RawStorage<T, R, C>,
{
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)])
}

/// Evaluates all basis functions of `topology` at the reference point `xi`.
///
/// Panics if `xi` does not have `topology.reference_dim()` entries.
pub fn evaluate_basis<T: Real>(topology: Topology, xi: &[T]) -> DVector<T> {
    assert_eq!(xi.len(), topology.reference_dim(), "Reference point has wrong dimension");
    match topology {
        Topology::Node => DVector::from_element(1, T::one()),
        Topology::Segment2d2 => to_dvector(&segment2_basis(&Point1::new(xi[0]))),
        Topology::Tri3d2 | Topology::Tri3d3 => to_dvector(&tri3_basis(&Point2::new(xi[0], xi[1]))),
        Topology::Quad4d2 | Topology::Quad4d3 => to_dvector(&quad4_basis(&Point2::new(xi[0], xi[1]))),
        Topology::Tet4 => to_dvector(&tet4_basis(&Point3::new(xi[0], xi[1], xi[2]))),
        Topology::Pyramid5 => to_dvector(&pyramid5_basis(&Point3::new(xi[0], xi[1], xi[2]))),
        Topology::Wedge6 => to_dvector(&wedge6_basis(&Point3::new(xi[0], xi[1], xi[2]))),
        Topology::Hex8 => to_dvector(&hex8_basis(&Point3::new(xi[0], xi[1], xi[2]))),
    }
}

/// Evaluates the reference gradients of all basis functions at `xi`.
///
/// Column `j` of the result holds the gradient of basis function `j`.
pub fn evaluate_basis_gradients<T: Real>(topology: Topology, xi: &[T]) -> DMatrix<T> {
    assert_eq!(xi.len(), topology.reference_dim(), "Reference point has wrong dimension");
    match topology {
        Topology::Node => DMatrix::zeros(0, 1),
        Topology::Segment2d2 => to_dmatrix(&segment2_gradients(&Point1::new(xi[0]))),
        Topology::Tri3d2 | Topology::Tri3d3 => to_dmatrix(&tri3_gradients(&Point2::new(xi[0], xi[1]))),
        Topology::Quad4d2 | Topology::Quad4d3 => to_dmatrix(&quad4_gradients(&Point2::new(xi[0], xi[1]))),
        Topology::Tet4 => to_dmatrix(&tet4_gradients(&Point3::new(xi[0], xi[1], xi[2]))),
        Topology::Pyramid5 => to_dmatrix(&pyramid5_gradients(&Point3::new(xi[0], xi[1], xi[2]))),
        Topology::Wedge6 => to_dmatrix(&wedge6_gradients(&Point3::new(xi[0], xi[1], xi[2]))),
        Topology::Hex8 => to_dmatrix(&hex8_gradients(&Point3::new(xi[0], xi[1], xi[2]))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn basis_is_nodal_and_partitions_unity() {
        for topology in Topology::ALL_ELEMENTS {
            let dim = topology.reference_dim();
            let coords = topology.reference_coordinates();
            for (i, xi) in coords.chunks(dim).enumerate() {
                let phi = evaluate_basis(topology, xi);
                for (j, value) in phi.iter().enumerate() {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!((value - expected).abs() < 1e-14, "{:?}: N_{}(x_{}) = {}", topology, j, i, value);
                }
            }
        }
    }

    #[test]
    fn gradients_match_finite_differences() {
        let h: f64 = 1e-6;
        for topology in Topology::ALL_ELEMENTS {
            let dim = topology.reference_dim();
            let xi = vec![0.1; dim];
            let grad = evaluate_basis_gradients(topology, &xi);
            for (d, j) in (0..dim).cartesian_product(0..topology.num_nodes()) {
                let mut plus = xi.clone();
                let mut minus = xi.clone();
                plus[d] += h;
                minus[d] -= h;
                let fd = (evaluate_basis(topology, &plus)[j] - evaluate_basis(topology, &minus)[j]) / (2.0 * h);
                assert!((fd - grad[(d, j)]).abs() < 1e-8, "{:?}", topology);
            }
        }
    }
}

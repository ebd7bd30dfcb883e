//! Test helpers shared by the test suites of the workspace.
use nalgebra::DVector;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Approx assertion for slices of nodal values, reporting the first offending index.
#[macro_export]
macro_rules! assert_approx_slice_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let (x, y): (&[f64], &[f64]) = (&$x, &$y);
        assert_eq!(x.len(), y.len(), "slices differ in length");
        for (i, (a, b)) in x.iter().zip(y).enumerate() {
            if (a - b).abs() > $tol {
                println!("abstol: {:e}", $tol);
                println!("left: {:?}", x);
                println!("right: {:?}", y);
                panic!("slices differ at index {}: {} vs {}", i, a, b);
            }
        }
    }};
}

/// Collects the values of one component of an interleaved field into a vector.
pub fn component(values: &[f64], components: usize, component: usize) -> DVector<f64> {
    DVector::from_iterator(
        values.len() / components,
        values.iter().skip(component).step_by(components).copied(),
    )
}

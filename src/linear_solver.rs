//! Preconditioned Krylov solvers for the assembled systems.
//!
//! Both solvers report non-convergence through [`KrylovOutput::converged`] instead of failing:
//! a linear solve that runs out of iterations still yields a usable (if inaccurate) update.
use std::error::Error;
use std::fmt;

use nalgebra::{DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T: RealField + Copy> LinearOperator<T> for CsrMatrix<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        if self.ncols() != x.len() || self.nrows() != y.len() {
            return Err(Box::new(DimensionMismatch {
                rows: self.nrows(),
                cols: self.ncols(),
                len: x.len(),
            }));
        }
        for (i, row) in self.row_iter().enumerate() {
            let mut sum = T::zero();
            for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
                sum += a_ij * x[j];
            }
            y[i] = sum;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct DimensionMismatch {
    rows: usize,
    cols: usize,
    len: usize,
}

impl fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot apply {}x{} operator to vector of length {}",
            self.rows, self.cols, self.len
        )
    }
}

impl Error for DimensionMismatch {}

#[derive(Debug, Copy, Clone)]
pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Diagonal (Jacobi) preconditioner `P = diag(A)^-1`.
///
/// Zero diagonal entries are left unscaled.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T: Scalar> {
    inverse_diagonal: DVector<T>,
}

impl<T: RealField + Copy> JacobiPreconditioner<T> {
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        let mut inverse_diagonal = DVector::repeat(matrix.nrows(), T::one());
        for (i, row) in matrix.row_iter().enumerate() {
            if let Some(a_ii) = row.get_entry(i).map(|entry| entry.into_value()) {
                if a_ii != T::zero() {
                    inverse_diagonal[i] = T::one() / a_ii;
                }
            }
        }
        Self { inverse_diagonal }
    }
}

impl<T: RealField + Copy> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KrylovMethod {
    #[serde(alias = "cg")]
    Cg,
    #[serde(alias = "bicgstab")]
    BiCgStab,
}

#[derive(Debug, Clone)]
pub struct KrylovOutput<T> {
    /// Number of updates made to the initial solution vector.
    pub num_iterations: usize,
    /// Final residual norm relative to the norm of the right-hand side.
    pub relative_residual: T,
    pub converged: bool,
}

#[derive(Debug)]
pub enum KrylovError {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
}

impl fmt::Display for KrylovError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
        }
    }
}

impl Error for KrylovError {}

/// Reusable vectors for both Krylov methods.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct KrylovWorkspace<T: Scalar> {
    r: DVector<T>,
    r_hat: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
    s: DVector<T>,
    t: DVector<T>,
}

impl<T: Scalar + RealField> Default for KrylovWorkspace<T> {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            r_hat: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
            s: DVector::zeros(0),
            t: DVector::zeros(0),
        }
    }
}

impl<T: Scalar + RealField> KrylovWorkspace<T> {
    fn prepare(&mut self, dim: usize) {
        for v in [
            &mut self.r,
            &mut self.r_hat,
            &mut self.z,
            &mut self.p,
            &mut self.Ap,
            &mut self.s,
            &mut self.t,
        ] {
            v.resize_vertically_mut(dim, T::zero());
            v.fill(T::zero());
        }
    }
}

/// Krylov solver configured in builder style.
///
/// ```ignore
/// let output = KrylovSolver::new(KrylovMethod::Cg)
///     .with_operator(&matrix)
///     .with_preconditioner(JacobiPreconditioner::from_csr(&matrix))
///     .with_tolerance(1e-10)
///     .with_max_iter(500)
///     .solve_with_guess(&b, &mut x)?;
/// ```
#[derive(Debug)]
pub struct KrylovSolver<T: Scalar, A, P> {
    method: KrylovMethod,
    workspace: KrylovWorkspace<T>,
    operator: A,
    preconditioner: P,
    tolerance: T,
    max_iter: usize,
}

impl<T: RealField + Copy> KrylovSolver<T, (), IdentityOperator> {
    pub fn new(method: KrylovMethod) -> Self {
        Self {
            method,
            workspace: KrylovWorkspace::default(),
            operator: (),
            preconditioner: IdentityOperator,
            tolerance: nalgebra::convert(1e-8),
            max_iter: 1000,
        }
    }
}

impl<T: RealField + Copy, P> KrylovSolver<T, (), P> {
    pub fn with_operator<A>(self, operator: A) -> KrylovSolver<T, A, P> {
        KrylovSolver {
            method: self.method,
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }
}

impl<T: RealField + Copy, A, P> KrylovSolver<T, A, P> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> KrylovSolver<T, A, P2> {
        KrylovSolver {
            method: self.method,
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }

    pub fn with_tolerance(self, tolerance: T) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self { max_iter, ..self }
    }
}

impl<T, A, P> KrylovSolver<T, A, P>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
{
    pub fn solve_with_guess(&mut self, b: &DVector<T>, x: &mut DVector<T>) -> Result<KrylovOutput<T>, KrylovError> {
        assert_eq!(b.len(), x.len());
        self.workspace.prepare(x.len());

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            return Ok(KrylovOutput {
                num_iterations: 0,
                relative_residual: T::zero(),
                converged: true,
            });
        }

        let mut ws = std::mem::take(&mut self.workspace);
        let result = match self.method {
            KrylovMethod::Cg => self.solve_cg(&mut ws, b, x, b_norm),
            KrylovMethod::BiCgStab => self.solve_bicgstab(&mut ws, b, x, b_norm),
        };
        self.workspace = ws;
        result
    }

    fn apply_operator(&self, y: &mut DVector<T>, x: &DVector<T>) -> Result<(), KrylovError> {
        self.operator
            .apply(y.into(), x.into())
            .map_err(KrylovError::OperatorError)
    }

    fn apply_preconditioner(&self, y: &mut DVector<T>, x: &DVector<T>) -> Result<(), KrylovError> {
        self.preconditioner
            .apply(y.into(), x.into())
            .map_err(KrylovError::PreconditionerError)
    }

    /// Stores `b - A x` in `r`.
    fn residual(&self, r: &mut DVector<T>, b: &DVector<T>, x: &DVector<T>) -> Result<(), KrylovError> {
        self.apply_operator(r, x)?;
        r.zip_apply(b, |ax_i, b_i| *ax_i = b_i - *ax_i);
        Ok(())
    }

    #[allow(non_snake_case)]
    fn solve_cg(
        &self,
        ws: &mut KrylovWorkspace<T>,
        b: &DVector<T>,
        x: &mut DVector<T>,
        b_norm: T,
    ) -> Result<KrylovOutput<T>, KrylovError> {
        let KrylovWorkspace { r, z, p, Ap, .. } = ws;
        let mut output = KrylovOutput {
            num_iterations: 0,
            relative_residual: T::zero(),
            converged: false,
        };

        self.residual(r, b, x)?;
        self.apply_preconditioner(z, r)?;
        p.copy_from(&*z);
        let mut zTr = z.dot(&*r);

        loop {
            output.relative_residual = r.norm() / b_norm;
            if output.relative_residual <= self.tolerance {
                output.converged = true;
                break;
            }
            if output.num_iterations >= self.max_iter {
                break;
            }

            self.apply_operator(Ap, p)?;
            let pAp = p.dot(&*Ap);
            // Breakdown of an operator or preconditioner that is not positive definite
            if pAp <= T::zero() || zTr <= T::zero() {
                break;
            }

            let alpha = zTr / pAp;
            x.zip_apply(&*p, |x_i, p_i| *x_i += alpha * p_i);
            r.zip_apply(&*Ap, |r_i, ap_i| *r_i -= alpha * ap_i);
            output.num_iterations += 1;

            self.apply_preconditioner(z, r)?;
            let zTr_next = z.dot(&*r);
            let beta = zTr_next / zTr;
            p.zip_apply(&*z, |p_i, z_i| *p_i = z_i + beta * *p_i);
            zTr = zTr_next;
        }
        Ok(output)
    }

    /// Right-preconditioned BiCGStab.
    #[allow(non_snake_case)]
    fn solve_bicgstab(
        &self,
        ws: &mut KrylovWorkspace<T>,
        b: &DVector<T>,
        x: &mut DVector<T>,
        b_norm: T,
    ) -> Result<KrylovOutput<T>, KrylovError> {
        let KrylovWorkspace {
            r,
            r_hat,
            z,
            p,
            Ap,
            s,
            t,
        } = ws;
        let mut output = KrylovOutput {
            num_iterations: 0,
            relative_residual: T::zero(),
            converged: false,
        };

        self.residual(r, b, x)?;
        r_hat.copy_from(&*r);
        let mut rho = T::one();
        let mut alpha = T::one();
        let mut omega = T::one();
        p.fill(T::zero());
        Ap.fill(T::zero());
        let mut s_hat = DVector::zeros(x.len());

        loop {
            output.relative_residual = r.norm() / b_norm;
            if output.relative_residual <= self.tolerance {
                output.converged = true;
                break;
            }
            if output.num_iterations >= self.max_iter {
                break;
            }

            let rho_next = r_hat.dot(&*r);
            if rho_next == T::zero() || omega == T::zero() {
                break;
            }
            let beta = (rho_next / rho) * (alpha / omega);
            rho = rho_next;

            // p <- r + beta * (p - omega * Ap)
            p.zip_apply(&*Ap, |p_i, ap_i| *p_i -= omega * ap_i);
            p.zip_apply(&*r, |p_i, r_i| *p_i = r_i + beta * *p_i);

            self.apply_preconditioner(z, p)?;
            self.apply_operator(Ap, z)?;
            let r_hat_Ap = r_hat.dot(&*Ap);
            if r_hat_Ap == T::zero() {
                break;
            }
            alpha = rho / r_hat_Ap;

            // s <- r - alpha * Ap
            s.copy_from(&*r);
            s.zip_apply(&*Ap, |s_i, ap_i| *s_i -= alpha * ap_i);
            x.zip_apply(&*z, |x_i, z_i| *x_i += alpha * z_i);
            output.num_iterations += 1;

            if s.norm() / b_norm <= self.tolerance {
                r.copy_from(&*s);
                continue;
            }

            self.apply_preconditioner(&mut s_hat, s)?;
            self.apply_operator(t, &s_hat)?;
            let tt = t.dot(&*t);
            omega = if tt > T::zero() { t.dot(&*s) / tt } else { T::zero() };

            x.zip_apply(&s_hat, |x_i, s_i| *x_i += omega * s_i);
            r.copy_from(&*s);
            r.zip_apply(&*t, |r_i, t_i| *r_i -= omega * t_i);
        }
        Ok(output)
    }
}

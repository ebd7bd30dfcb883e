//! Assembled linear systems, one per equation system.
//!
//! Rows and columns are ordered node-major: dof `d` of local node `n` lives at
//! `dofs_per_node * n + d`.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use log::{debug, warn};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use crate::config::{LinearSolverConfig, PreconditionerType};
use crate::error::{CvfemError, Result};
use crate::linear_solver::{JacobiPreconditioner, KrylovOutput, KrylovSolver};
use crate::mesh::{MeshDatabase, Ownership, PartId};
use crate::topology::EntityRank;

/// Outcome of one linear solve. Non-convergence is reported here, never raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveSummary {
    pub iterations: usize,
    /// Residual of the linear solve relative to the norm of the right-hand side.
    pub linear_residual: f64,
    /// Norm of the assembled right-hand side, i.e. the nonlinear residual before the solve.
    pub nonlinear_residual: f64,
    pub converged: bool,
}

pub trait LinearSystem: Debug + Send {
    fn name(&self) -> &str;

    fn dofs_per_node(&self) -> usize;

    fn num_rows(&self) -> usize;

    /// Adds a fully coupled block between all `nodes` to the matrix graph.
    fn add_connectivity(&mut self, nodes: &[usize]);

    /// Couples every node of every locally owned element in `parts`.
    fn build_elem_graph(&mut self, mesh: &MeshDatabase, parts: &[PartId]) {
        for bucket in mesh.buckets(EntityRank::Element, parts, Ownership::LocallyOwned) {
            for &e in &bucket.entities {
                self.add_connectivity(&mesh.elements()[e].nodes);
            }
        }
    }

    /// Couples the nodes of the element attached to every face in `parts`.
    fn build_face_elem_graph(&mut self, mesh: &MeshDatabase, parts: &[PartId]) -> Result<()> {
        for bucket in mesh.buckets(EntityRank::Face, parts, Ownership::LocallyOwned) {
            for &f in &bucket.entities {
                let relation = mesh.face_element(f)?;
                self.add_connectivity(&mesh.elements()[relation.element].nodes);
            }
        }
        Ok(())
    }

    /// Couples the nodes of every face in `parts`.
    fn build_face_graph(&mut self, mesh: &MeshDatabase, parts: &[PartId]) {
        for bucket in mesh.buckets(EntityRank::Face, parts, Ownership::LocallyOwned) {
            for &f in &bucket.entities {
                self.add_connectivity(&mesh.faces()[f].nodes);
            }
        }
    }

    /// Adds the diagonal block of every node in `parts`.
    fn build_node_graph(&mut self, mesh: &MeshDatabase, parts: &[PartId]) {
        for node in mesh.select_nodes(parts, Ownership::OwnedOrShared) {
            self.add_connectivity(&[node]);
        }
    }

    /// Freezes the graph and allocates the matrix and vectors.
    fn finalize_linear_system(&mut self) -> Result<()>;

    fn zero_system(&mut self) -> Result<()>;

    /// Adds a dense contribution for `nodes`.
    ///
    /// `rhs` has `nodes.len() * dofs` entries and `lhs` is the row-major square block of the
    /// same size.
    fn sum_into(&mut self, nodes: &[usize], rhs: &[f64], lhs: &[f64]) -> Result<()>;

    /// Replaces the rows of dofs `dof_begin..dof_end` of `nodes` by `diag_value` on the diagonal
    /// and `rhs_residual` on the right-hand side. Later `sum_into` calls may still add to the
    /// right-hand side of these rows.
    fn reset_rows(
        &mut self,
        nodes: &[usize],
        dof_begin: usize,
        dof_end: usize,
        diag_value: f64,
        rhs_residual: f64,
    ) -> Result<()>;

    fn rhs(&self) -> &[f64];

    /// Solves for the update `delta`, which must have [`num_rows`](Self::num_rows) entries.
    fn solve(&mut self, delta: &mut [f64]) -> Result<SolveSummary>;
}

/// CSR-backed linear system solved by a preconditioned Krylov method.
#[derive(Debug)]
pub struct CsrLinearSystem {
    name: String,
    dofs_per_node: usize,
    num_nodes: usize,
    solver: LinearSolverConfig,
    // Collected in a BTreeSet so that every entry is stored exactly once and in CSR order.
    entries: BTreeSet<(usize, usize)>,
    matrix: Option<CsrMatrix<f64>>,
    rhs: DVector<f64>,
    dirichlet_rows: BTreeSet<usize>,
}

impl CsrLinearSystem {
    pub fn new(name: &str, dofs_per_node: usize, num_nodes: usize, solver: LinearSolverConfig) -> Self {
        Self {
            name: name.to_string(),
            dofs_per_node,
            num_nodes,
            solver,
            entries: BTreeSet::new(),
            matrix: None,
            rhs: DVector::zeros(dofs_per_node * num_nodes),
            dirichlet_rows: BTreeSet::new(),
        }
    }

    pub fn matrix(&self) -> Option<&CsrMatrix<f64>> {
        self.matrix.as_ref()
    }

    fn matrix_mut(&mut self) -> Result<&mut CsrMatrix<f64>> {
        let name = &self.name;
        self.matrix
            .as_mut()
            .ok_or_else(|| CvfemError::LinearSystem(format!("linear system {} is not finalized", name)))
    }

    /// Moves the known values of Dirichlet rows to the right-hand side of all other rows, so the
    /// reduced operator keeps the symmetry of the assembled one.
    fn eliminate_dirichlet_columns(&mut self) -> Result<()> {
        if self.dirichlet_rows.is_empty() {
            return Ok(());
        }
        let matrix = self
            .matrix
            .as_mut()
            .ok_or_else(|| CvfemError::LinearSystem(format!("linear system {} is not finalized", self.name)))?;

        let mut known = BTreeMap::new();
        for &i in &self.dirichlet_rows {
            let row = matrix.row(i);
            let diag = row.get_entry(i).map(|e| e.into_value()).unwrap_or(0.0);
            if diag != 0.0 {
                known.insert(i, self.rhs[i] / diag);
            }
        }

        for i in 0..matrix.nrows() {
            if self.dirichlet_rows.contains(&i) {
                continue;
            }
            let mut row = matrix.row_mut(i);
            let (cols, values) = row.cols_and_values_mut();
            for (&j, a_ij) in cols.iter().zip(values.iter_mut()) {
                if let Some(&x_j) = known.get(&j) {
                    self.rhs[i] -= *a_ij * x_j;
                    *a_ij = 0.0;
                }
            }
        }
        Ok(())
    }
}

impl LinearSystem for CsrLinearSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn dofs_per_node(&self) -> usize {
        self.dofs_per_node
    }

    fn num_rows(&self) -> usize {
        self.dofs_per_node * self.num_nodes
    }

    fn add_connectivity(&mut self, nodes: &[usize]) {
        let sdim = self.dofs_per_node;
        for node_i in nodes {
            for node_j in nodes {
                for s_i in 0..sdim {
                    for s_j in 0..sdim {
                        self.entries
                            .insert((sdim * node_i + s_i, sdim * node_j + s_j));
                    }
                }
            }
        }
    }

    fn finalize_linear_system(&mut self) -> Result<()> {
        let num_rows = self.num_rows();
        // Every row carries at least its diagonal, so rows of unconnected nodes stay solvable.
        for i in 0..num_rows {
            self.entries.insert((i, i));
        }

        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(self.entries.len());
        offsets.push(0);
        for &(i, j) in &self.entries {
            if i >= num_rows || j >= num_rows {
                return Err(CvfemError::LinearSystem(format!(
                    "entry ({}, {}) is outside of the {} rows of linear system {}",
                    i, j, num_rows, self.name
                )));
            }
            while i + 1 > offsets.len() {
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }
        while offsets.len() < num_rows + 1 {
            offsets.push(column_indices.len());
        }

        let values = vec![0.0; column_indices.len()];
        let matrix = CsrMatrix::try_from_csr_data(num_rows, num_rows, offsets, column_indices, values)
            .map_err(|err| CvfemError::LinearSystem(format!("invalid graph for {}: {}", self.name, err)))?;
        debug!(
            "linear system {}: {} rows, {} non-zeros",
            self.name,
            num_rows,
            matrix.nnz()
        );
        self.matrix = Some(matrix);
        self.rhs = DVector::zeros(num_rows);
        Ok(())
    }

    fn zero_system(&mut self) -> Result<()> {
        self.matrix_mut()?.values_mut().fill(0.0);
        self.rhs.fill(0.0);
        self.dirichlet_rows.clear();
        Ok(())
    }

    fn sum_into(&mut self, nodes: &[usize], rhs: &[f64], lhs: &[f64]) -> Result<()> {
        let sdim = self.dofs_per_node;
        let n = nodes.len() * sdim;
        if rhs.len() != n || lhs.len() != n * n {
            return Err(CvfemError::LinearSystem(format!(
                "contribution of size {}/{} does not match {} nodes with {} dofs",
                rhs.len(),
                lhs.len(),
                nodes.len(),
                sdim
            )));
        }
        let name = self.name.clone();
        let matrix = self.matrix_mut()?;
        for (local_i, &node_i) in nodes.iter().enumerate() {
            for s_i in 0..sdim {
                let local_row = sdim * local_i + s_i;
                let global_row = sdim * node_i + s_i;
                let mut csr_row = matrix.row_mut(global_row);
                let (cols, values) = csr_row.cols_and_values_mut();
                for (local_j, &node_j) in nodes.iter().enumerate() {
                    for s_j in 0..sdim {
                        let a = lhs[n * local_row + sdim * local_j + s_j];
                        if a == 0.0 {
                            continue;
                        }
                        let global_col = sdim * node_j + s_j;
                        let k = cols.binary_search(&global_col).map_err(|_| {
                            CvfemError::LinearSystem(format!(
                                "entry ({}, {}) is not in the graph of {}",
                                global_row, global_col, name
                            ))
                        })?;
                        values[k] += a;
                    }
                }
            }
        }
        for (local_i, &node_i) in nodes.iter().enumerate() {
            for s_i in 0..sdim {
                self.rhs[sdim * node_i + s_i] += rhs[sdim * local_i + s_i];
            }
        }
        Ok(())
    }

    fn reset_rows(
        &mut self,
        nodes: &[usize],
        dof_begin: usize,
        dof_end: usize,
        diag_value: f64,
        rhs_residual: f64,
    ) -> Result<()> {
        let sdim = self.dofs_per_node;
        let matrix = self.matrix_mut()?;
        let mut rows = Vec::with_capacity(nodes.len() * (dof_end - dof_begin));
        for &node in nodes {
            for d in dof_begin..dof_end.min(sdim) {
                let global_row = sdim * node + d;
                let mut csr_row = matrix.row_mut(global_row);
                let (cols, values) = csr_row.cols_and_values_mut();
                for (&j, v) in cols.iter().zip(values.iter_mut()) {
                    *v = if j == global_row { diag_value } else { 0.0 };
                }
                rows.push(global_row);
            }
        }
        for row in rows {
            self.rhs[row] = rhs_residual;
            self.dirichlet_rows.insert(row);
        }
        Ok(())
    }

    fn rhs(&self) -> &[f64] {
        self.rhs.as_slice()
    }

    fn solve(&mut self, delta: &mut [f64]) -> Result<SolveSummary> {
        let num_rows = self.num_rows();
        if delta.len() != num_rows {
            return Err(CvfemError::LinearSystem(format!(
                "solution vector of length {} for {} rows",
                delta.len(),
                num_rows
            )));
        }
        let nonlinear_residual = self.rhs.norm();
        self.eliminate_dirichlet_columns()?;

        let matrix = self
            .matrix
            .as_ref()
            .ok_or_else(|| CvfemError::LinearSystem(format!("linear system {} is not finalized", self.name)))?;
        let mut x = DVector::zeros(num_rows);
        let solver = KrylovSolver::new(self.solver.method)
            .with_operator(matrix)
            .with_tolerance(self.solver.tolerance)
            .with_max_iter(self.solver.max_iterations);
        let output: KrylovOutput<f64> = match self.solver.preconditioner {
            PreconditionerType::Jacobi => solver
                .with_preconditioner(JacobiPreconditioner::from_csr(matrix))
                .solve_with_guess(&self.rhs, &mut x),
            PreconditionerType::None => {
                let mut solver = solver;
                solver.solve_with_guess(&self.rhs, &mut x)
            }
        }
        .map_err(|err| CvfemError::LinearSystem(format!("{}: {}", self.name, err)))?;

        if !output.converged {
            warn!(
                "linear solve of {} did not converge: {} iterations, relative residual {:e}",
                self.name, output.num_iterations, output.relative_residual
            );
        }
        delta.copy_from_slice(x.as_slice());
        Ok(SolveSummary {
            iterations: output.num_iterations,
            linear_residual: output.relative_residual,
            nonlinear_residual,
            converged: output.converged,
        })
    }
}

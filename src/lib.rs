use nalgebra::RealField;

pub mod algorithm;
pub mod algorithms;
pub mod assembly;
pub mod config;
pub mod equation_system;
pub mod error;
pub mod field_functions;
pub mod geometry;
pub mod heat_conduction;
pub mod linear_solver;
pub mod linear_system;
pub mod master_element;
pub mod mesh;
pub mod projected_nodal_gradient;
pub mod realm;
pub mod simulation;
pub mod time_integrator;
pub mod topology;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Scalar type used by the generic shape function routines.
///
/// Used as a trait alias for the traits frequently needed by generic routines.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Default number of entities gathered into one batch.
pub const DEFAULT_SIMD_LEN: usize = 8;

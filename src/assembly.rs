//! Batched gathering of per-entity data and data-parallel evaluation of numerical kernels.
//!
//! An algorithm declares the data its kernel needs through an [`ElementDataRequest`]. The
//! [`BatchAssembler`] walks the mesh buckets of the algorithm's parts, cuts them into batches of
//! at most `simd_len` entities sharing one face ordinal, gathers the requested data into the
//! [`ScratchViews`] of a per-worker [`SharedMemData`] and invokes the kernel once per batch.
mod batch;
mod request;
mod scratch;

pub use batch::{simd_batches, BatchAssembler};
pub use request::{ElementDataRequest, FieldRequest, MasterElementQuantity};
pub use scratch::{ScratchView, ScratchViews, SharedMemData};

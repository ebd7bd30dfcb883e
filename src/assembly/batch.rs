use std::cell::RefCell;
use std::ops::Range;

use log::trace;
use rayon::iter::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use thread_local::ThreadLocal;

use crate::assembly::request::ElementDataRequest;
use crate::assembly::scratch::SharedMemData;
use crate::error::Result;
use crate::master_element::MasterElementRepo;
use crate::mesh::{Bucket, MeshDatabase, Ownership, PartId};
use crate::topology::EntityRank;

/// Splits a bucket into batches.
///
/// The bucket is first cut into consecutive groups of at most `simd_len` entities. Each group is
/// then scanned and a batch is closed as soon as an entity's ordinal differs from that of the
/// first entity of the batch, so a single group may produce several batches and no batch ever
/// mixes ordinals.
pub fn simd_batches(ordinals: &[usize], simd_len: usize) -> Vec<Range<usize>> {
    let simd_len = simd_len.max(1);
    let mut batches = Vec::new();
    let mut group_start = 0;
    while group_start < ordinals.len() {
        let group_end = (group_start + simd_len).min(ordinals.len());
        let mut start = group_start;
        while start < group_end {
            let ordinal = ordinals[start];
            let mut end = start + 1;
            while end < group_end && ordinals[end] == ordinal {
                end += 1;
            }
            batches.push(start..end);
            start = end;
        }
        group_start = group_end;
    }
    batches
}

/// Drives batched, data-parallel assembly over mesh buckets.
///
/// Buckets are processed in parallel, and the batches of a bucket are again processed in
/// parallel. Every worker thread reuses its own [`SharedMemData`]. Kernel results are returned
/// in a deterministic order (bucket order, then batch order) so that the caller can scatter
/// them sequentially without locking.
#[derive(Debug)]
pub struct BatchAssembler {
    simd_len: usize,
    workspace: ThreadLocal<RefCell<SharedMemData>>,
}

impl BatchAssembler {
    pub fn new(simd_len: usize) -> Self {
        Self {
            simd_len: simd_len.max(1),
            workspace: ThreadLocal::new(),
        }
    }

    pub fn simd_len(&self) -> usize {
        self.simd_len
    }

    /// Runs `kernel` once per batch of locally owned elements in `parts`.
    pub fn run_elem_algorithm<R, F>(
        &self,
        mesh: &MeshDatabase,
        repo: &MasterElementRepo,
        parts: &[PartId],
        request: &ElementDataRequest,
        kernel: F,
    ) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&SharedMemData) -> R + Sync,
    {
        let buckets = mesh.buckets(EntityRank::Element, parts, Ownership::LocallyOwned);
        let gather = |smd: &mut SharedMemData, entities: &[usize], _: Option<usize>| {
            smd.elem
                .fill(mesh, repo, EntityRank::Element, entities, request, self.simd_len, None)
        };
        self.run_batches(&buckets, |_| Ok(None), gather, &kernel)
    }

    /// Runs `kernel` once per batch of locally owned faces in `parts`.
    pub fn run_face_algorithm<R, F>(
        &self,
        mesh: &MeshDatabase,
        repo: &MasterElementRepo,
        parts: &[PartId],
        request: &ElementDataRequest,
        kernel: F,
    ) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&SharedMemData) -> R + Sync,
    {
        let buckets = mesh.buckets(EntityRank::Face, parts, Ownership::LocallyOwned);
        let gather = |smd: &mut SharedMemData, entities: &[usize], _: Option<usize>| {
            smd.face
                .fill(mesh, repo, EntityRank::Face, entities, request, self.simd_len, None)
        };
        self.run_batches(&buckets, |_| Ok(None), gather, &kernel)
    }

    /// Runs `kernel` once per batch of locally owned faces in `parts` together with the element
    /// attached to each face. All faces of a batch share the same face ordinal in their element.
    ///
    /// A face that is not attached to exactly one element is a fatal precondition violation.
    pub fn run_face_elem_algorithm<R, F>(
        &self,
        mesh: &MeshDatabase,
        repo: &MasterElementRepo,
        parts: &[PartId],
        face_request: &ElementDataRequest,
        elem_request: &ElementDataRequest,
        kernel: F,
    ) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&SharedMemData) -> R + Sync,
    {
        let buckets = mesh.buckets(EntityRank::Face, parts, Ownership::LocallyOwned);
        let gather = |smd: &mut SharedMemData, faces: &[usize], ordinal: Option<usize>| {
            smd.face
                .fill(mesh, repo, EntityRank::Face, faces, face_request, self.simd_len, ordinal)?;
            let elements = faces
                .iter()
                .map(|&face| Ok(mesh.face_element(face)?.element))
                .collect::<Result<Vec<_>>>()?;
            smd.elem
                .fill(mesh, repo, EntityRank::Element, &elements, elem_request, self.simd_len, ordinal)
        };
        self.run_batches(&buckets, |face| Ok(Some(mesh.face_element(face)?.ordinal)), gather, &kernel)
    }

    fn run_batches<R, O, G, F>(&self, buckets: &[Bucket], ordinal_of: O, gather: G, kernel: &F) -> Result<Vec<R>>
    where
        R: Send,
        O: Fn(usize) -> Result<Option<usize>> + Sync,
        G: Fn(&mut SharedMemData, &[usize], Option<usize>) -> Result<()> + Sync,
        F: Fn(&SharedMemData) -> R + Sync,
    {
        let per_bucket = buckets
            .par_iter()
            .map(|bucket| {
                let ordinals = bucket
                    .entities
                    .iter()
                    .map(|&e| ordinal_of(e))
                    .collect::<Result<Vec<_>>>()?;
                let keys: Vec<usize> = ordinals.iter().map(|o| o.unwrap_or(0)).collect();
                let batches = simd_batches(&keys, self.simd_len);
                trace!(
                    "bucket {:?} (part {:?}): {} entities in {} batches",
                    bucket.topology,
                    bucket.part,
                    bucket.entities.len(),
                    batches.len()
                );
                batches
                    .into_par_iter()
                    .map(|range| {
                        let ws = &mut *self.workspace.get_or_default().borrow_mut();
                        let ordinal = ordinals[range.start];
                        let entities = &bucket.entities[range];
                        ws.begin_batch(entities.len(), self.simd_len, ordinal);
                        gather(ws, entities, ordinal)?;
                        Ok(kernel(ws))
                    })
                    .collect::<Result<Vec<R>>>()
            })
            .collect::<Result<Vec<Vec<R>>>>()?;
        Ok(per_bucket.into_iter().flatten().collect())
    }
}

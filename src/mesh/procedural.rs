//! Basic procedural mesh generation routines.
use itertools::iproduct;

use crate::error::{CvfemError, Result};
use crate::mesh::{MeshBuilder, MeshDatabase};
use crate::topology::Topology;

/// Name of the element block created by the generators in this module.
pub const BLOCK: &str = "block_1";

const FACE_TOLERANCE: f64 = 1e-12;

fn classify_box_side(extent: &[f64], centroid: &[f64]) -> Option<String> {
    let names = [("left", "right"), ("bottom", "top"), ("back", "front")];
    for (d, (low, high)) in names.iter().enumerate().take(extent.len()) {
        if centroid[d].abs() < FACE_TOLERANCE * extent[d].max(1.0) {
            return Some(low.to_string());
        }
        if (centroid[d] - extent[d]).abs() < FACE_TOLERANCE * extent[d].max(1.0) {
            return Some(high.to_string());
        }
    }
    None
}

fn check_cells(cells: &[usize]) -> Result<()> {
    if cells.iter().any(|&n| n == 0) {
        Err(CvfemError::configuration("a box mesh needs at least one cell per direction"))
    } else {
        Ok(())
    }
}

/// Generates a uniform quadrilateral mesh of `[0, lx] x [0, ly]`.
///
/// Elements go into the part [`BLOCK`], boundary edges into the side parts `left`, `right`,
/// `bottom` and `top`.
pub fn create_rectangular_quad_mesh_2d(cells: [usize; 2], extent: [f64; 2]) -> Result<MeshDatabase> {
    create_rectangular_mesh_2d(cells, extent, false)
}

/// Like [`create_rectangular_quad_mesh_2d`], with every quadrilateral split into two triangles.
pub fn create_rectangular_tri_mesh_2d(cells: [usize; 2], extent: [f64; 2]) -> Result<MeshDatabase> {
    create_rectangular_mesh_2d(cells, extent, true)
}

fn create_rectangular_mesh_2d(cells: [usize; 2], extent: [f64; 2], split: bool) -> Result<MeshDatabase> {
    check_cells(&cells)?;
    let [nx, ny] = cells;
    let mut builder = MeshBuilder::new(2);
    let to_global_vertex_index = |i: usize, j: usize| (nx + 1) * j + i;

    for (j, i) in iproduct!(0..=ny, 0..=nx) {
        let x = extent[0] * i as f64 / nx as f64;
        let y = extent[1] * j as f64 / ny as f64;
        builder.add_node(to_global_vertex_index(i, j) as u64 + 1, &[x, y])?;
    }

    let mut next_id = 1;
    for (j, i) in iproduct!(0..ny, 0..nx) {
        let quad = [
            to_global_vertex_index(i, j),
            to_global_vertex_index(i + 1, j),
            to_global_vertex_index(i + 1, j + 1),
            to_global_vertex_index(i, j + 1),
        ];
        if split {
            builder.add_element(BLOCK, Topology::Tri3d2, next_id, &[quad[0], quad[1], quad[2]])?;
            builder.add_element(BLOCK, Topology::Tri3d2, next_id + 1, &[quad[0], quad[2], quad[3]])?;
            next_id += 2;
        } else {
            builder.add_element(BLOCK, Topology::Quad4d2, next_id, &quad)?;
            next_id += 1;
        }
    }

    builder.add_exposed_sides(|centroid| classify_box_side(&extent, centroid))?;
    builder.build()
}

/// Generates a uniform hexahedral mesh of `[0, lx] x [0, ly] x [0, lz]`.
///
/// Boundary faces go into the side parts `left`/`right` (x), `bottom`/`top` (y) and
/// `back`/`front` (z).
pub fn create_rectangular_hex_mesh(cells: [usize; 3], extent: [f64; 3]) -> Result<MeshDatabase> {
    create_rectangular_mesh_3d(cells, extent, false)
}

/// Like [`create_rectangular_hex_mesh`], with every hexahedron split into six tetrahedra sharing
/// the diagonal from its first to its seventh node.
pub fn create_rectangular_tet_mesh(cells: [usize; 3], extent: [f64; 3]) -> Result<MeshDatabase> {
    create_rectangular_mesh_3d(cells, extent, true)
}

#[rustfmt::skip]
const HEX_TO_TETS: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
    [0, 5, 1, 6],
];

fn create_rectangular_mesh_3d(cells: [usize; 3], extent: [f64; 3], split: bool) -> Result<MeshDatabase> {
    check_cells(&cells)?;
    let [nx, ny, nz] = cells;
    let mut builder = MeshBuilder::new(3);
    let to_global_vertex_index = |i: usize, j: usize, k: usize| (nx + 1) * (ny + 1) * k + (nx + 1) * j + i;

    for (k, j, i) in iproduct!(0..=nz, 0..=ny, 0..=nx) {
        let x = extent[0] * i as f64 / nx as f64;
        let y = extent[1] * j as f64 / ny as f64;
        let z = extent[2] * k as f64 / nz as f64;
        builder.add_node(to_global_vertex_index(i, j, k) as u64 + 1, &[x, y, z])?;
    }

    let mut next_id = 1;
    for (k, j, i) in iproduct!(0..nz, 0..ny, 0..nx) {
        let hex = [
            to_global_vertex_index(i, j, k),
            to_global_vertex_index(i + 1, j, k),
            to_global_vertex_index(i + 1, j + 1, k),
            to_global_vertex_index(i, j + 1, k),
            to_global_vertex_index(i, j, k + 1),
            to_global_vertex_index(i + 1, j, k + 1),
            to_global_vertex_index(i + 1, j + 1, k + 1),
            to_global_vertex_index(i, j + 1, k + 1),
        ];
        if split {
            for tet in HEX_TO_TETS {
                let nodes = tet.map(|local| hex[local]);
                builder.add_element(BLOCK, Topology::Tet4, next_id, &nodes)?;
                next_id += 1;
            }
        } else {
            builder.add_element(BLOCK, Topology::Hex8, next_id, &hex)?;
            next_id += 1;
        }
    }

    builder.add_exposed_sides(|centroid| classify_box_side(&extent, centroid))?;
    builder.build()
}

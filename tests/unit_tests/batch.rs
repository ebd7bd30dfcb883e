use std::collections::BTreeSet;

use cvflow::assembly::{simd_batches, BatchAssembler, ElementDataRequest, MasterElementQuantity};
use cvflow::master_element::MasterElementRepo;
use cvflow::mesh::procedural::create_rectangular_hex_mesh;
use cvflow::topology::EntityRank;
use proptest::collection::vec;
use proptest::prelude::*;

#[test]
fn batches_close_when_the_ordinal_changes() {
    let ordinals = [0, 0, 1, 1, 1, 2, 0, 0];
    let batches = simd_batches(&ordinals, 4);
    assert_eq!(batches, vec![0..2, 2..4, 4..5, 5..6, 6..8]);
}

#[test]
fn face_element_batches_share_one_ordinal() {
    let mesh = create_rectangular_hex_mesh([3, 2, 2], [3.0, 2.0, 2.0]).unwrap();
    let repo = MasterElementRepo::new();
    let assembler = BatchAssembler::new(4);
    let parts: Vec<_> = ["left", "right", "bottom", "top", "back", "front"]
        .iter()
        .map(|name| mesh.part_id(name).unwrap())
        .collect();
    let face_request = ElementDataRequest::new().with_quantity(MasterElementQuantity::FcAreaVector);
    let elem_request = ElementDataRequest::new().with_coordinates();

    let batches = assembler
        .run_face_elem_algorithm(&mesh, &repo, &parts, &face_request, &elem_request, |smd| {
            let ordinal = smd.ordinal.unwrap();
            let faces: Vec<usize> = (0..smd.num_simd_elems()).map(|lane| smd.face.entity(lane)).collect();
            (ordinal, faces)
        })
        .unwrap();

    let mut seen = BTreeSet::new();
    for (ordinal, faces) in batches {
        assert!(!faces.is_empty() && faces.len() <= 4);
        for face in faces {
            assert_eq!(mesh.face_element(face).unwrap().ordinal, ordinal);
            assert!(seen.insert(face), "face {} visited twice", face);
        }
    }
    assert_eq!(seen.len(), mesh.num_entities(EntityRank::Face));
}

proptest! {
    #[test]
    fn every_batch_has_a_single_ordinal(ordinals in vec(0usize..4, 0..64), simd_len in 1usize..10) {
        let batches = simd_batches(&ordinals, simd_len);
        let mut next = 0;
        for batch in &batches {
            // Batches tile the bucket in order and never straddle a SIMD group.
            prop_assert_eq!(batch.start, next);
            prop_assert!(!batch.is_empty() && batch.len() <= simd_len);
            prop_assert_eq!(batch.start / simd_len, (batch.end - 1) / simd_len);
            let ordinal = ordinals[batch.start];
            prop_assert!(ordinals[batch.clone()].iter().all(|&o| o == ordinal));
            next = batch.end;
        }
        prop_assert_eq!(next, ordinals.len());
    }
}

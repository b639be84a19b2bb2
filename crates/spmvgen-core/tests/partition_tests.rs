use proptest::prelude::*;
use spmvgen_core::{partition, Csr, MatrixError, StripeInfo};

fn csr_with_row_lengths(lengths: &[usize], ncols: usize) -> Csr {
    let mut indptr = vec![0i32];
    let mut indices = Vec::new();
    for &len in lengths {
        indices.extend((0..len).map(|j| j as i32));
        indptr.push(indices.len() as i32);
    }
    let data = vec![1.0; indices.len()];
    Csr::from_parts(lengths.len(), ncols, indptr, indices, data, true).unwrap()
}

fn assert_exact_cover(a: &Csr, stripes: &[StripeInfo]) {
    let mut row = 0usize;
    let mut val = 0usize;
    for s in stripes {
        assert_eq!(s.row_begin, row, "row gap or overlap at {s:?}");
        assert_eq!(s.val_begin, val, "value gap or overlap at {s:?}");
        assert!(s.row_end >= s.row_begin && s.val_end >= s.val_begin);
        assert_eq!(s.val_begin, a.indptr[s.row_begin] as usize, "row split at {s:?}");
        assert_eq!(s.val_end, a.indptr[s.row_end] as usize, "row split at {s:?}");
        row = s.row_end;
        val = s.val_end;
    }
    assert_eq!(row, a.nrows);
    assert_eq!(val, a.nnz());
}

#[test]
fn single_lane_covers_everything() {
    let a = csr_with_row_lengths(&[3, 1, 3, 2], 4);
    let stripes = partition(&a, 1).unwrap();
    assert_eq!(stripes, vec![StripeInfo { row_begin: 0, row_end: 4, val_begin: 0, val_end: 9 }]);
}

#[test]
fn two_lanes_split_rows_evenly_by_nnz() {
    let a = csr_with_row_lengths(&[3, 1, 3, 2], 4);
    let stripes = a.stripes(2).unwrap();
    assert_eq!(stripes[0].rows(), 0..2);
    assert_eq!(stripes[1].rows(), 2..4);
    assert_eq!(stripes[0].nnz(), 4);
    assert_eq!(stripes[1].nnz(), 5);
}

#[test]
fn heavy_row_is_never_split() {
    let a = csr_with_row_lengths(&[1, 20, 1, 1], 20);
    let stripes = partition(&a, 3).unwrap();
    assert_exact_cover(&a, &stripes);
    assert!(stripes.iter().any(|s| s.rows().contains(&1) && s.nnz() >= 20));
}

#[test]
fn more_lanes_than_rows_yields_empty_stripes() {
    let a = csr_with_row_lengths(&[2, 2], 2);
    let stripes = partition(&a, 5).unwrap();
    assert_eq!(stripes.len(), 5);
    assert_exact_cover(&a, &stripes);
    assert_eq!(stripes.iter().filter(|s| s.is_empty()).count(), 3);
}

#[test]
fn zero_lanes_rejected() {
    let a = csr_with_row_lengths(&[1], 1);
    assert_eq!(partition(&a, 0).unwrap_err(), MatrixError::ZeroLanes);
}

#[test]
fn empty_matrix_partitions() {
    let a = csr_with_row_lengths(&[], 3);
    let stripes = partition(&a, 4).unwrap();
    assert_eq!(stripes.len(), 4);
    assert!(stripes.iter().all(StripeInfo::is_empty));
}

proptest! {
    #[test]
    fn stripes_partition_rows_and_values(
        lengths in prop::collection::vec(0usize..12, 0..64),
        lanes in 1usize..10,
    ) {
        let a = csr_with_row_lengths(&lengths, 12);
        let stripes = partition(&a, lanes).unwrap();
        prop_assert_eq!(stripes.len(), lanes);
        assert_exact_cover(&a, &stripes);
    }

    #[test]
    fn stripes_are_balanced_within_one_row(
        lengths in prop::collection::vec(1usize..8, 1..64),
        lanes in 1usize..6,
    ) {
        let a = csr_with_row_lengths(&lengths, 8);
        let stripes = partition(&a, lanes).unwrap();
        let nnz = a.nnz();
        let max_row = lengths.iter().copied().max().unwrap_or(0);
        let mut boundary = 0usize;
        for (t, s) in stripes[..lanes - 1].iter().enumerate() {
            boundary += s.nnz();
            let ideal = nnz * (t + 1) / lanes;
            prop_assert!(boundary.abs_diff(ideal) <= max_row);
        }
    }
}

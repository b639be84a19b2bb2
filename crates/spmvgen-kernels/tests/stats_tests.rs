use approx::assert_abs_diff_eq;
use spmvgen_core::{partition, Csr};
use spmvgen_kernels::reference;
use spmvgen_kernels::*;

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

#[test]
fn row_length_statistics() {
    let a = csr_with_row_lengths(&[3, 1, 3, 2, 0], 4);
    let stripes = partition(&a, 2).unwrap();
    let s = matrix_stats(&a, &stripes);
    assert_eq!((s.nrows, s.ncols, s.nnz), (5, 4, 9));
    assert_eq!(s.empty_rows, 1);
    assert_eq!((s.min_row_len, s.max_row_len), (0, 3));
    assert_eq!(s.distinct_row_lens, 4);
    assert_abs_diff_eq!(s.mean_row_len, 1.8, epsilon = 1e-12);
    assert_abs_diff_eq!(s.std_row_len, 1.36f64.sqrt(), epsilon = 1e-12);
    assert_eq!(s.stripe_nnz.iter().sum::<usize>(), 9);
    assert_eq!(s.stripe_nnz.len(), 2);
}

#[test]
fn statistics_of_large_uniform_matrix() {
    // enough rows to span several reduction chunks
    let lengths: Vec<usize> = (0..10_000).map(|i| i % 5).collect();
    let a = csr_with_row_lengths(&lengths, 5);
    let s = matrix_stats(&a, &partition(&a, 4).unwrap());
    assert_eq!(s.empty_rows, 2_000);
    assert_eq!(s.distinct_row_lens, 5);
    assert_abs_diff_eq!(s.mean_row_len, 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(s.std_row_len, 2.0f64.sqrt(), epsilon = 1e-9);
}

#[test]
fn statistics_of_empty_matrix() {
    let a = csr_with_row_lengths(&[], 3);
    let s = matrix_stats(&a, &[]);
    assert_eq!(s.nrows, 0);
    assert_eq!(s.min_row_len, 0);
    assert_eq!(s.mean_row_len, 0.0);
    assert_eq!(s.distinct_row_lens, 0);
    let text = s.to_string();
    assert!(text.lines().any(|l| l.starts_with("nonzeros:") && l.ends_with(" 0")));
}

#[test]
fn reference_parallel_matches_sequential() {
    let lengths: Vec<usize> = (0..20_000).map(|i| (i * 7) % 9).collect();
    let a = csr_with_row_lengths(&lengths, 9);
    let v: Vec<f64> = (1..=9).map(f64::from).collect();
    let mut seq = vec![1.0; a.nrows];
    let mut par = vec![1.0; a.nrows];
    reference::multiply(&a, &v, &mut seq).unwrap();
    reference::multiply_parallel(&a, &v, &mut par).unwrap();
    assert_eq!(seq, par);
    // row i sums v[0..len]
    assert_eq!(seq[1], 1.0 + 28.0);
}

#[test]
fn reference_checks_lengths() {
    let a = csr_with_row_lengths(&[1, 2], 2);
    let mut w = vec![0.0; 2];
    assert!(reference::multiply(&a, &[1.0], &mut w).is_err());
    assert!(reference::multiply_parallel(&a, &[1.0, 1.0], &mut w[..1]).is_err());
}

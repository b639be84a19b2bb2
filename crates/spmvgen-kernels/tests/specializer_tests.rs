#![cfg(all(target_arch = "x86_64", unix))]

use approx::assert_relative_eq;
use proptest::prelude::*;
use spmvgen_core::{Coo, Csr};
use spmvgen_kernels::reference;
use spmvgen_kernels::*;

fn methods() -> Vec<Method> {
    vec![
        Method::CsrByNz,
        Method::gen_oski(1, 1).unwrap(),
        Method::gen_oski(2, 2).unwrap(),
        Method::gen_oski(3, 3).unwrap(),
        Method::gen_oski(1, 4).unwrap(),
        Method::gen_oski(4, 1).unwrap(),
    ]
}

fn iota(n: usize) -> Vec<f64> {
    (1..=n).map(|x| x as f64).collect()
}

fn sample() -> Csr {
    // mixed row lengths, an empty row and a dense-ish tail
    let mut coo = Coo::with_capacity(9, 7, 32);
    let entries: &[(i64, i64, f64)] = &[
        (0, 0, 2.0),
        (0, 3, -1.0),
        (0, 6, 4.0),
        (1, 1, 3.0),
        (2, 0, 1.5),
        (2, 2, 2.5),
        (2, 4, -3.0),
        (4, 5, 7.0),
        (5, 0, 1.0),
        (5, 1, 1.0),
        (5, 2, 1.0),
        (5, 3, 1.0),
        (5, 4, 1.0),
        (6, 6, -2.0),
        (7, 2, 0.5),
        (7, 3, 0.25),
        (8, 0, 9.0),
        (8, 5, -4.0),
    ];
    for &(i, j, x) in entries {
        coo.push(i, j, x).unwrap();
    }
    coo.to_csr().unwrap()
}

fn oracle(a: &Csr) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let v = iota(a.ncols);
    let w0 = iota(a.nrows);
    let mut want = w0.clone();
    reference::multiply(a, &v, &mut want).unwrap();
    (v, w0, want)
}

fn assert_all_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(want) {
        assert_relative_eq!(*g, *w, epsilon = 1e-12, max_relative = 1e-12);
    }
}

#[test]
fn matches_reference_for_every_method_and_lane_count() {
    let a = sample();
    let (v, w0, want) = oracle(&a);
    for method in methods() {
        for lanes in 1..=8 {
            let kernel = Specializer::new(&a, method, SpecializerConfig::new(lanes))
                .unwrap()
                .specialize()
                .unwrap();
            assert_eq!(kernel.len(), lanes);
            let mut w = w0.clone();
            for f in kernel.functions() {
                f.call(&v, &mut w).unwrap();
            }
            assert_all_close(&w, &want);
        }
    }
}

#[test]
fn raw_callables_take_the_converted_arrays() {
    let a = sample();
    let (v, w0, want) = oracle(&a);
    let kernel = Specializer::new(&a, Method::CsrByNz, SpecializerConfig::new(3))
        .unwrap()
        .specialize()
        .unwrap();
    let m = kernel.matrix();
    let mut w = w0;
    for f in kernel.functions() {
        let raw = f.as_fn();
        unsafe {
            raw(v.as_ptr(), w.as_mut_ptr(), m.rows().as_ptr(), m.cols().as_ptr(), m.vals().as_ptr());
        }
    }
    assert_all_close(&w, &want);
}

#[test]
fn running_twice_adds_twice() {
    let a = sample();
    let v = iota(a.ncols);
    let w0 = iota(a.nrows);
    let mut mv = vec![0.0; a.nrows];
    reference::multiply(&a, &v, &mut mv).unwrap();
    for method in methods() {
        let kernel = Specializer::new(&a, method, SpecializerConfig::new(2))
            .unwrap()
            .specialize()
            .unwrap();
        let mut w = w0.clone();
        kernel.multiply(&v, &mut w).unwrap();
        kernel.multiply(&v, &mut w).unwrap();
        let want: Vec<f64> = w0.iter().zip(&mv).map(|(w, y)| w + 2.0 * y).collect();
        assert_all_close(&w, &want);
    }
}

#[test]
fn zero_row_is_left_unchanged() {
    let a = sample();
    assert_eq!(a.row_len(3), 0);
    let v = iota(a.ncols);
    for method in methods() {
        let kernel = Specializer::new(&a, method, SpecializerConfig::new(4))
            .unwrap()
            .specialize()
            .unwrap();
        let mut w = vec![42.0; a.nrows];
        kernel.multiply(&v, &mut w).unwrap();
        assert_eq!(w[3], 42.0);
    }
}

#[test]
fn dense_three_by_three_matches_dense_product() {
    let dense = [2.0, -1.0, 0.5, 4.0, 3.0, -2.0, 1.0, 1.0, 1.0];
    let a = Csr::from_dense(3, 3, &dense).unwrap();
    let v = [1.0, 2.0, 3.0];
    let mut want = [0.0; 3];
    for i in 0..3 {
        for j in 0..3 {
            want[i] += dense[i * 3 + j] * v[j];
        }
    }
    for method in methods() {
        let kernel = Specializer::new(&a, method, SpecializerConfig::default())
            .unwrap()
            .specialize()
            .unwrap();
        let mut w = [0.0; 3];
        kernel.multiply(&v, &mut w).unwrap();
        assert_all_close(&w, &want);
    }
}

#[test]
fn three_term_rows_sum_exactly_their_terms() {
    // row lengths [3, 1, 3, 2]
    let dense = [
        1.0, 2.0, 3.0, 0.0, //
        0.0, 0.0, 0.0, 4.0, //
        5.0, 0.0, 6.0, 7.0, //
        0.0, 8.0, 9.0, 0.0,
    ];
    let a = Csr::from_dense(4, 4, &dense).unwrap();
    let kernel = Specializer::new(&a, Method::CsrByNz, SpecializerConfig::default())
        .unwrap()
        .specialize()
        .unwrap();
    let v = [1.0, 10.0, 100.0, 1000.0];
    let mut w = [0.0; 4];
    kernel.multiply(&v, &mut w).unwrap();
    assert_eq!(w, [321.0, 4000.0, 7605.0, 980.0]);
}

#[test]
fn parallel_equals_sequential() {
    let a = sample();
    let v = iota(a.ncols);
    for method in methods() {
        for lanes in [1, 2, 4, 8] {
            let kernel = Specializer::new(&a, method, SpecializerConfig::new(lanes))
                .unwrap()
                .specialize()
                .unwrap();
            let mut seq = iota(a.nrows);
            let mut par = iota(a.nrows);
            kernel.multiply(&v, &mut seq).unwrap();
            kernel.multiply_parallel(&v, &mut par).unwrap();
            assert_eq!(seq, par);
        }
    }
}

#[test]
fn each_function_touches_only_its_stripe() {
    let a = sample();
    let v = iota(a.ncols);
    let sp = Specializer::new(&a, Method::CsrByNz, SpecializerConfig::new(3)).unwrap();
    let stripes = sp.stripes().to_vec();
    let kernel = sp.specialize().unwrap();
    for (f, stripe) in kernel.functions().iter().zip(&stripes) {
        let mut w = vec![0.0; a.nrows];
        f.call(&v, &mut w).unwrap();
        for (i, &wi) in w.iter().enumerate() {
            if !stripe.rows().contains(&i) {
                assert_eq!(wi, 0.0, "stripe {} wrote row {i}", f.stripe());
            }
        }
    }
}

#[test]
fn more_lanes_than_rows_gives_no_op_functions() {
    let a = Csr::from_dense(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let kernel = Specializer::new(&a, Method::CsrByNz, SpecializerConfig::new(5))
        .unwrap()
        .specialize()
        .unwrap();
    assert_eq!(kernel.len(), 5);
    let mut w = [0.0; 2];
    kernel.multiply(&[1.0, 1.0], &mut w).unwrap();
    assert_eq!(w, [3.0, 7.0]);
}

#[test]
fn chunked_unroll_matches_full_unroll() {
    let a = sample();
    let (v, w0, want) = oracle(&a);
    for k in [1, 2, 3, 64] {
        let config = SpecializerConfig::new(2).with_unroll(Unroll::Chunked(k));
        let kernel = Specializer::new(&a, Method::CsrByNz, config).unwrap().specialize().unwrap();
        let mut w = w0.clone();
        kernel.multiply(&v, &mut w).unwrap();
        assert_all_close(&w, &want);
    }
}

#[test]
fn short_vectors_are_rejected() {
    let a = sample();
    let kernel = Specializer::new(&a, Method::CsrByNz, SpecializerConfig::default())
        .unwrap()
        .specialize()
        .unwrap();
    let mut w = vec![0.0; a.nrows];
    let err = kernel.multiply(&[1.0; 3], &mut w).unwrap_err();
    assert!(matches!(err, SpecializeError::VectorLength { which: "v", .. }));
    let mut short = vec![0.0; 2];
    let err = kernel.functions()[0].call(&iota(a.ncols), &mut short).unwrap_err();
    assert!(matches!(err, SpecializeError::VectorLength { which: "w", .. }));
}

#[test]
fn generated_code_is_exposed() {
    let a = sample();
    let kernel = Specializer::new(&a, Method::gen_oski(2, 2).unwrap(), SpecializerConfig::new(2))
        .unwrap()
        .specialize()
        .unwrap();
    for t in 0..2 {
        let code = kernel.code(t).unwrap();
        assert_eq!(code[0], 0x53);
        assert_eq!(*code.last().unwrap(), 0xC3);
    }
    assert!(kernel.code(2).is_none());
}

#[test]
fn empty_matrix_specializes() {
    let a = Csr::from_dense(0, 0, &[]).unwrap();
    let kernel = Specializer::new(&a, Method::CsrByNz, SpecializerConfig::new(2))
        .unwrap()
        .specialize()
        .unwrap();
    let mut w: [f64; 0] = [];
    kernel.multiply(&[], &mut w).unwrap();
}

fn arb_matrix() -> impl Strategy<Value = Csr> {
    (1usize..24, 1usize..24).prop_flat_map(|(n, m)| {
        prop::collection::vec((0..n as i64, 0..m as i64, -8i32..8), 0..(n * m).min(120)).prop_map(
            move |entries| {
                let mut coo = Coo::with_capacity(n, m, entries.len());
                for (i, j, x) in entries {
                    coo.push(i, j, f64::from(x)).unwrap();
                }
                coo.to_csr().unwrap()
            },
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_matrices_match_reference(
        a in arb_matrix(),
        lanes in 1usize..6,
        method in prop::sample::select(methods()),
        chunked in any::<bool>(),
    ) {
        let unroll = if chunked { Unroll::Chunked(3) } else { Unroll::Full };
        let config = SpecializerConfig::new(lanes).with_unroll(unroll);
        let kernel = Specializer::new(&a, method, config).unwrap().specialize().unwrap();
        let (v, w0, want) = oracle(&a);
        let mut w = w0;
        kernel.multiply_parallel(&v, &mut w).unwrap();
        // small integers: every partial sum is exact
        prop_assert_eq!(w, want);
    }
}

use spmvgen_kernels::config::{LANES_ENV, UNROLL_ENV};
use spmvgen_kernels::method::MAX_BLOCK_CELLS;
use spmvgen_kernels::*;

#[test]
fn method_names_parse() {
    assert_eq!("CSRbyNZ".parse::<Method>().unwrap(), Method::CsrByNz);
    assert_eq!("csrbynz".parse::<Method>().unwrap(), Method::CsrByNz);
    for (name, r, c) in [("genOSKI33", 3, 3), ("genOSKI44", 4, 4), ("genOSKI55", 5, 5), ("genoski18", 1, 8)] {
        match name.parse::<Method>().unwrap() {
            Method::GenOski(shape) => assert_eq!((shape.rows(), shape.cols()), (r, c)),
            other => panic!("{name} parsed as {other}"),
        }
    }
}

#[test]
fn method_names_round_trip() {
    for name in ["CSRbyNZ", "genOSKI33", "genOSKI27"] {
        assert_eq!(name.parse::<Method>().unwrap().to_string(), name);
    }
}

#[test]
fn unknown_methods_are_rejected() {
    for name in ["", "CSR", "genOSKI", "genOSKI3", "genOSKI333", "genOSKIab", "byNZ"] {
        assert!(
            matches!(name.parse::<Method>(), Err(SpecializeError::UnknownMethod(_))),
            "{name:?} should be unknown"
        );
    }
}

#[test]
fn block_shape_limits() {
    assert!(matches!("genOSKI99".parse::<Method>(), Err(SpecializeError::InvalidBlockShape { .. })));
    assert!(matches!("genOSKI04".parse::<Method>(), Err(SpecializeError::InvalidBlockShape { .. })));
    assert!(BlockShape::new(8, 8).is_ok());
    assert!(BlockShape::new(1, MAX_BLOCK_CELLS).is_ok());
    assert!(BlockShape::new(1, MAX_BLOCK_CELLS + 1).is_err());
    assert!(BlockShape::new(0, 1).is_err());
    assert!(BlockShape::new(usize::MAX, 2).is_err());
}

#[test]
fn unroll_parses() {
    assert_eq!("full".parse::<Unroll>().unwrap(), Unroll::Full);
    assert_eq!(" FULL ".parse::<Unroll>().unwrap(), Unroll::Full);
    assert_eq!("16".parse::<Unroll>().unwrap(), Unroll::Chunked(16));
    assert!("0".parse::<Unroll>().is_err());
    assert!("-3".parse::<Unroll>().is_err());
    assert!("some".parse::<Unroll>().is_err());
    assert_eq!(Unroll::Chunked(8).to_string(), "8");
    assert_eq!(Unroll::Full.to_string(), "full");
}

#[test]
fn config_defaults_and_builders() {
    let c = SpecializerConfig::default();
    assert_eq!(c.lanes, 1);
    assert_eq!(c.unroll, Unroll::Full);
    let c = SpecializerConfig::new(4).with_unroll(Unroll::Chunked(32)).with_lanes(6);
    assert_eq!(c, SpecializerConfig { lanes: 6, unroll: Unroll::Chunked(32) });
    assert!(c.validate().is_ok());
    assert!(SpecializerConfig::new(0).validate().is_err());
    assert!(SpecializerConfig::new(1).with_unroll(Unroll::Chunked(0)).validate().is_err());
}

#[test]
fn config_from_env() {
    std::env::set_var(LANES_ENV, "3");
    std::env::set_var(UNROLL_ENV, "12");
    let c = SpecializerConfig::from_env().unwrap();
    assert_eq!(c, SpecializerConfig { lanes: 3, unroll: Unroll::Chunked(12) });

    std::env::set_var(LANES_ENV, "0");
    assert!(matches!(SpecializerConfig::from_env(), Err(SpecializeError::Config(_))));
    std::env::set_var(LANES_ENV, "many");
    assert!(matches!(SpecializerConfig::from_env(), Err(SpecializeError::Config(_))));

    std::env::remove_var(LANES_ENV);
    std::env::remove_var(UNROLL_ENV);
    assert_eq!(SpecializerConfig::from_env().unwrap(), SpecializerConfig::default());
}

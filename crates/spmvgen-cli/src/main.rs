//! spmvgen - generate matrix-specialized SpMV code and benchmark it
//!
//! `spmvgen matrices/fidap037 CSRbyNZ --threads 4`
//! `spmvgen matrices/fidap037 genOSKI 2 3 --debug`

use anyhow::{bail, Context, Result};
use clap::Parser;
use spmvgen_core::Csr;
use spmvgen_kernels::{
    matrix_stats, reference, Method, SpecializedKernel, Specializer, SpecializerConfig, Unroll,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Matrix-specialized sparse matrix-vector multiply
#[derive(Parser, Debug)]
#[command(name = "spmvgen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Matrix Market file; `.mtx` is appended when the path does not exist as given
    #[arg(value_name = "MATRIX")]
    matrix: PathBuf,

    /// CSRbyNZ, genOSKI33, genOSKI44, genOSKI55, ... or genOSKI followed by two block dimensions
    #[arg(value_name = "METHOD")]
    method: String,

    /// Block rows and columns for plain `genOSKI`
    #[arg(value_name = "DIM", num_args = 0..=2)]
    block: Vec<usize>,

    /// Number of stripes and worker threads [env: SPMVGEN_LANES]
    #[arg(short = 't', long = "threads", alias = "num-threads")]
    threads: Option<usize>,

    /// Unroll policy: `full` or a chunk size [env: SPMVGEN_UNROLL]
    #[arg(long)]
    unroll: Option<Unroll>,

    /// Run a single iteration and print the result vector
    #[arg(long)]
    debug: bool,

    /// Print the converted matrix and exit
    #[arg(long)]
    dump_matrix: bool,

    /// Print the instruction listing of every stripe and exit
    #[arg(long)]
    dump_ir: bool,

    /// Write each stripe's machine code into this directory
    #[arg(long, value_name = "DIR")]
    dump_object: Option<PathBuf>,

    /// Print structural statistics of the matrix and exit
    #[arg(long)]
    matrix_stats: bool,

    /// Check one multiply against the generic CSR kernel before timing
    #[arg(long)]
    verify: bool,

    /// Override the iteration count chosen from the nonzero count
    #[arg(long)]
    iters: Option<u32>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn resolve_matrix_path(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let mut with_ext = path.as_os_str().to_owned();
    with_ext.push(".mtx");
    PathBuf::from(with_ext)
}

fn resolve_method(name: &str, block: &[usize]) -> Result<Method> {
    if name.eq_ignore_ascii_case("genoski") {
        let [rows, cols] = block else {
            bail!("genOSKI needs two block dimensions, e.g. `genOSKI 3 3`");
        };
        return Ok(Method::gen_oski(*rows, *cols)?);
    }
    if !block.is_empty() {
        bail!("unexpected block dimensions after {name}");
    }
    Ok(name.parse()?)
}

/// Iteration count for timing, scaled down as the matrix grows.
fn iterations_for(nnz: usize) -> u32 {
    match nnz {
        0..5_000 => 500_000,
        5_000..10_000 => 200_000,
        10_000..50_000 => 100_000,
        50_000..100_000 => 50_000,
        100_000..200_000 => 10_000,
        200_000..1_000_000 => 5_000,
        1_000_000..2_000_000 => 1_000,
        2_000_000..3_000_000 => 500,
        3_000_000..5_000_000 => 200,
        5_000_000..8_000_000 => 100,
        8_000_000..12_000_000 => 50,
        _ => 100,
    }
}

fn iota(n: usize) -> Vec<f64> {
    (1..=n).map(|x| x as f64).collect()
}

fn run_once(kernel: &SpecializedKernel, v: &[f64], w: &mut [f64]) -> Result<()> {
    if kernel.len() == 1 {
        kernel.multiply(v, w)?;
    } else {
        kernel.multiply_parallel(v, w)?;
    }
    Ok(())
}

fn verify(a: &Csr, kernel: &SpecializedKernel) -> Result<()> {
    let v = iota(a.ncols);
    let mut got = iota(a.nrows);
    let mut want = iota(a.nrows);
    run_once(kernel, &v, &mut got)?;
    reference::multiply_parallel(a, &v, &mut want)?;
    for (i, (g, w)) in got.iter().zip(&want).enumerate() {
        if !approx::relative_eq!(*g, *w, epsilon = 1e-9, max_relative = 1e-9) {
            bail!("verification failed at row {i}: generated {g}, expected {w}");
        }
    }
    info!(rows = a.nrows, "verified against reference multiply");
    Ok(())
}

fn dump_objects(dir: &Path, kernel: &SpecializedKernel) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for t in 0..kernel.len() {
        let Some(code) = kernel.code(t) else { continue };
        let path = dir.join(format!("stripe{t}.bin"));
        std::fs::write(&path, code).with_context(|| format!("writing {}", path.display()))?;
        debug!(stripe = t, bytes = code.len(), path = %path.display(), "dumped machine code");
    }
    Ok(())
}

fn ir_listing(specializer: &Specializer<'_>) -> Result<String> {
    let mut out = String::new();
    for (t, program) in specializer.programs()?.iter().enumerate() {
        writeln!(out, "; stripe {t}")?;
        write!(out, "{program}")?;
    }
    Ok(out)
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    debug!(version = spmvgen_core::VERSION, "spmvgen starting");

    let method = resolve_method(&cli.method, &cli.block)?;
    let mut config = SpecializerConfig::from_env()?;
    if let Some(threads) = cli.threads {
        if threads < 1 {
            bail!("Number of threads must be >= 1.");
        }
        config = config.with_lanes(threads);
    }
    if let Some(unroll) = cli.unroll {
        config = config.with_unroll(unroll);
    }

    let path = resolve_matrix_path(&cli.matrix);
    let a = spmvgen_io::read_matrix_market_path(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    info!(path = %path.display(), nrows = a.nrows, ncols = a.ncols, nnz = a.nnz(), "loaded matrix");

    let specializer = Specializer::new(&a, method, config)?;

    if cli.dump_matrix {
        print!("{}", specializer.matrix());
        return Ok(());
    }
    if cli.matrix_stats {
        println!("{}", matrix_stats(&a, specializer.stripes()));
        return Ok(());
    }
    if cli.dump_ir {
        print!("{}", ir_listing(&specializer)?);
        return Ok(());
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.lanes)
        .build_global()
        .context("configuring worker threads")?;
    let quiet = cli.debug || cli.dump_object.is_some();
    if !quiet {
        println!("Num threads = {}", config.lanes);
    }

    let start = Instant::now();
    let kernel = specializer.specialize()?;
    let codegen = start.elapsed();

    if let Some(dir) = &cli.dump_object {
        dump_objects(dir, &kernel)?;
    }
    if cli.verify {
        verify(&a, &kernel)?;
    }

    let iters = if cli.debug { 1 } else { cli.iters.unwrap_or_else(|| iterations_for(a.nnz())) };
    let v = iota(a.ncols);
    let mut w = iota(a.nrows);
    let start = Instant::now();
    for _ in 0..iters {
        run_once(&kernel, &v, &mut w)?;
    }
    let elapsed = start.elapsed();

    if cli.debug {
        for x in &w {
            println!("{x}");
        }
    } else {
        println!("codeGeneration: {:.3} ms", millis(codegen));
        println!(
            "multByM:        {:.3} ms total, {:.3} us per iteration",
            millis(elapsed),
            millis(elapsed) * 1e3 / f64::from(iters.max(1))
        );
        println!("0{iters:>10} times    iterated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_thresholds() {
        assert_eq!(iterations_for(0), 500_000);
        assert_eq!(iterations_for(4_999), 500_000);
        assert_eq!(iterations_for(5_000), 200_000);
        assert_eq!(iterations_for(150_000), 10_000);
        assert_eq!(iterations_for(11_999_999), 50);
        assert_eq!(iterations_for(12_000_000), 100);
    }

    #[test]
    fn methods_from_arguments() {
        assert_eq!(resolve_method("CSRbyNZ", &[]).unwrap(), Method::CsrByNz);
        assert_eq!(resolve_method("genOSKI", &[2, 3]).unwrap(), Method::gen_oski(2, 3).unwrap());
        assert_eq!(resolve_method("genOSKI44", &[]).unwrap(), Method::gen_oski(4, 4).unwrap());
        assert!(resolve_method("genOSKI", &[2]).is_err());
        assert!(resolve_method("CSRbyNZ", &[1, 1]).is_err());
        assert!(resolve_method("unfolding", &[]).is_err());
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "spmvgen", "m", "genOSKI", "3", "2", "-t", "4", "--unroll", "8", "--debug",
        ])
        .unwrap();
        assert_eq!(cli.block, vec![3, 2]);
        assert_eq!(cli.threads, Some(4));
        assert_eq!(cli.unroll, Some(Unroll::Chunked(8)));
        assert!(cli.debug);
    }

    fn tiny_matrix() -> Csr {
        Csr::from_dense(
            5,
            4,
            &[
                1.0, 0.0, 2.0, 0.0, //
                0.0, 3.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, //
                4.0, 5.0, 6.0, 7.0, //
                0.0, 0.0, 8.0, 0.0,
            ],
        )
        .unwrap()
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("spmvgen-cli-{tag}-{}", std::process::id()))
    }

    #[test]
    fn ir_listing_has_one_section_per_stripe() {
        let a = tiny_matrix();
        let sp = Specializer::new(&a, Method::CsrByNz, SpecializerConfig::new(2)).unwrap();
        let text = ir_listing(&sp).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("; stripe ")).count(), 2);
        assert!(text.contains("prologue"));
        assert_eq!(text.matches("epilogue").count(), 2);
    }

    #[cfg(all(target_arch = "x86_64", unix))]
    #[test]
    fn generated_code_verifies_for_both_methods() {
        let a = tiny_matrix();
        for method in [Method::CsrByNz, Method::gen_oski(2, 2).unwrap()] {
            for lanes in [1, 3] {
                let kernel = Specializer::new(&a, method, SpecializerConfig::new(lanes))
                    .unwrap()
                    .specialize()
                    .unwrap();
                verify(&a, &kernel).unwrap();
            }
        }
    }

    #[cfg(all(target_arch = "x86_64", unix))]
    #[test]
    fn object_dump_writes_one_file_per_stripe() {
        let a = tiny_matrix();
        let dir = scratch_dir("objects");
        let kernel = Specializer::new(&a, Method::gen_oski(3, 3).unwrap(), SpecializerConfig::new(3))
            .unwrap()
            .specialize()
            .unwrap();
        dump_objects(&dir, &kernel).unwrap();
        for t in 0..3 {
            let bytes = std::fs::read(dir.join(format!("stripe{t}.bin"))).unwrap();
            assert_eq!(bytes.as_slice(), kernel.code(t).unwrap());
            assert_eq!(bytes.last(), Some(&0xC3));
        }
        assert!(!dir.join("stripe3.bin").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn written_matrix_is_found_without_extension() {
        let a = tiny_matrix();
        let dir = scratch_dir("mtx");
        std::fs::create_dir_all(&dir).unwrap();
        spmvgen_io::write_matrix_market_path(&a, dir.join("tiny.mtx")).unwrap();
        let path = resolve_matrix_path(&dir.join("tiny"));
        assert_eq!(spmvgen_io::read_matrix_market_path(&path).unwrap(), a);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn matrix_path_gets_extension() {
        let p = resolve_matrix_path(Path::new("/nonexistent/fidap037"));
        assert_eq!(p, PathBuf::from("/nonexistent/fidap037.mtx"));
    }
}

//! Inspect an NPY constant file and check it against the backend.
//!
use std::path::PathBuf;

use clap::Parser;
use common::npy::NpyArray;
use sample_server::models::constant_from_npy;

type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// NPY file to inspect
    file: PathBuf,
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let bytes = std::fs::read(&args.file)?;
    let array = NpyArray::parse(&bytes)?;
    println!(
        "{}: descr {}, shape {:?}, {} elements",
        args.file.display(),
        array.descr(),
        array.tensor().shape(),
        array.tensor().len(),
    );

    match constant_from_npy(&args.file) {
        Ok(constant) => println!(
            "backend constant: {:?} {:?}",
            constant.datum_type(),
            constant.shape()
        ),
        Err(err) => println!("not representable as a backend constant: {err}"),
    }

    Ok(())
}

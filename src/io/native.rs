//! Native binary backend: a `bincode` encoding of [`Dataset`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::Dataset;
use crate::error::{IceError, Result};

const MAGIC: [u8; 8] = *b"ICESHEET";
const VERSION: u32 = 1;

pub fn write_native(path: &Path, dataset: &Dataset) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&MAGIC)?;
    bincode::serialize_into(&mut out, &VERSION)?;
    bincode::serialize_into(&mut out, dataset)?;
    out.flush()?;
    Ok(())
}

pub fn read_native(path: &Path) -> Result<Dataset> {
    use std::io::Read;

    let mut input = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 8];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IceError::input(path.display().to_string(), "not a native state file"));
    }
    let version: u32 = bincode::deserialize_from(&mut input)?;
    if version != VERSION {
        return Err(IceError::input(
            path.display().to_string(),
            format!("unsupported file version {}", version),
        ));
    }
    Ok(bincode::deserialize_from(&mut input)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");
        let mut ds = Dataset::new();
        ds.set_attr("source", "test");
        ds.add_dim("x", 2).unwrap();
        ds.add_var("x", &["x"], vec![-1.0, 1.0]).unwrap().set_attr("units", "m");
        write_native(&path, &ds).unwrap();
        assert_eq!(read_native(&path).unwrap(), ds);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, b"not a state file at all").unwrap();
        assert!(read_native(&path).is_err());
    }
}

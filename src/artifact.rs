use std::fs;
use std::path::Path;

use crate::error::Error;
use crate::lang::program::Program;

/// Serializes a linear-form program.
pub fn to_bytes(program: &Program) -> Result<Vec<u8>, Error> {
    Ok(postcard::to_allocvec(program)?)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Program, Error> {
    Ok(postcard::from_bytes(bytes)?)
}

pub fn save(program: &Program, path: &Path) -> Result<(), Error> {
    let bytes = to_bytes(program)?;
    fs::write(path, &bytes).map_err(|e| Error::io(path, e))?;
    log::info!("wrote {} byte IR artifact to {}", bytes.len(), path.display());
    Ok(())
}

pub fn load(path: &Path) -> Result<Program, Error> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let program = from_bytes(&bytes)?;
    log::info!(
        "loaded IR artifact {} ({} functions)",
        path.display(),
        program.functions.len()
    );
    Ok(program)
}

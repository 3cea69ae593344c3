use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read ROM {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid iNES header magic {found:02X?}, expected NES<EOF>")]
    BadMagic { found: Vec<u8> },
    #[error("ROM truncated: expected {expected} {section} bytes but only {available} remain")]
    Truncated {
        section: &'static str,
        expected: usize,
        available: usize,
    },
    #[error("invalid PRG ROM: empty payload")]
    EmptyPrg,
}

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("mapper {0} not supported")]
    Unsupported(u8),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
    #[error(transparent)]
    Mapper(#[from] MapperError),
}

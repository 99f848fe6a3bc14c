//! The `.vmb` binary container: header, append-only pools,
//! and a hand-rolled little-endian codec. Plays the role `fuel_types`'s
//! `canonical` module and `fuel-tx`'s fixed record layouts play for
//! transaction serialization, adapted to our variable-length instruction
//! and pool records.

mod codec;
mod crc32;
mod error;
mod image;
mod pool;

pub use codec::Reader;
pub use error::ImageError;
pub use image::{Mode, ProgramImage, MAGIC, VERSION};
pub use pool::{ConstantValue, FunctionEntry, SymbolEntry};

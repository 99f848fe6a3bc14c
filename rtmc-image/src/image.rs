use rtmc_asm::{Instruction, Opcode, SourcePos};

use crate::codec::{write_i64, write_name, write_string_entry, write_u16, write_u32, write_u8, Reader};
use crate::crc32;
use crate::error::ImageError;
use crate::pool::{ConstantValue, FunctionEntry, SymbolEntry};

pub const MAGIC: [u8; 4] = *b"RTMC";
pub const VERSION: u32 = 1;

/// Debug images keep per-instruction positions, full symbol names, and
/// `COMMENT` sentinels; release images strip all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Release,
    Debug,
}

impl Mode {
    fn as_u32(self) -> u32 {
        match self {
            Mode::Release => 0,
            Mode::Debug => 1,
        }
    }

    fn from_u32(v: u32) -> Result<Self, ImageError> {
        match v {
            0 => Ok(Mode::Release),
            1 => Ok(Mode::Debug),
            other => Err(ImageError::InvalidMode(other)),
        }
    }

    pub fn is_debug(self) -> bool {
        matches!(self, Mode::Debug)
    }
}

/// The complete in-memory program image produced by the bytecode generator
/// and consumed by the serializer. Owns every append-only
/// pool; ids into these pools are simple indices.
#[derive(Debug, Clone, Default)]
pub struct ProgramImage {
    pub instructions: Vec<Instruction>,
    pub constants: Vec<ConstantValue>,
    pub strings: Vec<String>,
    pub functions: Vec<FunctionEntry>,
    pub symbols: Vec<SymbolEntry>,
}

impl ProgramImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes `self` under `mode`. In release mode, instruction
    /// positions and the symbol table are dropped regardless of whether
    /// they were populated.
    pub fn serialize(&self, mode: Mode) -> Result<Vec<u8>, ImageError> {
        let mut body = Vec::new();

        for instr in &self.instructions {
            write_u8(&mut body, instr.opcode.into());
            write_u8(&mut body, instr.operand_count());
            for operand in &instr.operands {
                write_i64(&mut body, *operand);
            }
            if mode.is_debug() {
                let SourcePos { line, column } = instr.pos.unwrap_or(SourcePos { line: 0, column: 0 });
                write_u32(&mut body, line);
                write_u32(&mut body, column);
            }
        }

        for constant in &self.constants {
            write_u8(&mut body, constant.tag());
            body.extend_from_slice(&constant.to_bytes());
        }

        for s in &self.strings {
            write_string_entry(&mut body, s)?;
        }

        for f in &self.functions {
            write_name(&mut body, &f.name)?;
            write_u32(&mut body, f.address);
        }

        let symbol_count = if mode.is_debug() {
            for sym in &self.symbols {
                write_name(&mut body, &sym.name)?;
                write_u32(&mut body, sym.address);
            }
            self.symbols.len()
        } else {
            0
        };

        let checksum = crc32::checksum(&body);

        let mut out = Vec::with_capacity(32 + body.len());
        out.extend_from_slice(&MAGIC);
        write_u32(&mut out, VERSION);
        write_u32(&mut out, mode.as_u32());
        write_u32(&mut out, self.instructions.len() as u32);
        write_u32(&mut out, self.constants.len() as u32);
        write_u32(&mut out, self.strings.len() as u32);
        write_u32(&mut out, self.functions.len() as u32);
        write_u32(&mut out, symbol_count as u32);
        write_u32(&mut out, checksum);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parses a `.vmb` image back into memory, verifying magic, version,
    /// and the header checksum.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, Mode), ImageError> {
        let mut reader = Reader::new(bytes);

        let magic_bytes = reader.read_bytes(4)?;
        let magic: [u8; 4] = magic_bytes.try_into().expect("4 bytes");
        if magic != MAGIC {
            return Err(ImageError::BadMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let mode = Mode::from_u32(reader.read_u32()?)?;
        let instruction_cnt = reader.read_u32()? as usize;
        let constant_cnt = reader.read_u32()? as usize;
        let string_cnt = reader.read_u32()? as usize;
        let function_cnt = reader.read_u32()? as usize;
        let symbol_cnt = reader.read_u32()? as usize;
        let expected_checksum = reader.read_u32()?;

        let body_start = reader.position();
        let computed_checksum = crc32::checksum(&bytes[body_start..]);
        if computed_checksum != expected_checksum {
            return Err(ImageError::ChecksumMismatch {
                expected: expected_checksum,
                computed: computed_checksum,
            });
        }

        let mut instructions = Vec::with_capacity(instruction_cnt);
        for _ in 0..instruction_cnt {
            let op_byte = reader.read_u8()?;
            let opcode = Opcode::try_from(op_byte).map_err(|e| ImageError::UnknownOpcode(e.0))?;
            let operand_count = reader.read_u8()? as usize;
            let mut operands = Vec::with_capacity(operand_count);
            for _ in 0..operand_count {
                operands.push(reader.read_i64()?);
            }
            let pos = if mode.is_debug() {
                let line = reader.read_u32()?;
                let column = reader.read_u32()?;
                Some(SourcePos { line, column })
            } else {
                None
            };
            instructions.push(Instruction {
                opcode,
                operands,
                pos,
            });
        }

        let mut constants = Vec::with_capacity(constant_cnt);
        for _ in 0..constant_cnt {
            let tag = reader.read_u8()?;
            let raw: [u8; 4] = reader.read_bytes(4)?.try_into().expect("4 bytes");
            let value = ConstantValue::from_tagged(tag, raw)
                .ok_or(ImageError::LengthLimitExceeded)?;
            constants.push(value);
        }

        let mut strings = Vec::with_capacity(string_cnt);
        for _ in 0..string_cnt {
            let len = reader.read_u16()? as usize;
            strings.push(reader.read_string(len)?);
        }

        let mut functions = Vec::with_capacity(function_cnt);
        for _ in 0..function_cnt {
            let name_len = reader.read_u8()? as usize;
            let name = reader.read_string(name_len)?;
            let address = reader.read_u32()?;
            functions.push(FunctionEntry { name, address });
        }

        let mut symbols = Vec::with_capacity(symbol_cnt);
        for _ in 0..symbol_cnt {
            let name_len = reader.read_u8()? as usize;
            let name = reader.read_string(name_len)?;
            let address = reader.read_u32()?;
            symbols.push(SymbolEntry { name, address });
        }

        Ok((
            Self {
                instructions,
                constants,
                strings,
                functions,
                symbols,
            },
            mode,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_serialize_and_deserialize() {
        let mut image = ProgramImage::new();
        image.instructions.push(Instruction::at(Opcode::LoadConst, vec![0], 4, 9));
        image.instructions.push(Instruction::new(Opcode::Ret, vec![]));
        image.constants.push(ConstantValue::I32(42));
        image.strings.push("hello".to_string());
        image.functions.push(FunctionEntry {
            name: "main".to_string(),
            address: 0,
        });
        image.symbols.push(SymbolEntry {
            name: "x".to_string(),
            address: 4,
        });

        let bytes = image.serialize(Mode::Debug).unwrap();
        let (decoded, mode) = ProgramImage::deserialize(&bytes).unwrap();
        assert_eq!(mode, Mode::Debug);
        assert_eq!(decoded.instructions.len(), 2);
        assert_eq!(decoded.instructions[0].pos, Some(SourcePos { line: 4, column: 9 }));
        assert_eq!(decoded.constants, vec![ConstantValue::I32(42)]);
        assert_eq!(decoded.strings, vec!["hello".to_string()]);
        assert_eq!(decoded.symbols.len(), 1);
    }

    #[test]
    fn release_mode_strips_positions_and_symbols() {
        let mut image = ProgramImage::new();
        image.instructions.push(Instruction::at(Opcode::Nop, vec![], 1, 1));
        image.symbols.push(SymbolEntry {
            name: "x".to_string(),
            address: 0,
        });

        let bytes = image.serialize(Mode::Release).unwrap();
        let (decoded, mode) = ProgramImage::deserialize(&bytes).unwrap();
        assert_eq!(mode, Mode::Release);
        assert_eq!(decoded.instructions[0].pos, None);
        assert!(decoded.symbols.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 32];
        assert!(matches!(
            ProgramImage::deserialize(&bytes),
            Err(ImageError::BadMagic(_))
        ));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let image = ProgramImage::new();
        let mut bytes = image.serialize(Mode::Release).unwrap();
        // Byte 32 is the first byte of the checksum field; corrupting it
        // leaves the (empty) body intact but invalidates the stored value.
        bytes[32] ^= 0xFF;
        assert!(matches!(
            ProgramImage::deserialize(&bytes),
            Err(ImageError::ChecksumMismatch { .. })
        ));
    }
}

//! Data section decoding
//!
//! Implements the MaxMind DB data type specification for reading.
//!
//! # Format
//!
//! Every value starts with a control byte. The top 3 bits hold the type and
//! the low 5 bits the size (or, for pointers, the pointer layout):
//!
//! ```text
//! ┌─────┬───────┐
//! │ TTT │ SSSSS │   TTT = 0 means "extended": next byte + 7 is the type
//! └─────┴───────┘
//! ```
//!
//! Sizes 0-28 are literal. 29, 30 and 31 read 1, 2 or 3 extra bytes that are
//! added to 29, 285 and 65_821 respectively.
//!
//! Containers are decoded with an explicit frame stack so that nesting depth
//! in the file cannot exhaust the native stack. Pointers are followed by
//! decoding the target again every time it is reached.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::{MmdbError, Result};
use crate::value::{Map, Value};

/// Maximum number of open containers plus followed pointers in one decode
pub const MAX_DEPTH: usize = 512;

const TYPE_EXTENDED: u8 = 0;
const TYPE_POINTER: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_BYTES: u8 = 4;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_UINT128: u8 = 10;
const TYPE_ARRAY: u8 = 11;
const TYPE_CONTAINER: u8 = 12;
const TYPE_END_MARKER: u8 = 13;
const TYPE_BOOL: u8 = 14;
const TYPE_FLOAT: u8 = 15;

/// One decoded control item
enum Token {
    Scalar(Value),
    Pointer(usize),
    Array(usize),
    Map(usize),
}

/// Partially decoded container or pending pointer return
enum Frame {
    Array {
        items: Vec<Value>,
        len: usize,
    },
    Map {
        entries: Map,
        len: usize,
        key: Option<String>,
    },
    /// Offset to continue from once the pointed-to value is complete
    Return(usize),
}

/// Data section decoder
///
/// Offsets are relative to the start of `buffer`, which is either the data
/// section or the metadata section of a database.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    buffer: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Create a decoder for a section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Length of the underlying section
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the section is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Decode the value at `offset`
    pub fn decode(&self, offset: usize) -> Result<Value> {
        self.decode_at(offset).map(|(value, _)| value)
    }

    /// Decode the value at `offset` and return the offset just past it
    ///
    /// When the value at `offset` is a pointer, the returned offset is the
    /// byte after the pointer, not after its target.
    pub fn decode_at(&self, offset: usize) -> Result<(Value, usize)> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut cursor = offset;
        let mut followed_pointer = false;

        loop {
            let start = cursor;
            let (token, next) = self.read_token(start)?;
            cursor = next;

            let mut value = match token {
                Token::Pointer(target) => {
                    if followed_pointer {
                        return Err(MmdbError::decode(format!(
                            "pointer at offset {} points to another pointer",
                            start
                        )));
                    }
                    Self::push(&mut stack, Frame::Return(cursor))?;
                    cursor = target;
                    followed_pointer = true;
                    continue;
                }
                Token::Scalar(value) => value,
                Token::Array(0) => Value::Array(Vec::new()),
                Token::Map(0) => Value::Map(Map::new()),
                Token::Array(len) => {
                    let items = Vec::with_capacity(self.capacity_hint(len, cursor));
                    Self::push(&mut stack, Frame::Array { items, len })?;
                    followed_pointer = false;
                    continue;
                }
                Token::Map(len) => {
                    let entries = Map::with_capacity(self.capacity_hint(len, cursor));
                    Self::push(
                        &mut stack,
                        Frame::Map {
                            entries,
                            len,
                            key: None,
                        },
                    )?;
                    followed_pointer = false;
                    continue;
                }
            };
            followed_pointer = false;

            // Hand the finished value to its parent, closing every container
            // it completes on the way up.
            loop {
                let Some(frame) = stack.last_mut() else {
                    return Ok((value, cursor));
                };
                match frame {
                    Frame::Return(resume) => {
                        cursor = *resume;
                        stack.pop();
                        continue;
                    }
                    Frame::Array { items, len } => {
                        items.push(value);
                        if items.len() < *len {
                            break;
                        }
                    }
                    Frame::Map { entries, len, key } => match key.take() {
                        None => {
                            *key = Some(map_key(value)?);
                            break;
                        }
                        Some(k) => {
                            entries.push(k, value);
                            if entries.len() < *len {
                                break;
                            }
                        }
                    },
                }
                value = match stack.pop() {
                    Some(Frame::Array { items, .. }) => Value::Array(items),
                    Some(Frame::Map { entries, .. }) => Value::Map(entries),
                    _ => return Err(MmdbError::decode("decoder stack out of sync")),
                };
            }
        }
    }

    fn push(stack: &mut Vec<Frame>, frame: Frame) -> Result<()> {
        if stack.len() >= MAX_DEPTH {
            return Err(MmdbError::decode(
                "exceeded maximum data structure depth; database is likely corrupt",
            ));
        }
        stack.push(frame);
        Ok(())
    }

    /// Every element needs at least one byte, so never reserve more than
    /// the bytes left in the section.
    fn capacity_hint(&self, len: usize, cursor: usize) -> usize {
        len.min(self.buffer.len().saturating_sub(cursor))
    }

    /// Read one control byte (plus extended type and size bytes) and the
    /// payload of scalar types
    fn read_token(&self, offset: usize) -> Result<(Token, usize)> {
        let ctrl = self.byte(offset)?;
        let mut cursor = offset + 1;

        let mut type_id = ctrl >> 5;
        if type_id == TYPE_POINTER {
            return self.read_pointer(ctrl & 0x1F, cursor);
        }
        if type_id == TYPE_EXTENDED {
            let ext = self.byte(cursor)?;
            cursor += 1;
            type_id = ext.checked_add(7).filter(|t| *t >= TYPE_INT32).ok_or_else(|| {
                MmdbError::decode(format!(
                    "invalid extended type {} at offset {}",
                    ext, offset
                ))
            })?;
        }

        let (size, cursor) = self.read_size(ctrl & 0x1F, cursor)?;

        let token = match type_id {
            TYPE_STRING => {
                let bytes = self.slice(cursor, size)?;
                let s = std::str::from_utf8(bytes).map_err(|e| {
                    MmdbError::decode(format!("invalid UTF-8 in string at offset {}: {}", offset, e))
                })?;
                return Ok((Token::Scalar(Value::String(s.to_string())), cursor + size));
            }
            TYPE_BYTES => {
                let bytes = self.slice(cursor, size)?;
                return Ok((Token::Scalar(Value::Bytes(bytes.to_vec())), cursor + size));
            }
            TYPE_DOUBLE => Value::Double(match size {
                0 => 0.0,
                8 => f64::from_bits(self.read_uint(cursor, size)? as u64),
                _ => return Err(invalid_size("double", size, offset)),
            }),
            TYPE_FLOAT => Value::Float(match size {
                0 => 0.0,
                4 => f32::from_bits(self.read_uint(cursor, size)? as u32),
                _ => return Err(invalid_size("float", size, offset)),
            }),
            TYPE_UINT16 => Value::Uint16(self.read_bounded(cursor, size, 2, "uint16")? as u16),
            TYPE_UINT32 => Value::Uint32(self.read_bounded(cursor, size, 4, "uint32")? as u32),
            TYPE_INT32 => Value::Int32(self.read_bounded(cursor, size, 4, "int32")? as u32 as i32),
            TYPE_UINT64 => Value::Uint64(self.read_bounded(cursor, size, 8, "uint64")? as u64),
            TYPE_UINT128 => Value::Uint128(self.read_bounded(cursor, size, 16, "uint128")?),
            TYPE_BOOL => match size {
                0 | 1 => return Ok((Token::Scalar(Value::Bool(size == 1)), cursor)),
                _ => return Err(invalid_size("boolean", size, offset)),
            },
            TYPE_MAP => return Ok((Token::Map(size), cursor)),
            TYPE_ARRAY => return Ok((Token::Array(size), cursor)),
            TYPE_CONTAINER | TYPE_END_MARKER => {
                return Err(MmdbError::decode(format!(
                    "unsupported type {} at offset {}",
                    type_id, offset
                )))
            }
            _ => {
                return Err(MmdbError::decode(format!(
                    "unknown type {} at offset {}",
                    type_id, offset
                )))
            }
        };

        Ok((Token::Scalar(token), cursor + size))
    }

    fn read_pointer(&self, size: u8, cursor: usize) -> Result<(Token, usize)> {
        let layout = (size >> 3) & 0x3;
        let prefix = u32::from(size & 0x7);
        let len = usize::from(layout) + 1;
        let bytes = self.slice(cursor, len)?;

        let target = match layout {
            0 => (prefix << 8) | u32::from(bytes[0]),
            1 => ((prefix << 16) | u32::from(bytes[0]) << 8 | u32::from(bytes[1])) + 2048,
            2 => {
                ((prefix << 24)
                    | u32::from(bytes[0]) << 16
                    | u32::from(bytes[1]) << 8
                    | u32::from(bytes[2]))
                    + 526_336
            }
            _ => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        };

        Ok((Token::Pointer(target as usize), cursor + len))
    }

    fn read_size(&self, size: u8, cursor: usize) -> Result<(usize, usize)> {
        match size {
            0..=28 => Ok((usize::from(size), cursor)),
            29 => Ok((29 + usize::from(self.byte(cursor)?), cursor + 1)),
            30 => Ok((285 + self.read_uint(cursor, 2)? as usize, cursor + 2)),
            _ => Ok((65_821 + self.read_uint(cursor, 3)? as usize, cursor + 3)),
        }
    }

    fn read_bounded(&self, cursor: usize, size: usize, max: usize, name: &str) -> Result<u128> {
        if size > max {
            return Err(invalid_size(name, size, cursor));
        }
        self.read_uint(cursor, size)
    }

    /// Big-endian unsigned integer of `size` (<= 16) bytes; zero bytes read as 0
    fn read_uint(&self, cursor: usize, size: usize) -> Result<u128> {
        Ok(self
            .slice(cursor, size)?
            .iter()
            .fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
    }

    fn byte(&self, offset: usize) -> Result<u8> {
        self.buffer
            .get(offset)
            .copied()
            .ok_or_else(|| unexpected_end(offset, 1, self.buffer.len()))
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.buffer.get(offset..end))
            .ok_or_else(|| unexpected_end(offset, len, self.buffer.len()))
    }
}

fn map_key(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(MmdbError::decode(format!(
            "map key must be a string, found {}",
            other.type_name()
        ))),
    }
}

fn invalid_size(name: &str, size: usize, offset: usize) -> MmdbError {
    MmdbError::decode(format!("invalid size {} for {} at offset {}", size, name, offset))
}

fn unexpected_end(offset: usize, len: usize, available: usize) -> MmdbError {
    MmdbError::decode(format!(
        "unexpected end of data: need {} bytes at offset {}, section has {}",
        len, offset, available
    ))
}

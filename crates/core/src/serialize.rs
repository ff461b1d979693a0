//! Length-checked binary buffers
//!
//! `SerializeOutput` is an owned, growable byte buffer. `SerializeInput`
//! reads from a borrowed slice and reports truncation as a format error
//! instead of panicking, so a damaged file never takes the process down.
//!
//! # Encoding
//!
//! - Integers are little-endian
//! - Counts ("long") are `i64`
//! - Strings and byte arrays are `u32` length + bytes

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Growable output buffer
#[derive(Debug, Default, Clone)]
pub struct SerializeOutput {
    data: Vec<u8>,
}

impl SerializeOutput {
    /// Create an empty buffer
    pub fn new() -> Self {
        SerializeOutput { data: Vec::new() }
    }

    /// Bytes written so far
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes written so far
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Forget everything written, keeping the allocation
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Consume the buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Write one byte
    pub fn write_byte(&mut self, v: u8) {
        self.data.push(v);
    }

    /// Write a boolean as one byte
    pub fn write_bool(&mut self, v: bool) {
        self.data.push(u8::from(v));
    }

    /// Write an `i8`
    pub fn write_tiny(&mut self, v: i8) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an `i16`
    pub fn write_short(&mut self, v: i16) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an `i32`
    pub fn write_int(&mut self, v: i32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a `u32`
    pub fn write_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an `i64`
    pub fn write_long(&mut self, v: i64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a `u64`
    pub fn write_u64(&mut self, v: u64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an `f64`
    pub fn write_double(&mut self, v: f64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a count as `i64`
    pub fn write_count(&mut self, n: usize) {
        self.write_long(n as i64);
    }

    /// Write a length-prefixed byte array
    pub fn write_bytes(&mut self, v: &[u8]) {
        self.write_u32(v.len() as u32);
        self.data.extend_from_slice(v);
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_string(&mut self, v: &str) {
        self.write_bytes(v.as_bytes());
    }
}

/// Length-checked reader over a byte slice
#[derive(Debug)]
pub struct SerializeInput<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> SerializeInput<'a> {
    /// Read from `data`, starting at its first byte
    pub fn new(data: &'a [u8]) -> Self {
        SerializeInput {
            cursor: Cursor::new(data),
        }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    /// True once every byte has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Current read offset
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    fn eof(&self, what: &str) -> Error {
        Error::format(format!(
            "unexpected end of input reading {} at offset {}",
            what,
            self.cursor.position()
        ))
    }

    /// Read one byte
    pub fn read_byte(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.eof("byte"))
    }

    /// Read a boolean byte; anything but 0 or 1 is malformed
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::format(format!("invalid boolean byte {}", other))),
        }
    }

    /// Read an `i8`
    pub fn read_tiny(&mut self) -> Result<i8> {
        self.cursor.read_i8().map_err(|_| self.eof("i8"))
    }

    /// Read an `i16`
    pub fn read_short(&mut self) -> Result<i16> {
        self.cursor
            .read_i16::<LittleEndian>()
            .map_err(|_| self.eof("i16"))
    }

    /// Read an `i32`
    pub fn read_int(&mut self) -> Result<i32> {
        self.cursor
            .read_i32::<LittleEndian>()
            .map_err(|_| self.eof("i32"))
    }

    /// Read a `u32`
    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.eof("u32"))
    }

    /// Read an `i64`
    pub fn read_long(&mut self) -> Result<i64> {
        self.cursor
            .read_i64::<LittleEndian>()
            .map_err(|_| self.eof("i64"))
    }

    /// Read a `u64`
    pub fn read_u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.eof("u64"))
    }

    /// Read an `f64`
    pub fn read_double(&mut self) -> Result<f64> {
        self.cursor
            .read_f64::<LittleEndian>()
            .map_err(|_| self.eof("f64"))
    }

    /// Read an `i64` count; negative values are malformed
    pub fn read_count(&mut self) -> Result<usize> {
        let n = self.read_long()?;
        usize::try_from(n).map_err(|_| Error::format(format!("negative count {}", n)))
    }

    /// Read a length-prefixed byte array
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(self.eof("byte array"));
        }
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| self.eof("byte array"))?;
        Ok(buf)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| Error::format("invalid UTF-8 in string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_read_back() {
        let mut out = SerializeOutput::new();
        out.write_long(-5);
        out.write_int(42);
        out.write_bool(true);
        out.write_string("tile");
        out.write_double(1.5);

        let mut input = SerializeInput::new(out.data());
        assert_eq!(input.read_long().unwrap(), -5);
        assert_eq!(input.read_int().unwrap(), 42);
        assert!(input.read_bool().unwrap());
        assert_eq!(input.read_string().unwrap(), "tile");
        assert_eq!(input.read_double().unwrap(), 1.5);
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_truncated_input_is_format_error() {
        let mut input = SerializeInput::new(&[1, 2, 3]);
        let err = input.read_long().unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_oversized_string_length_is_rejected() {
        let mut out = SerializeOutput::new();
        out.write_u32(1_000_000);
        out.write_byte(b'x');
        let mut input = SerializeInput::new(out.data());
        assert!(input.read_string().unwrap_err().is_format());
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let mut out = SerializeOutput::new();
        out.write_long(-1);
        let mut input = SerializeInput::new(out.data());
        assert!(input.read_count().is_err());
    }

    #[test]
    fn test_invalid_bool_byte() {
        let mut input = SerializeInput::new(&[7]);
        assert!(input.read_bool().is_err());
    }

    #[test]
    fn test_reset_keeps_buffer_usable() {
        let mut out = SerializeOutput::new();
        out.write_long(1);
        assert_eq!(out.size(), 8);
        out.reset();
        assert_eq!(out.size(), 0);
        out.write_byte(9);
        assert_eq!(out.data(), &[9]);
    }
}

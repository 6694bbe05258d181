//! Byte-level DSO container layout: a magic/version header followed by four
//! sized sections (global string table, global float table, code segment,
//! identifier fixup table). Every multi-byte field is little-endian.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::LoaderError;

/// Magic word every supported container starts with.
pub const MAGIC: u32 = 0x0044_534F; // "DSO\0" read as a little-endian u32.

/// Versions this loader knows how to parse. Newer or older format
/// revisions are rejected rather than guessed at.
pub const SUPPORTED_VERSIONS: &[u32] = &[33, 34];

/// One entry of the identifier fixup table: a raw word to write, and every
/// code offset it should be written to.
pub struct FixupEntry {
    pub raw_word: u32,
    pub offsets: Vec<u32>,
}

/// The fully parsed, but not-yet-patched, container.
pub struct RawContainer {
    pub version: u32,
    pub string_table: Vec<u8>,
    pub float_table: Vec<f64>,
    pub code: Vec<u32>,
    pub fixups: Vec<FixupEntry>,
}

fn read_u32(cursor: &mut Cursor<&[u8]>, section: &'static str) -> Result<u32, LoaderError> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| LoaderError::Truncated { section, needed: 4 })
}

fn read_f64(cursor: &mut Cursor<&[u8]>, section: &'static str) -> Result<f64, LoaderError> {
    cursor
        .read_f64::<LittleEndian>()
        .map_err(|_| LoaderError::Truncated { section, needed: 8 })
}

fn read_bytes(
    cursor: &mut Cursor<&[u8]>,
    len: u32,
    section: &'static str,
) -> Result<Vec<u8>, LoaderError> {
    let mut buf = vec![0u8; len as usize];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| LoaderError::Truncated { section, needed: len as usize })?;
    Ok(buf)
}

/// Parses the header and all four sections out of `bytes`, without
/// applying the identifier fixup (that step lives in
/// [`crate::file_data`], since it produces the `FileData` the core crate
/// actually consumes).
pub fn parse(bytes: &[u8]) -> Result<RawContainer, LoaderError> {
    let mut cursor = Cursor::new(bytes);

    let magic = read_u32(&mut cursor, "header")?;
    if magic != MAGIC {
        return Err(LoaderError::BadMagic { expected: MAGIC, found: magic });
    }
    let version = read_u32(&mut cursor, "header")?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(LoaderError::UnsupportedVersion(version));
    }

    let string_table_len = read_u32(&mut cursor, "string table")?;
    let string_table = read_bytes(&mut cursor, string_table_len, "string table")?;

    let float_count = read_u32(&mut cursor, "float table")?;
    let mut float_table = Vec::with_capacity(float_count as usize);
    for _ in 0..float_count {
        float_table.push(read_f64(&mut cursor, "float table")?);
    }

    let code_word_count = read_u32(&mut cursor, "code segment")?;
    let mut code = Vec::with_capacity(code_word_count as usize);
    for _ in 0..code_word_count {
        code.push(read_u32(&mut cursor, "code segment")?);
    }

    let fixup_count = read_u32(&mut cursor, "fixup table")?;
    let mut fixups = Vec::with_capacity(fixup_count as usize);
    for _ in 0..fixup_count {
        let raw_word = read_u32(&mut cursor, "fixup table")?;
        let offset_count = read_u32(&mut cursor, "fixup table")?;
        let mut offsets = Vec::with_capacity(offset_count as usize);
        for _ in 0..offset_count {
            offsets.push(read_u32(&mut cursor, "fixup table")?);
        }
        fixups.push(FixupEntry { raw_word, offsets });
    }

    Ok(RawContainer {
        version,
        string_table,
        float_table,
        code,
        fixups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_section(buf: &mut Vec<u8>, bytes: &[u8]) {
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }

    fn minimal_container(version: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&version.to_le_bytes());
        push_section(&mut buf, b"\0"); // string table: one empty string
        buf.extend_from_slice(&0u32.to_le_bytes()); // float count
        buf.extend_from_slice(&1u32.to_le_bytes()); // code word count
        buf.extend_from_slice(&7u32.to_le_bytes()); // one code word
        buf.extend_from_slice(&0u32.to_le_bytes()); // fixup count
        buf
    }

    #[test]
    fn parses_minimal_container() {
        let bytes = minimal_container(33);
        let raw = parse(&bytes).unwrap();
        assert_eq!(raw.version, 33);
        assert_eq!(raw.code, vec![7]);
        assert!(raw.fixups.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_container(33);
        bytes[0] = 0xff;
        assert!(matches!(parse(&bytes), Err(LoaderError::BadMagic { .. })));
    }

    #[test]
    fn rejects_unsupported_version() {
        let bytes = minimal_container(1);
        assert!(matches!(parse(&bytes), Err(LoaderError::UnsupportedVersion(1))));
    }

    #[test]
    fn rejects_truncated_section() {
        let mut bytes = minimal_container(33);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(parse(&bytes), Err(LoaderError::Truncated { .. })));
    }
}

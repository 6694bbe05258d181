//! Builds a [`tsdc_core::FileData`] from a parsed, patched DSO container.

use std::collections::HashMap;

use tracing::debug;
use tsdc_core::FileData;

use crate::error::LoaderError;
use crate::format::{self, RawContainer};

/// A loaded DSO file: the patched code segment plus the three data tables,
/// ready to hand to `tsdc_core::disassemble`.
pub struct DsoFile {
    version: u32,
    code: Vec<u32>,
    string_table: Vec<u8>,
    float_table: Vec<f64>,
    /// For each code offset the fixup table patched, the raw word that was
    /// written there. `identifier` consults this instead of re-deriving an
    /// identifier reference from the patched word, which would be
    /// ambiguous between "a literal index" and "a patched identifier
    /// index".
    patched: HashMap<u32, u32>,
}

impl DsoFile {
    /// Parses `bytes` as a DSO container and applies the identifier fixup
    /// eagerly, producing a ready-to-use [`FileData`].
    ///
    /// `version_override`, if given, must match the version word found in
    /// the container; a mismatch is a format error rather than silently
    /// preferring one over the other.
    pub fn load(bytes: &[u8], version_override: Option<u32>) -> Result<DsoFile, LoaderError> {
        let RawContainer {
            version,
            string_table,
            float_table,
            mut code,
            fixups,
        } = format::parse(bytes)?;

        if let Some(expected) = version_override {
            if expected != version {
                return Err(LoaderError::UnsupportedVersion(version));
            }
        }

        let mut patched = HashMap::new();
        for entry in &fixups {
            for &offset in &entry.offsets {
                let slot = code.get_mut(offset as usize).ok_or(LoaderError::FixupOutOfRange {
                    offset,
                    code_size: code.len() as u32,
                })?;
                *slot = entry.raw_word;
                patched.insert(offset, entry.raw_word);
            }
        }
        debug!(patched = patched.len(), version, "tsdc-loader: fixup applied");

        Ok(DsoFile {
            version,
            code,
            string_table,
            float_table,
            patched,
        })
    }

    /// The DSO format version this file declared.
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl FileData for DsoFile {
    fn code_size(&self) -> u32 {
        self.code.len() as u32
    }

    fn op(&self, at: u32) -> u32 {
        self.code[at as usize]
    }

    fn identifier(&self, at: u32, raw: u32) -> Option<String> {
        match self.patched.get(&at) {
            Some(&patched_raw) if patched_raw == raw => Some(self.string_table(raw)),
            _ => None,
        }
    }

    fn string_table(&self, raw: u32) -> String {
        let start = raw as usize;
        if start >= self.string_table.len() {
            return String::new();
        }
        let end = self.string_table[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|n| start + n)
            .unwrap_or(self.string_table.len());
        String::from_utf8_lossy(&self.string_table[start..end]).into_owned()
    }

    fn float_table(&self, raw: u32) -> f64 {
        self.float_table.get(raw as usize).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MAGIC;

    fn container_with_fixup() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&33u32.to_le_bytes());

        let strings = b"hello\0";
        buf.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        buf.extend_from_slice(strings);

        buf.extend_from_slice(&0u32.to_le_bytes()); // float count

        buf.extend_from_slice(&2u32.to_le_bytes()); // code word count
        buf.extend_from_slice(&0u32.to_le_bytes()); // placeholder, patched below
        buf.extend_from_slice(&99u32.to_le_bytes()); // untouched literal

        buf.extend_from_slice(&1u32.to_le_bytes()); // fixup count
        buf.extend_from_slice(&0u32.to_le_bytes()); // raw_word: string offset 0
        buf.extend_from_slice(&1u32.to_le_bytes()); // one offset
        buf.extend_from_slice(&0u32.to_le_bytes()); // offset 0

        buf
    }

    #[test]
    fn applies_fixup_and_resolves_identifier() {
        let file = DsoFile::load(&container_with_fixup(), None).unwrap();
        assert_eq!(file.op(0), 0);
        assert_eq!(file.identifier(0, 0), Some("hello".to_string()));
        assert_eq!(file.op(1), 99);
        assert_eq!(file.identifier(1, 99), None);
    }

    #[test]
    fn rejects_version_override_mismatch() {
        let err = DsoFile::load(&container_with_fixup(), Some(34)).unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedVersion(33)));
    }
}

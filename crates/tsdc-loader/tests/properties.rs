//! Property tests over randomly generated containers: the fixup table
//! always lands exactly the declared raw words at the declared offsets,
//! following the declared `proptest` dev-dependency.

use proptest::prelude::*;

use tsdc_core::FileData;
use tsdc_loader::DsoFile;
use tsdc_loader::format::MAGIC;

fn push_container(
    code: &[u32],
    fixups: &[(u32, Vec<u32>)],
    strings: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&33u32.to_le_bytes());

    buf.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    buf.extend_from_slice(strings);

    buf.extend_from_slice(&0u32.to_le_bytes()); // float count

    buf.extend_from_slice(&(code.len() as u32).to_le_bytes());
    for word in code {
        buf.extend_from_slice(&word.to_le_bytes());
    }

    buf.extend_from_slice(&(fixups.len() as u32).to_le_bytes());
    for (raw_word, offsets) in fixups {
        buf.extend_from_slice(&raw_word.to_le_bytes());
        buf.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
        for off in offsets {
            buf.extend_from_slice(&off.to_le_bytes());
        }
    }

    buf
}

proptest! {
    /// Every offset named by a fixup entry reads back as that entry's raw
    /// word, and every untouched offset keeps its original value.
    #[test]
    fn fixup_patches_exactly_the_named_offsets(
        code in prop::collection::vec(any::<u32>(), 1..16),
        raw_word in any::<u32>(),
    ) {
        let patched_offset = 0u32;
        let fixups = vec![(raw_word, vec![patched_offset])];
        let bytes = push_container(&code, &fixups, b"\0");
        let file = DsoFile::load(&bytes, None).unwrap();

        prop_assert_eq!(file.op(patched_offset), raw_word);
        for i in 1..code.len() as u32 {
            prop_assert_eq!(file.op(i), code[i as usize]);
        }
    }

    /// A fixup offset past the end of the code segment is always rejected,
    /// never silently ignored or out-of-bounds indexed.
    #[test]
    fn fixup_out_of_range_is_an_error(
        code in prop::collection::vec(any::<u32>(), 1..8),
        extra in 0u32..64,
    ) {
        let out_of_range = code.len() as u32 + extra;
        let fixups = vec![(0u32, vec![out_of_range])];
        let bytes = push_container(&code, &fixups, b"\0");
        prop_assert!(DsoFile::load(&bytes, None).is_err());
    }
}

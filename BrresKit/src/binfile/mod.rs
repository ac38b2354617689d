//! Big-endian binary cursors with offset bookkeeping
//!
//! Every structure in a BRRES file is addressed by 32-bit offsets that are
//! relative to the start of the section holding them. [`BinReader`] resolves
//! such offsets against a stack of section marks; [`BinWriter`] reserves
//! placeholders and back-patches them once the target has been written.

mod group;
mod reader;
mod writer;

pub use group::{GROUP_ENTRY_SIZE, GroupEntry, GroupSlots, TreeNode, build_tree, group_size, read_group, write_group};
pub use reader::BinReader;
pub use writer::{BinWriter, RefSlot};

/// Round `value` up to the next multiple of `alignment`.
#[must_use]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(1, 32), 32);
        assert_eq!(align_up(32, 32), 32);
        assert_eq!(align_up(33, 4), 36);
    }

    #[test]
    fn test_names_round_trip_through_string_table() {
        let mut writer = BinWriter::new();
        writer.write_magic(b"TEST");
        writer.write_name_ref(0, "first");
        writer.write_name_ref(0, "second");
        writer.write_name_ref(0, "first");
        writer.write_string_table();
        let data = writer.finish();

        let mut reader = BinReader::new(&data);
        reader.expect_magic(b"TEST").unwrap();
        let first = reader.read_i32().unwrap();
        let second = reader.read_i32().unwrap();
        let again = reader.read_i32().unwrap();
        assert_eq!(first, again);
        assert_eq!(reader.read_name(0, first).unwrap(), "first");
        assert_eq!(reader.read_name(0, second).unwrap(), "second");
    }

    #[test]
    fn test_forward_reference_is_patched_relative_to_base() {
        let mut writer = BinWriter::new();
        writer.write_u32(0xDEAD_BEEF);
        let base = writer.mark();
        let slot = writer.reserve();
        writer.write_u16(7);
        writer.align(16);
        writer.patch_offset(slot, base);
        writer.write_u32(42);
        assert_eq!(writer.recall(), 4);
        let data = writer.finish();

        let mut reader = BinReader::new(&data);
        reader.seek(4).unwrap();
        reader.mark();
        let rel = reader.read_i32().unwrap();
        let target = reader.resolve(reader.base(), rel).unwrap().unwrap();
        reader.seek(target).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 42);
    }
}

//! Index groups
//!
//! Every directory in a BRRES file is an index group: the root folders, the
//! resources of each folder and every section of a model. A group is a u32
//! byte length, a u32 entry count, then `count + 1` entries of 16 bytes:
//!
//! | offset | type | field                                  |
//! |--------|------|----------------------------------------|
//! | 0x00   | u16  | branch id                              |
//! | 0x02   | u16  | flag                                   |
//! | 0x04   | u16  | left entry                             |
//! | 0x06   | u16  | right entry                            |
//! | 0x08   | i32  | name offset, from the group start      |
//! | 0x0C   | i32  | data offset, from the group start      |
//!
//! Entry 0 is the root of a Patricia tree over the entry names. The console
//! looks resources up by walking that tree, so ids and links are rebuilt from
//! the names every time a group is written.

#![allow(clippy::cast_possible_truncation)]

use super::{BinReader, BinWriter, RefSlot};
use crate::error::Result;

/// Size of one group entry.
pub const GROUP_ENTRY_SIZE: usize = 0x10;

/// Branch id of the root entry.
const ROOT_ID: u16 = 0xFFFF;

/// Byte size of a group holding `count` entries.
#[must_use]
pub const fn group_size(count: usize) -> usize {
    8 + GROUP_ENTRY_SIZE * (count + 1)
}

/// One named entry of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    /// Absolute position of the entry's data, `None` for a zero offset.
    pub data: Option<usize>,
}

/// Read the group at `start`, skipping the root entry.
///
/// # Errors
/// Fails on truncation, an offset outside the buffer or a bad name.
pub fn read_group(reader: &mut BinReader<'_>, start: usize) -> Result<Vec<GroupEntry>> {
    reader.seek(start)?;
    let _len = reader.read_u32()?;
    let count = reader.read_u32()? as usize;
    reader.skip(GROUP_ENTRY_SIZE)?;

    let mut entries = Vec::with_capacity(count.min(0x1000));
    for _ in 0..count {
        let _id = reader.read_u16()?;
        let _flag = reader.read_u16()?;
        let _left = reader.read_u16()?;
        let _right = reader.read_u16()?;
        let name_offset = reader.read_i32()?;
        let data_offset = reader.read_i32()?;
        let name = reader.read_name(start, name_offset)?;
        let data = reader.resolve(start, data_offset)?;
        entries.push(GroupEntry { name, data });
    }
    Ok(entries)
}

/// Placeholders of a written group.
#[derive(Debug)]
pub struct GroupSlots {
    /// Position of the group, the base of its offsets.
    pub start: usize,
    /// Data offset slot of every entry, in input order.
    pub data: Vec<RefSlot>,
}

impl GroupSlots {
    /// Point entry `index` at the writer's current position.
    pub fn patch(&self, writer: &mut BinWriter, index: usize) {
        writer.patch_offset(self.data[index], self.start);
    }
}

/// Write a group over `names` with zeroed data offsets.
pub fn write_group(writer: &mut BinWriter, names: &[&str]) -> GroupSlots {
    let tree = build_tree(names);
    let start = writer.position();
    writer.write_u32(group_size(names.len()) as u32);
    writer.write_u32(names.len() as u32);

    let mut data = Vec::with_capacity(names.len());
    for (i, node) in tree.iter().enumerate() {
        writer.write_u16(node.id);
        writer.write_u16(0);
        writer.write_u16(node.left);
        writer.write_u16(node.right);
        if i == 0 {
            writer.write_u32(0);
            writer.write_u32(0);
        } else {
            writer.write_name_ref(start, names[i - 1]);
            data.push(writer.reserve());
        }
    }
    GroupSlots { start, data }
}

// ==== Patricia tree ====

/// Branch fields of one entry. Index 0 is the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeNode {
    pub id: u16,
    pub left: u16,
    pub right: u16,
}

/// Position of the highest set bit, 0 for an empty byte.
fn highest_bit(mut value: u8) -> u16 {
    let mut bit = 7;
    while bit > 0 && value & 0x80 == 0 {
        bit -= 1;
        value <<= 1;
    }
    bit
}

/// The bit that tells `subject` apart from `object`, scanning from the last
/// character down. A longer subject branches on its own last character.
fn branch_id(object: &[u8], subject: &[u8]) -> u16 {
    if object.len() < subject.len() {
        let last = subject.len() - 1;
        return (last as u16) << 3 | highest_bit(subject[last]);
    }
    for i in (0..subject.len()).rev() {
        let diff = object[i] ^ subject[i];
        if diff != 0 {
            return (i as u16) << 3 | highest_bit(diff);
        }
    }
    ROOT_ID
}

/// Bit `id` of `name`; bits past the end read as clear.
fn bit_at(name: &[u8], id: u16) -> bool {
    let index = usize::from(id >> 3);
    index < name.len() && (name[index] >> (id & 7)) & 1 == 1
}

/// Name of node `index`; the root has none.
fn key<'n>(names: &[&'n str], index: usize) -> &'n [u8] {
    if index == 0 { &[] } else { names[index - 1].as_bytes() }
}

/// Compute branch ids and links for `names`, root first.
#[must_use]
pub fn build_tree(names: &[&str]) -> Vec<TreeNode> {
    let mut nodes = Vec::with_capacity(names.len() + 1);
    nodes.push(TreeNode {
        id: ROOT_ID,
        left: 0,
        right: 0,
    });

    for index in 1..=names.len() {
        let name = key(names, index);
        let this = index as u16;
        let mut id = branch_id(&[], name);
        let mut left = this;
        let mut right = this;

        let mut prev = 0usize;
        let mut current = usize::from(nodes[0].left);
        let mut is_right = false;
        while id <= nodes[current].id && nodes[current].id < nodes[prev].id {
            if id == nodes[current].id {
                id = branch_id(key(names, current), name);
                if bit_at(key(names, current), id) {
                    left = this;
                    right = current as u16;
                } else {
                    left = current as u16;
                    right = this;
                }
            }
            prev = current;
            is_right = bit_at(name, nodes[current].id);
            current = usize::from(if is_right { nodes[current].right } else { nodes[current].left });
        }

        if key(names, current).len() == name.len() && bit_at(key(names, current), id) {
            right = current as u16;
        } else {
            left = current as u16;
        }
        nodes.push(TreeNode { id, left, right });
        if is_right {
            nodes[prev].right = this;
        } else {
            nodes[prev].left = this;
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Walk the tree the way the console does and return the entry found.
    fn search(nodes: &[TreeNode], name: &str) -> usize {
        let name = name.as_bytes();
        let mut prev = 0;
        let mut current = usize::from(nodes[0].left);
        while nodes[current].id < nodes[prev].id {
            prev = current;
            let node = nodes[current];
            current = usize::from(if bit_at(name, node.id) { node.right } else { node.left });
        }
        current
    }

    #[test]
    fn test_two_entry_tree() {
        let nodes = build_tree(&["a", "b"]);
        assert_eq!(nodes[0], TreeNode { id: ROOT_ID, left: 1, right: 0 });
        assert_eq!(nodes[1], TreeNode { id: 6, left: 0, right: 2 });
        assert_eq!(nodes[2], TreeNode { id: 1, left: 1, right: 2 });
    }

    #[test]
    fn test_every_name_is_found() {
        let names = [
            "3DModels(NW4R)",
            "Textures(NW4R)",
            "AnmChr(NW4R)",
            "course",
            "course_road",
            "road",
            "road01",
            "road02",
            "#0",
            "#1",
            "#10",
            "polygon0",
            "polygon1",
            "grass_mat",
            "a",
        ];
        for count in 1..=names.len() {
            let subset = &names[..count];
            let nodes = build_tree(subset);
            assert_eq!(nodes.len(), count + 1);
            for (i, name) in subset.iter().enumerate() {
                assert_eq!(search(&nodes, name), i + 1, "{name} in {subset:?}");
            }
        }
    }

    #[test]
    fn test_group_round_trip() {
        let mut writer = BinWriter::new();
        writer.write_u32(0xCAFE_F00D);
        let group = write_group(&mut writer, &["road", "grass"]);
        assert_eq!(writer.position() - group.start, group_size(2));
        writer.write_u32(7);
        group.patch(&mut writer, 1);
        writer.write_u32(9);
        writer.write_string_table();
        let data = writer.finish();

        let mut reader = BinReader::new(&data);
        let entries = read_group(&mut reader, 4).unwrap();
        assert_eq!(
            entries,
            vec![
                GroupEntry {
                    name: "road".to_string(),
                    data: None
                },
                GroupEntry {
                    name: "grass".to_string(),
                    data: Some(4 + group_size(2) + 4)
                },
            ]
        );
        // root entry id
        assert_eq!(&data[12..14], &[0xFF, 0xFF]);
    }
}

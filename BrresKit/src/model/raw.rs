//! Model sections kept as bytes
//!
//! Definitions, materials, shaders, fur and the texture and palette link
//! tables are not decoded. Their entries travel as blobs so a decoded model
//! writes them back out. Offset fields inside a blob are lifted out as
//! [`Link`]s and zeroed; the writer places every entry first and fills the
//! fields in afterwards.
//!
//! Known offset fields:
//!
//! | section            | field                                        |
//! |--------------------|----------------------------------------------|
//! | materials          | 0x04 model, 0x08 name, 0x28 shader           |
//! | material layers    | 0x00 texture name, 0x04 palette name         |
//! | shaders            | 0x04 model                                   |
//! | fur                | 0x04 model, 0x0C name                        |
//! | texture / palette  | material and layer of every pair             |

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};

use super::Section;
use crate::binfile::{BinReader, BinWriter, GroupEntry, RefSlot};
use crate::error::{Error, Result};

/// Size of one texture layer inside a material.
const LAYER_SIZE: usize = 0x34;
/// Most texture layers a material can hold.
const MAX_LAYERS: usize = 8;

/// Where a link field points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Start of the owning model.
    Model,
    /// A name in the string table.
    Name(String),
    /// A byte inside another kept entry.
    Entry {
        section: Section,
        index: usize,
        offset: usize,
    },
}

/// One offset field of a kept entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Position of the i32 field in the entry.
    pub at: usize,
    /// Position in the entry the offset is measured from.
    pub base: usize,
    pub target: LinkTarget,
}

/// One entry of a kept section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    /// Entry bytes with every link field zeroed.
    pub bytes: Vec<u8>,
    pub links: Vec<Link>,
}

/// A section carried through without decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    pub section: Section,
    pub entries: Vec<RawEntry>,
}

impl Section {
    /// Whether entries of this section are kept as bytes.
    #[must_use]
    pub const fn is_kept(self) -> bool {
        matches!(
            self,
            Self::Definitions
                | Self::FurVectors
                | Self::FurLayers
                | Self::Materials
                | Self::Shaders
                | Self::Textures
                | Self::Palettes
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Model,
    Name,
    Offset,
}

/// Offset fields of an entry as `(position, base, kind)`.
fn fields(section: Section, bytes: &[u8]) -> Vec<(usize, usize, Field)> {
    let word = |at: usize| bytes.get(at..at + 4).map_or(0, BigEndian::read_u32);
    let mut fields = Vec::new();
    match section {
        Section::Materials => {
            fields.extend([(0x04, 0, Field::Model), (0x08, 0, Field::Name), (0x28, 0, Field::Offset)]);
            let layers = (word(0x2C) as usize).min(MAX_LAYERS);
            let first = word(0x30) as usize;
            if first != 0 {
                for layer in 0..layers {
                    let start = first + LAYER_SIZE * layer;
                    fields.push((start, start, Field::Name));
                    fields.push((start + 4, start, Field::Name));
                }
            }
        }
        Section::Shaders => fields.push((0x04, 0, Field::Model)),
        Section::FurVectors | Section::FurLayers => {
            fields.extend([(0x04, 0, Field::Model), (0x0C, 0, Field::Name)]);
        }
        Section::Textures | Section::Palettes => {
            for pair in 0..word(0) as usize {
                fields.push((4 + 8 * pair, 0, Field::Offset));
                fields.push((8 + 8 * pair, 0, Field::Offset));
            }
        }
        _ => {}
    }
    fields.retain(|&(at, _, _)| at + 4 <= bytes.len());
    fields
}

/// Length of a definition list: opcodes up to and including the end marker.
fn definitions_len(reader: &mut BinReader<'_>, start: usize) -> Result<usize> {
    reader.seek(start)?;
    loop {
        let at = reader.position();
        let opcode = reader.read_u8()?;
        let operands = match opcode {
            0x00 => 0,
            0x01 => return Ok(reader.position() - start),
            0x02 | 0x05 | 0x06 => 4,
            // node mix: node id, weight count, then (node, weight) pairs
            0x03 => {
                reader.skip(2)?;
                6 * usize::from(reader.read_u8()?)
            }
            0x04 => 7,
            _ => return Err(Error::InvalidOpcode { opcode, offset: at }),
        };
        reader.skip(operands)?;
    }
}

fn entry_len(reader: &mut BinReader<'_>, section: Section, start: usize) -> Result<usize> {
    if section == Section::Definitions {
        return definitions_len(reader, start);
    }
    reader.seek(start)?;
    let len = match section {
        Section::Textures | Section::Palettes => 4 + 8 * reader.read_u32()? as usize,
        _ => reader.read_u32()? as usize,
    };
    if len < 8 || start + len > reader.len() {
        return Err(Error::InvalidSectionLength {
            offset: start,
            length: len as u32,
        });
    }
    Ok(len)
}

/// A kept entry located in the input.
struct Placed {
    section: Section,
    index: usize,
    name: String,
    start: usize,
    len: usize,
}

/// Read the kept sections of a model.
///
/// A section whose entries cannot be measured is dropped with a warning. A
/// field that does not resolve is left as it was.
pub(crate) fn read_raw_sections(
    reader: &mut BinReader<'_>,
    model_start: usize,
    model_name: &str,
    groups: Vec<(Section, Vec<GroupEntry>)>,
) -> Result<Vec<RawSection>> {
    // Step 1: measure every entry
    let mut placed = Vec::new();
    let mut sections = Vec::new();
    'sections: for (section, entries) in groups {
        let mut measured = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let Some(start) = entry.data else {
                tracing::warn!("Dropping {} of {}: entry {} has no data", section.label(), model_name, entry.name);
                continue 'sections;
            };
            match entry_len(reader, section, start) {
                Ok(len) => measured.push(Placed {
                    section,
                    index,
                    name: entry.name,
                    start,
                    len,
                }),
                Err(e) => {
                    tracing::warn!("Dropping {} of {}: {}", section.label(), model_name, e);
                    continue 'sections;
                }
            }
        }
        sections.push(section);
        placed.extend(measured);
    }

    // Step 2: copy the bytes and lift out the links
    let find = |absolute: i64| {
        placed.iter().find(|p| p.start as i64 <= absolute && absolute < (p.start + p.len) as i64)
    };
    let mut raw: Vec<RawSection> = sections
        .iter()
        .map(|&section| RawSection {
            section,
            entries: Vec::new(),
        })
        .collect();
    for entry in &placed {
        reader.seek(entry.start)?;
        let mut bytes = reader.read_bytes(entry.len)?.to_vec();
        let mut links = Vec::new();
        for (at, base, field) in fields(entry.section, &bytes) {
            let value = BigEndian::read_i32(&bytes[at..at + 4]);
            if value == 0 {
                continue;
            }
            let from = entry.start + base;
            let absolute = from as i64 + i64::from(value);
            let target = match field {
                Field::Model => (absolute == model_start as i64).then_some(LinkTarget::Model),
                Field::Name => reader.read_name(from, value).ok().map(LinkTarget::Name),
                Field::Offset => find(absolute).map(|p| LinkTarget::Entry {
                    section: p.section,
                    index: p.index,
                    offset: (absolute - p.start as i64) as usize,
                }),
            };
            match target {
                Some(target) => {
                    bytes[at..at + 4].fill(0);
                    links.push(Link { at, base, target });
                }
                None => tracing::warn!(
                    "Keeping unresolved offset {:#x} at {:#x} in {} {}",
                    value,
                    at,
                    entry.section.label(),
                    entry.name
                ),
            }
        }
        if let Some(section) = raw.iter_mut().find(|s| s.section == entry.section) {
            section.entries.push(RawEntry {
                name: entry.name.clone(),
                bytes,
                links,
            });
        }
    }
    for section in &raw {
        tracing::debug!("Kept {} {} of {}", section.entries.len(), section.section.label(), model_name);
    }
    Ok(raw)
}

/// Positions of written kept entries.
pub(crate) type Placement = HashMap<(Section, usize), usize>;

/// Fill in every link once all kept entries have been written.
pub(crate) fn write_links(
    writer: &mut BinWriter,
    sections: &[RawSection],
    placement: &Placement,
    model_start: usize,
) -> Result<()> {
    for raw in sections {
        for (index, entry) in raw.entries.iter().enumerate() {
            let Some(&start) = placement.get(&(raw.section, index)) else {
                continue;
            };
            for link in &entry.links {
                if link.at + 4 > entry.bytes.len() {
                    return Err(Error::InvalidLink(format!(
                        "{} {} has a field past its end at {:#x}",
                        raw.section.label(),
                        entry.name,
                        link.at
                    )));
                }
                let slot = RefSlot::at(start + link.at);
                let base = start + link.base;
                match &link.target {
                    LinkTarget::Model => writer.patch_i32(slot, model_start as i32 - base as i32),
                    LinkTarget::Name(name) => writer.patch_name(slot, base, name),
                    LinkTarget::Entry { section, index, offset } => {
                        let target = placement.get(&(*section, *index)).ok_or_else(|| {
                            Error::InvalidLink(format!(
                                "{} {} points at missing {} entry {index}",
                                raw.section.label(),
                                entry.name,
                                section.label()
                            ))
                        })?;
                        writer.patch_i32(slot, (target + offset) as i32 - base as i32);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_length() {
        // node tree, node mix with two weights, draw, end
        let mut data = vec![0x02, 0, 0, 0, 0];
        data.extend([0x03, 0, 1, 2, 0, 0, 0x3F, 0x80, 0, 0, 0, 1, 0x3F, 0x80, 0, 0]);
        data.extend([0x04, 0, 0, 0, 0, 0, 0, 0]);
        data.push(0x01);
        data.extend([0xAA; 3]);
        let mut reader = BinReader::new(&data);
        assert_eq!(definitions_len(&mut reader, 0).unwrap(), 5 + 16 + 8 + 1);
    }

    #[test]
    fn test_unknown_definition_opcode() {
        let data = [0x02, 0, 0, 0, 0, 0x7E, 0x01];
        let mut reader = BinReader::new(&data);
        assert!(matches!(
            definitions_len(&mut reader, 0),
            Err(Error::InvalidOpcode { opcode: 0x7E, offset: 5 })
        ));
    }

    #[test]
    fn test_material_layer_fields() {
        let mut bytes = vec![0u8; 0x40 + 2 * LAYER_SIZE];
        bytes[0x2C..0x30].copy_from_slice(&2u32.to_be_bytes());
        bytes[0x30..0x34].copy_from_slice(&0x40u32.to_be_bytes());
        let positions: Vec<_> = fields(Section::Materials, &bytes).iter().map(|f| (f.0, f.1)).collect();
        assert_eq!(
            positions,
            vec![
                (0x04, 0),
                (0x08, 0),
                (0x28, 0),
                (0x40, 0x40),
                (0x44, 0x40),
                (0x74, 0x74),
                (0x78, 0x74)
            ]
        );
    }
}

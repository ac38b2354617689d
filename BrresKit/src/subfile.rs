//! Subfile registry and the generic section header
//!
//! Every resource inside a BRRES container starts with the same header:
//!
//! ```text
//! 0x00  magic            [u8; 4]
//! 0x04  byte length      u32   (including this header)
//! 0x08  version          u32
//! 0x0C  container offset i32   (negative, back to the file start)
//! 0x10  section offsets  i32 x N (relative to the subfile start, 0 = absent)
//! ....  name offset      i32   (relative to the subfile start)
//! ```
//!
//! `N` depends on the tag and version; [`SubfileKind::section_count`] is the
//! registry that maps one to the other.

use crate::binfile::{BinReader, BinWriter, RefSlot};
use crate::error::{Error, Result};

/// Resource types the container knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubfileKind {
    /// `MDL0` model: geometry groups, polygons and skeleton.
    Model,
    /// `TEX0` texture: one image plus its mipmaps.
    Texture,
}

impl SubfileKind {
    pub const ALL: [Self; 2] = [Self::Model, Self::Texture];

    #[must_use]
    pub const fn magic(self) -> &'static [u8; 4] {
        match self {
            Self::Model => b"MDL0",
            Self::Texture => b"TEX0",
        }
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Model => "MDL0",
            Self::Texture => "TEX0",
        }
    }

    /// Name of the container folder holding this kind.
    #[must_use]
    pub const fn folder(self) -> &'static str {
        match self {
            Self::Model => "3DModels(NW4R)",
            Self::Texture => "Textures(NW4R)",
        }
    }

    /// Version written when encoding.
    #[must_use]
    pub const fn current_version(self) -> u32 {
        match self {
            Self::Model => 11,
            Self::Texture => 3,
        }
    }

    /// Number of section offsets in the header for `version`, if supported.
    #[must_use]
    pub const fn section_count(self, version: u32) -> Option<usize> {
        match (self, version) {
            (Self::Model, 8 | 9) => Some(11),
            (Self::Model, 10 | 11) => Some(14),
            (Self::Texture, 1 | 3) => Some(1),
            (Self::Texture, 2) => Some(2),
            _ => None,
        }
    }

    /// Look up a registered tag.
    pub fn from_magic(magic: [u8; 4]) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| *kind.magic() == magic)
            .ok_or(Error::UnknownMagic(magic))
    }

    /// Size of the generic header for `version`.
    #[must_use]
    pub const fn header_size(self, version: u32) -> usize {
        match self.section_count(version) {
            Some(count) => 0x14 + 4 * count,
            None => 0x14,
        }
    }
}

/// A decoded generic section header.
#[derive(Debug, Clone)]
pub struct SubfileHeader {
    pub kind: SubfileKind,
    /// Absolute offset of the subfile.
    pub start: usize,
    pub byte_len: u32,
    pub version: u32,
    /// Raw section offsets, relative to `start`.
    pub offsets: Vec<i32>,
    pub name: String,
}

impl SubfileHeader {
    /// Read the header of a `kind` subfile starting at `start`.
    ///
    /// Leaves the cursor directly after the header.
    pub fn read(reader: &mut BinReader<'_>, kind: SubfileKind, start: usize) -> Result<Self> {
        reader.seek(start)?;
        reader.expect_magic(kind.magic())?;
        let byte_len = reader.read_u32()?;
        let version = reader.read_u32()?;
        let count = kind.section_count(version).ok_or(Error::UnsupportedVersion {
            magic: kind.tag(),
            version,
        })?;
        if (byte_len as usize) < kind.header_size(version)
            || start + byte_len as usize > reader.len()
        {
            return Err(Error::InvalidSectionLength {
                offset: start,
                length: byte_len,
            });
        }
        let _container_offset = reader.read_i32()?;
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = reader.read_i32()?;
            if offset != 0 && (offset < 0 || offset as u32 >= byte_len) {
                return Err(Error::OffsetOutOfRange {
                    offset: start as i64 + i64::from(offset),
                    len: reader.len(),
                });
            }
            offsets.push(offset);
        }
        let name_offset = reader.read_i32()?;
        let name = reader.read_name(start, name_offset)?;
        Ok(Self {
            kind,
            start,
            byte_len,
            version,
            offsets,
            name,
        })
    }

    /// Absolute offset of section `index`, or `None` when absent.
    #[must_use]
    pub fn section(&self, index: usize) -> Option<usize> {
        match self.offsets.get(index) {
            Some(&offset) if offset != 0 => Some(self.start + offset as usize),
            _ => None,
        }
    }

    /// Absolute end of the subfile.
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.byte_len as usize
    }
}

/// Placeholders left in a generic header while its body is written.
pub struct HeaderSlots {
    pub start: usize,
    length: RefSlot,
    sections: Vec<RefSlot>,
}

impl HeaderSlots {
    /// Point section `index` at the current writer position.
    pub fn patch_section(&self, writer: &mut BinWriter, index: usize) {
        writer.patch_offset(self.sections[index], self.start);
    }

    /// Write the final byte length once the body is complete.
    pub fn finish(self, writer: &mut BinWriter) {
        writer.patch_length(self.length, self.start);
    }
}

/// Write a generic header for the current version of `kind`.
pub fn write_header(
    writer: &mut BinWriter,
    kind: SubfileKind,
    name: &str,
    container_start: usize,
) -> HeaderSlots {
    let version = kind.current_version();
    let start = writer.position();
    writer.write_magic(kind.magic());
    let length = writer.reserve();
    writer.write_u32(version);
    writer.write_i32(container_start as i32 - start as i32);
    let count = kind.section_count(version).unwrap_or(0);
    let sections = (0..count).map(|_| writer.reserve()).collect();
    writer.write_name_ref(start, name);
    HeaderSlots {
        start,
        length,
        sections,
    }
}

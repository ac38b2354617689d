//! Big-endian writer with deferred references

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};

/// A reserved 4-byte placeholder awaiting a back-patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefSlot(usize);

impl RefSlot {
    /// The 4 bytes at `position`, already written.
    pub(crate) fn at(position: usize) -> Self {
        Self(position)
    }

    /// Absolute position of the placeholder.
    #[must_use]
    pub fn position(self) -> usize {
        self.0
    }
}

/// A name reference resolved when the string table is written.
#[derive(Debug, Clone)]
struct NameRef {
    slot: usize,
    base: usize,
    name: String,
}

/// Growable output buffer for a BRRES file.
pub struct BinWriter {
    data: Vec<u8>,
    marks: Vec<usize>,
    names: Vec<NameRef>,
}

impl BinWriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            marks: Vec::new(),
            names: Vec::new(),
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.data.len()
    }

    /// Pad with zeros to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        let padding = super::align_up(self.data.len(), alignment) - self.data.len();
        self.data.extend(std::iter::repeat_n(0u8, padding));
    }

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        let mut buf = [0u8; 2];
        BigEndian::write_u16(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_i16(&mut self, v: i16) {
        let mut buf = [0u8; 2];
        BigEndian::write_i16(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_u32(&mut self, v: u32) {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_i32(&mut self, v: i32) {
        let mut buf = [0u8; 4];
        BigEndian::write_i32(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_f32(&mut self, v: f32) {
        let mut buf = [0u8; 4];
        BigEndian::write_f32(&mut buf, v);
        self.data.extend_from_slice(&buf);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_magic(&mut self, magic: &[u8; 4]) {
        self.data.extend_from_slice(magic);
    }

    /// Remember the current position as the start of a section.
    pub fn mark(&mut self) -> usize {
        let pos = self.position();
        self.marks.push(pos);
        pos
    }

    /// Pop the innermost section start.
    pub fn recall(&mut self) -> usize {
        self.marks.pop().unwrap_or(0)
    }

    /// Write a zeroed 4-byte placeholder to be patched later.
    pub fn reserve(&mut self) -> RefSlot {
        let slot = RefSlot(self.position());
        self.write_u32(0);
        slot
    }

    /// Patch `slot` with the current position relative to `base`.
    pub fn patch_offset(&mut self, slot: RefSlot, base: usize) {
        let relative = self.position() as i64 - base as i64;
        self.patch_i32(slot, relative as i32);
    }

    pub fn patch_u32(&mut self, slot: RefSlot, v: u32) {
        BigEndian::write_u32(&mut self.data[slot.0..slot.0 + 4], v);
    }

    pub fn patch_i32(&mut self, slot: RefSlot, v: i32) {
        BigEndian::write_i32(&mut self.data[slot.0..slot.0 + 4], v);
    }

    /// Patch `slot` with the number of bytes written since `start`.
    pub fn patch_length(&mut self, slot: RefSlot, start: usize) {
        let length = (self.position() - start) as u32;
        self.patch_u32(slot, length);
    }

    /// Write a placeholder for `name`, resolved by [`Self::write_string_table`].
    pub fn write_name_ref(&mut self, base: usize, name: &str) {
        let slot = self.reserve();
        self.patch_name(slot, base, name);
    }

    /// Point an existing `slot` at `name` once the string table is written.
    pub fn patch_name(&mut self, slot: RefSlot, base: usize, name: &str) {
        self.names.push(NameRef {
            slot: slot.0,
            base,
            name: name.to_string(),
        });
    }

    /// Append every referenced name once and patch the pending references.
    ///
    /// Each entry is a u32 length, the bytes, a NUL terminator, then padding to
    /// four bytes. References point at the first character.
    pub fn write_string_table(&mut self) {
        let names = std::mem::take(&mut self.names);
        let mut written: HashMap<String, usize> = HashMap::new();
        for name_ref in &names {
            if written.contains_key(&name_ref.name) {
                continue;
            }
            self.write_u32(name_ref.name.len() as u32);
            written.insert(name_ref.name.clone(), self.position());
            self.write_bytes(name_ref.name.as_bytes());
            self.write_u8(0);
            self.align(4);
        }
        for name_ref in names {
            let target = written[&name_ref.name];
            let relative = target as i64 - name_ref.base as i64;
            self.patch_i32(RefSlot(name_ref.slot), relative as i32);
        }
    }

    /// Consume the writer and return the bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        debug_assert!(self.names.is_empty(), "string table was not written");
        self.data
    }
}

impl Default for BinWriter {
    fn default() -> Self {
        Self::new()
    }
}

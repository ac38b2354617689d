//! TEX0 (de)serialization
//!
//! ```text
//! generic header (1 or 2 sections)
//! 0x00  reserved    u32
//! 0x04  width       u16
//! 0x06  height      u16
//! 0x08  format      u32
//! 0x0C  images      u32
//! 0x10  reserved    u32
//! 0x14  mipmaps     f32
//! 0x18  reserved    u32
//! ....  pixel data, 32-byte aligned, up to the end of the subfile
//! ```

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]

use super::{Texture, TextureFormat};
use crate::binfile::{BinReader, BinWriter};
use crate::error::Result;
use crate::subfile::{SubfileHeader, SubfileKind, write_header};

/// Decode a texture whose generic header has already been read.
pub(crate) fn read_texture(reader: &mut BinReader<'_>, header: &SubfileHeader) -> Result<Texture> {
    reader.seek(header.start + header.kind.header_size(header.version))?;
    let _reserved = reader.read_u32()?;
    let width = reader.read_u16()?;
    let height = reader.read_u16()?;
    let format = TextureFormat::from_u32(reader.read_u32()?)?;
    let image_count = reader.read_u32()?;
    let _reserved = reader.read_u32()?;
    let mipmaps = reader.read_f32()?;
    let _reserved = reader.read_u32()?;

    let data = match header.section(0) {
        Some(offset) => {
            reader.seek(offset)?;
            reader.read_bytes(header.end().saturating_sub(offset))?.to_vec()
        }
        None => Vec::new(),
    };

    tracing::debug!(
        "Read texture {}: {}x{} {} with {} mipmaps, {} bytes",
        header.name,
        width,
        height,
        format,
        mipmaps,
        data.len()
    );
    Ok(Texture {
        name: header.name.clone(),
        width,
        height,
        format,
        image_count,
        mipmap_count: mipmaps.max(0.0).round() as u32,
        data,
    })
}

/// Serialize `texture` at the writer's current position.
pub(crate) fn write_texture(writer: &mut BinWriter, texture: &Texture, container_start: usize) {
    let header = write_header(writer, SubfileKind::Texture, &texture.name, container_start);
    writer.write_u32(0);
    writer.write_u16(texture.width);
    writer.write_u16(texture.height);
    writer.write_u32(texture.format as u32);
    writer.write_u32(texture.image_count);
    writer.write_u32(0);
    writer.write_f32(texture.mipmap_count as f32);
    writer.write_u32(0);

    writer.align(0x20);
    header.patch_section(writer, 0);
    writer.write_bytes(&texture.data);
    header.finish(writer);
}

/// Parse a standalone TEX0 file, as written by the texture tool.
///
/// # Errors
/// Returns an error if the header is malformed or the format is unknown.
pub fn texture_from_bytes(bytes: &[u8]) -> Result<Texture> {
    let mut reader = BinReader::new(bytes);
    let header = SubfileHeader::read(&mut reader, SubfileKind::Texture, 0)?;
    read_texture(&mut reader, &header)
}

/// Serialize a texture as a standalone TEX0 file with its own string table.
#[must_use]
pub fn texture_to_bytes(texture: &Texture) -> Vec<u8> {
    let mut writer = BinWriter::new();
    write_texture(&mut writer, texture, 0);
    writer.write_string_table();
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_round_trip() {
        let mut texture = Texture::blank("road", 16, 8, TextureFormat::Rgb5a3, 1);
        for (i, byte) in texture.data.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let bytes = texture_to_bytes(&texture);
        assert_eq!(&bytes[..4], b"TEX0");
        assert_eq!(texture_from_bytes(&bytes).unwrap(), texture);
    }

    #[test]
    fn test_pixel_data_is_aligned() {
        let texture = Texture::blank("road", 8, 8, TextureFormat::I8, 0);
        let bytes = texture_to_bytes(&texture);
        let mut reader = BinReader::new(&bytes);
        let header = SubfileHeader::read(&mut reader, SubfileKind::Texture, 0).unwrap();
        assert_eq!(header.section(0), Some(0x40));
        assert_eq!(header.byte_len as usize, 0x40 + 64);
    }

    #[test]
    fn test_invalid_format() {
        let texture = Texture::blank("road", 8, 8, TextureFormat::I8, 0);
        let mut bytes = texture_to_bytes(&texture);
        // format field of the fixed header
        bytes[0x18 + 0x0B] = 7;
        assert!(matches!(texture_from_bytes(&bytes), Err(Error::InvalidTextureFormat(7))));
    }

    #[test]
    fn test_truncated_file() {
        let texture = Texture::blank("road", 8, 8, TextureFormat::I8, 0);
        let bytes = texture_to_bytes(&texture);
        assert!(texture_from_bytes(&bytes[..0x30]).is_err());
    }
}

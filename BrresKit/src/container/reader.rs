//! BRRES parsing

use std::path::Path;

use super::{BYTE_ORDER_MARK, Container, FILE_MAGIC, ROOT_MAGIC};
use crate::binfile::{BinReader, read_group};
use crate::error::{Error, Result};
use crate::model::read_model;
use crate::subfile::{SubfileHeader, SubfileKind};
use crate::texture::read_texture;

/// One resource listed under a root folder.
struct RootEntry {
    name: String,
    /// Tag found at the subfile start, zeroed when unreadable.
    magic: [u8; 4],
    offset: usize,
}

/// Validate the file header and return the root directory.
fn read_root(reader: &mut BinReader<'_>) -> Result<Vec<RootEntry>> {
    // Step 1: File header
    reader.expect_magic(FILE_MAGIC)?;
    let bom = reader.read_u16()?;
    if bom != BYTE_ORDER_MARK {
        let [a, b] = bom.to_be_bytes();
        return Err(Error::InvalidMagic {
            expected: [0xFE, 0xFF, 0, 0],
            found: [a, b, 0, 0],
            offset: 4,
        });
    }
    let _pad = reader.read_u16()?;
    let file_len = reader.read_u32()?;
    if file_len as usize > reader.len() {
        return Err(Error::InvalidSectionLength {
            offset: 0,
            length: file_len,
        });
    }
    let root_offset = usize::from(reader.read_u16()?);
    let _section_count = reader.read_u16()?;

    // Step 2: Root directory
    reader.seek(root_offset)?;
    reader.expect_magic(ROOT_MAGIC)?;
    let root_len = reader.read_u32()?;
    if root_offset + root_len as usize > reader.len() {
        return Err(Error::InvalidSectionLength {
            offset: root_offset,
            length: root_len,
        });
    }

    // Step 3: Folder group, then one resource group per folder
    let folders = read_group(reader, root_offset + 8)?;
    let mut entries = Vec::new();
    for folder in folders {
        let Some(group) = folder.data else {
            tracing::debug!("Folder {} is empty", folder.name);
            continue;
        };
        for resource in read_group(reader, group)? {
            let offset = resource.data.ok_or(Error::OffsetOutOfRange {
                offset: group as i64,
                len: reader.len(),
            })?;
            reader.seek(offset)?;
            let magic = reader.read_magic().unwrap_or([0; 4]);
            tracing::trace!("{}/{} at {:#x}", folder.name, resource.name, offset);
            entries.push(RootEntry {
                name: resource.name,
                magic,
                offset,
            });
        }
    }
    Ok(entries)
}

/// Decode one subfile into the container.
fn read_entry(reader: &mut BinReader<'_>, entry: &RootEntry, container: &mut Container) -> Result<()> {
    let kind = SubfileKind::from_magic(entry.magic)?;
    let header = SubfileHeader::read(reader, kind, entry.offset)?;
    match kind {
        SubfileKind::Model => {
            let mut model = read_model(reader, &header)?;
            model.name.clone_from(&entry.name);
            container.insert_model(model)
        }
        SubfileKind::Texture => {
            let mut texture = read_texture(reader, &header)?;
            texture.name.clone_from(&entry.name);
            container.insert_texture(texture)
        }
    }
}

fn tag_label(magic: [u8; 4]) -> &'static str {
    SubfileKind::from_magic(magic).map_or("subfile", SubfileKind::tag)
}

/// Decode a BRRES file.
///
/// # Errors
/// Fails on the first malformed or unknown subfile. Failures inside a
/// subfile are wrapped in [`Error::Resource`] with its name.
pub fn decode_container(bytes: &[u8]) -> Result<Container> {
    let mut reader = BinReader::new(bytes);
    let entries = read_root(&mut reader)?;
    let mut container = Container::default();
    for entry in &entries {
        read_entry(&mut reader, entry, &mut container)
            .map_err(|e| e.in_resource(tag_label(entry.magic), entry.name.clone()))?;
    }
    tracing::info!(
        "Decoded container: {} models, {} textures",
        container.models.len(),
        container.textures.len()
    );
    Ok(container)
}

/// Decode a BRRES file, skipping subfiles that fail.
///
/// Only a broken file header or root directory is fatal. Every skipped
/// subfile is returned with its error.
///
/// # Errors
/// Returns an error if the file header or root directory is malformed.
pub fn decode_container_partial(bytes: &[u8]) -> Result<(Container, Vec<Error>)> {
    let mut reader = BinReader::new(bytes);
    let entries = read_root(&mut reader)?;
    let mut container = Container::default();
    let mut errors = Vec::new();
    for entry in &entries {
        if let Err(e) = read_entry(&mut reader, entry, &mut container) {
            tracing::warn!("Skipping {}: {}", entry.name, e);
            errors.push(e.in_resource(tag_label(entry.magic), entry.name.clone()));
        }
    }
    tracing::info!(
        "Decoded container: {} models, {} textures, {} skipped",
        container.models.len(),
        container.textures.len(),
        errors.len()
    );
    Ok((container, errors))
}

/// Read and decode a BRRES file from disk. The container is named after the
/// file stem.
///
/// # Errors
/// Returns an error if the file cannot be read or decoded.
pub fn read_container(path: impl AsRef<Path>) -> Result<Container> {
    let path = path.as_ref();
    tracing::info!("Reading {}", path.display());
    let bytes = std::fs::read(path)?;
    let mut container = decode_container(&bytes)?;
    container.name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(container)
}

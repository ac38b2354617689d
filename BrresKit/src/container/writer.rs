//! BRRES serialization

#![allow(clippy::cast_possible_truncation)]

use std::path::Path;

use super::{BYTE_ORDER_MARK, Container, FILE_MAGIC, ROOT_MAGIC, ROOT_OFFSET};
use crate::binfile::{BinWriter, RefSlot, write_group};
use crate::error::{Error, Result};
use crate::model::write_model;
use crate::subfile::SubfileKind;
use crate::texture::write_texture;

/// Serialize a container into a complete BRRES file.
///
/// Models are written before textures, each group in insertion order.
///
/// # Errors
/// Returns an error if a model holds data that cannot be laid out.
pub fn encode_container(container: &Container) -> Result<Vec<u8>> {
    let mut writer = BinWriter::new();

    // Step 1: File header
    writer.write_magic(FILE_MAGIC);
    writer.write_u16(BYTE_ORDER_MARK);
    writer.write_u16(0);
    let file_len = writer.reserve();
    writer.write_u16(ROOT_OFFSET);
    writer.write_u16(u16::try_from(container.len() + 1).map_err(|_| {
        Error::InvalidSetting {
            key: "container",
            message: format!("{} subfiles do not fit in one file", container.len()),
        }
    })?);

    // Step 2: Root folders, subfile offsets patched as subfiles land
    let root = writer.position();
    writer.write_magic(ROOT_MAGIC);
    let root_len = writer.reserve();
    let folders: Vec<(&str, Vec<&str>)> = [
        (SubfileKind::Model, container.models.keys().map(String::as_str).collect::<Vec<_>>()),
        (SubfileKind::Texture, container.textures.keys().map(String::as_str).collect()),
    ]
    .into_iter()
    .filter(|(_, names)| !names.is_empty())
    .map(|(kind, names)| (kind.folder(), names))
    .collect();
    let folder_names: Vec<&str> = folders.iter().map(|(folder, _)| *folder).collect();
    let folder_group = write_group(&mut writer, &folder_names);
    let mut slots: Vec<(RefSlot, usize)> = Vec::with_capacity(container.len());
    for (i, (_, names)) in folders.iter().enumerate() {
        folder_group.patch(&mut writer, i);
        let group = write_group(&mut writer, names);
        slots.extend(group.data.iter().map(|&slot| (slot, group.start)));
    }
    writer.patch_length(root_len, root);

    // Step 3: Subfiles
    let mut slots = slots.into_iter();
    for model in container.models.values() {
        writer.align(0x20);
        if let Some((slot, base)) = slots.next() {
            writer.patch_offset(slot, base);
        }
        write_model(&mut writer, model, 0).map_err(|e| e.in_resource(SubfileKind::Model.tag(), &model.name))?;
    }
    for texture in container.textures.values() {
        writer.align(0x20);
        if let Some((slot, base)) = slots.next() {
            writer.patch_offset(slot, base);
        }
        write_texture(&mut writer, texture, 0);
    }

    // Step 4: Names shared by every section
    writer.align(0x20);
    writer.write_string_table();
    writer.align(4);
    writer.patch_length(file_len, 0);

    let bytes = writer.finish();
    tracing::info!(
        "Encoded container {}: {} models, {} textures, {} bytes",
        container.name,
        container.models.len(),
        container.textures.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Encode a container and write it to disk.
///
/// # Errors
/// Returns an error if encoding fails or the file cannot be written.
pub fn write_container(path: impl AsRef<Path>, container: &Container) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_container(container)?;
    std::fs::write(path, bytes)?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

//! MDL0 parsing

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;

use glam::Vec3;

use super::bone::{Bone, BoneId, Skeleton};
use super::groups::{AttributeKind, ColorGroup, PointGroup};
use super::polygon::{AttributeRef, MAX_COLOR_SETS, Polygon};
use super::raw::read_raw_sections;
use super::{Model, ModelInfo, Section};
use crate::binfile::{BinReader, GroupEntry, read_group};
use crate::error::{Error, Result};
use crate::geometry::{ColorFormat, DrawData, IndexFormat, MAX_UV_SETS, PointFormat};
use crate::subfile::SubfileHeader;

fn entry_start(entry: &GroupEntry, section: Section) -> Result<usize> {
    entry
        .data
        .ok_or_else(|| Error::InvalidLink(format!("{} entry {} has no data", section.label(), entry.name)))
}

fn read_vec3(reader: &mut BinReader<'_>) -> Result<Vec3> {
    Ok(Vec3::new(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?))
}

fn read_floats(reader: &mut BinReader<'_>, count: usize, keep: usize) -> Result<Vec<f32>> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(reader.read_f32()?);
    }
    values.truncate(keep);
    Ok(values)
}

fn read_info(reader: &mut BinReader<'_>, offset: usize) -> Result<ModelInfo> {
    reader.seek(offset)?;
    let _size = reader.read_u32()?;
    let _model_offset = reader.read_i32()?;
    let scaling_rule = reader.read_u32()?;
    let texture_matrix_mode = reader.read_u32()?;
    let vertex_count = reader.read_u32()?;
    let face_count = reader.read_u32()?;
    let _original_path = reader.read_i32()?;
    let _matrix_count = reader.read_u32()?;
    let need_normal_matrix = reader.read_u8()? != 0;
    let need_texture_matrix = reader.read_u8()? != 0;
    let use_extents = reader.read_u8()? != 0;
    let envelope_mode = reader.read_u8()?;
    let table_offset = reader.read_i32()?;
    let minimum = read_vec3(reader)?;
    let maximum = read_vec3(reader)?;

    let mut matrix_table = Vec::new();
    if let Some(table) = reader.resolve(offset, table_offset)? {
        reader.seek(table)?;
        let count = reader.read_u32()? as usize;
        matrix_table.reserve(count.min(0x1000));
        for _ in 0..count {
            matrix_table.push(reader.read_i32()?);
        }
    }

    Ok(ModelInfo {
        scaling_rule,
        texture_matrix_mode,
        vertex_count,
        face_count,
        need_normal_matrix,
        need_texture_matrix,
        use_extents,
        envelope_mode,
        minimum,
        maximum,
        matrix_table,
    })
}

/// Read bone entries. Links between bones are offsets from the bone and are
/// mapped back to positions in the group.
fn read_bones(reader: &mut BinReader<'_>, entries: &[GroupEntry]) -> Result<Skeleton> {
    let starts = entries
        .iter()
        .map(|entry| entry_start(entry, Section::Bones))
        .collect::<Result<Vec<_>>>()?;
    let index_of: HashMap<usize, u16> = starts.iter().enumerate().map(|(i, &start)| (start, i as u16)).collect();
    let link = |entry: usize, relative: i32| -> Result<Option<BoneId>> {
        if relative == 0 {
            return Ok(None);
        }
        usize::try_from(entry as i64 + i64::from(relative))
            .ok()
            .and_then(|target| index_of.get(&target))
            .map(|&index| Some(BoneId(index)))
            .ok_or(Error::InvalidBoneIndex(relative))
    };

    let mut bones = Vec::with_capacity(starts.len());
    for &entry in &starts {
        reader.seek(entry)?;
        let _len = reader.read_u32()?;
        let _model_offset = reader.read_i32()?;
        let name_offset = reader.read_i32()?;
        let name = reader.read_name(entry, name_offset)?;
        let _index = reader.read_u32()?;
        let matrix_id = reader.read_u32()?;
        let flags = reader.read_u32()?;
        let billboard = reader.read_u32()?;
        let _billboard_parent = reader.read_u32()?;
        let scale = read_vec3(reader)?;
        let rotation = read_vec3(reader)?;
        let translation = read_vec3(reader)?;
        let minimum = read_vec3(reader)?;
        let maximum = read_vec3(reader)?;
        let parent = reader.read_i32()?;
        let first_child = reader.read_i32()?;
        let next_sibling = reader.read_i32()?;
        // previous sibling and user data are rebuilt on write
        bones.push(Bone {
            name,
            parent: link(entry, parent)?,
            first_child: link(entry, first_child)?,
            next_sibling: link(entry, next_sibling)?,
            matrix_id,
            flags,
            billboard,
            scale,
            rotation,
            translation,
            minimum,
            maximum,
        });
    }
    Skeleton::from_bones(bones)
}

fn read_point_group(reader: &mut BinReader<'_>, entry: usize, kind: AttributeKind) -> Result<PointGroup> {
    reader.seek(entry)?;
    let _len = reader.read_u32()?;
    let _model_offset = reader.read_i32()?;
    let data_offset = reader.read_i32()?;
    let name_offset = reader.read_i32()?;
    let name = reader.read_name(entry, name_offset)?;
    let _index = reader.read_u32()?;
    let width = kind.width_for_code(reader.read_u32()?)?;
    let format = PointFormat::from_u32(reader.read_u32()?)?;
    let divisor = reader.read_u8()?;
    let _stride = reader.read_u8()?;
    let count = usize::from(reader.read_u16()?);
    let (minimum, maximum) = match kind {
        AttributeKind::Vertex => (read_floats(reader, 3, width)?, read_floats(reader, 3, width)?),
        AttributeKind::Uv => (read_floats(reader, 2, width)?, read_floats(reader, 2, width)?),
        _ => (Vec::new(), Vec::new()),
    };

    let data = match reader.resolve(entry, data_offset)? {
        Some(offset) => {
            reader.seek(offset)?;
            reader.read_bytes(count * width * format.component_size())?.to_vec()
        }
        None => Vec::new(),
    };
    tracing::debug!("Read {} group {}: {} points as {:?}/{}", kind.label(), name, count, format, divisor);
    Ok(PointGroup {
        name,
        kind,
        width,
        format,
        divisor,
        count,
        minimum,
        maximum,
        data,
    })
}

fn read_color_group(reader: &mut BinReader<'_>, entry: usize) -> Result<ColorGroup> {
    reader.seek(entry)?;
    let _len = reader.read_u32()?;
    let _model_offset = reader.read_i32()?;
    let data_offset = reader.read_i32()?;
    let name_offset = reader.read_i32()?;
    let name = reader.read_name(entry, name_offset)?;
    let _index = reader.read_u32()?;
    let _has_alpha = reader.read_u32()?;
    let format = ColorFormat::try_from(reader.read_u32()?)?;
    let _stride = reader.read_u8()?;
    let _pad = reader.read_u8()?;
    let count = usize::from(reader.read_u16()?);
    let data = match reader.resolve(entry, data_offset)? {
        Some(offset) => {
            reader.seek(offset)?;
            reader.read_bytes(count * format.stride())?.to_vec()
        }
        None => Vec::new(),
    };
    Ok(ColorGroup {
        name,
        format,
        count,
        data,
    })
}

fn read_polygon(reader: &mut BinReader<'_>, entry: usize, version: u32, matrix_count: usize) -> Result<Polygon> {
    reader.seek(entry)?;
    let _len = reader.read_u32()?;
    let _model_offset = reader.read_i32()?;
    let linked_bone = BoneId::from_link(reader.read_i32()?, matrix_count)?;
    let low = reader.read_u32()?;
    let high = reader.read_u32()?;
    let _xf_spec = reader.read_u32()?;
    let _declaration_size = reader.read_u32()?;
    let _declaration_buffer = reader.read_u32()?;
    let _declaration_offset = reader.read_i32()?;
    let draw_base = reader.position();
    let draw_len = reader.read_u32()? as usize;
    let _draw_buffer = reader.read_u32()?;
    let draw_offset = reader.read_i32()?;
    let _array_flags = reader.read_u32()?;
    let _flags = reader.read_u32()?;
    let name_offset = reader.read_i32()?;
    let name = reader.read_name(entry, name_offset)?;
    let _index = reader.read_u32()?;
    let facepoint_count = reader.read_u32()?;
    let face_count = reader.read_u32()?;
    let vertex_group = reader.read_i16()?;
    let normal_group = reader.read_i16()?;
    let mut color_groups = [0i16; MAX_COLOR_SETS];
    for group in &mut color_groups {
        *group = reader.read_i16()?;
    }
    let mut uv_groups = [0i16; MAX_UV_SETS];
    for group in &mut uv_groups {
        *group = reader.read_i16()?;
    }
    if version >= 10 {
        let _fur_vector = reader.read_i16()?;
        let _fur_layer = reader.read_i16()?;
    }
    let matrix_offset = reader.read_i32()?;

    // Step 1: attribute slots from the vertex descriptor
    let attribute = |label: &str, code: u32, group: i16| -> Result<Option<AttributeRef>> {
        let Some(index_format) = IndexFormat::from_code(code)? else {
            return Ok(None);
        };
        let group = u16::try_from(group)
            .map_err(|_| Error::InvalidGeometry(format!("polygon {name} has {label} indices but no group")))?;
        Ok(Some(AttributeRef { group, index_format }))
    };
    let vertex = attribute("position", (low >> 9) & 0x3, vertex_group)?
        .ok_or_else(|| Error::InvalidGeometry(format!("polygon {name} has no vertices")))?;
    let normal = attribute("normal", (low >> 11) & 0x3, normal_group)?;
    let mut colors = [None; MAX_COLOR_SETS];
    for (i, (slot, &group)) in colors.iter_mut().zip(&color_groups).enumerate() {
        *slot = attribute("color", (low >> (13 + 2 * i)) & 0x3, group)?;
    }
    let mut uvs = [None; MAX_UV_SETS];
    for (i, (slot, &group)) in uvs.iter_mut().zip(&uv_groups).enumerate() {
        *slot = attribute("uv", (high >> (2 * i)) & 0x3, group)?;
    }

    // Step 2: matrices loaded by the draw commands
    let mut matrices = Vec::new();
    if let Some(table) = reader.resolve(entry, matrix_offset)? {
        reader.seek(table)?;
        let count = reader.read_u32()? as usize;
        matrices.reserve(count.min(0x100));
        for _ in 0..count {
            matrices.push(reader.read_u16()?);
        }
    }

    // Step 3: draw commands
    let bytes = match reader.resolve(draw_base, draw_offset)? {
        Some(offset) => {
            reader.seek(offset)?;
            reader.read_bytes(draw_len)?.to_vec()
        }
        None => Vec::new(),
    };

    Ok(Polygon {
        linked_bone,
        matrix_attributes: (low & 0x1FF) as u16,
        matrices,
        vertex,
        normal,
        colors,
        uvs,
        draw: DrawData {
            bytes,
            face_count,
            facepoint_count,
        },
        name,
    })
}

/// Decode a model whose generic header has already been read.
pub(crate) fn read_model(reader: &mut BinReader<'_>, header: &SubfileHeader) -> Result<Model> {
    let info_offset = header.start + header.kind.header_size(header.version);
    let mut model = Model::new(header.name.clone());
    model.info = read_info(reader, info_offset)?;

    // Step 1: index group of every present section
    let mut decoded = Vec::new();
    let mut kept = Vec::new();
    for section in Section::ALL {
        let Some(group) = section.index(header.version).and_then(|i| header.section(i)) else {
            continue;
        };
        let entries = read_group(reader, group)?;
        if section.is_supported() {
            decoded.push((section, entries));
        } else if section.is_kept() {
            kept.push((section, entries));
        } else {
            tracing::warn!("Skipping {} section of model {}", section.label(), model.name);
        }
    }

    // Step 2: bones first so polygons can validate their matrices
    if let Some((_, entries)) = decoded.iter().find(|(section, _)| *section == Section::Bones) {
        model.skeleton = read_bones(reader, entries)?;
    }
    let bone_count = model.skeleton.len() as i32;
    if model.info.matrix_table.iter().copied().eq(0..bone_count) {
        model.info.matrix_table.clear();
    }
    let matrix_count = model.matrix_count();

    // Step 3: groups and polygons
    for (section, entries) in &decoded {
        if *section == Section::Bones {
            continue;
        }
        for entry in entries {
            let start = entry_start(entry, *section)?;
            match section {
                Section::Vertices => model.vertices.push(read_point_group(reader, start, AttributeKind::Vertex)?),
                Section::Normals => model.normals.push(read_point_group(reader, start, AttributeKind::Normal)?),
                Section::Uvs => model.uvs.push(read_point_group(reader, start, AttributeKind::Uv)?),
                Section::Colors => model.colors.push(read_color_group(reader, start)?),
                Section::Objects => {
                    model
                        .polygons
                        .push(read_polygon(reader, start, header.version, matrix_count)?);
                }
                _ => {}
            }
        }
    }

    // Step 4: everything else rides along as bytes
    model.kept = read_raw_sections(reader, header.start, &model.name, kept)?;

    tracing::debug!(
        "Read model {}: {} polygons, {} bones, {} kept sections",
        model.name,
        model.polygons.len(),
        model.skeleton.len(),
        model.kept.len()
    );
    Ok(model)
}

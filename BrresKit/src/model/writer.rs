//! MDL0 serialization

#![allow(clippy::cast_possible_truncation)]

use glam::{Mat4, Vec3};

use super::bone::{BoneId, Skeleton};
use super::groups::{AttributeKind, ColorGroup, PointGroup};
use super::polygon::{Polygon, point_group};
use super::raw::{Placement, write_links};
use super::{INFO_SIZE, Model, Section};
use crate::binfile::{BinWriter, GroupSlots, write_group};
use crate::error::{Error, Result};
use crate::geometry::MAX_UV_SETS;
use crate::subfile::{SubfileKind, write_header};

/// Size of one bone entry.
const BONE_SIZE: usize = 0xD0;
/// Size of the vertex declaration block of a polygon.
const DECLARATION_SIZE: usize = 0xE0;
/// Buffer size recorded for the vertex declaration.
const DECLARATION_BUFFER: u32 = 0x80;

/// Order entries are laid out in. Index groups follow header order.
const ENTRY_ORDER: [Section; 14] = [
    Section::Definitions,
    Section::Bones,
    Section::Materials,
    Section::Shaders,
    Section::Objects,
    Section::Vertices,
    Section::Normals,
    Section::Colors,
    Section::Uvs,
    Section::FurVectors,
    Section::FurLayers,
    Section::Textures,
    Section::Palettes,
    Section::UserData,
];

fn write_vec3(writer: &mut BinWriter, v: Vec3) {
    writer.write_f32(v.x);
    writer.write_f32(v.y);
    writer.write_f32(v.z);
}

/// Write `values` padded with zeros to `count` floats.
fn write_floats(writer: &mut BinWriter, values: &[f32], count: usize) {
    for i in 0..count {
        writer.write_f32(values.get(i).copied().unwrap_or(0.0));
    }
}

/// Write the upper three rows of `matrix`, row by row.
fn write_matrix(writer: &mut BinWriter, matrix: Mat4) {
    for row in 0..3 {
        for column in 0..4 {
            writer.write_f32(matrix.col(column)[row]);
        }
    }
}

fn write_info(writer: &mut BinWriter, model: &Model, model_start: usize) {
    let info = &model.info;
    let start = writer.position();
    let table: Vec<i32> = if info.matrix_table.is_empty() {
        (0..model.skeleton.len() as i32).collect()
    } else {
        info.matrix_table.clone()
    };

    writer.write_u32(INFO_SIZE as u32);
    writer.write_i32(model_start as i32 - start as i32);
    writer.write_u32(info.scaling_rule);
    writer.write_u32(info.texture_matrix_mode);
    writer.write_u32(info.vertex_count);
    writer.write_u32(info.face_count);
    writer.write_u32(0);
    writer.write_u32(table.len() as u32);
    writer.write_u8(u8::from(info.need_normal_matrix));
    writer.write_u8(u8::from(info.need_texture_matrix));
    writer.write_u8(u8::from(info.use_extents));
    writer.write_u8(info.envelope_mode);
    // matrix table follows the block
    writer.write_u32(INFO_SIZE as u32);
    write_vec3(writer, info.minimum);
    write_vec3(writer, info.maximum);

    writer.write_u32(table.len() as u32);
    for id in table {
        writer.write_i32(id);
    }
}

/// Write every bone, then point the hierarchy links at their entries.
fn write_bones(writer: &mut BinWriter, skeleton: &Skeleton, group: &GroupSlots, model_start: usize) -> Result<()> {
    let bones = skeleton.bones();
    let mut positions = Vec::with_capacity(bones.len());
    let mut slots = Vec::with_capacity(bones.len());

    // Step 1: entries with zeroed links
    for (i, bone) in bones.iter().enumerate() {
        writer.align(4);
        group.patch(writer, i);
        let entry = writer.position();
        positions.push(entry);
        writer.write_u32(BONE_SIZE as u32);
        writer.write_i32(model_start as i32 - entry as i32);
        writer.write_name_ref(entry, &bone.name);
        writer.write_u32(i as u32);
        writer.write_u32(bone.matrix_id);
        writer.write_u32(bone.flags);
        writer.write_u32(bone.billboard);
        writer.write_u32(0);
        write_vec3(writer, bone.scale);
        write_vec3(writer, bone.rotation);
        write_vec3(writer, bone.translation);
        write_vec3(writer, bone.minimum);
        write_vec3(writer, bone.maximum);
        slots.push([writer.reserve(), writer.reserve(), writer.reserve(), writer.reserve()]);
        writer.write_u32(0);
        let world = skeleton.world_matrix(BoneId(i as u16))?;
        write_matrix(writer, world);
        write_matrix(writer, world.inverse());
    }

    // Step 2: parent, first child, next and previous sibling
    let mut previous = vec![None; bones.len()];
    for (i, bone) in bones.iter().enumerate() {
        if let Some(next) = bone.next_sibling {
            if let Some(slot) = previous.get_mut(next.index()) {
                *slot = Some(BoneId(i as u16));
            }
        }
    }
    for (i, bone) in bones.iter().enumerate() {
        let targets = [bone.parent, bone.first_child, bone.next_sibling, previous[i]];
        for (&slot, target) in slots[i].iter().zip(targets) {
            let Some(target) = target else {
                continue;
            };
            let to = positions
                .get(target.index())
                .ok_or(Error::InvalidBoneIndex(i32::from(target.0)))?;
            writer.patch_i32(slot, *to as i32 - positions[i] as i32);
        }
    }
    Ok(())
}

fn write_point_group(writer: &mut BinWriter, group: &PointGroup, index: usize, model_start: usize) -> Result<()> {
    let entry = writer.position();
    let len = writer.reserve();
    writer.write_i32(model_start as i32 - entry as i32);
    let data = writer.reserve();
    writer.write_name_ref(entry, &group.name);
    writer.write_u32(index as u32);
    writer.write_u32(group.kind.component_code(group.width)?);
    writer.write_u32(group.format as u32);
    writer.write_u8(group.divisor);
    writer.write_u8(group.stride() as u8);
    writer.write_u16(group.count as u16);
    match group.kind {
        AttributeKind::Vertex => {
            write_floats(writer, &group.minimum, 3);
            write_floats(writer, &group.maximum, 3);
        }
        AttributeKind::Uv => {
            write_floats(writer, &group.minimum, 2);
            write_floats(writer, &group.maximum, 2);
        }
        _ => {}
    }
    writer.align(0x20);
    writer.patch_offset(data, entry);
    writer.write_bytes(&group.data);
    writer.patch_length(len, entry);
    Ok(())
}

fn write_color_group(writer: &mut BinWriter, group: &ColorGroup, index: usize, model_start: usize) {
    let entry = writer.position();
    let len = writer.reserve();
    writer.write_i32(model_start as i32 - entry as i32);
    let data = writer.reserve();
    writer.write_name_ref(entry, &group.name);
    writer.write_u32(index as u32);
    writer.write_u32(u32::from(group.has_alpha()));
    writer.write_u32(group.format as u32);
    writer.write_u8(group.format.stride() as u8);
    writer.write_u8(0);
    writer.write_u16(group.count as u16);
    writer.align(0x20);
    writer.patch_offset(data, entry);
    writer.write_bytes(&group.data);
    writer.patch_length(len, entry);
}

/// Vertex attribute table words A, B and C for the groups `polygon` uses.
fn vertex_formats(model: &Model, polygon: &Polygon) -> Result<[u32; 3]> {
    let vertex = point_group(&model.vertices, polygon, AttributeKind::Vertex, polygon.vertex.group)?;
    let mut a = u32::from(vertex.width == 3) | (vertex.format as u32) << 1 | u32::from(vertex.divisor & 0x1F) << 4;
    if let Some(normal) = polygon.normal {
        let normal = point_group(&model.normals, polygon, AttributeKind::Normal, normal.group)?;
        a |= u32::from(normal.width == 9) << 9 | (normal.format as u32) << 10;
    }
    for (i, color) in polygon.colors.iter().enumerate() {
        let Some(color) = color else {
            continue;
        };
        let group = model.colors.get(usize::from(color.group)).ok_or_else(|| Error::MissingGroup {
            polygon: polygon.name.clone(),
            attribute: AttributeKind::Color.label(),
            index: usize::from(color.group),
        })?;
        a |= (u32::from(group.has_alpha()) | (group.format as u32) << 1) << (13 + 4 * i);
    }

    // nine bits per set: count, format, shift
    let mut uv = [0u32; MAX_UV_SETS];
    for (field, slot) in uv.iter_mut().zip(&polygon.uvs) {
        if let Some(slot) = slot {
            let group = point_group(&model.uvs, polygon, AttributeKind::Uv, slot.group)?;
            *field = u32::from(group.width == 2) | (group.format as u32) << 1 | u32::from(group.divisor & 0x1F) << 4;
        }
    }
    a |= uv[0] << 21 | 1 << 30;
    let b = uv[1] | uv[2] << 9 | uv[3] << 18 | (uv[4] & 0xF) << 27 | 1 << 31;
    let c = uv[4] >> 4 | uv[5] << 5 | uv[6] << 14 | uv[7] << 23;
    Ok([a, b, c])
}

/// Load one command processor register.
fn write_cp(writer: &mut BinWriter, register: u8, value: u32) {
    writer.write_u8(0x08);
    writer.write_u8(register);
    writer.write_u32(value);
}

/// Vertex descriptor and attribute table loads, padded to their block.
fn write_declaration(writer: &mut BinWriter, model: &Model, polygon: &Polygon) -> Result<()> {
    let start = writer.position();
    write_cp(writer, 0x50, polygon.descriptor_low());
    write_cp(writer, 0x60, polygon.descriptor_high());
    // transform unit register 0x1008
    writer.write_u8(0x10);
    writer.write_u16(0);
    writer.write_u16(0x1008);
    writer.write_u32(polygon.xf_spec());
    writer.align(0x20);

    let [a, b, c] = vertex_formats(model, polygon)?;
    write_cp(writer, 0x70, a);
    write_cp(writer, 0x80, b);
    write_cp(writer, 0x90, c);
    let padding = start + DECLARATION_SIZE - writer.position();
    writer.write_bytes(&vec![0; padding]);
    Ok(())
}

fn write_polygon(
    writer: &mut BinWriter,
    model: &Model,
    polygon: &Polygon,
    index: usize,
    model_start: usize,
) -> Result<()> {
    let entry = writer.position();
    let len = writer.reserve();
    writer.write_i32(model_start as i32 - entry as i32);
    writer.write_i32(BoneId::to_link(polygon.linked_bone));
    writer.write_u32(polygon.descriptor_low());
    writer.write_u32(polygon.descriptor_high());
    writer.write_u32(polygon.xf_spec());

    let declaration_base = writer.position();
    writer.write_u32(DECLARATION_SIZE as u32);
    writer.write_u32(DECLARATION_BUFFER);
    let declaration = writer.reserve();
    let draw_base = writer.position();
    writer.write_u32(polygon.draw.bytes.len() as u32);
    writer.write_u32(polygon.draw.bytes.len() as u32);
    let draw = writer.reserve();

    writer.write_u32(polygon.array_flags());
    writer.write_u32(0);
    writer.write_name_ref(entry, &polygon.name);
    writer.write_u32(index as u32);
    writer.write_u32(polygon.draw.facepoint_count);
    writer.write_u32(polygon.draw.face_count);

    // Group index per slot, -1 when unused
    writer.write_i16(polygon.vertex.group as i16);
    writer.write_i16(polygon.normal.map_or(-1, |n| n.group as i16));
    for slot in polygon.colors.iter().chain(&polygon.uvs) {
        writer.write_i16(slot.map_or(-1, |s| s.group as i16));
    }
    // no fur
    writer.write_i16(-1);
    writer.write_i16(-1);
    let matrices = writer.reserve();

    writer.patch_offset(matrices, entry);
    writer.write_u32(polygon.matrices.len() as u32);
    for &id in &polygon.matrices {
        writer.write_u16(id);
    }

    writer.align(0x20);
    writer.patch_offset(declaration, declaration_base);
    write_declaration(writer, model, polygon)?;

    writer.align(0x20);
    if !polygon.draw.bytes.is_empty() {
        writer.patch_offset(draw, draw_base);
        writer.write_bytes(&polygon.draw.bytes);
    }
    writer.patch_length(len, entry);
    Ok(())
}

/// Entry names of `section`, in group order.
fn entry_names(model: &Model, section: Section) -> Vec<&str> {
    match section {
        Section::Bones => model.skeleton.bones().iter().map(|b| b.name.as_str()).collect(),
        Section::Vertices => model.vertices.iter().map(|g| g.name.as_str()).collect(),
        Section::Normals => model.normals.iter().map(|g| g.name.as_str()).collect(),
        Section::Colors => model.colors.iter().map(|g| g.name.as_str()).collect(),
        Section::Uvs => model.uvs.iter().map(|g| g.name.as_str()).collect(),
        Section::Objects => model.polygons.iter().map(|p| p.name.as_str()).collect(),
        _ => model
            .kept_section(section)
            .map(|raw| raw.entries.iter().map(|e| e.name.as_str()).collect())
            .unwrap_or_default(),
    }
}

/// Serialize `model` at the writer's current position.
///
/// Names are left pending for the container's string table.
pub(crate) fn write_model(writer: &mut BinWriter, model: &Model, container_start: usize) -> Result<()> {
    let header = write_header(writer, SubfileKind::Model, &model.name, container_start);
    let model_start = header.start;
    let version = SubfileKind::Model.current_version();

    // Step 1: info block and matrix table
    write_info(writer, model, model_start);

    // Step 2: an index group per non-empty section
    let mut groups: Vec<(Section, GroupSlots)> = Vec::new();
    for section in Section::ALL {
        let names = entry_names(model, section);
        let Some(index) = section.index(version).filter(|_| !names.is_empty()) else {
            continue;
        };
        writer.align(4);
        header.patch_section(writer, index);
        groups.push((section, write_group(writer, &names)));
    }

    // Step 3: entries
    let mut placement = Placement::new();
    for section in ENTRY_ORDER {
        let Some((_, group)) = groups.iter().find(|(s, _)| *s == section) else {
            continue;
        };
        let place = |writer: &mut BinWriter, i: usize| {
            writer.align(0x20);
            group.patch(writer, i);
        };
        match section {
            Section::Bones => write_bones(writer, &model.skeleton, group, model_start)?,
            Section::Vertices => {
                for (i, g) in model.vertices.iter().enumerate() {
                    place(writer, i);
                    write_point_group(writer, g, i, model_start)?;
                }
            }
            Section::Normals => {
                for (i, g) in model.normals.iter().enumerate() {
                    place(writer, i);
                    write_point_group(writer, g, i, model_start)?;
                }
            }
            Section::Uvs => {
                for (i, g) in model.uvs.iter().enumerate() {
                    place(writer, i);
                    write_point_group(writer, g, i, model_start)?;
                }
            }
            Section::Colors => {
                for (i, g) in model.colors.iter().enumerate() {
                    place(writer, i);
                    write_color_group(writer, g, i, model_start);
                }
            }
            Section::Objects => {
                for (i, polygon) in model.polygons.iter().enumerate() {
                    place(writer, i);
                    write_polygon(writer, model, polygon, i, model_start)?;
                }
            }
            _ => {
                let Some(raw) = model.kept_section(section) else {
                    continue;
                };
                // definitions and link tables are packed
                let alignment = match section {
                    Section::Definitions | Section::Textures | Section::Palettes => 4,
                    _ => 0x20,
                };
                for (i, entry) in raw.entries.iter().enumerate() {
                    writer.align(alignment);
                    group.patch(writer, i);
                    placement.insert((section, i), writer.position());
                    writer.write_bytes(&entry.bytes);
                }
            }
        }
    }

    // Step 4: offsets inside kept entries
    write_links(writer, &model.kept, &placement, model_start)?;

    writer.align(0x20);
    header.finish(writer);
    tracing::debug!(
        "Wrote model {}: {} polygons, {} kept sections, {} bytes",
        model.name,
        model.polygons.len(),
        model.kept.len(),
        writer.position() - model_start
    );
    Ok(())
}

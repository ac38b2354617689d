//! Polygons and the geometry encode/decode pipeline
//!
//! Encoding runs every attribute through its quantizer, gathers the remapped
//! indices into facepoints and strip-packs the triangles. Decoding expands the
//! draw commands and looks the indices back up in the groups.

use super::bone::BoneId;
use super::groups::{AttributeKind, ColorGroup, PointGroup};
use super::Model;
use crate::error::{Error, Result};
use crate::fixup::{Fixup, FixupKind};
use crate::geometry::{
    ColorCollection, DrawData, EncodedPoints, FacePoint, Geometry, IndexFormat, MAX_UV_SETS, PointCollection,
    Triangle, encode_triangles, strip::decode_with_direct,
};
use crate::options::CodecOptions;

/// Most color sets a polygon can reference.
pub const MAX_COLOR_SETS: usize = 2;

/// A polygon's link to one attribute group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRef {
    /// Index into the model's group list for the attribute.
    pub group: u16,
    pub index_format: IndexFormat,
}

/// One draw block of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub name: String,
    /// Matrix the polygon is drawn with. With one matrix per bone this is
    /// the bone index.
    pub linked_bone: Option<BoneId>,
    /// Direct matrix indices ahead of each facepoint: bit 0 for the position
    /// matrix, bits 1 to 8 for the texture matrices.
    pub matrix_attributes: u16,
    /// Matrices loaded by the draw commands.
    pub matrices: Vec<u16>,
    pub vertex: AttributeRef,
    pub normal: Option<AttributeRef>,
    /// Color sets by slot.
    pub colors: [Option<AttributeRef>; MAX_COLOR_SETS],
    /// Texture coordinate sets by slot.
    pub uvs: [Option<AttributeRef>; MAX_UV_SETS],
    pub draw: DrawData,
}

/// Number of slots in use, counting gaps below the highest one.
fn slots_used(slots: &[Option<AttributeRef>]) -> u32 {
    slots.iter().rposition(Option::is_some).map_or(0, |last| last as u32 + 1)
}

impl Polygon {
    /// Index widths in facepoint order: vertex, normal, colors, then UVs.
    #[must_use]
    pub fn index_formats(&self) -> Vec<IndexFormat> {
        std::iter::once(self.vertex)
            .chain(self.normal)
            .chain(self.colors.iter().flatten().copied())
            .chain(self.uvs.iter().flatten().copied())
            .map(|a| a.index_format)
            .collect()
    }

    /// Bytes of direct matrix indices ahead of every facepoint.
    #[must_use]
    pub fn direct_size(&self) -> usize {
        (self.matrix_attributes & 0x1FF).count_ones() as usize
    }

    /// Low vertex descriptor word: matrix indices in bits 0 to 8, then two
    /// bits each for position, normal and both colors.
    #[must_use]
    pub fn descriptor_low(&self) -> u32 {
        let mut word = u32::from(self.matrix_attributes & 0x1FF);
        word |= self.vertex.index_format.code() << 9;
        if let Some(normal) = self.normal {
            word |= normal.index_format.code() << 11;
        }
        for (i, color) in self.colors.iter().enumerate() {
            if let Some(color) = color {
                word |= color.index_format.code() << (13 + 2 * i);
            }
        }
        word
    }

    /// High vertex descriptor word: two bits per texture coordinate set.
    #[must_use]
    pub fn descriptor_high(&self) -> u32 {
        self.uvs
            .iter()
            .enumerate()
            .filter_map(|(i, uv)| uv.map(|uv| uv.index_format.code() << (2 * i)))
            .fold(0, |word, bits| word | bits)
    }

    /// Transform unit input spec: color count, normal mode, texture
    /// coordinate count.
    #[must_use]
    pub fn xf_spec(&self) -> u32 {
        let normals = match self.normal {
            Some(_) => 1,
            None => 0,
        };
        slots_used(&self.colors) | normals << 2 | slots_used(&self.uvs) << 4
    }

    /// Array flags: matrix indices, then one bit per present attribute.
    #[must_use]
    pub fn array_flags(&self) -> u32 {
        let mut flags = u32::from(self.matrix_attributes & 0x1FF) | 1 << 9;
        if self.normal.is_some() {
            flags |= 1 << 10;
        }
        for (i, color) in self.colors.iter().enumerate() {
            if color.is_some() {
                flags |= 1 << (11 + i);
            }
        }
        for (i, uv) in self.uvs.iter().enumerate() {
            if uv.is_some() {
                flags |= 1 << (13 + i);
            }
        }
        flags
    }

    #[must_use]
    pub fn face_count(&self) -> u32 {
        self.draw.face_count
    }

    #[must_use]
    pub fn facepoint_count(&self) -> u32 {
        self.draw.facepoint_count
    }
}

/// Result of adding geometry to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryAdded {
    /// Index of the new polygon.
    pub polygon: usize,
    pub fixups: Vec<Fixup>,
}

fn check_faces(label: &str, faces: usize, expected: usize) -> Result<()> {
    if faces == expected {
        Ok(())
    } else {
        Err(Error::InvalidGeometry(format!(
            "{label} has {faces} faces, vertices have {expected}"
        )))
    }
}

fn group_index(kind: AttributeKind, len: usize) -> Result<u16> {
    if len >= i16::MAX as usize {
        return Err(Error::InvalidGeometry(format!("too many {} groups", kind.label())));
    }
    Ok(len as u16)
}

/// Pick the index width for a group and note when it needs 16 bits.
fn index_format(subject: &str, kind: AttributeKind, count: usize, fixups: &mut Vec<Fixup>) -> Result<IndexFormat> {
    let format = IndexFormat::for_count(kind.label(), count)?;
    if format == IndexFormat::Short {
        let fixup = Fixup::new(
            subject,
            FixupKind::ShortIndices {
                attribute: kind.label(),
                count,
            },
            true,
        );
        fixup.log();
        fixups.push(fixup);
    }
    Ok(format)
}

/// Encode `geometry` into new groups and a new polygon of `model`.
///
/// The model is only modified once everything has been encoded.
pub(crate) fn encode_geometry(model: &mut Model, geometry: &Geometry, options: &CodecOptions) -> Result<GeometryAdded> {
    let name = geometry.name.as_str();
    if model.polygons.iter().any(|p| p.name == name) {
        return Err(Error::DuplicateResource(name.to_string()));
    }
    if geometry.uvs.len() > MAX_UV_SETS {
        return Err(Error::InvalidGeometry(format!(
            "{} texture coordinate sets, at most {MAX_UV_SETS} are supported",
            geometry.uvs.len()
        )));
    }
    if let Some(bone) = geometry.linked_bone {
        if usize::from(bone) >= model.skeleton.len() {
            return Err(Error::InvalidBoneIndex(i32::from(bone)));
        }
    }

    let face_count = geometry.face_count();
    let normals = geometry.normals.as_ref().filter(|_| !options.skip_normals);
    let colors = geometry.colors.as_ref().filter(|_| !options.skip_colors);

    AttributeKind::Vertex.component_code(geometry.vertices.width())?;
    if let Some(normals) = normals {
        AttributeKind::Normal.component_code(normals.width())?;
        check_faces("normals", normals.faces().len(), face_count)?;
    }
    if let Some(colors) = colors {
        check_faces("colors", colors.faces().len(), face_count)?;
    }
    for uv in &geometry.uvs {
        AttributeKind::Uv.component_code(uv.width())?;
        check_faces("uvs", uv.faces().len(), face_count)?;
    }

    // Step 1: quantize every attribute
    let vertex = geometry.vertices.encode();
    let normal = normals.map(PointCollection::encode);
    let color = colors.map(ColorCollection::encode);
    let uvs: Vec<EncodedPoints> = geometry.uvs.iter().map(PointCollection::encode).collect();

    // Step 2: index widths, in facepoint order
    let mut fixups = Vec::new();
    let vertex_format = index_format(name, AttributeKind::Vertex, vertex.count, &mut fixups)?;
    let normal_format = normal
        .as_ref()
        .map(|n| index_format(name, AttributeKind::Normal, n.count, &mut fixups))
        .transpose()?;
    let color_format = color
        .as_ref()
        .map(|c| index_format(name, AttributeKind::Color, c.count, &mut fixups))
        .transpose()?;
    let uv_formats = uvs
        .iter()
        .map(|uv| index_format(name, AttributeKind::Uv, uv.count, &mut fixups))
        .collect::<Result<Vec<_>>>()?;

    let formats: Vec<IndexFormat> = std::iter::once(vertex_format)
        .chain(normal_format)
        .chain(color_format)
        .chain(uv_formats.iter().copied())
        .collect();
    let face_lists: Vec<&[[u32; 3]]> = std::iter::once(vertex.faces.as_slice())
        .chain(normal.as_ref().map(|n| n.faces.as_slice()))
        .chain(color.as_ref().map(|c| c.faces.as_slice()))
        .chain(uvs.iter().map(|uv| uv.faces.as_slice()))
        .collect();

    // Step 3: strip-pack the facepoints
    let triangles: Vec<Triangle> = (0..face_count)
        .map(|face| {
            let corner = |c: usize| -> FacePoint { face_lists.iter().map(|faces| faces[face][c]).collect() };
            [corner(0), corner(1), corner(2)]
        })
        .collect();
    let draw = encode_triangles(&triangles, &formats)?;

    // Step 4: commit groups and polygon
    let vertex_group = group_index(AttributeKind::Vertex, model.vertices.len())?;
    let normal_group = group_index(AttributeKind::Normal, model.normals.len())?;
    let color_group = group_index(AttributeKind::Color, model.colors.len())?;
    let uv_base = group_index(AttributeKind::Uv, model.uvs.len() + uvs.len())? - uvs.len() as u16;

    model
        .vertices
        .push(PointGroup::from_encoded(name, AttributeKind::Vertex, &vertex));
    let vertex_ref = AttributeRef {
        group: vertex_group,
        index_format: vertex_format,
    };

    let mut normal_ref = None;
    if let (Some(encoded), Some(index_format)) = (&normal, normal_format) {
        model
            .normals
            .push(PointGroup::from_encoded(name, AttributeKind::Normal, encoded));
        normal_ref = Some(AttributeRef {
            group: normal_group,
            index_format,
        });
    }

    let mut color_refs = [None; MAX_COLOR_SETS];
    if let (Some(encoded), Some(index_format)) = (&color, color_format) {
        model.colors.push(ColorGroup::from_encoded(name, encoded));
        color_refs[0] = Some(AttributeRef {
            group: color_group,
            index_format,
        });
    }

    let mut uv_refs = [None; MAX_UV_SETS];
    for (((encoded, &index_format), group), slot) in uvs.iter().zip(&uv_formats).zip(uv_base..).zip(&mut uv_refs) {
        model
            .uvs
            .push(PointGroup::from_encoded(format!("#{group}"), AttributeKind::Uv, encoded));
        *slot = Some(AttributeRef { group, index_format });
    }

    tracing::debug!(
        "Encoded polygon {}: {} faces, {} facepoints, {} vertices",
        name,
        draw.face_count,
        draw.facepoint_count,
        vertex.count
    );

    model.polygons.push(Polygon {
        name: name.to_string(),
        linked_bone: geometry.linked_bone.map(BoneId),
        matrix_attributes: 0,
        matrices: Vec::new(),
        vertex: vertex_ref,
        normal: normal_ref,
        colors: color_refs,
        uvs: uv_refs,
        draw,
    });
    model.rebuild_header();

    Ok(GeometryAdded {
        polygon: model.polygons.len() - 1,
        fixups,
    })
}

pub(super) fn point_group<'m>(
    groups: &'m [PointGroup],
    polygon: &Polygon,
    attribute: AttributeKind,
    index: u16,
) -> Result<&'m PointGroup> {
    groups.get(usize::from(index)).ok_or_else(|| Error::MissingGroup {
        polygon: polygon.name.clone(),
        attribute: attribute.label(),
        index: usize::from(index),
    })
}

/// Expand a polygon back into raw attribute arrays.
pub(crate) fn decode_polygon(model: &Model, polygon: &Polygon, options: &CodecOptions) -> Result<Geometry> {
    let formats = polygon.index_formats();
    let triangles = decode_with_direct(&polygon.draw.bytes, polygon.direct_size(), &formats)?;
    let faces_for = |slot: usize| -> Vec<[u32; 3]> {
        triangles
            .iter()
            .map(|t| [t[0][slot], t[1][slot], t[2][slot]])
            .collect()
    };
    let mut slot = 0;

    let group = point_group(&model.vertices, polygon, AttributeKind::Vertex, polygon.vertex.group)?;
    let vertices = PointCollection::new(group.width, group.decode()?, faces_for(slot))?;
    let mut geometry = Geometry::new(polygon.name.clone(), vertices);
    slot += 1;

    if let Some(normal) = polygon.normal {
        if !options.skip_normals {
            let group = point_group(&model.normals, polygon, AttributeKind::Normal, normal.group)?;
            geometry.normals = Some(PointCollection::new(group.width, group.decode()?, faces_for(slot))?);
        }
        slot += 1;
    }

    if let Some(color) = polygon.colors.iter().flatten().next().filter(|_| !options.skip_colors) {
        let group = model
            .colors
            .get(usize::from(color.group))
            .ok_or_else(|| Error::MissingGroup {
                polygon: polygon.name.clone(),
                attribute: AttributeKind::Color.label(),
                index: usize::from(color.group),
            })?;
        geometry.colors = Some(ColorCollection::new(group.decode()?, faces_for(slot), group.format)?);
    }
    slot += polygon.colors.iter().flatten().count();

    for uv in polygon.uvs.iter().flatten() {
        let group = point_group(&model.uvs, polygon, AttributeKind::Uv, uv.group)?;
        geometry
            .uvs
            .push(PointCollection::new(group.width, group.decode()?, faces_for(slot))?);
        slot += 1;
    }

    geometry.linked_bone = polygon.linked_bone.map(|b| b.0);
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ColorFormat;

    fn quad() -> Geometry {
        let vertices = PointCollection::from_points(
            &[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2], [0, 2, 3]],
        )
        .unwrap();
        let normals = PointCollection::from_points(&[[0.0f32, 0.0, 1.0]], vec![[0, 0, 0], [0, 0, 0]]).unwrap();
        let uvs = PointCollection::from_points(
            &[[0.0f32, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            vec![[0, 1, 2], [0, 2, 3]],
        )
        .unwrap();
        let colors = ColorCollection::new(
            vec![[255, 0, 0, 255], [0, 255, 0, 255]],
            vec![[0, 0, 1], [0, 1, 1]],
            ColorFormat::Rgba8,
        )
        .unwrap();
        Geometry::new("quad", vertices)
            .with_normals(normals)
            .with_colors(colors)
            .with_uvs(uvs)
    }

    #[test]
    fn test_add_geometry_creates_groups() {
        let mut model = Model::new("kart");
        let added = model.add_geometry(&quad(), &CodecOptions::default()).unwrap();
        assert_eq!(added.polygon, 0);
        assert!(added.fixups.is_empty());
        assert_eq!(model.vertices.len(), 1);
        assert_eq!(model.uvs[0].name, "#0");

        let polygon = &model.polygons[0];
        assert_eq!(polygon.face_count(), 2);
        assert_eq!(polygon.facepoint_count(), 4);
        assert_eq!(polygon.index_formats(), vec![IndexFormat::Byte; 4]);
        // vertex, normal, color0 and uv0 all use 8-bit indices
        assert_eq!(polygon.descriptor_low(), 0x2 << 9 | 0x2 << 11 | 0x2 << 13);
        assert_eq!(polygon.descriptor_high(), 0x2);
        assert_eq!(polygon.xf_spec(), 1 | 1 << 2 | 1 << 4);
        assert_eq!(polygon.array_flags(), 1 << 9 | 1 << 10 | 1 << 11 | 1 << 13);
        assert_eq!(model.info.face_count, 2);
        assert_eq!(model.info.vertex_count, 4);
    }

    #[test]
    fn test_decode_polygon_restores_attributes() {
        let mut model = Model::new("kart");
        let geometry = quad();
        model.add_geometry(&geometry, &CodecOptions::default()).unwrap();
        let decoded = model.decode_polygon(0, &CodecOptions::default()).unwrap();

        assert_eq!(decoded.face_count(), 2);
        for face in 0..2 {
            // strips may start a triangle at any corner; the winding is kept
            let original = corners(&geometry, face);
            let restored = corners(&decoded, face);
            assert!(
                (0..3).any(|r| (0..3).all(|c| restored[(c + r) % 3] == original[c])),
                "face {face}: {restored:?} is not a rotation of {original:?}"
            );
        }
    }

    /// Looked-up position and color of each corner of a face.
    fn corners(geometry: &Geometry, face: usize) -> Vec<(Vec<f32>, [u8; 4])> {
        let colors = geometry.colors.as_ref().unwrap();
        (0..3)
            .map(|corner| {
                let vertex = geometry.vertices.faces()[face][corner] as usize;
                let color = colors.faces()[face][corner] as usize;
                (geometry.vertices.point(vertex).to_vec(), colors.colors()[color])
            })
            .collect()
    }

    #[test]
    fn test_uv_slot_gap() {
        let mut model = Model::new("kart");
        model.add_geometry(&quad(), &CodecOptions::default()).unwrap();
        let polygon = &mut model.polygons[0];
        polygon.uvs.swap(0, 1);
        assert_eq!(polygon.descriptor_high(), 0x2 << 2);
        // a gap still counts toward the coordinate total
        assert_eq!(polygon.xf_spec() >> 4, 2);
        let decoded = model.decode_polygon(0, &CodecOptions::default()).unwrap();
        assert_eq!(decoded.uvs.len(), 1);
        assert_eq!(decoded.uvs[0].faces().len(), 2);
    }

    #[test]
    fn test_skip_options() {
        let mut model = Model::new("kart");
        let options = CodecOptions::default().no_normals().no_colors();
        model.add_geometry(&quad(), &options).unwrap();
        assert!(model.normals.is_empty());
        assert!(model.colors.is_empty());
        let decoded = model.decode_polygon(0, &CodecOptions::default()).unwrap();
        assert!(decoded.normals.is_none());
        assert_eq!(decoded.uvs.len(), 1);
    }

    #[test]
    fn test_mismatched_face_counts() {
        let mut geometry = quad();
        geometry.uvs[0] = PointCollection::from_points(&[[0.0f32, 0.0]], vec![[0, 0, 0]]).unwrap();
        let mut model = Model::new("kart");
        assert!(matches!(
            model.add_geometry(&geometry, &CodecOptions::default()),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(model.vertices.is_empty());
    }

    #[test]
    fn test_short_indices_reported() {
        let points: Vec<[f32; 3]> = (0..300).map(|i| [i as f32, 0.0, (i % 7) as f32]).collect();
        let faces: Vec<[u32; 3]> = (0..100).map(|i| [i * 3, i * 3 + 1, i * 3 + 2]).collect();
        let vertices = PointCollection::from_points(&points, faces).unwrap();
        let mut model = Model::new("kart");
        let added = model
            .add_geometry(&Geometry::new("wide", vertices), &CodecOptions::default())
            .unwrap();
        assert_eq!(
            added.fixups,
            vec![Fixup::new(
                "wide",
                FixupKind::ShortIndices {
                    attribute: "vertex",
                    count: 300
                },
                true
            )]
        );
        assert_eq!(model.polygons[0].vertex.index_format, IndexFormat::Short);
    }

    #[test]
    fn test_missing_group() {
        let mut model = Model::new("kart");
        model.add_geometry(&quad(), &CodecOptions::default()).unwrap();
        model.polygons[0].vertex.group = 5;
        assert!(matches!(
            model.decode_polygon(0, &CodecOptions::default()),
            Err(Error::MissingGroup { attribute: "vertex", index: 5, .. })
        ));
    }
}

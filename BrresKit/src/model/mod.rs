//! MDL0 model resource
//!
//! A model owns its attribute groups, polygons and skeleton. Polygons refer to
//! groups by index, so groups may be shared between polygons.
//!
//! Section table of the generic header, by version:
//!
//! | index | v10/v11        | v8/v9       |
//! |-------|----------------|-------------|
//! | 0     | definitions    | definitions |
//! | 1     | bones          | bones       |
//! | 2     | vertices       | vertices    |
//! | 3     | normals        | normals     |
//! | 4     | colors         | colors      |
//! | 5     | uvs            | uvs         |
//! | 6     | fur vectors    | materials   |
//! | 7     | fur layers     | shaders     |
//! | 8     | materials      | objects     |
//! | 9     | shaders        | textures    |
//! | 10    | objects        | palettes    |
//! | 11    | textures       |             |
//! | 12    | palettes       |             |
//! | 13    | user data      |             |

mod bone;
mod groups;
mod polygon;
mod raw;
mod reader;
mod writer;

pub use bone::{BONE_IDENTITY, BONE_VISIBLE, Bone, BoneId, Skeleton};
pub use groups::{AttributeKind, ColorGroup, PointGroup};
pub use polygon::{AttributeRef, GeometryAdded, MAX_COLOR_SETS, Polygon};
pub use raw::{Link, LinkTarget, RawEntry, RawSection};
pub(crate) use reader::read_model;
pub(crate) use writer::write_model;

use glam::Vec3;

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::options::CodecOptions;

/// Size of the model info block that follows the generic header.
pub const INFO_SIZE: usize = 0x40;

/// Sections of a model, independent of the version's index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Definitions,
    Bones,
    Vertices,
    Normals,
    Colors,
    Uvs,
    FurVectors,
    FurLayers,
    Materials,
    Shaders,
    Objects,
    Textures,
    Palettes,
    UserData,
}

impl Section {
    /// Sections in v10/v11 header order.
    pub const ALL: [Self; 14] = [
        Self::Definitions,
        Self::Bones,
        Self::Vertices,
        Self::Normals,
        Self::Colors,
        Self::Uvs,
        Self::FurVectors,
        Self::FurLayers,
        Self::Materials,
        Self::Shaders,
        Self::Objects,
        Self::Textures,
        Self::Palettes,
        Self::UserData,
    ];

    /// Header slot of this section for `version`, if the version has it.
    #[must_use]
    pub fn index(self, version: u32) -> Option<usize> {
        let current = Self::ALL.iter().position(|&s| s == self)?;
        match version {
            10 | 11 => Some(current),
            8 | 9 => match self {
                Self::FurVectors | Self::FurLayers | Self::UserData => None,
                _ if current >= 8 => Some(current - 2),
                _ => Some(current),
            },
            _ => None,
        }
    }

    /// Whether this crate decodes the section. See also [`Self::is_kept`].
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Self::Bones | Self::Vertices | Self::Normals | Self::Colors | Self::Uvs | Self::Objects
        )
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Definitions => "definitions",
            Self::Bones => "bones",
            Self::Vertices => "vertices",
            Self::Normals => "normals",
            Self::Colors => "colors",
            Self::Uvs => "uvs",
            Self::FurVectors => "fur vectors",
            Self::FurLayers => "fur layers",
            Self::Materials => "materials",
            Self::Shaders => "shaders",
            Self::Objects => "objects",
            Self::Textures => "textures",
            Self::Palettes => "palettes",
            Self::UserData => "user data",
        }
    }
}

/// Totals and flags from the model info block.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub scaling_rule: u32,
    pub texture_matrix_mode: u32,
    /// Facepoints across all polygons.
    pub vertex_count: u32,
    /// Triangles across all polygons.
    pub face_count: u32,
    pub need_normal_matrix: bool,
    pub need_texture_matrix: bool,
    pub use_extents: bool,
    pub envelope_mode: u8,
    pub minimum: Vec3,
    pub maximum: Vec3,
    /// Bone behind every matrix id, -1 for a blended matrix. Empty means one
    /// matrix per bone, in bone order.
    pub matrix_table: Vec<i32>,
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self {
            scaling_rule: 0,
            texture_matrix_mode: 0,
            vertex_count: 0,
            face_count: 0,
            need_normal_matrix: false,
            need_texture_matrix: false,
            use_extents: false,
            envelope_mode: 0,
            minimum: Vec3::ZERO,
            maximum: Vec3::ZERO,
            matrix_table: Vec::new(),
        }
    }
}

/// A decoded MDL0 resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub name: String,
    pub info: ModelInfo,
    pub skeleton: Skeleton,
    pub vertices: Vec<PointGroup>,
    pub normals: Vec<PointGroup>,
    pub colors: Vec<ColorGroup>,
    pub uvs: Vec<PointGroup>,
    pub polygons: Vec<Polygon>,
    /// Sections carried through without decoding, in header order.
    pub kept: Vec<RawSection>,
}

impl Model {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Encode `geometry` into new groups and a polygon.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] for inconsistent attribute data,
    /// [`Error::IndexOverflow`] when a group is too large to index and
    /// [`Error::DuplicateResource`] if a polygon with the same name exists.
    /// The model is left unchanged on error.
    pub fn add_geometry(&mut self, geometry: &Geometry, options: &CodecOptions) -> Result<GeometryAdded> {
        polygon::encode_geometry(self, geometry, options)
    }

    /// Decode polygon `index` back into raw attribute arrays.
    ///
    /// # Errors
    /// Returns [`Error::ResourceNotFound`] for a bad index,
    /// [`Error::MissingGroup`] if the polygon references a missing group and
    /// [`Error::InvalidDrawCommand`] for corrupt draw data.
    pub fn decode_polygon(&self, index: usize, options: &CodecOptions) -> Result<Geometry> {
        let polygon = self
            .polygons
            .get(index)
            .ok_or_else(|| Error::ResourceNotFound(format!("polygon {index} of {}", self.name)))?;
        polygon::decode_polygon(self, polygon, options)
    }

    #[must_use]
    pub fn find_polygon(&self, name: &str) -> Option<usize> {
        self.polygons.iter().position(|p| p.name == name)
    }

    /// The kept section of `section`, if the model has one.
    #[must_use]
    pub fn kept_section(&self, section: Section) -> Option<&RawSection> {
        self.kept.iter().find(|raw| raw.section == section)
    }

    /// Number of matrices the polygons and bones can address.
    #[must_use]
    pub fn matrix_count(&self) -> usize {
        if self.info.matrix_table.is_empty() {
            self.skeleton.len()
        } else {
            self.info.matrix_table.len()
        }
    }

    /// Recompute totals and extents from the groups and polygons.
    pub fn rebuild_header(&mut self) {
        self.info.vertex_count = self.polygons.iter().map(Polygon::facepoint_count).sum();
        self.info.face_count = self.polygons.iter().map(Polygon::face_count).sum();

        let mut minimum = Vec3::splat(f32::INFINITY);
        let mut maximum = Vec3::splat(f32::NEG_INFINITY);
        for group in self.vertices.iter().filter(|g| g.count > 0) {
            let extent = |values: &[f32]| Vec3::new(values[0], values[1], values.get(2).copied().unwrap_or(0.0));
            minimum = minimum.min(extent(&group.minimum));
            maximum = maximum.max(extent(&group.maximum));
        }
        if minimum.cmple(maximum).all() {
            self.info.minimum = minimum;
            self.info.maximum = maximum;
        } else {
            self.info.minimum = Vec3::ZERO;
            self.info.maximum = Vec3::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PointCollection;

    #[test]
    fn test_section_indices_by_version() {
        assert_eq!(Section::Objects.index(11), Some(10));
        assert_eq!(Section::Objects.index(9), Some(8));
        assert_eq!(Section::Palettes.index(8), Some(10));
        assert_eq!(Section::FurLayers.index(9), None);
        assert_eq!(Section::UserData.index(10), Some(13));
        assert_eq!(Section::Uvs.index(8), Some(5));
        assert_eq!(Section::Bones.index(12), None);
    }

    #[test]
    fn test_rebuild_header_extents() {
        let mut model = Model::new("kart");
        let a = PointCollection::from_points(&[[-1.0f32, 0.0, 2.0], [0.0, 3.0, 0.0], [1.0, 0.0, 0.0]], vec![[0, 1, 2]])
            .unwrap();
        let b = PointCollection::from_points(&[[5.0f32, 0.0], [0.0, -4.0], [0.0, 0.0]], vec![[0, 1, 2]]).unwrap();
        model.add_geometry(&Geometry::new("a", a), &CodecOptions::default()).unwrap();
        model.add_geometry(&Geometry::new("b", b), &CodecOptions::default()).unwrap();
        assert_eq!(model.info.minimum, Vec3::new(-1.0, -4.0, 0.0));
        assert_eq!(model.info.maximum, Vec3::new(5.0, 3.0, 2.0));
        assert_eq!(model.info.face_count, 2);
        assert_eq!(model.info.vertex_count, 6);
        assert_eq!(model.find_polygon("b"), Some(1));
    }

    #[test]
    fn test_duplicate_polygon_name() {
        let mut model = Model::new("kart");
        let points = PointCollection::from_points(&[[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]], vec![[0, 1, 2]]).unwrap();
        model.add_geometry(&Geometry::new("a", points.clone()), &CodecOptions::default()).unwrap();
        assert!(matches!(
            model.add_geometry(&Geometry::new("a", points), &CodecOptions::default()),
            Err(Error::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_decode_unknown_polygon() {
        let model = Model::new("kart");
        assert!(matches!(
            model.decode_polygon(3, &CodecOptions::default()),
            Err(Error::ResourceNotFound(_))
        ));
    }
}

//! Vertex attribute groups
//!
//! Each group is one quantized table shared by any number of polygons.

use crate::error::{Error, Result};
use crate::geometry::{ColorFormat, EncodedColors, EncodedPoints, PointFormat, decode_colors, decode_points};

/// Attribute slot a group feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Vertex,
    Normal,
    Color,
    Uv,
}

impl AttributeKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Normal => "normal",
            Self::Color => "color",
            Self::Uv => "uv",
        }
    }

    /// On-disk component layout code for a point width.
    pub(crate) fn component_code(self, width: usize) -> Result<u32> {
        match (self, width) {
            (Self::Vertex, 2) | (Self::Normal, 3) | (Self::Uv, 1) => Ok(0),
            (Self::Vertex, 3) | (Self::Normal, 9) | (Self::Uv, 2) => Ok(1),
            _ => Err(Error::InvalidGeometry(format!(
                "{} points cannot be {width} components wide",
                self.label()
            ))),
        }
    }

    /// Point width for an on-disk component layout code.
    pub(crate) fn width_for_code(self, code: u32) -> Result<usize> {
        match (self, code) {
            (Self::Vertex, 0) => Ok(2),
            (Self::Vertex, 1) | (Self::Normal, 0 | 2) => Ok(3),
            (Self::Normal, 1) => Ok(9),
            (Self::Uv, 0) => Ok(1),
            (Self::Uv, 1) => Ok(2),
            _ => Err(Error::InvalidGeometry(format!(
                "unknown {} component layout {code}",
                self.label()
            ))),
        }
    }

    /// Whether the group header stores min/max extents.
    pub(crate) const fn has_extents(self) -> bool {
        matches!(self, Self::Vertex | Self::Uv)
    }
}

/// A quantized vertex, normal or texture coordinate table.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGroup {
    pub name: String,
    pub kind: AttributeKind,
    /// Components per point.
    pub width: usize,
    pub format: PointFormat,
    pub divisor: u8,
    pub count: usize,
    /// Per-component extents; empty for normals.
    pub minimum: Vec<f32>,
    pub maximum: Vec<f32>,
    /// Packed big-endian components.
    pub data: Vec<u8>,
}

impl PointGroup {
    #[must_use]
    pub fn from_encoded(name: impl Into<String>, kind: AttributeKind, encoded: &EncodedPoints) -> Self {
        let (minimum, maximum) = if kind.has_extents() {
            (encoded.minimum.clone(), encoded.maximum.clone())
        } else {
            (Vec::new(), Vec::new())
        };
        Self {
            name: name.into(),
            kind,
            width: encoded.width,
            format: encoded.format,
            divisor: encoded.divisor,
            count: encoded.count,
            minimum,
            maximum,
            data: encoded.data.clone(),
        }
    }

    /// Bytes per point.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.width * self.format.component_size()
    }

    /// Decode the table to flattened floats.
    pub fn decode(&self) -> Result<Vec<f32>> {
        decode_points(self.format, self.divisor, self.width, self.count, &self.data)
    }
}

/// A packed vertex color table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGroup {
    pub name: String,
    pub format: ColorFormat,
    pub count: usize,
    pub data: Vec<u8>,
}

impl ColorGroup {
    #[must_use]
    pub fn from_encoded(name: impl Into<String>, encoded: &EncodedColors) -> Self {
        Self {
            name: name.into(),
            format: encoded.format,
            count: encoded.count,
            data: encoded.data.clone(),
        }
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.format.has_alpha()
    }

    pub fn decode(&self) -> Result<Vec<[u8; 4]>> {
        decode_colors(self.format, self.count, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PointCollection;

    #[test]
    fn test_component_codes_round_trip() {
        for (kind, width) in [
            (AttributeKind::Vertex, 2),
            (AttributeKind::Vertex, 3),
            (AttributeKind::Normal, 3),
            (AttributeKind::Normal, 9),
            (AttributeKind::Uv, 1),
            (AttributeKind::Uv, 2),
        ] {
            let code = kind.component_code(width).unwrap();
            assert_eq!(kind.width_for_code(code).unwrap(), width);
        }
        assert!(AttributeKind::Uv.component_code(3).is_err());
    }

    #[test]
    fn test_normals_drop_extents() {
        let normals = PointCollection::from_points(&[[0.0f32, 1.0, 0.0]], vec![]).unwrap();
        let group = PointGroup::from_encoded("n", AttributeKind::Normal, &normals.encode());
        assert!(group.minimum.is_empty());
        assert_eq!(group.stride(), 6);
        assert_eq!(group.decode().unwrap(), vec![0.0, 1.0, 0.0]);
    }
}

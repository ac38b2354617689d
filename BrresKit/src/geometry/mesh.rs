//! Mesh geometry exchanged with importers and exporters

use glam::{Mat3, Mat4, Vec3};

use super::color::ColorCollection;
use super::point::PointCollection;

/// Most texture coordinate sets a polygon can reference.
pub const MAX_UV_SETS: usize = 8;

/// Raw attribute arrays of one polygon, each with its own triangle list.
///
/// All collections describe the same triangles: face `i` of every attribute
/// belongs to triangle `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub name: String,
    /// Positions, two or three components wide.
    pub vertices: PointCollection,
    /// Normals, three components wide (nine for normal/binormal/tangent).
    pub normals: Option<PointCollection>,
    pub colors: Option<ColorCollection>,
    /// Up to [`MAX_UV_SETS`] coordinate sets, one or two components wide.
    pub uvs: Vec<PointCollection>,
    /// Bone the polygon is attached to.
    pub linked_bone: Option<u16>,
}

impl Geometry {
    #[must_use]
    pub fn new(name: impl Into<String>, vertices: PointCollection) -> Self {
        Self {
            name: name.into(),
            vertices,
            normals: None,
            colors: None,
            uvs: Vec::new(),
            linked_bone: None,
        }
    }

    #[must_use]
    pub fn with_normals(mut self, normals: PointCollection) -> Self {
        self.normals = Some(normals);
        self
    }

    #[must_use]
    pub fn with_colors(mut self, colors: ColorCollection) -> Self {
        self.colors = Some(colors);
        self
    }

    #[must_use]
    pub fn with_uvs(mut self, uvs: PointCollection) -> Self {
        self.uvs.push(uvs);
        self
    }

    #[must_use]
    pub fn with_bone(mut self, bone: u16) -> Self {
        self.linked_bone = Some(bone);
        self
    }

    /// Number of triangles.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.vertices.faces().len()
    }

    /// Transform positions by `matrix` and normals by its inverse transpose.
    pub fn apply_matrix(&mut self, matrix: &Mat4) {
        let width = self.vertices.width();
        for point in self.vertices.points_mut().chunks_exact_mut(width) {
            let z = if width >= 3 { point[2] } else { 0.0 };
            let moved = matrix.transform_point3(Vec3::new(point[0], point[1], z));
            point[0] = moved.x;
            point[1] = moved.y;
            if width >= 3 {
                point[2] = moved.z;
            }
        }
        if let Some(normals) = &mut self.normals {
            let normal_matrix = Mat3::from_mat4(*matrix).inverse().transpose();
            for n in normals.points_mut().chunks_exact_mut(3) {
                let turned = (normal_matrix * Vec3::new(n[0], n[1], n[2])).normalize_or_zero();
                n.copy_from_slice(&turned.to_array());
            }
        }
    }

    /// Convert Z-up data to the Y-up space the game uses.
    pub fn swap_y_z_axis(&mut self) {
        fn swap(points: &mut PointCollection) {
            if points.width() < 3 {
                return;
            }
            for p in points.points_mut().chunks_exact_mut(3) {
                let (y, z) = (p[1], p[2]);
                p[1] = z;
                p[2] = -y;
            }
        }
        swap(&mut self.vertices);
        if let Some(normals) = &mut self.normals {
            swap(normals);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        let vertices =
            PointCollection::from_points(&[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], vec![[0, 1, 2]])
                .unwrap();
        let normals = PointCollection::from_points(&[[0.0f32, 1.0, 0.0]], vec![[0, 0, 0]]).unwrap();
        Geometry::new("tri", vertices).with_normals(normals)
    }

    #[test]
    fn test_apply_matrix_moves_points_not_normals() {
        let mut geometry = triangle();
        geometry.apply_matrix(&Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(geometry.vertices.point(1), &[2.0, 2.0, 3.0]);
        assert_eq!(geometry.normals.as_ref().unwrap().point(0), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_apply_matrix_renormalizes_scaled_normals() {
        let mut geometry = triangle();
        geometry.apply_matrix(&Mat4::from_scale(Vec3::new(1.0, 4.0, 1.0)));
        assert_eq!(geometry.vertices.point(2), &[0.0, 0.0, 1.0]);
        let normal = geometry.normals.as_ref().unwrap().point(0);
        assert!((normal[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_swap_y_z_axis() {
        let mut geometry = triangle();
        geometry.swap_y_z_axis();
        assert_eq!(geometry.vertices.point(2), &[0.0, 1.0, -0.0]);
        assert_eq!(geometry.normals.as_ref().unwrap().point(0), &[0.0, 0.0, -1.0]);
    }
}

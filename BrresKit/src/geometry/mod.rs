//! Geometry encoding
//!
//! Raw attribute arrays become quantized, deduplicated tables and strip-packed
//! draw commands here. The MDL0 module stores the results.

pub mod color;
pub mod mesh;
pub mod point;
pub mod strip;

pub use color::{ColorCollection, ColorFormat, EncodedColors, decode_colors};
pub use mesh::{Geometry, MAX_UV_SETS};
pub use point::{EncodedPoints, PointCollection, PointFormat, decode_points, select_format};
pub use strip::{DrawData, FacePoint, IndexFormat, Triangle, decode_draw_commands, encode_triangles};

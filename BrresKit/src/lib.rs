//! # BrresKit
//!
//! A pure-Rust library for reading and writing BRRES resource containers.
//!
//! ## Supported Resources
//!
//! - **MDL0** - Models: quantized attribute groups, strip-packed polygons, skeletons
//! - **TEX0** - Textures: header and GX pixel data, converted through an external tool
//!
//! ## Quick Start
//!
//! ### Reading and Writing Containers
//!
//! ```no_run
//! use brreskit::container::{read_container, write_container};
//!
//! let container = read_container("course.brres")?;
//! println!("{} models, {} textures", container.models.len(), container.textures.len());
//! write_container("course_copy.brres", &container)?;
//! # Ok::<(), brreskit::Error>(())
//! ```
//!
//! ### Encoding Geometry
//!
//! ```
//! use brreskit::prelude::*;
//!
//! let vertices = PointCollection::from_points(
//!     &[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
//!     vec![[0, 1, 2]],
//! )?;
//! let codec = Codec::new(CodecOptions::default());
//! let mut model = Model::new("kart");
//! let added = codec.add_geometry(&mut model, &Geometry::new("body", vertices))?;
//! assert_eq!(model.polygons[added.polygon].face_count(), 1);
//! # Ok::<(), brreskit::Error>(())
//! ```
//!
//! ### Texture Tool
//!
//! Texture resizing and format changes run `wimgt`. [`Codec`] looks for it
//! on `PATH` (or at [`CodecOptions::texture_tool`]) the first time it is
//! needed; a custom [`ImageConverter`](texture::ImageConverter) can be
//! injected with [`Codec::with_converter`].

pub mod binfile;
pub mod codec;
pub mod container;
pub mod error;
pub mod fixup;
pub mod geometry;
pub mod model;
pub mod options;
pub mod subfile;
pub mod texture;

// Re-exports for convenience
pub use codec::Codec;
pub use error::{Error, Result};
pub use options::CodecOptions;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::codec::Codec;
    pub use crate::error::{Error, Result};
    pub use crate::fixup::{Fixup, FixupKind};
    pub use crate::options::CodecOptions;

    pub use crate::container::{
        Container, decode_container, decode_container_partial, encode_container, read_container,
        write_container,
    };

    pub use crate::geometry::{ColorCollection, ColorFormat, Geometry, PointCollection, PointFormat};
    pub use crate::model::{Bone, BoneId, Model, Polygon, Skeleton};
    pub use crate::texture::{
        ConverterHandle, ImageConverter, Texture, TextureFormat, TextureSetting, TextureSettingKey,
        texture_from_bytes, texture_to_bytes,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

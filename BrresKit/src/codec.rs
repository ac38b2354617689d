//! Codec façade
//!
//! [`Codec`] pairs [`CodecOptions`] with the converter capability and runs
//! the operations that need both: adding textures (with the fixup pass),
//! changing texture settings, and geometry conversion under the options'
//! attribute filters.

use std::path::Path;
use std::sync::OnceLock;

use crate::container::Container;
use crate::error::{Error, Result};
use crate::fixup::{Fixup, FixupKind};
use crate::geometry::Geometry;
use crate::model::{GeometryAdded, Model};
use crate::options::CodecOptions;
use crate::texture::{ConverterHandle, Texture, TextureFormat, TextureSetting};

/// Conversion entry point holding options and the active converter.
#[derive(Debug, Default)]
pub struct Codec {
    options: CodecOptions,
    converter: OnceLock<ConverterHandle>,
}

impl Codec {
    /// A codec that detects the texture tool on first use.
    #[must_use]
    pub fn new(options: CodecOptions) -> Self {
        Self {
            options,
            converter: OnceLock::new(),
        }
    }

    /// Use `converter` instead of detecting one.
    #[must_use]
    pub fn with_converter(mut self, converter: ConverterHandle) -> Self {
        self.converter = OnceLock::from(converter);
        self
    }

    #[must_use]
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// The active converter, detected from the options on first call.
    pub fn converter(&self) -> &ConverterHandle {
        self.converter
            .get_or_init(|| ConverterHandle::detect(self.options.texture_tool.as_deref()))
    }

    /// Encode `geometry` into `model`, honoring the attribute filters.
    ///
    /// # Errors
    /// See [`Model::add_geometry`].
    pub fn add_geometry(&self, model: &mut Model, geometry: &Geometry) -> Result<GeometryAdded> {
        let added = model.add_geometry(geometry, &self.options)?;
        tracing::debug!(
            "Encoded {} into {}: {} faces",
            geometry.name,
            model.name,
            model.polygons[added.polygon].face_count()
        );
        Ok(added)
    }

    /// Decode polygon `index` of `model`, honoring the attribute filters.
    ///
    /// # Errors
    /// See [`Model::decode_polygon`].
    pub fn decode_polygon(&self, model: &Model, index: usize) -> Result<Geometry> {
        model.decode_polygon(index, &self.options)
    }

    /// Bring a texture in line with the power-of-two rule and report
    /// short pixel data.
    ///
    /// # Errors
    /// Returns [`Error::NoConverter`] if a resize is needed and no tool is
    /// available, or the converter's own failure.
    pub fn fix_texture(&self, texture: &mut Texture) -> Result<Vec<Fixup>> {
        let mut fixups = Vec::new();

        if !texture.is_power_of_two() {
            let (width, height) = (texture.width, texture.height);
            let (new_width, new_height) = texture.power_of_two_size();
            let resolved = self.options.resize_to_pow_two;
            if resolved {
                let resized = self
                    .converter()
                    .with(|converter| converter.resize(texture, new_width, new_height))?;
                *texture = resized;
            }
            fixups.push(Fixup::new(
                texture.name.clone(),
                FixupKind::NonPowerOfTwo {
                    width: u32::from(width),
                    height: u32::from(height),
                    new_width: u32::from(new_width),
                    new_height: u32::from(new_height),
                },
                resolved,
            ));
        }

        fixups.extend(texture.check_data_size());
        for fixup in &fixups {
            fixup.log();
        }
        Ok(fixups)
    }

    /// Run the fixup pass on every texture of `container`.
    ///
    /// # Errors
    /// Stops at the first texture whose fixup fails.
    pub fn check(&self, container: &mut Container) -> Result<Vec<Fixup>> {
        let mut fixups = Vec::new();
        for texture in container.textures.values_mut() {
            fixups.extend(self.fix_texture(texture)?);
        }
        tracing::info!("Checked {} textures: {} fixups", container.textures.len(), fixups.len());
        Ok(fixups)
    }

    /// Add a texture after running the fixup pass on it.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateResource`] if the name is taken, or any
    /// fixup failure. The container is unchanged on error.
    pub fn add_texture(&self, container: &mut Container, mut texture: Texture) -> Result<Vec<Fixup>> {
        if container.textures.contains_key(&texture.name) {
            return Err(Error::DuplicateResource(texture.name));
        }
        let fixups = self.fix_texture(&mut texture)?;
        tracing::info!(
            "Adding texture {} ({}x{} {})",
            texture.name,
            texture.width,
            texture.height,
            texture.format
        );
        container.insert_texture(texture)?;
        Ok(fixups)
    }

    /// Encode an image file through the converter and add it as `name`.
    ///
    /// # Errors
    /// Returns [`Error::NoConverter`] without a tool, or any failure of
    /// [`Self::add_texture`].
    pub fn import_texture(
        &self,
        container: &mut Container,
        image: &Path,
        name: &str,
        format: TextureFormat,
        mipmaps: Option<u32>,
    ) -> Result<Vec<Fixup>> {
        if container.textures.contains_key(name) {
            return Err(Error::DuplicateResource(name.to_string()));
        }
        let mut texture = self
            .converter()
            .with(|converter| converter.encode(image, format, mipmaps))?;
        texture.name = name.to_string();
        self.add_texture(container, texture)
    }

    /// Decode a texture of `container` into a PNG at `dest`.
    ///
    /// # Errors
    /// Returns [`Error::ResourceNotFound`], [`Error::NoConverter`] or the
    /// converter's failure.
    pub fn export_texture(&self, container: &Container, name: &str, dest: &Path) -> Result<()> {
        let texture = container.texture(name)?;
        self.converter().with(|converter| converter.decode(texture, dest))
    }

    /// Change one setting of texture `name`.
    ///
    /// Renames happen in the container; every other setting re-encodes the
    /// pixels through the converter and reruns the fixup pass.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSetting`] for out-of-range values,
    /// [`Error::ResourceNotFound`] for an unknown texture, or a converter
    /// failure. The texture is unchanged on error.
    pub fn set_texture_setting(
        &self,
        container: &mut Container,
        name: &str,
        setting: &TextureSetting,
    ) -> Result<Vec<Fixup>> {
        setting.validate()?;
        let mut updated = match setting {
            TextureSetting::Name(new_name) => {
                container.rename_texture(name, new_name)?;
                return Ok(Vec::new());
            }
            TextureSetting::Dimensions { width, height } => {
                let texture = container.texture(name)?;
                self.converter().with(|c| c.resize(texture, *width, *height))?
            }
            TextureSetting::Format(format) => {
                let texture = container.texture(name)?;
                self.converter().with(|c| c.convert(texture, *format))?
            }
            TextureSetting::MipmapCount(count) => {
                let texture = container.texture(name)?;
                self.converter().with(|c| c.set_mipmap_count(texture, *count))?
            }
        };
        tracing::debug!("Set {:?} of texture {}", setting.key(), name);
        let fixups = self.fix_texture(&mut updated)?;
        *container.texture_mut(name)? = updated;
        Ok(fixups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PointCollection;
    use crate::texture::{FakeConverter, TextureSettingKey};

    fn fake_codec(options: CodecOptions) -> Codec {
        Codec::new(options).with_converter(ConverterHandle::new(FakeConverter::new()))
    }

    #[test]
    fn test_add_texture_resizes_to_power_of_two() {
        let codec = fake_codec(CodecOptions::default());
        let mut container = Container::new("course");
        let texture = Texture::blank("road", 100, 50, TextureFormat::Cmpr, 0);

        let fixups = codec.add_texture(&mut container, texture).unwrap();
        assert_eq!(fixups.len(), 1);
        assert_eq!(
            fixups[0].kind,
            FixupKind::NonPowerOfTwo {
                width: 100,
                height: 50,
                new_width: 128,
                new_height: 64
            }
        );
        assert!(fixups[0].resolved);

        let stored = container.texture("road").unwrap();
        assert_eq!((stored.width, stored.height), (128, 64));
        assert_eq!(stored.name, "road");
    }

    #[test]
    fn test_resize_without_converter_fails() {
        let codec = Codec::new(CodecOptions::default()).with_converter(ConverterHandle::null());
        let mut container = Container::new("course");
        let texture = Texture::blank("road", 100, 50, TextureFormat::Cmpr, 0);
        assert!(matches!(
            codec.add_texture(&mut container, texture),
            Err(Error::NoConverter)
        ));
        assert!(container.is_empty());
    }

    #[test]
    fn test_resize_disabled_reports_unresolved() {
        let codec = Codec::new(CodecOptions::default().no_resize()).with_converter(ConverterHandle::null());
        let mut container = Container::new("course");
        let texture = Texture::blank("road", 100, 64, TextureFormat::I8, 0);
        let fixups = codec.add_texture(&mut container, texture).unwrap();
        assert_eq!(fixups.len(), 1);
        assert!(!fixups[0].resolved);
        assert_eq!(container.texture("road").unwrap().width, 100);
    }

    #[test]
    fn test_power_of_two_needs_no_converter() {
        let codec = Codec::new(CodecOptions::default()).with_converter(ConverterHandle::null());
        let mut container = Container::new("course");
        let texture = Texture::blank("road", 64, 32, TextureFormat::I8, 0);
        assert!(codec.add_texture(&mut container, texture).unwrap().is_empty());
    }

    #[test]
    fn test_short_data_is_reported() {
        let codec = fake_codec(CodecOptions::default());
        let mut container = Container::new("course");
        let mut texture = Texture::blank("road", 8, 8, TextureFormat::I8, 0);
        texture.data.truncate(10);
        let fixups = codec.add_texture(&mut container, texture).unwrap();
        assert_eq!(
            fixups,
            vec![Fixup::new(
                "road",
                FixupKind::DataSizeMismatch {
                    expected: 64,
                    actual: 10
                },
                false
            )]
        );
    }

    #[test]
    fn test_set_texture_settings() {
        let codec = fake_codec(CodecOptions::default());
        let mut container = Container::new("course");
        codec
            .add_texture(&mut container, Texture::blank("road", 32, 32, TextureFormat::Rgba32, 0))
            .unwrap();

        codec
            .set_texture_setting(&mut container, "road", &TextureSetting::Format(TextureFormat::Cmpr))
            .unwrap();
        codec
            .set_texture_setting(&mut container, "road", &TextureSetting::MipmapCount(2))
            .unwrap();
        let fixups = codec
            .set_texture_setting(
                &mut container,
                "road",
                &TextureSetting::Dimensions { width: 48, height: 16 },
            )
            .unwrap();
        // 48 is not a power of two, so the fixup pass resizes again
        assert_eq!(fixups.len(), 1);

        codec
            .set_texture_setting(&mut container, "road", &TextureSetting::Name("asphalt".into()))
            .unwrap();
        let texture = container.texture("asphalt").unwrap();
        assert_eq!(texture.format, TextureFormat::Cmpr);
        assert_eq!(texture.mipmap_count, 2);
        assert_eq!(
            texture.setting(TextureSettingKey::Dimensions),
            TextureSetting::Dimensions { width: 64, height: 16 }
        );
        assert_eq!(texture.name, "asphalt");
    }

    #[test]
    fn test_invalid_setting_leaves_texture() {
        let codec = fake_codec(CodecOptions::default());
        let mut container = Container::new("course");
        codec
            .add_texture(&mut container, Texture::blank("road", 32, 32, TextureFormat::I8, 0))
            .unwrap();
        assert!(matches!(
            codec.set_texture_setting(&mut container, "road", &TextureSetting::MipmapCount(21)),
            Err(Error::InvalidSetting { .. })
        ));
        assert!(matches!(
            codec.set_texture_setting(&mut container, "sky", &TextureSetting::MipmapCount(1)),
            Err(Error::ResourceNotFound(_))
        ));
        assert_eq!(container.texture("road").unwrap().mipmap_count, 0);
    }

    #[test]
    fn test_geometry_honors_options() {
        let codec = fake_codec(CodecOptions::default().no_normals());
        let mut model = Model::new("kart");
        let vertices =
            PointCollection::from_points(&[[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], vec![[0, 1, 2]])
                .unwrap();
        let normals = PointCollection::from_points(&[[0.0f32, 0.0, 1.0]], vec![[0, 0, 0]]).unwrap();
        let geometry = Geometry::new("body", vertices).with_normals(normals);
        let added = codec.add_geometry(&mut model, &geometry).unwrap();
        assert!(model.normals.is_empty());
        let decoded = codec.decode_polygon(&model, added.polygon).unwrap();
        assert!(decoded.normals.is_none());
    }
}

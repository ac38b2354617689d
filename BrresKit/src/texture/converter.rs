//! Pluggable pixel conversion
//!
//! GX pixel encoding is left to an external tool. The codec talks to it
//! through [`ImageConverter`] and holds exactly one active strategy behind a
//! [`ConverterHandle`].

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use image::imageops::FilterType;
use tempfile::NamedTempFile;

use super::wimgt::WimgtConverter;
use super::{Texture, TextureFormat};
use crate::error::{Error, Result};

/// A strategy that moves textures between PNG files and GX pixel data.
///
/// Only [`encode`](Self::encode) and [`decode`](Self::decode) are required;
/// the remaining operations round-trip through a temporary PNG.
pub trait ImageConverter: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether the strategy can run at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Directory for scratch files. `None` uses the system temp directory.
    fn scratch_dir(&self) -> Option<&Path> {
        None
    }

    /// Encode the image file at `image`. `None` lets the tool pick the
    /// mipmap count.
    fn encode(&mut self, image: &Path, format: TextureFormat, mipmaps: Option<u32>) -> Result<Texture>;

    /// Decode the base level of `texture` into a PNG at `dest`.
    fn decode(&mut self, texture: &Texture, dest: &Path) -> Result<()>;

    /// Re-encode `texture` in another pixel format.
    fn convert(&mut self, texture: &Texture, format: TextureFormat) -> Result<Texture> {
        self.reencode(texture, None, format, Some(texture.mipmap_count))
    }

    fn set_mipmap_count(&mut self, texture: &Texture, count: u32) -> Result<Texture> {
        self.reencode(texture, None, texture.format, Some(count))
    }

    /// Scale `texture` to `width` x `height`, keeping format and mipmaps.
    fn resize(&mut self, texture: &Texture, width: u16, height: u16) -> Result<Texture> {
        self.reencode(texture, Some((width, height)), texture.format, Some(texture.mipmap_count))
    }

    /// Decode to a scratch PNG, optionally resize it, and encode it again.
    fn reencode(
        &mut self,
        texture: &Texture,
        size: Option<(u16, u16)>,
        format: TextureFormat,
        mipmaps: Option<u32>,
    ) -> Result<Texture> {
        let scratch = scratch_file(self.scratch_dir(), ".png")?;
        self.decode(texture, scratch.path())?;
        if let Some((width, height)) = size {
            let resized = image::open(scratch.path())?.resize_exact(
                u32::from(width),
                u32::from(height),
                FilterType::CatmullRom,
            );
            resized.save_with_format(scratch.path(), image::ImageFormat::Png)?;
        }
        let mut encoded = self.encode(scratch.path(), format, mipmaps)?;
        encoded.name.clone_from(&texture.name);
        Ok(encoded)
    }
}

/// Create a scratch file that is deleted when it drops.
pub(crate) fn scratch_file(dir: Option<&Path>, suffix: &str) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("brreskit-").suffix(suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    Ok(file)
}

/// The strategy used when no tool is installed. Every operation fails with
/// [`Error::NoConverter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConverter;

impl ImageConverter for NullConverter {
    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn encode(&mut self, _image: &Path, _format: TextureFormat, _mipmaps: Option<u32>) -> Result<Texture> {
        Err(Error::NoConverter)
    }

    fn decode(&mut self, _texture: &Texture, _dest: &Path) -> Result<()> {
        Err(Error::NoConverter)
    }
}

/// Shared handle to the active converter. Calls are serialized.
#[derive(Clone)]
pub struct ConverterHandle(Arc<Mutex<Box<dyn ImageConverter>>>);

impl ConverterHandle {
    pub fn new(converter: impl ImageConverter + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(converter))))
    }

    /// A handle whose every call fails with [`Error::NoConverter`].
    #[must_use]
    pub fn null() -> Self {
        Self::new(NullConverter)
    }

    /// Use `tool` if it exists, otherwise look for `wimgt` on `PATH`.
    #[must_use]
    pub fn detect(tool: Option<&Path>) -> Self {
        if let Some(tool) = tool {
            if tool.is_file() {
                tracing::info!("Using texture tool {}", tool.display());
                return Self::new(WimgtConverter::new(tool));
            }
            tracing::warn!("Texture tool {} does not exist", tool.display());
        }
        match which::which(WimgtConverter::PROGRAM) {
            Ok(path) => {
                tracing::info!("Found texture tool at {}", path.display());
                Self::new(WimgtConverter::new(path))
            }
            Err(e) => {
                tracing::debug!("No texture tool on PATH: {}", e);
                Self::null()
            }
        }
    }

    /// Run `f` with exclusive access to the converter.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn ImageConverter) -> Result<R>) -> Result<R> {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **guard)
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_available()
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).name().to_string()
    }
}

impl Default for ConverterHandle {
    fn default() -> Self {
        Self::null()
    }
}

impl std::fmt::Debug for ConverterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConverterHandle").field(&self.name()).finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use super::*;

    /// Stands in for the external tool. PNGs carry the size; pixel data is
    /// a fill byte.
    pub(crate) struct FakeConverter {
        pub calls: Vec<String>,
        pub scratch_dir: Option<PathBuf>,
        pub fail_encode: bool,
    }

    impl FakeConverter {
        pub(crate) fn new() -> Self {
            Self {
                calls: Vec::new(),
                scratch_dir: None,
                fail_encode: false,
            }
        }
    }

    /// Entries left in `dir`.
    pub(crate) fn leftovers(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir).unwrap().map(|entry| entry.unwrap().path()).collect()
    }

    impl ImageConverter for FakeConverter {
        fn name(&self) -> &str {
            "fake"
        }

        fn scratch_dir(&self) -> Option<&Path> {
            self.scratch_dir.as_deref()
        }

        fn encode(&mut self, image: &Path, format: TextureFormat, mipmaps: Option<u32>) -> Result<Texture> {
            if self.fail_encode {
                return Err(Error::ConverterFailed {
                    program: PathBuf::from("fake"),
                    status: "exit status: 1".to_string(),
                });
            }
            let decoded = image::open(image)?;
            self.calls.push(format!("encode {}x{} {format}", decoded.width(), decoded.height()));
            let mut texture = Texture::blank(
                "encoded",
                decoded.width() as u16,
                decoded.height() as u16,
                format,
                mipmaps.unwrap_or(0),
            );
            texture.data.fill(0xAB);
            Ok(texture)
        }

        fn decode(&mut self, texture: &Texture, dest: &Path) -> Result<()> {
            self.calls.push(format!("decode {}", texture.name));
            let canvas = image::RgbaImage::new(u32::from(texture.width), u32::from(texture.height));
            canvas.save_with_format(dest, image::ImageFormat::Png)?;
            Ok(())
        }
    }

    #[test]
    fn test_null_converter_fails_fast() {
        let handle = ConverterHandle::null();
        assert!(!handle.is_available());
        let texture = Texture::blank("road", 8, 8, TextureFormat::I8, 0);
        assert!(matches!(
            handle.with(|c| c.resize(&texture, 4, 4)),
            Err(Error::NoConverter)
        ));
    }

    #[test]
    fn test_resize_round_trips_through_png() {
        let handle = ConverterHandle::new(FakeConverter::new());
        let texture = Texture::blank("road", 100, 50, TextureFormat::Cmpr, 2);
        let resized = handle.with(|c| c.resize(&texture, 128, 64)).unwrap();
        assert_eq!((resized.width, resized.height), (128, 64));
        assert_eq!(resized.name, "road");
        assert_eq!(resized.format, TextureFormat::Cmpr);
        assert_eq!(resized.mipmap_count, 2);
        assert_eq!(resized.data.len(), TextureFormat::Cmpr.data_size(128, 64, 2));
    }

    #[test]
    fn test_convert_and_mipmaps_keep_size() {
        let handle = ConverterHandle::new(FakeConverter::new());
        let texture = Texture::blank("sky", 32, 16, TextureFormat::Rgba32, 1);
        let converted = handle.with(|c| c.convert(&texture, TextureFormat::I4)).unwrap();
        assert_eq!(converted.format, TextureFormat::I4);
        assert_eq!((converted.width, converted.height, converted.mipmap_count), (32, 16, 1));

        let mipmapped = handle.with(|c| c.set_mipmap_count(&texture, 3)).unwrap();
        assert_eq!(mipmapped.mipmap_count, 3);
        assert_eq!(mipmapped.format, TextureFormat::Rgba32);
    }

    #[test]
    fn test_reencode_removes_scratch_png() {
        let scratch = tempfile::tempdir().unwrap();
        let mut converter = FakeConverter::new();
        converter.scratch_dir = Some(scratch.path().to_path_buf());
        let texture = Texture::blank("road", 16, 16, TextureFormat::I8, 0);

        let resized = converter.resize(&texture, 8, 8).unwrap();
        assert_eq!((resized.width, resized.height), (8, 8));
        assert_eq!(converter.calls, vec!["decode road", "encode 8x8 I8"]);
        assert!(leftovers(scratch.path()).is_empty());

        converter.fail_encode = true;
        assert!(matches!(
            converter.resize(&texture, 8, 8),
            Err(Error::ConverterFailed { .. })
        ));
        assert!(leftovers(scratch.path()).is_empty());
    }

    #[test]
    fn test_detect_missing_tool_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ConverterHandle::detect(Some(&dir.path().join("wimgt")));
        // depends on PATH; either way detection must not panic
        let _ = handle.is_available();
    }
}

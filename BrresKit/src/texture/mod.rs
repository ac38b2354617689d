//! TEX0 texture resource
//!
//! A texture is an opaque block of GX-encoded pixel data plus the header that
//! describes it. Pixel work (encoding, decoding, resizing) is delegated to an
//! [`ImageConverter`]; this module only owns the header, the size arithmetic
//! and the power-of-two rule.

mod codec;
mod converter;
mod wimgt;

pub(crate) use codec::{read_texture, write_texture};
pub use codec::{texture_from_bytes, texture_to_bytes};
pub use converter::{ConverterHandle, ImageConverter, NullConverter};
#[cfg(test)]
pub(crate) use converter::tests::FakeConverter;
pub use wimgt::WimgtConverter;

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::fixup::{Fixup, FixupKind};

/// Highest mipmap count a texture header may declare.
pub const MAX_MIPMAPS: u32 = 20;

/// GX pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    I4 = 0,
    I8 = 1,
    Ia4 = 2,
    Ia8 = 3,
    Rgb565 = 4,
    Rgb5a3 = 5,
    Rgba32 = 6,
    C4 = 8,
    C8 = 9,
    C14x2 = 10,
    Cmpr = 14,
}

impl TextureFormat {
    pub const ALL: [Self; 11] = [
        Self::I4,
        Self::I8,
        Self::Ia4,
        Self::Ia8,
        Self::Rgb565,
        Self::Rgb5a3,
        Self::Rgba32,
        Self::C4,
        Self::C8,
        Self::C14x2,
        Self::Cmpr,
    ];

    /// Look up a format by its header id.
    pub fn from_u32(id: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| *format as u32 == id)
            .ok_or(Error::InvalidTextureFormat(id))
    }

    /// Name used by the texture tool's `-x` option.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::I4 => "I4",
            Self::I8 => "I8",
            Self::Ia4 => "IA4",
            Self::Ia8 => "IA8",
            Self::Rgb565 => "RGB565",
            Self::Rgb5a3 => "RGB5A3",
            Self::Rgba32 => "RGBA32",
            Self::C4 => "C4",
            Self::C8 => "C8",
            Self::C14x2 => "C14X2",
            Self::Cmpr => "CMPR",
        }
    }

    #[must_use]
    pub const fn bits_per_pixel(self) -> usize {
        match self {
            Self::I4 | Self::C4 | Self::Cmpr => 4,
            Self::I8 | Self::Ia4 | Self::C8 => 8,
            Self::Ia8 | Self::Rgb565 | Self::Rgb5a3 | Self::C14x2 => 16,
            Self::Rgba32 => 32,
        }
    }

    /// Width and height of one 32-byte tile.
    #[must_use]
    pub const fn block_size(self) -> (usize, usize) {
        match self {
            Self::I4 | Self::C4 | Self::Cmpr => (8, 8),
            Self::I8 | Self::Ia4 | Self::C8 => (8, 4),
            Self::Ia8 | Self::Rgb565 | Self::Rgb5a3 | Self::C14x2 | Self::Rgba32 => (4, 4),
        }
    }

    /// Whether the pixels index a palette.
    #[must_use]
    pub const fn is_paletted(self) -> bool {
        matches!(self, Self::C4 | Self::C8 | Self::C14x2)
    }

    /// Bytes of one image level, padded to whole tiles.
    #[must_use]
    pub fn image_size(self, width: usize, height: usize) -> usize {
        let (block_w, block_h) = self.block_size();
        let width = width.max(1).div_ceil(block_w) * block_w;
        let height = height.max(1).div_ceil(block_h) * block_h;
        width * height * self.bits_per_pixel() / 8
    }

    /// Bytes of the base image plus `mipmaps` halved levels.
    #[must_use]
    pub fn data_size(self, width: usize, height: usize, mipmaps: u32) -> usize {
        (0..=mipmaps)
            .map(|level| self.image_size((width >> level).max(1), (height >> level).max(1)))
            .sum()
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextureFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidSetting {
                key: "format",
                message: format!("unknown texture format '{s}'"),
            })
    }
}

/// `2^round(log2 value)`, capped at the largest power of two a u16 holds.
#[must_use]
pub fn nearest_power_of_two(value: u16) -> u16 {
    if value <= 1 {
        return 1;
    }
    let exponent = f64::from(value).log2().round() as u32;
    1u16.checked_shl(exponent).unwrap_or(0x8000)
}

/// A decoded TEX0 resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub format: TextureFormat,
    /// Images stored, the base level included.
    pub image_count: u32,
    pub mipmap_count: u32,
    /// GX-encoded pixel data for every level.
    pub data: Vec<u8>,
}

impl Texture {
    /// A texture with zeroed pixel data sized for its format.
    #[must_use]
    pub fn blank(name: impl Into<String>, width: u16, height: u16, format: TextureFormat, mipmaps: u32) -> Self {
        let data = vec![0; format.data_size(usize::from(width), usize::from(height), mipmaps)];
        Self {
            name: name.into(),
            width,
            height,
            format,
            image_count: mipmaps + 1,
            mipmap_count: mipmaps,
            data,
        }
    }

    #[must_use]
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    /// Target size for the power-of-two fixup. Axes that already comply keep
    /// their size.
    #[must_use]
    pub fn power_of_two_size(&self) -> (u16, u16) {
        let fit = |v: u16| if v.is_power_of_two() { v } else { nearest_power_of_two(v) };
        (fit(self.width), fit(self.height))
    }

    /// Bytes the header says the pixel data should occupy.
    #[must_use]
    pub fn expected_data_size(&self) -> usize {
        self.format
            .data_size(usize::from(self.width), usize::from(self.height), self.mipmap_count)
    }

    /// Report pixel data shorter than the header requires.
    #[must_use]
    pub fn check_data_size(&self) -> Option<Fixup> {
        let expected = self.expected_data_size();
        (self.data.len() < expected).then(|| {
            Fixup::new(
                self.name.clone(),
                FixupKind::DataSizeMismatch {
                    expected,
                    actual: self.data.len(),
                },
                false,
            )
        })
    }

    /// Current value of one setting.
    #[must_use]
    pub fn setting(&self, key: TextureSettingKey) -> TextureSetting {
        match key {
            TextureSettingKey::Dimensions => TextureSetting::Dimensions {
                width: self.width,
                height: self.height,
            },
            TextureSettingKey::Format => TextureSetting::Format(self.format),
            TextureSettingKey::MipmapCount => TextureSetting::MipmapCount(self.mipmap_count),
            TextureSettingKey::Name => TextureSetting::Name(self.name.clone()),
        }
    }
}

/// Settings that can be read and changed on a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSettingKey {
    Dimensions,
    Format,
    MipmapCount,
    Name,
}

impl TextureSettingKey {
    pub const ALL: [Self; 4] = [Self::Dimensions, Self::Format, Self::MipmapCount, Self::Name];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Dimensions => "dimensions",
            Self::Format => "format",
            Self::MipmapCount => "mipmapcount",
            Self::Name => "name",
        }
    }
}

impl FromStr for TextureSettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidSetting {
                key: "texture",
                message: format!("unknown setting '{s}'"),
            })
    }
}

/// A new value for one texture setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSetting {
    Dimensions { width: u16, height: u16 },
    Format(TextureFormat),
    MipmapCount(u32),
    Name(String),
}

impl TextureSetting {
    #[must_use]
    pub fn key(&self) -> TextureSettingKey {
        match self {
            Self::Dimensions { .. } => TextureSettingKey::Dimensions,
            Self::Format(_) => TextureSettingKey::Format,
            Self::MipmapCount(_) => TextureSettingKey::MipmapCount,
            Self::Name(_) => TextureSettingKey::Name,
        }
    }

    /// Reject values no texture can hold.
    pub fn validate(&self) -> Result<()> {
        let key = self.key().label();
        let invalid = |message: String| Err(Error::InvalidSetting { key, message });
        match self {
            Self::Dimensions { width, height } if *width == 0 || *height == 0 => {
                invalid(format!("{width}x{height} has an empty axis"))
            }
            Self::MipmapCount(count) if *count > MAX_MIPMAPS => {
                invalid(format!("{count} is more than {MAX_MIPMAPS}"))
            }
            Self::Name(name) if name.is_empty() => invalid("name is empty".to_string()),
            _ => Ok(()),
        }
    }

    /// Parse a textual value such as `128x64`, `cmpr`, `4` or `road`.
    pub fn parse(key: TextureSettingKey, value: &str) -> Result<Self> {
        let value = value.trim();
        let invalid = || Error::InvalidSetting {
            key: key.label(),
            message: format!("cannot parse '{value}'"),
        };
        let setting = match key {
            TextureSettingKey::Dimensions => {
                let (width, height) = value
                    .split_once(['x', 'X', ','])
                    .ok_or_else(invalid)?;
                Self::Dimensions {
                    width: width.trim().parse().map_err(|_| invalid())?,
                    height: height.trim().parse().map_err(|_| invalid())?,
                }
            }
            TextureSettingKey::Format => Self::Format(value.parse()?),
            TextureSettingKey::MipmapCount => Self::MipmapCount(value.parse().map_err(|_| invalid())?),
            TextureSettingKey::Name => Self::Name(value.to_string()),
        };
        setting.validate()?;
        Ok(setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ids() {
        assert_eq!(TextureFormat::from_u32(14).unwrap(), TextureFormat::Cmpr);
        assert_eq!(TextureFormat::from_u32(5).unwrap(), TextureFormat::Rgb5a3);
        assert!(matches!(TextureFormat::from_u32(7), Err(Error::InvalidTextureFormat(7))));
        assert!(matches!(TextureFormat::from_u32(11), Err(Error::InvalidTextureFormat(11))));
    }

    #[test]
    fn test_format_names() {
        assert_eq!("cmpr".parse::<TextureFormat>().unwrap(), TextureFormat::Cmpr);
        assert_eq!("C14X2".parse::<TextureFormat>().unwrap(), TextureFormat::C14x2);
        assert_eq!(TextureFormat::Rgb5a3.to_string(), "RGB5A3");
        assert!("png".parse::<TextureFormat>().is_err());
    }

    #[test]
    fn test_data_sizes() {
        assert_eq!(TextureFormat::Cmpr.image_size(64, 64), 2048);
        assert_eq!(TextureFormat::Rgba32.image_size(4, 4), 64);
        // 2x2 still occupies a whole 8x4 tile
        assert_eq!(TextureFormat::I8.image_size(2, 2), 32);
        // 64 + 32 + 16 + ... down to 1, each rounded up to a tile
        assert_eq!(
            TextureFormat::Rgb565.data_size(64, 64, 2),
            64 * 64 * 2 + 32 * 32 * 2 + 16 * 16 * 2
        );
    }

    #[test]
    fn test_nearest_power_of_two() {
        assert_eq!(nearest_power_of_two(100), 128);
        assert_eq!(nearest_power_of_two(50), 64);
        assert_eq!(nearest_power_of_two(90), 64);
        assert_eq!(nearest_power_of_two(64), 64);
        assert_eq!(nearest_power_of_two(1), 1);
        assert_eq!(nearest_power_of_two(0), 1);
        assert_eq!(nearest_power_of_two(60000), 0x8000);
    }

    #[test]
    fn test_power_of_two_size_keeps_valid_axis() {
        let texture = Texture::blank("road", 100, 64, TextureFormat::Cmpr, 0);
        assert!(!texture.is_power_of_two());
        assert_eq!(texture.power_of_two_size(), (128, 64));
    }

    #[test]
    fn test_data_size_check() {
        let mut texture = Texture::blank("sky", 8, 8, TextureFormat::Rgba32, 0);
        assert!(texture.check_data_size().is_none());
        texture.data.truncate(100);
        let fixup = texture.check_data_size().unwrap();
        assert_eq!(
            fixup.kind,
            FixupKind::DataSizeMismatch {
                expected: 256,
                actual: 100
            }
        );
        assert!(!fixup.resolved);
    }

    #[test]
    fn test_settings() {
        let texture = Texture::blank("sky", 32, 16, TextureFormat::I8, 3);
        assert_eq!(
            texture.setting(TextureSettingKey::Dimensions),
            TextureSetting::Dimensions { width: 32, height: 16 }
        );
        assert_eq!(texture.setting(TextureSettingKey::MipmapCount), TextureSetting::MipmapCount(3));

        let key: TextureSettingKey = "MipMapCount".parse().unwrap();
        assert_eq!(TextureSetting::parse(key, "4").unwrap(), TextureSetting::MipmapCount(4));
        assert_eq!(
            TextureSetting::parse(TextureSettingKey::Dimensions, "128x64").unwrap(),
            TextureSetting::Dimensions { width: 128, height: 64 }
        );
        assert!(matches!(
            TextureSetting::parse(TextureSettingKey::MipmapCount, "21"),
            Err(Error::InvalidSetting { key: "mipmapcount", .. })
        ));
        assert!(TextureSetting::parse(TextureSettingKey::Dimensions, "0x4").is_err());
        assert!(TextureSetting::parse(TextureSettingKey::Dimensions, "wide").is_err());
    }
}

//! Vertex color packing
//!
//! Unlike points, the color format is chosen by the caller: precision loss in
//! colors is judged by eye, not inferred from the data.

use serde::{Deserialize, Serialize};

use super::point::{deduplicate, validate_faces};
use crate::error::{Error, Result};

/// Packed color layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum ColorFormat {
    Rgb565 = 0,
    Rgb8 = 1,
    /// RGB stored in four bytes; the fourth byte is not alpha.
    Rgbx8 = 2,
    Rgba4 = 3,
    Rgba6 = 4,
    #[default]
    Rgba8 = 5,
}

impl TryFrom<u32> for ColorFormat {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Rgb565),
            1 => Ok(Self::Rgb8),
            2 => Ok(Self::Rgbx8),
            3 => Ok(Self::Rgba4),
            4 => Ok(Self::Rgba6),
            5 => Ok(Self::Rgba8),
            _ => Err(Error::UnsupportedColorFormat(value)),
        }
    }
}

impl ColorFormat {
    /// Bytes per packed color.
    #[must_use]
    pub const fn stride(self) -> usize {
        match self {
            Self::Rgb565 | Self::Rgba4 => 2,
            Self::Rgb8 | Self::Rgba6 => 3,
            Self::Rgbx8 | Self::Rgba8 => 4,
        }
    }

    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba4 | Self::Rgba6 | Self::Rgba8)
    }

    /// Append one packed color to `out`.
    pub fn pack(self, [r, g, b, a]: [u8; 4], out: &mut Vec<u8>) {
        match self {
            Self::Rgb565 => {
                let v = u16::from(r & 0xf8) << 8 | u16::from(g & 0xfc) << 3 | u16::from(b >> 3);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::Rgb8 => out.extend_from_slice(&[r, g, b]),
            Self::Rgbx8 | Self::Rgba8 => out.extend_from_slice(&[r, g, b, a]),
            Self::Rgba4 => {
                let v = u16::from(r & 0xf0) << 8
                    | u16::from(g & 0xf0) << 4
                    | u16::from(b & 0xf0)
                    | u16::from(a >> 4);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::Rgba6 => {
                let v = u32::from(r & 0xfc) << 16
                    | u32::from(g & 0xfc) << 10
                    | u32::from(b & 0xfc) << 4
                    | u32::from(a >> 2);
                out.extend_from_slice(&v.to_be_bytes()[1..]);
            }
        }
    }

    /// Decode one packed color. Bits the format drops come back as zero;
    /// formats without alpha decode as opaque.
    #[must_use]
    pub fn unpack(self, bytes: &[u8]) -> [u8; 4] {
        match self {
            Self::Rgb565 => {
                let v = u16::from_be_bytes([bytes[0], bytes[1]]);
                [(v >> 8) as u8 & 0xf8, (v >> 3) as u8 & 0xfc, (v << 3) as u8 & 0xf8, 0xff]
            }
            Self::Rgb8 | Self::Rgbx8 => [bytes[0], bytes[1], bytes[2], 0xff],
            Self::Rgba8 => [bytes[0], bytes[1], bytes[2], bytes[3]],
            Self::Rgba4 => {
                let v = u16::from_be_bytes([bytes[0], bytes[1]]);
                [(v >> 8) as u8 & 0xf0, (v >> 4) as u8 & 0xf0, v as u8 & 0xf0, (v << 4) as u8 & 0xf0]
            }
            Self::Rgba6 => {
                let v = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
                [
                    (v >> 16) as u8 & 0xfc,
                    (v >> 10) as u8 & 0xfc,
                    (v >> 4) as u8 & 0xfc,
                    (v << 2) as u8 & 0xfc,
                ]
            }
        }
    }
}

/// RGBA colors plus the triangles indexing them.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorCollection {
    colors: Vec<[u8; 4]>,
    faces: Vec<[u32; 3]>,
    format: ColorFormat,
}

impl ColorCollection {
    pub fn new(colors: Vec<[u8; 4]>, faces: Vec<[u32; 3]>, format: ColorFormat) -> Result<Self> {
        validate_faces(&faces, colors.len())?;
        Ok(Self {
            colors,
            faces,
            format,
        })
    }

    /// Build from `[0, 1]` float channels.
    pub fn from_normalized(
        colors: &[[f32; 4]],
        faces: Vec<[u32; 3]>,
        format: ColorFormat,
    ) -> Result<Self> {
        let colors = colors
            .iter()
            .map(|c| c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect();
        Self::new(colors, faces, format)
    }

    #[must_use]
    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    #[must_use]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    #[must_use]
    pub fn format(&self) -> ColorFormat {
        self.format
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Deduplicate and pack in the collection's format.
    #[must_use]
    pub fn encode(&self) -> EncodedColors {
        let mut faces = self.faces.clone();
        let kept = deduplicate(&self.colors, &mut faces)
            .unwrap_or_else(|| (0..self.colors.len()).collect());
        let mut data = Vec::with_capacity(kept.len() * self.format.stride());
        for &original in &kept {
            self.format.pack(self.colors[original], &mut data);
        }
        EncodedColors {
            format: self.format,
            count: kept.len(),
            data,
            faces,
        }
    }
}

/// Output of [`ColorCollection::encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedColors {
    pub format: ColorFormat,
    pub count: usize,
    pub data: Vec<u8>,
    pub faces: Vec<[u32; 3]>,
}

/// Decode `count` packed colors.
pub fn decode_colors(format: ColorFormat, count: usize, data: &[u8]) -> Result<Vec<[u8; 4]>> {
    let needed = count * format.stride();
    if data.len() < needed {
        return Err(Error::Truncated {
            offset: data.len(),
            expected: needed,
        });
    }
    Ok(data[..needed]
        .chunks_exact(format.stride())
        .map(|c| format.unpack(c))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ColorFormat; 6] = [
        ColorFormat::Rgb565,
        ColorFormat::Rgb8,
        ColorFormat::Rgbx8,
        ColorFormat::Rgba4,
        ColorFormat::Rgba6,
        ColorFormat::Rgba8,
    ];

    fn kept_bits(format: ColorFormat, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
        match format {
            ColorFormat::Rgb565 => [r & 0xf8, g & 0xfc, b & 0xf8, 0xff],
            ColorFormat::Rgb8 | ColorFormat::Rgbx8 => [r, g, b, 0xff],
            ColorFormat::Rgba4 => [r & 0xf0, g & 0xf0, b & 0xf0, a & 0xf0],
            ColorFormat::Rgba6 => [r & 0xfc, g & 0xfc, b & 0xfc, a & 0xfc],
            ColorFormat::Rgba8 => [r, g, b, a],
        }
    }

    #[test]
    fn test_rgb565_packing() {
        let mut out = Vec::new();
        ColorFormat::Rgb565.pack([255, 0, 0, 255], &mut out);
        ColorFormat::Rgb565.pack([0, 255, 0, 255], &mut out);
        ColorFormat::Rgb565.pack([0, 0, 255, 255], &mut out);
        assert_eq!(out, vec![0xF8, 0x00, 0x07, 0xE0, 0x00, 0x1F]);
    }

    #[test]
    fn test_rgba4_packing() {
        // high nibble of each channel, r g b a from the top
        let mut out = Vec::new();
        ColorFormat::Rgba4.pack([0x12, 0x34, 0x56, 0x78], &mut out);
        ColorFormat::Rgba4.pack([0xff, 0x00, 0x0f, 0xf0], &mut out);
        assert_eq!(out, vec![0x13, 0x57, 0xF0, 0x0F]);
        assert_eq!(ColorFormat::Rgba4.unpack(&out[..2]), [0x10, 0x30, 0x50, 0x70]);
    }

    #[test]
    fn test_every_format_inverts_its_kept_bits() {
        let samples = [[0x12, 0x34, 0x56, 0x78], [0xff, 0x80, 0x01, 0xfe], [0, 0, 0, 0]];
        for format in ALL {
            for color in samples {
                let mut out = Vec::new();
                format.pack(color, &mut out);
                assert_eq!(out.len(), format.stride());
                assert_eq!(format.unpack(&out), kept_bits(format, color), "{format:?}");
            }
        }
    }

    #[test]
    fn test_alpha_flag_follows_format() {
        let with_alpha: Vec<_> = ALL.into_iter().filter(|f| f.has_alpha()).collect();
        assert_eq!(with_alpha, vec![ColorFormat::Rgba4, ColorFormat::Rgba6, ColorFormat::Rgba8]);
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(ColorFormat::try_from(6), Err(Error::UnsupportedColorFormat(6))));
    }

    #[test]
    fn test_encode_deduplicates() {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        let colors = ColorCollection::new(vec![red, blue, red], vec![[0, 1, 2]], ColorFormat::Rgba8)
            .unwrap();
        let encoded = colors.encode();
        assert_eq!(encoded.count, 2);
        assert_eq!(encoded.faces, vec![[0, 1, 0]]);
        assert_eq!(decode_colors(encoded.format, encoded.count, &encoded.data).unwrap(), vec![red, blue]);
    }

    #[test]
    fn test_from_normalized_rounds() {
        let colors =
            ColorCollection::from_normalized(&[[1.0, 0.5, 0.0, 0.2]], vec![], ColorFormat::Rgba8).unwrap();
        assert_eq!(colors.colors(), &[[255, 128, 0, 51]]);
    }
}

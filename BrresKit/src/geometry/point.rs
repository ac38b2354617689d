//! Point quantization
//!
//! Converts raw attribute arrays into the fixed-point, deduplicated tables
//! stored in vertex, normal and texture coordinate groups.

use std::collections::HashMap;
use std::hash::Hash;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Numeric format of one stored component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum PointFormat {
    U8 = 0,
    S8 = 1,
    U16 = 2,
    S16 = 3,
    F32 = 4,
}

impl PointFormat {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::U8),
            1 => Ok(Self::S8),
            2 => Ok(Self::U16),
            3 => Ok(Self::S16),
            4 => Ok(Self::F32),
            _ => Err(Error::InvalidPointFormat(value)),
        }
    }

    /// Bytes per component.
    #[must_use]
    pub const fn component_size(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::F32 => 4,
        }
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32)
    }
}

/// Pick the stored format and fixed-point divisor for a value range.
///
/// Doubles the largest magnitude until it reaches the 16-bit limit, backs off
/// one step, and falls back to float when fewer than six fractional bits
/// would remain.
#[must_use]
pub fn select_format(minimum: &[f32], maximum: &[f32]) -> (PointFormat, u8) {
    let point_max = maximum.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let point_min = minimum.iter().copied().fold(f32::INFINITY, f32::min);
    let signed = point_min < 0.0;
    let mut magnitude = f64::from(point_max.max(point_min.abs()));
    let limit = if signed { f64::from(0x7fff) } else { f64::from(0xffff) };
    let mut shift: i32 = 0;
    while magnitude < limit && shift < 16 {
        magnitude *= 2.0;
        shift += 1;
    }
    shift -= 1;
    if shift <= 5 {
        (PointFormat::F32, 0)
    } else if signed {
        (PointFormat::S16, shift as u8)
    } else {
        (PointFormat::U16, shift as u8)
    }
}

/// Fixed-point conversion, rounding half away from zero.
fn quantize(value: f32, divisor: u8, format: PointFormat) -> i32 {
    let scaled = (f64::from(value) * f64::from(1u32 << divisor)).round();
    match format {
        PointFormat::S16 => scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i32,
        PointFormat::U16 => scaled.clamp(0.0, f64::from(u16::MAX)) as i32,
        PointFormat::S8 => scaled.clamp(f64::from(i8::MIN), f64::from(i8::MAX)) as i32,
        PointFormat::U8 => scaled.clamp(0.0, f64::from(u8::MAX)) as i32,
        PointFormat::F32 => scaled as i32,
    }
}

/// Collapse identical keys into their first occurrence and remap `faces`.
///
/// Returns the original indices of the kept entries, or `None` when every
/// entry is unique (the data and faces are then left untouched).
pub(crate) fn deduplicate<K: Eq + Hash>(keys: &[K], faces: &mut [[u32; 3]]) -> Option<Vec<usize>> {
    let mut first_seen: HashMap<&K, u32> = HashMap::with_capacity(keys.len());
    let mut remap = Vec::with_capacity(keys.len());
    let mut kept = Vec::new();
    for (original, key) in keys.iter().enumerate() {
        let next = kept.len() as u32;
        let index = *first_seen.entry(key).or_insert_with(|| {
            kept.push(original);
            next
        });
        remap.push(index);
    }
    if kept.len() >= keys.len() {
        return None;
    }
    for face in faces.iter_mut() {
        for index in face.iter_mut() {
            *index = remap[*index as usize];
        }
    }
    Some(kept)
}

/// Check every face index against a point count.
pub(crate) fn validate_faces(faces: &[[u32; 3]], count: usize) -> Result<()> {
    match faces.iter().flatten().find(|&&i| i as usize >= count) {
        Some(index) => Err(Error::InvalidGeometry(format!(
            "face index {index} out of range for {count} points"
        ))),
        None => Ok(()),
    }
}

/// An attribute array plus the triangles indexing it.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCollection {
    width: usize,
    points: Vec<f32>,
    faces: Vec<[u32; 3]>,
}

impl PointCollection {
    /// Build a collection from flattened components.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if `points` is not a whole number of
    /// `width`-wide points or a face index is out of range.
    pub fn new(width: usize, points: Vec<f32>, faces: Vec<[u32; 3]>) -> Result<Self> {
        if width == 0 || points.len() % width != 0 {
            return Err(Error::InvalidGeometry(format!(
                "{} components do not form {width}-wide points",
                points.len()
            )));
        }
        validate_faces(&faces, points.len() / width)?;
        Ok(Self {
            width,
            points,
            faces,
        })
    }

    /// Build a collection from fixed-width points.
    pub fn from_points<const N: usize>(points: &[[f32; N]], faces: Vec<[u32; 3]>) -> Result<Self> {
        Self::new(N, points.iter().flatten().copied().collect(), faces)
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len() / self.width
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn point(&self, index: usize) -> &[f32] {
        &self.points[index * self.width..(index + 1) * self.width]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.points.chunks_exact(self.width)
    }

    #[must_use]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub(crate) fn points_mut(&mut self) -> &mut [f32] {
        &mut self.points
    }

    /// Component-wise minimum and maximum.
    #[must_use]
    pub fn bounds(&self) -> (Vec<f32>, Vec<f32>) {
        let mut minimum = vec![f32::INFINITY; self.width];
        let mut maximum = vec![f32::NEG_INFINITY; self.width];
        for point in self.iter() {
            for (i, &v) in point.iter().enumerate() {
                minimum[i] = minimum[i].min(v);
                maximum[i] = maximum[i].max(v);
            }
        }
        (minimum, maximum)
    }

    /// Quantize, deduplicate and pack the collection.
    #[must_use]
    pub fn encode(&self) -> EncodedPoints {
        let (minimum, maximum) = if self.is_empty() {
            (vec![0.0; self.width], vec![0.0; self.width])
        } else {
            self.bounds()
        };
        let (format, divisor) = select_format(&minimum, &maximum);

        let keys: Vec<Vec<u32>> = self
            .iter()
            .map(|point| {
                point
                    .iter()
                    .map(|&v| {
                        if format.is_float() {
                            // -0.0 and 0.0 are the same point
                            (v + 0.0).to_bits()
                        } else {
                            quantize(v, divisor, format) as u32
                        }
                    })
                    .collect()
            })
            .collect();

        let mut faces = self.faces.clone();
        let kept = deduplicate(&keys, &mut faces).unwrap_or_else(|| (0..keys.len()).collect());

        let mut data = Vec::with_capacity(kept.len() * self.width * format.component_size());
        for &original in &kept {
            for &bits in &keys[original] {
                match format {
                    PointFormat::F32 => data.extend_from_slice(&bits.to_be_bytes()),
                    PointFormat::S16 | PointFormat::U16 => {
                        data.extend_from_slice(&(bits as u16).to_be_bytes());
                    }
                    PointFormat::S8 | PointFormat::U8 => data.push(bits as u8),
                }
            }
        }

        EncodedPoints {
            format,
            divisor,
            width: self.width,
            stride: (self.width * format.component_size()) as u8,
            count: kept.len(),
            data,
            minimum,
            maximum,
            faces,
        }
    }
}

/// Output of [`PointCollection::encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPoints {
    pub format: PointFormat,
    pub divisor: u8,
    pub width: usize,
    /// Bytes per point.
    pub stride: u8,
    /// Points after deduplication.
    pub count: usize,
    /// Packed big-endian components.
    pub data: Vec<u8>,
    pub minimum: Vec<f32>,
    pub maximum: Vec<f32>,
    /// Faces remapped onto the deduplicated points.
    pub faces: Vec<[u32; 3]>,
}

impl EncodedPoints {
    /// Decode the packed table back to floats.
    pub fn decode(&self) -> Result<Vec<f32>> {
        decode_points(self.format, self.divisor, self.width, self.count, &self.data)
    }
}

/// Decode `count` points of `width` components stored as `format`.
///
/// # Errors
/// Returns [`Error::Truncated`] if `data` is too short.
pub fn decode_points(
    format: PointFormat,
    divisor: u8,
    width: usize,
    count: usize,
    data: &[u8],
) -> Result<Vec<f32>> {
    let size = format.component_size();
    let needed = count * width * size;
    if data.len() < needed {
        return Err(Error::Truncated {
            offset: data.len(),
            expected: needed,
        });
    }
    let scale = 1.0 / f64::from(1u32 << divisor.min(31));
    let values = data[..needed]
        .chunks_exact(size)
        .map(|c| match format {
            PointFormat::U8 => (f64::from(c[0]) * scale) as f32,
            PointFormat::S8 => (f64::from(c[0] as i8) * scale) as f32,
            PointFormat::U16 => (f64::from(BigEndian::read_u16(c)) * scale) as f32,
            PointFormat::S16 => (f64::from(BigEndian::read_i16(c)) * scale) as f32,
            PointFormat::F32 => BigEndian::read_f32(c),
        })
        .collect();
    Ok(values)
}

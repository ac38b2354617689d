//! Triangle strip encoding of polygon draw commands
//!
//! Triangles are chained greedily in input order. A triangle that shares the
//! trailing edge of the current strip (with the winding the strip expects at
//! that position) extends it by one facepoint; anything that cannot be chained
//! ends up in a single trailing list command.
//!
//! Strips follow the GX convention: triangle `k` of a strip `p` is
//! `(p[k], p[k+1], p[k+2])` for even `k` and `(p[k+1], p[k], p[k+2])` for odd
//! `k`. Input triangles are counter-clockwise; the console culls with
//! clockwise front faces, so every triangle is flipped on the way in and
//! flipped back when decoding.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Draw command tags.
pub const CMD_NOP: u8 = 0x00;
pub const CMD_TRIANGLES: u8 = 0x90;
pub const CMD_TRIANGLE_STRIP: u8 = 0x98;
pub const CMD_TRIANGLE_FAN: u8 = 0xA0;

/// Largest count a single command can carry.
const MAX_COMMAND_POINTS: usize = u16::MAX as usize;

/// One vertex's index into every active attribute group, in attribute order.
pub type FacePoint = Vec<u32>;

/// A triangle of facepoints.
pub type Triangle = [FacePoint; 3];

/// Width of one stored attribute index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Byte,
    Short,
}

impl IndexFormat {
    /// Pick the index width for a group of `count` points.
    ///
    /// # Errors
    /// Returns [`Error::IndexOverflow`] if a short index cannot address the
    /// group.
    pub fn for_count(attribute: &'static str, count: usize) -> Result<Self> {
        if count <= 0xff {
            Ok(Self::Byte)
        } else if count <= 0xffff {
            Ok(Self::Short)
        } else {
            Err(Error::IndexOverflow { attribute, count })
        }
    }

    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
        }
    }

    /// Vertex descriptor code: 2 for 8-bit indices, 3 for 16-bit.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Byte => 2,
            Self::Short => 3,
        }
    }

    /// Parse a vertex descriptor code. 0 means the attribute is not present.
    pub fn from_code(code: u32) -> Result<Option<Self>> {
        match code {
            0 => Ok(None),
            2 => Ok(Some(Self::Byte)),
            3 => Ok(Some(Self::Short)),
            _ => Err(Error::InvalidGeometry(format!(
                "unsupported attribute descriptor {code}"
            ))),
        }
    }

    fn max_index(self) -> u32 {
        match self {
            Self::Byte => 0xff,
            Self::Short => 0xffff,
        }
    }
}

/// Packed draw commands plus the totals a polygon header records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawData {
    /// Commands padded with NOPs to 32 bytes.
    pub bytes: Vec<u8>,
    /// Triangles represented.
    pub face_count: u32,
    /// Facepoints stored across all commands.
    pub facepoint_count: u32,
}

enum Pending {
    Empty,
    Lone(Triangle),
    Strip(Vec<FacePoint>),
}

/// Find `from -> to` in the winding of `triangle`, returning the third point.
fn third_after_edge<'t>(triangle: &'t Triangle, from: &FacePoint, to: &FacePoint) -> Option<&'t FacePoint> {
    (0..3)
        .find(|&i| &triangle[i] == from && &triangle[(i + 1) % 3] == to)
        .map(|i| &triangle[(i + 2) % 3])
}

/// Try to chain `next` onto a lone triangle, producing a two-triangle strip.
fn connect(lone: &Triangle, next: &Triangle) -> Option<Vec<FacePoint>> {
    (0..3).find_map(|r| {
        let x = &lone[r];
        let y = &lone[(r + 1) % 3];
        let z = &lone[(r + 2) % 3];
        // the second triangle of a strip is read as (z, y, w)
        third_after_edge(next, z, y).map(|w| vec![x.clone(), y.clone(), z.clone(), w.clone()])
    })
}

/// The facepoint that extends `strip` by `next`, if `next` continues it.
fn extend(strip: &[FacePoint], next: &Triangle) -> Option<FacePoint> {
    let n = strip.len();
    if n >= MAX_COMMAND_POINTS {
        return None;
    }
    let (a, b) = (&strip[n - 2], &strip[n - 1]);
    let k = n - 2;
    let w = if k % 2 == 0 {
        third_after_edge(next, a, b)
    } else {
        third_after_edge(next, b, a)
    };
    w.cloned()
}

fn is_degenerate(triangle: &Triangle) -> bool {
    let vertex = |i: usize| triangle[i].first();
    vertex(0) == vertex(1) || vertex(1) == vertex(2) || vertex(0) == vertex(2)
}

fn write_command(out: &mut Vec<u8>, tag: u8, points: &[FacePoint], formats: &[IndexFormat]) -> Result<()> {
    out.push(tag);
    out.extend_from_slice(&(points.len() as u16).to_be_bytes());
    for point in points {
        if point.len() != formats.len() {
            return Err(Error::InvalidGeometry(format!(
                "facepoint has {} indices, expected {}",
                point.len(),
                formats.len()
            )));
        }
        for (&index, &format) in point.iter().zip(formats) {
            if index > format.max_index() {
                return Err(Error::InvalidGeometry(format!(
                    "index {index} does not fit a {format:?} index"
                )));
            }
            match format {
                IndexFormat::Byte => out.push(index as u8),
                IndexFormat::Short => out.extend_from_slice(&(index as u16).to_be_bytes()),
            }
        }
    }
    Ok(())
}

/// Encode counter-clockwise triangles into strip and list commands.
///
/// `formats` gives the index width of each attribute, in facepoint order.
/// Degenerate triangles are dropped and not counted. When every triangle is
/// degenerate the result is empty.
///
/// # Errors
/// Returns [`Error::InvalidGeometry`] if a facepoint does not match
/// `formats` or an index is too large for its width.
pub fn encode_triangles(triangles: &[Triangle], formats: &[IndexFormat]) -> Result<DrawData> {
    let mut strips: Vec<Vec<FacePoint>> = Vec::new();
    let mut list: Vec<FacePoint> = Vec::new();
    let mut pending = Pending::Empty;
    let mut face_count = 0u32;
    let mut dropped = 0usize;

    for triangle in triangles {
        if is_degenerate(triangle) {
            dropped += 1;
            continue;
        }
        face_count += 1;
        let [a, b, c] = triangle.clone();
        let flipped = [a, c, b];
        pending = match pending {
            Pending::Empty => Pending::Lone(flipped),
            Pending::Lone(lone) => match connect(&lone, &flipped) {
                Some(strip) => Pending::Strip(strip),
                None => {
                    list.extend(lone);
                    Pending::Lone(flipped)
                }
            },
            Pending::Strip(mut strip) => match extend(&strip, &flipped) {
                Some(point) => {
                    strip.push(point);
                    Pending::Strip(strip)
                }
                None => {
                    strips.push(strip);
                    Pending::Lone(flipped)
                }
            },
        };
    }
    match pending {
        Pending::Empty => {}
        Pending::Lone(lone) => list.extend(lone),
        Pending::Strip(strip) => strips.push(strip),
    }

    if dropped > 0 {
        tracing::debug!("Dropped {} degenerate triangles", dropped);
    }
    tracing::debug!(
        "Encoded {} triangles as {} strips and {} listed triangles",
        face_count,
        strips.len(),
        list.len() / 3
    );

    let mut bytes = Vec::new();
    let mut facepoint_count = 0usize;
    for strip in &strips {
        write_command(&mut bytes, CMD_TRIANGLE_STRIP, strip, formats)?;
        facepoint_count += strip.len();
    }
    // 65535 is a multiple of three, so chunks never split a triangle
    for chunk in list.chunks(MAX_COMMAND_POINTS) {
        write_command(&mut bytes, CMD_TRIANGLES, chunk, formats)?;
        facepoint_count += chunk.len();
    }
    if !bytes.is_empty() {
        bytes.resize(crate::binfile::align_up(bytes.len(), 0x20), CMD_NOP);
    }

    Ok(DrawData {
        bytes,
        face_count,
        facepoint_count: facepoint_count as u32,
    })
}

/// Decode draw commands back into counter-clockwise triangles.
///
/// NOPs and indexed matrix loads are skipped; fans are expanded alongside
/// strips and lists.
///
/// # Errors
/// Returns [`Error::InvalidDrawCommand`] for unsupported primitives or a
/// list whose count is not a multiple of three, and [`Error::Truncated`] if
/// a command runs past the end of `bytes`.
pub fn decode_draw_commands(bytes: &[u8], formats: &[IndexFormat]) -> Result<Vec<Triangle>> {
    decode_with_direct(bytes, 0, formats)
}

/// Like [`decode_draw_commands`], for facepoints that start with `direct`
/// bytes of direct matrix indices. Those bytes are skipped.
pub(crate) fn decode_with_direct(bytes: &[u8], direct: usize, formats: &[IndexFormat]) -> Result<Vec<Triangle>> {
    let point_size: usize = direct + formats.iter().map(|f| f.size()).sum::<usize>();
    let mut triangles = Vec::new();
    let mut pos = 0;

    let need = |pos: usize, count: usize| -> Result<()> {
        if pos + count > bytes.len() {
            Err(Error::Truncated {
                offset: pos,
                expected: count,
            })
        } else {
            Ok(())
        }
    };

    while pos < bytes.len() {
        let tag = bytes[pos];
        let command_offset = pos;
        pos += 1;
        match tag {
            CMD_NOP => continue,
            // indexed position / normal / texture / light matrix loads
            0x20 | 0x28 | 0x30 | 0x38 => {
                need(pos, 4)?;
                pos += 4;
                continue;
            }
            _ => {}
        }
        let primitive = tag & 0xF8;
        if !matches!(primitive, CMD_TRIANGLES | CMD_TRIANGLE_STRIP | CMD_TRIANGLE_FAN) {
            return Err(Error::InvalidDrawCommand {
                tag,
                offset: command_offset,
            });
        }
        need(pos, 2)?;
        let count = BigEndian::read_u16(&bytes[pos..pos + 2]) as usize;
        pos += 2;
        if primitive == CMD_TRIANGLES && count % 3 != 0 {
            return Err(Error::InvalidDrawCommand {
                tag,
                offset: command_offset,
            });
        }
        need(pos, count * point_size)?;
        let mut points = Vec::with_capacity(count);
        for _ in 0..count {
            pos += direct;
            let mut point = Vec::with_capacity(formats.len());
            for format in formats {
                match format {
                    IndexFormat::Byte => point.push(u32::from(bytes[pos])),
                    IndexFormat::Short => point.push(u32::from(BigEndian::read_u16(&bytes[pos..pos + 2]))),
                }
                pos += format.size();
            }
            points.push(point);
        }

        // GX triangles are clockwise; emit them flipped back
        let mut emit = |a: &FacePoint, b: &FacePoint, c: &FacePoint| {
            triangles.push([a.clone(), c.clone(), b.clone()]);
        };
        match primitive {
            CMD_TRIANGLES => {
                for tri in points.chunks_exact(3) {
                    emit(&tri[0], &tri[1], &tri[2]);
                }
            }
            CMD_TRIANGLE_STRIP => {
                for k in 0..count.saturating_sub(2) {
                    if k % 2 == 0 {
                        emit(&points[k], &points[k + 1], &points[k + 2]);
                    } else {
                        emit(&points[k + 1], &points[k], &points[k + 2]);
                    }
                }
            }
            _ => {
                for k in 1..count.saturating_sub(1) {
                    emit(&points[0], &points[k], &points[k + 1]);
                }
            }
        }
    }
    Ok(triangles)
}

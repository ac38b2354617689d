//! Recoverable data-quality reports
//!
//! Problems that the codec can correct (or can live with) are returned as
//! [`Fixup`] values next to the result instead of failing the operation.

use std::fmt;

/// What was wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixupKind {
    /// Texture dimensions were not powers of two.
    NonPowerOfTwo {
        width: u32,
        height: u32,
        new_width: u32,
        new_height: u32,
    },
    /// An attribute group needed 16-bit indices.
    ShortIndices { attribute: &'static str, count: usize },
    /// Texture pixel data is shorter than its format and size require.
    DataSizeMismatch { expected: usize, actual: usize },
}

/// A single report about one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    /// Name of the resource or polygon concerned.
    pub subject: String,
    pub kind: FixupKind,
    /// Whether the codec corrected the problem.
    pub resolved: bool,
}

impl Fixup {
    pub fn new(subject: impl Into<String>, kind: FixupKind, resolved: bool) -> Self {
        Self {
            subject: subject.into(),
            kind,
            resolved,
        }
    }

    /// Emit the report through `tracing`.
    pub(crate) fn log(&self) {
        tracing::warn!("{}", self);
    }
}

impl fmt::Display for Fixup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FixupKind::NonPowerOfTwo {
                width,
                height,
                new_width,
                new_height,
            } => write!(
                f,
                "{}: {width}x{height} is not a power of two, resized to {new_width}x{new_height}",
                self.subject
            ),
            FixupKind::ShortIndices { attribute, count } => write!(
                f,
                "{}: {count} {attribute} points need 16-bit indices",
                self.subject
            ),
            FixupKind::DataSizeMismatch { expected, actual } => write!(
                f,
                "{}: pixel data is {actual} bytes, format needs {expected}",
                self.subject
            ),
        }?;
        if !self.resolved {
            f.write_str(" (unresolved)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let fixup = Fixup::new(
            "road",
            FixupKind::NonPowerOfTwo {
                width: 100,
                height: 50,
                new_width: 128,
                new_height: 64,
            },
            true,
        );
        assert_eq!(fixup.to_string(), "road: 100x50 is not a power of two, resized to 128x64");

        let fixup = Fixup::new("sky", FixupKind::DataSizeMismatch { expected: 64, actual: 32 }, false);
        assert_eq!(fixup.to_string(), "sky: pixel data is 32 bytes, format needs 64 (unresolved)");
    }
}

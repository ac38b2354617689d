//! Codec configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Options controlling how geometry and textures are converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Resize non-power-of-two textures when they are added
    pub resize_to_pow_two: bool,
    /// Path to the external texture tool.
    /// If None, `wimgt` is searched for on `PATH`
    pub texture_tool: Option<PathBuf>,
    /// Drop normals when encoding or decoding geometry
    pub skip_normals: bool,
    /// Drop vertex colors when encoding or decoding geometry
    pub skip_colors: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            resize_to_pow_two: true,
            texture_tool: None,
            skip_normals: false,
            skip_colors: false,
        }
    }
}

impl CodecOptions {
    /// Load options from a JSON string. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns [`Error::Json`](crate::Error::Json) if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load options from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Use a specific texture tool binary
    #[must_use]
    pub fn with_texture_tool(mut self, path: impl Into<PathBuf>) -> Self {
        self.texture_tool = Some(path.into());
        self
    }

    /// Keep non-power-of-two textures as they are
    #[must_use]
    pub fn no_resize(mut self) -> Self {
        self.resize_to_pow_two = false;
        self
    }

    /// Drop normals
    #[must_use]
    pub fn no_normals(mut self) -> Self {
        self.skip_normals = true;
        self
    }

    /// Drop vertex colors
    #[must_use]
    pub fn no_colors(mut self) -> Self {
        self.skip_colors = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = CodecOptions::from_json_str(r#"{ "skip_colors": true }"#).unwrap();
        assert!(options.skip_colors);
        assert!(options.resize_to_pow_two);
        assert_eq!(options.texture_tool, None);
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codec.json");
        let options = CodecOptions::default().with_texture_tool("/opt/wimgt").no_normals();
        std::fs::write(&path, serde_json::to_string_pretty(&options).unwrap()).unwrap();
        assert_eq!(CodecOptions::from_json_file(&path).unwrap(), options);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            CodecOptions::from_json_str("{ resize"),
            Err(crate::Error::Json(_))
        ));
    }
}

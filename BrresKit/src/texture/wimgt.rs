//! `wimgt` command-line strategy
//!
//! Every call writes its input to a scratch file, blocks on the tool and
//! reads the result back. Scratch files are removed when they drop.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;

use super::converter::{ImageConverter, scratch_file};
use super::{Texture, TextureFormat, texture_from_bytes, texture_to_bytes};
use crate::error::{Error, Result};

/// Runs the `wimgt` image tool.
#[derive(Debug, Clone)]
pub struct WimgtConverter {
    program: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl WimgtConverter {
    /// Executable name searched for on `PATH`.
    pub const PROGRAM: &'static str = "wimgt";

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_dir: None,
        }
    }

    /// Keep scratch files in `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, args: &[&OsStr]) -> Result<()> {
        tracing::debug!(
            "Running {} {}",
            self.program.display(),
            args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );
        let output = Command::new(&self.program).args(args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!("{} failed: {}", self.program.display(), stderr.trim());
            return Err(Error::ConverterFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
            });
        }
        Ok(())
    }

    fn write_scratch(&self, texture: &Texture) -> Result<NamedTempFile> {
        let file = scratch_file(self.scratch_dir(), ".tex0")?;
        std::fs::write(file.path(), texture_to_bytes(texture))?;
        Ok(file)
    }
}

fn mipmap_arg(mipmaps: Option<u32>) -> String {
    match mipmaps {
        Some(count) => format!("--n-mm={count}"),
        None => "--n-mm=auto".to_string(),
    }
}

impl ImageConverter for WimgtConverter {
    fn name(&self) -> &str {
        Self::PROGRAM
    }

    fn is_available(&self) -> bool {
        self.program.is_file()
    }

    fn scratch_dir(&self) -> Option<&Path> {
        self.scratch_dir.as_deref()
    }

    fn encode(&mut self, image: &Path, format: TextureFormat, mipmaps: Option<u32>) -> Result<Texture> {
        let dest = scratch_file(self.scratch_dir(), ".tex0")?;
        let mipmaps = mipmap_arg(mipmaps);
        self.run(&[
            OsStr::new("encode"),
            image.as_os_str(),
            OsStr::new("-d"),
            dest.path().as_os_str(),
            OsStr::new("-x"),
            OsStr::new(format.name()),
            OsStr::new(&mipmaps),
            OsStr::new("-o"),
        ])?;
        texture_from_bytes(&std::fs::read(dest.path())?)
    }

    fn decode(&mut self, texture: &Texture, dest: &Path) -> Result<()> {
        let source = self.write_scratch(texture)?;
        self.run(&[
            OsStr::new("decode"),
            source.path().as_os_str(),
            OsStr::new("-d"),
            dest.as_os_str(),
            OsStr::new("-o"),
        ])
    }

    /// Convert in place without a PNG round trip.
    fn convert(&mut self, texture: &Texture, format: TextureFormat) -> Result<Texture> {
        let source = self.write_scratch(texture)?;
        self.run(&[
            OsStr::new("encode"),
            source.path().as_os_str(),
            OsStr::new("-o"),
            OsStr::new("-x"),
            OsStr::new(format.name()),
        ])?;
        let mut converted = texture_from_bytes(&std::fs::read(source.path())?)?;
        converted.name.clone_from(&texture.name);
        Ok(converted)
    }
}

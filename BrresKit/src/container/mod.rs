//! BRRES container
//!
//! ```text
//! 0x00  "bres"
//! 0x04  byte order mark  u16  0xFEFF
//! 0x06  padding          u16
//! 0x08  file length      u32
//! 0x0C  root offset      u16  0x10
//! 0x0E  section count    u16  (root + subfiles)
//! 0x10  "root"
//! 0x14  root length      u32
//! 0x18  folder group     index group, one entry per folder
//! ....  resource groups  one index group per folder, pointing at subfiles
//! ....  subfiles, each 32-byte aligned
//! ....  string table
//! ```
//!
//! Folders are named after the resource kind, `3DModels(NW4R)` and
//! `Textures(NW4R)`. See [`crate::binfile::read_group`] for the group layout.

mod reader;
mod writer;

pub use reader::{decode_container, decode_container_partial, read_container};
pub use writer::{encode_container, write_container};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::subfile::SubfileKind;
use crate::texture::Texture;

pub(crate) const FILE_MAGIC: &[u8; 4] = b"bres";
pub(crate) const ROOT_MAGIC: &[u8; 4] = b"root";
pub(crate) const BYTE_ORDER_MARK: u16 = 0xFEFF;
pub(crate) const ROOT_OFFSET: u16 = 0x10;

/// A decoded BRRES file: named models and textures in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    /// Label for logs, taken from the file name. Not stored in the file.
    pub name: String,
    pub models: IndexMap<String, Model>,
    pub textures: IndexMap<String, Texture>,
}

impl Container {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Number of subfiles of every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len() + self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a model under its own name.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateResource`] if the name is taken.
    pub fn insert_model(&mut self, model: Model) -> Result<()> {
        if self.models.contains_key(&model.name) {
            return Err(Error::DuplicateResource(model.name));
        }
        self.models.insert(model.name.clone(), model);
        Ok(())
    }

    /// Add a texture as is. [`Codec::add_texture`](crate::Codec::add_texture)
    /// also runs the fixup pass.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateResource`] if the name is taken.
    pub fn insert_texture(&mut self, texture: Texture) -> Result<()> {
        if self.textures.contains_key(&texture.name) {
            return Err(Error::DuplicateResource(texture.name));
        }
        self.textures.insert(texture.name.clone(), texture);
        Ok(())
    }

    /// # Errors
    /// Returns [`Error::ResourceNotFound`] if there is no such model.
    pub fn model(&self, name: &str) -> Result<&Model> {
        self.models
            .get(name)
            .ok_or_else(|| Error::ResourceNotFound(format!("{}/{name}", SubfileKind::Model.folder())))
    }

    /// # Errors
    /// Returns [`Error::ResourceNotFound`] if there is no such model.
    pub fn model_mut(&mut self, name: &str) -> Result<&mut Model> {
        self.models
            .get_mut(name)
            .ok_or_else(|| Error::ResourceNotFound(format!("{}/{name}", SubfileKind::Model.folder())))
    }

    /// # Errors
    /// Returns [`Error::ResourceNotFound`] if there is no such texture.
    pub fn texture(&self, name: &str) -> Result<&Texture> {
        self.textures
            .get(name)
            .ok_or_else(|| Error::ResourceNotFound(format!("{}/{name}", SubfileKind::Texture.folder())))
    }

    /// # Errors
    /// Returns [`Error::ResourceNotFound`] if there is no such texture.
    pub fn texture_mut(&mut self, name: &str) -> Result<&mut Texture> {
        self.textures
            .get_mut(name)
            .ok_or_else(|| Error::ResourceNotFound(format!("{}/{name}", SubfileKind::Texture.folder())))
    }

    pub fn remove_model(&mut self, name: &str) -> Option<Model> {
        self.models.shift_remove(name)
    }

    pub fn remove_texture(&mut self, name: &str) -> Option<Texture> {
        self.textures.shift_remove(name)
    }

    /// Rename a texture in place, keeping its position.
    ///
    /// # Errors
    /// Returns [`Error::ResourceNotFound`] or [`Error::DuplicateResource`].
    pub fn rename_texture(&mut self, name: &str, new_name: &str) -> Result<()> {
        if name == new_name {
            return self.texture(name).map(|_| ());
        }
        if self.textures.contains_key(new_name) {
            return Err(Error::DuplicateResource(new_name.to_string()));
        }
        self.texture(name)?;
        self.textures = std::mem::take(&mut self.textures)
            .into_iter()
            .map(|(key, mut texture)| {
                if key == name {
                    texture.name = new_name.to_string();
                    (new_name.to_string(), texture)
                } else {
                    (key, texture)
                }
            })
            .collect();
        Ok(())
    }
}

//! Bone hierarchy
//!
//! Bones live in a flat arena and link to each other by index: a parent, a
//! first child and a next sibling, the same links MDL0 stores on disk.
//! Traversals use an explicit stack and report malformed link structures as
//! [`Error::BoneCycle`] instead of looping.

use std::collections::HashSet;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::error::{Error, Result};

/// Index of a bone in its skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneId(pub u16);

impl BoneId {
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Link value stored on disk, `-1` for none.
    pub(crate) fn to_link(id: Option<Self>) -> i32 {
        id.map_or(-1, |id| i32::from(id.0))
    }

    pub(crate) fn from_link(link: i32, count: usize) -> Result<Option<Self>> {
        match link {
            -1 => Ok(None),
            l if l >= 0 && (l as usize) < count => Ok(Some(Self(l as u16))),
            l => Err(Error::InvalidBoneIndex(l)),
        }
    }
}

/// Bone flag: the bone has no scale, rotation or translation.
pub const BONE_IDENTITY: u32 = 0x1;
/// Bone flag: the bone is drawn.
pub const BONE_VISIBLE: u32 = 0x100;

/// One node of a skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<BoneId>,
    pub first_child: Option<BoneId>,
    pub next_sibling: Option<BoneId>,
    /// Entry of the model's matrix table this bone drives.
    pub matrix_id: u32,
    pub flags: u32,
    pub billboard: u32,
    pub scale: Vec3,
    /// Euler angles in degrees, applied X then Y then Z.
    pub rotation: Vec3,
    pub translation: Vec3,
    /// Bounding box of the geometry drawn with this bone.
    pub minimum: Vec3,
    pub maximum: Vec3,
}

impl Bone {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            first_child: None,
            next_sibling: None,
            matrix_id: 0,
            flags: BONE_VISIBLE,
            billboard: 0,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
            translation: Vec3::ZERO,
            minimum: Vec3::ZERO,
            maximum: Vec3::ZERO,
        }
    }

    /// Transform relative to the parent bone.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        let r = self.rotation * (std::f32::consts::PI / 180.0);
        let rotation = Quat::from_euler(EulerRot::ZYX, r.z, r.y, r.x);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.translation)
    }
}

/// Arena of bones addressed by [`BoneId`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    bones: Vec<Bone>,
}

impl Skeleton {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt bones read from a file, checking every link.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBoneIndex`] for a dangling link and
    /// [`Error::BoneCycle`] if the links do not form a forest.
    pub fn from_bones(bones: Vec<Bone>) -> Result<Self> {
        if bones.len() > usize::from(u16::MAX) {
            return Err(Error::InvalidBoneIndex(bones.len() as i32));
        }
        let skeleton = Self { bones };
        skeleton.depth_first()?;
        Ok(skeleton)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[must_use]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[must_use]
    pub fn get(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id.index())
    }

    pub fn get_mut(&mut self, id: BoneId) -> Option<&mut Bone> {
        self.bones.get_mut(id.index())
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<BoneId> {
        self.bones.iter().position(|b| b.name == name).map(|i| BoneId(i as u16))
    }

    fn bone(&self, id: BoneId) -> Result<&Bone> {
        self.get(id).ok_or(Error::InvalidBoneIndex(i32::from(id.0)))
    }

    /// Append a bone as the last child of `parent`.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateResource`] if the name is taken and
    /// [`Error::InvalidBoneIndex`] if `parent` does not exist.
    pub fn add_bone(&mut self, name: &str, parent: Option<BoneId>) -> Result<BoneId> {
        if self.find(name).is_some() {
            return Err(Error::DuplicateResource(name.to_string()));
        }
        if self.bones.len() >= usize::from(u16::MAX) {
            return Err(Error::InvalidBoneIndex(self.bones.len() as i32));
        }
        let id = BoneId(self.bones.len() as u16);

        if let Some(parent_id) = parent {
            let mut last = None;
            let mut next = self.bone(parent_id)?.first_child;
            let mut steps = 0;
            while let Some(child) = next {
                steps += 1;
                if steps > self.bones.len() {
                    return Err(Error::BoneCycle(child.0));
                }
                last = Some(child);
                next = self.bone(child)?.next_sibling;
            }
            match last {
                Some(sibling) => self.bones[sibling.index()].next_sibling = Some(id),
                None => self.bones[parent_id.index()].first_child = Some(id),
            }
        }

        let mut bone = Bone::new(name);
        bone.parent = parent;
        bone.matrix_id = u32::from(id.0);
        self.bones.push(bone);
        tracing::debug!("Added bone {} ({:?}) under {:?}", name, id, parent);
        Ok(id)
    }

    /// Bones without a parent, in index order.
    pub fn roots(&self) -> impl Iterator<Item = BoneId> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(i, _)| BoneId(i as u16))
    }

    /// Pre-order traversal over every root's subtree.
    ///
    /// # Errors
    /// Returns [`Error::BoneCycle`] if a bone is reached twice or cannot be
    /// reached from any root, and [`Error::InvalidBoneIndex`] for a link past
    /// the end of the arena.
    pub fn depth_first(&self) -> Result<Vec<BoneId>> {
        let mut order = Vec::with_capacity(self.bones.len());
        let mut visited = HashSet::with_capacity(self.bones.len());
        let mut stack: Vec<BoneId> = self.roots().collect();
        stack.reverse();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                return Err(Error::BoneCycle(id.0));
            }
            order.push(id);
            let mut children = Vec::new();
            let mut next = self.bone(id)?.first_child;
            while let Some(child) = next {
                if children.contains(&child) || children.len() > self.bones.len() {
                    return Err(Error::BoneCycle(child.0));
                }
                children.push(child);
                next = self.bone(child)?.next_sibling;
            }
            stack.extend(children.into_iter().rev());
        }

        if let Some(orphan) = (0..self.bones.len()).map(|i| BoneId(i as u16)).find(|id| !visited.contains(id)) {
            return Err(Error::BoneCycle(orphan.0));
        }
        Ok(order)
    }

    /// Model-space transform of a bone, composed from the root down.
    ///
    /// # Errors
    /// Returns [`Error::BoneCycle`] if the parent chain loops.
    pub fn world_matrix(&self, id: BoneId) -> Result<Mat4> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(bone_id) = current {
            if chain.len() > self.bones.len() {
                return Err(Error::BoneCycle(bone_id.0));
            }
            let bone = self.bone(bone_id)?;
            chain.push(bone);
            current = bone.parent;
        }
        Ok(chain
            .iter()
            .rev()
            .fold(Mat4::IDENTITY, |world, bone| world * bone.local_matrix()))
    }
}

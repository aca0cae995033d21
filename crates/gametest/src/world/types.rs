use std::fmt;

use serde::{Deserialize, Serialize};

pub const CHUNK_SIZE: i32 = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const ORIGIN: BlockPos = BlockPos { x: 0, y: 0, z: 0 };

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    pub fn add(self, other: BlockPos) -> Self {
        self.offset(other.x, other.y, other.z)
    }

    pub fn subtract(self, other: BlockPos) -> Self {
        self.offset(-other.x, -other.y, -other.z)
    }

    pub fn chunk(self) -> ChunkPos {
        ChunkPos {
            x: self.x.div_euclid(CHUNK_SIZE),
            z: self.z.div_euclid(CHUNK_SIZE),
        }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Extent {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn is_empty(&self) -> bool {
        self.x <= 0 || self.y <= 0 || self.z <= 0
    }
}

/// Inclusive on both corners: a 1x1x1 box has `min == max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    min: BlockPos,
    max: BlockPos,
}

impl BoundingBox {
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn at(pos: BlockPos) -> Self {
        Self { min: pos, max: pos }
    }

    pub fn of_structure(origin: BlockPos, size: Extent, rotation: Rotation) -> Self {
        let rotated = rotation.rotate_extent(size);
        Self::from_corners(
            origin,
            origin.offset(
                (rotated.x - 1).max(0),
                (rotated.y - 1).max(0),
                (rotated.z - 1).max(0),
            ),
        )
    }

    pub fn min(&self) -> BlockPos {
        self.min
    }

    pub fn max(&self) -> BlockPos {
        self.max
    }

    pub fn x_size(&self) -> i32 {
        self.max.x - self.min.x + 1
    }

    pub fn y_size(&self) -> i32 {
        self.max.y - self.min.y + 1
    }

    pub fn z_size(&self) -> i32 {
        self.max.z - self.min.z + 1
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn inflated(&self, amount: i32) -> Self {
        Self {
            min: self.min.offset(-amount, -amount, -amount),
            max: self.max.offset(amount, amount, amount),
        }
    }

    pub fn encapsulate(&self, other: &BoundingBox) -> Self {
        Self::from_corners(
            BlockPos::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            BlockPos::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        )
    }

    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> {
        let min = self.min.chunk();
        let max = self.max.chunk();
        (min.x..=max.x).flat_map(move |x| (min.z..=max.z).map(move |z| ChunkPos { x, z }))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    CounterClockwise90,
}

impl Rotation {
    pub fn rotate_extent(self, size: Extent) -> Extent {
        match self {
            Rotation::None | Rotation::Clockwise180 => size,
            Rotation::Clockwise90 | Rotation::CounterClockwise90 => Extent::new(size.z, size.y, size.x),
        }
    }

    /// Maps a structure-local offset into the rotated footprint, keeping the
    /// result inside `[0, rotated size)` on every axis.
    pub fn rotate_local(self, local: BlockPos, size: Extent) -> BlockPos {
        match self {
            Rotation::None => local,
            Rotation::Clockwise90 => BlockPos::new(size.z - 1 - local.z, local.y, local.x),
            Rotation::Clockwise180 => {
                BlockPos::new(size.x - 1 - local.x, local.y, size.z - 1 - local.z)
            }
            Rotation::CounterClockwise90 => BlockPos::new(local.z, local.y, size.x - 1 - local.x),
        }
    }

    pub fn inverse(self) -> Rotation {
        match self {
            Rotation::None => Rotation::None,
            Rotation::Clockwise90 => Rotation::CounterClockwise90,
            Rotation::Clockwise180 => Rotation::Clockwise180,
            Rotation::CounterClockwise90 => Rotation::Clockwise90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: String,
    pub pos: BlockPos,
    pub is_player: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Thunder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureTemplate {
    pub id: String,
    pub size: Extent,
}

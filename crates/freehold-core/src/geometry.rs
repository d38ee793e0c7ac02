//! Integer block geometry
//!
//! Regions are axis-aligned boxes of whole blocks. All containment is
//! inclusive on both corners: a 1x1x1 region contains exactly one block.
//! The "column" variants ignore the vertical axis and match the claim
//! footprint at any height.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A block coordinate in a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A face of a region, for one-sided resizing
///
/// Axis convention: north = -z, south = +z, east = +x, west = -x,
/// up = +y, down = -y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    /// Unit offset along this direction
    pub fn offset(&self) -> (i32, i32, i32) {
        match self {
            Direction::North => (0, 0, -1),
            Direction::South => (0, 0, 1),
            Direction::East => (1, 0, 0),
            Direction::West => (-1, 0, 0),
            Direction::Up => (0, 1, 0),
            Direction::Down => (0, -1, 0),
        }
    }

    pub fn is_vertical(&self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        };
        write!(f, "{}", name)
    }
}

/// An axis-aligned box of blocks, corners inclusive
///
/// The `min <= max` invariant holds componentwise for every constructed
/// value; [`Cuboid::from_corners`] normalizes arbitrary corner pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cuboid {
    min: BlockPos,
    max: BlockPos,
}

impl Cuboid {
    /// Build from two arbitrary opposite corners, normalizing per axis
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Build from an already-ordered corner pair; `None` if any axis is inverted
    pub fn from_min_max(min: BlockPos, max: BlockPos) -> Option<Self> {
        if min.x <= max.x && min.y <= max.y && min.z <= max.z {
            Some(Self { min, max })
        } else {
            None
        }
    }

    pub fn min(&self) -> BlockPos {
        self.min
    }

    pub fn max(&self) -> BlockPos {
        self.max
    }

    /// Whether the point is inside this box
    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    /// Whether the point is inside the horizontal footprint, at any height
    pub fn contains_column(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x && pos.x <= self.max.x && pos.z >= self.min.z && pos.z <= self.max.z
    }

    /// Whether the two boxes share at least one block
    pub fn intersects(&self, other: &Cuboid) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether the horizontal footprints overlap, ignoring height
    pub fn intersects_column(&self, other: &Cuboid) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `other` lies entirely inside this box
    pub fn encloses(&self, other: &Cuboid) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Width along x, in blocks
    pub fn width(&self) -> u64 {
        (self.max.x as i64 - self.min.x as i64 + 1) as u64
    }

    /// Depth along z, in blocks
    pub fn depth(&self) -> u64 {
        (self.max.z as i64 - self.min.z as i64 + 1) as u64
    }

    /// Height along y, in blocks
    pub fn height(&self) -> u64 {
        (self.max.y as i64 - self.min.y as i64 + 1) as u64
    }

    /// Horizontal footprint area in blocks, the claim-block unit of account
    pub fn footprint_area(&self) -> u64 {
        let area = self.width() as u128 * self.depth() as u128;
        u64::try_from(area).unwrap_or(u64::MAX)
    }

    /// Move one face outward by `amount` blocks (inward when negative)
    ///
    /// Returns `None` when the result would be inverted or overflow the
    /// coordinate range.
    pub fn grown(&self, direction: Direction, amount: i32) -> Option<Cuboid> {
        let mut min = self.min;
        let mut max = self.max;
        match direction {
            Direction::North => min.z = min.z.checked_sub(amount)?,
            Direction::South => max.z = max.z.checked_add(amount)?,
            Direction::East => max.x = max.x.checked_add(amount)?,
            Direction::West => min.x = min.x.checked_sub(amount)?,
            Direction::Up => max.y = max.y.checked_add(amount)?,
            Direction::Down => min.y = min.y.checked_sub(amount)?,
        }
        Cuboid::from_min_max(min, max)
    }
}

impl Display for Cuboid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// Every block cell a straight segment between two block centers passes
/// through, in order, endpoints included
///
/// Standard voxel traversal: advance whichever axis boundary the segment
/// reaches first. Used to detect region boundary crossings along a line
/// of effect.
pub fn walk_segment(a: BlockPos, b: BlockPos) -> Vec<BlockPos> {
    let mut cells = vec![a];
    if a == b {
        return cells;
    }

    let dx = b.x as f64 - a.x as f64;
    let dy = b.y as f64 - a.y as f64;
    let dz = b.z as f64 - a.z as f64;
    let length = (dx * dx + dy * dy + dz * dz).sqrt();

    let step_x = (dx as i64).signum() as i32;
    let step_y = (dy as i64).signum() as i32;
    let step_z = (dz as i64).signum() as i32;

    let t_delta_x = if step_x == 0 { f64::INFINITY } else { length / dx.abs() };
    let t_delta_y = if step_y == 0 { f64::INFINITY } else { length / dy.abs() };
    let t_delta_z = if step_z == 0 { f64::INFINITY } else { length / dz.abs() };

    // Starting from a cell center, the first boundary is half a cell out.
    let mut t_max_x = t_delta_x / 2.0;
    let mut t_max_y = t_delta_y / 2.0;
    let mut t_max_z = t_delta_z / 2.0;

    let (mut x, mut y, mut z) = (a.x, a.y, a.z);
    let total_steps = (b.x as i64 - a.x as i64).unsigned_abs()
        + (b.y as i64 - a.y as i64).unsigned_abs()
        + (b.z as i64 - a.z as i64).unsigned_abs();

    for _ in 0..total_steps {
        if t_max_x <= t_max_y && t_max_x <= t_max_z {
            x += step_x;
            t_max_x += t_delta_x;
        } else if t_max_y <= t_max_z {
            y += step_y;
            t_max_y += t_delta_y;
        } else {
            z += step_z;
            t_max_z += t_delta_z;
        }
        cells.push(BlockPos::new(x, y, z));
        if x == b.x && y == b.y && z == b.z {
            break;
        }
    }
    cells
}

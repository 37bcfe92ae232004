use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{parse_i32, FieldParseError};

/// Integer 2D vector. Used both as a world coordinate and as the extent of a
/// rectangle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True when `self` lies inside the half-open rectangle starting at
    /// `top_left` with extent `size`.
    pub fn is_in_area(self, top_left: Position, size: Position) -> bool {
        let (dx, dy) = self.offset_from(top_left);
        dx >= 0 && dy >= 0 && dx < i64::from(size.x) && dy < i64::from(size.y)
    }

    /// `self - origin` computed without overflow.
    fn offset_from(self, origin: Position) -> (i64, i64) {
        (
            i64::from(self.x) - i64::from(origin.x),
            i64::from(self.y) - i64::from(origin.y),
        )
    }

    /// Uniform point in `[0, max.x) x [0, max.y)`; the origin when either
    /// extent is not positive.
    pub fn random_within<R: Rng + ?Sized>(max: Position, rng: &mut R) -> Position {
        if max.x <= 0 || max.y <= 0 {
            return Position::ORIGIN;
        }
        Position::new(rng.gen_range(0..max.x), rng.gen_range(0..max.y))
    }

    pub fn distance(self, other: Position) -> f64 {
        let d = self - other;
        ((d.x as f64).powi(2) + (d.y as f64).powi(2)).sqrt()
    }
}

/// Saturates at the `i32` range.
impl Add for Position {
    type Output = Position;

    fn add(self, other: Position) -> Position {
        Position::new(self.x.saturating_add(other.x), self.y.saturating_add(other.y))
    }
}

/// Saturates at the `i32` range.
impl Sub for Position {
    type Output = Position;

    fn sub(self, other: Position) -> Position {
        Position::new(self.x.saturating_sub(other.x), self.y.saturating_sub(other.y))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for Position {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(x), Some(y), None) => Ok(Position::new(
                parse_i32(x, "position x")?,
                parse_i32(y, "position y")?,
            )),
            _ => Err(FieldParseError::Arity {
                value: s.to_string(),
                context: "position",
                expected: 2,
            }),
        }
    }
}

/// Half-open rectangle of world cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Area {
    pub top_left: Position,
    pub size: Position,
}

impl Area {
    pub const fn new(top_left: Position, size: Position) -> Self {
        Self { top_left, size }
    }

    /// Area anchored at the origin.
    pub const fn from_size(size: Position) -> Self {
        Self {
            top_left: Position::ORIGIN,
            size,
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        position.is_in_area(self.top_left, self.size)
    }

    pub fn bottom_right(&self) -> Position {
        self.top_left + self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size.x <= 0 || self.size.y <= 0
    }

    pub fn cell_count(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.size.x as usize * self.size.y as usize
        }
    }

    /// Overlap of two areas. Disjoint areas yield an empty area positioned at
    /// the clamped corner.
    pub fn intersection(&self, other: &Area) -> Area {
        let top_left = Position::new(
            self.top_left.x.max(other.top_left.x),
            self.top_left.y.max(other.top_left.y),
        );
        let extent = |start: i32, a: (i32, i32), b: (i32, i32)| -> i32 {
            let end = (i64::from(a.0) + i64::from(a.1)).min(i64::from(b.0) + i64::from(b.1));
            // never wider than either input, so it fits back into i32
            i32::try_from((end - i64::from(start)).max(0)).unwrap_or(0)
        };
        let size = Position::new(
            extent(
                top_left.x,
                (self.top_left.x, self.size.x),
                (other.top_left.x, other.size.x),
            ),
            extent(
                top_left.y,
                (self.top_left.y, self.size.y),
                (other.top_left.y, other.size.y),
            ),
        );
        Area::new(top_left, size)
    }

    /// Cells of the area, column by column (x outer, y inner). Cells past
    /// the `i32` range are skipped.
    pub fn positions(&self) -> impl Iterator<Item = Position> {
        let area = *self;
        let (w, h) = if area.is_empty() {
            (0, 0)
        } else {
            (area.size.x, area.size.y)
        };
        let column = move |dx: i32| i32::try_from(i64::from(area.top_left.x) + i64::from(dx)).ok();
        let row = move |dy: i32| i32::try_from(i64::from(area.top_left.y) + i64::from(dy)).ok();
        (0..w)
            .filter_map(column)
            .flat_map(move |x| (0..h).filter_map(row).map(move |y| Position::new(x, y)))
    }

    /// Column-major offset of `position` inside the area.
    pub fn index_of(&self, position: Position) -> Option<usize> {
        if !self.contains(position) {
            return None;
        }
        let (dx, dy) = position.offset_from(self.top_left);
        Some(dx as usize * self.size.y as usize + dy as usize)
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.top_left, self.size)
    }
}

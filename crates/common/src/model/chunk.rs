// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Chunk coordinates in their packed 64-bit key form, and the derived
//! bounding-box type.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The set type used for claim footprints. Chunk keys hash as a single
/// 64-bit value so membership checks on the hot block-event path stay O(1).
pub type ChunkSet = ahash::AHashSet<ChunkKey>;

/// One horizontal chunk position, packed as `(x << 32) | (z & 0xFFFFFFFF)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey(u64);

impl ChunkKey {
    #[must_use]
    pub fn new(x: i32, z: i32) -> Self {
        Self((((x as u32) as u64) << 32) | ((z as u32) as u64))
    }

    #[must_use]
    pub fn from_packed(packed: u64) -> Self {
        Self(packed)
    }

    #[must_use]
    pub fn packed(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn x(&self) -> i32 {
        (self.0 >> 32) as u32 as i32
    }

    #[must_use]
    pub fn z(&self) -> i32 {
        self.0 as u32 as i32
    }
}

impl Display for ChunkKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x(), self.z())
    }
}

// Persisted as a coordinate pair rather than the packed form, so world
// documents stay human-readable and portable across key encodings.
impl Serialize for ChunkKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.x(), self.z()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChunkKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (x, z) = <(i32, i32)>::deserialize(deserializer)?;
        Ok(Self::new(x, z))
    }
}

/// Serde adapter for chunk sets: serialized as a sorted list of `[x, z]`
/// pairs so a world document's bytes are stable across saves.
pub mod chunk_set_serde {
    use super::{ChunkKey, ChunkSet};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(set: &ChunkSet, serializer: S) -> Result<S::Ok, S::Error> {
        let mut chunks: Vec<ChunkKey> = set.iter().copied().collect();
        chunks.sort_unstable();
        chunks.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ChunkSet, D::Error> {
        Ok(Vec::<ChunkKey>::deserialize(deserializer)?
            .into_iter()
            .collect())
    }
}

/// Enumerate every chunk inside the rectangle spanned by two corners,
/// inclusive. Corner order is normalized first, so callers can pass the
/// player's first and second selection in either order.
#[must_use]
pub fn enumerate_rect(from: (i32, i32), to: (i32, i32)) -> ChunkSet {
    let (min_x, max_x) = (from.0.min(to.0), from.0.max(to.0));
    let (min_z, max_z) = (from.1.min(to.1), from.1.max(to.1));
    let mut chunks = ChunkSet::default();
    for x in min_x..=max_x {
        for z in min_z..=max_z {
            chunks.insert(ChunkKey::new(x, z));
        }
    }
    chunks
}

/// Min/max chunk extent of a claim. Derived from the chunk set and cached on
/// the record for display purposes only; never authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    pub min_x: i32,
    pub min_z: i32,
    pub max_x: i32,
    pub max_z: i32,
}

impl ChunkBounds {
    /// Compute the extent of a set of chunks. Empty sets yield a degenerate
    /// zero bound; live records never have one.
    #[must_use]
    pub fn of(chunks: &ChunkSet) -> Self {
        let mut iter = chunks.iter();
        let Some(first) = iter.next() else {
            return Self {
                min_x: 0,
                min_z: 0,
                max_x: 0,
                max_z: 0,
            };
        };
        let mut bounds = Self {
            min_x: first.x(),
            min_z: first.z(),
            max_x: first.x(),
            max_z: first.z(),
        };
        for c in iter {
            bounds.min_x = bounds.min_x.min(c.x());
            bounds.min_z = bounds.min_z.min(c.z());
            bounds.max_x = bounds.max_x.max(c.x());
            bounds.max_z = bounds.max_z.max(c.z());
        }
        bounds
    }

    /// Extent along X, in chunks, inclusive.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.max_x.abs_diff(self.min_x) + 1
    }

    /// Extent along Z, in chunks, inclusive.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.max_z.abs_diff(self.min_z) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_round_trip() {
        for (x, z) in [
            (0, 0),
            (10, 10),
            (-1, 1),
            (1, -1),
            (i32::MAX, i32::MIN),
            (-32768, 32767),
        ] {
            let key = ChunkKey::new(x, z);
            assert_eq!(key.x(), x);
            assert_eq!(key.z(), z);
            assert_eq!(ChunkKey::from_packed(key.packed()), key);
        }
    }

    #[test]
    fn test_negative_coordinates_do_not_collide() {
        // The Z half must not sign-extend into the X half.
        assert_ne!(ChunkKey::new(0, -1), ChunkKey::new(-1, -1));
        assert_ne!(ChunkKey::new(1, -1), ChunkKey::new(0, u32::MAX as i32));
    }

    #[test]
    fn test_rect_enumeration_normalizes_corners() {
        let a = enumerate_rect((11, 11), (9, 9));
        let b = enumerate_rect((9, 9), (11, 11));
        assert_eq!(a, b);
        assert_eq!(a.len(), 9);
        assert!(a.contains(&ChunkKey::new(10, 10)));
        assert!(!a.contains(&ChunkKey::new(12, 10)));
    }

    #[test]
    fn test_single_chunk_rect() {
        let r = enumerate_rect((20, 20), (20, 20));
        assert_eq!(r.len(), 1);
        assert!(r.contains(&ChunkKey::new(20, 20)));
    }

    #[test]
    fn test_bounds() {
        let chunks = enumerate_rect((9, 9), (11, 11));
        let bounds = ChunkBounds::of(&chunks);
        assert_eq!(
            bounds,
            ChunkBounds {
                min_x: 9,
                min_z: 9,
                max_x: 11,
                max_z: 11
            }
        );
        assert_eq!(bounds.width(), 3);
        assert_eq!(bounds.length(), 3);
    }

    #[test]
    fn test_chunk_key_serde_pair_form() {
        let key = ChunkKey::new(-3, 7);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "[-3,7]");
        let back: ChunkKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}

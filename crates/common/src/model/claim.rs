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

//! The claim record itself, plus the identifier newtypes it hangs off.

use std::{
    fmt::{Display, Formatter},
    sync::OnceLock,
    time::{SystemTime, UNIX_EPOCH},
};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    ChunkBounds, ChunkKey, ChunkSet, PermissionLevel, chunk::chunk_set_serde,
};

/// Globally unique identifier for one claim. Immutable for the record's
/// lifetime; minted at creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClaimId(Uuid);

impl ClaimId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for ClaimId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a player, as issued by the enclosing server's account
/// layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for PlayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a world. The partition key for both indexing and persistence;
/// claims never span worlds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(String);

impl WorldId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The world name reduced to safe path-segment characters, for use as a
    /// persistence file name. Anything outside `[A-Za-z0-9_.-]` becomes `_`.
    #[must_use]
    pub fn sanitized(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl Display for WorldId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorldId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-claim behavior toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimFlags {
    pub pvp: bool,
    pub explosions: bool,
    pub mob_griefing: bool,
    pub hostile_npc_protection: bool,
}

impl Default for ClaimFlags {
    fn default() -> Self {
        Self {
            pvp: false,
            explosions: false,
            mob_griefing: false,
            hostile_npc_protection: true,
        }
    }
}

/// One parcel of land: a set of chunks in a single world, with an owner,
/// granted permissions, and behavior flags.
///
/// Records held by the registry are immutable snapshots; mutation happens by
/// cloning, applying the change, and committing the replacement through the
/// index, so concurrent readers always see a coherent record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: ClaimId,
    pub owner: PlayerId,
    /// Cached display name of the owner at the time of the last write.
    pub owner_name: String,
    pub world: WorldId,
    #[serde(with = "chunk_set_serde")]
    pub chunks: ChunkSet,
    /// Granted permissions by player. The owner is implicitly TRUSTED and is
    /// never stored here.
    #[serde(default)]
    pub permissions: AHashMap<PlayerId, PermissionLevel>,
    #[serde(default)]
    pub flags: ClaimFlags,
    /// Admin claims override ordinary claims on creation and cannot be
    /// overlapped by ordinary players.
    #[serde(default)]
    pub admin_claim: bool,
    /// Optional player-assigned label.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional map-marker color override, packed RGB.
    #[serde(default)]
    pub marker_color: Option<u32>,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
    // Derived display value, recomputed lazily after chunk mutations.
    #[serde(skip)]
    bounds: OnceLock<ChunkBounds>,
}

impl PartialEq for ClaimRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.owner == other.owner
            && self.owner_name == other.owner_name
            && self.world == other.world
            && self.chunks == other.chunks
            && self.permissions == other.permissions
            && self.flags == other.flags
            && self.admin_claim == other.admin_claim
            && self.name == other.name
            && self.marker_color == other.marker_color
            && self.created_at == other.created_at
    }
}

impl Eq for ClaimRecord {}

impl ClaimRecord {
    pub fn new(
        owner: PlayerId,
        owner_name: impl Into<String>,
        world: WorldId,
        chunks: ChunkSet,
        admin_claim: bool,
    ) -> Self {
        Self {
            id: ClaimId::generate(),
            owner,
            owner_name: owner_name.into(),
            world,
            chunks,
            permissions: AHashMap::new(),
            flags: ClaimFlags::default(),
            admin_claim,
            name: None,
            marker_color: None,
            created_at: now_millis(),
            bounds: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn contains_chunk(&self, chunk: ChunkKey) -> bool {
        self.chunks.contains(&chunk)
    }

    /// The cached min/max extent of the claim's chunks.
    pub fn bounds(&self) -> ChunkBounds {
        *self.bounds.get_or_init(|| ChunkBounds::of(&self.chunks))
    }

    /// Detach one chunk. Returns whether the chunk was present. The caller
    /// is responsible for deleting a record that ends up empty.
    pub fn remove_chunk(&mut self, chunk: ChunkKey) -> bool {
        let removed = self.chunks.remove(&chunk);
        if removed {
            self.bounds = OnceLock::new();
        }
        removed
    }

    #[must_use]
    pub fn permission_for(&self, player: &PlayerId) -> Option<PermissionLevel> {
        self.permissions.get(player).copied()
    }

    /// Grant `level` to `player`. Granting to the owner is a no-op, since
    /// ownership already implies full access. Returns whether the stored map
    /// changed.
    pub fn trust(&mut self, player: PlayerId, level: PermissionLevel) -> bool {
        if player == self.owner {
            return false;
        }
        self.permissions.insert(player, level) != Some(level)
    }

    /// Revoke any granted permission from `player`. Returns whether one was
    /// stored.
    pub fn untrust(&mut self, player: &PlayerId) -> bool {
        self.permissions.remove(player).is_some()
    }

    #[must_use]
    pub fn is_owner(&self, player: &PlayerId) -> bool {
        self.owner == *player
    }

    /// Owner, or holder of a TRUSTED grant.
    #[must_use]
    pub fn is_trusted(&self, player: &PlayerId) -> bool {
        self.has_permission(player, PermissionLevel::Trusted)
    }

    /// Owner, or holder of any stored grant (container access is the floor).
    #[must_use]
    pub fn has_accessor_permission(&self, player: &PlayerId) -> bool {
        self.has_permission(player, PermissionLevel::Accessor)
    }

    #[must_use]
    pub fn has_permission(&self, player: &PlayerId, required: PermissionLevel) -> bool {
        if self.is_owner(player) {
            return true;
        }
        self.permission_for(player)
            .is_some_and(|level| level >= required)
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::chunk::enumerate_rect;

    fn test_record() -> ClaimRecord {
        ClaimRecord::new(
            PlayerId::generate(),
            "alice",
            WorldId::from("overworld"),
            enumerate_rect((0, 0), (2, 2)),
            false,
        )
    }

    #[test]
    fn test_owner_implicitly_trusted() {
        let mut record = test_record();
        let owner = record.owner;
        assert!(record.is_trusted(&owner));
        assert!(record.has_accessor_permission(&owner));
        // A grant for the owner is refused, never stored.
        assert!(!record.trust(owner, PermissionLevel::Accessor));
        assert!(record.permissions.is_empty());
    }

    #[test]
    fn test_trust_levels() {
        let mut record = test_record();
        let builder = PlayerId::generate();
        let visitor = PlayerId::generate();

        assert!(record.trust(builder, PermissionLevel::Trusted));
        assert!(record.trust(visitor, PermissionLevel::Accessor));

        assert!(record.is_trusted(&builder));
        assert!(!record.is_trusted(&visitor));
        assert!(record.has_accessor_permission(&visitor));

        let stranger = PlayerId::generate();
        assert!(!record.has_accessor_permission(&stranger));

        assert!(record.untrust(&builder));
        assert!(!record.is_trusted(&builder));
        assert!(!record.untrust(&builder));
    }

    #[test]
    fn test_bounds_cache_resets_on_chunk_removal() {
        let mut record = test_record();
        assert_eq!(record.bounds().width(), 3);
        for z in 0..=2 {
            record.remove_chunk(ChunkKey::new(2, z));
        }
        assert_eq!(record.bounds().width(), 2);
        assert_eq!(record.chunk_count(), 6);
    }

    #[test]
    fn test_record_serde_round_trip() {
        let mut record = test_record();
        record.trust(PlayerId::generate(), PermissionLevel::Trusted);
        record.name = Some("spawn farm".to_string());
        record.marker_color = Some(0x00FF_7F00);

        let json = serde_json::to_string_pretty(&record).unwrap();
        let back: ClaimRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_serde_defaults_missing_maps() {
        // Old documents may predate the permissions/flags fields; decoding
        // fills safe defaults rather than rejecting the record.
        let json = format!(
            r#"{{
                "id": "{}",
                "owner": "{}",
                "owner_name": "bob",
                "world": "overworld",
                "chunks": [[1, 1]],
                "created_at": 1700000000000
            }}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let record: ClaimRecord = serde_json::from_str(&json).unwrap();
        assert!(record.permissions.is_empty());
        assert_eq!(record.flags, ClaimFlags::default());
        assert!(!record.admin_claim);
        assert_eq!(record.name, None);
    }

    #[test]
    fn test_world_id_sanitized() {
        assert_eq!(WorldId::from("overworld").sanitized(), "overworld");
        assert_eq!(WorldId::from("DIM-1/nether").sanitized(), "DIM-1_nether");
        assert_eq!(WorldId::from("../evil").sanitized(), "___evil");
    }
}

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

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::{ClaimError, ClaimRecord, PlayerId};

/// Permission grantable by a claim owner to another player.
///
/// Ordering matters: `Trusted` satisfies any check `Accessor` satisfies.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PermissionLevel {
    /// Container access only.
    Accessor,
    /// Full build access.
    Trusted,
}

/// Who an action is performed by, and what standing they carry: `elevated`
/// is the player's current in-game elevated mode, `bypass` the sticky
/// per-player admin-bypass toggle resolved by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerPerms {
    pub who: PlayerId,
    pub elevated: bool,
    pub bypass: bool,
}

impl PlayerPerms {
    #[must_use]
    pub fn new(who: PlayerId) -> Self {
        Self {
            who,
            elevated: false,
            bypass: false,
        }
    }

    /// Whether this player may administratively modify `claim`: its owner
    /// always may; elevated status suffices for ordinary claims only.
    /// Another admin's claim yields only to explicit bypass mode.
    #[must_use]
    pub fn can_modify(&self, claim: &ClaimRecord) -> bool {
        if self.bypass || claim.is_owner(&self.who) {
            return true;
        }
        self.elevated && !claim.admin_claim
    }

    pub fn check_can_modify(&self, claim: &ClaimRecord) -> Result<(), ClaimError> {
        if self.can_modify(claim) {
            return Ok(());
        }
        Err(ClaimError::PermissionDenied)
    }

    pub fn check_trusted(&self, claim: &ClaimRecord) -> Result<(), ClaimError> {
        if self.bypass || claim.is_trusted(&self.who) {
            return Ok(());
        }
        Err(ClaimError::PermissionDenied)
    }

    pub fn check_accessor(&self, claim: &ClaimRecord) -> Result<(), ClaimError> {
        if self.bypass || claim.has_accessor_permission(&self.who) {
            return Ok(());
        }
        Err(ClaimError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChunkKey, ChunkSet, WorldId};

    fn claim(owner: PlayerId, admin: bool) -> ClaimRecord {
        let mut chunks = ChunkSet::default();
        chunks.insert(ChunkKey::new(0, 0));
        ClaimRecord::new(owner, "owner", WorldId::from("overworld"), chunks, admin)
    }

    #[test]
    fn test_owner_modifies_own_admin_claim() {
        let owner = PlayerId::generate();
        let record = claim(owner, true);
        let perms = PlayerPerms {
            who: owner,
            elevated: true,
            bypass: false,
        };
        assert!(perms.can_modify(&record));
    }

    #[test]
    fn test_elevation_insufficient_for_foreign_admin_claim() {
        let record = claim(PlayerId::generate(), true);
        let other_admin = PlayerPerms {
            who: PlayerId::generate(),
            elevated: true,
            bypass: false,
        };
        assert!(!other_admin.can_modify(&record));

        // Explicit bypass mode is the only way through.
        let bypassing = PlayerPerms {
            bypass: true,
            ..other_admin
        };
        assert!(bypassing.can_modify(&record));
    }

    #[test]
    fn test_elevation_modifies_ordinary_claims() {
        let record = claim(PlayerId::generate(), false);
        let admin = PlayerPerms {
            who: PlayerId::generate(),
            elevated: true,
            bypass: false,
        };
        assert!(admin.can_modify(&record));

        let regular = PlayerPerms::new(PlayerId::generate());
        assert!(!regular.can_modify(&record));
    }

    #[test]
    fn test_permission_level_ordering() {
        assert!(PermissionLevel::Trusted > PermissionLevel::Accessor);
        assert_eq!(PermissionLevel::Trusted.to_string(), "TRUSTED");
        assert_eq!(PermissionLevel::Accessor.to_string(), "ACCESSOR");
    }
}

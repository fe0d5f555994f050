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

//! Pending claim proposals, one per player at most.
//!
//! A preview is advisory: it reserves nothing, and confirmation re-validates
//! against the live index before committing. Expiry is a wall-clock age
//! check applied when the preview is resolved and by a periodic sweep, not
//! on every lookup.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use homestead_common::{ChunkBounds, ChunkSet, PlayerId, WorldId};

/// One pending proposal. Owned by the workflow until confirmed, cancelled,
/// or swept; never referenced after resolution.
#[derive(Debug, Clone)]
pub struct ClaimPreview {
    pub player: PlayerId,
    /// Display name at proposal time; becomes the claim's cached owner name
    /// on confirm.
    pub player_name: String,
    pub world: WorldId,
    pub chunks: ChunkSet,
    pub admin: bool,
    created: Instant,
}

impl ClaimPreview {
    pub fn new(
        player: PlayerId,
        player_name: impl Into<String>,
        world: WorldId,
        chunks: ChunkSet,
        admin: bool,
    ) -> Self {
        Self {
            player,
            player_name: player_name.into(),
            world,
            chunks,
            admin,
            created: Instant::now(),
        }
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Extent of the proposal, for overlay rendering.
    #[must_use]
    pub fn bounds(&self) -> ChunkBounds {
        ChunkBounds::of(&self.chunks)
    }
}

/// Per-player pending-preview state. No cross-player locking: the map is a
/// concurrent hash map and each entry is touched only by its player's
/// actions plus the sweep.
pub struct PreviewWorkflow {
    pending: papaya::HashMap<PlayerId, Arc<ClaimPreview>>,
    timeout: Duration,
}

impl PreviewWorkflow {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: papaya::HashMap::new(),
            timeout,
        }
    }

    /// Store a new preview for its player, implicitly cancelling any prior
    /// one. Returns the stored preview and the one it replaced, if any.
    pub fn begin(&self, preview: ClaimPreview) -> (Arc<ClaimPreview>, Option<Arc<ClaimPreview>>) {
        let preview = Arc::new(preview);
        let guard = self.pending.guard();
        let replaced = self
            .pending
            .insert(preview.player, preview.clone(), &guard)
            .cloned();
        (preview, replaced)
    }

    /// Remove and return the player's pending preview.
    pub fn take(&self, player: &PlayerId) -> Option<Arc<ClaimPreview>> {
        let guard = self.pending.guard();
        self.pending.remove(player, &guard).cloned()
    }

    #[must_use]
    pub fn pending(&self, player: &PlayerId) -> Option<Arc<ClaimPreview>> {
        let guard = self.pending.guard();
        self.pending.get(player, &guard).cloned()
    }

    #[must_use]
    pub fn is_expired(&self, preview: &ClaimPreview) -> bool {
        preview.age() > self.timeout
    }

    /// Remove every expired preview, returning the removed set so callers
    /// can notify overlay collaborators.
    pub fn sweep_expired(&self) -> Vec<Arc<ClaimPreview>> {
        let guard = self.pending.guard();
        let stale: Vec<PlayerId> = self
            .pending
            .iter(&guard)
            .filter(|(_, p)| self.is_expired(p))
            .map(|(player, _)| *player)
            .collect();
        stale
            .into_iter()
            .filter_map(|player| self.pending.remove(&player, &guard).cloned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

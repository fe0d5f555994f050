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

//! The registry façade: the one public surface over index, validator,
//! previews, and persistence.
//!
//! Every successful write (1) commits to the spatial index, (2) schedules an
//! async persistence write, (3) fires synchronous lifecycle notifications,
//! and (4) returns a typed result; expected validation conditions come back
//! as [`ClaimError`] values, never panics.
//!
//! Writers serialize on a façade-level commit mutex so that a
//! validate-then-commit sequence is atomic with respect to other writers.
//! Reads go straight to the index snapshot and never block.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use tracing::{error, info, warn};

use homestead_common::{
    ChunkKey, ChunkSet, ClaimError, ClaimFlags, ClaimId, ClaimRecord, PermissionLevel, PlayerId,
    PlayerPerms, WorldId, model::enumerate_rect,
};

use crate::{
    config::{QuotaBonus, RegistryConfig},
    events::ClaimListener,
    index::{ChunkRemoval, SpatialIndex},
    persist::{PersistError, PersistenceGateway},
    preview::{ClaimPreview, PreviewWorkflow},
    validate::validate_proposal,
};

/// Parameters common to every claim-creation path.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub owner: PlayerId,
    /// Display name cached on the record for overlap messages and listings.
    pub owner_name: String,
    pub world: WorldId,
    /// Create as an admin claim. Callers only set this for players
    /// currently in elevated mode.
    pub admin: bool,
    /// Leveling-derived quota bonus, already resolved by the caller.
    pub bonus: QuotaBonus,
}

pub struct ClaimRegistry {
    config: RegistryConfig,
    index: SpatialIndex,
    previews: PreviewWorkflow,
    persistence: PersistenceGateway,
    listeners: Vec<Arc<dyn ClaimListener>>,
    /// Sticky per-player admin-bypass toggles. Process-local, cleared on
    /// disconnect.
    admin_bypass: papaya::HashMap<PlayerId, ()>,
    /// Serializes validate-then-commit sequences across writer threads.
    commit_lock: Mutex<()>,
}

impl ClaimRegistry {
    /// Open a registry persisting under `dir`. Collaborators subscribe by
    /// passing listeners here; there is no global registration point.
    pub fn open(
        dir: &Path,
        config: RegistryConfig,
        listeners: Vec<Arc<dyn ClaimListener>>,
    ) -> Result<Self, PersistError> {
        let persistence = PersistenceGateway::open(dir, config.persistence_queue_depth)?;
        Ok(Self {
            previews: PreviewWorkflow::new(config.preview_timeout),
            config,
            index: SpatialIndex::new(),
            persistence,
            listeners,
            admin_bypass: papaya::HashMap::new(),
            commit_lock: Mutex::new(()),
        })
    }

    fn notify(&self, f: impl Fn(&dyn ClaimListener)) {
        for listener in &self.listeners {
            f(listener.as_ref());
        }
    }

    /// Resolve a player's effective standing: caller-supplied elevation
    /// plus the registry's sticky bypass toggle.
    fn perms_for(&self, player: &PlayerId, elevated: bool) -> PlayerPerms {
        PlayerPerms {
            who: *player,
            elevated,
            bypass: self.admin_bypass_active(player),
        }
    }

    // ------------------------------------------------------------------
    // World lifecycle
    // ------------------------------------------------------------------

    /// Load a world's stored claims into the index. Fires
    /// `on_claim_created` per claim so overlays render. Returns how many
    /// claims were mounted.
    pub fn attach_world(&self, world: &WorldId) -> usize {
        let records = self.persistence.load_world(world);
        let _guard = self.commit_lock.lock().unwrap();
        let mut mounted = 0;
        for record in records {
            let record = Arc::new(record);
            // A corrupt document must not poison the exclusivity invariant.
            if record
                .chunks
                .iter()
                .any(|c| self.index.claim_at(world, *c).is_some())
            {
                warn!(
                    world = %world, claim = %record.id,
                    "Skipping stored claim overlapping an indexed claim"
                );
                continue;
            }
            self.index.insert(record.clone());
            self.notify(|l| l.on_claim_created(&record));
            mounted += 1;
        }
        info!(world = %world, "Attached world with {mounted} claims");
        mounted
    }

    /// Flush and unmount a world's claims. The synchronous flush runs after
    /// a queue drain so it cannot be overwritten by stale queued saves.
    pub fn detach_world(&self, world: &WorldId) -> Result<usize, PersistError> {
        let _guard = self.commit_lock.lock().unwrap();
        let records = self.index.remove_world(world);
        if !self.persistence.barrier(Duration::from_secs(10)) {
            warn!(world = %world, "Persistence queue slow to drain before world detach");
        }
        self.persistence.flush_world(world, &records)?;
        info!(world = %world, "Detached world, flushed {} claims", records.len());
        Ok(records.len())
    }

    // ------------------------------------------------------------------
    // Claim creation
    // ------------------------------------------------------------------

    /// Claim the rectangle spanned by two corner chunks, inclusive, corner
    /// order irrelevant.
    pub fn create_claim(
        &self,
        req: &ClaimRequest,
        from: (i32, i32),
        to: (i32, i32),
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        self.create_claim_from_chunks(req, enumerate_rect(from, to))
    }

    /// Claim an explicit, not necessarily contiguous, chunk set.
    pub fn create_claim_from_chunks(
        &self,
        req: &ClaimRequest,
        chunks: ChunkSet,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        let _guard = self.commit_lock.lock().unwrap();
        self.commit_claim(req, chunks)
    }

    /// Validate and commit one claim. Caller holds the commit lock.
    fn commit_claim(
        &self,
        req: &ClaimRequest,
        chunks: ChunkSet,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        let proposal = validate_proposal(
            &self.index,
            &self.config,
            &req.owner,
            &req.world,
            &chunks,
            req.admin,
            &req.bonus,
        )?;

        // Clear the ground first. Foreign claims only get here via admin
        // override and are removed whole; the proposer's own claims just
        // cede the overlapping chunks.
        for victim in &proposal.displaced {
            if victim.owner != req.owner {
                self.delete_committed(victim);
            } else {
                self.cede_chunks(victim, &chunks);
            }
        }

        let record = Arc::new(ClaimRecord::new(
            req.owner,
            req.owner_name.clone(),
            req.world.clone(),
            chunks,
            req.admin,
        ));
        self.index.insert(record.clone());
        self.persistence.save(record.clone());
        self.notify(|l| l.on_claim_created(&record));
        Ok(record)
    }

    /// Remove a committed record: index, storage, notification.
    fn delete_committed(&self, record: &Arc<ClaimRecord>) {
        self.index.remove(&record.id);
        self.persistence.delete(record.world.clone(), record.id);
        self.notify(|l| l.on_claim_deleted(record));
    }

    /// Detach `taken` chunks from one of the proposer's own claims,
    /// deleting it if nothing remains.
    fn cede_chunks(&self, victim: &Arc<ClaimRecord>, taken: &ChunkSet) {
        let overlapping: Vec<ChunkKey> = victim
            .chunks
            .iter()
            .copied()
            .filter(|c| taken.contains(c))
            .collect();
        let mut last = None;
        for chunk in overlapping {
            last = self.index.remove_chunk(&victim.id, chunk).or(last);
        }
        match last {
            Some(ChunkRemoval::Deleted(old)) => {
                self.persistence.delete(old.world.clone(), old.id);
                self.notify(|l| l.on_claim_deleted(&old));
            }
            Some(ChunkRemoval::Shrunk(updated)) => {
                self.persistence.save(updated.clone());
                self.notify(|l| l.on_claim_updated(&updated));
            }
            None => {}
        }
    }

    // ------------------------------------------------------------------
    // Claim removal and mutation
    // ------------------------------------------------------------------

    pub fn delete_claim(
        &self,
        player: &PlayerId,
        elevated: bool,
        id: &ClaimId,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        let _guard = self.commit_lock.lock().unwrap();
        let record = self
            .index
            .claim(id)
            .ok_or(ClaimError::ClaimNotFound(*id))?;
        self.perms_for(player, elevated).check_can_modify(&record)?;
        self.delete_committed(&record);
        Ok(record)
    }

    /// Release a single chunk. If it was the claim's last one, the whole
    /// claim goes with it.
    pub fn unclaim_chunk(
        &self,
        player: &PlayerId,
        elevated: bool,
        world: &WorldId,
        x: i32,
        z: i32,
    ) -> Result<ChunkRemoval, ClaimError> {
        let _guard = self.commit_lock.lock().unwrap();
        let chunk = ChunkKey::new(x, z);
        let record = self
            .index
            .claim_at(world, chunk)
            .ok_or(ClaimError::NoClaimAtChunk(chunk))?;
        self.perms_for(player, elevated).check_can_modify(&record)?;

        let removal = self
            .index
            .remove_chunk(&record.id, chunk)
            .ok_or_else(|| ClaimError::Internal("chunk index out of sync".to_string()))?;
        match &removal {
            ChunkRemoval::Shrunk(updated) => {
                self.persistence.save(updated.clone());
                self.notify(|l| l.on_claim_updated(updated));
            }
            ChunkRemoval::Deleted(old) => {
                self.persistence.delete(old.world.clone(), old.id);
                self.notify(|l| l.on_claim_deleted(old));
            }
        }
        self.notify(|l| l.on_chunk_unclaimed(world, chunk));
        Ok(removal)
    }

    /// Clone-modify-recommit one record. All the small mutations (rename,
    /// flags, trust) funnel through here.
    fn update_claim(
        &self,
        player: &PlayerId,
        elevated: bool,
        id: &ClaimId,
        mutate: impl FnOnce(&mut ClaimRecord),
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        let _guard = self.commit_lock.lock().unwrap();
        let record = self
            .index
            .claim(id)
            .ok_or(ClaimError::ClaimNotFound(*id))?;
        self.perms_for(player, elevated).check_can_modify(&record)?;

        let mut updated = (*record).clone();
        mutate(&mut updated);
        let updated = Arc::new(updated);
        self.index.insert(updated.clone());
        self.persistence.save(updated.clone());
        self.notify(|l| l.on_claim_updated(&updated));
        Ok(updated)
    }

    pub fn rename_claim(
        &self,
        player: &PlayerId,
        elevated: bool,
        id: &ClaimId,
        name: Option<String>,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        self.update_claim(player, elevated, id, |c| c.name = name)
    }

    pub fn set_marker_color(
        &self,
        player: &PlayerId,
        elevated: bool,
        id: &ClaimId,
        color: Option<u32>,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        self.update_claim(player, elevated, id, |c| c.marker_color = color)
    }

    pub fn update_flags(
        &self,
        player: &PlayerId,
        elevated: bool,
        id: &ClaimId,
        flags: ClaimFlags,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        self.update_claim(player, elevated, id, |c| c.flags = flags)
    }

    /// Grant `level` to `target` on a claim. Granting to the owner is a
    /// no-op: ownership already implies full access.
    pub fn trust_player(
        &self,
        player: &PlayerId,
        elevated: bool,
        id: &ClaimId,
        target: PlayerId,
        level: PermissionLevel,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        self.update_claim(player, elevated, id, |c| {
            c.trust(target, level);
        })
    }

    pub fn untrust_player(
        &self,
        player: &PlayerId,
        elevated: bool,
        id: &ClaimId,
        target: &PlayerId,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        self.update_claim(player, elevated, id, |c| {
            c.untrust(target);
        })
    }

    // ------------------------------------------------------------------
    // Preview workflow
    // ------------------------------------------------------------------

    /// Start (or restart) a pending claim preview over a chunk rectangle.
    /// Advisory only: validated against the committed index but reserving
    /// nothing.
    pub fn request_preview(
        &self,
        req: &ClaimRequest,
        from: (i32, i32),
        to: (i32, i32),
    ) -> Result<Arc<ClaimPreview>, ClaimError> {
        let chunks = enumerate_rect(from, to);
        validate_proposal(
            &self.index,
            &self.config,
            &req.owner,
            &req.world,
            &chunks,
            req.admin,
            &req.bonus,
        )?;

        let preview = ClaimPreview::new(
            req.owner,
            req.owner_name.clone(),
            req.world.clone(),
            chunks,
            req.admin,
        );
        let (preview, replaced) = self.previews.begin(preview);
        if let Some(old) = replaced {
            self.notify(|l| l.on_preview_removed(&req.owner, &old));
        }
        self.notify(|l| l.on_preview_created(&req.owner, &preview));
        Ok(preview)
    }

    /// Commit the player's pending preview. Re-validates against live
    /// state: another player may have claimed a previewed chunk in the
    /// meantime, in which case this fails naming the conflicting owner.
    /// The preview is consumed either way.
    pub fn confirm_preview(
        &self,
        player: &PlayerId,
        bonus: QuotaBonus,
    ) -> Result<Arc<ClaimRecord>, ClaimError> {
        let _guard = self.commit_lock.lock().unwrap();
        let preview = self
            .previews
            .take(player)
            .ok_or(ClaimError::NoPendingPreview)?;
        self.notify(|l| l.on_preview_removed(player, &preview));
        if self.previews.is_expired(&preview) {
            return Err(ClaimError::PreviewExpired);
        }

        let req = ClaimRequest {
            owner: *player,
            owner_name: preview.player_name.clone(),
            world: preview.world.clone(),
            admin: preview.admin,
            bonus,
        };
        self.commit_claim(&req, preview.chunks.clone())
    }

    pub fn cancel_preview(&self, player: &PlayerId) -> Result<Arc<ClaimPreview>, ClaimError> {
        let preview = self
            .previews
            .take(player)
            .ok_or(ClaimError::NoPendingPreview)?;
        self.notify(|l| l.on_preview_removed(player, &preview));
        Ok(preview)
    }

    /// The player's live (unexpired) preview, if any.
    #[must_use]
    pub fn pending_preview(&self, player: &PlayerId) -> Option<Arc<ClaimPreview>> {
        self.previews
            .pending(player)
            .filter(|p| !self.previews.is_expired(p))
    }

    /// Drop expired previews and notify overlay collaborators. Driven by
    /// the host's periodic tick.
    pub fn sweep_expired_previews(&self) -> usize {
        let swept = self.previews.sweep_expired();
        for preview in &swept {
            self.notify(|l| l.on_preview_removed(&preview.player, preview));
        }
        swept.len()
    }

    // ------------------------------------------------------------------
    // Admin bypass
    // ------------------------------------------------------------------

    /// Toggle sticky admin-bypass for a player. Returns the new state.
    pub fn toggle_admin_bypass(&self, player: PlayerId) -> bool {
        let guard = self.admin_bypass.guard();
        if self.admin_bypass.remove(&player, &guard).is_some() {
            false
        } else {
            self.admin_bypass.insert(player, (), &guard);
            true
        }
    }

    #[must_use]
    pub fn admin_bypass_active(&self, player: &PlayerId) -> bool {
        let guard = self.admin_bypass.guard();
        self.admin_bypass.contains_key(player, &guard)
    }

    /// Clear per-player ephemeral state when a player leaves the server:
    /// the bypass toggle and any pending preview.
    pub fn player_disconnected(&self, player: &PlayerId) {
        let guard = self.admin_bypass.guard();
        self.admin_bypass.remove(player, &guard);
        drop(guard);
        if let Some(preview) = self.previews.take(player) {
            self.notify(|l| l.on_preview_removed(player, &preview));
        }
    }

    // ------------------------------------------------------------------
    // Read queries
    // ------------------------------------------------------------------

    #[must_use]
    pub fn claim(&self, id: &ClaimId) -> Option<Arc<ClaimRecord>> {
        self.index.claim(id)
    }

    #[must_use]
    pub fn claim_at(&self, world: &WorldId, x: i32, z: i32) -> Option<Arc<ClaimRecord>> {
        self.index.claim_at(world, ChunkKey::new(x, z))
    }

    #[must_use]
    pub fn claims_by_owner(&self, owner: &PlayerId) -> Vec<Arc<ClaimRecord>> {
        self.index.claims_by_owner(owner)
    }

    /// Claims on which `player` holds a stored grant.
    #[must_use]
    pub fn claims_trusting(&self, player: &PlayerId) -> Vec<Arc<ClaimRecord>> {
        self.index.claims_trusting(player)
    }

    #[must_use]
    pub fn claims_in_world(&self, world: &WorldId) -> Vec<Arc<ClaimRecord>> {
        self.index.claims_in_world(world)
    }

    #[must_use]
    pub fn owned_chunk_count(&self, owner: &PlayerId) -> usize {
        self.index.owned_chunk_count(owner)
    }

    /// Effective claim-count limit for a player, leveling bonus included.
    #[must_use]
    pub fn max_claims(&self, bonus: &QuotaBonus) -> usize {
        self.config.quotas.max_claims_per_player + bonus.claims
    }

    /// Effective total-chunk limit for a player, leveling bonus included.
    #[must_use]
    pub fn max_total_chunks(&self, bonus: &QuotaBonus) -> usize {
        self.config.quotas.max_total_chunks_per_player + bonus.chunks
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Drain pending persistence with a bounded wait, stop the writer, then
    /// run a final synchronous flush over every attached world. The flush
    /// pass also re-saves anything an earlier failed async write missed.
    pub fn shutdown(&self, drain_timeout: Duration) {
        let _guard = self.commit_lock.lock().unwrap();
        if !self.persistence.barrier(drain_timeout) {
            warn!("Persistence queue did not drain within {drain_timeout:?}");
        }
        self.persistence.stop();
        for world in self.index.worlds() {
            let records = self.index.claims_in_world(&world);
            if let Err(e) = self.persistence.flush_world(&world, &records) {
                error!(world = %world, "Final claim flush failed: {e}");
            }
        }
        info!("Claim registry shut down");
    }
}

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

//! The in-memory spatial index over committed claims.
//!
//! Three coupled views of the same claim set: record by id, claim id by
//! chunk key per world, and claim ids by owner. The whole state lives in
//! persistent maps behind an [`ArcSwap`]; mutators build the successor state
//! and publish it in one store, so a reader holding a snapshot sees either
//! the pre- or post-mutation index, never a chunk entry without its record.
//! Reads take no locks at all.
//!
//! This component does not validate: callers must have checked overlap and
//! quota rules before `insert`.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use homestead_common::{ChunkKey, ClaimId, ClaimRecord, PlayerId, WorldId};

#[derive(Clone, Default)]
struct IndexState {
    by_id: imbl::HashMap<ClaimId, Arc<ClaimRecord>>,
    by_chunk: imbl::HashMap<WorldId, imbl::HashMap<ChunkKey, ClaimId>>,
    by_owner: imbl::HashMap<PlayerId, imbl::HashSet<ClaimId>>,
}

impl IndexState {
    fn unlink(&mut self, record: &ClaimRecord) {
        if let Some(world_map) = self.by_chunk.get(&record.world) {
            let mut world_map = world_map.clone();
            for chunk in &record.chunks {
                world_map.remove(chunk);
            }
            if world_map.is_empty() {
                self.by_chunk.remove(&record.world);
            } else {
                self.by_chunk.insert(record.world.clone(), world_map);
            }
        }
        if let Some(owned) = self.by_owner.get(&record.owner) {
            let mut owned = owned.clone();
            owned.remove(&record.id);
            if owned.is_empty() {
                self.by_owner.remove(&record.owner);
            } else {
                self.by_owner.insert(record.owner, owned);
            }
        }
        self.by_id.remove(&record.id);
    }

    fn link(&mut self, record: Arc<ClaimRecord>) {
        let mut world_map = self
            .by_chunk
            .get(&record.world)
            .cloned()
            .unwrap_or_default();
        for chunk in &record.chunks {
            world_map.insert(*chunk, record.id);
        }
        self.by_chunk.insert(record.world.clone(), world_map);

        let mut owned = self.by_owner.get(&record.owner).cloned().unwrap_or_default();
        owned.insert(record.id);
        self.by_owner.insert(record.owner, owned);

        self.by_id.insert(record.id, record);
    }
}

/// Outcome of detaching one chunk from a record.
#[derive(Debug, Clone)]
pub enum ChunkRemoval {
    /// The chunk was detached; the record remains live with the rest.
    Shrunk(Arc<ClaimRecord>),
    /// The chunk was the record's last one, so the whole record was removed.
    Deleted(Arc<ClaimRecord>),
}

pub struct SpatialIndex {
    state: ArcSwap<IndexState>,
    // Serializes mutators. Readers never touch it.
    write_lock: Mutex<()>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(IndexState::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Add `record` to all three views, replacing any prior record with the
    /// same id (its old chunk/owner entries are unlinked first).
    ///
    /// Precondition: none of `record.chunks` is indexed to a *different*
    /// claim in that world. The overlap validator enforces this before any
    /// commit; it is not re-checked here.
    pub fn insert(&self, record: Arc<ClaimRecord>) {
        let _guard = self.write_lock.lock().unwrap();
        let mut next = (**self.state.load()).clone();
        if let Some(prior) = next.by_id.get(&record.id).cloned() {
            next.unlink(&prior);
        }
        next.link(record);
        self.state.store(Arc::new(next));
    }

    /// Remove a record from all three views. No-op if absent.
    pub fn remove(&self, id: &ClaimId) -> Option<Arc<ClaimRecord>> {
        let _guard = self.write_lock.lock().unwrap();
        let mut next = (**self.state.load()).clone();
        let record = next.by_id.get(id).cloned()?;
        next.unlink(&record);
        self.state.store(Arc::new(next));
        Some(record)
    }

    /// Detach one chunk from a record. If that was the record's last chunk,
    /// the record itself is removed. `None` if the record doesn't exist or
    /// doesn't hold the chunk.
    pub fn remove_chunk(&self, id: &ClaimId, chunk: ChunkKey) -> Option<ChunkRemoval> {
        let _guard = self.write_lock.lock().unwrap();
        let mut next = (**self.state.load()).clone();
        let record = next.by_id.get(id).cloned()?;
        if !record.contains_chunk(chunk) {
            return None;
        }
        if record.chunk_count() == 1 {
            next.unlink(&record);
            self.state.store(Arc::new(next));
            return Some(ChunkRemoval::Deleted(record));
        }
        let mut shrunk = (*record).clone();
        shrunk.remove_chunk(chunk);
        let shrunk = Arc::new(shrunk);

        next.unlink(&record);
        next.link(shrunk.clone());
        self.state.store(Arc::new(next));
        Some(ChunkRemoval::Shrunk(shrunk))
    }

    /// Drop every claim in `world` from the index, returning them. Used when
    /// the host unmounts a world.
    pub fn remove_world(&self, world: &WorldId) -> Vec<Arc<ClaimRecord>> {
        let _guard = self.write_lock.lock().unwrap();
        let mut next = (**self.state.load()).clone();
        let records: Vec<Arc<ClaimRecord>> = next
            .by_id
            .values()
            .filter(|r| r.world == *world)
            .cloned()
            .collect();
        for record in &records {
            next.unlink(record);
        }
        self.state.store(Arc::new(next));
        records
    }

    #[must_use]
    pub fn claim(&self, id: &ClaimId) -> Option<Arc<ClaimRecord>> {
        self.state.load().by_id.get(id).cloned()
    }

    /// O(1) lookup of the claim covering a chunk, if any.
    #[must_use]
    pub fn claim_at(&self, world: &WorldId, chunk: ChunkKey) -> Option<Arc<ClaimRecord>> {
        let state = self.state.load();
        let id = state.by_chunk.get(world)?.get(&chunk)?;
        state.by_id.get(id).cloned()
    }

    #[must_use]
    pub fn claims_by_owner(&self, owner: &PlayerId) -> Vec<Arc<ClaimRecord>> {
        let state = self.state.load();
        let Some(owned) = state.by_owner.get(owner) else {
            return vec![];
        };
        owned
            .iter()
            .filter_map(|id| state.by_id.get(id).cloned())
            .collect()
    }

    #[must_use]
    pub fn claims_in_world(&self, world: &WorldId) -> Vec<Arc<ClaimRecord>> {
        let state = self.state.load();
        state
            .by_id
            .values()
            .filter(|r| r.world == *world)
            .cloned()
            .collect()
    }

    /// Claims on which `player` holds any stored grant (not ones they own).
    #[must_use]
    pub fn claims_trusting(&self, player: &PlayerId) -> Vec<Arc<ClaimRecord>> {
        let state = self.state.load();
        state
            .by_id
            .values()
            .filter(|r| r.permissions.contains_key(player))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn owned_claim_count(&self, owner: &PlayerId) -> usize {
        self.state
            .load()
            .by_owner
            .get(owner)
            .map_or(0, |owned| owned.len())
    }

    /// Total chunks held by `owner` across all their claims and worlds.
    #[must_use]
    pub fn owned_chunk_count(&self, owner: &PlayerId) -> usize {
        let state = self.state.load();
        let Some(owned) = state.by_owner.get(owner) else {
            return 0;
        };
        owned
            .iter()
            .filter_map(|id| state.by_id.get(id))
            .map(|r| r.chunk_count())
            .sum()
    }

    /// Every world with at least one indexed claim.
    #[must_use]
    pub fn worlds(&self) -> Vec<WorldId> {
        self.state.load().by_chunk.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.load().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.load().by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homestead_common::model::enumerate_rect;

    fn record(owner: PlayerId, world: &str, from: (i32, i32), to: (i32, i32)) -> Arc<ClaimRecord> {
        Arc::new(ClaimRecord::new(
            owner,
            "tester",
            WorldId::from(world),
            enumerate_rect(from, to),
            false,
        ))
    }

    /// Every chunk of every indexed record must resolve back to that record,
    /// and every owner entry must point at live records.
    fn assert_coherent(index: &SpatialIndex) {
        let state = index.state.load();
        for (id, rec) in state.by_id.iter() {
            for chunk in &rec.chunks {
                assert_eq!(
                    state.by_chunk.get(&rec.world).and_then(|m| m.get(chunk)),
                    Some(id),
                    "chunk {chunk} of claim {id} missing from chunk view"
                );
            }
            assert!(
                state
                    .by_owner
                    .get(&rec.owner)
                    .is_some_and(|owned| owned.contains(id)),
                "claim {id} missing from owner view"
            );
        }
        let chunk_entries: usize = state.by_chunk.values().map(|m| m.len()).sum();
        let record_chunks: usize = state.by_id.values().map(|r| r.chunk_count()).sum();
        assert_eq!(chunk_entries, record_chunks, "dangling chunk entries");
    }

    #[test]
    fn test_insert_remove_all_views() {
        let index = SpatialIndex::new();
        let owner = PlayerId::generate();
        let rec = record(owner, "overworld", (0, 0), (1, 1));
        index.insert(rec.clone());
        assert_coherent(&index);

        assert_eq!(index.claim(&rec.id).unwrap().id, rec.id);
        assert_eq!(
            index
                .claim_at(&WorldId::from("overworld"), ChunkKey::new(1, 0))
                .unwrap()
                .id,
            rec.id
        );
        assert_eq!(index.claims_by_owner(&owner).len(), 1);
        assert_eq!(index.owned_chunk_count(&owner), 4);

        index.remove(&rec.id);
        assert_coherent(&index);
        assert!(index.claim(&rec.id).is_none());
        assert!(
            index
                .claim_at(&WorldId::from("overworld"), ChunkKey::new(1, 0))
                .is_none()
        );
        assert!(index.claims_by_owner(&owner).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_upsert_relinks_chunks() {
        let index = SpatialIndex::new();
        let owner = PlayerId::generate();
        let rec = record(owner, "overworld", (0, 0), (1, 1));
        index.insert(rec.clone());

        // Same id, smaller footprint.
        let mut updated = (*rec).clone();
        updated.remove_chunk(ChunkKey::new(1, 1));
        index.insert(Arc::new(updated));
        assert_coherent(&index);

        let world = WorldId::from("overworld");
        assert!(index.claim_at(&world, ChunkKey::new(1, 1)).is_none());
        assert_eq!(index.claim(&rec.id).unwrap().chunk_count(), 3);
    }

    #[test]
    fn test_remove_chunk_shrinks_then_deletes() {
        let index = SpatialIndex::new();
        let owner = PlayerId::generate();
        let world = WorldId::from("overworld");
        let rec = record(owner, "overworld", (5, 5), (6, 5));
        index.insert(rec.clone());

        match index.remove_chunk(&rec.id, ChunkKey::new(5, 5)) {
            Some(ChunkRemoval::Shrunk(r)) => assert_eq!(r.chunk_count(), 1),
            other => panic!("expected Shrunk, got {other:?}"),
        }
        assert_coherent(&index);
        assert!(index.claim_at(&world, ChunkKey::new(5, 5)).is_none());

        match index.remove_chunk(&rec.id, ChunkKey::new(6, 5)) {
            Some(ChunkRemoval::Deleted(r)) => assert_eq!(r.id, rec.id),
            other => panic!("expected Deleted, got {other:?}"),
        }
        assert_coherent(&index);
        assert!(index.claim(&rec.id).is_none());
        assert!(index.claims_by_owner(&owner).is_empty());

        // Absent record and absent chunk are both no-ops.
        assert!(index.remove_chunk(&rec.id, ChunkKey::new(6, 5)).is_none());
    }

    #[test]
    fn test_remove_world_leaves_other_worlds() {
        let index = SpatialIndex::new();
        let owner = PlayerId::generate();
        let a = record(owner, "overworld", (0, 0), (0, 0));
        let b = record(owner, "nether", (0, 0), (0, 0));
        index.insert(a.clone());
        index.insert(b.clone());

        let removed = index.remove_world(&WorldId::from("overworld"));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, a.id);
        assert_coherent(&index);
        assert!(index.claim(&a.id).is_none());
        assert!(index.claim(&b.id).is_some());
    }

    #[test]
    fn test_readers_never_observe_partial_state() {
        // A reader racing a writer must see each chunk either unclaimed or
        // resolving to a record that really contains it.
        let index = Arc::new(SpatialIndex::new());
        let world = WorldId::from("overworld");
        let owner = PlayerId::generate();

        let writer = {
            let index = index.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let rec = record(owner, "overworld", (0, 0), (3, 3));
                    index.insert(rec.clone());
                    index.remove(&rec.id);
                }
            })
        };

        for _ in 0..2000 {
            if let Some(rec) = index.claim_at(&world, ChunkKey::new(2, 2)) {
                assert!(rec.contains_chunk(ChunkKey::new(2, 2)));
                assert_eq!(rec.chunk_count(), 16);
            }
        }
        writer.join().unwrap();
        assert!(index.is_empty());
    }
}

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

//! Durable storage for claims: one JSON document per world.
//!
//! Mutations flow through a bounded queue drained by a single writer
//! thread, so registry commits never wait on disk. Each document update is
//! a load-modify-write under that world's exclusive lock; different worlds
//! write in parallel (the shutdown flush path shares the same locks).
//! Documents are written to a temp file and renamed into place, so a crash
//! mid-write leaves the previous document intact.
//!
//! I/O failures are logged with world/claim context and never unwind the
//! in-memory state: the registry favors what players see over strict
//! write-through durability, and the full-flush pass on world detach or
//! shutdown is the re-save mechanism.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use ahash::AHashMap;
use flume::{Receiver, Sender};
use thiserror::Error;
use tracing::{error, info, warn};

use homestead_common::{ClaimId, ClaimRecord, WorldId};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Synchronous per-world document store. Shared between the writer thread
/// and the callers that flush synchronously.
struct WorldStore {
    dir: PathBuf,
    locks: Mutex<AHashMap<WorldId, Arc<Mutex<()>>>>,
}

impl WorldStore {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            locks: Mutex::new(AHashMap::new()),
        }
    }

    fn lock_for(&self, world: &WorldId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(world.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn world_path(&self, world: &WorldId) -> PathBuf {
        self.dir.join(format!("{}.json", world.sanitized()))
    }

    /// Read a world's document, skipping (and logging) any element that
    /// fails minimal validation. A missing document is an empty world.
    fn read_records(&self, world: &WorldId) -> Result<Vec<ClaimRecord>, PersistError> {
        let path = self.world_path(world);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let raw: Vec<serde_json::Value> = serde_json::from_slice(&bytes)?;
        let mut records = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<ClaimRecord>(value) {
                Ok(record) if record.chunks.is_empty() => {
                    warn!(
                        world = %world, claim = %record.id,
                        "Skipping stored claim with no chunks"
                    );
                }
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(world = %world, "Skipping undecodable stored claim: {e}");
                }
            }
        }
        Ok(records)
    }

    fn write_records(&self, world: &WorldId, records: &mut [ClaimRecord]) -> Result<(), PersistError> {
        records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        let bytes = serde_json::to_vec_pretty(&records)?;

        let path = self.world_path(world);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Replace-by-id-or-append one record in its world's document.
    fn save(&self, record: &ClaimRecord) -> Result<(), PersistError> {
        let lock = self.lock_for(&record.world);
        let _guard = lock.lock().unwrap();

        let mut records = self.read_records(&record.world)?;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record.clone(),
            None => records.push(record.clone()),
        }
        self.write_records(&record.world, &mut records)
    }

    /// Remove one record from its world's document. The document is only
    /// rewritten if something was actually removed.
    fn delete(&self, world: &WorldId, id: &ClaimId) -> Result<bool, PersistError> {
        let lock = self.lock_for(world);
        let _guard = lock.lock().unwrap();

        let mut records = self.read_records(world)?;
        let before = records.len();
        records.retain(|r| r.id != *id);
        if records.len() == before {
            return Ok(false);
        }
        self.write_records(world, &mut records)?;
        Ok(true)
    }

    /// Overwrite a world's document with the given set wholesale.
    fn replace_all(&self, world: &WorldId, records: &[Arc<ClaimRecord>]) -> Result<(), PersistError> {
        let lock = self.lock_for(world);
        let _guard = lock.lock().unwrap();

        let mut records: Vec<ClaimRecord> = records.iter().map(|r| (**r).clone()).collect();
        self.write_records(world, &mut records)
    }
}

/// Message sent to the writer thread.
enum PersistMsg {
    Save(Arc<ClaimRecord>),
    Delete(WorldId, ClaimId),
    /// Reply when every message ahead of this one has been processed.
    Barrier(oneshot::Sender<()>),
}

/// Asynchronous gateway over [`WorldStore`]: a bounded queue and one writer
/// thread, stopped via kill switch with a drain pass on shutdown.
pub struct PersistenceGateway {
    store: Arc<WorldStore>,
    sender: Sender<PersistMsg>,
    kill_switch: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceGateway {
    pub fn open(dir: &Path, queue_depth: usize) -> Result<Self, PersistError> {
        fs::create_dir_all(dir)?;
        let store = Arc::new(WorldStore::new(dir));
        let (sender, receiver) = flume::bounded::<PersistMsg>(queue_depth);
        let kill_switch = Arc::new(AtomicBool::new(false));

        let ks = kill_switch.clone();
        let st = store.clone();
        let join_handle = std::thread::Builder::new()
            .name("claim-persist".to_string())
            .spawn(move || Self::writer_loop(st, receiver, ks))
            .expect("failed to spawn claim persistence thread");

        Ok(Self {
            store,
            sender,
            kill_switch,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    fn writer_loop(store: Arc<WorldStore>, receiver: Receiver<PersistMsg>, kill_switch: Arc<AtomicBool>) {
        loop {
            if kill_switch.load(Ordering::Relaxed) {
                // Drain whatever is still queued before terminating.
                let mut drained = 0usize;
                while let Ok(msg) = receiver.try_recv() {
                    Self::process(&store, msg);
                    drained += 1;
                }
                if drained > 0 {
                    info!("Claim persistence shutdown: drained {drained} pending writes");
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(50)) {
                Ok(msg) => Self::process(&store, msg),
                Err(flume::RecvTimeoutError::Timeout) => continue,
                Err(flume::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(store: &WorldStore, msg: PersistMsg) {
        match msg {
            PersistMsg::Save(record) => {
                if let Err(e) = store.save(&record) {
                    error!(
                        world = %record.world, claim = %record.id,
                        "Failed to persist claim: {e}"
                    );
                }
            }
            PersistMsg::Delete(world, id) => {
                if let Err(e) = store.delete(&world, &id) {
                    error!(world = %world, claim = %id, "Failed to persist claim deletion: {e}");
                }
            }
            PersistMsg::Barrier(reply) => {
                reply.send(()).ok();
            }
        }
    }

    fn submit(&self, msg: PersistMsg) {
        match self.sender.try_send(msg) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(msg)) => {
                warn!("Claim persistence backpressure: queue full, blocking producer");
                if self.sender.send(msg).is_err() {
                    error!("Claim persistence writer gone; write dropped");
                }
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                error!("Claim persistence writer gone; write dropped");
            }
        }
    }

    /// Schedule a replace-or-append of `record` in its world's document.
    /// Fire-and-forget from the caller's perspective.
    pub fn save(&self, record: Arc<ClaimRecord>) {
        self.submit(PersistMsg::Save(record));
    }

    /// Schedule removal of a record from its world's document.
    pub fn delete(&self, world: WorldId, id: ClaimId) {
        self.submit(PersistMsg::Delete(world, id));
    }

    /// Wait until everything queued before this call has hit the store.
    /// Returns false if the writer did not get there within `timeout`.
    pub fn barrier(&self, timeout: Duration) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(PersistMsg::Barrier(tx)).is_err() {
            // Writer already gone; nothing left to wait for.
            return true;
        }
        rx.recv_timeout(timeout).is_ok()
    }

    /// Load and validate a world's stored claim set. Failures yield an
    /// empty set; a load failure must not keep the world from mounting.
    pub fn load_world(&self, world: &WorldId) -> Vec<ClaimRecord> {
        let lock = self.store.lock_for(world);
        let _guard = lock.lock().unwrap();
        match self.store.read_records(world) {
            Ok(records) => records,
            Err(e) => {
                error!(world = %world, "Failed to load claim document: {e}");
                vec![]
            }
        }
    }

    /// Synchronously overwrite a world's document with the given records.
    /// Used by world detach and the final shutdown flush.
    pub fn flush_world(
        &self,
        world: &WorldId,
        records: &[Arc<ClaimRecord>],
    ) -> Result<(), PersistError> {
        self.store.replace_all(world, records)
    }

    /// Stop the writer: no further submissions are processed after the
    /// queue drains. Idempotent.
    pub fn stop(&self) {
        self.kill_switch.store(true, Ordering::SeqCst);
        let mut jh = self.join_handle.lock().unwrap();
        if let Some(handle) = jh.take() {
            handle.join().ok();
        }
    }
}

impl Drop for PersistenceGateway {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homestead_common::{PlayerId, model::enumerate_rect};

    fn record(world: &str, from: (i32, i32), to: (i32, i32)) -> ClaimRecord {
        ClaimRecord::new(
            PlayerId::generate(),
            "tester",
            WorldId::from(world),
            enumerate_rect(from, to),
            false,
        )
    }

    #[test]
    fn test_save_load_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = PersistenceGateway::open(dir.path(), 64).unwrap();
        let world = WorldId::from("overworld");

        let a = Arc::new(record("overworld", (0, 0), (1, 1)));
        let b = Arc::new(record("overworld", (10, 10), (10, 10)));
        gateway.save(a.clone());
        gateway.save(b.clone());
        assert!(gateway.barrier(Duration::from_secs(5)));

        let loaded = gateway.load_world(&world);
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains(&a));
        assert!(loaded.contains(&b));

        gateway.delete(world.clone(), a.id);
        assert!(gateway.barrier(Duration::from_secs(5)));
        let loaded = gateway.load_world(&world);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], *b);
    }

    #[test]
    fn test_save_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = PersistenceGateway::open(dir.path(), 64).unwrap();
        let world = WorldId::from("overworld");

        let original = Arc::new(record("overworld", (0, 0), (1, 1)));
        gateway.save(original.clone());

        let mut renamed = (*original).clone();
        renamed.name = Some("the farm".to_string());
        gateway.save(Arc::new(renamed));
        assert!(gateway.barrier(Duration::from_secs(5)));

        let loaded = gateway.load_world(&world);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name.as_deref(), Some("the farm"));
    }

    #[test]
    fn test_load_skips_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = PersistenceGateway::open(dir.path(), 64).unwrap();
        let world = WorldId::from("overworld");

        let good = Arc::new(record("overworld", (0, 0), (0, 0)));
        gateway.save(good.clone());
        assert!(gateway.barrier(Duration::from_secs(5)));

        // Splice garbage elements into the stored document: one an outright
        // non-record, one typed but with an empty chunk set.
        let path = dir.path().join("overworld.json");
        let mut doc: Vec<serde_json::Value> =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        doc.push(serde_json::json!({"not": "a claim"}));
        let mut empty = serde_json::to_value(&*good).unwrap();
        empty["id"] = serde_json::json!(uuid_like());
        empty["chunks"] = serde_json::json!([]);
        doc.push(empty);
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let loaded = gateway.load_world(&world);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], *good);
    }

    #[test]
    fn test_world_file_names_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = PersistenceGateway::open(dir.path(), 64).unwrap();

        let rec = Arc::new(record("DIM 1/the nether", (0, 0), (0, 0)));
        gateway.save(rec.clone());
        assert!(gateway.barrier(Duration::from_secs(5)));

        assert!(dir.path().join("DIM_1_the_nether.json").exists());
        let loaded = gateway.load_world(&WorldId::from("DIM 1/the nether"));
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_flush_world_overwrites_document() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = PersistenceGateway::open(dir.path(), 64).unwrap();
        let world = WorldId::from("overworld");

        gateway.save(Arc::new(record("overworld", (0, 0), (0, 0))));
        assert!(gateway.barrier(Duration::from_secs(5)));

        let replacement = Arc::new(record("overworld", (5, 5), (5, 5)));
        gateway.flush_world(&world, &[replacement.clone()]).unwrap();

        let loaded = gateway.load_world(&world);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], *replacement);
    }

    #[test]
    fn test_stop_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = PersistenceGateway::open(dir.path(), 256).unwrap();
        let world = WorldId::from("overworld");

        for x in 0..20 {
            gateway.save(Arc::new(record("overworld", (x, 0), (x, 0))));
        }
        gateway.stop();

        let loaded = gateway.load_world(&world);
        assert_eq!(loaded.len(), 20);
    }

    fn uuid_like() -> String {
        ClaimId::generate().to_string()
    }
}

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

pub use crate::model::chunk::{ChunkBounds, ChunkKey, ChunkSet, chunk_set_serde, enumerate_rect};
pub use crate::model::claim::{ClaimFlags, ClaimId, ClaimRecord, PlayerId, WorldId};
pub use crate::model::permissions::{PermissionLevel, PlayerPerms};

use thiserror::Error;

pub mod chunk;
pub mod claim;
pub mod permissions;

/// Everything that can go wrong with a claim operation, as reported back to
/// the acting player. These are expected conditions: they carry the
/// user-facing reason (and the conflicting owner, where there is one) and
/// are never logged as errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("Claims are not enabled in world '{0}'")]
    WorldNotClaimable(WorldId),
    #[error("A claim must contain at least one chunk")]
    EmptyProposal,
    #[error("Claim would cover {requested} chunks; the limit per claim is {max}")]
    ClaimTooLarge { requested: usize, max: usize },
    #[error("Claim dimensions {width}x{length} exceed the maximum edge length of {max}")]
    DimensionTooLarge { width: u32, length: u32, max: u32 },
    #[error("Claim limit reached: you already have {current} of {max} claims")]
    ClaimLimitReached { current: usize, max: usize },
    #[error(
        "Chunk limit reached: {current} owned plus {requested} requested exceeds your maximum of {max}"
    )]
    ChunkLimitReached {
        current: usize,
        requested: usize,
        max: usize,
    },
    #[error("Overlaps existing claim owned by {owner} at chunk {chunk}")]
    Overlap { owner: String, chunk: ChunkKey },
    #[error("No claim preview is pending")]
    NoPendingPreview,
    #[error("Claim preview expired")]
    PreviewExpired,
    #[error("No such claim: {0}")]
    ClaimNotFound(ClaimId),
    #[error("No claim at chunk {0}")]
    NoClaimAtChunk(ChunkKey),
    #[error("You don't have permission to do that here")]
    PermissionDenied,
    #[error("Internal registry error: {0}")]
    Internal(String),
}

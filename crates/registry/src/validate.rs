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

//! Overlap and quota validation for proposed claims. Pure decision logic:
//! reads the index, mutates nothing, callable from any thread.

use std::sync::Arc;

use homestead_common::{
    ChunkBounds, ChunkKey, ChunkSet, ClaimError, ClaimRecord, PlayerId, WorldId,
};

use crate::{
    config::{QuotaBonus, RegistryConfig},
    index::SpatialIndex,
};

/// A proposal that passed validation, along with the committed claims it
/// will displace: the proposer's own overlapped claims, or — for admin
/// proposals — ordinary claims being overridden.
#[derive(Debug, Clone)]
pub struct ValidatedProposal {
    pub displaced: Vec<Arc<ClaimRecord>>,
}

/// Check a proposed chunk set against the committed index and the
/// proposer's quota.
///
/// Check order: world claimability, then (for non-admin proposers) size and
/// quota limits, then per-chunk overlap. A chunk may be taken when it is
/// unclaimed, when it belongs to the proposer, or when the proposer is
/// admin and the holder is an ordinary claim. Any other holder fails the
/// proposal with that holder named.
///
/// Quota numbers may carry a leveling-derived bonus, already resolved to
/// integers by the caller.
pub fn validate_proposal(
    index: &SpatialIndex,
    config: &RegistryConfig,
    proposer: &PlayerId,
    world: &WorldId,
    chunks: &ChunkSet,
    is_admin: bool,
    bonus: &QuotaBonus,
) -> Result<ValidatedProposal, ClaimError> {
    if config.unclaimable_worlds.contains(world) {
        return Err(ClaimError::WorldNotClaimable(world.clone()));
    }
    if chunks.is_empty() {
        return Err(ClaimError::EmptyProposal);
    }

    if !is_admin {
        let quotas = &config.quotas;
        if chunks.len() > quotas.max_chunks_per_claim {
            return Err(ClaimError::ClaimTooLarge {
                requested: chunks.len(),
                max: quotas.max_chunks_per_claim,
            });
        }
        let bounds = ChunkBounds::of(chunks);
        if bounds.width() > quotas.max_claim_dimension
            || bounds.length() > quotas.max_claim_dimension
        {
            return Err(ClaimError::DimensionTooLarge {
                width: bounds.width(),
                length: bounds.length(),
                max: quotas.max_claim_dimension,
            });
        }
        let current_claims = index.owned_claim_count(proposer);
        let max_claims = quotas.max_claims_per_player + bonus.claims;
        if current_claims >= max_claims {
            return Err(ClaimError::ClaimLimitReached {
                current: current_claims,
                max: max_claims,
            });
        }
        let current_chunks = index.owned_chunk_count(proposer);
        let max_chunks = quotas.max_total_chunks_per_player + bonus.chunks;
        if current_chunks + chunks.len() > max_chunks {
            return Err(ClaimError::ChunkLimitReached {
                current: current_chunks,
                requested: chunks.len(),
                max: max_chunks,
            });
        }
    }

    // Walk chunks in coordinate order so the reported conflict is stable.
    let mut ordered: Vec<ChunkKey> = chunks.iter().copied().collect();
    ordered.sort_unstable();

    let mut displaced: Vec<Arc<ClaimRecord>> = vec![];
    for chunk in ordered {
        let Some(holder) = index.claim_at(world, chunk) else {
            continue;
        };
        let permitted = holder.owner == *proposer || (is_admin && !holder.admin_claim);
        if !permitted {
            return Err(ClaimError::Overlap {
                owner: holder.owner_name.clone(),
                chunk,
            });
        }
        if !displaced.iter().any(|c| c.id == holder.id) {
            displaced.push(holder);
        }
    }

    Ok(ValidatedProposal { displaced })
}

#[cfg(test)]
mod tests {
    use super::*;
    use homestead_common::model::enumerate_rect;

    fn setup() -> (SpatialIndex, RegistryConfig, PlayerId, WorldId) {
        (
            SpatialIndex::new(),
            RegistryConfig::default(),
            PlayerId::generate(),
            WorldId::from("overworld"),
        )
    }

    #[test]
    fn test_check_order_world_before_size() {
        let (index, mut config, player, world) = setup();
        config.unclaimable_worlds.insert(world.clone());
        // Oversized AND unclaimable: the world check fires first.
        let huge = enumerate_rect((0, 0), (50, 50));
        let err = validate_proposal(
            &index,
            &config,
            &player,
            &world,
            &huge,
            false,
            &QuotaBonus::NONE,
        )
        .unwrap_err();
        assert_eq!(err, ClaimError::WorldNotClaimable(world));
    }

    #[test]
    fn test_admin_skips_quota_checks() {
        let (index, config, player, world) = setup();
        let huge = enumerate_rect((0, 0), (50, 50));
        assert!(
            validate_proposal(
                &index,
                &config,
                &player,
                &world,
                &huge,
                true,
                &QuotaBonus::NONE
            )
            .is_ok()
        );
    }

    #[test]
    fn test_displaced_deduplicates_by_claim() {
        let (index, config, player, world) = setup();
        let existing = Arc::new(ClaimRecord::new(
            player,
            "me",
            world.clone(),
            enumerate_rect((0, 0), (1, 1)),
            false,
        ));
        index.insert(existing.clone());

        // Proposal overlapping two chunks of the same claim: one displaced
        // entry, not two.
        let proposal = enumerate_rect((0, 0), (0, 1));
        let validated = validate_proposal(
            &index,
            &config,
            &player,
            &world,
            &proposal,
            false,
            &QuotaBonus::NONE,
        )
        .unwrap();
        assert_eq!(validated.displaced.len(), 1);
        assert_eq!(validated.displaced[0].id, existing.id);
    }

    #[test]
    fn test_bonus_lifts_chunk_quota() {
        let (index, mut config, player, world) = setup();
        config.quotas.max_total_chunks_per_player = 8;
        config.quotas.max_chunks_per_claim = 9;
        let nine = enumerate_rect((0, 0), (2, 2));

        let err = validate_proposal(
            &index,
            &config,
            &player,
            &world,
            &nine,
            false,
            &QuotaBonus::NONE,
        )
        .unwrap_err();
        assert!(matches!(err, ClaimError::ChunkLimitReached { max: 8, .. }));

        let bonus = QuotaBonus {
            claims: 0,
            chunks: 1,
        };
        assert!(validate_proposal(&index, &config, &player, &world, &nine, false, &bonus).is_ok());
    }
}

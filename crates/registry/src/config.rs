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

//! Config is created by the embedding host and handed to the registry at
//! construction. Used to hold things typically configured by server config
//! files: quota numbers, preview timeout, persistence tuning.

use std::{collections::HashSet, time::Duration};

use homestead_common::WorldId;

/// Per-player claim limits. Admin claims bypass all of these.
#[derive(Clone, Debug)]
pub struct ClaimQuotas {
    /// Most chunks a single claim may cover.
    pub max_chunks_per_claim: usize,
    /// Longest edge, in chunks, of a single claim's bounding rectangle.
    pub max_claim_dimension: u32,
    /// How many separate claims one player may hold.
    pub max_claims_per_player: usize,
    /// Total chunks one player may hold across all of their claims.
    pub max_total_chunks_per_player: usize,
}

impl Default for ClaimQuotas {
    fn default() -> Self {
        Self {
            max_chunks_per_claim: 25,
            max_claim_dimension: 8,
            max_claims_per_player: 4,
            max_total_chunks_per_player: 64,
        }
    }
}

/// Extra quota slots granted by the leveling system, resolved to plain
/// integers by the caller before they reach the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuotaBonus {
    /// Additional claim slots on top of [`ClaimQuotas::max_claims_per_player`].
    pub claims: usize,
    /// Additional chunks on top of [`ClaimQuotas::max_total_chunks_per_player`].
    pub chunks: usize,
}

impl QuotaBonus {
    pub const NONE: QuotaBonus = QuotaBonus {
        claims: 0,
        chunks: 0,
    };
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub quotas: ClaimQuotas,
    /// How long a pending claim preview stays confirmable.
    pub preview_timeout: Duration,
    /// Bound on the async persistence queue. When full, producers block
    /// until the writer catches up (with a logged warning).
    pub persistence_queue_depth: usize,
    /// Worlds where claiming is disabled outright.
    pub unclaimable_worlds: HashSet<WorldId>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            quotas: ClaimQuotas::default(),
            preview_timeout: Duration::from_secs(30),
            persistence_queue_depth: 1024,
            unclaimable_worlds: HashSet::new(),
        }
    }
}

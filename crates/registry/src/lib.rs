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

//! The land-claim registry: the component that lets players reserve sets of
//! world chunks as protected property.
//!
//! The [`ClaimRegistry`] façade is the public surface. Underneath it:
//! a snapshot-visibility spatial index with lock-free reads, a pure overlap
//! validator, an advisory preview workflow with wall-clock expiry, and a
//! background persistence writer that serializes each world's claim set to
//! its own document.
//!
//! The registry is an in-process library. The enclosing server wires it to
//! chat commands and UI panels, and subscribes map/HUD collaborators via
//! [`ClaimListener`].

pub use config::{ClaimQuotas, QuotaBonus, RegistryConfig};
pub use events::ClaimListener;
pub use index::{ChunkRemoval, SpatialIndex};
pub use persist::{PersistError, PersistenceGateway};
pub use preview::{ClaimPreview, PreviewWorkflow};
pub use registry::{ClaimRegistry, ClaimRequest};
pub use validate::{ValidatedProposal, validate_proposal};

mod config;
mod events;
mod index;
mod persist;
mod preview;
mod registry;
mod validate;

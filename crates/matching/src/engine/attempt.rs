// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single match attempt
//!
//! One attempt pairs one ride with one chair:
//! 1. Begin a store transaction
//! 2. Draw up to `sample_attempts` random active chairs, keeping the first idle one
//! 3. Assign the chair to the ride and commit
//! 4. Increment the chair's cached active ride count
//!
//! The search is probabilistic. With a large chair pool it may miss an idle
//! chair that exists; the ride is then retried later.

use chairline_sdk::types::Chair;
use tracing::{debug, warn};

use super::{EngineConfig, EngineError};
use crate::{
	cache::AppCache,
	store::{RideStore, RideTransaction, StoreError},
	types::{IdlenessSource, MatchOutcome},
};

/// Run one match attempt for `ride_id`
///
/// Store and commit failures are returned as errors after the transaction
/// has been rolled back; the cache is left untouched in that case. If the
/// returned future is dropped midway, the transaction is dropped with it and
/// therefore rolled back.
pub async fn try_match(
	store: &dyn RideStore,
	cache: &AppCache,
	config: &EngineConfig,
	ride_id: &str,
) -> Result<MatchOutcome, EngineError> {
	let mut tx = store.begin().await?;

	let (chair, draws) = match select_idle_chair(tx.as_mut(), cache, config).await {
		Ok(Some(selected)) => selected,
		Ok(None) => {
			rollback(tx, ride_id).await;
			return Ok(MatchOutcome::NoIdleChair);
		}
		Err(e) => {
			rollback(tx, ride_id).await;
			return Err(e);
		}
	};

	match tx.assign_chair(ride_id, &chair.id).await {
		Ok(()) => {}
		Err(StoreError::AlreadyMatched(_)) => {
			rollback(tx, ride_id).await;
			return Ok(MatchOutcome::AlreadyMatched);
		}
		Err(StoreError::RideNotFound(_)) => {
			rollback(tx, ride_id).await;
			return Ok(MatchOutcome::RideNotFound);
		}
		Err(e) => {
			rollback(tx, ride_id).await;
			return Err(e.into());
		}
	}

	match tx.commit().await {
		Ok(()) => {}
		Err(StoreError::AlreadyMatched(_)) => return Ok(MatchOutcome::AlreadyMatched),
		Err(StoreError::RideNotFound(_)) => return Ok(MatchOutcome::RideNotFound),
		Err(e) => return Err(e.into()),
	}

	// Not transactional with the commit: a crash here under-counts the chair
	// until the next bootstrap.
	let active_rides = cache.increment_active_rides(&chair.id)?;

	Ok(MatchOutcome::Matched {
		ride_id: ride_id.to_string(),
		chair_id: chair.id,
		draws,
		active_rides,
	})
}

/// Draw random active chairs until an idle one shows up
///
/// Returns the chair and the number of draws it took, or `None` when the
/// budget is exhausted or no chair is active at all.
async fn select_idle_chair(
	tx: &mut dyn RideTransaction,
	cache: &AppCache,
	config: &EngineConfig,
) -> Result<Option<(Chair, usize)>, EngineError> {
	for draw in 1..=config.sample_attempts {
		let Some(chair) = tx.random_active_chair().await? else {
			debug!(target: "matching", "No active chair");
			return Ok(None);
		};

		if is_idle(tx, cache, config.idleness_source, &chair.id).await? {
			return Ok(Some((chair, draw)));
		}
	}

	Ok(None)
}

async fn is_idle(
	tx: &mut dyn RideTransaction,
	cache: &AppCache,
	source: IdlenessSource,
	chair_id: &str,
) -> Result<bool, EngineError> {
	match source {
		IdlenessSource::Store => Ok(tx.is_chair_idle(chair_id).await?),
		IdlenessSource::Cache => match cache.active_rides(chair_id) {
			Some(count) => Ok(count == 0),
			None => {
				debug!(target: "matching", chair_id, "Active ride cache miss, asking store");
				Ok(tx.is_chair_idle(chair_id).await?)
			}
		},
	}
}

async fn rollback(tx: Box<dyn RideTransaction>, ride_id: &str) {
	if let Err(e) = tx.rollback().await {
		warn!(target: "matching", ride_id, error = %e, "Rollback failed");
	}
}

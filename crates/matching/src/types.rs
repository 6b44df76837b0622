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

use chairline_sdk::types::{ChairId, RideId};
use serde::{Deserialize, Serialize};

/// Result of a single match attempt
///
/// Only `Matched` mutates state. `NoIdleChair` sends the ride back to the
/// queue; `AlreadyMatched` and `RideNotFound` drop the queue entry because
/// there is nothing left to match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
	/// The ride was committed to a chair
	Matched {
		ride_id: RideId,
		chair_id: ChairId,
		/// Number of chairs drawn before an idle one was found
		draws: usize,
		/// Cached active ride count of the chair after the assignment
		active_rides: u32,
	},
	/// No idle active chair was found within the sampling budget
	NoIdleChair,
	/// The ride already has a chair (duplicate queue entry or concurrent match)
	AlreadyMatched,
	/// The ride no longer exists in the store
	RideNotFound,
}

impl MatchOutcome {
	pub fn is_matched(&self) -> bool {
		matches!(self, MatchOutcome::Matched { .. })
	}

	pub fn chair_id(&self) -> Option<&str> {
		match self {
			MatchOutcome::Matched { chair_id, .. } => Some(chair_id),
			_ => None,
		}
	}
}

/// Where the idleness of a sampled chair is looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdlenessSource {
	/// Cached active ride count (`== 0`), falling back to the store on a miss
	#[default]
	Cache,
	/// Store predicate evaluated inside the match transaction
	Store,
}

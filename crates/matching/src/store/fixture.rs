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

use std::path::Path;

use chairline_sdk::types::{Chair, ChairLocation, Ride, RideStatusEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
	#[error("Failed to read fixture {path}: {source}")]
	Io {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("Failed to parse fixture: {0}")]
	Parse(#[from] serde_json::Error),
}

/// Table dump used to seed a [`super::MemoryRideStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreFixture {
	pub chairs: Vec<Chair>,
	pub rides: Vec<Ride>,
	pub ride_statuses: Vec<RideStatusEvent>,
	pub chair_locations: Vec<ChairLocation>,
}

impl StoreFixture {
	pub fn from_json(json: &str) -> Result<Self, FixtureError> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
			path: path.display().to_string(),
			source,
		})?;
		Self::from_json(&content)
	}
}

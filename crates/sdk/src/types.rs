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

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chair (driver) identifier
pub type ChairId = String;

/// Ride identifier
pub type RideId = String;

/// Generate a fresh random identifier for chairs, rides and samples
pub fn new_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

/// A point on the city grid
///
/// Coordinates are integer grid units, not degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
	pub latitude: i32,
	pub longitude: i32,
}

impl Coordinate {
	pub fn new(latitude: i32, longitude: i32) -> Self {
		Self {
			latitude,
			longitude,
		}
	}

	/// Manhattan distance between two grid points
	pub fn distance_to(&self, other: &Coordinate) -> i64 {
		calculate_distance(
			self.latitude,
			self.longitude,
			other.latitude,
			other.longitude,
		)
	}
}

/// Manhattan distance `|Δlat| + |Δlon|`
pub fn calculate_distance(a_lat: i32, a_lon: i32, b_lat: i32, b_lon: i32) -> i64 {
	(i64::from(a_lat) - i64::from(b_lat)).abs() + (i64::from(a_lon) - i64::from(b_lon)).abs()
}

/// Registered chair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chair {
	pub id: ChairId,
	pub owner_id: String,
	pub name: String,
	pub model: String,
	/// Whether the chair currently accepts rides
	pub is_active: bool,
	/// Session credential presented by the chair client
	pub access_token: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Ride request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ride {
	pub id: RideId,
	pub user_id: String,
	/// Assigned chair; `None` until matched
	pub chair_id: Option<ChairId>,
	pub pickup: Coordinate,
	pub destination: Coordinate,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Ride lifecycle status
///
/// Rides move through the statuses in declaration order; `Completed` is the
/// only terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
	Matching,
	Enroute,
	Pickup,
	Carrying,
	Arrived,
	Completed,
}

impl RideStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			RideStatus::Matching => "MATCHING",
			RideStatus::Enroute => "ENROUTE",
			RideStatus::Pickup => "PICKUP",
			RideStatus::Carrying => "CARRYING",
			RideStatus::Arrived => "ARRIVED",
			RideStatus::Completed => "COMPLETED",
		}
	}

	pub fn is_completed(&self) -> bool {
		matches!(self, RideStatus::Completed)
	}
}

impl fmt::Display for RideStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown ride status: {0}")]
pub struct ParseRideStatusError(pub String);

impl FromStr for RideStatus {
	type Err = ParseRideStatusError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"MATCHING" => Ok(RideStatus::Matching),
			"ENROUTE" => Ok(RideStatus::Enroute),
			"PICKUP" => Ok(RideStatus::Pickup),
			"CARRYING" => Ok(RideStatus::Carrying),
			"ARRIVED" => Ok(RideStatus::Arrived),
			"COMPLETED" => Ok(RideStatus::Completed),
			other => Err(ParseRideStatusError(other.to_string())),
		}
	}
}

/// One entry of a ride's status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideStatusEvent {
	pub id: String,
	pub ride_id: RideId,
	pub status: RideStatus,
	pub created_at: DateTime<Utc>,
}

/// Location sample reported by a chair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChairLocation {
	pub id: String,
	pub chair_id: ChairId,
	pub latitude: i32,
	pub longitude: i32,
	pub created_at: DateTime<Utc>,
}

impl ChairLocation {
	pub fn coordinate(&self) -> Coordinate {
		Coordinate::new(self.latitude, self.longitude)
	}

	/// Manhattan distance travelled from `previous` to this sample
	pub fn distance_from(&self, previous: &ChairLocation) -> i64 {
		previous.coordinate().distance_to(&self.coordinate())
	}
}

/// Cumulative distance travelled by a chair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChairTotalDistance {
	pub chair_id: ChairId,
	pub total_distance: i64,
	/// Timestamp of the last sample that contributed; `None` before any sample
	pub updated_at: Option<DateTime<Utc>>,
}

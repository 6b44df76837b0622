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

use chairline_sdk::types::RideId;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TryRecvError, error::TrySendError};

/// Matching Queue of ride ids waiting for a chair
///
/// The Matching Queue is the boundary between everything that produces
/// unmatched rides and the single dispatch loop of the matching engine.
///
/// Properties:
/// - Multiple Producers (startup seeding, ride creation, engine re-enqueue)
/// - Single Consumer (dispatch loop)
/// - Bounded capacity for backpressure
/// - First-in-first-out; re-enqueued rides go to the tail
///
/// The queue does NOT:
/// - Prioritize rides that have waited longer
/// - Deduplicate ride ids
/// - Drop rides: `enqueue` waits for free capacity
pub struct MatchingQueue {
	sender: Sender<RideId>,
	receiver: Receiver<RideId>,
}

impl MatchingQueue {
	/// Create a new matching queue with the specified capacity
	///
	/// A capacity of 0 is raised to 1.
	pub fn new(capacity: usize) -> Self {
		let (sender, receiver) = mpsc::channel(capacity.max(1));
		Self { sender, receiver }
	}

	/// Split the queue into sender and receiver ends
	///
	/// The sender can be cloned for every producer.
	/// The receiver must remain unique for the single dispatch loop.
	pub fn split(self) -> (MatchingQueueSender, MatchingQueueReceiver) {
		(
			MatchingQueueSender {
				sender: self.sender,
			},
			MatchingQueueReceiver {
				receiver: self.receiver,
			},
		)
	}
}

/// Sender end of the matching queue
#[derive(Clone)]
pub struct MatchingQueueSender {
	sender: Sender<RideId>,
}

impl MatchingQueueSender {
	/// Enqueue a ride, waiting for capacity if the queue is full
	pub async fn enqueue(&self, ride_id: RideId) -> Result<(), QueueError> {
		self.sender
			.send(ride_id)
			.await
			.map_err(|_| QueueError::Closed)
	}

	/// Try to enqueue a ride (non-blocking)
	///
	/// Returns [`QueueError::Full`] when the dispatch loop is behind.
	pub fn try_enqueue(&self, ride_id: RideId) -> Result<(), QueueError> {
		self.sender.try_send(ride_id).map_err(|e| match e {
			TrySendError::Full(_) => QueueError::Full,
			TrySendError::Closed(_) => QueueError::Closed,
		})
	}

	/// Number of ride ids currently waiting
	pub fn len(&self) -> usize {
		self.sender.max_capacity() - self.sender.capacity()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn is_full(&self) -> bool {
		self.sender.capacity() == 0
	}

	pub fn is_closed(&self) -> bool {
		self.sender.is_closed()
	}
}

/// Receiver end of the matching queue (used by the dispatch loop)
pub struct MatchingQueueReceiver {
	receiver: Receiver<RideId>,
}

impl MatchingQueueReceiver {
	/// Receive the next ride id
	///
	/// Returns `None` once every sender has been dropped and the queue is drained.
	pub async fn recv(&mut self) -> Option<RideId> {
		self.receiver.recv().await
	}

	/// Try to receive a ride id (non-blocking)
	pub fn try_recv(&mut self) -> Result<RideId, QueueError> {
		self.receiver.try_recv().map_err(|e| match e {
			TryRecvError::Empty => QueueError::Empty,
			TryRecvError::Disconnected => QueueError::Closed,
		})
	}
}

/// Errors that can occur when interacting with the matching queue
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	#[error("Queue is full")]
	Full,
	#[error("Queue is empty")]
	Empty,
	#[error("Queue closed")]
	Closed,
}

// Copyright 2026 Daniel Pelikan
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

//! Bluetooth serial transport module.
//!
//! The transport contract, its event feed, the BlueZ RFCOMM implementation,
//! an in-memory implementation, and the outbound frame encoding.

pub mod codepage;
mod events;
mod memory;
pub mod packetizer;
mod rfcomm;
mod transport;

pub use events::{EventFeed, Subscription, TransportEvent};
pub use memory::{Call, MemoryTransport, Operation};
pub use rfcomm::RfcommTransport;
pub use transport::SerialTransport;

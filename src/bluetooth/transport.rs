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

//! Serial transport contract.

use anyhow::Result;
use async_trait::async_trait;

use super::events::EventFeed;
use crate::state::Device;

/// Byte-oriented Bluetooth serial transport.
///
/// Implementations must tolerate concurrent `write` calls; the session may
/// dispatch all frames of a message at once.
#[async_trait]
pub trait SerialTransport: Send + Sync {
    /// Whether the adapter is powered.
    async fn is_enabled(&self) -> Result<bool>;

    /// Power the adapter on.
    async fn enable(&self) -> Result<()>;

    /// Power the adapter off.
    async fn disable(&self) -> Result<()>;

    /// Ask the user (or the system) to power the adapter on.
    async fn request_enable(&self) -> Result<()>;

    /// Paired devices.
    async fn list(&self) -> Result<Vec<Device>>;

    /// Run one discovery cycle and return the devices that are not paired.
    async fn discover_unpaired_devices(&self) -> Result<Vec<Device>>;

    /// Stop a running discovery cycle.
    async fn cancel_discovery(&self) -> Result<()>;

    /// Pair with a device. `Ok(false)` means the peer rejected pairing.
    async fn pair_device(&self, id: &str) -> Result<bool>;

    /// Open the serial link to a device.
    async fn connect(&self, id: &str) -> Result<()>;

    /// Close the serial link.
    async fn disconnect(&self) -> Result<()>;

    /// Write raw bytes to the serial link.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Feed of asynchronous adapter and link events.
    fn events(&self) -> &EventFeed;
}

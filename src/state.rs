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

//! Session state record and its parts.

use serde::{Deserialize, Serialize};

/// A Bluetooth peripheral as reported by the transport.
///
/// Equality is by `id` only; names are display labels and may repeat.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Transport-assigned address, e.g. `00:21:13:01:2A:3B`.
    pub id: String,
    /// Display label, possibly empty.
    pub name: String,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Name for messages, falling back to the address.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for Device {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Adapter power and discovery flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdapterState {
    pub enabled: bool,
    pub discovering: bool,
}

/// Known devices, split by pairing status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceRegistry {
    /// Paired devices in listing order.
    pub paired: Vec<Device>,
    /// Result of the last discovery cycle.
    pub unpaired: Vec<Device>,
}

impl DeviceRegistry {
    /// Move a freshly paired device from `unpaired` to the end of `paired`.
    pub fn mark_paired(&mut self, device: &Device) {
        self.unpaired.retain(|d| d.id != device.id);
        if !self.paired.iter().any(|d| d.id == device.id) {
            self.paired.push(device.clone());
        }
    }

    pub fn clear(&mut self) {
        self.paired.clear();
        self.unpaired.clear();
    }
}

/// Link status of the single serial session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    /// True only while a connect attempt is in flight.
    pub connecting: bool,
    /// Last device the transport reported as connected. Kept after
    /// disconnect for display.
    pub active_device: Option<Device>,
}

impl ConnectionState {
    pub fn status(&self) -> ConnectionStatus {
        if self.connected {
            ConnectionStatus::Connected
        } else if self.connecting {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

/// Summary of [`ConnectionState`] for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
        }
    }
}

/// Which device list is shown, and so what activating a row does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Paired devices; activating a row connects or disconnects.
    #[default]
    Paired,
    /// Discovered devices; activating a row pairs.
    Unpaired,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Paired => "PAIRED DEVICES",
            Section::Unpaired => "UNPAIRED DEVICES",
        }
    }
}

/// Everything a front-end needs to render the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub adapter: AdapterState,
    pub registry: DeviceRegistry,
    pub connection: ConnectionState,
    pub section: Section,
}

impl SessionView {
    /// Devices listed under the selected section.
    pub fn visible_devices(&self) -> &[Device] {
        match self.section {
            Section::Paired => &self.registry.paired,
            Section::Unpaired => &self.registry.unpaired,
        }
    }

    /// Whether `device` is the one currently connected.
    pub fn is_connected_to(&self, device: &Device) -> bool {
        self.connection.connected && self.connection.active_device.as_ref() == Some(device)
    }
}

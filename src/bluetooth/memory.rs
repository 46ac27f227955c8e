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

//! In-memory serial transport.
//!
//! Scriptable stand-in for the radio: it keeps a set of nearby and paired
//! devices, records every call, and can be told to fail or reject the next
//! operation. Used by the tests and by the binary's `--simulate` mode.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::codepage;
use super::events::{EventFeed, TransportEvent};
use super::transport::SerialTransport;
use crate::state::Device;

/// Transport operations, used to script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    IsEnabled,
    Enable,
    Disable,
    RequestEnable,
    List,
    Discover,
    CancelDiscovery,
    Pair,
    Connect,
    Disconnect,
    Write,
}

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    IsEnabled,
    Enable,
    Disable,
    RequestEnable,
    List,
    Discover,
    CancelDiscovery,
    Pair(String),
    Connect(String),
    Disconnect,
    Write(Vec<u8>),
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::IsEnabled => Operation::IsEnabled,
            Call::Enable => Operation::Enable,
            Call::Disable => Operation::Disable,
            Call::RequestEnable => Operation::RequestEnable,
            Call::List => Operation::List,
            Call::Discover => Operation::Discover,
            Call::CancelDiscovery => Operation::CancelDiscovery,
            Call::Pair(_) => Operation::Pair,
            Call::Connect(_) => Operation::Connect,
            Call::Disconnect => Operation::Disconnect,
            Call::Write(_) => Operation::Write,
        }
    }
}

#[derive(Debug, Default)]
struct Radio {
    enabled: bool,
    paired: Vec<Device>,
    nearby: Vec<Device>,
    rejects_pairing: HashSet<String>,
    connected: Option<String>,
    discovery_held: bool,
    discovery_cancelled: bool,
    failures: HashMap<Operation, String>,
    calls: Vec<Call>,
}

/// Scriptable in-memory transport.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    radio: Mutex<Radio>,
    discovery_gate: Notify,
    feed: EventFeed,
    latency: Duration,
}

impl MemoryTransport {
    /// Powered-off radio with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// A small neighbourhood of serial modules for demos.
    pub fn demo() -> Self {
        let transport = Self::new()
            .with_enabled(true)
            .with_paired(vec![Device::new("00:21:13:01:2A:3B", "HC-06")])
            .with_nearby(vec![
                Device::new("98:D3:31:F5:8C:10", "HC-05"),
                Device::new("00:14:03:05:59:E1", "JDY-31-SPP"),
                Device::new("20:16:04:12:77:05", ""),
            ])
            .with_latency(Duration::from_millis(250));
        transport.reject_pairing("20:16:04:12:77:05");
        transport
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        self.radio.lock().enabled = enabled;
        self
    }

    pub fn with_paired(self, devices: Vec<Device>) -> Self {
        self.radio.lock().paired = devices;
        self
    }

    /// Devices that a discovery cycle will find.
    pub fn with_nearby(self, devices: Vec<Device>) -> Self {
        self.radio.lock().nearby = devices;
        self
    }

    /// Delay applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next call of `operation` fail with `message`.
    pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
        self.radio.lock().failures.insert(operation, message.into());
    }

    /// Make pairing with `id` resolve negatively.
    pub fn reject_pairing(&self, id: &str) {
        self.radio.lock().rejects_pairing.insert(id.to_string());
    }

    /// Keep discovery calls suspended until [`Self::release_discovery`]
    /// or a cancel.
    pub fn hold_discovery(&self) {
        self.radio.lock().discovery_held = true;
    }

    /// Let a held discovery cycle complete.
    pub fn release_discovery(&self) {
        self.radio.lock().discovery_held = false;
        self.discovery_gate.notify_one();
    }

    /// Simulate the link dropping on the peer's side.
    pub fn drop_link(&self) {
        let dropped = self.radio.lock().connected.take();
        if let Some(id) = dropped {
            info!("Simulated link loss to {}", id);
        }
        self.feed.publish(TransportEvent::ConnectionLost);
    }

    /// Simulate the adapter being toggled outside this process.
    pub fn toggle_externally(&self, enabled: bool) {
        self.radio.lock().enabled = enabled;
        self.feed.publish(if enabled {
            TransportEvent::AdapterEnabled
        } else {
            TransportEvent::AdapterDisabled
        });
    }

    /// Push an arbitrary event.
    pub fn emit(&self, event: TransportEvent) {
        self.feed.publish(event);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.radio.lock().calls.clone()
    }

    /// Number of calls of one kind.
    pub fn count(&self, operation: Operation) -> usize {
        self.radio
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Payloads of every write, in arrival order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.radio
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connected_to(&self) -> Option<String> {
        self.radio.lock().connected.clone()
    }

    /// Record a call and apply any scripted failure for it.
    async fn begin(&self, call: Call) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let operation = call.operation();
        let mut radio = self.radio.lock();
        radio.calls.push(call);
        match radio.failures.remove(&operation) {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn require_enabled(&self) -> Result<()> {
        if self.radio.lock().enabled {
            Ok(())
        } else {
            bail!("Bluetooth adapter is not enabled")
        }
    }
}

#[async_trait]
impl SerialTransport for MemoryTransport {
    async fn is_enabled(&self) -> Result<bool> {
        self.begin(Call::IsEnabled).await?;
        Ok(self.radio.lock().enabled)
    }

    async fn enable(&self) -> Result<()> {
        self.begin(Call::Enable).await?;
        self.toggle_externally(true);
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        self.begin(Call::Disable).await?;
        let had_link = self.radio.lock().connected.take().is_some();
        self.toggle_externally(false);
        if had_link {
            self.feed.publish(TransportEvent::ConnectionLost);
        }
        Ok(())
    }

    async fn request_enable(&self) -> Result<()> {
        self.begin(Call::RequestEnable).await?;
        self.toggle_externally(true);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Device>> {
        self.begin(Call::List).await?;
        let radio = self.radio.lock();
        if radio.enabled {
            Ok(radio.paired.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn discover_unpaired_devices(&self) -> Result<Vec<Device>> {
        self.begin(Call::Discover).await?;
        self.require_enabled()?;
        self.radio.lock().discovery_cancelled = false;

        while self.radio.lock().discovery_held {
            self.discovery_gate.notified().await;
            if self.radio.lock().discovery_cancelled {
                break;
            }
        }

        let radio = self.radio.lock();
        if radio.discovery_cancelled {
            bail!("Discovery cancelled");
        }
        let found: Vec<Device> = radio
            .nearby
            .iter()
            .filter(|d| !radio.paired.contains(d))
            .cloned()
            .collect();
        debug!("Simulated discovery found {} devices", found.len());
        Ok(found)
    }

    async fn cancel_discovery(&self) -> Result<()> {
        self.begin(Call::CancelDiscovery).await?;
        {
            let mut radio = self.radio.lock();
            radio.discovery_cancelled = true;
            radio.discovery_held = false;
        }
        self.discovery_gate.notify_one();
        Ok(())
    }

    async fn pair_device(&self, id: &str) -> Result<bool> {
        self.begin(Call::Pair(id.to_string())).await?;
        self.require_enabled()?;
        let mut radio = self.radio.lock();
        let device = radio
            .nearby
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("Device {} not found", id))?;
        if radio.rejects_pairing.contains(id) {
            return Ok(false);
        }
        if !radio.paired.contains(&device) {
            radio.paired.push(device);
        }
        Ok(true)
    }

    async fn connect(&self, id: &str) -> Result<()> {
        self.begin(Call::Connect(id.to_string())).await?;
        self.require_enabled()?;
        let mut radio = self.radio.lock();
        let known = radio.paired.iter().chain(radio.nearby.iter()).any(|d| d.id == id);
        if !known {
            bail!("Unable to connect to device {}", id);
        }
        radio.connected = Some(id.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.begin(Call::Disconnect).await?;
        self.radio.lock().connected = None;
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        self.begin(Call::Write(bytes.to_vec())).await?;
        if self.radio.lock().connected.is_none() {
            bail!("Not connected");
        }
        debug!("Simulated write: {:?}", codepage::decode(bytes));
        Ok(())
    }

    fn events(&self) -> &EventFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let transport = MemoryTransport::new().with_enabled(true);
        transport.is_enabled().await.unwrap();
        transport.list().await.unwrap();
        assert_eq!(transport.calls(), vec![Call::IsEnabled, Call::List]);
    }

    #[tokio::test]
    async fn test_scripted_failure_applies_once() {
        let transport = MemoryTransport::new();
        transport.fail_next(Operation::Enable, "Permission denied");

        let err = transport.enable().await.unwrap_err();
        assert_eq!(err.to_string(), "Permission denied");
        assert!(transport.enable().await.is_ok());
        assert_eq!(transport.count(Operation::Enable), 2);
    }

    #[tokio::test]
    async fn test_pair_rejection_and_unknown_device() {
        let transport = MemoryTransport::new()
            .with_enabled(true)
            .with_nearby(vec![Device::new("a", "A"), Device::new("b", "B")]);
        transport.reject_pairing("b");

        assert!(transport.pair_device("a").await.unwrap());
        assert!(!transport.pair_device("b").await.unwrap());
        assert!(transport.pair_device("zz").await.is_err());
        assert_eq!(transport.list().await.unwrap(), vec![Device::new("a", "A")]);
    }

    #[tokio::test]
    async fn test_cancel_releases_held_discovery() {
        let transport = std::sync::Arc::new(
            MemoryTransport::new()
                .with_enabled(true)
                .with_nearby(vec![Device::new("a", "A")]),
        );
        transport.hold_discovery();

        let discovering = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.discover_unpaired_devices().await })
        };
        tokio::task::yield_now().await;
        transport.cancel_discovery().await.unwrap();

        let result = discovering.await.unwrap();
        assert_eq!(result.unwrap_err().to_string(), "Discovery cancelled");
    }

    #[tokio::test]
    async fn test_enable_publishes_event() {
        let transport = MemoryTransport::new();
        let mut sub = transport.events().subscribe();
        transport.enable().await.unwrap();
        assert_eq!(sub.try_recv(), Some(TransportEvent::AdapterEnabled));
    }
}

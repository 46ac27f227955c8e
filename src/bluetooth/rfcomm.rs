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

//! BlueZ-backed serial transport over RFCOMM.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bluer::rfcomm::stream::{OwnedReadHalf, OwnedWriteHalf};
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, AdapterProperty, Address, ErrorKind};
use futures::{pin_mut, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codepage;
use super::events::{EventFeed, TransportEvent};
use super::transport::SerialTransport;
use crate::config::BluetoothConfig;
use crate::state::Device;

/// An open serial link.
struct Link {
    address: Address,
    writer: OwnedWriteHalf,
    reader_task: JoinHandle<()>,
}

/// Cancel handle of the running discovery cycle.
#[derive(Debug, Default)]
struct CancelSlot(parking_lot::Mutex<Option<oneshot::Sender<()>>>);

impl CancelSlot {
    /// Install a fresh handle. The slot is emptied when the guard drops,
    /// however the cycle ends.
    fn arm(&self) -> (CycleGuard<'_>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        *self.0.lock() = Some(tx);
        (CycleGuard(self), rx)
    }

    /// Signal the running cycle. Returns false if none is running.
    fn cancel(&self) -> bool {
        match self.0.lock().take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.0.lock().is_some()
    }
}

struct CycleGuard<'a>(&'a CancelSlot);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0 .0.lock().take();
    }
}

/// Serial transport on the default BlueZ adapter.
pub struct RfcommTransport {
    _session: bluer::Session,
    adapter: Adapter,
    channel: u8,
    discovery_window: Duration,
    link: Mutex<Option<Link>>,
    discovery_cancel: CancelSlot,
    feed: EventFeed,
    watcher: JoinHandle<()>,
}

impl RfcommTransport {
    /// Open a BlueZ session on the default adapter.
    pub async fn new(config: &BluetoothConfig) -> Result<Self> {
        info!("Initializing Bluetooth transport...");

        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        let feed = EventFeed::new();
        let watcher = Self::spawn_adapter_watcher(&adapter, feed.clone()).await?;

        Ok(Self {
            _session: session,
            adapter,
            channel: config.rfcomm_channel,
            discovery_window: Duration::from_secs(config.discovery_window_secs),
            link: Mutex::new(None),
            discovery_cancel: CancelSlot::default(),
            feed,
            watcher,
        })
    }

    /// Publish adapter power changes on the event feed.
    async fn spawn_adapter_watcher(adapter: &Adapter, feed: EventFeed) -> Result<JoinHandle<()>> {
        let events = adapter.events().await?;

        Ok(tokio::spawn(async move {
            pin_mut!(events);
            while let Some(event) = events.next().await {
                if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
                    info!("Adapter powered: {}", powered);
                    feed.publish(if powered {
                        TransportEvent::AdapterEnabled
                    } else {
                        TransportEvent::AdapterDisabled
                    });
                }
            }
            debug!("Adapter event stream ended");
        }))
    }

    fn parse_address(id: &str) -> Result<Address> {
        id.parse()
            .map_err(|_| anyhow!("Invalid device address: {}", id))
    }

    async fn describe(&self, address: Address) -> Result<(Device, bool)> {
        let device = self.adapter.device(address)?;
        let name = match device.alias().await {
            Ok(alias) => alias,
            Err(_) => device.name().await?.unwrap_or_default(),
        };
        let paired = device.is_paired().await?;
        debug!("{} '{}' paired={}", address, name, paired);
        Ok((Device::new(address.to_string(), name), paired))
    }

    /// Describe every address, skipping devices BlueZ fails to report on.
    async fn describe_all(
        &self,
        addresses: impl IntoIterator<Item = Address>,
        paired: bool,
    ) -> Vec<Device> {
        let mut described = Vec::new();
        for address in addresses {
            described.push((address, self.describe(address).await));
        }
        select_devices(described, paired)
    }

    /// Read from the link until it closes, then report the loss.
    async fn watch_link(mut reader: OwnedReadHalf, address: Address, feed: EventFeed) {
        let mut buf = [0u8; 256];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    info!("Connection to {} closed by remote", address);
                    break;
                }
                Ok(n) => {
                    debug!("Received from {}: {:?}", address, codepage::decode(&buf[..n]));
                }
                Err(e) => {
                    error!("Read error on {}: {}", address, e);
                    feed.publish(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
        }
        feed.publish(TransportEvent::ConnectionLost);
    }

    async fn close_link(link: Link) {
        link.reader_task.abort();
        let mut writer = link.writer;
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of link to {} failed: {}", link.address, e);
        }
    }
}

/// Keep the devices whose pairing status matches `paired`. A device whose
/// properties could not be read is logged and left out.
fn select_devices(described: Vec<(Address, Result<(Device, bool)>)>, paired: bool) -> Vec<Device> {
    described
        .into_iter()
        .filter_map(|(address, result)| match result {
            Ok((device, is_paired)) => (is_paired == paired).then_some(device),
            Err(e) => {
                warn!("Skipping {}: {}", address, e);
                None
            }
        })
        .collect()
}

impl Drop for RfcommTransport {
    fn drop(&mut self) {
        self.watcher.abort();
        self.feed.close();
    }
}

#[async_trait]
impl SerialTransport for RfcommTransport {
    async fn is_enabled(&self) -> Result<bool> {
        Ok(self.adapter.is_powered().await?)
    }

    async fn enable(&self) -> Result<()> {
        info!("Powering on Bluetooth adapter...");
        self.adapter.set_powered(true).await?;
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        info!("Powering off Bluetooth adapter...");
        if let Some(link) = self.link.lock().await.take() {
            // The reader task is aborted with the link and cannot report it.
            Self::close_link(link).await;
            self.feed.publish(TransportEvent::ConnectionLost);
        }
        self.adapter.set_powered(false).await?;
        Ok(())
    }

    async fn request_enable(&self) -> Result<()> {
        // BlueZ has no user prompt; power on directly.
        self.enable().await
    }

    async fn list(&self) -> Result<Vec<Device>> {
        let addresses = self.adapter.device_addresses().await?;
        Ok(self.describe_all(addresses, true).await)
    }

    async fn discover_unpaired_devices(&self) -> Result<Vec<Device>> {
        let (cycle, mut cancel_rx) = self.discovery_cancel.arm();

        info!("Discovering for up to {:?}", self.discovery_window);
        let events = self.adapter.discover_devices().await?;
        pin_mut!(events);
        let window = tokio::time::sleep(self.discovery_window);
        pin_mut!(window);

        let mut seen: Vec<Address> = Vec::new();
        let cancelled = loop {
            tokio::select! {
                Some(event) = events.next() => match event {
                    AdapterEvent::DeviceAdded(address) if !seen.contains(&address) => {
                        seen.push(address);
                    }
                    AdapterEvent::DeviceRemoved(address) => seen.retain(|a| *a != address),
                    _ => {}
                },
                _ = &mut window => break false,
                _ = &mut cancel_rx => break true,
            }
        };
        drop(cycle);

        if cancelled {
            bail!("Discovery cancelled");
        }

        let devices = self.describe_all(seen, false).await;
        info!("Discovery found {} unpaired devices", devices.len());
        Ok(devices)
    }

    async fn cancel_discovery(&self) -> Result<()> {
        if !self.discovery_cancel.cancel() {
            debug!("Cancel requested with no discovery running");
        }
        Ok(())
    }

    async fn pair_device(&self, id: &str) -> Result<bool> {
        let address = Self::parse_address(id)?;
        let device = self.adapter.device(address)?;
        if device.is_paired().await? {
            return Ok(true);
        }

        info!("Pairing with {}...", address);
        match device.pair().await {
            Ok(()) => Ok(true),
            Err(e)
                if matches!(
                    e.kind,
                    ErrorKind::AuthenticationRejected
                        | ErrorKind::AuthenticationFailed
                        | ErrorKind::AuthenticationCanceled
                ) =>
            {
                warn!("Pairing with {} refused: {}", address, e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn connect(&self, id: &str) -> Result<()> {
        let address = Self::parse_address(id)?;
        let mut link = self.link.lock().await;
        if let Some(stale) = link.take() {
            debug!("Replacing link to {}", stale.address);
            Self::close_link(stale).await;
        }

        info!("Opening RFCOMM channel {} to {}", self.channel, address);
        let stream = Stream::connect(SocketAddr::new(address, self.channel))
            .await
            .with_context(|| format!("Unable to connect to device {}", id))?;
        let (reader, writer) = stream.into_split();
        let reader_task = tokio::spawn(Self::watch_link(reader, address, self.feed.clone()));

        *link = Some(Link {
            address,
            writer,
            reader_task,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(link) = self.link.lock().await.take() {
            info!("Closing link to {}", link.address);
            Self::close_link(link).await;
        }
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut link = self.link.lock().await;
        let link = link.as_mut().ok_or_else(|| anyhow!("Not connected"))?;
        link.writer.write_all(bytes).await?;
        link.writer.flush().await?;
        Ok(())
    }

    fn events(&self) -> &EventFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        Address::new([0x00, 0x21, 0x13, 0x01, 0x2A, last])
    }

    fn described() -> Vec<(Address, Result<(Device, bool)>)> {
        vec![
            (addr(1), Ok((Device::new("00:21:13:01:2A:01", "HC-06"), true))),
            (addr(2), Err(anyhow!("org.bluez.Error.DoesNotExist"))),
            (addr(3), Ok((Device::new("00:21:13:01:2A:03", "HC-05"), false))),
            (addr(4), Ok((Device::new("00:21:13:01:2A:04", ""), true))),
        ]
    }

    #[test]
    fn test_unreadable_device_does_not_fail_listing() {
        let paired = select_devices(described(), true);
        assert_eq!(
            paired,
            vec![
                Device::new("00:21:13:01:2A:01", "HC-06"),
                Device::new("00:21:13:01:2A:04", ""),
            ]
        );
    }

    #[test]
    fn test_discovery_keeps_only_unpaired() {
        let unpaired = select_devices(described(), false);
        assert_eq!(unpaired, vec![Device::new("00:21:13:01:2A:03", "HC-05")]);
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            RfcommTransport::parse_address("00:21:13:01:2A:01").unwrap(),
            addr(1)
        );
        assert!(RfcommTransport::parse_address("not-an-address").is_err());
    }

    fn start_cycle(slot: &CancelSlot, fail: bool) -> Result<()> {
        let (_cycle, _rx) = slot.arm();
        if fail {
            bail!("org.bluez.Error.NotReady");
        }
        Ok(())
    }

    #[test]
    fn test_cancel_slot_cleared_on_early_error() {
        let slot = CancelSlot::default();
        assert!(start_cycle(&slot, true).is_err());
        assert!(!slot.is_armed());
        assert!(!slot.cancel());
    }

    #[tokio::test]
    async fn test_cancel_slot_signals_running_cycle() {
        let slot = CancelSlot::default();
        let (cycle, rx) = slot.arm();
        assert!(slot.is_armed());

        assert!(slot.cancel());
        assert!(rx.await.is_ok());
        assert!(!slot.is_armed());

        drop(cycle);
        assert!(start_cycle(&slot, false).is_ok());
        assert!(!slot.is_armed());
    }
}

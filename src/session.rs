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

//! Bluetooth serial session state machine.
//!
//! A [`Session`] owns the single state record for one adapter and at most
//! one serial link. User commands and transport events both enter here and
//! each applies one transition to the record. After every transition a
//! fresh [`SessionView`] snapshot is published on a watch channel.
//!
//! The record lock is never held across a transport call. Guards that must
//! check and set together (discovery start, connect) do so in one
//! transition, so two commands racing on the same task interleave safely.
//!
//! Transport failures never escape as faults: each is reported to the
//! notifier and returned as a [`SessionError`] the caller may ignore.

use futures::future::try_join_all;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bluetooth::packetizer::{self, DEFAULT_FRAME_SIZE};
use crate::bluetooth::{SerialTransport, Subscription, TransportEvent};
use crate::config::{SerialConfig, WriteMode};
use crate::error::{SessionError, SessionResult};
use crate::notify::Notifier;
use crate::state::{Device, Section, SessionView};

/// Outbound framing options.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub frame_size: NonZeroUsize,
    pub write_mode: WriteMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            write_mode: WriteMode::Concurrent,
        }
    }
}

impl From<&SerialConfig> for SessionOptions {
    fn from(config: &SerialConfig) -> Self {
        Self {
            frame_size: config.frame_size,
            write_mode: config.write_mode,
        }
    }
}

#[derive(Debug, Default)]
struct Record {
    view: SessionView,
    /// Bumped each time a discovery cycle starts; results of an older
    /// cycle are dropped.
    discovery_cycle: u64,
}

enum ConnectGate {
    Proceed,
    AlreadyConnected(Device),
    AlreadyConnecting,
    AdapterOff,
}

/// Session manager for one adapter and one serial link.
pub struct Session {
    transport: Arc<dyn SerialTransport>,
    notifier: Arc<dyn Notifier>,
    options: SessionOptions,
    record: Mutex<Record>,
    view_tx: watch::Sender<SessionView>,
}

impl Session {
    /// Create a session with default framing.
    pub fn new(transport: Arc<dyn SerialTransport>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_options(transport, notifier, SessionOptions::default())
    }

    pub fn with_options(
        transport: Arc<dyn SerialTransport>,
        notifier: Arc<dyn Notifier>,
        options: SessionOptions,
    ) -> Self {
        let (view_tx, _) = watch::channel(SessionView::default());
        Self {
            transport,
            notifier,
            options,
            record: Mutex::new(Record::default()),
            view_tx,
        }
    }

    /// Current snapshot.
    pub fn view(&self) -> SessionView {
        self.record.lock().view.clone()
    }

    /// Receive a snapshot after every transition.
    pub fn subscribe_view(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }

    /// Subscribe to the transport's event feed.
    pub fn subscribe_events(&self) -> Subscription {
        self.transport.events().subscribe()
    }

    /// Apply one transition and publish the resulting snapshot.
    fn transition<R>(&self, f: impl FnOnce(&mut Record) -> R) -> R {
        let mut record = self.record.lock();
        let result = f(&mut record);
        self.view_tx.send_replace(record.view.clone());
        result
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionView) -> R) -> R {
        self.transition(|record| f(&mut record.view))
    }

    fn fail(&self, err: SessionError) -> SessionResult {
        warn!("{:?}", err);
        self.notifier.notify(&err.to_string());
        Err(err)
    }

    /// Read adapter power and the paired list from the transport.
    ///
    /// Both queries run concurrently. A failing query is reported and its
    /// field keeps the default (disabled, empty).
    pub async fn initialize(&self) {
        let (enabled, paired) = tokio::join!(self.transport.is_enabled(), self.transport.list());

        let enabled = enabled.unwrap_or_else(|e| {
            warn!("Adapter state query failed: {}", e);
            self.notifier.notify(&e.to_string());
            false
        });
        let paired = paired.unwrap_or_else(|e| {
            warn!("Paired device query failed: {}", e);
            self.notifier.notify(&e.to_string());
            Vec::new()
        });

        info!(
            "Session initialized: adapter {}, {} paired devices",
            if enabled { "enabled" } else { "disabled" },
            paired.len()
        );
        self.update(|view| {
            view.adapter.enabled = enabled;
            view.registry.paired = paired;
        });
    }

    /// Power the adapter on or off.
    ///
    /// Turning it off clears the paired list once the transport confirms.
    pub async fn set_adapter_enabled(&self, target: bool) -> SessionResult {
        if target {
            match self.transport.enable().await {
                Ok(()) => {
                    debug!("Adapter enabled");
                    self.update(|view| view.adapter.enabled = true);
                    Ok(())
                }
                Err(e) => self.fail(SessionError::transport(e)),
            }
        } else {
            match self.transport.disable().await {
                Ok(()) => {
                    debug!("Adapter disabled");
                    let lost = self.update(|view| {
                        view.adapter.enabled = false;
                        view.registry.paired.clear();
                        view.connection.connecting = false;
                        Self::release_link(view)
                    });
                    self.report_lost(lost);
                    Ok(())
                }
                Err(e) => self.fail(SessionError::transport(e)),
            }
        }
    }

    /// Switch handler: same as [`Self::set_adapter_enabled`].
    pub async fn toggle_adapter(&self, value: bool) -> SessionResult {
        self.set_adapter_enabled(value).await
    }

    /// Ask the system to power the adapter on.
    pub async fn request_enable(&self) -> SessionResult {
        match self.transport.request_enable().await {
            Ok(()) => {
                self.update(|view| view.adapter.enabled = true);
                Ok(())
            }
            Err(e) => self.fail(SessionError::transport(e)),
        }
    }

    /// Run one discovery cycle. No-op while one is already running.
    pub async fn start_discovery(&self) -> SessionResult {
        let cycle = self.transition(|record| {
            if record.view.adapter.discovering {
                return None;
            }
            record.view.adapter.discovering = true;
            record.discovery_cycle += 1;
            Some(record.discovery_cycle)
        });
        let Some(cycle) = cycle else {
            debug!("Discovery already in progress");
            return Ok(());
        };

        info!("Discovery cycle {} started", cycle);
        let result = self.transport.discover_unpaired_devices().await;

        match result {
            Ok(devices) => {
                let applied = self.transition(|record| {
                    if record.discovery_cycle != cycle {
                        return false;
                    }
                    record.view.registry.unpaired = devices;
                    record.view.adapter.discovering = false;
                    true
                });
                if applied {
                    info!("Discovery cycle {} finished", cycle);
                } else {
                    debug!("Dropping results of superseded discovery cycle {}", cycle);
                }
                Ok(())
            }
            Err(e) => {
                self.transition(|record| {
                    if record.discovery_cycle == cycle {
                        record.view.adapter.discovering = false;
                    }
                });
                self.fail(SessionError::transport(e))
            }
        }
    }

    /// Ask the transport to stop discovery. No-op when not discovering.
    ///
    /// The suspended [`Self::start_discovery`] call is left to resolve on
    /// its own.
    pub async fn cancel_discovery(&self) -> SessionResult {
        if !self.record.lock().view.adapter.discovering {
            debug!("No discovery to cancel");
            return Ok(());
        }

        match self.transport.cancel_discovery().await {
            Ok(()) => {
                info!("Discovery cancelled");
                self.update(|view| view.adapter.discovering = false);
                Ok(())
            }
            Err(e) => self.fail(SessionError::transport(e)),
        }
    }

    /// Pair with a discovered device.
    pub async fn pair_device(&self, device: &Device) -> SessionResult {
        match self.transport.pair_device(&device.id).await {
            Ok(true) => {
                info!("Paired with {} ({})", device.label(), device.id);
                self.notifier
                    .notify(&format!("Device {} paired successfully", device.name));
                self.update(|view| view.registry.mark_paired(device));
                Ok(())
            }
            Ok(false) => self.fail(SessionError::OperationRejected(format!(
                "Device {} pairing failed",
                device.name
            ))),
            Err(e) => self.fail(SessionError::transport(e)),
        }
    }

    /// Open the serial link to `device`.
    ///
    /// Refused while a link is up or an attempt is in flight; the single
    /// session must be disconnected first. No timeout is applied.
    pub async fn connect(&self, device: &Device) -> SessionResult {
        let gate = self.update(|view| {
            let conn = &mut view.connection;
            if conn.connected {
                ConnectGate::AlreadyConnected(conn.active_device.clone().unwrap_or_default())
            } else if conn.connecting {
                ConnectGate::AlreadyConnecting
            } else if !view.adapter.enabled {
                ConnectGate::AdapterOff
            } else {
                conn.connecting = true;
                ConnectGate::Proceed
            }
        });

        match gate {
            ConnectGate::Proceed => {}
            ConnectGate::AlreadyConnected(active) => {
                return self.fail(SessionError::PreconditionViolation(format!(
                    "Already connected to device {}, disconnect first",
                    active.label()
                )))
            }
            ConnectGate::AlreadyConnecting => {
                return self.fail(SessionError::PreconditionViolation(
                    "Connection attempt already in progress".to_string(),
                ))
            }
            ConnectGate::AdapterOff => return self.fail(SessionError::TransportUnavailable),
        }

        info!("Connecting to {} ({})", device.label(), device.id);
        match self.transport.connect(&device.id).await {
            Ok(()) => {
                self.update(|view| {
                    view.connection.connected = true;
                    view.connection.connecting = false;
                    view.connection.active_device = Some(device.clone());
                });
                self.notifier
                    .notify(&format!("Connected to device {}", device.name));
                Ok(())
            }
            Err(e) => {
                self.update(|view| view.connection.connecting = false);
                self.fail(SessionError::transport(e))
            }
        }
    }

    /// Close the serial link. The last device stays recorded for display.
    pub async fn disconnect(&self) -> SessionResult {
        match self.transport.disconnect().await {
            Ok(()) => {
                info!("Disconnected");
                self.update(|view| view.connection.connected = false);
                Ok(())
            }
            Err(e) => self.fail(SessionError::transport(e)),
        }
    }

    /// Connect to the last device when `value` is set, else disconnect.
    pub async fn toggle_connection(&self, value: bool) -> SessionResult {
        let active = self.record.lock().view.connection.active_device.clone();
        match active {
            Some(device) if value => self.connect(&device).await,
            _ => self.disconnect().await,
        }
    }

    /// Send text to the connected device as CP852 frames.
    ///
    /// In concurrent mode all frame writes are issued at once and joined;
    /// the first failure fails the whole write, and arrival order at the
    /// peer is whatever the transport makes of it. An empty payload yields
    /// no frames and no transport call.
    pub async fn write(&self, payload: &str) -> SessionResult {
        if !self.record.lock().view.connection.connected {
            return self.fail(SessionError::PreconditionViolation(
                "You must connect to device first".to_string(),
            ));
        }

        let frames = packetizer::encode(payload, self.options.frame_size);
        if frames.is_empty() {
            debug!("Empty payload, nothing to write");
        }

        let result = match self.options.write_mode {
            WriteMode::Concurrent => try_join_all(frames.iter().map(|frame| self.transport.write(frame)))
                .await
                .map(|_| ()),
            WriteMode::Sequential => {
                let mut result = Ok(());
                for frame in &frames {
                    result = self.transport.write(frame).await;
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
        };

        match result {
            Ok(()) => {
                debug!("Wrote {} frames", frames.len());
                self.notifier.notify("Successfully wrote to device");
                self.update(|view| {
                    if view.connection.active_device.is_some() {
                        view.connection.connected = true;
                    }
                });
                Ok(())
            }
            Err(e) => self.fail(SessionError::transport(e)),
        }
    }

    /// Show the paired or the unpaired list.
    pub fn select_section(&self, section: Section) {
        debug!("Section: {}", section.as_str());
        self.update(|view| view.section = section);
    }

    /// Device-row activation.
    ///
    /// In the paired section this disconnects when a link is up (whichever
    /// row was pressed) and connects otherwise. In the unpaired section it
    /// pairs.
    pub async fn activate_device(&self, device: &Device) -> SessionResult {
        let (section, connected) = {
            let record = self.record.lock();
            (record.view.section, record.view.connection.connected)
        };
        match section {
            Section::Paired if connected => self.disconnect().await,
            Section::Paired => self.connect(device).await,
            Section::Unpaired => self.pair_device(device).await,
        }
    }

    /// Adapter was powered on outside of any command.
    pub async fn on_adapter_enabled(&self) {
        self.notifier.notify("Bluetooth enabled");
        self.update(|view| view.adapter.enabled = true);

        match self.transport.list().await {
            Ok(paired) => {
                debug!("Paired list refreshed: {} devices", paired.len());
                self.update(|view| {
                    if view.adapter.enabled {
                        view.registry.paired = paired;
                    }
                });
            }
            Err(e) => {
                warn!("Paired list refresh failed: {}", e);
                self.notifier.notify(&e.to_string());
            }
        }
    }

    /// Adapter was powered off; device lists are no longer meaningful and
    /// no link can survive it.
    pub fn on_adapter_disabled(&self) {
        self.notifier.notify("Bluetooth disabled");
        let lost = self.update(|view| {
            view.adapter.enabled = false;
            view.registry.clear();
            view.connection.connecting = false;
            Self::release_link(view)
        });
        self.report_lost(lost);
    }

    /// The serial link dropped.
    ///
    /// Safe under duplicate delivery: only the transition out of the
    /// connected state is reported.
    pub fn on_connection_lost(&self) {
        let lost = self.update(Self::release_link);
        self.report_lost(lost);
    }

    /// Mark the link down, keeping the last device for display. Returns
    /// that device if the link was up.
    fn release_link(view: &mut SessionView) -> Option<Device> {
        let conn = &mut view.connection;
        let was_connected = conn.connected;
        conn.connected = false;
        if was_connected {
            conn.active_device.clone()
        } else {
            None
        }
    }

    fn report_lost(&self, lost: Option<Device>) {
        match lost {
            Some(device) => {
                warn!("Connection to {} lost", device.id);
                self.notifier.notify(&format!(
                    "Connection to device {} has been lost",
                    device.name
                ));
            }
            None => debug!("No live link to release"),
        }
    }

    /// Asynchronous transport error; reported only.
    pub fn on_transport_error(&self, message: &str) {
        warn!("Transport error: {}", message);
        self.notifier.notify(&format!("Error: {}", message));
    }

    /// Dispatch one event from the transport feed.
    pub async fn handle_event(&self, event: TransportEvent) {
        debug!("Transport event: {}", event.name());
        match event {
            TransportEvent::AdapterEnabled => self.on_adapter_enabled().await,
            TransportEvent::AdapterDisabled => self.on_adapter_disabled(),
            TransportEvent::ConnectionLost => self.on_connection_lost(),
            TransportEvent::Error(message) => self.on_transport_error(&message),
        }
    }

    /// Consume transport events until the feed closes, then unsubscribe.
    pub async fn run_events(&self, mut subscription: Subscription) {
        while let Some(event) = subscription.recv().await {
            self.handle_event(event).await;
        }
        debug!("Transport event feed closed");
        subscription.unsubscribe();
    }
}

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

//! Transient status messages for the user.

use parking_lot::Mutex;
use tracing::warn;

/// Sink for short human-readable status messages.
///
/// Fire-and-forget: the session never waits on or inspects delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Forwards messages to a front-end over a channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: async_channel::Sender<String>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end for the front-end.
    pub fn new() -> (Self, async_channel::Receiver<String>) {
        let (tx, rx) = async_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str) {
        if self.tx.try_send(message.to_string()).is_err() {
            warn!("Notification dropped, no receiver: {}", message);
        }
    }
}

/// Keeps every message; handy for inspecting what a user would have seen.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.messages.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, message: &str) {
        (**self).notify(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_notifier_delivers_in_order() {
        let (notifier, rx) = ChannelNotifier::new();
        notifier.notify("one");
        notifier.notify("two");
        assert_eq!(rx.try_recv().unwrap(), "one");
        assert_eq!(rx.try_recv().unwrap(), "two");
    }

    #[test]
    fn test_channel_notifier_survives_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify("nobody listening");
    }

    #[test]
    fn test_recording_notifier_through_arc() {
        let recorder = std::sync::Arc::new(RecordingNotifier::new());
        let shared: std::sync::Arc<RecordingNotifier> = recorder.clone();
        shared.notify("hello");
        assert_eq!(recorder.last().as_deref(), Some("hello"));
    }
}

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

//! Line-oriented console front-end.
//!
//! Parses user input into session commands and renders snapshots. It never
//! talks to the transport.

use anyhow::{anyhow, bail, Result};
use std::fmt::Write as _;

use crate::session::Session;
use crate::state::{Section, SessionView};

pub const HELP: &str = "\
commands:
  enable | disable        power the adapter on/off
  request-enable          ask the system to power the adapter on
  discover | cancel       start/stop discovery of unpaired devices
  paired | unpaired       switch the device list
  press <n>               activate row n of the current list
  connect | disconnect    reconnect to the last device / drop the link
  write <text>            send text to the connected device
  status [--json]         show the session
  help | quit";

/// One console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    RequestEnable,
    Discover,
    CancelDiscovery,
    Show(Section),
    Press(usize),
    Connect,
    Disconnect,
    Write(String),
    Status { json: bool },
    Help,
    Quit,
}

impl Command {
    /// Parse a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim_start()),
            None => (line, ""),
        };

        let command = match word.to_lowercase().as_str() {
            "enable" | "on" => Self::Enable,
            "disable" | "off" => Self::Disable,
            "request-enable" => Self::RequestEnable,
            "discover" | "scan" => Self::Discover,
            "cancel" => Self::CancelDiscovery,
            "paired" => Self::Show(Section::Paired),
            "unpaired" => Self::Show(Section::Unpaired),
            "press" => {
                let row: usize = rest
                    .parse()
                    .map_err(|_| anyhow!("press needs a row number, got '{}'", rest))?;
                if row == 0 {
                    bail!("rows are numbered from 1");
                }
                Self::Press(row)
            }
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            // Text is sent as typed, including inner spacing.
            "write" | "send" => Self::Write(rest.to_string()),
            "status" | "ls" => Self::Status {
                json: rest == "--json",
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{}', try 'help'", other),
        };
        Ok(Some(command))
    }
}

/// What the console loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Print(String),
    Quit,
}

/// Run one command against the session.
///
/// Session failures have already been reported through the notifier, so
/// they are not repeated here.
pub async fn dispatch(session: &Session, command: Command) -> Result<Flow> {
    let _ = match command {
        Command::Enable => session.toggle_adapter(true).await,
        Command::Disable => session.toggle_adapter(false).await,
        Command::RequestEnable => session.request_enable().await,
        Command::Discover => {
            session.select_section(Section::Unpaired);
            session.start_discovery().await
        }
        Command::CancelDiscovery => session.cancel_discovery().await,
        Command::Show(section) => {
            session.select_section(section);
            return Ok(Flow::Print(render(&session.view())));
        }
        Command::Press(row) => {
            let view = session.view();
            let device = view
                .visible_devices()
                .get(row - 1)
                .cloned()
                .ok_or_else(|| anyhow!("no row {} in {}", row, view.section.as_str()))?;
            session.activate_device(&device).await
        }
        Command::Connect => session.toggle_connection(true).await,
        Command::Disconnect => session.toggle_connection(false).await,
        Command::Write(text) => session.write(&text).await,
        Command::Status { json: true } => {
            return Ok(Flow::Print(serde_json::to_string_pretty(&session.view())?));
        }
        Command::Status { json: false } => return Ok(Flow::Print(render(&session.view()))),
        Command::Help => return Ok(Flow::Print(HELP.to_string())),
        Command::Quit => return Ok(Flow::Quit),
    };
    Ok(Flow::Continue)
}

/// Human-readable snapshot.
pub fn render(view: &SessionView) -> String {
    let mut out = String::new();

    let adapter = match (view.adapter.enabled, view.adapter.discovering) {
        (false, _) => "disabled",
        (true, true) => "enabled, discovering...",
        (true, false) => "enabled",
    };
    let _ = writeln!(out, "Bluetooth: {}", adapter);

    let conn = &view.connection;
    match &conn.active_device {
        Some(device) => {
            let _ = writeln!(
                out,
                "Link: {} ({} <{}>)",
                conn.status().as_str(),
                device.label(),
                device.id
            );
        }
        None => {
            let _ = writeln!(out, "Link: {}", conn.status().as_str());
        }
    }

    let _ = writeln!(out, "[{}]", view.section.as_str());
    let devices = view.visible_devices();
    if devices.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (i, device) in devices.iter().enumerate() {
        let mark = if view.section == Section::Paired && view.is_connected_to(device) {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(out, "  {:>2}. {} {} <{}>", i + 1, mark, device.name, device.id);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{MemoryTransport, Operation};
    use crate::notify::RecordingNotifier;
    use crate::state::Device;
    use std::sync::Arc;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  ").unwrap(), None);
        assert_eq!(Command::parse("enable").unwrap(), Some(Command::Enable));
        assert_eq!(Command::parse("PRESS 2").unwrap(), Some(Command::Press(2)));
        assert_eq!(
            Command::parse("unpaired").unwrap(),
            Some(Command::Show(Section::Unpaired))
        );
        assert_eq!(
            Command::parse("status --json").unwrap(),
            Some(Command::Status { json: true })
        );
    }

    #[test]
    fn test_parse_write_keeps_text() {
        assert_eq!(
            Command::parse("write ahoj  světe").unwrap(),
            Some(Command::Write("ahoj  světe".to_string()))
        );
        assert_eq!(Command::parse("write").unwrap(), Some(Command::Write(String::new())));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("press").is_err());
        assert!(Command::parse("press 0").is_err());
        assert!(Command::parse("fly").is_err());
    }

    #[test]
    fn test_render_marks_connected_device() {
        let mut view = SessionView::default();
        view.adapter.enabled = true;
        view.registry.paired = vec![Device::new("00:11", "HC-06"), Device::new("00:22", "HC-05")];
        view.connection.connected = true;
        view.connection.active_device = Some(Device::new("00:11", "HC-06"));

        let text = render(&view);
        assert!(text.contains("Bluetooth: enabled"));
        assert!(text.contains("Link: Connected (HC-06 <00:11>)"));
        assert!(text.contains("   1. * HC-06 <00:11>"));
        assert!(text.contains("   2.   HC-05 <00:22>"));
    }

    #[test]
    fn test_render_empty_section() {
        let view = SessionView {
            section: Section::Unpaired,
            ..Default::default()
        };
        let text = render(&view);
        assert!(text.contains("Bluetooth: disabled"));
        assert!(text.contains("[UNPAIRED DEVICES]"));
        assert!(text.contains("(none)"));
    }

    #[tokio::test]
    async fn test_dispatch_request_enable() {
        let transport = Arc::new(MemoryTransport::new());
        let session = Session::new(transport.clone(), Arc::new(RecordingNotifier::new()));
        session.initialize().await;

        let command = Command::parse("request-enable").unwrap().unwrap();
        assert_eq!(dispatch(&session, command).await.unwrap(), Flow::Continue);
        assert!(session.view().adapter.enabled);
        assert_eq!(transport.count(Operation::RequestEnable), 1);
    }
}

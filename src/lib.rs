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

//! Bluetooth serial (SPP) session manager.
//!
//! Tracks adapter power, discovery, pairing and a single serial link, and
//! sends text to the peripheral as fixed-size CP852 frames.

pub mod bluetooth;
pub mod config;
pub mod console;
pub mod error;
pub mod notify;
pub mod session;
pub mod state;

pub use error::{SessionError, SessionResult};
pub use session::{Session, SessionOptions};
pub use state::{Device, Section, SessionView};

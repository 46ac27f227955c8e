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

//! Session error taxonomy.

use thiserror::Error;

/// Why a session operation did not take effect.
///
/// By the time a caller sees one of these, the message has already been
/// delivered to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The adapter is off and the operation needs it on.
    #[error("Bluetooth is disabled")]
    TransportUnavailable,

    /// The transport answered, but negatively.
    #[error("{0}")]
    OperationRejected(String),

    /// The transport call failed.
    #[error("{0}")]
    TransportFailure(String),

    /// The session is not in a state that allows the operation.
    #[error("{0}")]
    PreconditionViolation(String),
}

impl SessionError {
    /// Convert a transport error, keeping only its message.
    pub fn transport(err: anyhow::Error) -> Self {
        Self::TransportFailure(err.to_string())
    }
}

pub type SessionResult<T = ()> = std::result::Result<T, SessionError>;

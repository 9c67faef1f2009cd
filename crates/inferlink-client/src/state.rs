//! Connection state machine.
//!
//! The driver feeds every socket event through [`ConnectionState::on`] and
//! publishes the result. Transitions are pure so they can be tested without a
//! socket.
//!
//! | from                       | event                   | to           |
//! |----------------------------|-------------------------|--------------|
//! | disconnected, reconnecting | connect                 | connecting   |
//! | connecting                 | opened                  | connected    |
//! | connecting                 | failed (retry pending)  | reconnecting |
//! | connected                  | closed (retry pending)  | reconnecting |
//! | connecting                 | failed (no retry)       | disconnected |
//! | connected                  | closed (no retry)       | disconnected |
//! | any but disconnected       | disconnect              | disconnected |

use std::fmt;

/// State of the connection to the inference server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket, nothing scheduled.
    #[default]
    Disconnected,
    /// Socket open in progress.
    Connecting,
    /// Socket open; requests can be sent.
    Connected,
    /// Waiting for the next reconnect attempt.
    Reconnecting,
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// An open attempt starts (explicit connect or retry timer).
    Connect,
    /// The socket opened.
    Opened,
    /// The open attempt failed; `retry` says whether another is scheduled.
    Failed { retry: bool },
    /// An open socket closed; `retry` says whether a reconnect is scheduled.
    Closed { retry: bool },
    /// The caller asked to disconnect.
    Disconnect,
}

impl ConnectionState {
    /// Returns the next state, or `None` if the event does not apply.
    pub fn on(self, event: ConnectionEvent) -> Option<Self> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (S::Disconnected | S::Reconnecting, E::Connect) => Some(S::Connecting),
            (S::Connecting, E::Opened) => Some(S::Connected),
            (S::Connecting, E::Failed { retry }) | (S::Connected, E::Closed { retry }) => {
                Some(if retry { S::Reconnecting } else { S::Disconnected })
            }
            (S::Connecting | S::Connected | S::Reconnecting, E::Disconnect) => {
                Some(S::Disconnected)
            }
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

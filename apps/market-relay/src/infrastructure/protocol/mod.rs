//! Websocket Hub Protocol
//!
//! JSON messages exchanged with hub clients.
//!
//! # Client → Server
//! ```json
//! {"type":"join","symbol":"btcusdt"}
//! {"type":"leave","symbol":"BTCUSDT"}
//! {"type":"ping"}
//! ```
//!
//! # Server → Client
//! ```json
//! {"event":"tickerUpdate","data":{"symbol":"BTCUSDT","lastPrice":43000.1,...}}
//! {"event":"joined","symbol":"BTCUSDT"}
//! {"event":"left","symbol":"BTCUSDT"}
//! {"event":"pong"}
//! {"event":"error","message":"symbol must not be blank"}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::TickerPayload;

// =============================================================================
// Client → Server Messages
// =============================================================================

/// Message sent from a hub client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the group for a symbol.
    Join {
        /// Symbol, any case.
        symbol: String,
    },
    /// Leave the group for a symbol.
    Leave {
        /// Symbol, any case.
        symbol: String,
    },
    /// Keepalive.
    Ping,
}

// =============================================================================
// Server → Client Events
// =============================================================================

/// Event pushed to a hub client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Ticker update for a joined group.
    TickerUpdate {
        /// Update payload.
        data: TickerPayload,
    },
    /// Group joined.
    Joined {
        /// Normalized group name.
        symbol: String,
    },
    /// Group left.
    Left {
        /// Normalized group name.
        symbol: String,
    },
    /// Reply to `ping`.
    Pong,
    /// Rejected client message.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerEvent {
    /// Encode as a JSON text frame body.
    ///
    /// # Errors
    ///
    /// Returns the serializer error.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(r#"{"type":"join","symbol":"btcusdt"}"#, ClientMessage::Join { symbol: "btcusdt".into() } ; "join")]
    #[test_case(r#"{"type":"leave","symbol":"ETHUSDT"}"#, ClientMessage::Leave { symbol: "ETHUSDT".into() } ; "leave")]
    #[test_case(r#"{"type":"ping"}"#, ClientMessage::Ping ; "ping")]
    fn parses_client_messages(text: &str, expected: ClientMessage) {
        let parsed: ClientMessage = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn ticker_update_event_name() {
        let event = ServerEvent::TickerUpdate {
            data: TickerPayload {
                symbol: "BTCUSDT".to_string(),
                last_price: 10.0,
                bid_price: 5.0,
                ask_price: 15.0,
                ts_unix_ms: 1,
            },
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "tickerUpdate");
        assert_eq!(json["data"]["symbol"], "BTCUSDT");
        assert_eq!(json["data"]["askPrice"], 15.0);
    }

    #[test]
    fn control_events_serialize() {
        assert_eq!(ServerEvent::Pong.to_json().unwrap(), r#"{"event":"pong"}"#);
        assert_eq!(
            ServerEvent::Joined {
                symbol: "ETHUSDT".to_string()
            }
            .to_json()
            .unwrap(),
            r#"{"event":"joined","symbol":"ETHUSDT"}"#
        );
    }
}

use serde::{Deserialize, Serialize};

/// Envelope forwarded to the ingest master.
///
/// The `type` field is added by serde and is used for routing on the
/// master side ("rate" or "state").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DefiMessage {
    Rate(RateEvent),
    State(StateEvent),
}

// ------------------------------------------------------------
// Protocol descriptor
// ------------------------------------------------------------
//
// Static description of a lending protocol, taken from config
// and attached to every rate event.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ProtocolInfo {
    /// Protocol name (e.g. "NUO")
    pub name: String,

    /// Main contract address of the protocol
    #[serde(default)]
    pub address: String,

    /// Chain the protocol lives on (e.g. "Ethereum")
    #[serde(default)]
    pub underlying_blockchain: String,

    /// Governance / protocol token symbol, if any
    #[serde(default)]
    pub token: String,
}

// ------------------------------------------------------------
// Rate event
// ------------------------------------------------------------
//
// One lending / borrowing figure per market record.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RateEvent {
    /// Collection time in milliseconds since Unix epoch
    pub timestamp: i64,

    /// Asset label reported by the scraper
    pub asset: String,

    pub protocol: ProtocolInfo,

    pub lending_rate: f64,

    pub borrowing_rate: f64,
}

// ------------------------------------------------------------
// State event
// ------------------------------------------------------------
//
// Aggregate protocol totals, one per state update.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateEvent {
    /// Collection time in milliseconds since Unix epoch
    pub timestamp: i64,

    /// Protocol name
    pub protocol: String,

    /// USD-denominated total
    pub total_usd: f64,

    /// ETH-denominated total
    pub total_eth: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_type_tag() {
        let msg = DefiMessage::State(StateEvent {
            timestamp: 1,
            protocol: "NUO".into(),
            total_usd: 2.0,
            total_eth: 3.0,
        });

        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "state");
        assert_eq!(v["protocol"], "NUO");
        assert_eq!(v["total_eth"], 3.0);
    }

    #[test]
    fn protocol_info_optional_fields_default() {
        let info: ProtocolInfo = serde_json::from_str(r#"{"name":"NUO"}"#).unwrap();
        assert_eq!(info.name, "NUO");
        assert!(info.address.is_empty());
        assert!(info.token.is_empty());
    }
}

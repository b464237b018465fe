// Cosmos event parsing

use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;

use super::{ChannelOrdering, PacketEvent, PacketInfo};
use crate::chains::ChainEvent;
use crate::error::{Result, TrackerError};

/// Turn a raw chain event into a packet lifecycle event.
///
/// Returns `Ok(None)` for event types the tracker does not follow.
pub fn parse_packet_event(raw_event: &ChainEvent) -> Result<Option<PacketEvent>> {
    let wrap: fn(PacketInfo) -> PacketEvent = match raw_event.event_type.as_str() {
        "send_packet" => PacketEvent::SendPacket,
        "write_acknowledgement" => PacketEvent::WriteAcknowledgement,
        "acknowledge_packet" => PacketEvent::AcknowledgePacket,
        "timeout_packet" => PacketEvent::TimeoutPacket,
        _ => return Ok(None),
    };

    let attributes = decode_attributes(&raw_event.attributes);
    let info = PacketInfo {
        height: raw_event.height,
        sequence: required(&attributes, "packet_sequence")?
            .parse()
            .map_err(|_| TrackerError::InvalidEvent("packet_sequence is not a number".to_string()))?,
        src_port: required(&attributes, "packet_src_port")?.to_string(),
        src_channel: required(&attributes, "packet_src_channel")?.to_string(),
        dst_port: required(&attributes, "packet_dst_port")?.to_string(),
        dst_channel: required(&attributes, "packet_dst_channel")?.to_string(),
        connection_id: attributes
            .get("connection_id")
            .or_else(|| attributes.get("packet_connection"))
            .cloned()
            .ok_or_else(|| TrackerError::InvalidEvent("missing connection_id".to_string()))?,
        ordering: ChannelOrdering::parse(required(&attributes, "packet_channel_ordering")?)
            .ok_or_else(|| TrackerError::InvalidEvent("unknown channel ordering".to_string()))?,
        data: bytes_attribute(&attributes, "packet_data")?,
        timeout_height_raw: attributes.get("packet_timeout_height").cloned().unwrap_or_default(),
        timeout_timestamp_raw: attributes
            .get("packet_timeout_timestamp")
            .cloned()
            .unwrap_or_default(),
        ack: bytes_attribute(&attributes, "packet_ack")?,
    };

    // reject unparsable timeouts here instead of at commit time
    info.timeout()?;

    Ok(Some(wrap(info)))
}

/// Parse a block's worth of raw events, skipping the ones we do not track
pub fn parse_packet_events(raw_events: &[ChainEvent]) -> Result<Vec<PacketEvent>> {
    let mut events = Vec::new();
    for raw_event in raw_events {
        if let Some(event) = parse_packet_event(raw_event)? {
            events.push(event);
        }
    }
    Ok(events)
}

fn required<'a>(attributes: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    attributes
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| TrackerError::InvalidEvent(format!("missing {}", key)))
}

/// `<name>_hex` wins over the plain string attribute
fn bytes_attribute(attributes: &HashMap<String, String>, name: &str) -> Result<Vec<u8>> {
    if let Some(encoded) = attributes.get(&format!("{}_hex", name)) {
        return hex::decode(encoded)
            .map_err(|e| TrackerError::InvalidEvent(format!("{}_hex: {}", name, e)));
    }
    Ok(attributes
        .get(name)
        .map(|v| v.as_bytes().to_vec())
        .unwrap_or_default())
}

/// Older Tendermint versions base64-encode attribute keys and values
fn decode_attributes(attributes: &[(String, String)]) -> HashMap<String, String> {
    let plain = attributes.iter().any(|(key, _)| key.starts_with("packet_"));
    attributes
        .iter()
        .map(|(key, value)| {
            if plain {
                (key.clone(), value.clone())
            } else {
                (decode_base64_lossy(key), decode_base64_lossy(value))
            }
        })
        .collect()
}

fn decode_base64_lossy(value: &str) -> String {
    general_purpose::STANDARD
        .decode(value)
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
        .unwrap_or_else(|_| value.to_string())
}

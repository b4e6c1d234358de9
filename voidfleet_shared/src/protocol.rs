//! Wire protocol.
//!
//! Every frame is a JSON object `{"type": "...", "data": {...}}`. Decoding is
//! two-step so an unknown `type` can be told apart from a malformed payload:
//! the former is dropped quietly by callers, the latter logged as bad input.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    components::{EntityKind, Input, ParticleEffect},
    ecs::EntityId,
    error::ProtocolError,
    math::{Quat, Vec3},
};

/// Longest player name kept after sanitizing, in characters.
pub const MAX_NAME_LEN: usize = 15;

/// Name used when nothing printable is left after sanitizing.
pub const FALLBACK_NAME: &str = "UNKNOWN";

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    // ─── Handshake ───
    /// Client -> server: join with a display name.
    Hello(Hello),
    /// Server -> client: the entity this client controls.
    Welcome(Welcome),

    // ─── Gameplay ───
    /// Client -> server: full input state, replaces the previous one.
    Input(Input),

    // ─── Replication ───
    /// Server -> client: entities that became visible.
    Spawn(Spawn),
    /// Server -> client: authoritative poses after a tick.
    Update(Update),
    /// Server -> client: entities that are gone.
    Despawn(Despawn),
    /// Server -> client: cosmetic one-shot effect.
    Effect(Effect),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
}

impl Hello {
    pub fn sanitized_name(&self) -> String {
        sanitize_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub entity_id: EntityId,
    pub name: String,
    /// Server simulation rate; lets the client size its interpolation window.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
}

fn default_tick_rate() -> u32 {
    30
}

/// Full description of a replicated entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpawn {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spawn {
    pub entities: Vec<EntitySpawn>,
}

/// Pose of one entity at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityPose {
    pub id: EntityId,
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub tick: u64,
    pub entities: Vec<EntityPose>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Despawn {
    pub ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub effect: ParticleEffect,
    pub position: Vec3,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl Message {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Welcome(_) => "WELCOME",
            Self::Input(_) => "INPUT",
            Self::Spawn(_) => "SPAWN",
            Self::Update(_) => "UPDATE",
            Self::Despawn(_) => "DESPAWN",
            Self::Effect(_) => "EFFECT",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        let data = raw.data;
        let msg = match raw.kind.as_str() {
            "HELLO" => Self::Hello(from_data(data)?),
            "WELCOME" => Self::Welcome(from_data(data)?),
            "INPUT" => Self::Input(from_data(data)?),
            "SPAWN" => Self::Spawn(from_data(data)?),
            "UPDATE" => Self::Update(from_data(data)?),
            "DESPAWN" => Self::Despawn(from_data(data)?),
            "EFFECT" => Self::Effect(from_data(data)?),
            _ => return Err(ProtocolError::UnrecognizedMessage(raw.kind)),
        };
        Ok(msg)
    }
}

/// Absent or null `data` is read as an empty object.
fn from_data<T: DeserializeOwned>(data: Value) -> Result<T, serde_json::Error> {
    let data = if data.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        data
    };
    serde_json::from_value(data)
}

/// Strips markup and control characters, trims, truncates to `MAX_NAME_LEN`
/// characters, and falls back to `FALLBACK_NAME` if nothing is left.
pub fn sanitize_name(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag || c.is_control() => {}
            _ => stripped.push(c),
        }
    }

    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

/// Forgiving deserializers for client-supplied values.
///
/// Clients are not trusted to send well-typed JSON; rather than failing the
/// whole message, values are coerced the way a dynamically typed peer would.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Truthiness: `null`, `false`, `0` and `""` are false, everything else true.
    pub fn truthy(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(truthy(&Value::deserialize(d)?))
    }

    /// Numeric axis clamped to `[-1, 1]`; unparsable or non-finite values read as 0.
    pub fn axis<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
        let raw = match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::Bool(b) => f64::from(u8::from(b)),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        let v = raw as f32;
        Ok(if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 })
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_name_falls_back() {
        assert_eq!(sanitize_name("  "), "UNKNOWN");
        assert_eq!(sanitize_name(""), "UNKNOWN");
        assert_eq!(sanitize_name("<b></b>"), "UNKNOWN");
    }

    #[test]
    fn long_name_truncated_to_fifteen_chars() {
        let name = "abcdefghijklmnopqrstuvwxyz0123";
        assert_eq!(name.chars().count(), 30);
        assert_eq!(sanitize_name(name), "abcdefghijklmno");
    }

    #[test]
    fn markup_and_control_chars_are_stripped() {
        assert_eq!(sanitize_name(" <i>Ace</i>\u{7}Pilot "), "AcePilot");
        assert_eq!(sanitize_name("Zoë"), "Zoë");
    }

    #[test]
    fn welcome_uses_camel_case_envelope() {
        let msg = Message::Welcome(Welcome {
            entity_id: EntityId::new(3, 0),
            name: "Ace".into(),
            tick_rate: 30,
        });
        let json: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "WELCOME");
        assert_eq!(json["data"]["entityId"], 3);
        assert_eq!(json["data"]["name"], "Ace");
        assert_eq!(json["data"]["tickRate"], 30);
    }

    #[test]
    fn hello_decodes_and_tolerates_odd_names() {
        let msg = Message::decode(r#"{"type":"HELLO","data":{"name":"Ace"}}"#).unwrap();
        assert_eq!(msg, Message::Hello(Hello { name: "Ace".into() }));

        let Message::Hello(hello) = Message::decode(r#"{"type":"HELLO","data":{"name":42}}"#).unwrap() else {
            panic!("expected HELLO");
        };
        assert_eq!(hello.sanitized_name(), "42");

        let Message::Hello(hello) = Message::decode(r#"{"type":"HELLO"}"#).unwrap() else {
            panic!("expected HELLO");
        };
        assert_eq!(hello.sanitized_name(), FALLBACK_NAME);
    }

    #[test]
    fn input_values_are_coerced_not_rejected() {
        let text = r#"{"type":"INPUT","data":{
            "forward": 1, "backward": "", "rollLeft": "yes", "boost": null,
            "weaponPrimary": true, "yaw": 7.5, "pitch": "-0.25"
        }}"#;
        let Message::Input(input) = Message::decode(text).unwrap() else {
            panic!("expected INPUT");
        };
        assert!(input.forward);
        assert!(!input.backward);
        assert!(input.roll_left);
        assert!(!input.boost);
        assert!(input.weapon_primary);
        assert!(!input.strafe_up, "missing fields default to off");
        assert_eq!(input.yaw, 1.0);
        assert_eq!(input.pitch, -0.25);
    }

    #[test]
    fn unknown_type_is_distinguished_from_garbage() {
        assert!(matches!(
            Message::decode(r#"{"type":"CHAT","data":{"text":"hi"}}"#),
            Err(ProtocolError::UnrecognizedMessage(t)) if t == "CHAT"
        ));
        assert!(matches!(Message::decode("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            Message::decode(r#"{"type":"DESPAWN","data":{"ids":"nope"}}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn update_roundtrip() {
        let msg = Message::Update(Update {
            tick: 9,
            entities: vec![EntityPose {
                id: EntityId::new(1, 2),
                position: Vec3::new(1.0, 2.0, 3.0),
                rotation: Quat::IDENTITY,
            }],
        });
        assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
    }
}

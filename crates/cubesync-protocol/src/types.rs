//! Core protocol types for cubesync's wire format.
//!
//! Everything here is serialized to JSON, sent over the transport, and
//! deserialized on the other side. Vectors and colors travel as plain JSON
//! arrays (`[x, y, z]`, `[r, g, b, a]`) so that any client can produce them
//! without knowing our struct layout.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A player's stable identifier.
///
/// Assigned by the server at handshake (`"c1"`, `"c2"`, …) and immutable
/// for the rest of the connection. Opaque to everything except the server's
/// allocator. Ordered so that snapshots can list players by identifier.
///
/// `#[serde(transparent)]` makes `PlayerId("c1")` serialize as just `"c1"`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Creates a player ID from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the placeholder a client sends before the server
    /// has assigned its identity.
    pub fn is_placeholder(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Vec3
// ---------------------------------------------------------------------------

/// A position in world space. Serialized as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// `false` if any component is NaN or infinite. JSON cannot carry
    /// those values.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// An RGBA color with `f32` channels in `0.0..=1.0`. Serialized as
/// `[r, g, b, a]`.
///
/// The default is fully transparent black `(0, 0, 0, 0)`, which is what a
/// freshly registered player carries until its first report.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// An opaque color.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    pub fn is_finite(&self) -> bool {
        [self.r, self.g, self.b, self.a].iter().all(|c| c.is_finite())
    }
}

impl From<[f32; 4]> for Color {
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self { r, g, b, a }
    }
}

impl From<Color> for [f32; 4] {
    fn from(c: Color) -> Self {
        [c.r, c.g, c.b, c.a]
    }
}

// ---------------------------------------------------------------------------
// PlayerState
// ---------------------------------------------------------------------------

/// Everything the protocol knows about one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: PlayerId,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub color: Color,
}

impl PlayerState {
    /// A zero-valued state: origin position, transparent black.
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            position: Vec3::ZERO,
            color: Color::default(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.color.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Message: the wire envelope
// ---------------------------------------------------------------------------

/// Every message exchanged between client and server.
///
/// `#[serde(tag = "cmd")]` produces internally tagged JSON: the variant name
/// lands in a `"cmd"` field next to the variant's own fields. With
/// `rename_all = "SCREAMING_SNAKE_CASE"` the tags read `"HANDSHAKE"`,
/// `"PLAYER_UPDATE"` and `"SERVER_UPDATE"`:
///
/// ```json
/// {"cmd":"PLAYER_UPDATE","player":{"id":"c1","position":[1,0,0],"color":[1,0,0,1]}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Server → client: "your identifier is `id`".
    /// Client → server: an introduction carrying a placeholder `id` and the
    /// client's initial look, which the server ignores.
    Handshake {
        id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Vec3>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<Color>,
    },

    /// Client → server: the sender's current position and color.
    PlayerUpdate { player: PlayerState },

    /// Server → client: the full registry, ordered by identifier.
    ServerUpdate { players: Vec<PlayerState> },
}

impl Message {
    pub const HANDSHAKE: &'static str = "HANDSHAKE";
    pub const PLAYER_UPDATE: &'static str = "PLAYER_UPDATE";
    pub const SERVER_UPDATE: &'static str = "SERVER_UPDATE";

    /// Every `cmd` value this protocol understands.
    pub const KINDS: [&'static str; 3] =
        [Self::HANDSHAKE, Self::PLAYER_UPDATE, Self::SERVER_UPDATE];

    /// A handshake that only carries an identifier.
    pub fn handshake(id: PlayerId) -> Self {
        Message::Handshake {
            id,
            position: None,
            color: None,
        }
    }

    /// The `cmd` header this message is sent with.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Handshake { .. } => Self::HANDSHAKE,
            Message::PlayerUpdate { .. } => Self::PLAYER_UPDATE,
            Message::ServerUpdate { .. } => Self::SERVER_UPDATE,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =====================================================================
    // Identity
    // =====================================================================

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerId::new("c1")).unwrap();
        assert_eq!(json, "\"c1\"");
    }

    #[test]
    fn test_player_id_display_is_raw_identifier() {
        assert_eq!(PlayerId::from("c7").to_string(), "c7");
    }

    #[test]
    fn test_player_id_orders_lexicographically() {
        let mut ids = vec![PlayerId::new("c2"), PlayerId::new("c1")];
        ids.sort();
        assert_eq!(ids, vec![PlayerId::new("c1"), PlayerId::new("c2")]);
    }

    #[test]
    fn test_player_id_empty_is_placeholder() {
        assert!(PlayerId::default().is_placeholder());
        assert!(!PlayerId::new("c1").is_placeholder());
    }

    // =====================================================================
    // Vec3 / Color
    // =====================================================================

    #[test]
    fn test_vec3_serializes_as_array() {
        let value = serde_json::to_value(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(value, json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_vec3_add_assign_translates() {
        let mut v = Vec3::new(1.0, 0.0, 0.0);
        v += Vec3::new(0.0, 0.5, -1.0);
        assert_eq!(v, Vec3::new(1.0, 0.5, -1.0));
    }

    #[test]
    fn test_color_default_is_transparent_black() {
        assert_eq!(Color::default(), Color::new(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_color_deserializes_from_array() {
        let color: Color = serde_json::from_str("[1, 0, 0, 1]").unwrap();
        assert_eq!(color, Color::RED);
    }

    #[test]
    fn test_player_state_new_is_zero_valued() {
        let state = PlayerState::new(PlayerId::new("c1"));
        assert_eq!(state.position, Vec3::ZERO);
        assert_eq!(state.color, Color::default());
    }

    // =====================================================================
    // Message wire format
    // =====================================================================

    #[test]
    fn test_message_handshake_json_format() {
        let msg = Message::Handshake {
            id: PlayerId::new("c1"),
            position: Some(Vec3::ZERO),
            color: Some(Color::RED),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "cmd": "HANDSHAKE",
                "id": "c1",
                "position": [0.0, 0.0, 0.0],
                "color": [1.0, 0.0, 0.0, 1.0],
            })
        );
    }

    #[test]
    fn test_message_handshake_omits_absent_fields() {
        let value =
            serde_json::to_value(Message::handshake(PlayerId::new("c3")))
                .unwrap();
        assert_eq!(value, json!({"cmd": "HANDSHAKE", "id": "c3"}));
    }

    #[test]
    fn test_message_handshake_accepts_missing_fields() {
        let msg: Message =
            serde_json::from_str(r#"{"cmd":"HANDSHAKE","id":"c2"}"#).unwrap();
        assert_eq!(msg, Message::handshake(PlayerId::new("c2")));
    }

    #[test]
    fn test_message_player_update_json_format() {
        let msg = Message::PlayerUpdate {
            player: PlayerState {
                id: PlayerId::new("c1"),
                position: Vec3::new(1.0, 0.0, 0.0),
                color: Color::RED,
            },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "cmd": "PLAYER_UPDATE",
                "player": {
                    "id": "c1",
                    "position": [1.0, 0.0, 0.0],
                    "color": [1.0, 0.0, 0.0, 1.0],
                },
            })
        );
    }

    #[test]
    fn test_message_server_update_empty_players() {
        let value = serde_json::to_value(Message::ServerUpdate {
            players: vec![],
        })
        .unwrap();
        assert_eq!(value, json!({"cmd": "SERVER_UPDATE", "players": []}));
    }

    #[test]
    fn test_message_kind_matches_cmd_header() {
        let msg = Message::ServerUpdate { players: vec![] };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["cmd"], msg.kind());
        assert!(Message::KINDS.contains(&msg.kind()));
    }
}

//! WebSocket protocol message definitions
//! These are the wire types for client-server communication, plus the
//! decode/validate entry points used by both ends of the connection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::time::tick_delta;

/// Pixels per physics metre. Identical on server and client.
pub const PIXELS_PER_METER: f32 = 30.0;

/// Team sides. Red defends the left goal mouth, blue the right one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
}

/// Match lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    /// Room is open, no match running
    #[default]
    Waiting,
    /// Match in progress
    Playing,
    /// Deadline reached
    Ended,
}

/// Match result, present in snapshots once the match has ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Red,
    Blue,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub red: u32,
    pub blue: u32,
}

impl Score {
    pub fn winner(&self) -> Winner {
        if self.red > self.blue {
            Winner::Red
        } else if self.blue > self.red {
            Winner::Blue
        } else {
            Winner::Draw
        }
    }
}

/// Directional key flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Keys {
    #[serde(default)]
    pub w: bool,
    #[serde(default)]
    pub a: bool,
    #[serde(default)]
    pub s: bool,
    #[serde(default)]
    pub d: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Actions {
    #[serde(default)]
    pub kick: bool,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Take a seat on a team and spawn a body
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team: Option<Team>,
        /// Players per team; only honoured on the first join the room sees
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team_size: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Stable identity across reconnects; falls back to `wallet`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wallet: Option<String>,
    },

    /// Claim the host seat for a wallet (first claim wins)
    ClaimHost {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wallet: Option<String>,
    },

    /// Begin a match (host only)
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_min: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wallet: Option<String>,
    },

    /// Current control state, sent at a fixed rate
    Inputs {
        #[serde(default)]
        keys: Keys,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actions: Option<Actions>,
    },

    /// Give up the body and only watch
    Spectate,
}

impl ClientMsg {
    /// Field-level checks serde cannot express
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientMsg::Join {
                team_size: Some(0), ..
            } => Err(ProtocolError::Invalid("teamSize must be positive")),
            ClientMsg::Start {
                duration_min: Some(0),
                ..
            } => Err(ProtocolError::Invalid("durationMin must be positive")),
            ClientMsg::Join {
                player_key: Some(k),
                ..
            } if k.is_empty() => Err(ProtocolError::Invalid("playerKey must not be empty")),
            ClientMsg::ClaimHost { wallet: Some(w) }
            | ClientMsg::Start { wallet: Some(w), .. }
            | ClientMsg::Join { wallet: Some(w), .. }
                if w.is_empty() =>
            {
                Err(ProtocolError::Invalid("wallet must not be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Whether the kick action is held in an `inputs` message
    pub fn kick_held(&self) -> bool {
        matches!(
            self,
            ClientMsg::Inputs {
                actions: Some(Actions { kick: true }),
                ..
            }
        )
    }
}

/// Simulation constants shared with clients in the welcome message.
/// Lengths are in metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimConfig {
    pub width: f32,
    pub height: f32,
    pub player_radius: f32,
    pub ball_radius: f32,
    /// Player speed in m/s
    pub move_speed: f32,
    /// Fixed physics step in seconds
    pub time_step: f32,
    /// Vertical extent of each goal mouth
    pub goal_height: f32,
    /// Depth of the net behind each goal mouth
    pub goal_depth: f32,
    /// Reach beyond the player's radius within which a kick connects
    pub kick_extra_reach: f32,
    /// Impulse magnitude of a kick (N·s)
    pub kick_impulse: f32,
    pub pixels_per_meter: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        let px = |v: f32| v / PIXELS_PER_METER;
        Self {
            width: px(900.0),
            height: px(520.0),
            player_radius: px(18.0),
            ball_radius: px(12.0),
            move_speed: 4.5,
            time_step: tick_delta(),
            goal_height: px(160.0),
            goal_depth: px(36.0),
            kick_extra_reach: 0.5,
            kick_impulse: 0.5,
            pixels_per_meter: PIXELS_PER_METER,
        }
    }
}

impl SimConfig {
    pub fn to_pixels(&self, metres: f32) -> f32 {
        metres * self.pixels_per_meter
    }

    pub fn from_pixels(&self, pixels: f32) -> f32 {
        pixels / self.pixels_per_meter
    }

    pub fn centre(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Open interval (top, bottom) of the goal mouths along the y axis
    pub fn goal_band(&self) -> (f32, f32) {
        let mid = self.height / 2.0;
        let half = self.goal_height / 2.0;
        (mid - half, mid + half)
    }
}

/// Position and velocity of one body
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Absent until the connection has joined a team
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    /// Stable jersey number (1-9)
    pub num: u8,
}

/// Server-timestamped projection of the whole match state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Server clock, unix millis
    pub t: u64,
    /// Recipient's own connection id
    pub me: Uuid,
    pub score: Score,
    pub phase: MatchPhase,
    pub players: BTreeMap<Uuid, PlayerSnapshot>,
    pub ball: BodyState,
    pub time_left_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    /// Side that scored most recently in this match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_goal: Option<Team>,
}

impl Snapshot {
    /// Copy addressed to one connection
    pub fn for_recipient(&self, me: Uuid) -> Self {
        Self { me, ..self.clone() }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Sent once right after the upgrade
    Welcome {
        id: Uuid,
        room: String,
        config: SimConfig,
    },

    /// Match state broadcast (~30 Hz)
    Snapshot(Snapshot),
}

/// Protocol errors. Never reported to the peer; the message is dropped.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid message: {0}")]
    Invalid(&'static str),
}

/// Parse and validate an inbound client frame
pub fn decode_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    let msg: ClientMsg = serde_json::from_str(text)?;
    msg.validate()?;
    Ok(msg)
}

/// Parse an inbound server frame (client side)
pub fn decode_server_msg(text: &str) -> Result<ServerMsg, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_join_with_camel_case_fields() {
        let msg = decode_client_msg(r#"{"type":"join","team":"blue","teamSize":2,"name":"p"}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMsg::Join {
                team: Some(Team::Blue),
                team_size: Some(2),
                name: Some("p".to_string()),
                player_key: None,
                wallet: None,
            }
        );

        let msg =
            decode_client_msg(r#"{"type":"join","playerKey":"k-1","wallet":"W1"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMsg::Join {
                player_key: Some(ref k),
                wallet: Some(ref w),
                ..
            } if k == "k-1" && w == "W1"
        ));
    }

    #[test]
    fn decodes_claim_host_and_start() {
        assert_eq!(
            decode_client_msg(r#"{"type":"claim-host","wallet":"W1"}"#).unwrap(),
            ClientMsg::ClaimHost {
                wallet: Some("W1".to_string())
            }
        );
        assert_eq!(
            decode_client_msg(r#"{"type":"start","durationMin":1}"#).unwrap(),
            ClientMsg::Start {
                duration_min: Some(1),
                wallet: None
            }
        );
    }

    #[test]
    fn inputs_tolerate_missing_keys_and_extra_fields() {
        let msg = decode_client_msg(r#"{"type":"inputs","keys":{"w":true},"at":123}"#).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Inputs {
                keys: Keys {
                    w: true,
                    ..Keys::default()
                },
                actions: None
            }
        );
        assert!(!msg.kick_held());

        let msg = decode_client_msg(r#"{"type":"inputs","actions":{"kick":true}}"#).unwrap();
        assert!(msg.kick_held());
    }

    #[test]
    fn rejects_malformed_and_unknown() {
        assert!(matches!(
            decode_client_msg("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(decode_client_msg(r#"{"type":"teleport"}"#).is_err());
        assert!(decode_client_msg(r#"{"team":"red"}"#).is_err());
        assert!(decode_client_msg(r#"{"type":"join","team":"green"}"#).is_err());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(matches!(
            decode_client_msg(r#"{"type":"join","teamSize":0}"#),
            Err(ProtocolError::Invalid(_))
        ));
        assert!(decode_client_msg(r#"{"type":"join","teamSize":-1}"#).is_err());
        assert!(decode_client_msg(r#"{"type":"start","durationMin":0}"#).is_err());
        assert!(decode_client_msg(r#"{"type":"claim-host","wallet":""}"#).is_err());
        assert!(decode_client_msg(r#"{"type":"join","playerKey":""}"#).is_err());
        assert!(decode_client_msg(r#"{"type":"join","wallet":""}"#).is_err());
    }

    #[test]
    fn snapshot_wire_shape() {
        let me = Uuid::new_v4();
        let snapshot = Snapshot {
            t: 42,
            me,
            score: Score { red: 1, blue: 0 },
            phase: MatchPhase::Ended,
            players: BTreeMap::new(),
            ball: BodyState::default(),
            time_left_ms: 0,
            winner: Some(Winner::Red),
            last_goal: None,
        };
        let json: serde_json::Value =
            serde_json::from_str(&encode(&ServerMsg::Snapshot(snapshot.clone())).unwrap()).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["phase"], "ended");
        assert_eq!(json["winner"], "red");
        assert_eq!(json["timeLeftMs"], 0);
        assert!(json.get("lastGoal").is_none());

        let back = decode_server_msg(&json.to_string()).unwrap();
        assert_eq!(back, ServerMsg::Snapshot(snapshot));
    }

    #[test]
    fn welcome_carries_config_in_metres() {
        let msg = ServerMsg::Welcome {
            id: Uuid::new_v4(),
            room: "lobby".to_string(),
            config: SimConfig::default(),
        };
        let json: serde_json::Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
        assert_eq!(json["type"], "welcome");
        assert_eq!(json["config"]["pixelsPerMeter"], 30.0);
        assert_eq!(json["config"]["width"], 30.0);
    }

    #[test]
    fn winner_from_score() {
        assert_eq!(Score { red: 2, blue: 1 }.winner(), Winner::Red);
        assert_eq!(Score { red: 0, blue: 3 }.winner(), Winner::Blue);
        assert_eq!(Score::default().winner(), Winner::Draw);
    }
}

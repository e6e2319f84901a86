//! Wire message shapes (§6). Data only — no socket code. Actual transport
//! is an external collaborator (`SessionSink`); this module just defines
//! what gets serialized onto it.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientOpcode {
    Hello,
    JoinRoom,
    LeaveRoom,
    ListRooms,
    Ping,
    Move,
    Admin,
    SetTarget,
    Cast,
    ObjectRequest,
    TerrainRequest,
    Terrain,
    Heartbeat,
    Chat,
    Whereami,
    MudResult,
    ActionResult,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerOpcode {
    Welcome,
    HelloAck,
    RoomJoined,
    RoomLeft,
    RoomList,
    Error,
    Pong,
    EntityList,
    EntitySpawn,
    EntityUpdate,
    EntityDespawn,
    Chat,
    Terrain,
    WorldBlueprint,
    TargetSet,
    AbilityCast,
    ObjectChunk,
    WhereamiResult,
    MudResult,
    ActionResult,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub op: ClientOpcode,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerEnvelope {
    pub op: ServerOpcode,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl ServerEnvelope {
    pub fn new(op: ServerOpcode, payload: serde_json::Value) -> Self {
        Self { op, payload, nonce: None }
    }

    pub fn with_nonce(op: ServerOpcode, payload: serde_json::Value, nonce: impl Into<String>) -> Self {
        Self { op, payload, nonce: Some(nonce.into()) }
    }
}

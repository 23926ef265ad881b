//! Network Layer
//!
//! Wire protocol, password digests and the websocket server. Room logic
//! lives in `room/`; this layer only decodes, dispatches and delivers.

pub mod password;
pub mod protocol;
pub mod server;

pub use protocol::{
    ClientMessage, ServerMessage, ServerError, ErrorCode, RoomSummary, RollBroadcast, ThrowVector,
};
pub use server::{RoomServer, ServerConfig, RoomServerError, SharedRegistry, WS_PATH, HEALTHZ_PATH};

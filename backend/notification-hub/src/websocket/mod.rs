/// WebSocket real-time delivery
///
/// 1. RoomRegistry: room key -> live connections
/// 2. WsSession: one actor per connection (auth'd scope, heartbeat, join/leave)
/// 3. Frames: `join`/`leave` in, `notification.created` and acks out
pub mod messages;
pub mod registry;
pub mod session;

pub use messages::{ClientFrame, ServerEvent};
pub use registry::{ConnectionId, EventSender, PublishOutcome, RoomRegistry};
pub use session::WsSession;

pub mod client;
pub mod forwarding;
pub mod frames;
pub mod framing;
pub mod router;
pub mod transport;

pub use client::RelayClient;
pub use forwarding::{Decision, Refusal};
pub use frames::{ControlFrame, Delivery, RelayFrame, SendRequest};
pub use framing::{frame_stream, next_frame, FrameError, FrameStream, JsonFrameCodec};
pub use router::Router;
pub use transport::{FrameSender, PeerLink};

//! RTSP session client, SDP decoding and stream checking

mod checker;
mod client;
mod ffprobe;
mod sdp;

pub use checker::{Checker, StreamCheckRequest, StreamCheckResult};
pub use client::{Response, RtspClient, SessionState};
pub use sdp::{parse_sdp, StreamInfo};

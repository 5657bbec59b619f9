//! Live snapshot stream over WebSocket.

pub mod stream;

pub use stream::stream_handler;

//! Control protocol spoken between controller, routers and clients.
//!
//! One TCP connection carries one logical exchange. Each message is a
//! [`ControlMessage`] encoded as tagged JSON, sealed by a [`Cipher`] and
//! framed with a big-endian `u32` length. A `Data` message carrying
//! [`Body::Attachment`] is followed, after the receiver answers `Ready`, by
//! sealed chunks of at most [`CHUNK_SIZE`] bytes and an empty end marker.

pub mod cipher;
pub mod codec;
pub mod messages;

pub use cipher::{Cipher, SharedKeyCipher};
pub use codec::{
    read_message, receive_chunks, relay_chunks, request, send_chunks, send_to, write_message, CHUNK_SIZE,
    MAX_FRAME_LEN,
};
pub use messages::{Body, ControlMessage, DataMessage, PathEntry, RoutingSnapshot};

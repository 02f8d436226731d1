//! Protocol messages and their wire encoding.

pub mod codec;
pub mod message;

pub use codec::{decode, encode, CodecError, MessageCodec, DEFAULT_MAX_FRAME_LEN};
pub use message::{
    BlockPayload, HandshakePayload, InternalCommandPayload, Message, MessageType,
    PoolInfoRequestPayload,
};

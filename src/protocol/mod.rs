//! Transport protocol module.
//!
//! Contains the fragmentation codec, GATT status codes and CCCD values.

pub mod cccd;
pub mod codec;
pub mod status;

pub use cccd::ClientConfiguration;
pub use codec::{
    chunk_size_for_mtu, reassemble, split, FragmentQueue, ATT_HEADER_SIZE, DEFAULT_CHUNK_SIZE,
};
pub use status::GattStatus;

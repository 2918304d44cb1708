//! Page layer: the in-memory node and its on-disk codec.
//!
//! A node occupies exactly one fixed-size page on disk. The codec lays
//! out a fixed header, the key array, then the value region; see
//! `codec` for the byte-level format.

mod codec;
mod node;

pub use codec::{decode_node, encode_node, NODE_HEADER_SIZE};
pub use node::{Node, Value};

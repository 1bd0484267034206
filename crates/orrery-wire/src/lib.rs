//! Tagged value wire format for the Orrery transport.
//!
//! Every value on the wire is a one-byte type tag followed by a fixed-width
//! little-endian payload; strings carry a 16-bit length before their bytes.
//! The tag costs one byte per value and buys self-description: a sender and
//! receiver that disagree about the next type find out immediately instead
//! of silently misinterpreting bytes.
//!
//! This crate is the pure codec — no I/O. The link layer feeds it bytes.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod error;
pub mod value;

pub use error::WireError;
pub use value::{
    decode_bool, decode_char, decode_i16, decode_i32, decode_i64, decode_i8, decode_u16,
    decode_u32, decode_u64, encode_bool, encode_char, encode_i16, encode_i32, encode_i64,
    encode_i8, encode_str_header, encode_u16, encode_u32, encode_u64, encode_u8, Tag,
    MAX_STRING_LEN,
};

//! # Core Protocol Components
//!
//! Packet framing for the Nemoria wire protocol.
//!
//! ## Components
//! - **Packet**: one length-delimited frame
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Magic "NMRA"(4)] [Version(1)] [Length u32 BE(4)] [Payload(N)]
//! ```
//!
//! Stored values may contain arbitrary bytes, so frames are length-prefixed
//! rather than delimiter-scanned.
//!
//! ## Security
//! - Maximum payload size: 16MB (prevents memory exhaustion)
//! - Magic bytes prevent accidental misinterpretation
//! - Length validation before allocation

pub mod codec;
pub mod packet;

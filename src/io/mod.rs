//! IO modules - external system interfaces
//!
//! - `transport` - UDP socket lifecycle, receive loop, retrying sends

pub mod transport;

// Re-export commonly used types
pub use transport::{Datagram, RetryPolicy, Transport, TransportError, UdpTransport};

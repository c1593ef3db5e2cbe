#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// re-export sub-crates
pub use rtcp;
pub use rtp;
pub use sdp;
pub use util;

pub mod error;
pub mod negotiation;
pub mod relay;
pub mod rtp_transceiver;
pub mod session;
pub mod track;

pub use error::Error;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";

/// Equal to UDP MTU
pub(crate) const RECEIVE_MTU: usize = 1460;

pub(crate) const SDP_ATTRIBUTE_RID: &str = "rid";
pub(crate) const SDP_ATTRIBUTE_SIMULCAST: &str = "simulcast";
pub(crate) const SDES_RTP_STREAM_ID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";

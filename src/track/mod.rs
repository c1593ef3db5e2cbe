
pub mod media_track;
pub mod track_remote_channel;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use util::Unmarshal;

use crate::error::Result;

pub use media_track::Track;
pub use track_remote_channel::TrackRemoteChannel;

/// TrackDirection tells whether a [`Track`] carries media we send (outbound) or media
/// the remote peer sends us (inbound).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrackDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for TrackDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TrackDirection::Inbound => write!(f, "inbound"),
            TrackDirection::Outbound => write!(f, "outbound"),
        }
    }
}

/// TrackLocalWriter is the Writer for outbound RTP Packets.
///
/// One writer sits behind every bound sender. Returning [`crate::Error::ErrClosedPipe`]
/// tells the caller that nobody is consuming the stream right now.
#[async_trait]
pub trait TrackLocalWriter: fmt::Debug {
    /// write_rtp writes a RTP packet to the connection
    async fn write_rtp(&self, pkt: &rtp::packet::Packet) -> Result<usize>;

    /// write unmarshals and writes a full RTP packet
    async fn write(&self, mut b: &[u8]) -> Result<usize> {
        let pkt = rtp::packet::Packet::unmarshal(&mut b)?;
        self.write_rtp(&pkt).await
    }
}

/// TrackRemoteReader is the source of inbound RTP for a remote track.
#[async_trait]
pub trait TrackRemoteReader: fmt::Debug {
    /// read blocks until the next RTP packet arrives and copies it into `b`.
    /// An error means the inbound stream is gone for good.
    async fn read(&self, b: &mut [u8]) -> Result<usize>;
}

/// TrackBinding is a single sender bound to an outbound track.
/// It only names the sender; the sender itself is owned by its transceiver.
#[derive(Clone, Debug)]
pub(crate) struct TrackBinding {
    pub(crate) sender_id: String,
    pub(crate) write_stream: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,
}

/// TrackSenders is the active-sender set of an outbound track.
#[derive(Default, Debug)]
pub(crate) struct TrackSenders {
    pub(crate) active_senders: Vec<TrackBinding>,
    pub(crate) total_sender_count: usize,
}

impl TrackSenders {
    pub(crate) fn contains(&self, sender_id: &str) -> bool {
        self.active_senders.iter().any(|b| b.sender_id == sender_id)
    }

    pub(crate) fn add(&mut self, binding: TrackBinding) {
        if self.contains(&binding.sender_id) {
            return;
        }
        self.active_senders.push(binding);
        self.total_sender_count += 1;
    }

    pub(crate) fn remove(&mut self, sender_id: &str) -> bool {
        let before = self.active_senders.len();
        self.active_senders.retain(|b| b.sender_id != sender_id);
        let removed = before - self.active_senders.len();
        self.total_sender_count -= removed;
        removed > 0
    }
}

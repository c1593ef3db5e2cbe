use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use util::Unmarshal;

use super::{TrackDirection, TrackRemoteReader, TrackSenders};
use crate::error::{flatten_errs, Error, Result};
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use crate::rtp_transceiver::{PayloadType, SSRC};

static TRACK_UNIQUE_ID: AtomicUsize = AtomicUsize::new(0);

/// Track is one media stream, either one we send or one the remote peer sends us.
///
/// Outbound tracks keep the set of senders currently bound to them so a single
/// source can fan out to several transceivers. Inbound tracks own the reader that
/// yields the remote RTP stream and can never be bound to a sender.
pub struct Track {
    tid: usize,

    id: String,
    stream_id: String,
    rid: Option<String>,

    kind: RTPCodecType,
    ssrc: SSRC,
    payload_type: PayloadType,
    codec: RTCRtpCodecCapability,
    direction: TrackDirection,

    receive_mtu: usize,
    reader: Option<Arc<dyn TrackRemoteReader + Send + Sync>>,

    pub(crate) senders: Mutex<TrackSenders>,
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("rid", &self.rid)
            .field("kind", &self.kind)
            .field("ssrc", &self.ssrc)
            .field("payload_type", &self.payload_type)
            .field("codec", &self.codec)
            .field("direction", &self.direction)
            .finish()
    }
}

impl Track {
    /// new_local creates an outbound track. The kind is taken from the codec mime type.
    pub fn new_local(
        codec: RTCRtpCodecCapability,
        payload_type: PayloadType,
        ssrc: SSRC,
        id: String,
        stream_id: String,
    ) -> Self {
        Track {
            tid: TRACK_UNIQUE_ID.fetch_add(1, Ordering::SeqCst),
            id,
            stream_id,
            rid: None,
            kind: codec.kind(),
            ssrc,
            payload_type,
            codec,
            direction: TrackDirection::Outbound,
            receive_mtu: crate::RECEIVE_MTU,
            reader: None,
            senders: Mutex::new(TrackSenders::default()),
        }
    }

    /// new_remote creates an inbound track fed by `reader`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_remote(
        kind: RTPCodecType,
        ssrc: SSRC,
        payload_type: PayloadType,
        codec: RTCRtpCodecCapability,
        id: String,
        stream_id: String,
        rid: Option<String>,
        reader: Arc<dyn TrackRemoteReader + Send + Sync>,
    ) -> Self {
        Track {
            tid: TRACK_UNIQUE_ID.fetch_add(1, Ordering::SeqCst),
            id,
            stream_id,
            rid,
            kind,
            ssrc,
            payload_type,
            codec,
            direction: TrackDirection::Inbound,
            receive_mtu: crate::RECEIVE_MTU,
            reader: Some(reader),
            senders: Mutex::new(TrackSenders::default()),
        }
    }

    /// with_receive_mtu overrides the buffer size used by read_rtp.
    pub fn with_receive_mtu(mut self, receive_mtu: usize) -> Self {
        self.receive_mtu = receive_mtu;
        self
    }

    /// tid is a process-wide unique number, used to order lock acquisition between tracks.
    pub(crate) fn tid(&self) -> usize {
        self.tid
    }

    /// id is the unique identifier for this Track. This should be unique for the
    /// stream, but doesn't have to globally unique. A common example would be 'audio' or 'video'
    /// and stream_id would be 'desktop' or 'webcam'
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// stream_id is the group this track belongs too. This must be unique
    pub fn stream_id(&self) -> &str {
        self.stream_id.as_str()
    }

    /// rid gets the RTP Stream ID of this Track
    pub fn rid(&self) -> Option<&str> {
        self.rid.as_deref()
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    pub fn ssrc(&self) -> SSRC {
        self.ssrc
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn codec(&self) -> &RTCRtpCodecCapability {
        &self.codec
    }

    pub fn direction(&self) -> TrackDirection {
        self.direction
    }

    /// is_remote tells if this track was received from the remote peer.
    pub fn is_remote(&self) -> bool {
        self.direction == TrackDirection::Inbound
    }

    /// active_senders returns the ids of the senders currently bound to this track.
    pub async fn active_senders(&self) -> Vec<String> {
        let senders = self.senders.lock().await;
        senders
            .active_senders
            .iter()
            .map(|b| b.sender_id.clone())
            .collect()
    }

    /// total_sender_count always equals the size of the active sender set.
    pub async fn total_sender_count(&self) -> usize {
        let senders = self.senders.lock().await;
        senders.total_sender_count
    }

    /// write_rtp writes a RTP Packet to every sender bound to this track.
    ///
    /// Writers without a consumer are skipped. Fails with [`Error::ErrClosedPipe`]
    /// only when no bound writer took the packet; any other writer error is returned,
    /// several of them flattened into one.
    pub async fn write_rtp(&self, pkt: &rtp::packet::Packet) -> Result<usize> {
        if self.is_remote() {
            return Err(Error::ErrTrackIsNotLocal);
        }

        let write_streams: Vec<_> = {
            let senders = self.senders.lock().await;
            senders
                .active_senders
                .iter()
                .filter_map(|b| b.write_stream.clone())
                .collect()
        };
        if write_streams.is_empty() {
            return Err(Error::ErrClosedPipe);
        }

        let mut n = 0;
        let mut delivered = false;
        let mut write_errs = vec![];
        for write_stream in write_streams {
            match write_stream.write_rtp(pkt).await {
                Ok(written) => {
                    n += written;
                    delivered = true;
                }
                Err(err) if err.is_closed_pipe() => {}
                Err(err) => write_errs.push(err),
            }
        }

        if write_errs.len() == 1 {
            return Err(write_errs.remove(0));
        }
        flatten_errs(write_errs)?;

        if !delivered {
            return Err(Error::ErrClosedPipe);
        }
        Ok(n)
    }

    /// read_rtp blocks until the next inbound RTP packet and unmarshals it.
    pub async fn read_rtp(&self) -> Result<rtp::packet::Packet> {
        let reader = self.reader.as_ref().ok_or(Error::ErrTrackIsNotRemote)?;

        let mut b = vec![0u8; self.receive_mtu];
        let n = reader.read(&mut b).await?;

        let mut buf = &b[..n];
        let pkt = rtp::packet::Packet::unmarshal(&mut buf)?;

        Ok(pkt)
    }
}


use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ::sdp::description::session::SessionDescription;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use log::{debug, warn};
use portable_atomic::AtomicBool;
use tokio::sync::Mutex;

use crate::error::{flatten_errs, Error, Result};
use crate::negotiation::{match_media_sections, media_sections, MediaSection};
use crate::relay::RTCPWriter;
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{PayloadType, RTCRtpTransceiver, RTCRtpTransceiverInit};
use crate::track::{Track, TrackLocalWriter};

pub type OnTrackHdlrFn = Box<
    dyn (FnMut(
            Arc<Track>,
            Arc<RTCRtpReceiver>,
            Arc<RTCRtpTransceiver>,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// MediaSession owns the transceivers of one peer session and connects them to
/// the transport: feedback goes out through `rtcp_writer`, and every sender it
/// creates writes through `rtp_writer`.
pub struct MediaSession {
    rtp_transceivers: Mutex<Vec<Arc<RTCRtpTransceiver>>>,
    rtcp_writer: Arc<dyn RTCPWriter + Send + Sync>,
    rtp_writer: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,

    on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,
    is_closed: AtomicBool,
}

impl MediaSession {
    pub fn new(
        rtcp_writer: Arc<dyn RTCPWriter + Send + Sync>,
        rtp_writer: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,
    ) -> Self {
        MediaSession {
            rtp_transceivers: Mutex::new(vec![]),
            rtcp_writer,
            rtp_writer,
            on_track_handler: Arc::new(ArcSwapOption::empty()),
            is_closed: AtomicBool::new(false),
        }
    }

    fn check_closed(&self) -> Result<()> {
        if self.is_closed.load(Ordering::SeqCst) {
            Err(Error::ErrConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// new_track creates an outbound track with a random SSRC.
    pub fn new_track(
        &self,
        codec: RTCRtpCodecCapability,
        payload_type: PayloadType,
        id: String,
        stream_id: String,
    ) -> Arc<Track> {
        Arc::new(Track::new_local(
            codec,
            payload_type,
            rand::random::<u32>(),
            id,
            stream_id,
        ))
    }

    fn new_sender(&self, kind: RTPCodecType) -> Arc<RTCRtpSender> {
        Arc::new(RTCRtpSender::new(
            kind,
            rand::random::<u32>(),
            self.rtp_writer.clone(),
        ))
    }

    /// add_track starts sending `track`. A transceiver of the same kind that is not
    /// sending anything is reused, otherwise a sendrecv transceiver is created.
    pub async fn add_track(&self, track: Arc<Track>) -> Result<Arc<RTCRtpSender>> {
        self.check_closed()?;
        if track.is_remote() {
            return Err(Error::ErrTrackIsNotLocal);
        }

        let mut rtp_transceivers = self.rtp_transceivers.lock().await;
        for t in &*rtp_transceivers {
            if t.is_stopped() || t.kind() != track.kind() || t.direction().has_send() {
                continue;
            }

            match t.sender() {
                Some(sender) if sender.track().await.is_none() => {
                    t.set_sending_track(Some(track)).await?;
                    return Ok(sender);
                }
                Some(_) => {}
                None => {
                    let sender = self.new_sender(track.kind());
                    t.set_sender_track(Arc::clone(&sender), Some(track)).await?;
                    return Ok(sender);
                }
            }
        }

        let sender = self.new_sender(track.kind());
        let receiver = Arc::new(RTCRtpReceiver::new(track.kind()));
        let t = RTCRtpTransceiver::new(
            track.kind(),
            RTCRtpTransceiverDirection::Recvonly,
            Some(Arc::clone(&sender)),
            Some(receiver),
        )
        .await;
        // recvonly plus a bound track is sendrecv
        t.set_sending_track(Some(track)).await?;
        rtp_transceivers.push(t);

        Ok(sender)
    }

    /// add_transceiver_from_kind adds a transceiver that receives media of `kind`.
    /// Only recvonly is supported, sending requires a track.
    pub async fn add_transceiver_from_kind(
        &self,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Arc<RTCRtpTransceiver>> {
        self.check_closed()?;

        let direction = init
            .map(|value| value.direction)
            .unwrap_or(RTCRtpTransceiverDirection::Sendrecv);
        if direction != RTCRtpTransceiverDirection::Recvonly {
            return Err(Error::ErrAddTransceiverFromKindSupport);
        }

        let t = RTCRtpTransceiver::new(
            kind,
            direction,
            Some(self.new_sender(kind)),
            Some(Arc::new(RTCRtpReceiver::new(kind))),
        )
        .await;
        self.rtp_transceivers.lock().await.push(Arc::clone(&t));

        Ok(t)
    }

    /// get_transceivers returns the transceivers of the session in creation order.
    pub async fn get_transceivers(&self) -> Vec<Arc<RTCRtpTransceiver>> {
        self.rtp_transceivers.lock().await.clone()
    }

    /// apply_remote_description matches every audio and video section of `desc` to a
    /// transceiver. Transceivers synthesized for unmatched sections join the session.
    pub async fn apply_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<Vec<(MediaSection, Arc<RTCRtpTransceiver>)>> {
        self.check_closed()?;

        let sections = media_sections(desc)?;

        let mut rtp_transceivers = self.rtp_transceivers.lock().await;
        let mut pool = rtp_transceivers.clone();
        let matched = match_media_sections(&sections, &mut pool).await?;

        for (_, t) in &matched {
            if !rtp_transceivers.iter().any(|known| Arc::ptr_eq(known, t)) {
                rtp_transceivers.push(Arc::clone(t));
            }
        }

        Ok(matched)
    }

    /// start_remote_track installs an inbound track on the receiver of `transceiver`
    /// and fires the track handler.
    pub async fn start_remote_track(
        &self,
        transceiver: &Arc<RTCRtpTransceiver>,
        track: Arc<Track>,
    ) -> Result<Arc<RTCRtpReceiver>> {
        self.check_closed()?;

        let receiver = match transceiver.receiver() {
            Some(receiver) => receiver,
            None => {
                let receiver = Arc::new(RTCRtpReceiver::new(transceiver.kind()));
                transceiver.set_receiver(Arc::clone(&receiver));
                receiver
            }
        };
        receiver.receive(Arc::clone(&track))?;

        Self::do_track(
            Arc::clone(&self.on_track_handler),
            track,
            Arc::clone(&receiver),
            Arc::clone(transceiver),
        );

        Ok(receiver)
    }

    /// on_track sets an event handler which is called when remote track
    /// arrives from a remote peer.
    pub fn on_track(&self, f: OnTrackHdlrFn) {
        self.on_track_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    fn do_track(
        on_track_handler: Arc<ArcSwapOption<Mutex<OnTrackHdlrFn>>>,
        track: Arc<Track>,
        receiver: Arc<RTCRtpReceiver>,
        transceiver: Arc<RTCRtpTransceiver>,
    ) {
        debug!("got new track: {:?}", track);

        tokio::spawn(async move {
            if let Some(handler) = &*on_track_handler.load() {
                let mut f = handler.lock().await;
                f(track, receiver, transceiver).await;
            } else {
                warn!("on_track unset, unable to handle incoming media streams");
            }
        });
    }

    /// close stops every transceiver. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.is_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut close_errs = vec![];
        let mut rtp_transceivers = self.rtp_transceivers.lock().await;
        for t in &*rtp_transceivers {
            if let Err(err) = t.stop().await {
                close_errs.push(Error::new(format!("rtp_transceivers: {err}")));
            }
        }
        rtp_transceivers.clear();

        flatten_errs(close_errs)
    }
}

#[async_trait]
impl RTCPWriter for MediaSession {
    /// write_rtcp sends feedback to the remote peer.
    async fn write_rtcp(
        &self,
        pkts: &[Box<dyn rtcp::packet::Packet + Send + Sync>],
    ) -> Result<usize> {
        self.check_closed()?;
        self.rtcp_writer.write_rtcp(pkts).await
    }
}

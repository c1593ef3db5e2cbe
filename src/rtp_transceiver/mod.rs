#[cfg(test)]
mod rtp_transceiver_test;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use log::trace;
use portable_atomic::{AtomicBool, AtomicU8};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::{Mutex, OnceCell};

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::*;
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::track::Track;

pub mod rtp_codec;
pub mod rtp_receiver;
pub mod rtp_sender;
pub mod rtp_transceiver_direction;

/// SSRC represents a synchronization source
/// A synchronization source is a randomly chosen
/// value meant to be globally unique within a particular
/// RTP session. Used to identify a single stream of media.
/// <https://tools.ietf.org/html/rfc3550#section-3>
#[allow(clippy::upper_case_acronyms)]
pub type SSRC = u32;

/// PayloadType identifies the format of the RTP payload and determines
/// its interpretation by the application. Each codec in a RTP Session
/// will have a different PayloadType
/// <https://tools.ietf.org/html/rfc3550#section-3>
pub type PayloadType = u8;

/// RTPTransceiverInit dictionary is used when calling the WebRTC function addTransceiver() to provide configuration options for the new transceiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpTransceiverInit {
    pub direction: RTCRtpTransceiverDirection,
}

/// RTPTransceiver represents a combination of an RTPSender and an RTPReceiver that share a common mid.
pub struct RTCRtpTransceiver {
    mid: OnceCell<SmolStr>,
    sender: ArcSwapOption<RTCRtpSender>,
    receiver: ArcSwapOption<RTCRtpReceiver>,

    direction: AtomicU8, //RTPTransceiverDirection

    /// Held for replace_track and stop, the only compound updates of the binding.
    binding: Mutex<()>,

    pub(crate) stopped: AtomicBool,
    pub(crate) kind: RTPCodecType,
}

impl RTCRtpTransceiver {
    pub async fn new(
        kind: RTPCodecType,
        direction: RTCRtpTransceiverDirection,
        sender: Option<Arc<RTCRtpSender>>,
        receiver: Option<Arc<RTCRtpReceiver>>,
    ) -> Arc<Self> {
        let t = Arc::new(RTCRtpTransceiver {
            mid: OnceCell::new(),
            sender: ArcSwapOption::new(sender),
            receiver: ArcSwapOption::new(receiver),

            direction: AtomicU8::new(direction as u8),
            binding: Mutex::new(()),

            stopped: AtomicBool::new(false),
            kind,
        });

        if let Some(s) = t.sender() {
            s.set_rtp_transceiver(Some(Arc::downgrade(&t))).await;
        }

        t
    }

    /// sender returns the RTPTransceiver's RTPSender if it has one
    pub fn sender(&self) -> Option<Arc<RTCRtpSender>> {
        self.sender.load_full()
    }

    /// set_sender_track sets the RTPSender and Track to current transceiver
    pub async fn set_sender_track(
        self: &Arc<Self>,
        sender: Arc<RTCRtpSender>,
        track: Option<Arc<Track>>,
    ) -> Result<()> {
        self.set_sender(sender).await;
        self.set_sending_track(track).await
    }

    pub async fn set_sender(self: &Arc<Self>, s: Arc<RTCRtpSender>) {
        s.set_rtp_transceiver(Some(Arc::downgrade(self))).await;

        if let Some(prev_sender) = self.sender.swap(Some(s)) {
            prev_sender.set_rtp_transceiver(None).await;
        }
    }

    /// receiver returns the RTPTransceiver's RTPReceiver if it has one
    pub fn receiver(&self) -> Option<Arc<RTCRtpReceiver>> {
        self.receiver.load_full()
    }

    pub fn set_receiver(&self, r: Arc<RTCRtpReceiver>) {
        self.receiver.store(Some(r));
    }

    /// set_mid sets the RTPTransceiver's mid. If it was already set, will return an error.
    pub fn set_mid(&self, mid: SmolStr) -> Result<()> {
        self.mid
            .set(mid)
            .map_err(|_| Error::ErrRTPTransceiverCannotChangeMid)
    }

    /// mid gets the Transceiver's mid value. When not already set, this value will be set in CreateOffer or create_answer.
    pub fn mid(&self) -> Option<SmolStr> {
        self.mid.get().cloned()
    }

    /// kind returns RTPTransceiver's kind.
    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// direction returns the RTPTransceiver's current direction
    pub fn direction(&self) -> RTCRtpTransceiverDirection {
        self.direction.load(Ordering::SeqCst).into()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn set_direction_internal(&self, d: RTCRtpTransceiverDirection) -> bool {
        let previous: RTCRtpTransceiverDirection =
            self.direction.swap(d as u8, Ordering::SeqCst).into();

        let changed = d != previous;

        if changed {
            trace!(
                "Changing direction of transceiver from {} to {}",
                previous,
                d
            );
        }

        changed
    }

    /// stop irreversibly stops the RTPTransceiver
    pub async fn stop(&self) -> Result<()> {
        let _binding = self.binding.lock().await;

        if self.is_stopped() {
            return Ok(());
        }

        if let Some(sender) = self.sender() {
            sender.stop().await?;
        }
        if let Some(receiver) = self.receiver() {
            receiver.stop().await?;
        }

        self.stopped.store(true, Ordering::SeqCst);
        self.set_direction_internal(RTCRtpTransceiverDirection::Inactive);

        Ok(())
    }

    /// set_sending_track binds `track` to the sender and moves the direction to
    /// the one implied by whether a track is now bound.
    pub async fn set_sending_track(&self, track: Option<Arc<Track>>) -> Result<()> {
        let _binding = self.binding.lock().await;
        self.set_sending_track_internal(track).await
    }

    async fn set_sending_track_internal(&self, track: Option<Arc<Track>>) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::ErrRTPTransceiverStopped);
        }

        let direction = self.direction();
        let has_track = track.is_some();
        let next = direction.next_for_sending_track(has_track).ok_or(
            Error::ErrRTPTransceiverSetSendingInvalidState {
                direction,
                has_track,
            },
        )?;

        match self.sender() {
            Some(sender) => sender.bind(track).await?,
            None if has_track => return Err(Error::ErrRTPTransceiverNoSender),
            None => {}
        }

        self.set_direction_internal(next);

        Ok(())
    }

    /// replace_track swaps the outbound source of this transceiver without renegotiation.
    ///
    /// A track of another kind, a stopped transceiver or a codec change of a live
    /// binding are rejected and leave the binding untouched. Replacing while not
    /// sending, or with None, goes through the direction table.
    pub async fn replace_track(&self, track: Option<Arc<Track>>) -> Result<()> {
        if let Some(t) = &track {
            if t.kind() != self.kind {
                return Err(Error::ErrRTPSenderNewTrackHasIncorrectKind {
                    track: t.kind(),
                    transceiver: self.kind,
                });
            }
        }

        let _binding = self.binding.lock().await;

        if self.is_stopped() {
            return Err(Error::ErrRTPTransceiverStopped);
        }

        if !self.direction().has_send() {
            return self.set_sending_track_internal(track).await;
        }

        match track {
            None => self.set_sending_track_internal(None).await,
            Some(t) => {
                let sender = self.sender().ok_or(Error::ErrRTPTransceiverNoSender)?;
                sender.swap_track(t).await
            }
        }
    }
}

impl fmt::Debug for RTCRtpTransceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTCRtpTransceiver")
            .field("mid", &self.mid)
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .field("direction", &self.direction())
            .field("stopped", &self.stopped)
            .field("kind", &self.kind)
            .finish()
    }
}

/// find_by_mid plucks the transceiver negotiated under `mid` from the passed list.
/// A transceiver of another kind is left where it is, a mid never changes kind.
pub(crate) fn find_by_mid(
    mid: &str,
    kind: RTPCodecType,
    local_transceivers: &mut Vec<Arc<RTCRtpTransceiver>>,
) -> Option<Arc<RTCRtpTransceiver>> {
    let i = local_transceivers
        .iter()
        .position(|t| t.mid() == Some(SmolStr::from(mid)))?;
    if local_transceivers[i].kind() != kind {
        return None;
    }

    Some(local_transceivers.remove(i))
}

/// Given a direction+type pluck a transceiver from the passed list
/// if no entry satisfies the requested type+direction return a inactive Transceiver
pub async fn satisfy_type_and_direction(
    remote_kind: RTPCodecType,
    remote_direction: RTCRtpTransceiverDirection,
    local_transceivers: &mut Vec<Arc<RTCRtpTransceiver>>,
) -> Arc<RTCRtpTransceiver> {
    for possible_direction in remote_direction.preferred_local_directions() {
        for (i, t) in local_transceivers.iter().enumerate() {
            if t.kind == remote_kind && *possible_direction == t.direction() {
                return local_transceivers.remove(i);
            }
        }
    }

    RTCRtpTransceiver::new(
        remote_kind,
        RTCRtpTransceiverDirection::Inactive,
        None,
        None,
    )
    .await
}

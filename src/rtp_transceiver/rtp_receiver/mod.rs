
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use portable_atomic::AtomicBool;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::track::Track;

/// RTPReceiver allows an application to inspect the receipt of a Track
pub struct RTCRtpReceiver {
    kind: RTPCodecType,
    track: ArcSwapOption<Track>,

    received: AtomicBool,
    stopped: AtomicBool,
    stop_called: Notify,
}

impl std::fmt::Debug for RTCRtpReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCRtpReceiver")
            .field("kind", &self.kind)
            .field("track", &self.track)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl RTCRtpReceiver {
    pub fn new(kind: RTPCodecType) -> Self {
        RTCRtpReceiver {
            kind,
            track: ArcSwapOption::empty(),
            received: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_called: Notify::new(),
        }
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    /// track returns the remote track bound to this receiver, if any
    pub fn track(&self) -> Option<Arc<Track>> {
        self.track.load_full()
    }

    pub(crate) fn has_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// receive binds the inbound track. It can only be called once.
    pub fn receive(&self, track: Arc<Track>) -> Result<()> {
        if self.has_stopped() {
            return Err(Error::ErrRTPReceiverStopped);
        }
        if !track.is_remote() {
            return Err(Error::ErrTrackIsNotRemote);
        }
        if track.kind() != self.kind {
            return Err(Error::ErrRTPReceiverIncorrectTrackKind {
                track: track.kind(),
                receiver: self.kind,
            });
        }
        if self.received.swap(true, Ordering::SeqCst) {
            return Err(Error::ErrRTPReceiverReceiveAlreadyCalled);
        }

        self.track.store(Some(track));

        Ok(())
    }

    /// read_rtp reads the next packet of the bound track. Once the receiver is stopped
    /// every read, including one already blocked, fails with ErrTrackRemoteClosed.
    pub async fn read_rtp(&self) -> Result<rtp::packet::Packet> {
        let notified = self.stop_called.notified();
        if self.has_stopped() {
            return Err(Error::ErrTrackRemoteClosed);
        }
        let track = self.track().ok_or(Error::ErrTrackRemoteClosed)?;

        tokio::select! {
            _ = notified => Err(Error::ErrTrackRemoteClosed),
            result = track.read_rtp() => result,
        }
    }

    /// stop irreversibly stops the RTPReceiver
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_called.notify_waiters();

        Ok(())
    }
}


use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use log::debug;
use portable_atomic::AtomicBool;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::{RTCRtpTransceiver, SSRC};
use crate::track::{Track, TrackBinding, TrackLocalWriter};

/// RTPSender allows an application to control how a given Track is encoded and transmitted to a remote peer
pub struct RTCRtpSender {
    pub(crate) id: String,
    kind: RTPCodecType,

    /// ssrc of the RTP stream negotiated for this sender. It stays the same
    /// when the bound track is replaced.
    ssrc: SSRC,

    /// Exclusive region of the sender. Held while the binding is changed.
    pub(crate) track: Mutex<Option<Arc<Track>>>,
    write_stream: Mutex<Option<Arc<dyn TrackLocalWriter + Send + Sync>>>,

    rtp_transceiver: Mutex<Option<Weak<RTCRtpTransceiver>>>,

    stopped: AtomicBool,
}

impl std::fmt::Debug for RTCRtpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTCRtpSender")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("ssrc", &self.ssrc)
            .finish()
    }
}

impl RTCRtpSender {
    pub fn new(
        kind: RTPCodecType,
        ssrc: SSRC,
        write_stream: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,
    ) -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        RTCRtpSender {
            id,
            kind,
            ssrc,
            track: Mutex::new(None),
            write_stream: Mutex::new(write_stream),
            rtp_transceiver: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn kind(&self) -> RTPCodecType {
        self.kind
    }

    pub fn ssrc(&self) -> SSRC {
        self.ssrc
    }

    /// track returns the Track currently bound to this sender, if any
    pub async fn track(&self) -> Option<Arc<Track>> {
        let track = self.track.lock().await;
        track.clone()
    }

    pub(crate) async fn set_rtp_transceiver(
        &self,
        rtp_transceiver: Option<Weak<RTCRtpTransceiver>>,
    ) {
        let mut tr = self.rtp_transceiver.lock().await;
        *tr = rtp_transceiver;
    }

    /// transceiver returns the transceiver this sender is installed on. The association
    /// is non-owning, so a dropped transceiver yields None.
    pub async fn transceiver(&self) -> Option<Arc<RTCRtpTransceiver>> {
        let tr = self.rtp_transceiver.lock().await;
        tr.as_ref().and_then(|t| t.upgrade())
    }

    pub(crate) fn has_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn binding(&self) -> TrackBinding {
        let write_stream = self.write_stream.lock().await;
        TrackBinding {
            sender_id: self.id.clone(),
            write_stream: write_stream.clone(),
        }
    }

    /// set_write_stream attaches the outbound RTP writer, e.g. once the transport is up.
    /// The currently bound track starts writing through it right away.
    pub async fn set_write_stream(
        &self,
        write_stream: Option<Arc<dyn TrackLocalWriter + Send + Sync>>,
    ) {
        let track = self.track.lock().await;
        {
            let mut ws = self.write_stream.lock().await;
            *ws = write_stream.clone();
        }

        if let Some(t) = &*track {
            let mut senders = t.senders.lock().await;
            if let Some(b) = senders
                .active_senders
                .iter_mut()
                .find(|b| b.sender_id == self.id)
            {
                b.write_stream = write_stream;
            }
        }
    }

    /// replace_track replaces the track currently being used as the sender's source with a new Track.
    /// The new track must be of the same media kind (audio, video, etc) and switching the track should not
    /// require negotiation.
    pub async fn replace_track(&self, track: Option<Arc<Track>>) -> Result<()> {
        let t = self
            .transceiver()
            .await
            .ok_or(Error::ErrRTPSenderNoTransceiver)?;
        t.replace_track(track).await
    }

    /// bind sets the sender's bound track outside of a live swap. The old track's
    /// active-sender set loses this sender and the new one gains it; the two
    /// tracks are never locked at the same time.
    pub(crate) async fn bind(&self, track: Option<Arc<Track>>) -> Result<()> {
        if let Some(t) = &track {
            if t.is_remote() {
                return Err(Error::ErrRTPSenderCannotReplaceWithRemoteTrack);
            }
            if self.has_stopped() {
                return Err(Error::ErrRTPSenderStopped);
            }
        }

        // set_write_stream swaps the writer under the track lock
        let mut current = self.track.lock().await;
        let binding = self.binding().await;

        if let Some(old) = &*current {
            let mut senders = old.senders.lock().await;
            senders.remove(&self.id);
        }
        if let Some(new) = &track {
            let mut senders = new.senders.lock().await;
            senders.add(binding);
        }

        *current = track;

        Ok(())
    }

    /// swap_track moves a live binding from the current track to `track`.
    ///
    /// Both active-sender sets change inside one critical section: the sender is locked
    /// first, then the two tracks in ascending tid order so that two swaps crossing
    /// the same pair of tracks in opposite directions cannot deadlock.
    pub(crate) async fn swap_track(&self, track: Arc<Track>) -> Result<()> {
        if track.is_remote() {
            return Err(Error::ErrRTPSenderCannotReplaceWithRemoteTrack);
        }
        if self.has_stopped() {
            return Err(Error::ErrRTPSenderStopped);
        }

        let mut current = self.track.lock().await;
        let binding = self.binding().await;

        let old = match &*current {
            Some(old) if Arc::ptr_eq(old, &track) => return Ok(()),
            Some(old) => Arc::clone(old),
            None => {
                let mut senders = track.senders.lock().await;
                senders.add(binding);
                drop(senders);

                *current = Some(track);
                return Ok(());
            }
        };

        if !old.codec().same_mime_type(track.codec()) {
            return Err(Error::ErrRTPSenderRenegotiationRequired {
                current: old.codec().mime_type.clone(),
                new: track.codec().mime_type.clone(),
            });
        }

        let (mut old_senders, mut new_senders) = if old.tid() < track.tid() {
            let o = old.senders.lock().await;
            let n = track.senders.lock().await;
            (o, n)
        } else {
            let n = track.senders.lock().await;
            let o = old.senders.lock().await;
            (o, n)
        };

        old_senders.remove(&self.id);
        new_senders.add(binding);

        debug!(
            "sender {} moved from track {} to track {}",
            self.id,
            old.id(),
            track.id()
        );

        drop(new_senders);
        drop(old_senders);
        *current = Some(track);

        Ok(())
    }

    /// stop irreversibly stops the RTPSender and unbinds it from its track
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.bind(None).await
    }
}

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use portable_atomic::AtomicUsize;
use tokio::sync::oneshot;

use super::feedback::run_pli_pacer;
use super::{spawn_worker, RTCPWriter, RelayConfig, TrackWorkers};
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::SSRC;
use crate::track::Track;

/// EchoRelay sends every inbound track back to the peer on its own outbound track.
///
/// The n-th inbound track started is routed to the n-th output. Every forwarded
/// packet carries `wire_ssrc`, the SSRC of the stream the sender negotiated, so a
/// source switched with replace_track stays on the same RTP stream at the peer.
pub struct EchoRelay {
    config: RelayConfig,
    rtcp_writer: Arc<dyn RTCPWriter + Send + Sync>,
    outputs: Vec<Arc<Track>>,
    wire_ssrc: SSRC,
    next_output: AtomicUsize,
}

impl EchoRelay {
    pub fn new(
        config: RelayConfig,
        rtcp_writer: Arc<dyn RTCPWriter + Send + Sync>,
        outputs: Vec<Arc<Track>>,
        wire_ssrc: SSRC,
    ) -> Result<Self> {
        if outputs.is_empty() {
            return Err(Error::ErrRelayNoOutputTrack);
        }

        Ok(EchoRelay {
            config,
            rtcp_writer,
            outputs,
            wire_ssrc,
            next_output: AtomicUsize::new(0),
        })
    }

    /// start_track spawns the pacer and the pump for a newly started inbound track.
    pub fn start_track(&self, receiver: Arc<RTCRtpReceiver>) -> Result<TrackWorkers> {
        let inbound = receiver.track().ok_or(Error::ErrTrackRemoteClosed)?;

        let n = self.next_output.fetch_add(1, Ordering::SeqCst);
        let output = match self.outputs.get(n) {
            Some(output) => Arc::clone(output),
            None => {
                self.next_output.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::ErrRelayNoOutputTrack);
            }
        };

        info!(
            "Track has started, of type {}: {} routed to {}",
            inbound.payload_type(),
            inbound.codec().mime_type,
            output.id()
        );

        let ssrc = inbound.ssrc();
        let pacer = spawn_worker(
            "pli pacer",
            ssrc,
            run_pli_pacer(Arc::clone(&self.rtcp_writer), ssrc, self.config.pli_interval),
        );
        let pump = spawn_worker("echo", ssrc, echo_pump(receiver, output, self.wire_ssrc));

        Ok(TrackWorkers { pump, pacer })
    }
}

/// echo_pump forwards inbound packets unchanged except for their SSRC.
///
/// A read error ends the pump and is returned. Writes that find no consumer
/// are skipped, any other write error is returned.
pub async fn echo_pump(
    receiver: Arc<RTCRtpReceiver>,
    output: Arc<Track>,
    wire_ssrc: SSRC,
) -> Result<()> {
    loop {
        let mut pkt = receiver.read_rtp().await?;

        pkt.header.ssrc = wire_ssrc;

        if let Err(err) = output.write_rtp(&pkt).await {
            if err.is_closed_pipe() {
                debug!("dropped packet {}: {err}", pkt.header.sequence_number);
                continue;
            }
            return Err(err);
        }
    }
}

/// rotate_tracks waits for `connected`, then binds the next of `tracks` to `sender`
/// every `period`, starting with the second one.
pub async fn rotate_tracks(
    sender: Arc<RTCRtpSender>,
    tracks: Vec<Arc<Track>>,
    connected: oneshot::Receiver<()>,
    period: Duration,
) -> Result<()> {
    if tracks.is_empty() {
        return Err(Error::ErrRelayNoOutputTrack);
    }

    debug!("Waiting for connection");
    if connected.await.is_err() {
        debug!("connection never established, not rotating tracks");
        return Ok(());
    }

    let mut curr = 1 % tracks.len();
    loop {
        tokio::time::sleep(period).await;

        let track = &tracks[curr];
        info!("Switching to track {}", track.id());
        sender.replace_track(Some(Arc::clone(track))).await?;

        curr = (curr + 1) % tracks.len();
    }
}

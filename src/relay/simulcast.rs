use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, info, trace};
use portable_atomic::AtomicU8;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::feedback::{picture_loss_indication, run_bitrate_pacer, send_feedback};
use super::{spawn_worker, RTCPWriter, RelayConfig, TrackWorkers};
use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::track::Track;

/// StreamSelection is the control message choosing the forwarded simulcast layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSelection {
    pub rid: String,
}

/// StreamSelector holds the id of the forwarded simulcast layer.
///
/// It is read by every pump without further synchronization, so a few packets
/// may still be routed by the previous id right after a switch.
#[derive(Debug, Clone)]
pub struct StreamSelector {
    current: Arc<AtomicU8>,
}

impl StreamSelector {
    pub fn new(initial: u8) -> Self {
        StreamSelector {
            current: Arc::new(AtomicU8::new(initial)),
        }
    }

    pub fn get(&self) -> u8 {
        self.current.load(Ordering::SeqCst)
    }

    /// select makes the first character of `rid` the forwarded stream id.
    pub fn select(&self, rid: &str) -> Result<u8> {
        let id = match rid.as_bytes().first() {
            Some(&b) if b.is_ascii_alphanumeric() => b,
            _ => return Err(Error::ErrStreamSelectionInvalid(rid.to_owned())),
        };

        info!("Changing stream to {rid:?}");
        self.current.store(id, Ordering::SeqCst);

        Ok(id)
    }

    /// handle_message applies a JSON encoded [`StreamSelection`].
    pub fn handle_message(&self, data: &[u8]) -> Result<u8> {
        let selection: StreamSelection = serde_json::from_slice(data)?;
        self.select(&selection.rid)
    }
}

impl Default for StreamSelector {
    fn default() -> Self {
        StreamSelector::new(b'a')
    }
}

/// SimulcastRelay recombines the layers of one simulcast video section into a
/// single outbound track, forwarding only the selected layer.
pub struct SimulcastRelay {
    config: RelayConfig,
    rtcp_writer: Arc<dyn RTCPWriter + Send + Sync>,
    output: Arc<Track>,
    rid_extension_id: u8,
    selector: StreamSelector,
    packets_tx: mpsc::Sender<rtp::packet::Packet>,
}

impl SimulcastRelay {
    /// new creates the relay and spawns its consumer. The consumer ends once the
    /// relay and every pump are gone, or on the first fatal write error.
    pub fn new(
        config: RelayConfig,
        rtcp_writer: Arc<dyn RTCPWriter + Send + Sync>,
        output: Arc<Track>,
        rid_extension_id: u8,
    ) -> (Self, JoinHandle<Result<()>>) {
        let (packets_tx, packets_rx) = mpsc::channel(config.packet_queue_capacity);

        let consumer = spawn_worker(
            "simulcast consumer",
            output.ssrc(),
            simulcast_consumer(packets_rx, Arc::clone(&output), rand::random::<u16>()),
        );

        (
            SimulcastRelay {
                config,
                rtcp_writer,
                output,
                rid_extension_id,
                selector: StreamSelector::default(),
                packets_tx,
            },
            consumer,
        )
    }

    pub fn selector(&self) -> StreamSelector {
        self.selector.clone()
    }

    /// start_track spawns the bitrate pacer and the pump of one inbound layer.
    pub fn start_track(&self, receiver: Arc<RTCRtpReceiver>) -> Result<TrackWorkers> {
        let inbound = receiver.track().ok_or(Error::ErrTrackRemoteClosed)?;
        let ssrc = inbound.ssrc();

        info!(
            "Track has started, of type {}: {} rid {:?}",
            inbound.payload_type(),
            inbound.codec().mime_type,
            inbound.rid()
        );

        let pacer = spawn_worker(
            "bitrate pacer",
            ssrc,
            run_bitrate_pacer(
                Arc::clone(&self.rtcp_writer),
                self.output.ssrc(),
                ssrc,
                self.config.max_bitrate,
                self.config.pli_interval,
            ),
        );
        let pump = spawn_worker(
            "simulcast",
            ssrc,
            simulcast_pump(
                receiver,
                self.rid_extension_id,
                self.selector.clone(),
                Arc::clone(&self.rtcp_writer),
                self.packets_tx.clone(),
            ),
        );

        Ok(TrackWorkers { pump, pacer })
    }
}

/// simulcast_pump filters one inbound layer by stream id and queues its packets.
///
/// Queued packets carry in their timestamp field the delta to the previous packet
/// of this layer, 0 for the first one. A packet without a stream id is fatal.
pub async fn simulcast_pump(
    receiver: Arc<RTCRtpReceiver>,
    rid_extension_id: u8,
    selector: StreamSelector,
    rtcp_writer: Arc<dyn RTCPWriter + Send + Sync>,
    packets: mpsc::Sender<rtp::packet::Packet>,
) -> Result<()> {
    let media_ssrc = receiver
        .track()
        .map(|t| t.ssrc())
        .ok_or(Error::ErrTrackRemoteClosed)?;

    let mut last_timestamp: Option<u32> = None;
    let mut is_current = false;

    loop {
        let mut pkt = receiver.read_rtp().await?;

        let timestamp = pkt.header.timestamp;
        pkt.header.timestamp = match last_timestamp {
            Some(last) => timestamp.wrapping_sub(last),
            None => 0,
        };
        last_timestamp = Some(timestamp);

        let rid = match pkt.header.get_extension(rid_extension_id) {
            Some(payload) if !payload.is_empty() => payload[0],
            _ => return Err(Error::ErrRtpStreamIdMissing(rid_extension_id)),
        };

        if rid != selector.get() {
            is_current = false;
            continue;
        }
        if !is_current {
            is_current = true;
            debug!("stream {} on ssrc {media_ssrc} is now forwarded", rid as char);
            send_feedback(&rtcp_writer, &[picture_loss_indication(media_ssrc)]).await;
        }

        packets.send(pkt).await?;
    }
}

/// simulcast_consumer writes queued packets to `output` as one continuous stream.
///
/// Timestamps are rebuilt by summing the queued deltas, sequence numbers count up
/// from `initial_sequence` and header extensions are removed.
pub async fn simulcast_consumer(
    mut packets: mpsc::Receiver<rtp::packet::Packet>,
    output: Arc<Track>,
    initial_sequence: u16,
) -> Result<()> {
    let mut timestamp: u32 = 0;
    let mut sequence_number = initial_sequence;

    while let Some(mut pkt) = packets.recv().await {
        timestamp = timestamp.wrapping_add(pkt.header.timestamp);

        pkt.header.timestamp = timestamp;
        pkt.header.sequence_number = sequence_number;
        pkt.header.ssrc = output.ssrc();
        pkt.header.extension = false;
        pkt.header.extension_profile = 0;
        pkt.header.extensions.clear();

        sequence_number = sequence_number.wrapping_add(1);

        if let Err(err) = output.write_rtp(&pkt).await {
            if !err.is_closed_pipe() {
                return Err(err);
            }
            trace!("dropped packet {}: {err}", pkt.header.sequence_number);
        }
    }

    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use super::RTCPWriter;
use crate::error::Result;
use crate::rtp_transceiver::SSRC;

pub fn picture_loss_indication(media_ssrc: SSRC) -> Box<dyn rtcp::packet::Packet + Send + Sync> {
    Box::new(PictureLossIndication {
        sender_ssrc: 0,
        media_ssrc,
    })
}

pub fn receiver_estimated_maximum_bitrate(
    sender_ssrc: SSRC,
    bitrate: u64,
    ssrcs: Vec<SSRC>,
) -> Box<dyn rtcp::packet::Packet + Send + Sync> {
    Box::new(ReceiverEstimatedMaximumBitrate {
        sender_ssrc,
        bitrate: bitrate as f32,
        ssrcs,
    })
}

/// send_feedback writes `pkts`. A failed send is only logged.
pub async fn send_feedback(
    writer: &Arc<dyn RTCPWriter + Send + Sync>,
    pkts: &[Box<dyn rtcp::packet::Packet + Send + Sync>],
) {
    if let Err(err) = writer.write_rtcp(pkts).await {
        warn!("failed to send feedback: {err}");
    }
}

/// run_pli_pacer sends a picture loss indication for `media_ssrc` every `period`,
/// the first one after one full period.
pub async fn run_pli_pacer(
    writer: Arc<dyn RTCPWriter + Send + Sync>,
    media_ssrc: SSRC,
    period: Duration,
) -> Result<()> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        send_feedback(&writer, &[picture_loss_indication(media_ssrc)]).await;
    }
}

/// run_bitrate_pacer sends a bitrate hint paired with a picture loss indication for
/// `media_ssrc`, right away and then every `period`.
pub async fn run_bitrate_pacer(
    writer: Arc<dyn RTCPWriter + Send + Sync>,
    sender_ssrc: SSRC,
    media_ssrc: SSRC,
    bitrate: u64,
    period: Duration,
) -> Result<()> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        send_feedback(
            &writer,
            &[
                receiver_estimated_maximum_bitrate(sender_ssrc, bitrate, vec![media_ssrc]),
                picture_loss_indication(media_ssrc),
            ],
        )
        .await;
    }
}

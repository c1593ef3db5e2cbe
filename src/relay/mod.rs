
pub mod echo;
pub mod feedback;
pub mod simulcast;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::rtp_transceiver::SSRC;

pub use echo::{rotate_tracks, EchoRelay};
pub use simulcast::{SimulcastRelay, StreamSelection, StreamSelector};

/// RTCPWriter delivers feedback packets to the remote peer.
#[async_trait]
pub trait RTCPWriter {
    async fn write_rtcp(
        &self,
        pkts: &[Box<dyn rtcp::packet::Packet + Send + Sync>],
    ) -> Result<usize>;
}

/// RelayConfig holds the timing and sizing knobs of the relay workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// pli_interval is the period of the picture loss indication pacer.
    pub pli_interval: Duration,

    /// rotation_interval is how long each source stays bound while rotating tracks.
    pub rotation_interval: Duration,

    /// max_bitrate is the bitrate, in bits per second, advertised to a simulcast sender.
    pub max_bitrate: u64,

    /// packet_queue_capacity bounds the queue between the simulcast pumps and the consumer.
    pub packet_queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            pli_interval: Duration::from_secs(3),
            rotation_interval: Duration::from_secs(10),
            max_bitrate: 5_000_000,
            packet_queue_capacity: 60,
        }
    }
}

/// TrackWorkers are the tasks relaying one inbound track.
///
/// The pump ends on the first unrecoverable error and reports it through `join`.
/// The pacer runs until it is aborted.
#[derive(Debug)]
pub struct TrackWorkers {
    pub(crate) pump: JoinHandle<Result<()>>,
    pub(crate) pacer: JoinHandle<Result<()>>,
}

impl TrackWorkers {
    /// join waits for the pump to exit, stops the pacer and returns the pump's result.
    pub async fn join(self) -> Result<()> {
        let result = self.pump.await;
        self.pacer.abort();
        result.map_err(|err| Error::new(err.to_string()))?
    }

    /// abort stops both workers.
    pub fn abort(&self) {
        self.pump.abort();
        self.pacer.abort();
    }
}

/// spawn_worker runs a relay worker and logs how it ended.
pub(crate) fn spawn_worker<F>(name: &'static str, ssrc: SSRC, f: F) -> JoinHandle<Result<()>>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = f.await;
        match &result {
            Ok(()) => debug!("{name} worker for ssrc {ssrc} finished"),
            Err(Error::ErrTrackRemoteClosed) => {
                debug!("{name} worker for ssrc {ssrc} finished: inbound stream closed")
            }
            Err(err) => error!("{name} worker for ssrc {ssrc} failed: {err}"),
        }
        result
    })
}

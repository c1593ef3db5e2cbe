use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use super::TrackRemoteReader;
use crate::error::{Error, Result};

/// TrackRemoteChannel is a [`TrackRemoteReader`] fed through a bounded channel.
///
/// The transport pushes raw (already decrypted) RTP packets into the sender half.
/// Dropping every sender closes the stream and makes the next read fail with
/// [`Error::ErrTrackRemoteClosed`].
#[derive(Debug)]
pub struct TrackRemoteChannel {
    rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl TrackRemoteChannel {
    pub fn new(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, TrackRemoteChannel { rx: Mutex::new(rx) })
    }
}

#[async_trait]
impl TrackRemoteReader for TrackRemoteChannel {
    async fn read(&self, b: &mut [u8]) -> Result<usize> {
        let mut rx = self.rx.lock().await;
        let raw = rx.recv().await.ok_or(Error::ErrTrackRemoteClosed)?;
        if raw.len() > b.len() {
            return Err(Error::ErrShortBuffer {
                size: raw.len(),
                capacity: b.len(),
            });
        }
        b[..raw.len()].copy_from_slice(&raw);
        Ok(raw.len())
    }
}

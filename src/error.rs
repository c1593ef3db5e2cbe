use std::num::ParseIntError;

use thiserror::Error;
use tokio::sync::mpsc::error::SendError as MpscSendError;

use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// ErrClosedPipe indicates a write against a track that has no attached consumer.
    /// Relay workers treat it as transient.
    #[error("no consumer attached to track")]
    ErrClosedPipe,

    /// ErrTrackRemoteClosed indicates the inbound stream behind a remote track is gone.
    #[error("remote track has been closed")]
    ErrTrackRemoteClosed,

    #[error("track is kind {track}, transceiver kind is {transceiver}")]
    ErrRTPSenderNewTrackHasIncorrectKind {
        track: RTPCodecType,
        transceiver: RTPCodecType,
    },
    #[error("transceiver is stopped")]
    ErrRTPTransceiverStopped,
    #[error("invalid state change in RTPTransceiver.setSending: {direction} with track present = {has_track}")]
    ErrRTPTransceiverSetSendingInvalidState {
        direction: RTCRtpTransceiverDirection,
        has_track: bool,
    },
    #[error("replacement would require renegotiation, current track type {current}, new track type is {new}")]
    ErrRTPSenderRenegotiationRequired { current: String, new: String },
    #[error("cannot replace with remote track")]
    ErrRTPSenderCannotReplaceWithRemoteTrack,
    #[error("Sender has already been stopped")]
    ErrRTPSenderStopped,
    #[error("transceiver has no sender")]
    ErrRTPTransceiverNoSender,
    #[error("sender is not installed on a transceiver")]
    ErrRTPSenderNoTransceiver,
    #[error("mid has already been set on this transceiver")]
    ErrRTPTransceiverCannotChangeMid,
    #[error("Receiver has already been stopped")]
    ErrRTPReceiverStopped,
    #[error("Receive has already been called")]
    ErrRTPReceiverReceiveAlreadyCalled,
    #[error("track is kind {track}, receiver kind is {receiver}")]
    ErrRTPReceiverIncorrectTrackKind {
        track: RTPCodecType,
        receiver: RTPCodecType,
    },
    #[error("a remote track can only be received from, not bound as a sending source")]
    ErrTrackIsNotLocal,
    #[error("a local track cannot be installed on a receiver")]
    ErrTrackIsNotRemote,
    #[error("connection closed")]
    ErrConnectionClosed,
    #[error("add_transceiver_from_kind currently only supports recvonly")]
    ErrAddTransceiverFromKindSupport,

    #[error("offer contained no video codecs")]
    ErrOfferNoVideoCodecs,
    #[error("found no video descriptions in offer")]
    ErrOfferNoVideoDescription,
    #[error("found multiple video descriptions in offer")]
    ErrOfferMultipleVideoDescriptions,
    #[error("unable to find RTP stream ID extension in offer")]
    ErrOfferMissingRtpStreamIdExtension,
    #[error("duplicate mid {0} in session description")]
    ErrSDPDuplicateMid(String),
    #[error("expected RTP stream ID in extension {0}, did not get")]
    ErrRtpStreamIdMissing(u8),

    #[error("invalid stream selection: {0}")]
    ErrStreamSelectionInvalid(String),
    #[error("relay needs at least one output track")]
    ErrRelayNoOutputTrack,
    #[error("packet of {size} bytes does not fit in a {capacity} byte buffer")]
    ErrShortBuffer { size: usize, capacity: usize },

    #[error("{0}")]
    Util(#[from] util::Error),
    #[error("{0}")]
    Sdp(#[from] sdp::Error),
    #[error("{0}")]
    Rtcp(#[from] rtcp::Error),
    #[error("{0}")]
    Rtp(#[from] rtp::Error),

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("json: {0}")]
    Json(String),
    #[error("mpsc send: {0}")]
    MpscSend(String),

    #[allow(non_camel_case_types)]
    #[error("{0}")]
    new(String),
}

impl Error {
    /// is_closed_pipe reports a write that found no attached consumer.
    pub fn is_closed_pipe(&self) -> bool {
        matches!(self, Error::ErrClosedPipe)
    }

    /// is_protocol_violation reports malformed or missing negotiation input.
    /// These are fatal to session setup.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::ErrOfferNoVideoCodecs
                | Error::ErrOfferNoVideoDescription
                | Error::ErrOfferMultipleVideoDescriptions
                | Error::ErrOfferMissingRtpStreamIdExtension
                | Error::ErrSDPDuplicateMid(_)
                | Error::ErrRtpStreamIdMissing(_)
        )
    }
}

// Because Tokio SendError is parameterized, we sadly lose the backtrace.
impl<T> From<MpscSendError<T>> for Error {
    fn from(e: MpscSendError<T>) -> Self {
        Error::MpscSend(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::new(errs_strs.join("\n")))
    }
}

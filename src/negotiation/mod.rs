
pub mod sdp;

use std::collections::HashSet;
use std::sync::Arc;

use ::sdp::description::session::SessionDescription;
use log::trace;
use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::RTPCodecType;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{find_by_mid, satisfy_type_and_direction, RTCRtpTransceiver};

pub use self::sdp::{video_codecs_from_offer, SimulcastOffer};
use self::sdp::{get_mid_value, get_peer_direction, MEDIA_SECTION_APPLICATION};

/// MediaSection is the (kind, direction) pair of one remote media section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection {
    pub index: usize,
    pub mid: Option<SmolStr>,
    pub kind: RTPCodecType,
    pub direction: RTCRtpTransceiverDirection,
}

/// media_sections extracts the audio and video sections of a remote description in section order.
pub fn media_sections(desc: &SessionDescription) -> Result<Vec<MediaSection>> {
    let mut seen = HashSet::new();
    let mut sections = vec![];

    for (index, media) in desc.media_descriptions.iter().enumerate() {
        let mid = get_mid_value(media).map(|m| SmolStr::from(m.as_str()));
        if let Some(mid) = &mid {
            if !seen.insert(mid.clone()) {
                return Err(Error::ErrSDPDuplicateMid(mid.to_string()));
            }
        }

        if media.media_name.media == MEDIA_SECTION_APPLICATION {
            continue;
        }
        let kind = RTPCodecType::from(media.media_name.media.as_str());
        if kind == RTPCodecType::Unspecified {
            trace!("skipping media section {index} of kind {}", media.media_name.media);
            continue;
        }

        sections.push(MediaSection {
            index,
            mid,
            kind,
            direction: get_peer_direction(media),
        });
    }

    Ok(sections)
}

/// match_media_sections pairs every remote section with a local transceiver.
///
/// A transceiver already negotiated under the section's mid is reused; otherwise the
/// matcher picks one from `local_transceivers` or synthesizes an inactive one. Matched
/// transceivers are removed from `local_transceivers`, and adopt the section's mid
/// when they have none yet.
pub async fn match_media_sections(
    sections: &[MediaSection],
    local_transceivers: &mut Vec<Arc<RTCRtpTransceiver>>,
) -> Result<Vec<(MediaSection, Arc<RTCRtpTransceiver>)>> {
    let mut matched = vec![];

    for section in sections {
        let by_mid = match &section.mid {
            Some(mid) => find_by_mid(mid, section.kind, local_transceivers),
            None => None,
        };
        let t = match by_mid {
            Some(t) => t,
            None => {
                satisfy_type_and_direction(section.kind, section.direction, local_transceivers)
                    .await
            }
        };

        if let Some(mid) = &section.mid {
            if t.mid().is_none() {
                t.set_mid(mid.clone())?;
            }
        }

        trace!(
            "media section {} ({} {}) matched transceiver {:?} with direction {}",
            section.index,
            section.kind,
            section.direction,
            t.mid(),
            t.direction()
        );
        matched.push((section.clone(), t));
    }

    Ok(matched)
}

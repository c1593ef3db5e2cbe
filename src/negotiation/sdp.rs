use std::io::BufReader;

use sdp::description::common::Attribute;
use sdp::description::media::MediaDescription;
use sdp::description::session::{SessionDescription, ATTR_KEY_EXT_MAP};
use sdp::extmap::ExtMap;

use crate::error::{Error, Result};
use crate::rtp_transceiver::rtp_codec::{
    RTCPFeedback, RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::PayloadType;
use crate::{SDES_RTP_STREAM_ID_URI, SDP_ATTRIBUTE_RID, SDP_ATTRIBUTE_SIMULCAST};

pub(crate) const MEDIA_SECTION_APPLICATION: &str = "application";
const ATTR_KEY_RTPMAP: &str = "rtpmap";

pub(crate) fn get_mid_value(media: &MediaDescription) -> Option<&String> {
    for attr in &media.attributes {
        if attr.key == "mid" {
            return attr.value.as_ref();
        }
    }
    None
}

/// get_peer_direction returns the direction attribute of a media section.
/// A section without one is sendrecv (RFC 4566 section 6).
pub(crate) fn get_peer_direction(media: &MediaDescription) -> RTCRtpTransceiverDirection {
    for a in &media.attributes {
        let direction = RTCRtpTransceiverDirection::from(a.key.as_str());
        if direction != RTCRtpTransceiverDirection::Unspecified {
            return direction;
        }
    }
    RTCRtpTransceiverDirection::Sendrecv
}

pub(crate) fn codecs_from_media_description(
    m: &MediaDescription,
) -> Result<Vec<RTCRtpCodecParameters>> {
    let s = SessionDescription {
        media_descriptions: vec![m.clone()],
        ..Default::default()
    };

    let mut out = vec![];
    for payload_str in &m.media_name.formats {
        let payload_type: PayloadType = payload_str.parse::<u8>()?;
        let codec = match s.get_codec_for_payload_type(payload_type) {
            Ok(codec) => codec,
            Err(err) => {
                if payload_type == 0 {
                    continue;
                }
                return Err(err.into());
            }
        };

        let channels = codec.encoding_parameters.parse::<u16>().unwrap_or(0);

        let rtcp_feedback = codec
            .rtcp_feedback
            .iter()
            .map(|raw| match raw.split_once(' ') {
                Some((typ, parameter)) => RTCPFeedback {
                    typ: typ.to_owned(),
                    parameter: parameter.to_owned(),
                },
                None => RTCPFeedback {
                    typ: raw.to_owned(),
                    parameter: String::new(),
                },
            })
            .collect();

        out.push(RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: m.media_name.media.clone() + "/" + codec.name.as_str(),
                clock_rate: codec.clock_rate,
                channels,
                sdp_fmtp_line: codec.fmtp.clone(),
                rtcp_feedback,
            },
            payload_type,
        })
    }

    Ok(out)
}

/// video_codecs_from_offer lists the video codecs of every video section of an offer.
pub fn video_codecs_from_offer(offer: &SessionDescription) -> Result<Vec<RTCRtpCodecParameters>> {
    let mut codecs = vec![];
    for m in &offer.media_descriptions {
        if RTPCodecType::from(m.media_name.media.as_str()) != RTPCodecType::Video {
            continue;
        }
        for codec in codecs_from_media_description(m)? {
            if !codecs
                .iter()
                .any(|c: &RTCRtpCodecParameters| c.payload_type == codec.payload_type)
            {
                codecs.push(codec);
            }
        }
    }

    if codecs.is_empty() {
        return Err(Error::ErrOfferNoVideoCodecs);
    }

    Ok(codecs)
}

/// SimulcastOffer is the part of a simulcast offer the recombining relay depends on:
/// its single video section and the header extension carrying the RTP stream id.
#[derive(Debug, Clone)]
pub struct SimulcastOffer {
    pub video: MediaDescription,
    pub rid_extension: ExtMap,
}

impl SimulcastOffer {
    pub fn parse(offer: &SessionDescription) -> Result<Self> {
        let mut video = None;
        for m in &offer.media_descriptions {
            if RTPCodecType::from(m.media_name.media.as_str()) == RTPCodecType::Video {
                if video.is_some() {
                    return Err(Error::ErrOfferMultipleVideoDescriptions);
                }
                video = Some(m);
            }
        }
        let video = video.ok_or(Error::ErrOfferNoVideoDescription)?;

        let mut rid_extension = None;
        for a in &video.attributes {
            if a.key != ATTR_KEY_EXT_MAP {
                continue;
            }
            let a_str = a.to_string();
            let mut reader = BufReader::new(a_str.as_bytes());
            if let Ok(e) = ExtMap::unmarshal(&mut reader) {
                if e.uri.as_ref().map(|u| u.as_str()) == Some(SDES_RTP_STREAM_ID_URI) {
                    rid_extension = Some(e);
                    break;
                }
            }
        }
        let rid_extension = rid_extension.ok_or(Error::ErrOfferMissingRtpStreamIdExtension)?;

        Ok(SimulcastOffer {
            video: video.clone(),
            rid_extension,
        })
    }

    /// rid_extension_id is the header extension id stream ids are carried in.
    pub fn rid_extension_id(&self) -> Result<u8> {
        u8::try_from(self.rid_extension.value)
            .map_err(|_| Error::ErrOfferMissingRtpStreamIdExtension)
    }

    /// apply_to_answer accepts the offered layers in the answer's video section: the
    /// stream id extension and every rid/simulcast attribute of the offer, with
    /// `send` turned into `recv`, are placed right after the first rtpmap.
    pub fn apply_to_answer(&self, answer: &mut SessionDescription) {
        let mut extra = vec![self.rid_extension.convert()];
        for a in &self.video.attributes {
            if a.key == SDP_ATTRIBUTE_RID || a.key == SDP_ATTRIBUTE_SIMULCAST {
                extra.push(Attribute::new(
                    a.key.clone(),
                    a.value.as_ref().map(|v| v.replace("send", "recv")),
                ));
            }
        }

        for m in &mut answer.media_descriptions {
            if RTPCodecType::from(m.media_name.media.as_str()) != RTPCodecType::Video {
                continue;
            }

            let at = m
                .attributes
                .iter()
                .position(|a| a.key == ATTR_KEY_RTPMAP)
                .map(|i| i + 1)
                .unwrap_or(m.attributes.len());
            m.attributes.splice(at..at, extra.iter().cloned());
        }
    }
}

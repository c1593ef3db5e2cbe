use super::*;
use crate::track::track_test::{local_track, remote_track};

async fn new_transceiver(
    kind: RTPCodecType,
    direction: RTCRtpTransceiverDirection,
) -> Arc<RTCRtpTransceiver> {
    let sender = Arc::new(RTCRtpSender::new(kind, rand::random::<u32>(), None));
    let receiver = Arc::new(RTCRtpReceiver::new(kind));
    RTCRtpTransceiver::new(kind, direction, Some(sender), Some(receiver)).await
}

async fn sender_track(t: &RTCRtpTransceiver) -> Option<Arc<Track>> {
    t.sender().expect("sender").track().await
}

#[tokio::test]
async fn test_rtp_transceiver_set_sending_track_table() -> Result<()> {
    use RTCRtpTransceiverDirection::*;

    // (start, bind a track, expected direction or None for invalid)
    let tests = vec![
        (Recvonly, true, Some(Sendrecv)),
        (Inactive, true, Some(Sendonly)),
        (Sendrecv, false, Some(Recvonly)),
        (Sendonly, false, Some(Inactive)),
        (Recvonly, false, None),
        (Inactive, false, None),
        (Sendrecv, true, None),
        (Sendonly, true, None),
    ];

    for (start, has_track, expected) in tests {
        let t = new_transceiver(RTPCodecType::Video, start).await;
        let bound = local_track(MIME_TYPE_VP8, 1, "bound");
        if start.has_send() {
            // reach the sending state with a real binding
            let pre = if start == Sendrecv { Recvonly } else { Inactive };
            t.set_direction_internal(pre);
            t.set_sending_track(Some(Arc::clone(&bound))).await?;
            assert_eq!(t.direction(), start);
        }

        let track = if has_track {
            Some(local_track(MIME_TYPE_VP8, 2, "next"))
        } else {
            None
        };
        let result = t.set_sending_track(track).await;

        match expected {
            Some(d) => {
                assert!(result.is_ok(), "{start} with track = {has_track}");
                assert_eq!(t.direction(), d, "{start} with track = {has_track}");
                assert_eq!(sender_track(&t).await.is_some(), has_track);
            }
            None => {
                assert_eq!(
                    result,
                    Err(Error::ErrRTPTransceiverSetSendingInvalidState {
                        direction: start,
                        has_track,
                    })
                );
                assert_eq!(t.direction(), start, "{start} with track = {has_track}");
                if start.has_send() {
                    assert!(Arc::ptr_eq(
                        &sender_track(&t).await.expect("still bound"),
                        &bound
                    ));
                }
            }
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_replace_track_sequence() -> Result<()> {
    use RTCRtpTransceiverDirection::*;

    let t = new_transceiver(RTPCodecType::Video, Recvonly).await;
    let a = local_track(MIME_TYPE_VP8, 1, "a");
    let b = local_track(MIME_TYPE_VP8, 2, "b");

    // not sending: goes through the direction table
    t.replace_track(Some(Arc::clone(&a))).await?;
    assert_eq!(t.direction(), Sendrecv);

    // live swap keeps the direction
    t.replace_track(Some(Arc::clone(&b))).await?;
    assert_eq!(t.direction(), Sendrecv);
    assert!(Arc::ptr_eq(&sender_track(&t).await.expect("bound"), &b));

    t.replace_track(None).await?;
    assert_eq!(t.direction(), Recvonly);
    assert_eq!(b.total_sender_count().await, 0);

    assert_eq!(
        t.replace_track(None).await,
        Err(Error::ErrRTPTransceiverSetSendingInvalidState {
            direction: Recvonly,
            has_track: false,
        })
    );
    assert_eq!(t.direction(), Recvonly);

    assert_eq!(t.kind(), RTPCodecType::Video);

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_replace_track_scenario_swap_same_codec() -> Result<()> {
    let t = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    let track_a = local_track(MIME_TYPE_VP8, 1, "a");
    let track_b = local_track(MIME_TYPE_VP8, 2, "b");
    t.set_sending_track(Some(Arc::clone(&track_a))).await?;
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Sendrecv);

    let sender_id = t.sender().expect("sender").id().to_owned();

    t.replace_track(Some(Arc::clone(&track_b))).await?;

    assert!(!track_a.active_senders().await.contains(&sender_id));
    assert_eq!(track_a.total_sender_count().await, 0);
    assert_eq!(track_b.active_senders().await, vec![sender_id]);
    assert_eq!(track_b.total_sender_count().await, 1);
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Sendrecv);

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_replace_track_scenario_codec_change() -> Result<()> {
    let t = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    let track_a = local_track(MIME_TYPE_VP8, 1, "a");
    let track_c = local_track(MIME_TYPE_H264, 3, "c");
    t.set_sending_track(Some(Arc::clone(&track_a))).await?;

    let sender_id = t.sender().expect("sender").id().to_owned();

    let result = t.replace_track(Some(Arc::clone(&track_c))).await;
    assert_eq!(
        result,
        Err(Error::ErrRTPSenderRenegotiationRequired {
            current: MIME_TYPE_VP8.to_owned(),
            new: MIME_TYPE_H264.to_owned(),
        })
    );

    assert_eq!(track_a.active_senders().await, vec![sender_id]);
    assert_eq!(track_a.total_sender_count().await, 1);
    assert!(track_c.active_senders().await.is_empty());
    assert_eq!(track_c.total_sender_count().await, 0);
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Sendrecv);

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_replace_track_kind_mismatch() -> Result<()> {
    let t = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    let audio = local_track(MIME_TYPE_OPUS, 1, "audio");

    assert_eq!(
        t.replace_track(Some(audio)).await,
        Err(Error::ErrRTPSenderNewTrackHasIncorrectKind {
            track: RTPCodecType::Audio,
            transceiver: RTPCodecType::Video,
        })
    );
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Recvonly);
    assert_eq!(t.kind(), RTPCodecType::Video);

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_replace_with_remote_track() -> Result<()> {
    let t = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    let a = local_track(MIME_TYPE_VP8, 1, "a");
    let (_tx, remote) = remote_track(RTPCodecType::Video, 77);

    // not sending
    assert_eq!(
        t.replace_track(Some(Arc::clone(&remote))).await,
        Err(Error::ErrRTPSenderCannotReplaceWithRemoteTrack)
    );
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Recvonly);

    // live swap
    t.replace_track(Some(Arc::clone(&a))).await?;
    assert_eq!(
        t.replace_track(Some(remote)).await,
        Err(Error::ErrRTPSenderCannotReplaceWithRemoteTrack)
    );
    assert!(Arc::ptr_eq(&sender_track(&t).await.expect("bound"), &a));
    assert_eq!(a.total_sender_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_stop() -> Result<()> {
    let t = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    let a = local_track(MIME_TYPE_VP8, 1, "a");
    t.set_sending_track(Some(Arc::clone(&a))).await?;

    t.stop().await?;
    assert!(t.is_stopped());
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Inactive);
    assert_eq!(a.total_sender_count().await, 0);
    assert!(t.receiver().expect("receiver").has_stopped());

    t.stop().await?;

    let b = local_track(MIME_TYPE_VP8, 2, "b");
    assert_eq!(
        t.replace_track(Some(Arc::clone(&b))).await,
        Err(Error::ErrRTPTransceiverStopped)
    );
    assert_eq!(
        t.set_sending_track(Some(b)).await,
        Err(Error::ErrRTPTransceiverStopped)
    );
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Inactive);

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_without_sender() -> Result<()> {
    let t = RTCRtpTransceiver::new(
        RTPCodecType::Audio,
        RTCRtpTransceiverDirection::Inactive,
        None,
        None,
    )
    .await;
    let track = local_track(MIME_TYPE_OPUS, 1, "audio");

    assert_eq!(
        t.set_sending_track(Some(track)).await,
        Err(Error::ErrRTPTransceiverNoSender)
    );
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Inactive);

    t.stop().await?;

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_set_sender_moves_backref() -> Result<()> {
    let t = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    let first = t.sender().expect("sender");
    assert!(Arc::ptr_eq(&first.transceiver().await.expect("backref"), &t));

    let second = Arc::new(RTCRtpSender::new(RTPCodecType::Video, 2, None));
    let track = local_track(MIME_TYPE_VP8, 1, "a");
    t.set_sender_track(Arc::clone(&second), Some(Arc::clone(&track)))
        .await?;

    assert!(first.transceiver().await.is_none());
    assert!(Arc::ptr_eq(&second.transceiver().await.expect("backref"), &t));
    assert_eq!(track.active_senders().await, vec![second.id().to_owned()]);

    // the sender routes replace_track through its transceiver
    let other = local_track(MIME_TYPE_VP8, 2, "b");
    second.replace_track(Some(Arc::clone(&other))).await?;
    assert_eq!(other.total_sender_count().await, 1);
    assert_eq!(t.direction(), RTCRtpTransceiverDirection::Sendrecv);

    Ok(())
}

#[tokio::test]
async fn test_rtp_transceiver_mid_set_once() -> Result<()> {
    let t = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    assert_eq!(t.mid(), None);

    t.set_mid(SmolStr::from("0"))?;
    assert_eq!(t.mid(), Some(SmolStr::from("0")));
    assert_eq!(
        t.set_mid(SmolStr::from("1")),
        Err(Error::ErrRTPTransceiverCannotChangeMid)
    );
    assert_eq!(t.mid(), Some(SmolStr::from("0")));

    Ok(())
}

#[tokio::test]
async fn test_find_by_mid() -> Result<()> {
    let t0 = new_transceiver(RTPCodecType::Audio, RTCRtpTransceiverDirection::Recvonly).await;
    let t1 = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    t0.set_mid(SmolStr::from("audio"))?;
    t1.set_mid(SmolStr::from("video"))?;

    let mut pool = vec![Arc::clone(&t0), Arc::clone(&t1)];
    assert!(find_by_mid("data", RTPCodecType::Video, &mut pool).is_none());
    assert_eq!(pool.len(), 2);

    // same mid, other kind: not taken and not moved
    assert!(find_by_mid("audio", RTPCodecType::Video, &mut pool).is_none());
    assert!(Arc::ptr_eq(&pool[0], &t0));
    assert!(Arc::ptr_eq(&pool[1], &t1));

    let found = find_by_mid("video", RTPCodecType::Video, &mut pool).expect("video");
    assert!(Arc::ptr_eq(&found, &t1));
    assert_eq!(pool.len(), 1);
    assert!(Arc::ptr_eq(&pool[0], &t0));

    Ok(())
}

#[tokio::test]
async fn test_satisfy_type_and_direction_takes_from_pool() {
    let t = new_transceiver(RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly).await;
    let mut pool = vec![Arc::clone(&t)];

    let found = satisfy_type_and_direction(
        RTPCodecType::Video,
        RTCRtpTransceiverDirection::Sendrecv,
        &mut pool,
    )
    .await;

    assert!(Arc::ptr_eq(&found, &t));
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_satisfy_type_and_direction_synthesizes_inactive() {
    let mut pool = vec![];

    let found = satisfy_type_and_direction(
        RTPCodecType::Audio,
        RTCRtpTransceiverDirection::Recvonly,
        &mut pool,
    )
    .await;

    assert_eq!(found.kind(), RTPCodecType::Audio);
    assert_eq!(found.direction(), RTCRtpTransceiverDirection::Inactive);
    assert!(found.sender().is_none());
    assert!(found.receiver().is_none());
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_satisfy_type_and_direction() {
    use RTCRtpTransceiverDirection::*;

    // (remote kind, remote direction, pool, expected pool index or None for synthesized)
    let tests = vec![
        (
            RTPCodecType::Video,
            Sendrecv,
            vec![(RTPCodecType::Video, Sendrecv), (RTPCodecType::Video, Recvonly)],
            Some(1),
        ),
        (
            RTPCodecType::Video,
            Sendonly,
            vec![(RTPCodecType::Video, Sendrecv)],
            Some(0),
        ),
        (
            RTPCodecType::Video,
            Recvonly,
            vec![(RTPCodecType::Video, Sendrecv), (RTPCodecType::Video, Sendonly)],
            Some(1),
        ),
        (
            RTPCodecType::Video,
            Recvonly,
            vec![(RTPCodecType::Video, Recvonly)],
            None,
        ),
        (
            RTPCodecType::Audio,
            Sendrecv,
            vec![(RTPCodecType::Video, Recvonly), (RTPCodecType::Audio, Recvonly)],
            Some(1),
        ),
        (
            RTPCodecType::Audio,
            Sendrecv,
            vec![(RTPCodecType::Audio, Recvonly), (RTPCodecType::Audio, Recvonly)],
            Some(0),
        ),
        (
            RTPCodecType::Video,
            Inactive,
            vec![(RTPCodecType::Video, Inactive)],
            None,
        ),
    ];

    for (kind, remote_direction, pool, expected) in tests {
        let mut local = vec![];
        for (k, d) in pool {
            local.push(new_transceiver(k, d).await);
        }
        let original = local.clone();

        let found = satisfy_type_and_direction(kind, remote_direction, &mut local).await;

        match expected {
            Some(i) => {
                assert!(Arc::ptr_eq(&found, &original[i]), "{kind} {remote_direction}");
                assert_eq!(local.len(), original.len() - 1);
                assert!(!local.iter().any(|t| Arc::ptr_eq(t, &found)));
            }
            None => {
                assert_eq!(found.kind(), kind);
                assert_eq!(found.direction(), Inactive);
                assert_eq!(local.len(), original.len());
                assert!(!original.iter().any(|t| Arc::ptr_eq(t, &found)));
            }
        }
    }
}

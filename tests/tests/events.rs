//! Integration tests for the event stream of an adaptive session.

use std::time::Duration;

use lyra_events::{AbrEvent, Event, EventBus, HlsEvent, StreamKind};
use lyra_hls::HlsConfig;
use rstest::rstest;

use crate::common::SessionHarness;

#[rstest]
#[tokio::test]
async fn upshift_emits_the_full_switch_story() {
    let bus = EventBus::new(32);
    let mut rx = bus.subscribe();
    let h = SessionHarness::new(
        HlsConfig::default()
            .with_start_bitrate(1_000_000)
            .with_events(bus.clone()),
    );
    h.session.start().unwrap();
    h.download(375_000, Duration::from_secs(1));
    h.segment_boundary();
    h.session.stop();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let hls: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Hls(e) => Some(e.clone()),
            Event::Abr(_) => None,
        })
        .collect();
    assert_eq!(
        hls,
        vec![
            HlsEvent::BitrateSwitchSuggested {
                from_bps: 1_000_000,
                to_bps: 2_000_000,
                last_measured_bps: 3_000_000,
            },
            HlsEvent::BitrateSwitchScheduled {
                stream: StreamKind::Video,
                from_bps: 1_000_000,
                to_bps: 2_000_000,
            },
            HlsEvent::BitrateSwitchScheduled {
                stream: StreamKind::Audio,
                from_bps: 1_000_000,
                to_bps: 2_000_000,
            },
            HlsEvent::BitrateSwitched {
                stream: StreamKind::Video,
                from_bps: 1_000_000,
                to_bps: 2_000_000,
            },
            HlsEvent::BitrateSwitched {
                stream: StreamKind::Audio,
                from_bps: 1_000_000,
                to_bps: 2_000_000,
            },
        ]
    );

    assert!(matches!(
        events.first(),
        Some(Event::Abr(AbrEvent::MonitorStarted { .. }))
    ));
    assert!(events.contains(&Event::Abr(AbrEvent::BitrateSuggested {
        from_bps: 1_000_000,
        to_bps: 2_000_000,
        last_measured_bps: 3_000_000,
    })));
    assert_eq!(events.last(), Some(&Event::Abr(AbrEvent::MonitorStopped)));
}

#[rstest]
#[tokio::test]
async fn cancelled_upshift_is_announced() {
    let bus = EventBus::new(32);
    let h = SessionHarness::new(
        HlsConfig::default()
            .with_start_bitrate(1_000_000)
            .with_events(bus.clone()),
    );
    h.session.start().unwrap();
    h.download(375_000, Duration::from_secs(1));

    let mut rx = bus.subscribe();
    assert!(h.session.try_cancel_pending_bitrate_switch(false));
    assert_eq!(
        rx.recv().await.unwrap(),
        Event::Hls(HlsEvent::BitrateSwitchCancelled {
            from_bps: 1_000_000,
            to_bps: 2_000_000,
        })
    );
    h.session.stop();
}

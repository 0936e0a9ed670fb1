//! End-to-end scenarios for the browse + playback core, driven by feeding
//! events through `BrowseCore::handle_event` exactly as the run loop would,
//! with fetch settlements injected in controlled orders.

use globe_core::browse::{BrowseCore, BrowseEvent, Intent, SideEffect};
use globe_core::catalog::CountryCatalog;
use globe_core::error::FetchError;
use globe_core::model::{flag_glyph, Country, PlaybackStatus, Station};
use globe_core::playback::{AudioEvent, AudioEventKind, SinkCommand};
use globe_core::state::StateHandle;
use tokio::sync::{broadcast, mpsc};

fn country(code: &str, name: &str) -> Country {
    Country {
        code: code.to_string(),
        name: name.to_string(),
        station_count: 3,
        flag: flag_glyph(code),
    }
}

fn station(id: &str, votes: u64) -> Station {
    Station {
        id: id.to_string(),
        name: format!("Station {id}"),
        stream_url: format!("http://stream.example/{id}"),
        votes,
        ..Station::default()
    }
}

fn new_core() -> (BrowseCore, mpsc::UnboundedReceiver<SinkCommand>) {
    let (sink_tx, sink_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, _) = broadcast::channel(16);
    let mut core = BrowseCore::new(sink_tx, StateHandle::new(), broadcast_tx);
    assert_eq!(core.start(), SideEffect::LoadCatalog);
    core.handle_event(BrowseEvent::CatalogLoaded(Ok(CountryCatalog::new(vec![
        country("FR", "France"),
        country("US", "United States"),
    ]))));
    (core, sink_rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SinkCommand>) -> Vec<SinkCommand> {
    let mut cmds = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        cmds.push(cmd);
    }
    cmds
}

#[test]
fn browse_select_and_play_happy_path() {
    let (mut core, mut sink_rx) = new_core();

    // Filter narrows the catalog to France only.
    core.handle_event(BrowseEvent::Intent(Intent::FilterChanged("fr".into())));
    let view = core.view();
    assert_eq!(view.countries.len(), 1);
    assert_eq!(view.countries[0].code, "FR");

    // Selecting France issues a fetch; settlement arrives sorted by votes.
    let effect = core.handle_event(BrowseEvent::Intent(Intent::SelectCountry("FR".into())));
    assert_eq!(effect, Some(SideEffect::FetchStations("FR".into())));
    core.handle_event(BrowseEvent::StationsFetched {
        country: "FR".into(),
        result: Ok(vec![station("a", 30), station("b", 20), station("c", 10)]),
    });
    let view = core.view();
    assert_eq!(view.stations.len(), 3);
    assert!(view.stations.windows(2).all(|w| w[0].votes >= w[1].votes));

    // Play the top station and walk it through its lifecycle.
    core.handle_event(BrowseEvent::Intent(Intent::SelectStation("a".into())));
    assert_eq!(core.view().playback, PlaybackStatus::Loading);
    core.handle_event(BrowseEvent::Audio(AudioEvent {
        generation: 1,
        kind: AudioEventKind::Started,
    }));
    assert_eq!(core.view().playback, PlaybackStatus::Playing);

    core.handle_event(BrowseEvent::Intent(Intent::TogglePause));
    assert_eq!(core.view().playback, PlaybackStatus::Paused);
    core.handle_event(BrowseEvent::Intent(Intent::TogglePause));
    assert_eq!(core.view().playback, PlaybackStatus::Playing);

    core.handle_event(BrowseEvent::Intent(Intent::StopPlayback));
    let view = core.view();
    assert_eq!(view.playback, PlaybackStatus::Idle);
    assert!(view.now_playing.is_none());

    assert_eq!(
        drain(&mut sink_rx),
        vec![
            SinkCommand::Load {
                url: "http://stream.example/a".into(),
                generation: 1
            },
            SinkCommand::Pause,
            SinkCommand::Resume,
            SinkCommand::Stop,
        ]
    );
}

#[test]
fn out_of_order_settlements_keep_the_last_selection() {
    // Spec scenario: select FR, then US before FR settles; FR's response
    // arrives after US's.  The displayed list is US's, never FR's, never
    // a merge.
    let (mut core, _sink_rx) = new_core();

    core.handle_event(BrowseEvent::Intent(Intent::SelectCountry("FR".into())));
    core.handle_event(BrowseEvent::Intent(Intent::SelectCountry("US".into())));

    core.handle_event(BrowseEvent::StationsFetched {
        country: "US".into(),
        result: Ok(vec![station("us1", 5), station("us2", 4)]),
    });
    core.handle_event(BrowseEvent::StationsFetched {
        country: "FR".into(),
        result: Ok(vec![station("fr1", 9), station("fr2", 8), station("fr3", 7)]),
    });

    let view = core.view();
    let ids: Vec<&str> = view.stations.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["us1", "us2"]);
    assert!(view.last_error.is_none());
}

#[test]
fn switching_stations_never_leaves_two_resources() {
    let (mut core, mut sink_rx) = new_core();
    core.handle_event(BrowseEvent::Intent(Intent::SelectCountry("FR".into())));
    core.handle_event(BrowseEvent::StationsFetched {
        country: "FR".into(),
        result: Ok(vec![station("x", 2), station("y", 1)]),
    });

    core.handle_event(BrowseEvent::Intent(Intent::SelectStation("x".into())));
    core.handle_event(BrowseEvent::Audio(AudioEvent {
        generation: 1,
        kind: AudioEventKind::Started,
    }));
    core.handle_event(BrowseEvent::Intent(Intent::SelectStation("y".into())));

    // Strict release-then-acquire: X's Stop precedes Y's Load.
    let cmds = drain(&mut sink_rx);
    assert_eq!(
        cmds,
        vec![
            SinkCommand::Load {
                url: "http://stream.example/x".into(),
                generation: 1
            },
            SinkCommand::Stop,
            SinkCommand::Load {
                url: "http://stream.example/y".into(),
                generation: 2
            },
        ]
    );
    assert_eq!(core.view().now_playing.unwrap().id, "y");
}

#[test]
fn failed_start_then_new_selection_recovers_cleanly() {
    let (mut core, mut sink_rx) = new_core();
    core.handle_event(BrowseEvent::Intent(Intent::SelectCountry("FR".into())));
    core.handle_event(BrowseEvent::StationsFetched {
        country: "FR".into(),
        result: Ok(vec![station("z", 2), station("w", 1)]),
    });

    core.handle_event(BrowseEvent::Intent(Intent::SelectStation("z".into())));
    core.handle_event(BrowseEvent::Audio(AudioEvent {
        generation: 1,
        kind: AudioEventKind::Errored("stream unavailable".into()),
    }));
    let view = core.view();
    assert_eq!(view.playback, PlaybackStatus::Errored);
    assert_eq!(view.playback_error.as_deref(), Some("stream unavailable"));

    core.handle_event(BrowseEvent::Intent(Intent::SelectStation("w".into())));
    core.handle_event(BrowseEvent::Audio(AudioEvent {
        generation: 2,
        kind: AudioEventKind::Started,
    }));
    let view = core.view();
    assert_eq!(view.playback, PlaybackStatus::Playing);
    assert_eq!(view.now_playing.unwrap().id, "w");
    assert!(view.playback_error.is_none());

    // Z's failed resource was released before W was acquired.
    let cmds = drain(&mut sink_rx);
    let loads_and_stops: Vec<&SinkCommand> = cmds
        .iter()
        .filter(|c| matches!(c, SinkCommand::Load { .. } | SinkCommand::Stop))
        .collect();
    assert!(matches!(
        loads_and_stops.as_slice(),
        [
            SinkCommand::Load { generation: 1, .. },
            SinkCommand::Stop,
            SinkCommand::Stop,
            SinkCommand::Load { generation: 2, .. },
        ]
    ));
}

#[test]
fn fetch_failure_then_another_country_still_works() {
    let (mut core, _sink_rx) = new_core();
    core.handle_event(BrowseEvent::Intent(Intent::SelectCountry("FR".into())));
    core.handle_event(BrowseEvent::StationsFetched {
        country: "FR".into(),
        result: Err(FetchError::Http("connection refused".into())),
    });
    assert!(core.view().last_error.is_some());

    core.handle_event(BrowseEvent::Intent(Intent::SelectCountry("US".into())));
    core.handle_event(BrowseEvent::StationsFetched {
        country: "US".into(),
        result: Ok(vec![station("us1", 1)]),
    });
    let view = core.view();
    assert!(view.last_error.is_none());
    assert_eq!(view.stations.len(), 1);
}

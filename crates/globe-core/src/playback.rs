//! PlaybackController — the single-session playback state machine.
//!
//! The controller never touches the audio resource directly.  It owns the
//! sending half of an unbounded command channel whose consumer (the mpv
//! driver in the TUI crate) is the sole owner of the one underlying audio
//! resource.  Because the consumer processes commands sequentially, putting
//! `Stop` before `Load` on the channel *is* the strict release-then-acquire
//! sequence — two live resources cannot exist.
//!
//! Settlement flows back as `AudioEvent`s.  Every `Load` is stamped with a
//! generation; events from a superseded load (queued callbacks from a
//! stream that has since been torn down) are discarded by generation
//! mismatch, the same token check the browse side uses for stale fetches.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::model::{PlaybackSession, PlaybackStatus, Station};

/// Commands to the audio sink driver.  The driver is the only component
/// allowed to start or stop the underlying resource.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCommand {
    /// Release whatever is live, then acquire a resource for `url`.
    Load { url: String, generation: u64 },
    Pause,
    Resume,
    /// Release the live resource, if any.
    Stop,
}

/// What happened to the stream belonging to `generation`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioEvent {
    pub generation: u64,
    pub kind: AudioEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEventKind {
    /// Audio is flowing.
    Started,
    /// The stream ended naturally.
    Ended,
    /// The stream failed to start, or died mid-play.
    Errored(String),
}

pub struct PlaybackController {
    session: Option<PlaybackSession>,
    generation: u64,
    sink_tx: mpsc::UnboundedSender<SinkCommand>,
}

impl PlaybackController {
    pub fn new(sink_tx: mpsc::UnboundedSender<SinkCommand>) -> Self {
        Self {
            session: None,
            generation: 0,
            sink_tx,
        }
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    /// `Idle` when no session exists.
    pub fn status(&self) -> PlaybackStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// Teardown-then-start.  Any existing session (playing, paused, or
    /// errored) is released before the new load is issued, so exactly one
    /// resource is ever active.
    pub fn play(&mut self, station: Station) {
        if self.session.is_some() {
            self.send(SinkCommand::Stop);
        }
        self.generation += 1;
        debug!(
            "playback: load '{}' gen={} url={}",
            station.name, self.generation, station.stream_url
        );
        self.send(SinkCommand::Load {
            url: station.stream_url.clone(),
            generation: self.generation,
        });
        self.session = Some(PlaybackSession {
            station,
            status: PlaybackStatus::Loading,
            error: None,
        });
    }

    /// No-op unless currently playing.  The session stays allocated so the
    /// station survives for `resume`.
    pub fn pause(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.status == PlaybackStatus::Playing {
                session.status = PlaybackStatus::Paused;
                self.send(SinkCommand::Pause);
            }
        }
    }

    /// No-op unless currently paused.  The sink un-pauses the resource it
    /// already holds, so there is no new loading phase.
    pub fn resume(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.status == PlaybackStatus::Paused {
                session.status = PlaybackStatus::Playing;
                self.send(SinkCommand::Resume);
            }
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.status() {
            PlaybackStatus::Playing => self.pause(),
            PlaybackStatus::Paused => self.resume(),
            _ => {}
        }
    }

    /// Release the resource and destroy the session.
    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            self.send(SinkCommand::Stop);
        }
    }

    /// Apply a settlement event from the audio sink.
    pub fn handle_audio_event(&mut self, event: AudioEvent) {
        if event.generation != self.generation {
            debug!(
                "playback: discarding stale audio event gen={} (current {})",
                event.generation, self.generation
            );
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match event.kind {
            AudioEventKind::Started => {
                if session.status == PlaybackStatus::Loading {
                    session.status = PlaybackStatus::Playing;
                }
            }
            AudioEventKind::Ended => {
                if session.status != PlaybackStatus::Errored {
                    // Natural end: resource already released by the sink.
                    self.session = None;
                }
            }
            AudioEventKind::Errored(message) => {
                if session.status != PlaybackStatus::Errored {
                    warn!("playback: stream error: {}", message);
                    session.status = PlaybackStatus::Errored;
                    session.error = Some(message);
                    // Make sure nothing half-started stays alive.
                    self.send(SinkCommand::Stop);
                }
            }
        }
    }

    fn send(&self, cmd: SinkCommand) {
        if self.sink_tx.send(cmd).is_err() {
            warn!("playback: audio sink is gone, command dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str) -> Station {
        Station {
            id: id.to_string(),
            name: format!("Station {id}"),
            stream_url: format!("http://stream.example/{id}"),
            ..Station::default()
        }
    }

    fn controller() -> (PlaybackController, mpsc::UnboundedReceiver<SinkCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PlaybackController::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SinkCommand>) -> Vec<SinkCommand> {
        let mut cmds = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            cmds.push(cmd);
        }
        cmds
    }

    #[test]
    fn first_play_loads_without_a_stop() {
        let (mut pc, mut rx) = controller();
        pc.play(station("x"));
        assert_eq!(
            drain(&mut rx),
            vec![SinkCommand::Load {
                url: "http://stream.example/x".into(),
                generation: 1
            }]
        );
        assert_eq!(pc.status(), PlaybackStatus::Loading);
    }

    #[test]
    fn started_event_moves_loading_to_playing() {
        let (mut pc, _rx) = controller();
        pc.play(station("x"));
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Started,
        });
        assert_eq!(pc.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn switching_stations_releases_before_acquiring() {
        // Scenario: play X (succeeds), then play Y before X ends.
        let (mut pc, mut rx) = controller();
        pc.play(station("x"));
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Started,
        });
        drain(&mut rx);

        pc.play(station("y"));
        let cmds = drain(&mut rx);
        assert_eq!(
            cmds,
            vec![
                SinkCommand::Stop,
                SinkCommand::Load {
                    url: "http://stream.example/y".into(),
                    generation: 2
                }
            ]
        );
        assert_eq!(pc.session().unwrap().station.id, "y");

        // A late event from X's stream must not disturb Y's session.
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Ended,
        });
        assert_eq!(pc.status(), PlaybackStatus::Loading);
        pc.handle_audio_event(AudioEvent {
            generation: 2,
            kind: AudioEventKind::Started,
        });
        assert_eq!(pc.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn failed_start_lands_in_errored_and_next_play_recovers() {
        // Scenario: Z rejects on start; selecting W afterwards works.
        let (mut pc, mut rx) = controller();
        pc.play(station("z"));
        drain(&mut rx);
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Errored("unsupported codec".into()),
        });
        assert_eq!(pc.status(), PlaybackStatus::Errored);
        assert_eq!(
            pc.session().unwrap().error.as_deref(),
            Some("unsupported codec")
        );
        // The failed resource was released.
        assert_eq!(drain(&mut rx), vec![SinkCommand::Stop]);

        pc.play(station("w"));
        let cmds = drain(&mut rx);
        assert_eq!(cmds[0], SinkCommand::Stop);
        assert!(matches!(cmds[1], SinkCommand::Load { generation: 2, .. }));
        pc.handle_audio_event(AudioEvent {
            generation: 2,
            kind: AudioEventKind::Started,
        });
        assert_eq!(pc.status(), PlaybackStatus::Playing);
        assert_eq!(pc.session().unwrap().station.id, "w");
    }

    #[test]
    fn mid_play_error_retains_the_session() {
        let (mut pc, mut rx) = controller();
        pc.play(station("x"));
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Started,
        });
        drain(&mut rx);
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Errored("connection reset".into()),
        });
        assert_eq!(pc.status(), PlaybackStatus::Errored);
        assert_eq!(pc.session().unwrap().station.id, "x");
        assert_eq!(drain(&mut rx), vec![SinkCommand::Stop]);
    }

    #[test]
    fn natural_end_destroys_the_session() {
        let (mut pc, _rx) = controller();
        pc.play(station("x"));
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Started,
        });
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Ended,
        });
        assert_eq!(pc.status(), PlaybackStatus::Idle);
        assert!(pc.session().is_none());
    }

    #[test]
    fn pause_resume_round_trip() {
        let (mut pc, mut rx) = controller();
        pc.play(station("x"));
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Started,
        });
        drain(&mut rx);

        pc.pause();
        assert_eq!(pc.status(), PlaybackStatus::Paused);
        pc.resume();
        assert_eq!(pc.status(), PlaybackStatus::Playing);
        assert_eq!(
            drain(&mut rx),
            vec![SinkCommand::Pause, SinkCommand::Resume]
        );
    }

    #[test]
    fn pause_is_a_noop_when_not_playing() {
        let (mut pc, mut rx) = controller();
        pc.pause();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(pc.status(), PlaybackStatus::Idle);

        pc.play(station("x"));
        drain(&mut rx);
        pc.pause(); // still loading
        assert_eq!(pc.status(), PlaybackStatus::Loading);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn stop_releases_and_clears() {
        let (mut pc, mut rx) = controller();
        pc.play(station("x"));
        drain(&mut rx);
        pc.stop();
        assert_eq!(drain(&mut rx), vec![SinkCommand::Stop]);
        assert!(pc.session().is_none());
        // Stopping again sends nothing.
        pc.stop();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn stale_events_after_stop_are_ignored() {
        let (mut pc, _rx) = controller();
        pc.play(station("x"));
        pc.stop();
        pc.handle_audio_event(AudioEvent {
            generation: 1,
            kind: AudioEventKind::Errored("late failure".into()),
        });
        assert_eq!(pc.status(), PlaybackStatus::Idle);
    }
}

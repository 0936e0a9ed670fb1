//! Audio backend: mpv over its JSON IPC socket.
//!
//! The driver task is the exclusive owner of the one mpv process.  It
//! consumes `SinkCommand`s from the playback controller sequentially (so a
//! `Stop` queued before a `Load` really is released before the next stream
//! is acquired) and settles each load back into the browse loop as
//! `AudioEvent`s:
//!
//!   - core-idle flips to false        → Started
//!   - end-file reason eof/stop        → Ended
//!   - end-file reason error/network   → Errored
//!   - no audio within START_TIMEOUT   → Errored
//!
//! IPC plumbing: a writer task serialises requests to the socket, a reader
//! task routes replies to per-request oneshots and forwards unsolicited
//! events to the driver.  Unix domain socket on unix, named pipe on
//! Windows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use globe_core::browse::BrowseEvent;
use globe_core::platform;
use globe_core::playback::{AudioEvent, AudioEventKind, SinkCommand};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// observe_property id for core-idle (false = audio flowing).
const OBS_CORE_IDLE: u64 = 1;

/// A stream that produced no audio within this window failed to start.
const START_TIMEOUT: Duration = Duration::from_secs(15);

// ── IPC types ─────────────────────────────────────────────────────────────────

struct IpcRequest {
    req_id: u64,
    /// Serialised JSON line, newline included.
    payload: String,
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An unsolicited mpv event or property-change.
#[derive(Debug, Clone)]
struct MpvEvent {
    raw: Value,
}

impl MpvEvent {
    fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            Some((id, self.raw.get("data").unwrap_or(&Value::Null)))
        } else {
            None
        }
    }

    fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

/// Cloneable handle to the writer task.
#[derive(Clone)]
struct MpvHandle {
    tx: mpsc::Sender<IpcRequest>,
}

impl MpvHandle {
    async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(IpcRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    async fn load(&self, url: &str, volume: f32) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url])).await?;
        let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
        let _ = self.send(json!(["set_property", "volume", vol_pct])).await;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    /// Must be re-issued after every fresh connection so mpv pushes
    /// core-idle changes to us.
    async fn observe_core_idle(&self) {
        match self
            .send(json!(["observe_property", OBS_CORE_IDLE, "core-idle"]))
            .await
        {
            Ok(_) => debug!("mpv: observing core-idle"),
            Err(e) => warn!("mpv: observe_property failed: {}", e),
        }
    }
}

// ── process management ────────────────────────────────────────────────────────

/// Owns the mpv child process; (re)spawns and connects on demand.
struct MpvProcess {
    socket_name: String,
    child: Option<tokio::process::Child>,
}

impl MpvProcess {
    fn new() -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            child: None,
        }
    }

    fn alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }

    async fn spawn(&mut self, volume: f32) -> anyhow::Result<()> {
        self.kill().await;

        let mpv_binary = platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found in PATH"))?;
        let vol_arg = format!(
            "--volume={}",
            (volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&self.socket_name).await;

        let child = tokio::process::Command::new(&mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(&vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        info!("mpv: spawned pid {:?}", child.id());
        self.child = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    async fn connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
        let socket_path = std::path::PathBuf::from(&self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, event_tx))
    }

    #[cfg(windows)]
    async fn connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<MpvHandle> {
        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel; writer inserts, reader resolves.
    let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<IpcRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, Arc::clone(&pending)));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<IpcRequest>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register the reply channel before writing so the reader can
        // always match the response.
        pending.lock().await.insert(req.req_id, req.reply);
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => {
                debug!("mpv reader: connection closed");
                for (_, tx) in pending.lock().await.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    if let Some(tx) = pending.lock().await.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error");
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    }
                } else {
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
        }
    }
}

// ── driver task ───────────────────────────────────────────────────────────────

/// Spawn the audio sink driver.  `sink_rx` carries commands from the
/// playback controller; settlements go to `event_tx` as
/// `BrowseEvent::Audio`.
pub fn spawn(
    volume: f32,
    sink_rx: mpsc::UnboundedReceiver<SinkCommand>,
    event_tx: mpsc::Sender<BrowseEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (mpv_event_tx, mpv_event_rx) = mpsc::channel(64);
        let driver = Driver::new(volume, event_tx, mpv_event_tx);
        driver.run(sink_rx, mpv_event_rx).await;
    })
}

struct Driver {
    process: MpvProcess,
    handle: Option<MpvHandle>,
    mpv_event_tx: mpsc::Sender<MpvEvent>,
    event_tx: mpsc::Sender<BrowseEvent>,
    volume: f32,
    /// Generation of the load currently owning the resource.  `None` when
    /// nothing is loaded (stopped / never started).
    generation: Option<u64>,
    /// True between Load and the first core-idle=false push.
    awaiting_start: bool,
    loading_since: Option<Instant>,
}

impl Driver {
    fn new(
        volume: f32,
        event_tx: mpsc::Sender<BrowseEvent>,
        mpv_event_tx: mpsc::Sender<MpvEvent>,
    ) -> Self {
        Self {
            process: MpvProcess::new(),
            handle: None,
            mpv_event_tx,
            event_tx,
            volume,
            generation: None,
            awaiting_start: false,
            loading_since: None,
        }
    }

    async fn run(
        mut self,
        mut sink_rx: mpsc::UnboundedReceiver<SinkCommand>,
        mut mpv_event_rx: mpsc::Receiver<MpvEvent>,
    ) {
        info!("player: driver starting");
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                cmd = sink_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break, // controller gone, shut down
                    }
                }
                Some(event) = mpv_event_rx.recv() => {
                    self.handle_mpv_event(event).await;
                }
                _ = tick.tick() => {
                    self.check_start_timeout().await;
                }
            }
        }
        info!("player: driver exiting, killing mpv");
        self.process.kill().await;
    }

    async fn handle_command(&mut self, cmd: SinkCommand) {
        match cmd {
            SinkCommand::Load { url, generation } => {
                self.generation = Some(generation);
                self.awaiting_start = true;
                self.loading_since = Some(Instant::now());
                match self.ensure_handle().await {
                    Some(handle) => {
                        if let Err(e) = handle.load(&url, self.volume).await {
                            warn!("player: loadfile failed: {}", e);
                            self.settle(generation, AudioEventKind::Errored(e.to_string()))
                                .await;
                        }
                    }
                    None => {
                        self.settle(
                            generation,
                            AudioEventKind::Errored("audio backend unavailable".into()),
                        )
                        .await;
                    }
                }
            }
            SinkCommand::Pause => {
                if let Some(handle) = self.handle.as_ref() {
                    if let Err(e) = handle.set_pause(true).await {
                        warn!("player: pause failed: {}", e);
                    }
                }
            }
            SinkCommand::Resume => {
                if let Some(handle) = self.handle.as_ref() {
                    if let Err(e) = handle.set_pause(false).await {
                        warn!("player: resume failed: {}", e);
                    }
                }
            }
            SinkCommand::Stop => {
                // Release: clear our claim first so end-file events from the
                // stopped stream are not misreported.
                self.generation = None;
                self.awaiting_start = false;
                self.loading_since = None;
                if let Some(handle) = self.handle.as_ref() {
                    if let Err(e) = handle.stop().await {
                        warn!("player: stop failed: {}", e);
                    }
                    let _ = handle.set_pause(false).await;
                }
            }
        }
    }

    async fn handle_mpv_event(&mut self, event: MpvEvent) {
        if let Some((OBS_CORE_IDLE, data)) = event.as_property_change() {
            if data.as_bool() == Some(false) && self.awaiting_start {
                let Some(generation) = self.generation else {
                    return;
                };
                debug!("player: audio flowing, gen={}", generation);
                self.awaiting_start = false;
                self.loading_since = None;
                self.settle(generation, AudioEventKind::Started).await;
            }
            return;
        }

        if event.event_name() == Some("end-file") {
            let reason = event
                .raw
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            // Reason "stop" is always a release this driver initiated (a
            // Stop command, or a loadfile replacing the old stream).  Its
            // owning load already gave up its claim; attributing it to the
            // current generation would tear down the wrong session.
            if reason == "stop" {
                debug!("player: end-file (stop), release acknowledged");
                return;
            }
            let Some(generation) = self.generation.take() else {
                return; // already released, nothing to report
            };
            self.awaiting_start = false;
            self.loading_since = None;
            info!("player: end-file reason={} gen={}", reason, generation);
            let kind = match reason {
                "error" | "network" | "quit" => {
                    AudioEventKind::Errored(format!("stream ended: {reason}"))
                }
                _ => AudioEventKind::Ended,
            };
            self.settle(generation, kind).await;
        }
    }

    async fn check_start_timeout(&mut self) {
        if !self.awaiting_start {
            return;
        }
        let timed_out = self
            .loading_since
            .is_some_and(|since| since.elapsed() >= START_TIMEOUT);
        if timed_out {
            let Some(generation) = self.generation.take() else {
                return;
            };
            warn!("player: no audio after {:?}, giving up", START_TIMEOUT);
            self.awaiting_start = false;
            self.loading_since = None;
            if let Some(handle) = self.handle.as_ref() {
                let _ = handle.stop().await;
            }
            self.settle(
                generation,
                AudioEventKind::Errored(format!(
                    "no audio after {} seconds",
                    START_TIMEOUT.as_secs()
                )),
            )
            .await;
        }
    }

    async fn settle(&self, generation: u64, kind: AudioEventKind) {
        let _ = self
            .event_tx
            .send(BrowseEvent::Audio(AudioEvent { generation, kind }))
            .await;
    }

    async fn ensure_handle(&mut self) -> Option<MpvHandle> {
        if self.handle.is_some() && !self.process.alive() {
            warn!("player: mpv process died, dropping handle");
            self.handle = None;
        }

        if self.handle.is_none() {
            if let Err(e) = self.process.spawn(self.volume).await {
                warn!("player: failed to start mpv: {}", e);
                return None;
            }
            match self.process.connect(self.mpv_event_tx.clone()).await {
                Ok(handle) => {
                    handle.observe_core_idle().await;
                    self.handle = Some(handle);
                }
                Err(e) => {
                    warn!("player: failed to connect to mpv: {}", e);
                    self.process.kill().await;
                    return None;
                }
            }
        }

        self.handle.clone()
    }
}

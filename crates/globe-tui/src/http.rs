use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use globe_core::browse::{BrowseEvent, Intent};
use globe_core::state::{StateHandle, ViewState};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    view: StateHandle,
    event_tx: mpsc::Sender<BrowseEvent>,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    view: StateHandle,
    event_tx: mpsc::Sender<BrowseEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState { view, event_tx };

        let app = Router::new()
            .route("/api/state", get(get_state))
            .route("/api/country/:code", get(select_country).post(select_country))
            .route("/api/play/:id", get(play_station).post(play_station))
            .route("/api/pause", get(pause).post(pause))
            .route("/api/resume", get(resume).post(resume))
            .route("/api/stop", get(stop).post(stop))
            .layer(CorsLayer::permissive())
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<ViewState> {
    Json(state.view.snapshot().await)
}

async fn send_intent(state: &HttpState, intent: Intent) -> StatusCode {
    if state.event_tx.send(BrowseEvent::Intent(intent)).await.is_err() {
        error!("Failed to deliver HTTP command to browse loop");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn select_country(
    State(state): State<HttpState>,
    Path(code): Path<String>,
) -> StatusCode {
    info!("HTTP API: Select country {}", code);
    send_intent(&state, Intent::SelectCountry(code)).await
}

async fn play_station(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> StatusCode {
    info!("HTTP API: Play station {}", id);
    send_intent(&state, Intent::SelectStation(id)).await
}

async fn pause(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Pause");
    send_intent(&state, Intent::Pause).await
}

async fn resume(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Resume");
    send_intent(&state, Intent::Resume).await
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Stop");
    send_intent(&state, Intent::StopPlayback).await
}

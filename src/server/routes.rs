//! axum router, handlers and server lifecycle.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::extract::{JsonBody, QueryParams};
use crate::coordinator::{MoveCoordinator, MoveRequest};
use crate::error::BoardResult;
use crate::snapshot::{BoardView, SnapshotFilter, SnapshotService};
use crate::store::BoardStore;
use crate::types::{
    ActivityEntry, BoardSummary, BoardTree, Card, CardPatch, Column, NewBoard, NewCard,
};

const DEFAULT_ACTIVITY_LIMIT: usize = 50;
const MAX_ACTIVITY_LIMIT: usize = 500;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn BoardStore>,
    coordinator: Arc<MoveCoordinator>,
    snapshots: SnapshotService,
    /// Column names given to boards created without an explicit list.
    default_columns: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(coordinator: Arc<MoveCoordinator>, default_columns: Vec<String>) -> Self {
        let store = coordinator.store().clone();
        Self {
            snapshots: SnapshotService::new(store.clone()),
            store,
            coordinator,
            default_columns: Arc::new(default_columns),
        }
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &MoveCoordinator {
        &self.coordinator
    }

    pub fn snapshots(&self) -> &SnapshotService {
        &self.snapshots
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBoardRequest {
    name: String,
    color: Option<String>,
    client_id: Option<String>,
    /// Absent means the configured defaults; an empty list means no columns.
    columns: Option<Vec<String>>,
}

async fn create_board(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateBoardRequest>,
) -> BoardResult<Json<BoardTree>> {
    let input = NewBoard {
        name: req.name,
        color: req.color,
        client_id: req.client_id,
        columns: req
            .columns
            .unwrap_or_else(|| state.default_columns.as_ref().clone()),
    };
    let board = state.store.create_board(input)?;
    info!(board_id = %board.board.id, name = %board.board.name, "Board created");
    Ok(Json(board))
}

async fn list_boards(State(state): State<AppState>) -> BoardResult<Json<Vec<BoardSummary>>> {
    Ok(Json(state.store.list_boards()?))
}

async fn get_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    QueryParams(filter): QueryParams<SnapshotFilter>,
) -> BoardResult<Json<BoardView>> {
    Ok(Json(state.snapshots.snapshot(&board_id, &filter)?))
}

async fn delete_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> BoardResult<StatusCode> {
    state.coordinator.delete_board(&board_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCardRequest {
    column_id: String,
    #[serde(flatten)]
    card: NewCard,
}

async fn create_card(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    JsonBody(req): JsonBody<CreateCardRequest>,
) -> BoardResult<Json<Card>> {
    let card = state
        .coordinator
        .create_card(&board_id, &req.column_id, req.card)
        .await?;
    Ok(Json(card))
}

async fn update_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    JsonBody(patch): JsonBody<CardPatch>,
) -> BoardResult<Json<Card>> {
    Ok(Json(state.coordinator.update_card(&card_id, &patch).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveCardRequest {
    column_id: String,
    /// Zero-based index the client dropped the card at.
    position: i64,
    version: Option<i64>,
}

#[derive(Debug, Serialize)]
struct MoveCardResponse {
    applied: bool,
    card: Card,
}

async fn move_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    JsonBody(req): JsonBody<MoveCardRequest>,
) -> BoardResult<Json<MoveCardResponse>> {
    let outcome = state
        .coordinator
        .move_card(MoveRequest {
            card_id,
            target_column_id: req.column_id,
            target_index: req.position,
            expected_version: req.version,
        })
        .await?;
    Ok(Json(MoveCardResponse {
        applied: outcome.is_applied(),
        card: outcome.into_card(),
    }))
}

async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> BoardResult<StatusCode> {
    state.coordinator.delete_card(&card_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct CreateColumnRequest {
    name: String,
    color: Option<String>,
}

async fn create_column(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    JsonBody(req): JsonBody<CreateColumnRequest>,
) -> BoardResult<Json<Column>> {
    let column = state
        .coordinator
        .create_column(&board_id, &req.name, req.color.as_deref())
        .await?;
    Ok(Json(column))
}

#[derive(Debug, Deserialize)]
struct MoveColumnRequest {
    position: i64,
    version: Option<i64>,
}

async fn move_column(
    State(state): State<AppState>,
    Path(column_id): Path<String>,
    JsonBody(req): JsonBody<MoveColumnRequest>,
) -> BoardResult<Json<Column>> {
    let column = state
        .coordinator
        .move_column(&column_id, req.position, req.version)
        .await?;
    Ok(Json(column))
}

#[derive(Debug, Default, Deserialize)]
struct DeleteColumnQuery {
    #[serde(default)]
    cascade: bool,
}

async fn delete_column(
    State(state): State<AppState>,
    Path(column_id): Path<String>,
    QueryParams(query): QueryParams<DeleteColumnQuery>,
) -> BoardResult<StatusCode> {
    state
        .coordinator
        .delete_column(&column_id, query.cascade)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct ActivityQuery {
    limit: Option<usize>,
}

async fn board_activity(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    QueryParams(query): QueryParams<ActivityQuery>,
) -> BoardResult<Json<Vec<ActivityEntry>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    Ok(Json(state.store.board_activity(&board_id, limit)?))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "code": "NOT_FOUND",
            "message": "no such route",
        })),
    )
}

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/boards", post(create_board).get(list_boards))
        .route("/boards/{board_id}", get(get_board).delete(delete_board))
        .route("/boards/{board_id}/cards", post(create_card))
        .route("/boards/{board_id}/columns", post(create_column))
        .route("/boards/{board_id}/activity", get(board_activity))
        .route("/cards/{card_id}", patch(update_card).delete(delete_card))
        .route("/cards/{card_id}/move", put(move_card))
        .route("/columns/{column_id}", delete(delete_column))
        .route("/columns/{column_id}/move", put(move_column))
        .route("/api/health", get(health))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle for a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::error!("Server task failed: {}", e);
        }
    }
}

/// Start the HTTP server. Port 0 binds an ephemeral port.
pub async fn start_server(state: AppState, bind: IpAddr, port: u16) -> anyhow::Result<ServerHandle> {
    let app = build_router(state);

    let addr = SocketAddr::new(bind, port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Board engine listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Board engine shutting down");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr: bound_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

use axum::{
    extract::{Json, Path, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

mod config;
mod export;
mod geocode;
mod georef;
mod inspect;
mod models;
mod store;
mod style;
mod tokens;
mod utils;

use config::Config;
use export::TemplateEngine;
use models::{CornersRequest, EditorSettings, InspectFeature, StyleDocument};
use store::StyleStore;

const AUTO_EXPORT_SETTING: &str = "auto_export_expression_filter";

struct AppState {
    config: Config,
    store: StyleStore,
    template_engine: TemplateEngine,
    http_client: reqwest::Client,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let config = Config::load()?;
    let thread_count = config.thread_count.unwrap_or_else(num_cpus::get);

    info!("starting server with {} threads", thread_count);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(thread_count)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn log_request_response(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    info!("incoming request: {} {}", method, path);
    let response = next.run(req).await;
    info!("request result: {} for {} {}", response.status(), method, path);
    response
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let store = StyleStore::open(config.data_dir.clone()).await?;
    let template_engine = TemplateEngine::new(config.templates_dir.clone())?;
    let http_client = reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .build()?;

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState {
        config,
        store,
        template_engine,
        http_client,
    });

    let app = Router::new()
        .route("/styles", get(list_styles))
        .route("/styles/latest", get(get_latest_style))
        .route("/styles/{id}", get(get_style).put(put_style).delete(delete_style))
        .route("/styles/{id}/render", get(get_render_style))
        .route("/styles/{id}/inspect", get(get_inspect_style))
        .route("/styles/{id}/export.json", get(export_style_json))
        .route("/styles/{id}/export.html", get(export_style_html))
        .route("/inspect/popup", post(post_inspect_popup))
        .route("/georef/corners", post(post_georef_corners))
        .route("/geocode", get(get_geocode))
        .route("/settings", get(get_settings).put(put_settings))
        .layer(middleware::from_fn(log_request_response))
        .with_state(state);

    info!("listening on {}", listen_addr);
    let listener = TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

async fn list_styles(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list().await {
        Ok(styles) => Json(styles).into_response(),
        Err(e) => {
            error!("list styles error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error listing styles: {}", e)).into_response()
        }
    }
}

async fn get_latest_style(State(state): State<Arc<AppState>>) -> Response {
    match state.store.latest().await {
        Ok(Some(latest)) => Json(normalize_and_log(latest)).into_response(),
        Ok(None) => Json(default_style(&state).await).into_response(),
        Err(e) => {
            error!("latest style error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error loading latest style: {}", e)).into_response()
        }
    }
}

async fn get_style(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match load_normalized(&state, &id).await {
        Ok(Some(style)) => Json(style).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "style not found").into_response(),
        Err(e) => {
            error!("load error for {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error loading style: {}", e)).into_response()
        }
    }
}

async fn put_style(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut style): Json<StyleDocument>,
) -> Response {
    style.id = Some(id.clone());
    let style = normalize_and_log(style);
    match state.store.save(style).await {
        Ok(saved) => Json(saved).into_response(),
        Err(e) => {
            error!("save error for {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error saving style: {}", e)).into_response()
        }
    }
}

async fn delete_style(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.store.delete(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "style not found").into_response(),
        Err(e) => {
            error!("delete error for {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error deleting style: {}", e)).into_response()
        }
    }
}

async fn get_render_style(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match load_normalized(&state, &id).await {
        Ok(Some(style)) => {
            let style = tokens::substitute_tokens(style, &state.config.access_tokens, true);
            Json(style).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "style not found").into_response(),
        Err(e) => {
            error!("render style error for {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error loading style: {}", e)).into_response()
        }
    }
}

async fn get_inspect_style(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match load_normalized(&state, &id).await {
        Ok(Some(style)) => {
            let style = tokens::substitute_tokens(style, &state.config.access_tokens, true);
            Json(inspect::build_inspect_style(&style)).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "style not found").into_response(),
        Err(e) => {
            error!("inspect style error for {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error loading style: {}", e)).into_response()
        }
    }
}

async fn export_style_json(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match prepare_export(&state, &id, &params).await {
        Ok(Some((style, migrate))) => match export::export_json(&style, migrate) {
            Ok(body) => download_response(&style, "json", "application/json; charset=utf-8", body),
            Err(e) => {
                error!("export error for {}: {}", id, e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("error exporting style: {}", e)).into_response()
            }
        },
        Ok(None) => (StatusCode::NOT_FOUND, "style not found").into_response(),
        Err(e) => {
            error!("export error for {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error exporting style: {}", e)).into_response()
        }
    }
}

async fn export_style_html(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match prepare_export(&state, &id, &params).await {
        Ok(Some((style, migrate))) => {
            match export::export_html(&state.template_engine, &style, migrate) {
                Ok(body) => download_response(&style, "html", "text/html; charset=utf-8", body),
                Err(e) => {
                    error!("html export error for {}: {}", id, e);
                    (StatusCode::INTERNAL_SERVER_ERROR, format!("error exporting style: {}", e)).into_response()
                }
            }
        }
        Ok(None) => (StatusCode::NOT_FOUND, "style not found").into_response(),
        Err(e) => {
            error!("html export error for {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error exporting style: {}", e)).into_response()
        }
    }
}

async fn post_inspect_popup(Json(features): Json<Vec<InspectFeature>>) -> Response {
    Json(inspect::popup_rows(&features)).into_response()
}

async fn post_georef_corners(Json(request): Json<CornersRequest>) -> Response {
    let corners = georef::compute_corners(
        request.top_left,
        request.bottom_right,
        request.width,
        request.height,
    );
    Json(corners).into_response()
}

async fn get_geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(query) = params.get("q").filter(|q| !q.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing query parameter q").into_response();
    };
    let results = geocode::search(&state.http_client, &state.config.geocoder_url, query).await;
    Json(results).into_response()
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Response {
    match state.store.get_setting(AUTO_EXPORT_SETTING).await {
        Ok(value) => Json(EditorSettings {
            auto_export_expression_filter: value.as_deref() == Some("true"),
        })
        .into_response(),
        Err(e) => {
            error!("settings error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error loading settings: {}", e)).into_response()
        }
    }
}

async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<EditorSettings>,
) -> Response {
    let value = settings.auto_export_expression_filter.to_string();
    match state.store.put_setting(AUTO_EXPORT_SETTING, &value).await {
        Ok(()) => Json(settings).into_response(),
        Err(e) => {
            error!("settings error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error saving settings: {}", e)).into_response()
        }
    }
}

// --- Helper Functions ---

fn normalize_and_log(style: StyleDocument) -> StyleDocument {
    let normalized = style::normalize(style);
    for warning in &normalized.warnings {
        warn!("style normalization: {}", warning);
    }
    normalized.style
}

async fn load_normalized(state: &AppState, style_id: &str) -> anyhow::Result<Option<StyleDocument>> {
    let Some(style) = state.store.load(style_id).await? else {
        return Ok(None);
    };
    Ok(Some(normalize_and_log(style)))
}

/// Style served when nothing has been stored yet: the configured default,
/// or the empty style when that is unset or unreachable.
async fn default_style(state: &AppState) -> StyleDocument {
    if let Some(url) = &state.config.default_style_url {
        match fetch_style(&state.http_client, url).await {
            Ok(style) => return normalize_and_log(style),
            Err(e) => error!("could not fetch default style from {}: {}", url, e),
        }
    }
    style::empty_style()
}

async fn fetch_style(client: &reqwest::Client, url: &str) -> anyhow::Result<StyleDocument> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("default style fetch returned {}", resp.status());
    }
    Ok(resp.json().await?)
}

/// Resolve a style for export plus the filter-migration flag: the
/// `filters` query parameter wins, the persisted setting otherwise.
async fn prepare_export(
    state: &AppState,
    style_id: &str,
    params: &HashMap<String, String>,
) -> anyhow::Result<Option<(StyleDocument, bool)>> {
    let migrate = match params.get("filters").map(String::as_str) {
        Some("expression") => true,
        Some(_) => false,
        None => {
            state.store.get_setting(AUTO_EXPORT_SETTING).await?.as_deref() == Some("true")
        }
    };
    Ok(load_normalized(state, style_id).await?.map(|style| (style, migrate)))
}

fn download_response(
    style: &StyleDocument,
    extension: &str,
    content_type: &str,
    body: String,
) -> Response {
    let file_name = format!("{}.{}", export::export_name(style), extension);
    (
        [
            ("content-type", content_type.to_string()),
            ("content-disposition", format!("attachment; filename=\"{}\"", file_name)),
        ],
        body,
    )
        .into_response()
}

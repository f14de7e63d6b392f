//! # HTTP Server
//!
//! The axum surface of the service.
//!
//! Two kinds of routes live here. The `/api/geocode` and `/api/places/*`
//! proxies inject the server-held credential and relay the provider's answer
//! untouched, status code included. Everything else is the application API:
//! merged search, favorites, ratings, photos and user-submitted listings.
//!
//! The caller's identity arrives in the `x-user-id` header set by the auth
//! gateway in front of us. A mutation without it is answered with 401 and a
//! `Location` header pointing at the sign-in page.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State},
    http::{
        header::{CONTENT_TYPE, LOCATION},
        request::Parts,
        HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info, warn};

use crate::adapters::google::{GooglePlacesClient, DEFAULT_PHOTO_WIDTH};
use crate::adapters::http::{build_client, UpstreamResponse};
use crate::adapters::nominatim::NominatimGeocoder;
use crate::adapters::sqlite::SqliteStore;
use crate::adapters::storage::{LocalObjectStore, MAX_UPLOAD_BYTES};
use crate::core::config::Config;
use crate::core::ratings::{RatingAggregate, RatingEntry, Score};
use crate::core::{Coordinates, PlaygroundId};
use crate::ports::{
    FavoriteStore, NewPlayground, PhotoStore, PlaygroundRepository, ProviderError, RatingStore, Session,
    StoreError,
};
use crate::search::{SearchPipeline, SearchRequest};

/// Header carrying the signed-in user's id
pub const USER_HEADER: &str = "x-user-id";

/// Where unauthenticated mutations are sent
pub const SIGN_IN_PATH: &str = "/sign-in";

/// Errors returned by handlers
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Provider(ProviderError::MissingCredential { provider }) => {
                error!(provider, "request needs a provider credential that is not configured");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "API key not configured")
            }
            AppError::Provider(e) => {
                warn!(error = %e, "provider request failed");
                let status = e
                    .upstream_status()
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                error_body(status, e.to_string())
            }
            AppError::Store(StoreError::Unauthorized) => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "sign in required", "redirect": SIGN_IN_PATH })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(LOCATION, HeaderValue::from_static(SIGN_IN_PATH));
                response
            }
            AppError::Store(StoreError::PermissionDenied(_)) => error_body(StatusCode::FORBIDDEN, self.to_string()),
            AppError::Store(StoreError::Invalid(_)) | AppError::BadRequest(_) => {
                error_body(StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Store(StoreError::NotFound(_)) | AppError::NotFound(_) => {
                error_body(StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::Store(e) => {
                error!(error = %e, "store failure");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

type AppResult<T> = Result<T, AppError>;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<SearchPipeline>,
    pub places: Arc<GooglePlacesClient>,
    pub geocoder: Arc<NominatimGeocoder>,
    pub repository: Arc<dyn PlaygroundRepository>,
    pub favorites: Arc<dyn FavoriteStore>,
    pub ratings: Arc<dyn RatingStore>,
    pub photos: Arc<dyn PhotoStore>,
}

impl AppState {
    /// Open the database named by the config and wire everything to it
    pub fn from_config(config: Config) -> AppResult<Self> {
        let store = SqliteStore::open(&config.database_path)?;
        Self::new(config, store)
    }

    /// Wire the providers and stores around an already-open database
    pub fn new(config: Config, store: SqliteStore) -> AppResult<Self> {
        let client = build_client(&config)?;
        let pipeline = SearchPipeline::from_config(&config, client.clone(), store.clone());
        info!(sources = ?pipeline.source_names(), "search pipeline ready");

        let places = GooglePlacesClient::new(client.clone(), &config.places_url, config.places_api_key.clone());
        let geocoder = NominatimGeocoder::new(client, &config.geocoder_url);
        let photos = LocalObjectStore::new(&config.photo_root, &config.photo_public_base, store.clone());
        let store = Arc::new(store);

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            places: Arc::new(places),
            geocoder: Arc::new(geocoder),
            repository: store.clone(),
            favorites: store.clone(),
            ratings: store,
            photos: Arc::new(photos),
        })
    }
}

/// Session taken from the gateway header; anonymous when absent
pub struct CurrentSession(pub Session);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Session::authenticated)
            .unwrap_or_default();
        Ok(Self(session))
    }
}

fn parse_id(raw: &str) -> AppResult<PlaygroundId> {
    raw.parse()
        .map_err(|e| AppError::BadRequest(format!("invalid playground id {raw:?}: {e}")))
}

/// Relay a provider response as-is
fn relay(upstream: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, upstream.body).into_response();
    if let Some(content_type) = upstream
        .content_type
        .and_then(|c| HeaderValue::from_str(&c).ok())
    {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

// Proxies

#[derive(Deserialize)]
pub struct GeocodeParams {
    q: String,
    country: Option<String>,
}

async fn geocode_proxy(State(state): State<AppState>, Query(params): Query<GeocodeParams>) -> AppResult<Response> {
    let upstream = state.geocoder.forward(&params.q, params.country.as_deref()).await?;
    Ok(relay(upstream))
}

#[derive(Deserialize)]
pub struct TextSearchParams {
    query: String,
    region: Option<String>,
}

async fn text_search_proxy(
    State(state): State<AppState>,
    Query(params): Query<TextSearchParams>,
) -> AppResult<Response> {
    let region = params.region.unwrap_or_else(|| state.config.region.clone());
    let upstream = state
        .places
        .forward("textsearch/json", &[("query", params.query), ("region", region)])
        .await?;
    Ok(relay(upstream))
}

#[derive(Deserialize)]
pub struct NearbyParams {
    lat: f64,
    lng: f64,
    radius: Option<u32>,
}

async fn nearby_proxy(State(state): State<AppState>, Query(params): Query<NearbyParams>) -> AppResult<Response> {
    let center = Coordinates::new(params.lat, params.lng)
        .ok_or_else(|| AppError::BadRequest("coordinates out of range".to_string()))?;
    let radius = params.radius.unwrap_or(state.config.search_radius_m);
    let upstream = state
        .places
        .forward(
            "nearbysearch/json",
            &[
                ("location", format!("{},{}", center.lat, center.lon)),
                ("radius", radius.to_string()),
                ("type", "park".to_string()),
                ("keyword", "playground".to_string()),
            ],
        )
        .await?;
    Ok(relay(upstream))
}

#[derive(Deserialize)]
pub struct PhotoParams {
    reference: String,
    maxwidth: Option<u32>,
}

async fn photo_proxy(State(state): State<AppState>, Query(params): Query<PhotoParams>) -> AppResult<Redirect> {
    let width = params.maxwidth.unwrap_or(DEFAULT_PHOTO_WIDTH);
    let url = state
        .places
        .photo_url(&params.reference, width)
        .ok_or(ProviderError::MissingCredential {
            provider: "google-places",
        })?;
    Ok(Redirect::temporary(&url))
}

// Application API

#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    radius: Option<u32>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<impl IntoResponse> {
    let near = match (params.lat, params.lon) {
        (None, None) => None,
        (lat, lon) => Some(
            Coordinates::from_parts(lat, lon)
                .ok_or_else(|| AppError::BadRequest("lat and lon must both be valid".to_string()))?,
        ),
    };
    let request = SearchRequest {
        query: params.q.unwrap_or_default(),
        near,
        radius_m: params.radius,
    };
    Ok(Json(state.pipeline.search(request).await))
}

async fn get_playground(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let record = state
        .repository
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(id.to_string()))?;
    Ok(Json(record))
}

async fn create_playground(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(playground): Json<NewPlayground>,
) -> AppResult<impl IntoResponse> {
    let id = state.repository.insert(&session, playground).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[derive(Deserialize)]
pub struct TopParams {
    limit: Option<usize>,
}

async fn top_rated(State(state): State<AppState>, Query(params): Query<TopParams>) -> AppResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(state.config.row_limit);
    Ok(Json(state.ratings.top_rated(limit).await?))
}

/// Ratings of one playground
#[derive(Serialize)]
pub struct RatingsView {
    pub aggregate: RatingAggregate,
    pub entries: Vec<RatingEntry>,
}

async fn get_ratings(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let entries = state.ratings.ratings_for(&id).await?;
    let aggregate = crate::core::ratings::aggregate(&entries);
    Ok(Json(RatingsView { aggregate, entries }))
}

#[derive(Deserialize)]
pub struct SubmitRatings {
    scores: BTreeMap<String, Score>,
    review: Option<String>,
}

async fn submit_ratings(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<String>,
    Json(body): Json<SubmitRatings>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let written = state
        .ratings
        .submit_ratings(&session, &id, &body.scores, body.review.as_deref())
        .await?;
    let aggregate = state.ratings.aggregate_ratings(&id).await?;
    Ok(Json(json!({ "written": written, "aggregate": aggregate })))
}

async fn toggle_favorite(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let favorite = state.favorites.toggle_favorite(&session, &id).await?;
    Ok(Json(json!({ "id": id, "favorite": favorite })))
}

async fn list_favorites(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.favorites.favorites(&session).await?))
}

#[derive(Deserialize)]
pub struct UploadParams {
    filename: Option<String>,
}

async fn upload_photo(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let filename = params.filename.unwrap_or_else(|| "photo.jpg".to_string());
    let photo = state.photos.upload(&session, &id, &filename, body.to_vec()).await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

async fn list_photos(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    Ok(Json(state.photos.photos_for(&session, &id).await?))
}

/// Build the router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(USER_HEADER)])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/geocode", get(geocode_proxy))
        .route("/api/places/textsearch", get(text_search_proxy))
        .route("/api/places/nearby", get(nearby_proxy))
        .route("/api/places/photo", get(photo_proxy))
        .route("/api/search", get(search))
        .route("/api/playgrounds", post(create_playground))
        .route("/api/playgrounds/top", get(top_rated))
        .route("/api/playgrounds/:id", get(get_playground))
        .route("/api/playgrounds/:id/ratings", get(get_ratings).post(submit_ratings))
        .route("/api/playgrounds/:id/favorite", post(toggle_favorite))
        .route(
            "/api/playgrounds/:id/photos",
            get(list_photos)
                .post(upload_photo)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/favorites", get(list_favorites))
        .nest_service("/photos", ServeDir::new(&state.config.photo_root))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "cannot listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Unreachable address so provider calls fail fast
    const DEAD: &str = "http://127.0.0.1:9";

    fn test_config(tag: &str) -> Config {
        let root = std::env::temp_dir().join(format!("pgx-server-{tag}-{}", std::process::id()));
        let mut config = Config::default()
            .with_photo_storage(root, "http://localhost/photos")
            .with_fixture_fallback(true);
        config.places_url = DEAD.to_string();
        config.geocoder_url = DEAD.to_string();
        config.overpass_url = DEAD.to_string();
        config.http_timeout = Duration::from_secs(2);
        config
    }

    fn app(tag: &str) -> Router {
        let state = AppState::new(test_config(tag), SqliteStore::open_in_memory().unwrap()).unwrap();
        router(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Response) {
        let response = app.clone().oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(CONTENT_TYPE, "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_favorite_requires_sign_in() {
        let app = app("fav-anon");
        let (status, response) = send(&app, post_json("/api/playgrounds/google-abc/favorite", None, json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[LOCATION], SIGN_IN_PATH);
    }

    #[tokio::test]
    async fn test_favorite_toggle_round_trip() {
        let app = app("fav");
        let uri = "/api/playgrounds/osm-node-7/favorite";

        let (status, response) = send(&app, post_json(uri, Some("alice"), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["favorite"], true);

        let (_, response) = send(&app, get("/api/favorites", Some("alice"))).await;
        assert_eq!(json_body(response).await, json!(["osm-node-7"]));

        let (_, response) = send(&app, post_json(uri, Some("alice"), json!({}))).await;
        assert_eq!(json_body(response).await["favorite"], false);
    }

    #[tokio::test]
    async fn test_ratings_submit_and_read() {
        let app = app("ratings");
        let uri = "/api/playgrounds/google-p1/ratings";

        for (user, score) in [("a", 5), ("b", 3), ("c", 4)] {
            let body = json!({ "scores": { "Safety": score }, "review": null });
            let (status, _) = send(&app, post_json(uri, Some(user), body)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, response) = send(&app, get(uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["aggregate"]["categories"]["safety"], 4.0);
        assert_eq!(body["aggregate"]["total"], 3);
        assert_eq!(body["entries"].as_array().unwrap().len(), 3);

        let (_, response) = send(&app, get("/api/playgrounds/top?limit=5", None)).await;
        let top = json_body(response).await;
        assert_eq!(top[0]["playground_id"], "google-p1");
    }

    #[tokio::test]
    async fn test_out_of_range_score_rejected() {
        let app = app("bad-score");
        let body = json!({ "scores": { "overall": 9 } });
        let (status, _) = send(&app, post_json("/api/playgrounds/google-p1/ratings", Some("a"), body)).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_bad_id_is_bad_request() {
        let app = app("bad-id");
        let (status, _) = send(&app, get("/api/playgrounds/nope/ratings", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_proxy_without_key_is_fixed_error() {
        let app = app("proxy");
        let (status, response) = send(&app, get("/api/places/textsearch?query=park", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await, json!({ "error": "API key not configured" }));

        let (status, _) = send(&app, get("/api/places/photo?reference=abc", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_geocode_proxy_unreachable_is_bad_gateway() {
        let app = app("geo");
        let (status, _) = send(&app, get("/api/geocode?q=Austin", None)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_search_near_serves_fixtures_when_providers_fail() {
        let app = app("search");
        let (status, response) = send(&app, get("/api/search?lat=40.7&lon=-74.0&radius=2000", None)).await;
        assert_eq!(status, StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["reference"]["lat"], 40.7);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r["id"].as_str().unwrap().starts_with("mock-")));
        assert!(results.iter().all(|r| r["photo"]["kind"] == "stock"));
    }

    #[tokio::test]
    async fn test_search_rejects_half_coordinates() {
        let app = app("half");
        let (status, _) = send(&app, get("/api/search?lat=40.7", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_and_fetch_playground() {
        let app = app("create");
        let body = json!({
            "name": "Community Corner",
            "location": "5th and Main",
            "city": "Austin",
            "coordinates": { "lat": 30.27, "lon": -97.74 },
            "amenities": ["Swings"],
            "description": null
        });

        let (status, _) = send(&app, post_json("/api/playgrounds", None, body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, response) = send(&app, post_json("/api/playgrounds", Some("alice"), body)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json_body(response).await["id"].as_str().unwrap().to_string();
        assert_eq!(id, "db-1");

        let (status, response) = send(&app, get(&format!("/api/playgrounds/{id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["name"], "Community Corner");

        let (status, _) = send(&app, get("/api/playgrounds/db-99", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_photo_upload() {
        let app = app("photo");
        let request = Request::post("/api/playgrounds/google-p1/photos?filename=slide.png")
            .header(USER_HEADER, "alice")
            .body(Body::from(vec![1u8, 2, 3]))
            .unwrap();
        let (status, response) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        let photo = json_body(response).await;
        assert!(photo["url"].as_str().unwrap().ends_with("-slide.png"));

        let (_, response) = send(&app, get("/api/playgrounds/google-p1/photos", Some("alice"))).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }
}

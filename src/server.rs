//! Curriculum HTTP server.
//!
//! Exposes the [`CurriculumResolver`] as a JSON API. Every handler is
//! stateless apart from the shared resolver, which holds the storage client.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/content/curriculum/grades` | Grade codes in curriculum order |
//! | `GET`  | `/content/curriculum/structure/{grade}` | Term/subject tree |
//! | `GET`  | `/content/curriculum/user?grade=5` | Curriculum for the caller's grade |
//! | `GET`  | `/content/curriculum/{grade}` | Curriculum for a grade |
//! | `GET`  | `/content/curriculum/{grade}/{term}/{subject}` | Concepts for a subject |
//! | `GET`  | `/content/curriculum/{grade}/{term}/{subject}/{concept}` | One concept |
//! | `POST` | `/content/search?k=10` | Substring search |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `{grade}` goes through the grade mapper, so `P5` and `5` are equivalent.
//! `/user` reads the grade from the `grade` query parameter, then from the
//! `x-user-grade` header.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "concept 'Algebra' not found in P5/Term1/Mathematics" } }
//! ```
//!
//! Error codes: `bad_request`, `unknown_grade`, `unknown_term` (400),
//! `not_found` (404), `fallback_unavailable` (500).
//! A search body missing `query` or `grade` is rejected by the JSON
//! extractor with 422.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::curriculum::{ConceptQuery, CurriculumResolver};
use crate::error::CurriculumError;
use crate::grade::{map_user_grade, Grade, Term};
use crate::models::{
    ConceptResponse, GradeCurriculum, GradeList, SearchResponse, StructureResponse,
    SubjectConcepts,
};

/// Header consulted by `/content/curriculum/user` when no `grade` query
/// parameter is given.
pub const USER_GRADE_HEADER: &str = "x-user-grade";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<CurriculumResolver>,
}

impl AppState {
    pub fn new(config: Config, resolver: CurriculumResolver) -> Self {
        Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
        }
    }
}

/// Build the router with all routes, CORS, and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/content/curriculum/grades", get(handle_grades))
        .route("/content/curriculum/structure/{grade}", get(handle_structure))
        .route("/content/curriculum/user", get(handle_user_curriculum))
        .route("/content/curriculum/{grade}", get(handle_grade_curriculum))
        .route(
            "/content/curriculum/{grade}/{term}/{subject}",
            get(handle_subject_concepts),
        )
        .route(
            "/content/curriculum/{grade}/{term}/{subject}/{concept}",
            get(handle_concept),
        )
        .route("/content/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the curriculum server against the configured GCS bucket.
///
/// Binds to `[server].bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let resolver = CurriculumResolver::connect(config)?;

    let fallback = resolver.fallback();
    let bundled = fallback.bundled_grades();
    if bundled.is_empty() {
        tracing::warn!(dir = %fallback.dir().display(), "no fallback files found; storage outages will surface as errors");
    } else {
        tracing::info!(dir = %fallback.dir().display(), grades = ?bundled, "fallback content available");
    }

    let bind_addr = config.server.bind.clone();
    let app = build_router(AppState::new(config.clone(), resolver));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("curriculum server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into a JSON HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<CurriculumError> for AppError {
    fn from(err: CurriculumError) -> Self {
        let message = err.to_string();
        match err {
            CurriculumError::UnknownGrade(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "unknown_grade", message)
            }
            CurriculumError::UnknownTerm(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "unknown_term", message)
            }
            CurriculumError::InvalidSubject(_) | CurriculumError::EmptyQuery => bad_request(message),
            CurriculumError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", message)
            }
            CurriculumError::FallbackUnavailable(_) => {
                tracing::error!(error = %message, "fallback content unavailable");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "fallback_unavailable",
                    message,
                )
            }
        }
    }
}

fn parse_grade(raw: &str) -> Result<Grade, AppError> {
    map_user_grade(raw).map_err(|e| CurriculumError::from(e).into())
}

fn parse_term(raw: &str) -> Result<Term, AppError> {
    raw.parse::<Term>()
        .map_err(|e| CurriculumError::from(e).into())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    bucket: String,
}

/// Liveness only: the bucket is not contacted.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        bucket: state.config.storage.bucket.clone(),
    })
}

// ============ Curriculum ============

async fn handle_grades(State(state): State<AppState>) -> Result<Json<GradeList>, AppError> {
    Ok(Json(state.resolver.available_grades().await?))
}

async fn handle_structure(
    State(state): State<AppState>,
    Path(grade): Path<String>,
) -> Result<Json<StructureResponse>, AppError> {
    let grade = parse_grade(&grade)?;
    Ok(Json(state.resolver.grade_structure(grade).await?))
}

async fn handle_grade_curriculum(
    State(state): State<AppState>,
    Path(grade): Path<String>,
) -> Result<Json<GradeCurriculum>, AppError> {
    let grade = parse_grade(&grade)?;
    Ok(Json(state.resolver.grade_curriculum(grade).await?))
}

#[derive(Deserialize)]
struct UserParams {
    grade: Option<String>,
}

/// Handler for `GET /content/curriculum/user`.
///
/// The caller's grade comes from `?grade=`, falling back to the
/// `x-user-grade` header. Missing both is a 400.
async fn handle_user_curriculum(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
    headers: HeaderMap,
) -> Result<Json<GradeCurriculum>, AppError> {
    let user_grade = user_grade_input(params.grade, &headers).ok_or_else(|| {
        bad_request(format!(
            "user grade required: pass ?grade= or the {} header",
            USER_GRADE_HEADER
        ))
    })?;

    Ok(Json(state.resolver.user_curriculum(&user_grade).await?))
}

/// First non-blank of the query value and the header.
fn user_grade_input(query: Option<String>, headers: &HeaderMap) -> Option<String> {
    let non_blank = |g: &String| !g.trim().is_empty();
    query.filter(non_blank).or_else(|| {
        headers
            .get(USER_GRADE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(non_blank)
    })
}

async fn handle_subject_concepts(
    State(state): State<AppState>,
    Path((grade, term, subject)): Path<(String, String, String)>,
) -> Result<Json<SubjectConcepts>, AppError> {
    let grade = parse_grade(&grade)?;
    let term = parse_term(&term)?;
    Ok(Json(
        state.resolver.subject_concepts(grade, term, &subject).await?,
    ))
}

async fn handle_concept(
    State(state): State<AppState>,
    Path((grade, term, subject, concept)): Path<(String, String, String, String)>,
) -> Result<Json<ConceptResponse>, AppError> {
    let grade = parse_grade(&grade)?;
    let term = parse_term(&term)?;
    Ok(Json(
        state
            .resolver
            .concept(grade, term, &subject, &concept)
            .await?,
    ))
}

// ============ POST /content/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    grade: String,
    #[serde(default)]
    term: Option<String>,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Deserialize)]
struct SearchParams {
    /// Maximum number of results.
    k: Option<usize>,
}

/// Handler for `POST /content/search`.
///
/// Returns `400` for a blank query or unknown grade/term, and `422` when
/// `query` or `grade` is missing from the body.
async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if params.k == Some(0) {
        return Err(bad_request("k must be at least 1"));
    }

    let query = ConceptQuery {
        query: req.query,
        grade: parse_grade(&req.grade)?,
        term: req.term.as_deref().map(parse_term).transpose()?,
        subject: req.subject.filter(|s| !s.trim().is_empty()),
        limit: params.k,
    };

    Ok(Json(state.resolver.search(&query).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grade::UnknownGrade;

    #[test]
    fn test_curriculum_errors_map_to_codes() {
        let cases = [
            (
                CurriculumError::from(UnknownGrade("13".into())),
                StatusCode::BAD_REQUEST,
                "unknown_grade",
            ),
            (CurriculumError::EmptyQuery, StatusCode::BAD_REQUEST, "bad_request"),
            (
                CurriculumError::InvalidSubject("..".into()),
                StatusCode::BAD_REQUEST,
                "bad_request",
            ),
            (
                CurriculumError::not_found("nothing here"),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                CurriculumError::FallbackUnavailable("P5.json missing".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "fallback_unavailable",
            ),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, code);
        }
    }

    #[test]
    fn test_parse_term_rejects_unknown() {
        let err = parse_term("Term3").unwrap_err();
        assert_eq!(err.code, "unknown_term");
        assert_eq!(parse_term("term2").unwrap(), Term::Term2);
    }

    #[test]
    fn test_parse_grade_accepts_codes_and_numbers() {
        assert_eq!(parse_grade("P5").unwrap(), Grade::P5);
        assert_eq!(parse_grade("10").unwrap(), Grade::G10);
        assert_eq!(parse_grade("kg1").unwrap(), Grade::Kg1);
    }

    #[test]
    fn test_blank_grade_query_defers_to_header() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_GRADE_HEADER, "5".parse().unwrap());

        assert_eq!(user_grade_input(Some("".into()), &headers).as_deref(), Some("5"));
        assert_eq!(user_grade_input(Some("  ".into()), &headers).as_deref(), Some("5"));
        assert_eq!(user_grade_input(Some("P6".into()), &headers).as_deref(), Some("P6"));
        assert_eq!(user_grade_input(None, &headers).as_deref(), Some("5"));

        let mut blank = HeaderMap::new();
        blank.insert(USER_GRADE_HEADER, " ".parse().unwrap());
        assert_eq!(user_grade_input(Some("".into()), &blank), None);
        assert_eq!(user_grade_input(None, &HeaderMap::new()), None);
    }
}

//! # API Server Module
//!
//! ## Purpose
//! REST API server exposing case management, batch renumbering, and
//! duplicate cleanup. This is the surface the practice-management frontend
//! calls; the engine returns structured reports and this layer turns them
//! into HTTP responses and user-facing notifications.
//!
//! ## Input/Output Specification
//! - **Input**: HTTP requests with case payloads, filters, batch triggers
//! - **Output**: JSON responses with cases, reports, notifications
//! - **Endpoints**: Case CRUD, renumber, duplicates, health, stats, runs
//!
//! ## Key Features
//! - Identity fields are always derived server-side, never accepted as input
//! - Every mutating response carries a `Notification` for the frontend
//! - CORS support for web frontends, toggled by configuration
//! - Structured error responses with category and recovery suggestion

use crate::errors::{RegistryError, Result};
use crate::registry::{CasePatch, NewCase};
use crate::renumber::RenumberReport;
use crate::utils::{SystemUtils, TextUtils};
use crate::CaseType;
use actix_cors::Cors;
use actix_web::middleware::Condition;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Application state for the API server
pub struct ApiServer {
    app_state: crate::AppState,
}

/// Query parameters for the case list endpoint
#[derive(Debug, Deserialize)]
pub struct ListCasesQuery {
    pub case_type: Option<String>,
}

/// Query parameters for the run journal endpoint
#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<usize>,
}

/// Renumber request payload
#[derive(Debug, Deserialize)]
pub struct RenumberRequest {
    /// Partition to renumber; all partitions when absent.
    #[serde(default)]
    pub case_type: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// Dedup request payload. Deletions must be requested explicitly; the
/// default is a read-only dry run.
#[derive(Debug, Deserialize)]
pub struct DeduplicateRequest {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_dry_run() -> bool {
    true
}

/// Outcome severity for user-facing notifications
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
}

/// User-facing outcome message. The engine only returns structured
/// reports; this layer is where they become text for the caller to show.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub components: HealthComponents,
}

/// Component health status
#[derive(Debug, Serialize)]
pub struct HealthComponents {
    pub storage: String,
    pub registry: String,
}

impl ApiServer {
    /// Create new API server
    pub async fn new(app_state: crate::AppState) -> Result<Self> {
        Ok(Self { app_state })
    }

    /// Run the API server
    pub async fn run(self) -> Result<()> {
        let bind_addr = format!(
            "{}:{}",
            self.app_state.config.server.host, self.app_state.config.server.port
        );
        let workers = self.app_state.config.server.workers;
        let enable_cors = self.app_state.config.server.enable_cors;

        tracing::info!("Starting API server on {}", bind_addr);

        // The builder holds non-Send internals; only the server handle may
        // live across an await, or the future cannot be spawned.
        let server = HttpServer::new(move || {
            App::new()
                .wrap(Condition::new(enable_cors, Cors::permissive()))
                .app_data(web::Data::new(self.app_state.clone()))
                .route("/", web::get().to(index_handler))
                .route("/health", web::get().to(health_handler))
                .route("/stats", web::get().to(stats_handler))
                .route("/cases", web::get().to(list_cases_handler))
                .route("/cases", web::post().to(create_case_handler))
                .route("/cases/{slug}", web::get().to(get_case_handler))
                .route("/cases/{slug}", web::put().to(update_case_handler))
                .route("/cases/{slug}", web::delete().to(delete_case_handler))
                .route("/renumber", web::post().to(renumber_handler))
                .route("/duplicates", web::get().to(duplicates_handler))
                .route("/deduplicate", web::post().to(deduplicate_handler))
                .route("/runs", web::get().to(runs_handler))
        })
        .workers(workers)
        .bind(&bind_addr)
        .map_err(|e| RegistryError::Internal {
            message: format!("Failed to bind server to {}: {}", bind_addr, e),
        })?
        .run();

        server.await.map_err(|e| RegistryError::Internal {
            message: format!("Server error: {}", e),
        })
    }
}

/// Maps engine errors onto HTTP responses with a structured body.
fn error_response(error: &RegistryError) -> HttpResponse {
    let body = serde_json::json!({
        "error": error.category(),
        "message": error.to_string(),
        "recoverable": error.is_recoverable(),
        "suggestion": error.recovery_suggestion(),
    });
    match error {
        RegistryError::CaseNotFound { .. } => HttpResponse::NotFound().json(body),
        RegistryError::SlugCollision { .. } => HttpResponse::Conflict().json(body),
        RegistryError::ValidationFailed { .. } | RegistryError::UnknownCaseType { .. } => {
            HttpResponse::BadRequest().json(body)
        }
        _ => {
            tracing::error!(error = %error, "request failed");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn parse_type_filter(raw: Option<&str>) -> Result<Option<CaseType>> {
    raw.map(CaseType::from_str).transpose()
}

/// Case list endpoint handler
async fn list_cases_handler(
    app_state: web::Data<crate::AppState>,
    query: web::Query<ListCasesQuery>,
) -> ActixResult<HttpResponse> {
    let case_type = match parse_type_filter(query.case_type.as_deref()) {
        Ok(filter) => filter,
        Err(e) => return Ok(error_response(&e)),
    };
    match app_state.registry.list_cases(case_type).await {
        Ok(cases) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "total": cases.len(),
            "cases": cases,
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Case creation endpoint handler
async fn create_case_handler(
    app_state: web::Data<crate::AppState>,
    request: web::Json<NewCase>,
) -> ActixResult<HttpResponse> {
    match app_state.registry.create_case(request.into_inner()).await {
        Ok(case) => {
            let notification = Notification::new(
                Severity::Success,
                format!("Created {}", TextUtils::truncate(&case.record.title, 80)),
            );
            Ok(HttpResponse::Created().json(serde_json::json!({
                "case": case,
                "notification": notification,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Single case lookup endpoint handler
async fn get_case_handler(
    app_state: web::Data<crate::AppState>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let slug = path.into_inner();
    match app_state.registry.get_case(&slug).await {
        Ok(case) => Ok(HttpResponse::Ok().json(case)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Case update endpoint handler
async fn update_case_handler(
    app_state: web::Data<crate::AppState>,
    path: web::Path<String>,
    request: web::Json<CasePatch>,
) -> ActixResult<HttpResponse> {
    let slug = path.into_inner();
    match app_state.registry.update_case(&slug, request.into_inner()).await {
        Ok(case) => {
            let notification = Notification::new(
                Severity::Success,
                format!("Updated {}", TextUtils::truncate(&case.record.title, 80)),
            );
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "case": case,
                "notification": notification,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Case deletion endpoint handler
async fn delete_case_handler(
    app_state: web::Data<crate::AppState>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let slug = path.into_inner();
    match app_state.registry.delete_case(&slug).await {
        Ok(renumber) => {
            let message = match &renumber {
                Some(report) if report.changed > 0 => {
                    format!("Deleted {} and renumbered {} peer case(s)", slug, report.changed)
                }
                _ => format!("Deleted {}", slug),
            };
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "deleted": slug,
                "renumber": renumber,
                "notification": Notification::new(Severity::Success, message),
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Batch renumbering endpoint handler
async fn renumber_handler(
    app_state: web::Data<crate::AppState>,
    request: web::Json<RenumberRequest>,
) -> ActixResult<HttpResponse> {
    let reports = match &request.case_type {
        Some(raw) => match raw.parse::<CaseType>() {
            Ok(case_type) => app_state
                .registry
                .renumber_type(case_type, request.force)
                .await
                .map(|report| vec![report]),
            Err(e) => return Ok(error_response(&e)),
        },
        None => app_state.registry.renumber_all(request.force).await,
    };

    match reports {
        Ok(reports) => {
            let notification = renumber_notification(&reports);
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "reports": reports,
                "notification": notification,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

fn renumber_notification(reports: &[RenumberReport]) -> Notification {
    let changed: usize = reports.iter().map(|r| r.changed).sum();
    let failed: usize = reports.iter().map(|r| r.failed).sum();
    let conflicts: usize = reports.iter().map(|r| r.conflicts.len()).sum();
    if failed > 0 || conflicts > 0 {
        Notification::new(
            Severity::Warning,
            format!(
                "Renumbered {} case(s) with {} failure(s) and {} conflict(s)",
                changed, failed, conflicts
            ),
        )
    } else if changed > 0 {
        Notification::new(Severity::Success, format!("Renumbered {} case(s)", changed))
    } else {
        Notification::new(Severity::Info, "Numbering already consistent")
    }
}

/// Duplicate scan endpoint handler
async fn duplicates_handler(app_state: web::Data<crate::AppState>) -> ActixResult<HttpResponse> {
    match app_state.registry.find_duplicates().await {
        Ok(report) => {
            let notification = if report.is_clean() {
                Notification::new(Severity::Success, "No duplicates found")
            } else {
                Notification::new(
                    Severity::Warning,
                    format!(
                        "{} duplicate group(s) involving {} case(s)",
                        report.group_count(),
                        report.stats.cases_involved
                    ),
                )
            };
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "report": report,
                "notification": notification,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Dedup execution endpoint handler
async fn deduplicate_handler(
    app_state: web::Data<crate::AppState>,
    request: web::Json<DeduplicateRequest>,
) -> ActixResult<HttpResponse> {
    match app_state.registry.deduplicate(request.dry_run).await {
        Ok(report) => {
            let notification = if report.dry_run {
                Notification::new(
                    Severity::Info,
                    format!("Dry run: {} case(s) would be removed", report.deleted),
                )
            } else if report.failed > 0 {
                Notification::new(
                    Severity::Warning,
                    format!("Removed {} duplicate(s), {} failed", report.deleted, report.failed),
                )
            } else if report.deleted > 0 {
                Notification::new(
                    Severity::Success,
                    format!("Removed {} duplicate(s)", report.deleted),
                )
            } else {
                Notification::new(Severity::Info, "Nothing to merge")
            };
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "report": report,
                "notification": notification,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Run journal endpoint handler
async fn runs_handler(
    app_state: web::Data<crate::AppState>,
    query: web::Query<RunsQuery>,
) -> ActixResult<HttpResponse> {
    let limit = query.limit.unwrap_or(20);
    match app_state.registry.recent_runs(limit).await {
        Ok(runs) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "total": runs.len(),
            "runs": runs,
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Health check endpoint handler
async fn health_handler(app_state: web::Data<crate::AppState>) -> ActixResult<HttpResponse> {
    let storage_status = match app_state.storage.health_check().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };
    let registry_status = match app_state.registry.snapshot().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let healthy = storage_status == "healthy" && registry_status == "healthy";
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        components: HealthComponents {
            storage: storage_status.to_string(),
            registry: registry_status.to_string(),
        },
    };

    if healthy {
        Ok(HttpResponse::Ok().json(response))
    } else {
        Ok(HttpResponse::ServiceUnavailable().json(response))
    }
}

/// Statistics endpoint handler
async fn stats_handler(app_state: web::Data<crate::AppState>) -> ActixResult<HttpResponse> {
    match app_state.registry.stats().await {
        Ok(stats) => {
            let database_size = SystemUtils::format_bytes(stats.storage.database_size_bytes);
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "registry": stats,
                "database_size": database_size,
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Index page handler
async fn index_handler() -> ActixResult<HttpResponse> {
    let html = r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Case Registry</title>
        <style>
            body { font-family: Arial, sans-serif; margin: 40px; }
            .header { color: #2c3e50; }
            .endpoint { margin: 20px 0; padding: 15px; background: #f8f9fa; border-radius: 5px; }
            .method { font-weight: bold; color: #27ae60; }
        </style>
    </head>
    <body>
        <h1 class="header">Case Registry API</h1>
        <p>Case identity and renumbering service for legal practice management. Titles, sequence numbers, and slugs are derived server-side and kept consistent across creates, edits, and deletions.</p>

        <h2>Available Endpoints</h2>

        <div class="endpoint">
            <span class="method">GET/POST</span> /cases
            <p>List cases (optionally filtered by case_type) or create a new case.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET/PUT/DELETE</span> /cases/{slug}
            <p>Fetch, update, or delete one case by its slug.</p>
        </div>

        <div class="endpoint">
            <span class="method">POST</span> /renumber
            <p>Renumber one partition or all of them. Accepts case_type and force.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /duplicates
            <p>Read-only duplicate scan across slugs, titles, and name+year.</p>
        </div>

        <div class="endpoint">
            <span class="method">POST</span> /deduplicate
            <p>Merge duplicate groups. Dry run by default; pass dry_run=false to delete.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /runs
            <p>Recent batch runs from the journal, newest first.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /health | /stats
            <p>Component health and registry statistics.</p>
        </div>

        <h2>Example Case Creation</h2>
        <pre>{
  "name": "Silva",
  "case_type": "antigo",
  "year": 2023,
  "month": 3,
  "client_email": "silva@example.com"
}</pre>
    </body>
    </html>
    "#;

    Ok(HttpResponse::Ok().content_type("text/html").body(html))
}

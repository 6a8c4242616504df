//! JSON API for document intake, approval actions, and workflow queries.
//!
//! - `POST  /api/documents`                      submit a document for approval
//! - `GET   /api/documents`                      list with search and paging
//! - `GET   /api/documents/{id}`                 document plus line items
//! - `PATCH /api/documents/{id}/total`           correct the total amount
//! - `POST  /api/documents/{id}/status`          approve/reject/hold as a named approver
//! - `GET   /api/documents/{id}/action/{action}` one-click emailed-link action
//! - `GET   /api/approval-logs`                  audit log query
//! - `GET   /api/settings/hierarchy`             current approval hierarchy

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use apflow_core::{
    Actor, ApproverIdentity, ApprovalType, AuditEntry, AuditQuery, Document, DocumentId,
    DocumentIntake, DocumentStatus, DocumentType, HierarchySnapshot, LineItem, WorkflowAction,
    WorkflowEngine, WorkflowError,
};
use apflow_db::repositories::{
    AuditLogRepository, DocumentListQuery, DocumentRepository, HierarchyRepository,
    RepositoryError, SqlAuditLogRepository, SqlDocumentRepository, SqlHierarchyRepository,
};
use apflow_db::DbPool;

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<WorkflowEngine>,
    documents: Arc<SqlDocumentRepository>,
    hierarchy: Arc<SqlHierarchyRepository>,
    audit: Arc<SqlAuditLogRepository>,
    default_gst_rate: Decimal,
}

impl ApiState {
    pub fn new(db_pool: DbPool, engine: Arc<WorkflowEngine>, default_gst_rate: Decimal) -> Self {
        Self {
            engine,
            documents: Arc::new(SqlDocumentRepository::new(db_pool.clone())),
            hierarchy: Arc::new(SqlHierarchyRepository::new(db_pool.clone())),
            audit: Arc::new(SqlAuditLogRepository::new(db_pool)),
            default_gst_rate,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/documents", post(create_document).get(list_documents))
        .route("/api/documents/{id}", get(get_document))
        .route("/api/documents/{id}/total", patch(update_total))
        .route("/api/documents/{id}/status", post(apply_status))
        .route("/api/documents/{id}/action/{action}", get(email_link_action))
        .route("/api/approval-logs", get(approval_logs))
        .route("/api/settings/hierarchy", get(hierarchy_settings))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Workflow(WorkflowError),
    Repository(RepositoryError),
    BadRequest(String),
}

impl From<WorkflowError> for ApiError {
    fn from(error: WorkflowError) -> Self {
        Self::Workflow(error)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        Self::Repository(error)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::Repository(error) => {
                warn!(event_name = "api_persistence_error", error = %error, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence failure".to_string())
            }
            Self::Workflow(error) => {
                let status = match error {
                    WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
                    WorkflowError::Forbidden { .. }
                    | WorkflowError::AnonymousNotPermitted { .. } => StatusCode::FORBIDDEN,
                    WorkflowError::InvalidTransition { .. } | WorkflowError::Conflict { .. } => {
                        StatusCode::CONFLICT
                    }
                    WorkflowError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
                    WorkflowError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
        };

        (status, Json(ErrorBody { success: false, error: message })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Intake
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LineItemPayload {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub document_type: String,
    pub invoice_number: Option<String>,
    pub po_number: Option<String>,
    pub vendor_info: Option<String>,
    pub total_amount: Decimal,
    pub gst_rate: Option<Decimal>,
    #[serde(default)]
    pub approval_type: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItemPayload>,
    pub document_url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    pub submitted_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub success: bool,
    pub document: Document,
    pub line_items: Vec<LineItem>,
    pub notified: bool,
}

async fn create_document(
    State(state): State<ApiState>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let document_type = DocumentType::parse(&request.document_type).ok_or_else(|| {
        ApiError::BadRequest(format!("unknown document type `{}`", request.document_type))
    })?;
    let approval_type = match request.approval_type.as_deref() {
        None | Some("") => ApprovalType::Hierarchy,
        Some(raw) => ApprovalType::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown approval type `{raw}`")))?,
    };

    let line_items = request
        .line_items
        .into_iter()
        .map(|item| LineItem {
            total: item.total.unwrap_or(item.quantity * item.unit_price),
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
        })
        .collect();

    let intake = DocumentIntake {
        document_type,
        invoice_number: request.invoice_number,
        po_number: request.po_number,
        vendor_info: request.vendor_info,
        total_amount: request.total_amount,
        gst_rate: request.gst_rate.unwrap_or(state.default_gst_rate),
        approval_type,
        line_items,
        document_url: request.document_url,
        attachments: request.attachments,
        custom_fields: request.custom_fields,
        submitted_by: request.submitted_by,
    };

    let routing = state.hierarchy.load_routing().await?;
    let outcome = state.engine.create_document(intake, &routing).await?;
    let line_items = state.documents.line_items(&outcome.document.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            success: true,
            document: outcome.document,
            line_items,
            notified: outcome.notified,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ListDocumentsParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub document_type: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub success: bool,
    pub documents: Vec<Document>,
    pub total: u64,
    pub filtered: u64,
}

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

async fn list_documents(
    State(state): State<ApiState>,
    Query(params): Query<ListDocumentsParams>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            DocumentStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status `{raw}`")))?,
        ),
    };
    let document_type = match params.document_type.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            DocumentType::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown document type `{raw}`")))?,
        ),
    };

    let query = DocumentListQuery {
        search: params.search.filter(|search| !search.trim().is_empty()),
        status,
        document_type,
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        offset: params.offset.unwrap_or(0),
    };

    let page = state.documents.list(&query).await?;
    Ok(Json(DocumentListResponse {
        success: true,
        documents: page.documents,
        total: page.total,
        filtered: page.filtered,
    }))
}

async fn get_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document_id = DocumentId(id.clone());
    let document = state
        .documents
        .find_by_id(&document_id)
        .await?
        .ok_or(ApiError::Workflow(WorkflowError::NotFound(id)))?;
    let line_items = state.documents.line_items(&document_id).await?;

    Ok(Json(DocumentResponse { success: true, document, line_items, notified: false }))
}

// ---------------------------------------------------------------------------
// Workflow actions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StatusActionRequest {
    pub action: String,
    pub actor_email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusActionResponse {
    pub success: bool,
    pub document: Document,
    pub audit_action: String,
    pub notified: bool,
}

async fn apply_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<StatusActionRequest>,
) -> Result<Json<StatusActionResponse>, ApiError> {
    let action = parse_action(&request.action)?;
    let snapshot = state.hierarchy.load_snapshot().await?;

    let actor = match &request.actor_email {
        Some(email) => Actor::Authenticated(resolve_identity(&state, email).await?),
        None => Actor::Anonymous,
    };

    let outcome = state
        .engine
        .apply_action(&DocumentId(id), action, &actor, request.notes.clone(), &snapshot)
        .await?;

    Ok(Json(StatusActionResponse {
        success: true,
        document: outcome.document,
        audit_action: outcome.audit_action,
        notified: outcome.notified,
    }))
}

/// The unauthenticated path behind the emailed approve/reject/hold links.
/// Responds with a small HTML page since the click comes from a mail client.
async fn email_link_action(
    State(state): State<ApiState>,
    Path((id, raw_action)): Path<(String, String)>,
) -> Result<Html<String>, ApiError> {
    let action = parse_action(&raw_action)?;
    let snapshot = state.hierarchy.load_snapshot().await?;

    let outcome = state
        .engine
        .apply_action(&DocumentId(id), action, &Actor::Anonymous, None, &snapshot)
        .await?;

    Ok(Html(format!(
        "<html><body><h2>Thank you</h2>\
         <p>{} {} has been recorded as <strong>{}</strong>.</p></body></html>",
        match outcome.document.document_type {
            DocumentType::Invoice => "Invoice",
            DocumentType::PurchaseOrder => "Purchase order",
        },
        outcome.document.external_ref(),
        outcome.document.status.as_str()
    )))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTotalRequest {
    pub total_amount: Decimal,
    pub actor: Option<String>,
}

async fn update_total(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTotalRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document_id = DocumentId(id);
    let actor = request.actor.unwrap_or_else(|| "system".to_string());
    let document = state.engine.update_total(&document_id, request.total_amount, actor).await?;
    let line_items = state.documents.line_items(&document_id).await?;

    Ok(Json(DocumentResponse { success: true, document, line_items, notified: false }))
}

// ---------------------------------------------------------------------------
// Audit log and settings
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ApprovalLogParams {
    pub document_id: Option<String>,
    pub action: Option<String>,
    pub actor: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalLogResponse {
    pub success: bool,
    pub entries: Vec<AuditEntry>,
}

async fn approval_logs(
    State(state): State<ApiState>,
    Query(params): Query<ApprovalLogParams>,
) -> Result<Json<ApprovalLogResponse>, ApiError> {
    let filter = AuditQuery {
        document_id: params.document_id.map(DocumentId),
        action: params.action,
        actor: params.actor,
        from: parse_timestamp(params.from.as_deref())?,
        to: parse_timestamp(params.to.as_deref())?,
        limit: Some(params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)),
    };

    let entries = state.audit.query(&filter).await?;
    Ok(Json(ApprovalLogResponse { success: true, entries }))
}

#[derive(Debug, Serialize)]
pub struct HierarchySettingsResponse {
    pub success: bool,
    pub hierarchy: HierarchySnapshot,
}

async fn hierarchy_settings(
    State(state): State<ApiState>,
) -> Result<Json<HierarchySettingsResponse>, ApiError> {
    let hierarchy = state.hierarchy.load_snapshot().await?;
    Ok(Json(HierarchySettingsResponse { success: true, hierarchy }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_action(raw: &str) -> Result<WorkflowAction, ApiError> {
    WorkflowAction::parse(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown action `{raw}`")))
}

fn parse_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| Some(parsed.with_timezone(&Utc)))
        .map_err(|_| ApiError::BadRequest(format!("`{raw}` is not a valid RFC 3339 timestamp")))
}

/// Acting approvers are looked up in the directory for their display name and
/// active flag. Emails without a directory row still act under their address;
/// the engine's approver check decides whether they may touch the document.
async fn resolve_identity(state: &ApiState, email: &str) -> Result<ApproverIdentity, ApiError> {
    let approvers = state.hierarchy.list_approvers().await?;
    let wanted = email.trim().to_ascii_lowercase();

    Ok(approvers
        .into_iter()
        .find(|approver| approver.email.trim().to_ascii_lowercase() == wanted)
        .map(|approver| ApproverIdentity {
            name: approver.name,
            email: approver.email,
            active: approver.active,
        })
        .unwrap_or_else(|| ApproverIdentity {
            name: email.to_string(),
            email: email.to_string(),
            active: true,
        }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    use apflow_core::hierarchy::HierarchyLevel;
    use apflow_core::WorkflowEngine;
    use apflow_db::repositories::{
        HierarchyRepository, SqlDocumentRepository, SqlHierarchyRepository,
    };
    use apflow_db::{connect_with_settings, migrations, DbPool};
    use apflow_notify::{EmailNotificationGateway, NoopMailTransport};

    use super::{router, ApiState};

    async fn test_app() -> (axum::Router, DbPool) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let hierarchy = SqlHierarchyRepository::new(pool.clone());
        hierarchy
            .replace_levels(&[
                HierarchyLevel {
                    level: 1,
                    name: "Asha".to_string(),
                    email: "asha@example.test".to_string(),
                    active: true,
                },
                HierarchyLevel {
                    level: 2,
                    name: "Bala".to_string(),
                    email: "bala@example.test".to_string(),
                    active: true,
                },
            ])
            .await
            .expect("seed levels");

        let gateway = Arc::new(EmailNotificationGateway::new(
            Arc::new(NoopMailTransport),
            "approvals@example.test",
            "http://localhost:3000",
        ));
        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(SqlDocumentRepository::new(pool.clone())),
            gateway,
        ));
        let state = ApiState::new(pool.clone(), engine, Decimal::new(18, 0));
        (router(state), pool)
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn create_invoice(app: &axum::Router) -> serde_json::Value {
        let request = json_request(
            "POST",
            "/api/documents",
            serde_json::json!({
                "document_type": "invoice",
                "invoice_number": "INV-9001",
                "vendor_info": "Acme Supplies",
                "total_amount": "1180.00",
                "line_items": [
                    { "description": "Paper reams", "quantity": "10", "unit_price": "118.00" }
                ]
            }),
        );
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await
    }

    #[tokio::test]
    async fn intake_returns_the_created_document_with_line_items() {
        let (app, pool) = test_app().await;

        let body = create_invoice(&app).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["document"]["status"], "pending");
        assert_eq!(body["document"]["approver_email"], "asha@example.test");
        assert_eq!(body["document"]["subtotal"], "1000.00");
        assert_eq!(body["document"]["gst_amount"], "180.00");
        assert_eq!(body["line_items"].as_array().map(Vec::len), Some(1));

        let id = body["document"]["id"].as_str().expect("id").to_string();
        let response = app
            .clone()
            .oneshot(Request::get(format!("/api/documents/{id}")).body(Body::empty()).unwrap())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = read_json(response).await;
        assert_eq!(fetched["document"]["invoice_number"], "INV-9001");

        pool.close().await;
    }

    #[tokio::test]
    async fn named_approver_walks_the_chain_and_mismatches_are_forbidden() {
        let (app, pool) = test_app().await;
        let created = create_invoice(&app).await;
        let id = created["document"]["id"].as_str().expect("id").to_string();

        // Wrong approver first.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/documents/{id}/status"),
                serde_json::json!({ "action": "approve", "actor_email": "bala@example.test" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/documents/{id}/status"),
                serde_json::json!({ "action": "approve", "actor_email": "asha@example.test" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["audit_action"], "approved_level_1");
        assert_eq!(body["document"]["status"], "pending");
        assert_eq!(body["document"]["current_approval_level"], 2);
        assert_eq!(body["document"]["approver_email"], "bala@example.test");

        pool.close().await;
    }

    #[tokio::test]
    async fn email_link_records_the_action_and_answers_with_html() {
        let (app, pool) = test_app().await;
        let created = create_invoice(&app).await;
        let id = created["document"]["id"].as_str().expect("id").to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/documents/{id}/action/reject"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let html = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(html.contains("INV-9001"));
        assert!(html.contains("rejected"));

        pool.close().await;
    }

    #[tokio::test]
    async fn amount_correction_reopens_the_document_at_the_new_split() {
        let (app, pool) = test_app().await;
        let created = create_invoice(&app).await;
        let id = created["document"]["id"].as_str().expect("id").to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/api/documents/{id}/total"),
                serde_json::json!({ "total_amount": "2360.00", "actor": "clerk@example.test" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["document"]["status"], "pending");
        assert_eq!(body["document"]["subtotal"], "2000.00");
        assert_eq!(body["document"]["gst_amount"], "360.00");

        pool.close().await;
    }

    #[tokio::test]
    async fn audit_log_filters_by_document() {
        let (app, pool) = test_app().await;
        let created = create_invoice(&app).await;
        let id = created["document"]["id"].as_str().expect("id").to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/approval-logs?document_id={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let entries = body["entries"].as_array().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["action"], "created");

        pool.close().await;
    }

    #[tokio::test]
    async fn error_mapping_covers_not_found_and_bad_requests() {
        let (app, pool) = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::get("/api/documents/missing").body(Body::empty()).unwrap())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/documents/missing/action/escalate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        pool.close().await;
    }

    #[tokio::test]
    async fn hierarchy_settings_report_the_configured_levels() {
        let (app, pool) = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::get("/api/settings/hierarchy").body(Body::empty()).unwrap())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["hierarchy"]["levels"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["hierarchy"]["skip_middle_approver"], false);

        pool.close().await;
    }
}

//! Readiness probe for load balancers and the CLI doctor command.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use apflow_db::DbPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseProbe {
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: ProbeStatus,
    pub database: DatabaseProbe,
    pub checked_at: DateTime<Utc>,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(db_pool)
}

async fn health(State(pool): State<DbPool>) -> (StatusCode, Json<HealthReport>) {
    let database = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await {
        Ok(_) => DatabaseProbe { status: ProbeStatus::Ready, error: None },
        Err(error) => {
            DatabaseProbe { status: ProbeStatus::Degraded, error: Some(error.to_string()) }
        }
    };

    let report = HealthReport { status: database.status, database, checked_at: Utc::now() };
    let code = match report.status {
        ProbeStatus::Ready => StatusCode::OK,
        ProbeStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(report))
}

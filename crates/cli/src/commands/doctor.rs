use serde::Serialize;

use apflow_core::config::{AppConfig, LoadOptions};
use apflow_db::connect_with_settings;
use apflow_db::repositories::{HierarchyRepository, SqlHierarchyRepository};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_mail_relay(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["mail_relay_readiness", "database_connectivity", "approval_routes"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_clear =
        checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_clear { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_clear {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_mail_relay(config: &AppConfig) -> DoctorCheck {
    if !config.mail.enabled {
        return DoctorCheck {
            name: "mail_relay_readiness",
            status: CheckStatus::Skipped,
            details: "outbound mail is disabled".to_string(),
        };
    }

    DoctorCheck {
        name: "mail_relay_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "relay `{}`, sender `{}` validated by config contract",
            config.mail.base_url, config.mail.from_address
        ),
    }
}

/// Connectivity and approval-route checks share one pool; if the connection
/// fails the route check is reported as skipped rather than a second failure.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "approval_routes",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let mut checks = vec![DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        }];

        checks.push(check_approval_routes(&pool).await);
        pool.close().await;
        checks
    })
}

async fn check_approval_routes(pool: &apflow_db::DbPool) -> DoctorCheck {
    let repo = SqlHierarchyRepository::new(pool.clone());

    let snapshot = match repo.load_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            return DoctorCheck {
                name: "approval_routes",
                status: CheckStatus::Fail,
                details: format!("failed to load hierarchy (is the schema migrated?): {error}"),
            };
        }
    };
    let routing = match repo.load_routing().await {
        Ok(routing) => routing,
        Err(error) => {
            return DoctorCheck {
                name: "approval_routes",
                status: CheckStatus::Fail,
                details: format!("failed to load approval routing: {error}"),
            };
        }
    };

    let has_hierarchy = snapshot.levels.iter().any(|level| level.active);
    let has_single = routing.active_single_approver().is_some();
    let departments_with_approvers =
        routing.departments.values().filter(|approvers| !approvers.is_empty()).count();

    if !has_hierarchy && !has_single && departments_with_approvers == 0 {
        return DoctorCheck {
            name: "approval_routes",
            status: CheckStatus::Fail,
            details: "no approval route configured: hierarchy is empty, no single approver, no department approvers".to_string(),
        };
    }

    DoctorCheck {
        name: "approval_routes",
        status: CheckStatus::Pass,
        details: format!(
            "{} hierarchy level(s), single approver {}, {} department(s) with approvers",
            snapshot.levels.len(),
            if has_single { "set" } else { "unset" },
            departments_with_approvers
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::Row;

use apflow_core::domain::approver::{ApprovalDepartment, Approver, ApproverId, Role};
use apflow_core::hierarchy::{ApprovalRouting, Assignee, HierarchyLevel, HierarchySnapshot};

use super::{decode_err, unknown_variant, HierarchyRepository, RepositoryError};
use crate::DbPool;

/// Partial update of the settings singleton. `None` fields are left alone;
/// the clear flags remove the optional seats entirely.
#[derive(Clone, Debug, Default)]
pub struct HierarchySettingsUpdate {
    pub skip_middle_approver: Option<bool>,
    pub final_approver: Option<Assignee>,
    pub clear_final_approver: bool,
    pub single_approver_email: Option<String>,
    pub clear_single_approver: bool,
}

pub struct SqlHierarchyRepository {
    pool: DbPool,
}

impl SqlHierarchyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

struct SettingsRow {
    skip_middle_approver: bool,
    final_approver_name: Option<String>,
    final_approver_email: Option<String>,
    single_approver_email: Option<String>,
    version: u32,
}

fn row_to_settings(row: &sqlx::sqlite::SqliteRow) -> Result<SettingsRow, RepositoryError> {
    let skip: i64 = row.try_get("skip_middle_approver").map_err(decode_err)?;
    let version: i64 = row.try_get("version").map_err(decode_err)?;
    Ok(SettingsRow {
        skip_middle_approver: skip != 0,
        final_approver_name: row.try_get("final_approver_name").map_err(decode_err)?,
        final_approver_email: row.try_get("final_approver_email").map_err(decode_err)?,
        single_approver_email: row.try_get("single_approver_email").map_err(decode_err)?,
        version: u32::try_from(version)
            .map_err(|_| unknown_variant("version", &version.to_string()))?,
    })
}

fn row_to_level(row: &sqlx::sqlite::SqliteRow) -> Result<HierarchyLevel, RepositoryError> {
    let level: i64 = row.try_get("level").map_err(decode_err)?;
    let active: i64 = row.try_get("active").map_err(decode_err)?;
    Ok(HierarchyLevel {
        level: u32::try_from(level).map_err(|_| unknown_variant("level", &level.to_string()))?,
        name: row.try_get("approver_name").map_err(decode_err)?,
        email: row.try_get("approver_email").map_err(decode_err)?,
        active: active != 0,
    })
}

fn row_to_approver(row: &sqlx::sqlite::SqliteRow) -> Result<Approver, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let role: String = row.try_get("role").map_err(decode_err)?;
    let department: String = row.try_get("department").map_err(decode_err)?;
    let active: i64 = row.try_get("active").map_err(decode_err)?;

    Ok(Approver {
        id: ApproverId(id),
        name: row.try_get("name").map_err(decode_err)?,
        email: row.try_get("email").map_err(decode_err)?,
        role: Role::parse(&role).ok_or_else(|| unknown_variant("role", &role))?,
        department: ApprovalDepartment::parse(&department)
            .ok_or_else(|| unknown_variant("department", &department))?,
        active: active != 0,
    })
}

async fn fetch_settings(pool: &DbPool) -> Result<SettingsRow, RepositoryError> {
    let row = sqlx::query(
        "SELECT skip_middle_approver, final_approver_name, final_approver_email,
                single_approver_email, version
         FROM hierarchy_settings WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;
    row_to_settings(&row)
}

async fn fetch_levels(pool: &DbPool) -> Result<Vec<HierarchyLevel>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT level, approver_name, approver_email, active
         FROM hierarchy_level ORDER BY level ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_level).collect()
}

fn build_snapshot(levels: Vec<HierarchyLevel>, settings: SettingsRow) -> HierarchySnapshot {
    let max_level = levels.iter().map(|entry| entry.level).max().unwrap_or(0);
    let final_approver = match (settings.final_approver_name, settings.final_approver_email) {
        (Some(name), Some(email)) => {
            Some(HierarchyLevel { level: max_level + 1, name, email, active: true })
        }
        _ => None,
    };

    HierarchySnapshot::new(
        settings.version,
        levels,
        settings.skip_middle_approver,
        final_approver,
    )
}

#[async_trait]
impl HierarchyRepository for SqlHierarchyRepository {
    async fn load_snapshot(&self) -> Result<HierarchySnapshot, RepositoryError> {
        let levels = fetch_levels(&self.pool).await?;
        let settings = fetch_settings(&self.pool).await?;
        Ok(build_snapshot(levels, settings))
    }

    async fn load_routing(&self) -> Result<ApprovalRouting, RepositoryError> {
        let levels = fetch_levels(&self.pool).await?;
        let settings = fetch_settings(&self.pool).await?;

        let rows = sqlx::query(
            "SELECT da.department AS assignment_department, da.position,
                    a.id, a.name, a.email, a.role, a.department, a.active
             FROM department_approver da
             JOIN approver a ON a.id = da.approver_id
             ORDER BY da.department ASC, da.position ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut departments: BTreeMap<ApprovalDepartment, Vec<Approver>> = BTreeMap::new();
        for row in &rows {
            let tag: String = row.try_get("assignment_department").map_err(decode_err)?;
            let department = ApprovalDepartment::parse(&tag)
                .ok_or_else(|| unknown_variant("department", &tag))?;
            departments.entry(department).or_default().push(row_to_approver(row)?);
        }

        let single_approver = match settings.single_approver_email.as_deref() {
            Some(email) => {
                let row = sqlx::query(
                    "SELECT id, name, email, role, department, active
                     FROM approver WHERE email = ?",
                )
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
                match row {
                    Some(ref row) => Some(row_to_approver(row)?),
                    None => None,
                }
            }
            None => None,
        };

        Ok(ApprovalRouting {
            hierarchy: build_snapshot(levels, settings),
            departments,
            single_approver,
        })
    }

    async fn replace_levels(&self, levels: &[HierarchyLevel]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM hierarchy_level").execute(&mut *tx).await?;
        for level in levels {
            sqlx::query(
                "INSERT INTO hierarchy_level (level, approver_name, approver_email, active)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(level.level)
            .bind(&level.name)
            .bind(&level.email)
            .bind(level.active)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE hierarchy_settings SET version = version + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_settings(
        &self,
        update: &HierarchySettingsUpdate,
    ) -> Result<HierarchySnapshot, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(skip) = update.skip_middle_approver {
            sqlx::query("UPDATE hierarchy_settings SET skip_middle_approver = ? WHERE id = 1")
                .bind(skip)
                .execute(&mut *tx)
                .await?;
        }
        if update.clear_final_approver {
            sqlx::query(
                "UPDATE hierarchy_settings
                 SET final_approver_name = NULL, final_approver_email = NULL WHERE id = 1",
            )
            .execute(&mut *tx)
            .await?;
        } else if let Some(seat) = &update.final_approver {
            sqlx::query(
                "UPDATE hierarchy_settings
                 SET final_approver_name = ?, final_approver_email = ? WHERE id = 1",
            )
            .bind(&seat.name)
            .bind(&seat.email)
            .execute(&mut *tx)
            .await?;
        }
        if update.clear_single_approver {
            sqlx::query("UPDATE hierarchy_settings SET single_approver_email = NULL WHERE id = 1")
                .execute(&mut *tx)
                .await?;
        } else if let Some(email) = &update.single_approver_email {
            sqlx::query("UPDATE hierarchy_settings SET single_approver_email = ? WHERE id = 1")
                .bind(email)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE hierarchy_settings SET version = version + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.load_snapshot().await
    }

    async fn upsert_approver(&self, approver: &Approver) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approver (id, name, email, role, department, active)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 department = excluded.department,
                 active = excluded.active",
        )
        .bind(&approver.id.0)
        .bind(&approver.name)
        .bind(&approver.email)
        .bind(approver.role.as_str())
        .bind(approver.department.as_str())
        .bind(approver.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_approvers(&self) -> Result<Vec<Approver>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, email, role, department, active FROM approver ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_approver).collect()
    }

    async fn set_department_order(
        &self,
        department: ApprovalDepartment,
        order: &[ApproverId],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM department_approver WHERE department = ?")
            .bind(department.as_str())
            .execute(&mut *tx)
            .await?;
        for (position, approver_id) in order.iter().enumerate() {
            sqlx::query(
                "INSERT INTO department_approver (department, position, approver_id)
                 VALUES (?, ?, ?)",
            )
            .bind(department.as_str())
            .bind(position as i64)
            .bind(&approver_id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use apflow_core::domain::approver::{ApprovalDepartment, Approver, ApproverId, Role};
    use apflow_core::hierarchy::{Assignee, HierarchyLevel};

    use super::{HierarchySettingsUpdate, SqlHierarchyRepository};
    use crate::repositories::HierarchyRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlHierarchyRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlHierarchyRepository::new(pool)
    }

    fn seat(level: u32, name: &str) -> HierarchyLevel {
        HierarchyLevel {
            level,
            name: name.to_string(),
            email: format!("{}@example.test", name.to_ascii_lowercase()),
            active: true,
        }
    }

    fn approver(id: &str, name: &str, department: ApprovalDepartment, active: bool) -> Approver {
        Approver {
            id: ApproverId(id.to_string()),
            name: name.to_string(),
            email: format!("{}@example.test", name.to_ascii_lowercase()),
            role: Role::Approver,
            department,
            active,
        }
    }

    #[tokio::test]
    async fn snapshot_reflects_levels_settings_and_the_final_seat() {
        let repo = setup().await;
        repo.replace_levels(&[seat(1, "Asha"), seat(2, "Bala")]).await.expect("levels");

        let snapshot = repo
            .update_settings(&HierarchySettingsUpdate {
                skip_middle_approver: Some(true),
                final_approver: Some(Assignee {
                    name: "Chitra".to_string(),
                    email: "chitra@example.test".to_string(),
                }),
                ..HierarchySettingsUpdate::default()
            })
            .await
            .expect("settings");

        assert!(snapshot.skip_middle_approver);
        assert_eq!(snapshot.max_level(), 2);
        assert_eq!(snapshot.final_level(), 3);
        assert_eq!(
            snapshot.resolve(3).map(|a| a.email),
            Some("chitra@example.test".to_string())
        );
    }

    #[tokio::test]
    async fn every_configuration_write_bumps_the_version() {
        let repo = setup().await;

        let initial = repo.load_snapshot().await.expect("snapshot").version;
        repo.replace_levels(&[seat(1, "Asha")]).await.expect("levels");
        let after_levels = repo.load_snapshot().await.expect("snapshot").version;
        assert_eq!(after_levels, initial + 1);

        repo.update_settings(&HierarchySettingsUpdate {
            skip_middle_approver: Some(false),
            ..HierarchySettingsUpdate::default()
        })
        .await
        .expect("settings");
        let after_settings = repo.load_snapshot().await.expect("snapshot").version;
        assert_eq!(after_settings, after_levels + 1);
    }

    #[tokio::test]
    async fn clearing_the_final_seat_removes_it_from_the_snapshot() {
        let repo = setup().await;
        repo.replace_levels(&[seat(1, "Asha")]).await.expect("levels");
        repo.update_settings(&HierarchySettingsUpdate {
            final_approver: Some(Assignee {
                name: "Chitra".to_string(),
                email: "chitra@example.test".to_string(),
            }),
            ..HierarchySettingsUpdate::default()
        })
        .await
        .expect("set final");

        let snapshot = repo
            .update_settings(&HierarchySettingsUpdate {
                clear_final_approver: true,
                ..HierarchySettingsUpdate::default()
            })
            .await
            .expect("clear final");
        assert!(snapshot.resolve(snapshot.final_level()).is_none());
    }

    #[tokio::test]
    async fn routing_orders_department_approvers_by_position() {
        let repo = setup().await;
        repo.upsert_approver(&approver("ap-1", "Meera", ApprovalDepartment::Invoice, true))
            .await
            .expect("approver");
        repo.upsert_approver(&approver("ap-2", "Nikhil", ApprovalDepartment::Invoice, true))
            .await
            .expect("approver");

        repo.set_department_order(
            ApprovalDepartment::Invoice,
            &[ApproverId("ap-2".to_string()), ApproverId("ap-1".to_string())],
        )
        .await
        .expect("order");

        let routing = repo.load_routing().await.expect("routing");
        let first = routing
            .first_department_approver(ApprovalDepartment::Invoice)
            .expect("first approver");
        assert_eq!(first.email, "nikhil@example.test");
    }

    #[tokio::test]
    async fn single_approver_is_looked_up_in_the_directory() {
        let repo = setup().await;
        repo.upsert_approver(&approver("ap-3", "Omar", ApprovalDepartment::PurchaseOrder, true))
            .await
            .expect("approver");
        repo.update_settings(&HierarchySettingsUpdate {
            single_approver_email: Some("omar@example.test".to_string()),
            ..HierarchySettingsUpdate::default()
        })
        .await
        .expect("settings");

        let routing = repo.load_routing().await.expect("routing");
        assert_eq!(
            routing.active_single_approver().map(|a| a.email.clone()),
            Some("omar@example.test".to_string())
        );

        // An address with no directory entry yields no single approver.
        repo.update_settings(&HierarchySettingsUpdate {
            single_approver_email: Some("ghost@example.test".to_string()),
            ..HierarchySettingsUpdate::default()
        })
        .await
        .expect("settings");
        let routing = repo.load_routing().await.expect("routing");
        assert!(routing.active_single_approver().is_none());
    }

    #[tokio::test]
    async fn upsert_approver_updates_in_place() {
        let repo = setup().await;
        let mut entry = approver("ap-4", "Priya", ApprovalDepartment::Invoice, true);
        repo.upsert_approver(&entry).await.expect("insert");

        entry.active = false;
        repo.upsert_approver(&entry).await.expect("update");

        let approvers = repo.list_approvers().await.expect("list");
        assert_eq!(approvers.len(), 1);
        assert!(!approvers[0].active);
    }
}

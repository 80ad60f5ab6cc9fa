use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::{StoreError, WorkStore};
use crate::config::DatabaseConfig;
use crate::model::{
    ContainerId, Job, JobId, NewWorkOrder, NewWorkPlan, OrderId, OrderStatus, PlanId, SetId,
    WorkOrder, WorkPlan,
};
use crate::priority::Priority;

/// SQLite-backed work store. Batch inserts run in a single transaction and the
/// unique indexes in the migrations back the (plan, index) and (order, container)
/// constraints.
#[derive(Debug, Clone)]
pub struct SqliteWorkStore {
    pool: SqlitePool,
}

impl SqliteWorkStore {
    /// Open the database, creating it when missing, and optionally run migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(&config.url).await.map_err(backend)? {
            info!("Creating database at {}", config.url);
            sqlx::Sqlite::create_database(&config.url).await.map_err(backend)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(backend)?;

        if config.auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    /// Close every pooled connection
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Backend(e.to_string()))
}

fn opt_json<T: serde::de::DeserializeOwned>(text: Option<String>) -> Result<Option<T>, StoreError> {
    text.as_deref().map(from_json).transpose()
}

fn parse_uuid(text: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(text).map_err(|e| StoreError::Backend(format!("bad uuid {text}: {e}")))
}

fn parse_set(text: Option<String>) -> Result<Option<SetId>, StoreError> {
    text.as_deref().map(|t| parse_uuid(t).map(SetId)).transpose()
}

fn set_text(id: Option<SetId>) -> Option<String> {
    id.map(|s| s.to_string())
}

fn missing(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn plan_from_row(row: &SqliteRow) -> Result<WorkPlan, StoreError> {
    let uuid: String = row.try_get("uuid").map_err(backend)?;
    let priority: String = row.try_get("priority").map_err(backend)?;
    Ok(WorkPlan {
        id: PlanId(row.try_get("id").map_err(backend)?),
        uuid: parse_uuid(&uuid)?,
        owner_email: row.try_get("owner_email").map_err(backend)?,
        product: opt_json(row.try_get("product").map_err(backend)?)?,
        project: opt_json(row.try_get("project").map_err(backend)?)?,
        original_set_id: parse_set(row.try_get("original_set_id").map_err(backend)?)?,
        comment: row.try_get("comment").map_err(backend)?,
        desired_date: row.try_get::<Option<NaiveDate>, _>("desired_date").map_err(backend)?,
        priority: Priority::from_name(&priority),
        cancelled_at: row.try_get("cancelled_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn order_from_row(row: &SqliteRow) -> Result<WorkOrder, StoreError> {
    let uuid: String = row.try_get("uuid").map_err(backend)?;
    let process: String = row.try_get("process").map_err(backend)?;
    let choices: String = row.try_get("module_choices").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    let index: i64 = row.try_get("order_index").map_err(backend)?;
    Ok(WorkOrder {
        id: OrderId(row.try_get("id").map_err(backend)?),
        uuid: parse_uuid(&uuid)?,
        plan_id: PlanId(row.try_get("plan_id").map_err(backend)?),
        order_index: index as usize,
        process: from_json(&process)?,
        module_choices: from_json(&choices)?,
        original_set_id: parse_set(row.try_get("original_set_id").map_err(backend)?)?,
        set_id: parse_set(row.try_get("set_id").map_err(backend)?)?,
        finished_set_id: parse_set(row.try_get("finished_set_id").map_err(backend)?)?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown order status {status}")))?,
        dispatch_date: row.try_get("dispatch_date").map_err(backend)?,
        close_comment: row.try_get("close_comment").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<Job, StoreError> {
    let uuid: String = row.try_get("uuid").map_err(backend)?;
    let container: String = row.try_get("container_id").map_err(backend)?;
    Ok(Job {
        id: JobId(row.try_get("id").map_err(backend)?),
        uuid: parse_uuid(&uuid)?,
        order_id: OrderId(row.try_get("order_id").map_err(backend)?),
        container_id: ContainerId(container),
        started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at").map_err(backend)?,
        completed_at: row.try_get("completed_at").map_err(backend)?,
        cancelled_at: row.try_get("cancelled_at").map_err(backend)?,
        broken_at: row.try_get("broken_at").map_err(backend)?,
        close_comment: row.try_get("close_comment").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

#[async_trait]
impl WorkStore for SqliteWorkStore {
    async fn create_plan(&self, plan: &NewWorkPlan) -> Result<WorkPlan, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO work_plans (uuid, owner_email, priority, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(plan.uuid.to_string())
        .bind(&plan.owner_email)
        .bind(Priority::default().as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        let id = PlanId(result.last_insert_rowid());
        self.load_plan(id).await?.ok_or_else(|| missing("work plan", id))
    }

    async fn update_plan(&self, plan: &WorkPlan) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE work_plans
            SET product = ?2, project = ?3, original_set_id = ?4, comment = ?5,
                desired_date = ?6, priority = ?7, cancelled_at = ?8, updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(plan.id.0)
        .bind(plan.product.as_ref().map(to_json).transpose()?)
        .bind(plan.project.as_ref().map(to_json).transpose()?)
        .bind(set_text(plan.original_set_id))
        .bind(&plan.comment)
        .bind(plan.desired_date)
        .bind(plan.priority.as_str())
        .bind(plan.cancelled_at)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(missing("work plan", plan.id));
        }
        Ok(())
    }

    async fn load_plan(&self, id: PlanId) -> Result<Option<WorkPlan>, StoreError> {
        let row = sqlx::query("SELECT * FROM work_plans WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(plan_from_row).transpose()
    }

    async fn insert_orders(
        &self,
        plan_id: PlanId,
        orders: &[NewWorkOrder],
    ) -> Result<Vec<WorkOrder>, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut ids = Vec::with_capacity(orders.len());

        for order in orders {
            let result = sqlx::query(
                r#"
                INSERT INTO work_orders
                    (uuid, plan_id, order_index, process, module_choices, original_set_id,
                     set_id, status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                "#,
            )
            .bind(order.uuid.to_string())
            .bind(plan_id.0)
            .bind(order.order_index as i64)
            .bind(to_json(&order.process)?)
            .bind(to_json(&order.module_choices)?)
            .bind(set_text(order.original_set_id))
            .bind(set_text(order.set_id))
            .bind(OrderStatus::Queued.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            ids.push(OrderId(result.last_insert_rowid()));
        }

        tx.commit().await.map_err(backend)?;

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            created.push(self.load_order(id).await?.ok_or_else(|| missing("work order", id))?);
        }
        Ok(created)
    }

    async fn load_orders(&self, plan_id: PlanId) -> Result<Vec<WorkOrder>, StoreError> {
        let rows = sqlx::query("SELECT * FROM work_orders WHERE plan_id = ?1 ORDER BY order_index ASC")
            .bind(plan_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(order_from_row).collect()
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<WorkOrder>, StoreError> {
        let row = sqlx::query("SELECT * FROM work_orders WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_order(&self, order: &WorkOrder) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE work_orders
            SET original_set_id = ?2, set_id = ?3, finished_set_id = ?4, status = ?5,
                dispatch_date = ?6, close_comment = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(order.id.0)
        .bind(set_text(order.original_set_id))
        .bind(set_text(order.set_id))
        .bind(set_text(order.finished_set_id))
        .bind(order.status.as_str())
        .bind(order.dispatch_date)
        .bind(&order.close_comment)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(missing("work order", order.id));
        }
        Ok(())
    }

    async fn insert_jobs(
        &self,
        order_id: OrderId,
        containers: &[ContainerId],
    ) -> Result<Vec<Job>, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut ids = Vec::with_capacity(containers.len());

        for container in containers {
            let result = sqlx::query(
                r#"
                INSERT INTO jobs (uuid, order_id, container_id, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(order_id.0)
            .bind(&container.0)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            ids.push(JobId(result.last_insert_rowid()));
        }

        tx.commit().await.map_err(backend)?;

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            created.push(self.load_job(id).await?.ok_or_else(|| missing("job", id))?);
        }
        Ok(created)
    }

    async fn load_jobs(&self, order_id: OrderId) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE order_id = ?1 ORDER BY id ASC")
            .bind(order_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(job_from_row).collect()
    }

    async fn load_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET started_at = ?2, completed_at = ?3, cancelled_at = ?4, broken_at = ?5,
                close_comment = ?6
            WHERE id = ?1
            "#,
        )
        .bind(job.id.0)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.cancelled_at)
        .bind(job.broken_at)
        .bind(&job.close_comment)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(missing("job", job.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteWorkStore {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            auto_migrate: true,
        };
        SqliteWorkStore::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_plan_round_trip_keeps_details() {
        let store = memory_store().await;
        let mut plan = store.create_plan(&NewWorkPlan::new("Owner@Example.com")).await.unwrap();
        assert_eq!(plan.owner_email, "owner@example.com");

        plan.comment = Some("urgent batch".to_string());
        plan.priority = Priority::High;
        plan.original_set_id = Some(SetId::new_v4());
        store.update_plan(&plan).await.unwrap();

        let loaded = store.load_plan(plan.id).await.unwrap().unwrap();
        assert_eq!(loaded.comment.as_deref(), Some("urgent batch"));
        assert_eq!(loaded.priority, Priority::High);
        assert_eq!(loaded.original_set_id, plan.original_set_id);
    }

    #[tokio::test]
    async fn test_duplicate_container_rolls_back_job_batch() {
        let store = memory_store().await;
        let plan = store.create_plan(&NewWorkPlan::new("owner@example.com")).await.unwrap();
        let order = NewWorkOrder {
            uuid: Uuid::new_v4(),
            order_index: 0,
            process: crate::model::Process {
                id: 1,
                uuid: Uuid::new_v4(),
                name: "Extraction".to_string(),
                turnaround_days: 2,
                modules: vec![],
            },
            module_choices: vec![],
            original_set_id: None,
            set_id: None,
        };
        let orders = store.insert_orders(plan.id, &[order]).await.unwrap();

        let err = store
            .insert_jobs(orders[0].id, &[ContainerId::from("p1"), ContainerId::from("p1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.load_jobs(orders[0].id).await.unwrap().is_empty());
        store.shutdown().await;
    }
}

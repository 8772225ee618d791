use async_trait::async_trait;
use hris_core::{Department, Employee, Job};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use crate::{Store, StoreError, StoreSession};

const EMPLOYEE_COLUMNS: &str =
    "id, first_name, last_name, hire_date, salary::float8 AS salary, department_id, job_id";

#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

/// Postgres-backed store. Uniqueness is enforced by the schema in `sql/schema.sql`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &PgStoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    fn engine(&self) -> &'static str {
        "sqlx + postgres"
    }

    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }
}

pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

impl PgSession {
    /// Run one employee write inside `SAVEPOINT employee_row`.
    async fn in_row_savepoint(
        &mut self,
        sql: &str,
        employee: &Employee,
    ) -> Result<(), StoreError> {
        sqlx::query("SAVEPOINT employee_row")
            .execute(&mut *self.tx)
            .await?;

        let outcome = sqlx::query(sql)
            .bind(employee.id)
            .bind(&employee.first_name)
            .bind(&employee.last_name)
            .bind(employee.hire_date)
            .bind(employee.salary)
            .bind(employee.department_id)
            .bind(employee.job_id)
            .execute(&mut *self.tx)
            .await;

        match outcome {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT employee_row")
                    .execute(&mut *self.tx)
                    .await?;
                Ok(())
            }
            Err(err) => {
                debug!(employee_id = employee.id, error = %err, "rolling back employee row");
                sqlx::query("ROLLBACK TO SAVEPOINT employee_row")
                    .execute(&mut *self.tx)
                    .await?;
                Err(err.into())
            }
        }
    }
}

fn employee_from_row(row: &PgRow) -> Result<Employee, sqlx::Error> {
    Ok(Employee {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        hire_date: row.try_get("hire_date")?,
        salary: row.try_get("salary")?,
        department_id: row.try_get("department_id")?,
        job_id: row.try_get("job_id")?,
    })
}

#[async_trait]
impl StoreSession for PgSession {
    async fn get_department(&mut self, id: i64) -> Result<Option<Department>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM departments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(|row| -> Result<Department, sqlx::Error> {
            Ok(Department {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })
        })
        .transpose()
        .map_err(StoreError::from)
    }

    async fn get_job(&mut self, id: i64) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT id, title FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(|row| -> Result<Job, sqlx::Error> {
            Ok(Job {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
            })
        })
        .transpose()
        .map_err(StoreError::from)
    }

    async fn get_employee(&mut self, id: i64) -> Result<Option<Employee>, StoreError> {
        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref()
            .map(employee_from_row)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn insert_department(&mut self, department: &Department) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO departments (id, name) VALUES ($1, $2)")
            .bind(department.id)
            .bind(&department.name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_department(&mut self, department: &Department) -> Result<(), StoreError> {
        sqlx::query("UPDATE departments SET name = $2 WHERE id = $1")
            .bind(department.id)
            .bind(&department.name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_job(&mut self, job: &Job) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO jobs (id, title) VALUES ($1, $2)")
            .bind(job.id)
            .bind(&job.title)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_job(&mut self, job: &Job) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET title = $2 WHERE id = $1")
            .bind(job.id)
            .bind(&job.title)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_employee(&mut self, employee: &Employee) -> Result<(), StoreError> {
        self.in_row_savepoint(
            "INSERT INTO employees \
             (id, first_name, last_name, hire_date, salary, department_id, job_id) \
             VALUES ($1, $2, $3, $4, $5::numeric, $6, $7)",
            employee,
        )
        .await
    }

    async fn update_employee(&mut self, employee: &Employee) -> Result<(), StoreError> {
        // Salary is not carried by the source; the stored value is left alone.
        self.in_row_savepoint(
            "UPDATE employees SET first_name = $2, last_name = $3, hire_date = $4, \
             salary = COALESCE($5::numeric, salary), department_id = $6, job_id = $7 \
             WHERE id = $1",
            employee,
        )
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hris_core::{Department, Employee, Job};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Store, StoreError, StoreSession};

/// Committed contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub departments: BTreeMap<i64, Department>,
    pub jobs: BTreeMap<i64, Job>,
    pub employees: BTreeMap<i64, Employee>,
}

impl MemoryState {
    fn check_department(&self, department: &Department) -> Result<(), StoreError> {
        let taken = self
            .departments
            .values()
            .any(|d| d.id != department.id && d.name == department.name);
        if taken {
            return Err(unique("departments_name_key"));
        }
        Ok(())
    }

    fn check_job(&self, job: &Job) -> Result<(), StoreError> {
        let taken = self
            .jobs
            .values()
            .any(|j| j.id != job.id && j.title == job.title);
        if taken {
            return Err(unique("jobs_title_key"));
        }
        Ok(())
    }

    fn check_employee(&self, employee: &Employee) -> Result<(), StoreError> {
        if !self.departments.contains_key(&employee.department_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "employees_department_id_fkey".into(),
            });
        }
        if !self.jobs.contains_key(&employee.job_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: "employees_job_id_fkey".into(),
            });
        }
        let taken = self
            .employees
            .values()
            .any(|e| e.id != employee.id && e.identity() == employee.identity());
        if taken {
            return Err(unique("uq_employee_identity"));
        }
        Ok(())
    }
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

/// In-process store with the same constraint set as the Postgres schema.
///
/// A session holds the store lock until it commits or is dropped, so sessions
/// are fully serialized.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn with_state(state: MemoryState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn engine(&self) -> &'static str {
        "in-memory"
    }

    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemorySession { guard, working }))
    }
}

pub struct MemorySession {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn get_department(&mut self, id: i64) -> Result<Option<Department>, StoreError> {
        Ok(self.working.departments.get(&id).cloned())
    }

    async fn get_job(&mut self, id: i64) -> Result<Option<Job>, StoreError> {
        Ok(self.working.jobs.get(&id).cloned())
    }

    async fn get_employee(&mut self, id: i64) -> Result<Option<Employee>, StoreError> {
        Ok(self.working.employees.get(&id).cloned())
    }

    async fn insert_department(&mut self, department: &Department) -> Result<(), StoreError> {
        if self.working.departments.contains_key(&department.id) {
            return Err(unique("departments_pkey"));
        }
        self.working.check_department(department)?;
        self.working
            .departments
            .insert(department.id, department.clone());
        Ok(())
    }

    async fn update_department(&mut self, department: &Department) -> Result<(), StoreError> {
        self.working.check_department(department)?;
        if let Some(existing) = self.working.departments.get_mut(&department.id) {
            existing.name = department.name.clone();
        }
        Ok(())
    }

    async fn insert_job(&mut self, job: &Job) -> Result<(), StoreError> {
        if self.working.jobs.contains_key(&job.id) {
            return Err(unique("jobs_pkey"));
        }
        self.working.check_job(job)?;
        self.working.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&mut self, job: &Job) -> Result<(), StoreError> {
        self.working.check_job(job)?;
        if let Some(existing) = self.working.jobs.get_mut(&job.id) {
            existing.title = job.title.clone();
        }
        Ok(())
    }

    async fn insert_employee(&mut self, employee: &Employee) -> Result<(), StoreError> {
        if self.working.employees.contains_key(&employee.id) {
            return Err(unique("employees_pkey"));
        }
        self.working.check_employee(employee)?;
        self.working.employees.insert(employee.id, employee.clone());
        Ok(())
    }

    async fn update_employee(&mut self, employee: &Employee) -> Result<(), StoreError> {
        self.working.check_employee(employee)?;
        if let Some(existing) = self.working.employees.get_mut(&employee.id) {
            let salary = employee.salary.or(existing.salary);
            *existing = Employee {
                salary,
                ..employee.clone()
            };
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemorySession { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn seeded() -> MemoryStore {
        let mut state = MemoryState::default();
        state.departments.insert(5, Department { id: 5, name: "Ops".into() });
        state.jobs.insert(3, Job { id: 3, title: "Analyst".into() });
        MemoryStore::with_state(state)
    }

    fn employee(id: i64, first: &str) -> Employee {
        Employee {
            id,
            first_name: first.into(),
            last_name: "Doe".into(),
            hire_date: NaiveDate::from_ymd_opt(2021, 7, 27).unwrap(),
            salary: None,
            department_id: 5,
            job_id: 3,
        }
    }

    #[tokio::test]
    async fn uncommitted_sessions_leave_no_trace() {
        let store = seeded();
        let mut session = store.begin().await.unwrap();
        session.insert_employee(&employee(1, "John")).await.unwrap();
        drop(session);
        assert!(store.snapshot().await.employees.is_empty());

        let mut session = store.begin().await.unwrap();
        session.insert_employee(&employee(1, "John")).await.unwrap();
        session.rollback().await.unwrap();
        assert!(store.snapshot().await.employees.is_empty());
    }

    #[tokio::test]
    async fn identity_collision_rejects_only_the_offending_write() {
        let store = seeded();
        let mut session = store.begin().await.unwrap();
        session.insert_employee(&employee(1, "John")).await.unwrap();
        let err = session.insert_employee(&employee(2, "John")).await.unwrap_err();
        assert!(err.is_unique_violation());
        session.insert_employee(&employee(3, "Jane")).await.unwrap();
        session.commit().await.unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.employees.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn update_to_foreign_identity_is_a_unique_violation() {
        let store = seeded();
        let mut session = store.begin().await.unwrap();
        session.insert_employee(&employee(1, "John")).await.unwrap();
        session.insert_employee(&employee(2, "Jane")).await.unwrap();
        let err = session.update_employee(&employee(2, "John")).await.unwrap_err();
        assert!(err.is_unique_violation());
        session.update_employee(&employee(1, "John")).await.unwrap();
    }

    #[tokio::test]
    async fn missing_reference_is_a_foreign_key_violation() {
        let store = seeded();
        let mut session = store.begin().await.unwrap();
        let mut orphan = employee(1, "John");
        orphan.job_id = 99;
        let err = session.insert_employee(&orphan).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn duplicate_department_names_are_rejected() {
        let store = seeded();
        let mut session = store.begin().await.unwrap();
        let err = session
            .insert_department(&Department { id: 6, name: "Ops".into() })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }
}

use hris_core::{Department, Employee, Job};
use hris_storage::{StoreError, StoreSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// Present with identical values; nothing written.
    Unchanged,
    /// The store refused the write on a uniqueness constraint. The row's own
    /// write was rolled back; the session is still usable.
    DuplicateIdentity,
}

/// Create-or-update keyed by employee id.
///
/// Updates are last-write-wins on every source-carried field. Both paths go
/// through the store's identity constraint, so an update that would collide
/// with another employee's (first, last, hire date) is refused too.
pub async fn upsert_employee(
    session: &mut dyn StoreSession,
    candidate: Employee,
) -> Result<UpsertOutcome, StoreError> {
    let write = match session.get_employee(candidate.id).await? {
        None => session
            .insert_employee(&candidate)
            .await
            .map(|()| UpsertOutcome::Created),
        Some(existing) => {
            let merged = Employee {
                salary: candidate.salary.or(existing.salary),
                ..candidate
            };
            session
                .update_employee(&merged)
                .await
                .map(|()| UpsertOutcome::Updated)
        }
    };

    match write {
        Err(err) if err.is_unique_violation() => Ok(UpsertOutcome::DuplicateIdentity),
        other => other,
    }
}

pub async fn upsert_department(
    session: &mut dyn StoreSession,
    department: Department,
) -> Result<UpsertOutcome, StoreError> {
    match session.get_department(department.id).await? {
        None => {
            session.insert_department(&department).await?;
            Ok(UpsertOutcome::Created)
        }
        Some(existing) if existing.name != department.name => {
            session.update_department(&department).await?;
            Ok(UpsertOutcome::Updated)
        }
        Some(_) => Ok(UpsertOutcome::Unchanged),
    }
}

pub async fn upsert_job(
    session: &mut dyn StoreSession,
    job: Job,
) -> Result<UpsertOutcome, StoreError> {
    match session.get_job(job.id).await? {
        None => {
            session.insert_job(&job).await?;
            Ok(UpsertOutcome::Created)
        }
        Some(existing) if existing.title != job.title => {
            session.update_job(&job).await?;
            Ok(UpsertOutcome::Updated)
        }
        Some(_) => Ok(UpsertOutcome::Unchanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hris_storage::{MemoryState, MemoryStore, Store};

    fn store() -> MemoryStore {
        let mut state = MemoryState::default();
        state.departments.insert(5, Department { id: 5, name: "Ops".into() });
        state.jobs.insert(3, Job { id: 3, title: "Analyst".into() });
        MemoryStore::with_state(state)
    }

    fn employee(id: i64, first: &str, last: &str) -> Employee {
        Employee {
            id,
            first_name: first.into(),
            last_name: last.into(),
            hire_date: NaiveDate::from_ymd_opt(2021, 7, 27).unwrap(),
            salary: None,
            department_id: 5,
            job_id: 3,
        }
    }

    #[tokio::test]
    async fn second_submission_of_same_employee_is_an_update() {
        let store = store();
        let mut session = store.begin().await.unwrap();
        let first = upsert_employee(session.as_mut(), employee(1, "John", "Doe")).await.unwrap();
        let second = upsert_employee(session.as_mut(), employee(1, "John", "Doe")).await.unwrap();
        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Updated);
    }

    #[tokio::test]
    async fn identity_collisions_are_reported_not_raised() {
        let store = store();
        let mut session = store.begin().await.unwrap();
        upsert_employee(session.as_mut(), employee(1, "John", "Doe")).await.unwrap();
        upsert_employee(session.as_mut(), employee(2, "Jane", "Roe")).await.unwrap();

        let insert = upsert_employee(session.as_mut(), employee(3, "John", "Doe")).await.unwrap();
        assert_eq!(insert, UpsertOutcome::DuplicateIdentity);

        let update = upsert_employee(session.as_mut(), employee(2, "John", "Doe")).await.unwrap();
        assert_eq!(update, UpsertOutcome::DuplicateIdentity);

        session.commit().await.unwrap();
        let state = store.snapshot().await;
        assert_eq!(state.employees[&2].first_name, "Jane");
        assert!(!state.employees.contains_key(&3));
    }

    #[tokio::test]
    async fn updates_overwrite_source_fields_and_keep_salary() {
        let store = store();
        let mut session = store.begin().await.unwrap();
        let mut paid = employee(1, "John", "Doe");
        paid.salary = Some(1200.0);
        session.insert_employee(&paid).await.unwrap();

        let renamed = employee(1, "Johnny", "");
        upsert_employee(session.as_mut(), renamed).await.unwrap();
        session.commit().await.unwrap();

        let stored = store.snapshot().await.employees[&1].clone();
        assert_eq!(stored.first_name, "Johnny");
        assert_eq!(stored.last_name, "");
        assert_eq!(stored.salary, Some(1200.0));
    }

    #[tokio::test]
    async fn department_updates_count_only_real_changes() {
        let store = store();
        let mut session = store.begin().await.unwrap();
        let same = upsert_department(session.as_mut(), Department { id: 5, name: "Ops".into() })
            .await
            .unwrap();
        let renamed = upsert_department(session.as_mut(), Department { id: 5, name: "Operations".into() })
            .await
            .unwrap();
        let created = upsert_job(session.as_mut(), Job { id: 4, title: "Engineer".into() })
            .await
            .unwrap();
        assert_eq!(same, UpsertOutcome::Unchanged);
        assert_eq!(renamed, UpsertOutcome::Updated);
        assert_eq!(created, UpsertOutcome::Created);
    }
}

use std::collections::HashMap;

use hris_storage::{StoreError, StoreSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct References {
    pub department: bool,
    pub job: bool,
}

impl References {
    pub fn all_exist(&self) -> bool {
        self.department && self.job
    }
}

/// Existence checks for employee foreign keys, memoized for one batch.
///
/// Must only be used with the session of the batch that created it.
#[derive(Debug, Default)]
pub struct ReferenceResolver {
    departments: HashMap<i64, bool>,
    jobs: HashMap<i64, bool>,
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &mut self,
        session: &mut dyn StoreSession,
        department_id: i64,
        job_id: i64,
    ) -> Result<References, StoreError> {
        let department = match self.departments.get(&department_id) {
            Some(known) => *known,
            None => {
                let exists = session.get_department(department_id).await?.is_some();
                self.departments.insert(department_id, exists);
                exists
            }
        };
        let job = match self.jobs.get(&job_id) {
            Some(known) => *known,
            None => {
                let exists = session.get_job(job_id).await?.is_some();
                self.jobs.insert(job_id, exists);
                exists
            }
        };
        Ok(References { department, job })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hris_core::{Department, Job};
    use hris_storage::{MemoryState, MemoryStore, Store};

    #[tokio::test]
    async fn reports_each_reference_separately() {
        let mut state = MemoryState::default();
        state.departments.insert(1, Department { id: 1, name: "Ops".into() });
        state.jobs.insert(2, Job { id: 2, title: "Analyst".into() });
        let store = MemoryStore::with_state(state);
        let mut session = store.begin().await.unwrap();
        let mut resolver = ReferenceResolver::new();

        let both = resolver.resolve(session.as_mut(), 1, 2).await.unwrap();
        assert!(both.all_exist());

        let no_job = resolver.resolve(session.as_mut(), 1, 9).await.unwrap();
        assert_eq!(no_job, References { department: true, job: false });
        assert!(!no_job.all_exist());

        let no_department = resolver.resolve(session.as_mut(), 8, 2).await.unwrap();
        assert_eq!(no_department, References { department: false, job: true });
    }
}

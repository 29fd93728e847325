//! Job persistence.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};

use super::{Job, JobStatus, JobType};
use crate::id::{HashIdGenerator, IdGenerator};

pub trait JobStore: Send + Sync {
    /// Records a pending job and returns its ID.
    fn insert(&self, job_type: JobType, request: &str) -> Result<String>;

    fn select_all(&self) -> Result<Vec<Job>>;

    fn select_by_id(&self, job_id: &str) -> Result<Job>;

    /// Moves a pending job to in-progress. Returns `false` if some other
    /// worker got there first.
    fn acquire(&self, job_id: &str) -> Result<bool>;

    fn set_status(&self, job_id: &str, status: JobStatus) -> Result<()>;

    fn set_result(&self, job_id: &str, result: &str) -> Result<()>;

    fn set_error(&self, job_id: &str, error: &str) -> Result<()>;

    fn delete(&self, job_id: &str) -> Result<()>;
}

#[derive(Default)]
struct Entries {
    /// job ID -> (insertion sequence, job)
    jobs: BTreeMap<String, (u64, Job)>,
    next_seq: u64,
}

/// In-process job store. Listings come back in insertion order.
pub struct MemoryJobStore {
    entries: Mutex<Entries>,
    ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for MemoryJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryJobStore").finish_non_exhaustive()
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(Arc::new(HashIdGenerator::new()))
    }
}

impl MemoryJobStore {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            ids,
        }
    }

    /// Stores a fully built job, replacing any job with the same ID. A
    /// replaced job keeps its place in the listing order.
    pub fn put(&self, job: Job) -> Result<()> {
        let mut guard = self.lock()?;
        let entries = &mut *guard;
        let seq = match entries.jobs.get(&job.job_id) {
            Some((seq, _)) => *seq,
            None => {
                entries.next_seq += 1;
                entries.next_seq
            }
        };
        entries.jobs.insert(job.job_id.clone(), (seq, job));
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("job store lock poisoned"))
    }

    fn update(&self, job_id: &str, apply: impl FnOnce(&mut Job)) -> Result<()> {
        let mut entries = self.lock()?;
        let (_, job) = entries
            .jobs
            .get_mut(job_id)
            .with_context(|| format!("Job '{}' does not exist", job_id))?;
        apply(job);
        Ok(())
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job_type: JobType, request: &str) -> Result<String> {
        let job_id = self.ids.generate(job_type.as_str());
        self.put(Job::new(&job_id, job_type, request))?;
        tracing::debug!(job_id = %job_id, job_type = %job_type, "Inserted job");
        Ok(job_id)
    }

    fn select_all(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<(u64, Job)> = self.lock()?.jobs.values().cloned().collect();
        jobs.sort_by_key(|(seq, _)| *seq);
        Ok(jobs.into_iter().map(|(_, job)| job).collect())
    }

    fn select_by_id(&self, job_id: &str) -> Result<Job> {
        self.lock()?
            .jobs
            .get(job_id)
            .map(|(_, job)| job.clone())
            .with_context(|| format!("Job '{}' does not exist", job_id))
    }

    fn acquire(&self, job_id: &str) -> Result<bool> {
        let mut acquired = false;
        self.update(job_id, |job| {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::InProgress;
                acquired = true;
            }
        })?;
        Ok(acquired)
    }

    fn set_status(&self, job_id: &str, status: JobStatus) -> Result<()> {
        self.update(job_id, |job| job.status = status)
    }

    fn set_result(&self, job_id: &str, result: &str) -> Result<()> {
        self.update(job_id, |job| job.result = Some(result.to_string()))
    }

    fn set_error(&self, job_id: &str, error: &str) -> Result<()> {
        self.update(job_id, |job| job.error = Some(error.to_string()))
    }

    fn delete(&self, job_id: &str) -> Result<()> {
        self.lock()?.jobs.remove(job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SequenceIdGenerator;

    fn store() -> MemoryJobStore {
        MemoryJobStore::new(Arc::new(SequenceIdGenerator::new(["j1", "j2"])))
    }

    #[test]
    fn acquire_only_once() {
        let jobs = store();
        let id = jobs.insert(JobType::DeleteTask, "t1").unwrap();
        assert_eq!(id, "j1");
        assert!(jobs.acquire(&id).unwrap());
        assert!(!jobs.acquire(&id).unwrap());
        assert_eq!(jobs.select_by_id(&id).unwrap().status, JobStatus::InProgress);
    }

    #[test]
    fn unknown_job_is_an_error() {
        let jobs = store();
        assert!(jobs.select_by_id("missing").is_err());
        assert!(jobs.set_status("missing", JobStatus::Completed).is_err());
        jobs.delete("missing").unwrap();
    }

    #[test]
    fn listing_follows_insertion_order_not_ids() {
        let jobs = MemoryJobStore::default();
        let created = chrono::Utc::now();
        for job_id in ["zz", "mm", "aa"] {
            let mut job = Job::new(job_id, JobType::DeleteTask, "t1");
            job.created = created;
            jobs.put(job).unwrap();
        }
        let first = jobs.insert(JobType::DeleteService, "s1").unwrap();
        jobs.put(Job::new("zz", JobType::DeleteTask, "t2")).unwrap();

        let order: Vec<String> = jobs
            .select_all()
            .unwrap()
            .into_iter()
            .map(|job| job.job_id)
            .collect();
        assert_eq!(order, vec!["zz".to_string(), "mm".into(), "aa".into(), first]);
        assert_eq!(jobs.select_by_id("zz").unwrap().request, "t2");
    }
}

//! In-memory fakes for the external endpoint traits (testing only)
//!
//! Provides `MemoryDocHost`, `MemoryCommentHost`, `MemoryCoverageSink`,
//! and `ScriptedRunner` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use capstan_domain::{JobSpec, PublishError, SubmitError};
use serde_json::Value;

use crate::aggregator::CoverageSink;
use crate::publisher::{CommentHost, CommentRef, DocHost};
use crate::runner::{ActionResult, ActionRunner};

// ---------------------------------------------------------------------------
// MemoryDocHost
// ---------------------------------------------------------------------------

/// In-memory doc/artifact host backed by `HashMap<key, BTreeMap<name, bytes>>`.
#[derive(Debug, Default)]
pub struct MemoryDocHost {
    spaces: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    calls: AtomicUsize,
}

impl MemoryDocHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry names currently stored under the key, in name order.
    pub async fn entry_names(&self, key: &str) -> Vec<String> {
        let spaces = self.spaces.lock().unwrap();
        spaces
            .get(key)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Bytes of one entry, if present.
    pub async fn entry(&self, key: &str, name: &str) -> Option<Vec<u8>> {
        let spaces = self.spaces.lock().unwrap();
        spaces.get(key).and_then(|m| m.get(name)).cloned()
    }

    /// Number of external calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocHost for MemoryDocHost {
    async fn list(&self, key: &str) -> Result<Vec<String>, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spaces = self.spaces.lock().unwrap();
        Ok(spaces
            .get(key)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn upload(&self, key: &str, name: &str, data: &[u8]) -> Result<(), PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut spaces = self.spaces.lock().unwrap();
        spaces
            .entry(key.to_string())
            .or_default()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str, name: &str) -> Result<(), PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut spaces = self.spaces.lock().unwrap();
        if let Some(entries) = spaces.get_mut(key) {
            entries.remove(name);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCommentHost
// ---------------------------------------------------------------------------

/// In-memory comment threads backed by `HashMap<issue, Vec<CommentRef>>`.
#[derive(Debug, Default)]
pub struct MemoryCommentHost {
    threads: Mutex<HashMap<u64, Vec<CommentRef>>>,
    next_id: AtomicU64,
    calls: AtomicUsize,
}

impl MemoryCommentHost {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// All comments on the issue, in creation order.
    pub async fn thread(&self, issue: u64) -> Vec<CommentRef> {
        let threads = self.threads.lock().unwrap();
        threads.get(&issue).cloned().unwrap_or_default()
    }

    /// Seed a pre-existing comment from another author.
    pub async fn seed(&self, issue: u64, author: &str, body: &str) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut threads = self.threads.lock().unwrap();
        threads.entry(issue).or_default().push(CommentRef {
            id,
            author: author.to_string(),
            body: body.to_string(),
        });
    }

    /// Number of external calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentHost for MemoryCommentHost {
    async fn list(&self, issue: u64) -> Result<Vec<CommentRef>, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let threads = self.threads.lock().unwrap();
        Ok(threads.get(&issue).cloned().unwrap_or_default())
    }

    async fn create(&self, issue: u64, body: &str) -> Result<u64, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut threads = self.threads.lock().unwrap();
        threads.entry(issue).or_default().push(CommentRef {
            id,
            author: "capstan-bot".to_string(),
            body: body.to_string(),
        });
        Ok(id)
    }

    async fn edit(&self, comment_id: u64, body: &str) -> Result<(), PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut threads = self.threads.lock().unwrap();
        for thread in threads.values_mut() {
            if let Some(comment) = thread.iter_mut().find(|c| c.id == comment_id) {
                comment.body = body.to_string();
                return Ok(());
            }
        }
        Err(PublishError::NotFound {
            key: format!("comment:{}", comment_id),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryCoverageSink
// ---------------------------------------------------------------------------

/// In-memory coverage sink keyed by `(flag, source_job)`.
#[derive(Debug, Default)]
pub struct MemoryCoverageSink {
    reports: Mutex<HashMap<(String, String), Value>>,
    failing_flags: Mutex<HashSet<String>>,
}

impl MemoryCoverageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make submissions under the flag fail with `Unavailable`.
    pub async fn fail_flag(&self, flag: &str) {
        self.failing_flags.lock().unwrap().insert(flag.to_string());
    }

    /// Job ids that have submitted under the flag, in id order.
    pub async fn flag_jobs(&self, flag: &str) -> Vec<String> {
        let reports = self.reports.lock().unwrap();
        let mut jobs: Vec<String> = reports
            .keys()
            .filter(|(f, _)| f == flag)
            .map(|(_, j)| j.clone())
            .collect();
        jobs.sort();
        jobs
    }

    /// The stored payload for `(flag, job)`, if any.
    pub async fn report(&self, flag: &str, job: &str) -> Option<Value> {
        let reports = self.reports.lock().unwrap();
        reports.get(&(flag.to_string(), job.to_string())).cloned()
    }
}

#[async_trait]
impl CoverageSink for MemoryCoverageSink {
    async fn submit(
        &self,
        flag: &str,
        source_job: &str,
        payload: &Value,
    ) -> Result<(), SubmitError> {
        if self.failing_flags.lock().unwrap().contains(flag) {
            return Err(SubmitError::Unavailable {
                reason: "sink offline".to_string(),
            });
        }
        let mut reports = self.reports.lock().unwrap();
        reports.insert(
            (flag.to_string(), source_job.to_string()),
            payload.clone(),
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// Deterministic `ActionRunner` for tests: fails the steps it was told to
/// fail and records every invocation for exactly-once assertions.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    /// `(job_id, step_name)` pairs that fail with exit code 1.
    failures: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the named step for the given job only.
    pub fn fail_step(&self, job_id: &str, step_name: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((job_id.to_string(), step_name.to_string()));
    }

    /// All `(job_id, step_name)` invocations, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionRunner for ScriptedRunner {
    async fn invoke(
        &self,
        job: &JobSpec,
        step_name: &str,
        _argv: &[String],
        _env: &HashMap<String, String>,
        _timeout_secs: u64,
    ) -> anyhow::Result<ActionResult> {
        self.calls
            .lock()
            .unwrap()
            .push((job.id.clone(), step_name.to_string()));
        let fails = self
            .failures
            .lock()
            .unwrap()
            .contains(&(job.id.clone(), step_name.to_string()));
        if fails {
            Ok(ActionResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("scripted failure for {}", step_name),
                duration_ms: 1,
                success: false,
            })
        } else {
            Ok(ActionResult {
                exit_code: 0,
                stdout: format!("{} ok", step_name),
                stderr: String::new(),
                duration_ms: 1,
                success: true,
            })
        }
    }
}

//! Shared harness: in-memory queue, mock dependencies, zip fixtures.

use std::io::{Cursor, Write};
use std::sync::Arc;

use server_core::domains::repos::build_job_registry;
use server_core::kernel::jobs::testing::MemoryJobQueue;
use server_core::kernel::jobs::{JobRunner, JobRunnerConfig, QueueName};
use server_core::kernel::test_dependencies::{MemoryUserStore, MockNotifier, MockSourceControl};
use server_core::kernel::ServerDeps;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub struct TestHarness {
    pub queue: Arc<MemoryJobQueue>,
    pub users: Arc<MemoryUserStore>,
    pub github: Arc<MockSourceControl>,
    pub notifier: Arc<MockNotifier>,
    pub deps: Arc<ServerDeps>,
    _temp: tempfile::TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let users = Arc::new(MemoryUserStore::new());
        let github = Arc::new(MockSourceControl::new());
        let notifier = Arc::new(MockNotifier::new());
        let deps = Arc::new(ServerDeps::new(
            users.clone(),
            github.clone(),
            notifier.clone(),
            temp.path().to_path_buf(),
        ));
        Self {
            queue: Arc::new(MemoryJobQueue::new()),
            users,
            github,
            notifier,
            deps,
            _temp: temp,
        }
    }

    pub fn runner_for(&self, queue: QueueName) -> JobRunner {
        let mut config = JobRunnerConfig::for_queue(queue);
        config.poll_interval = std::time::Duration::from_millis(10);
        JobRunner::new(
            self.queue.clone(),
            Arc::new(build_job_registry()),
            Arc::clone(&self.deps),
            config,
        )
    }

    /// Run one claim/execute cycle for a queue.
    pub async fn drain_once(&self, queue: QueueName) -> usize {
        self.runner_for(queue).run_once().await.unwrap()
    }

    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(self._temp.path()).unwrap().count()
    }
}

/// Build a zip archive in memory from (name, content) entries.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

// SPDX-License-Identifier: GPL-3.0-only
//! Recording fakes for the scheduling loop's collaborators.
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::control::{ConfigPort, UpdateOperation, UpdateOperationPort};
use crate::instance::InstanceControl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Register,
    Unregister,
    Wait(Duration),
    ConfigReload,
    ResetUserActivity,
    EngineInit,
    EngineReload,
    Query,
    Update(bool),
    EngineExit,
}

/// Shared, ordered record of every collaborator call.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

pub struct FakeMonitor {
    log: CallLog,
    aborted: AtomicBool,
    waits: AtomicUsize,
    abort_on_wait: AtomicUsize,
}

impl FakeMonitor {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            aborted: AtomicBool::new(false),
            waits: AtomicUsize::new(0),
            abort_on_wait: AtomicUsize::new(usize::MAX),
        }
    }

    /// The `n`th wait (1-based) reports an abort
    pub fn abort_on_wait(&self, n: usize) {
        self.abort_on_wait.store(n, Ordering::SeqCst);
    }

    pub fn abort_now(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl InstanceControl for FakeMonitor {
    fn instance_id(&self) -> &str {
        "fake-instance"
    }

    async fn register_instance(&self) -> anyhow::Result<()> {
        self.log.push(Call::Register);
        Ok(())
    }

    async fn unregister_instance(&self) {
        self.log.push(Call::Unregister);
    }

    async fn abort_requested(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    async fn wait_for_abort(&self, timeout: Duration) -> bool {
        self.log.push(Call::Wait(timeout));
        let n = self.waits.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.abort_on_wait.load(Ordering::SeqCst) {
            self.abort_now();
        }
        self.aborted.load(Ordering::SeqCst)
    }

    fn on_settings_changed(&self) {}
}

pub struct FakeConfig {
    log: CallLog,
    reloads: AtomicUsize,
    changed_on: Mutex<HashSet<usize>>,
}

impl FakeConfig {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            reloads: AtomicUsize::new(0),
            changed_on: Mutex::new(HashSet::new()),
        }
    }

    /// `reload()` reports a change on these calls (1-based)
    pub fn changed_on_calls(&self, calls: impl IntoIterator<Item = usize>) {
        self.changed_on.lock().unwrap().extend(calls);
    }
}

#[async_trait]
impl ConfigPort for FakeConfig {
    async fn reload(&self) -> anyhow::Result<bool> {
        self.log.push(Call::ConfigReload);
        let n = self.reloads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.changed_on.lock().unwrap().contains(&n))
    }

    async fn reset_user_activity(&self) {
        self.log.push(Call::ResetUserActivity);
    }
}

#[derive(Default)]
struct UpdaterScript {
    operations: VecDeque<UpdateOperation>,
    fail_init: bool,
    fail_exit: bool,
    fail_query_on: Option<usize>,
    abort_on_query: Option<Arc<FakeMonitor>>,
}

pub struct FakeUpdater {
    log: CallLog,
    queries: AtomicUsize,
    script: Mutex<UpdaterScript>,
}

impl FakeUpdater {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            queries: AtomicUsize::new(0),
            script: Mutex::new(UpdaterScript::default()),
        }
    }

    /// Operations returned by successive queries; `None` once exhausted
    pub fn script(&self, operations: impl IntoIterator<Item = UpdateOperation>) {
        self.script.lock().unwrap().operations.extend(operations);
    }

    pub fn fail_init(&self) {
        self.script.lock().unwrap().fail_init = true;
    }

    pub fn fail_exit(&self) {
        self.script.lock().unwrap().fail_exit = true;
    }

    pub fn fail_query_on_call(&self, n: usize) {
        self.script.lock().unwrap().fail_query_on = Some(n);
    }

    /// Signal an abort through `monitor` while answering the next query
    pub fn abort_on_query(&self, monitor: Arc<FakeMonitor>) {
        self.script.lock().unwrap().abort_on_query = Some(monitor);
    }
}

#[async_trait]
impl UpdateOperationPort for FakeUpdater {
    async fn init(&self) -> anyhow::Result<()> {
        self.log.push(Call::EngineInit);
        if self.script.lock().unwrap().fail_init {
            anyhow::bail!("engine init failed");
        }
        Ok(())
    }

    async fn reload(&self) -> anyhow::Result<()> {
        self.log.push(Call::EngineReload);
        Ok(())
    }

    async fn current_update_operation(&self) -> anyhow::Result<UpdateOperation> {
        self.log.push(Call::Query);
        let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        let mut script = self.script.lock().unwrap();
        if script.fail_query_on == Some(n) {
            anyhow::bail!("query {n} failed");
        }
        if let Some(monitor) = script.abort_on_query.take() {
            monitor.abort_now();
        }
        Ok(script.operations.pop_front().unwrap_or(UpdateOperation::None))
    }

    async fn update(&self, full: bool) -> anyhow::Result<()> {
        self.log.push(Call::Update(full));
        Ok(())
    }

    async fn exit(&self) -> anyhow::Result<()> {
        self.log.push(Call::EngineExit);
        if self.script.lock().unwrap().fail_exit {
            anyhow::bail!("engine exit failed");
        }
        Ok(())
    }
}

/// Configuration pointing every path into `dir`
pub fn create_test_config(dir: &std::path::Path) -> Config {
    Config {
        catalog_db_path: dir.join("catalog.db"),
        instance_file: dir.join("instance"),
        backend_api_url: "http://localhost:3000/api".to_string(),
        backend_api_key: None,
        tick_interval_secs: 15,
        startup_delay_secs: 1,
        update_mode: crate::config::UpdateMode::Automatic,
        update_interval_secs: 7200,
        full_interval_secs: 86400,
        log_level: "error".to_string(), // Reduce log noise in tests
        log_json: false,
    }
}

/// Create a temporary directory for tests
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("Failed to create temp directory")
}

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use itertools::Itertools;
use log::{info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::{watch, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard},
    task::JoinHandle,
};

use super::{
    manifest::Manifest,
    model::{AppEvent, AppStatus, ApplicationInfo, Phase},
    port::EventSink,
};

const OUTPUT_LIMIT: usize = 1024 * 1024;
const KILL_GRACE: Duration = Duration::from_secs(10);

/// A deployed application and everything it owns while it lives on this host.
///
/// Lifecycle operations (launch, kill, reload, delete) are serialized through
/// [`Application::lifecycle`]; the observable state sits behind a short-lived
/// lock so status reads never wait on a running process.
pub struct Application {
    pub id: String,
    pub repository: String,
    pub branch: Option<String>,
    pub variant: Option<String>,
    pub directory: PathBuf,
    lifecycle: AsyncMutex<()>,
    state: Mutex<State>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    sink: Arc<dyn EventSink>,
}

struct State {
    phase: Phase,
    manifest: Option<Manifest>,
    events: Vec<AppEvent>,
    event_urls: Vec<String>,
    host: Option<String>,
    pid: Option<u32>,
    supervisor: Option<Supervisor>,
}

/// Handle on the background task running the launch pipeline. Dropping the
/// sender or sending `true` makes the task kill its current process.
pub(crate) struct Supervisor {
    kill: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Supervisor {
    pub(crate) fn new(kill: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { kill, task }
    }

    async fn stop(self) {
        // A closed channel means the pipeline already finished.
        let _ = self.kill.send(true);
        if tokio::time::timeout(KILL_GRACE, self.task).await.is_err() {
            warn!("Launch task did not stop within {:?}", KILL_GRACE);
        }
    }
}

impl Application {
    pub fn new(
        id: String,
        repository: String,
        branch: Option<String>,
        variant: Option<String>,
        directory: PathBuf,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id,
            repository,
            branch,
            variant,
            directory,
            lifecycle: AsyncMutex::new(()),
            state: Mutex::new(State {
                phase: Phase::Cloning,
                manifest: None,
                events: Vec::new(),
                event_urls: Vec::new(),
                host: None,
                pid: None,
                supervisor: None,
            }),
            stdout: OutputBuffer::default(),
            stderr: OutputBuffer::default(),
            sink,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) async fn lock_lifecycle(&self) -> AsyncMutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    pub fn log_event(&self, message: impl Into<String>) {
        self.add_event(AppEvent::message(message));
    }

    pub fn log_error(&self, error: impl Into<String>) {
        self.add_event(AppEvent::error(error));
    }

    fn add_event(&self, event: AppEvent) {
        let urls = {
            let mut state = self.state();
            state.events.push(event.clone());
            state.event_urls.clone()
        };
        if urls.is_empty() {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let sink = self.sink.clone();
            runtime.spawn(async move { sink.publish(&urls, &event).await });
        }
    }

    pub fn add_event_urls(&self, urls: impl IntoIterator<Item = String>) {
        let mut state = self.state();
        let merged: Vec<String> = state
            .event_urls
            .drain(..)
            .chain(urls)
            .filter(|url| !url.trim().is_empty())
            .unique()
            .collect();
        state.event_urls = merged;
    }

    pub fn event_urls(&self) -> Vec<String> {
        self.state().event_urls.clone()
    }

    pub fn events(&self) -> Vec<AppEvent> {
        self.state().events.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn set_phase(&self, phase: Phase) {
        self.state().phase = phase;
    }

    /// Records a pipeline failure and leaves the application in [`Phase::Failed`].
    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        warn!("Application {} failed: {}", self.id, error);
        self.log_error(error);
        self.set_phase(Phase::Failed);
    }

    pub fn manifest(&self) -> Option<Manifest> {
        self.state().manifest.clone()
    }

    pub fn set_manifest(&self, manifest: Manifest) {
        self.state().manifest = Some(manifest);
    }

    pub fn host(&self) -> Option<String> {
        self.state().host.clone()
    }

    pub fn set_host(&self, host: Option<String>) {
        self.state().host = host;
    }

    pub fn set_pid(&self, pid: Option<u32>) {
        self.state().pid = pid;
    }

    pub fn pid(&self) -> Option<u32> {
        self.state().pid
    }

    pub fn stdout(&self) -> &OutputBuffer {
        &self.stdout
    }

    pub fn stderr(&self) -> &OutputBuffer {
        &self.stderr
    }

    /// Hands the new pipeline to this application, returning the previous one.
    pub(crate) fn replace_supervisor(&self, supervisor: Supervisor) -> Option<Supervisor> {
        self.state().supervisor.replace(supervisor)
    }

    /// Stops the supervised pipeline, killing its process. Having nothing to
    /// stop is not an error. Callers must hold the lifecycle lock.
    pub(crate) async fn kill_unlocked(&self) {
        info!("Killing process {}", self.id);
        self.log_event(format!("Killing process {}", self.id));
        let supervisor = {
            let mut state = self.state();
            if state.phase.is_active() {
                state.phase = Phase::Killing;
            }
            state.supervisor.take()
        };
        if let Some(supervisor) = supervisor {
            supervisor.stop().await;
        }
        let mut state = self.state();
        state.pid = None;
        if state.phase == Phase::Killing {
            state.phase = Phase::Stopped;
        }
    }

    pub async fn kill(&self) {
        let _lifecycle = self.lock_lifecycle().await;
        self.kill_unlocked().await;
    }

    pub fn info(&self) -> ApplicationInfo {
        ApplicationInfo {
            id: self.id.clone(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            config: self.variant.clone(),
            directory: self.directory.display().to_string(),
        }
    }

    pub fn status(&self, recent_events: usize) -> AppStatus {
        let state = self.state();
        let skip = state.events.len().saturating_sub(recent_events);
        AppStatus {
            application: self.info(),
            status: state.phase,
            pid: state.pid,
            host: state.host.clone(),
            manifest: state.manifest.clone(),
            events: state.events[skip..].to_vec(),
            health: None,
        }
    }
}

/// Captured process output, keeping the most recent bytes only.
#[derive(Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    pub(crate) async fn capture(self, mut reader: impl AsyncRead + Unpin) {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => self.append(&chunk[..read]),
                Err(e) => {
                    warn!("Stopped capturing output: {}", e);
                    break;
                }
            }
        }
    }

    fn append(&self, bytes: &[u8]) {
        let mut buffer = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buffer.extend_from_slice(bytes);
        if buffer.len() > OUTPUT_LIMIT {
            let overflow = buffer.len() - OUTPUT_LIMIT;
            buffer.drain(..overflow);
        }
    }

    pub fn contents(&self) -> String {
        let buffer = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

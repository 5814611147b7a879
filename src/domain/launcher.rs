use std::{path::Path, process::Stdio, sync::Arc};

use log::{info, warn};
use tokio::{process::Command, sync::watch};

use super::{
    application::{Application, Supervisor},
    manifest::Manifest,
    model::{Phase, RoutingRequest},
    routing::RoutingService,
};

/// Runs the launch pipeline of an application in the background: read the
/// manifest, obtain a reachable host, then execute the run sequence.
pub struct Launcher {
    routing: Arc<RoutingService>,
    manifest_name: String,
}

enum StepOutcome {
    Succeeded,
    Killed,
    Failed(String),
}

impl Launcher {
    pub fn new(routing: Arc<RoutingService>, manifest_name: impl Into<String>) -> Self {
        Self {
            routing,
            manifest_name: manifest_name.into(),
        }
    }

    pub fn default_manifest_name(&self) -> &str {
        &self.manifest_name
    }

    /// A variant names the manifest file to read instead of the default one.
    pub fn manifest_name_for<'a>(&'a self, application: &'a Application) -> &'a str {
        application.variant.as_deref().unwrap_or(&self.manifest_name)
    }

    /// Schedules the pipeline and hands its supervisor to the application
    /// before returning, so a kill issued right after always reaches it.
    /// Callers must hold the application's lifecycle lock.
    pub async fn launch(&self, application: &Arc<Application>) {
        let (kill_tx, kill_rx) = watch::channel(false);
        application.set_phase(Phase::Launching);
        let task = tokio::spawn(run_pipeline(
            application.clone(),
            self.routing.clone(),
            self.manifest_name_for(application).to_string(),
            kill_rx,
        ));
        if let Some(previous) = application.replace_supervisor(Supervisor::new(kill_tx, task)) {
            warn!("Replacing a live pipeline of {}", application.id);
            // Dropping the sender makes the previous pipeline kill its process.
            drop(previous);
        }
    }
}

async fn run_pipeline(
    app: Arc<Application>,
    routing: Arc<RoutingService>,
    manifest_name: String,
    mut kill: watch::Receiver<bool>,
) {
    app.log_event("Launching application");
    info!("Reading configuration {} of {}", manifest_name, app.id);
    let manifest = match Manifest::read(&app.directory, &manifest_name).await {
        Ok(manifest) => manifest,
        Err(e) => {
            app.fail(format!("failed to read configuration: {}", e));
            return;
        }
    };
    app.set_manifest(manifest.clone());
    app.add_event_urls(manifest.application.event_urls.to_vec());

    let applied = tokio::select! {
        applied = routing.apply(&app.id, RoutingRequest::from_manifest(&manifest)) => applied,
        _ = killed(&mut kill) => return,
    };
    let host = match applied {
        Ok(applied) => applied.host,
        Err(e) => {
            app.fail(format!("failed to setup host: {}", e));
            return;
        }
    };

    let working_directory = if manifest.application.base_dir.is_empty() {
        app.directory.clone()
    } else {
        app.directory.join(&manifest.application.base_dir)
    };
    let mut environment = vec![("APP_HOST".to_string(), host.clone())];
    environment.extend(manifest.environment());

    info!("Executing service {} at {}", app.id, host);
    app.set_host(Some(host.clone()));
    app.log_event(format!("Executing service at '{}'", host));
    app.set_phase(Phase::Running);

    let total = manifest.application.run.len();
    for (index, step) in manifest.application.run.iter().enumerate() {
        if *kill.borrow() {
            return;
        }
        let display = step.join(" ");
        app.log_event(format!("Launching CMD ({}/{}) '{}'", index + 1, total, display));
        match run_step(&app, step, &working_directory, &environment, &mut kill).await {
            StepOutcome::Succeeded => app.log_event(format!("Finished CMD '{}'", display)),
            StepOutcome::Killed => return,
            StepOutcome::Failed(error) => {
                app.fail(error);
                return;
            }
        }
    }
    app.set_phase(Phase::Exited);
}

async fn run_step(
    app: &Application,
    step: &[String],
    working_directory: &Path,
    environment: &[(String, String)],
    kill: &mut watch::Receiver<bool>,
) -> StepOutcome {
    let Some((program, args)) = step.split_first() else {
        return StepOutcome::Failed("empty command".to_string());
    };
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(working_directory)
        .envs(environment.iter().map(|(key, value)| (key, value)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return StepOutcome::Failed(format!("failed to spawn '{}': {}", program, e)),
    };
    app.set_pid(child.id());
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(app.stdout().clone().capture(stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(app.stderr().clone().capture(stderr));
    }

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => StepOutcome::Succeeded,
            Ok(status) => StepOutcome::Failed(format!("'{}' {}", step.join(" "), status)),
            Err(e) => StepOutcome::Failed(format!("failed to wait for '{}': {}", program, e)),
        },
        _ = killed(kill) => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {} of {}: {}", program, app.id, e);
            }
            StepOutcome::Killed
        }
    };
    app.set_pid(None);
    outcome
}

/// Resolves once a kill was requested or the supervisor is gone.
async fn killed(kill: &mut watch::Receiver<bool>) {
    while !*kill.borrow_and_update() {
        if kill.changed().await.is_err() {
            return;
        }
    }
}

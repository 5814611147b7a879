use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::join_all;
use log::{info, warn};
use tokio::sync::RwLock;

use super::{
    application::Application,
    error::Error,
    identity::{check_variant, checkout_directory, derive_identity, parse_checkout_name},
    launcher::Launcher,
    manifest::Manifest,
    model::{AppEvent, AppStatus, DeployRequest, Health, Phase, RoutingRequest},
    port::{EventSink, SourceControl},
    recovery,
    routing::{AppliedRouting, RoutingService},
    webhook::PushNotification,
};

const RECENT_EVENTS: usize = 50;

/// Owns the registry of deployed applications and drives each one through
/// clone, configure, launch, reload, kill and delete.
pub struct ApplicationManager {
    data_directory: PathBuf,
    source_control: Arc<dyn SourceControl>,
    routing: Arc<RoutingService>,
    launcher: Launcher,
    sink: Arc<dyn EventSink>,
    registry: RwLock<HashMap<String, Arc<Application>>>,
}

impl ApplicationManager {
    pub fn new(
        data_directory: impl Into<PathBuf>,
        manifest_name: impl Into<String>,
        source_control: Arc<dyn SourceControl>,
        routing: Arc<RoutingService>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            data_directory: data_directory.into(),
            source_control,
            launcher: Launcher::new(routing.clone(), manifest_name),
            routing,
            sink,
            registry: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, identity: &str) -> Result<Arc<Application>, Error> {
        self.registry
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Application {}", identity)))
    }

    async fn is_registered(&self, application: &Arc<Application>) -> bool {
        self.registry
            .read()
            .await
            .get(&application.id)
            .is_some_and(|registered| Arc::ptr_eq(registered, application))
    }

    /// Clones and configures the repository, registers the application and
    /// schedules its launch. Returns the identity once the launch is scheduled.
    pub async fn deploy(&self, request: DeployRequest) -> Result<String, Error> {
        request.variant().map(check_variant).transpose()?;
        let identity = derive_identity(&request.repository, request.variant());
        let application = Arc::new(Application::new(
            identity.clone(),
            request.repository.clone(),
            request.branch().map(str::to_string),
            request.variant().map(str::to_string),
            checkout_directory(&self.data_directory, &identity, request.variant()),
            self.sink.clone(),
        ));
        {
            let mut registry = self.registry.write().await;
            if registry.contains_key(&identity) {
                return Err(Error::AlreadyDeployed(identity));
            }
            registry.insert(identity.clone(), application.clone());
        }

        let _lifecycle = application.lock_lifecycle().await;
        if let Err(e) = self.checkout(&application).await {
            warn!("Deploy of {} failed: {}", request.repository, e);
            self.registry.write().await.remove(&identity);
            return Err(e);
        }
        info!("Deployed {} as {}", application.repository, identity);
        self.launcher.launch(&application).await;
        Ok(identity)
    }

    async fn checkout(&self, application: &Application) -> Result<(), Error> {
        application.log_event(format!("Cloning from repository {}", application.repository));
        remove_directory(&application.directory).await?;
        tokio::fs::create_dir_all(&self.data_directory).await?;
        self.source_control
            .clone_repository(
                &application.repository,
                application.branch.as_deref(),
                &application.directory,
            )
            .await?;

        application.set_phase(Phase::Configuring);
        let manifest = Manifest::read(
            &application.directory,
            self.launcher.manifest_name_for(application),
        )
        .await?;
        application.set_manifest(manifest);
        Ok(())
    }

    pub async fn kill(&self, identity: &str) -> Result<(), Error> {
        self.get(identity).await?.kill().await;
        Ok(())
    }

    /// Kills the application, fast-forwards its checkout and launches it again
    /// in the background. A failed pull leaves it stopped.
    pub async fn reload(&self, identity: &str) -> Result<(), Error> {
        let application = self.get(identity).await?;
        let _lifecycle = application.lock_lifecycle().await;
        if !self.is_registered(&application).await {
            return Err(Error::NotFound(format!("Application {}", identity)));
        }

        info!("Reloading application {}", identity);
        application.log_event(format!("Reloading application {}", identity));
        application.kill_unlocked().await;
        application.set_phase(Phase::Reloading);

        application.log_event(format!("Pulling from repository {}", application.repository));
        if let Err(e) = self.source_control.pull(&application.directory).await {
            application.log_error(format!("failed to pull: {}", e));
            application.set_phase(Phase::Stopped);
            return Err(e);
        }
        self.launcher.launch(&application).await;
        Ok(())
    }

    /// Kills the application and removes its checkout. An identity without a
    /// registry entry still has its directory removed.
    pub async fn delete(&self, identity: &str) -> Result<(), Error> {
        let registered = self.registry.read().await.get(identity).cloned();
        let Some(application) = registered else {
            return self.delete_directory(identity).await;
        };

        let _lifecycle = application.lock_lifecycle().await;
        application.kill_unlocked().await;
        remove_directory(&application.directory).await?;
        self.registry.write().await.remove(identity);
        self.release_routing(identity).await;
        info!("Deleted application {}", identity);
        Ok(())
    }

    async fn delete_directory(&self, name: &str) -> Result<(), Error> {
        let not_found = || Error::NotFound(format!("Application {}", name));
        let (identity, _) = parse_checkout_name(name).ok_or_else(not_found)?;
        let directory = self.data_directory.join(name);
        if !tokio::fs::try_exists(&directory).await? {
            return Err(not_found());
        }
        info!("Removing unregistered directory {}", directory.display());
        remove_directory(&directory).await?;
        self.release_routing(identity).await;
        Ok(())
    }

    /// Best-effort: forgets applied routing and drops the DNS claim.
    async fn release_routing(&self, identity: &str) {
        if let Err(e) = self.routing.release(identity).await {
            warn!("Failed to release routing of {}: {}", identity, e);
        }
    }

    pub async fn status(&self, identity: &str) -> Result<AppStatus, Error> {
        let application = self.get(identity).await?;
        Ok(self.status_of(&application).await)
    }

    async fn status_of(&self, application: &Application) -> AppStatus {
        let mut status = application.status(RECENT_EVENTS);
        status.health = self.routing.health(&application.id).await.ok();
        status
    }

    pub async fn list(&self) -> Vec<AppStatus> {
        let applications: Vec<Arc<Application>> =
            self.registry.read().await.values().cloned().collect();
        join_all(
            applications
                .iter()
                .map(|application| self.status_of(application)),
        )
        .await
    }

    pub async fn events(&self, identity: &str) -> Result<Vec<AppEvent>, Error> {
        Ok(self.get(identity).await?.events())
    }

    pub async fn stdout(&self, identity: &str) -> Result<String, Error> {
        Ok(self.get(identity).await?.stdout().contents())
    }

    pub async fn stderr(&self, identity: &str) -> Result<String, Error> {
        Ok(self.get(identity).await?.stderr().contents())
    }

    pub async fn manifest(&self, identity: &str) -> Result<Manifest, Error> {
        let application = self.get(identity).await?;
        match application.manifest() {
            Some(manifest) => Ok(manifest),
            None => {
                Manifest::read(
                    &application.directory,
                    self.launcher.manifest_name_for(&application),
                )
                .await
            }
        }
    }

    pub async fn add_event_url(&self, identity: &str, url: String) -> Result<(), Error> {
        self.get(identity).await?.add_event_urls([url]);
        Ok(())
    }

    /// Reconciles proxy and DNS state for `identity` and returns the host.
    pub async fn apply_routing(
        &self,
        identity: &str,
        request: RoutingRequest,
    ) -> Result<AppliedRouting, Error> {
        self.routing.apply(identity, request).await
    }

    pub async fn health(&self, identity: &str) -> Result<Health, Error> {
        self.routing.health(identity).await
    }

    /// Clones into a scratch directory and parses the manifest without deploying.
    pub async fn validate(&self, request: DeployRequest) -> Result<Manifest, Error> {
        request.variant().map(check_variant).transpose()?;
        let identity = derive_identity(&request.repository, request.variant());
        let scratch = self.data_directory.join(format!("_validate-{}", identity));
        remove_directory(&scratch).await?;
        tokio::fs::create_dir_all(&self.data_directory).await?;

        let result = async {
            self.source_control
                .clone_repository(&request.repository, request.branch(), &scratch)
                .await?;
            Manifest::read(
                &scratch,
                request.variant().unwrap_or(self.launcher.default_manifest_name()),
            )
            .await
        }
        .await;

        if let Err(e) = remove_directory(&scratch).await {
            warn!("Failed to remove {}: {}", scratch.display(), e);
        }
        result
    }

    /// Reloads every application the notification targets whose manifest opted
    /// into reload on push for the pushed branch. Returns the reloaded identities.
    pub async fn handle_push(&self, notification: &PushNotification) -> Vec<String> {
        let targets: Vec<Arc<Application>> = self
            .registry
            .read()
            .await
            .values()
            .filter(|application| notification.mentions(&application.repository))
            .cloned()
            .collect();

        let mut reloaded = Vec::new();
        for application in targets {
            let Some(manifest) = application.manifest() else {
                continue;
            };
            if !manifest.repository.reload_on_push || manifest.repository.branch != notification.branch {
                continue;
            }
            match self.reload(&application.id).await {
                Ok(()) => reloaded.push(application.id.clone()),
                Err(e) => warn!("Failed to reload application {}: {}", application.id, e),
            }
        }
        reloaded
    }

    /// Deploys again every valid checkout left in the data directory.
    pub async fn recover(&self) -> Result<Vec<String>, Error> {
        info!("[startup] Looking for deployed services...");
        let checkouts = recovery::discover(&self.data_directory, self.source_control.as_ref()).await?;
        let mut deployed = Vec::new();
        for checkout in checkouts {
            let request = DeployRequest {
                repository: checkout.repository,
                branch: None,
                config: checkout.variant,
            };
            match self.deploy(request).await {
                Ok(identity) => deployed.push(identity),
                Err(e) => warn!("[startup] Failed to deploy {}: {}", checkout.directory.display(), e),
            }
        }
        Ok(deployed)
    }

    /// Kills every supervised application.
    pub async fn shutdown(&self) {
        let applications: Vec<Arc<Application>> =
            self.registry.read().await.values().cloned().collect();
        join_all(applications.iter().map(|application| application.kill())).await;
    }
}

async fn remove_directory(directory: &Path) -> Result<(), Error> {
    match tokio::fs::remove_dir_all(directory).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        allocator::PortAllocator,
        dns::DnsReconciler,
        port::RecordStore,
        testing::{
            routing_service, wait_until, FakeAddress, FakeDnsProvider, FakeProbe, FakeRoutes,
            FakeSourceControl, MemoryRecordStore, RecordingSink,
        },
    };

    const MANIFEST: &str = r#"
[application]
run = [["sleep", "30"]]

[repository]
branch = "main"
reload_on_push = true
"#;

    struct Fixture {
        data: tempfile::TempDir,
        source_control: Arc<FakeSourceControl>,
        manager: ApplicationManager,
    }

    fn fixture() -> Fixture {
        let data = tempfile::tempdir().unwrap();
        let source_control = Arc::new(FakeSourceControl::default());
        let manager = ApplicationManager::new(
            data.path(),
            "Rokkufile",
            source_control.clone(),
            Arc::new(routing_service()),
            Arc::new(RecordingSink::default()),
        );
        Fixture {
            data,
            source_control,
            manager,
        }
    }

    fn messages(events: &[AppEvent]) -> Vec<String> {
        events
            .iter()
            .map(|event| event.message.clone().or(event.error.clone()).unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn deploy_launches_in_order() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", MANIFEST);

        let identity = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();

        assert_eq!(identity, derive_identity("https://git.example/app.git", None));
        let status = f.manager.status(&identity).await.unwrap();
        assert!(!messages(&status.events).iter().any(|m| m.starts_with("Finished CMD")));

        let application = f.manager.get(&identity).await.unwrap();
        wait_until(|| application.pid().is_some()).await;
        let messages = messages(&f.manager.events(&identity).await.unwrap());
        let launching = messages.iter().position(|m| m == "Launching application").unwrap();
        let executing = messages
            .iter()
            .position(|m| m.starts_with("Executing service at "))
            .unwrap();
        assert!(launching < executing);
        assert_eq!(application.phase(), Phase::Running);

        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_deploy_conflicts() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", MANIFEST);

        f.manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();
        let err = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyDeployed(_)));
        assert_eq!(f.source_control.clones().len(), 1);
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn variants_deploy_side_by_side() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", MANIFEST);
        f.source_control.publish("https://git.example/app.git", "Rokkufile.staging", MANIFEST);

        let plain = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();
        let staging = f
            .manager
            .deploy(DeployRequest {
                repository: "https://git.example/app.git".to_string(),
                branch: Some("develop".to_string()),
                config: Some("Rokkufile.staging".to_string()),
            })
            .await
            .unwrap();

        assert_ne!(plain, staging);
        let clones = f.source_control.clones();
        assert_eq!(clones[1].1.as_deref(), Some("develop"));
        assert!(clones[1].2.ends_with(format!("{}.Rokkufile-staging", staging)));
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_manifest_aborts_deploy() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", "[application]\n");

        let err = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        let identity = derive_identity("https://git.example/app.git", None);
        assert!(matches!(f.manager.get(&identity).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn clone_failure_aborts_deploy() {
        let f = fixture();

        let err = f
            .manager
            .deploy(DeployRequest::new("https://git.example/missing.git"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SourceControl(_)));
        assert!(f.manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn kill_without_process_succeeds() {
        let f = fixture();
        f.source_control.publish(
            "https://git.example/app.git",
            "Rokkufile",
            "[application]\nrun = [[\"true\"]]\n",
        );
        let identity = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();
        let application = f.manager.get(&identity).await.unwrap();
        wait_until(|| application.phase() == Phase::Exited).await;

        f.manager.kill(&identity).await.unwrap();
        f.manager.kill(&identity).await.unwrap();

        assert!(matches!(f.manager.kill("unknown").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn reload_kills_pulls_then_relaunches() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", MANIFEST);
        let identity = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();
        let application = f.manager.get(&identity).await.unwrap();
        wait_until(|| application.pid().is_some()).await;
        let first_pid = application.pid();

        f.manager.reload(&identity).await.unwrap();
        wait_until(|| application.pid().is_some() && application.pid() != first_pid).await;

        let messages = messages(&application.events());
        let killing = messages.iter().rposition(|m| m.starts_with("Killing process")).unwrap();
        let pulling = messages.iter().rposition(|m| m.starts_with("Pulling from")).unwrap();
        let launching = messages.iter().rposition(|m| m == "Launching application").unwrap();
        assert!(killing < pulling && pulling < launching);
        assert_eq!(f.source_control.pulls(), vec![application.directory.clone()]);
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn failed_pull_leaves_application_stopped() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", MANIFEST);
        let identity = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();
        let application = f.manager.get(&identity).await.unwrap();
        wait_until(|| application.pid().is_some()).await;
        f.source_control.fail_pulls();

        let err = f.manager.reload(&identity).await.unwrap_err();

        assert!(matches!(err, Error::SourceControl(_)));
        assert_eq!(application.phase(), Phase::Stopped);
        assert_eq!(application.pid(), None);
        assert!(application.events().last().unwrap().is_error());
        let launches = messages(&application.events())
            .iter()
            .filter(|m| *m == "Launching application")
            .count();
        assert_eq!(launches, 1);
    }

    #[tokio::test]
    async fn delete_kills_and_removes_checkout() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", MANIFEST);
        let identity = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();
        let application = f.manager.get(&identity).await.unwrap();
        wait_until(|| application.pid().is_some()).await;

        f.manager.delete(&identity).await.unwrap();

        assert!(!application.directory.exists());
        assert_eq!(application.pid(), None);
        assert!(matches!(f.manager.status(&identity).await, Err(Error::NotFound(_))));
        assert!(matches!(f.manager.reload(&identity).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_cleans_unregistered_directory() {
        let f = fixture();
        let identity = derive_identity("https://git.example/old.git", None);
        let directory = f.data.path().join(&identity);
        std::fs::create_dir_all(directory.join("src")).unwrap();

        f.manager.delete(&identity).await.unwrap();

        assert!(!directory.exists());
        assert!(matches!(f.manager.delete(&identity).await, Err(Error::NotFound(_))));
        assert!(matches!(f.manager.delete("../etc").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_stays_inside_data_directory() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("data");
        let victim = root.path().join("victim");
        std::fs::create_dir_all(victim.join("keep")).unwrap();
        let identity = derive_identity("https://git.example/app.git", Some("x"));
        std::fs::create_dir_all(data.join(format!("{}.x", identity))).unwrap();
        let manager = ApplicationManager::new(
            &data,
            "Rokkufile",
            Arc::new(FakeSourceControl::default()),
            Arc::new(routing_service()),
            Arc::new(RecordingSink::default()),
        );

        let err = manager
            .delete(&format!("{}.x/../../victim", identity))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert!(victim.join("keep").exists());
    }

    #[tokio::test]
    async fn path_like_variants_are_rejected() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "deploy/Rokkufile", MANIFEST);

        for variant in ["deploy/Rokkufile", "../Rokkufile", ".."] {
            let request = DeployRequest {
                repository: "https://git.example/app.git".to_string(),
                branch: None,
                config: Some(variant.to_string()),
            };
            assert!(matches!(f.manager.deploy(request.clone()).await, Err(Error::Validation(_))));
            assert!(matches!(f.manager.validate(request).await, Err(Error::Validation(_))));
        }

        assert!(f.source_control.clones().is_empty());
        assert!(f.manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn delete_releases_dns_claim() {
        const CLAIMING: &str = r#"
[application]
run = [["sleep", "30"]]

[dns]
zone = "example.com"
domain = "app.example.com"
"#;
        let data = tempfile::tempdir().unwrap();
        let source_control = Arc::new(FakeSourceControl::default());
        source_control.publish("https://git.example/a.git", "Rokkufile", CLAIMING);
        source_control.publish("https://git.example/b.git", "Rokkufile", CLAIMING);
        let provider = Arc::new(FakeDnsProvider::default());
        let store = Arc::new(MemoryRecordStore::default());
        let routing = RoutingService::new(
            PortAllocator::new(),
            Arc::new(FakeRoutes::default()),
            DnsReconciler::new(provider.clone(), store.clone(), Arc::new(FakeAddress::new("203.0.113.7"))),
            Arc::new(FakeProbe::healthy()),
        );
        let manager = ApplicationManager::new(
            data.path(),
            "Rokkufile",
            source_control,
            Arc::new(routing),
            Arc::new(RecordingSink::default()),
        );

        let a = manager.deploy(DeployRequest::new("https://git.example/a.git")).await.unwrap();
        wait_until(|| provider.live().len() == 1).await;
        manager.delete(&a).await.unwrap();

        assert!(provider.live().is_empty());
        assert!(store.all().await.unwrap().is_empty());

        let b = manager.deploy(DeployRequest::new("https://git.example/b.git")).await.unwrap();
        wait_until(|| provider.live().len() == 1).await;
        let application = manager.get(&b).await.unwrap();
        wait_until(|| application.phase() == Phase::Running).await;
        assert_eq!(store.all().await.unwrap()[0].0, b);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn recovery_redeploys_valid_checkouts() {
        let f = fixture();
        f.source_control.publish("https://git.example/a.git", "Rokkufile", MANIFEST);
        f.source_control.publish("https://git.example/b.git", "Rokkufile.prod", MANIFEST);
        let a = derive_identity("https://git.example/a.git", None);
        let b = derive_identity("https://git.example/b.git", Some("Rokkufile.prod"));
        f.source_control.fake_checkout(
            &checkout_directory(f.data.path(), &a, None),
            "https://git.example/a.git",
            &["Rokkufile"],
        );
        f.source_control.fake_checkout(
            &checkout_directory(f.data.path(), &b, Some("Rokkufile.prod")),
            "https://git.example/b.git",
            &["Rokkufile.prod"],
        );
        std::fs::create_dir_all(f.data.path().join(derive_identity("orphan", None))).unwrap();
        std::fs::create_dir_all(f.data.path().join("scratch")).unwrap();

        let mut deployed = f.manager.recover().await.unwrap();
        deployed.sort();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(deployed, expected);
        assert_eq!(f.source_control.clones().len(), 2);
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn push_reloads_only_opted_in_branches() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", MANIFEST);
        f.source_control.publish(
            "https://git.example/manual.git",
            "Rokkufile",
            "[application]\nrun = [[\"true\"]]\n[repository]\nbranch = \"main\"\n",
        );
        let app = f
            .manager
            .deploy(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();
        f.manager
            .deploy(DeployRequest::new("https://git.example/manual.git"))
            .await
            .unwrap();

        let other_branch = PushNotification {
            branch: "develop".to_string(),
            repository_urls: vec!["https://git.example/app.git".to_string()],
        };
        assert!(f.manager.handle_push(&other_branch).await.is_empty());

        let opted_out = PushNotification {
            branch: "main".to_string(),
            repository_urls: vec!["https://git.example/manual".to_string()],
        };
        assert!(f.manager.handle_push(&opted_out).await.is_empty());
        assert!(f.source_control.pulls().is_empty());

        let matching = PushNotification {
            branch: "main".to_string(),
            repository_urls: vec!["https://git.example/app".to_string()],
        };
        assert_eq!(f.manager.handle_push(&matching).await, vec![app]);
        assert_eq!(f.source_control.pulls().len(), 1);
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn validate_cleans_up_scratch_checkout() {
        let f = fixture();
        f.source_control.publish("https://git.example/app.git", "Rokkufile", MANIFEST);

        let manifest = f
            .manager
            .validate(DeployRequest::new("https://git.example/app.git"))
            .await
            .unwrap();

        assert!(manifest.repository.reload_on_push);
        assert_eq!(std::fs::read_dir(f.data.path()).unwrap().count(), 0);
        assert!(f.manager.list().await.is_empty());
    }
}

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    FetchOptions, RemoteCallbacks, Repository,
};
use log::info;

use crate::domain::{port::SourceControl, Error};

/// libgit2-backed checkouts. Every operation runs on the blocking pool and
/// is abandoned once the timeout elapses; transfers still in flight cancel
/// themselves at the same deadline.
pub struct GitSourceControl {
    timeout: Duration,
}

impl GitSourceControl {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run<T, F>(&self, operation: &'static str, task: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, git2::Error> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(task);
        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(Error::SourceControl(format!(
                "{} timed out after {}s",
                operation,
                self.timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(Error::SourceControl(format!("{} aborted: {}", operation, e))),
            Ok(Ok(result)) => {
                result.map_err(|e| Error::SourceControl(format!("{} failed: {}", operation, e.message())))
            }
        }
    }
}

fn fetch_options<'a>(deadline: Instant) -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |_| Instant::now() < deadline);
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn clone_into(url: &str, branch: Option<&str>, directory: &Path, deadline: Instant) -> Result<(), git2::Error> {
    let mut builder = RepoBuilder::new();
    if let Some(branch) = branch {
        builder.branch(branch);
    }
    builder.fetch_options(fetch_options(deadline));
    builder.clone(url, directory).map(|_| ())
}

fn fast_forward(directory: &Path, deadline: Instant) -> Result<(), git2::Error> {
    let repository = Repository::open(directory)?;
    let head = repository.head()?;
    let branch = head
        .shorthand()
        .ok_or_else(|| git2::Error::from_str("HEAD is not on a branch"))?
        .to_string();

    repository
        .find_remote("origin")?
        .fetch(&[branch.as_str()], Some(&mut fetch_options(deadline)), None)?;
    let fetch_head = repository.find_reference("FETCH_HEAD")?;
    let incoming = repository.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repository.merge_analysis(&[&incoming])?;

    if analysis.is_up_to_date() {
        return Ok(());
    }
    if !analysis.is_fast_forward() {
        return Err(git2::Error::from_str(&format!(
            "branch {} diverged from origin, refusing to merge",
            branch
        )));
    }
    let reference_name = format!("refs/heads/{}", branch);
    repository
        .find_reference(&reference_name)?
        .set_target(incoming.id(), "fast-forward")?;
    repository.set_head(&reference_name)?;
    repository.checkout_head(Some(CheckoutBuilder::default().force()))
}

#[async_trait]
impl SourceControl for GitSourceControl {
    async fn clone_repository(
        &self,
        repository: &str,
        branch: Option<&str>,
        directory: &Path,
    ) -> Result<(), Error> {
        info!("Clone git repository {}", repository);
        let url = repository.to_string();
        let branch = branch.map(str::to_string);
        let directory = directory.to_path_buf();
        let deadline = Instant::now() + self.timeout;
        self.run("clone", move || clone_into(&url, branch.as_deref(), &directory, deadline))
            .await
    }

    async fn pull(&self, directory: &Path) -> Result<(), Error> {
        let directory: PathBuf = directory.to_path_buf();
        let deadline = Instant::now() + self.timeout;
        self.run("pull", move || fast_forward(&directory, deadline)).await
    }

    async fn origin_url(&self, directory: &Path) -> Result<String, Error> {
        let directory = directory.to_path_buf();
        self.run("origin lookup", move || {
            let repository = Repository::open(&directory)?;
            let remote = repository.find_remote("origin")?;
            remote
                .url()
                .map(str::to_string)
                .ok_or_else(|| git2::Error::from_str("origin url is not valid utf-8"))
        })
        .await
    }
}

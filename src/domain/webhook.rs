use itertools::Itertools;
use serde::Deserialize;

/// A push (or merged merge request) reported by a source forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub branch: String,
    pub repository_urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitlabHookPayload {
    object_kind: String,
    #[serde(rename = "ref")]
    reference: String,
    project: GitlabUrls,
    repository: GitlabUrls,
    object_attributes: GitlabMergeAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitlabUrls {
    url: String,
    homepage: String,
    web_url: String,
    git_http_url: String,
    git_ssh_url: String,
    http_url: String,
    ssh_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitlabMergeAttributes {
    target_branch: String,
    state: String,
}

impl GitlabUrls {
    fn all(&self) -> impl Iterator<Item = &String> {
        [
            &self.url,
            &self.homepage,
            &self.web_url,
            &self.git_http_url,
            &self.git_ssh_url,
            &self.http_url,
            &self.ssh_url,
        ]
        .into_iter()
    }
}

impl PushNotification {
    /// Parses a GitLab hook body. Anything that is not a push or a merged
    /// merge request yields `None`.
    pub fn from_gitlab(body: &[u8]) -> Option<PushNotification> {
        let payload: GitlabHookPayload = serde_json::from_slice(body).ok()?;
        let branch = match payload.object_kind.as_str() {
            "push" => branch_of(&payload.reference)?,
            "merge_request" if payload.object_attributes.state == "merged" => {
                payload.object_attributes.target_branch.clone()
            }
            _ => return None,
        };
        if branch.is_empty() {
            return None;
        }
        let repository_urls = payload
            .project
            .all()
            .chain(payload.repository.all())
            .filter(|url| !url.is_empty())
            .cloned()
            .unique()
            .collect();
        Some(PushNotification {
            branch,
            repository_urls,
        })
    }

    pub fn mentions(&self, repository: &str) -> bool {
        let repository = normalize(repository);
        self.repository_urls
            .iter()
            .any(|url| normalize(url) == repository)
    }
}

fn branch_of(reference: &str) -> Option<String> {
    reference
        .strip_prefix("refs/heads/")
        .or_else(|| reference.rsplit('/').next())
        .filter(|branch| !branch.is_empty())
        .map(str::to_string)
}

fn normalize(url: &str) -> &str {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url)
}

//! Built-in resource descriptors
//!
//! | Resource      | Path                                             |
//! |---------------|--------------------------------------------------|
//! | Issue         | `/view/{ISSUE-KEY}`                              |
//! | Wiki          | `/alias/wiki/{id}`                               |
//! | Wiki (title)  | `/wiki/{PROJECT}/{title}[/diff/{from}...{to}]`   |
//! | Document      | `/document/{PROJECT}/[e/]{32-hex id}`            |
//! | Pull request  | `/git/{PROJECT}/{repo}/pullRequests/{n}`         |
//! | Git file/tree | `/git/{PROJECT}/{repo}/(blob\|tree)/{path}`      |
//! | Git commit    | `/git/{PROJECT}/{repo}/commit/{hash}`            |

use super::{ResourceDescriptor, ResourceKind, RouteParams, TitleContext};
use crate::api::{DocumentPage, Issue, IssueComment, Project, PullRequest, Wiki};
use crate::error::CoreError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;
use url::Url;

const ISSUE_KEY: &str = r"(?P<issue_key>[A-Z0-9_]+-[0-9]+)";
const WIKI_ID: &str = r"(?P<wiki_id>[0-9]+)";
const DOCUMENT_ID: &str = r"(?P<document_id>[a-f0-9]{32})";
const PROJECT_KEY: &str = r"(?P<project_key>[A-Z0-9_]+)";
const REPOSITORY: &str = r"(?P<repository>[a-z0-9-]+)";
const PULL_REQUEST_NUMBER: &str = r"(?P<number>[0-9]+)";
const COMMIT_HASH: &str = r"(?P<hash>[a-f0-9]{10,})";

/// Length of the abbreviated commit hash shown in titles
const SHORT_HASH_LEN: usize = 10;

/// Fragment prefix of comment permalinks
const COMMENT_FRAGMENT: &str = "comment-";

fn compile(pattern: String) -> Regex {
    Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", pattern, e))
}

static ISSUE_PATTERN: Lazy<Regex> = Lazy::new(|| compile(format!("^/view/{}$", ISSUE_KEY)));

static WIKI_PATTERN: Lazy<Regex> = Lazy::new(|| compile(format!("^/alias/wiki/{}$", WIKI_ID)));

static WIKI_TITLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(format!(
        r"^/wiki/{}/(?P<title>.+?)(?:/diff/(?P<from>[0-9]+)\.\.\.(?P<to>[0-9]+))?$",
        PROJECT_KEY
    ))
});

static DOCUMENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(format!(
        "^/document/{}/(?P<edit>e/)?{}$",
        PROJECT_KEY, DOCUMENT_ID
    ))
});

static PULL_REQUEST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(format!(
        "^/git/{}/{}/pullRequests/{}$",
        PROJECT_KEY, REPOSITORY, PULL_REQUEST_NUMBER
    ))
});

static GIT_FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(format!(
        "^/git/{}/{}/(?:blob|tree)/(?P<path>.+)$",
        PROJECT_KEY, REPOSITORY
    ))
});

static GIT_COMMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(format!(
        "^/git/{}/{}/commit/{}$",
        PROJECT_KEY, REPOSITORY, COMMIT_HASH
    ))
});

/// Every built-in descriptor, in registration order
pub fn default_descriptors() -> Vec<Arc<dyn ResourceDescriptor>> {
    vec![
        Arc::new(IssueDescriptor),
        Arc::new(WikiDescriptor),
        Arc::new(WikiTitleDescriptor),
        Arc::new(DocumentDescriptor),
        Arc::new(PullRequestDescriptor),
        Arc::new(GitFileDescriptor),
        Arc::new(GitCommitDescriptor),
    ]
}

fn param<'a>(params: &'a RouteParams, name: &str) -> Result<&'a str, CoreError> {
    params.get(name).ok_or_else(|| CoreError::InvalidUrl {
        url: format!("<{}>", name),
        reason: "pattern matched without a required capture".to_string(),
    })
}

fn host(url: &Url) -> Result<&str, CoreError> {
    url.host_str().ok_or_else(|| CoreError::InvalidUrl {
        url: url.to_string(),
        reason: "missing host".to_string(),
    })
}

/// Comment id from a `#comment-{id}` fragment
fn comment_id(url: &Url) -> Option<&str> {
    let id = url.fragment()?.strip_prefix(COMMENT_FRAGMENT)?;
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}

fn decode(segment: &str) -> Cow<'_, str> {
    urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment))
}

/// `[PROJ-1][Open] Fix login | Issue`, or `| Comment by {name}` for comment links
pub struct IssueDescriptor;

#[async_trait]
impl ResourceDescriptor for IssueDescriptor {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Issue
    }

    fn pattern(&self) -> &Regex {
        &ISSUE_PATTERN
    }

    async fn build_title(
        &self,
        params: &RouteParams,
        url: &Url,
        ctx: &TitleContext<'_>,
    ) -> Result<Option<String>, CoreError> {
        let host = host(url)?;
        let issue_key = param(params, "issue_key")?;
        let issue_path = format!("/issues/{}", issue_key);

        let Some(comment_id) = comment_id(url) else {
            let issue: Issue = ctx.client.get(host, &issue_path, ctx.ttl.volatile).await?;
            return Ok(Some(format!(
                "[{}][{}] {} | Issue",
                issue_key, issue.status.name, issue.summary
            )));
        };

        let comment_path = format!("{}/comments/{}", issue_path, comment_id);
        let (issue, comment) = tokio::try_join!(
            ctx.client.get::<Issue>(host, &issue_path, ctx.ttl.volatile),
            ctx.client
                .get::<IssueComment>(host, &comment_path, ctx.ttl.volatile),
        )?;

        Ok(Some(format!(
            "[{}][{}] {} | Comment by {}",
            issue_key, issue.status.name, issue.summary, comment.created_user.name
        )))
    }
}

/// `[PROJ] Home | Wiki`, resolving the project through the wiki's `projectId`
pub struct WikiDescriptor;

#[async_trait]
impl ResourceDescriptor for WikiDescriptor {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Wiki
    }

    fn pattern(&self) -> &Regex {
        &WIKI_PATTERN
    }

    async fn build_title(
        &self,
        params: &RouteParams,
        url: &Url,
        ctx: &TitleContext<'_>,
    ) -> Result<Option<String>, CoreError> {
        let host = host(url)?;
        let wiki_id = param(params, "wiki_id")?;

        let wiki: Wiki = ctx
            .client
            .get(host, &format!("/wikis/{}", wiki_id), ctx.ttl.stable)
            .await?;
        let project: Project = ctx
            .client
            .get(host, &format!("/projects/{}", wiki.project_id), ctx.ttl.stable)
            .await?;

        Ok(Some(format!("[{}] {} | Wiki", project.project_key, wiki.name)))
    }
}

/// Wiki addressed by title; everything needed is in the path
pub struct WikiTitleDescriptor;

#[async_trait]
impl ResourceDescriptor for WikiTitleDescriptor {
    fn kind(&self) -> ResourceKind {
        ResourceKind::WikiTitle
    }

    fn pattern(&self) -> &Regex {
        &WIKI_TITLE_PATTERN
    }

    async fn build_title(
        &self,
        params: &RouteParams,
        _url: &Url,
        _ctx: &TitleContext<'_>,
    ) -> Result<Option<String>, CoreError> {
        let project_key = param(params, "project_key")?;
        let title = decode(param(params, "title")?);

        let diff = match (params.get("from"), params.get("to")) {
            (Some(from), Some(to)) => format!(
                " (Comparison between version {} and version {})",
                from, to
            ),
            _ => String::new(),
        };

        Ok(Some(format!("[{}] {}{} | Wiki", project_key, title, diff)))
    }
}

/// `[PROJ] Spec | Document`, with an `Edit ` prefix for `/e/` links
pub struct DocumentDescriptor;

#[async_trait]
impl ResourceDescriptor for DocumentDescriptor {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Document
    }

    fn pattern(&self) -> &Regex {
        &DOCUMENT_PATTERN
    }

    async fn build_title(
        &self,
        params: &RouteParams,
        url: &Url,
        ctx: &TitleContext<'_>,
    ) -> Result<Option<String>, CoreError> {
        let host = host(url)?;
        let project_key = param(params, "project_key")?;
        let document_id = param(params, "document_id")?;
        let edit = if params.contains("edit") { "Edit " } else { "" };

        let document: DocumentPage = ctx
            .client
            .get(host, &format!("/documents/{}", document_id), ctx.ttl.stable)
            .await?;

        Ok(Some(format!(
            "[{}] {}{} | Document",
            project_key, edit, document.title
        )))
    }
}

/// `[PROJ/repo#3][Open] Add feature | Pull Request`; comment links get no title
pub struct PullRequestDescriptor;

#[async_trait]
impl ResourceDescriptor for PullRequestDescriptor {
    fn kind(&self) -> ResourceKind {
        ResourceKind::PullRequest
    }

    fn pattern(&self) -> &Regex {
        &PULL_REQUEST_PATTERN
    }

    async fn build_title(
        &self,
        params: &RouteParams,
        url: &Url,
        ctx: &TitleContext<'_>,
    ) -> Result<Option<String>, CoreError> {
        if url
            .fragment()
            .is_some_and(|f| f.starts_with(COMMENT_FRAGMENT))
        {
            return Ok(None);
        }

        let host = host(url)?;
        let project_key = param(params, "project_key")?;
        let repository = param(params, "repository")?;
        let number = param(params, "number")?;

        let pull_request: PullRequest = ctx
            .client
            .get(
                host,
                &format!(
                    "/projects/{}/git/repositories/{}/pullRequests/{}",
                    project_key, repository, number
                ),
                ctx.ttl.volatile,
            )
            .await?;

        Ok(Some(format!(
            "[{}/{}#{}][{}] {} | Pull Request",
            project_key, repository, number, pull_request.status.name, pull_request.summary
        )))
    }
}

/// `[PROJ/repo] App.tsx | Git`: last path segment only
pub struct GitFileDescriptor;

#[async_trait]
impl ResourceDescriptor for GitFileDescriptor {
    fn kind(&self) -> ResourceKind {
        ResourceKind::GitFile
    }

    fn pattern(&self) -> &Regex {
        &GIT_FILE_PATTERN
    }

    async fn build_title(
        &self,
        params: &RouteParams,
        _url: &Url,
        _ctx: &TitleContext<'_>,
    ) -> Result<Option<String>, CoreError> {
        let project_key = param(params, "project_key")?;
        let repository = param(params, "repository")?;
        let path = param(params, "path")?;

        let Some(name) = path.split('/').filter(|s| !s.is_empty()).next_back() else {
            return Ok(None);
        };

        Ok(Some(format!(
            "[{}/{}] {} | Git",
            project_key,
            repository,
            decode(name)
        )))
    }
}

/// `[PROJ/repo] リビジョン : d883cf5174 | Git`
pub struct GitCommitDescriptor;

#[async_trait]
impl ResourceDescriptor for GitCommitDescriptor {
    fn kind(&self) -> ResourceKind {
        ResourceKind::GitCommit
    }

    fn pattern(&self) -> &Regex {
        &GIT_COMMIT_PATTERN
    }

    async fn build_title(
        &self,
        params: &RouteParams,
        _url: &Url,
        _ctx: &TitleContext<'_>,
    ) -> Result<Option<String>, CoreError> {
        let project_key = param(params, "project_key")?;
        let repository = param(params, "repository")?;
        let hash = param(params, "hash")?;
        // The pattern only admits ASCII hex, so byte slicing is safe
        let short = &hash[..SHORT_HASH_LEN.min(hash.len())];

        Ok(Some(format!(
            "[{}/{}] リビジョン : {} | Git",
            project_key, repository, short
        )))
    }
}

//! Response schemas for the `/api/v2` endpoints used in titles
//!
//! Only the fields that titles consume are declared; everything else in the
//! payload is ignored.

use serde::Deserialize;

/// Named status shared by issues and pull requests
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub name: String,
}

/// `GET /space`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub name: String,
    pub space_key: String,
}

/// `GET /projects/{projectIdOrKey}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_key: String,
    pub name: String,
}

/// `GET /issues/{issueKey}`
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub summary: String,
    pub status: Status,
}

/// `GET /issues/{issueKey}/comments/{commentId}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueComment {
    pub created_user: User,
}

/// `GET /wikis/{wikiId}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wiki {
    pub project_id: u64,
    pub name: String,
}

/// `GET /documents/{documentId}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub project_id: u64,
    pub title: String,
}

/// `GET /projects/{key}/git/repositories/{repo}/pullRequests/{number}`
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub summary: String,
    pub base: String,
    pub branch: String,
    pub status: Status,
}

/// Schema name used in error messages
pub trait Schema {
    const NAME: &'static str;
}

macro_rules! schema_name {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(impl Schema for $ty {
            const NAME: &'static str = $name;
        })*
    };
}

schema_name! {
    Space => "space",
    Project => "project",
    Issue => "issue",
    IssueComment => "issue comment",
    Wiki => "wiki",
    DocumentPage => "document",
    PullRequest => "pull request",
}

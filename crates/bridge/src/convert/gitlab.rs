//! GitLab project webhook conversion.
//!
//! Event names arrive in the `X-Gitlab-Event` header. GitLab has no app
//! installation concept, so the project id plays the role of the
//! installation id.

use serde::Deserialize;
use serde_json::Value;

use super::{first_non_empty, lookup, positive_id, Delivery, Handler};
use crate::event::{artifact_id, short_sha};
use crate::{CanonicalEvent, ConvertError, InstallationId};

pub(crate) const HANDLERS: &[(&str, Handler)] = &[
    ("Push Hook", push),
    ("Tag Push Hook", tag_push),
    ("Pipeline Hook", pipeline),
    ("Deployment Hook", deployment),
    ("Merge Request Hook", merge_request),
];

const PIPELINE_STATUSES: &[(&str, &str)] = &[
    ("success", "dev.cdevents.pipeline.run.succeeded.0.3.0"),
    ("failed", "dev.cdevents.pipeline.run.failed.0.3.0"),
    ("canceled", "dev.cdevents.pipeline.run.failed.0.3.0"),
];
const PIPELINE_STARTED: &str = "dev.cdevents.pipeline.run.started.0.3.0";

const DEPLOYMENT_STATUSES: &[(&str, &str)] = &[
    ("success", "service.deployed"),
    ("failed", "service.removed"),
    ("canceled", "service.removed"),
];

const TAG_REF_PREFIX: &str = "refs/tags/";

/// `project_id` first, then `project.id`; the first positive one wins.
pub(crate) fn extract_project_id(payload: &Value) -> Option<InstallationId> {
    positive_id(payload.get("project_id")).or_else(|| positive_id(payload.pointer("/project/id")))
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Named {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PushPayload {
    after: String,
    user_name: String,
    project: Named,
    repository: Named,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    user_name: String,
    project: Named,
    repository: Homepage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Homepage {
    homepage: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PipelinePayload {
    object_attributes: PipelineAttributes,
    user: Named,
    project: Named,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PipelineAttributes {
    id: i64,
    status: String,
    url: String,
    sha: String,
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeploymentPayload {
    status: String,
    environment: String,
    sha: String,
    short_sha: String,
    user: Named,
    project: Named,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MergeRequestPayload {
    object_attributes: MergeRequestAttributes,
    user: Named,
    project: Named,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MergeRequestAttributes {
    iid: i64,
    action: String,
    state: String,
    last_commit: Commit,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Commit {
    id: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn push(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: PushPayload = delivery.decode()?;
    let service = first_non_empty(&[body.project.name.as_str(), body.repository.name.as_str()]);
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let sha = short_sha(&body.after);
    Ok(vec![CanonicalEvent {
        artifact: artifact_id(service, &sha),
        subject_type: "change".into(),
        subject_id: format!("change/{sha}"),
        chain_id: delivery.chain_id(),
        actor_name: body.user_name.trim().to_string(),
        ..delivery.event("dev.cdevents.change.pushed.0.3.0", service)
    }])
}

fn tag_push(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: TagPushPayload = delivery.decode()?;
    let service = body.project.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let git_ref = body.git_ref.trim();
    let tag = match git_ref.strip_prefix(TAG_REF_PREFIX).unwrap_or(git_ref) {
        "" => "latest",
        t => t,
    };
    Ok(vec![CanonicalEvent {
        artifact: artifact_id(service, tag),
        actor_name: body.user_name.trim().to_string(),
        pipeline_url: body.repository.homepage.trim().to_string(),
        ..delivery.event("service.published", service)
    }])
}

fn pipeline(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: PipelinePayload = delivery.decode()?;
    let service = body.project.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let attrs = &body.object_attributes;
    let status = attrs.status.trim().to_lowercase();
    let mut event = delivery.event(lookup(PIPELINE_STATUSES, &status, PIPELINE_STARTED), service);
    // GitLab pipelines have no environment; the ref stands in for one.
    if !attrs.git_ref.trim().is_empty() {
        event.environment = attrs.git_ref.trim().to_string();
    }
    event.artifact = artifact_id(service, &short_sha(&attrs.sha));
    event.subject_type = "pipeline".into();
    event.subject_id = format!("pipeline/{service}/{}", attrs.id);
    event.pipeline_run = attrs.id.to_string();
    event.pipeline_url = attrs.url.trim().to_string();
    event.actor_name = body.user.name.trim().to_string();
    Ok(vec![event])
}

fn deployment(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: DeploymentPayload = delivery.decode()?;
    let service = body.project.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let status = body.status.trim().to_lowercase();
    let mut event = delivery.event(
        lookup(DEPLOYMENT_STATUSES, &status, "service.upgraded"),
        service,
    );
    if !body.environment.trim().is_empty() {
        event.environment = body.environment.trim().to_string();
    }
    let sha = first_non_empty(&[body.short_sha.as_str(), body.sha.as_str()]);
    event.artifact = artifact_id(service, &short_sha(sha));
    event.actor_name = body.user.name.trim().to_string();
    Ok(vec![event])
}

fn merge_request(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: MergeRequestPayload = delivery.decode()?;
    let service = body.project.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let attrs = &body.object_attributes;
    let action = first_non_empty(&[attrs.action.as_str(), attrs.state.as_str()]).to_lowercase();
    let suffix = match action.as_str() {
        "merge" | "merged" => "merged",
        "" => "updated",
        other => other,
    };
    Ok(vec![CanonicalEvent {
        artifact: artifact_id(service, &short_sha(&attrs.last_commit.id)),
        subject_type: "change".into(),
        subject_id: format!("change/mr-{}", attrs.iid),
        chain_id: delivery.chain_id(),
        actor_name: body.user.name.trim().to_string(),
        ..delivery.event(format!("dev.cdevents.change.{suffix}.0.3.0"), service)
    }])
}

//! GitHub App webhook conversion.
//!
//! Event names arrive in the `X-GitHub-Event` header. Handled events:
//! `release`, `deployment_status`, `workflow_run`, `push`, `pull_request`.

use serde::Deserialize;
use serde_json::Value;

use super::{lookup, positive_id, Delivery, Handler};
use crate::event::{artifact_id, short_sha};
use crate::{CanonicalEvent, ConvertError, InstallationId};

pub(crate) const HANDLERS: &[(&str, Handler)] = &[
    ("release", release),
    ("deployment_status", deployment_status),
    ("workflow_run", workflow_run),
    ("push", push),
    ("pull_request", pull_request),
];

/// `deployment_status.state` → canonical type. Anything unlisted is
/// `service.upgraded`.
const DEPLOYMENT_STATES: &[(&str, &str)] = &[
    ("success", "service.deployed"),
    ("failure", "service.removed"),
    ("error", "service.removed"),
    ("inactive", "service.removed"),
    ("in_progress", "service.upgraded"),
    ("queued", "service.upgraded"),
    ("pending", "service.upgraded"),
];

const PIPELINE_STARTED: &str = "dev.cdevents.pipeline.run.started.0.3.0";
const PIPELINE_SUCCEEDED: &str = "dev.cdevents.pipeline.run.succeeded.0.3.0";
const PIPELINE_FAILED: &str = "dev.cdevents.pipeline.run.failed.0.3.0";
const CHANGE_PUSHED: &str = "dev.cdevents.change.pushed.0.3.0";

pub(crate) fn extract_installation_id(payload: &Value) -> Option<InstallationId> {
    positive_id(payload.pointer("/installation/id"))
}

// ---------------------------------------------------------------------------
// Payload shapes. Only the fields the handlers read are declared.
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Repository {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct User {
    login: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReleasePayload {
    action: String,
    repository: Repository,
    release: Release,
    sender: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Release {
    tag_name: String,
    html_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeploymentStatusPayload {
    repository: Repository,
    deployment: Deployment,
    deployment_status: DeploymentStatus,
    sender: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Deployment {
    environment: String,
    sha: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeploymentStatus {
    state: String,
    environment: String,
    target_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkflowRunPayload {
    action: String,
    repository: Repository,
    workflow_run: WorkflowRun,
    sender: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkflowRun {
    id: i64,
    conclusion: String,
    html_url: String,
    head_sha: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PushPayload {
    after: String,
    repository: Repository,
    pusher: Pusher,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pusher {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PullRequestPayload {
    action: String,
    pull_request: PullRequest,
    repository: Repository,
    sender: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PullRequest {
    number: i64,
    merged: bool,
    head: Head,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Head {
    sha: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn release(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: ReleasePayload = delivery.decode()?;
    if body.action.trim() != "published" {
        return Ok(Vec::new());
    }
    let service = body.repository.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let tag = match body.release.tag_name.trim() {
        "" => "latest",
        t => t,
    };
    Ok(vec![CanonicalEvent {
        artifact: artifact_id(service, tag),
        actor_name: body.sender.login.trim().to_string(),
        pipeline_url: body.release.html_url.trim().to_string(),
        ..delivery.event("service.published", service)
    }])
}

fn deployment_status(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: DeploymentStatusPayload = delivery.decode()?;
    let service = body.repository.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let state = body.deployment_status.state.trim().to_lowercase();
    let event_type = lookup(DEPLOYMENT_STATES, &state, "service.upgraded");

    let mut event = delivery.event(event_type, service);
    let environment = super::first_non_empty(&[
        body.deployment_status.environment.as_str(),
        body.deployment.environment.as_str(),
    ]);
    if !environment.is_empty() {
        event.environment = environment.to_string();
    }
    event.artifact = artifact_id(service, &short_sha(&body.deployment.sha));
    event.actor_name = body.sender.login.trim().to_string();
    event.pipeline_url = body.deployment_status.target_url.trim().to_string();
    Ok(vec![event])
}

fn workflow_run(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: WorkflowRunPayload = delivery.decode()?;
    let service = body.repository.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let event_type = if body.action.trim().eq_ignore_ascii_case("completed") {
        if body.workflow_run.conclusion.trim().eq_ignore_ascii_case("success") {
            PIPELINE_SUCCEEDED
        } else {
            PIPELINE_FAILED
        }
    } else {
        PIPELINE_STARTED
    };
    let run = &body.workflow_run;
    Ok(vec![CanonicalEvent {
        artifact: artifact_id(service, &short_sha(&run.head_sha)),
        subject_type: "pipeline".into(),
        subject_id: format!("pipeline/{service}/{}", run.id),
        pipeline_run: run.id.to_string(),
        pipeline_url: run.html_url.trim().to_string(),
        actor_name: body.sender.login.trim().to_string(),
        ..delivery.event(event_type, service)
    }])
}

fn push(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: PushPayload = delivery.decode()?;
    let service = body.repository.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let sha = short_sha(&body.after);
    Ok(vec![CanonicalEvent {
        artifact: artifact_id(service, &sha),
        subject_type: "change".into(),
        subject_id: format!("change/{sha}"),
        chain_id: delivery.chain_id(),
        actor_name: body.pusher.name.trim().to_string(),
        ..delivery.event(CHANGE_PUSHED, service)
    }])
}

fn pull_request(delivery: &Delivery<'_>) -> Result<Vec<CanonicalEvent>, ConvertError> {
    let body: PullRequestPayload = delivery.decode()?;
    let service = body.repository.name.trim();
    if service.is_empty() {
        return Ok(Vec::new());
    }
    let action = body.action.trim().to_lowercase();
    let suffix = match action.as_str() {
        "closed" if body.pull_request.merged => "merged",
        "" => "updated",
        other => other,
    };
    Ok(vec![CanonicalEvent {
        artifact: artifact_id(service, &short_sha(&body.pull_request.head.sha)),
        subject_type: "change".into(),
        subject_id: format!("change/pr-{}", body.pull_request.number),
        chain_id: delivery.chain_id(),
        actor_name: body.sender.login.trim().to_string(),
        ..delivery.event(format!("dev.cdevents.change.{suffix}.0.3.0"), service)
    }])
}

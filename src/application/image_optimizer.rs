//! Image optimizer: a recv snippet that asks the edge to optimize images,
//! plus the per-version `io_settings` defaults.
//!
//! Enabling requires image optimization to be provisioned on the service;
//! the status endpoint answers 404 otherwise and nothing is cloned.

use askama::Template;
use edgepurge_api_types::{IoSettings, SnippetDraft};
use serde::Serialize;
use tracing::{info, instrument};

use crate::application::vcl::{VclChangeSet, VclError, VclOutcome, VclWorkflow, VersionState};
use crate::config::ImageOptimizerSettings;
use crate::domain::types::WebhookEvent;
use crate::infra::cdn::{CdnClient, CdnError};

pub const IMAGE_OPTIMIZER_SNIPPET: &str = "edgepurge_image_optimizer_recv";

const SNIPPET_PRIORITY: u32 = 10;

#[derive(Template)]
#[template(path = "image_optimizer/recv.vcl", escape = "none")]
struct OptimizerRecv {
    optimize: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageOptimizerStatus {
    pub service_id: String,
    pub available: bool,
    /// Service-wide settings as returned by the API.
    pub settings: Option<serde_json::Value>,
}

pub fn io_settings(settings: &ImageOptimizerSettings) -> IoSettings {
    IoSettings {
        webp: settings.webp,
        webp_quality: settings.webp_quality.get(),
        jpeg_type: settings.jpeg_type.as_str().to_string(),
        jpeg_quality: settings.jpeg_quality.get(),
        upscale: settings.upscale,
        resize_filter: settings.resize_filter.as_str().to_string(),
    }
}

/// Snippet upsert and io settings patch, activated on success.
pub fn change_set(settings: &ImageOptimizerSettings) -> Result<VclChangeSet, VclError> {
    let content = OptimizerRecv {
        optimize: settings.optimize.as_str(),
    }
    .render()
    .map_err(|err| {
        VclError::new(
            VersionState::None,
            None,
            format!("failed to render image optimizer snippet: {err}"),
        )
    })?;

    Ok(VclChangeSet {
        snippets: vec![SnippetDraft {
            name: IMAGE_OPTIMIZER_SNIPPET.to_string(),
            kind: "recv".to_string(),
            content,
            priority: SNIPPET_PRIORITY,
            dynamic: 0,
        }],
        io_settings: Some(io_settings(settings)),
        activate: true,
        ..VclChangeSet::default()
    })
}

#[instrument(skip(client), fields(service_id = %client.service_id()))]
pub async fn status(client: &CdnClient) -> Result<ImageOptimizerStatus, CdnError> {
    let settings = client.dynamic_io_settings().await?;
    Ok(ImageOptimizerStatus {
        service_id: client.service_id().to_string(),
        available: settings.is_some(),
        settings,
    })
}

#[instrument(skip_all, fields(optimize = %settings.optimize))]
pub async fn enable(
    workflow: &VclWorkflow,
    settings: &ImageOptimizerSettings,
) -> Result<VclOutcome, VclError> {
    let current = status(workflow.client()).await.map_err(|err| {
        VclError::new(
            VersionState::None,
            None,
            format!("failed to read image optimizer status: {err}"),
        )
    })?;
    if !current.available {
        return Err(VclError::new(
            VersionState::None,
            None,
            format!(
                "image optimization is not enabled on service {}",
                current.service_id
            ),
        ));
    }

    let outcome = workflow.apply(&change_set(settings)?).await?;
    info!(version = outcome.version, "image optimizer enabled");
    workflow
        .notify(
            WebhookEvent::ConfigSave,
            &format!(
                "Image optimizer enabled in version {} of service {}",
                outcome.version, current.service_id
            ),
        )
        .await;
    Ok(outcome)
}

/// Delete the optimizer snippet on a clone and activate it. The io settings
/// stay on the version; without the header they have no effect.
#[instrument(skip_all)]
pub async fn disable(workflow: &VclWorkflow) -> Result<VclOutcome, VclError> {
    let change = VclChangeSet {
        remove_snippet_prefix: Some(IMAGE_OPTIMIZER_SNIPPET.to_string()),
        activate: true,
        ..VclChangeSet::default()
    };
    let outcome = workflow.apply(&change).await?;
    info!(
        version = outcome.version,
        removed = outcome.removed_snippets.len(),
        "image optimizer disabled"
    );
    workflow
        .notify(
            WebhookEvent::ConfigSave,
            &format!(
                "Image optimizer disabled in version {} of service {}",
                outcome.version,
                workflow.client().service_id()
            ),
        )
        .await;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::{OptimizeLevel, Quality, ResizeFilter};

    #[test]
    fn change_set_carries_snippet_and_io_settings() {
        let settings = ImageOptimizerSettings {
            optimize: OptimizeLevel::High,
            jpeg_quality: Quality::new("jpeg_quality", 70).expect("quality"),
            resize_filter: ResizeFilter::Bicubic,
            ..ImageOptimizerSettings::default()
        };
        let change = change_set(&settings).expect("change set");

        assert!(change.activate);
        assert!(change.remove_snippet_prefix.is_none());
        let snippet = &change.snippets[0];
        assert_eq!(snippet.name, IMAGE_OPTIMIZER_SNIPPET);
        assert_eq!(snippet.kind, "recv");
        assert!(snippet.content.contains(r#""fastly; optimize=high""#));

        let io = change.io_settings.expect("io settings");
        assert_eq!(io.jpeg_quality, 70);
        assert_eq!(io.webp_quality, 85);
        assert_eq!(io.resize_filter, "bicubic");
        assert_eq!(io.jpeg_type, "auto");
        assert!(io.webp);
    }
}

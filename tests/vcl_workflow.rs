#![deny(clippy::all, clippy::pedantic)]

use std::sync::Arc;

use edgepurge::application::edge_modules::{self, EdgeModule};
use edgepurge::application::image_optimizer::{self, IMAGE_OPTIMIZER_SNIPPET};
use edgepurge::application::vcl::{VersionState, VclWorkflow};
use edgepurge::config::{ImageOptimizerSettings, VclSettings};
use edgepurge::domain::image::OptimizeLevel;
use edgepurge::infra::cdn::{CdnClient, ClientOptions, Credentials};
use edgepurge::infra::webhook::WebhookNotifier;
use httpmock::{Mock, MockServer};
use serde_json::json;

fn workflow(server: &MockServer) -> VclWorkflow {
    let client = CdnClient::new(
        &server.base_url(),
        Credentials::new("token", "svc").expect("credentials"),
        ClientOptions::default(),
    )
    .expect("client");
    VclWorkflow::new(Arc::new(client), WebhookNotifier::disabled())
}

/// Active version 3, cloned into 4.
fn mock_versions(server: &MockServer) -> (Mock<'_>, Mock<'_>) {
    let versions = server.mock(|when, then| {
        when.method("GET").path("/service/svc/version");
        then.status(200).json_body(json!([
            {"number": 2, "active": false},
            {"number": 3, "active": true},
        ]));
    });
    let clone = server.mock(|when, then| {
        when.method("PUT").path("/service/svc/version/3/clone");
        then.status(200).json_body(json!({"number": 4, "active": false}));
    });
    (versions, clone)
}

fn mock_create<'a>(server: &'a MockServer, collection: &str) -> Mock<'a> {
    let path = format!("/service/svc/version/4/{collection}");
    server.mock(|when, then| {
        when.method("POST")
            .path(path)
            .header("content-type", "application/x-www-form-urlencoded");
        then.status(200).json_body(json!({"version": 4}));
    })
}

fn mock_validate(server: &MockServer, ok: bool) -> Mock<'_> {
    let body = if ok {
        json!({"status": "ok", "warnings": ["unused condition"]})
    } else {
        json!({"status": "error", "msg": "Syntax error", "errors": ["line 3: unexpected '}'"]})
    };
    server.mock(|when, then| {
        when.method("GET").path("/service/svc/version/4/validate");
        then.status(200).json_body(body);
    })
}

fn mock_activate(server: &MockServer) -> Mock<'_> {
    server.mock(|when, then| {
        when.method("PUT").path("/service/svc/version/4/activate");
        then.status(200).json_body(json!({"number": 4, "active": true}));
    })
}

#[tokio::test]
async fn default_upload_clones_writes_validates_and_activates() {
    let server = MockServer::start();
    let (versions, clone) = mock_versions(&server);
    let snippets: Vec<Mock<'_>> = ["recv", "deliver", "error", "fetch"]
        .into_iter()
        .map(|kind| {
            server.mock(|when, then| {
                when.method("POST")
                    .path("/service/svc/version/4/snippet")
                    .body_includes(format!("name=edgepurge_{kind}&type={kind}"));
                then.status(200).json_body(json!({"version": 4}));
            })
        })
        .collect();
    let conditions = mock_create(&server, "condition");
    let settings = mock_create(&server, "request_settings");
    let validate = mock_validate(&server, true);
    let activate = mock_activate(&server);

    let vcl = VclSettings {
        cookie_cache_bypass: vec!["SESSION_ID".into()],
        ..VclSettings::default()
    };
    let outcome = workflow(&server)
        .upload_defaults(&vcl, true)
        .await
        .expect("upload");

    assert_eq!(outcome.version, 4);
    assert_eq!(outcome.state, VersionState::Activated);
    assert_eq!(outcome.warnings, ["unused condition"]);
    versions.assert();
    clone.assert();
    for snippet in &snippets {
        snippet.assert();
    }
    conditions.assert_calls(1);
    settings.assert_calls(1);
    validate.assert();
    activate.assert();
}

#[tokio::test]
async fn upload_without_activation_stops_at_validated() {
    let server = MockServer::start();
    let _versions = mock_versions(&server);
    mock_create(&server, "snippet");
    mock_create(&server, "condition");
    mock_create(&server, "request_settings");
    mock_validate(&server, true);
    let activate = mock_activate(&server);

    let outcome = workflow(&server)
        .upload_defaults(&VclSettings::default(), false)
        .await
        .expect("upload");

    assert_eq!(outcome.state, VersionState::Validated);
    activate.assert_calls(0);
}

#[tokio::test]
async fn existing_objects_are_updated_in_place() {
    let server = MockServer::start();
    let _versions = mock_versions(&server);
    let existing = server.mock(|when, then| {
        when.method("GET")
            .path("/service/svc/version/4/condition/edgepurge_request");
        then.status(200).json_body(json!({"name": "edgepurge_request"}));
    });
    let update = server.mock(|when, then| {
        when.method("PUT")
            .path("/service/svc/version/4/condition/edgepurge_request");
        then.status(200).json_body(json!({"name": "edgepurge_request"}));
    });
    let create = mock_create(&server, "condition");
    mock_create(&server, "snippet");
    mock_create(&server, "request_settings");
    mock_validate(&server, true);
    mock_activate(&server);

    workflow(&server)
        .upload_defaults(&VclSettings::default(), true)
        .await
        .expect("upload");

    existing.assert();
    update.assert();
    create.assert_calls(0);
}

#[tokio::test]
async fn validation_failure_leaves_the_clone_unactivated() {
    let server = MockServer::start();
    let _versions = mock_versions(&server);
    mock_create(&server, "snippet");
    mock_create(&server, "condition");
    mock_create(&server, "request_settings");
    mock_validate(&server, false);
    let activate = mock_activate(&server);

    let err = workflow(&server)
        .upload_defaults(&VclSettings::default(), true)
        .await
        .expect_err("validation must fail");

    assert_eq!(err.state, VersionState::Cloned);
    assert_eq!(err.version, Some(4));
    assert_eq!(err.messages, ["Syntax error", "line 3: unexpected '}'"]);
    activate.assert_calls(0);
}

#[tokio::test]
async fn failed_writes_are_collected_before_validation() {
    let server = MockServer::start();
    let _versions = mock_versions(&server);
    server.mock(|when, then| {
        when.method("POST").path("/service/svc/version/4/snippet");
        then.status(400).json_body(json!({"msg": "Bad snippet"}));
    });
    mock_create(&server, "condition");
    mock_create(&server, "request_settings");
    let validate = mock_validate(&server, true);

    let err = workflow(&server)
        .upload_defaults(&VclSettings::default(), true)
        .await
        .expect_err("writes must fail");

    assert_eq!(err.state, VersionState::Cloned);
    assert_eq!(err.messages.len(), 4);
    assert!(err.messages[0].starts_with("edgepurge_recv: "));
    validate.assert_calls(0);
}

#[tokio::test]
async fn service_without_active_version_is_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/service/svc/version");
        then.status(200).json_body(json!([{"number": 1, "active": false}]));
    });

    let err = workflow(&server)
        .upload_defaults(&VclSettings::default(), true)
        .await
        .expect_err("no active version");
    assert_eq!(err.state, VersionState::None);
    assert_eq!(err.version, None);
}

#[tokio::test]
async fn error_page_is_served_as_a_503_response_object() {
    let server = MockServer::start();
    let _versions = mock_versions(&server);
    let snippet = server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/version/4/snippet")
            .body_includes("name=edgepurge_error_page_deliver")
            .body_includes("type=deliver");
        then.status(200).json_body(json!({"version": 4}));
    });
    let condition = server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/version/4/condition")
            .body_includes("priority=10");
        then.status(200).json_body(json!({"version": 4}));
    });
    let object = server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/version/4/response_object")
            .body_includes("status=503")
            .body_includes("content_type=text%2Fhtml");
        then.status(200).json_body(json!({"version": 4}));
    });
    mock_validate(&server, true);
    let activate = mock_activate(&server);

    let outcome = workflow(&server)
        .upload_error_page("<h1>Back soon</h1>")
        .await
        .expect("error page");

    assert_eq!(outcome.state, VersionState::Activated);
    snippet.assert();
    condition.assert();
    object.assert();
    activate.assert();
}

#[tokio::test]
async fn empty_error_page_is_rejected_without_requests() {
    let server = MockServer::start();
    let (versions, _clone) = mock_versions(&server);

    let err = workflow(&server)
        .upload_error_page("  \n")
        .await
        .expect_err("empty page");
    assert_eq!(err.state, VersionState::None);
    versions.assert_calls(0);
}

#[tokio::test]
async fn edge_module_upload_replaces_previous_snippets() {
    let server = MockServer::start();
    let _versions = mock_versions(&server);
    server.mock(|when, then| {
        when.method("GET").path("/service/svc/version/4/snippet");
        then.status(200).json_body(json!([
            {"name": "edgemodule_countryblock_recv", "type": "recv", "priority": "50"},
            {"name": "edgepurge_recv", "type": "recv", "priority": 50},
        ]));
    });
    let delete = server.mock(|when, then| {
        when.method("DELETE")
            .path("/service/svc/version/4/snippet/edgemodule_countryblock_recv");
        then.status(200).json_body(json!({"status": "ok"}));
    });
    let keep = server.mock(|when, then| {
        when.method("DELETE")
            .path("/service/svc/version/4/snippet/edgepurge_recv");
        then.status(200).json_body(json!({"status": "ok"}));
    });
    let create = mock_create(&server, "snippet");
    mock_validate(&server, true);
    let activate = mock_activate(&server);

    let outcome = edge_modules::upload(
        &workflow(&server),
        EdgeModule::Countryblock,
        "countries = [\"RU\", \"KP\"]\n",
    )
    .await
    .expect("upload");

    assert_eq!(outcome.removed_snippets, ["edgemodule_countryblock_recv"]);
    assert_eq!(outcome.state, VersionState::Activated);
    delete.assert();
    keep.assert_calls(0);
    create.assert_calls(2);
    activate.assert();
}

#[tokio::test]
async fn edge_module_remove_only_deletes() {
    let server = MockServer::start();
    let _versions = mock_versions(&server);
    server.mock(|when, then| {
        when.method("GET").path("/service/svc/version/4/snippet");
        then.status(200).json_body(json!([
            {"name": "edgemodule_cors_headers_deliver", "type": "deliver"},
        ]));
    });
    let delete = server.mock(|when, then| {
        when.method("DELETE")
            .path("/service/svc/version/4/snippet/edgemodule_cors_headers_deliver");
        then.status(200).json_body(json!({"status": "ok"}));
    });
    let create = mock_create(&server, "snippet");
    mock_validate(&server, true);
    mock_activate(&server);

    let outcome = edge_modules::remove(&workflow(&server), EdgeModule::CorsHeaders)
        .await
        .expect("remove");

    assert_eq!(outcome.removed_snippets, ["edgemodule_cors_headers_deliver"]);
    delete.assert();
    create.assert_calls(0);
}

fn mock_io_status(server: &MockServer, provisioned: bool) -> Mock<'_> {
    server.mock(|when, then| {
        when.method("GET").path("/service/svc/dynamic_io_settings");
        if provisioned {
            then.status(200)
                .json_body(json!({"data": {"attributes": {"webp": true}}}));
        } else {
            then.status(404).json_body(json!({"msg": "Record not found"}));
        }
    })
}

#[tokio::test]
async fn image_optimizer_enable_writes_snippet_and_io_settings() {
    let server = MockServer::start();
    let status = mock_io_status(&server, true);
    let (_versions, clone) = mock_versions(&server);
    let snippet = server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/version/4/snippet")
            .body_includes(format!("name={IMAGE_OPTIMIZER_SNIPPET}&type=recv"))
            .body_includes("optimize%3Dlow")
            .body_includes("priority=10");
        then.status(200).json_body(json!({"version": 4}));
    });
    let patch = server.mock(|when, then| {
        when.method("PATCH")
            .path("/service/svc/version/4/io_settings")
            .body_includes(r#""id":"svc-4-imageopto""#)
            .body_includes(r#""type":"io_settings""#)
            .body_includes(r#""resize_filter":"lanczos3""#);
        then.status(200).json_body(json!({"data": {"id": "svc-4-imageopto"}}));
    });
    mock_validate(&server, true);
    let activate = mock_activate(&server);

    let settings = ImageOptimizerSettings {
        optimize: OptimizeLevel::Low,
        ..ImageOptimizerSettings::default()
    };
    let outcome = image_optimizer::enable(&workflow(&server), &settings)
        .await
        .expect("enable");

    assert_eq!(outcome.state, VersionState::Activated);
    status.assert();
    clone.assert();
    snippet.assert();
    patch.assert();
    activate.assert();
}

#[tokio::test]
async fn image_optimizer_is_not_enabled_on_unprovisioned_service() {
    let server = MockServer::start();
    mock_io_status(&server, false);
    let (versions, clone) = mock_versions(&server);

    let err = image_optimizer::enable(&workflow(&server), &ImageOptimizerSettings::default())
        .await
        .expect_err("not provisioned");

    assert_eq!(err.state, VersionState::None);
    assert!(err.messages[0].contains("not enabled on service svc"));
    versions.assert_calls(0);
    clone.assert_calls(0);
}

#[tokio::test]
async fn failed_io_settings_patch_stops_before_validation() {
    let server = MockServer::start();
    mock_io_status(&server, true);
    let _versions = mock_versions(&server);
    mock_create(&server, "snippet");
    server.mock(|when, then| {
        when.method("PATCH").path("/service/svc/version/4/io_settings");
        then.status(400).json_body(json!({"msg": "Bad request"}));
    });
    let validate = mock_validate(&server, true);

    let err = image_optimizer::enable(&workflow(&server), &ImageOptimizerSettings::default())
        .await
        .expect_err("patch must fail");

    assert_eq!(err.state, VersionState::Cloned);
    assert_eq!(err.version, Some(4));
    assert!(err.messages[0].starts_with("io_settings: "));
    validate.assert_calls(0);
}

#[tokio::test]
async fn image_optimizer_disable_removes_only_its_snippet() {
    let server = MockServer::start();
    let _versions = mock_versions(&server);
    server.mock(|when, then| {
        when.method("GET").path("/service/svc/version/4/snippet");
        then.status(200).json_body(json!([
            {"name": IMAGE_OPTIMIZER_SNIPPET, "type": "recv", "priority": "10"},
            {"name": "edgepurge_recv", "type": "recv", "priority": 50},
        ]));
    });
    let delete = server.mock(|when, then| {
        when.method("DELETE")
            .path(format!("/service/svc/version/4/snippet/{IMAGE_OPTIMIZER_SNIPPET}"));
        then.status(200).json_body(json!({"status": "ok"}));
    });
    let keep = server.mock(|when, then| {
        when.method("DELETE")
            .path("/service/svc/version/4/snippet/edgepurge_recv");
        then.status(200).json_body(json!({"status": "ok"}));
    });
    let patch = server.mock(|when, then| {
        when.method("PATCH").path("/service/svc/version/4/io_settings");
        then.status(200).json_body(json!({}));
    });
    mock_validate(&server, true);
    let activate = mock_activate(&server);

    let outcome = image_optimizer::disable(&workflow(&server))
        .await
        .expect("disable");

    assert_eq!(outcome.removed_snippets, [IMAGE_OPTIMIZER_SNIPPET]);
    delete.assert();
    keep.assert_calls(0);
    patch.assert_calls(0);
    activate.assert();
}

#[tokio::test]
async fn image_optimizer_status_reports_availability() {
    let server = MockServer::start();
    mock_io_status(&server, true);
    let workflow = workflow(&server);

    let status = image_optimizer::status(workflow.client())
        .await
        .expect("status");

    assert!(status.available);
    assert_eq!(status.service_id, "svc");
    assert_eq!(
        status.settings.expect("settings")["data"]["attributes"]["webp"],
        true
    );
}

//! Plain directory sources: file selection, list expansion and labelling.

use anyhow::Result;
use reposerve::core::ErrorKind;
use reposerve::models::{ApplicationSourceDirectory, ApplicationSourceType};
use reposerve::test_utils::{AppFixture, FakeClientFactory};
use tokio_util::sync::CancellationToken;

use crate::common::{TestService, commit, instance_label, manifest_names, parse_manifests, request};

#[tokio::test]
async fn test_null_list_contributes_nothing_and_crd_stays_unlabelled() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('a'), AppFixture::null_list().tree());
    let env = TestService::new(factory)?;

    let response = env.service.generate_manifest(&request("empty"), &CancellationToken::new()).await?;

    let manifests = parse_manifests(&response.manifests)?;
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0]["kind"], "CustomResourceDefinition");
    assert_eq!(instance_label(&manifests[0]), None);
    Ok(())
}

#[tokio::test]
async fn test_list_items_are_labelled_individually() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('b'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;

    let response = env.service.generate_manifest(&request("guestbook"), &CancellationToken::new()).await?;

    let manifests = parse_manifests(&response.manifests)?;
    assert!(manifests.iter().all(|m| m["kind"] != "List"));
    assert!(manifests.iter().all(|m| instance_label(m) == Some("guestbook")));
    Ok(())
}

#[tokio::test]
async fn test_partially_valid_yaml_fails_but_unparseable_yaml_is_skipped() -> Result<()> {
    let factory = FakeClientFactory::new()
        .with_revision(
            "main",
            commit('c'),
            &[
                ("partial/ok.yaml", "kind: ConfigMap\nmetadata:\n  name: ok\n---\nkind: [broken\n"),
                ("junk/cm.yaml", "kind: ConfigMap\nmetadata:\n  name: kept\n"),
                ("junk/notes.yaml", "just some text: [\n"),
            ],
        );
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    let err = env.service.generate_manifest(&request("partial"), &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert!(err.to_string().contains("ok.yaml"));

    let response = env.service.generate_manifest(&request("junk"), &cancel).await?;
    assert_eq!(manifest_names(&response.manifests)?, vec!["kept"]);
    Ok(())
}

#[tokio::test]
async fn test_malformed_json_is_a_failed_precondition() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('d'), &[("app/bad.json", "{\"kind\": ")]);
    let env = TestService::new(factory)?;

    let err = env.service.generate_manifest(&request("app"), &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert!(err.to_string().contains("bad.json"));
    Ok(())
}

#[tokio::test]
async fn test_subdirectories_only_with_recurse() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision(
        "main",
        commit('e'),
        &[
            ("app/top.json", r#"{"apiVersion":"v1","kind":"ConfigMap","metadata":{"name":"top"}}"#),
            ("app/nested/deep.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: deep\n"),
            ("app/README.md", "# not a manifest\n"),
        ],
    );
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    let flat = env.service.generate_manifest(&request("app"), &cancel).await?;
    assert_eq!(manifest_names(&flat.manifests)?, vec!["top"]);

    let mut recursive = request("app");
    recursive.application_source.directory = Some(ApplicationSourceDirectory {
        recurse: true,
        ..ApplicationSourceDirectory::default()
    });
    let deep = env.service.generate_manifest(&recursive, &cancel).await?;
    assert_eq!(manifest_names(&deep.manifests)?, vec!["deep", "top"]);
    Ok(())
}

#[tokio::test]
async fn test_explicit_directory_type_overrides_detection() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision(
        "main",
        commit('f'),
        &[
            ("chart/Chart.yaml", "name: chart\nversion: 0.1.0\n"),
            ("chart/cm.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: raw\n"),
        ],
    );
    let env = TestService::new(factory)?;

    let mut explicit = request("chart");
    explicit.application_source.source_type = Some(ApplicationSourceType::Directory);
    let response = env.service.generate_manifest(&explicit, &CancellationToken::new()).await?;

    assert_eq!(response.source_type, "Directory");
    // Chart.yaml is a YAML file too; it is not a Kubernetes object but still parses
    assert!(manifest_names(&response.manifests)?.contains(&"raw".to_string()));
    Ok(())
}

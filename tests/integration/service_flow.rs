//! Request flow through the manifest service: commit-keyed caching, the
//! `no_cache` flag, and the file access operations.

use anyhow::Result;
use reposerve::core::ErrorKind;
use reposerve::models::Repository;
use reposerve::test_utils::{AppFixture, FakeClientFactory, init_test_logging};
use tokio_util::sync::CancellationToken;

use crate::common::{REPO_URL, TestService, commit, details_query, manifest_names, request};

const GREETING_V2: &str = "apiVersion: v1
kind: ConfigMap
metadata:
  name: guestbook-config-v2
";

#[tokio::test]
async fn test_guestbook_renders_in_file_order() -> Result<()> {
    init_test_logging(None);
    let factory = FakeClientFactory::new().with_revision("main", commit('a'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;

    let response = env.service.generate_manifest(&request("guestbook"), &CancellationToken::new()).await?;

    assert_eq!(response.source_type, "Directory");
    assert_eq!(response.revision, commit('a'));
    assert_eq!(
        manifest_names(&response.manifests)?,
        vec!["guestbook-config", "guestbook-a", "guestbook-b"]
    );
    Ok(())
}

#[tokio::test]
async fn test_repeated_requests_are_identical() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('b'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    let first = env.service.generate_manifest(&request("guestbook"), &cancel).await?;
    let second = env.service.generate_manifest(&request("guestbook"), &cancel).await?;
    let mut uncached = request("guestbook");
    uncached.no_cache = true;
    let third = env.service.generate_manifest(&uncached, &cancel).await?;

    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(env.factory.checkouts(), 2);
    Ok(())
}

#[tokio::test]
async fn test_no_cache_renders_again_and_refreshes_the_cache() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('c'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    let original = env.service.generate_manifest(&request("guestbook"), &cancel).await?;
    assert_eq!(env.factory.checkouts(), 1);

    // Same commit, different content: only a forced render can observe it
    env.factory.set_revision("main", commit('c'), &[("guestbook/cm.yaml", GREETING_V2)]);

    let cached = env.service.generate_manifest(&request("guestbook"), &cancel).await?;
    assert_eq!(cached, original);
    assert_eq!(env.factory.checkouts(), 1);

    let mut forced = request("guestbook");
    forced.no_cache = true;
    let refreshed = env.service.generate_manifest(&forced, &cancel).await?;
    assert_eq!(manifest_names(&refreshed.manifests)?, vec!["guestbook-config-v2"]);
    assert_eq!(env.factory.checkouts(), 2);

    let after = env.service.generate_manifest(&request("guestbook"), &cancel).await?;
    assert_eq!(after, refreshed);
    assert_eq!(env.factory.checkouts(), 2);
    Ok(())
}

#[tokio::test]
async fn test_new_commit_is_never_served_from_the_old_entry() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('d'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    let before = env.service.generate_manifest(&request("guestbook"), &cancel).await?;
    env.factory.set_revision("main", commit('e'), &[("guestbook/cm.yaml", GREETING_V2)]);
    let after = env.service.generate_manifest(&request("guestbook"), &cancel).await?;

    assert_eq!(before.revision, commit('d'));
    assert_eq!(after.revision, commit('e'));
    assert_eq!(manifest_names(&after.manifests)?, vec!["guestbook-config-v2"]);
    assert_eq!(env.factory.checkouts(), 2);

    // Pinning the old commit still hits its entry
    let mut pinned = request("guestbook");
    pinned.revision = commit('d');
    let old = env.service.generate_manifest(&pinned, &cancel).await?;
    assert_eq!(old, before);
    assert_eq!(env.factory.checkouts(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cache_entries_are_separate_per_namespace_and_label() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('f'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    env.service.generate_manifest(&request("guestbook"), &cancel).await?;

    let mut other_namespace = request("guestbook");
    other_namespace.namespace = "staging".to_string();
    env.service.generate_manifest(&other_namespace, &cancel).await?;
    assert_eq!(env.factory.checkouts(), 2);

    let mut other_label = request("guestbook");
    other_label.app_label_value = "guestbook-staging".to_string();
    let relabelled = env.service.generate_manifest(&other_label, &cancel).await?;
    assert_eq!(env.factory.checkouts(), 3);
    assert!(relabelled.manifests[0].contains("guestbook-staging"));
    Ok(())
}

#[tokio::test]
async fn test_app_path_must_stay_inside_the_repository() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('1'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;
    let repo = Repository::new(REPO_URL);
    let cancel = CancellationToken::new();

    let err = env.service.generate_manifest(&request("../../etc"), &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = env.service.get_file(&repo, "../secrets.yaml", "main", &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = env.service.get_app_details(&details_query("guestbook/../.."), &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[tokio::test]
async fn test_file_access_is_cached_by_commit() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('2'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;
    let repo = Repository::new(REPO_URL);
    let cancel = CancellationToken::new();

    let files = env.service.list_dir(&repo, "guestbook/*.yaml", "main", &cancel).await?;
    assert_eq!(files, vec!["guestbook/cm.yaml", "guestbook/pods.yaml"]);

    let content = env.service.get_file(&repo, "guestbook/cm.yaml", "main", &cancel).await?;
    assert!(String::from_utf8(content)?.contains("guestbook-config"));
    let checkouts = env.factory.checkouts();

    env.service.list_dir(&repo, "guestbook/*.yaml", "main", &cancel).await?;
    env.service.get_file(&repo, "guestbook/cm.yaml", "main", &cancel).await?;
    assert_eq!(env.factory.checkouts(), checkouts);

    let err = env.service.get_file(&repo, "guestbook/absent.yaml", "main", &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn test_app_details_are_cached() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('3'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    let first = env.service.get_app_details(&details_query("guestbook"), &cancel).await?;
    let second = env.service.get_app_details(&details_query("guestbook"), &cancel).await?;
    assert_eq!(first, second);
    assert_eq!(first.source_type, "Directory");
    assert_eq!(env.factory.checkouts(), 1);
    Ok(())
}

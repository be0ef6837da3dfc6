//! Concurrency guarantees: one checkout at a time per working directory,
//! one render per cache miss, a bounded number of renders, and prompt
//! cancellation.

use anyhow::Result;
use futures::future::join_all;
use reposerve::core::ErrorKind;
use reposerve::test_utils::{AppFixture, FakeClientFactory};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::common::{TestService, commit, request};

#[tokio::test]
async fn test_checkouts_in_one_working_directory_never_overlap() -> Result<()> {
    let factory = FakeClientFactory::new()
        .with_revision("main", commit('a'), AppFixture::guestbook().tree())
        .with_checkout_delay(Duration::from_millis(30));
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    let mut forced = request("guestbook");
    forced.no_cache = true;
    let results = join_all((0..6).map(|_| env.service.generate_manifest(&forced, &cancel))).await;

    for result in results {
        assert_eq!(result?.manifests.len(), 3);
    }
    assert_eq!(env.factory.checkouts(), 6);
    assert!(!env.factory.overlapped());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_misses_render_once() -> Result<()> {
    let factory = FakeClientFactory::new()
        .with_revision("main", commit('b'), AppFixture::guestbook().tree())
        .with_checkout_delay(Duration::from_millis(30));
    let env = TestService::new(factory)?;
    let cancel = CancellationToken::new();

    let req = request("guestbook");
    let results = join_all((0..8).map(|_| env.service.generate_manifest(&req, &cancel))).await;

    let responses = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    assert!(responses.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(env.factory.checkouts(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_while_waiting_for_the_working_directory() -> Result<()> {
    let factory = FakeClientFactory::new()
        .with_revision("main", commit('c'), AppFixture::guestbook().tree())
        .with_checkout_delay(Duration::from_millis(300));
    let env = TestService::new(factory)?;

    let mut forced = request("guestbook");
    forced.no_cache = true;
    let waiting = CancellationToken::new();
    let trigger = waiting.clone();
    let never = CancellationToken::new();

    let (holder, waiter, ()) = tokio::join!(
        env.service.generate_manifest(&forced, &never),
        env.service.generate_manifest(&forced, &waiting),
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        }
    );

    assert_eq!(holder?.manifests.len(), 3);
    assert_eq!(waiter.unwrap_err().kind(), ErrorKind::Cancelled);
    Ok(())
}

#[cfg(unix)]
mod with_tools {
    use super::*;
    use crate::common::shell_plugin;
    use reposerve::models::{ApplicationSourcePlugin, Repository};
    use std::time::Instant;
    use tempfile::TempDir;

    const PLUGIN_TREE: &[(&str, &str)] = &[("app/.keep", "")];

    #[tokio::test]
    async fn test_parallelism_limit_serializes_renders_across_repositories() -> Result<()> {
        let scratch = TempDir::new()?;
        let running = scratch.path().join("running");
        let overlap = scratch.path().join("overlap");
        let script = format!(
            "if ! mkdir {running} 2>/dev/null; then touch {overlap}; fi\nsleep 0.2\nrmdir {running}\nprintf 'kind: ConfigMap\\nmetadata:\\n  name: out\\n'",
            running = running.display(),
            overlap = overlap.display()
        );
        let factory = FakeClientFactory::new().with_revision("main", commit('d'), PLUGIN_TREE);
        let env = TestService::new(factory)?
            .configure(|s| s.with_parallelism_limit(1).with_plugins(vec![shell_plugin("slow", &script)]));
        let cancel = CancellationToken::new();

        let requests: Vec<_> = (0..3)
            .map(|i| {
                let mut req = request("app");
                req.repo = Repository::new(format!("https://github.com/example/apps-{i}"));
                req.application_source.plugin = Some(ApplicationSourcePlugin {
                    name: "slow".to_string(),
                });
                req
            })
            .collect();
        let results = join_all(requests.iter().map(|req| env.service.generate_manifest(req, &cancel))).await;

        for result in results {
            assert_eq!(result?.manifests.len(), 1);
        }
        assert!(!overlap.exists(), "two renders ran at once");
        assert_eq!(env.service.limiter().available(), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_kills_a_running_tool() -> Result<()> {
        let factory = FakeClientFactory::new().with_revision("main", commit('e'), PLUGIN_TREE);
        let env = TestService::new(factory)?
            .configure(|s| s.with_plugins(vec![shell_plugin("hang", "sleep 10")]));

        let mut req = request("app");
        req.application_source.plugin = Some(ApplicationSourcePlugin {
            name: "hang".to_string(),
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = env.service.generate_manifest(&req, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        Ok(())
    }
}

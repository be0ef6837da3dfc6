//! Source types rendered through the service: detection precedence,
//! plugins, ksonnet, Helm and Kustomize.

use anyhow::Result;
use reposerve::core::ErrorKind;
use reposerve::models::{ApplicationSourceKsonnet, ApplicationSourcePlugin};
use reposerve::test_utils::{AppFixture, FakeClientFactory};
use tokio_util::sync::CancellationToken;

use crate::common::{TestService, commit, request};

#[tokio::test]
async fn test_ksonnet_marker_wins_over_chart() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('a'), AppFixture::ambiguous().tree());
    let env = TestService::new(factory)?;

    // Detected as ksonnet, which cannot render without an environment
    let err = env.service.generate_manifest(&request("mixed"), &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("Ksonnet environment not set"));
    Ok(())
}

#[tokio::test]
async fn test_undeclared_ksonnet_environment_is_invalid() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('b'), AppFixture::ambiguous().tree());
    let env = TestService::new(factory)?;

    let mut req = request("mixed");
    req.application_source.ksonnet = Some(ApplicationSourceKsonnet {
        environment: "prod".to_string(),
        parameters: Vec::new(),
    });
    let err = env.service.generate_manifest(&req, &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("'prod'"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_plugin_is_not_registered() -> Result<()> {
    let factory = FakeClientFactory::new().with_revision("main", commit('c'), AppFixture::guestbook().tree());
    let env = TestService::new(factory)?;

    let mut req = request("guestbook");
    req.application_source.plugin = Some(ApplicationSourcePlugin {
        name: "missing".to_string(),
    });
    let err = env.service.generate_manifest(&req, &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotRegistered);
    assert!(err.to_string().contains("'missing'"));
    Ok(())
}

#[cfg(unix)]
mod with_tools {
    use super::*;
    use crate::common::{details_query, manifest_names, shell_plugin};
    use reposerve::config::ToolPaths;
    use reposerve::models::Repository;
    use reposerve::test_utils::write_tool_script;
    use tempfile::TempDir;

    const KSONNET_APP: &str = "apiVersion: 0.3.0
kind: ksonnet.io/app
name: guestbook
environments:
  prod:
    destination:
      namespace: guestbook-prod
      server: https://kubernetes.default.svc
    k8sVersion: v1.10.0
    path: prod
";

    fn plugin_request(name: &str) -> reposerve::models::ManifestRequest {
        let mut req = request("app");
        req.application_source.plugin = Some(ApplicationSourcePlugin {
            name: name.to_string(),
        });
        req
    }

    #[tokio::test]
    async fn test_plugin_output_with_application_environment() -> Result<()> {
        let factory = FakeClientFactory::new().with_revision("main", commit('d'), &[("app/.keep", "")]);
        let env = TestService::new(factory)?;

        let mut req = plugin_request("demo");
        req.plugins = vec![shell_plugin(
            "demo",
            r#"printf 'kind: ConfigMap\nmetadata:\n  name: %s\n---\nkind: ConfigMap\nmetadata:\n  name: %s-ns\n' "$ARGOCD_APP_NAME" "$ARGOCD_APP_NAMESPACE""#,
        )];
        let response = env.service.generate_manifest(&req, &CancellationToken::new()).await?;

        assert_eq!(response.source_type, "Plugin");
        assert_eq!(manifest_names(&response.manifests)?, vec!["guestbook", "default-ns"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_request_plugins_shadow_configured_ones() -> Result<()> {
        let factory = FakeClientFactory::new().with_revision("main", commit('e'), &[("app/.keep", "")]);
        let env = TestService::new(factory)?.configure(|s| {
            s.with_plugins(vec![shell_plugin(
                "demo",
                "printf 'kind: ConfigMap\\nmetadata:\\n  name: from-config\\n'",
            )])
        });
        let cancel = CancellationToken::new();

        let configured = env.service.generate_manifest(&plugin_request("demo"), &cancel).await?;
        assert_eq!(manifest_names(&configured.manifests)?, vec!["from-config"]);

        let mut req = plugin_request("demo");
        req.namespace = "other".to_string();
        req.plugins = vec![shell_plugin(
            "demo",
            "printf 'kind: ConfigMap\\nmetadata:\\n  name: from-request\\n'",
        )];
        let overridden = env.service.generate_manifest(&req, &cancel).await?;
        assert_eq!(manifest_names(&overridden.manifests)?, vec!["from-request"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_ksonnet_destination_is_reported() -> Result<()> {
        let bin = TempDir::new()?;
        let ks = write_tool_script(
            bin.path(),
            "ks",
            "if [ \"$1\" = show ]; then printf 'kind: Service\\nmetadata:\\n  name: ui\\n'; fi\n",
        )?;
        let factory = FakeClientFactory::new().with_revision("main", commit('f'), &[("ks/app.yaml", KSONNET_APP)]);
        let env = TestService::new(factory)?.configure(|s| {
            s.with_tools(ToolPaths {
                ks: ks.display().to_string(),
                ..ToolPaths::default()
            })
        });

        let mut req = request("ks");
        req.application_source.ksonnet = Some(ApplicationSourceKsonnet {
            environment: "prod".to_string(),
            parameters: Vec::new(),
        });
        let response = env.service.generate_manifest(&req, &CancellationToken::new()).await?;

        assert_eq!(response.source_type, "Ksonnet");
        assert_eq!(response.namespace, "guestbook-prod");
        assert_eq!(response.server, "https://kubernetes.default.svc");
        assert_eq!(manifest_names(&response.manifests)?, vec!["ui"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_ksonnet_app_details() -> Result<()> {
        let bin = TempDir::new()?;
        let ks = write_tool_script(
            bin.path(),
            "ks",
            "printf '{\"data\":[{\"component\":\"ui\",\"param\":\"replicas\",\"value\":\"2\"}]}'\n",
        )?;
        let factory = FakeClientFactory::new().with_revision("main", commit('1'), AppFixture::ambiguous().tree());
        let env = TestService::new(factory)?.configure(|s| {
            s.with_tools(ToolPaths {
                ks: ks.display().to_string(),
                ..ToolPaths::default()
            })
        });

        let details = env.service.get_app_details(&details_query("mixed"), &CancellationToken::new()).await?;

        assert_eq!(details.source_type, "Ksonnet");
        assert!(details.helm.is_none());
        let ksonnet = details.ksonnet.unwrap_or_default();
        assert_eq!(ksonnet.name, "mixed");
        assert_eq!(ksonnet.parameters.len(), 1);
        assert_eq!(ksonnet.parameters[0].value, "2");
        Ok(())
    }

    #[tokio::test]
    async fn test_helm_builds_dependencies_once() -> Result<()> {
        let scratch = TempDir::new()?;
        let log = scratch.path().join("calls.log");
        let built = scratch.path().join("deps-built");
        let helm = write_tool_script(
            scratch.path(),
            "helm",
            &format!(
                "echo \"$1 $2\" >> {log}\ncase \"$1\" in\n  dependency) touch {built} ;;\n  template)\n    if [ ! -f {built} ]; then echo 'Error: found in Chart.yaml, but missing in charts/ directory: redis' >&2; exit 1; fi\n    printf 'kind: Service\\nmetadata:\\n  name: %s\\n' \"$2\" ;;\nesac\n",
                log = log.display(),
                built = built.display()
            ),
        )?;
        let factory = FakeClientFactory::new().with_revision(
            "main",
            commit('2'),
            &[("chart/Chart.yaml", "name: chart\nversion: 0.1.0\n")],
        );
        let env = TestService::new(factory)?.configure(|s| {
            s.with_tools(ToolPaths {
                helm: helm.display().to_string(),
                ..ToolPaths::default()
            })
        });

        let mut req = request("chart");
        req.repos = vec![Repository {
            name: "bitnami".to_string(),
            ..Repository::new("https://charts.example.com/bitnami")
        }];
        let response = env.service.generate_manifest(&req, &CancellationToken::new()).await?;

        assert_eq!(response.source_type, "Helm");
        assert_eq!(manifest_names(&response.manifests)?, vec!["guestbook"]);
        let calls = std::fs::read_to_string(&log)?;
        assert_eq!(
            calls.lines().collect::<Vec<_>>(),
            vec!["template guestbook", "repo add", "dependency build", "template guestbook"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_helm_failure_after_retry_is_returned() -> Result<()> {
        let scratch = TempDir::new()?;
        let log = scratch.path().join("calls.log");
        let helm = write_tool_script(
            scratch.path(),
            "helm",
            &format!(
                "echo \"$1\" >> {log}\nif [ \"$1\" = template ]; then echo 'Error: found in requirements.yaml, but missing in charts/ directory: db' >&2; exit 1; fi\n",
                log = log.display()
            ),
        )?;
        let factory = FakeClientFactory::new().with_revision(
            "main",
            commit('3'),
            &[("chart/Chart.yaml", "name: chart\nversion: 0.1.0\n")],
        );
        let env = TestService::new(factory)?.configure(|s| {
            s.with_tools(ToolPaths {
                helm: helm.display().to_string(),
                ..ToolPaths::default()
            })
        });

        let err = env.service.generate_manifest(&request("chart"), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        let calls = std::fs::read_to_string(&log)?;
        assert_eq!(calls.lines().filter(|l| *l == "template").count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_kustomize_app_details_list_images() -> Result<()> {
        let bin = TempDir::new()?;
        let kustomize = write_tool_script(
            bin.path(),
            "kustomize",
            "printf 'apiVersion: v1\\nkind: Pod\\nmetadata:\\n  name: web\\nspec:\\n  containers:\\n  - name: web\\n    image: nginx:1.15\\n  - name: cache\\n    image: registry.local:5000/redis@sha256:abc\\n'\n",
        )?;
        let factory = FakeClientFactory::new().with_revision(
            "main",
            commit('4'),
            &[("overlay/kustomization.yaml", "resources:\n- pod.yaml\n")],
        );
        let env = TestService::new(factory)?.configure(|s| {
            s.with_tools(ToolPaths {
                kustomize: kustomize.display().to_string(),
                ..ToolPaths::default()
            })
        });

        let details = env.service.get_app_details(&details_query("overlay"), &CancellationToken::new()).await?;

        assert_eq!(details.source_type, "Kustomize");
        let spec = details.kustomize.unwrap_or_default();
        assert_eq!(spec.path, "overlay");
        assert_eq!(spec.image_tags.get("nginx").map(String::as_str), Some("1.15"));
        assert_eq!(
            spec.image_tags.get("registry.local:5000/redis").map(String::as_str),
            Some("sha256:abc")
        );
        Ok(())
    }
}

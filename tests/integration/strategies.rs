//! Strategy detection, fetch and cleanup without real `chef` / `berks`.

use cbscan_cli::config::AnalyzerConfig;
use cbscan_cli::core::CbscanError;
use cbscan_cli::strategy::{DependencyStrategy, StrategyKind, classify};
use cbscan_cli::test_utils::{CookbookFixture, FakeRunner, init_test_logging};

const LOCK: &str = r#"{
    "cookbook_locks": {
        "web":   { "version": "1.0.0", "identifier": "aaa", "source": "cookbooks/web" },
        "cache": { "version": "2.0.0", "identifier": "bbb", "origin": "https://example.test" },
        "redis": { "version": "3.0.0", "identifier": "ccc", "origin": "https://example.test" }
    },
    "solution_dependencies": {
        "dependencies": {
            "web (1.0.0)": [["cache", ">= 0.0.0"]],
            "cache (2.0.0)": [["redis", ">= 0.0.0"]],
            "redis (3.0.0)": [["cache", ">= 0.0.0"]]
        }
    }
}"#;

#[tokio::test]
async fn test_policyfile_lifecycle() {
    init_test_logging(None);
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("web").unwrap();
    fixture.write("Policyfile.rb", "run_list 'web::default'\n").unwrap();
    fixture.write("Policyfile.lock.json", LOCK).unwrap();
    let dir = fixture.cookbook_dir("web");

    assert!(matches!(classify(&dir, 5), Some(StrategyKind::Policyfile(_))));
    let runner = FakeRunner::new()
        .with_tool("chef")
        .materialize(["cookbook_artifacts/cache-bbb", "cookbook_artifacts/redis-ccc"]);
    let mut strategy = DependencyStrategy::detect(&dir, runner, &AnalyzerConfig::default()).unwrap();
    assert_eq!(strategy.kind_name(), "policyfile");
    assert_eq!(strategy.detect_name(), "web");
    assert!(strategy.has_dependencies());

    let deps = strategy.fetch().await.unwrap();
    let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["cache", "redis"]);

    let resolved = strategy.dependency_paths(&deps);
    assert_eq!(resolved.resolved.len(), 2);
    assert!(resolved.resolved[0].path.ends_with("policy-export/cookbook_artifacts/cache-bbb"));
    assert!(resolved.missing.is_empty());

    strategy.cleanup().unwrap();
    assert!(!fixture.path().join("policy-export").exists());
    strategy.cleanup().unwrap();
}

#[tokio::test]
async fn test_tool_failure_is_distinguishable() {
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("web").unwrap();
    fixture.write("Policyfile.lock.json", LOCK).unwrap();
    let runner = FakeRunner::new().with_tool("chef").fail_on("export");
    let mut strategy = DependencyStrategy::detect(
        &fixture.cookbook_dir("web"),
        runner,
        &AnalyzerConfig::default(),
    )
    .unwrap();

    let err = strategy.fetch().await.unwrap_err();
    assert!(cbscan_cli::core::is_tool_failure(&err));
    strategy.cleanup().unwrap();
}

#[test]
fn test_malformed_lock_is_fatal() {
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("web").unwrap();
    fixture.write("Policyfile.lock.json", "{\"cookbook_locks\": {}}").unwrap();
    let err = DependencyStrategy::detect(
        &fixture.cookbook_dir("web"),
        FakeRunner::new(),
        &AnalyzerConfig::default(),
    )
    .unwrap_err();
    assert!(err.chain().any(|cause| matches!(
        cause.downcast_ref::<CbscanError>(),
        Some(CbscanError::MalformedLockFile { .. })
    )));
}

#[tokio::test]
async fn test_berkshelf_vendors_dependencies() {
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("web").unwrap();
    fixture.write("cookbooks/web/Berksfile", "source 'https://supermarket.chef.io'\nmetadata\n").unwrap();
    let list = r#"{"cookbooks":[
        {"name":"web","version":"1.0.0","location":"source at ."},
        {"name":"apt","version":"7.4.0"}
    ]}"#;
    let runner = FakeRunner::new().with_tool("berks").respond("list", list).materialize(["apt"]);
    let dir = fixture.cookbook_dir("web");

    let mut strategy = DependencyStrategy::detect(&dir, runner, &AnalyzerConfig::default()).unwrap();
    assert_eq!(strategy.kind_name(), "berkshelf");
    let deps = strategy.fetch().await.unwrap();
    let resolved = strategy.dependency_paths(&deps);
    assert_eq!(resolved.resolved[0].path, dir.join("berks-cookbooks/apt"));

    strategy.cleanup().unwrap();
    assert!(!dir.join("berks-cookbooks").exists());
}

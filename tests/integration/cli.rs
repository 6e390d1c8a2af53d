//! The `cbscan` binary.

use assert_cmd::Command;
use cbscan_cli::test_utils::CookbookFixture;
use predicates::prelude::*;

fn cbscan() -> Command {
    let mut cmd = Command::cargo_bin("cbscan").unwrap();
    cmd.env_remove("RUST_LOG").env("NO_COLOR", "1").arg("--no-progress");
    cmd
}

fn two_cookbooks() -> CookbookFixture {
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("web").unwrap();
    fixture.cookbook("cache").unwrap();
    fixture.recipe("web", "default", "include_recipe 'cache::default'\n").unwrap();
    fixture.recipe("cache", "default", "package 'redis'\n").unwrap();
    fixture
}

#[test]
fn test_tree_command_prints_ascii_tree() {
    let fixture = two_cookbooks();
    cbscan()
        .arg("tree")
        .arg(fixture.cookbook_dir("web"))
        .assert()
        .success()
        .stdout("web::default\n└── cache::default\n    └── package[redis]\n");
}

#[test]
fn test_tree_command_json_and_depth() {
    let fixture = two_cookbooks();
    cbscan()
        .args(["tree", "--format", "json"])
        .arg(fixture.cookbook_dir("web"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"recipe\""))
        .stdout(predicate::str::contains("package[redis]"));

    cbscan()
        .args(["tree", "--depth", "1"])
        .arg(fixture.cookbook_dir("web"))
        .assert()
        .success()
        .stdout(predicate::str::contains("cache::default [1 more]"));
}

#[test]
fn test_tree_command_unknown_recipe_fails() {
    let fixture = two_cookbooks();
    cbscan()
        .args(["tree", "--recipe", "web::nope"])
        .arg(fixture.cookbook_dir("web"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("web::nope"));
}

#[test]
fn test_analyze_command_text() {
    let fixture = two_cookbooks();
    fixture
        .attributes("web", "default['web']['vhosts'] = { 'a' => {}, 'b' => {} }\n")
        .unwrap();
    cbscan()
        .arg("analyze")
        .arg(fixture.cookbook_dir("web"))
        .assert()
        .success()
        .stdout(predicate::str::contains("2 recipe(s)"))
        .stdout(predicate::str::contains("web.vhosts [a, b]"));
}

#[test]
fn test_deps_without_strategy_reports_markers() {
    let fixture = two_cookbooks();
    cbscan()
        .arg("deps")
        .arg(fixture.cookbook_dir("web"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Policyfile.lock.json"))
        .stderr(predicate::str::contains("Berksfile"));
}

#[test]
fn test_deps_from_metadata() {
    let fixture = two_cookbooks();
    fixture.write("cookbooks/web/Berksfile", "metadata\n").unwrap();
    fixture
        .write("cookbooks/web/metadata.rb", "name 'web'\nversion '1.0.0'\ndepends 'cache', '~> 1.0'\n")
        .unwrap();
    cbscan()
        .args(["deps", "--format", "json"])
        .arg(fixture.cookbook_dir("web"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"strategy\": \"berkshelf\""))
        .stdout(predicate::str::contains("\"name\": \"cache\""));
}

#[test]
fn test_invalid_format_is_rejected() {
    let fixture = two_cookbooks();
    cbscan()
        .args(["analyze", "--format", "xml"])
        .arg(fixture.cookbook_dir("web"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid format"));
}

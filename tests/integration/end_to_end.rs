//! Library-level scenarios over on-disk cookbook trees.

use cbscan_cli::analysis::{StructuralAnalysis, collect_cookbooks};
use cbscan_cli::parser::ParseOptions;
use cbscan_cli::resolver::{RecipeName, resolve_provider_path, resolve_recipe_path};
use cbscan_cli::test_utils::{CookbookFixture, init_test_logging};
use cbscan_cli::tree::{NodeKind, TreeBuilder, depth_profile, render_tree};
use std::path::PathBuf;

fn analyze(fixture: &CookbookFixture) -> (StructuralAnalysis, Vec<PathBuf>) {
    let dirs = vec![fixture.cookbooks_dir()];
    let analysis = StructuralAnalysis::build(collect_cookbooks(&dirs, &ParseOptions::default()));
    (analysis, dirs)
}

#[test]
fn test_two_cookbook_include_chain() {
    init_test_logging(None);
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("web").unwrap();
    fixture.cookbook("cache").unwrap();
    fixture.recipe("web", "default", "include_recipe 'cache::default'\n").unwrap();
    fixture.recipe("cache", "default", "package 'redis'\n").unwrap();

    let (analysis, dirs) = analyze(&fixture);
    let tree = TreeBuilder::new(&analysis, dirs)
        .build_for_recipe(&"web::default".parse().unwrap())
        .unwrap();

    assert_eq!(tree.name, "web::default");
    assert_eq!(tree.children.len(), 1);
    let cache = &tree.children[0];
    assert_eq!(cache.name, "cache::default");
    assert_eq!(cache.children.len(), 1);
    assert_eq!(cache.children[0].name, "package[redis]");
    assert_eq!(render_tree(&tree), "web::default\n└── cache::default\n    └── package[redis]\n");
}

#[test]
fn test_loop_expansion_through_attribute_files() {
    init_test_logging(None);
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("nginx").unwrap();
    fixture
        .attributes(
            "nginx",
            "default['nginx']['port'] = 80\ndefault['nginx']['sites']['a'] = { 'port' => 8080 }\ndefault['nginx']['sites']['b'] = { 'port' => 8081 }\n",
        )
        .unwrap();
    fixture
        .recipe(
            "nginx",
            "default",
            "package 'nginx'\n\nnode['nginx']['sites'].each do |name, site|\n  template \"/etc/nginx/sites-available/#{name}\" do\n    source 'site.erb'\n    variables(port: site['port'])\n    notifies :reload, 'service[nginx]'\n  end\nend\n\nservice 'nginx' do\n  action [:enable, :start]\nend\n",
        )
        .unwrap();

    let (analysis, dirs) = analyze(&fixture);
    let sites = analysis.collection("nginx.sites").unwrap();
    assert_eq!(sites.items, vec!["a", "b"]);
    assert!(analysis.collection("nginx").is_none());

    let tree = TreeBuilder::new(&analysis, dirs)
        .build_for_recipe(&"nginx".parse().unwrap())
        .unwrap();
    let names: Vec<_> = tree.children.iter().map(|c| c.kind).collect();
    assert_eq!(names, vec![NodeKind::Resource, NodeKind::Loop, NodeKind::Resource]);

    let looped = &tree.children[1];
    assert_eq!(looped.children.len(), 2);
    for (item, key) in looped.children.iter().zip(["a", "b"]) {
        assert_eq!(item.kind, NodeKind::LoopItem);
        assert_eq!(item.name, key);
        let template = item.children[0].resource.as_ref().unwrap();
        assert_eq!(template.resource_type, "template");
        assert!(template.dynamic_name);
        assert_eq!(template.attributes["notifies"], ":reload, 'service[nginx]'");
    }
    assert_eq!(looped.children[1].values.as_ref().unwrap()["port"], 8081);

    let text = render_tree(&tree);
    assert_eq!(depth_profile(&text), tree.depths());
}

#[test]
fn test_include_cycle_terminates() {
    init_test_logging(None);
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("a").unwrap();
    fixture.cookbook("b").unwrap();
    fixture.cookbook("c").unwrap();
    fixture.recipe("a", "default", "include_recipe 'b'\n").unwrap();
    fixture.recipe("b", "default", "include_recipe 'c'\n").unwrap();
    fixture.recipe("c", "default", "include_recipe 'a'\nfile '/tmp/c'\n").unwrap();

    let (analysis, dirs) = analyze(&fixture);
    let tree = TreeBuilder::new(&analysis, dirs)
        .build_for_recipe(&"a".parse().unwrap())
        .unwrap();

    let circular = tree.find_all(NodeKind::Circular);
    assert_eq!(circular.len(), 1);
    assert_eq!(circular[0].name, "a::default");
    assert!(tree.find("file[/tmp/c]").is_some());
}

#[test]
fn test_guarded_include_and_unresolved_dependency() {
    init_test_logging(None);
    let fixture = CookbookFixture::new().unwrap();
    fixture.cookbook("app").unwrap();
    fixture
        .recipe(
            "app",
            "default",
            "include_recipe 'app::install' if node['app']['install']\ninclude_recipe 'monitoring::agent'\n",
        )
        .unwrap();
    fixture.recipe("app", "install", "package 'app'\n").unwrap();

    let (analysis, dirs) = analyze(&fixture);
    let tree = TreeBuilder::new(&analysis, dirs)
        .build_for_recipe(&"app".parse().unwrap())
        .unwrap();

    assert_eq!(tree.children[0].kind, NodeKind::Conditional);
    assert_eq!(tree.children[0].children[0].name, "app::install");
    let missing = &tree.children[1];
    assert_eq!(missing.kind, NodeKind::Unresolved);
    assert!(render_tree(&tree).contains("monitoring::agent (recipe not analyzed"));
}

#[test]
fn test_resolver_against_versioned_directories() {
    let fixture = CookbookFixture::new().unwrap();
    fixture.write("vendor/app-1.2.3/recipes/install.rb", "package 'app'\n").unwrap();
    fixture.write("vendor/nginx/providers/site.rb", "action :create do\nend\n").unwrap();
    let dirs = vec![fixture.cookbooks_dir(), fixture.path().join("vendor")];

    let name: RecipeName = "app::install".parse().unwrap();
    let found = resolve_recipe_path(&name, &dirs).unwrap();
    assert!(found.ends_with("app-1.2.3/recipes/install.rb"));
    assert!(resolve_recipe_path(&"app::missing".parse().unwrap(), &dirs).is_none());

    let provider = resolve_provider_path(&"nginx_site".parse().unwrap(), &dirs).unwrap();
    assert!(provider.ends_with("nginx/providers/site.rb"));
}

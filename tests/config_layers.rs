//! Layered configuration feeding a packaging run.

mod common;

use std::fs;

use common::Workspace;
use model_packager::config::ConfigOrigin;
use model_packager::{Interrupt, PackagerConfig, PackagingPath, PackagingRequest, Pipeline, SharedBuffer};
use serde_json::json;

#[test]
fn test_project_overrides_reach_the_package() {
    let ws = Workspace::new();
    let user = ws.path().join("user.toml");
    fs::write(&user, "tool = \"podman\"\noutput_dir = \"ignored\"\n").unwrap();
    let project = ws.path().join("mpack.toml");
    fs::write(
        &project,
        "output_dir = \"dist\"\n\n[frameworks.pytorch]\nrequirements = [\"torch==2.3.0\", \"Pillow\"]\n",
    )
    .unwrap();
    let overrides = json!({
        "work_dir": ws.path(),
        "tool": "/nonexistent/mpack-docker",
    });

    let (config, effective) =
        PackagerConfig::load(Some(&user), Some(&project), Some(overrides)).unwrap();

    assert_eq!(config.tool, "/nonexistent/mpack-docker");
    assert_eq!(config.output_path(), ws.path().join("dist"));
    let origins: Vec<ConfigOrigin> = effective.sources.iter().map(|s| s.origin).collect();
    assert_eq!(
        origins,
        vec![
            ConfigOrigin::Builtin,
            ConfigOrigin::User,
            ConfigOrigin::Project,
            ConfigOrigin::Cli
        ]
    );

    let model = ws.model("resnet18.pth");
    let request = PackagingRequest::builder(&model, "my_model:1.0")
        .disable_build_tool(true)
        .build()
        .unwrap();
    let buffer = SharedBuffer::new();
    let mut pipeline = Pipeline::new(config, Interrupt::new(), buffer.output())
        .with_config_sources(effective.sources);
    let summary = pipeline.run(&request).unwrap();

    assert_eq!(summary.path, PackagingPath::Fallback);
    assert_eq!(summary.config_sources.len(), 4);
    assert!(ws.path().join("dist/my_model_1.0_package.zip").is_file());
    assert_eq!(
        fs::read_to_string(ws.path().join("dist/my_model_1.0_package/requirements.txt")).unwrap(),
        "torch==2.3.0\nPillow\n"
    );
    assert_eq!(
        fs::read_to_string(ws.path().join("build_context/requirements.txt")).unwrap(),
        "torch==2.3.0\nPillow\n"
    );
}

#[test]
fn test_out_of_range_timeout_rejected() {
    let overrides = json!({ "timeouts": { "build_secs": 0 } });
    assert!(PackagerConfig::load(None, None, Some(overrides)).is_err());
}

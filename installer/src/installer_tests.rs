//! Unit tests for plugin placement and package installation.

use super::*;
use crate::host::{InProcessHost, InstallerCommands, MockHostOperations};
use crate::layout::PluginKind;
use crate::test_utils::{
    ExpectedCall, StubExecutor, failure_output, stdout_output, utf8_temp_dir,
};
use mockall::{Sequence, predicate::eq};
use rstest::{fixture, rstest};
use std::fs;

struct Sandbox {
    _temp: tempfile::TempDir,
    staging: Utf8PathBuf,
    dirs: DirectoryLayout,
}

#[fixture]
fn sandbox() -> Sandbox {
    let (temp, root) = utf8_temp_dir().expect("temp dir");
    let staging = root.join("data/plugins/install-test");
    fs::create_dir_all(&staging).expect("staging dir");
    let dirs = DirectoryLayout::new(&root, None, None);
    Sandbox {
        _temp: temp,
        staging,
        dirs,
    }
}

fn script_layout(requirements: Option<&str>) -> PluginLayout {
    PluginLayout {
        kind: PluginKind::Script,
        has_versioned_library: false,
        has_link_library: false,
        top_level_name: "dht11".to_owned(),
        other_roots: Vec::new(),
        requirements_file: requirements.map(str::to_owned),
    }
}

fn stage_plugin(staging: &Utf8Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let target = staging.join(path);
        fs::create_dir_all(target.parent().expect("parent")).expect("create dirs");
        fs::write(target, contents).expect("write staged file");
    }
}

fn host(calls: Vec<ExpectedCall>) -> InProcessHost<StubExecutor> {
    InProcessHost::new(StubExecutor::new(calls), InstallerCommands::default())
}

#[rstest]
fn script_plugin_lands_in_script_tree(sandbox: Sandbox) {
    stage_plugin(&sandbox.staging, &[("dht11/dht11.py", "plugin")]);
    let host = host(vec![]);

    let report = install_archive(
        &script_layout(None),
        &sandbox.staging,
        PluginType::South,
        &sandbox.dirs,
        &host,
    )
    .expect("install");

    assert_eq!(report, CommandReport::default());
    let installed = sandbox
        .dirs
        .plugin_dir(PluginKind::Script, PluginType::South, "dht11");
    assert!(installed.join("dht11.py").is_file());
}

#[rstest]
fn compiled_plugin_lands_in_compiled_tree(sandbox: Sandbox) {
    stage_plugin(
        &sandbox.staging,
        &[("sinusoid/libsinusoid.so", "lib")],
    );
    let layout = PluginLayout {
        kind: PluginKind::Compiled,
        has_link_library: true,
        top_level_name: "sinusoid".to_owned(),
        ..script_layout(None)
    };

    install_archive(
        &layout,
        &sandbox.staging,
        PluginType::North,
        &sandbox.dirs,
        &host(vec![]),
    )
    .expect("install");

    let installed = sandbox
        .dirs
        .plugin_dir(PluginKind::Compiled, PluginType::North, "sinusoid");
    assert!(installed.join("libsinusoid.so").is_file());
}

#[rstest]
fn reinstall_leaves_no_stale_files(sandbox: Sandbox) {
    let installed = sandbox
        .dirs
        .plugin_dir(PluginKind::Script, PluginType::South, "dht11");
    fs::create_dir_all(&installed).expect("existing install");
    fs::write(installed.join("obsolete.py"), "old").expect("stale file");
    stage_plugin(&sandbox.staging, &[("dht11/dht11.py", "new")]);

    install_archive(
        &script_layout(None),
        &sandbox.staging,
        PluginType::South,
        &sandbox.dirs,
        &host(vec![]),
    )
    .expect("install");

    assert!(!installed.join("obsolete.py").exists());
    assert_eq!(
        fs::read_to_string(installed.join("dht11.py")).expect("read"),
        "new"
    );
}

#[rstest]
#[case::success(stdout_output(0, "Successfully installed Adafruit-DHT\n"), 0, "Successfully installed Adafruit-DHT")]
#[case::failure(failure_output(1, "ERROR: Could not find a version\n"), 1, "ERROR: Could not find a version")]
fn requirements_manifest_drives_the_report(
    sandbox: Sandbox,
    #[case] output: std::process::Output,
    #[case] exit_code: i32,
    #[case] message: &str,
) {
    stage_plugin(
        &sandbox.staging,
        &[
            ("dht11/dht11.py", "plugin"),
            ("dht11/requirements.txt", "Adafruit_DHT"),
        ],
    );
    let manifest = sandbox.staging.join("dht11/requirements.txt");
    let host = host(vec![ExpectedCall::new(
        "pip3",
        &["install", "-r", manifest.as_str()],
        Ok(output),
    )]);

    let report = install_archive(
        &script_layout(Some("dht11/requirements.txt")),
        &sandbox.staging,
        PluginType::South,
        &sandbox.dirs,
        &host,
    )
    .expect("install");

    assert_eq!(report.exit_code, exit_code);
    assert_eq!(report.message, message);
    assert!(
        sandbox
            .dirs
            .plugin_dir(PluginKind::Script, PluginType::South, "dht11")
            .join("dht11.py")
            .is_file()
    );
}

#[rstest]
fn missing_destination_creates_parent_before_copy(sandbox: Sandbox) {
    let destination = sandbox
        .dirs
        .plugin_dir(PluginKind::Script, PluginType::Filter, "dht11");
    let parent = destination.parent().expect("parent").to_owned();
    let source = sandbox.staging.join("dht11");

    let mut mock = MockHostOperations::new();
    let mut seq = Sequence::new();
    mock.expect_remove().never();
    mock.expect_create_dir()
        .with(eq(parent))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    mock.expect_copy()
        .with(eq(source), eq(destination))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));

    install_archive(
        &script_layout(None),
        &sandbox.staging,
        PluginType::Filter,
        &sandbox.dirs,
        &mock,
    )
    .expect("install");
}

#[rstest]
fn package_install_reports_and_removes_capture(sandbox: Sandbox) {
    let package = sandbox.staging.join("foglamp-south-sinusoid.deb");
    fs::write(&package, "deb").expect("staged package");
    let artifact = StagedArtifact::new(package.clone(), 3);
    let host = host(vec![ExpectedCall::new(
        "sudo",
        &["apt", "-y", "install", package.as_str()],
        Ok(failure_output(100, "E: Sub-process /usr/bin/dpkg returned an error code (1)\n")),
    )]);

    let report = install_package(&artifact, &sandbox.staging, &host).expect("run");

    assert_eq!(report.exit_code, 100);
    assert_eq!(
        report.message,
        "E: Sub-process /usr/bin/dpkg returned an error code (1)"
    );
    assert!(!capture_path(&sandbox.staging).exists());
}

#[rstest]
fn package_install_removes_capture_when_launch_fails(sandbox: Sandbox) {
    let package = sandbox.staging.join("pkg.deb");
    let artifact = StagedArtifact::new(package, 0);
    fs::write(capture_path(&sandbox.staging), "stale").expect("capture file");
    let mut mock = MockHostOperations::new();
    mock.expect_run_package_install().returning(|_, _| {
        Err(crate::error::InstallerError::Io(std::io::Error::other(
            "sudo not found",
        )))
    });

    let result = install_package(&artifact, &sandbox.staging, &mock);

    assert!(result.is_err());
    assert!(!capture_path(&sandbox.staging).exists());
}

//! Unit tests for host operations.

use super::*;
use crate::error::FailureClass;
use crate::test_utils::{
    ExpectedCall, StubExecutor, failure_output, stdout_output, success_output, utf8_temp_dir,
};
use rstest::{fixture, rstest};

struct Workspace {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
}

#[fixture]
fn workspace() -> Workspace {
    let (temp, root) = utf8_temp_dir().expect("temp dir");
    Workspace { _temp: temp, root }
}

fn in_process(calls: Vec<ExpectedCall>) -> InProcessHost<StubExecutor> {
    InProcessHost::new(StubExecutor::new(calls), InstallerCommands::default())
}

#[rstest]
fn remove_tolerates_missing_paths(workspace: Workspace) {
    let host = in_process(vec![]);
    host.remove(&workspace.root.join("absent"))
        .expect("missing path is not an error");
}

#[rstest]
fn remove_deletes_whole_trees(workspace: Workspace) {
    let plugin = workspace.root.join("south/dht11");
    fs::create_dir_all(plugin.join("nested")).expect("create tree");
    fs::write(plugin.join("nested/stale.py"), "old").expect("write file");

    in_process(vec![]).remove(&plugin).expect("remove");

    assert!(!plugin.exists());
    assert!(workspace.root.join("south").is_dir());
}

#[rstest]
fn create_dir_creates_parents(workspace: Workspace) {
    let target = workspace.root.join("python/foglamp/plugins/south");
    in_process(vec![]).create_dir(&target).expect("create");
    assert!(target.is_dir());
}

#[rstest]
fn copy_replicates_directory_trees(workspace: Workspace) {
    let src = workspace.root.join("staging/dht11");
    fs::create_dir_all(src.join("lib")).expect("create src");
    fs::write(src.join("dht11.py"), "plugin").expect("write");
    fs::write(src.join("lib/helper.py"), "helper").expect("write");
    let dst = workspace.root.join("plugins/south/dht11");
    fs::create_dir_all(dst.parent().expect("parent")).expect("create parent");

    in_process(vec![]).copy(&src, &dst).expect("copy");

    assert_eq!(fs::read_to_string(dst.join("dht11.py")).expect("read"), "plugin");
    assert_eq!(
        fs::read_to_string(dst.join("lib/helper.py")).expect("read"),
        "helper"
    );
}

#[cfg(unix)]
#[rstest]
fn copy_preserves_symlinks(workspace: Workspace) {
    let src = workspace.root.join("staging/sinusoid");
    fs::create_dir_all(&src).expect("create src");
    fs::write(src.join("libsinusoid.so.1"), "elf").expect("write");
    std::os::unix::fs::symlink("libsinusoid.so.1", src.join("libsinusoid.so")).expect("link");
    let dst = workspace.root.join("plugins/south/sinusoid");

    in_process(vec![]).copy(&src, &dst).expect("copy");

    let target = fs::read_link(dst.join("libsinusoid.so")).expect("symlink kept");
    assert_eq!(target, std::path::PathBuf::from("libsinusoid.so.1"));
}

#[rstest]
fn dependency_install_reports_stdout_on_success() {
    let host = in_process(vec![ExpectedCall::new(
        "pip3",
        &["install", "-r", "/staging/dht11/requirements.txt"],
        Ok(stdout_output(0, "Collecting Adafruit_DHT\nSuccessfully installed\n")),
    )]);

    let report = host
        .run_dependency_install(Utf8Path::new("/staging/dht11/requirements.txt"))
        .expect("run");

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.message, "Collecting Adafruit_DHTSuccessfully installed");
}

#[rstest]
fn dependency_install_reports_stderr_on_failure() {
    let mut output = failure_output(1, "ERROR: No matching distribution\n");
    output.stdout = b"Collecting nothing\n".to_vec();
    let host = in_process(vec![ExpectedCall::new(
        "pip3",
        &["install", "-r", "/staging/x/requirements.txt"],
        Ok(output),
    )]);

    let report = host
        .run_dependency_install(Utf8Path::new("/staging/x/requirements.txt"))
        .expect("run");

    assert_eq!(report.exit_code, 1);
    assert_eq!(report.message, "ERROR: No matching distribution");
}

#[rstest]
fn package_install_reads_back_the_capture_file(workspace: Workspace) {
    let package = workspace.root.join("foglamp-south-dht.deb");
    let capture = workspace.root.join("output.txt");
    let host = in_process(vec![ExpectedCall::new(
        "sudo",
        &["apt", "-y", "install", package.as_str()],
        Ok(failure_output(100, "E: Unable to locate package\n")),
    )]);

    let report = host.run_package_install(&package, &capture).expect("run");

    assert_eq!(report.exit_code, 100);
    assert_eq!(report.message, "E: Unable to locate package");
}

#[rstest]
fn empty_installer_argv_is_a_config_error() {
    let commands = InstallerCommands {
        package_manager: Vec::new(),
        dependency_installer: Vec::new(),
    };
    let host = InProcessHost::new(StubExecutor::new(vec![]), commands);

    let err = host
        .run_dependency_install(Utf8Path::new("requirements.txt"))
        .expect_err("no program");

    assert!(matches!(err, InstallerError::Config { .. }));
}

#[rstest]
fn utility_host_uses_verbs() {
    let utility = "/usr/local/foglamp/extras/C/cmdutil";
    let executor = StubExecutor::new(vec![
        ExpectedCall::new(utility, &["rm", "/p/south/dht11"], Ok(success_output())),
        ExpectedCall::new(utility, &["mkdir", "/p/south"], Ok(success_output())),
        ExpectedCall::new(
            utility,
            &["cp", "/s/dht11", "/p/south/dht11"],
            Ok(success_output()),
        ),
    ]);
    let host = UtilityHost::new(utility.into(), executor, InstallerCommands::default());

    host.remove(Utf8Path::new("/p/south/dht11")).expect("rm");
    host.create_dir(Utf8Path::new("/p/south")).expect("mkdir");
    host.copy(Utf8Path::new("/s/dht11"), Utf8Path::new("/p/south/dht11"))
        .expect("cp");
}

#[rstest]
fn utility_failure_is_an_internal_filesystem_error() {
    let utility = "/opt/cmdutil";
    let executor = StubExecutor::new(vec![ExpectedCall::new(
        utility,
        &["mkdir", "/p/south"],
        Ok(failure_output(2, "permission denied")),
    )]);
    let host = UtilityHost::new(utility.into(), executor, InstallerCommands::default());

    let err = host
        .create_dir(Utf8Path::new("/p/south"))
        .expect_err("mkdir fails");

    assert!(matches!(err, InstallerError::Filesystem { .. }));
    assert_eq!(err.class(), FailureClass::Internal);
    assert!(err.to_string().contains("permission denied"));
}

use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const DEPS_JSON: &str = r#"{
    "runtimeTarget": { "name": ".NETCoreApp,Version=v6.0" },
    "targets": {
        ".NETCoreApp,Version=v6.0": {
            "MyApp/1.0.0": { "runtime": { "MyApp.dll": {} } },
            "Newtonsoft.Json/13.0.1": { "runtime": { "lib/net6.0/Newtonsoft.Json.dll": {} } },
            "Serilog/3.1.1": { "runtime": { "lib/net6.0/Serilog.dll": {} } }
        }
    },
    "libraries": {
        "MyApp/1.0.0": { "type": "project", "serviceable": false, "sha512": "" }
    }
}"#;

const RUNTIME_CONFIG_JSON: &str = r#"{
    "runtimeOptions": {
        "tfm": "net6.0",
        "framework": { "name": "Microsoft.NETCore.App", "version": "6.0.0" }
    }
}"#;

fn setup_publish_dir(dir: &Path) {
    fs::write(dir.join("MyApp.deps.json"), DEPS_JSON).unwrap();
    fs::write(dir.join("MyApp.runtimeconfig.json"), RUNTIME_CONFIG_JSON).unwrap();
    fs::write(dir.join("MyApp.dll"), b"entry").unwrap();
    fs::write(dir.join("Newtonsoft.Json.dll"), b"json").unwrap();
    fs::write(dir.join("Serilog.dll"), b"serilog").unwrap();
}

#[test]
fn test_beautify_moves_deps_into_libraries() {
    let dir = tempdir().unwrap();
    setup_publish_dir(dir.path());

    Command::cargo_bin("nbeauty")
        .unwrap()
        .arg("--loglevel")
        .arg("detail")
        .arg(dir.path())
        .assert()
        .success();

    assert!(dir.path().join("MyApp.dll").exists());
    assert!(!dir.path().join("Newtonsoft.Json.dll").exists());
    assert!(dir.path().join("libraries/Newtonsoft.Json.dll").exists());
    assert!(dir.path().join("libraries/Serilog.dll").exists());

    let config = fs::read_to_string(dir.path().join("MyApp.runtimeconfig.json")).unwrap();
    assert!(config.contains("STARTUP_HOOKS"));
    assert!(config.contains("NetBeautyLibsDir"));

    let deps = fs::read_to_string(dir.path().join("MyApp.deps.json")).unwrap();
    assert!(deps.contains("nbloader"));
}

#[test]
fn test_beautify_with_custom_libs_dir_and_excludes() {
    let dir = tempdir().unwrap();
    setup_publish_dir(dir.path());

    Command::cargo_bin("nbeauty")
        .unwrap()
        .arg(dir.path())
        .arg("deps")
        .arg("Serilog*")
        .assert()
        .success();

    assert!(dir.path().join("deps/Newtonsoft.Json.dll").exists());
    // excluded, stays in the root
    assert!(dir.path().join("Serilog.dll").exists());
    assert!(!dir.path().join("deps/Serilog.dll").exists());
}

#[test]
fn test_beautify_empty_dir_skips() {
    let dir = tempdir().unwrap();

    let output = Command::cargo_bin("nbeauty")
        .unwrap()
        .arg("--loglevel")
        .arg("detail")
        .arg(dir.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let output = String::from_utf8_lossy(&output);
    assert!(output.contains("no deps.json found"));
}

#[test]
fn test_missing_dir_fails() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("nbeauty")
        .unwrap()
        .arg(dir.path().join("does-not-exist"))
        .assert()
        .failure();
}

#[test]
fn test_no_arguments_prints_help() {
    let output = Command::cargo_bin("nbeauty")
        .unwrap()
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("Usage"));
}

#[test]
fn test_get_cdn_runs() {
    Command::cargo_bin("nbeauty")
        .unwrap()
        .arg("get-cdn")
        .assert()
        .success();
}

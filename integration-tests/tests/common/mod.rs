use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Get the path to a compiled binary in the target directory
fn cargo_bin(name: &str) -> PathBuf {
    // Look for the binary next to the test executable (target/debug)
    let mut path = std::env::current_exe()
        .expect("Failed to get current exe")
        .parent()
        .expect("No parent")
        .parent()
        .expect("No grandparent")
        .to_path_buf();
    path.push(name);
    if path.exists() {
        return path;
    }

    // Fallback: try target/debug directly
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // integration-tests -> workspace root
    path.push("target");
    path.push("debug");
    path.push(name);
    if path.exists() {
        return path;
    }

    panic!("Binary '{}' not found. Run `cargo build --workspace` first.", name);
}

/// A scratch fleet: a stub control-plane script plus a registry document,
/// both inside one temp dir that disappears with the fixture.
pub struct Fixture {
    dir: TempDir,
    script: PathBuf,
}

impl Fixture {
    /// `body` is the stub's shell source; it runs after a prologue that
    /// parses `--host`, `--key`, and `--version` into HOST/KEY/VER and
    /// leaves the subcommand in CMD.
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let script = dir.path().join("ctl.sh");
        let prologue = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/argv.log"
HOST=""; KEY=""; VER=""; CMD=""
while [ $# -gt 0 ]; do
  case "$1" in
    --host) HOST="$2"; shift 2;;
    --key) KEY="$2"; shift 2;;
    --version) VER="$2"; shift 2;;
    *) CMD="$1"; shift; break;;
  esac
done
"#;
        fs::write(&script, format!("{}{}\n", prologue, body)).expect("Failed to write stub");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod stub");
        Self { dir, script }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.dir.path().join("routers.json")
    }

    /// Run fleetctl with this fixture's script and registry document.
    pub fn fleetctl(&self, args: &[&str]) -> Output {
        Command::new(cargo_bin("fleetctl"))
            .arg("--script")
            .arg(&self.script)
            .arg("--registry")
            .arg(self.registry_path())
            .args(args)
            .output()
            .expect("Failed to run fleetctl")
    }

    pub fn read_registry(&self) -> serde_json::Value {
        let bytes = fs::read(self.registry_path()).expect("Failed to read registry document");
        serde_json::from_slice(&bytes).expect("Registry document is not JSON")
    }

    /// Every argv the stub has seen, one line per invocation.
    pub fn argv_log(&self) -> String {
        fs::read_to_string(self.dir.path().join("argv.log")).unwrap_or_default()
    }

    pub fn write_registry(&self, doc: &serde_json::Value) {
        fs::write(
            self.registry_path(),
            serde_json::to_vec_pretty(doc).unwrap(),
        )
        .expect("Failed to seed registry document");
    }
}

pub fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "fleetctl failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// A seeded router record for direct document writes.
pub fn router_doc(id: &str, host: &str, enabled: bool, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": id,
        "host": host,
        "apiKey": "SUPERSECRET",
        "version": "1.5",
        "location": null,
        "interfaces": [],
        "enabled": enabled,
        "status": status,
        "lastSeen": null
    })
}

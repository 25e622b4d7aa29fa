//! Helpers for tests that need a JVM without having one: a "java home" whose `bin/java` is a
//! shell script replaying canned runner output.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Name of the file, inside a fake java home, that the fake `java` writes its arguments to.
pub const ARGS_FILE: &str = "java-args.txt";

/// Creates a java home whose `bin/java` runs `script` under `/bin/sh`.
///
/// The script can refer to the java home as `$JAVA_HOME_DIR`.
pub fn fake_java_home(script: &str) -> io::Result<TempDir> {
    let home = tempfile::tempdir()?;
    let bin = home.path().join("bin");
    fs::create_dir_all(&bin)?;

    let java = bin.join(if cfg!(windows) { "java.exe" } else { "java" });
    let contents = format!(
        "#!/bin/sh\nJAVA_HOME_DIR='{}'\n{script}\n",
        home.path().display()
    );
    fs::write(&java, contents)?;
    make_executable(&java)?;

    Ok(home)
}

/// A script snippet that records each argument on its own line into [ARGS_FILE].
pub fn record_args() -> String {
    format!("printf '%s\\n' \"$@\" > \"$JAVA_HOME_DIR/{ARGS_FILE}\"")
}

/// Reads back what [record_args] wrote.
pub fn recorded_args(java_home: &Path) -> io::Result<Vec<String>> {
    let contents = fs::read_to_string(java_home.join(ARGS_FILE))?;
    Ok(contents.lines().map(str::to_owned).collect())
}

/// A script snippet that prints `lines` verbatim to stdout.
pub fn emit_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut script = String::from("cat <<'JTR_EOF'\n");
    for line in lines {
        script.push_str(line.as_ref());
        script.push('\n');
    }
    script.push_str("JTR_EOF");
    script
}

/// Writes an (empty) runner artifact into `dir`.
pub fn runner_jar(dir: &Path) -> io::Result<PathBuf> {
    let jar = dir.join("runner.jar");
    fs::write(&jar, b"")?;
    Ok(jar)
}

/// One event in the tagged runner protocol, e.g.
/// `tagged_event("testStarted", &[("name", "a.B#m")])`.
pub fn tagged_event(name: &str, attributes: &[(&str, &str)]) -> String {
    let attributes: serde_json::Map<String, serde_json::Value> = attributes
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    let event = serde_json::json!({ "name": name, "attributes": attributes });
    format!("@@<TestRunner-({event})-TestRunner>")
}

/// Events for one passing test in the legacy (full-name keyed) tagged protocol.
pub fn passing_test(full_name: &str) -> [String; 2] {
    [
        tagged_event("testStarted", &[("name", full_name)]),
        tagged_event("testFinished", &[("name", full_name), ("duration", "1")]),
    ]
}

/// Events for one failing test in the legacy (full-name keyed) tagged protocol.
pub fn failing_test(full_name: &str, message: &str) -> [String; 3] {
    [
        tagged_event("testStarted", &[("name", full_name)]),
        tagged_event(
            "testFailed",
            &[("name", full_name), ("message", message), ("details", message)],
        ),
        tagged_event("testFinished", &[("name", full_name), ("duration", "1")]),
    ]
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

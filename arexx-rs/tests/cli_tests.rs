/// CLI tests: run scripts through the `arexx` binary and check what it
/// prints and how it exits.
///
/// Every invocation points `ARXBBS_CONFIG` at a config file inside a fresh
/// temporary directory, so no config on the machine running the tests can
/// leak in.  Scripts are either piped via stdin (`arexx -`) or written into
/// the temporary directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Path to the `arexx` binary built by this Cargo workspace.
fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_arexx"))
}

/// A scratch directory with an (initially empty) config file.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("arexx.conf"), "").expect("write config");
        Sandbox { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self, body: &str) {
        std::fs::write(self.path().join("arexx.conf"), body).expect("write config");
    }

    fn write(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(&path, body).expect("write script");
        path
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(binary());
        cmd.env("ARXBBS_CONFIG", self.path().join("arexx.conf"))
            .env_remove("RUST_LOG")
            .current_dir(self.path());
        cmd
    }

    /// Run with `args`, piping `stdin` in.
    fn run(&self, args: &[&str], stdin: &str) -> Output {
        let mut child = self
            .command()
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to spawn arexx binary");
        child
            .stdin
            .as_mut()
            .expect("stdin not open")
            .write_all(stdin.as_bytes())
            .expect("write to stdin");
        child.wait_with_output().expect("wait failed")
    }
}

fn lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes).lines().map(str::to_owned).collect()
}

/// Pipe `script` through `arexx -` and require success with `expected` output.
fn check(script: &str, expected: &[&str]) {
    let sb = Sandbox::new();
    let out = sb.run(&["-"], script);
    let got = lines(&out.stdout);
    assert!(
        out.status.success(),
        "\nScript:\n{script}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(got, expected, "\nScript:\n{script}");
}

// ── Scripts via stdin ─────────────────────────────────────────────────────────

#[test]
fn say_simple() {
    check("SAY 'hello world'", &["hello world"]);
}

#[test]
fn concatenation() {
    check("SAY 'foo' || 'bar'", &["foobar"]);
}

#[test]
fn loop_and_condition() {
    check(
        "DO I = 1 TO 5\n  IF I = 3 THEN ITERATE\n  SAY I\nEND",
        &["1", "2", "4", "5"],
    );
}

#[test]
fn builtins() {
    check(
        "SAY LENGTH('hello')\nSAY UPPER('hello')\nSAY SUBSTR('hello', 2, 3)",
        &["5", "HELLO", "ell"],
    );
}

#[test]
fn bbswrite_is_printed() {
    check("CALL BBSWRITE 'direct'\nSAY 'said'", &["direct", "said"]);
}

#[test]
fn default_user_is_guest() {
    check("SAY GETUSERNAME() || ' ' || GETSECLEVEL()", &["GUEST 10"]);
}

// ── Exit status and errors ────────────────────────────────────────────────────

#[test]
fn failure_exits_nonzero_with_partial_output() {
    let sb = Sandbox::new();
    let out = sb.run(&["-"], "SAY 'before'\nCALL NOPE\nSAY 'after'");
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(lines(&out.stdout), ["before"]);
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("arexx: unknown function `NOPE`"), "stderr: {err}");
}

#[test]
fn no_arguments_prints_usage() {
    let sb = Sandbox::new();
    let out = sb.run(&[], "");
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage: arexx"));
}

#[test]
fn bad_flag_prints_usage() {
    let sb = Sandbox::new();
    let out = sb.run(&["-z"], "");
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown option: -z"));
}

#[test]
fn missing_script() {
    let sb = Sandbox::new();
    let out = sb.run(&["nonexistent"], "");
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("not found"));
}

// ── Files, arguments, flags ───────────────────────────────────────────────────

#[test]
fn script_file_with_arguments() {
    let sb = Sandbox::new();
    let script = sb.write("args.rexx", "SAY ARGCOUNT\nARG a, b\nSAY b || a");
    let out = sb.run(&[script.to_str().unwrap(), "x", "y"], "");
    assert!(out.status.success());
    assert_eq!(lines(&out.stdout), ["2", "yx"]);
}

#[test]
fn script_by_repository_name() {
    let sb = Sandbox::new();
    sb.write("scripts/greet.rexx", "SAY 'hi ' || ARG1");
    let out = sb.run(&["-s", "scripts", "greet", "bob"], "");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(lines(&out.stdout), ["hi bob"]);
}

#[test]
fn user_and_input_flags() {
    let sb = Sandbox::new();
    let out = sb.run(
        &["-u", "alice", "-i", "blue", "-"],
        "C = GETINPUT()\nSAY GETUSERNAME() || ' likes ' || C",
    );
    assert!(out.status.success());
    assert_eq!(lines(&out.stdout), ["alice likes blue"]);
}

#[test]
fn config_file_settings() {
    let sb = Sandbox::new();
    sb.config("username = carol\nsec_level = 200\nrecursion_limit = 3\n");
    let out = sb.run(&["-"], "SAY GETUSERNAME() || GETSECLEVEL()\nPROCEDURE R()\nCALL R\nEND\nCALL R");
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(lines(&out.stdout), ["carol200"]);
    assert!(String::from_utf8_lossy(&out.stderr).contains("recursion limit of 3 exceeded"));
}

#[test]
fn explicit_config_flag_wins_over_env() {
    let sb = Sandbox::new();
    sb.config("username = from_env\n");
    let other = sb.write("other.conf", "username = from_flag\n");
    let out = sb.run(&["-f", other.to_str().unwrap(), "-"], "SAY GETUSERNAME()");
    assert_eq!(lines(&out.stdout), ["from_flag"]);
}

#[test]
fn bad_config_line_is_a_warning() {
    let sb = Sandbox::new();
    sb.config("colour = red\n");
    let out = sb.run(&["-"], "SAY 'ok'");
    assert!(out.status.success());
    assert_eq!(lines(&out.stdout), ["ok"]);
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown setting 'colour'"));
}

#[test]
fn sandboxed_file_functions() {
    let sb = Sandbox::new();
    std::fs::create_dir(sb.path().join("files")).unwrap();
    sb.config(&format!("sandbox_dir = {}\n", sb.path().join("files").display()));
    let out = sb.run(&["-"], "CALL WRITEFILE 'out.txt', 'saved'\nSAY READFILE('out.txt')");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(lines(&out.stdout), ["saved"]);
    assert_eq!(std::fs::read_to_string(sb.path().join("files/out.txt")).unwrap(), "saved");
}

// ── Triggers ──────────────────────────────────────────────────────────────────

#[test]
fn fire_trigger_runs_every_script() {
    let sb = Sandbox::new();
    sb.write("scripts/login/a-welcome.rexx", "SAY 'welcome ' || ARG1");
    sb.write("scripts/login/b-news.rexx", "SAY 'no news'");
    sb.write("scripts/logoff/bye.rexx", "SAY 'bye'");
    let out = sb.run(&["-s", "scripts", "-e", "login", "dave"], "");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        lines(&out.stdout),
        ["[login/a-welcome] welcome dave", "[login/b-news] no news"]
    );
}

#[test]
fn fire_trigger_reports_failures() {
    let sb = Sandbox::new();
    sb.write("scripts/timer/ok.rexx", "SAY 'tick'");
    sb.write("scripts/timer/broken.rexx", "SIGNAL nowhere");
    let out = sb.run(&["-s", "scripts", "-e", "timer"], "");
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(lines(&out.stdout), ["[timer/ok] tick"]);
    assert!(String::from_utf8_lossy(&out.stderr).contains("timer/broken: label `NOWHERE` not found"));
}

#[test]
fn fire_trigger_with_no_scripts_succeeds() {
    let sb = Sandbox::new();
    let out = sb.run(&["-s", "scripts", "-e", "file_upload"], "");
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
}

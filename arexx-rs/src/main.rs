use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;

use arexx::bbs::LocalBbs;
use arexx::cli::{self, Action, CliArgs};
use arexx::config::{self, Config};
use arexx::repo::{DirRepository, ScriptRepository};
use arexx::script::{EngineConfig, ExecResult, HostContext, Interpreter};
use arexx::trigger::Trigger;

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("arexx: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG wins; -d only changes the default.
    let default_level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = load_config(&args);
    let bbs = build_host(&args, &config);

    // ── Script repository ─────────────────────────────────────────────────────
    let script_dir = args
        .script_dir
        .clone()
        .or_else(|| config.script_dir.clone())
        .unwrap_or_else(|| ".".into());
    let repo: Arc<dyn ScriptRepository> = Arc::new(DirRepository::new(script_dir));

    let ok = match args.action {
        Action::Usage => {
            eprintln!("{}", cli::USAGE);
            std::process::exit(2);
        }
        Action::Run(ref script) => run_script(script, repo.as_ref(), bbs, config.engine.clone(), &args.script_args),
        Action::Fire(trigger) => fire_trigger(trigger, repo, bbs, config.engine.clone(), args.script_args).await,
    };

    if !ok {
        std::process::exit(1);
    }
}

/// Load the config file, reporting problems on stderr.  A missing or broken
/// config never stops the run.
fn load_config(args: &CliArgs) -> Config {
    let Some(path) = config::find_config(args.config.as_deref()) else {
        return Config::default();
    };
    match Config::load_file(&path) {
        Ok((config, errors)) => {
            for e in errors {
                eprintln!("arexx: warning: {}: {e}", path.display());
            }
            config
        }
        Err(e) => {
            eprintln!("arexx: warning: {}: {e}", path.display());
            Config::default()
        }
    }
}

fn build_host(args: &CliArgs, config: &Config) -> LocalBbs {
    let mut user = config.user.clone();
    if let Some(name) = &args.user {
        user.username = name.clone();
    }
    let mut bbs = LocalBbs::new(user, config.session);
    if let Some(dir) = &config.sandbox_dir {
        bbs = bbs.with_sandbox(dir);
    }
    for line in &args.input {
        bbs.queue_input(line);
    }
    bbs
}

/// Print a finished run's session output and report its error.
fn report(prefix: Option<&str>, result: &ExecResult, sent: &[String]) {
    for line in sent {
        match prefix {
            Some(p) => println!("[{p}] {line}"),
            None => println!("{line}"),
        }
    }
    if let Some(err) = &result.error {
        match prefix {
            Some(p) => eprintln!("arexx: {p}: {err}"),
            None => eprintln!("arexx: {err}"),
        }
    }
}

/// Run one script.  `script` is `-` for stdin, a file path if one exists,
/// otherwise a repository name.
fn run_script(
    script: &str,
    repo: &dyn ScriptRepository,
    bbs: LocalBbs,
    engine: EngineConfig,
    argv: &[String],
) -> bool {
    let path = Path::new(script);
    let src = if script == "-" {
        std::io::read_to_string(std::io::stdin()).map_err(|e| format!("stdin: {e}"))
    } else if path.is_file() {
        std::fs::read_to_string(path).map_err(|e| format!("{script}: {e}"))
    } else {
        repo.load(script).map_err(|e| e.to_string())
    };
    let src = match src {
        Ok(s) => s,
        Err(e) => {
            eprintln!("arexx: {e}");
            return false;
        }
    };

    log::debug!("running {script} as {}", bbs.user().username);
    let mut interp = Interpreter::with_config(bbs, engine);
    let result = interp.execute(&src, argv);
    report(None, &result, interp.host().sent());
    result.success
}

/// Run every script registered for `trigger` concurrently, one interpreter
/// per script, all sharing one board.
async fn fire_trigger(
    trigger: Trigger,
    repo: Arc<dyn ScriptRepository>,
    bbs: LocalBbs,
    engine: EngineConfig,
    argv: Vec<String>,
) -> bool {
    let names = match repo.scripts_for(trigger) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("arexx: {e}");
            return false;
        }
    };
    log::info!("firing {trigger}: {} script(s)", names.len());

    let argv = Arc::new(argv);
    let mut set = JoinSet::new();
    for name in names {
        let repo = Arc::clone(&repo);
        let argv = Arc::clone(&argv);
        let host = bbs.session_for(bbs.user().clone());
        let engine = engine.clone();
        set.spawn_blocking(move || {
            let outcome = repo.load(&name).map(|src| {
                let mut interp = Interpreter::with_config(host, engine);
                let result = interp.execute(&src, &argv);
                (result, interp.into_host().take_sent())
            });
            (name, outcome)
        });
    }

    let mut finished = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(run) => finished.push(run),
            Err(e) => {
                eprintln!("arexx: script task failed: {e}");
                return false;
            }
        }
    }

    // Completion order is arbitrary; report in repository order.
    finished.sort_by(|a, b| a.0.cmp(&b.0));
    let mut ok = true;
    for (name, outcome) in finished {
        match outcome {
            Ok((result, sent)) => {
                report(Some(name.as_str()), &result, &sent);
                ok &= result.success;
            }
            Err(e) => {
                eprintln!("arexx: {e}");
                ok = false;
            }
        }
    }
    ok
}

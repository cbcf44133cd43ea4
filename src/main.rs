//! Reach-to-grasp training session runner.
//!
//! ```text
//! reach [CONFIG.json] [--backend null|interactive|physical] [--output FILE]
//! ```
//!
//! Loads the session configuration (defaults if no file is given), builds
//! the chosen rig backend, runs one session, and writes the collated
//! session record as JSON.  Ctrl-C stops the session early; the partial
//! record is still written.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};

use reach::adapters::interactive::InteractiveRig;
use reach::adapters::null::{NullRig, StartGate};
use reach::adapters::terminal::TerminalKeys;
use reach::app::ports::Rig;
use reach::{CancelToken, SessionConfig, SessionReport, Sequencer};

// ── Command line ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Null,
    Interactive,
    Physical,
}

impl Backend {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "null" => Ok(Self::Null),
            "interactive" => Ok(Self::Interactive),
            "physical" => Ok(Self::Physical),
            other => bail!("unknown backend '{other}' (null, interactive, physical)"),
        }
    }
}

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    backend: Backend,
    output: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args { config: None, backend: Backend::Null, output: None };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backend" | "-b" => {
                let v = args.next().ok_or_else(|| anyhow!("--backend needs a value"))?;
                parsed.backend = Backend::parse(&v)?;
            }
            "--output" | "-o" => {
                let v = args.next().ok_or_else(|| anyhow!("--output needs a value"))?;
                parsed.output = Some(PathBuf::from(v));
            }
            flag if flag.starts_with('-') => bail!("unknown option '{flag}'"),
            path => {
                if parsed.config.replace(PathBuf::from(path)).is_some() {
                    bail!("more than one config file given");
                }
            }
        }
    }
    Ok(parsed)
}

// ── Logging ───────────────────────────────────────────────────

fn init_logging(raw_terminal: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if raw_terminal {
        // Raw mode does not translate '\n'.
        builder.format(|buf, record| {
            write!(buf, "[{} {}] {}\r\n", record.level(), record.target(), record.args())
        });
    }
    builder.init();
}

// ── SIGINT ────────────────────────────────────────────────────

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Release);
}

/// Route SIGINT to `cancel`.  The handler only stores a flag; a watcher
/// thread forwards it.
fn install_sigint(cancel: CancelToken) -> Result<()> {
    let handler = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only performs an atomic store.
    let prev = unsafe { libc::signal(libc::SIGINT, handler) };
    if prev == libc::SIG_ERR {
        bail!("could not install SIGINT handler");
    }
    thread::Builder::new()
        .name("sigint".into())
        .spawn(move || {
            while !INTERRUPTED.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(20));
            }
            info!("Interrupted, stopping session");
            cancel.cancel();
        })
        .context("spawning SIGINT watcher")?;
    Ok(())
}

// ── Session ───────────────────────────────────────────────────

fn run_session<R: Rig>(config: SessionConfig, rig: R, cancel: &CancelToken) -> Result<SessionReport> {
    let sequencer = Sequencer::new(config, rig).context("invalid session")?;
    let report = sequencer.run(cancel).context("rig initialisation failed")?;
    Ok(report)
}

#[cfg(feature = "rpi")]
fn run_physical(config: SessionConfig, cancel: &CancelToken) -> Result<SessionReport> {
    use reach::adapters::gpio;
    use reach::pins::PinTable;

    let rig = gpio::open_rig(gpio::DEFAULT_CHIP, PinTable::default(), config.spouts())
        .context("claiming rig GPIO lines")?;
    run_session(config, rig, cancel)
}

#[cfg(not(feature = "rpi"))]
fn run_physical(_config: SessionConfig, _cancel: &CancelToken) -> Result<SessionReport> {
    bail!("the physical backend needs a build with the `rpi` feature")
}

fn load_config(path: Option<&PathBuf>) -> Result<SessionConfig> {
    let Some(path) = path else {
        info!("No config file given, using defaults");
        return Ok(SessionConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    SessionConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let interactive = args.backend == Backend::Interactive;

    // Raw mode comes later, but the log format has to be fixed now.
    init_logging(interactive);
    info!("reach v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config.as_ref())?;
    let cancel = CancelToken::new();
    install_sigint(cancel.clone())?;

    let report = match args.backend {
        Backend::Null => {
            let rig = NullRig::new(config.spouts())?.with_start_gate(StartGate::Enter);
            run_session(config, rig, &cancel)?
        }
        Backend::Interactive => {
            let (keys_guard, keys) = TerminalKeys::spawn(cancel.clone())?;
            let rig = InteractiveRig::new(keys, config.spouts())?;
            let report = run_session(config, rig, &cancel);
            drop(keys_guard);
            report?
        }
        Backend::Physical => run_physical(config, &cancel)?,
    };

    info!("Session ended: {}", report.end);

    let json = serde_json::to_string_pretty(&report.record).context("serialising session")?;
    match args.output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Session written to {}", path.display());
        }
        None => {
            warn!("No --output given, printing session record");
            println!("{json}");
        }
    }
    Ok(())
}

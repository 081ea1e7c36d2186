use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

/// Environment variables the binary reads; cleared so the host cannot leak in.
const MONITOR_ENV: &[&str] = &[
    "BAMBU_IP",
    "BAMBU_SERIAL",
    "BAMBU_ACCESS_CODE",
    "BAMBU_DEVICE_DRIVER",
    "HEALTH_PORT",
    "TG_BOT_TOKEN",
    "TG_CHAT_ID",
    "LOG_LEVEL",
    "BAMBU_POLL_INTERVAL_SECS",
    "BAMBU_MAX_RETRIES",
    "BAMBU_RETRY_DELAY_SECS",
    "BAMBU_CONNECTION_WAIT_SECS",
    "BAMBU_IMAGE_PATH",
];

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_bambu-monitor") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "bambu-monitor.exe"
    } else {
        "bambu-monitor"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve bambu-monitor binary path for integration test"),
    }
}

/// Environment with valid printer credentials.
pub fn printer_env() -> Vec<(&'static str, String)> {
    vec![
        ("BAMBU_IP", "192.168.1.50".to_string()),
        ("BAMBU_SERIAL", "01S00A000000000".to_string()),
        ("BAMBU_ACCESS_CODE", "12345678".to_string()),
    ]
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|addr| addr.port())
        .expect("reserve free port")
}

pub fn run_cli_case(
    case_name: &str,
    cwd: &Path,
    args: &[&str],
    env: &[(&str, String)],
) -> CmdResult {
    let root = std::env::temp_dir().join("bambu-monitor-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command.current_dir(cwd).args(args).env("RUST_BACKTRACE", "1");
    for name in MONITOR_ENV {
        command.env_remove(name);
    }
    for (name, value) in env {
        command.env(name, value);
    }
    let output = command.output().expect("execute bambu-monitor");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

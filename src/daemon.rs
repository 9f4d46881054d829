use std::path::{Path, PathBuf};

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::session::SessionState;

/// Start the health check HTTP server. The response carries the current
/// transport session state.
pub async fn start_health_server(
    port: u16,
    session: watch::Receiver<SessionState>,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .with_state(session);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Health server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(
    State(session): State<watch::Receiver<SessionState>>,
) -> Json<serde_json::Value> {
    Json(health_body(*session.borrow()))
}

fn health_body(state: SessionState) -> serde_json::Value {
    json!({"status": "ok", "session": state})
}

/// Service definition inputs, resolved to absolute paths so the installed
/// service does not depend on the shell it was installed from.
#[cfg(any(target_os = "linux", target_os = "macos", test))]
struct ServiceLayout {
    exe: PathBuf,
    working_dir: PathBuf,
    config: PathBuf,
}

#[cfg(any(target_os = "linux", target_os = "macos", test))]
impl ServiceLayout {
    fn resolve(config_path: &Path) -> anyhow::Result<Self> {
        let working_dir = std::env::current_dir()?;
        let config = if config_path.is_absolute() {
            config_path.to_path_buf()
        } else {
            working_dir.join(config_path)
        };
        if !config.exists() {
            warn!("{} does not exist yet; create it before starting the service", config.display());
        }
        Ok(Self {
            exe: std::env::current_exe()?,
            working_dir,
            config,
        })
    }
}

#[cfg(any(target_os = "linux", test))]
fn systemd_unit(layout: &ServiceLayout) -> String {
    format!(
        r#"[Unit]
Description=faqdaemon - knowledge base chat bot
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart="{exe}" --config "{config}"
WorkingDirectory={dir}
Environment=RUST_LOG=info
Restart=on-failure
RestartSec=10
KillSignal=SIGTERM
TimeoutStopSec=30

[Install]
WantedBy=multi-user.target
"#,
        exe = layout.exe.display(),
        config = layout.config.display(),
        dir = layout.working_dir.display(),
    )
}

#[cfg(any(target_os = "macos", test))]
fn launchd_plist(layout: &ServiceLayout) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{exe}</string>
        <string>--config</string>
        <string>{config}</string>
    </array>
    <key>WorkingDirectory</key>
    <string>{dir}</string>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardOutPath</key>
    <string>{dir}/faqdaemon.log</string>
    <key>StandardErrorPath</key>
    <string>{dir}/faqdaemon.log</string>
</dict>
</plist>
"#,
        label = LAUNCHD_LABEL,
        exe = layout.exe.display(),
        config = layout.config.display(),
        dir = layout.working_dir.display(),
    )
}

#[cfg(any(target_os = "macos", test))]
const LAUNCHD_LABEL: &str = "dev.faqdaemon";

/// Write a systemd unit that starts the daemon with `config_path`.
#[cfg(target_os = "linux")]
pub fn install_service(config_path: &Path) -> anyhow::Result<()> {
    let layout = ServiceLayout::resolve(config_path)?;
    let path = "/etc/systemd/system/faqdaemon.service";
    std::fs::write(path, systemd_unit(&layout))?;
    println!("Service file written to {}", path);
    println!("Run: sudo systemctl daemon-reload && sudo systemctl enable --now faqdaemon");
    Ok(())
}

/// Write a launchd agent that starts the daemon with `config_path`.
#[cfg(target_os = "macos")]
pub fn install_service(config_path: &Path) -> anyhow::Result<()> {
    let layout = ServiceLayout::resolve(config_path)?;
    let home = std::env::var("HOME")?;
    let path = format!("{}/Library/LaunchAgents/{}.plist", home, LAUNCHD_LABEL);
    std::fs::write(&path, launchd_plist(&layout))?;
    println!("Plist written to {}", path);
    println!("Run: launchctl load {}", path);
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn install_service(_config_path: &Path) -> anyhow::Result<()> {
    anyhow::bail!("Service installation is only supported on Linux and macOS");
}

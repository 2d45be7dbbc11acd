// src/driver.rs
use anyhow::{bail, Context, Result};
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thirtyfour::prelude::*;
use which::which;

use crate::config::Config;

const TAG: &str = "sess";

pub struct DriverBundle {
    pub driver: WebDriver,
    pub chromedriver_child: Child,
    pub user_data_dir: PathBuf,
}

/// Spawn chromedriver and open a Chrome session sized for capture.
pub async fn init_driver(cfg: &Config) -> Result<DriverBundle> {
    let chromedriver_path =
        which("chromedriver").context("chromedriver not found in PATH. Install it or add to PATH.")?;

    let log_file = File::create(log_path()).context("cannot create chromedriver.log")?;
    let mut chromedriver = spawn_chromedriver(&chromedriver_path, cfg.chromedriver_port, log_file)?;
    if let Err(e) = wait_for_port("127.0.0.1", cfg.chromedriver_port, Duration::from_secs(10)).await {
        let _ = chromedriver.kill();
        return Err(e.context("chromedriver did not become ready on time"));
    }

    let mut caps = DesiredCapabilities::chrome();
    if let Some(bin) = cfg.chrome_bin.clone().or_else(find_chrome_bin) {
        caps.set_binary(&bin)?;
    }

    // Fresh profile per run
    let timestamp_ms = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
    let mut user_data_dir = env::temp_dir();
    user_data_dir.push(format!("vald-capture-{timestamp_ms}"));
    caps.add_arg(&format!("--user-data-dir={}", user_data_dir.to_string_lossy()))?;

    if cfg.headless {
        caps.add_arg("--headless=new")?;
    }
    caps.add_arg(&format!("--window-size={},{}", cfg.window_w, cfg.window_h))?;
    caps.add_arg(&format!("--force-device-scale-factor={}", cfg.device_scale))?;
    caps.add_arg("--high-dpi-support=1")?;
    caps.add_arg("--force-prefers-reduced-motion")?;

    // Container-friendly flags
    caps.add_arg("--disable-gpu")?;
    caps.add_arg("--no-sandbox")?;
    caps.add_arg("--disable-dev-shm-usage")?;
    caps.add_arg("--no-default-browser-check")?;
    caps.add_arg("--no-first-run")?;
    caps.add_arg("--disable-infobars")?;

    caps.add_experimental_option("excludeSwitches", vec!["enable-automation"])?;
    caps.add_experimental_option("useAutomationExtension", false)?;

    let driver_url = format!("http://127.0.0.1:{}", cfg.chromedriver_port);
    let driver = match WebDriver::new(&driver_url, caps).await {
        Ok(d) => d,
        Err(e) => {
            let _ = chromedriver.kill();
            let _ = std::fs::remove_dir_all(&user_data_dir);
            return Err(e).context("could not start a Chrome session");
        }
    };
    log::info!(
        target: TAG,
        "chrome up ({}x{} @{}x, headless={})",
        cfg.window_w,
        cfg.window_h,
        cfg.device_scale,
        cfg.headless
    );

    Ok(DriverBundle { driver, chromedriver_child: chromedriver, user_data_dir })
}

pub async fn cleanup_driver(bundle: &mut DriverBundle) {
    let _ = bundle.driver.clone().quit().await;
    let _ = bundle.chromedriver_child.kill();
    let _ = std::fs::remove_dir_all(&bundle.user_data_dir);
}

fn spawn_chromedriver(chromedriver: &Path, port: u16, log_file: File) -> Result<Child> {
    let mut cmd = Command::new(chromedriver);
    cmd.arg(format!("--port={port}"))
        .stdout(Stdio::from(log_file.try_clone()?))
        .stderr(Stdio::from(log_file));
    let child = cmd.spawn().with_context(|| "failed to spawn chromedriver")?;
    Ok(child)
}

async fn wait_for_port(host: &str, port: u16, timeout: Duration) -> Result<()> {
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if tokio::net::TcpStream::connect((host, port)).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    bail!("port {host}:{port} did not open within {timeout:?}")
}

fn find_chrome_bin() -> Option<String> {
    for cand in ["google-chrome", "google-chrome-stable", "chromium-browser", "chromium"] {
        if let Ok(p) = which(cand) {
            return Some(p.to_string_lossy().into_owned());
        }
    }
    None
}

fn log_path() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join("chromedriver.log")
}

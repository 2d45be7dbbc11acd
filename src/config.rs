// src/config.rs
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the run decides which teams to walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamSelection {
    /// Every filter option whose label starts with this text.
    Prefix(String),
    /// Exactly these team names, in order.
    List(Vec<String>),
}

impl TeamSelection {
    pub fn from_env() -> Result<Self> {
        match env::var("TEAM_LIST") {
            Ok(raw) if !raw.trim().is_empty() => Ok(TeamSelection::List(parse_team_list(&raw)?)),
            _ => Ok(TeamSelection::Prefix(
                env::var("TEAM_PREFIX").unwrap_or_else(|_| "KC Fusion".to_string()),
            )),
        }
    }
}

/// Comma-separated names, or a path to a `.txt` file with one name per line.
pub fn parse_team_list(raw: &str) -> Result<Vec<String>> {
    let raw = raw.trim();
    if raw.to_lowercase().ends_with(".txt") && Path::new(raw).exists() {
        let body = std::fs::read_to_string(raw).with_context(|| format!("read team list {raw}"))?;
        return Ok(body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect());
    }
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub output_dir: PathBuf,
    pub auth_file: PathBuf,
    pub teams: TeamSelection,
    pub headless: bool,
    pub chromedriver_port: u16,
    pub chrome_bin: Option<String>,
    pub window_w: u32,
    pub window_h: u32,
    pub device_scale: f64,
    pub timings: Timings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "https://hub.valdperformance.com/".to_string()),
            email: env::var("EMAIL").ok().filter(|s| !s.is_empty()),
            password: env::var("PASSWORD").ok().filter(|s| !s.is_empty()),
            output_dir: PathBuf::from(env::var("OUTPUT_DIR").unwrap_or_else(|_| "Vald Data".to_string())),
            auth_file: PathBuf::from(env::var("AUTH_FILE").unwrap_or_else(|_| "auth_state.json".to_string())),
            teams: TeamSelection::from_env()?,
            headless: env::var("HEADLESS").map_or(true, |v| v != "0"),
            chromedriver_port: env_parse("CHROMEDRIVER_PORT", 9515),
            chrome_bin: env::var("CHROME_BIN").ok(),
            window_w: env_parse("WINDOW_W", 1920),
            window_h: env_parse("WINDOW_H", 1080),
            device_scale: env_parse("DEVICE_SCALE", 2.0),
            timings: Timings::from_env(),
        })
    }
}

/// Every pause and timeout used by the capture engine.
#[derive(Debug, Clone)]
pub struct Timings {
    pub short_pause: Duration,
    pub page_settle: Duration,
    pub url_timeout: Duration,
    pub login_field_timeout: Duration,
    pub login_success_timeout: Duration,
    pub session_check_timeout: Duration,

    pub poll_interval: Duration,
    pub first_tile_timeout: Duration,
    pub pre_checklist_pause: Duration,
    pub tile_scroll_steps: u32,
    pub tile_scroll_px: i64,
    pub tile_scroll_settle: Duration,

    pub modal_open_attempt: Duration,
    pub modal_mount_wait: Duration,
    pub modal_close_timeout: Duration,
    pub preload_pause: Duration,
    pub accordion_discovery_timeout: Duration,
    pub accordion_stable_for: Duration,
    pub accordion_check_interval: Duration,
    pub accordion_body_timeout: Duration,
    pub accordion_section_settle: Duration,

    pub dropdown_attempts: u32,
    pub dropdown_open_timeout: Duration,
    pub option_timeout: Duration,
    pub menu_close_timeout: Duration,
    pub metric_confirm_timeout: Duration,
    pub fingerprint_interval: Duration,
    pub menu_after_select: Duration,
    pub bounce_pause: Duration,
    pub retry_pause: Duration,
    pub hover_clear_pause: Duration,
    pub dupe_attempts: u32,

    pub filter_open_attempts: u32,
    pub filter_open_timeout: Duration,
    pub filter_control_timeout: Duration,
    pub chip_pause: Duration,
    pub overview_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            short_pause: ms(350),
            page_settle: ms(1_000),
            url_timeout: ms(30_000),
            login_field_timeout: ms(15_000),
            login_success_timeout: ms(30_000),
            session_check_timeout: ms(15_000),

            poll_interval: ms(100),
            first_tile_timeout: ms(20_000),
            pre_checklist_pause: ms(300),
            tile_scroll_steps: 7,
            tile_scroll_px: 600,
            tile_scroll_settle: ms(400),

            modal_open_attempt: ms(3_000),
            modal_mount_wait: ms(800),
            modal_close_timeout: ms(10_000),
            preload_pause: ms(200),
            accordion_discovery_timeout: ms(30_000),
            accordion_stable_for: ms(1_500),
            accordion_check_interval: ms(250),
            accordion_body_timeout: ms(4_000),
            accordion_section_settle: ms(600),

            dropdown_attempts: 4,
            dropdown_open_timeout: ms(2_500),
            option_timeout: ms(8_000),
            menu_close_timeout: ms(3_000),
            metric_confirm_timeout: ms(10_000),
            fingerprint_interval: ms(150),
            menu_after_select: ms(900),
            bounce_pause: ms(400),
            retry_pause: ms(600),
            hover_clear_pause: ms(150),
            dupe_attempts: 3,

            filter_open_attempts: 4,
            filter_open_timeout: ms(3_000),
            filter_control_timeout: ms(15_000),
            chip_pause: ms(120),
            overview_timeout: ms(30_000),
        }
    }
}

impl Timings {
    pub fn from_env() -> Self {
        let mut t = Self::default();
        override_ms("ACCORDION_DISCOVERY_TIMEOUT_MS", &mut t.accordion_discovery_timeout);
        override_ms("ACCORDION_STABLE_FOR_MS", &mut t.accordion_stable_for);
        override_ms("ACCORDION_CHECK_INTERVAL_MS", &mut t.accordion_check_interval);
        override_ms("ACCORDION_SECTION_SETTLE_MS", &mut t.accordion_section_settle);
        override_ms("MODAL_MOUNT_WAIT_MS", &mut t.modal_mount_wait);
        override_ms("MENU_AFTER_SELECT_MS", &mut t.menu_after_select);
        override_ms("PAGE_SETTLE_MS", &mut t.page_settle);
        t
    }
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn override_ms(key: &str, slot: &mut Duration) {
    if let Some(v) = env::var(key).ok().and_then(|s| s.parse::<u64>().ok()) {
        *slot = ms(v);
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

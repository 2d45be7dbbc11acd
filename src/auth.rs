// src/auth.rs
use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::browser::{Browser, ClickAt, SessionState};
use crate::config::Config;
use crate::error::RunError;
use crate::page::Page;
use crate::poll::Clock;
use crate::selectors;

/// Logs in, or reuses the session stored in `auth_file`.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pub base_url: String,
    pub auth_file: PathBuf,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl SessionManager {
    pub fn new(cfg: &Config) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            auth_file: cfg.auth_file.clone(),
            email: cfg.email.clone(),
            password: cfg.password.clone(),
        }
    }

    /// Leave the browser logged in with the profiles link visible.
    pub async fn ensure_session<B: Browser, C: Clock>(&self, page: &Page<B, C>) -> Result<()> {
        if self.auth_file.exists() {
            log::info!(target: "sess", "Loading saved auth state...");
            if self.try_restore(page).await? {
                log::info!(target: "sess", "Session OK.");
                return Ok(());
            }
            log::info!(target: "sess", "Session invalid. Re-authenticating...");
            if let Err(e) = std::fs::remove_file(&self.auth_file) {
                log::warn!(target: "sess", "could not remove {}: {e}", self.auth_file.display());
            }
            page.browser.clear_session().await?;
        }
        self.login(page).await?;
        self.save(page).await
    }

    async fn try_restore<B: Browser, C: Clock>(&self, page: &Page<B, C>) -> Result<bool> {
        let state = match self.load() {
            Ok(s) => s,
            Err(e) => {
                log::warn!(target: "sess", "unreadable auth state: {e:#}");
                return Ok(false);
            }
        };
        // cookies are only accepted for the current origin
        page.browser.goto(&self.base_url).await?;
        page.browser.restore_session_state(&state).await?;
        page.browser.reload().await?;
        Ok(page
            .wait_visible(&selectors::profiles_link(), page.timings.session_check_timeout)
            .await)
    }

    fn load(&self) -> Result<SessionState> {
        let raw = std::fs::read(&self.auth_file)
            .with_context(|| format!("read {}", self.auth_file.display()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn save<B: Browser, C: Clock>(&self, page: &Page<B, C>) -> Result<()> {
        let state = page.browser.session_state().await?;
        let body = serde_json::to_vec_pretty(&state)?;
        std::fs::write(&self.auth_file, body)
            .with_context(|| format!("write {}", self.auth_file.display()))?;
        log::info!(target: "sess", "saved auth state to {}", self.auth_file.display());
        Ok(())
    }

    pub async fn login<B: Browser, C: Clock>(&self, page: &Page<B, C>) -> Result<()> {
        let (Some(email), Some(password)) = (self.email.as_deref(), self.password.as_deref()) else {
            log::error!(target: "login", "EMAIL/PASSWORD must be set in .env");
            return Err(RunError::MissingCredentials.into());
        };
        let t = &page.timings;

        log::info!(target: "login", "Navigating...");
        page.browser.goto(&self.base_url).await?;

        let banner = selectors::cookie_banner_accept();
        if page.browser.is_visible(&banner).await.unwrap_or(false)
            && page.browser.click(&banner, ClickAt::Center).await.is_ok()
        {
            log::info!(target: "login", "Cookie banner accepted.");
        }

        for (what, field, value) in [
            ("email", selectors::email_input(), email),
            ("password", selectors::password_input(), password),
        ] {
            if !page.wait_visible(&field, t.login_field_timeout).await {
                return Err(RunError::LoginFailed(format!("{what} field never appeared")).into());
            }
            page.browser.fill(&field, value).await?;
            page.browser
                .click(&selectors::continue_button(), ClickAt::Center)
                .await
                .map_err(|e| RunError::LoginFailed(format!("{what} step: {e}")))?;
            log::info!(target: "login", "{} submitted.", capitalize(what));
        }

        if !page
            .wait_visible(&selectors::profiles_link(), t.login_success_timeout)
            .await
        {
            return Err(RunError::LoginFailed("profiles link never appeared".into()).into());
        }
        log::info!(target: "login", "Logged in.");
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// src/page.rs
use anyhow::Result;
use std::time::Duration;

use crate::browser::Browser;
use crate::config::Timings;
use crate::dom::Locator;
use crate::poll::{Clock, Deadline};

/// The single browser page driven by the run, with its clock and timings.
/// Everything that touches the UI goes through here, one call at a time.
pub struct Page<B, C> {
    pub browser: B,
    pub clock: C,
    pub timings: Timings,
}

impl<B: Browser, C: Clock> Page<B, C> {
    pub fn new(browser: B, clock: C, timings: Timings) -> Self {
        Self { browser, clock, timings }
    }

    pub async fn pause(&self, d: Duration) {
        self.clock.sleep(d).await;
    }

    /// Poll until `loc` is visible. Lookup errors count as "not yet".
    pub async fn wait_visible(&self, loc: &Locator, timeout: Duration) -> bool {
        let deadline = Deadline::after(&self.clock, timeout);
        loop {
            if self.browser.is_visible(loc).await.unwrap_or(false) {
                return true;
            }
            if deadline.expired(&self.clock) {
                return false;
            }
            self.clock.sleep(self.timings.poll_interval).await;
        }
    }

    pub async fn wait_hidden(&self, loc: &Locator, timeout: Duration) -> bool {
        let deadline = Deadline::after(&self.clock, timeout);
        loop {
            if !self.browser.is_visible(loc).await.unwrap_or(true) {
                return true;
            }
            if deadline.expired(&self.clock) {
                return false;
            }
            self.clock.sleep(self.timings.poll_interval).await;
        }
    }

    pub async fn wait_url_contains(&self, needle: &str, timeout: Duration) -> Result<bool> {
        let deadline = Deadline::after(&self.clock, timeout);
        loop {
            if self.browser.current_url().await?.contains(needle) {
                return Ok(true);
            }
            if deadline.expired(&self.clock) {
                return Ok(false);
            }
            self.clock.sleep(self.timings.poll_interval).await;
        }
    }

    pub async fn exists(&self, loc: &Locator) -> bool {
        self.browser.count(loc).await.map(|n| n > 0).unwrap_or(false)
    }

    /// Park the pointer at the top-left so hover tooltips vanish.
    pub async fn move_mouse_off_view(&self) {
        if self.browser.move_pointer(0, 0).await.is_ok() {
            self.clock.sleep(self.timings.hover_clear_pause).await;
        }
    }
}

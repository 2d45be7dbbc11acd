// src/modal.rs
use anyhow::Result;

use crate::browser::{Browser, ClickAt};
use crate::capture::AthleteCapture;
use crate::dom::Locator;
use crate::outcome::Outcome;
use crate::page::Page;
use crate::poll::{Clock, StabilityPolicy, StableCounter, Verdict};
use crate::selectors;
use crate::tile::{self, TileQuery};

const TAG: &str = "modal";

/// A tile whose detail view is a modal of accordion sections.
#[derive(Debug, Clone)]
pub struct ModalTile {
    pub prefix: String,
    pub query: TileQuery,
}

/// The open modal container, re-resolved on every use.
pub async fn modal_locator<B: Browser, C: Clock>(page: &Page<B, C>) -> Locator {
    if page.exists(&selectors::close_button()).await {
        selectors::modal_from_close_button()
    } else {
        selectors::modal_fallback()
    }
}

async fn modal_visible<B: Browser, C: Clock>(page: &Page<B, C>) -> Option<Locator> {
    let deadline = crate::poll::Deadline::after(&page.clock, page.timings.modal_open_attempt);
    loop {
        let modal = modal_locator(page).await;
        if page.browser.is_visible(&modal).await.unwrap_or(false) {
            return Some(modal);
        }
        if deadline.expired(&page.clock) {
            return None;
        }
        page.pause(page.timings.poll_interval).await;
    }
}

/// CLOSED → OPENING → OPEN. Tries each click target in turn, then Enter.
pub async fn open<B: Browser, C: Clock>(
    page: &Page<B, C>,
    tile: &Locator,
    testid: &str,
) -> Result<Outcome<Locator>> {
    if let Err(e) = page.browser.scroll_into_view(tile).await {
        log::debug!(target: TAG, "scroll to tile failed: {e}");
    }

    let inner = selectors::tile_inner(tile, testid);
    let heading = selectors::tile_heading(tile);
    let corner = ClickAt::Offset { x: 18.0, y: 18.0 };
    let attempts: [(&str, &Locator, ClickAt); 5] = [
        ("tile center", tile, ClickAt::Center),
        ("tile top-left", tile, corner),
        ("inner center", &inner, ClickAt::Center),
        ("inner top-left", &inner, corner),
        ("heading", &heading, ClickAt::Center),
    ];

    for (label, target, at) in attempts {
        if let Err(e) = page.browser.click(target, at).await {
            log::debug!(target: TAG, "click via {label} failed: {e}");
        }
        if let Some(modal) = modal_visible(page).await {
            page.pause(page.timings.modal_mount_wait).await;
            log::info!(target: TAG, "opened via {label}");
            return Ok(Outcome::Ok(modal));
        }
    }

    if let Err(e) = page.browser.press_enter(tile).await {
        log::debug!(target: TAG, "enter on tile failed: {e}");
    }
    if let Some(modal) = modal_visible(page).await {
        page.pause(page.timings.modal_mount_wait).await;
        log::info!(target: TAG, "opened via Enter");
        return Ok(Outcome::Ok(modal));
    }

    Ok(Outcome::TimedOut)
}

/// Scroll the modal top to bottom so lazy sections mount, then back up.
async fn preload<B: Browser, C: Clock>(page: &Page<B, C>, modal: &Locator) {
    let pause = page.timings.preload_pause;
    let steps = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
    for f in steps {
        if page.browser.scroll_fraction(modal, f).await.is_err() {
            return;
        }
        page.pause(pause).await;
    }
    let _ = page.browser.scroll_fraction(modal, 0.0).await;
    page.pause(pause).await;
}

/// Poll the accordion count until it holds still or discovery times out.
pub async fn settle_section_count<B: Browser, C: Clock>(page: &Page<B, C>, modal: &Locator) -> usize {
    let t = &page.timings;
    let policy = StabilityPolicy {
        max_wait: t.accordion_discovery_timeout,
        stable_for: t.accordion_stable_for,
        interval: t.accordion_check_interval,
    };
    let sections = selectors::accordions(modal);
    let mut tracker = StableCounter::new(policy, page.clock.now());
    loop {
        let n = page.browser.count(&sections).await.unwrap_or(0);
        match tracker.observe(n, page.clock.now()) {
            Verdict::Pending => page.pause(tracker.policy().interval).await,
            Verdict::Stable(n) => return n,
            Verdict::Expired(n) => {
                log::warn!(target: TAG, "section count did not settle (last seen {n})");
                return n;
            }
        }
    }
}

/// OPEN → CAPTURING(i). Returns the number of files written.
pub async fn capture_sections<B: Browser, C: Clock>(
    page: &Page<B, C>,
    modal: &Locator,
    cap: &mut AthleteCapture,
    prefix: &str,
) -> Result<u32> {
    preload(page, modal).await;

    let total = settle_section_count(page, modal).await;
    if total == 0 {
        log::info!(target: TAG, "no accordions detected; single modal shot as fallback");
        let png = page.browser.screenshot(modal).await?;
        let path = cap.write(prefix, &png)?;
        log::info!(target: "shot", "{}", file_name(&path));
        return Ok(1);
    }
    log::info!(target: TAG, "{prefix}: found {total} accordion sections (stable)");

    let _ = page.browser.move_pointer(5, 5).await;

    let mut took = 0;
    for i in 0..total {
        let section = selectors::accordions(modal).nth(i);
        match capture_one(page, &section, cap, prefix).await {
            Ok(path) => {
                took += 1;
                log::info!(target: "shot", "{} (accordion {}/{total})", file_name(&path), i + 1);
            }
            Err(e) => log::warn!(target: "shot", "skip accordion {}: {e}", i + 1),
        }
    }
    Ok(took)
}

async fn capture_one<B: Browser, C: Clock>(
    page: &Page<B, C>,
    section: &Locator,
    cap: &mut AthleteCapture,
    prefix: &str,
) -> Result<std::path::PathBuf> {
    let t = &page.timings;
    page.wait_visible(&selectors::accordion_body(section), t.accordion_body_timeout).await;
    page.browser.scroll_into_view(section).await?;
    page.pause(t.accordion_section_settle).await;
    let png = page.browser.screenshot(section).await?;
    cap.write(prefix, &png)
}

/// CLOSING → CLOSED. A close that never confirms is reported, not raised.
pub async fn close<B: Browser, C: Clock>(page: &Page<B, C>, modal: &Locator) -> Result<Outcome<()>> {
    log::info!(target: TAG, "closing...");
    let btn = selectors::modal_close_control(modal);
    if page.browser.is_visible(&btn).await.unwrap_or(false) {
        page.browser.click(&btn, ClickAt::Center).await?;
    } else {
        page.browser.click_at(10, 10).await?;
    }
    if page.wait_hidden(modal, page.timings.modal_close_timeout).await {
        log::info!(target: TAG, "closed");
        Ok(Outcome::Ok(()))
    } else {
        log::warn!(target: TAG, "close check timed out; continuing");
        Ok(Outcome::TimedOut)
    }
}

/// Locate, open, capture and close one modal tile.
pub async fn capture_tile<B: Browser, C: Clock>(
    page: &Page<B, C>,
    step: &ModalTile,
    cap: &mut AthleteCapture,
) -> Result<Outcome<u32>> {
    let tile = match tile::locate(page, &step.query).await? {
        Outcome::Ok(t) => t,
        _ => return Ok(Outcome::NotFound),
    };
    let modal = match open(page, &tile, &step.query.testid).await? {
        Outcome::Ok(m) => m,
        _ => {
            log::warn!(target: TAG, "could not open modal for {}", step.prefix);
            return Ok(Outcome::TimedOut);
        }
    };

    let shots = capture_sections(page, &modal, cap, &step.prefix).await;
    // Always try to close, even when capture failed.
    let closed = close(page, &modal).await;
    let shots = shots?;
    if let Err(e) = closed {
        log::warn!(target: TAG, "(warn) close failed for {}: {e:#}", step.prefix);
    }
    Ok(Outcome::Ok(shots))
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

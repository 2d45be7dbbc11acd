// src/tile.rs
use anyhow::Result;

use crate::browser::Browser;
use crate::dom::{Locator, TextMatch};
use crate::outcome::Outcome;
use crate::page::Page;
use crate::poll::Clock;
use crate::selectors::{self, HEADING};

const TAG: &str = "tile";

/// What identifies a tile on the overview page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileQuery {
    /// Value of the inner `data-testid`, e.g. `nordbord-tile`.
    pub testid: String,
    /// Value of `data-test-name`, when the tile carries one.
    pub test_name: Option<String>,
    /// Heading text shown in the tile.
    pub title: Option<String>,
}

impl TileQuery {
    pub fn testid(testid: &str) -> Self {
        Self { testid: testid.into(), test_name: None, title: None }
    }

    pub fn named(testid: &str, name: &str) -> Self {
        Self { testid: testid.into(), test_name: Some(name.into()), title: Some(name.into()) }
    }

    pub fn titled(testid: &str, title: &str) -> Self {
        Self { testid: testid.into(), test_name: None, title: Some(title.into()) }
    }

    pub fn describe(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.testid)
    }
}

/// Candidate locators in order of preference.
pub fn strategies(q: &TileQuery) -> Vec<Locator> {
    let mut out = Vec::new();

    if let Some(name) = &q.test_name {
        out.push(selectors::tile_with_test_name(&q.testid, name));
    } else if q.title.is_none() {
        out.push(selectors::tiles_with_testid(&q.testid).first());
    }

    if let Some(title) = &q.title {
        let by_attr = selectors::tiles_with_testid(&q.testid);
        out.push(by_attr.clone().has_text_in(HEADING, TextMatch::Normalized(title.clone())).first());
        out.push(by_attr.has_text_in(HEADING, TextMatch::Contains(title.clone())).first());

        let any = selectors::any_tile();
        out.push(any.clone().has_text_in(HEADING, TextMatch::Normalized(title.clone())).first());
        out.push(any.has_text_in(HEADING, TextMatch::Contains(title.clone())).first());
    }

    out
}

async fn first_visible<B: Browser, C: Clock>(page: &Page<B, C>, cands: &[Locator]) -> Option<Locator> {
    for loc in cands {
        if page.browser.is_visible(loc).await.unwrap_or(false) {
            return Some(loc.clone());
        }
    }
    None
}

/// Find the tile, scroll-scanning the page to trigger lazy mounting when no
/// strategy matches right away.
pub async fn locate<B: Browser, C: Clock>(page: &Page<B, C>, q: &TileQuery) -> Result<Outcome<Locator>> {
    let cands = strategies(q);
    if let Some(loc) = first_visible(page, &cands).await {
        return Ok(Outcome::Ok(loc));
    }

    let t = &page.timings;
    for step in 1..=t.tile_scroll_steps {
        page.browser.scroll_page_by(t.tile_scroll_px).await?;
        page.pause(t.tile_scroll_settle).await;
        if let Some(loc) = first_visible(page, &cands).await {
            log::debug!(target: TAG, "'{}' mounted after {step} scroll step(s)", q.describe());
            return Ok(Outcome::Ok(loc));
        }
    }

    page.browser.scroll_page_to_top().await?;
    log::warn!(
        target: TAG,
        "'{}' not found after {} scroll steps",
        q.describe(),
        t.tile_scroll_steps
    );
    Ok(Outcome::NotFound)
}

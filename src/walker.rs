// src/walker.rs
use anyhow::{bail, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::athlete::{self, CaptureStep};
use crate::browser::{Browser, ClickAt};
use crate::capture::sanitize_filename;
use crate::config::{Config, TeamSelection};
use crate::dom::Locator;
use crate::error::RunError;
use crate::page::Page;
use crate::poll::Clock;
use crate::selectors;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkReport {
    pub teams: u32,
    pub athletes: u32,
    pub skipped: u32,
    pub images: u32,
}

/// Placeholder rows carry digits in the display name.
pub fn is_test_profile(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_digit())
}

pub fn select_by_prefix(options: &[String], prefix: &str) -> Vec<String> {
    options.iter().filter(|o| o.starts_with(prefix)).cloned().collect()
}

/// Get onto the profiles list, or fail the run.
pub async fn ensure_profiles_page<B: Browser, C: Clock>(page: &Page<B, C>, base_url: &str) -> Result<()> {
    let t = &page.timings;
    if !page.browser.current_url().await?.contains("/app/profiles") {
        let link = selectors::profiles_link();
        if page.browser.click(&link, ClickAt::Center).await.is_err() {
            log::info!(target: "nav", "profiles link not on page; reloading {base_url}");
            page.browser.goto(base_url).await?;
            if page.wait_visible(&link, t.session_check_timeout).await {
                page.browser.click(&link, ClickAt::Center).await?;
            }
        }
    }
    if !page.wait_url_contains("/app/profiles", t.url_timeout).await? {
        let url = page.browser.current_url().await?;
        return Err(RunError::ProfilesPageUnreachable { url }.into());
    }
    page.pause(t.page_settle).await;
    Ok(())
}

async fn open_groups_dropdown<B: Browser, C: Clock>(page: &Page<B, C>, base_url: &str) -> Result<()> {
    let t = &page.timings;
    ensure_profiles_page(page, base_url).await?;
    page.browser.scroll_page_to_top().await?;

    let control = selectors::filter_control();
    let menu = selectors::filter_menu();
    if !page.wait_visible(&control, t.filter_control_timeout).await {
        bail!("groups filter not visible");
    }
    for _ in 0..t.filter_open_attempts {
        let _ = page.browser.click(&control, ClickAt::Center).await;
        if page.wait_visible(&menu, t.filter_open_timeout).await {
            return Ok(());
        }
        page.pause(t.short_pause).await;
    }
    page.browser.click(&control, ClickAt::Offset { x: 10.0, y: 10.0 }).await?;
    if page.wait_visible(&menu, t.filter_open_timeout).await {
        return Ok(());
    }
    bail!("groups dropdown did not open")
}

/// Remove every selected chip from the filter.
async fn clear_chips<B: Browser, C: Clock>(page: &Page<B, C>) {
    let chip = selectors::filter_chip_remove();
    // one chip per click; bounded in case a chip never detaches
    for _ in 0..50 {
        if !page.exists(&chip).await {
            return;
        }
        if page.browser.click(&chip, ClickAt::Center).await.is_err() {
            return;
        }
        page.pause(page.timings.chip_pause).await;
    }
}

/// Labels of the options in the open dropdown.
async fn list_options<B: Browser, C: Clock>(page: &Page<B, C>) -> Vec<String> {
    let options = selectors::filter_options();
    let n = page.browser.count(&options).await.unwrap_or(0);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        if let Ok(text) = page.browser.inner_text(&options.clone().nth(i)).await {
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
    }
    out
}

pub async fn resolve_teams<B: Browser, C: Clock>(
    page: &Page<B, C>,
    base_url: &str,
    selection: &TeamSelection,
) -> Result<Vec<String>> {
    match selection {
        TeamSelection::List(names) => {
            log::info!(target: "filter", "Explicit list -> {} teams", names.len());
            Ok(names.clone())
        }
        TeamSelection::Prefix(prefix) => {
            log::info!(target: "filter", "Selecting teams by prefix: '{prefix}'");
            open_groups_dropdown(page, base_url).await?;
            let teams = select_by_prefix(&list_options(page).await, prefix);
            // leave the menu closed for the walk
            let _ = page.browser.click(&selectors::body(), ClickAt::Offset { x: 5.0, y: 5.0 }).await;
            if teams.is_empty() {
                return Err(RunError::NoTeamsMatched(prefix.clone()).into());
            }
            log::info!(target: "filter", "Prefix={prefix} -> {} teams resolved", teams.len());
            Ok(teams)
        }
    }
}

/// The option carrying exactly `label`, scanning by index when the text
/// predicate does not resolve.
async fn find_option<B: Browser, C: Clock>(page: &Page<B, C>, label: &str) -> Option<Locator> {
    let exact = selectors::filter_option_exact(label);
    if page.exists(&exact).await {
        return Some(exact);
    }
    let options = selectors::filter_options();
    let n = page.browser.count(&options).await.unwrap_or(0);
    for i in 0..n {
        let opt = options.clone().nth(i);
        if let Ok(text) = page.browser.inner_text(&opt).await {
            if text.trim() == label {
                return Some(opt);
            }
        }
    }
    None
}

async fn set_filter_to_single_team<B: Browser, C: Clock>(page: &Page<B, C>, base_url: &str, team: &str) -> Result<()> {
    log::info!(target: "filter", "Setting filter to single team: {team}");
    clear_chips(page).await;
    open_groups_dropdown(page, base_url).await?;
    let Some(option) = find_option(page, team).await else {
        bail!("option not found: {team}");
    };
    page.browser.scroll_into_view(&option).await?;
    page.browser.click(&option, ClickAt::Center).await?;
    page.browser.click(&selectors::body(), ClickAt::Offset { x: 5.0, y: 5.0 }).await?;
    page.pause(page.timings.page_settle).await;
    Ok(())
}

/// Clear the team filter so the next selection starts from nothing.
async fn clear_selected_team<B: Browser, C: Clock>(page: &Page<B, C>, base_url: &str) -> Result<()> {
    ensure_profiles_page(page, base_url).await?;
    let control = selectors::filter_control();
    if !page.exists(&control).await {
        return Ok(());
    }
    // the indicator only renders once the control is hovered or focused
    let _ = page.browser.click(&control, ClickAt::Center).await;

    let clear = selectors::filter_clear_indicator();
    if page.exists(&clear).await {
        page.browser.click(&clear, ClickAt::Center).await?;
        page.pause(page.timings.page_settle).await;
    }
    clear_chips(page).await;
    Ok(())
}

/// Drives the profiles table team by team.
pub struct Walker {
    pub base_url: String,
    pub output_dir: PathBuf,
    pub checklist: Vec<CaptureStep>,
}

impl Walker {
    pub fn new(cfg: &Config) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            output_dir: cfg.output_dir.clone(),
            checklist: athlete::default_checklist(),
        }
    }

    pub async fn run<B: Browser, C: Clock>(&self, page: &Page<B, C>, selection: &TeamSelection) -> Result<WalkReport> {
        ensure_profiles_page(page, &self.base_url).await?;
        let teams = resolve_teams(page, &self.base_url, selection).await?;

        let mut report = WalkReport::default();
        for (idx, team) in teams.iter().enumerate() {
            log::info!(target: "team", "[{}/{}] {team}", idx + 1, teams.len());
            ensure_profiles_page(page, &self.base_url).await?;
            if let Err(e) = set_filter_to_single_team(page, &self.base_url, team).await {
                log::error!(target: "filter", "could not select '{team}': {e:#}");
                if let Err(e) = clear_selected_team(page, &self.base_url).await {
                    log::warn!(target: "filter", "(warn) could not clear filter: {e:#}");
                }
                continue;
            }

            let team_dir = self.output_dir.join(sanitize_filename(team));
            self.walk_team(page, team, &team_dir, &mut report).await?;
            report.teams += 1;
            log::info!(target: "team", "Team complete: {team}");

            match clear_selected_team(page, &self.base_url).await {
                Ok(()) => log::info!(target: "filter", "Cleared team selection"),
                Err(e) => log::warn!(target: "filter", "(warn) could not clear filter: {e:#}"),
            }
        }

        log::info!(
            target: "done",
            "All teams processed: {} teams, {} athletes, {} images",
            report.teams,
            report.athletes,
            report.images
        );
        Ok(report)
    }

    async fn walk_team<B: Browser, C: Clock>(
        &self,
        page: &Page<B, C>,
        team: &str,
        team_dir: &Path,
        report: &mut WalkReport,
    ) -> Result<()> {
        let t = &page.timings;
        let mut processed: HashSet<String> = HashSet::new();

        loop {
            let nrows = page.browser.count(&selectors::table_rows()).await?;
            log::info!(target: "table", "{nrows} rows for team '{team}' on this page");

            for i in 0..nrows {
                let row = selectors::row(i);
                let Ok(raw) = page.browser.inner_text(&selectors::row_name_cell(&row)).await else {
                    continue;
                };
                let name = raw.trim();
                if is_test_profile(name) {
                    log::info!(target: "table", "Skip test profile: {name}");
                    report.skipped += 1;
                    continue;
                }
                let safe = sanitize_filename(name);
                if processed.contains(&safe) {
                    log::info!(target: "table", "Skip already processed: {safe}");
                    continue;
                }

                log::info!(target: "nav", "Opening athlete overview for {safe}...");
                let opened = page.browser.click(&selectors::row_open_link(&row), ClickAt::Center).await.is_ok()
                    && page.wait_url_contains("/overview", t.overview_timeout).await?;
                if !opened {
                    log::warn!(target: "nav", "(warn) overview for '{safe}' did not open; skipping");
                    report.skipped += 1;
                    ensure_profiles_page(page, &self.base_url).await?;
                    continue;
                }
                page.pause(t.short_pause).await;

                match athlete::capture_athlete(page, &team_dir.join(&safe), name, &self.checklist).await {
                    Ok(done) => {
                        report.athletes += 1;
                        report.images += done.images;
                        processed.insert(safe);
                    }
                    Err(e) => log::error!(target: "flow", "While capturing '{safe}': {e:#}"),
                }

                log::info!(target: "nav", "Back to profiles list...");
                page.browser.back().await?;
                ensure_profiles_page(page, &self.base_url).await?;
            }

            let next = selectors::next_page();
            if !page.browser.is_enabled(&next).await.unwrap_or(false) {
                log::info!(target: "table", "Last page reached for team '{team}'");
                return Ok(());
            }
            log::info!(target: "table", "Next page...");
            page.browser.click(&next, ClickAt::Center).await?;
            page.pause(t.page_settle).await;
        }
    }
}

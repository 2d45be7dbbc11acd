// src/metric.rs
use anyhow::{bail, Result};

use crate::browser::{Browser, ClickAt};
use crate::capture::{AthleteCapture, Fingerprint, Written};
use crate::dom::Locator;
use crate::outcome::Outcome;
use crate::page::Page;
use crate::poll::{Clock, Deadline};
use crate::selectors;
use crate::tile::{self, TileQuery};

const TAG: &str = "card";

/// A tile whose chart is switched through a metric dropdown.
#[derive(Debug, Clone)]
pub struct MetricTile {
    pub prefix: String,
    pub query: TileQuery,
    pub labels: Vec<String>,
}

/// Distinctive part of a metric label, used to recognise it in the
/// (possibly truncated) dropdown button.
pub fn short_token_for_label(label: &str) -> String {
    for token in TOKENS {
        if label.contains(token) {
            return token.to_string();
        }
    }
    label.chars().take(24).collect()
}

const TOKENS: [&str; 3] = ["Ankle Dorsiflexion", "Hip Adduction", "Peak Knee Flexion"];

/// Whether the button text names `label` and no other metric. The knee
/// token also occurs inside the hip and ankle labels, so a token hit only
/// counts when no token foreign to `label` is present.
fn button_shows(text: &str, label: &str) -> bool {
    let text = text.to_lowercase();
    if !text.contains(&short_token_for_label(label).to_lowercase()) {
        return false;
    }
    !TOKENS
        .iter()
        .filter(|tok| !label.contains(**tok))
        .any(|tok| text.contains(&tok.to_lowercase()))
}

/// Most specific chart node present in the tile, else the tile itself.
async fn chart_locator<B: Browser, C: Clock>(page: &Page<B, C>, tile: &Locator) -> Locator {
    for cand in selectors::chart_candidates(tile) {
        if page.exists(&cand).await {
            return cand;
        }
    }
    tile.clone()
}

async fn chart_fingerprint<B: Browser, C: Clock>(page: &Page<B, C>, tile: &Locator) -> Option<Fingerprint> {
    let chart = chart_locator(page, tile).await;
    page.browser.screenshot(&chart).await.ok().map(|png| Fingerprint::of(&png))
}

async fn open_menu<B: Browser, C: Clock>(page: &Page<B, C>, tile: &Locator) -> Result<Locator> {
    let t = &page.timings;
    let btn = selectors::metric_button(tile);
    let menu = selectors::metric_menu(tile);
    page.browser.scroll_into_view(&btn).await?;

    for attempt in 1..=t.dropdown_attempts {
        if let Err(e) = page.browser.click(&btn, ClickAt::Center).await {
            log::debug!(target: TAG, "dropdown click {attempt} failed: {e}");
        }
        if page.wait_visible(&menu, t.dropdown_open_timeout).await {
            return Ok(menu);
        }
    }

    page.browser.click(&btn, ClickAt::Offset { x: 10.0, y: 10.0 }).await?;
    if page.wait_visible(&menu, t.dropdown_open_timeout).await {
        return Ok(menu);
    }
    bail!("metric dropdown did not open")
}

/// Open the dropdown and click the option whose text is exactly `label`.
async fn select_label<B: Browser, C: Clock>(page: &Page<B, C>, tile: &Locator, label: &str) -> Result<()> {
    let t = &page.timings;
    let menu = open_menu(page, tile).await?;
    let option = selectors::metric_option(&menu, label);
    if !page.wait_visible(&option, t.option_timeout).await {
        bail!("no menu item '{label}'");
    }
    page.browser.scroll_into_view(&option).await?;
    page.browser.click(&option, ClickAt::Center).await?;
    if !page.wait_hidden(&menu, t.menu_close_timeout).await {
        log::debug!(target: TAG, "menu still open after selecting '{label}'");
    }
    Ok(())
}

/// Wait until either the button shows the label or the chart changed.
async fn confirm<B: Browser, C: Clock>(
    page: &Page<B, C>,
    tile: &Locator,
    label: &str,
    before: Option<Fingerprint>,
) -> Outcome<()> {
    let t = &page.timings;
    let button_text = selectors::metric_button_label(tile);
    let deadline = Deadline::after(&page.clock, t.metric_confirm_timeout);
    loop {
        if let Ok(text) = page.browser.inner_text(&button_text).await {
            if button_shows(&text, label) {
                return Outcome::Ok(());
            }
        }
        if let Some(before) = before {
            if chart_fingerprint(page, tile).await.is_some_and(|now| now != before) {
                return Outcome::Ok(());
            }
        }
        if deadline.expired(&page.clock) {
            return Outcome::TimedOut;
        }
        page.pause(t.fingerprint_interval).await;
    }
}

/// Select `label` and wait for the switch to show.
pub async fn select_and_confirm<B: Browser, C: Clock>(
    page: &Page<B, C>,
    tile: &Locator,
    label: &str,
) -> Result<Outcome<()>> {
    let before = chart_fingerprint(page, tile).await;
    select_label(page, tile, label).await?;
    Ok(confirm(page, tile, label, before).await)
}

/// Switch to another metric and back, to force a fresh render.
async fn bounce<B: Browser, C: Clock>(
    page: &Page<B, C>,
    tile: &Locator,
    labels: &[String],
    label: &str,
) -> Result<Outcome<()>> {
    if let Some(other) = labels.iter().find(|l| l.as_str() != label) {
        log::info!(target: TAG, "bouncing via '{other}'");
        match select_label(page, tile, other).await {
            Ok(()) => page.pause(page.timings.bounce_pause).await,
            Err(e) => log::warn!(target: TAG, "bounce via '{other}' failed: {e}; reselecting anyway"),
        }
    }
    select_and_confirm(page, tile, label).await
}

/// Locate the tile and write one unique screenshot per label.
pub async fn capture_tile<B: Browser, C: Clock>(
    page: &Page<B, C>,
    step: &MetricTile,
    cap: &mut AthleteCapture,
) -> Result<Outcome<u32>> {
    let t = &page.timings;
    let tile = match tile::locate(page, &step.query).await? {
        Outcome::Ok(t) => t,
        _ => return Ok(Outcome::NotFound),
    };

    let mut taken = 0;
    for label in &step.labels {
        log::info!(target: TAG, "{}: selecting '{label}'", step.query.describe());
        let mut written = false;

        for attempt in 1..=t.dupe_attempts {
            let picked = if attempt == 1 {
                select_and_confirm(page, &tile, label).await
            } else {
                bounce(page, &tile, &step.labels, label).await
            };
            match picked {
                Ok(Outcome::Ok(())) => {}
                Ok(_) => log::warn!(target: TAG, "'{label}' not confirmed; capturing anyway"),
                Err(e) => {
                    log::warn!(target: TAG, "select '{label}' (attempt {attempt}) failed: {e}");
                    page.pause(t.retry_pause).await;
                    continue;
                }
            }
            page.pause(t.menu_after_select).await;
            page.move_mouse_off_view().await;

            let png = match page.browser.screenshot(&tile).await {
                Ok(png) => png,
                Err(e) => {
                    log::warn!(target: TAG, "screenshot for '{label}' failed: {e}");
                    page.pause(t.retry_pause).await;
                    continue;
                }
            };
            match cap.write_unique(&step.prefix, &png)? {
                Written::New(path) => {
                    log::info!(target: "shot", "{}", path.display());
                    taken += 1;
                    written = true;
                    break;
                }
                Written::Duplicate(fp) => {
                    log::info!(target: TAG, "'{label}' rendered a previous chart ({fp}), attempt {attempt}");
                }
            }
        }

        if !written {
            log::warn!(target: TAG, "(skip) '{label}': no unique render after {} attempts", t.dupe_attempts);
        }
    }

    log::info!(target: TAG, "{}: done ({taken} shots)", step.query.describe());
    Ok(Outcome::Ok(taken))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_page, FakeBrowser, Op};
    use std::cell::Cell;
    use std::rc::Rc;

    const KNEE: &str = "Avg Peak Knee Flexion - Left & Right";
    const HIP: &str = "Avg Hip Adduction at Peak Knee Flexion - Left & Right";

    fn lunge() -> MetricTile {
        MetricTile {
            prefix: "Lunge".into(),
            query: TileQuery::titled("humantrak-tile", "Lunge"),
            labels: vec![KNEE.into(), HIP.into()],
        }
    }

    /// A dropdown whose options update the button label and, via `render`,
    /// the tile image.
    fn script_dropdown(fake: &FakeBrowser, render: impl Fn(&str) -> Vec<u8> + 'static) -> Locator {
        script_menu(fake, &[KNEE, HIP], render)
    }

    /// Like `script_dropdown`, offering only `offered` in the menu.
    fn script_menu(
        fake: &FakeBrowser,
        offered: &[&'static str],
        render: impl Fn(&str) -> Vec<u8> + 'static,
    ) -> Locator {
        let tile = tile::strategies(&lunge().query)[0].clone();
        fake.set_count(&tile, 1);
        let btn = selectors::metric_button(&tile);
        let menu = selectors::metric_menu(&tile);
        fake.set_count(&btn, 1);
        let m = menu.clone();
        fake.on_click(&btn, move |s| s.set_count(&m, 1));

        let render = Rc::new(render);
        for &label in offered {
            let opt = selectors::metric_option(&menu, label);
            fake.set_count(&opt, 1);
            let (m, t, render) = (menu.clone(), tile.clone(), render.clone());
            let span = selectors::metric_button_label(&tile);
            fake.on_click(&opt, move |s| {
                s.set_count(&m, 0);
                s.set_text(&span, label);
                s.set_shot(&t, &(*render)(label));
            });
        }
        tile
    }

    #[test]
    fn short_tokens_pick_the_distinctive_phrase() {
        assert_eq!(short_token_for_label(KNEE), "Peak Knee Flexion");
        assert_eq!(short_token_for_label(HIP), "Hip Adduction");
        assert_eq!(
            short_token_for_label("Avg Ankle Dorsiflexion at Peak Knee Flexion - Left & Right"),
            "Ankle Dorsiflexion"
        );
        assert_eq!(short_token_for_label("Trunk Lean Left Right Average"), "Trunk Lean Left Right Av");
    }

    #[test]
    fn knee_token_inside_another_label_is_not_a_match() {
        assert!(button_shows(KNEE, KNEE));
        assert!(button_shows("Avg Peak Knee Flexion - Le...", KNEE));
        assert!(!button_shows(HIP, KNEE));
        assert!(!button_shows("Avg Ankle Dorsiflexion at Peak Knee Flexion - Left & Right", KNEE));
        assert!(button_shows(HIP, HIP));
        assert!(!button_shows(KNEE, HIP));
    }

    #[tokio::test]
    async fn knee_is_not_confirmed_while_the_button_still_shows_hip() {
        let (page, fake) = fake_page();
        let tile = tile::strategies(&lunge().query)[0].clone();
        fake.set_count(&tile, 1);
        let span = selectors::metric_button_label(&tile);
        fake.set_count(&span, 1);
        fake.set_text(&span, HIP);
        let before = chart_fingerprint(&page, &tile).await;

        assert_eq!(confirm(&page, &tile, KNEE, before).await, Outcome::TimedOut);
        assert!(page.clock.now() >= page.timings.metric_confirm_timeout);

        fake.set_text(&span, KNEE);
        assert_eq!(confirm(&page, &tile, KNEE, before).await, Outcome::Ok(()));
    }

    #[tokio::test]
    async fn unconfirmed_switch_still_captures() {
        let (page, fake) = fake_page();
        let tile = tile::strategies(&lunge().query)[0].clone();
        fake.set_count(&tile, 1);
        fake.set_shot(&tile, b"default knee chart");
        let btn = selectors::metric_button(&tile);
        let menu = selectors::metric_menu(&tile);
        fake.set_count(&btn, 1);
        let m = menu.clone();
        fake.on_click(&btn, move |s| s.set_count(&m, 1));
        // the option closes the menu but neither the label nor the chart changes
        let opt = selectors::metric_option(&menu, KNEE);
        fake.set_count(&opt, 1);
        let m = menu.clone();
        fake.on_click(&opt, move |s| s.set_count(&m, 0));
        let dir = tempfile::tempdir().unwrap();
        let mut cap = AthleteCapture::new(dir.path()).unwrap();
        let step = MetricTile { labels: vec![KNEE.into()], ..lunge() };

        let got = capture_tile(&page, &step, &mut cap).await.unwrap();

        assert_eq!(got, Outcome::Ok(1));
        assert_eq!(std::fs::read(dir.path().join("Lunge_001.png")).unwrap(), b"default knee chart");
    }

    #[tokio::test]
    async fn failed_bounce_still_reselects_the_label() {
        let (page, fake) = fake_page();
        // the hip option is missing, so switching away fails
        let tile = script_menu(&fake, &[KNEE], |label| label.as_bytes().to_vec());
        let labels: Vec<String> = vec![KNEE.into(), HIP.into()];

        let got = bounce(&page, &tile, &labels, KNEE).await.unwrap();

        assert_eq!(got, Outcome::Ok(()));
        let knee = selectors::metric_option(&selectors::metric_menu(&tile), KNEE);
        assert_eq!(fake.clicks_on(&knee), 1);
    }

    #[tokio::test]
    async fn distinct_renders_give_one_file_per_label() {
        let (page, fake) = fake_page();
        script_dropdown(&fake, |label| label.as_bytes().to_vec());
        let dir = tempfile::tempdir().unwrap();
        let mut cap = AthleteCapture::new(dir.path()).unwrap();

        let got = capture_tile(&page, &lunge(), &mut cap).await.unwrap();

        assert_eq!(got, Outcome::Ok(2));
        assert!(dir.path().join("Lunge_002.png").exists());
    }

    #[tokio::test]
    async fn identical_renders_bounce_and_never_write_a_duplicate() {
        let (page, fake) = fake_page();
        let tile = script_dropdown(&fake, |_| b"same chart".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let mut cap = AthleteCapture::new(dir.path()).unwrap();

        let got = capture_tile(&page, &lunge(), &mut cap).await.unwrap();

        assert_eq!(got, Outcome::Ok(1));
        assert!(!dir.path().join("Lunge_002.png").exists());
        let knee = Op::Click(selectors::metric_option(&selectors::metric_menu(&tile), KNEE));
        // once for itself, then once per bounce of the second label
        let knee_clicks = fake.ops().iter().filter(|op| **op == knee).count();
        assert_eq!(knee_clicks, 1 + (page.timings.dupe_attempts as usize - 1));
    }

    #[tokio::test]
    async fn bounce_recovers_a_stale_render() {
        let (page, fake) = fake_page();
        let hip_renders = Rc::new(Cell::new(0));
        let seen = hip_renders.clone();
        script_dropdown(&fake, move |label| {
            if label == HIP {
                seen.set(seen.get() + 1);
                // first switch shows the previous metric's chart
                if seen.get() == 1 {
                    return KNEE.as_bytes().to_vec();
                }
            }
            label.as_bytes().to_vec()
        });
        let dir = tempfile::tempdir().unwrap();
        let mut cap = AthleteCapture::new(dir.path()).unwrap();

        let got = capture_tile(&page, &lunge(), &mut cap).await.unwrap();

        assert_eq!(got, Outcome::Ok(2));
        assert_eq!(std::fs::read(dir.path().join("Lunge_002.png")).unwrap(), HIP.as_bytes());
        assert_eq!(hip_renders.get(), 2);
    }

    #[tokio::test]
    async fn dropdown_that_never_opens_skips_the_label() {
        let (page, fake) = fake_page();
        let tile = tile::strategies(&lunge().query)[0].clone();
        fake.set_count(&tile, 1);
        fake.set_count(&selectors::metric_button(&tile), 1);
        let dir = tempfile::tempdir().unwrap();
        let mut cap = AthleteCapture::new(dir.path()).unwrap();

        let got = capture_tile(&page, &lunge(), &mut cap).await.unwrap();

        assert_eq!(got, Outcome::Ok(0));
        assert_eq!(cap.total(), 0);
    }

    #[tokio::test]
    async fn missing_tile_is_not_found() {
        let (page, _fake) = fake_page();
        let dir = tempfile::tempdir().unwrap();
        let mut cap = AthleteCapture::new(dir.path()).unwrap();
        assert_eq!(capture_tile(&page, &lunge(), &mut cap).await.unwrap(), Outcome::NotFound);
    }
}

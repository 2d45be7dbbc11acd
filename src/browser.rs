// src/browser.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thirtyfour::prelude::*;
use thirtyfour::Cookie;

use crate::dom::{Filter, Locator, Pick, Selector};

/// Where to click inside an element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickAt {
    Center,
    /// Offset from the element's top-left corner, in CSS px.
    Offset { x: f64, y: f64 },
}

/// Persisted authentication state: cookies plus localStorage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<Value>,
    pub local_storage: BTreeMap<String, String>,
}

/// Browser automation primitives the capture engine is built on. Every
/// element argument is a descriptor; implementations resolve it afresh
/// on each call.
#[allow(async_fn_in_trait)]
pub trait Browser {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn back(&self) -> Result<()>;
    async fn reload(&self) -> Result<()>;

    async fn count(&self, loc: &Locator) -> Result<usize>;
    /// False when nothing matches.
    async fn is_visible(&self, loc: &Locator) -> Result<bool>;
    async fn is_enabled(&self, loc: &Locator) -> Result<bool>;

    async fn click(&self, loc: &Locator, at: ClickAt) -> Result<()>;
    async fn press_enter(&self, loc: &Locator) -> Result<()>;
    /// Click at viewport coordinates.
    async fn click_at(&self, x: i64, y: i64) -> Result<()>;
    async fn move_pointer(&self, x: i64, y: i64) -> Result<()>;

    async fn inner_text(&self, loc: &Locator) -> Result<String>;
    async fn fill(&self, loc: &Locator, text: &str) -> Result<()>;

    async fn scroll_into_view(&self, loc: &Locator) -> Result<()>;
    async fn scroll_page_by(&self, dy: i64) -> Result<()>;
    async fn scroll_page_to_top(&self) -> Result<()>;
    /// Scroll the element's own content to `fraction` of its scroll height.
    async fn scroll_fraction(&self, loc: &Locator, fraction: f64) -> Result<()>;

    /// PNG bytes of the element's bounding region.
    async fn screenshot(&self, loc: &Locator) -> Result<Vec<u8>>;

    async fn session_state(&self) -> Result<SessionState>;
    async fn restore_session_state(&self, state: &SessionState) -> Result<()>;
    async fn clear_session(&self) -> Result<()>;
}

/// `Browser` over a thirtyfour WebDriver session.
pub struct WebDriverBrowser {
    driver: WebDriver,
}

impl WebDriverBrowser {
    pub fn new(driver: WebDriver) -> Self {
        Self { driver }
    }

    async fn resolve(&self, loc: &Locator) -> Result<Vec<WebElement>> {
        let mut scope: Option<Vec<WebElement>> = None;
        for link in loc.chain() {
            let mut found = Vec::new();
            match &scope {
                None => found.extend(self.driver.find_all(by(link.selector())).await?),
                Some(parents) => {
                    for p in parents {
                        found.extend(p.find_all(by(link.selector())).await?);
                    }
                }
            }
            if let Some(filter) = link.filter() {
                let mut kept = Vec::with_capacity(found.len());
                for el in found {
                    if passes(&el, filter).await {
                        kept.push(el);
                    }
                }
                found = kept;
            }
            if let Pick::Nth(i) = link.pick() {
                found = found.into_iter().nth(i).into_iter().collect();
            }
            scope = Some(found);
        }
        Ok(scope.unwrap_or_default())
    }

    async fn one(&self, loc: &Locator) -> Result<WebElement> {
        self.resolve(loc)
            .await?
            .into_iter()
            .next()
            .with_context(|| format!("no element for {loc}"))
    }

    /// Viewport screenshot cropped to the element rect, for elements the
    /// driver refuses to capture directly.
    async fn cropped_screenshot(&self, el: &WebElement) -> Result<Vec<u8>> {
        let rect = el.rect().await?;
        let scale = self
            .driver
            .execute("return window.devicePixelRatio || 1;", vec![])
            .await?
            .json()
            .as_f64()
            .unwrap_or(1.0);
        let offsets = self
            .driver
            .execute("return [window.scrollX, window.scrollY];", vec![])
            .await?
            .json()
            .clone();
        let sx = offsets.get(0).and_then(Value::as_f64).unwrap_or(0.0);
        let sy = offsets.get(1).and_then(Value::as_f64).unwrap_or(0.0);

        let png = self.driver.screenshot_as_png().await?;
        let img = image::load_from_memory(&png).context("decode viewport screenshot")?;

        let x = (((rect.x - sx) * scale).max(0.0)) as u32;
        let y = (((rect.y - sy) * scale).max(0.0)) as u32;
        let w = ((rect.width * scale) as u32).min(img.width().saturating_sub(x));
        let h = ((rect.height * scale) as u32).min(img.height().saturating_sub(y));
        if w == 0 || h == 0 {
            bail!("element is outside the viewport");
        }

        let mut out = Vec::new();
        img.crop_imm(x, y, w, h)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageOutputFormat::Png)
            .context("encode cropped PNG")?;
        Ok(out)
    }
}

fn by(sel: &Selector) -> By {
    match sel {
        Selector::Css(s) => By::Css(s.as_str()),
        Selector::XPath(s) => By::XPath(s.as_str()),
    }
}

async fn passes(el: &WebElement, filter: &Filter) -> bool {
    match &filter.child {
        None => match el.text().await {
            Ok(t) => filter.text.matches(&t),
            Err(_) => false,
        },
        Some(child) => {
            let Ok(kids) = el.find_all(by(child)).await else {
                return false;
            };
            for k in kids {
                if let Ok(t) = k.text().await {
                    if filter.text.matches(&t) {
                        return true;
                    }
                }
            }
            false
        }
    }
}

impl Browser for WebDriverBrowser {
    async fn goto(&self, url: &str) -> Result<()> {
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn back(&self) -> Result<()> {
        self.driver.back().await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.driver.refresh().await?;
        Ok(())
    }

    async fn count(&self, loc: &Locator) -> Result<usize> {
        Ok(self.resolve(loc).await?.len())
    }

    async fn is_visible(&self, loc: &Locator) -> Result<bool> {
        match self.resolve(loc).await?.first() {
            Some(el) => Ok(el.is_displayed().await.unwrap_or(false)),
            None => Ok(false),
        }
    }

    async fn is_enabled(&self, loc: &Locator) -> Result<bool> {
        match self.resolve(loc).await?.first() {
            Some(el) => Ok(el.is_enabled().await.unwrap_or(false)),
            None => Ok(false),
        }
    }

    async fn click(&self, loc: &Locator, at: ClickAt) -> Result<()> {
        let el = self.one(loc).await?;
        match at {
            ClickAt::Center => el.click().await?,
            ClickAt::Offset { x, y } => {
                // W3C pointer offsets are measured from the element's center.
                let r = el.rect().await?;
                let dx = (x - r.width / 2.0).round() as i64;
                let dy = (y - r.height / 2.0).round() as i64;
                self.driver
                    .action_chain()
                    .move_to_element_with_offset(&el, dx, dy)
                    .click()
                    .perform()
                    .await?;
            }
        }
        Ok(())
    }

    async fn press_enter(&self, loc: &Locator) -> Result<()> {
        let el = self.one(loc).await?;
        self.driver
            .execute("arguments[0].focus();", vec![el.to_json()?])
            .await?;
        // U+E007 is the WebDriver Enter key.
        el.send_keys("\u{E007}").await?;
        Ok(())
    }

    async fn click_at(&self, x: i64, y: i64) -> Result<()> {
        self.driver.action_chain().move_to(x, y).click().perform().await?;
        Ok(())
    }

    async fn move_pointer(&self, x: i64, y: i64) -> Result<()> {
        self.driver.action_chain().move_to(x, y).perform().await?;
        Ok(())
    }

    async fn inner_text(&self, loc: &Locator) -> Result<String> {
        Ok(self.one(loc).await?.text().await?)
    }

    async fn fill(&self, loc: &Locator, text: &str) -> Result<()> {
        let el = self.one(loc).await?;
        el.clear().await?;
        el.send_keys(text).await?;
        Ok(())
    }

    async fn scroll_into_view(&self, loc: &Locator) -> Result<()> {
        self.one(loc).await?.scroll_into_view().await?;
        Ok(())
    }

    async fn scroll_page_by(&self, dy: i64) -> Result<()> {
        self.driver
            .execute("window.scrollBy(0, arguments[0]);", vec![json!(dy)])
            .await?;
        Ok(())
    }

    async fn scroll_page_to_top(&self) -> Result<()> {
        self.driver.execute("window.scrollTo(0, 0);", vec![]).await?;
        Ok(())
    }

    async fn scroll_fraction(&self, loc: &Locator, fraction: f64) -> Result<()> {
        let el = self.one(loc).await?;
        self.driver
            .execute(
                "arguments[0].scrollTo(0, arguments[0].scrollHeight * arguments[1]);",
                vec![el.to_json()?, json!(fraction)],
            )
            .await?;
        Ok(())
    }

    async fn screenshot(&self, loc: &Locator) -> Result<Vec<u8>> {
        let el = self.one(loc).await?;
        match el.screenshot_as_png().await {
            Ok(png) if !png.is_empty() => Ok(png),
            Ok(_) => self.cropped_screenshot(&el).await,
            Err(e) => {
                log::debug!(target: "shot", "element screenshot failed ({e}); cropping viewport");
                self.cropped_screenshot(&el).await
            }
        }
    }

    async fn session_state(&self) -> Result<SessionState> {
        let cookies = self.driver.get_all_cookies().await?;
        let cookies = cookies
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let storage = self
            .driver
            .execute(
                "const o = {}; for (let i = 0; i < localStorage.length; i++) { \
                 const k = localStorage.key(i); o[k] = localStorage.getItem(k); } return o;",
                vec![],
            )
            .await?
            .json()
            .clone();
        let local_storage = serde_json::from_value(storage).unwrap_or_default();

        Ok(SessionState { cookies, local_storage })
    }

    async fn restore_session_state(&self, state: &SessionState) -> Result<()> {
        for raw in &state.cookies {
            match serde_json::from_value::<Cookie>(raw.clone()) {
                Ok(c) => {
                    if let Err(e) = self.driver.add_cookie(c).await {
                        log::debug!(target: "sess", "cookie rejected: {e}");
                    }
                }
                Err(e) => log::debug!(target: "sess", "unreadable cookie: {e}"),
            }
        }
        for (k, v) in &state.local_storage {
            self.driver
                .execute(
                    "localStorage.setItem(arguments[0], arguments[1]);",
                    vec![json!(k), json!(v)],
                )
                .await?;
        }
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        self.driver.delete_all_cookies().await?;
        self.driver.execute("localStorage.clear();", vec![]).await?;
        Ok(())
    }
}

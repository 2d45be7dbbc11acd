// src/testing.rs
//! Scripted in-memory `Browser` and a manual `Clock` for engine tests.

use anyhow::{bail, Result};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use crate::browser::{Browser, ClickAt, SessionState};
use crate::config::Timings;
use crate::dom::{Locator, Pick};
use crate::page::Page;
use crate::poll::Clock;

/// Clock whose `sleep` advances time instantly.
#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<Duration>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.0.set(self.0.get() + d);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.0.get()
    }

    async fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Goto(String),
    Back,
    Reload,
    Click(Locator),
    ClickAt(i64, i64),
    Enter(Locator),
    Fill(Locator, String),
    Scroll,
    ScrollTop,
    Shot(Locator),
    Restore,
    ClearSession,
}

type Handler = Rc<dyn Fn(&mut State)>;

#[derive(Default)]
pub struct State {
    counts: HashMap<Locator, usize>,
    schedules: HashMap<Locator, Vec<(Duration, usize)>>,
    reveal_after_scrolls: Vec<(Locator, usize)>,
    disabled: HashSet<Locator>,
    failing_shots: HashSet<Locator>,
    failing_clicks: HashSet<Locator>,
    texts: HashMap<Locator, String>,
    shots: HashMap<Locator, Vec<u8>>,
    on_click: HashMap<Locator, Handler>,
    on_enter: HashMap<Locator, Handler>,
    history: Vec<String>,
    pub url: String,
    pub session: Option<SessionState>,
    scrolls: usize,
    ops: Vec<Op>,
}

impl State {
    pub fn set_count(&mut self, loc: &Locator, n: usize) {
        self.schedules.remove(loc);
        self.counts.insert(loc.clone(), n);
    }

    pub fn set_text(&mut self, loc: &Locator, text: &str) {
        self.texts.insert(loc.clone(), text.to_string());
    }

    pub fn set_shot(&mut self, loc: &Locator, bytes: &[u8]) {
        self.shots.insert(loc.clone(), bytes.to_vec());
    }

    pub fn set_disabled(&mut self, loc: &Locator) {
        self.disabled.insert(loc.clone());
    }

    pub fn navigate(&mut self, url: &str) {
        self.history.push(self.url.clone());
        self.url = url.to_string();
    }

    fn count_at(&self, loc: &Locator, now: Duration) -> usize {
        if let Some(plan) = self.schedules.get(loc) {
            return plan
                .iter()
                .filter(|(t, _)| *t <= now)
                .map(|(_, n)| *n)
                .last()
                .unwrap_or(0);
        }
        if let Some(n) = self.counts.get(loc) {
            return *n;
        }
        // An unscripted `nth(i)` exists when its unindexed base has more than i.
        match loc.pick() {
            Pick::Nth(i) if self.count_at(&loc.clone().all(), now) > i => 1,
            _ => 0,
        }
    }
}

/// Handle to the fake page. Clones share the same state.
#[derive(Clone)]
pub struct FakeBrowser {
    state: Rc<RefCell<State>>,
    clock: ManualClock,
}

/// A `Page` over a fresh fake, plus a handle for scripting it.
pub fn fake_page() -> (Page<FakeBrowser, ManualClock>, FakeBrowser) {
    let clock = ManualClock::new();
    let fake = FakeBrowser { state: Rc::default(), clock: clock.clone() };
    (Page::new(fake.clone(), clock, Timings::default()), fake)
}

impl FakeBrowser {
    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub fn set_count(&self, loc: &Locator, n: usize) {
        self.with(|s| s.set_count(loc, n));
    }

    /// Count follows `(from, count)` steps over clock time.
    pub fn schedule_count(&self, loc: &Locator, plan: Vec<(Duration, usize)>) {
        self.with(|s| {
            s.schedules.insert(loc.clone(), plan);
        });
    }

    pub fn show_after_scrolls(&self, loc: &Locator, n: usize) {
        self.with(|s| s.reveal_after_scrolls.push((loc.clone(), n)));
    }

    pub fn set_disabled(&self, loc: &Locator) {
        self.with(|s| s.set_disabled(loc));
    }

    pub fn fail_shot(&self, loc: &Locator) {
        self.with(|s| {
            s.failing_shots.insert(loc.clone());
        });
    }

    /// Clicks on `loc` error even while it is present.
    pub fn fail_click(&self, loc: &Locator) {
        self.with(|s| {
            s.failing_clicks.insert(loc.clone());
        });
    }

    pub fn set_text(&self, loc: &Locator, text: &str) {
        self.with(|s| s.set_text(loc, text));
    }

    pub fn set_shot(&self, loc: &Locator, bytes: &[u8]) {
        self.with(|s| s.set_shot(loc, bytes));
    }

    pub fn set_url(&self, url: &str) {
        self.with(|s| s.url = url.to_string());
    }

    pub fn on_click(&self, loc: &Locator, f: impl Fn(&mut State) + 'static) {
        self.with(|s| {
            s.on_click.insert(loc.clone(), Rc::new(f));
        });
    }

    pub fn on_enter(&self, loc: &Locator, f: impl Fn(&mut State) + 'static) {
        self.with(|s| {
            s.on_enter.insert(loc.clone(), Rc::new(f));
        });
    }

    pub fn ops(&self) -> Vec<Op> {
        self.with(|s| s.ops.clone())
    }

    pub fn clicks_on(&self, loc: &Locator) -> usize {
        self.with(|s| s.ops.iter().filter(|op| **op == Op::Click(loc.clone())).count())
    }

    pub fn position(&self, op: &Op) -> Option<usize> {
        self.with(|s| s.ops.iter().position(|o| o == op))
    }

    pub fn scrolls(&self) -> usize {
        self.with(|s| s.scrolls)
    }

    fn record(&self, op: Op) {
        self.with(|s| s.ops.push(op));
    }

    fn present(&self, loc: &Locator) -> bool {
        let now = self.clock.now();
        self.with(|s| s.count_at(loc, now) > 0)
    }

    fn require(&self, loc: &Locator) -> Result<()> {
        if !self.present(loc) {
            bail!("no element for {loc}");
        }
        Ok(())
    }

    fn fire(&self, enter: bool, loc: &Locator) {
        let handler = self.with(|s| {
            let map = if enter { &s.on_enter } else { &s.on_click };
            map.get(loc).cloned()
        });
        if let Some(h) = handler {
            self.with(|s| h(s));
        }
    }
}

impl Browser for FakeBrowser {
    async fn goto(&self, url: &str) -> Result<()> {
        self.record(Op::Goto(url.to_string()));
        self.with(|s| s.navigate(url));
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.with(|s| s.url.clone()))
    }

    async fn back(&self) -> Result<()> {
        self.record(Op::Back);
        self.with(|s| {
            if let Some(prev) = s.history.pop() {
                s.url = prev;
            }
        });
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.record(Op::Reload);
        Ok(())
    }

    async fn count(&self, loc: &Locator) -> Result<usize> {
        let now = self.clock.now();
        Ok(self.with(|s| s.count_at(loc, now)))
    }

    async fn is_visible(&self, loc: &Locator) -> Result<bool> {
        Ok(self.present(loc))
    }

    async fn is_enabled(&self, loc: &Locator) -> Result<bool> {
        Ok(self.present(loc) && !self.with(|s| s.disabled.contains(loc)))
    }

    async fn click(&self, loc: &Locator, _at: ClickAt) -> Result<()> {
        self.require(loc)?;
        if self.with(|s| s.failing_clicks.contains(loc)) {
            bail!("click intercepted: {loc}");
        }
        self.record(Op::Click(loc.clone()));
        self.fire(false, loc);
        Ok(())
    }

    async fn press_enter(&self, loc: &Locator) -> Result<()> {
        self.require(loc)?;
        self.record(Op::Enter(loc.clone()));
        self.fire(true, loc);
        Ok(())
    }

    async fn click_at(&self, x: i64, y: i64) -> Result<()> {
        self.record(Op::ClickAt(x, y));
        Ok(())
    }

    async fn move_pointer(&self, _x: i64, _y: i64) -> Result<()> {
        Ok(())
    }

    async fn inner_text(&self, loc: &Locator) -> Result<String> {
        self.require(loc)?;
        Ok(self.with(|s| s.texts.get(loc).cloned().unwrap_or_default()))
    }

    async fn fill(&self, loc: &Locator, text: &str) -> Result<()> {
        self.require(loc)?;
        self.record(Op::Fill(loc.clone(), text.to_string()));
        Ok(())
    }

    async fn scroll_into_view(&self, loc: &Locator) -> Result<()> {
        self.require(loc)
    }

    async fn scroll_page_by(&self, _dy: i64) -> Result<()> {
        self.record(Op::Scroll);
        self.with(|s| {
            s.scrolls += 1;
            let n = s.scrolls;
            let due: Vec<Locator> = s
                .reveal_after_scrolls
                .iter()
                .filter(|(_, after)| *after <= n)
                .map(|(l, _)| l.clone())
                .collect();
            for l in due {
                s.set_count(&l, 1);
            }
        });
        Ok(())
    }

    async fn scroll_page_to_top(&self) -> Result<()> {
        self.record(Op::ScrollTop);
        Ok(())
    }

    async fn scroll_fraction(&self, loc: &Locator, _fraction: f64) -> Result<()> {
        self.require(loc)
    }

    async fn screenshot(&self, loc: &Locator) -> Result<Vec<u8>> {
        self.require(loc)?;
        if self.with(|s| s.failing_shots.contains(loc)) {
            bail!("element detached: {loc}");
        }
        self.record(Op::Shot(loc.clone()));
        Ok(self.with(|s| s.shots.get(loc).cloned().unwrap_or_else(|| loc.to_string().into_bytes())))
    }

    async fn session_state(&self) -> Result<SessionState> {
        Ok(self.with(|s| s.session.clone().unwrap_or_default()))
    }

    async fn restore_session_state(&self, state: &SessionState) -> Result<()> {
        self.record(Op::Restore);
        self.with(|s| s.session = Some(state.clone()));
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        self.record(Op::ClearSession);
        self.with(|s| s.session = None);
        Ok(())
    }
}

// src/selectors.rs
//! Every DOM hook the dashboard exposes, as locator descriptors.

use crate::dom::{Locator, TextMatch};

pub const HEADING: &str = ".truncate.font-medium";

// ---- login / navigation ----

pub fn profiles_link() -> Locator {
    Locator::css(r#"a[href="/app/profiles"]"#).first()
}

pub fn cookie_banner_accept() -> Locator {
    Locator::css("#rcc-confirm-button").first()
}

pub fn email_input() -> Locator {
    Locator::css(r#"input[name="username"]"#).first()
}

pub fn password_input() -> Locator {
    Locator::css(r#"input[name="password"]"#).first()
}

pub fn continue_button() -> Locator {
    Locator::css("button")
        .with_text(TextMatch::Contains("Continue".into()))
        .first()
}

pub fn body() -> Locator {
    Locator::css("body").first()
}

// ---- tiles ----

pub fn tiles_with_testid(testid: &str) -> Locator {
    Locator::css(format!(r#"article:has([data-testid="{testid}"])"#))
}

pub fn tile_with_test_name(testid: &str, name: &str) -> Locator {
    Locator::css(format!(
        r#"article:has([data-testid="{testid}"][data-test-name="{name}"])"#
    ))
    .first()
}

pub fn any_tile() -> Locator {
    Locator::css("article")
}

pub fn tile_inner(tile: &Locator, testid: &str) -> Locator {
    tile.find_css(format!(r#"[data-testid="{testid}"]"#)).first()
}

pub fn tile_heading(tile: &Locator) -> Locator {
    tile.find_css(HEADING).first()
}

// ---- modal ----

pub fn close_button() -> Locator {
    Locator::css(r#"[data-testid="close-button"]"#).first()
}

/// The modal container that owns the close button.
pub fn modal_from_close_button() -> Locator {
    close_button()
        .find_xpath(
            "ancestor::div[contains(@class,'react-responsive-modal') \
             or contains(@class,'fd-chart-modal') or @id='fd-chart-modal']",
        )
        .first()
}

pub fn modal_fallback() -> Locator {
    Locator::css("#fd-chart-modal, .fd-chart-modal, .react-responsive-modal-modal").first()
}

pub fn modal_close_control(modal: &Locator) -> Locator {
    modal
        .find_css(r#"[data-testid="close-button"], button[aria-label="Close"]"#)
        .first()
}

pub fn accordions(modal: &Locator) -> Locator {
    modal.find_css("div.accordion")
}

pub fn accordion_body(section: &Locator) -> Locator {
    section
        .find_css(".accordion-body, [data-testid='multiseries-chart'], svg, canvas, .recharts-wrapper")
        .first()
}

// ---- metric dropdown ----

pub fn metric_button(tile: &Locator) -> Locator {
    tile.find_css(r#"[data-testid="metric-dropdown-button"]"#).first()
}

pub fn metric_button_label(tile: &Locator) -> Locator {
    metric_button(tile).find_css("span.truncate").first()
}

pub fn metric_menu(tile: &Locator) -> Locator {
    tile.find_css(r#"[data-testid="metric-dropdown-items"]"#).first()
}

pub fn metric_option(menu: &Locator, label: &str) -> Locator {
    menu.find_css(r#"[role="menuitem"]"#)
        .with_text(TextMatch::Exact(label.into()))
        .first()
}

/// Chart nodes to fingerprint, most specific first.
pub fn chart_candidates(tile: &Locator) -> [Locator; 3] {
    [
        tile.find_css("canvas").first(),
        tile.find_css(".recharts-wrapper svg, svg").first(),
        tile.find_css(".recharts-wrapper").first(),
    ]
}

// ---- profiles table / team filter ----

pub fn filter_control() -> Locator {
    Locator::css(".react-select__control").first()
}

pub fn filter_menu() -> Locator {
    Locator::css(".react-select__menu").first()
}

pub fn filter_options() -> Locator {
    Locator::css(".react-select__menu .react-select__option")
}

pub fn filter_option_exact(label: &str) -> Locator {
    filter_options().with_text(TextMatch::Exact(label.into())).first()
}

pub fn filter_chip_remove() -> Locator {
    filter_control()
        .find_css(".react-select__multi-value__remove")
        .first()
}

pub fn filter_clear_indicator() -> Locator {
    filter_control()
        .find_css(".react-select__clear-indicator")
        .first()
}

pub fn table_rows() -> Locator {
    Locator::css("tbody tr")
}

pub fn row(i: usize) -> Locator {
    table_rows().nth(i)
}

pub fn row_name_cell(row: &Locator) -> Locator {
    row.find_css("td").nth(1)
}

pub fn row_open_link(row: &Locator) -> Locator {
    row.find_css(r#"[aria-label="table-cell-initials"]"#).first()
}

pub fn next_page() -> Locator {
    Locator::css(r#"button[aria-label="next page"]"#).first()
}

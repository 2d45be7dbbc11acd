// src/dom.rs
use std::fmt;

/// How to find elements, relative to a scope (document or parent matches).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    XPath(String),
}

/// Text predicate applied to an element's visible text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextMatch {
    /// Equal after trimming and collapsing whitespace (case-sensitive).
    Exact(String),
    /// Equal after normalization, ignoring case.
    Normalized(String),
    /// Normalized haystack contains the normalized needle, ignoring case.
    Contains(String),
}

impl TextMatch {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Exact(want) => collapse_ws(text) == collapse_ws(want),
            TextMatch::Normalized(want) => normalize(text) == normalize(want),
            TextMatch::Contains(want) => normalize(text).contains(&normalize(want)),
        }
    }
}

/// Keep elements whose own text (or the text of some descendant matched by
/// `child`) satisfies `text`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub child: Option<Selector>,
    pub text: TextMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pick {
    All,
    Nth(usize),
}

/// A lazily-resolved element descriptor. Nothing here holds a live handle:
/// the browser resolves the whole chain again on every operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    parent: Option<Box<Locator>>,
    selector: Selector,
    filter: Option<Filter>,
    pick: Pick,
}

impl Locator {
    pub fn css(sel: impl Into<String>) -> Self {
        Self::new(Selector::Css(sel.into()))
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::new(Selector::XPath(expr.into()))
    }

    fn new(selector: Selector) -> Self {
        Self { parent: None, selector, filter: None, pick: Pick::All }
    }

    /// Search for `sel` inside the matches of `self`.
    pub fn find_css(&self, sel: impl Into<String>) -> Locator {
        Locator { parent: Some(Box::new(self.clone())), ..Locator::css(sel) }
    }

    pub fn find_xpath(&self, expr: impl Into<String>) -> Locator {
        Locator { parent: Some(Box::new(self.clone())), ..Locator::xpath(expr) }
    }

    /// Keep matches having a `child` descendant whose text matches.
    pub fn has_text_in(mut self, child: impl Into<String>, text: TextMatch) -> Self {
        self.filter = Some(Filter { child: Some(Selector::Css(child.into())), text });
        self
    }

    /// Keep matches whose own visible text matches.
    pub fn with_text(mut self, text: TextMatch) -> Self {
        self.filter = Some(Filter { child: None, text });
        self
    }

    pub fn nth(mut self, idx: usize) -> Self {
        self.pick = Pick::Nth(idx);
        self
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// The same descriptor without an index.
    #[cfg(test)]
    pub fn all(mut self) -> Self {
        self.pick = Pick::All;
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn pick(&self) -> Pick {
        self.pick
    }

    /// Root-first chain of links to resolve.
    pub fn chain(&self) -> Vec<&Locator> {
        let mut links = vec![self];
        let mut cur = self;
        while let Some(p) = cur.parent.as_deref() {
            links.push(p);
            cur = p;
        }
        links.reverse();
        links
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.parent {
            write!(f, "{p} >> ")?;
        }
        match &self.selector {
            Selector::Css(s) => write!(f, "css={s}")?,
            Selector::XPath(s) => write!(f, "xpath={s}")?,
        }
        if let Some(filter) = &self.filter {
            write!(f, " [text {:?}]", filter.text)?;
        }
        if let Pick::Nth(i) = self.pick {
            write!(f, " #{i}")?;
        }
        Ok(())
    }
}

/// Trim and collapse whitespace runs to a single space.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize(s: &str) -> String {
    collapse_ws(s).to_lowercase()
}

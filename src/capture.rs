// src/capture.rs
use anyhow::{Context, Result};
use ring::digest::{digest, SHA256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

const TAG: &str = "shot";

/// SHA-256 of screenshot bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let d = digest(&SHA256, bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(d.as_ref());
        Fingerprint(out)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..6] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Written {
    New(PathBuf),
    Duplicate(Fingerprint),
}

/// File numbering and de-duplication state for one athlete. Created fresh
/// per athlete and dropped when the athlete is done.
#[derive(Debug)]
pub struct AthleteCapture {
    dir: PathBuf,
    counters: HashMap<String, u32>,
    seen: HashMap<String, HashSet<Fingerprint>>,
}

impl AthleteCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self { dir, counters: HashMap::new(), seen: HashMap::new() })
    }

    pub fn count(&self, prefix: &str) -> u32 {
        self.counters.get(prefix).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counters.values().sum()
    }

    pub fn is_seen(&self, prefix: &str, fp: &Fingerprint) -> bool {
        self.seen.get(prefix).is_some_and(|s| s.contains(fp))
    }

    /// Write `{prefix}_{NNN}.png`. The index is only consumed once the file
    /// is on disk, so a failed write leaves no gap.
    pub fn write(&mut self, prefix: &str, png: &[u8]) -> Result<PathBuf> {
        let idx = self.count(prefix) + 1;
        let path = self.dir.join(format!("{prefix}_{idx:03}.png"));
        std::fs::write(&path, png).with_context(|| format!("write {}", path.display()))?;
        self.counters.insert(prefix.to_string(), idx);
        self.seen
            .entry(prefix.to_string())
            .or_default()
            .insert(Fingerprint::of(png));
        Ok(path)
    }

    /// Like `write`, but refuses content already written under `prefix`.
    pub fn write_unique(&mut self, prefix: &str, png: &[u8]) -> Result<Written> {
        let fp = Fingerprint::of(png);
        if self.is_seen(prefix, &fp) {
            log::info!(target: TAG, "duplicate content for {prefix} ({fp})");
            return Ok(Written::Duplicate(fp));
        }
        let path = self.write(prefix, png)?;
        Ok(Written::New(path))
    }
}

/// Strip characters that are illegal in file names and collapse whitespace.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect();
    crate::dom::collapse_ws(&cleaned)
}

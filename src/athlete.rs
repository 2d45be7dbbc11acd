// src/athlete.rs
use anyhow::Result;
use std::path::Path;

use crate::browser::Browser;
use crate::capture::AthleteCapture;
use crate::metric::{self, MetricTile};
use crate::modal::{self, ModalTile};
use crate::outcome::Outcome;
use crate::page::Page;
use crate::poll::Clock;
use crate::tile::{self, TileQuery};

const TAG: &str = "flow";

pub const HUMANTRAK_LABELS: [&str; 3] = [
    "Avg Peak Knee Flexion - Left & Right",
    "Avg Hip Adduction at Peak Knee Flexion - Left & Right",
    "Avg Ankle Dorsiflexion at Peak Knee Flexion - Left & Right",
];

#[derive(Debug, Clone)]
pub enum CaptureStep {
    Modal(ModalTile),
    Metric(MetricTile),
}

impl CaptureStep {
    pub fn prefix(&self) -> &str {
        match self {
            CaptureStep::Modal(m) => &m.prefix,
            CaptureStep::Metric(m) => &m.prefix,
        }
    }
}

fn modal(prefix: &str, query: TileQuery) -> CaptureStep {
    CaptureStep::Modal(ModalTile { prefix: prefix.into(), query })
}

fn humantrak(title: &str) -> CaptureStep {
    CaptureStep::Metric(MetricTile {
        prefix: title.replace(' ', "_"),
        query: TileQuery::titled("humantrak-tile", title),
        labels: HUMANTRAK_LABELS.iter().map(|l| l.to_string()).collect(),
    })
}

/// The fixed per-athlete checklist, in capture order.
pub fn default_checklist() -> Vec<CaptureStep> {
    vec![
        modal("Countermovement_Jump", TileQuery::named("forcedecks-tile", "Countermovement Jump")),
        modal("Nordic", TileQuery::testid("nordbord-tile")),
        modal("20yd_Sprint", TileQuery::titled("smartspeed-tile", "20yd Sprint")),
        modal("5-0-5_Drill", TileQuery::titled("smartspeed-tile", "5-0-5 Drill")),
        humantrak("Overhead Squat"),
        humantrak("Lunge"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Captured(u32),
    NotFound,
    TimedOut,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AthleteReport {
    pub name: String,
    pub steps: Vec<(String, StepStatus)>,
    pub images: u32,
}

async fn run_step<B: Browser, C: Clock>(
    page: &Page<B, C>,
    step: &CaptureStep,
    cap: &mut AthleteCapture,
) -> Result<Outcome<u32>> {
    match step {
        CaptureStep::Modal(m) => modal::capture_tile(page, m, cap).await,
        CaptureStep::Metric(m) => metric::capture_tile(page, m, cap).await,
    }
}

/// Run every checklist step for one athlete into `dir`. A step that fails
/// is logged and the next one still runs.
pub async fn capture_athlete<B: Browser, C: Clock>(
    page: &Page<B, C>,
    dir: &Path,
    name: &str,
    checklist: &[CaptureStep],
) -> Result<AthleteReport> {
    log::info!(target: TAG, "Capturing for athlete: {name}");
    let mut cap = AthleteCapture::new(dir)?;

    if let Some(first) = checklist.first() {
        let query = match first {
            CaptureStep::Modal(m) => &m.query,
            CaptureStep::Metric(m) => &m.query,
        };
        let cands = tile::strategies(query);
        if let Some(loc) = cands.first() {
            if !page.wait_visible(loc, page.timings.first_tile_timeout).await {
                log::info!(target: TAG, "'{}' tile not found immediately; proceeding anyway", query.describe());
            }
        }
    }
    page.pause(page.timings.pre_checklist_pause).await;

    let mut steps = Vec::with_capacity(checklist.len());
    for step in checklist {
        let label = step.prefix().replace('_', " ");
        let status = match run_step(page, step, &mut cap).await {
            Ok(Outcome::Ok(n)) => {
                log::info!(target: TAG, "✓ {label} done ({n} shots)");
                StepStatus::Captured(n)
            }
            Ok(soft) => {
                log::warn!(target: TAG, "(warn) {label}: {}", soft.tag());
                if soft == Outcome::NotFound {
                    StepStatus::NotFound
                } else {
                    StepStatus::TimedOut
                }
            }
            Err(e) => {
                log::warn!(target: TAG, "(warn) {label} failed: {e:#}");
                StepStatus::Failed(e.to_string())
            }
        };
        steps.push((step.prefix().to_string(), status));
    }

    let images = cap.total();
    log::info!(target: TAG, "Athlete '{name}' complete. Total images: {images}");
    Ok(AthleteReport { name: name.to_string(), steps, images })
}

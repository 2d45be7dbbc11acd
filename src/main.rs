mod athlete;
mod auth;
mod browser;
mod capture;
mod config;
mod dom;
mod driver;
mod error;
mod metric;
mod modal;
mod outcome;
mod page;
mod poll;
mod selectors;
mod tile;
mod walker;

#[cfg(test)]
mod testing;

use anyhow::Result;
use auth::SessionManager;
use browser::WebDriverBrowser;
use config::Config;
use driver::{cleanup_driver, init_driver};
use page::Page;
use poll::TokioClock;
use walker::{WalkReport, Walker};

async fn run(cfg: &Config, bundle: &driver::DriverBundle) -> Result<WalkReport> {
    let browser = WebDriverBrowser::new(bundle.driver.clone());
    let page = Page::new(browser, TokioClock::new(), cfg.timings.clone());

    SessionManager::new(cfg).ensure_session(&page).await?;
    Walker::new(cfg).run(&page, &cfg.teams).await
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // RUST_LOG wins when set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = Config::from_env()?;
    log::info!(target: "sess", "output -> {}", cfg.output_dir.display());

    let mut bundle = init_driver(&cfg).await?;
    let result = run(&cfg, &bundle).await;
    cleanup_driver(&mut bundle).await;

    match result {
        Ok(report) => {
            log::info!(
                target: "done",
                "✅ Automation complete: {} teams, {} athletes, {} images",
                report.teams,
                report.athletes,
                report.images
            );
            Ok(())
        }
        Err(e) => {
            log::error!(target: "done", "Top-level error: {e:#}");
            Err(e)
        }
    }
}

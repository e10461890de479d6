//! Pagination driver: exhausts one combination's dynamically-growing result
//! list by repeatedly invoking the "load more" control.
//!
//! Growth is observed through the count of distinct item identifiers, not
//! raw DOM node counts, so re-rendered or reordered items never count as
//! progress. Termination is stall-based: a configurable number of
//! consecutive no-growth checks ends the run, alongside the control
//! disappearing and a hard iteration cap.

pub mod filters;

use std::collections::HashSet;

use anyhow::{Result, anyhow};
use chromiumoxide::page::Page;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use scraper::{Html, Selector};
use url::Url;

use crate::browser::{
    click_with_fallback, wait_for_hidden, wait_for_selector, wait_for_visible, with_page_timeout,
};
use crate::config::HarvestConfig;
use crate::frontier::Combination;
use crate::record::{Origin, WorkItem};

/// Selector matching one listing entry in the result list.
pub const BUSINESS_ITEM_SELECTOR: &str = ".card-mobile, .gc-item";
/// The "load more" control.
pub const LOAD_MORE_SELECTOR: &str = "#ver-mas";
/// AJAX loading indicator shown while the next page of results streams in.
pub const LOADING_INDICATOR_SELECTOR: &str = "#cargando-pagina";

static ITEM_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(BUSINESS_ITEM_SELECTOR).expect("listing item selector is valid CSS")
});
static DETAIL_LINK_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="r=search/detail"]"#).expect("detail link selector is valid CSS")
});

/// Growth bookkeeping for one combination's crawl. Owned by exactly one
/// driver and discarded when the combination ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaginationState {
    loaded_count: usize,
    consecutive_no_growth: u32,
}

/// Result of one growth check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// New identifiers appeared since the last check.
    Grew,
    /// No growth; `streak` counts consecutive no-growth checks.
    Stalled { streak: u32 },
}

impl PaginationState {
    /// Record the current distinct-identifier count.
    pub fn observe(&mut self, current_count: usize) -> Growth {
        if current_count > self.loaded_count {
            self.loaded_count = current_count;
            self.consecutive_no_growth = 0;
            Growth::Grew
        } else {
            self.consecutive_no_growth += 1;
            Growth::Stalled {
                streak: self.consecutive_no_growth,
            }
        }
    }

    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.loaded_count
    }
}

/// What a discovery pass produced. `aborted` is set when a hard failure cut
/// the combination short; the partial item set is still usable.
#[derive(Debug)]
pub struct DiscoveryOutcome {
    pub items: Vec<WorkItem>,
    pub unmatched_filters: u32,
    pub aborted: Option<String>,
}

/// Drives the "load more" loop for one combination on one page.
pub struct PaginationDriver<'a> {
    cfg: &'a HarvestConfig,
    combination: Combination,
    state: PaginationState,
    seen: HashSet<String>,
    items: Vec<WorkItem>,
}

impl<'a> PaginationDriver<'a> {
    #[must_use]
    pub fn new(cfg: &'a HarvestConfig, combination: Combination) -> Self {
        Self {
            cfg,
            combination,
            state: PaginationState::default(),
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    /// Discover every reachable item identifier for this combination.
    ///
    /// Never returns an error: a hard navigation/session failure aborts this
    /// combination only, and whatever was discovered before the failure is
    /// kept so the caller can still merge it into the frontier.
    pub async fn discover(mut self, page: &Page) -> DiscoveryOutcome {
        let mut unmatched = 0;
        let aborted = match self.run(page, &mut unmatched).await {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    "Combination ({}) aborted after {} items: {e:#}",
                    self.combination.label(),
                    self.items.len()
                );
                Some(format!("{e:#}"))
            }
        };
        info!(
            "Combination ({}): {} distinct identifiers discovered",
            self.combination.label(),
            self.items.len()
        );
        DiscoveryOutcome {
            items: self.items,
            unmatched_filters: unmatched,
            aborted,
        }
    }

    async fn run(&mut self, page: &Page, unmatched: &mut u32) -> Result<()> {
        let load_timeout = self.cfg.load_timeout();

        with_page_timeout(
            async {
                page.goto(self.cfg.search_url())
                    .await
                    .map(|_| ())
                    .map_err(|e| anyhow!("{e}"))
            },
            load_timeout,
            "Search page navigation",
        )
        .await?;
        with_page_timeout(
            async {
                page.wait_for_navigation()
                    .await
                    .map(|_| ())
                    .map_err(|e| anyhow!("{e}"))
            },
            load_timeout,
            "Search page load",
        )
        .await?;

        if self.combination.is_unfiltered() {
            // Default search: wait for the initial batch to render. An empty
            // result set is possible, so a timeout here is not fatal.
            if wait_for_selector(page, BUSINESS_ITEM_SELECTOR, load_timeout)
                .await
                .is_err()
            {
                warn!("Initial results did not appear; the search may be empty");
            }
        } else {
            *unmatched += filters::apply(page, self.cfg, &self.combination).await?;
        }

        for round in 1..=self.cfg.max_load_more_rounds() {
            if let Err(e) = self.collect_current(page).await {
                // Transient DOM trouble: keep the loop going, the stall
                // guard bounds how long we can spin without progress.
                warn!("Failed to read current results (round {round}): {e:#}");
            }
            debug!(
                "Round {round}: {} distinct identifiers so far",
                self.items.len()
            );

            if let Growth::Stalled { streak } = self.state.observe(self.items.len())
                && streak >= self.cfg.stall_threshold()
            {
                info!(
                    "No new items after {streak} consecutive checks; assuming end of results"
                );
                return Ok(());
            }

            // Let any in-flight load settle before looking for the control.
            let _ = wait_for_hidden(page, LOADING_INDICATOR_SELECTOR, load_timeout).await;

            let Ok(button) = page.find_element(LOAD_MORE_SELECTOR).await else {
                info!("Load-more control absent; assuming end of results");
                return Ok(());
            };
            if let Err(e) = click_with_fallback(page, &button, LOAD_MORE_SELECTOR).await {
                info!("Load-more control not interactable ({e}); assuming end of results");
                return Ok(());
            }

            // Loading indicator cycle: appear (briefly, may be missed) then
            // disappear. A timeout is a transient growth failure: fall
            // through to the next growth check instead of aborting.
            if wait_for_visible(page, LOADING_INDICATOR_SELECTOR, std::time::Duration::from_secs(5))
                .await
                .is_err()
            {
                debug!("Loading indicator did not appear after click");
            }
            if let Err(e) = wait_for_hidden(page, LOADING_INDICATOR_SELECTOR, load_timeout).await {
                warn!("Loading cycle timed out ({e}); re-checking growth");
            }

            let pause = jittered_delay(self.cfg.click_delay());
            tokio::time::sleep(pause).await;
        }

        warn!(
            "Hard cap of {} load-more rounds reached for ({})",
            self.cfg.max_load_more_rounds(),
            self.combination.label()
        );
        Ok(())
    }

    /// Parse the currently-rendered items and absorb unseen identifiers.
    async fn collect_current(&mut self, page: &Page) -> Result<()> {
        let html = page.content().await.map_err(|e| anyhow!("{e}"))?;
        let origin = Origin {
            category: self.combination.category.clone(),
            locality: self.combination.locality.clone(),
        };
        for (identifier, seed) in parse_listing_ids(&html, self.cfg.base_url()) {
            if self.seen.insert(identifier.clone()) {
                self.items
                    .push(WorkItem::new(identifier, seed).with_origin(origin.clone()));
            }
        }
        Ok(())
    }
}

/// Extract `(identifier, detail_url)` pairs from rendered result-list HTML.
///
/// Identifiers come from the site's own `id` query parameter, never from
/// list position, so they are stable across runs and re-renders.
#[must_use]
pub fn parse_listing_ids(html: &str, base_url: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let mut found = Vec::new();

    for item in document.select(&ITEM_SEL) {
        let Some(link) = item.select(&DETAIL_LINK_SEL).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let resolved = match Url::parse(href) {
            Ok(url) => Some(url),
            Err(_) => base.as_ref().and_then(|b| b.join(href).ok()),
        };
        let Some(url) = resolved else { continue };
        if let Some(id) = url
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
            && !id.is_empty()
        {
            found.push((id, url.to_string()));
        }
    }

    found
}

fn jittered_delay(base: std::time::Duration) -> std::time::Duration {
    let base_ms = base.as_millis() as u64;
    let jitter = rand::rng().random_range(0..=base_ms.max(1));
    std::time::Duration::from_millis(base_ms + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_resets_stall_streak() {
        let mut state = PaginationState::default();
        assert_eq!(state.observe(10), Growth::Grew);
        assert_eq!(state.observe(10), Growth::Stalled { streak: 1 });
        assert_eq!(state.observe(25), Growth::Grew);
        assert_eq!(state.observe(25), Growth::Stalled { streak: 1 });
        assert_eq!(state.loaded_count(), 25);
    }

    #[test]
    fn stall_terminates_within_threshold_after_growth_stops() {
        // A page that stops growing after 4 loads must trip the default
        // threshold of 3 within exactly 3 further checks.
        let threshold = 3;
        let counts = [10usize, 20, 30, 40, 40, 40, 40, 40, 40];
        let mut state = PaginationState::default();
        let mut checks_after_stop = 0;
        for &count in &counts {
            match state.observe(count) {
                Growth::Grew => {}
                Growth::Stalled { streak } => {
                    checks_after_stop += 1;
                    if streak >= threshold {
                        break;
                    }
                }
            }
        }
        assert_eq!(checks_after_stop, 3);
    }

    #[test]
    fn shrinking_count_never_counts_as_growth() {
        let mut state = PaginationState::default();
        assert_eq!(state.observe(30), Growth::Grew);
        // A transient re-render showing fewer items must not reset progress.
        assert_eq!(state.observe(12), Growth::Stalled { streak: 1 });
        assert_eq!(state.loaded_count(), 30);
    }

    #[test]
    fn parse_extracts_stable_identifiers_from_static_page() {
        let mut html = String::from("<html><body>");
        for id in 1..=10 {
            html.push_str(&format!(
                r#"<div class="gc-item"><a href="index.php?r=search/detail&id={id}">Item {id}</a></div>"#
            ));
        }
        html.push_str("</body></html>");

        let pairs = parse_listing_ids(&html, "https://www.example.com");
        assert_eq!(pairs.len(), 10);
        assert_eq!(pairs[0].0, "1");
        assert!(pairs[0].1.starts_with("https://www.example.com/index.php"));
    }

    #[test]
    fn parse_skips_items_without_detail_links() {
        let html = r#"
            <div class="card-mobile"><span>no link here</span></div>
            <div class="card-mobile"><a href="index.php?r=search/detail&id=77">ok</a></div>
            <div class="card-mobile"><a href="index.php?r=search/detail">no id</a></div>
        "#;
        let pairs = parse_listing_ids(html, "https://www.example.com");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "77");
    }

    #[test]
    fn parse_keeps_absolute_urls_untouched() {
        let html = r#"<div class="gc-item">
            <a href="https://other.example.net/index.php?r=search/detail&id=5">x</a>
        </div>"#;
        let pairs = parse_listing_ids(html, "https://www.example.com");
        assert_eq!(pairs[0].1, "https://other.example.net/index.php?r=search/detail&id=5");
    }
}

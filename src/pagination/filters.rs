//! Advanced-search filter sub-protocol.
//!
//! Opens the filter panel, selects the closest matching option per filter
//! dimension, submits, and waits for the panel to close and results to
//! refresh. Option matching is free text against a rendered dropdown, so it
//! is kept as a pure function (`match_option`) testable without a browser:
//! trailing parentheticals (result counts) are stripped and comparison is
//! case-insensitive.
//!
//! A filter dimension with no matching option is logged and skipped; the
//! combination proceeds without it rather than failing the whole crawl.

use anyhow::{Context, Result};
use chromiumoxide::page::Page;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::browser::{click_with_fallback, wait_for_hidden, wait_for_selector, wait_for_visible};
use crate::config::HarvestConfig;
use crate::frontier::Combination;

/// Opens the advanced-search modal.
pub const ADVANCED_SEARCH_BUTTON: &str = r##"a[data-target="#formBusquedaAvazada"]"##;
/// The advanced-search modal itself.
pub const ADVANCED_SEARCH_PANEL: &str = "#formBusquedaAvazada";
/// Category dropdown inside the modal.
pub const CATEGORY_SELECT: &str = "#ddlRubroFilter";
/// Locality dropdown inside the modal.
pub const LOCALITY_SELECT: &str = "#ddlLocalidadFilter2";
/// Submit button inside the modal.
pub const SUBMIT_BUTTON: &str = "#botonBuscarAvanzada";
/// Close control in the modal header.
pub const PANEL_CLOSE_BUTTON: &str = ".modal-header .close";

static TRAILING_PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("parenthetical pattern is valid"));

/// One `<option>` of a filter dropdown as rendered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectOption {
    pub text: String,
    pub value: String,
}

/// Normalize dropdown text for matching: strip a trailing parenthetical
/// (the site appends result counts like "Farmacias (120)"), trim, casefold.
#[must_use]
pub fn normalize_option(text: &str) -> String {
    TRAILING_PARENTHETICAL
        .replace(text, "")
        .trim()
        .to_lowercase()
}

/// Find the option whose normalized text equals the normalized request.
/// Returns the option's submit value.
#[must_use]
pub fn match_option(requested: &str, available: &[SelectOption]) -> Option<String> {
    let wanted = normalize_option(requested);
    if wanted.is_empty() {
        return None;
    }
    available
        .iter()
        .find(|option| normalize_option(&option.text) == wanted)
        .map(|option| option.value.clone())
}

/// Apply the combination's filters through the advanced-search panel.
///
/// Returns the number of filter dimensions that could not be matched (these
/// are skipped, and the count feeds the run's warning status). Errors mean
/// the panel itself could not be driven; the caller aborts the combination.
pub async fn apply(page: &Page, cfg: &HarvestConfig, combo: &Combination) -> Result<u32> {
    let load_timeout = cfg.load_timeout();

    let open_button = wait_for_selector(page, ADVANCED_SEARCH_BUTTON, load_timeout)
        .await
        .context("Advanced-search control not found")?;
    click_with_fallback(page, &open_button, ADVANCED_SEARCH_BUTTON).await?;
    wait_for_visible(page, ADVANCED_SEARCH_PANEL, load_timeout)
        .await
        .context("Advanced-search panel did not open")?;

    let mut applied = 0u32;
    let mut unmatched = 0u32;

    let dimensions = [
        (combo.category.as_deref(), CATEGORY_SELECT, "category"),
        (combo.locality.as_deref(), LOCALITY_SELECT, "locality"),
    ];
    for (requested, select, name) in dimensions {
        let Some(requested) = requested else { continue };
        match read_options(page, select).await {
            Ok(options) => match match_option(requested, &options) {
                Some(value) => {
                    select_value(page, select, &value).await?;
                    info!("Applied {name} filter '{requested}' (value {value})");
                    applied += 1;
                }
                None => {
                    warn!(
                        "No {name} option matches '{requested}' among {} choices; skipping this filter",
                        options.len()
                    );
                    unmatched += 1;
                }
            },
            Err(e) => {
                warn!("Could not read {name} options ({e:#}); skipping this filter");
                unmatched += 1;
            }
        }
    }

    if applied > 0 {
        let submit = wait_for_selector(page, SUBMIT_BUTTON, load_timeout)
            .await
            .context("Advanced-search submit button not found")?;
        click_with_fallback(page, &submit, SUBMIT_BUTTON).await?;
        wait_for_hidden(page, ADVANCED_SEARCH_PANEL, load_timeout)
            .await
            .context("Advanced-search panel did not close after submit")?;
        if wait_for_selector(page, super::BUSINESS_ITEM_SELECTOR, load_timeout)
            .await
            .is_err()
        {
            warn!("Filtered results did not appear; combination may have no matches");
        }
    } else {
        warn!("No filters applied; proceeding with the unfiltered search");
        close_panel(page).await;
    }

    Ok(unmatched)
}

/// Read the rendered options of a dropdown via injected script.
async fn read_options(page: &Page, select: &str) -> Result<Vec<SelectOption>> {
    let script = format!(
        "(() => Array.from(document.querySelectorAll('{select} option'))\
         .map(o => ({{ text: o.textContent || '', value: o.value }})))()"
    );
    page.evaluate(script.as_str())
        .await
        .context("Option read script failed")?
        .into_value::<Vec<SelectOption>>()
        .context("Option read script returned unexpected shape")
}

/// Set a dropdown's value and fire the change event the page listens for.
async fn select_value(page: &Page, select: &str, value: &str) -> Result<()> {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    let script = format!(
        "(() => {{ const el = document.querySelector('{select}'); \
         el.value = '{escaped}'; \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
         return true; }})()"
    );
    page.evaluate(script.as_str())
        .await
        .map(|_| ())
        .with_context(|| format!("Failed to select value on {select}"))
}

/// Best-effort close of a panel left open (nothing selected).
async fn close_panel(page: &Page) {
    if let Ok(close) = page.find_element(PANEL_CLOSE_BUTTON).await
        && click_with_fallback(page, &close, PANEL_CLOSE_BUTTON).await.is_ok()
    {
        let _ = wait_for_hidden(
            page,
            ADVANCED_SEARCH_PANEL,
            std::time::Duration::from_secs(5),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> Vec<SelectOption> {
        pairs
            .iter()
            .map(|(text, value)| SelectOption {
                text: (*text).to_string(),
                value: (*value).to_string(),
            })
            .collect()
    }

    #[test]
    fn normalize_strips_trailing_count() {
        assert_eq!(normalize_option("Farmacias (120)"), "farmacias");
        assert_eq!(normalize_option("  Supermercados  "), "supermercados");
        assert_eq!(normalize_option("Neuquén (3)"), "neuquén");
    }

    #[test]
    fn normalize_keeps_inner_parentheticals() {
        assert_eq!(
            normalize_option("Casas (de) Repuestos (8)"),
            "casas (de) repuestos"
        );
    }

    #[test]
    fn match_is_case_insensitive_and_count_blind() {
        let available = opts(&[
            ("-- Todos --", ""),
            ("Farmacias (120)", "31"),
            ("Ferreterías (45)", "32"),
        ]);
        assert_eq!(match_option("farmacias", &available), Some("31".into()));
        assert_eq!(match_option("FERRETERÍAS", &available), Some("32".into()));
    }

    #[test]
    fn unmatched_request_returns_none() {
        let available = opts(&[("Farmacias (120)", "31")]);
        assert_eq!(match_option("Panaderías", &available), None);
        assert_eq!(match_option("", &available), None);
    }

    #[test]
    fn request_with_its_own_count_still_matches() {
        let available = opts(&[("Supermercados (12)", "9")]);
        assert_eq!(
            match_option("Supermercados (99)", &available),
            Some("9".into())
        );
    }
}

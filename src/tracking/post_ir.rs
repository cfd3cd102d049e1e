//! Client for the Iran Post tracking portal.
//!
//! The portal is a classic stateful ASP.NET web form: every search must echo
//! back three opaque tokens issued with the landing page. Each lookup runs a
//! fresh GET-then-POST cycle; tokens are never reused across tracking
//! numbers. The form rejects bare scripted clients, so both requests carry a
//! real browser's headers.

use super::{TrackingEvent, TrackingProvider, parser};
use crate::config::TrackingConfig;
use anyhow::{Context, Result, bail};
use chrono::Local;
use reqwest::blocking::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:140.0) Gecko/20100101 Firefox/140.0";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// ASP.NET postback target of the portal's search button.
const SEARCH_EVENT_TARGET: &str = "btnSearch";

const VIEW_STATE_ID: &str = "__VIEWSTATE";
const VIEW_STATE_GENERATOR_ID: &str = "__VIEWSTATEGENERATOR";
const EVENT_VALIDATION_ID: &str = "__EVENTVALIDATION";

fn browser_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    h.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br, zstd"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h
}

/// The three hidden-field values a form submission must echo back.
/// Valid for a single handshake-then-query cycle.
#[derive(Debug)]
struct FormTokens {
    view_state: String,
    view_state_generator: String,
    event_validation: String,
}

fn hidden_input_value(document: &Html, id: &str) -> Option<String> {
    let sel = Selector::parse(&format!("#{id}")).expect("invalid hidden input selector");
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(|v| v.to_string())
}

fn extract_form_tokens(html: &str) -> Result<FormTokens> {
    let document = Html::parse_document(html);

    let field = |id: &str| {
        hidden_input_value(&document, id)
            .with_context(|| format!("missing hidden form field {id} on landing page"))
    };

    Ok(FormTokens {
        view_state: field(VIEW_STATE_ID)?,
        view_state_generator: field(VIEW_STATE_GENERATOR_ID)?,
        event_validation: field(EVENT_VALIDATION_ID)?,
    })
}

fn build_form_params<'a>(tokens: &'a FormTokens, tracking_number: &'a str) -> [(&'a str, &'a str); 9] {
    [
        ("__EVENTTARGET", SEARCH_EVENT_TARGET),
        ("__EVENTARGUMENT", ""),
        ("__VIEWSTATE", &tokens.view_state),
        ("__VIEWSTATEGENERATOR", &tokens.view_state_generator),
        ("__VIEWSTATEENCRYPTED", ""),
        ("__EVENTVALIDATION", &tokens.event_validation),
        ("txtbSearch", tracking_number),
        // Present on the form but irrelevant to search; sent empty.
        ("txtVoteReason", ""),
        ("txtVoteTel", ""),
    ]
}

pub struct PostIrClient {
    client: Client,
    base_url: String,
    origin: String,
}

impl PostIrClient {
    pub fn new(config: &TrackingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .default_headers(browser_headers())
            .build()
            .expect("Failed to build tracking portal HTTP client");

        Self {
            client,
            base_url: config.base_url.clone(),
            origin: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the landing page and pull out the view-state token triple.
    fn acquire_tokens(&self) -> Result<FormTokens> {
        debug!(url = %self.base_url, "Tracking portal: fetching landing page");

        let start = Instant::now();
        let response = self
            .client
            .get(&self.base_url)
            .header(header::ACCEPT, ACCEPT_HTML)
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .context("Tracking portal landing page request failed")?;
        let elapsed = start.elapsed();

        let status = response.status();
        debug!(
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Tracking portal: landing page response received"
        );

        if !status.is_success() {
            bail!("Tracking portal landing page returned {status}");
        }

        let html = response
            .text()
            .context("Failed to read tracking portal landing page body")?;

        extract_form_tokens(&html)
    }

    /// Submit the search postback. Returns the result page HTML, or `None`
    /// when the request failed or the portal reports no record; failures at
    /// this stage deliberately degrade rather than raise.
    fn query(&self, tokens: &FormTokens, tracking_number: &str) -> Result<Option<String>> {
        let start = Instant::now();
        let result = self
            .client
            .post(&self.base_url)
            .header(header::ACCEPT, ACCEPT_HTML)
            .header(header::REFERER, &self.base_url)
            .header(header::ORIGIN, &self.origin)
            .header("Upgrade-Insecure-Requests", "1")
            .form(&build_form_params(tokens, tracking_number))
            .send();
        let elapsed = start.elapsed();

        let response = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    tracking_number,
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Tracking portal: search request failed"
                );
                return Ok(None);
            }
        };

        let status = response.status();
        debug!(
            tracking_number,
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Tracking portal: search response received"
        );

        if !status.is_success() {
            warn!(tracking_number, status = %status, "Tracking portal: search returned non-success status");
            return Ok(None);
        }

        let html = response
            .text()
            .context("Failed to read tracking portal search response body")?;

        if parser::has_not_found_banner(&html) {
            info!(tracking_number, "Tracking portal: no record found");
            return Ok(None);
        }

        Ok(Some(html))
    }
}

impl TrackingProvider for PostIrClient {
    fn fetch_events(&self, tracking_number: &str) -> Result<Vec<TrackingEvent>> {
        let tokens = self.acquire_tokens()?;

        let Some(html) = self.query(&tokens, tracking_number)? else {
            return Ok(Vec::new());
        };

        let events = parser::parse_tracking_html(&html, Local::now().date_naive());
        info!(tracking_number, count = events.len(), "Tracking portal: events parsed");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDING_PAGE: &str = r#"
        <html><body><form id="form1">
        <input type="hidden" id="__VIEWSTATE" value="dDwtMTIzNDU2Nzg5O2w8" />
        <input type="hidden" id="__VIEWSTATEGENERATOR" value="CA0B0334" />
        <input type="hidden" id="__EVENTVALIDATION" value="/wEWAgKj5uW4Bg==" />
        </form></body></html>
    "#;

    #[test]
    fn extracts_all_three_tokens() {
        let tokens = extract_form_tokens(LANDING_PAGE).unwrap();

        assert_eq!(tokens.view_state, "dDwtMTIzNDU2Nzg5O2w8");
        assert_eq!(tokens.view_state_generator, "CA0B0334");
        assert_eq!(tokens.event_validation, "/wEWAgKj5uW4Bg==");
    }

    #[test]
    fn missing_token_is_an_error() {
        let html = r#"
            <input type="hidden" id="__VIEWSTATE" value="abc" />
            <input type="hidden" id="__VIEWSTATEGENERATOR" value="def" />
        "#;

        let err = extract_form_tokens(html).unwrap_err();
        assert!(err.to_string().contains("__EVENTVALIDATION"));
    }

    #[test]
    fn empty_page_is_an_error() {
        assert!(extract_form_tokens("<html></html>").is_err());
    }

    #[test]
    fn form_params_carry_tokens_and_postback_target() {
        let tokens = FormTokens {
            view_state: "vs".into(),
            view_state_generator: "vsg".into(),
            event_validation: "ev".into(),
        };

        let params = build_form_params(&tokens, "1234567890123456");

        assert_eq!(params[0], ("__EVENTTARGET", "btnSearch"));
        assert!(params.contains(&("__VIEWSTATE", "vs")));
        assert!(params.contains(&("__VIEWSTATEGENERATOR", "vsg")));
        assert!(params.contains(&("__EVENTVALIDATION", "ev")));
        assert!(params.contains(&("txtbSearch", "1234567890123456")));
        assert!(params.contains(&("__VIEWSTATEENCRYPTED", "")));
    }
}

//! Company website source: one page in, one raw record out.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use leadharvest_shared::{
    FetchAttempt, FetchError, FetchErrorKind, RawRecord, SourceDescriptor, SourceKind,
};

use super::{SourceFetcher, wrong_kind};
use crate::http;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("static email pattern")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}")
        .expect("static phone pattern")
});

/// Meta/element sources for the company name, highest priority first.
const COMPANY_SOURCES: &[(&str, Option<&str>)] = &[
    (r#"meta[property="og:site_name"]"#, Some("content")),
    (r#"meta[name="application-name"]"#, Some("content")),
    (r#"meta[property="og:title"]"#, Some("content")),
    ("title", None),
    ("h1", None),
];

/// Fetches a company page over HTTP and extracts contact fields.
pub struct WebsiteFetcher {
    client: Client,
    allow_private: bool,
    placeholder_markers: Vec<String>,
}

impl WebsiteFetcher {
    pub fn new(client: Client, allow_private: bool, placeholder_markers: Vec<String>) -> Self {
        Self {
            client,
            allow_private,
            placeholder_markers,
        }
    }
}

#[async_trait]
impl SourceFetcher for WebsiteFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Website
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn fetch(&self, source: &SourceDescriptor, timeout: Duration) -> FetchAttempt {
        let SourceDescriptor::Website { url } = source else {
            return FetchAttempt::Failure(wrong_kind(self.kind(), source));
        };

        let target = match http::parse_target(url, self.allow_private) {
            Ok(target) => target,
            Err(e) => return FetchAttempt::Failure(e),
        };

        let body = match http::get_text(&self.client, &target, timeout).await {
            Ok(body) => body,
            Err(e) => return FetchAttempt::Failure(e),
        };

        let record = extract_record(&body, &target, &self.placeholder_markers);
        debug!(fields = record.fields.len(), "extracted page record");

        if record.fields.keys().all(|k| k == "url") {
            return FetchAttempt::Failure(FetchError::new(
                FetchErrorKind::MalformedPayload,
                format!("{target}: page yielded no fields"),
            ));
        }
        FetchAttempt::Success(vec![record])
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Build one raw record from a company page.
pub fn extract_record(html: &str, page_url: &Url, placeholder_markers: &[String]) -> RawRecord {
    let doc = Html::parse_document(html);
    let mut record = RawRecord::new(page_url.as_str()).with("url", page_url.as_str());

    if let Some(company) = extract_company(&doc) {
        record.insert("company", company);
    }
    if let Some(email) = extract_email(&doc, placeholder_markers) {
        record.insert("email", email);
    }

    let text = page_text(&doc);
    if let Some(phone) = extract_phone(&text) {
        record.insert("phone", phone);
    }
    if let Some(desc) = attr_of(&doc, r#"meta[name="description"]"#, "content") {
        record.insert("description", desc);
    }
    if let Some(linkedin) = extract_linkedin(&doc) {
        record.insert("linkedin", linkedin);
    }

    record
}

fn extract_company(doc: &Html) -> Option<String> {
    COMPANY_SOURCES.iter().find_map(|(css, attr)| {
        let raw = match attr {
            Some(attr) => attr_of(doc, css, attr),
            None => text_of(doc, css),
        }?;
        let name = strip_title_suffix(&raw);
        (!name.is_empty()).then_some(name)
    })
}

/// "Acme Widgets | Home" → "Acme Widgets".
fn strip_title_suffix(title: &str) -> String {
    let head = [" | ", " - ", " – ", " — ", " :: "]
        .iter()
        .filter_map(|sep| title.find(sep))
        .min()
        .map_or(title, |idx| &title[..idx]);
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `mailto:` link, else the first email-shaped token in the page text.
fn extract_email(doc: &Html, placeholder_markers: &[String]) -> Option<String> {
    let is_placeholder = |email: &str| {
        let lower = email.to_lowercase();
        placeholder_markers.iter().any(|m| lower.contains(m.as_str()))
    };

    if let Ok(sel) = Selector::parse(r#"a[href^="mailto:"]"#) {
        let from_links = doc
            .select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| {
                let addr = href.trim_start_matches("mailto:");
                addr.split('?').next().unwrap_or(addr).trim().to_string()
            })
            .find(|addr| EMAIL_RE.is_match(addr) && !is_placeholder(addr));
        if from_links.is_some() {
            return from_links;
        }
    }

    let text = page_text(doc);
    EMAIL_RE
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .find(|addr| !is_placeholder(addr))
}

/// First phone-shaped token carrying at least ten digits.
fn extract_phone(text: &str) -> Option<String> {
    PHONE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .find(|candidate| candidate.chars().filter(char::is_ascii_digit).count() >= 10)
}

fn extract_linkedin(doc: &Html) -> Option<String> {
    let sel = Selector::parse(r#"a[href*="linkedin.com/company/"], a[href*="linkedin.com/in/"]"#)
        .ok()?;
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.split('?').next().unwrap_or(href).to_string())
        .next()
}

fn attr_of(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from)
}

fn text_of(doc: &Html, css: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel)
        .map(element_text)
        .find(|t| !t.is_empty())
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible body text, whitespace-collapsed.
fn page_text(doc: &Html) -> String {
    match Selector::parse("body") {
        Ok(sel) => doc.select(&sel).map(element_text).collect::<Vec<_>>().join(" "),
        Err(_) => String::new(),
    }
}

//! Extracting catalog entries from the MagicMirror 3rd party modules wiki.

use mmpm_types::{Package, COMPANION_MODULE, MANAGER_NAME, NA};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const WIKI_URL: &str = "https://github.com/MichMich/MagicMirror/wiki/3rd-party-modules";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Failed to retrieve {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error(
        "The layout of the 3rd party modules page may have changed ({0}). \
         Please create an issue on the mmpm GitHub repository."
    )]
    Layout(String),
}

/// Produces the full list of catalog packages.
pub trait Scraper: Send + Sync {
    fn scrape(&self) -> Result<Vec<Package>, ScrapeError>;
}

/// Downloads and parses the wiki page.
#[derive(Debug, Clone)]
pub struct WikiScraper {
    url: String,
}

impl WikiScraper {
    pub fn new() -> Self {
        Self::with_url(WIKI_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn fetch(&self) -> Result<String, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("mmpm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        client.get(&self.url).send()?.error_for_status()?.text()
    }
}

impl Default for WikiScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl Scraper for WikiScraper {
    fn scrape(&self) -> Result<Vec<Package>, ScrapeError> {
        info!("Retrieving {}", self.url);

        let html = self.fetch().map_err(|source| ScrapeError::Http {
            url: self.url.clone(),
            source,
        })?;

        parse_wiki_page(&html)
    }
}

static BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h3\b[^>]*>(.*?)</h3>|<tr\b[^>]*>(.*?)</tr>").unwrap());
static CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap());
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#).unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());

/// Parse the wiki page HTML into packages.
///
/// Every `<h3>` names the category of the table rows that follow it. A row
/// is `title (linked to the repository) | author | description`. Header
/// rows have no `<td>` cells and are ignored, as are the rows listing mmpm
/// itself. A data row without a linked title fails the whole parse.
pub fn parse_wiki_page(html: &str) -> Result<Vec<Package>, ScrapeError> {
    let mut category = NA.to_string();
    let mut packages = Vec::new();

    for block in BLOCK.captures_iter(html) {
        if let Some(heading) = block.get(1) {
            category = text(heading.as_str());
            continue;
        }

        let Some(row) = block.get(2) else { continue };
        let cells: Vec<&str> = CELL
            .captures_iter(row.as_str())
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        if cells.is_empty() {
            continue;
        }

        let anchor = ANCHOR.captures(cells[0]).ok_or_else(|| {
            ScrapeError::Layout(format!("row without a linked title: '{}'", text(cells[0])))
        })?;

        let title = text(&anchor[2]);
        if title.is_empty() || title == MANAGER_NAME || title == COMPANION_MODULE {
            continue;
        }

        let repository = decode_entities(anchor[1].trim());
        let author = cells.get(1).map(|c| text(c)).filter(|a| !a.is_empty());
        let description = cells.get(2).map(|c| text(c)).filter(|d| !d.is_empty());

        packages.push(Package::new(
            &title,
            author.as_deref().unwrap_or(NA),
            &repository,
            description.as_deref().unwrap_or(NA),
            &category,
        ));
    }

    debug!("Parsed {} packages from the wiki", packages.len());
    Ok(packages)
}

/// Strip markup, decode entities and collapse whitespace.
fn text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

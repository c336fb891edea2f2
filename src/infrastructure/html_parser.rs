//! HTML parsing and data extraction for auto.ria.com pages
//!
//! Two parsers live here: `ListingPageParser` pulls detail-page links out of
//! a search results page and computes the next page cursor, and
//! `CarPageExtractor` implements the `DetailExtractor` capability for the
//! site's detail-page markup, including the embedded phone-disclosure token.

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::car::{ListingDetails, PhoneToken};
use crate::domain::services::DetailExtractor;

static NON_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").expect("static regex"));
static IMAGES_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"все\s+(\d+)\s+фот").expect("static regex"));

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{css}': {e}"))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn digits(text: &str) -> Option<i32> {
    let stripped = NON_DIGITS.replace_all(text, "");
    stripped.parse().ok()
}

/// Compute the next page cursor by incrementing the `page` query parameter.
///
/// The advance is speculative: it is computed for every non-empty page and
/// never validated against any page count the site reports. An absent or
/// unparseable `page` parameter reads as page 0.
pub fn next_page_url(current_url: &str) -> Result<String> {
    let mut url = Url::parse(current_url)?;

    let current_page: u32 = url
        .query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0);

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let next_page = current_page + 1;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("page", &next_page.to_string());
    }

    debug!("Generated URL for page {}: {}", next_page, url);
    Ok(url.into())
}

/// Parser for search result pages.
pub struct ListingPageParser {
    ticket_item: Selector,
    ticket_link: Selector,
}

impl ListingPageParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            ticket_item: parse_selector("section.ticket-item")?,
            ticket_link: parse_selector("a.m-link-ticket")?,
        })
    }

    /// Extract detail-page links from one search page, resolving relative
    /// hrefs against the page URL.
    pub fn extract_links(&self, html: &str, page_url: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut links = Vec::new();

        for item in document.select(&self.ticket_item) {
            let href = item
                .select(&self.ticket_link)
                .next()
                .and_then(|a| a.value().attr("href"));
            if let Some(href) = href {
                match resolve_url(href, page_url) {
                    Ok(resolved) => links.push(resolved),
                    Err(e) => warn!("Skipping unresolvable link '{}': {}", href, e),
                }
            }
        }

        debug!("Found {} car links on {}", links.len(), page_url);
        links
    }
}

fn resolve_url(href: &str, base: &str) -> Result<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Ok(href.to_string());
    }
    let base = Url::parse(base)?;
    Ok(base.join(href)?.into())
}

/// Selectors for the car detail page, matching the site's markup variants.
struct CarPageSelectors {
    title: Selector,
    price: Selector,
    odometer: Selector,
    seller_name: Vec<Selector>,
    image: Selector,
    image_fallback: Selector,
    show_all_photos: Selector,
    plate_number: Selector,
    vin: Selector,
    deleted_notice: Selector,
    token_script: Selector,
    token_any: Selector,
}

impl CarPageSelectors {
    fn new() -> Result<Self> {
        // Tried in order: professional sellers first, then the private-seller
        // markup variants.
        let seller_name = [
            "a.sellerPro",
            "div.seller_info_name > a",
            "div.user-name > h4.seller_info_name, div.view-seller-info .seller_info_name",
            ".seller_info .seller_info_name",
            "div.seller_info_name.grey.bold",
            "div.seller_info_name.bold",
            "h4.seller_info_name > a",
        ]
        .iter()
        .map(|css| parse_selector(css))
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title: parse_selector("h1.head, h3.auto-content_title")?,
            price: parse_selector("div.price_value > strong")?,
            odometer: parse_selector(
                "div.base-information span.size18.thin, div.base-information span.size18",
            )?,
            seller_name,
            image: parse_selector("div.photo-620x465 img.outline.m-auto[src]")?,
            image_fallback: parse_selector("div.photo-620x465 img[src]")?,
            show_all_photos: parse_selector("a.show-all")?,
            plate_number: parse_selector("span.state-num")?,
            vin: parse_selector("span.label-vin, span.vin-code, .vin-checked+.data-check .vin")?,
            deleted_notice: parse_selector(
                "div#autoDeletedTopBlock.notice.notice--icon.notice--orange",
            )?,
            token_script: parse_selector("script[data-hash][data-expires]")?,
            token_any: parse_selector("[data-hash][data-expires]")?,
        })
    }
}

/// Default `DetailExtractor` for auto.ria.com detail pages.
pub struct CarPageExtractor {
    selectors: CarPageSelectors,
}

impl CarPageExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            selectors: CarPageSelectors::new()?,
        })
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selectors.title)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
    }

    fn extract_price_usd(&self, document: &Html) -> Option<i32> {
        document
            .select(&self.selectors.price)
            .next()
            .and_then(|el| digits(&element_text(el)))
    }

    fn extract_odometer(&self, document: &Html) -> Option<i32> {
        let element = document.select(&self.selectors.odometer).next()?;
        let text = element_text(element);
        let value = digits(&text)?;
        // The page shows mileage in thousands of kilometers.
        if text.contains("тис. км") {
            Some(value * 1000)
        } else {
            Some(value)
        }
    }

    fn extract_seller_name(&self, document: &Html, removed: bool, url: &str) -> Option<String> {
        for selector in &self.selectors.seller_name {
            if let Some(element) = document.select(selector).next() {
                let name = element_text(element);
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }

        if removed {
            info!("Seller name not found - listing removed: {}", url);
        } else {
            error!("Failed to extract seller name from car page: {}", url);
        }
        None
    }

    fn extract_image_url(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selectors.image)
            .next()
            .or_else(|| document.select(&self.selectors.image_fallback).next())
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string)
    }

    fn extract_images_count(&self, document: &Html, has_image: bool) -> Option<i32> {
        let from_counter = document
            .select(&self.selectors.show_all_photos)
            .next()
            .map(element_text)
            .and_then(|text| {
                IMAGES_COUNT
                    .captures(&text)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse().ok())
            });
        match from_counter {
            Some(count) => Some(count),
            // No counter but a main photo: the gallery has exactly one image.
            None if has_image => Some(1),
            None => None,
        }
    }

    fn extract_car_number(&self, document: &Html) -> Option<String> {
        let element = document.select(&self.selectors.plate_number).next()?;

        // Only the element's own text; the nested popup spans repeat the
        // number with decorations.
        let mut direct = String::new();
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                direct.push_str(text);
            }
        }

        let number: String = direct.split_whitespace().collect::<String>().to_uppercase();
        let plausible = number.len() >= 6
            && number.chars().any(char::is_alphabetic)
            && number.chars().any(|c| c.is_ascii_digit());
        plausible.then_some(number)
    }

    fn extract_car_vin(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selectors.vin)
            .next()
            .map(element_text)
            .filter(|vin| !vin.is_empty())
    }

    fn is_deleted_listing(&self, document: &Html) -> bool {
        document
            .select(&self.selectors.deleted_notice)
            .next()
            .is_some_and(|block| {
                element_text(block).contains("удалено и не принимает участия в поиске")
            })
    }

    fn extract_phone_token(&self, document: &Html, url: &str) -> Option<PhoneToken> {
        let element = document
            .select(&self.selectors.token_script)
            .next()
            .or_else(|| document.select(&self.selectors.token_any).next())?;

        let hash = element.value().attr("data-hash")?;
        let expires = element.value().attr("data-expires")?;
        debug!("Found phone token on {}", url);
        Some(PhoneToken {
            hash: hash.to_string(),
            expires: expires.to_string(),
        })
    }
}

impl DetailExtractor for CarPageExtractor {
    fn extract(&self, html: &str, url: &str) -> Result<ListingDetails> {
        let document = Html::parse_document(html);

        let removed = self.is_deleted_listing(&document);
        let image_url = self.extract_image_url(&document);
        let images_count = self.extract_images_count(&document, image_url.is_some());

        Ok(ListingDetails {
            url: url.to_string(),
            title: self.extract_title(&document),
            price_usd: self.extract_price_usd(&document),
            odometer: self.extract_odometer(&document),
            username: self.extract_seller_name(&document, removed, url),
            image_url,
            images_count,
            car_number: self.extract_car_number(&document),
            car_vin: self.extract_car_vin(&document),
            phone_token: self.extract_phone_token(&document, url),
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_page(hrefs: &[&str]) -> String {
        let tickets: String = hrefs
            .iter()
            .map(|href| {
                format!(
                    r#"<section class="ticket-item"><a class="m-link-ticket" href="{href}">ad</a></section>"#
                )
            })
            .collect();
        format!("<html><body><div id=\"searchResults\">{tickets}</div></body></html>")
    }

    const DETAIL_PAGE: &str = r##"
        <html><body>
            <h1 class="head">Audi Q7 2019</h1>
            <div class="price_value"><strong>33 500 $</strong></div>
            <div class="base-information"><span class="size18 thin">95 тис. км</span></div>
            <div class="seller_info_name bold">Олександр</div>
            <div class="photo-620x465"><img class="outline m-auto" src="https://cdn.example/main.jpg"></div>
            <a class="show-all" href="#">Дивитись все 12 фото</a>
            <span class="state-num">AA 1234 BB<span class="popup">hint</span></span>
            <span class="label-vin">WAUZZZ4M0KD000001</span>
            <script data-hash="abc123" data-expires="777"></script>
        </body></html>
    "##;

    #[test]
    fn extracts_links_from_search_page() {
        let parser = ListingPageParser::new().unwrap();
        let html = search_page(&[
            "https://auto.ria.com/auto_audi_q7_100.html",
            "/auto_bmw_x5_200.html",
        ]);
        let links = parser.extract_links(&html, "https://auto.ria.com/search/?page=0");
        assert_eq!(
            links,
            vec![
                "https://auto.ria.com/auto_audi_q7_100.html".to_string(),
                "https://auto.ria.com/auto_bmw_x5_200.html".to_string(),
            ]
        );
    }

    #[test]
    fn empty_search_page_yields_no_links() {
        let parser = ListingPageParser::new().unwrap();
        let links = parser.extract_links(
            "<html><body><p>nothing found</p></body></html>",
            "https://auto.ria.com/search/?page=3",
        );
        assert!(links.is_empty());
    }

    #[test]
    fn next_page_increments_cursor_and_keeps_params() {
        let next =
            next_page_url("https://auto.ria.com/search/?lang_id=2&page=4&countpage=100").unwrap();
        let url = Url::parse(&next).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("page".into(), "5".into())));
        assert!(pairs.contains(&("lang_id".into(), "2".into())));
        assert!(pairs.contains(&("countpage".into(), "100".into())));
    }

    #[test]
    fn missing_page_param_reads_as_page_zero() {
        let next = next_page_url("https://auto.ria.com/search/?lang_id=2").unwrap();
        assert!(next.contains("page=1"));
    }

    #[test]
    fn extracts_all_detail_fields() {
        let extractor = CarPageExtractor::new().unwrap();
        let details = extractor
            .extract(DETAIL_PAGE, "https://auto.ria.com/auto_audi_q7_100.html")
            .unwrap();

        assert_eq!(details.title.as_deref(), Some("Audi Q7 2019"));
        assert_eq!(details.price_usd, Some(33500));
        assert_eq!(details.odometer, Some(95000));
        assert_eq!(details.username.as_deref(), Some("Олександр"));
        assert_eq!(details.image_url.as_deref(), Some("https://cdn.example/main.jpg"));
        assert_eq!(details.images_count, Some(12));
        assert_eq!(details.car_number.as_deref(), Some("AA1234BB"));
        assert_eq!(details.car_vin.as_deref(), Some("WAUZZZ4M0KD000001"));
        assert!(!details.removed);

        let token = details.phone_token.expect("token present");
        assert_eq!(token.hash, "abc123");
        assert_eq!(token.expires, "777");
    }

    #[test]
    fn odometer_without_thousands_marker_is_taken_verbatim() {
        let extractor = CarPageExtractor::new().unwrap();
        let html = r#"<div class="base-information"><span class="size18">8500 км</span></div>"#;
        let details = extractor.extract(html, "https://example.com/a").unwrap();
        assert_eq!(details.odometer, Some(8500));
    }

    #[test]
    fn token_falls_back_to_any_element() {
        let extractor = CarPageExtractor::new().unwrap();
        let html = r#"<div data-hash="h2" data-expires="e2"></div>"#;
        let details = extractor.extract(html, "https://example.com/a").unwrap();
        let token = details.phone_token.expect("token present");
        assert_eq!(token.hash, "h2");
        assert_eq!(token.expires, "e2");
    }

    #[test]
    fn detects_removed_listing_banner() {
        let extractor = CarPageExtractor::new().unwrap();
        let html = r#"
            <div id="autoDeletedTopBlock" class="notice notice--icon notice--orange">
                Объявление удалено и не принимает участия в поиске
            </div>
        "#;
        let details = extractor.extract(html, "https://example.com/a").unwrap();
        assert!(details.removed);
        assert!(details.username.is_none());
    }

    #[test]
    fn rejects_implausible_plate_numbers() {
        let extractor = CarPageExtractor::new().unwrap();
        let html = r#"<span class="state-num">12 34</span>"#;
        let details = extractor.extract(html, "https://example.com/a").unwrap();
        assert!(details.car_number.is_none());
    }

    #[test]
    fn single_photo_defaults_images_count_to_one() {
        let extractor = CarPageExtractor::new().unwrap();
        let html = r#"<div class="photo-620x465"><img src="https://cdn.example/1.jpg"></div>"#;
        let details = extractor.extract(html, "https://example.com/a").unwrap();
        assert_eq!(details.images_count, Some(1));
    }
}

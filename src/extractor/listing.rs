//! Selector-based field mapping for directory detail pages.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::RecordExtractor;
use crate::record::ListingRecord;

/// Markers that distinguish a real listing page from the site's generic
/// not-found shell. The worker waits for these before extraction.
pub const RECORD_MARKER_SELECTOR: &str = "a.search-result-name h1, span.search-result-address";

macro_rules! sel {
    ($name:ident, $css:expr) => {
        static $name: Lazy<Selector> =
            Lazy::new(|| Selector::parse($css).expect("listing selector is valid CSS"));
    };
}

sel!(NAME, "a.search-result-name h1");
sel!(ADDRESS, "span.search-result-address");
sel!(PHONE_LINKS, r#"a[href^="tel:"]"#);
sel!(WHATSAPP_LINK, r#"a[href^="https://api.whatsapp.com/send"]"#);
sel!(WEBSITE_ITEMPROP, r#"a[itemprop="url"]"#);
sel!(WEBSITE_ICON_LINK, "i.fa.fa-cloud + a.search-result-link");
sel!(EMAIL_CONTACT, r#"a[onclick="irContacto()"]"#);
sel!(EMAIL_ICON_LINK, "i.fa.fa-envelope + a.search-result-link");
sel!(FACEBOOK, r#"a[href*="facebook.com"]"#);
sel!(INSTAGRAM, r#"a[href*="instagram.com"]"#);
sel!(HOURS, "i.far.fa-clock + span.search-result-address");
sel!(CATEGORY_LIST, "div#yw0.list-view div.items a.search-result-link");
sel!(CATEGORY_SPAN, "span.search-result-category");
sel!(DESCRIPTION, "div.search-result-description");
sel!(MAP, "div.map");

/// Extracts business fields from a directory detail page.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListingExtractor;

impl RecordExtractor for ListingExtractor {
    fn extract(&self, html: &str) -> Option<ListingRecord> {
        let document = Html::parse_document(html);
        let mut fields = ListingRecord::new();

        let name = select_text(&document, &NAME);
        let address = select_text(&document, &ADDRESS);
        // Without either marker field the page is the not-found shell.
        if name.is_none() && address.is_none() {
            return None;
        }

        insert(&mut fields, "name", name);
        insert(&mut fields, "address", address);

        let phones: Vec<String> = document
            .select(&PHONE_LINKS)
            .filter_map(|el| non_empty(element_text(el)))
            .collect();
        if !phones.is_empty() {
            fields.insert("phones".to_string(), phones.join(", "));
        }

        insert(&mut fields, "whatsapp", extract_whatsapp(&document));
        insert(&mut fields, "website", extract_website(&document));
        insert(&mut fields, "email", extract_email(&document));
        insert(&mut fields, "facebook", select_href(&document, &FACEBOOK));
        insert(&mut fields, "instagram", select_href(&document, &INSTAGRAM));
        insert(&mut fields, "hours", extract_hours(&document));
        insert(&mut fields, "categories", extract_categories(&document));
        insert(&mut fields, "description", select_text(&document, &DESCRIPTION));

        if let Some(map) = document.select(&MAP).next() {
            insert(
                &mut fields,
                "latitude",
                map.value().attr("data-lat").map(str::to_string),
            );
            insert(
                &mut fields,
                "longitude",
                map.value().attr("data-lng").map(str::to_string),
            );
        }

        Some(fields)
    }
}

fn insert(fields: &mut ListingRecord, key: &str, value: Option<String>) {
    if let Some(value) = value {
        fields.insert(key.to_string(), value);
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

fn select_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| non_empty(element_text(el)))
}

fn select_href(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_string)
}

/// WhatsApp numbers live in the share-link query, not the anchor text.
fn extract_whatsapp(document: &Html) -> Option<String> {
    let link = document.select(&WHATSAPP_LINK).next()?;
    if let Some(href) = link.value().attr("href")
        && let Ok(url) = Url::parse(href)
    {
        if let Some((_, phone)) = url.query_pairs().find(|(key, _)| key == "phone")
            && !phone.is_empty()
        {
            return Some(phone.into_owned());
        }
        if let Some((_, text)) = url.query_pairs().find(|(key, _)| key == "text") {
            let digits: String = text.chars().filter(char::is_ascii_digit).collect();
            if !digits.is_empty() {
                return Some(digits);
            }
        }
    }
    let text = element_text(link);
    text.chars().any(|c| c.is_ascii_digit()).then_some(text)
}

fn extract_website(document: &Html) -> Option<String> {
    select_href(document, &WEBSITE_ITEMPROP).or_else(|| select_href(document, &WEBSITE_ICON_LINK))
}

fn extract_email(document: &Html) -> Option<String> {
    select_text(document, &EMAIL_CONTACT)
        .or_else(|| select_text(document, &EMAIL_ICON_LINK))
        .filter(|text| text.contains('@'))
}

fn extract_hours(document: &Html) -> Option<String> {
    let raw = select_text(document, &HOURS)?;
    let cleaned = raw.replace("Cerrado", "").replace("Abierto", "");
    non_empty(cleaned.trim().to_string())
}

fn extract_categories(document: &Html) -> Option<String> {
    let listed: Vec<String> = document
        .select(&CATEGORY_LIST)
        .filter_map(|el| non_empty(element_text(el)))
        .collect();
    if !listed.is_empty() {
        return Some(listed.join(", "));
    }
    select_text(document, &CATEGORY_SPAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_PAGE: &str = r##"<html><body>
        <a class="search-result-name" href="#"><h1>Farmacia Central</h1></a>
        <span class="search-result-address">Av. Argentina 123</span>
        <a href="tel:+542991111111">299 111-1111</a>
        <a href="tel:+542992222222">299 222-2222</a>
        <a href="https://api.whatsapp.com/send?phone=5492993333333&text=Hola">WhatsApp</a>
        <a itemprop="url" href="https://farmaciacentral.example.com">Sitio</a>
        <a onclick="irContacto()" href="#">contacto@farmaciacentral.example.com</a>
        <a href="https://facebook.com/farmaciacentral">fb</a>
        <i class="far fa-clock"></i><span class="search-result-address">Abierto 08:00 a 20:00</span>
        <div id="yw0" class="list-view"><div class="items">
            <a class="search-result-link" href="#">Farmacias</a>
            <a class="search-result-link" href="#">Perfumerías</a>
        </div></div>
        <div class="search-result-description">Farmacia de turno.</div>
        <div class="map" data-lat="-38.95" data-lng="-68.06"></div>
    </body></html>"##;

    #[test]
    fn extracts_all_mapped_fields() {
        let fields = ListingExtractor
            .extract(DETAIL_PAGE)
            .expect("detail page should yield a record");

        assert_eq!(fields["name"], "Farmacia Central");
        assert_eq!(fields["address"], "Av. Argentina 123");
        assert_eq!(fields["phones"], "299 111-1111, 299 222-2222");
        assert_eq!(fields["whatsapp"], "5492993333333");
        assert_eq!(fields["website"], "https://farmaciacentral.example.com");
        assert_eq!(fields["email"], "contacto@farmaciacentral.example.com");
        assert_eq!(fields["facebook"], "https://facebook.com/farmaciacentral");
        assert_eq!(fields["hours"], "08:00 a 20:00");
        assert_eq!(fields["categories"], "Farmacias, Perfumerías");
        assert_eq!(fields["description"], "Farmacia de turno.");
        assert_eq!(fields["latitude"], "-38.95");
        assert_eq!(fields["longitude"], "-68.06");
    }

    #[test]
    fn page_without_markers_yields_none() {
        let html = "<html><body><h1>Resultados</h1><p>Sin datos</p></body></html>";
        assert!(ListingExtractor.extract(html).is_none());
    }

    #[test]
    fn name_only_page_still_counts_as_found() {
        let html = r#"<a class="search-result-name"><h1>Kiosco 24</h1></a>"#;
        let fields = ListingExtractor
            .extract(html)
            .expect("name marker alone should yield a record");
        assert_eq!(fields["name"], "Kiosco 24");
        assert!(!fields.contains_key("email"));
    }

    #[test]
    fn category_span_fallback_when_list_absent() {
        let html = r#"
            <span class="search-result-address">Calle Falsa 123</span>
            <span class="search-result-category">Panaderías</span>
        "#;
        let fields = ListingExtractor.extract(html).expect("record expected");
        assert_eq!(fields["categories"], "Panaderías");
    }
}

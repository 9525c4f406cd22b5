//! Job detail page parsing.
//!
//! Extracts the description block and suburb from a rendered job ad, and
//! recognizes anti-bot challenge interstitials so the session driver can
//! back off instead of storing challenge HTML as a description.

use scraper::{Html, Selector};

/// Selectors tried in order for the description block. The site has shipped
/// both automation ids over time.
const DETAIL_SELECTORS: &[&str] = &[
    r#"div[data-automation="jobAdDetails"]"#,
    r#"div[data-automation="jobDescription"]"#,
];

const SUBURB_SELECTOR: &str = r#"span[data-automation="job-detail-location"]"#;

/// Substrings (lowercase) that identify a Cloudflare challenge page.
const CHALLENGE_MARKERS: &[&str] = &["challenge", "cf-browser-verification"];

/// Extracted content of one job ad page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDetail {
    /// Inner HTML of the description block, ready for markdown conversion.
    pub description_html: String,
    pub suburb: Option<String>,
}

/// Whether the page is an anti-bot challenge rather than a job ad.
pub fn is_challenge(html: &str) -> bool {
    let lower = html.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Parse a rendered job ad page. Returns `None` when no description block
/// with content can be found.
pub fn extract_detail(html: &str) -> Option<JobDetail> {
    let doc = Html::parse_document(html);

    let suburb = Selector::parse(SUBURB_SELECTOR)
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .filter(|s| !s.is_empty());

    for raw in DETAIL_SELECTORS {
        if let Ok(sel) = Selector::parse(raw)
            && let Some(el) = doc.select(&sel).next()
        {
            let inner = el.inner_html();
            if !inner.trim().is_empty() {
                return Some(JobDetail {
                    description_html: inner,
                    suburb,
                });
            }
        }
    }

    // Last resort: any div whose class mentions a job description. Catches
    // markup variants that dropped the automation ids.
    let any_div = Selector::parse("div[class]").ok()?;
    for el in doc.select(&any_div) {
        let class = el.value().attr("class").unwrap_or_default().to_lowercase();
        if class.contains("jobdescription") {
            let inner = el.inner_html();
            if !inner.trim().is_empty() {
                return Some(JobDetail {
                    description_html: inner,
                    suburb,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <span data-automation="job-detail-location">Perth WA</span>
          <div data-automation="jobAdDetails"><p>Senior engineer role.</p></div>
        </body></html>
    "#;

    #[test]
    fn extracts_description_and_suburb() {
        let detail = extract_detail(PAGE).unwrap();
        assert!(detail.description_html.contains("Senior engineer role."));
        assert_eq!(detail.suburb.as_deref(), Some("Perth WA"));
    }

    #[test]
    fn falls_back_to_second_automation_id() {
        let html = r#"<div data-automation="jobDescription"><p>Details here</p></div>"#;
        let detail = extract_detail(html).unwrap();
        assert!(detail.description_html.contains("Details here"));
        assert_eq!(detail.suburb, None);
    }

    #[test]
    fn falls_back_to_class_heuristic() {
        let html = r#"<div class="FlexWrap_jobDescriptionBlock"><p>Via class</p></div>"#;
        let detail = extract_detail(html).unwrap();
        assert!(detail.description_html.contains("Via class"));
    }

    #[test]
    fn empty_description_block_is_no_content() {
        let html = r#"<div data-automation="jobAdDetails">   </div>"#;
        assert!(extract_detail(html).is_none());
    }

    #[test]
    fn missing_description_is_no_content() {
        assert!(extract_detail("<html><body><p>nothing relevant</p></body></html>").is_none());
    }

    #[test]
    fn detects_challenge_pages() {
        assert!(is_challenge("<html><div id=\"cf-browser-verification\"></div></html>"));
        assert!(is_challenge("<title>Just a moment... Challenge</title>"));
        assert!(!is_challenge(PAGE));
    }
}

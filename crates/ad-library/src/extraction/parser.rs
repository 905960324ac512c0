//! Structural creative parser for Ad Library preview documents.
//!
//! The preview markup carries no semantic hooks beyond `#content`, so every
//! field is located by a fixed child path below it. Paths use a small subset
//! of XPath's child axis: `div/div[2]/a` walks element children, an
//! unindexed step keeps every child with that tag and `tag[n]` keeps the n-th
//! (1-based) child with that tag.
//!
//! Each creative slot is resolved with the same fallback chain: rendered
//! `<img>`, rendered `<video>`, video recovered from blocked requests, and
//! finally a text-only status creative.

use super::interceptor::InterceptedTraffic;
use crate::error::ContractViolation;
use crate::record::{AdElements, AdType, Creative};
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::sync::OnceLock;
use url::Url;

// ── Layout ──────────────────────────────────────────────────────────────────

/// Ad body text, relative to `#content`.
const BODY: &str = "div/div/div/div/div/div/div[2]/div[1]";

/// The creative of a single-creative ad, relative to `#content`.
const SINGLE_SLOT: &str = "div/div/div/div/div/div/div[2]";

/// Carousel cards, relative to `#content`.
const CAROUSEL_SLOTS: &str = "div/div/div/div/div/div/div[3]/div/div[2]/div/div/div";

/// Creative root inside one carousel card.
const CAROUSEL_SLOT_INNER: &str = "div/div";

/// Media and link locations inside one creative.
struct SlotLayout {
    image: &'static str,
    video: &'static str,
    /// Link wrapping the creative when it shows an image (or nothing).
    image_link: &'static str,
    /// Link below the player when it shows a video.
    video_link: &'static str,
}

const SINGLE_LAYOUT: SlotLayout = SlotLayout {
    image: "a/div[1]/img",
    video: "div[2]/div/div/div/div/video",
    image_link: "a",
    video_link: "div[3]/a",
};

const CAROUSEL_LAYOUT: SlotLayout = SlotLayout {
    image: "a/div[1]/img",
    video: "div[1]/div/div/div/div/video",
    image_link: "a",
    video_link: "div[2]/a",
};

/// Caption container relative to an image link.
const IMAGE_CAPTIONS: &str = "div[2]";
/// Caption container relative to a video link.
const VIDEO_CAPTIONS: &str = "div";

// Text fields, relative to the caption container.
const CTA: &str = "div[2]/div/div/span/div/div/div";
const CAPTION: &str = "div[1]/div[1]/div/div";
const TITLE: &str = "div[1]/div[2]/div/div";
const DESCRIPTION: &str = "div[1]/div[3]/div/div";

// ── Child paths ─────────────────────────────────────────────────────────────

struct Step<'p> {
    tag: &'p str,
    position: Option<usize>,
}

impl<'p> Step<'p> {
    fn parse(raw: &'p str) -> Self {
        match raw.split_once('[') {
            Some((tag, rest)) => Step {
                tag,
                position: rest.trim_end_matches(']').parse().ok(),
            },
            None => Step {
                tag: raw,
                position: None,
            },
        }
    }

    fn children<'a>(&self, parent: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let mut matching = parent
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == self.tag);

        match self.position {
            Some(n) => n
                .checked_sub(1)
                .and_then(|index| matching.nth(index))
                .into_iter()
                .collect(),
            None => matching.collect(),
        }
    }
}

/// All elements reached by `path` from `root`, in document order.
fn select_path<'a>(root: ElementRef<'a>, path: &str) -> Vec<ElementRef<'a>> {
    let mut current = vec![root];
    for step in path.split('/').filter(|s| !s.is_empty()).map(Step::parse) {
        current = current
            .into_iter()
            .flat_map(|element| step.children(element))
            .collect();
        if current.is_empty() {
            break;
        }
    }
    current
}

fn first<'a>(root: Option<ElementRef<'a>>, path: &str) -> Option<ElementRef<'a>> {
    root.and_then(|r| select_path(r, path).into_iter().next())
}

fn attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element.value().attr(name).map(|v| v.to_string())
}

fn inner_html(root: Option<ElementRef<'_>>, path: &str) -> Option<String> {
    first(root, path).map(|element| element.inner_html())
}

fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

// ── Intercepted media ───────────────────────────────────────────────────────

/// Media recovered from intercepted requests, consumed first-in first-out.
struct InterceptedMedia {
    videos: VecDeque<String>,
    thumbnails: VecDeque<String>,
}

impl InterceptedMedia {
    /// Blocked videos, deduplicated, plus the intercepted images the document
    /// does not render itself (taken to be video thumbnails).
    fn new(traffic: &InterceptedTraffic, rendered_images: &HashSet<String>) -> Self {
        Self {
            videos: dedup(traffic.video_urls.iter()),
            thumbnails: dedup(
                traffic
                    .image_urls
                    .iter()
                    .filter(|url| !rendered_images.contains(url.as_str())),
            ),
        }
    }
}

fn dedup<'a>(urls: impl Iterator<Item = &'a String>) -> VecDeque<String> {
    let mut seen = HashSet::new();
    urls.filter(|url| seen.insert(url.to_string()))
        .cloned()
        .collect()
}

fn rendered_image_sources(document: &Html) -> HashSet<String> {
    static IMG: OnceLock<Selector> = OnceLock::new();
    let sel = IMG.get_or_init(|| Selector::parse("img").expect("valid selector"));
    document
        .select(sel)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| src.to_string())
        .collect()
}

fn content_root(document: &Html) -> Option<ElementRef<'_>> {
    static CONTENT: OnceLock<Selector> = OnceLock::new();
    let sel = CONTENT.get_or_init(|| Selector::parse("#content").expect("valid selector"));
    document.select(sel).next()
}

// ── Slot resolution ─────────────────────────────────────────────────────────

/// Fallback branch that resolved a creative slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMatch {
    Image,
    Video,
    /// No rendered media, video recovered from a blocked request.
    InterceptedVideo,
    Status,
}

impl SlotMatch {
    pub fn ad_type(self) -> AdType {
        match self {
            SlotMatch::Image => AdType::Image,
            SlotMatch::Video | SlotMatch::InterceptedVideo => AdType::Video,
            SlotMatch::Status => AdType::Status,
        }
    }
}

fn resolve_slot(
    slot: Option<ElementRef<'_>>,
    layout: &SlotLayout,
    media: &mut InterceptedMedia,
) -> (Creative, SlotMatch) {
    let mut creative = Creative::default();

    let (matched, link_path, captions_path) = if let Some(img) = first(slot, layout.image) {
        creative.image = attr(img, "src");
        (SlotMatch::Image, layout.image_link, IMAGE_CAPTIONS)
    } else if let Some(video) = first(slot, layout.video) {
        creative.video = attr(video, "src");
        creative.image = attr(video, "poster");
        (SlotMatch::Video, layout.video_link, VIDEO_CAPTIONS)
    } else if let Some(url) = media.videos.pop_front() {
        creative.video = Some(url);
        creative.image = media.thumbnails.pop_front();
        (SlotMatch::InterceptedVideo, layout.video_link, VIDEO_CAPTIONS)
    } else {
        (SlotMatch::Status, layout.image_link, IMAGE_CAPTIONS)
    };

    let link = first(slot, link_path);
    creative.landing_page = link
        .and_then(|a| attr(a, "href"))
        .map(|href| unwrap_landing_page(&href));

    let captions = first(link, captions_path);
    creative.cta = inner_html(captions, CTA);
    creative.caption = inner_html(captions, CAPTION);
    creative.title = inner_html(captions, TITLE);
    creative.description = inner_html(captions, DESCRIPTION);

    (creative, matched)
}

/// Unwrap `https://l.facebook.com/l.php?u=<encoded>&h=...` redirect links to
/// the advertiser URL, dropping its query string. Other links are returned
/// unchanged.
pub fn unwrap_landing_page(href: &str) -> String {
    let target = Url::parse(href)
        .ok()
        .filter(|u| u.host_str() == Some("l.facebook.com") && u.path() == "/l.php")
        .and_then(|u| {
            u.query_pairs()
                .find(|(key, _)| key == "u")
                .map(|(_, value)| value.into_owned())
        });

    match target {
        Some(url) => url.split('?').next().unwrap_or_default().to_string(),
        None => href.to_string(),
    }
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Extract the creative data of one loaded preview.
///
/// Fails only on the single-creative path, when nothing matched but the page
/// did request media: the markup no longer matches the layout above.
pub fn parse(html: &str, traffic: &InterceptedTraffic) -> Result<AdElements, ContractViolation> {
    let document = Html::parse_document(html);
    let mut media = InterceptedMedia::new(traffic, &rendered_image_sources(&document));
    let root = content_root(&document);

    let mut elements = AdElements {
        body: first(root, BODY).and_then(text_of),
        ..AdElements::default()
    };

    let slots = root
        .map(|r| select_path(r, CAROUSEL_SLOTS))
        .unwrap_or_default();

    if !slots.is_empty() {
        elements.ad_type = Some(AdType::Carousel);
        for slot in slots {
            let inner = first(Some(slot), CAROUSEL_SLOT_INNER);
            let (creative, _) = resolve_slot(inner, &CAROUSEL_LAYOUT, &mut media);
            elements.creatives.push(creative);
        }
        return Ok(elements);
    }

    let slot = first(root, SINGLE_SLOT);
    let (creative, matched) = resolve_slot(slot, &SINGLE_LAYOUT, &mut media);

    if matched == SlotMatch::Status && traffic.has_captured() {
        return Err(ContractViolation {
            video_urls: traffic.video_urls.clone(),
            image_urls: traffic.image_urls.clone(),
        });
    }

    elements.ad_type = Some(matched.ad_type());
    elements.creatives.push(creative);
    Ok(elements)
}

//! Passive request interception for one preview page load.
//!
//! The preview refuses to serve video bytes to automated clients but still
//! issues the request. Blocking it avoids the detection signal and leaves the
//! real asset URL behind, which is the only way to recover the video when the
//! rendered document has no playable element.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// URL fragment identifying video asset requests.
pub const VIDEO_MARKER: &str = "video";

/// URL fragment identifying the image CDN.
pub const IMAGE_HOST_MARKER: &str = "scontent";

/// What the navigation layer must do with an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestVerdict {
    Block,
    Allow,
}

/// Media URLs observed during one page load, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptedTraffic {
    pub video_urls: Vec<String>,
    pub image_urls: Vec<String>,
}

impl InterceptedTraffic {
    pub fn has_captured(&self) -> bool {
        !self.video_urls.is_empty() || !self.image_urls.is_empty()
    }
}

#[derive(Debug, Default)]
struct TrafficLog {
    traffic: InterceptedTraffic,
    requests_seen: usize,
    last_request: Option<Instant>,
}

/// Per-page request classifier. Construct a fresh one for every page.
#[derive(Debug, Default)]
pub struct TrafficInterceptor {
    log: Mutex<TrafficLog>,
}

impl TrafficInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrafficLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Classify an outgoing request before it is sent.
    pub fn intercept(&self, url: &str) -> RequestVerdict {
        let mut log = self.lock();
        log.requests_seen += 1;
        log.last_request = Some(Instant::now());

        if url.contains(VIDEO_MARKER) {
            tracing::debug!(url, "video request blocked");
            log.traffic.video_urls.push(url.to_string());
            RequestVerdict::Block
        } else if url.contains(IMAGE_HOST_MARKER) {
            tracing::trace!(url, "image request passed");
            log.traffic.image_urls.push(url.to_string());
            RequestVerdict::Allow
        } else {
            tracing::trace!(url, "request passed");
            RequestVerdict::Allow
        }
    }

    pub fn video_urls(&self) -> Vec<String> {
        self.lock().traffic.video_urls.clone()
    }

    pub fn image_urls(&self) -> Vec<String> {
        self.lock().traffic.image_urls.clone()
    }

    pub fn has_captured(&self) -> bool {
        self.lock().traffic.has_captured()
    }

    /// Total requests classified so far, recorded or not.
    pub fn requests_seen(&self) -> usize {
        self.lock().requests_seen
    }

    /// Time since the last classified request; `None` before the first one.
    pub fn idle_for(&self) -> Option<Duration> {
        self.lock().last_request.map(|t| t.elapsed())
    }

    pub fn snapshot(&self) -> InterceptedTraffic {
        self.lock().traffic.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_requests_are_blocked_and_recorded() {
        let tap = TrafficInterceptor::new();
        let verdict = tap.intercept("https://video.xx.fbcdn.net/v/t42/clip.mp4?oh=1");
        assert_eq!(verdict, RequestVerdict::Block);
        assert_eq!(
            tap.video_urls(),
            vec!["https://video.xx.fbcdn.net/v/t42/clip.mp4?oh=1".to_string()]
        );
        assert!(tap.image_urls().is_empty());
    }

    #[test]
    fn test_image_requests_pass_and_are_recorded() {
        let tap = TrafficInterceptor::new();
        assert_eq!(
            tap.intercept("https://scontent.xx.fbcdn.net/v/t39/thumb.jpg"),
            RequestVerdict::Allow
        );
        assert_eq!(tap.image_urls().len(), 1);
        assert!(tap.has_captured());
    }

    #[test]
    fn test_other_requests_pass_unrecorded() {
        let tap = TrafficInterceptor::new();
        assert_eq!(
            tap.intercept("https://static.xx.fbcdn.net/rsrc.php/app.js"),
            RequestVerdict::Allow
        );
        assert!(!tap.has_captured());
        assert_eq!(tap.requests_seen(), 1);
        assert!(tap.idle_for().is_some());
    }

    #[test]
    fn test_video_marker_wins_over_image_host() {
        let tap = TrafficInterceptor::new();
        assert_eq!(
            tap.intercept("https://scontent.xx.fbcdn.net/video/clip.mp4"),
            RequestVerdict::Block
        );
        assert!(tap.image_urls().is_empty());
    }

    #[test]
    fn test_duplicates_are_kept_in_arrival_order() {
        let tap = TrafficInterceptor::new();
        tap.intercept("https://video.example/b.mp4");
        tap.intercept("https://video.example/a.mp4");
        tap.intercept("https://video.example/b.mp4");
        assert_eq!(
            tap.snapshot().video_urls,
            vec![
                "https://video.example/b.mp4",
                "https://video.example/a.mp4",
                "https://video.example/b.mp4"
            ]
        );
    }

    #[test]
    fn test_fresh_interceptor_is_idle() {
        let tap = TrafficInterceptor::new();
        assert!(tap.idle_for().is_none());
        assert_eq!(tap.snapshot(), InterceptedTraffic::default());
    }
}

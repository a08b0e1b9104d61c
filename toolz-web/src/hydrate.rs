//! Hydration wait: load markup into an isolated surface, let its scripts
//! run, and poll until the page looks populated or the attempt cap is hit.
//!
//! The surface is behind [`SurfaceFactory`]/[`RenderSurface`] so the loop can
//! be driven by a fake surface and tokio's paused clock in tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use toolz_config::HydrationSpec;
use url::Url;

const VIEWPORT_META: &str = r#"<meta name="viewport" content="width=device-width, initial-scale=1.0">"#;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to open rendering surface: {0:#}")]
    Surface(#[source] anyhow::Error),
}

/// Polling parameters and the readiness thresholds.
#[derive(Debug, Clone)]
pub struct HydrationPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Materialized text must be longer than this many characters.
    pub min_text_len: usize,
    pub loading_marker: String,
    pub root_id: String,
    /// Delay before the first probe.
    pub settle: Duration,
}

impl Default for HydrationPolicy {
    fn default() -> Self {
        Self::from(&HydrationSpec::default())
    }
}

impl From<&HydrationSpec> for HydrationPolicy {
    fn from(spec: &HydrationSpec) -> Self {
        Self {
            interval: Duration::from_millis(spec.interval_ms),
            max_attempts: spec.max_attempts.max(1),
            min_text_len: spec.min_text_len,
            loading_marker: spec.loading_marker.clone(),
            root_id: spec.root_id.clone(),
            settle: Duration::from_millis(spec.settle_ms),
        }
    }
}

impl HydrationPolicy {
    pub fn is_ready(&self, snapshot: &SurfaceSnapshot) -> bool {
        snapshot.text.chars().count() > self.min_text_len
            && (self.loading_marker.is_empty() || !snapshot.text.contains(&self.loading_marker))
            && snapshot.root_children >= 1
    }
}

/// What a single probe sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub text: String,
    pub root_children: usize,
}

/// An open, script-capable, invisible rendering context.
#[async_trait]
pub trait RenderSurface: Send {
    async fn probe(&mut self, root_id: &str) -> anyhow::Result<SurfaceSnapshot>;

    /// Serialized document as it currently stands.
    async fn source(&mut self) -> anyhow::Result<String>;

    async fn teardown(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    /// Create a surface with `document` already written into it.
    async fn open(&self, document: &str) -> anyhow::Result<Box<dyn RenderSurface>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydratedContent {
    pub text: String,
    pub html: String,
    /// Probes issued before the loop stopped.
    pub attempts: u32,
    /// False when the attempt cap was reached.
    pub ready: bool,
}

pub struct HydrationRenderer {
    factory: Arc<dyn SurfaceFactory>,
    policy: HydrationPolicy,
}

impl HydrationRenderer {
    pub fn new(factory: Arc<dyn SurfaceFactory>, policy: HydrationPolicy) -> Self {
        Self { factory, policy }
    }

    pub fn policy(&self) -> &HydrationPolicy {
        &self.policy
    }

    /// Render `markup` as if served from `url` and return whatever text has
    /// materialized. A timeout is not an error. The surface is torn down
    /// before this returns, whether or not the page became ready.
    pub async fn render_and_wait(
        &self,
        url: &Url,
        markup: &str,
    ) -> Result<HydratedContent, RenderError> {
        let document = compose_surface_document(url, markup);
        let mut surface = self
            .factory
            .open(&document)
            .await
            .map_err(RenderError::Surface)?;

        let content = self.wait_and_read(surface.as_mut(), &document).await;

        if let Err(e) = surface.teardown().await {
            tracing::warn!(target: "web.hydrate", error = %e, "surface.teardown_failed");
        }
        Ok(content)
    }

    async fn wait_and_read(&self, surface: &mut dyn RenderSurface, document: &str) -> HydratedContent {
        let policy = &self.policy;
        let started = Instant::now();
        if !policy.settle.is_zero() {
            sleep(policy.settle).await;
        }

        let mut last = SurfaceSnapshot::default();
        let mut attempts = 0;
        let mut ready = false;
        while attempts < policy.max_attempts {
            attempts += 1;
            match surface.probe(&policy.root_id).await {
                Ok(snapshot) => {
                    ready = policy.is_ready(&snapshot);
                    tracing::trace!(
                        target: "web.hydrate",
                        attempt = attempts,
                        text_len = snapshot.text.len(),
                        root_children = snapshot.root_children,
                        ready,
                        "hydrate.probe"
                    );
                    last = snapshot;
                }
                Err(e) => {
                    tracing::debug!(target: "web.hydrate", attempt = attempts, error = %e, "hydrate.probe_failed");
                }
            }
            if ready {
                break;
            }
            sleep(policy.interval).await;
        }

        let text = match surface.probe(&policy.root_id).await {
            Ok(snapshot) => snapshot.text,
            Err(e) => {
                tracing::warn!(target: "web.hydrate", error = %e, "hydrate.final_text_failed");
                last.text
            }
        };
        let html = match surface.source().await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(target: "web.hydrate", error = %e, "hydrate.final_source_failed");
                document.to_string()
            }
        };

        tracing::info!(
            target: "web.hydrate",
            attempts,
            ready,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "hydrate.done"
        );
        HydratedContent {
            text,
            html,
            attempts,
            ready,
        }
    }
}

/// The markup with a `<base>` pointing at `url` and a viewport directive
/// placed first in `<head>`, so relative links and responsive scripts
/// behave as on the live site.
pub fn compose_surface_document(url: &Url, markup: &str) -> String {
    let inject = format!(
        r#"<base href="{}">{}"#,
        escape_attr(url.as_str()),
        VIEWPORT_META
    );
    let lower = markup.to_ascii_lowercase();

    if let Some(at) = find_open_tag(&lower, "head") {
        return splice(markup, at, &inject);
    }
    let head = format!("<head>{inject}</head>");
    if let Some(at) = find_open_tag(&lower, "html") {
        return splice(markup, at, &head);
    }
    if lower.trim_start().starts_with("<!doctype") {
        if let Some(end) = lower.find('>') {
            return splice(markup, end + 1, &head);
        }
    }
    format!("{head}{markup}")
}

/// Elements whose content is text, not markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Byte offset just past the `>` of the first real `<name ...>` tag.
/// Comments and the bodies of raw-text elements are skipped.
fn find_open_tag(lower: &str, name: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = lower[from..].find('<') {
        let start = from + pos;
        let rest = &lower[start..];
        if let Some(comment) = rest.strip_prefix("<!--") {
            from = start + 4 + comment.find("-->")? + 3;
            continue;
        }
        if let Some(end) = open_tag_end(rest, name) {
            return Some(start + end);
        }
        if let Some(raw) = RAW_TEXT_ELEMENTS
            .iter()
            .find(|raw| open_tag_end(rest, raw).is_some())
        {
            let close = format!("</{raw}");
            from = start + rest.find(&close)? + close.len();
            continue;
        }
        from = start + 1;
    }
    None
}

/// When `rest` starts with `<name` followed by a tag delimiter, the length
/// of that opening tag including its `>`.
fn open_tag_end(rest: &str, name: &str) -> Option<usize> {
    let after = rest.strip_prefix('<')?.strip_prefix(name)?;
    match after.chars().next() {
        Some(c) if c == '>' || c == '/' || c.is_ascii_whitespace() => {
            let head_len = rest.len() - after.len();
            after.find('>').map(|gt| head_len + gt + 1)
        }
        _ => None,
    }
}

fn splice(markup: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(markup.len() + insert.len());
    out.push_str(&markup[..at]);
    out.push_str(insert);
    out.push_str(&markup[at..]);
    out
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

//! Fetch → parse → detect → (maybe) render, strictly in that order.

use crate::browser::WebDriverSurfaceFactory;
use crate::detect::{Detector, RenderModeDecision};
use crate::document::{ParsedDocument, StaticMetadata, extract_metadata, visible_text};
use crate::hydrate::{HydrationPolicy, HydrationRenderer, RenderError};
use crate::proxy::{FetchError, ProxyFetcher};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use toolz_config::ToolzConfig;
use url::Url;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl PipelineError {
    /// Short message suitable for showing to a person.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "please enter a valid http(s) URL",
            Self::Fetch(_) => "unable to fetch the page",
            Self::Render(_) => "unable to render the page",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub og_image: String,
    pub is_react_app: bool,
}

impl PageMetadata {
    pub fn compose(meta: StaticMetadata, decision: &RenderModeDecision) -> Self {
        Self {
            title: meta.title,
            description: meta.description,
            og_image: meta.og_image,
            is_react_app: decision.client_rendered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationReport {
    pub attempts: u32,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub url: String,
    /// Relay that served the markup.
    pub proxy: String,
    pub metadata: PageMetadata,
    /// Whether the page looked client-rendered, and why.
    pub detection: RenderModeDecision,
    pub text_content: String,
    pub html_content: String,
    pub rendered_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hydration: Option<HydrationReport>,
}

/// Everything the pipeline needs from the parsed tree.
struct StaticView {
    metadata: StaticMetadata,
    decision: RenderModeDecision,
    text: String,
}

pub struct PagePipeline {
    fetcher: ProxyFetcher,
    detector: Detector,
    renderer: Option<HydrationRenderer>,
}

impl PagePipeline {
    pub fn new(fetcher: ProxyFetcher, detector: Detector, renderer: Option<HydrationRenderer>) -> Self {
        Self {
            fetcher,
            detector,
            renderer,
        }
    }

    /// Relays, detector lists and hydration policy from config; rendering
    /// goes through the configured WebDriver service unless disabled.
    pub fn from_config(cfg: &ToolzConfig) -> Result<Self, PipelineError> {
        let fetcher = ProxyFetcher::from_config(&cfg.http, &cfg.proxies)?;
        let renderer = cfg.hydration.enabled.then(|| {
            HydrationRenderer::new(
                Arc::new(WebDriverSurfaceFactory::from_spec(&cfg.webdriver)),
                HydrationPolicy::from(&cfg.hydration),
            )
        });
        Ok(Self::new(fetcher, Detector::from_spec(&cfg.detector), renderer))
    }

    /// Skip the hydration wait; client-rendered pages report static text.
    pub fn without_rendering(mut self) -> Self {
        self.renderer = None;
        self
    }

    pub async fn run(&self, url: &str) -> Result<PipelineResult, PipelineError> {
        let target = parse_target(url)?;
        tracing::info!(target: "web.pipeline", url = %target, "pipeline.start");

        let payload = self.fetcher.fetch(&target).await?;
        let view = self.inspect(&payload.markup);
        let metadata = PageMetadata::compose(view.metadata, &view.decision);

        let hydrated = match (&self.renderer, view.decision.client_rendered) {
            (Some(renderer), true) => Some(renderer.render_and_wait(&target, &payload.markup).await?),
            (None, true) => {
                tracing::info!(target: "web.pipeline", "pipeline.render_disabled");
                None
            }
            (_, false) => None,
        };

        let (rendered_content, html_content, hydration) = match hydrated {
            Some(h) => (
                h.text,
                h.html,
                Some(HydrationReport {
                    attempts: h.attempts,
                    ready: h.ready,
                }),
            ),
            None => (view.text.clone(), payload.markup, None),
        };

        tracing::info!(
            target: "web.pipeline",
            proxy = %payload.proxy,
            react = metadata.is_react_app,
            rendered = hydration.is_some(),
            "pipeline.done"
        );
        Ok(PipelineResult {
            url: target.to_string(),
            proxy: payload.proxy,
            metadata,
            detection: view.decision,
            text_content: view.text,
            html_content,
            rendered_content,
            hydration,
        })
    }

    // The parsed tree is !Send; it must not live across an await.
    fn inspect(&self, markup: &str) -> StaticView {
        let doc = ParsedDocument::parse(markup);
        StaticView {
            metadata: extract_metadata(&doc),
            decision: self.detector.detect(&doc, markup),
            text: visible_text(&doc),
        }
    }
}

fn parse_target(url: &str) -> Result<Url, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let target = Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
    match target.scheme() {
        "http" | "https" => Ok(target),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}

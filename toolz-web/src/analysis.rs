//! Turns a pipeline result into a review prompt and sends it to the model.

use crate::pipeline::PipelineResult;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use toolz_common::Result;
use toolz_llm::traits::LlmClient;

/// Page text beyond this many characters is cut before prompting.
pub const MAX_PROMPT_CONTENT_CHARS: usize = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    #[default]
    Quick,
    Comprehensive,
    Expert,
}

impl AnalysisDepth {
    /// Only the quick pass may run without a model.
    pub fn requires_model(self) -> bool {
        !matches!(self, Self::Quick)
    }

    fn instructions(self) -> &'static str {
        match self {
            Self::Quick => "Keep it short: the three most important findings and one fix for each.",
            Self::Comprehensive => {
                "Cover each focus area in its own section with findings and concrete recommendations."
            }
            Self::Expert => {
                "Give an expert audit: for each focus area list issues ordered by expected impact, \
                 explain the evidence from the page, and estimate effort for each recommendation."
            }
        }
    }
}

impl FromStr for AnalysisDepth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "comprehensive" => Ok(Self::Comprehensive),
            "expert" => Ok(Self::Expert),
            other => Err(format!("unknown analysis depth: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    Technical,
    Content,
    Conversion,
}

impl FocusArea {
    pub const ALL: [FocusArea; 3] = [Self::Technical, Self::Content, Self::Conversion];

    /// `focus`, or every area when it is empty.
    pub fn effective(focus: &[FocusArea]) -> &[FocusArea] {
        if focus.is_empty() { &Self::ALL } else { focus }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Technical => "Technical Performance",
            Self::Content => "Content Quality",
            Self::Conversion => "Conversion Optimization",
        }
    }
}

impl fmt::Display for FocusArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FocusArea {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "technical" => Ok(Self::Technical),
            "content" => Ok(Self::Content),
            "conversion" => Ok(Self::Conversion),
            other => Err(format!("unknown focus area: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnalysis {
    pub depth: AnalysisDepth,
    pub focus: Vec<FocusArea>,
    pub model: Option<String>,
    pub text: String,
    pub tokens_used: Option<u32>,
}

pub fn build_analysis_prompt(page: &PipelineResult, depth: AnalysisDepth, focus: &[FocusArea]) -> String {
    let areas = FocusArea::effective(focus)
        .iter()
        .enumerate()
        .map(|(i, area)| format!("{}. {}", i + 1, area.label()))
        .collect::<Vec<_>>()
        .join("\n");
    let meta = &page.metadata;
    let hydration_note = match &page.hydration {
        Some(h) if !h.ready => "\nNote: the page is client-rendered and did not finish hydrating; content may be partial.\n",
        _ => "",
    };

    format!(
        "Analyze this landing page.\n\
         \n\
         URL: {url}\n\
         \n\
         Page Metadata:\n\
         - Title: {title}\n\
         - Description: {description}\n\
         - Social Image: {og_image}\n\
         - Is React App: {react}\n\
         {hydration_note}\
         \n\
         Page Content:\n\
         {content}\n\
         \n\
         Please provide analysis on:\n\
         {areas}\n\
         \n\
         {instructions}",
        url = page.url,
        title = meta.title,
        description = meta.description,
        og_image = meta.og_image,
        react = meta.is_react_app,
        content = truncate_chars(&page.rendered_content, MAX_PROMPT_CONTENT_CHARS),
        instructions = depth.instructions(),
    )
}

pub async fn analyze_page(
    llm: &dyn LlmClient,
    page: &PipelineResult,
    depth: AnalysisDepth,
    focus: &[FocusArea],
) -> Result<PageAnalysis> {
    let prompt = build_analysis_prompt(page, depth, focus);
    tracing::info!(target: "web.analysis", model = %llm.model_name(), depth = ?depth, prompt_chars = prompt.chars().count(), "analysis.request");
    let resp = llm
        .generate(&prompt, Some(llm.default_analyst_system_prompt()), None, Some(0.4))
        .await?;
    Ok(PageAnalysis {
        depth,
        focus: FocusArea::effective(focus).to_vec(),
        model: resp.model,
        text: resp.text,
        tokens_used: resp.tokens_used,
    })
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

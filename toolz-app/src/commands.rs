use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};
use toolz_common::observability::{LogConfig, init_logging};
use toolz_common::{DEFAULT_GEMINI_MODEL, LlmConfig};
use toolz_config::{LlmSpec, LoggingSpec, ToolzConfig, ToolzConfigLoader};
use toolz_web::analysis::{AnalysisDepth, FocusArea, PageAnalysis, analyze_page};
use toolz_web::{PagePipeline, PipelineError, PipelineResult};

const DEFAULT_CONFIG_FILE: &str = "toolz.yaml";

#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub page: PipelineResult,
    /// Absent for a quick pass without an API key.
    pub analysis: Option<PageAnalysis>,
}

pub fn load_config(path: Option<&Path>) -> Result<ToolzConfig> {
    let loader = match path {
        Some(p) => ToolzConfigLoader::new().with_file(p),
        None => ToolzConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };
    loader.load().context("failed to load configuration")
}

pub fn init_logging_from(spec: &LoggingSpec) -> Result<PathBuf> {
    init_logging(LogConfig {
        app_name: "toolz",
        log_dir: spec.dir.as_ref().map(PathBuf::from),
        emit_stderr: spec.stderr,
        format: spec.format.parse()?,
        default_filter: spec.filter.clone(),
    })
}

pub async fn fetch(cfg: &ToolzConfig, url: &str, no_render: bool) -> Result<PipelineResult> {
    let mut pipeline = PagePipeline::from_config(cfg)?;
    if no_render {
        pipeline = pipeline.without_rendering();
    }
    Ok(pipeline.run(url).await?)
}

pub async fn analyze(
    cfg: &ToolzConfig,
    url: &str,
    api_key: Option<String>,
    depth: AnalysisDepth,
    focus: &[FocusArea],
    no_render: bool,
) -> Result<AnalysisReport> {
    let llm_config = resolve_llm(cfg.llm.as_ref(), api_key);
    if llm_config.is_none() && depth.requires_model() {
        bail!("an API key is required for comprehensive or expert analysis");
    }

    let page = fetch(cfg, url, no_render).await?;
    let analysis = match llm_config {
        Some(llm_config) => {
            let llm = toolz_llm::ensure_llm_ready(&llm_config)?;
            Some(analyze_page(llm.as_ref(), &page, depth, focus).await?)
        }
        None => {
            tracing::info!("analysis.skipped_without_key");
            None
        }
    };
    Ok(AnalysisReport { page, analysis })
}

/// CLI key first, then the configured one. Unexpanded `${VAR}` placeholders
/// count as missing.
pub fn resolve_llm(spec: Option<&LlmSpec>, api_key: Option<String>) -> Option<LlmConfig> {
    let (configured_key, model, base_url) = match spec {
        Some(LlmSpec::Gemini {
            api_key,
            model,
            endpoint,
        }) => (Some(api_key.clone()), Some(model.clone()), Some(endpoint.clone())),
        None => (None, None, None),
    };
    let usable = |k: &String| !k.trim().is_empty() && !k.contains("${");
    let api_key = api_key
        .filter(usable)
        .or_else(|| configured_key.filter(usable))?;
    Some(LlmConfig::Gemini {
        api_key,
        model: model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        base_url,
    })
}

pub fn user_message(e: &anyhow::Error) -> String {
    match e.downcast_ref::<PipelineError>() {
        Some(p) => p.user_message().to_string(),
        None => format!("{e:#}"),
    }
}

pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

//! Landing-page acquisition pipeline.
//!
//! - Relay fetcher with ordered fallback (`proxy`)
//! - Lenient parsing, metadata and static text (`document`)
//! - Client-render heuristics (`detect`)
//! - Hydration wait over an isolated rendering surface (`hydrate`), backed
//!   by a WebDriver sandbox in production (`browser`)
//! - The composed fetch → parse → detect → render flow (`pipeline`)
//! - Prompt building for the page review (`analysis`)

pub mod analysis;
pub mod browser;
pub mod detect;
pub mod document;
pub mod hydrate;
pub mod pipeline;
pub mod proxy;

pub use pipeline::{PageMetadata, PagePipeline, PipelineError, PipelineResult};

//! Heuristic classifier for client-rendered pages.
//!
//! Independent signals OR-ed together. A false positive costs a hydration
//! wait, a false negative costs some text, so the lists favour recall.

use crate::document::ParsedDocument;
use serde::Serialize;
use toolz_config::DetectorSpec;

/// One heuristic that matched, with the configured value that matched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Signal {
    RootId(String),
    RootAttribute(String),
    ScriptSrc(String),
    RawSignature(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderModeDecision {
    pub client_rendered: bool,
    pub signals: Vec<Signal>,
}

#[derive(Debug, Clone)]
pub struct Detector {
    spec: DetectorSpec,
}

impl Default for Detector {
    fn default() -> Self {
        Self::from_spec(&DetectorSpec::default())
    }
}

impl Detector {
    pub fn from_spec(spec: &DetectorSpec) -> Self {
        Self { spec: spec.clone() }
    }

    /// Evaluate every heuristic over the tree and the unparsed markup. Raw
    /// text matters because script bodies are not reliably kept verbatim.
    pub fn detect(&self, doc: &ParsedDocument, raw: &str) -> RenderModeDecision {
        let mut signals = Vec::new();

        for id in &self.spec.root_ids {
            if doc.elements().any(|el| el.value().id() == Some(id.as_str())) {
                signals.push(Signal::RootId(id.clone()));
            }
        }
        for attr in &self.spec.root_attributes {
            if doc.elements().any(|el| el.value().attr(attr).is_some()) {
                signals.push(Signal::RootAttribute(attr.clone()));
            }
        }

        let script_sources: Vec<&str> = doc
            .elements()
            .filter(|el| el.value().name() == "script")
            .filter_map(|el| el.value().attr("src"))
            .collect();
        for marker in &self.spec.script_markers {
            if !marker.is_empty() && script_sources.iter().any(|src| src.contains(marker.as_str())) {
                signals.push(Signal::ScriptSrc(marker.clone()));
            }
        }

        for signature in &self.spec.raw_signatures {
            if !signature.is_empty() && raw.contains(signature.as_str()) {
                signals.push(Signal::RawSignature(signature.clone()));
            }
        }

        tracing::debug!(target: "web.detect", signals = signals.len(), "detect.done");
        RenderModeDecision {
            client_rendered: !signals.is_empty(),
            signals,
        }
    }
}

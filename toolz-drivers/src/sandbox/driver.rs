use crate::sandbox::launch::{build_browser_arguments, SandboxOptions, SandboxScripts};
use anyhow::{Context, Result};
use fantoccini::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use webdriver::capabilities::Capabilities;

/// One look at the sandbox while scripts run.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SandboxProbe {
    pub text: String,
    #[serde(rename = "rootChildren")]
    pub root_children: usize,
}

/// Thin wrapper around a `fantoccini` WebDriver session used as a
/// throwaway rendering sandbox.
pub struct SandboxDriver {
    client: Client,
}

impl SandboxDriver {
    /// Start a new browser session on the configured WebDriver service.
    pub async fn launch(opts: &SandboxOptions) -> Result<Self> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();
        chrome_opts.insert("args".to_string(), json!(build_browser_arguments(opts)));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&opts.webdriver_url)
            .await
            .with_context(|| format!("failed to open WebDriver session at {}", opts.webdriver_url))?;

        tracing::debug!(target: "driver.sandbox", webdriver = %opts.webdriver_url, "sandbox.launched");
        Ok(Self { client })
    }

    /// Navigate to a blank page and write `html` into it.
    pub async fn load_document(&self, html: &str) -> Result<()> {
        self.client
            .goto("about:blank")
            .await
            .context("failed to open blank sandbox page")?;
        self.client
            .execute(SandboxScripts::write_document(), vec![json!(html)])
            .await
            .context("failed to write sandbox document")?;
        Ok(())
    }

    /// Read body text and the child count of the element with id `root_id`.
    pub async fn probe(&self, root_id: &str) -> Result<SandboxProbe> {
        let value = self
            .client
            .execute(SandboxScripts::probe(), vec![json!(root_id)])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Return the serialized document as the browser currently sees it.
    pub async fn source(&self) -> Result<String> {
        self.client.source().await.map_err(anyhow::Error::from)
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

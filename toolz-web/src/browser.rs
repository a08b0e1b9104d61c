use crate::hydrate::{RenderSurface, SurfaceFactory, SurfaceSnapshot};
use anyhow::Result;
use toolz_config::WebDriverSpec;
use toolz_drivers::sandbox::driver::SandboxDriver;
use toolz_drivers::sandbox::launch::SandboxOptions;

/// Opens one WebDriver session per surface.
#[derive(Debug, Clone, Default)]
pub struct WebDriverSurfaceFactory {
    options: SandboxOptions,
}

impl WebDriverSurfaceFactory {
    pub fn new(options: SandboxOptions) -> Self {
        Self { options }
    }

    pub fn from_spec(spec: &WebDriverSpec) -> Self {
        Self::new(SandboxOptions {
            webdriver_url: spec.url.clone(),
            headless: spec.headless,
            window_width: spec.window_width,
            window_height: spec.window_height,
            user_agent: spec.user_agent.clone(),
            disable_web_security: spec.disable_web_security,
        })
    }
}

#[async_trait::async_trait]
impl SurfaceFactory for WebDriverSurfaceFactory {
    async fn open(&self, document: &str) -> Result<Box<dyn RenderSurface>> {
        let driver = SandboxDriver::launch(&self.options).await?;
        if let Err(e) = driver.load_document(document).await {
            // close the half-opened session before reporting
            if let Err(close_err) = driver.close().await {
                tracing::warn!(target: "web.hydrate", error = %close_err, "surface.close_failed");
            }
            return Err(e);
        }
        Ok(Box::new(WebDriverSurface { driver }))
    }
}

struct WebDriverSurface {
    driver: SandboxDriver,
}

#[async_trait::async_trait]
impl RenderSurface for WebDriverSurface {
    async fn probe(&mut self, root_id: &str) -> Result<SurfaceSnapshot> {
        let probe = self.driver.probe(root_id).await?;
        Ok(SurfaceSnapshot {
            text: probe.text,
            root_children: probe.root_children,
        })
    }

    async fn source(&mut self) -> Result<String> {
        self.driver.source().await
    }

    async fn teardown(self: Box<Self>) -> Result<()> {
        self.driver.close().await
    }
}

use serde::{Deserialize, Serialize};

/// How the sandbox browser is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOptions {
    /// WebDriver endpoint (chromedriver by default).
    pub webdriver_url: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    pub disable_web_security: bool,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            window_width: 1024,
            window_height: 768,
            user_agent: None,
            disable_web_security: true,
        }
    }
}

/// Construct Chrome command‑line arguments for a sandbox session.
pub fn build_browser_arguments(opts: &SandboxOptions) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--disable-extensions".to_string(),
        "--mute-audio".to_string(),
        format!("--window-size={},{}", opts.window_width, opts.window_height),
    ];
    // The document lives on about:blank; without this the page's own API
    // calls are cross-origin and hydration never completes.
    if opts.disable_web_security {
        args.push("--disable-web-security".to_string());
    }
    if let Some(ua) = &opts.user_agent {
        args.push(format!("--user-agent={ua}"));
    }
    if opts.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args
}

/// JavaScript executed inside the sandbox.
pub struct SandboxScripts;

impl SandboxScripts {
    /// Replace the blank document with `arguments[0]`, exactly once.
    pub fn write_document() -> &'static str {
        r#"
            document.open();
            document.write(arguments[0]);
            document.close();
        "#
    }

    /// Report materialized text and the child count of element `arguments[0]`.
    pub fn probe() -> &'static str {
        r#"
            const root = document.getElementById(arguments[0]);
            return {
                text: document.body ? (document.body.innerText || '') : '',
                rootChildren: root ? root.children.length : 0
            };
        "#
    }
}

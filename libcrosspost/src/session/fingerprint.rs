use rand::seq::SliceRandom;

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
];

const VIEWPORTS: [(u32, u32); 4] = [(1920, 1080), (1366, 768), (1536, 864), (1440, 900)];

// US marketplaces; timezone and locale stay consistent with each other.
const REGIONS: [(&str, &str); 4] = [
    ("America/New_York", "en-US"),
    ("America/Chicago", "en-US"),
    ("America/Denver", "en-US"),
    ("America/Phoenix", "en-US"),
];

/// Client identity presented by one session
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub timezone: String,
    pub locale: String,
}

impl FingerprintConfig {
    /// Generate a randomized fingerprint configuration
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();

        let user_agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
        let (width, height) = VIEWPORTS.choose(&mut rng).copied().unwrap_or(VIEWPORTS[0]);
        let (timezone, locale) = REGIONS.choose(&mut rng).copied().unwrap_or(REGIONS[0]);

        Self {
            user_agent: user_agent.to_string(),
            viewport_width: width,
            viewport_height: height,
            timezone: timezone.to_string(),
            locale: locale.to_string(),
        }
    }

    /// `Accept-Language` value matching the locale
    pub fn accept_language(&self) -> String {
        let primary = self.locale.split('-').next().unwrap_or("en");
        format!("{},{};q=0.9", self.locale, primary)
    }

    /// Script run before any page script to hide automation markers
    pub fn stealth_script(&self) -> String {
        let primary = self.locale.split('-').next().unwrap_or("en");
        format!(
            r#"
Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3, 4, 5] }});
Object.defineProperty(navigator, 'languages', {{ get: () => ['{locale}', '{primary}'] }});
window.chrome = window.chrome || {{ runtime: {{}} }};
"#,
            locale = self.locale,
            primary = primary
        )
    }

    /// Extra request headers sent with every navigation
    pub fn extra_headers(&self) -> serde_json::Value {
        serde_json::json!({
            "Accept-Language": self.accept_language(),
            "Accept": "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            "DNT": "1",
            "Upgrade-Insecure-Requests": "1",
        })
    }
}

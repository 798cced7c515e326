use std::time::Duration;

use irs_core::error::AppError;

const HEALTH_TIMEOUT: Duration = Duration::from_millis(800);

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    timeout: Duration,
}

fn invalid(base_url: &str, message: &str) -> AppError {
    AppError::new("AI_INVALID_ENDPOINT", message.to_string()).with_details(format!("base_url={base_url}"))
}

impl OllamaClient {
    /// Create a client for an Ollama server root such as `http://10.0.1.20:11434`.
    ///
    /// Only a scheme, host and optional port are accepted: no credentials, no path, no
    /// query. A trailing slash is trimmed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let rest = base_url
            .strip_prefix("http://")
            .or_else(|| base_url.strip_prefix("https://"))
            .ok_or_else(|| invalid(&base_url, "Ollama endpoint must be an http(s) URL"))?;

        if rest.is_empty() || rest.contains(|c: char| matches!(c, '/' | '?' | '#' | '@')) {
            return Err(invalid(
                &base_url,
                "Ollama endpoint must be scheme://host[:port] with no credentials or path",
            ));
        }

        let (host, port) = match rest.rsplit_once(':') {
            // IPv6 literals carry their own colons; only split when the tail is outside brackets.
            Some((h, p)) if !p.contains(']') => (h, Some(p)),
            _ => (rest, None),
        };
        if host.is_empty() {
            return Err(invalid(&base_url, "Ollama endpoint has no host"));
        }
        if let Some(p) = port {
            match p.parse::<u16>() {
                Ok(n) if n > 0 => {}
                _ => return Err(invalid(&base_url, "Ollama endpoint port is invalid")),
            }
        }

        if timeout.is_zero() {
            return Err(AppError::new("AI_INVALID_ENDPOINT", "Generation timeout must be greater than 0"));
        }

        Ok(Self { base_url, timeout })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = ureq::get(&url).timeout(HEALTH_TIMEOUT).call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new("AI_OLLAMA_UNHEALTHY", "Ollama health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(AppError::unavailable("AI_UNAVAILABLE", "Failed to reach Ollama")
                .with_details(format!("base_url={}; err={e}", self.base_url))),
        }
    }
}

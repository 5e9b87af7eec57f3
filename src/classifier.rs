use std::collections::HashMap;
use std::error::Error as _;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::Category;
use crate::config::Config;

/// Failure classes of one classification attempt. Everything except
/// `NotConfigured` is retried; after the attempt budget is spent the batch
/// degrades to `Other` rather than surfacing an error.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier endpoint not configured")]
    NotConfigured,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("request exceeded {0:?} deadline")]
    Timeout(Duration),
    #[error("unparsable response: {0}")]
    Parse(String),
}

/// Transport seam between the classifier and the external endpoint. The
/// production implementation speaks HTTP; tests script responses.
pub trait ClassifierTransport: Send + Sync {
    /// Send one instruction payload and return the endpoint's text
    /// completion.
    fn send(&self, prompt: &str, timeout: Duration) -> Result<String, ClassifyError>;
}

/// HTTP transport for the classification endpoint.
pub struct HttpTransport {
    url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

impl HttpTransport {
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl ClassifierTransport for HttpTransport {
    fn send(&self, prompt: &str, timeout: Duration) -> Result<String, ClassifyError> {
        if self.url.is_empty() {
            return Err(ClassifyError::NotConfigured);
        }

        let request = ChatRequest { message: prompt };
        let body = serde_json::to_string(&request)
            .map_err(|e| ClassifyError::Parse(format!("failed to serialize request: {}", e)))?;

        let response = ureq::post(&self.url)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .timeout(timeout)
            .send_string(&body)
            .map_err(|e| classify_ureq_error(e, timeout))?;

        let text = response
            .into_string()
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;
        let envelope: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ClassifyError::Parse(format!("bad response envelope: {}", e)))?;

        Ok(envelope.response)
    }
}

fn classify_ureq_error(e: ureq::Error, timeout: Duration) -> ClassifyError {
    if let ureq::Error::Status(code, _) = &e {
        return ClassifyError::Status(*code);
    }

    // Deadline overruns surface as io errors somewhere down the source chain.
    let mut source = e.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return ClassifyError::Timeout(timeout);
            }
        }
        source = inner.source();
    }

    ClassifyError::Transport(e.to_string())
}

/// Retry and timeout policy for one batch.
#[derive(Clone, Debug)]
pub struct ClassifyPolicy {
    /// Total attempts per batch (first try + retries).
    pub max_attempts: u32,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// First retry delay; doubles per subsequent retry.
    pub backoff_base: Duration,
}

impl Default for ClassifyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl ClassifyPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            timeout: config.request_timeout(),
            backoff_base: config.backoff_base(),
        }
    }
}

/// Batched client for the external classification endpoint.
///
/// Stateless: no cache mutation happens here, which keeps the classifier
/// independently testable against a scripted transport.
pub struct BatchClassifier {
    transport: Box<dyn ClassifierTransport>,
    policy: ClassifyPolicy,
}

impl BatchClassifier {
    pub fn new(transport: Box<dyn ClassifierTransport>, policy: ClassifyPolicy) -> Self {
        Self { transport, policy }
    }

    /// Build the classifier from configuration; `None` when no endpoint is
    /// configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.classifier_configured() {
            return None;
        }
        let transport = HttpTransport::new(&config.classifier_url, &config.classifier_api_key);
        Some(Self::new(Box::new(transport), ClassifyPolicy::from_config(config)))
    }

    /// Classify one bounded batch of descriptions.
    ///
    /// Never fails: when the attempt budget is exhausted every description in
    /// the batch resolves to `Other`.
    pub fn classify(&self, batch: &[String]) -> HashMap<String, Category> {
        if batch.is_empty() {
            return HashMap::new();
        }

        let prompt = build_prompt(batch);

        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.policy.backoff_base, attempt);
                log::warn!(
                    "retrying classification batch in {:?} (attempt {} of {})",
                    delay,
                    attempt + 1,
                    self.policy.max_attempts
                );
                thread::sleep(delay);
            }

            match self.attempt(&prompt, batch) {
                Ok(resolved) => return resolved,
                Err(ClassifyError::NotConfigured) => {
                    log::debug!("classifier not configured, batch defaults to Other");
                    return degrade_batch(batch);
                }
                Err(e) => {
                    log::warn!(
                        "classification attempt {} of {} failed: {}",
                        attempt + 1,
                        self.policy.max_attempts,
                        e
                    );
                }
            }
        }

        log::error!(
            "classification exhausted after {} attempts, {} descriptions default to Other",
            self.policy.max_attempts,
            batch.len()
        );
        degrade_batch(batch)
    }

    fn attempt(
        &self,
        prompt: &str,
        batch: &[String],
    ) -> Result<HashMap<String, Category>, ClassifyError> {
        let text = self.transport.send(prompt, self.policy.timeout)?;
        parse_batch_response(&text, batch)
    }
}

/// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, …
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt.saturating_sub(1))
}

fn degrade_batch(batch: &[String]) -> HashMap<String, Category> {
    batch
        .iter()
        .map(|description| (description.clone(), Category::Other))
        .collect()
}

fn build_prompt(batch: &[String]) -> String {
    let categories = Category::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let numbered = batch
        .iter()
        .enumerate()
        .map(|(i, description)| format!("{}. {}", i + 1, description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Categorize each of these bank transaction descriptions and return ONLY valid JSON (no markdown, no explanation).

Allowed categories: {}

Descriptions:
{}

Return a JSON object mapping each description's number (as a string) to one allowed category, e.g.:
{{"1": "Groceries", "2": "Other"}}

Use "Other" when unsure. Return ONLY the JSON object, nothing else."#,
        categories, numbered
    )
}

/// Map the endpoint's text back onto the batch: index `i+1` answers
/// `batch[i]`. A missing index or a name outside the closed category set
/// resolves that item to `Other`.
fn parse_batch_response(
    text: &str,
    batch: &[String],
) -> Result<HashMap<String, Category>, ClassifyError> {
    let json = extract_json(text)?;
    let raw: HashMap<String, String> =
        serde_json::from_str(json).map_err(|e| ClassifyError::Parse(e.to_string()))?;

    let mut resolved = HashMap::with_capacity(batch.len());
    for (index, description) in batch.iter().enumerate() {
        let category = raw
            .get(&(index + 1).to_string())
            .and_then(|name| Category::parse(name))
            .unwrap_or(Category::Other);
        resolved.insert(description.clone(), category);
    }

    Ok(resolved)
}

/// Locate the first balanced `{...}` span in free text. The endpoint
/// sometimes wraps its JSON in prose or a markdown fence; everything outside
/// the first object literal is ignored.
fn extract_json(text: &str) -> Result<&str, ClassifyError> {
    let start = text
        .find('{')
        .ok_or_else(|| ClassifyError::Parse("no JSON object in response".to_string()))?;
    let rest = &text[start..];
    let end = find_matching_brace(rest)
        .ok_or_else(|| ClassifyError::Parse("unbalanced JSON object in response".to_string()))?;
    Ok(&rest[..=end])
}

fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

//! Blocking Ollama client with bounded retry.
//!
//! One request is in flight at a time: the oracle endpoint is the dominant
//! cost and rate-limits itself, so the whole run is sequential by design.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::oracle::{CallOutcome, Oracle};

/// Retry behavior for transport failures: a fixed attempt budget with an
/// exponentially doubling delay between attempts.
///
/// Kept separate from the client so the decision logic (and its tests)
/// never touches real delays.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `n` (0-based).
    pub fn delay_for(&self, n: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(n)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(3),
        }
    }
}

/// HTTP client for the Ollama `generate` endpoint.
pub struct OllamaClient {
    agent: ureq::Agent,
    url: String,
    model: String,
    temperature: f64,
    num_ctx: u32,
    num_predict: u32,
    policy: RetryPolicy,
}

impl OllamaClient {
    pub fn from_config(cfg: &OracleConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build();
        Self {
            agent,
            url: cfg.url.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            num_ctx: cfg.num_ctx,
            num_predict: cfg.num_predict,
            policy: RetryPolicy {
                max_attempts: cfg.max_attempts.max(1),
                initial_delay: Duration::from_secs(cfg.backoff_secs),
            },
        }
    }

    /// One request, no retry. `format: "json"` asks the model for structured
    /// output; the salvage parser assumes it will not always comply.
    fn call_once(&self, prompt: &str, num_ctx: u32, num_predict: u32) -> CallOutcome {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": self.temperature,
                "num_ctx": num_ctx,
                "num_predict": num_predict,
            },
        });

        match self.agent.post(&self.url).send_json(payload) {
            Ok(resp) => match resp.into_json::<serde_json::Value>() {
                Ok(body) => {
                    let text = body
                        .get("response")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    CallOutcome::Success(text)
                }
                Err(e) => CallOutcome::TransportFailure(format!("invalid response body: {e}")),
            },
            Err(ureq::Error::Status(code, _)) => {
                CallOutcome::TransportFailure(format!("HTTP status {code}"))
            }
            Err(ureq::Error::Transport(t)) => {
                let msg = t.to_string();
                if msg.contains("timed out") || msg.contains("timeout") {
                    CallOutcome::Timeout
                } else {
                    CallOutcome::TransportFailure(msg)
                }
            }
        }
    }

    fn call_with_retry(&self, prompt: &str, num_ctx: u32, num_predict: u32) -> CallOutcome {
        let mut last = CallOutcome::TransportFailure("no attempt made".to_string());
        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying oracle call");
                std::thread::sleep(delay);
            }
            last = self.call_once(prompt, num_ctx, num_predict);
            match &last {
                CallOutcome::Success(_) => return last,
                CallOutcome::Timeout => warn!(attempt, "Oracle call timed out"),
                CallOutcome::TransportFailure(e) => warn!(attempt, error = %e, "Oracle call failed"),
            }
        }
        last
    }
}

impl Oracle for OllamaClient {
    fn classify(&self, prompt: &str) -> CallOutcome {
        self.call_with_retry(prompt, self.num_ctx, self.num_predict)
    }

    fn warm_up(&self) -> CallOutcome {
        // Tiny context and output: the point is loading the model, not the
        // answer.
        self.call_once("Respond: OK", 512, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_doubles() {
        let p = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(3),
        };
        assert_eq!(p.delay_for(0), Duration::from_secs(3));
        assert_eq!(p.delay_for(1), Duration::from_secs(6));
        assert_eq!(p.delay_for(2), Duration::from_secs(12));
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_failure() {
        let cfg = OracleConfig {
            // Reserved port on localhost; connection is refused immediately.
            url: "http://127.0.0.1:1/api/generate".to_string(),
            max_attempts: 1,
            backoff_secs: 0,
            timeout_secs: 2,
            ..Default::default()
        };
        let client = OllamaClient::from_config(&cfg);
        match client.classify("ping") {
            CallOutcome::TransportFailure(_) | CallOutcome::Timeout => {}
            CallOutcome::Success(_) => panic!("unexpected success against closed port"),
        }
    }
}

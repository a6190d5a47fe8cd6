//! Activation gate: the client proves it holds a valid code before the
//! conversation loop starts.

use reqwest::StatusCode;
use satchel_proto::{ActivateRequest, ActivateResponse};
use tokio::io::{AsyncBufRead, Lines};
use tracing::warn;

use crate::config::ClientConfig;

#[derive(Debug, PartialEq)]
pub enum Outcome {
    Granted { token: String },
    Rejected { error: String },
    Unavailable(String),
}

/// Classifies the backend's answer to one activation attempt.
///
/// A rejection (bad or missing code) is worth re-prompting for; anything
/// else means the backend itself is in trouble.
pub fn interpret(status: StatusCode, body: &[u8]) -> Outcome {
    if status.is_success() {
        return match serde_json::from_slice::<ActivateResponse>(body) {
            Ok(response) if response.success && !response.token.is_empty() => Outcome::Granted {
                token: response.token,
            },
            _ => Outcome::Unavailable("malformed activation response".to_string()),
        };
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
        // Rejection bodies carry an "error" string, with or without the
        // success flag.
        let error = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|body| body.get("error")?.as_str().map(str::to_string))
            .unwrap_or_else(|| "Invalid activation code".to_string());
        return Outcome::Rejected { error };
    }
    Outcome::Unavailable(format!("backend returned {status}"))
}

/// Prompts for a code (or uses the configured one first) until the backend
/// grants a token. Returns the token; EOF on stdin aborts.
pub async fn run<R>(
    http: &reqwest::Client,
    config: &ClientConfig,
    lines: &mut Lines<R>,
) -> anyhow::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let url = format!("{}/activate", config.gateway_url.trim_end_matches('/'));
    let mut preset = config.activation_code.clone();

    loop {
        let code = match preset.take() {
            Some(code) => code,
            None => {
                println!("Enter your activation code:");
                match lines.next_line().await? {
                    Some(line) if !line.trim().is_empty() => line.trim().to_string(),
                    Some(_) => continue,
                    None => anyhow::bail!("no activation code provided"),
                }
            }
        };

        let response = http
            .post(&url)
            .timeout(config.request_timeout)
            .json(&ActivateRequest {
                activation_code: code,
            })
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "activation request failed");
                println!("Could not reach the helper's backend. Please try again.");
                continue;
            }
        };

        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        match interpret(status, &body) {
            Outcome::Granted { token } => {
                println!("Activation successful!");
                return Ok(token);
            }
            Outcome::Rejected { error } => println!("{error}. Please try again."),
            Outcome::Unavailable(reason) => {
                warn!(%reason, "activation unavailable");
                println!("Activation is not available right now. Please try again.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granted_on_success_with_token() {
        let body = br#"{"success":true,"message":"Activation successful","token":"U0NIT09MMTIz"}"#;
        assert_eq!(
            interpret(StatusCode::OK, body),
            Outcome::Granted {
                token: "U0NIT09MMTIz".to_string()
            }
        );
    }

    #[test]
    fn unauthorized_is_a_rejection_worth_retrying() {
        let body = br#"{"success":false,"error":"Invalid activation code"}"#;
        assert_eq!(
            interpret(StatusCode::UNAUTHORIZED, body),
            Outcome::Rejected {
                error: "Invalid activation code".to_string()
            }
        );
    }

    #[test]
    fn missing_code_rejection_reads_the_error_body() {
        let body = br#"{"error":"Activation code is required"}"#;
        assert!(matches!(
            interpret(StatusCode::BAD_REQUEST, body),
            Outcome::Rejected { error } if error == "Activation code is required"
        ));
    }

    #[test]
    fn server_trouble_is_not_a_rejection() {
        assert!(matches!(
            interpret(StatusCode::INTERNAL_SERVER_ERROR, b""),
            Outcome::Unavailable(_)
        ));
        // 200 with a body missing the token is backend trouble too
        assert!(matches!(
            interpret(StatusCode::OK, br#"{"success":true,"message":"ok","token":""}"#),
            Outcome::Unavailable(_)
        ));
    }
}

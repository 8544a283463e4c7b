//! Model backends that turn prompts into raw command text.
//!
//! Every backend reports transport problems as a non-zero status on
//! [`ModelOutput`] rather than as a Rust error: the controller decides
//! whether such a failure aborts the session or only the current refine/fix
//! attempt. No backend retries on its own.

use crate::config::{Backend, Config};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use tracing::{debug, info, warn};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Raw text returned by a backend plus its status (`0` on success).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOutput {
    pub text: String,
    pub status: i32,
}

impl ModelOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: 0,
        }
    }

    pub fn failure(status: i32, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends one request to the model.
    ///
    /// `allow_unrestricted` asks the backend to skip its own interactive
    /// permission confirmations; it is only set in auto-execute mode.
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        allow_unrestricted: bool,
    ) -> ModelOutput;
}

/// Picks the backend named by the settings.
pub fn build_model_client(config: &Config, model: &str) -> Box<dyn ModelClient> {
    if config.use_mock {
        info!("Using mock model client ({} set)", crate::config::USE_MOCK_ENV);
        return Box::new(MockModelClient);
    }
    match config.backend {
        Backend::Cli => Box::new(ClaudeCliClient::new(&config.claude_command, model)),
        Backend::Api => Box::new(AnthropicApiClient::new(
            Box::new(ReqwestHttpClient::new()),
            config.anthropic_api_key.clone(),
            model,
        )),
    }
}

// =============================================================================
// Claude CLI backend
// =============================================================================

/// Runs the `claude` command-line tool in print mode.
pub struct ClaudeCliClient {
    command: String,
    model: String,
}

impl ClaudeCliClient {
    /// Creates a client for `command` and `model`.
    ///
    /// # Arguments
    ///
    /// * `command` - Program to run, parsed with shell quoting rules. It may
    ///   carry leading arguments (`npx claude`) or a quoted path
    ///   (`"/opt/My Tools/claude"`).
    /// * `model` - Model name passed through `--model`
    pub fn new(command: &str, model: &str) -> Self {
        Self {
            command: command.to_string(),
            model: model.to_string(),
        }
    }

    /// Splits the configured command into the program and full argument list.
    ///
    /// # Errors
    ///
    /// Fails when the command has unbalanced quotes or is empty.
    pub fn build_invocation(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        allow_unrestricted: bool,
    ) -> Result<(String, Vec<String>)> {
        let mut words = shell_words::split(&self.command)
            .with_context(|| format!("Invalid claude_command '{}'", self.command))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| anyhow!("No model command configured"))?;

        let mut args: Vec<String> = words.collect();
        args.extend([
            "-p".to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--system-prompt".to_string(),
            system_prompt.to_string(),
        ]);
        if allow_unrestricted {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.push(user_prompt.to_string());
        Ok((program, args))
    }
}

#[async_trait]
impl ModelClient for ClaudeCliClient {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        allow_unrestricted: bool,
    ) -> ModelOutput {
        let (program, args) =
            match self.build_invocation(system_prompt, user_prompt, allow_unrestricted) {
                Ok(invocation) => invocation,
                Err(e) => return ModelOutput::failure(1, format!("{:#}", e)),
            };
        let program_path = match which::which(&program) {
            Ok(path) => path,
            Err(_) => {
                return ModelOutput::failure(
                    127,
                    format!(
                        "'{}' was not found in PATH. Install it, or choose another backend with:\n  spell --set-default backend=api",
                        program
                    ),
                );
            }
        };

        info!("Invoking {} with model {}", program, self.model);
        debug!("Model arguments: {:?}", args);

        let output = tokio::process::Command::new(&program_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => {
                let status = output.status.code().unwrap_or(1);
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                if status != 0 {
                    warn!("{} exited with status {}", program, status);
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                }
                ModelOutput { text, status }
            }
            Err(e) => ModelOutput::failure(1, format!("Failed to run '{}': {}", program, e)),
        }
    }
}

// =============================================================================
// Anthropic HTTP API backend
// =============================================================================

/// Calls the Anthropic Messages API directly.
pub struct AnthropicApiClient {
    http: Box<dyn HttpClient>,
    api_key: Option<String>,
    model: String,
}

impl AnthropicApiClient {
    pub fn new(http: Box<dyn HttpClient>, api_key: Option<String>, model: &str) -> Self {
        Self {
            http,
            api_key,
            model: model.to_string(),
        }
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": [
                {
                    "role": "user",
                    "content": user_prompt
                }
            ]
        })
    }
}

/// Pulls the first text block out of a Messages API response.
fn extract_text(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("content")?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .and_then(|block| block.get("text"))
        .and_then(|text| text.as_str())
        .map(|text| text.to_string())
}

#[async_trait]
impl ModelClient for AnthropicApiClient {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _allow_unrestricted: bool,
    ) -> ModelOutput {
        let Some(api_key) = self.api_key.as_deref() else {
            return ModelOutput::failure(
                1,
                "No Anthropic API key found. Set the ANTHROPIC_API_KEY environment variable:\n  export ANTHROPIC_API_KEY=sk-ant-your-key-here",
            );
        };

        info!("Calling Anthropic API with model {}", self.model);
        let headers = [
            ("x-api-key", api_key),
            ("content-type", "application/json"),
            ("anthropic-version", ANTHROPIC_VERSION),
        ];
        let body = self.request_body(system_prompt, user_prompt);

        let response = match self.http.post_json(ANTHROPIC_MESSAGES_URL, &headers, &body).await {
            Ok(response) => response,
            Err(e) => return ModelOutput::failure(1, format!("Request to Anthropic API failed: {}", e)),
        };

        if !response.is_success() {
            warn!("Anthropic API returned HTTP {}", response.status);
            return ModelOutput::failure(
                1,
                format!("Anthropic API returned HTTP {}: {}", response.status, response.body),
            );
        }

        match extract_text(&response.body) {
            Some(text) => ModelOutput::success(text),
            None => ModelOutput::failure(
                1,
                format!("Could not read the Anthropic API response: {}", response.body),
            ),
        }
    }
}

// =============================================================================
// Mock backend
// =============================================================================

/// Deterministic backend for tests and offline demos.
pub struct MockModelClient;

impl MockModelClient {
    pub fn respond(&self, user_prompt: &str) -> ModelOutput {
        let prompt = user_prompt.to_lowercase();
        if prompt.contains("fail backend") {
            ModelOutput::failure(2, "mock backend failure")
        } else if prompt.contains("it failed (") {
            ModelOutput::success("```bash\necho fixed\n```")
        } else if prompt.contains("adjust the command") {
            ModelOutput::success("`ls -laS`")
        } else if prompt.contains("list files") {
            ModelOutput::success("```\nls -la\n```")
        } else if prompt.contains("missing file") {
            ModelOutput::success("rm missing_file")
        } else if prompt.contains("meaning of life") {
            ModelOutput::success("# No shell command can answer that")
        } else {
            let words: String = user_prompt
                .chars()
                .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                .collect();
            ModelOutput::success(format!("echo \"{}\"", words.trim()))
        }
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _allow_unrestricted: bool,
    ) -> ModelOutput {
        self.respond(user_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpResponse;
    use std::sync::Mutex;

    /// Transport that returns a canned response and records the request.
    struct CannedHttpClient {
        response: Option<HttpResponse>,
        seen: Mutex<Vec<serde_json::Value>>,
    }

    impl CannedHttpClient {
        fn new(status: u16, body: &str) -> Self {
            Self {
                response: Some(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn unreachable() -> Self {
            Self {
                response: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for CannedHttpClient {
        async fn post_json(
            &self,
            _url: &str,
            _headers: &[(&str, &str)],
            body: &serde_json::Value,
        ) -> Result<HttpResponse> {
            self.seen.lock().unwrap().push(body.clone());
            self.response.clone().ok_or_else(|| anyhow!("connection refused"))
        }
    }

    #[test]
    fn test_cli_args_default_mode() {
        let client = ClaudeCliClient::new("claude", "sonnet");
        let (program, args) = client.build_invocation("SYS", "list files", false).unwrap();
        assert_eq!(program, "claude");
        assert_eq!(
            args,
            vec!["-p", "--model", "sonnet", "--system-prompt", "SYS", "list files"]
        );
    }

    #[test]
    fn test_cli_args_unrestricted_mode() {
        let client = ClaudeCliClient::new("claude", "opus");
        let (_, args) = client.build_invocation("SYS", "list files", true).unwrap();
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));
        assert_eq!(args.last().unwrap(), "list files");
    }

    #[test]
    fn test_cli_args_keep_command_prefix_arguments() {
        let client = ClaudeCliClient::new("npx claude", "sonnet");
        let (program, args) = client.build_invocation("SYS", "hi", false).unwrap();
        assert_eq!(program, "npx");
        assert_eq!(args[0], "claude");
        assert_eq!(args[1], "-p");
    }

    #[test]
    fn test_cli_quoted_program_path_with_spaces() {
        let client = ClaudeCliClient::new("\"/opt/My Tools/claude\" --verbose", "sonnet");
        let (program, args) = client.build_invocation("SYS", "hi", false).unwrap();
        assert_eq!(program, "/opt/My Tools/claude");
        assert_eq!(args[0], "--verbose");
        assert_eq!(args[1], "-p");
    }

    #[test]
    fn test_cli_unbalanced_quotes_is_error() {
        let client = ClaudeCliClient::new("\"/opt/claude", "sonnet");
        assert!(client.build_invocation("SYS", "hi", false).is_err());
    }

    #[tokio::test]
    async fn test_cli_invalid_command_is_status_1() {
        let client = ClaudeCliClient::new("'unterminated", "sonnet");
        let output = client.invoke("SYS", "hi", false).await;
        assert_eq!(output.status, 1);
        assert!(output.text.contains("Invalid claude_command"));
    }

    #[tokio::test]
    async fn test_cli_empty_command_is_status_1() {
        let client = ClaudeCliClient::new("   ", "sonnet");
        let output = client.invoke("SYS", "hi", false).await;
        assert_eq!(output.status, 1);
        assert!(output.text.contains("No model command configured"));
    }

    #[tokio::test]
    async fn test_cli_missing_binary_is_status_127() {
        let client = ClaudeCliClient::new("definitely-not-a-real-binary-xyz", "sonnet");
        let output = client.invoke("SYS", "hi", false).await;
        assert_eq!(output.status, 127);
        assert!(output.text.contains("not found in PATH"));
    }

    #[tokio::test]
    async fn test_api_extracts_text() {
        let http = CannedHttpClient::new(
            200,
            r#"{"content":[{"type":"text","text":"ls -la"}],"stop_reason":"end_turn"}"#,
        );
        let client = AnthropicApiClient::new(Box::new(http), Some("sk-test".to_string()), "claude-x");
        let output = client.invoke("SYS", "list files", false).await;
        assert_eq!(output, ModelOutput::success("ls -la"));
    }

    #[tokio::test]
    async fn test_api_request_body_carries_prompts() {
        let client = AnthropicApiClient::new(
            Box::new(CannedHttpClient::new(200, "{}")),
            Some("k".to_string()),
            "claude-x",
        );
        let body = client.request_body("SYS", "USER");
        assert_eq!(body["model"], "claude-x");
        assert_eq!(body["system"], "SYS");
        assert_eq!(body["messages"][0]["content"], "USER");
    }

    #[tokio::test]
    async fn test_api_without_key_fails() {
        let client = AnthropicApiClient::new(Box::new(CannedHttpClient::new(200, "{}")), None, "m");
        let output = client.invoke("SYS", "hi", false).await;
        assert_eq!(output.status, 1);
        assert!(output.text.contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn test_api_http_error_is_failure_with_body() {
        let http = CannedHttpClient::new(401, r#"{"error":"invalid x-api-key"}"#);
        let client = AnthropicApiClient::new(Box::new(http), Some("bad".to_string()), "m");
        let output = client.invoke("SYS", "hi", false).await;
        assert_eq!(output.status, 1);
        assert!(output.text.contains("HTTP 401"));
        assert!(output.text.contains("invalid x-api-key"));
    }

    #[tokio::test]
    async fn test_api_transport_error_is_failure() {
        let client =
            AnthropicApiClient::new(Box::new(CannedHttpClient::unreachable()), Some("k".to_string()), "m");
        let output = client.invoke("SYS", "hi", false).await;
        assert!(!output.is_success());
        assert!(output.text.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_api_unparsable_body_is_failure() {
        let http = CannedHttpClient::new(200, "not json");
        let client = AnthropicApiClient::new(Box::new(http), Some("k".to_string()), "m");
        let output = client.invoke("SYS", "hi", false).await;
        assert_eq!(output.status, 1);
    }

    #[test]
    fn test_mock_responses() {
        let mock = MockModelClient;
        assert_eq!(mock.respond("list files").text, "```\nls -la\n```");
        assert!(mock.respond("meaning of life").text.starts_with('#'));
        assert_eq!(mock.respond("please fail backend").status, 2);
        assert_eq!(mock.respond("say hi!").text, "echo \"say hi\"");
    }

    #[test]
    fn test_build_model_client_honours_mock_flag() {
        let config = Config {
            use_mock: true,
            ..Config::default()
        };
        // Only checks construction; the mock never touches the network.
        let _client = build_model_client(&config, "sonnet");
    }
}

// src/mentor.rs

//! AI mentor passthrough.
//!
//! Builds a prompt from the learner's problem, code and last run, and sends it
//! to an OpenAI-compatible `/chat/completions` endpoint. When no API key is
//! configured, or every attempt fails, a keyword-based canned hint is
//! returned instead, so the UI always gets an answer.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::MentorConfig;
use crate::language::Language;

const MAX_RETRIES: u32 = 2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

static EXAMPLE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:example|test case)\s*\d*\s*:").expect("example header pattern is valid")
});

static INPUT_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\binput\s*:").expect("input header pattern is valid"));

static OUTPUT_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\boutput\s*:").expect("output header pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AssistKind {
    /// Conceptual hint, no code
    Hint,
    /// The next concrete step, with a small snippet
    NextStep,
    /// A complete worked solution
    Solution,
}

impl AssistKind {
    fn max_tokens(self) -> u32 {
        match self {
            AssistKind::Hint => 400,
            AssistKind::NextStep => 500,
            AssistKind::Solution => 2000,
        }
    }

    fn temperature(self) -> f32 {
        match self {
            AssistKind::Hint => 0.5,
            AssistKind::NextStep => 0.3,
            AssistKind::Solution => 0.2,
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            AssistKind::Hint => {
                "You are a helpful coding mentor who provides conceptual guidance without giving \
                 away solutions. You focus on teaching problem-solving strategies rather than \
                 providing direct answers."
            }
            AssistKind::NextStep => {
                "You are a helpful coding mentor who provides step-by-step coding guidance with \
                 syntactically correct, executable code."
            }
            AssistKind::Solution => {
                "You are a helpful coding mentor who provides complete, executable solutions with \
                 educational explanations. Always ensure code is syntactically correct and handles \
                 edge cases."
            }
        }
    }

    fn instructions(self) -> &'static str {
        match self {
            AssistKind::Hint => {
                "Provide a helpful conceptual hint that guides them toward the solution WITHOUT \
                 giving away the actual code. Start with the core concept needed, explain why it \
                 suits this problem, mention one or two edge cases, explain any errors \
                 conceptually, and end with an encouraging note. Do NOT provide actual code."
            }
            AssistKind::NextStep => {
                "Tell them the single next step to take from where their code is now. Include a \
                 short, syntactically correct snippet for that step only, and explain what it does."
            }
            AssistKind::Solution => {
                "Provide a complete, runnable solution in the same language, followed by a short \
                 explanation of the approach, its time and space complexity, and a few test cases \
                 that exercise the edge cases."
            }
        }
    }
}

/// Everything the mentor knows about the learner's current state.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistRequest {
    pub kind: AssistKind,
    #[serde(default)]
    pub problem_statement: String,
    pub language: Language,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub last_stdout: String,
    #[serde(default)]
    pub last_stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistResponse {
    pub kind: AssistKind,
    pub source: AssistSource,
    pub model: Option<String>,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Mentor {
    http: reqwest::Client,
    cfg: MentorConfig,
}

impl Mentor {
    pub fn new(cfg: MentorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, cfg })
    }

    pub fn is_configured(&self) -> bool {
        self.cfg.api_key.is_some()
    }

    #[tracing::instrument(skip_all, fields(kind = ?req.kind, language = %req.language))]
    pub async fn assist(&self, req: &AssistRequest) -> AssistResponse {
        let Some(api_key) = self.cfg.api_key.as_deref() else {
            tracing::debug!("no model API key configured, using fallback");
            return fallback_response(req);
        };

        let prompt = build_prompt(req);

        for attempt in 0..=MAX_RETRIES {
            match self.complete(api_key, req.kind, &prompt).await {
                Ok(content) => {
                    return AssistResponse {
                        kind: req.kind,
                        source: AssistSource::Model,
                        model: Some(self.cfg.model.clone()),
                        content,
                    }
                }
                Err(e) => tracing::warn!(attempt, error = %e, "chat completion failed"),
            }
        }

        fallback_response(req)
    }

    async fn complete(&self, api_key: &str, kind: AssistKind, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'));

        let body = json!({
            "model": self.cfg.model,
            "messages": [
                { "role": "system", "content": kind.system_prompt() },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": kind.max_tokens(),
            "temperature": kind.temperature(),
        });

        let mut request = self.http.post(&url).bearer_auth(api_key).json(&body);
        if let Some(org) = &self.cfg.org_id {
            request = request.header("OpenAI-Organization", org);
        }

        let completion: ChatCompletion = request
            .send()
            .await
            .context("Request to model API failed")?
            .error_for_status()
            .context("Model API returned an error status")?
            .json()
            .await
            .context("Model API returned an unexpected body")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            bail!("Model API returned an empty completion");
        }
        Ok(content)
    }
}

/// Build the user prompt for a request.
pub fn build_prompt(req: &AssistRequest) -> String {
    let code = if req.code.trim().is_empty() {
        "No code written yet"
    } else {
        req.code.as_str()
    };

    let mut prompt = format!(
        "You are an expert coding mentor. A student is working on this problem:\n\n\
         Problem: {}\n\
         Problem type: {}\n\
         Language: {}\n\
         Current code attempt:\n```{}\n{}\n```\n",
        req.problem_statement,
        classify_problem(&req.problem_statement),
        req.language,
        req.language,
        code
    );

    if !req.last_stdout.is_empty() || !req.last_stderr.is_empty() {
        let or_none = |s: &str, none: &'static str| {
            if s.is_empty() {
                none.to_string()
            } else {
                s.to_string()
            }
        };
        prompt.push_str(&format!(
            "\nRecent execution results:\nOutput: {}\nErrors: {}\n",
            or_none(&req.last_stdout, "No output"),
            or_none(&req.last_stderr, "No errors"),
        ));
    }

    if matches!(req.kind, AssistKind::NextStep | AssistKind::Solution) {
        let cases = extract_test_cases(&req.problem_statement, req.language);
        if !cases.is_empty() {
            prompt.push_str("\nPossible test cases extracted from the problem:\n");
            prompt.push_str(&cases);
        }
    }

    prompt.push('\n');
    prompt.push_str(req.kind.instructions());
    prompt
}

/// Pull worked examples out of a problem statement.
///
/// `Example N:` and `Test Case N:` blocks are taken whole, each running to the
/// next header. Without such headers, bare `Input: ... Output: ...` pairs are
/// used. Empty when the statement has neither.
pub fn extract_test_cases(statement: &str, language: Language) -> String {
    let mut cases: Vec<String> = split_at_headers(statement, &EXAMPLE_HEADER_RE)
        .into_iter()
        .filter(|body| !body.is_empty())
        .map(str::to_string)
        .collect();

    if cases.is_empty() {
        cases = split_at_headers(statement, &INPUT_HEADER_RE)
            .into_iter()
            .filter_map(|body| {
                let output = OUTPUT_HEADER_RE.find(body)?;
                Some(format!(
                    "Input: {}\nExpected Output: {}",
                    body[..output.start()].trim(),
                    body[output.end()..].trim()
                ))
            })
            .collect();
    }

    if cases.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    for (i, case) in cases.iter().enumerate() {
        out.push_str(&format!("Example {}:\n{}\n\n", i + 1, case));
    }

    let test_code = match language {
        Language::Python => "def test_solution():\n    assert solution(...) == expected_output\n",
        Language::JavaScript => {
            "function testSolution() {\n    console.assert(solution(...) === expectedOutput);\n}\n"
        }
        Language::Java => {
            "void testSolution() {\n    assertEquals(expectedOutput, solution(...));\n}\n"
        }
    };
    out.push_str(&format!(
        "Possible test code:\n```{}\n{}```\n",
        language, test_code
    ));
    out
}

/// Text following each header match, up to the next match.
fn split_at_headers<'a>(text: &'a str, header: &Regex) -> Vec<&'a str> {
    let headers: Vec<_> = header.find_iter(text).collect();
    headers
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let end = headers.get(i + 1).map_or(text.len(), |next| next.start());
            text[m.end()..end].trim()
        })
        .collect()
}

/// Rough problem category from keywords in the statement.
pub fn classify_problem(statement: &str) -> &'static str {
    let s = statement.to_lowercase();
    let any = |terms: &[&str]| terms.iter().any(|t| s.contains(t));

    if any(&["palindrome", "mirror", "reads the same"]) {
        "palindrome"
    } else if any(&["two sum", "pair sum", "find two numbers", "sum to target"]) {
        "two sum"
    } else if any(&["fibonacci", "sequence of numbers"]) {
        "fibonacci"
    } else if s.contains("binary search") {
        "binary search"
    } else if any(&["sort", "arrange", "order"]) {
        "sorting"
    } else if any(&["search", "find element", "locate"]) {
        "searching"
    } else if any(&["tree", "node"]) {
        "tree"
    } else if any(&["graph", "vertex", "edge", "connection"]) {
        "graph"
    } else if any(&["dynamic programming", "optimal substructure"]) {
        "dynamic programming"
    } else if any(&["recursion", "recursive"]) {
        "recursion"
    } else if any(&["string", "substring", "text"]) {
        "string"
    } else if any(&["array", "list", "elements"]) {
        "array"
    } else {
        "general"
    }
}

const KEYWORD_HINTS: [(&str, &str); 7] = [
    ("two sum", "Consider using a hash map to store values you've seen and their indices. This can help you find complements efficiently."),
    ("array", "Think about whether you need to iterate through the array once or multiple times. Consider edge cases like empty arrays."),
    ("string", "Consider string manipulation methods and whether you need to track character positions or frequencies."),
    ("tree", "Think about tree traversal methods (DFS, BFS) and what information you need to track at each node."),
    ("graph", "Consider how to represent the graph and what traversal algorithm would be most appropriate."),
    ("sort", "Think about the time complexity requirements and whether you need a stable sort."),
    ("search", "Consider whether binary search could apply if the data is sorted, or if you need linear search."),
];

/// Canned guidance used when the model is unavailable.
pub fn fallback_text(req: &AssistRequest) -> String {
    let statement = req.problem_statement.to_lowercase();
    let hint = KEYWORD_HINTS
        .iter()
        .find(|(keyword, _)| statement.contains(keyword))
        .map(|(_, hint)| *hint);

    let mut out = match hint {
        Some(hint) => format!(
            "Hint: {}\n\nGeneral approach: Break the problem into smaller steps and think about \
             the most efficient data structures for your needs.",
            hint
        ),
        None => "General hint: Start by understanding the problem requirements clearly. Think \
                 about edge cases, choose appropriate data structures, and consider the \
                 time/space complexity of your approach."
            .to_string(),
    };

    if !req.last_stderr.trim().is_empty() {
        out.push_str(
            "\n\nYour last run reported errors. Read the last line of the error output first: \
             it usually names the exception and the line that raised it.",
        );
    }

    if req.kind != AssistKind::Hint {
        out.push_str(
            "\n\nStep-by-step code help and full solutions need a configured model API key \
             (OPENAI_API_KEY).",
        );
    }

    out
}

fn fallback_response(req: &AssistRequest) -> AssistResponse {
    AssistResponse {
        kind: req.kind,
        source: AssistSource::Fallback,
        model: None,
        content: fallback_text(req),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn request(kind: AssistKind) -> AssistRequest {
        AssistRequest {
            kind,
            problem_statement: "Two Sum: find two numbers that add up to target".to_string(),
            language: Language::Python,
            code: "def two_sum(nums, target):\n    pass".to_string(),
            last_stdout: String::new(),
            last_stderr: "NameError: name 'x' is not defined".to_string(),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: String, api_key: Option<&str>) -> MentorConfig {
        MentorConfig {
            base_url,
            api_key: api_key.map(str::to_string),
            ..MentorConfig::default()
        }
    }

    #[test]
    fn example_blocks_become_test_cases() {
        let statement = "Return indices of two numbers adding to target.\n\
                         Example 1: nums = [2,7,11,15], target = 9 -> [0,1]\n\
                         Example 2: nums = [3,2,4], target = 6 -> [1,2]";
        let cases = extract_test_cases(statement, Language::Python);
        assert!(cases.starts_with("Example 1:\nnums = [2,7,11,15], target = 9 -> [0,1]\n\n"));
        assert!(cases.contains("Example 2:\nnums = [3,2,4], target = 6 -> [1,2]"));
        assert!(cases.contains("```python\ndef test_solution():"));
    }

    #[test]
    fn input_output_pairs_without_headers() {
        let statement = "Reverse a string.\nInput: \"abc\"\nOutput: \"cba\"\ninput: \"\"\noutput: \"\"";
        let cases = extract_test_cases(statement, Language::Java);
        assert!(cases.contains("Example 1:\nInput: \"abc\"\nExpected Output: \"cba\""));
        assert!(cases.contains("Example 2:\nInput: \"\"\nExpected Output: \"\""));
        assert!(cases.contains("assertEquals(expectedOutput, solution(...));"));
    }

    #[test]
    fn statements_without_examples_yield_nothing() {
        assert_eq!(extract_test_cases("Sort the list.", Language::JavaScript), "");
        let prompt = build_prompt(&request(AssistKind::Solution));
        assert!(!prompt.contains("Possible test cases"));
    }

    #[test]
    fn solution_prompt_carries_extracted_cases() {
        let mut req = request(AssistKind::Solution);
        req.problem_statement.push_str("\nExample 1: [2,7], 9 -> [0,1]");
        let prompt = build_prompt(&req);
        assert!(prompt.contains(
            "Possible test cases extracted from the problem:\nExample 1:\n[2,7], 9 -> [0,1]"
        ));

        req.kind = AssistKind::Hint;
        assert!(!build_prompt(&req).contains("Possible test cases"));
    }

    #[test]
    fn prompt_includes_code_and_last_run() {
        let prompt = build_prompt(&request(AssistKind::Hint));
        assert!(prompt.contains("Problem type: two sum"));
        assert!(prompt.contains("Language: python"));
        assert!(prompt.contains("def two_sum"));
        assert!(prompt.contains("Output: No output"));
        assert!(prompt.contains("Errors: NameError"));
        assert!(prompt.contains("Do NOT provide actual code"));
    }

    #[test]
    fn prompt_without_run_omits_execution_section() {
        let mut req = request(AssistKind::Solution);
        req.last_stderr.clear();
        req.code.clear();
        let prompt = build_prompt(&req);
        assert!(!prompt.contains("Recent execution results"));
        assert!(prompt.contains("No code written yet"));
    }

    #[test]
    fn classifies_common_problems() {
        assert_eq!(classify_problem("Check if a number is a palindrome"), "palindrome");
        assert_eq!(classify_problem("Two Sum"), "two sum");
        assert_eq!(classify_problem("Implement binary search"), "binary search");
        assert_eq!(classify_problem("Count islands in a grid"), "general");
    }

    #[test]
    fn fallback_matches_keywords() {
        let text = fallback_text(&request(AssistKind::Hint));
        assert!(text.contains("hash map"));
        assert!(text.contains("last run reported errors"));
        assert!(!text.contains("OPENAI_API_KEY"));

        let solution = fallback_text(&request(AssistKind::Solution));
        assert!(solution.contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn without_api_key_uses_fallback() {
        let mentor = Mentor::new(config("http://127.0.0.1:9".to_string(), None)).unwrap();
        assert!(!mentor.is_configured());

        let response = mentor.assist(&request(AssistKind::Hint)).await;
        assert_eq!(response.source, AssistSource::Fallback);
        assert!(response.model.is_none());
    }

    #[tokio::test]
    async fn returns_model_completion() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["max_tokens"], 500);
                assert_eq!(body["messages"][0]["role"], "system");
                Json(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "  Use a dict.  " } }]
                }))
            }),
        );
        let base = serve(router).await;

        let mentor = Mentor::new(config(base, Some("sk-test"))).unwrap();
        let response = mentor.assist(&request(AssistKind::NextStep)).await;

        assert_eq!(response.source, AssistSource::Model);
        assert_eq!(response.content, "Use a dict.");
        assert_eq!(response.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn retries_then_falls_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let router = Router::new().route(
            "/chat/completions",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "down")
                }
            }),
        );
        let base = serve(router).await;

        let mentor = Mentor::new(config(base, Some("sk-test"))).unwrap();
        let response = mentor.assist(&request(AssistKind::Hint)).await;

        assert_eq!(response.source, AssistSource::Fallback);
        assert_eq!(calls.load(Ordering::SeqCst), (MAX_RETRIES + 1) as usize);
    }
}

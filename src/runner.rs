// src/runner.rs

//! Execution runner.
//!
//! One call to [`Runner::run`] executes one submitted program:
//!
//! 1. create a fresh, uniquely named temp directory and write the source into it
//! 2. run the compile step, if the toolchain has one
//! 3. run the program with captured stdout/stderr and optional stdin
//! 4. turn everything (including timeouts and non-zero exits) into an
//!    [`ExecutionResult`]
//!
//! The whole run shares a single wall-clock deadline. When it passes the child
//! is killed and reaped before the result is built. The temp directory is a
//! `TempDir`, so it is removed on every exit path, including early `?`
//! returns.
//!
//! Only configuration problems (unknown language, missing toolchain binary,
//! I/O failures on our side) are returned as `Err`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{Config, MAX_TIMEOUT_SECS};
use crate::encoding::{apply_utf8_env, decode_output};
use crate::engine::events::{RunEvent, RunEventKind};
use crate::engine::sink::{EventSink, NullSink};
use crate::language::Language;
use crate::metrics::{PeakRssSampler, SAMPLE_INTERVAL};
use crate::run_id::RunId;
use crate::toolchain::{render_args, ArgContext, Toolchains};

/// Per-stream capture limit. Anything beyond it is drained and dropped.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// How long to wait for the output pipes to close after the child is gone.
/// A grandchild that inherited the pipes can keep them open indefinitely.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Longest budget a single run can get, whatever the caller asks for.
const MAX_TIMEOUT: Duration = Duration::from_secs(MAX_TIMEOUT_SECS);

const DEFAULT_JAVA_CLASS: &str = "Main";
const SCRIPT_STEM: &str = "main";

static PUBLIC_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bpublic\s+(?:(?:final|abstract)\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("public class pattern is valid")
});

static ANY_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bclass\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("class pattern is valid")
});

static MAIN_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bstatic\s+(?:final\s+)?void\s+main\s*\(").expect("main pattern is valid")
});

#[derive(Debug, Error)]
pub enum RunError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("`{program}` was not found; is the {language} toolchain installed and on PATH?")]
    ToolchainMissing { language: Language, program: String },

    #[error("failed while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| RunError::Io { context, source }
    }
}

/// One program submitted for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: Language,
    pub source: String,
    #[serde(default)]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        Self {
            language,
            source: source.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

/// Which step produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Compile,
    Run,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: RunId,
    pub language: Language,
    pub stage: Stage,
    pub succeeded: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub max_rss_kb: Option<u64>,
    /// Set when either stream hit `MAX_CAPTURE_BYTES`.
    #[serde(default)]
    pub output_truncated: bool,
}

/// Executes programs using a shared, read-only toolchain table.
#[derive(Debug, Clone)]
pub struct Runner {
    toolchains: Arc<Toolchains>,
    temp_root: Option<PathBuf>,
}

impl Runner {
    pub fn new(toolchains: Arc<Toolchains>) -> Self {
        Self {
            toolchains,
            temp_root: None,
        }
    }

    /// Runner for the configured toolchains and temp directory.
    pub fn from_config(cfg: &Config) -> Self {
        let runner = Self::new(Arc::new(Toolchains::from_runtime(&cfg.runtime)));
        match &cfg.execution.temp_dir {
            Some(dir) => runner.with_temp_root(dir.clone()),
            None => runner,
        }
    }

    /// Create per-run directories under `root` instead of the system temp dir.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn toolchains(&self) -> &Toolchains {
        &self.toolchains
    }

    /// Run `source` without collecting events.
    pub async fn run_source(
        &self,
        language: Language,
        source: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, RunError> {
        let request = ExecutionRequest::new(language, source);
        self.run(&request, timeout, &mut NullSink).await
    }

    #[tracing::instrument(
        skip_all,
        fields(
            language = %request.language,
            source_len = request.source.len(),
            run_id = tracing::field::Empty
        )
    )]
    pub async fn run(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
        sink: &mut dyn EventSink,
    ) -> Result<ExecutionResult, RunError> {
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));
        sink.emit(RunEvent::now(&run_id, RunEventKind::RunCreated));

        let language = request.language;
        let spec = self
            .toolchains
            .get(language)
            .ok_or_else(|| RunError::UnsupportedLanguage(language.to_string()))?;

        let started = Instant::now();
        let deadline = started + timeout.min(MAX_TIMEOUT);

        let workdir = self.create_workdir()?;
        let class = match language {
            Language::Java => java_class_name(&request.source),
            _ => SCRIPT_STEM.to_string(),
        };
        let source_path = workdir
            .path()
            .join(format!("{}.{}", class, spec.extension));

        tokio::fs::write(&source_path, request.source.as_bytes())
            .await
            .map_err(RunError::io("writing the source file"))?;

        let ctx = ArgContext {
            file: &source_path,
            dir: workdir.path(),
            class: &class,
        };

        let finish = |stage: Stage, outcome: ProcessOutcome| ExecutionResult {
            run_id: run_id.clone(),
            language,
            stage,
            succeeded: outcome.succeeded(),
            timed_out: outcome.timed_out,
            stdout: decode_output(&outcome.stdout.bytes),
            stderr: decode_output(&outcome.stderr.bytes),
            exit_code: outcome.status.and_then(|s| s.code()),
            duration_ms: started.elapsed().as_millis() as u64,
            max_rss_kb: outcome.max_rss_kb,
            output_truncated: outcome.stdout.truncated || outcome.stderr.truncated,
        };

        if let Some(step) = &spec.compile {
            sink.emit(RunEvent::now(&run_id, RunEventKind::CompileStarted));

            let outcome = spawn_and_wait(Invocation {
                language,
                program: &step.program,
                args: render_args(&step.args, &ctx),
                cwd: workdir.path(),
                stdin: None,
                deadline,
            })
            .await?;

            sink.emit(RunEvent::now(&run_id, RunEventKind::CompileFinished));

            if outcome.timed_out {
                sink.emit(RunEvent::now(&run_id, RunEventKind::TimedOut));
                tracing::info!("compilation timed out");
                return Ok(finish(Stage::Compile, outcome));
            }
            if !outcome.succeeded() {
                tracing::info!(exit = ?outcome.status, "compilation failed");
                return Ok(finish(Stage::Compile, outcome));
            }
        }

        sink.emit(RunEvent::now(&run_id, RunEventKind::ExecutionStarted));

        let outcome = spawn_and_wait(Invocation {
            language,
            program: &spec.program,
            args: render_args(&spec.args, &ctx),
            cwd: workdir.path(),
            stdin: request.stdin.as_deref(),
            deadline,
        })
        .await?;

        if outcome.timed_out {
            sink.emit(RunEvent::now(&run_id, RunEventKind::TimedOut));
        }
        sink.emit(RunEvent::now(&run_id, RunEventKind::ExecutionFinished));

        let result = finish(Stage::Run, outcome);

        if let Err(e) = workdir.close() {
            tracing::warn!(error = %e, "failed to remove run directory");
        }

        tracing::info!(
            succeeded = result.succeeded,
            timed_out = result.timed_out,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            "run finished"
        );

        Ok(result)
    }

    fn create_workdir(&self) -> Result<tempfile::TempDir, RunError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("codementor-run-");

        match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(RunError::io("creating the run directory"))
    }
}

/// Name of the class `javac` output should be launched with.
///
/// Comments and literals are blanked out first. The public class wins (the
/// file must be named after it), then the class declaring `static void main`,
/// then the first declared class, then `Main`.
pub fn java_class_name(source: &str) -> String {
    let code = blank_comments_and_literals(source);

    if let Some(caps) = PUBLIC_CLASS_RE.captures(&code) {
        return caps[1].to_string();
    }

    // the nearest class declared before `main` is the one that holds it
    let holder = MAIN_METHOD_RE
        .find(&code)
        .and_then(|main| ANY_CLASS_RE.captures_iter(&code[..main.start()]).last())
        .or_else(|| ANY_CLASS_RE.captures(&code));

    holder
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| DEFAULT_JAVA_CLASS.to_string())
}

/// Replace Java comments and string/char literals with spaces, keeping
/// byte offsets stable.
fn blank_comments_and_literals(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str,
        TextBlock,
        Char,
    }

    let bytes = source.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut state = State::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();

        match state {
            State::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = State::LineComment;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'/', Some(b'*')) => {
                    state = State::BlockComment;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'"', _) if bytes[i..].starts_with(b"\"\"\"") => {
                    state = State::TextBlock;
                    out.extend_from_slice(b"   ");
                    i += 3;
                    continue;
                }
                (b'"', _) => state = State::Str,
                (b'\'', _) => state = State::Char,
                _ => {
                    out.push(b);
                    i += 1;
                    continue;
                }
            },
            State::LineComment if b == b'\n' => {
                state = State::Code;
                out.push(b);
                i += 1;
                continue;
            }
            State::BlockComment if b == b'*' && next == Some(b'/') => {
                state = State::Code;
                out.extend_from_slice(b"  ");
                i += 2;
                continue;
            }
            State::TextBlock if bytes[i..].starts_with(b"\"\"\"") => {
                state = State::Code;
                out.extend_from_slice(b"   ");
                i += 3;
                continue;
            }
            State::Str | State::Char | State::TextBlock if b == b'\\' && next.is_some() => {
                out.extend_from_slice(b"  ");
                i += 2;
                continue;
            }
            State::Str if b == b'"' || b == b'\n' => state = State::Code,
            State::Char if b == b'\'' || b == b'\n' => state = State::Code,
            _ => {}
        }

        // inside a comment or literal (or on its delimiter): keep newlines only
        out.push(if b == b'\n' { b'\n' } else { b' ' });
        i += 1;
    }

    // only ASCII bytes were replaced, and only with ASCII
    String::from_utf8_lossy(&out).into_owned()
}

/* ---------------- process handling ---------------- */

pub(crate) struct Invocation<'a> {
    pub language: Language,
    pub program: &'a str,
    pub args: Vec<String>,
    pub cwd: &'a Path,
    pub stdin: Option<&'a str>,
    pub deadline: Instant,
}

pub(crate) struct ProcessOutcome {
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
    pub stdout: Captured,
    pub stderr: Captured,
    pub max_rss_kb: Option<u64>,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.map(|s| s.success()).unwrap_or(false)
    }
}

pub(crate) async fn spawn_and_wait(inv: Invocation<'_>) -> Result<ProcessOutcome, RunError> {
    let mut cmd = Command::new(inv.program);
    cmd.args(&inv.args)
        .current_dir(inv.cwd)
        .stdin(if inv.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    apply_utf8_env(&mut cmd, inv.language);

    tracing::debug!(program = inv.program, args = ?inv.args, "spawning");

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RunError::ToolchainMissing {
                language: inv.language,
                program: inv.program.to_string(),
            }
        } else {
            RunError::Io {
                context: "spawning the toolchain",
                source: e,
            }
        }
    })?;

    let sampler = child
        .id()
        .map(|pid| PeakRssSampler::start(pid, SAMPLE_INTERVAL));

    let stdout = child
        .stdout
        .take()
        .map(|pipe| Capture::spawn(pipe, MAX_CAPTURE_BYTES));
    let stderr = child
        .stderr
        .take()
        .map(|pipe| Capture::spawn(pipe, MAX_CAPTURE_BYTES));

    if let (Some(input), Some(mut pipe)) = (inv.stdin, child.stdin.take()) {
        // a child that never reads stdin must not stall us past the deadline
        let input = input.to_string();
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                tracing::debug!(error = %e, "child closed stdin early");
            }
        });
    }

    let (status, timed_out) = match tokio::time::timeout_at(inv.deadline, child.wait()).await {
        Ok(Ok(status)) => (Some(status), false),
        Ok(Err(e)) => {
            finish_sampler(sampler).await;
            return Err(RunError::Io {
                context: "waiting for the child process",
                source: e,
            })
        }
        Err(_) => {
            tracing::warn!(program = inv.program, "deadline reached, killing child");
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "kill failed, child probably already exited");
            }
            // reap so no zombie outlives the run
            let status = child.wait().await.ok();
            (status, true)
        }
    };

    let max_rss_kb = finish_sampler(sampler).await;

    let stdout = match stdout {
        Some(capture) => capture.finish(PIPE_DRAIN_GRACE).await,
        None => Captured::default(),
    };
    let stderr = match stderr {
        Some(capture) => capture.finish(PIPE_DRAIN_GRACE).await,
        None => Captured::default(),
    };

    Ok(ProcessOutcome {
        status,
        timed_out,
        stdout,
        stderr,
        max_rss_kb,
    })
}

/// Stop the sampler off the async workers; joining its thread blocks.
async fn finish_sampler(sampler: Option<PeakRssSampler>) -> Option<u64> {
    let sampler = sampler?;
    tokio::task::spawn_blocking(move || sampler.finish())
        .await
        .ok()
        .flatten()
}

/* ---------------- output capture ---------------- */

#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

/// Reads one pipe into a shared buffer from a background task.
///
/// The buffer lives outside the task, so whatever was read before an abort
/// is still available as partial output.
struct Capture {
    buffer: Arc<Mutex<Captured>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(mut reader: R, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let shared = Arc::clone(&buffer);

        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                let n = match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!(error = %e, "pipe read failed");
                        break;
                    }
                };

                let mut captured = match shared.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let room = limit.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.truncated = true;
                }
                let keep = n.min(room);
                captured.bytes.extend_from_slice(&chunk[..keep]);
            }
        });

        Self { buffer, task }
    }

    async fn finish(mut self, grace: Duration) -> Captured {
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            tracing::debug!("output pipe still open after child exit, abandoning reader");
            self.task.abort();
        }

        let mut captured = match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Runtime;
    use crate::sinks::collecting::CollectingEventSink;

    fn toolchain_available(program: &str) -> bool {
        std::process::Command::new(program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn runner_in(root: &Path) -> Runner {
        Runner::new(Arc::new(Toolchains::default())).with_temp_root(root)
    }

    fn python() -> Option<String> {
        let program = Runtime::default().python;
        toolchain_available(&program).then_some(program)
    }

    fn assert_dir_empty(root: &Path) {
        let leftovers: Vec<_> = std::fs::read_dir(root).unwrap().collect();
        assert!(leftovers.is_empty(), "leftover run dirs: {:?}", leftovers);
    }

    const SECS_10: Duration = Duration::from_secs(10);

    /* ---------------- pure helpers ---------------- */

    #[test]
    fn java_class_prefers_public_class() {
        let src = "class Helper {}\npublic final class Solution { public static void main(String[] a) {} }";
        assert_eq!(java_class_name(src), "Solution");
    }

    #[test]
    fn java_class_falls_back_to_first_class_then_main() {
        assert_eq!(java_class_name("class Foo { }"), "Foo");
        assert_eq!(java_class_name("// nothing here"), "Main");
    }

    #[test]
    fn java_class_ignores_comments_and_literals() {
        let src = "// this class prints hello\nclass Main { public static void main(String[] a) { System.out.println(\"hi\"); } }";
        assert_eq!(java_class_name(src), "Main");

        let src = "/* public class Nope */\nclass App {\n  String s = \"class Fake\";\n  char c = '\\'';\n  public static void main(String[] a) {}\n}";
        assert_eq!(java_class_name(src), "App");
    }

    #[test]
    fn java_class_picks_the_class_declaring_main() {
        let src = "class Helper { int f() { return 1; } }\nclass Runner {\n  public static void main(String[] args) {}\n}";
        assert_eq!(java_class_name(src), "Runner");
    }

    #[test]
    fn blanking_keeps_offsets_and_newlines() {
        let src = "a // ✓ x\nb \"s\" /* c */ d";
        let blanked = blank_comments_and_literals(src);
        assert_eq!(blanked.len(), src.len());
        assert_eq!(blanked.lines().count(), 2);
        assert!(blanked.starts_with("a "));
        assert!(!blanked.contains('s'));
        assert!(blanked.trim_end().ends_with('d'));
    }

    #[tokio::test]
    async fn capture_truncates_at_limit() {
        let reader = std::io::Cursor::new(b"abcdefghij".to_vec());
        let captured = Capture::spawn(reader, 4).finish(Duration::from_secs(1)).await;
        assert_eq!(captured.bytes, b"abcd");
        assert!(captured.truncated);
    }

    #[tokio::test]
    async fn capture_keeps_short_output_whole() {
        let reader = std::io::Cursor::new("héllo".as_bytes().to_vec());
        let captured = Capture::spawn(reader, 1024).finish(Duration::from_secs(1)).await;
        assert_eq!(decode_output(&captured.bytes), "héllo");
        assert!(!captured.truncated);
    }

    /* ---------------- configuration errors ---------------- */

    #[tokio::test]
    async fn missing_toolchain_is_an_error_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let runtime = Runtime {
            python: "no-such-python-binary-xyz".to_string(),
            ..Runtime::default()
        };
        let runner = Runner::new(Arc::new(Toolchains::from_runtime(&runtime)))
            .with_temp_root(root.path());

        let err = runner
            .run_source(Language::Python, "print(1)", SECS_10)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::ToolchainMissing { language: Language::Python, ref program }
                if program == "no-such-python-binary-xyz"
        ));
        assert_dir_empty(root.path());
    }

    #[tokio::test]
    async fn unwritable_temp_root_is_io_error() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner_in(&root.path().join("does/not/exist"));

        let err = runner
            .run_source(Language::Python, "print(1)", SECS_10)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Io { .. }));
    }

    /* ---------------- python ---------------- */

    #[tokio::test]
    async fn python_prints_fixed_string() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let result = runner_in(root.path())
            .run_source(Language::Python, "print('Two Sum')", SECS_10)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(!result.timed_out);
        assert_eq!(result.stdout, "Two Sum\n");
        assert_eq!(result.stderr, "");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stage, Stage::Run);
        assert_dir_empty(root.path());
    }

    #[tokio::test]
    async fn python_empty_source_is_not_an_error() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let result = runner_in(root.path())
            .run_source(Language::Python, "", SECS_10)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.stdout, "");
    }

    #[tokio::test]
    async fn python_non_ascii_round_trips() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let result = runner_in(root.path())
            .run_source(Language::Python, "print('✓ naïve 你好 🚀')", SECS_10)
            .await
            .unwrap();

        assert!(result.succeeded, "stderr: {}", result.stderr);
        assert_eq!(result.stdout, "✓ naïve 你好 🚀\n");
    }

    #[tokio::test]
    async fn python_invalid_utf8_output_is_replaced() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let src = "import sys\nsys.stdout.buffer.write(b'ok\\xff\\xfe')\n";
        let result = runner_in(root.path())
            .run_source(Language::Python, src, SECS_10)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(result.stdout.starts_with("ok"));
        assert!(result.stdout.contains('\u{fffd}'));
    }

    #[tokio::test]
    async fn python_runtime_error_is_a_result() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let result = runner_in(root.path())
            .run_source(Language::Python, "raise ValueError('boom')", SECS_10)
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert!(!result.timed_out);
        assert_eq!(result.exit_code, Some(1));
        assert!(result.stderr.contains("ValueError: boom"));
        assert_dir_empty(root.path());
    }

    #[tokio::test]
    async fn python_timeout_kills_and_keeps_partial_output() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let src = "import time\nprint('before sleep')\ntime.sleep(30)\nprint('after')";
        let started = std::time::Instant::now();

        let result = runner_in(root.path())
            .run_source(Language::Python, src, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert!(!result.succeeded);
        assert_eq!(result.stdout, "before sleep\n");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_dir_empty(root.path());
    }

    #[tokio::test]
    async fn oversized_timeout_is_clamped_not_a_panic() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let result = runner_in(root.path())
            .run_source(Language::Python, "print('hi')", Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.stdout, "hi\n");
    }

    #[tokio::test]
    async fn python_reads_stdin() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let request = ExecutionRequest::new(Language::Python, "print(input().upper())")
            .with_stdin("hello\n");

        let result = runner_in(root.path())
            .run(&request, SECS_10, &mut NullSink)
            .await
            .unwrap();

        assert_eq!(result.stdout, "HELLO\n");
    }

    #[tokio::test]
    async fn python_emits_run_events_in_order() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let mut sink = CollectingEventSink::new();
        let request = ExecutionRequest::new(Language::Python, "print(1)");

        let result = runner_in(root.path())
            .run(&request, SECS_10, &mut sink)
            .await
            .unwrap();

        let kinds: Vec<RunEventKind> = sink.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RunEventKind::RunCreated,
                RunEventKind::ExecutionStarted,
                RunEventKind::ExecutionFinished
            ]
        );
        assert!(sink.events().iter().all(|e| e.run_id == result.run_id));
    }

    #[tokio::test]
    async fn concurrent_runs_are_isolated() {
        if python().is_none() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let runner = runner_in(root.path());

        let src_a = "import os\nprint('alpha', sorted(os.listdir('.')))";
        let src_b = "import os\nprint('beta', sorted(os.listdir('.')))";

        let (a, b) = tokio::join!(
            runner.run_source(Language::Python, src_a, SECS_10),
            runner.run_source(Language::Python, src_b, SECS_10),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        // each run only sees its own source file
        assert_eq!(a.stdout, "alpha ['main.py']\n");
        assert_eq!(b.stdout, "beta ['main.py']\n");
        assert_ne!(a.run_id, b.run_id);
        assert_dir_empty(root.path());
    }

    /* ---------------- javascript ---------------- */

    #[tokio::test]
    async fn javascript_prints_and_times_out() {
        if !toolchain_available("node") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let runner = runner_in(root.path());

        let ok = runner
            .run_source(Language::JavaScript, "console.log('Two Sum ✓')", SECS_10)
            .await
            .unwrap();
        assert!(ok.succeeded);
        assert_eq!(ok.stdout, "Two Sum ✓\n");

        let looped = runner
            .run_source(Language::JavaScript, "while (true) {}", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(looped.timed_out);
        assert!(!looped.succeeded);
        assert_dir_empty(root.path());
    }

    /* ---------------- java ---------------- */

    #[tokio::test]
    async fn java_compiles_and_runs() {
        if !toolchain_available("javac") || !toolchain_available("java") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let src = r#"public class Solution {
    public static void main(String[] args) {
        System.out.println("Two Sum ✓");
    }
}"#;
        let result = runner_in(root.path())
            .run_source(Language::Java, src, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(result.succeeded, "stderr: {}", result.stderr);
        assert_eq!(result.stdout, "Two Sum ✓\n");
        assert_dir_empty(root.path());
    }

    #[tokio::test]
    async fn java_compile_error_never_executes() {
        if !toolchain_available("javac") || !toolchain_available("java") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let src = "public class Broken { public static void main(String[] a) { int x = } }";
        let mut sink = CollectingEventSink::new();
        let request = ExecutionRequest::new(Language::Java, src);

        let result = runner_in(root.path())
            .run(&request, Duration::from_secs(30), &mut sink)
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.stage, Stage::Compile);
        assert!(!result.stderr.is_empty());
        assert!(sink
            .events()
            .iter()
            .all(|e| e.kind != RunEventKind::ExecutionStarted));
        assert_dir_empty(root.path());
    }

    #[tokio::test]
    async fn java_runs_non_public_class_after_comment() {
        if !toolchain_available("javac") || !toolchain_available("java") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let src = "// this class prints hello\nclass Main { public static void main(String[] a) { System.out.println(\"hi\"); } }";

        let result = runner_in(root.path())
            .run_source(Language::Java, src, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(result.succeeded, "stderr: {}", result.stderr);
        assert_eq!(result.stage, Stage::Run);
        assert_eq!(result.stdout, "hi\n");
    }

    #[tokio::test]
    async fn java_reads_stdin() {
        if !toolchain_available("javac") || !toolchain_available("java") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let src = r#"import java.util.Scanner;

public class Echo {
    public static void main(String[] args) {
        Scanner in = new Scanner(System.in, "UTF-8");
        System.out.println(in.nextLine().toUpperCase());
    }
}"#;
        let request = ExecutionRequest::new(Language::Java, src).with_stdin("héllo\n");

        let result = runner_in(root.path())
            .run(&request, Duration::from_secs(30), &mut NullSink)
            .await
            .unwrap();

        assert!(result.succeeded, "stderr: {}", result.stderr);
        assert_eq!(result.stdout, "HÉLLO\n");
    }

    #[tokio::test]
    async fn java_infinite_loop_times_out() {
        if !toolchain_available("javac") || !toolchain_available("java") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let src = r#"public class Spin {
    public static void main(String[] args) {
        System.out.println("spinning");
        while (true) {}
    }
}"#;
        let mut sink = CollectingEventSink::new();
        let request = ExecutionRequest::new(Language::Java, src);

        // generous enough for javac, so the run step is what expires
        let result = runner_in(root.path())
            .run(&request, Duration::from_secs(20), &mut sink)
            .await
            .unwrap();

        assert!(result.timed_out);
        assert!(!result.succeeded);
        assert_eq!(result.stage, Stage::Run);
        assert!(sink.events().iter().any(|e| e.kind == RunEventKind::TimedOut));
        assert_dir_empty(root.path());
    }

    #[tokio::test]
    async fn java_compile_timeout_never_executes() {
        if !toolchain_available("javac") || !toolchain_available("java") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let src = "public class Slow { public static void main(String[] a) {} }";
        let mut sink = CollectingEventSink::new();
        let request = ExecutionRequest::new(Language::Java, src);

        let result = runner_in(root.path())
            .run(&request, Duration::from_millis(1), &mut sink)
            .await
            .unwrap();

        assert!(result.timed_out);
        assert!(!result.succeeded);
        assert_eq!(result.stage, Stage::Compile);

        let kinds: Vec<RunEventKind> = sink.events().iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&RunEventKind::CompileStarted));
        assert!(kinds.contains(&RunEventKind::TimedOut));
        assert!(!kinds.contains(&RunEventKind::ExecutionStarted));
        assert_dir_empty(root.path());
    }
}

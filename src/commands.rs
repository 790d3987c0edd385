// src/commands.rs

use crate::analysis::{AnalysisResult, Analyzer};
use crate::checks::{code_statistics, precheck};
use crate::cli::{Cli, Command, OutputMode};
use crate::config::Config;
use crate::engine::sink::NullSink;
use crate::engine::validate_config;
use crate::language::Language;
use crate::mentor::{AssistKind, AssistRequest, AssistSource, Mentor};
use crate::report::{export_report, ReportInput};
use crate::runner::{ExecutionRequest, ExecutionResult, Runner, Stage};
use crate::runtime;
use crate::templates::{template, Problem};
use crate::toolchain::{check_all, Toolchains};
use crate::util::{read_to_string, write_output_file};

use anyhow::{bail, Context, Result};
use notify::{EventKind, RecursiveMode, Watcher};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Entry point from `main.rs`.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let mut cfg = Config::load_or_default(&cli.config)?;
    cfg.apply_env();

    match cli.command {
        Command::Run {
            file,
            language,
            stdin,
            timeout,
            output,
            watch,
        } => {
            if let Some(secs) = timeout {
                cfg.execution.timeout_secs = secs;
            }
            ensure_valid(&cfg)?;

            let job = RunJob {
                language: resolve_language(&file, language.as_deref())?,
                file,
                stdin: stdin.map(|p| read_to_string(&p)).transpose()?,
                output,
            };
            let runner = runner_for(&cfg);

            if watch {
                run_with_watch(&runner, &cfg, &job).await
            } else if run_once(&runner, &cfg, &job).await? {
                Ok(())
            } else {
                bail!("Run failed")
            }
        }

        Command::Serve { addr } => {
            if let Some(addr) = addr {
                cfg.server.addr = addr;
            }
            ensure_valid(&cfg)?;
            let addr = cfg.server.addr.clone();
            runtime::serve(cfg, &addr).await
        }

        Command::Template {
            language,
            problem,
            write,
        } => write_template(language.parse()?, problem, write.as_deref()),

        Command::Check { file, language } => {
            let language = resolve_language(&file, language.as_deref())?;
            check_file(&cfg, &file, language)
        }

        Command::Analyze {
            file,
            language,
            output,
        } => {
            ensure_valid(&cfg)?;
            let language = resolve_language(&file, language.as_deref())?;
            let code = read_checked(&cfg, &file, language)?;
            let result = Analyzer::from_config(&cfg).analyze(language, &code).await?;

            match output {
                OutputMode::Simple => println!("{}", format_analysis(&file, &result)),
                OutputMode::Pretty => println!(
                    "{}",
                    serde_json::to_string_pretty(&result)
                        .context("Failed to format analysis as JSON")?
                ),
                OutputMode::Json => println!(
                    "{}",
                    serde_json::to_string(&result).context("Failed to format analysis as JSON")?
                ),
            }
            Ok(())
        }

        Command::Assist {
            file,
            kind,
            problem_statement,
            language,
            execute,
        } => {
            ensure_valid(&cfg)?;
            let language = resolve_language(&file, language.as_deref())?;
            let code = read_checked(&cfg, &file, language)?;
            assist(&cfg, kind, problem_statement, language, code, execute).await
        }

        Command::Doctor => doctor(&cfg).await,

        Command::Report {
            file,
            problem_statement,
            language,
            execute,
            analyze,
            out,
        } => {
            let language = resolve_language(&file, language.as_deref())?;
            let code = read_to_string(&file)?;

            let execution = if execute {
                ensure_valid(&cfg)?;
                let result = runner_for(&cfg)
                    .run_source(language, &code, cfg.execution.timeout())
                    .await?;
                Some(result)
            } else {
                None
            };

            let analysis = if analyze {
                ensure_valid(&cfg)?;
                Some(Analyzer::from_config(&cfg).analyze(language, &code).await?)
            } else {
                None
            };

            let report = export_report(&ReportInput {
                problem_statement,
                language,
                code,
                execution,
                analysis,
                assistance: Vec::new(),
            })?;

            match out {
                Some(path) => {
                    write_output_file(&path, &report)?;
                    eprintln!("Wrote {}", path.display());
                }
                None => println!("{}", report),
            }
            Ok(())
        }
    }
}

fn ensure_valid(cfg: &Config) -> Result<()> {
    let validation = validate_config(cfg);
    if !validation.is_valid() {
        bail!("Invalid configuration: {}", validation.summary());
    }
    Ok(())
}

fn runner_for(cfg: &Config) -> Runner {
    Runner::from_config(cfg)
}

/// `--language` wins; otherwise the file extension decides.
fn resolve_language(file: &Path, explicit: Option<&str>) -> Result<Language> {
    if let Some(name) = explicit {
        return Ok(name.parse()?);
    }

    file.extension()
        .and_then(|e| e.to_str())
        .and_then(Language::from_extension)
        .with_context(|| {
            format!(
                "Cannot infer language from {:?}; pass --language python|javascript|java",
                file
            )
        })
}

/// Read a source file and refuse it when the precheck fails.
fn read_checked(cfg: &Config, file: &Path, language: Language) -> Result<String> {
    let source = read_to_string(file)?;
    let pre = precheck(&source, language, cfg.execution.max_code_length);
    for warning in &pre.warnings {
        eprintln!("warning: {}", warning);
    }
    if !pre.is_valid {
        bail!("{}", pre.errors.join("; "));
    }
    Ok(source)
}

/* ---------------- run ---------------- */

struct RunJob {
    file: PathBuf,
    language: Language,
    stdin: Option<String>,
    output: OutputMode,
}

/// Run the file once and print the result. Returns whether it succeeded.
async fn run_once(runner: &Runner, cfg: &Config, job: &RunJob) -> Result<bool> {
    let source = read_checked(cfg, &job.file, job.language)?;

    let mut request = ExecutionRequest::new(job.language, source);
    if let Some(stdin) = &job.stdin {
        request = request.with_stdin(stdin.clone());
    }

    let result = runner
        .run(&request, cfg.execution.timeout(), &mut NullSink)
        .await?;

    match job.output {
        OutputMode::Simple => {
            print!("{}", result.stdout);
            std::io::stdout().flush()?;
            eprint!("{}", result.stderr);
            eprintln!("{}", format_simple_output(&job.file, &result, should_use_color()));
        }
        OutputMode::Pretty => println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to format result as JSON")?
        ),
        OutputMode::Json => println!(
            "{}",
            serde_json::to_string(&result).context("Failed to format result as JSON")?
        ),
    }

    Ok(result.succeeded)
}

/* ---------------- watch mode ---------------- */

async fn run_with_watch(runner: &Runner, cfg: &Config, job: &RunJob) -> Result<()> {
    let target = job
        .file
        .canonicalize()
        .with_context(|| format!("Unable to resolve {:?}", job.file))?;
    let dir = target
        .parent()
        .context("Source file has no parent directory")?
        .to_path_buf();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    // editors often replace the file on save, so watch the directory
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = tx.send(res);
    })
    .context("Failed to initialise file watcher")?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    loop {
        clear_screen();

        if let Err(e) = run_once(runner, cfg, job).await {
            eprintln!("Error: {e}");
        }

        // Block until the watched file changes
        loop {
            match rx.recv().await {
                Some(Ok(event)) if touches(&event, &target) => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => tracing::warn!(error = %e, "watch error"),
                None => return Ok(()),
            }
        }

        // coalesce the burst of events a single save produces
        tokio::time::sleep(Duration::from_millis(100)).await;
        while rx.try_recv().is_ok() {}
    }
}

fn touches(event: &notify::Event, target: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == target)
}

fn clear_screen() {
    print!("\x1b[2J\x1b[H");
    let _ = std::io::stdout().flush();
}

/* ---------------- rendering ---------------- */

fn format_simple_output(file: &Path, result: &ExecutionResult, use_color: bool) -> String {
    let (status, color) = if result.timed_out {
        ("TIMEOUT", "33")
    } else if result.succeeded {
        ("OK", "32")
    } else {
        ("FAIL", "31")
    };

    let mut out = String::new();
    out.push_str(&format!("{} {}\n", paint(status, color, use_color), file.display()));
    out.push_str(&format!("language: {}\n", result.language));
    if matches!(result.stage, Stage::Compile) {
        out.push_str("stage: compile\n");
    }

    let exit = result
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    out.push_str(&format!("exit: {}\n", exit));
    out.push_str(&format!("time: {}ms\n", result.duration_ms));

    let mem = result
        .max_rss_kb
        .map(|v| format!("{}kb", v))
        .unwrap_or_else(|| "n/a".to_string());
    out.push_str(&format!("memory: {}\n", mem));

    if result.output_truncated {
        out.push_str("output truncated\n");
    }

    out.trim_end().to_string()
}

fn format_analysis(file: &Path, result: &AnalysisResult) -> String {
    let mut out = format!("analysis: {}\n", file.display());

    if result.lint_issues.is_empty() {
        out.push_str("lint: clean\n");
    } else {
        out.push_str(&format!("lint: {} issue(s)\n", result.lint_issues.len()));
        for issue in &result.lint_issues {
            out.push_str(&format!(
                "  {}:{} {} {}\n",
                issue.line, issue.column, issue.code, issue.message
            ));
        }
    }

    let formatting = if result.formatting_needed {
        "needs black"
    } else {
        "ok"
    };
    out.push_str(&format!("formatting: {}\n", formatting));

    let c = &result.complexity;
    if let Some(avg) = c.average_complexity {
        out.push_str(&format!("complexity: avg {:.1}", avg));
        if let Some(max) = c.max_complexity {
            out.push_str(&format!(", max {}", max));
        }
        out.push('\n');
    } else if let Some(estimate) = c.estimated_complexity {
        out.push_str(&format!("complexity: ~{} (estimated)\n", estimate));
    }
    if let Some(mi) = c.maintainability_index {
        out.push_str(&format!("maintainability: {:.1}\n", mi));
    }
    if let Some(error) = &c.error {
        out.push_str(&format!("radon: {}\n", error));
    }

    out.trim_end().to_string()
}

fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("\x1b[{}m{}\x1b[0m", color, text)
    } else {
        text.to_string()
    }
}

/* ---------------- assist ---------------- */

async fn assist(
    cfg: &Config,
    kind: AssistKind,
    problem_statement: String,
    language: Language,
    code: String,
    execute: bool,
) -> Result<()> {
    let (last_stdout, last_stderr) = if execute {
        let result = runner_for(cfg)
            .run_source(language, &code, cfg.execution.timeout())
            .await?;
        (result.stdout, result.stderr)
    } else {
        (String::new(), String::new())
    };

    let mentor = Mentor::new(cfg.mentor.clone())?;
    if !mentor.is_configured() {
        eprintln!("warning: no mentor API key configured, using built-in hints");
    }

    let reply = mentor
        .assist(&AssistRequest {
            kind,
            problem_statement,
            language,
            code,
            last_stdout,
            last_stderr,
        })
        .await;

    if reply.source == AssistSource::Fallback && mentor.is_configured() {
        eprintln!("warning: the model could not be reached, using built-in hints");
    }
    println!("{}", reply.content);
    Ok(())
}

/* ---------------- template / check / doctor ---------------- */

fn write_template(language: Language, problem: Problem, dest: Option<&Path>) -> Result<()> {
    let code = template(language, problem);

    match dest {
        Some(path) => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            write_output_file(path, &format!("{}\n", code))?;
            eprintln!("Created {}", path.display());
        }
        None => println!("{}", code),
    }
    Ok(())
}

fn check_file(cfg: &Config, file: &Path, language: Language) -> Result<()> {
    let source = read_to_string(file)?;
    let report = precheck(&source, language, cfg.execution.max_code_length);
    let stats = code_statistics(&source, language);
    let use_color = should_use_color();

    for e in &report.errors {
        eprintln!("{} {}", paint("error:", "31", use_color), e);
    }
    for w in &report.warnings {
        eprintln!("{} {}", paint("warning:", "33", use_color), w);
    }

    println!(
        "lines: {} ({} non-empty, {} comments)\ncharacters: {}",
        stats.total_lines, stats.non_empty_lines, stats.comment_lines, stats.character_count
    );

    if !report.is_valid {
        bail!("Check failed");
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    let use_color = should_use_color();
    let statuses = check_all(&Toolchains::from_runtime(&cfg.runtime)).await;

    for status in &statuses {
        for p in &status.programs {
            let mark = if p.available {
                paint("ok", "32", use_color)
            } else {
                paint("missing", "31", use_color)
            };
            let detail = p
                .version
                .as_deref()
                .or(p.error.as_deref())
                .unwrap_or("");
            println!(
                "{:<10} {:<8} {:<8} {}",
                status.language.as_str(),
                p.program,
                mark,
                detail
            );
        }
    }

    // analysis tools are optional and never fail the doctor
    for p in Analyzer::from_config(cfg).check_dependencies().await {
        let mark = if p.available {
            paint("ok", "32", use_color)
        } else {
            paint("absent", "33", use_color)
        };
        let detail = p
            .version
            .as_deref()
            .or(p.error.as_deref())
            .unwrap_or("");
        println!("{:<10} {:<8} {:<8} {}", "analysis", p.program, mark, detail);
    }

    if statuses.iter().any(|s| !s.available) {
        bail!("One or more toolchains are unavailable");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Complexity, LintIssue};
    use crate::run_id::RunId;

    fn result(succeeded: bool, timed_out: bool) -> ExecutionResult {
        ExecutionResult {
            run_id: RunId::new(),
            language: Language::Java,
            stage: Stage::Compile,
            succeeded,
            timed_out,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: if timed_out { None } else { Some(1) },
            duration_ms: 42,
            max_rss_kb: None,
            output_truncated: false,
        }
    }

    #[test]
    fn infers_language_from_extension() {
        assert_eq!(resolve_language(Path::new("a/b.py"), None).unwrap(), Language::Python);
        assert_eq!(resolve_language(Path::new("Main.java"), None).unwrap(), Language::Java);
        assert_eq!(
            resolve_language(Path::new("x.txt"), Some("node")).unwrap(),
            Language::JavaScript
        );
        assert!(resolve_language(Path::new("Makefile"), None).is_err());
    }

    #[test]
    fn simple_output_without_color() {
        let text = format_simple_output(Path::new("Main.java"), &result(false, false), false);
        assert_eq!(
            text,
            "FAIL Main.java\nlanguage: java\nstage: compile\nexit: 1\ntime: 42ms\nmemory: n/a"
        );
    }

    #[test]
    fn simple_output_marks_timeouts() {
        let text = format_simple_output(Path::new("Main.java"), &result(false, true), true);
        assert!(text.starts_with("\x1b[33mTIMEOUT\x1b[0m"));
        assert!(text.contains("exit: n/a"));
    }

    #[test]
    fn template_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solution.py");

        write_template(Language::Python, Problem::TwoSum, Some(&path)).unwrap();
        assert!(read_to_string(&path).unwrap().contains("def two_sum"));
        assert!(write_template(Language::Python, Problem::Blank, Some(&path)).is_err());
    }

    #[test]
    fn check_fails_on_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.js");
        std::fs::write(&path, "x".repeat(50)).unwrap();

        let mut cfg = Config::default();
        cfg.execution.max_code_length = 10;
        assert!(check_file(&cfg, &path, Language::JavaScript).is_err());

        cfg.execution.max_code_length = 100;
        assert!(check_file(&cfg, &path, Language::JavaScript).is_ok());
    }

    #[test]
    fn analysis_summary_lists_issues() {
        let result = AnalysisResult {
            lint_issues: vec![LintIssue {
                line: 1,
                column: 1,
                code: "F401".to_string(),
                message: "'os' imported but unused".to_string(),
            }],
            formatting_needed: false,
            formatted_code: String::new(),
            complexity: Complexity {
                estimated_complexity: Some(3),
                analysis_type: Some("basic".to_string()),
                error: Some("radon is not installed".to_string()),
                ..Complexity::default()
            },
        };

        let text = format_analysis(Path::new("main.py"), &result);
        assert_eq!(
            text,
            "analysis: main.py\nlint: 1 issue(s)\n  1:1 F401 'os' imported but unused\n\
             formatting: ok\ncomplexity: ~3 (estimated)\nradon: radon is not installed"
        );
    }

    #[test]
    fn read_checked_rejects_oversized_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.py");
        std::fs::write(&path, "print(1)\n".repeat(20)).unwrap();

        let mut cfg = Config::default();
        cfg.execution.max_code_length = 10;
        assert!(read_checked(&cfg, &path, Language::Python).is_err());

        cfg.execution.max_code_length = 1000;
        assert!(read_checked(&cfg, &path, Language::Python).is_ok());
    }

    #[tokio::test]
    async fn assist_without_key_prints_fallback() {
        let cfg = Config::default();
        let code = "def two_sum(nums, target):\n    pass\n".to_string();
        assist(
            &cfg,
            AssistKind::Hint,
            "Two Sum".to_string(),
            Language::Python,
            code,
            false,
        )
        .await
        .unwrap();
    }
}

use crate::config::{Config, MAX_TIMEOUT_SECS};
use crate::engine::ValidationResult;

pub fn validate_config(cfg: &Config) -> ValidationResult {
    let mut result = ValidationResult::ok();

    validate_runtime(cfg, &mut result);
    validate_execution(cfg, &mut result);
    validate_server(cfg, &mut result);

    result
}

/* ---------------- runtime ---------------- */

fn validate_runtime(cfg: &Config, result: &mut ValidationResult) {
    let binaries = [
        ("RUNTIME_PYTHON_MISSING", "Python", &cfg.runtime.python),
        ("RUNTIME_NODE_MISSING", "Node", &cfg.runtime.node),
        ("RUNTIME_JAVAC_MISSING", "javac", &cfg.runtime.javac),
        ("RUNTIME_JAVA_MISSING", "Java", &cfg.runtime.java),
    ];

    for (code, name, value) in binaries {
        if value.trim().is_empty() {
            result.push_error(code, format!("{} runtime is not configured", name));
        }
    }
}

/* ---------------- execution ---------------- */

fn validate_execution(cfg: &Config, result: &mut ValidationResult) {
    if cfg.execution.timeout_secs == 0 {
        result.push_error("TIMEOUT_INVALID", "timeout_secs must be greater than zero");
    } else if cfg.execution.timeout_secs > MAX_TIMEOUT_SECS {
        result.push_error(
            "TIMEOUT_INVALID",
            format!("timeout_secs must be at most {}", MAX_TIMEOUT_SECS),
        );
    }

    if cfg.analysis.timeout_secs == 0 || cfg.analysis.timeout_secs > MAX_TIMEOUT_SECS {
        result.push_error(
            "ANALYSIS_TIMEOUT_INVALID",
            format!("analysis.timeout_secs must be between 1 and {}", MAX_TIMEOUT_SECS),
        );
    }

    if cfg.execution.max_code_length == 0 {
        result.push_error(
            "MAX_CODE_LENGTH_INVALID",
            "max_code_length must be greater than zero",
        );
    }

    if cfg.execution.max_concurrent_runs == 0 {
        result.push_error(
            "MAX_CONCURRENT_RUNS_INVALID",
            "max_concurrent_runs must be greater than zero",
        );
    }
}

/* ---------------- server ---------------- */

fn validate_server(cfg: &Config, result: &mut ValidationResult) {
    if cfg.server.addr.parse::<std::net::SocketAddr>().is_err() {
        result.push_error(
            "SERVER_ADDR_INVALID",
            format!("server.addr is not a socket address: {}", cfg.server.addr),
        );
    }
}

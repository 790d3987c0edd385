// src/encoding.rs

//! UTF-8 normalisation for child processes.
//!
//! Two halves:
//! - `apply_utf8_env` sets the environment so a child's standard streams
//!   default to UTF-8 regardless of the host locale.
//! - `decode_output` turns captured bytes into text and never fails.

use std::borrow::Cow;

use tokio::process::Command;

use crate::language::Language;

/// JVM properties that force UTF-8 for source reading and the std streams.
///
/// Passed on the command line rather than through `JAVA_TOOL_OPTIONS`,
/// which makes the JVM print a "Picked up ..." banner on stderr.
pub const JAVA_UTF8_PROPERTIES: [&str; 3] = [
    "-Dfile.encoding=UTF-8",
    "-Dstdout.encoding=UTF-8",
    "-Dstderr.encoding=UTF-8",
];

const UTF8_BOM: char = '\u{feff}';

/// Environment variables forcing UTF-8 for a given language.
pub fn utf8_env(language: Language) -> Vec<(&'static str, &'static str)> {
    let mut vars = Vec::new();

    if cfg!(unix) {
        vars.push(("LANG", "C.UTF-8"));
        vars.push(("LC_ALL", "C.UTF-8"));
    }

    if language == Language::Python {
        vars.push(("PYTHONIOENCODING", "utf-8"));
        vars.push(("PYTHONUTF8", "1"));
        vars.push(("PYTHONLEGACYWINDOWSSTDIO", "1"));
    }

    vars
}

/// Apply `utf8_env` to a command about to be spawned.
pub fn apply_utf8_env(cmd: &mut Command, language: Language) {
    for (key, value) in utf8_env(language) {
        cmd.env(key, value);
    }
}

/// Decode captured child output as UTF-8.
///
/// Strict decoding is tried first; invalid sequences fall back to lossy
/// decoding with U+FFFD. A leading BOM is dropped, and on Windows CRLF line
/// endings are folded to LF so results look the same on every host.
pub fn decode_output(bytes: &[u8]) -> String {
    let text: Cow<'_, str> = match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(e) => {
            tracing::debug!(
                valid_up_to = e.valid_up_to(),
                "child output is not valid UTF-8, decoding lossily"
            );
            String::from_utf8_lossy(bytes)
        }
    };

    let trimmed = text.strip_prefix(UTF8_BOM).unwrap_or(&text);

    if cfg!(windows) {
        trimmed.replace("\r\n", "\n")
    } else {
        trimmed.to_string()
    }
}

//! Danger patterns for shell commands
//!
//! Matching is case-sensitive and runs against the raw command text. Any
//! match takes a command out of the auto-approved set.

use once_cell::sync::Lazy;
use regex::RegexSet;

/// (name, pattern) pairs; the index in this table is the index in the set.
///
/// Command words count when they start the text or follow a separator,
/// a quote (`bash -c 'rm ...'`) or a path (`/bin/rm`).
const PATTERNS: &[(&str, &str)] = &[
    // Destructive filesystem operations
    ("rm", r#"(^|[\s;&|(`'"/])rm([\s;&|)`'"]|$)"#),
    ("device-write", r">\s*/dev/(sd|hd|nvme|disk|mmcblk)"),
    ("dd", r#"(^|[\s;&|(`'"/])dd\s.*of=/dev/"#),
    ("mkfs", r#"(^|[\s;&|(`'"/])mkfs"#),
    // Privilege escalation
    ("sudo", r#"(^|[\s;&|(`'"/])sudo([\s;&|)`'"]|$)"#),
    ("su", r#"(^|[\s;&|(`'"/])su([\s;&|)`'"]|$)"#),
    ("chmod", r#"(^|[\s;&|(`'"/])chmod\s"#),
    ("chown", r#"(^|[\s;&|(`'"/])chown\s"#),
    // Process and system control
    ("kill", r#"(^|[\s;&|(`'"/])(kill|killall|pkill)([\s;&|)`'"]|$)"#),
    (
        "shutdown",
        r#"(^|[\s;&|(`'"/])(shutdown|reboot|halt|poweroff)([\s;&|)`'"]|$)"#,
    ),
    // Pipe to interpreter
    ("curl-pipe-shell", r"curl\s[^|]*\|\s*(sudo\s+)?(sh|bash|zsh)\b"),
    ("wget-pipe-shell", r"wget\s[^|]*\|\s*(sudo\s+)?(sh|bash|zsh)\b"),
    ("pipe-shell", r"\|\s*(sh|bash|zsh)(\s|$)"),
    // Version control history rewrites
    ("git-force-push", r"git\s+push\b.*(\s--force\b|\s-f\b|\s--force-with-lease\b)"),
    ("git-hard-reset", r"git\s+reset\b.*\s--hard\b"),
    // Package publishing
    ("publish", r"(npm|yarn|pnpm|cargo|gem|poetry)\s+publish\b"),
    ("gem-push", r"gem\s+push\b"),
    ("twine-upload", r"twine\s+upload\b"),
];

static DANGER_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(PATTERNS.iter().map(|(_, p)| *p)).expect("danger patterns are valid regexes")
});

/// Name of the first danger pattern matching `command`, if any
pub fn matched_pattern(command: &str) -> Option<&'static str> {
    DANGER_SET
        .matches(command)
        .into_iter()
        .next()
        .map(|idx| PATTERNS[idx].0)
}

pub fn is_dangerous(command: &str) -> bool {
    DANGER_SET.is_match(command)
}

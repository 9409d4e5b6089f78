// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-line summaries extracted from terraform output

use regex::Regex;
use std::sync::LazyLock;

// `Plan: 1 to add, 0 to change, 0 to destroy.` or `No changes. Your infrastructure matches...`
#[allow(clippy::expect_used)]
static PLAN_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)((?:Plan:|No changes\.) .*)$").expect("constant regex pattern is valid")
});

// `Apply complete! Resources: 1 added, 0 changed, 0 destroyed.`
#[allow(clippy::expect_used)]
static APPLY_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Apply complete! .* destroyed\.?)").expect("constant regex pattern is valid")
});

fn last_match(re: &Regex, output: &str) -> String {
    re.captures_iter(output)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Summary line of a plan; empty when terraform printed none
pub fn plan_summary(output: &str) -> String {
    last_match(&PLAN_SUMMARY, output)
}

/// Summary line of an apply; empty when terraform printed none
pub fn apply_summary(output: &str) -> String {
    last_match(&APPLY_SUMMARY, output)
}

#[cfg(test)]
#[path = "summary_tests.rs"]
mod tests;

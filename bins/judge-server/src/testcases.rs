//! Fixture loading.
//!
//! Fixtures live outside the submitted repository, under
//! `testRoot/<workshop>/<task>/config.yaml`, and are read fresh for every
//! submission: the on-disk tree is the source of truth and may change
//! between pushes.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use judge_common::types::TestCaseConfig;

pub const CONFIG_FILE: &str = "config.yaml";

/// One loaded fixture case, not yet bound to a repository checkout.
#[derive(Debug, Clone)]
pub struct FixtureCase {
    pub input: String,
    pub expected: String,
    pub is_hidden: bool,
}

/// Loads the test cases for one exercise directory. A missing config file
/// means zero test cases, not an error; a present but unparsable one is
/// an error the caller logs and skips.
pub fn load_test_cases(task_dir: &Path) -> Result<Vec<FixtureCase>> {
    let config_path = task_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(Vec::new());
    }

    let data = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let config: TestCaseConfig = serde_yaml::from_str(&data)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;

    Ok(cases_from_config(&config, Utc::now()))
}

/// Flattens a config into runnable cases, visible first, honoring the
/// disabled flag and the activation window.
pub fn cases_from_config(config: &TestCaseConfig, now: DateTime<Utc>) -> Vec<FixtureCase> {
    if config.disabled {
        return Vec::new();
    }
    if let Some(start) = config.start_date {
        if now < start {
            return Vec::new();
        }
    }
    if let Some(end) = config.end_date {
        if now > end {
            return Vec::new();
        }
    }

    let mut cases = Vec::with_capacity(config.cases.len() + config.hidden_cases.len());
    for case in &config.cases {
        cases.push(FixtureCase {
            input: case.input.clone(),
            expected: format_expected(&case.expected),
            is_hidden: false,
        });
    }
    for case in &config.hidden_cases {
        cases.push(FixtureCase {
            input: case.input.clone(),
            expected: format_expected(&case.expected),
            is_hidden: true,
        });
    }
    cases
}

/// Authoring convention: a multi-line expected block whose first line is a
/// lone "." keeps literal leading whitespace in the YAML source; the
/// marker line itself is dropped before comparison.
pub fn format_expected(expected: &str) -> String {
    let lines: Vec<&str> = expected.split('\n').collect();
    if lines.len() > 1 && lines[0].trim() == "." {
        return lines[1..].join("\n");
    }
    expected.to_string()
}

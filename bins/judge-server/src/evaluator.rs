//! Output comparison and verdict aggregation.
//!
//! Knows nothing about Docker, git or storage: pure functions from
//! execution output and expected text to verdicts, so scoring stays
//! deterministic regardless of the execution engine.

use judge_common::types::{ExecutionResult, TestCase, TestCaseResult, Verdict};

/// Placeholder shown instead of the real detail for hidden test cases.
pub const HIDDEN_DETAIL: &str = "hidden test case";

/// Normalizes and compares program output line-by-line.
pub struct Comparator {
    /// ASCII control characters plus CR/LF, built once at construction.
    cutset: Vec<char>,
}

impl Comparator {
    pub fn new() -> Self {
        let cutset = (0u8..32).map(char::from).chain(['\r', '\n']).collect();
        Self { cutset }
    }

    /// Strips surrounding whitespace and control characters from both
    /// ends. Idempotent: trimming already-trimmed text is a no-op.
    pub fn trim<'a>(&self, s: &'a str) -> &'a str {
        s.trim()
            .trim_matches(|c: char| self.cutset.contains(&c))
            .trim()
    }

    pub fn judge_case(
        &self,
        test_number: usize,
        test_case: &TestCase,
        exec: &ExecutionResult,
    ) -> TestCaseResult {
        let (verdict, detail) = self.verdict_for(test_case, exec);
        TestCaseResult {
            test_number,
            solution: test_case.solution.clone(),
            verdict,
            detail,
            execution_time: exec.execution_time,
            is_hidden: test_case.is_hidden,
        }
    }

    fn verdict_for(&self, test_case: &TestCase, exec: &ExecutionResult) -> (Verdict, String) {
        if let Some(err) = &exec.internal_error {
            return (Verdict::Error, err.clone());
        }
        if exec.exit_code != 0 {
            return (
                Verdict::Error,
                format!("Program exited with code {}", exec.exit_code),
            );
        }

        let expected: Vec<&str> = self.trim(&test_case.expected).split('\n').collect();
        let actual: Vec<&str> = self.trim(&exec.output).split('\n').collect();

        if expected.len() != actual.len() {
            return (
                Verdict::Failed,
                format!(
                    "Expected {} lines, got {} lines",
                    expected.len(),
                    actual.len()
                ),
            );
        }

        for (i, (expected, actual)) in expected.iter().zip(&actual).enumerate() {
            let expected = self.trim(expected);
            let actual = self.trim(actual);
            if expected != actual {
                return (
                    Verdict::Failed,
                    format!("Line {} mismatch: Expected: {} Got: {}", i + 1, expected, actual),
                );
            }
        }

        (Verdict::Passed, String::new())
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new()
    }
}

/// `Passed` iff every case passed, `Failed` otherwise; an empty list means
/// no exercise was touched and yields `None`. A case-level `Error` still
/// aggregates to `Failed`, never to an overall `Error`.
pub fn overall_verdict(cases: &[TestCaseResult]) -> Verdict {
    if cases.is_empty() {
        return Verdict::None;
    }
    if cases.iter().all(|c| c.verdict == Verdict::Passed) {
        Verdict::Passed
    } else {
        Verdict::Failed
    }
}

/// Renders the human-readable summary table. Hidden-case detail is always
/// redacted, never the actual diff.
pub fn render_summary(verdict: Verdict, cases: &[TestCaseResult]) -> String {
    let mut out = String::new();

    match verdict {
        Verdict::Passed => out.push_str("## ✅ All Tests Passed\n\n"),
        Verdict::Failed => out.push_str("## ❌ Some Tests Failed\n\n"),
        Verdict::Error => out.push_str("## ⚠️ Execution Error\n\n"),
        Verdict::None => out.push_str("## No Test Cases Found\n\n"),
    }

    out.push_str("### Test Results\n\n");
    out.push_str("| Test # | Task | Status | Time | Details |\n");
    out.push_str("|--------|------|--------|------|----------|\n");

    for tc in cases {
        let glyph = match tc.verdict {
            Verdict::Passed => "✅",
            Verdict::Failed => "❌",
            Verdict::Error | Verdict::None => "⚠️",
        };
        let detail = if tc.is_hidden {
            HIDDEN_DETAIL.to_string()
        } else if tc.detail.is_empty() {
            String::new()
        } else {
            format!("`{}`", tc.detail)
        };
        out.push_str(&format!(
            "| {} | {} | {} | {:.2}s | {} |\n",
            tc.test_number,
            tc.solution,
            glyph,
            tc.execution_time.as_secs_f64(),
            detail
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use judge_common::types::Solution;
    use std::path::PathBuf;
    use std::time::Duration;

    fn make_test_case(expected: &str) -> TestCase {
        TestCase {
            input: "input".to_string(),
            expected: expected.to_string(),
            is_hidden: false,
            repository_dir: PathBuf::from("/tmp/jrepo-test"),
            solution: Solution::new("workshop1", "hello_world").unwrap(),
        }
    }

    fn make_exec(output: &str) -> ExecutionResult {
        ExecutionResult {
            output: output.to_string(),
            internal_error: None,
            exit_code: 0,
            execution_time: Duration::from_millis(42),
        }
    }

    fn case_result(number: usize, verdict: Verdict) -> TestCaseResult {
        TestCaseResult {
            test_number: number,
            solution: Solution::new("workshop1", "hello_world").unwrap(),
            verdict,
            detail: String::new(),
            execution_time: Duration::from_millis(10),
            is_hidden: false,
        }
    }

    #[test]
    fn test_trim() {
        let c = Comparator::new();
        assert_eq!(c.trim("hello"), "hello");
        assert_eq!(c.trim("  hello  "), "hello");
        assert_eq!(c.trim("\r\nhello\r\n"), "hello");
        assert_eq!(c.trim("\x00\x1fhello\x07"), "hello");
        assert_eq!(c.trim(" \t \x01 hello \x02 \n"), "hello");
        assert_eq!(c.trim(""), "");
        assert_eq!(c.trim("   "), "");
    }

    #[test]
    fn test_trim_is_idempotent() {
        let c = Comparator::new();
        for s in ["  hello  \r\n", "\x1f a b \x00", "plain", ""] {
            let once = c.trim(s);
            assert_eq!(c.trim(once), once);
        }
    }

    #[test]
    fn test_exact_match_passes() {
        let c = Comparator::new();
        let result = c.judge_case(1, &make_test_case("120"), &make_exec("120"));
        assert_eq!(result.verdict, Verdict::Passed);
        assert_eq!(result.detail, "");
        assert_eq!(result.test_number, 1);
    }

    #[test]
    fn test_control_characters_ignored_per_line() {
        let c = Comparator::new();
        let result = c.judge_case(
            1,
            &make_test_case("line1\nline2"),
            &make_exec("  line1\r\n\x1fline2  \n"),
        );
        assert_eq!(result.verdict, Verdict::Passed);
    }

    #[test]
    fn test_line_count_mismatch_detail() {
        let c = Comparator::new();
        let result = c.judge_case(1, &make_test_case("a"), &make_exec("a\nb"));
        assert_eq!(result.verdict, Verdict::Failed);
        assert_eq!(result.detail, "Expected 1 lines, got 2 lines");
    }

    #[test]
    fn test_line_mismatch_detail() {
        let c = Comparator::new();
        let result = c.judge_case(1, &make_test_case("y"), &make_exec("x"));
        assert_eq!(result.verdict, Verdict::Failed);
        assert_eq!(result.detail, "Line 1 mismatch: Expected: y Got: x");
    }

    #[test]
    fn test_mismatch_reports_first_bad_line() {
        let c = Comparator::new();
        let result = c.judge_case(1, &make_test_case("a\nb\nc"), &make_exec("a\nX\nc"));
        assert_eq!(result.verdict, Verdict::Failed);
        assert_eq!(result.detail, "Line 2 mismatch: Expected: b Got: X");
    }

    #[test]
    fn test_nonzero_exit_is_error_even_when_output_matches() {
        let c = Comparator::new();
        let mut exec = make_exec("120");
        exec.exit_code = 1;
        let result = c.judge_case(1, &make_test_case("120"), &exec);
        assert_eq!(result.verdict, Verdict::Error);
        assert_eq!(result.detail, "Program exited with code 1");
    }

    #[test]
    fn test_internal_error_wins_over_exit_code() {
        let c = Comparator::new();
        let mut exec = make_exec("");
        exec.internal_error = Some("execution timeout".to_string());
        let result = c.judge_case(1, &make_test_case("120"), &exec);
        assert_eq!(result.verdict, Verdict::Error);
        assert_eq!(result.detail, "execution timeout");
    }

    #[test]
    fn test_overall_verdict_empty_is_none() {
        assert_eq!(overall_verdict(&[]), Verdict::None);
    }

    #[test]
    fn test_overall_verdict_all_passed() {
        let cases = vec![case_result(1, Verdict::Passed), case_result(2, Verdict::Passed)];
        assert_eq!(overall_verdict(&cases), Verdict::Passed);
    }

    #[test]
    fn test_overall_verdict_error_case_yields_failed() {
        let cases = vec![case_result(1, Verdict::Passed), case_result(2, Verdict::Error)];
        assert_eq!(overall_verdict(&cases), Verdict::Failed);
    }

    #[test]
    fn test_summary_redacts_hidden_detail() {
        let mut visible = case_result(1, Verdict::Failed);
        visible.detail = "Line 1 mismatch: Expected: y Got: x".to_string();
        let mut hidden = visible.clone();
        hidden.test_number = 2;
        hidden.is_hidden = true;

        let summary = render_summary(Verdict::Failed, &[visible, hidden]);
        assert!(summary.contains("Line 1 mismatch"));
        assert!(summary.contains(HIDDEN_DETAIL));
        // Exactly one occurrence of the real diff: the hidden row must not
        // leak it.
        assert_eq!(summary.matches("Line 1 mismatch").count(), 1);
    }

    #[test]
    fn test_summary_header_matches_verdict() {
        assert!(render_summary(Verdict::Passed, &[]).starts_with("## ✅"));
        assert!(render_summary(Verdict::Failed, &[]).starts_with("## ❌"));
        assert!(render_summary(Verdict::None, &[]).starts_with("## No Test Cases"));
    }
}

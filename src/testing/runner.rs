//! Sequential suite runner
//!
//! Runs resolved tests one after another. Tests share the application and its
//! services, so ordering is the isolation: each test's preparers reset state
//! right before it runs. A failing test is recorded and the run goes on.

use colored::Colorize;

use super::resolver::Resolved;
use super::tester::TestFailure;

/// Every test passed
pub const EXIT_SUCCESS: i32 = 0;
/// At least one test failed
pub const EXIT_FAILURES: i32 = 2;
/// Nothing was resolved to run
pub const EXIT_NO_TESTS: i32 = 3;

/// Result of a single test
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub error: Option<String>,
}

/// Results of a run, in run order
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<TestResult>,
}

impl RunSummary {
    pub fn failed(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        if self.results.is_empty() {
            EXIT_NO_TESTS
        } else if self.failed().next().is_some() {
            EXIT_FAILURES
        } else {
            EXIT_SUCCESS
        }
    }
}

/// Runs every test of a resolved suite
pub struct Runner {
    resolved: Resolved,
}

impl Runner {
    pub fn new(resolved: Resolved) -> Self {
        Self { resolved }
    }

    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        if self.resolved.tests.is_empty() {
            println!("{}", "==== no tests to run".yellow());
            return summary;
        }

        for test in &self.resolved.tests {
            println!("{} {}", "----".dimmed(), test.name.bold());
            let result = match test.exec(&self.resolved.environment).await {
                Ok(_) => {
                    println!("{}", "====> test passed".green());
                    TestResult {
                        name: test.name.clone(),
                        passed: true,
                        error: None,
                    }
                }
                Err(failure) => {
                    println!("{} {}", "====> test failed:".red(), failure);
                    tracing::debug!(test = %test.name, stage = ?failure.stage, "Test failed");
                    failed_result(&test.name, &failure)
                }
            };
            summary.results.push(result);
        }

        print_summary(&summary);
        summary
    }
}

fn failed_result(name: &str, failure: &TestFailure) -> TestResult {
    TestResult {
        name: name.to_string(),
        passed: false,
        error: Some(failure.to_string()),
    }
}

fn print_summary(summary: &RunSummary) {
    let failed: Vec<&TestResult> = summary.failed().collect();
    if failed.is_empty() {
        println!(
            "{} ({} passed)",
            "==== all tests passed".green().bold(),
            summary.passed_count()
        );
        return;
    }

    println!(
        "\n{}",
        format!("{} test(s) failed", failed.len()).red().bold()
    );
    for result in failed {
        println!("{}", format!("==== #{:?}", result.name).red());
        if let Some(error) = &result.error {
            println!("{}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, passed: bool) -> TestResult {
        TestResult {
            name: name.to_string(),
            passed,
            error: (!passed).then(|| "boom".to_string()),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunSummary::default().exit_code(), EXIT_NO_TESTS);

        let all_passed = RunSummary {
            results: vec![result("a", true), result("b", true)],
        };
        assert_eq!(all_passed.exit_code(), EXIT_SUCCESS);

        let some_failed = RunSummary {
            results: vec![result("a", true), result("b", false)],
        };
        assert_eq!(some_failed.exit_code(), EXIT_FAILURES);
        assert_eq!(
            some_failed.failed().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["b"]
        );
    }

    #[tokio::test]
    async fn test_empty_run() {
        let runner = Runner::new(Resolved {
            tests: Vec::new(),
            environment: Vec::new(),
        });
        assert_eq!(runner.run().await.exit_code(), EXIT_NO_TESTS);
    }
}

use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding this crate's own Rust sources.
const SCANNED_DIRS: [&str; 2] = ["src", "tests"];

// One lint rule: a line regex plus the message shown when it matches.
struct Rule {
    label: &'static str,
    pattern: &'static str,
    advice: &'static str,
    comments_only: bool,
}

const RULES: [Rule; 4] = [
    Rule {
        label: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        advice: "Either use the code (removing the attribute) or remove it completely.",
        comments_only: false,
    },
    Rule {
        label: "#[ignore] test attributes",
        pattern: r"#\s*\[\s*ignore\s*\]",
        advice: "Fix the test so it can run properly without being ignored.",
        comments_only: false,
    },
    Rule {
        label: "dbg! invocations",
        pattern: r"\bdbg!\s*\(",
        advice: "Use the log macros for diagnostics instead.",
        comments_only: false,
    },
    Rule {
        label: "revision-history comments",
        pattern: r"(//|/\*).*\b(?:FIXED|CORRECTED|CHANGED|MODIFIED|UPDATED)\b",
        advice: "Comments describe the code as it is, not how it got there.",
        comments_only: true,
    },
];

// Collects the matching lines of one file for one rule.
struct RuleCollector<'r> {
    rule: &'r Rule,
    file_path: PathBuf,
    violations: Vec<String>,
}

impl<'r> RuleCollector<'r> {
    fn new(rule: &'r Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            violations: Vec::new(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.label,
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!(
            "\n⚠️ {} are forbidden in this project.\n   {}\n",
            self.rule.label, self.rule.advice
        ));
        Some(error_msg)
    }
}

impl Sink for RuleCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        // Lint rules about comments must not fire on string literals.
        if self.rule.comments_only && !line_text.trim_start().starts_with("//") {
            return Ok(true);
        }

        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

fn rust_sources() -> Vec<PathBuf> {
    SCANNED_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.path().to_path_buf())
        .collect()
}

fn scan(rule: &Rule, sources: &[PathBuf]) -> Vec<String> {
    let mut all_violations = Vec::new();
    let matcher = match RegexMatcher::new_line_matcher(rule.pattern) {
        Ok(matcher) => matcher,
        Err(e) => {
            all_violations.push(format!("Error creating {} regex matcher: {}", rule.label, e));
            return all_violations;
        }
    };

    let mut searcher = Searcher::new();
    for path in sources {
        let mut collector = RuleCollector::new(rule, path);
        if searcher.search_path(&matcher, path, &mut collector).is_err() {
            continue;
        }
        if let Some(error_message) = collector.check_and_get_error_message() {
            all_violations.push(error_message);
        }
    }
    all_violations
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SCANNED_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if std::env::var("FMINCG_SKIP_LINT_CHECKS").is_ok() || std::env::var("DOCS_RS").is_ok() {
        return;
    }

    let sources = rust_sources();
    let mut all_violations = Vec::new();
    for rule in &RULES {
        all_violations.extend(scan(rule, &sources));
    }

    if !all_violations.is_empty() {
        eprintln!("\n❌ VALIDATION ERRORS");
        eprintln!("====================");
        let violation_count = all_violations.len();
        for violation in all_violations {
            eprintln!("{violation}");
            eprintln!("--------------------");
        }
        eprintln!(
            "\n⚠️ Found {} total code quality violations. Fix all issues before committing.",
            violation_count
        );
        std::process::exit(1);
    }
}

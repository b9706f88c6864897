use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding the crate's own sources. Nothing else in the checkout is scanned.
const SOURCE_DIRS: [&str; 6] = ["score", "summarize", "stats", "shared", "cli", "tests"];

const FORBIDDEN_WORDS: &str = "FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE";

// One kind of source policy violation, collected line by line for a single file.
#[derive(Clone, Copy)]
enum Rule {
    UnderscoreBinding,
    ForbiddenWord,
    StarsInComment,
    ShoutedComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> String {
        match self {
            Rule::UnderscoreBinding => r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            Rule::ForbiddenWord => format!(r"(//|/\*).*(?:{FORBIDDEN_WORDS})"),
            Rule::StarsInComment => r"(//|/\*).*\*\*".to_string(),
            Rule::ShoutedComment => r"(//|/\*).*".to_string(),
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn explanation(self) -> &'static str {
        match self {
            Rule::UnderscoreBinding => {
                "Underscore-prefixed names are not allowed. Use the binding or remove it."
            }
            Rule::ForbiddenWord => {
                "Comments narrating edits (FIX, NEW, CHANGED, UPDATE and similar) are not allowed."
            }
            Rule::StarsInComment => "'**' is only allowed in doc comments.",
            Rule::ShoutedComment => "Comments written entirely in capitals are not allowed.",
            Rule::AllowDeadCode => {
                "#[allow(dead_code)] is not allowed. Use the code or remove it."
            }
        }
    }

    // Filters raw regex matches down to real violations.
    fn applies(self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self {
            Rule::UnderscoreBinding => !is_comment(trimmed) && !underscore_in_string(line),
            Rule::ForbiddenWord | Rule::AllowDeadCode => true,
            Rule::StarsInComment => !trimmed.starts_with("///") && !trimmed.starts_with("//!"),
            Rule::ShoutedComment => match comment_text(trimmed) {
                Some(text) => {
                    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
                }
                None => false,
            },
        }
    }
}

struct Collector {
    rule: Rule,
    violations: Vec<String>,
}

impl Sink for Collector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.applies(line) {
            self.violations.push(format!("{line_number}:{line}"));
        }
        Ok(true)
    }
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//")
}

// A match inside a quoted segment is a string literal, not a binding.
fn underscore_in_string(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_text(trimmed: &str) -> Option<&str> {
    if let Some(rest) = trimmed.strip_prefix("///") {
        Some(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Some(rest.trim_start_matches('!').trim())
    } else {
        None
    }
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn scan(rule: Rule, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&rule.pattern())?;
    let mut searcher = Searcher::new();
    for path in files {
        let mut collector = Collector {
            rule,
            violations: Vec::new(),
        };
        searcher.search_path(&matcher, path, &mut collector)?;
        if !collector.violations.is_empty() {
            let mut message = format!(
                "\n❌ ERROR: {} source policy violation(s) in {}:\n",
                collector.violations.len(),
                path.display()
            );
            for violation in &collector.violations {
                message.push_str(&format!("   {violation}\n"));
            }
            message.push_str(&format!("\n⚠️ {}\n", rule.explanation()));
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let files = source_files();
    let rules = [
        Rule::UnderscoreBinding,
        Rule::ForbiddenWord,
        Rule::StarsInComment,
        Rule::ShoutedComment,
        Rule::AllowDeadCode,
    ];
    for rule in rules {
        if let Err(e) = scan(rule, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

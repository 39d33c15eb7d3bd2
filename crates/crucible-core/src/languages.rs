//! Language registry: which container image, file extension and command
//! pipeline each supported language uses.
//!
//! The registry is a static table. User-supplied names go through alias
//! resolution first ("py" -> "python", "c++" -> "cpp"); names that resolve to
//! nothing yield a typed error rather than falling back to a default
//! language. Execution shape is a closed enum so a compiled language's run
//! step cannot exist without its compile step.

use crate::errors::SandboxError;

/// How a language's source file is turned into a running program.
///
/// Command templates may reference `{file}` (the source filename) and
/// `{stem}` (the filename without its extension).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPlan {
    /// Interpreted languages: a single command runs the file directly.
    Run { command: &'static str },
    /// Compiled languages: the run step is only reachable after the compile
    /// step exits zero.
    CompileThenRun {
        compile: &'static str,
        run: &'static str,
    },
}

impl CommandPlan {
    /// The compile command for this plan, if it has a compile step.
    pub fn compile_command(&self, filename: &str) -> Option<String> {
        match self {
            CommandPlan::Run { .. } => None,
            CommandPlan::CompileThenRun { compile, .. } => Some(fill(compile, filename)),
        }
    }

    pub fn run_command(&self, filename: &str) -> String {
        match self {
            CommandPlan::Run { command } => fill(command, filename),
            CommandPlan::CompileThenRun { run, .. } => fill(run, filename),
        }
    }
}

fn fill(template: &str, filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    template.replace("{file}", filename).replace("{stem}", stem)
}

/// Static description of one supported language.
#[derive(Debug)]
pub struct LanguageSpec {
    /// Canonical language identifier.
    pub name: &'static str,
    /// Container image shipping this language's toolchain.
    pub image: &'static str,
    /// Source file suffix, without the leading dot.
    pub extension: &'static str,
    pub plan: CommandPlan,
    /// Root directory inside the container dedicated to this language.
    pub work_dir: &'static str,
    /// One-time commands run when the environment is first provisioned.
    pub setup: &'static [&'static str],
}

static LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        name: "python",
        image: "python:3.9-slim",
        extension: "py",
        plan: CommandPlan::Run {
            command: "python {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "javascript",
        image: "node:18-bullseye-slim",
        extension: "js",
        plan: CommandPlan::Run {
            command: "node {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "typescript",
        image: "node:18-bullseye-slim",
        extension: "ts",
        plan: CommandPlan::Run {
            command: "npx ts-node {file}",
        },
        work_dir: "/app",
        setup: &["npm install -g typescript ts-node"],
    },
    LanguageSpec {
        name: "java",
        image: "openjdk:17-slim",
        extension: "java",
        plan: CommandPlan::CompileThenRun {
            compile: "javac {file}",
            run: "java {stem}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "c",
        image: "gcc:11-bullseye",
        extension: "c",
        plan: CommandPlan::CompileThenRun {
            compile: "gcc {file} -o /tmp/program",
            run: "/tmp/program",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "cpp",
        image: "gcc:11-bullseye",
        extension: "cpp",
        plan: CommandPlan::CompileThenRun {
            compile: "g++ {file} -o /tmp/program",
            run: "/tmp/program",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "go",
        image: "golang:1.20-bullseye",
        extension: "go",
        plan: CommandPlan::Run {
            command: "go run {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "rust",
        image: "rust:1.68-slim-bullseye",
        extension: "rs",
        plan: CommandPlan::CompileThenRun {
            compile: "rustc {file} -o /tmp/program",
            run: "/tmp/program",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "ruby",
        image: "ruby:3.2-slim-bullseye",
        extension: "rb",
        plan: CommandPlan::Run {
            command: "ruby {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "php",
        image: "php:8.2-cli-bullseye",
        extension: "php",
        plan: CommandPlan::Run {
            command: "php {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "csharp",
        image: "mcr.microsoft.com/dotnet/sdk:7.0-bullseye-slim",
        extension: "cs",
        plan: CommandPlan::Run {
            command: "dotnet run {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "swift",
        image: "swift:5.8-jammy",
        extension: "swift",
        plan: CommandPlan::Run {
            command: "swift {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "perl",
        image: "perl:5.36-slim-bullseye",
        extension: "pl",
        plan: CommandPlan::Run {
            command: "perl {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
    LanguageSpec {
        name: "r",
        image: "r-base:4.3.0",
        extension: "r",
        plan: CommandPlan::Run {
            command: "Rscript {file}",
        },
        work_dir: "/app",
        setup: &[],
    },
];

/// All supported languages, in registry order.
pub fn all() -> &'static [LanguageSpec] {
    LANGUAGES
}

fn alias_to_canonical(name: &str) -> &str {
    match name {
        "python3" | "py" => "python",
        "js" | "node" | "nodejs" => "javascript",
        "ts" => "typescript",
        "c++" => "cpp",
        "c#" | "dotnet" | "dot-net" => "csharp",
        "rb" => "ruby",
        "golang" => "go",
        "rs" => "rust",
        "pl" => "perl",
        "php7" | "php8" => "php",
        "r-lang" => "r",
        other => other,
    }
}

/// Resolve a user-supplied language name to its canonical form, if the
/// language is supported.
pub fn canonical_name(input: &str) -> Option<&'static str> {
    let normalized = input.trim().to_lowercase();
    let canonical = alias_to_canonical(&normalized);
    LANGUAGES
        .iter()
        .find(|spec| spec.name == canonical)
        .map(|spec| spec.name)
}

/// Look up the language spec for a user-supplied name.
pub fn resolve(input: &str) -> Result<&'static LanguageSpec, SandboxError> {
    let normalized = input.trim().to_lowercase();
    let canonical = alias_to_canonical(&normalized);
    LANGUAGES
        .iter()
        .find(|spec| spec.name == canonical)
        .ok_or_else(|| SandboxError::UnsupportedLanguage(input.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIASES: &[(&str, &str)] = &[
        ("python3", "python"),
        ("py", "python"),
        ("js", "javascript"),
        ("node", "javascript"),
        ("nodejs", "javascript"),
        ("ts", "typescript"),
        ("c++", "cpp"),
        ("c#", "csharp"),
        ("dotnet", "csharp"),
        ("dot-net", "csharp"),
        ("rb", "ruby"),
        ("golang", "go"),
        ("rs", "rust"),
        ("pl", "perl"),
        ("php7", "php"),
        ("php8", "php"),
        ("r-lang", "r"),
    ];

    #[test]
    fn aliases_resolve_to_canonical_names() {
        for (alias, expected) in ALIASES {
            assert_eq!(canonical_name(alias), Some(*expected), "alias {}", alias);
        }
    }

    #[test]
    fn resolution_is_idempotent() {
        for (alias, _) in ALIASES {
            let first = canonical_name(alias).unwrap();
            assert_eq!(canonical_name(first), Some(first));
        }
        for spec in all() {
            assert_eq!(canonical_name(spec.name), Some(spec.name));
        }
    }

    #[test]
    fn resolution_normalizes_case_and_whitespace() {
        assert_eq!(canonical_name("  Python3 "), Some("python"));
        assert_eq!(canonical_name("NODE"), Some("javascript"));
        assert_eq!(canonical_name("C++"), Some("cpp"));
    }

    #[test]
    fn unknown_language_is_a_typed_error() {
        let err = resolve("bogus-lang").unwrap_err();
        match err {
            SandboxError::UnsupportedLanguage(name) => assert_eq!(name, "bogus-lang"),
            other => panic!("expected UnsupportedLanguage, got {:?}", other),
        }
    }

    #[test]
    fn compiled_languages_have_distinct_compile_and_run_steps() {
        for name in ["c", "cpp", "rust", "java"] {
            let spec = resolve(name).unwrap();
            assert!(
                matches!(spec.plan, CommandPlan::CompileThenRun { .. }),
                "{} should be compile-then-run",
                name
            );
        }
        for name in ["python", "javascript", "go", "ruby"] {
            let spec = resolve(name).unwrap();
            assert!(matches!(spec.plan, CommandPlan::Run { .. }));
        }
    }

    #[test]
    fn command_templates_substitute_file_and_stem() {
        let cpp = resolve("cpp").unwrap();
        assert_eq!(
            cpp.plan.compile_command("program.cpp").as_deref(),
            Some("g++ program.cpp -o /tmp/program")
        );
        assert_eq!(cpp.plan.run_command("program.cpp"), "/tmp/program");

        let java = resolve("java").unwrap();
        assert_eq!(
            java.plan.compile_command("Hello.java").as_deref(),
            Some("javac Hello.java")
        );
        assert_eq!(java.plan.run_command("Hello.java"), "java Hello");

        let python = resolve("python").unwrap();
        assert_eq!(python.plan.compile_command("program.py"), None);
        assert_eq!(python.plan.run_command("program.py"), "python program.py");
    }

    #[test]
    fn every_entry_is_fully_specified() {
        for spec in all() {
            assert!(!spec.name.is_empty());
            assert!(!spec.image.is_empty());
            assert!(!spec.extension.is_empty());
            assert!(!spec.extension.starts_with('.'), "{}", spec.name);
            assert!(spec.work_dir.starts_with('/'), "{}", spec.name);
        }
    }
}

use arch_test_utils::{check_imports_in_directory, format_violation_report};

const CROSS_DOMAIN_ALLOWLIST: &[(&str, &str)] = &[
    ("sessions", "agents"), // Session handles drive the agent runtime seam
    ("sessions", "git"),    // Session provisioning creates per-session worktrees
    ("agents", "sessions"), // Tool policy types live with the session entity
    ("git", "sessions"),    // Worktree results are reported as session metadata
];

#[test]
fn no_cross_domain_imports() {
    let violations = check_imports_in_directory("src/domains", |path, import| {
        arch_test_utils::validate_cross_domain_import(path, import, CROSS_DOMAIN_ALLOWLIST)
    });

    assert!(
        violations.is_empty(),
        "{}",
        format_violation_report("Cross-Domain Import", &violations)
    );
}

#[test]
fn domains_do_not_import_the_binary_surface() {
    let violations = check_imports_in_directory("src/domains", |path, import| {
        arch_test_utils::validate_binary_surface_import(path, import)
    });

    assert!(
        violations.is_empty(),
        "{}",
        format_violation_report("Binary Surface Import", &violations)
    );
}

mod arch_test_utils {
    use std::collections::HashSet;
    use std::fs;
    use std::path::{Component, Path, PathBuf};
    use std::sync::OnceLock;

    use regex::Regex;
    use walkdir::WalkDir;

    pub struct ImportViolation {
        pub file: PathBuf,
        pub import: String,
        pub reason: String,
    }

    pub fn check_imports_in_directory<F>(dir: &str, predicate: F) -> Vec<ImportViolation>
    where
        F: Fn(&Path, &str) -> Vec<(String, String)>,
    {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let root = manifest_dir.join(dir);
        if !root.exists() {
            return Vec::new();
        }

        let mut violations = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("rs") {
                continue;
            }

            let imports = extract_imports_from_file(entry.path());
            if imports.is_empty() {
                continue;
            }

            let relative_file = entry
                .path()
                .strip_prefix(manifest_dir)
                .unwrap_or_else(|_| entry.path())
                .to_path_buf();

            for import in imports {
                for (import_display, reason) in predicate(entry.path(), &import) {
                    violations.push(ImportViolation {
                        file: relative_file.clone(),
                        import: import_display,
                        reason,
                    });
                }
            }
        }

        violations
    }

    pub fn format_violation_report(title: &str, violations: &[ImportViolation]) -> String {
        let mut report = String::new();
        report.push_str("Domain Isolation Violations:\n\n");

        use std::fmt::Write as _;

        for violation in violations {
            let _ = writeln!(report, "[{}]", title);
            let _ = writeln!(report, "  File: {}", violation.file.display());
            let _ = writeln!(report, "  Import: {}", violation.import);
            let _ = writeln!(report, "  Reason: {}\n", violation.reason);
        }

        let _ = write!(report, "Total violations: {}", violations.len());
        report
    }

    pub fn validate_cross_domain_import(
        path: &Path,
        import: &str,
        allowlist: &[(&str, &str)],
    ) -> Vec<(String, String)> {
        let Some(source_domain) = get_domain_from_path(path) else {
            return Vec::new();
        };

        static DOMAIN_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = DOMAIN_REGEX.get_or_init(|| Regex::new(r"domains::([a-z_]+)").unwrap());

        let mut seen = HashSet::new();
        let mut violations = Vec::new();

        for caps in regex.captures_iter(import) {
            let full_match = caps.get(0).unwrap().as_str();
            if !seen.insert(full_match.to_string()) {
                continue;
            }

            let target_domain = caps.get(1).unwrap().as_str();
            if target_domain == source_domain {
                continue;
            }

            if allowlist
                .iter()
                .any(|(src, dst)| *src == source_domain && *dst == target_domain)
            {
                continue;
            }

            let import_display = format!("crate::{}", full_match);
            let reason = format!(
                "{} -> {} cross-domain import not allowed",
                source_domain, target_domain
            );

            violations.push((import_display, reason));
        }

        violations
    }

    pub fn validate_binary_surface_import(path: &Path, import: &str) -> Vec<(String, String)> {
        let Some(source_domain) = get_domain_from_path(path) else {
            return Vec::new();
        };

        static SURFACE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            SURFACE_REGEX.get_or_init(|| Regex::new(r"crate::(cli|config)::[A-Za-z0-9_]+").unwrap());

        let mut seen = HashSet::new();
        let mut violations = Vec::new();

        for caps in regex.captures_iter(import) {
            let full_match = caps.get(0).unwrap().as_str();
            if !seen.insert(full_match.to_string()) {
                continue;
            }

            let module = caps.get(1).unwrap().as_str();
            let reason = format!(
                "{} imports {} (domain code cannot depend on the daemon entry point)",
                source_domain, module
            );

            violations.push((full_match.to_string(), reason));
        }

        violations
    }

    fn extract_imports_from_file(path: &Path) -> Vec<String> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };

        static USE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = USE_REGEX.get_or_init(|| Regex::new(r"(?s)use\s+crate::([^;]+);").unwrap());

        regex
            .captures_iter(&content)
            .map(|caps| normalize_use_statement(caps.get(1).unwrap().as_str()))
            .collect()
    }

    fn normalize_use_statement(body: &str) -> String {
        let mut statement = String::from("use crate::");
        statement.push_str(body.trim());
        statement.push(';');

        statement
            .lines()
            .map(|line| line.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn get_domain_from_path(path: &Path) -> Option<String> {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let relative = path.strip_prefix(manifest_dir).ok()?;

        let mut components = relative.components();

        while let Some(component) = components.next() {
            match component {
                Component::Normal(name) if name == "src" => {
                    if let Some(Component::Normal(domains)) = components.next()
                        && domains == "domains"
                        && let Some(Component::Normal(domain)) = components.next()
                    {
                        return Some(domain.to_string_lossy().to_string());
                    }
                }
                Component::Normal(name) if name == "domains" => {
                    if let Some(Component::Normal(domain)) = components.next() {
                        return Some(domain.to_string_lossy().to_string());
                    }
                }
                _ => continue,
            }
        }

        None
    }
}

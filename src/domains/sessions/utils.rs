use uuid::Uuid;

const SLUG_MAX_LEN: usize = 50;
const BRANCH_ID_LEN: usize = 8;

pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Lowercases, collapses runs of non-alphanumeric characters into a single
/// hyphen, trims boundary hyphens and truncates to 50 characters.
pub fn slugify(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    let mut collapsed = String::with_capacity(mapped.len());
    let mut prev_hyphen = false;
    for ch in mapped.chars() {
        if ch == '-' {
            if !prev_hyphen {
                collapsed.push('-');
            }
            prev_hyphen = true;
        } else {
            collapsed.push(ch);
            prev_hyphen = false;
        }
    }

    // Trim again after truncating: the cut can land right after a hyphen.
    let truncated: String = collapsed
        .trim_matches('-')
        .chars()
        .take(SLUG_MAX_LEN)
        .collect();
    truncated.trim_matches('-').to_string()
}

/// Branch name for a session worktree: `session/<slug>-<first 8 id chars>`.
/// Stays well under git ref length limits.
pub fn generate_branch_name(title: &str, session_id: &str) -> String {
    let slug = slugify(title);
    let short_id: String = session_id.chars().take(BRANCH_ID_LEN).collect();
    format!("session/{slug}-{short_id}")
}

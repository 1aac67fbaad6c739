use anyhow::{Result, bail};
use regex::Regex;

use crate::bulk::RepositoryTarget;

/// Keep the targets whose id or name matches any of `patterns`, in their
/// original order. No patterns selects everything.
///
/// # Errors
/// Returns an error if a pattern matches no repository.
pub fn select(targets: &[RepositoryTarget], patterns: &[String]) -> Result<Vec<RepositoryTarget>> {
    if patterns.is_empty() {
        return Ok(targets.to_vec());
    }
    let compiled: Vec<(String, Regex)> = patterns
        .iter()
        .map(|p| -> Result<(String, Regex)> { Ok((p.clone(), glob_to_regex(p)?)) })
        .collect::<Result<_>>()?;

    for (raw, re) in &compiled {
        if !targets.iter().any(|t| matches(re, t)) {
            bail!("no repository matches '{}'", raw);
        }
    }
    Ok(targets
        .iter()
        .filter(|t| compiled.iter().any(|(_, re)| matches(re, t)))
        .cloned()
        .collect())
}

fn matches(re: &Regex, t: &RepositoryTarget) -> bool {
    re.is_match(&t.id) || re.is_match(&t.name)
}

/// Convert a minimal glob pattern into an anchored regular expression.
/// Supported:
/// - `*` → any run of characters
/// - `?` → exactly one character
///
/// Everything else matches literally.
fn glob_to_regex(pat: &str) -> Result<Regex> {
    let mut s = String::from("^");
    for ch in pat.chars() {
        match ch {
            '*' => s.push_str(".*"),
            '?' => s.push('.'),
            c => s.push_str(&regex::escape(&c.to_string())),
        }
    }
    s.push('$');
    Ok(Regex::new(&s)?)
}

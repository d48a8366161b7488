use regex::Regex;

/// Lowercases, turns punctuation into spaces and collapses whitespace.
///
/// `"Ruby-on-Rails, (Senior)"` becomes `"ruby on rails senior"`.
pub fn normalize_text(input: &str) -> String {
    let mapped: String = input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-boundary pattern for an already normalized keyword.
pub fn keyword_regex(keyword: &str) -> Option<Regex> {
    let keyword = normalize_text(keyword);
    if keyword.is_empty() {
        return None;
    }
    Regex::new(&format!(r"\b{}\b", regex::escape(&keyword))).ok()
}

/// Case-insensitive whole-term pattern over raw lowercase text. Unlike
/// [`keyword_regex`] it keeps symbols, so "c++" never matches a bare "c".
pub fn term_regex(term: &str) -> Option<Regex> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?:^|[^\w+#]){}(?:$|[^\w+#])", regex::escape(&term))).ok()
}

pub fn titleize(slug: &str) -> String {
    slug.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Compiles a rule entry: `/pattern/flags` is taken as a regex, anything else
/// is matched literally. Both are case-insensitive unless the regex omits `i`.
pub fn compile_rule_pattern(entry: &str) -> Option<Regex> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }
    if let Some(rest) = entry.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let (body, flags) = (&rest[..end], &rest[end + 1..]);
            let source = if flags.contains('i') {
                format!("(?i){body}")
            } else {
                body.to_string()
            };
            return Regex::new(&source).ok();
        }
    }
    Regex::new(&format!("(?i){}", regex::escape(entry))).ok()
}

/// Appends items that are not already present, keeping first-seen order.
pub fn merge_unique(primary: &[String], defaults: &[&str]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for item in primary.iter().map(String::as_str).chain(defaults.iter().copied()) {
        let item = item.trim();
        if !item.is_empty() && !merged.iter().any(|m| m == item) {
            merged.push(item.to_string());
        }
    }
    merged
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

//! Shell-style file name patterns.
//!
//! Only the two wildcards the DAQ naming conventions need are supported:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//!
//! Everything else matches literally.

/// Match a file name against a wildcard pattern. The whole name must match.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let input: Vec<char> = name.chars().collect();

    let (mut p, mut i) = (0, 0);
    // Position of the last `*` seen and the input index it was tried at
    let mut star: Option<(usize, usize)> = None;

    while i < input.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == input[i]) {
            p += 1;
            i += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, i));
            p += 1;
        } else if let Some((star_p, star_i)) = star {
            // Let the star swallow one more character and retry
            p = star_p + 1;
            i = star_i + 1;
            star = Some((star_p, star_i + 1));
        } else {
            return false;
        }
    }

    pat[p..].iter().all(|c| *c == '*')
}

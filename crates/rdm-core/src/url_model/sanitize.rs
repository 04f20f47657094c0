//! Filesystem-safe filename sanitization.

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Sanitizes a server- or URL-provided filename so it names a single entry
/// inside the task's `saved_dir`.
///
/// - Replaces NUL, `/`, `\`, and control characters with `_`
/// - Trims surrounding whitespace
/// - Rejects `.` and `..` (returns an empty string)
/// - Limits length to 255 bytes, keeping the extension when it is short
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '\0' || c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed == "." || trimmed == ".." {
        return String::new();
    }
    if trimmed.len() <= NAME_MAX {
        return trimmed.to_string();
    }

    let (stem, ext) = match trimmed.rfind('.') {
        Some(dot) if trimmed.len() - dot <= 16 && dot > 0 => trimmed.split_at(dot),
        _ => (trimmed, ""),
    };
    let mut take = NAME_MAX - ext.len();
    while take > 0 && !stem.is_char_boundary(take) {
        take -= 1;
    }
    format!("{}{}", &stem[..take], ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_slash_and_backslash() {
        assert_eq!(sanitize_filename("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
    }

    #[test]
    fn keeps_inner_spaces_and_trims_outer() {
        assert_eq!(sanitize_filename("  my file.txt \t"), "my file.txt");
    }

    #[test]
    fn control_chars() {
        assert_eq!(sanitize_filename("file\x00name\n.txt"), "file_name_.txt");
    }

    #[test]
    fn dot_names_rejected() {
        assert_eq!(sanitize_filename("."), "");
        assert_eq!(sanitize_filename(" .. "), "");
    }

    #[test]
    fn long_names_truncated_keeping_extension() {
        let long = format!("{}.iso", "é".repeat(200));
        let out = sanitize_filename(&long);
        assert!(out.len() <= NAME_MAX);
        assert!(out.ends_with(".iso"));
        assert!(out.starts_with('é'));
    }
}

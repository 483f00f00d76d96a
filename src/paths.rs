// src/paths.rs
//! Texture name normalization.
//!
//! Names are cache keys, so `a\b/../c.png` and `a/c.png` must be the same
//! texture. A leading `<cmd>...` chain is kept verbatim; only the file part is
//! normalized.

/// Split `"<a><b>file"` into `("<a><b>", "file")`.
pub fn split_commands(name: &str) -> (&str, &str) {
    if name.starts_with('<') {
        if let Some(end) = name.rfind('>') {
            return name.split_at(end + 1);
        }
    }
    ("", name)
}

/// Normalize separators, drop `.` segments and fold `dir/..` pairs.
pub fn normalize_name(name: &str) -> String {
    let (prefix, file) = split_commands(name);
    let file = file.replace('\\', "/");
    let absolute = file.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    let segments: Vec<&str> = file.split('/').collect();
    let last = segments.len().saturating_sub(1);
    for (i, seg) in segments.into_iter().enumerate() {
        match seg {
            "" if i != last => {}
            "." if i != last => {}
            ".." => match parts.last() {
                Some(&p) if p != ".." => {
                    parts.pop();
                }
                _ => parts.push(seg),
            },
            _ => parts.push(seg),
        }
    }

    let mut out = String::with_capacity(prefix.len() + file.len());
    out.push_str(prefix);
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    out
}

/// Resolve `name` relative to `dir`, keeping any command prefix in front.
pub fn make_rel_path(dir: &str, name: &str) -> String {
    let (prefix, file) = split_commands(name);
    let dir = dir.trim_end_matches(['/', '\\']);
    if dir.is_empty() {
        return normalize_name(name);
    }
    normalize_name(&format!("{}{}/{}", prefix, dir, file))
}

/// Directory part of `path` (without the trailing separator), or "".
pub fn parent_dir(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(i) => &path[..i],
        None => "",
    }
}

#[inline]
pub fn has_separator(name: &str) -> bool {
    name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_parent_dirs() {
        assert_eq!(normalize_name("textures\\stone/../wood.png"), "textures/wood.png");
        assert_eq!(normalize_name("./a/./b.png"), "a/b.png");
        assert_eq!(normalize_name("../shared/x.png"), "../shared/x.png");
        assert_eq!(normalize_name("/abs/../x.png"), "/x.png");
    }

    #[test]
    fn test_normalize_keeps_command_prefix() {
        assert_eq!(
            normalize_name("<mad:0.5/0.1><rotate:1>a\\..\\b.jpg"),
            "<mad:0.5/0.1><rotate:1>b.jpg"
        );
    }

    #[test]
    fn test_rel_path() {
        assert_eq!(make_rel_path("sets/stone", "diffuse.png"), "sets/stone/diffuse.png");
        assert_eq!(
            make_rel_path("sets/stone/", "<grey>../common/n.png"),
            "<grey>sets/common/n.png"
        );
        assert_eq!(make_rel_path("", "x.png"), "x.png");
        assert_eq!(parent_dir("sets/stone/slot.json"), "sets/stone");
        assert_eq!(parent_dir("slot.json"), "");
    }
}

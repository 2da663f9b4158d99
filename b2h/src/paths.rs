use std::path::{Component, Path, PathBuf};

/// Characters stripped out of emitted file names.
/// Identifiers additionally reject everything outside `[A-Za-z0-9_]`.
const BAD_CHARS: [char; 5] = ['\\', '+', '-', '*', ' '];

/// Makes a valid C identifier out of an arbitrary name.
/// Idempotent: sanitizing an already sanitized identifier is a no-op.
pub fn sanitize_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    match ident.chars().next() {
        Some(c) if c.is_ascii_digit() => ident.insert(0, '_'),
        None => ident.push('_'),
        _ => (),
    }

    ident
}

/// Replaces unwanted characters in a file name, keeping extension dots.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if BAD_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Default destination for a source file: the sanitized basename with `.h`
/// appended, placed in the source's own directory.
pub fn default_output(source: &Path) -> PathBuf {
    let base = source
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());

    source.with_file_name(format!("{}.h", sanitize_filename(&base)))
}

/// The output name without its final extension, used to derive the identifier.
pub fn header_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned())
}

/// Drops `.` components and redundant separators. `..` components are kept,
/// resolving them would require touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }

    normalized
}

//! Cross-platform path canonicalization and equality.
//!
//! GNU GLOBAL echoes paths back in whatever form it was handed them, and on
//! Windows the environment we give it carries 8.3 short names. Every identity
//! comparison therefore goes through [`normalize`] / [`paths_equal`] rather
//! than comparing raw strings.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{GtagsError, Result};

/// Platform capabilities that affect path identity, resolved once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStyle {
    /// Fold case before comparing.
    pub case_insensitive: bool,
    /// Paths may be aliased by legacy short (8.3) names and must be expanded
    /// to their long form before comparison.
    pub long_path_expansion: bool,
}

impl PathStyle {
    pub const POSIX: PathStyle = PathStyle {
        case_insensitive: false,
        long_path_expansion: false,
    };

    pub const WINDOWS: PathStyle = PathStyle {
        case_insensitive: true,
        long_path_expansion: true,
    };

    pub fn current() -> PathStyle {
        *CURRENT_STYLE
    }
}

static CURRENT_STYLE: Lazy<PathStyle> = Lazy::new(|| {
    if cfg!(windows) {
        PathStyle::WINDOWS
    } else {
        PathStyle::POSIX
    }
});

static ENV_VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)\}|(?P<plain>[A-Za-z_][A-Za-z0-9_]*))")
        .unwrap()
});

static WINDOWS_ENV_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(?P<name>[A-Za-z_][A-Za-z0-9_]*)%").unwrap());

/// Expand a leading `~` and `$VAR` / `${VAR}` references (`%VAR%` on Windows).
///
/// Unset variables are left untouched.
pub fn expand(path: &str) -> String {
    let path = expand_home(path);

    let path = ENV_VAR_RE.replace_all(&path, |caps: &Captures| {
        let name = caps
            .name("braced")
            .or_else(|| caps.name("plain"))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });

    if cfg!(windows) {
        WINDOWS_ENV_VAR_RE
            .replace_all(&path, |caps: &Captures| {
                std::env::var(&caps["name"]).unwrap_or_else(|_| caps[0].to_string())
            })
            .into_owned()
    } else {
        path.into_owned()
    }
}

fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return path.to_string(),
    };

    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.to_string_lossy(), rest),
        None => path.to_string(),
    }
}

pub fn use_forward_slashes(path: &str) -> String {
    path.replace("\\\\", "/").replace('\\', "/")
}

/// Normalize `path` for identity comparison using the current platform style.
pub fn normalize(path: &str) -> Result<String> {
    normalize_with(path, PathStyle::current())
}

/// Normalize `path` under an explicit [`PathStyle`].
///
/// Non-existent paths still normalize: the longest existing ancestor is
/// canonicalized and the remainder is appended lexically.
pub fn normalize_with(path: &str, style: PathStyle) -> Result<String> {
    validate(path)?;

    let expanded = PathBuf::from(expand(path));
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()?.join(expanded)
    };

    let resolved = lexical_clean(&canonicalize_existing(&absolute));
    let mut text = resolved.to_string_lossy().into_owned();
    if style.case_insensitive {
        text = text.to_lowercase();
    }
    text = use_forward_slashes(&text);

    // Keep the root itself, drop trailing separators elsewhere.
    while text.len() > 1 && text.ends_with('/') && !text.ends_with(":/") {
        text.pop();
    }

    Ok(text)
}

/// Compare two paths for identity after normalization.
///
/// Malformed input (empty, NUL byte) is never equal to anything.
pub fn paths_equal(a: &str, b: &str) -> bool {
    let style = PathStyle::current();
    let (a, b) = if style.long_path_expansion {
        (to_long_path(a), to_long_path(b))
    } else {
        (a.to_string(), b.to_string())
    };

    match (normalize_with(&a, style), normalize_with(&b, style)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Absolute, lexically cleaned form of `path`, relative paths joined onto `base`.
///
/// Unlike [`normalize`] this keeps case and native separators and leaves
/// symlinks alone.
pub fn absolutize(path: &str, base: &Path) -> Result<PathBuf> {
    validate(path)?;
    let expanded = PathBuf::from(expand(path));
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    Ok(lexical_clean(&absolute))
}

/// Prepare an absolute path for the indexer's environment (`GTAGSROOT`,
/// `GTAGSLIBPATH`).
pub fn prepare_for_env(path: &Path) -> String {
    let text = path.to_string_lossy().into_owned();
    if PathStyle::current().long_path_expansion {
        to_short_path(&text)
    } else {
        text
    }
}

/// Decode indexer output using the platform's preferred encoding.
///
/// On Windows that is the active ANSI code page; elsewhere UTF-8. Invalid
/// sequences are replaced, never an error.
pub fn decode_native(bytes: &[u8]) -> String {
    #[cfg(windows)]
    {
        ansi::decode(bytes)
    }
    #[cfg(not(windows))]
    {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn validate(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(GtagsError::InvalidPath("empty path".to_string()));
    }
    if path.contains('\0') {
        return Err(GtagsError::InvalidPath(format!(
            "path contains a NUL byte: {:?}",
            path
        )));
    }
    Ok(())
}

fn canonicalize_existing(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(canonical) = dunce::canonicalize(ancestor) {
            return match path.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => canonical.join(rest),
                _ => canonical,
            };
        }
    }
    path.to_path_buf()
}

pub(crate) fn lexical_clean(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

#[cfg(windows)]
mod short_names {
    use std::ffi::OsString;
    use std::os::windows::ffi::{OsStrExt, OsStringExt};

    use windows_sys::Win32::Storage::FileSystem::{GetLongPathNameW, GetShortPathNameW};

    #[derive(Clone, Copy)]
    pub enum Conversion {
        ToLong,
        ToShort,
    }

    pub fn convert(path: &str, conversion: Conversion) -> String {
        let wide: Vec<u16> = std::ffi::OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let mut buffer = vec![0u16; 260];

        loop {
            // SAFETY: `wide` is NUL-terminated and `buffer` is valid for
            // `buffer.len()` UTF-16 units.
            let written = (unsafe {
                match conversion {
                    Conversion::ToLong => {
                        GetLongPathNameW(wide.as_ptr(), buffer.as_mut_ptr(), buffer.len() as u32)
                    }
                    Conversion::ToShort => {
                        GetShortPathNameW(wide.as_ptr(), buffer.as_mut_ptr(), buffer.len() as u32)
                    }
                }
            }) as usize;

            if written == 0 {
                tracing::debug!(
                    "Cannot convert path {}: {}",
                    path,
                    std::io::Error::last_os_error()
                );
                return path.to_string();
            }
            if written < buffer.len() {
                buffer.truncate(written);
                return OsString::from_wide(&buffer).to_string_lossy().into_owned();
            }
            buffer.resize(written + 1, 0);
        }
    }
}

#[cfg(windows)]
mod ansi {
    use windows_sys::Win32::Globalization::{MultiByteToWideChar, CP_ACP};

    pub fn decode(bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }
        let Ok(len) = i32::try_from(bytes.len()) else {
            return String::from_utf8_lossy(bytes).into_owned();
        };

        // SAFETY: a null output buffer asks only for the required length.
        let needed = unsafe {
            MultiByteToWideChar(CP_ACP, 0, bytes.as_ptr(), len, std::ptr::null_mut(), 0)
        };
        if needed <= 0 {
            return String::from_utf8_lossy(bytes).into_owned();
        }

        let mut wide = vec![0u16; needed as usize];
        // SAFETY: `wide` holds exactly `needed` UTF-16 units.
        let written = unsafe {
            MultiByteToWideChar(CP_ACP, 0, bytes.as_ptr(), len, wide.as_mut_ptr(), needed)
        };
        if written <= 0 {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        wide.truncate(written as usize);
        String::from_utf16_lossy(&wide)
    }
}

/// Expand a legacy short (8.3) path to its long form. Identity elsewhere.
pub fn to_long_path(path: &str) -> String {
    #[cfg(windows)]
    {
        short_names::convert(path, short_names::Conversion::ToLong)
    }
    #[cfg(not(windows))]
    {
        path.to_string()
    }
}

/// Convert a path to its legacy short (8.3) form. Identity elsewhere.
pub fn to_short_path(path: &str) -> String {
    #[cfg(windows)]
    {
        short_names::convert(path, short_names::Conversion::ToShort)
    }
    #[cfg(not(windows))]
    {
        path.to_string()
    }
}

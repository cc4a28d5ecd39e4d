//! Script shebang header: `#!<engine> [flags=F1,F2,...]\n`.
//!
//! Grounded on `evalExtractShebangFlags` in `eval.c`. A script body with no
//! `#!` prefix uses the default engine in compat mode; a malformed header is
//! rejected with the same error taxonomy the original exposes.

use thiserror::Error;

/// Name of the engine selected when a script carries no shebang line.
pub const DEFAULT_ENGINE: &str = "lua";

bitflags::bitflags! {
    /// Per-script flag bits carried in the shebang's `flags=` option.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlagSet: u32 {
        /// Set implicitly when a script has no shebang at all.
        const COMPAT_MODE          = 1 << 0;
        const NO_WRITES            = 1 << 1;
        const NO_CLUSTER           = 1 << 2;
        const ALLOW_CROSS_SLOT_KEYS = 1 << 3;
        const ALLOW_STALE          = 1 << 4;
        const ALLOW_OOM            = 1 << 5;
    }
}

impl FlagSet {
    fn from_name(name: &str) -> Option<FlagSet> {
        match name {
            "no-writes" => Some(FlagSet::NO_WRITES),
            "no-cluster" => Some(FlagSet::NO_CLUSTER),
            "allow-cross-slot-keys" => Some(FlagSet::ALLOW_CROSS_SLOT_KEYS),
            "allow-stale" => Some(FlagSet::ALLOW_STALE),
            "allow-oom" => Some(FlagSet::ALLOW_OOM),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    /// `None` when the script carried no shebang line at all.
    pub engine: Option<String>,
    pub flags: FlagSet,
    /// Number of leading bytes of the body that made up the header line
    /// (including the trailing newline), `0` when there was no shebang.
    pub header_len: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Invalid script shebang")]
    Malformed,
    #[error("Invalid engine in script shebang")]
    InvalidEngine,
    #[error("missing newline terminating script shebang")]
    Unterminated,
    #[error("Unexpected flag in script shebang: {0}")]
    UnexpectedFlag(String),
    #[error("Unknown lua shebang option: {0}")]
    UnknownOption(String),
}

/// Parses the shebang header, if any, from the start of `body`.
pub fn parse_header(body: &[u8]) -> Result<ParsedHeader, HeaderError> {
    if !body.starts_with(b"#!") {
        return Ok(ParsedHeader {
            engine: None,
            flags: FlagSet::COMPAT_MODE,
            header_len: 0,
        });
    }

    let newline = body.iter().position(|&b| b == b'\n').ok_or(HeaderError::Unterminated)?;
    let line = std::str::from_utf8(&body[2..newline]).map_err(|_| HeaderError::Malformed)?;

    let mut parts = line.split_whitespace();
    let engine = parts.next().ok_or(HeaderError::Malformed)?;
    if engine.is_empty() {
        return Err(HeaderError::InvalidEngine);
    }

    let mut flags = FlagSet::empty();
    for opt in parts {
        let (key, value) = opt.split_once('=').ok_or_else(|| HeaderError::UnexpectedFlag(opt.to_string()))?;
        if key != "flags" {
            return Err(HeaderError::UnexpectedFlag(key.to_string()));
        }
        for flag_name in value.split(',') {
            if flag_name.is_empty() {
                continue;
            }
            match FlagSet::from_name(flag_name) {
                Some(f) => flags |= f,
                None => return Err(HeaderError::UnknownOption(flag_name.to_string())),
            }
        }
    }

    Ok(ParsedHeader {
        engine: Some(engine.to_string()),
        flags,
        header_len: newline + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_shebang_defaults_to_compat_mode() {
        let parsed = parse_header(b"return 1").expect("parses");
        assert_eq!(parsed.engine, None);
        assert_eq!(parsed.flags, FlagSet::COMPAT_MODE);
        assert_eq!(parsed.header_len, 0);
    }

    #[test]
    fn test_bare_engine_name() {
        let parsed = parse_header(b"#!lua\nreturn 1").expect("parses");
        assert_eq!(parsed.engine.as_deref(), Some("lua"));
        assert_eq!(parsed.flags, FlagSet::empty());
    }

    #[test]
    fn test_engine_with_flags() {
        let parsed = parse_header(b"#!lua flags=no-writes,allow-oom\nreturn 1").expect("parses");
        assert_eq!(parsed.engine.as_deref(), Some("lua"));
        assert!(parsed.flags.contains(FlagSet::NO_WRITES));
        assert!(parsed.flags.contains(FlagSet::ALLOW_OOM));
        assert!(!parsed.flags.contains(FlagSet::NO_CLUSTER));
    }

    #[test]
    fn test_unterminated_header_is_error() {
        assert_eq!(parse_header(b"#!lua flags=no-writes"), Err(HeaderError::Unterminated));
    }

    #[test]
    fn test_unknown_flag_name_is_error() {
        let err = parse_header(b"#!lua flags=not-a-real-flag\nx").unwrap_err();
        assert_eq!(err, HeaderError::UnknownOption("not-a-real-flag".to_string()));
    }

    #[test]
    fn test_unexpected_option_key_is_error() {
        let err = parse_header(b"#!lua timeout=5\nx").unwrap_err();
        assert_eq!(err, HeaderError::UnexpectedFlag("timeout".to_string()));
    }

    #[test]
    fn test_header_len_covers_shebang_line_and_newline() {
        let parsed = parse_header(b"#!lua\nbody-here").expect("parses");
        assert_eq!(parsed.header_len, 6);
    }
}

use std::fmt;

/// Closed set of failures an asset request can end in.
///
/// Every variant is rendered as an error image; the code travels in the
/// `X-LiveDoc-Error` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PathTraversal,
    UnsupportedFormat,
    FileNotFound,
    FileTooLarge,
    SyntaxError,
    ServiceError,
    Unknown,
}

impl ErrorKind {
    /// Stable identifier exposed to callers through response metadata.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::PathTraversal => "PATH_TRAVERSAL",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::FileNotFound => "FILE_NOT_FOUND",
            ErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            ErrorKind::SyntaxError => "SYNTAX_ERROR",
            ErrorKind::ServiceError => "KROKI_ERROR",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// Title drawn at the top of the error image.
    pub fn title(self) -> &'static str {
        match self {
            ErrorKind::PathTraversal => "Invalid Path",
            ErrorKind::UnsupportedFormat => "Unsupported Format",
            ErrorKind::FileNotFound => "File Not Found",
            ErrorKind::FileTooLarge => "File Too Large",
            ErrorKind::SyntaxError => "Diagram Syntax Error",
            ErrorKind::ServiceError => "Kroki Service Error",
            ErrorKind::Unknown => "Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const ALL: [ErrorKind; 7] = [
        ErrorKind::PathTraversal,
        ErrorKind::UnsupportedFormat,
        ErrorKind::FileNotFound,
        ErrorKind::FileTooLarge,
        ErrorKind::SyntaxError,
        ErrorKind::ServiceError,
        ErrorKind::Unknown,
    ];

    #[test]
    fn codes_are_unique() {
        let codes: HashSet<_> = ALL.iter().map(|kind| kind.code()).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn service_errors_use_kroki_code() {
        assert_eq!(ErrorKind::ServiceError.to_string(), "KROKI_ERROR");
        assert_eq!(ErrorKind::FileNotFound.title(), "File Not Found");
    }
}

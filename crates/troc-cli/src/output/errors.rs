//! Error rendering with the hint attached to each error kind.

use std::error::Error;

use troc_core::error::TrocError;

use super::colors::ColorSupport;

pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    pub fn plain() -> Self {
        Self {
            colors: ColorSupport::disabled(),
        }
    }

    /// `error: ...`, then a `help:` line when the error has one, then the
    /// `caused by:` chain.
    pub fn format_error(&self, error: &TrocError) -> String {
        let mut output = format!("{}: {}\n", self.colors.red("error"), error);

        if let Some(suggestion) = error.suggestion() {
            output.push_str(&format!("\n{}: {}\n", self.colors.dim("help"), suggestion));
        }

        let mut source = error.source();
        while let Some(err) = source {
            output.push_str(&format!("{}: {}\n", self.colors.dim("caused by"), err));
            source = err.source();
        }

        output
    }

    pub fn format_simple(&self, message: &str) -> String {
        format!("{}: {}", self.colors.red("error"), message)
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_config_error_has_help() {
        let error = TrocError::ConfigValidation {
            field: "registries[0].prefix".to_string(),
            reason: "must start with /".to_string(),
        };
        let text = ErrorFormatter::plain().format_error(&error);
        assert!(text.starts_with("error: "));
        assert!(text.contains("registries[0].prefix"));
        assert!(text.contains("help: "));
    }

    #[test]
    fn test_format_includes_cause() {
        let error = TrocError::io(
            "Failed to bind 0.0.0.0:4873".to_string(),
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        );
        let text = ErrorFormatter::plain().format_error(&error);
        assert!(text.contains("caused by: address in use"));
    }

    #[test]
    fn test_format_simple() {
        assert_eq!(ErrorFormatter::plain().format_simple("boom"), "error: boom");
    }
}

//! Classification of tool output into structured diagnostics.
//!
//! The ISE tools print diagnostics in a fixed grammar:
//!
//! ```text
//! WARNING:Par:288 - The signal clk_ibufg has no load.
//! INFO:Xst - Done.
//! ```
//!
//! Lines matching `severity: tool[:code] - message` are classified and
//! reported through the logger; everything else is dropped. Whether a
//! stage succeeded is decided by exit code and artifact existence, never
//! by diagnostics.

use std::sync::LazyLock;

use regex::Regex;

static MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<severity>error|warning|info):(?P<tool>.*?)(?::(?P<code>.*?))? - (?P<text>.*)$")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn parse(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("error") {
            Self::Error
        } else if tag.eq_ignore_ascii_case("warning") {
            Self::Warning
        } else {
            Self::Info
        }
    }
}

/// One classified diagnostic line.
#[derive(Debug, Clone)]
pub struct ToolMessage {
    pub severity: Severity,
    /// The reporting tool component (`Par`, `Xst`, `HDLCompiler`).
    pub tool: String,
    /// The tool-specific message number, when present.
    pub code: Option<String>,
    pub text: String,
}

impl std::fmt::Display for ToolMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}[{}]: {}", self.tool, code, self.text),
            None => write!(f, "{}: {}", self.tool, self.text),
        }
    }
}

/// Line-by-line diagnostic scanner fed with combined stdout/stderr.
#[derive(Debug, Default)]
pub struct MessageParser {
    messages: Vec<ToolMessage>,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one line; matched diagnostics are recorded and reported
    /// through the logger at their severity.
    pub fn parse_line(&mut self, line: &str) -> Option<&ToolMessage> {
        let captures = MESSAGE.captures(line)?;
        let message = ToolMessage {
            severity: Severity::parse(&captures["severity"]),
            tool: captures["tool"].trim().to_string(),
            code: captures
                .name("code")
                .map(|code| code.as_str().trim().to_string()),
            text: captures["text"].to_string(),
        };

        match message.severity {
            Severity::Error => tracing::error!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Info => tracing::info!("{}", message),
        }

        self.messages.push(message);
        self.messages.last()
    }

    pub fn messages(&self) -> &[ToolMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ToolMessage> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_with_code() {
        let mut parser = MessageParser::new();
        let message = parser
            .parse_line("WARNING:Par:288 - The signal clk_ibufg has no load.")
            .expect("matched");
        assert_eq!(message.severity, Severity::Warning);
        assert_eq!(message.tool, "Par");
        assert_eq!(message.code.as_deref(), Some("288"));
        assert_eq!(message.text, "The signal clk_ibufg has no load.");
    }

    #[test]
    fn classifies_without_code() {
        let mut parser = MessageParser::new();
        let message = parser.parse_line("INFO:Xst - Done.").expect("matched");
        assert_eq!(message.severity, Severity::Info);
        assert_eq!(message.tool, "Xst");
        assert!(message.code.is_none());
        assert_eq!(message.text, "Done.");
    }

    #[test]
    fn severity_is_case_insensitive() {
        let mut parser = MessageParser::new();
        let message = parser
            .parse_line("error:NgdBuild:604 - logical block unresolved")
            .expect("matched");
        assert_eq!(message.severity, Severity::Error);
    }

    #[test]
    fn non_diagnostic_lines_are_dropped() {
        let mut parser = MessageParser::new();
        assert!(parser.parse_line("Release 13.2 - par O.61xd").is_none());
        assert!(parser.parse_line("").is_none());
        assert!(parser.parse_line("Mapping design into LUTs...").is_none());
        assert!(parser.messages().is_empty());
    }
}

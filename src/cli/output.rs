use console::style;
use serde::Serialize;

use crate::error::{Result, StructuredError, XpError};

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| XpError::Serialization(format!("serialize output: {err}")))?;
    println!("{payload}");
    Ok(())
}

/// Machine-mode error envelope printed to stdout.
#[derive(Serialize)]
pub struct ErrorEnvelope {
    pub error: bool,
    #[serde(flatten)]
    pub details: StructuredError,
}

impl From<&XpError> for ErrorEnvelope {
    fn from(err: &XpError) -> Self {
        Self {
            error: true,
            details: err.to_structured(),
        }
    }
}

/// Report a failed command in the selected output mode.
pub fn emit_error(err: &XpError, machine: bool) {
    if machine {
        let envelope = ErrorEnvelope::from(err);
        match serde_json::to_string_pretty(&envelope) {
            Ok(payload) => println!("{payload}"),
            Err(_) => println!(
                r#"{{"error": true, "message": "{}"}}"#,
                err.to_string().escape_default()
            ),
        }
        return;
    }

    let structured = err.to_structured();
    eprintln!("{} {}", style("Error:").red().bold(), structured.message);
    eprintln!("  {} {}", style("hint:").dim(), structured.suggestion);
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 18,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push(String::new());
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push("-".repeat(text.len().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        let padded = format!("{key:width$}", width = self.key_width);
        self.lines.push(format!("{} {value}", style(padded).dim()));
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        self.lines.push(format!("- {text}"));
        self
    }

    pub fn push_line(&mut self, text: &str) -> &mut Self {
        self.lines.push(text.to_string());
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}

/// Colored label for a recommendation or status keyword.
pub fn verdict(text: &str) -> String {
    match text {
        "roll_forward" | "completed" | "all_green" | "running" => style(text).green().to_string(),
        "roll_back" | "rolled_back" | "breached" => style(text).red().bold().to_string(),
        "extend" | "paused" | "insufficient_data" => style(text).yellow().to_string(),
        _ => text.to_string(),
    }
}

/// Percent with sign, or `inf` for unbounded lifts.
pub fn format_lift(lift: f64) -> String {
    if lift.is_finite() {
        format!("{:+.2}%", lift * 100.0)
    } else {
        "+inf".to_string()
    }
}

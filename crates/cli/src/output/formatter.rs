//! Console formatter shared by all commands
//!
//! In JSON mode nothing but the final document reaches stdout: status lines
//! are dropped and errors become `{"error": ...}` objects on stderr.

use console::Style;
use serde::Serialize;

use super::OutputConfig;

/// Styles applied to the parts of a status line
#[derive(Debug, Clone)]
struct Palette {
    name: Style,
    size: Style,
    date: Style,
    ok: Style,
    failed: Style,
    caution: Style,
}

impl Palette {
    fn colored() -> Self {
        Self {
            name: Style::new().bold(),
            size: Style::new().green(),
            date: Style::new().dim(),
            ok: Style::new().green(),
            failed: Style::new().red(),
            caution: Style::new().yellow(),
        }
    }

    fn plain() -> Self {
        let none = Style::new();
        Self {
            name: none.clone(),
            size: none.clone(),
            date: none.clone(),
            ok: none.clone(),
            failed: none.clone(),
            caution: none,
        }
    }
}

/// Writes command results as text or JSON according to the global flags
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
    palette: Palette,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        let palette = if config.no_color || config.json {
            Palette::plain()
        } else {
            Palette::colored()
        };
        Self { config, palette }
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    /// Status lines are shown only in text mode without `--quiet`
    fn chatty(&self) -> bool {
        !self.config.quiet && !self.config.json
    }

    /// Progress bars follow the same rule as status lines
    pub fn progress_enabled(&self) -> bool {
        self.chatty()
    }

    /// Key or bucket name
    pub fn style_name(&self, text: &str) -> String {
        self.palette.name.apply_to(text).to_string()
    }

    pub fn style_size(&self, text: &str) -> String {
        self.palette.size.apply_to(text).to_string()
    }

    pub fn style_date(&self, text: &str) -> String {
        self.palette.date.apply_to(text).to_string()
    }

    /// Completed item, on stdout
    pub fn success(&self, message: &str) {
        if self.chatty() {
            println!("{} {message}", self.palette.ok.apply_to("✓"));
        }
    }

    /// Partial failure summary, on stderr
    pub fn warning(&self, message: &str) {
        if self.chatty() {
            eprintln!("{} {message}", self.palette.caution.apply_to("!"));
        }
    }

    /// Failure, on stderr; printed even with `--quiet`
    pub fn error(&self, message: &str) {
        if self.config.json {
            let document = serde_json::json!({ "error": message });
            match serde_json::to_string_pretty(&document) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{message}"),
            }
        } else {
            eprintln!("{} {message}", self.palette.failed.apply_to("✗"));
        }
    }

    /// Final JSON document of a command
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Cannot encode output as JSON: {e}"),
        }
    }

    /// Plain text line such as a table; suppressed by `--quiet`
    pub fn println(&self, message: &str) {
        if !self.config.quiet {
            println!("{message}");
        }
    }
}

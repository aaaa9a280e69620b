//! Assembly text buffer
//!
//! Accumulates AT&T-syntax lines for one compilation call. Directives and
//! labels start at column 0, instructions are indented.

use std::fmt::{self, Write};

const INDENT: &str = "    ";

/// Owned output buffer for one compilation
#[derive(Debug, Default, Clone)]
pub struct AsmBuffer {
    text: String,
    lines: usize,
}

impl AsmBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `.text`, `.globl main`, ...
    pub fn directive(
        &mut self,
        directive: &str,
    ) {
        self.line(format_args!("{directive}"));
    }

    pub fn label(
        &mut self,
        name: &str,
    ) {
        self.line(format_args!("{name}:"));
    }

    /// Label followed by a `#` comment
    pub fn label_with_comment(
        &mut self,
        name: &str,
        comment: &dyn fmt::Display,
    ) {
        self.line(format_args!("{name}: # {comment}"));
    }

    /// One instruction, e.g. `insn("pushl", &["%eax"])`
    pub fn insn(
        &mut self,
        mnemonic: &str,
        operands: &[&str],
    ) {
        if operands.is_empty() {
            self.line(format_args!("{INDENT}{mnemonic}"));
        } else {
            self.line(format_args!("{INDENT}{mnemonic} {}", operands.join(", ")));
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn finish(self) -> String {
        self.text
    }

    fn line(
        &mut self,
        args: fmt::Arguments<'_>,
    ) {
        // writing into a String cannot fail
        let _ = self.text.write_fmt(args);
        self.text.push('\n');
        self.lines += 1;
    }
}

/// `$value`
pub fn immediate(value: i32) -> String {
    format!("${value}")
}

/// `offset(%base)`
pub fn memory(
    offset: i32,
    base: &str,
) -> String {
    format!("{offset}({base})")
}

//! Line-oriented formatting for generated source text.
//!
//! Emission works on lists of lines (allocations are spliced in after the
//! fact), so the formatter builds indented text and hands it back split
//! into lines.

/// Builds indented code text.
#[derive(Debug)]
pub struct CodeFormatter {
    output: String,
    indent_level: usize,
    indent_str: String,
    at_line_start: bool,
}

impl CodeFormatter {
    /// Create a new formatter with the given indent string.
    pub fn new(indent_str: &str) -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            indent_str: indent_str.to_string(),
            at_line_start: true,
        }
    }

    /// Indent following lines one more level.
    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    /// Indent following lines one level less.
    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    /// Write text, indenting at each line start.
    pub fn write(&mut self, s: &str) {
        for c in s.chars() {
            if c == '\n' {
                self.output.push('\n');
                self.at_line_start = true;
            } else {
                if self.at_line_start {
                    for _ in 0..self.indent_level {
                        self.output.push_str(&self.indent_str);
                    }
                    self.at_line_start = false;
                }
                self.output.push(c);
            }
        }
    }

    /// Write one line.
    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        self.write("\n");
    }

    /// Write `header {`, the body one level deeper, then `trailer`.
    ///
    /// The trailer lets callers close with `} name;` or `}  // name`.
    pub fn block<F: FnOnce(&mut Self)>(&mut self, header: &str, trailer: &str, f: F) {
        self.write(header);
        self.writeln(" {");
        self.indent();
        f(self);
        self.dedent();
        self.writeln(trailer);
    }

    /// Consume the formatter and split into lines.
    pub fn into_lines(self) -> Vec<String> {
        self.output.lines().map(str::to_string).collect()
    }
}

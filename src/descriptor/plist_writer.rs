use super::ServiceDescriptor;
use crate::errors::ValidationError;
use std::fmt::Write;

const PLIST_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
"#;

/// Serialize the descriptor into an xml property list. The output only depends on the descriptor, so
/// generating twice yields byte-identical documents.
pub fn generate(descr: &ServiceDescriptor) -> Result<String, ValidationError> {
    descr.validate()?;

    let mut doc = PlistBuilder::new();
    doc.raw(PLIST_HEADER);
    doc.open("dict");

    doc.key("Label");
    doc.string(&descr.label);

    doc.key("ProgramArguments");
    doc.open("array");
    for arg in descr.program_arguments() {
        doc.string(&arg);
    }
    doc.close("array");

    doc.key("RunAtLoad");
    doc.boolean(descr.run_at_load);

    doc.key("StandardOutPath");
    doc.string(&descr.stdout_path.to_string_lossy());
    doc.key("StandardErrorPath");
    doc.string(&descr.stderr_path.to_string_lossy());

    if descr.keep_alive {
        doc.key("KeepAlive");
        doc.boolean(true);
    }
    if let Some(dir) = &descr.working_directory {
        doc.key("WorkingDirectory");
        doc.string(&dir.to_string_lossy());
    }
    if !descr.environment.is_empty() {
        doc.key("EnvironmentVariables");
        doc.open("dict");
        for (name, value) in &descr.environment {
            doc.key(name);
            doc.string(value);
        }
        doc.close("dict");
    }

    doc.close("dict");
    doc.raw("</plist>\n");
    Ok(doc.finish())
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            // a raw CR would be normalized to LF by the reader
            '\r' => escaped.push_str("&#13;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

struct PlistBuilder {
    out: String,
    depth: usize,
}

impl PlistBuilder {
    fn new() -> Self {
        PlistBuilder {
            out: String::new(),
            depth: 0,
        }
    }

    fn raw(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push('\t');
        }
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        // writing into a String cannot fail
        let _ = writeln!(self.out, "<{}>", tag);
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth -= 1;
        self.indent();
        let _ = writeln!(self.out, "</{}>", tag);
    }

    fn key(&mut self, key: &str) {
        self.indent();
        let _ = writeln!(self.out, "<key>{}</key>", escape_xml(key));
    }

    fn string(&mut self, value: &str) {
        self.indent();
        let _ = writeln!(self.out, "<string>{}</string>", escape_xml(value));
    }

    fn boolean(&mut self, value: bool) {
        self.indent();
        let _ = writeln!(self.out, "<{}/>", if value { "true" } else { "false" });
    }

    fn finish(self) -> String {
        self.out
    }
}

//! Parse xml property lists back into descriptors. Only the subset launchd agents use is understood:
//! dict, array, key, string, true and false. The xml prolog, doctype and comments are skipped.

use super::ServiceDescriptor;
use crate::errors::ValidationError;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlistValue {
    String(String),
    Boolean(bool),
    Array(Vec<PlistValue>),
    Dict(Vec<(String, PlistValue)>),
}

impl PlistValue {
    fn type_name(&self) -> &'static str {
        match self {
            PlistValue::String(_) => "string",
            PlistValue::Boolean(_) => "boolean",
            PlistValue::Array(_) => "array",
            PlistValue::Dict(_) => "dict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
}

pub fn parse(content: &str) -> Result<ServiceDescriptor, ValidationError> {
    let root = parse_plist(content)?;
    let entries = match root {
        PlistValue::Dict(entries) => entries,
        other => {
            return Err(ValidationError::Malformed(format!(
                "top level element must be a dict but was {}",
                other.type_name()
            )))
        }
    };
    let descr = descriptor_from_entries(entries)?;
    descr.validate()?;
    Ok(descr)
}

/// Parse the document into a generic value tree
pub fn parse_plist(content: &str) -> Result<PlistValue, ValidationError> {
    let tokens = tokenize(content)?;
    let mut parser = Parser { tokens, pos: 0 };

    parser.skip_whitespace();
    parser.expect_open("plist")?;
    let root = parser.parse_value()?;
    parser.skip_whitespace();
    parser.expect_close("plist")?;
    parser.skip_whitespace();
    if let Some(tok) = parser.next() {
        return Err(ValidationError::Malformed(format!(
            "unexpected content after </plist>: {:?}",
            tok
        )));
    }
    Ok(root)
}

fn descriptor_from_entries(
    entries: Vec<(String, PlistValue)>,
) -> Result<ServiceDescriptor, ValidationError> {
    let mut seen: Vec<String> = Vec::new();

    let mut label = None;
    let mut program_arguments = None;
    let mut run_at_load = false;
    let mut keep_alive = false;
    let mut stdout_path = None;
    let mut stderr_path = None;
    let mut working_directory = None;
    let mut environment = BTreeMap::new();

    for (key, value) in entries {
        if seen.contains(&key) {
            return Err(ValidationError::DuplicateKey(key));
        }
        seen.push(key.clone());

        match key.as_str() {
            "Label" => label = Some(expect_string(&key, value)?),
            "ProgramArguments" => {
                let values = match value {
                    PlistValue::Array(values) => values,
                    _ => return Err(ValidationError::WrongType(key, "array")),
                };
                let mut args = Vec::with_capacity(values.len());
                for arg in values {
                    args.push(expect_string(&key, arg)?);
                }
                program_arguments = Some(args);
            }
            "RunAtLoad" => run_at_load = expect_bool(&key, value)?,
            "KeepAlive" => keep_alive = expect_bool(&key, value)?,
            "StandardOutPath" => stdout_path = Some(PathBuf::from(expect_string(&key, value)?)),
            "StandardErrorPath" => stderr_path = Some(PathBuf::from(expect_string(&key, value)?)),
            "WorkingDirectory" => {
                working_directory = Some(PathBuf::from(expect_string(&key, value)?))
            }
            "EnvironmentVariables" => {
                let vars = match value {
                    PlistValue::Dict(vars) => vars,
                    _ => return Err(ValidationError::WrongType(key, "dict")),
                };
                for (name, value) in vars {
                    if environment.contains_key(&name) {
                        return Err(ValidationError::DuplicateKey(name));
                    }
                    let value = expect_string(&name, value)?;
                    environment.insert(name, value);
                }
            }
            _ => return Err(ValidationError::UnknownKey(key)),
        }
    }

    let mut program_arguments =
        program_arguments.ok_or(ValidationError::MissingKey("ProgramArguments"))?;
    if program_arguments.is_empty() {
        return Err(ValidationError::EmptyProgramArguments);
    }
    let program_path = PathBuf::from(program_arguments.remove(0));

    Ok(ServiceDescriptor {
        label: label.ok_or(ValidationError::MissingKey("Label"))?,
        program_path,
        arguments: program_arguments,
        run_at_load,
        stdout_path: stdout_path.ok_or(ValidationError::MissingKey("StandardOutPath"))?,
        stderr_path: stderr_path.ok_or(ValidationError::MissingKey("StandardErrorPath"))?,
        keep_alive,
        working_directory,
        environment,
    })
}

fn expect_string(key: &str, value: PlistValue) -> Result<String, ValidationError> {
    match value {
        PlistValue::String(s) => Ok(s),
        _ => Err(ValidationError::WrongType(key.to_owned(), "string")),
    }
}

fn expect_bool(key: &str, value: PlistValue) -> Result<bool, ValidationError> {
    match value {
        PlistValue::Boolean(b) => Ok(b),
        _ => Err(ValidationError::WrongType(key.to_owned(), "boolean")),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn skip_whitespace(&mut self) {
        while let Some(Token::Text(text)) = self.peek() {
            if text.trim().is_empty() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn expect_open(&mut self, name: &str) -> Result<(), ValidationError> {
        match self.next() {
            Some(Token::Open(found)) if found == name => Ok(()),
            other => Err(ValidationError::Malformed(format!(
                "expected <{}> but found {:?}",
                name, other
            ))),
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), ValidationError> {
        match self.next() {
            Some(Token::Close(found)) if found == name => Ok(()),
            other => Err(ValidationError::Malformed(format!(
                "expected </{}> but found {:?}",
                name, other
            ))),
        }
    }

    /// Text up to the closing tag. Whitespace is kept as is, it is part of the value. Comments split the text
    /// into several tokens, they are joined again.
    fn text_until_close(&mut self, name: &str) -> Result<String, ValidationError> {
        let mut text = String::new();
        while let Some(Token::Text(part)) = self.peek() {
            text.push_str(part);
            self.pos += 1;
        }
        self.expect_close(name)?;
        Ok(text)
    }

    fn parse_value(&mut self) -> Result<PlistValue, ValidationError> {
        self.skip_whitespace();
        match self.next() {
            Some(Token::Open(name)) => match name.as_str() {
                "string" => Ok(PlistValue::String(self.text_until_close("string")?)),
                "array" => {
                    let mut values = Vec::new();
                    loop {
                        self.skip_whitespace();
                        if let Some(Token::Close(name)) = self.peek() {
                            if name == "array" {
                                self.pos += 1;
                                break;
                            }
                        }
                        values.push(self.parse_value()?);
                    }
                    Ok(PlistValue::Array(values))
                }
                "dict" => {
                    let mut entries = Vec::new();
                    loop {
                        self.skip_whitespace();
                        if let Some(Token::Close(name)) = self.peek() {
                            if name == "dict" {
                                self.pos += 1;
                                break;
                            }
                        }
                        self.expect_open("key")?;
                        let key = self.text_until_close("key")?;
                        let value = self.parse_value()?;
                        entries.push((key, value));
                    }
                    Ok(PlistValue::Dict(entries))
                }
                other => Err(ValidationError::Malformed(format!(
                    "unsupported element <{}>",
                    other
                ))),
            },
            Some(Token::Empty(name)) => match name.as_str() {
                "true" => Ok(PlistValue::Boolean(true)),
                "false" => Ok(PlistValue::Boolean(false)),
                "string" => Ok(PlistValue::String(String::new())),
                "array" => Ok(PlistValue::Array(Vec::new())),
                "dict" => Ok(PlistValue::Dict(Vec::new())),
                other => Err(ValidationError::Malformed(format!(
                    "unsupported element <{}/>",
                    other
                ))),
            },
            other => Err(ValidationError::Malformed(format!(
                "expected a value but found {:?}",
                other
            ))),
        }
    }
}

fn tokenize(content: &str) -> Result<Vec<Token>, ValidationError> {
    let mut tokens = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        if rest.starts_with("<!--") {
            let end = rest
                .find("-->")
                .ok_or_else(|| ValidationError::Malformed("unterminated comment".into()))?;
            rest = &rest[end + 3..];
        } else if rest.starts_with("<![CDATA[") {
            return Err(ValidationError::Malformed(
                "CDATA sections are not supported".into(),
            ));
        } else if rest.starts_with("<?") {
            let end = rest.find("?>").ok_or_else(|| {
                ValidationError::Malformed("unterminated processing instruction".into())
            })?;
            rest = &rest[end + 2..];
        } else if rest.starts_with("<!") {
            let end = rest
                .find('>')
                .ok_or_else(|| ValidationError::Malformed("unterminated doctype".into()))?;
            rest = &rest[end + 1..];
        } else if rest.starts_with('<') {
            let end = rest
                .find('>')
                .ok_or_else(|| ValidationError::Malformed("unterminated tag".into()))?;
            let inner = rest[1..end].trim();
            tokens.push(tag_token(inner)?);
            rest = &rest[end + 1..];
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            tokens.push(Token::Text(unescape_xml(&rest[..end])?));
            rest = &rest[end..];
        }
    }

    Ok(tokens)
}

fn tag_token(inner: &str) -> Result<Token, ValidationError> {
    let tag_name = |s: &str| -> Result<String, ValidationError> {
        // attributes (like the version on <plist>) are ignored
        match s.split_whitespace().next() {
            Some(name) => Ok(name.to_owned()),
            None => Err(ValidationError::Malformed("empty tag".into())),
        }
    };

    if let Some(name) = inner.strip_prefix('/') {
        Ok(Token::Close(tag_name(name)?))
    } else if let Some(name) = inner.strip_suffix('/') {
        Ok(Token::Empty(tag_name(name)?))
    } else {
        Ok(Token::Open(tag_name(inner)?))
    }
}

pub fn unescape_xml(text: &str) -> Result<String, ValidationError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let semi = rest[amp..]
            .find(';')
            .ok_or_else(|| ValidationError::Malformed(format!("unterminated entity in {:?}", text)))?;
        let entity = &rest[amp + 1..amp + semi];
        let resolved = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(std::char::from_u32).ok_or_else(|| {
                    ValidationError::Malformed(format!("unknown entity &{};", entity))
                })?
            }
        };
        out.push(resolved);
        rest = &rest[amp + semi + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

//! A deliberately tiny stylesheet evaluator backing the mock compiler.
//!
//! Understands just enough of SCSS and the indented syntax for the
//! integration suite: variable declarations and substitution, nested rules,
//! `@import` through a pluggable loader, and the `@error`/`@warn`/`@debug`
//! directives. It is not Sass.

use std::collections::HashMap;

use sasspipe_proto as proto;

/// Import resolution as seen by the evaluator. The wire engine implements
/// this with host callbacks and include-path lookups.
pub trait ImportAccess {
    /// Resolve an import name to its content and syntax. `Ok(None)` means
    /// not found; `Err` carries a resolver error that fails the compile.
    fn resolve(&mut self, name: &str)
        -> std::result::Result<Option<(String, proto::Syntax)>, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Warning,
    Deprecation,
    Debug,
}

/// A diagnostic produced while evaluating a stylesheet.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub message: String,
    /// 0-based line and column of the originating statement; only recorded
    /// for statements in the entry stylesheet.
    pub location: Option<(u32, u32)>,
    pub deprecation_type: Option<String>,
    /// Whether the event originated inside an imported stylesheet.
    pub from_dependency: bool,
}

#[derive(Debug)]
pub struct Output {
    pub css: String,
    pub events: Vec<Event>,
}

pub fn compile(
    source: &str,
    syntax: proto::Syntax,
    style: proto::OutputStyle,
    imports: &mut dyn ImportAccess,
) -> std::result::Result<Output, String> {
    let mut state = Eval {
        imports,
        env: HashMap::new(),
        rules: Vec::new(),
        events: Vec::new(),
    };
    state.eval_source(source, syntax, 0)?;
    Ok(Output {
        css: render(&state.rules, style),
        events: state.events,
    })
}

type Rule = (String, Vec<(String, String)>);

#[derive(Debug)]
enum Stmt {
    Var {
        name: String,
        value: String,
        default: bool,
    },
    Decl {
        prop: String,
        value: String,
    },
    At {
        name: String,
        arg: String,
        offset: usize,
    },
    Rule {
        selector: String,
        body: Vec<Stmt>,
    },
    Noop,
}

struct Eval<'a> {
    imports: &'a mut dyn ImportAccess,
    env: HashMap<String, String>,
    rules: Vec<Rule>,
    events: Vec<Event>,
}

impl Eval<'_> {
    fn eval_source(
        &mut self,
        source: &str,
        syntax: proto::Syntax,
        depth: usize,
    ) -> std::result::Result<(), String> {
        let text = match syntax {
            proto::Syntax::Indented => indented_to_blocks(source),
            _ => source.to_string(),
        };
        let statements = parse_block(&text, 0);
        self.eval_body(&text, &statements, None, depth)
    }

    fn eval_body(
        &mut self,
        text: &str,
        statements: &[Stmt],
        parent: Option<&str>,
        depth: usize,
    ) -> std::result::Result<(), String> {
        let mut props = Vec::new();
        let mut nested: Vec<(&str, &[Stmt])> = Vec::new();

        for statement in statements {
            match statement {
                Stmt::Noop => {}
                Stmt::Var {
                    name,
                    value,
                    default,
                } => {
                    if !*default || !self.env.contains_key(name) {
                        let value = substitute(value, &self.env)?;
                        self.env.insert(name.clone(), value);
                    }
                }
                Stmt::Decl { prop, value } => {
                    props.push((prop.clone(), substitute(value, &self.env)?));
                }
                Stmt::At { name, arg, offset } => {
                    self.eval_at(text, name, arg, *offset, depth)?;
                }
                Stmt::Rule { selector, body } => nested.push((selector, body)),
            }
        }

        if let Some(selector) = parent {
            if !props.is_empty() {
                self.rules.push((selector.to_string(), props));
            }
        }

        for (selector, body) in nested {
            let full = match parent {
                Some(parent) => format!("{parent} {selector}"),
                None => selector.to_string(),
            };
            self.eval_body(text, body, Some(&full), depth)?;
        }

        Ok(())
    }

    fn eval_at(
        &mut self,
        text: &str,
        name: &str,
        arg: &str,
        offset: usize,
        depth: usize,
    ) -> std::result::Result<(), String> {
        match name {
            "import" => {
                let target = unquote(arg);
                self.events.push(Event {
                    kind: EventKind::Deprecation,
                    message: "Sass @import rules are deprecated and will be removed.".to_string(),
                    location: top_level_location(text, offset, depth),
                    deprecation_type: Some("import".to_string()),
                    from_dependency: depth > 0,
                });
                match self.imports.resolve(&target)? {
                    Some((content, syntax)) => self.eval_source(&content, syntax, depth + 1),
                    None => Err(format!("Can't find stylesheet to import: {target}")),
                }
            }
            // Tolerated so shared fixtures do not explode; modules are not
            // evaluated.
            "use" => Ok(()),
            "error" => Err(unquote(arg)),
            "warn" => {
                self.events.push(Event {
                    kind: EventKind::Warning,
                    message: unquote(arg),
                    location: None,
                    deprecation_type: None,
                    from_dependency: depth > 0,
                });
                Ok(())
            }
            "debug" => {
                self.events.push(Event {
                    kind: EventKind::Debug,
                    message: unquote(arg),
                    location: top_level_location(text, offset, depth),
                    deprecation_type: None,
                    from_dependency: depth > 0,
                });
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn top_level_location(text: &str, offset: usize, depth: usize) -> Option<(u32, u32)> {
    if depth > 0 {
        return None;
    }
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() as u32;
    let column = (offset - before.rfind('\n').map(|pos| pos + 1).unwrap_or(0)) as u32;
    Some((line, column))
}

fn substitute(
    value: &str,
    env: &HashMap<String, String>,
) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '-' || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        match env.get(&name) {
            Some(bound) => out.push_str(bound),
            None => return Err(format!("Undefined variable: ${name}.")),
        }
    }
    Ok(out)
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// Split a block of SCSS text into statements. `base` is the byte offset of
/// `input` within the entry stylesheet, so statement offsets stay absolute
/// through nesting.
fn parse_block(input: &str, base: usize) -> Vec<Stmt> {
    let bytes = input.as_bytes();
    let mut statements = Vec::new();
    let mut i = 0usize;
    let mut start = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'{' => {
                let selector = input[start..i].trim().to_string();
                let close = matching_brace(bytes, i);
                let body = &input[i + 1..close];
                statements.push(Stmt::Rule {
                    selector,
                    body: parse_block(body, base + i + 1),
                });
                i = (close + 1).min(bytes.len());
                start = i;
            }
            b';' => {
                push_simple(&mut statements, input, start, i, base);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    push_simple(&mut statements, input, start, input.len(), base);
    statements
}

/// Index of the `}` matching the `{` at `open`, or the end of input when
/// unbalanced.
fn matching_brace(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn push_simple(statements: &mut Vec<Stmt>, input: &str, start: usize, end: usize, base: usize) {
    let raw = &input[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let offset = base + start + (raw.len() - raw.trim_start().len());
    statements.push(classify(trimmed, offset));
}

fn classify(text: &str, offset: usize) -> Stmt {
    if let Some(rest) = text.strip_prefix('$') {
        if let Some((name, value)) = rest.split_once(':') {
            let mut value = value.trim().to_string();
            let mut default = false;
            if let Some(stripped) = value.strip_suffix("!default") {
                value = stripped.trim_end().to_string();
                default = true;
            }
            return Stmt::Var {
                name: name.trim().to_string(),
                value,
                default,
            };
        }
        return Stmt::Noop;
    }
    if let Some(rest) = text.strip_prefix('@') {
        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        return Stmt::At {
            name: name.to_string(),
            arg: arg.trim().to_string(),
            offset,
        };
    }
    if let Some((prop, value)) = text.split_once(':') {
        return Stmt::Decl {
            prop: prop.trim().to_string(),
            value: value.trim().to_string(),
        };
    }
    Stmt::Noop
}

/// Convert the indented syntax to brace-delimited text. One nesting level:
/// unindented lines open rules (or declare variables), indented lines are
/// declarations inside the open rule.
fn indented_to_blocks(source: &str) -> String {
    let mut out = String::new();
    let mut open = false;
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let indented = line.starts_with(' ') || line.starts_with('\t');
        if indented {
            out.push_str(trimmed);
            out.push_str(";\n");
        } else if trimmed.starts_with('$') || trimmed.starts_with('@') {
            if open {
                out.push_str("}\n");
                open = false;
            }
            out.push_str(trimmed);
            out.push_str(";\n");
        } else {
            if open {
                out.push_str("}\n");
            }
            out.push_str(trimmed);
            out.push_str(" {\n");
            open = true;
        }
    }
    if open {
        out.push_str("}\n");
    }
    out
}

fn render(rules: &[Rule], style: proto::OutputStyle) -> String {
    match style {
        proto::OutputStyle::Compressed => rules
            .iter()
            .map(|(selector, props)| {
                let body = props
                    .iter()
                    .map(|(prop, value)| format!("{prop}:{}", value.replace(", ", ",")))
                    .collect::<Vec<_>>()
                    .join(";");
                format!("{selector}{{{body}}}")
            })
            .collect(),
        _ => rules
            .iter()
            .map(|(selector, props)| {
                let body = props
                    .iter()
                    .map(|(prop, value)| format!("  {prop}: {value};"))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{selector} {{\n{body}\n}}")
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

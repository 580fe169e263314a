//! Lowering of typed script to plain Rhai.
//!
//! The typed dialect adds annotations to bindings and function signatures:
//!
//! ```text
//! let total: int = 0;
//! const names: string[] = ["a", "b"];
//! fn scale(v: float, k: int) -> float { v * k }
//! ```
//!
//! Annotations are removed. In strict mode every annotated binding and
//! parameter also gets a runtime assertion on `type_of`.

use crate::engine::error::EngineError;

/// Options controlling how typed source is lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranspileOptions {
    /// Insert runtime type assertions for annotated names
    pub strict: bool,
    /// Reject bindings and parameters without an annotation
    pub no_implicit_any: bool,
}

impl TranspileOptions {
    /// Sets strict mode.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets whether unannotated names are rejected.
    #[must_use]
    pub fn with_no_implicit_any(mut self, no_implicit_any: bool) -> Self {
        self.no_implicit_any = no_implicit_any;
        self
    }
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Ident,
    Number,
    Str,
    Punct,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: Kind,
    text: &'a str,
    start: usize,
    end: usize,
    line: usize,
}

impl Token<'_> {
    fn is(&self, punct: &str) -> bool {
        self.kind == Kind::Punct && self.text == punct
    }

    fn is_keyword(&self, word: &str) -> bool {
        self.kind == Kind::Ident && self.text == word
    }
}

const TWO_CHAR_PUNCT: &[&str] = &["->", "::", "=>", "==", "!=", "<=", ">=", "&&", "||"];

/// Splits source into significant tokens. Whitespace and comments are skipped.
fn lex(source: &str) -> Result<Vec<Token<'_>>, EngineError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut line = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;

        match b {
            b'\n' => {
                line += 1;
                i += 1;
            }
            _ if b.is_ascii_whitespace() => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let opened_on = line;
                let mut depth = 1;
                i += 2;
                while depth > 0 {
                    match (bytes.get(i), bytes.get(i + 1)) {
                        (None, _) => {
                            return Err(EngineError::transpile(opened_on, "unterminated comment"))
                        }
                        (Some(b'/'), Some(b'*')) => {
                            depth += 1;
                            i += 2;
                        }
                        (Some(b'*'), Some(b'/')) => {
                            depth -= 1;
                            i += 2;
                        }
                        (Some(c), _) => {
                            if *c == b'\n' {
                                line += 1;
                            }
                            i += 1;
                        }
                    }
                }
            }
            b'"' | b'\'' | b'`' => {
                let opened_on = line;
                i += 1;
                loop {
                    let Some(&c) = bytes.get(i) else {
                        return Err(EngineError::transpile(opened_on, "unterminated string"));
                    };
                    if c == b'\n' {
                        line += 1;
                    }
                    i += if c == b'\\' { 2 } else { 1 };
                    if c == b {
                        break;
                    }
                }
                i = i.min(bytes.len());
                tokens.push(Token {
                    kind: Kind::Str,
                    text: &source[start..i],
                    start,
                    end: i,
                    line: opened_on,
                });
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push(Token {
                    kind: Kind::Ident,
                    text: &source[start..i],
                    start,
                    end: i,
                    line,
                });
            }
            _ if b.is_ascii_digit() => {
                while i < bytes.len() {
                    let c = bytes[i];
                    let fraction = c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
                    if !(c.is_ascii_alphanumeric() || c == b'_' || fraction) {
                        break;
                    }
                    i += 1;
                }
                tokens.push(Token {
                    kind: Kind::Number,
                    text: &source[start..i],
                    start,
                    end: i,
                    line,
                });
            }
            _ => {
                let width = if TWO_CHAR_PUNCT.iter().any(|p| source[i..].starts_with(p)) {
                    2
                } else {
                    source[i..].chars().next().map_or(1, char::len_utf8)
                };
                i += width;
                tokens.push(Token {
                    kind: Kind::Punct,
                    text: &source[start..i],
                    start,
                    end: i,
                    line,
                });
            }
        }
    }

    Ok(tokens)
}

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCheck {
    Any,
    Is(&'static str),
}

#[derive(Debug, Clone)]
struct Annotation {
    written: String,
    check: TypeCheck,
}

/// Maps a written type name to the name `type_of` reports at runtime.
fn runtime_type(name: &str) -> Option<TypeCheck> {
    let check = match name {
        "int" | "i64" => TypeCheck::Is("i64"),
        "float" | "f64" => TypeCheck::Is("f64"),
        "bool" => TypeCheck::Is("bool"),
        "string" | "str" => TypeCheck::Is("string"),
        "char" => TypeCheck::Is("char"),
        "array" => TypeCheck::Is("array"),
        "map" | "object" => TypeCheck::Is("map"),
        "any" => TypeCheck::Any,
        _ => return None,
    };
    Some(check)
}

/// Parses `name ("[" "]")*` starting at `at`. Returns the index after it.
fn parse_type(tokens: &[Token<'_>], at: usize, line: usize) -> Result<(Annotation, usize), EngineError> {
    let token = tokens
        .get(at)
        .filter(|t| t.kind == Kind::Ident)
        .ok_or_else(|| EngineError::transpile(line, "expected a type after ':'"))?;

    let mut check = runtime_type(token.text).ok_or_else(|| {
        EngineError::transpile(token.line, format!("unknown type '{}'", token.text))
    })?;
    let mut written = token.text.to_string();
    let mut next = at + 1;

    while tokens.get(next).is_some_and(|t| t.is("["))
        && tokens.get(next + 1).is_some_and(|t| t.is("]"))
    {
        check = TypeCheck::Is("array");
        written.push_str("[]");
        next += 2;
    }

    Ok((Annotation { written, check }, next))
}

fn assertion(name: &str, annotation: &Annotation) -> Option<String> {
    let TypeCheck::Is(runtime) = annotation.check else {
        return None;
    };
    Some(format!(
        "if type_of({name}) != \"{runtime}\" {{ throw \"{name}: expected {}, found \" + type_of({name}); }}",
        annotation.written
    ))
}

// =============================================================================
// Lowering
// =============================================================================

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

impl Edit {
    fn delete(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            text: String::new(),
        }
    }

    fn insert(at: usize, text: String) -> Self {
        Self {
            start: at,
            end: at,
            text,
        }
    }
}

struct Lowering<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    options: TranspileOptions,
    edits: Vec<Edit>,
}

/// Lowers typed source to plain Rhai.
///
/// # Errors
///
/// Returns `EngineError::Transpile` for unknown types, malformed signatures,
/// unterminated strings or comments, and (with `no_implicit_any`) missing
/// annotations.
pub fn transpile(source: &str, options: TranspileOptions) -> Result<String, EngineError> {
    let mut lowering = Lowering {
        source,
        tokens: lex(source)?,
        options,
        edits: Vec::new(),
    };

    let mut i = 0;
    while i < lowering.tokens.len() {
        let token = lowering.tokens[i];
        i = if token.is_keyword("let") || token.is_keyword("const") {
            lowering.binding(i)?
        } else if token.is_keyword("fn") {
            lowering.function(i)?
        } else {
            i + 1
        };
    }

    Ok(lowering.apply())
}

impl Lowering<'_> {
    fn binding(&mut self, at: usize) -> Result<usize, EngineError> {
        let keyword = self.tokens[at];
        let name = *self
            .tokens
            .get(at + 1)
            .filter(|t| t.kind == Kind::Ident)
            .ok_or_else(|| {
                EngineError::transpile(keyword.line, format!("expected a name after '{}'", keyword.text))
            })?;

        let mut next = at + 2;
        if !self.tokens.get(next).is_some_and(|t| t.is(":")) {
            if self.options.no_implicit_any {
                return Err(EngineError::transpile(
                    name.line,
                    format!("'{}' needs a type annotation", name.text),
                ));
            }
            return Ok(next);
        }

        let colon = self.tokens[next];
        let (annotation, after) = parse_type(&self.tokens, next + 1, colon.line)?;
        self.edits
            .push(Edit::delete(colon.start, self.tokens[after - 1].end));
        next = after;

        let initialized = self.tokens.get(next).is_some_and(|t| t.is("="));
        if self.options.strict && initialized {
            if let Some(check) = assertion(name.text, &annotation) {
                let (at, prefix) = self.statement_end(next + 1);
                self.edits.push(Edit::insert(at, format!("{prefix} {check}")));
            }
        }

        Ok(next)
    }

    fn function(&mut self, at: usize) -> Result<usize, EngineError> {
        let keyword = self.tokens[at];
        let name = *self
            .tokens
            .get(at + 1)
            .filter(|t| t.kind == Kind::Ident)
            .ok_or_else(|| EngineError::transpile(keyword.line, "expected a function name"))?;

        if !self.tokens.get(at + 2).is_some_and(|t| t.is("(")) {
            return Err(EngineError::transpile(
                name.line,
                format!("expected '(' after '{}'", name.text),
            ));
        }

        let mut checks = Vec::new();
        let mut j = at + 3;
        loop {
            let token = *self.tokens.get(j).ok_or_else(|| {
                EngineError::transpile(name.line, "unterminated parameter list")
            })?;

            if token.is(")") {
                j += 1;
                break;
            }

            if token.kind != Kind::Ident {
                return Err(EngineError::transpile(
                    token.line,
                    format!("unexpected '{}' in parameter list", token.text),
                ));
            }

            j += 1;
            if self.tokens.get(j).is_some_and(|t| t.is(":")) {
                let colon = self.tokens[j];
                let (annotation, after) = parse_type(&self.tokens, j + 1, colon.line)?;
                self.edits
                    .push(Edit::delete(colon.start, self.tokens[after - 1].end));
                checks.extend(assertion(token.text, &annotation));
                j = after;
            } else if self.options.no_implicit_any {
                return Err(EngineError::transpile(
                    token.line,
                    format!(
                        "parameter '{}' of '{}' needs a type annotation",
                        token.text, name.text
                    ),
                ));
            }

            if self.tokens.get(j).is_some_and(|t| t.is(",")) {
                j += 1;
            }
        }

        if self.tokens.get(j).is_some_and(|t| t.is("->")) {
            let arrow = self.tokens[j];
            let (_, after) = parse_type(&self.tokens, j + 1, arrow.line)?;
            self.edits
                .push(Edit::delete(arrow.start, self.tokens[after - 1].end));
            j = after;
        }

        if self.options.strict && !checks.is_empty() {
            if let Some(body) = self.tokens.get(j).filter(|t| t.is("{")) {
                self.edits
                    .push(Edit::insert(body.end, format!(" {}", checks.join(" "))));
            }
        }

        Ok(j)
    }

    /// Finds where the statement starting before `from` ends.
    ///
    /// Returns the insertion point and the separator the inserted text needs.
    fn statement_end(&self, from: usize) -> (usize, &'static str) {
        let mut depth = 0usize;
        for token in &self.tokens[from..] {
            if token.kind != Kind::Punct {
                continue;
            }
            match token.text {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" if depth == 0 => return (token.start, ";"),
                ")" | "]" | "}" => depth -= 1,
                ";" if depth == 0 => return (token.end, ""),
                _ => {}
            }
        }
        (self.source.len(), "\n;")
    }

    fn apply(mut self) -> String {
        self.edits.sort_by_key(|edit| (edit.start, edit.end));

        let mut out = String::with_capacity(self.source.len() + 64);
        let mut cursor = 0;
        for edit in &self.edits {
            out.push_str(&self.source[cursor..edit.start]);
            out.push_str(&edit.text);
            cursor = edit.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(source: &str) -> String {
        transpile(source, TranspileOptions::default()).unwrap()
    }

    fn strict() -> TranspileOptions {
        TranspileOptions::default().with_strict(true)
    }

    #[test]
    fn removes_binding_annotations() {
        assert_eq!(lower("let x: int = 5;\nx"), "let x = 5;\nx");
        assert_eq!(lower("const names: string[] = [];"), "const names = [];");
    }

    #[test]
    fn removes_signature_annotations() {
        let out = lower("fn add(a: int, b: int) -> int { a + b }");
        assert_eq!(out, "fn add(a, b)  { a + b }");
    }

    #[test]
    fn untyped_source_is_unchanged() {
        let source = "let m = #{ a: 1, b: \"x: int\" };\n// let y: int\nm.a";
        assert_eq!(lower(source), source);
    }

    #[test]
    fn strings_with_colons_are_untouched() {
        assert_eq!(
            lower("let s: string = \"a: int\";"),
            "let s = \"a: int\";"
        );
    }

    #[test]
    fn strict_inserts_binding_assertion() {
        let out = transpile("let x: int = 5;\nx", strict()).unwrap();
        assert!(out.starts_with("let x = 5;"));
        assert!(out.contains("type_of(x) != \"i64\""));
        assert!(out.ends_with("\nx"));
    }

    #[test]
    fn strict_assertion_without_semicolon() {
        let out = transpile("let x: float = 1.5", strict()).unwrap();
        assert!(out.starts_with("let x = 1.5\n;"));
        assert!(out.contains("\"f64\""));
    }

    #[test]
    fn strict_skips_any() {
        let out = transpile("let x: any = 5;", strict()).unwrap();
        assert_eq!(out, "let x = 5;");
    }

    #[test]
    fn strict_inserts_parameter_assertions() {
        let out = transpile("fn twice(n: int) { n * 2 }", strict()).unwrap();
        assert!(out.contains("{ if type_of(n) != \"i64\""));
    }

    #[test]
    fn array_suffix_checks_array() {
        let out = transpile("let xs: int[] = [1];", strict()).unwrap();
        assert!(out.contains("\"array\""));
        assert!(out.contains("expected int[]"));
    }

    #[test]
    fn no_implicit_any_rejects_bare_bindings() {
        let options = TranspileOptions::default().with_no_implicit_any(true);
        let error = transpile("let x = 1;", options).unwrap_err();
        assert!(error.is_transpile());
        assert!(error.to_string().contains("'x'"));

        let error = transpile("fn f(a) { a }", options).unwrap_err();
        assert!(error.to_string().contains("parameter 'a'"));

        assert!(transpile("let x: int = 1;", options).is_ok());
    }

    #[test]
    fn unknown_type_is_rejected_with_line() {
        let error = transpile("let a: int = 1;\nlet b: Widget = 2;", TranspileOptions::default())
            .unwrap_err();
        assert!(error.to_string().starts_with("type error on line 2"));
        assert!(error.to_string().contains("Widget"));
    }

    #[test]
    fn unterminated_string_is_rejected() {
        assert!(transpile("let s = \"open", TranspileOptions::default()).is_err());
    }

    #[test]
    fn nested_block_comments_are_skipped() {
        assert_eq!(lower("/* a /* b */ c */ let x: int = 1;"), "/* a /* b */ c */ let x = 1;");
    }
}

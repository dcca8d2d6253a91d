//! Parser for field type annotations.
//!
//! Annotations are the textual type syntax used in declaration files:
//!
//! ```text
//! int | float | bool | str | string
//! Optional[T] | List[T] | Tuple[T1, T2, ...] | Enum[lit1, lit2, ...]
//! Identifier            (a named enum or a schema)
//! ```
//!
//! Parsing yields a syntactic [`TypeExpr`]; mapping identifiers onto enums
//! and schemas happens during extraction, where the registry is known.

use thiserror::Error;

/// Syntax tree of one annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// A bare identifier (`int`, `Activation`, `ChildConfig`).
    Name(String),
    /// A generic application (`List[...]`, `Tuple[...]`, `Optional[...]`).
    Generic {
        /// Constructor name before the brackets.
        head: String,
        /// Bracketed arguments in order.
        args: Vec<TypeExpr>,
    },
    /// An inline enum with its literals.
    Enum(Vec<String>),
}

/// Annotation syntax error with the byte offset where parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct AnnotationError {
    /// Byte offset into the annotation text.
    pub offset: usize,
    /// What the parser expected or rejected.
    pub message: String,
}

/// Parses an annotation string into a [`TypeExpr`].
///
/// # Examples
///
/// ```
/// use confgraph_core::{TypeExpr, parse_annotation};
///
/// let expr = parse_annotation("Optional[List[float]]").unwrap();
/// assert_eq!(
///     expr,
///     TypeExpr::Generic {
///         head: "Optional".into(),
///         args: vec![TypeExpr::Generic {
///             head: "List".into(),
///             args: vec![TypeExpr::Name("float".into())],
///         }],
///     }
/// );
///
/// assert!(parse_annotation("List[int").is_err());
/// ```
pub fn parse_annotation(src: &str) -> Result<TypeExpr, AnnotationError> {
    let mut parser = Parser { src, pos: 0 };
    let expr = parser.parse_type()?;
    parser.skip_ws();
    if parser.pos != src.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> AnnotationError {
        AnnotationError {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), AnnotationError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn ident(&mut self) -> Result<String, AnnotationError> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected a type name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_type(&mut self) -> Result<TypeExpr, AnnotationError> {
        let head = self.ident()?;
        if !self.eat('[') {
            return Ok(TypeExpr::Name(head));
        }
        if head == "Enum" {
            let literals = self.parse_literals()?;
            return Ok(TypeExpr::Enum(literals));
        }

        let mut args = vec![self.parse_type()?];
        while self.eat(',') {
            args.push(self.parse_type()?);
        }
        self.expect(']')?;
        Ok(TypeExpr::Generic { head, args })
    }

    /// Reads comma-separated literals up to the closing bracket. Literals may
    /// be bare or quoted with `'` / `"`.
    fn parse_literals(&mut self) -> Result<Vec<String>, AnnotationError> {
        let mut literals = Vec::new();
        loop {
            self.skip_ws();
            let literal = match self.peek() {
                Some(quote @ ('"' | '\'')) => {
                    self.pos += 1;
                    let start = self.pos;
                    let len = self.src[start..]
                        .find(quote)
                        .ok_or_else(|| self.error("unterminated quoted literal"))?;
                    self.pos = start + len + 1;
                    self.src[start..start + len].to_string()
                }
                _ => {
                    let start = self.pos;
                    let len = self.src[start..]
                        .find([',', ']'])
                        .ok_or_else(|| self.error("expected ']'"))?;
                    self.pos = start + len;
                    self.src[start..start + len].trim().to_string()
                }
            };
            if literal.is_empty() {
                return Err(self.error("empty enum literal"));
            }
            literals.push(literal);

            if self.eat(',') {
                continue;
            }
            self.expect(']')?;
            return Ok(literals);
        }
    }
}

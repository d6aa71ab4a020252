//! ER diagram parser
//!
//! Small nom grammar over `LocatedSpan` input so every token carries its
//! line and column. Productions:
//!
//! ```text
//! diagram      := front-matter? "erDiagram"? statement*
//! statement    := "direction" word
//!               | entity-name cardinality entity-name (":" label)?
//!               | entity-name "{" attribute* "}"
//!               | entity-name                        (alone on its line)
//! label        := quoted | word+                     (to end of line or `%%`)
//! attribute    := type name key* quoted?
//! key          := "PK" | "FK" | "UK" | "NOT" "NULL"       (comma or space separated)
//! cardinality  := ("|o" | "||" | "}o" | "}|") ("--" | "..") ("o|" | "||" | "o{" | "|{")
//! ```
//!
//! Whitespace (including newlines) and `%%` comments separate tokens, so a
//! whole diagram may sit on one line. Only malformed entity or relationship
//! syntax is fatal; everything else is reported as a warning diagnostic and
//! parsing continues.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{alpha1, alphanumeric1, char, not_line_ending, satisfy},
    combinator::{map, not, opt, recognize, value},
    error::ErrorKind,
    multi::{many0, many1},
    sequence::{delimited, pair, tuple},
    IResult,
};
use nom_locate::LocatedSpan;
use tracing::debug;

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, SourceSpan};
use crate::error::ParseError;

pub type Input<'a> = LocatedSpan<&'a str>;
type PResult<'a, T> = IResult<Input<'a>, T>;

const DEFAULT_LABEL: &str = "relates to";

// ============================================================================
// Public API
// ============================================================================

/// Result of a successful parse: the graph plus recoverable diagnostics
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub graph: ErdGraph,
    pub diagnostics: Diagnostics,
}

impl ParseOutput {
    /// Restartable cursor over the parse warnings
    pub fn warnings(&self) -> crate::diagnostics::DiagnosticIter<'_> {
        self.diagnostics.warnings()
    }
}

/// Parse diagram text into an entity/relationship graph
pub fn parse_erd(source: &str) -> Result<ParseOutput, ParseError> {
    let mut builder = GraphBuilder::default();
    let mut input = Input::new(source);

    input = skip_trivia(input);
    input = skip_front_matter(input);
    input = skip_trivia(input);

    match header(input) {
        Ok((rest, _)) => input = rest,
        Err(_) => builder.diagnostics.push(
            Diagnostic::warning(
                DiagnosticCode::MissingHeader,
                "diagram does not start with 'erDiagram'",
            )
            .with_span(span_between(input, input)),
        ),
    }

    let mut last_statement_line: Option<u32> = None;
    loop {
        input = skip_trivia(input);
        if input.fragment().is_empty() {
            break;
        }
        if let Ok((rest, _)) = direction(input) {
            input = rest;
            continue;
        }
        let shares_line = last_statement_line == Some(input.location_line());
        input = statement(input, &mut builder, shares_line)?;
        last_statement_line = Some(input.location_line());
    }

    let output = builder.finish();
    debug!(
        entities = output.graph.entities.len(),
        relationships = output.graph.relationships.len(),
        warnings = output.diagnostics.len(),
        "parsed ER diagram"
    );
    Ok(output)
}

// ============================================================================
// Graph Assembly
// ============================================================================

#[derive(Default)]
struct GraphBuilder {
    entities: Vec<EntityDef>,
    /// Parallel to `entities`: declared with a `{ ... }` body
    has_body: Vec<bool>,
    relationships: Vec<RelationshipDef>,
    /// Every entity name written in a relationship line, where it was written
    mentions: Vec<(String, SourceSpan)>,
    diagnostics: Diagnostics,
}

impl GraphBuilder {
    fn position(&self, name: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.name == name)
    }

    fn declare(&mut self, name: String, line: u32) {
        if self.position(&name).is_none() {
            let mut entity = EntityDef::new(name);
            entity.line = line;
            self.entities.push(entity);
            self.has_body.push(false);
        }
    }

    fn define(&mut self, entity: EntityDef, span: SourceSpan) {
        match self.position(&entity.name) {
            Some(idx) => {
                if self.has_body[idx] {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticCode::DuplicateEntity,
                            format!(
                                "entity '{}' is defined again; the later definition replaces the one on line {}",
                                entity.name, self.entities[idx].line
                            ),
                        )
                        .with_span(span)
                        .about(entity.name.clone()),
                    );
                }
                self.entities[idx] = entity;
                self.has_body[idx] = true;
            }
            None => {
                self.entities.push(entity);
                self.has_body.push(true);
            }
        }
    }

    fn relate(&mut self, relationship: RelationshipDef) {
        self.relationships.push(relationship);
    }

    fn mention(&mut self, name: &str, span: SourceSpan) {
        self.mentions.push((name.to_string(), span));
    }

    fn finish(mut self) -> ParseOutput {
        let mut implicit: Vec<(String, SourceSpan)> = Vec::new();
        for (name, span) in &self.mentions {
            if self.position(name).is_none() && !implicit.iter().any(|(n, _)| n == name) {
                implicit.push((name.clone(), *span));
            }
        }
        for (name, span) in implicit {
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::ImplicitEntity,
                    format!(
                        "entity '{}' appears only in relationships and is declared without fields",
                        name
                    ),
                )
                .with_span(span)
                .about(name.clone()),
            );
            let mut entity = EntityDef::new(name);
            entity.implicit = true;
            entity.line = span.start_line;
            self.entities.push(entity);
        }

        let mut graph = ErdGraph {
            entities: self.entities,
            relationships: self.relationships,
            choice_sets: Vec::new(),
        };
        graph.mark_junction_candidates();

        ParseOutput {
            graph,
            diagnostics: self.diagnostics,
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// `shares_line`: another statement already ended on this line
fn statement<'a>(
    input: Input<'a>,
    builder: &mut GraphBuilder,
    shares_line: bool,
) -> Result<Input<'a>, ParseError> {
    let line = input.location_line();
    let (rest, name) = entity_name(input)
        .map_err(|e| error_from(e, input, "expected an entity name or relationship"))?;
    let name_span = span_between(input, rest);
    let (after_ws, _) = inline_ws(rest).map_err(|e| error_from(e, rest, "unexpected input"))?;

    if let Ok((rest, token)) = cardinality(after_ws) {
        builder.mention(&name, name_span);
        return relationship_tail(rest, input, name, token, builder);
    }

    if after_ws.fragment().starts_with('{') {
        let (rest, _) = char::<_, nom::error::Error<Input>>('{')(after_ws)
            .map_err(|e| error_from(e, after_ws, "expected '{'"))?;
        return entity_body(rest, name, line, input, builder);
    }

    if at_line_end(after_ws) {
        if shares_line {
            return Err(error_at(
                input,
                format!(
                    "'{}' follows another statement on the same line; declare entities on their own line",
                    name
                ),
            ));
        }
        builder.declare(name, line);
        return Ok(after_ws);
    }

    Err(error_at(
        after_ws,
        format!("expected '{{' or a cardinality token after entity '{}'", name),
    ))
}

fn relationship_tail<'a>(
    input: Input<'a>,
    start: Input<'a>,
    left: String,
    token: CardinalityToken,
    builder: &mut GraphBuilder,
) -> Result<Input<'a>, ParseError> {
    let line = start.location_line();
    let (input, _) = inline_ws(input).map_err(|e| error_from(e, input, "unexpected input"))?;
    let right_start = input;
    let (input, right) = entity_name(input)
        .map_err(|e| error_from(e, input, "relationship is missing its target entity"))?;
    builder.mention(&right, span_between(right_start, input));
    let (input, _) = inline_ws(input).map_err(|e| error_from(e, input, "unexpected input"))?;

    let (input, label) = match char::<_, nom::error::Error<Input>>(':')(input) {
        Ok((rest, _)) => {
            let (rest, _) = inline_ws(rest).map_err(|e| error_from(e, rest, "unexpected input"))?;
            let (rest, label) = relationship_label(rest)
                .map_err(|e| error_from(e, rest, "relationship label is malformed"))?;
            (rest, label)
        }
        Err(_) => (input, None),
    };

    if !at_boundary(input) {
        return Err(error_at(input, "unexpected token after relationship"));
    }

    let label = match label {
        Some(label) if !label.is_empty() => label,
        _ => {
            builder.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::MissingLabel,
                    format!(
                        "relationship between '{}' and '{}' has no label",
                        left, right
                    ),
                )
                .with_span(span_between(start, input)),
            );
            DEFAULT_LABEL.to_string()
        }
    };

    let cardinality = token.classify();
    // The "one" side becomes the source of a one-to-many link
    let (source, target) = if cardinality == Cardinality::OneToMany
        && token.left_many
        && !token.right_many
    {
        (right, left)
    } else {
        (left, right)
    };

    builder.relate(RelationshipDef {
        source,
        target,
        cardinality,
        label,
        ownership: Ownership::Referential,
        identifying: token.identifying,
        line,
    });
    Ok(input)
}

fn entity_body<'a>(
    mut input: Input<'a>,
    name: String,
    line: u32,
    block_start: Input<'a>,
    builder: &mut GraphBuilder,
) -> Result<Input<'a>, ParseError> {
    let mut entity = EntityDef::new(name);
    entity.line = line;

    loop {
        input = skip_trivia(input);
        if input.fragment().is_empty() {
            return Err(error_at(
                block_start,
                format!("entity block '{}' is never closed", entity.name),
            ));
        }
        if input.fragment().starts_with('}') {
            let (rest, _) = char::<_, nom::error::Error<Input>>('}')(input)
                .map_err(|e| error_from(e, input, "expected '}'"))?;
            builder.define(entity, span_between(block_start, rest));
            return Ok(rest);
        }

        let (rest, field) =
            attribute(input).map_err(|_| error_at(input, "malformed attribute declaration"))?;
        let field_span = span_between(input, rest);

        if let Some(existing) = entity.fields.iter_mut().find(|f| f.name == field.name) {
            builder.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::DuplicateField,
                    format!(
                        "field '{}' is declared twice in '{}'; the later declaration wins",
                        field.name, entity.name
                    ),
                )
                .with_span(field_span)
                .about(entity.name.clone()),
            );
            *existing = field;
        } else {
            entity.fields.push(field);
        }
        input = rest;
    }
}

// ============================================================================
// Header and Directives
// ============================================================================

fn header(input: Input) -> PResult<()> {
    let (rest, _) = tag("erDiagram")(input)?;
    if !at_boundary(rest) {
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Tag)));
    }
    Ok((rest, ()))
}

fn direction(input: Input) -> PResult<()> {
    let (rest, _) = tag("direction")(input)?;
    let (rest, _) = inline_ws1(rest)?;
    let (rest, _) = alpha1(rest)?;
    if !at_boundary(rest) {
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Tag)));
    }
    Ok((rest, ()))
}

/// YAML front matter between `---` fences carries only rendering options
fn skip_front_matter(input: Input) -> Input {
    if !input.fragment().starts_with("---") {
        return input;
    }
    let mut rest = input;
    let mut first = true;
    loop {
        let result: PResult<Input> = not_line_ending(rest);
        let Ok((after_line, line)) = result else {
            return input;
        };
        let trimmed = line.fragment().trim();
        let next = skip_trivia_lines(after_line);
        if !first && trimmed == "---" {
            return next;
        }
        if next.fragment().is_empty() {
            return input;
        }
        first = false;
        rest = next;
    }
}

fn skip_trivia_lines(input: Input) -> Input {
    let result: PResult<Input> = take_while(|c: char| c == '\n' || c == '\r')(input);
    result.map(|(rest, _)| rest).unwrap_or(input)
}

// ============================================================================
// Attributes
// ============================================================================

fn attribute(input: Input) -> PResult<FieldDef> {
    let line = input.location_line();
    let (input, raw_type) = type_token(input)?;
    let (input, _) = inline_ws1(input)?;
    let (input, name) = field_name(input)?;

    let mut constraints: Vec<Constraint> = Vec::new();
    let mut rest = input;
    loop {
        let (after_sep, _) = key_separator(rest)?;
        match key_token(after_sep) {
            Ok((after_key, constraint)) => {
                if !constraints.contains(&constraint) {
                    constraints.push(constraint);
                }
                rest = after_key;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }

    let (input, _) = inline_ws(rest)?;
    let (input, description) = opt(quoted)(input)?;
    let input = if description.is_some() {
        input
    } else {
        rest
    };

    if !at_boundary(input) && !input.fragment().starts_with('}') {
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Verify)));
    }

    let raw_type = raw_type.fragment().to_string();
    Ok((
        input,
        FieldDef {
            name: name.fragment().to_string(),
            field_type: FieldType::from_raw(&raw_type),
            raw_type,
            constraints,
            description,
            line,
        },
    ))
}

fn type_token(input: Input) -> PResult<Input> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '(' | ')' | '[' | ']' | ',')
        }),
    ))(input)
}

fn field_name(input: Input) -> PResult<Input> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_"), tag("-")))),
    ))(input)
}

fn key_separator(input: Input) -> PResult<Input> {
    take_while(|c: char| c == ' ' || c == '\t' || c == ',')(input)
}

fn key_token(input: Input) -> PResult<Constraint> {
    let (rest, constraint) = alt((
        value(Constraint::PrimaryKey, tag_no_case("PK")),
        value(Constraint::ForeignKey, tag_no_case("FK")),
        value(Constraint::Unique, tag_no_case("UK")),
        value(
            Constraint::NotNull,
            tuple((tag_no_case("NOT"), inline_ws1, tag_no_case("NULL"))),
        ),
    ))(input)?;
    if rest
        .fragment()
        .starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Verify)));
    }
    Ok((rest, constraint))
}

// ============================================================================
// Relationships
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CardinalityToken {
    left_many: bool,
    right_many: bool,
    identifying: bool,
}

impl CardinalityToken {
    fn classify(&self) -> Cardinality {
        if self.left_many && self.right_many {
            Cardinality::ManyToMany
        } else {
            Cardinality::OneToMany
        }
    }
}

fn cardinality(input: Input) -> PResult<CardinalityToken> {
    let (input, left) = alt((tag("|o"), tag("||"), tag("}o"), tag("}|")))(input)?;
    let (input, line) = alt((tag("--"), tag("..")))(input)?;
    let (input, right) = alt((tag("o|"), tag("||"), tag("o{"), tag("|{")))(input)?;
    Ok((
        input,
        CardinalityToken {
            left_many: left.fragment().starts_with('}'),
            right_many: right.fragment().ends_with('{'),
            identifying: *line.fragment() == "--",
        },
    ))
}

fn relationship_label(input: Input) -> PResult<Option<String>> {
    alt((
        map(quoted, Some),
        map(bare_label, Some),
        value(None, take_while(|c: char| c == ' ' || c == '\t')),
    ))(input)
}

/// Unquoted label: every word up to the end of the line or a `%%` comment.
/// A word that opens another statement ends it, so one-line diagrams split.
fn bare_label<'a>(input: Input<'a>) -> PResult<'a, String> {
    let mut words: Vec<&'a str> = Vec::new();
    let mut rest = input;
    loop {
        let (after_ws, _) = inline_ws(rest)?;
        if at_line_end(after_ws) || starts_statement(after_ws) {
            break;
        }
        let (after_word, word) = label_word(after_ws)?;
        words.push(*word.fragment());
        rest = after_word;
    }
    if words.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::TakeWhile1,
        )));
    }
    Ok((rest, words.join(" ")))
}

fn label_word(input: Input) -> PResult<Input> {
    recognize(many1(alt((
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, '%' | '{' | '}')),
        recognize(pair(char('%'), not(char('%')))),
    ))))(input)
}

/// `Name {` or `Name <cardinality>`
fn starts_statement(input: Input) -> bool {
    let Ok((rest, _)) = entity_name(input) else {
        return false;
    };
    let Ok((rest, _)) = inline_ws(rest) else {
        return false;
    };
    rest.fragment().starts_with('{') || cardinality(rest).is_ok()
}

// ============================================================================
// Tokens
// ============================================================================

fn entity_name(input: Input) -> PResult<String> {
    alt((
        quoted,
        map(
            recognize(pair(
                alt((alpha1, tag("_"))),
                many0(alt((alphanumeric1, tag("_"), tag("-")))),
            )),
            |s: Input| s.fragment().to_string(),
        ),
    ))(input)
}

fn quoted(input: Input) -> PResult<String> {
    map(
        delimited(
            char('"'),
            take_while(|c: char| c != '"' && c != '\n'),
            char('"'),
        ),
        |s: Input| s.fragment().to_string(),
    )(input)
}

fn inline_ws(input: Input) -> PResult<Input> {
    take_while(|c: char| c == ' ' || c == '\t')(input)
}

fn inline_ws1(input: Input) -> PResult<Input> {
    take_while1(|c: char| c == ' ' || c == '\t')(input)
}

fn comment(input: Input) -> PResult<()> {
    value((), pair(tag("%%"), not_line_ending))(input)
}

fn trivia(input: Input) -> PResult<()> {
    value(
        (),
        many0(alt((
            value((), take_while1(|c: char| c.is_whitespace())),
            comment,
        ))),
    )(input)
}

fn skip_trivia(input: Input) -> Input {
    trivia(input).map(|(rest, _)| rest).unwrap_or(input)
}

/// Only a line break, comment, closing brace, or end of input may follow
fn at_line_end(input: Input) -> bool {
    let frag = input.fragment();
    frag.is_empty()
        || frag.starts_with('\n')
        || frag.starts_with('\r')
        || frag.starts_with("%%")
        || frag.starts_with('}')
}

/// A statement may end at whitespace, a comment, a closing brace, or end of input
fn at_boundary(input: Input) -> bool {
    let frag = input.fragment();
    frag.is_empty()
        || frag.starts_with(char::is_whitespace)
        || frag.starts_with("%%")
        || frag.starts_with('}')
}

fn span_between(start: Input, end: Input) -> SourceSpan {
    SourceSpan::new(
        start.location_line(),
        start.get_utf8_column() as u32,
        end.location_line(),
        end.get_utf8_column() as u32,
    )
}

// ============================================================================
// Error Conversion
// ============================================================================

fn error_from<'a>(
    err: nom::Err<nom::error::Error<Input<'a>>>,
    fallback: Input<'a>,
    message: impl Into<String>,
) -> ParseError {
    let at = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => fallback,
    };
    error_at(at, message)
}

fn error_at(at: Input, message: impl Into<String>) -> ParseError {
    let token: String = at
        .fragment()
        .split_whitespace()
        .next()
        .map(|t| t.chars().take(24).collect())
        .unwrap_or_else(|| "<end of input>".to_string());
    ParseError {
        line: at.location_line(),
        column: at.get_utf8_column() as u32,
        token,
        message: message.into(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entity_block_with_keys_and_comment() {
        let src = r#"
erDiagram
    CUSTOMER {
        string id PK
        string email UK, NOT NULL "Primary contact"
        varchar(80) name
    }
"#;
        let out = parse_erd(src).unwrap();
        assert_eq!(out.graph.entities.len(), 1);
        let customer = &out.graph.entities[0];
        assert_eq!(customer.name, "CUSTOMER");
        assert_eq!(customer.fields.len(), 3);
        assert!(customer.fields[0].is_primary_key());
        assert_eq!(
            customer.fields[1].constraints,
            vec![Constraint::Unique, Constraint::NotNull]
        );
        assert_eq!(
            customer.fields[1].description.as_deref(),
            Some("Primary contact")
        );
        assert_eq!(
            customer.fields[2].field_type,
            FieldType::String {
                max_length: Some(80)
            }
        );
        assert_eq!(customer.fields[2].line, 6);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_single_line_diagram() {
        let src = "erDiagram Customer{string id PK} Order{string id PK} Customer ||--o{ Order : places";
        let out = parse_erd(src).unwrap();
        assert_eq!(out.graph.entities.len(), 2);
        assert_eq!(out.graph.relationships.len(), 1);
        let rel = &out.graph.relationships[0];
        assert_eq!(rel.source, "Customer");
        assert_eq!(rel.target, "Order");
        assert_eq!(rel.cardinality, Cardinality::OneToMany);
        assert_eq!(rel.label, "places");
        assert_eq!(rel.ownership, Ownership::Referential);
    }

    #[test]
    fn test_cardinality_classes() {
        let src = r#"erDiagram
    A }o--o{ B : tags
    C }|..|| D : "belongs to"
    E ||--|| F : owns
"#;
        let out = parse_erd(src).unwrap();
        let rels = &out.graph.relationships;
        assert_eq!(rels[0].cardinality, Cardinality::ManyToMany);
        // many-to-one is flipped so the "one" side is the source
        assert_eq!(rels[1].cardinality, Cardinality::OneToMany);
        assert_eq!((rels[1].source.as_str(), rels[1].target.as_str()), ("D", "C"));
        assert!(!rels[1].identifying);
        assert_eq!(rels[1].label, "belongs to");
        assert_eq!(rels[2].cardinality, Cardinality::OneToMany);
        assert_eq!((rels[2].source.as_str(), rels[2].target.as_str()), ("E", "F"));
    }

    #[test]
    fn test_duplicate_entity_last_wins_with_warning() {
        let src = r#"erDiagram
    Product { string sku PK }
    Product { string code PK
              int stock }
"#;
        let out = parse_erd(src).unwrap();
        assert_eq!(out.graph.entities.len(), 1);
        assert_eq!(out.graph.entities[0].fields.len(), 2);
        assert_eq!(out.graph.entities[0].fields[0].name, "code");
        assert_eq!(out.diagnostics.count_code(DiagnosticCode::DuplicateEntity), 1);
    }

    #[test]
    fn test_implicit_entities_and_missing_label_warn() {
        let src = "erDiagram\n  Author ||--o{ Book\n";
        let out = parse_erd(src).unwrap();
        assert_eq!(out.graph.entities.len(), 2);
        assert!(out.graph.entities.iter().all(|e| e.implicit));
        assert_eq!(out.diagnostics.count_code(DiagnosticCode::ImplicitEntity), 2);
        assert_eq!(out.diagnostics.count_code(DiagnosticCode::MissingLabel), 1);
        assert_eq!(out.graph.relationships[0].label, "relates to");
    }

    #[test]
    fn test_declared_later_is_not_implicit() {
        let src = "erDiagram\n A ||--o{ B : has\n A { string id PK }\n B\n";
        let out = parse_erd(src).unwrap();
        assert_eq!(out.diagnostics.count_code(DiagnosticCode::ImplicitEntity), 0);
        assert_eq!(out.graph.entities.len(), 2);
    }

    #[test]
    fn test_comments_direction_and_unknown_types() {
        let src = r#"
%% sales model
erDiagram
    direction LR
    Invoice { %% header
        OrderStatus status
        geography location
    }
"#;
        let out = parse_erd(src).unwrap();
        let invoice = out.graph.entity("Invoice").unwrap();
        assert_eq!(
            invoice.fields[0].field_type,
            FieldType::Other("OrderStatus".into())
        );
        assert_eq!(invoice.fields[1].raw_type, "geography");
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_missing_header_is_a_warning() {
        let out = parse_erd("Customer { string id PK }").unwrap();
        assert_eq!(out.diagnostics.count_code(DiagnosticCode::MissingHeader), 1);
        assert_eq!(out.graph.entities.len(), 1);
    }

    #[test]
    fn test_quoted_entity_names() {
        let src = r#"erDiagram
    "Sales Order" { string number PK }
    "Sales Order" ||--|{ "Order Line" : contains
"#;
        let out = parse_erd(src).unwrap();
        assert!(out.graph.entity("Sales Order").is_some());
        assert!(out.graph.entity("Order Line").is_some());
    }

    #[test]
    fn test_malformed_attribute_is_fatal_with_location() {
        let src = "erDiagram\n  Customer {\n    string\n  }\n";
        let err = parse_erd(src).unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.token, "string");
    }

    #[test]
    fn test_malformed_relationship_is_fatal() {
        let err = parse_erd("erDiagram\n  Customer ||--o{ : places\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("target"));
    }

    #[test]
    fn test_unclosed_block_is_fatal() {
        let err = parse_erd("erDiagram\n  Customer {\n    string id PK\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("never closed"));
    }

    #[test]
    fn test_front_matter_is_skipped() {
        let src = "---\ntitle: Shop\n---\nerDiagram\n  Shop { string id PK }\n";
        let out = parse_erd(src).unwrap();
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.graph.entities.len(), 1);
    }

    #[test]
    fn test_junction_candidate_flag() {
        let src = r#"erDiagram
    Student { string id PK }
    Course { string id PK }
    Enrollment {
        string student_id PK, FK
        string course_id PK, FK
    }
"#;
        let out = parse_erd(src).unwrap();
        assert!(out.graph.entity("Enrollment").unwrap().is_junction_candidate);
    }

    #[test]
    fn test_bare_label_runs_to_end_of_line() {
        let src = "erDiagram\n  Customer ||--o{ Order : places many %% bulk orders\n";
        let out = parse_erd(src).unwrap();
        let names: Vec<&str> = out.graph.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Customer", "Order"]);
        assert_eq!(out.graph.relationships[0].label, "places many");
    }

    #[test]
    fn test_bare_label_stops_at_next_statement_on_one_line() {
        let src = "erDiagram Customer ||--o{ Order : places Order { string id PK }";
        let out = parse_erd(src).unwrap();
        assert_eq!(out.graph.relationships[0].label, "places");
        assert_eq!(out.graph.entity("Order").unwrap().fields.len(), 1);
    }

    #[test]
    fn test_bare_name_after_a_statement_is_fatal() {
        for src in [
            "erDiagram\n  Customer ||--o{ Order stray\n",
            "erDiagram\n  Customer ||--o{ Order : \"places\" stray\n",
            "erDiagram\n  Customer { string id PK } stray\n",
        ] {
            let err = parse_erd(src).unwrap_err();
            assert_eq!(err.line, 2, "{}", src);
            assert_eq!(err.token, "stray", "{}", src);
        }
    }

    #[test]
    fn test_warnings_carry_columns() {
        let src = "erDiagram\n  A { string id PK }\n  A ||--o{ Ghost\n";
        let out = parse_erd(src).unwrap();

        let implicit = out
            .warnings()
            .find(|d| d.code == DiagnosticCode::ImplicitEntity)
            .unwrap();
        assert_eq!(implicit.span, Some(SourceSpan::new(3, 12, 3, 17)));

        let missing_label = out
            .warnings()
            .find(|d| d.code == DiagnosticCode::MissingLabel)
            .unwrap();
        assert_eq!(missing_label.span.map(|s| (s.start_line, s.start_col)), Some((3, 3)));
    }

    #[test]
    fn test_duplicate_field_points_at_the_later_declaration() {
        let src = "erDiagram\n  A {\n    string id PK\n      int id\n  }\n";
        let out = parse_erd(src).unwrap();
        let duplicate = out.warnings().next().unwrap();
        assert_eq!(duplicate.code, DiagnosticCode::DuplicateField);
        assert_eq!(duplicate.span.map(|s| (s.start_line, s.start_col)), Some((4, 7)));
    }
}

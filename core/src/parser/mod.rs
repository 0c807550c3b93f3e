//! Parser - recursive descent over the lexer's token stream
//!
//! Produces the AST in `executor::types::ast` with span information for
//! error reporting. Parsing never stops at the first problem: syntax errors
//! are recorded and the parser resynchronizes at the next statement
//! boundary, so one pass reports every error in a file.

use super::executor::types::ast::{
    ActionStmt, Article, BinaryOp, Expr, FeatureSet, Literal, MatchCase, ObjectDescriptor,
    Pattern, Preposition, Program, ResultDescriptor, SourceKind, Span, Stmt, UnaryOp, VarRef,
};

pub mod lexer;
pub mod printer;
pub mod semantic_validator;

#[cfg(test)]
mod tests;

use lexer::{Keyword, Token, TokenKind};

pub use printer::render_program;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    Lexical { message: String, span: Span },
    Syntax { message: String, span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Lexical { span, .. } => *span,
            ParseError::Syntax { span, .. } => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Lexical { message, .. } => message,
            ParseError::Syntax { message, .. } => message,
        }
    }

    fn syntax(message: impl Into<String>, span: Span) -> Self {
        ParseError::Syntax {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ParseError::Lexical { .. } => "lexical error",
            ParseError::Syntax { .. } => "syntax error",
        };
        let span = self.span();
        write!(
            f,
            "{} at line {}, col {}: {}",
            kind,
            span.start_line + 1,
            span.start_col + 1,
            self.message()
        )
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Entry Points ===================== */

/// Result of parsing one source file: a best-effort program plus every
/// lexical and syntax diagnostic encountered
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub program: Program,
    pub diagnostics: Vec<ParseError>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Parse a source file, recovering from errors
pub fn parse_program(source: &str) -> ParseOutput {
    let (tokens, mut diagnostics) = lexer::tokenize(source);
    let mut parser = Parser::new(source, tokens);
    let program = parser.program();
    diagnostics.extend(parser.diagnostics);
    diagnostics.sort_by_key(|d| d.span().start);
    ParseOutput {
        program,
        diagnostics,
    }
}

/// Parse a source file, failing on the first diagnostic
pub fn parse(source: &str) -> ParseResult<Program> {
    let output = parse_program(source);
    match output.diagnostics.into_iter().next() {
        Some(err) => Err(err),
        None => Ok(output.program),
    }
}

/// Parse a standalone expression (used by tooling and tests)
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let (tokens, diagnostics) = lexer::tokenize(source);
    if let Some(err) = diagnostics.into_iter().next() {
        return Err(err);
    }
    let mut parser = Parser::new(source, tokens);
    let expr = parser.expression()?;
    if !parser.at_eof() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}

/* ===================== Parser ===================== */

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<ParseError>,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn nth(&self, ahead: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + ahead).min(last)]
    }

    fn peek(&self) -> &Token {
        self.nth(0)
    }

    fn kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.kind() == kind {
            Some(self.advance())
        } else {
            None
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> Option<Token> {
        self.eat(&TokenKind::Keyword(keyword))
    }

    fn eat_preposition(&mut self, prep: Preposition) -> Option<Token> {
        self.eat(&TokenKind::Preposition(prep))
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token> {
        match self.eat(&kind) {
            Some(token) => Ok(token),
            None => Err(self.unexpected(expected)),
        }
    }

    fn article(&mut self) -> Option<Article> {
        match self.kind() {
            TokenKind::Article(article) => {
                let article = *article;
                self.advance();
                Some(article)
            }
            _ => None,
        }
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.source
            .get(start..end)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::syntax(
            format!("Expected {}, found {}", expected, describe(&token.kind)),
            token.span,
        )
    }

    /// Record a diagnostic unless it sits on a token the lexer already reported
    fn report(&mut self, err: ParseError) {
        let start = err.span().start;
        let already_reported = self
            .tokens
            .iter()
            .any(|t| t.kind == TokenKind::Error && t.span.start == start);
        if !already_reported {
            self.diagnostics.push(err);
        }
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    /// Consume the terminating `.`. A missing period right before a `}` or
    /// before a statement on a later line is reported and the statement kept.
    fn end_statement(&mut self) -> ParseResult<Span> {
        if let Some(dot) = self.eat(&TokenKind::Dot) {
            return Ok(dot.span);
        }
        let previous = self.previous().span;
        let next = self.peek();
        let on_new_line = next.span.start_line > previous.end_line;
        let starts_statement = matches!(
            next.kind,
            TokenKind::Lt
                | TokenKind::Keyword(Keyword::If | Keyword::When | Keyword::Match | Keyword::Parallel)
                | TokenKind::Preposition(Preposition::For)
        );
        if next.kind == TokenKind::RBrace || (on_new_line && starts_statement) {
            let err = ParseError::syntax("Expected '.' to end the statement", previous);
            self.report(err);
            return Ok(previous);
        }
        Err(self.unexpected("'.' to end the statement"))
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Skip to the end of the broken statement: past the next `.`, to the
    /// next `}` that closes the enclosing block, or to a `<` opening a new
    /// line. Balanced blocks are skipped whole.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        let mut advanced = false;
        loop {
            let line_start = advanced
                && self.peek().span.start_line > self.previous().span.end_line;
            match self.kind() {
                TokenKind::Eof => return,
                TokenKind::Lt if depth == 0 && line_start => return,
                TokenKind::Dot if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        self.eat(&TokenKind::Dot);
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
            advanced = true;
        }
    }

    /// Skip to the next `(` at brace depth zero
    fn skip_to_next_header(&mut self) {
        self.advance();
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::Eof => return,
                TokenKind::LParen if depth == 0 => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    // ========================================================================
    // Program structure
    // ========================================================================

    fn program(&mut self) -> Program {
        let mut feature_sets = Vec::new();
        while !self.at_eof() {
            if self.kind() == &TokenKind::LParen {
                match self.feature_set() {
                    Ok(fs) => feature_sets.push(fs),
                    Err(err) => {
                        self.report(err);
                        self.skip_to_next_header();
                    }
                }
            } else {
                let err = self.unexpected("a feature set header '(Name: Activity)'");
                self.report(err);
                self.skip_to_next_header();
            }
        }
        Program { feature_sets }
    }

    fn feature_set(&mut self) -> ParseResult<FeatureSet> {
        let open = self.expect(TokenKind::LParen, "'('")?;
        let mut colon: Option<Span> = None;
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => break,
                TokenKind::RParen => depth -= 1,
                TokenKind::Colon if depth == 0 && colon.is_none() => colon = Some(self.peek().span),
                TokenKind::LBrace | TokenKind::RBrace | TokenKind::Eof => {
                    return Err(ParseError::syntax(
                        "Unclosed feature set header, expected ')'",
                        open.span,
                    ));
                }
                _ => {}
            }
            self.advance();
        }
        let close = self.advance();

        let (name, activity) = match colon {
            Some(colon) => (
                self.slice(open.span.end, colon.start),
                self.slice(colon.end, close.span.start),
            ),
            None => {
                self.report(ParseError::syntax(
                    "Feature set header must be written as '(Name: Activity)'",
                    open.span.merge(&close.span),
                ));
                (self.slice(open.span.end, close.span.start), String::new())
            }
        };
        if name.is_empty() {
            self.report(ParseError::syntax(
                "Feature set name cannot be empty",
                open.span.merge(&close.span),
            ));
        }

        self.expect(TokenKind::LBrace, "'{' to open the feature set body")?;
        let body = self.statements();
        let end = match self.eat(&TokenKind::RBrace) {
            Some(token) => token.span,
            None => {
                self.report(ParseError::syntax(
                    format!("Unclosed body of feature set '{}', expected '}}'", name),
                    open.span,
                ));
                self.peek().span
            }
        };

        Ok(FeatureSet {
            name,
            activity,
            body,
            origin: None,
            span: open.span.merge(&end),
        })
    }

    /// Statements up to (not including) the closing `}` or end of input
    fn statements(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        loop {
            // A statement never starts with `(`: treat it as the next header
            if matches!(
                self.kind(),
                TokenKind::RBrace | TokenKind::Eof | TokenKind::LParen
            ) {
                break;
            }
            let before = self.pos;
            match self.statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
            if self.pos == before && !matches!(self.kind(), TokenKind::RBrace | TokenKind::Eof) {
                self.advance();
            }
        }
        stmts
    }

    fn block(&mut self) -> ParseResult<(Vec<Stmt>, Span)> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let body = self.statements();
        let close = self.expect(TokenKind::RBrace, "'}' to close the block")?;
        Ok((body, close.span))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statement(&mut self) -> ParseResult<Stmt> {
        match self.kind() {
            TokenKind::Lt => {
                let verb = self.nth(1).word(self.source).unwrap_or_default();
                if verb.eq_ignore_ascii_case("publish") {
                    self.publish_stmt()
                } else if verb.eq_ignore_ascii_case("accept") {
                    self.transition_stmt()
                } else {
                    self.action_stmt().map(Stmt::Action)
                }
            }
            TokenKind::Keyword(Keyword::If) => self.if_stmt(),
            TokenKind::Keyword(Keyword::When) => self.when_stmt(),
            TokenKind::Keyword(Keyword::Match) => self.match_stmt(),
            TokenKind::Keyword(Keyword::Parallel) | TokenKind::Preposition(Preposition::For) => {
                self.loop_stmt()
            }
            _ => Err(self.unexpected("a statement")),
        }
    }

    fn verb(&mut self) -> ParseResult<(String, Span)> {
        let open = self.expect(TokenKind::Lt, "'<' to start an action")?;
        let (verb, _) = self.compound("an action verb")?;
        self.expect(TokenKind::Gt, "'>' after the action verb")?;
        Ok((verb, open.span))
    }

    fn action_stmt(&mut self) -> ParseResult<ActionStmt> {
        let (verb, start) = self.verb()?;
        let article = self.article();
        let result = self.result_descriptor(article)?;

        let preposition = match self.kind() {
            TokenKind::Preposition(prep) => {
                let prep = *prep;
                self.advance();
                prep
            }
            _ => return Err(self.unexpected("a preposition")),
        };
        let mut object = self.object_descriptor(preposition)?;

        let mut when = None;
        loop {
            match self.kind() {
                TokenKind::Keyword(Keyword::Where) if object.condition.is_none() => {
                    self.advance();
                    object.condition = Some(self.expression()?);
                }
                TokenKind::Preposition(Preposition::With) if object.argument.is_none() => {
                    self.advance();
                    object.argument = Some(self.expression()?);
                }
                TokenKind::Keyword(Keyword::When) if when.is_none() => {
                    self.advance();
                    when = Some(self.expression()?);
                }
                _ => break,
            }
        }

        let end = self.end_statement()?;
        Ok(ActionStmt {
            verb,
            result,
            object,
            when,
            span: start.merge(&end),
        })
    }

    fn result_descriptor(&mut self, article: Option<Article>) -> ParseResult<ResultDescriptor> {
        let open = self.expect(TokenKind::Lt, "'<' to start the result")?;
        let (base, _) = self.compound("a result name")?;
        let qualifier = match self.eat(&TokenKind::Colon) {
            Some(_) => Some(self.qualifier_path()?.join(".")),
            None => None,
        };
        let close = self.expect(TokenKind::Gt, "'>' to close the result")?;
        Ok(ResultDescriptor {
            base,
            qualifier,
            article,
            span: open.span.merge(&close.span),
        })
    }

    fn object_descriptor(&mut self, preposition: Preposition) -> ParseResult<ObjectDescriptor> {
        let article = self.article();
        let expr = self.expression()?;
        let span = expr.span();
        let (kind, base, qualifier, value) = match expr {
            Expr::Var { name, path, .. } => {
                let qualifier = if path.is_empty() {
                    None
                } else {
                    Some(path.join("."))
                };
                (SourceKind::classify(&name), name, qualifier, None)
            }
            lit @ (Expr::Lit { .. } | Expr::List { .. } | Expr::Object { .. }) => {
                (SourceKind::Literal, String::new(), None, Some(lit))
            }
            other => (SourceKind::Expression, String::new(), None, Some(other)),
        };
        Ok(ObjectDescriptor {
            preposition,
            article,
            kind,
            base,
            qualifier,
            value,
            condition: None,
            argument: None,
            span,
        })
    }

    /// `<Publish> as <alias> <variable>.`
    fn publish_stmt(&mut self) -> ParseResult<Stmt> {
        let (_, start) = self.verb()?;
        if self.eat_preposition(Preposition::As).is_none() {
            return Err(self.unexpected("'as' after <Publish>"));
        }
        let (alias, _) = self.angle_name("the published alias")?;
        let (variable, _) = self.angle_name("the variable to publish")?;
        let end = self.end_statement()?;
        Ok(Stmt::Publish {
            alias,
            variable,
            span: start.merge(&end),
        })
    }

    /// `<Accept> the <transition: from_to_to> on <target: field>.`
    fn transition_stmt(&mut self) -> ParseResult<Stmt> {
        let (_, start) = self.verb()?;
        self.article();
        self.expect(TokenKind::Lt, "'<transition: from_to_to>'")?;
        let (base, base_span) = self.compound("'transition'")?;
        if base != "transition" {
            return Err(ParseError::syntax(
                format!("Expected 'transition', found '{}'", base),
                base_span,
            ));
        }
        self.expect(TokenKind::Colon, "':' after 'transition'")?;
        let (written, written_span) = self.compound("a transition such as 'draft_to_placed'")?;
        let (from, to) = match written.split_once("_to_") {
            Some((from, to)) if !from.is_empty() && !to.is_empty() => {
                (from.to_string(), to.to_string())
            }
            _ => {
                return Err(ParseError::syntax(
                    format!("Transition '{}' must be written as <from>_to_<to>", written),
                    written_span,
                ))
            }
        };
        self.expect(TokenKind::Gt, "'>'")?;
        if self.eat_preposition(Preposition::On).is_none() {
            return Err(self.unexpected("'on' before the transition target"));
        }
        self.article();
        self.expect(TokenKind::Lt, "'<target: field>'")?;
        let (target, _) = self.compound("the transition target")?;
        self.expect(TokenKind::Colon, "':' before the state field")?;
        let field = self.qualifier_path()?.join(".");
        self.expect(TokenKind::Gt, "'>'")?;
        let end = self.end_statement()?;
        Ok(Stmt::Transition {
            target,
            field,
            from,
            to,
            span: start.merge(&end),
        })
    }

    fn if_stmt(&mut self) -> ParseResult<Stmt> {
        let kw = self.advance();
        let test = self.expression()?;
        self.eat_keyword(Keyword::Then);
        let (then_s, mut end) = self.block()?;
        let else_s = if self.eat_keyword(Keyword::Else).is_some() {
            if self.kind() == &TokenKind::Keyword(Keyword::If) {
                let nested = self.if_stmt()?;
                end = nested.span();
                Some(vec![nested])
            } else {
                let (body, close) = self.block()?;
                end = close;
                Some(body)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then_s,
            else_s,
            span: kw.span.merge(&end),
        })
    }

    fn when_stmt(&mut self) -> ParseResult<Stmt> {
        let kw = self.advance();
        let test = self.expression()?;
        let (body, end) = self.block()?;
        Ok(Stmt::When {
            test,
            body,
            span: kw.span.merge(&end),
        })
    }

    fn match_stmt(&mut self) -> ParseResult<Stmt> {
        let kw = self.advance();
        let subject = self.var_ref()?;
        self.expect(TokenKind::LBrace, "'{' to open the match")?;
        let mut cases = Vec::new();
        let mut otherwise = None;
        loop {
            match self.kind() {
                TokenKind::Keyword(Keyword::Case) if otherwise.is_none() => {
                    let case_kw = self.advance();
                    let pattern = self.pattern()?;
                    let guard = match self.eat_keyword(Keyword::Where) {
                        Some(_) => Some(self.expression()?),
                        None => None,
                    };
                    let (body, end) = self.block()?;
                    cases.push(MatchCase {
                        pattern,
                        guard,
                        body,
                        span: case_kw.span.merge(&end),
                    });
                }
                TokenKind::Keyword(Keyword::Otherwise) if otherwise.is_none() => {
                    self.advance();
                    otherwise = Some(self.block()?.0);
                }
                TokenKind::RBrace => break,
                _ => return Err(self.unexpected("'case', 'otherwise' or '}'")),
            }
        }
        let close = self.advance();
        Ok(Stmt::Match {
            subject,
            cases,
            otherwise,
            span: kw.span.merge(&close.span),
        })
    }

    fn pattern(&mut self) -> ParseResult<Pattern> {
        let token = self.peek().clone();
        let pattern = match token.kind {
            TokenKind::Str(s) => Pattern::Literal { v: Literal::Str(s) },
            TokenKind::Number(n) => Pattern::Literal { v: Literal::Num(n) },
            TokenKind::Minus => {
                self.advance();
                match self.kind() {
                    TokenKind::Number(n) => Pattern::Literal {
                        v: Literal::Num(-n),
                    },
                    _ => return Err(self.unexpected("a number after '-'")),
                }
            }
            TokenKind::Keyword(Keyword::True) => Pattern::Literal {
                v: Literal::Bool(true),
            },
            TokenKind::Keyword(Keyword::False) => Pattern::Literal {
                v: Literal::Bool(false),
            },
            TokenKind::Keyword(Keyword::Null) => Pattern::Literal { v: Literal::Null },
            TokenKind::Regex { pattern, flags } => Pattern::Regex { pattern, flags },
            TokenKind::Ident(ref name) if name == "_" => Pattern::Wildcard,
            TokenKind::Lt => {
                return Ok(Pattern::Variable {
                    var: self.var_ref()?,
                })
            }
            _ => return Err(self.unexpected("a case pattern")),
        };
        self.advance();
        Ok(pattern)
    }

    fn loop_stmt(&mut self) -> ParseResult<Stmt> {
        let start = self.peek().span;
        let parallel = self.eat_keyword(Keyword::Parallel).is_some();
        if self.eat_preposition(Preposition::For).is_none() {
            return Err(self.unexpected("'for'"));
        }
        if self.eat_keyword(Keyword::Each).is_some() {
            let (binding, _) = self.angle_name("the loop variable")?;
            let index = match self.eat_preposition(Preposition::At) {
                Some(_) => Some(self.angle_name("the index variable")?.0),
                None => None,
            };
            if self.eat_preposition(Preposition::In).is_none() {
                return Err(self.unexpected("'in' before the collection"));
            }
            let collection = self.var_ref()?;
            let filter = match self.eat_keyword(Keyword::Where) {
                Some(_) => Some(self.expression()?),
                None => None,
            };
            let (body, end) = self.block()?;
            return Ok(Stmt::ForEach {
                binding,
                index,
                collection,
                filter,
                parallel,
                body,
                span: start.merge(&end),
            });
        }
        if parallel {
            return Err(ParseError::syntax(
                "'parallel' is only allowed on 'for each' loops",
                start,
            ));
        }
        let (binding, _) = self.angle_name("the loop variable")?;
        if self.eat_preposition(Preposition::From).is_none() {
            return Err(self.unexpected("'from' in a counted loop"));
        }
        let from = self.expression()?;
        if self.eat_preposition(Preposition::To).is_none() {
            return Err(self.unexpected("'to' in a counted loop"));
        }
        let to = self.expression()?;
        let (body, end) = self.block()?;
        Ok(Stmt::ForRange {
            binding,
            from,
            to,
            body,
            span: start.merge(&end),
        })
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// A word, possibly hyphenated (`http-server`, `Application-End`);
    /// hyphen parts must touch their neighbours
    fn compound(&mut self, expected: &str) -> ParseResult<(String, Span)> {
        let first = self.peek().clone();
        if first.word(self.source).is_none() {
            return Err(self.unexpected(expected));
        }
        self.advance();
        let mut end = first.span;
        loop {
            let minus = self.peek();
            let next = self.nth(1);
            let joinable = minus.kind == TokenKind::Minus
                && minus.span.start == end.end
                && next.span.start == minus.span.end
                && (next.word(self.source).is_some()
                    || matches!(next.kind, TokenKind::Number(_)));
            if !joinable {
                break;
            }
            end = next.span;
            self.advance();
            self.advance();
        }
        let text = self.source[first.span.start..end.end].to_string();
        Ok((text, first.span.merge(&end)))
    }

    /// `a.b.c` after a `:`; numeric segments index into lists
    fn qualifier_path(&mut self) -> ParseResult<Vec<String>> {
        let mut segments = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Number(_) => {
                    let token = self.advance();
                    segments.push(self.source[token.span.start..token.span.end].to_string());
                }
                _ => segments.push(self.compound("a qualifier")?.0),
            }
            if self.eat(&TokenKind::Dot).is_none() {
                break;
            }
        }
        Ok(segments)
    }

    fn angle_name(&mut self, expected: &str) -> ParseResult<(String, Span)> {
        let open = self.expect(TokenKind::Lt, &format!("'<' before {}", expected))?;
        let (name, _) = self.compound(expected)?;
        let close = self.expect(TokenKind::Gt, "'>'")?;
        Ok((name, open.span.merge(&close.span)))
    }

    fn var_ref(&mut self) -> ParseResult<VarRef> {
        let open = self.expect(TokenKind::Lt, "'<' to start a variable")?;
        let (name, _) = self.compound("a variable name")?;
        let path = match self.eat(&TokenKind::Colon) {
            Some(_) => self.qualifier_path()?,
            None => Vec::new(),
        };
        let close = self.expect(TokenKind::Gt, "'>' to close the variable")?;
        Ok(VarRef {
            name,
            path,
            span: open.span.merge(&close.span),
        })
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expression(&mut self) -> ParseResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword(Keyword::Or).is_some() {
            let right = self.and_expr()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword(Keyword::And).is_some() {
            let right = self.not_expr()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> ParseResult<Expr> {
        if let Some(kw) = self.eat_keyword(Keyword::Not) {
            let operand = self.not_expr()?;
            let span = kw.span.merge(&operand.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let left = self.additive()?;
        let op = match self.kind() {
            TokenKind::EqEq | TokenKind::Assign => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt if !self.lt_opens_variable() => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::Keyword(Keyword::Contains) => BinaryOp::Contains,
            TokenKind::Keyword(Keyword::Matches) => BinaryOp::Matches,
            TokenKind::Keyword(Keyword::Is) => {
                self.advance();
                let op = match self.eat_keyword(Keyword::Not) {
                    Some(_) => BinaryOp::NotEq,
                    None => BinaryOp::Eq,
                };
                let right = self.additive()?;
                return Ok(binary(op, left, right));
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(binary(op, left, right))
    }

    /// `<` followed by `name>` or `name:` starts a variable, not a comparison
    fn lt_opens_variable(&self) -> bool {
        let name = self.nth(1);
        let after = self.nth(2);
        name.word(self.source).is_some()
            && match after.kind {
                TokenKind::Gt | TokenKind::Colon => true,
                TokenKind::Minus => after.span.start == name.span.end,
                _ => false,
            }
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if let Some(minus) = self.eat(&TokenKind::Minus) {
            let operand = self.unary()?;
            let span = minus.span.merge(&operand.span());
            return Ok(match operand {
                Expr::Lit {
                    v: Literal::Num(n), ..
                } => Expr::Lit {
                    v: Literal::Num(-n),
                    span,
                },
                operand => Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    span,
                },
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let span = token.span;
        let lit = |v: Literal| Expr::Lit { v, span };
        let expr = match token.kind {
            TokenKind::Lt => {
                let var = self.var_ref()?;
                return Ok(Expr::Var {
                    name: var.name,
                    path: var.path,
                    span: var.span,
                });
            }
            TokenKind::Str(s) => lit(Literal::Str(s)),
            TokenKind::Number(n) => lit(Literal::Num(n)),
            TokenKind::Keyword(Keyword::True) => lit(Literal::Bool(true)),
            TokenKind::Keyword(Keyword::False) => lit(Literal::Bool(false)),
            TokenKind::Keyword(Keyword::Null) => lit(Literal::Null),
            TokenKind::Keyword(Keyword::Empty) => Expr::Empty { span },
            TokenKind::Regex { pattern, flags } => Expr::Regex {
                pattern,
                flags,
                span,
            },
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            TokenKind::LBracket => return self.list_literal(),
            TokenKind::LBrace => return self.object_literal(),
            TokenKind::Ident(_) => {
                if self.nth(1).kind == TokenKind::LParen {
                    return self.call();
                }
                let (name, span) = self.compound("a field name")?;
                return Ok(Expr::Field { name, span });
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(expr)
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let name = self.advance();
        let function = self.source[name.span.start..name.span.end].to_string();
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.kind() != &TokenKind::RParen {
            loop {
                args.push(self.expression()?);
                if self.eat(&TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RParen, "')' to close the call")?;
        Ok(Expr::Call {
            function,
            args,
            span: name.span.merge(&close.span),
        })
    }

    fn list_literal(&mut self) -> ParseResult<Expr> {
        let open = self.advance();
        let mut elements = Vec::new();
        while self.kind() != &TokenKind::RBracket {
            elements.push(self.expression()?);
            if self.eat(&TokenKind::Comma).is_none() {
                break;
            }
        }
        let close = self.expect(TokenKind::RBracket, "']' to close the list")?;
        Ok(Expr::List {
            elements,
            span: open.span.merge(&close.span),
        })
    }

    fn object_literal(&mut self) -> ParseResult<Expr> {
        let open = self.advance();
        let mut properties = Vec::new();
        while self.kind() != &TokenKind::RBrace {
            let key = match self.kind() {
                TokenKind::Str(s) => {
                    let key = s.clone();
                    self.advance();
                    key
                }
                _ => self.compound("a property name")?.0,
            };
            self.expect(TokenKind::Colon, "':' after the property name")?;
            properties.push((key, self.expression()?));
            if self.eat(&TokenKind::Comma).is_none() {
                break;
            }
        }
        let close = self.expect(TokenKind::RBrace, "'}' to close the object")?;
        Ok(Expr::Object {
            properties,
            span: open.span.merge(&close.span),
        })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span().merge(&right.span());
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("'{}'", name),
        TokenKind::Article(a) => format!("'{}'", a.as_str()),
        TokenKind::Preposition(p) => format!("'{}'", p.as_str()),
        TokenKind::Keyword(k) => format!("keyword '{}'", format!("{:?}", k).to_lowercase()),
        TokenKind::Str(_) => "a string literal".to_string(),
        TokenKind::Number(_) => "a number".to_string(),
        TokenKind::Regex { .. } => "a regex literal".to_string(),
        TokenKind::Error => "invalid input".to_string(),
        TokenKind::Eof => "end of input".to_string(),
        other => {
            let symbol = match other {
                TokenKind::LParen => "(",
                TokenKind::RParen => ")",
                TokenKind::LBrace => "{",
                TokenKind::RBrace => "}",
                TokenKind::LBracket => "[",
                TokenKind::RBracket => "]",
                TokenKind::Lt => "<",
                TokenKind::Gt => ">",
                TokenKind::Le => "<=",
                TokenKind::Ge => ">=",
                TokenKind::Assign => "=",
                TokenKind::EqEq => "==",
                TokenKind::NotEq => "!=",
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::Percent => "%",
                TokenKind::Colon => ":",
                TokenKind::Comma => ",",
                _ => ".",
            };
            format!("'{}'", symbol)
        }
    }
}

//! Recursive-descent parser from tokens to [`Policy`] values.

use crate::ast::{Clause, Condition, ConditionKind, EntityRef, Policy, Scope};
use crate::lexer::{Span, SyntaxError, Token, TokenKind, tokenize};
use crate::rules::Effect;

/// Parse policy source text into a list of policies.
pub fn parse(input: &str) -> Result<Vec<Policy>, SyntaxError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut policies = Vec::new();
    while !parser.at_end() {
        let index = policies.len();
        policies.push(parser.parse_policy(index)?);
    }
    Ok(policies)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Ident(s)) if s == name)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Where an error about the current token is reported. At end of input
    /// this is the end of the last token, so a missing terminator lands on
    /// the line where the statement stopped.
    fn error_offset(&self) -> usize {
        match self.tokens.get(self.pos) {
            Some(tok) => tok.span.start,
            None => self.tokens.last().map(|t| t.span.end).unwrap_or(0),
        }
    }

    fn found(&self) -> String {
        match self.peek() {
            Some(kind) => kind.to_string(),
            None => "end of input".into(),
        }
    }

    fn error(&self, expected: &str) -> SyntaxError {
        SyntaxError::new(
            self.error_offset(),
            format!("expected {expected}, found {}", self.found()),
        )
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Span, SyntaxError> {
        if self.peek() == Some(&kind) {
            let tok = self.bump().ok_or_else(|| self.error(expected))?;
            Ok(tok.span)
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_keyword(&mut self, name: &str) -> Result<Span, SyntaxError> {
        if self.peek_ident(name) {
            let tok = self.bump().ok_or_else(|| self.error(name))?;
            Ok(tok.span)
        } else {
            Err(self.error(&format!("'{name}'")))
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<(String, Span), SyntaxError> {
        if matches!(self.peek(), Some(TokenKind::Str(_)))
            && let Some(Token {
                kind: TokenKind::Str(s),
                span,
            }) = self.bump()
        {
            return Ok((s, span));
        }
        Err(self.error(what))
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), SyntaxError> {
        if matches!(self.peek(), Some(TokenKind::Ident(_)))
            && let Some(Token {
                kind: TokenKind::Ident(s),
                span,
            }) = self.bump()
        {
            return Ok((s, span));
        }
        Err(self.error(what))
    }

    fn parse_policy(&mut self, index: usize) -> Result<Policy, SyntaxError> {
        let start = self.error_offset();
        let mut id = None;
        while self.peek() == Some(&TokenKind::At) {
            self.bump();
            let (name, _) = self.expect_ident("annotation name")?;
            self.expect(TokenKind::LParen, "'('")?;
            let (value, _) = self.expect_string("annotation value")?;
            self.expect(TokenKind::RParen, "')'")?;
            if name == "id" {
                id = Some(value);
            }
        }

        let effect = if self.peek_ident("permit") {
            Effect::Allow
        } else if self.peek_ident("forbid") {
            Effect::Deny
        } else {
            return Err(self.error("'permit' or 'forbid'"));
        };
        self.bump();

        self.expect(TokenKind::LParen, "'('")?;
        let principal = self.parse_principal()?;
        self.expect(TokenKind::Comma, "','")?;
        let action = self.parse_scope("action")?;
        self.expect(TokenKind::Comma, "','")?;
        let resource = self.parse_scope("resource")?;
        self.expect(TokenKind::RParen, "')'")?;

        let mut conditions = Vec::new();
        loop {
            let kind = if self.peek_ident("when") {
                ConditionKind::When
            } else if self.peek_ident("unless") {
                ConditionKind::Unless
            } else {
                break;
            };
            let cond_start = self.bump().map(|t| t.span).unwrap_or_default();
            self.expect(TokenKind::LBrace, "'{'")?;
            let mut clauses = Vec::new();
            self.parse_expr(&mut clauses)?;
            let end = self.expect(TokenKind::RBrace, "'}'")?;
            conditions.push(Condition {
                kind,
                clauses,
                span: cond_start.to(end),
            });
        }

        let end = self.expect(TokenKind::Semi, "';'")?;
        Ok(Policy {
            id: id.unwrap_or_else(|| format!("policy{index}")),
            effect,
            principal,
            action,
            resource,
            conditions,
            span: Span::new(start, end.end),
        })
    }

    fn parse_principal(&mut self) -> Result<Scope, SyntaxError> {
        let span = self.expect_keyword("principal")?;
        if self.peek() == Some(&TokenKind::EqEq) {
            self.bump();
            return Ok(Scope::Eq(self.parse_entity()?));
        }
        if self.peek_ident("in") {
            self.bump();
            let entity = self.parse_entity()?;
            let span = span.to(entity.span);
            return Ok(Scope::In(vec![entity], span));
        }
        Ok(Scope::Any(span))
    }

    fn parse_scope(&mut self, keyword: &str) -> Result<Scope, SyntaxError> {
        let span = self.expect_keyword(keyword)?;
        if self.peek() == Some(&TokenKind::EqEq) {
            self.bump();
            return Ok(Scope::Eq(self.parse_entity()?));
        }
        if self.peek_ident("in") {
            self.bump();
            let (entities, set_span) = self.parse_entity_or_set()?;
            return Ok(Scope::In(entities, span.to(set_span)));
        }
        Ok(Scope::Any(span))
    }

    fn parse_entity_or_set(&mut self) -> Result<(Vec<EntityRef>, Span), SyntaxError> {
        if self.peek() != Some(&TokenKind::LBracket) {
            let entity = self.parse_entity()?;
            let span = entity.span;
            return Ok((vec![entity], span));
        }
        let start = self.expect(TokenKind::LBracket, "'['")?;
        let mut entities = Vec::new();
        if self.peek() != Some(&TokenKind::RBracket) {
            loop {
                entities.push(self.parse_entity()?);
                if self.peek() == Some(&TokenKind::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        let end = self.expect(TokenKind::RBracket, "',' or ']'")?;
        Ok((entities, start.to(end)))
    }

    fn parse_entity(&mut self) -> Result<EntityRef, SyntaxError> {
        let (first, start) = self.expect_ident("entity type")?;
        let mut path = vec![first];
        loop {
            self.expect(TokenKind::PathSep, "'::'")?;
            match self.peek() {
                Some(TokenKind::Ident(_)) => {
                    let (segment, _) = self.expect_ident("entity type")?;
                    path.push(segment);
                }
                Some(TokenKind::Str(_)) => {
                    let (id, end) = self.expect_string("entity id")?;
                    return Ok(EntityRef {
                        path,
                        id,
                        span: start.to(end),
                    });
                }
                _ => return Err(self.error("entity type or quoted entity id")),
            }
        }
    }

    fn parse_expr(&mut self, out: &mut Vec<Clause>) -> Result<(), SyntaxError> {
        self.parse_term(out)?;
        while self.peek() == Some(&TokenKind::AndAnd) {
            self.bump();
            self.parse_term(out)?;
        }
        Ok(())
    }

    fn parse_term(&mut self, out: &mut Vec<Clause>) -> Result<(), SyntaxError> {
        if self.peek() == Some(&TokenKind::LParen) {
            self.bump();
            self.parse_expr(out)?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(());
        }

        if self.peek_ident("true") {
            let span = self.bump().map(|t| t.span).unwrap_or_default();
            out.push(Clause::True(span));
            return Ok(());
        }

        if self.peek_ident("resource") {
            let start = self.bump().map(|t| t.span).unwrap_or_default();
            if self.peek_ident("in") {
                self.bump();
                let (entities, span) = self.parse_entity_or_set()?;
                out.push(Clause::ResourceIn(entities, start.to(span)));
                return Ok(());
            }
            if self.peek() == Some(&TokenKind::EqEq) {
                self.bump();
                out.push(Clause::ResourceEq(self.parse_entity()?));
                return Ok(());
            }
            return Err(self.error("'in' or '=='"));
        }

        if self.peek_ident("context") {
            let start = self.bump().map(|t| t.span).unwrap_or_default();
            self.expect(TokenKind::Dot, "'.'")?;
            let (key, _) = self.expect_ident("context attribute")?;
            if self.peek() == Some(&TokenKind::EqEq) {
                self.bump();
                let (value, end) = self.expect_string("quoted string")?;
                out.push(Clause::ContextEq {
                    key,
                    value,
                    span: start.to(end),
                });
                return Ok(());
            }
            if self.peek_ident("like") {
                self.bump();
                let (pattern, end) = self.expect_string("quoted pattern")?;
                out.push(Clause::ContextLike {
                    key,
                    pattern,
                    span: start.to(end),
                });
                return Ok(());
            }
            return Err(self.error("'==' or 'like'"));
        }

        Err(self.error("condition"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::line_col;

    #[test]
    fn parse_empty_source() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("// nothing here\n").unwrap().is_empty());
    }

    #[test]
    fn parse_head_with_sets() {
        let src = r#"permit (principal, action in [Action::"FileOpen", Action::"ProcessExec"], resource in [Dir::"/tmp/"]);"#;
        let policies = parse(src).unwrap();
        assert_eq!(policies.len(), 1);
        let p = &policies[0];
        assert_eq!(p.effect, Effect::Allow);
        assert_eq!(p.id, "policy0");
        assert!(matches!(p.principal, Scope::Any(_)));
        assert_eq!(p.action.entities().len(), 2);
        assert_eq!(p.action.entities()[1].id, "ProcessExec");
        assert_eq!(p.resource.entities()[0].type_name(), "Dir");
    }

    #[test]
    fn parse_annotation_and_conditions() {
        let src = r#"
@id("block-dns")
forbid (principal, action == Action::"NetworkConnect", resource)
when { resource in [ Host::"a.com", Net::DnsZone::"b.org" ] && context.hostname like "*.c.net" };
"#;
        let p = &parse(src).unwrap()[0];
        assert_eq!(p.id, "block-dns");
        assert_eq!(p.effect, Effect::Deny);
        let clauses: Vec<_> = p.clauses().collect();
        assert_eq!(clauses.len(), 2);
        assert!(matches!(clauses[0].1, Clause::ResourceIn(es, _) if es.len() == 2));
        assert!(matches!(
            clauses[1].1,
            Clause::ContextLike { key, pattern, .. } if key == "hostname" && pattern == "*.c.net"
        ));
    }

    #[test]
    fn parenthesized_terms_flatten() {
        let src = r#"permit (principal, action, resource) when { (true && (context.header == "X")) };"#;
        let p = &parse(src).unwrap()[0];
        assert_eq!(p.clauses().count(), 2);
    }

    #[test]
    fn default_ids_follow_position() {
        let src = r#"
permit (principal, action, resource);
permit (principal, action, resource);
"#;
        let ids: Vec<_> = parse(src).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["policy0", "policy1"]);
    }

    #[test]
    fn missing_terminator_reports_end_of_statement() {
        let src = "permit (principal, action == Action::\"NetworkConnect\", resource)\nwhen { resource in [ Host::\"x\" ] }";
        let err = parse(src).unwrap_err();
        assert!(err.message.contains("expected ';'"), "{}", err.message);
        assert_eq!(line_col(src, err.offset), (2, 35));
    }

    #[test]
    fn missing_comma_points_at_offending_token() {
        let src = "permit (principal action, resource);";
        let err = parse(src).unwrap_err();
        assert_eq!(err.message, "expected ',', found 'action'");
        assert_eq!(err.offset, src.find("action").unwrap());
    }

    #[test]
    fn rejects_unknown_statement() {
        let err = parse("allow (principal, action, resource);").unwrap_err();
        assert!(err.message.contains("'permit' or 'forbid'"));
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn entity_requires_quoted_id() {
        let err = parse("permit (principal, action == Action::FileOpen, resource);").unwrap_err();
        assert_eq!(err.message, "expected '::', found ','");
    }
}

//! Operation classifier.
//!
//! Classification is a token-level inspection of the leading keyword, not a
//! parse: comments and whitespace are skipped, a `WITH` header is walked to
//! find the effective statement, and anything that does not fit the keyword
//! table is [`OperationKind::Unknown`].

use sqlgate_core::OperationKind;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Classify SQL text by its effective leading keyword. Never fails.
///
/// Text holding more than one statement, or that cannot be tokenized, is
/// `Unknown`.
pub fn classify(sql: &str) -> OperationKind {
    let Some(tokens) = significant_tokens(sql) else {
        return OperationKind::Unknown;
    };
    match single_statement(&tokens) {
        Some(statement) => classify_tokens(statement),
        None => OperationKind::Unknown,
    }
}

/// Tokens with whitespace and comments removed.
pub(crate) fn significant_tokens(sql: &str) -> Option<Vec<Token>> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize().ok()?;
    Some(
        tokens
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
            .collect(),
    )
}

/// The statement before any trailing semicolons, or `None` if a second
/// statement follows.
fn single_statement(tokens: &[Token]) -> Option<&[Token]> {
    let end = tokens
        .iter()
        .position(|t| matches!(t, Token::SemiColon))
        .unwrap_or(tokens.len());
    if tokens[end..].iter().any(|t| !matches!(t, Token::SemiColon)) {
        return None;
    }
    Some(&tokens[..end])
}

fn classify_tokens(tokens: &[Token]) -> OperationKind {
    let Some(first) = tokens.first().and_then(keyword) else {
        return OperationKind::Unknown;
    };

    if first == "WITH" {
        return classify_with(&tokens[1..]).unwrap_or(OperationKind::Unknown);
    }

    let kind = kind_for_keyword(&first);
    // SELECT ... INTO creates a table.
    if kind == OperationKind::Select && has_top_level_keyword(tokens, "INTO") {
        return OperationKind::Ddl;
    }
    kind
}

fn kind_for_keyword(word: &str) -> OperationKind {
    match word {
        "SELECT" | "VALUES" | "TABLE" => OperationKind::Select,
        "INSERT" => OperationKind::Insert,
        "UPDATE" => OperationKind::Update,
        "DELETE" => OperationKind::Delete,
        "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "COMMENT" | "GRANT" | "REVOKE" => {
            OperationKind::Ddl
        }
        _ => OperationKind::Unknown,
    }
}

/// Walk `name [(cols)] AS [[NOT] MATERIALIZED] (body) [, ...]` and classify
/// what follows. Data-modifying CTE bodies make the whole statement a write.
fn classify_with(mut rest: &[Token]) -> Option<OperationKind> {
    if rest.first().and_then(keyword).as_deref() == Some("RECURSIVE") {
        rest = &rest[1..];
    }

    let mut body_kinds = Vec::new();
    loop {
        if !matches!(rest.first(), Some(Token::Word(_))) {
            return None;
        }
        rest = &rest[1..];

        if matches!(rest.first(), Some(Token::LParen)) {
            let (_, after) = split_group(rest)?;
            rest = after;
        }

        if rest.first().and_then(keyword).as_deref() != Some("AS") {
            return None;
        }
        rest = &rest[1..];

        if rest.first().and_then(keyword).as_deref() == Some("NOT") {
            rest = &rest[1..];
        }
        if rest.first().and_then(keyword).as_deref() == Some("MATERIALIZED") {
            rest = &rest[1..];
        }

        let (body, after) = split_group(rest)?;
        body_kinds.push(classify_tokens(body));
        rest = after;

        if matches!(rest.first(), Some(Token::Comma)) {
            rest = &rest[1..];
        } else {
            break;
        }
    }

    let main = classify_tokens(rest);
    if main == OperationKind::Unknown || body_kinds.contains(&OperationKind::Unknown) {
        return Some(OperationKind::Unknown);
    }

    let mut writes = body_kinds.into_iter().filter(|k| k.is_write());
    match writes.next() {
        None => Some(main),
        Some(write) => {
            let consistent = writes.all(|k| k == write);
            if consistent && (main == OperationKind::Select || main == write) {
                Some(write)
            } else {
                Some(OperationKind::Unknown)
            }
        }
    }
}

/// Split `( inner ) rest` into `inner` and `rest`.
fn split_group(tokens: &[Token]) -> Option<(&[Token], &[Token])> {
    if !matches!(tokens.first(), Some(Token::LParen)) {
        return None;
    }
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some((&tokens[1..idx], &tokens[idx + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

fn has_top_level_keyword(tokens: &[Token], wanted: &str) -> bool {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && keyword(token).as_deref() == Some(wanted) => return true,
            _ => {}
        }
    }
    false
}

/// Upper-cased text of an unquoted word token.
fn keyword(token: &Token) -> Option<String> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.to_ascii_uppercase()),
        _ => None,
    }
}

//! Token-level grammar for the IQL-SQL surface.
//!
//! Each production returns a [`Node`] tagged with the construct it parsed,
//! following the generic "tag + children" parse tree described for the
//! language: there is no separate typed AST, only `Node`s dispatched on
//! [`Tag`] by every downstream stage.

use std::ops::Range;

use chumsky::prelude::*;

use crate::node::{Child, Node, Tag};
use crate::span::Span;
use crate::token::TokenKind;

fn kw(name: &'static str) -> impl Parser<TokenKind, Span, Error = Simple<TokenKind>> + Clone {
    just(TokenKind::Keyword(name)).map_with_span(|_, span: Range<usize>| span.into())
}

fn ctrl(tok: TokenKind) -> impl Parser<TokenKind, Span, Error = Simple<TokenKind>> + Clone {
    just(tok).map_with_span(|_, span: Range<usize>| span.into())
}

/// An identifier token, together with its span.
fn ident() -> impl Parser<TokenKind, (String, Span), Error = Simple<TokenKind>> + Clone {
    filter(|t: &TokenKind| matches!(t, TokenKind::Ident(_))).map_with_span(
        |t, span: Range<usize>| {
            let s = match t {
                TokenKind::Ident(s) => s,
                _ => unreachable!("filtered to Ident above"),
            };
            (s, span.into())
        },
    )
}

fn int_node() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    filter(|t: &TokenKind| matches!(t, TokenKind::Int(_))).map_with_span(
        |t, span: Range<usize>| {
            let v = match t {
                TokenKind::Int(v) => v,
                _ => unreachable!("filtered to Int above"),
            };
            Node::leaf(Tag::Int, v.to_string(), span.into())
        },
    )
}

/// A non-negative integer literal, as used by `LIMIT`.
fn nat_node() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    filter(|t: &TokenKind| matches!(t, TokenKind::Int(v) if *v >= 0)).map_with_span(
        |t, span: Range<usize>| {
            let v = match t {
                TokenKind::Int(v) => v,
                _ => unreachable!("filtered to non-negative Int above"),
            };
            Node::leaf(Tag::Nat, v.to_string(), span.into())
        },
    )
}

fn float_node() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    filter(|t: &TokenKind| matches!(t, TokenKind::Float(_))).map_with_span(
        |t, span: Range<usize>| {
            let v = match t {
                TokenKind::Float(v) => v,
                _ => unreachable!("filtered to Float above"),
            };
            Node::leaf(Tag::Float, v.to_string(), span.into())
        },
    )
}

fn string_node() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    filter(|t: &TokenKind| matches!(t, TokenKind::String(_))).map_with_span(
        |t, span: Range<usize>| {
            let v = match t {
                TokenKind::String(v) => v,
                _ => unreachable!("filtered to String above"),
            };
            Node::leaf(Tag::String, v, span.into())
        },
    )
}

fn bool_node() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    choice((
        kw("TRUE").map(|span| Node::leaf(Tag::Bool, "true", span)),
        kw("FALSE").map(|span| Node::leaf(Tag::Bool, "false", span)),
    ))
}

fn null_node() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    choice((kw("NULL"), kw("NA"))).map(|span| Node::leaf(Tag::Null, "null", span))
}

fn simple_symbol_node() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    ident().map(|(s, span)| Node::leaf(Tag::SimpleSymbol, s, span))
}

/// A literal value: the value-position counterpart of [`name_node`].
fn literal_value() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    choice((
        float_node(),
        int_node(),
        string_node(),
        bool_node(),
        null_node(),
        simple_symbol_node(),
    ))
}

fn name_node(s: String, span: Span) -> Node {
    Node::leaf(Tag::Name, s, span)
}

fn predicate_op() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    choice((
        ctrl(TokenKind::Ne).map(|span| (span, "!=")),
        ctrl(TokenKind::Lte).map(|span| (span, "<=")),
        ctrl(TokenKind::Gte).map(|span| (span, ">=")),
        ctrl(TokenKind::Lt).map(|span| (span, "<")),
        ctrl(TokenKind::Gt).map(|span| (span, ">")),
    ))
    .map(|(span, op)| Node::leaf(Tag::PredicateExpr, op, span))
}

fn column_selection() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    ident()
        .then(kw("AS").ignore_then(ident()).or_not())
        .map_with_span(|((col, col_span), alias), span: Range<usize>| {
            let mut children = vec![Child::Node(name_node(col, col_span))];
            if let Some((alias, alias_span)) = alias {
                children.push(Child::Node(name_node(alias, alias_span)));
            }
            Node::new(Tag::ColumnSelection, children, span.into())
        })
}

fn rowid_selection() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    kw("ROWID")
        .then(kw("AS").ignore_then(ident()).or_not())
        .map_with_span(|(_, alias), span: Range<usize>| {
            let children = alias
                .map(|(a, a_span)| vec![Child::Node(name_node(a, a_span))])
                .unwrap_or_default();
            Node::new(Tag::RowidSelection, children, span.into())
        })
}

fn event() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    let eq_event = ident()
        .then_ignore(ctrl(TokenKind::Eq))
        .then(literal_value())
        .map_with_span(|((sym, sym_span), val), span: Range<usize>| {
            Node::new(
                Tag::EqualityEvent,
                vec![Child::Node(name_node(sym, sym_span)), Child::Node(val)],
                span.into(),
            )
        });

    let binop_event = ident().then(predicate_op()).then(literal_value()).map_with_span(
        |((sym, op), val), span: Range<usize>| {
            let (sym, sym_span) = sym;
            Node::new(
                Tag::BinopEvent,
                vec![
                    Child::Node(name_node(sym, sym_span)),
                    Child::Node(op),
                    Child::Node(val),
                ],
                span.into(),
            )
        },
    );

    eq_event.or(binop_event)
}

/// `*` optionally followed by named events, or a plain conjunction of named
/// events — see the row-event protocol (§4.5.1 of the specification).
fn event_list() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    let star_and_rest = ctrl(TokenKind::Star)
        .then(ctrl(TokenKind::Comma).ignore_then(event()).repeated())
        .map(|(_, events)| {
            let mut children = vec![Child::Leaf("*".to_string())];
            children.extend(events.into_iter().map(Child::Node));
            children
        });

    let conjunction = event()
        .then(
            choice((kw("AND").ignored(), ctrl(TokenKind::Comma).ignored()))
                .ignore_then(event())
                .repeated(),
        )
        .map(|(first, rest)| {
            let mut children = vec![Child::Node(first)];
            children.extend(rest.into_iter().map(Child::Node));
            children
        });

    star_and_rest
        .or(conjunction)
        .map_with_span(|children, span: Range<usize>| Node::new(Tag::EventList, children, span.into()))
}

fn map_entry() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    ident()
        .then_ignore(ctrl(TokenKind::Eq))
        .then(literal_value())
        .map_with_span(|((k, k_span), v), span: Range<usize>| {
            Node::new(
                Tag::MapEntryExpr,
                vec![Child::Node(name_node(k, k_span)), Child::Node(v)],
                span.into(),
            )
        })
}

fn map_expr() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    map_entry()
        .separated_by(ctrl(TokenKind::Comma))
        .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen))
        .map_with_span(|entries, span: Range<usize>| {
            Node::new(Tag::MapExpr, entries.into_iter().map(Child::Node).collect(), span.into())
        })
}

fn variable_list() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    ident()
        .separated_by(ctrl(TokenKind::Comma))
        .at_least(1)
        .map_with_span(|vars, span: Range<usize>| {
            let children = vars
                .into_iter()
                .map(|(s, s_span)| Child::Node(name_node(s, s_span)))
                .collect();
            Node::new(Tag::VariableList, children, span.into())
        })
}

enum ModelSuffix {
    ConditionedBy(Node),
    ConstrainedBy(Node, Option<Node>),
}

fn apply_model_suffixes(base: Node, suffixes: Vec<ModelSuffix>, span: Span) -> Node {
    suffixes.into_iter().fold(base, |model, suffix| match suffix {
        ModelSuffix::ConditionedBy(events) => Node::new(
            Tag::ConditionedByExpr,
            vec![Child::Node(model), Child::Node(events)],
            span,
        ),
        ModelSuffix::ConstrainedBy(targets, given) => {
            let mut children = vec![Child::Node(model), Child::Node(targets)];
            if let Some(g) = given {
                children.push(Child::Node(g));
            }
            Node::new(Tag::ConstrainedByExpr, children, span)
        }
    })
}

fn model_suffix() -> impl Parser<TokenKind, ModelSuffix, Error = Simple<TokenKind>> + Clone {
    let conditioned = kw("GIVEN").ignore_then(event_list()).map(ModelSuffix::ConditionedBy);

    let constrained = kw("CONSTRAINED")
        .ignore_then(kw("BY"))
        .ignore_then(variable_list())
        .then(kw("GIVEN").ignore_then(map_expr()).or_not())
        .map(|(targets, given)| ModelSuffix::ConstrainedBy(targets, given));

    conditioned.or(constrained)
}

/// `model_expr`: an identifier naming a model, a `GENERATE` expression, or
/// either wrapped in `GIVEN`/`CONSTRAINED BY` postfixes — recursive because
/// both `GENERATE ... UNDER model` and `(model_expr)` nest arbitrarily deep.
fn model_expr() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    recursive(|model_expr| {
        let generate_expr = kw("GENERATE")
            .ignore_then(variable_list())
            .then_ignore(kw("UNDER"))
            .then(model_expr.clone())
            .then(kw("GIVEN").ignore_then(map_expr()).or_not())
            .map_with_span(|((vars, model), given), span: Range<usize>| {
                let mut children = vec![Child::Node(vars), Child::Node(model)];
                if let Some(g) = given {
                    children.push(Child::Node(g));
                }
                Node::new(Tag::GenerateExpr, children, span.into())
            });

        let grouped = model_expr
            .clone()
            .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen));

        let named = ident().map(|(s, span)| Node::leaf(Tag::Ref, s, span));

        let primary = choice((generate_expr, grouped, named));

        primary
            .then(model_suffix().repeated())
            .map_with_span(|(base, suffixes), span: Range<usize>| {
                apply_model_suffixes(base, suffixes, span.into())
            })
    })
}

/// Standalone `GENERATE` production used where a model is forbidden from
/// appearing, namely as the source of a `FROM (GENERATE ...)` table.
fn generate_expr_standalone() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    kw("GENERATE")
        .ignore_then(variable_list())
        .then_ignore(kw("UNDER"))
        .then(model_expr())
        .then(kw("GIVEN").ignore_then(map_expr()).or_not())
        .map_with_span(|((vars, model), given), span: Range<usize>| {
            let mut children = vec![Child::Node(vars), Child::Node(model)];
            if let Some(g) = given {
                children.push(Child::Node(g));
            }
            Node::new(Tag::GenerateExpr, children, span.into())
        })
}

fn density_selection() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    choice((kw("PROBABILITY").to(Tag::ProbabilityClause), kw("DENSITY").to(Tag::LogpdfClause)))
        .then_ignore(kw("OF"))
        .then(event_list())
        .then(kw("UNDER").ignore_then(model_expr()).or_not())
        .then(kw("AS").ignore_then(ident()).or_not())
        .map_with_span(|(((tag, events), model), alias), span: Range<usize>| {
            let mut children = vec![Child::Node(events)];
            if let Some(m) = model {
                children.push(Child::Node(m));
            }
            if let Some((a, a_span)) = alias {
                children.push(Child::Node(name_node(a, a_span)));
            }
            Node::new(tag, children, span.into())
        })
}

fn select_list() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    let star = ctrl(TokenKind::Star)
        .map(|span| Node::new(Tag::SelectList, vec![Child::Leaf("*".to_string())], span));

    let selection = choice((density_selection(), rowid_selection(), column_selection()));

    let list = selection
        .separated_by(ctrl(TokenKind::Comma))
        .at_least(1)
        .map_with_span(|sels, span: Range<usize>| {
            Node::new(Tag::SelectList, sels.into_iter().map(Child::Node).collect(), span.into())
        });

    star.or(list)
}

fn table_expr() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    let generated = generate_expr_standalone()
        .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen))
        .map_with_span(|inner, span: Range<usize>| {
            Node::new(Tag::GeneratedTableExpr, vec![Child::Node(inner)], span.into())
        });

    let named = ident().map(|(s, span)| Node::leaf(Tag::Ref, s, span));

    choice((generated, relation_value(), named))
}

fn from_clause() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    kw("FROM")
        .ignore_then(table_expr())
        .map_with_span(|table, span: Range<usize>| {
            Node::new(Tag::FromClause, vec![Child::Node(table)], span.into())
        })
}

fn presence_or_absence() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    ident()
        .then_ignore(kw("IS"))
        .then(kw("NOT").or_not())
        .then_ignore(kw("NULL"))
        .map_with_span(|((col, col_span), not), span: Range<usize>| {
            let tag = if not.is_some() {
                Tag::PresenceCondition
            } else {
                Tag::AbsenceCondition
            };
            Node::new(tag, vec![Child::Node(name_node(col, col_span))], span.into())
        })
}

fn equality_condition() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    ident()
        .then_ignore(ctrl(TokenKind::Eq))
        .then(literal_value())
        .map_with_span(|((col, col_span), val), span: Range<usize>| {
            Node::new(
                Tag::EqualityCondition,
                vec![Child::Node(name_node(col, col_span)), Child::Node(val)],
                span.into(),
            )
        })
}

fn predicate_condition() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    ident()
        .then(predicate_op())
        .then(literal_value())
        .map_with_span(|((col, op), val), span: Range<usize>| {
            let (col, col_span) = col;
            Node::new(
                Tag::PredicateCondition,
                vec![
                    Child::Node(name_node(col, col_span)),
                    Child::Node(op),
                    Child::Node(val),
                ],
                span.into(),
            )
        })
}

/// `condition`: disjunction of conjunctions of atoms, with parenthesized
/// grouping — the only recursive construct in the relational half of the
/// grammar.
fn condition() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    recursive(|condition| {
        let grouped = condition
            .clone()
            .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen));

        let atom = choice((
            presence_or_absence(),
            predicate_condition(),
            equality_condition(),
            grouped,
        ));

        let and_condition = atom.clone().then(kw("AND").ignore_then(atom).repeated()).map_with_span(
            |(first, rest), span: Range<usize>| {
                if rest.is_empty() {
                    first
                } else {
                    let mut children = vec![Child::Node(first)];
                    children.extend(rest.into_iter().map(Child::Node));
                    Node::new(Tag::AndCondition, children, span.into())
                }
            },
        );

        and_condition
            .clone()
            .then(kw("OR").ignore_then(and_condition).repeated())
            .map_with_span(|(first, rest), span: Range<usize>| {
                if rest.is_empty() {
                    first
                } else {
                    let mut children = vec![Child::Node(first)];
                    children.extend(rest.into_iter().map(Child::Node));
                    Node::new(Tag::OrCondition, children, span.into())
                }
            })
    })
}

fn adding_clause() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    kw("ADDING").ignore_then(ident()).map_with_span(|(name, name_span), span: Range<usize>| {
        Node::new(Tag::AddingClause, vec![Child::Node(name_node(name, name_span))], span.into())
    })
}

fn order_by_clause() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    kw("ORDER")
        .ignore_then(kw("BY"))
        .ignore_then(ident())
        .then(choice((kw("ASC").to(Tag::Ascending), kw("DESC").to(Tag::Descending))).or_not())
        .map_with_span(|((col, col_span), dir), span: Range<usize>| {
            let span: Span = span.into();
            let mut children = vec![Child::Node(name_node(col, col_span))];
            if let Some(tag) = dir {
                children.push(Child::Node(Node::new(tag, vec![], span)));
            }
            Node::new(Tag::OrderByClause, children, span)
        })
}

fn limit_clause() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    kw("LIMIT").ignore_then(nat_node()).map_with_span(|n, span: Range<usize>| {
        Node::new(Tag::LimitClause, vec![Child::Node(n)], span.into())
    })
}

fn select_expr() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    let where_clause = kw("WHERE").ignore_then(condition()).map_with_span(
        |c, span: Range<usize>| Node::new(Tag::WhereClause, vec![Child::Node(c)], span.into()),
    );

    kw("SELECT")
        .ignore_then(select_list())
        .then(from_clause().or_not())
        .then(where_clause.or_not())
        .then(adding_clause().or_not())
        .then(order_by_clause().or_not())
        .then(limit_clause().or_not())
        .map_with_span(
            |(((((list, from), where_), adding), order), limit), span: Range<usize>| {
                let mut children = vec![Child::Node(list)];
                if let Some(f) = from {
                    children.push(Child::Node(f));
                }
                if let Some(w) = where_ {
                    children.push(Child::Node(w));
                }
                if let Some(a) = adding {
                    children.push(Child::Node(a));
                }
                if let Some(o) = order {
                    children.push(Child::Node(o));
                }
                if let Some(l) = limit {
                    children.push(Child::Node(l));
                }
                Node::new(Tag::SelectExpr, children, span.into())
            },
        )
}

fn value_list() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    literal_value()
        .separated_by(ctrl(TokenKind::Comma))
        .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen))
        .map_with_span(|vals, span: Range<usize>| {
            Node::new(Tag::ValueList, vals.into_iter().map(Child::Node).collect(), span.into())
        })
}

fn value_lists_full() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    value_list()
        .separated_by(ctrl(TokenKind::Comma))
        .at_least(1)
        .map_with_span(|lists, span: Range<usize>| {
            Node::new(
                Tag::ValueListsFull,
                lists.into_iter().map(Child::Node).collect(),
                span.into(),
            )
        })
}

/// `index ':' value_list`, one entry of a sparse `VALUES` clause.
fn sparse_entry() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    nat_node()
        .then_ignore(ctrl(TokenKind::Colon))
        .then(value_list())
        .map_with_span(|(idx, vals), span: Range<usize>| {
            Node::new(Tag::SparseEntry, vec![Child::Node(idx), Child::Node(vals)], span.into())
        })
}

/// `value_lists_sparse`: `index ':' value_list` pairs — positions not given
/// read back as an empty value list (see the literal reader's sparse
/// value-list law).
fn value_lists_sparse() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    sparse_entry()
        .separated_by(ctrl(TokenKind::Comma))
        .at_least(1)
        .map_with_span(|entries, span: Range<usize>| {
            Node::new(
                Tag::ValueListsSparse,
                entries.into_iter().map(Child::Node).collect(),
                span.into(),
            )
        })
}

fn values_clause() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    choice((value_lists_sparse(), value_lists_full()))
}

/// `relation_value`: `'(' col (',' col)* ')' VALUES value_lists`, a literal
/// relation — rows are `zip(cols, values)`, `columns = cols`. Parsed only
/// where a table-source literal is syntactically useful (`table_expr`,
/// `insert_expr`), not as a general `literal_value` alternative: folding it
/// into `literal_value` would make it mutually recursive with
/// `value_list` at parser-construction time.
fn relation_value() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    ident()
        .separated_by(ctrl(TokenKind::Comma))
        .at_least(1)
        .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen))
        .then_ignore(kw("VALUES"))
        .then(values_clause())
        .map_with_span(|(cols, values), span: Range<usize>| {
            let span: Span = span.into();
            let columns = Node::new(
                Tag::VariableList,
                cols.into_iter().map(|(s, s_span)| Child::Node(name_node(s, s_span))).collect(),
                span,
            );
            Node::new(Tag::RelationValue, vec![Child::Node(columns), Child::Node(values)], span)
        })
}

fn insert_expr() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    kw("INSERT")
        .ignore_then(kw("INTO"))
        .ignore_then(ident())
        .then_ignore(kw("VALUES"))
        .then(values_clause())
        .map_with_span(|((table, table_span), values), span: Range<usize>| {
            Node::new(
                Tag::InsertExpr,
                vec![
                    Child::Node(Node::leaf(Tag::Ref, table, table_span)),
                    Child::Node(values),
                ],
                span.into(),
            )
        })
}

/// The top-level statement: a query (`SELECT ...`) or an insert.
pub fn statement() -> impl Parser<TokenKind, Node, Error = Simple<TokenKind>> + Clone {
    select_expr().or(insert_expr())
}

//! Key-set predicate optimizer.
//!
//! Turns a list of composite key tuples into a boolean expression that is
//! true for exactly those tuples. OR-ing one conjunction per row grows as
//! rows × columns; instead, any column value shared by enough rows is pulled
//! out as a single equality over a smaller sub-problem. Greedy, not optimal.

use crate::{
    db::query::{ColumnRef, Expr},
    value::Value,
};
use std::collections::HashMap;

/// A column value must occur in more rows than this to be factored out.
pub const MODE_THRESHOLD: usize = 3;

/// Build a predicate matching exactly `rows`, where each row holds one value
/// per entry of `columns`.
#[must_use]
pub fn optimize(columns: &[ColumnRef], rows: Vec<Vec<Value>>) -> Expr {
    let active: Vec<usize> = (0..columns.len()).collect();

    collapse(optimize_rows(columns, rows, &active))
}

fn optimize_rows(columns: &[ColumnRef], mut rows: Vec<Vec<Value>>, active: &[usize]) -> Vec<Expr> {
    let mut terms = Vec::new();

    while !rows.is_empty() {
        match best_mode(&rows, active) {
            Some((col, value, count)) if count > MODE_THRESHOLD => {
                let (group, rest): (Vec<_>, Vec<_>) =
                    rows.into_iter().partition(|row| row[col] == value);
                rows = rest;

                let remaining: Vec<usize> = active.iter().copied().filter(|c| *c != col).collect();
                let head = columns[col].matches(&value);
                let tail = match remaining.as_slice() {
                    [] => None,
                    [only] => Some(in_list(columns[*only], &group, *only)),
                    _ => Some(collapse(optimize_rows(columns, group, &remaining))),
                };

                terms.push(match tail {
                    Some(tail) => Expr::and(vec![head, tail]),
                    None => head,
                });
            }

            // no worthwhile mode: spell out the detritus row by row
            _ => {
                terms.extend(rows.drain(..).map(|row| row_conjunction(columns, &row, active)));
            }
        }
    }

    terms
}

// Most frequent (column, value) across the active columns. Ties go to the
// lowest column index, then to the value seen first.
fn best_mode(rows: &[Vec<Value>], active: &[usize]) -> Option<(usize, Value, usize)> {
    let mut best: Option<(usize, &Value, usize)> = None;

    for &col in active {
        let mut counts: Vec<(&Value, usize)> = Vec::new();
        let mut slots: HashMap<&Value, usize> = HashMap::new();

        for row in rows {
            let value = &row[col];
            match slots.get(value) {
                Some(&slot) => counts[slot].1 += 1,
                None => {
                    slots.insert(value, counts.len());
                    counts.push((value, 1));
                }
            }
        }

        let mut column_best: Option<(&Value, usize)> = None;
        for (value, count) in counts {
            if column_best.is_none_or(|(_, c)| count > c) {
                column_best = Some((value, count));
            }
        }

        if let Some((value, count)) = column_best
            && best.is_none_or(|(_, _, c)| count > c)
        {
            best = Some((col, value, count));
        }
    }

    best.map(|(col, value, count)| (col, value.clone(), count))
}

fn in_list(column: ColumnRef, group: &[Vec<Value>], col: usize) -> Expr {
    let mut values: Vec<Value> = Vec::with_capacity(group.len());
    let mut has_null = false;
    for row in group {
        let value = &row[col];
        if value.is_null() {
            has_null = true;
        } else if !values.contains(value) {
            values.push(value.clone());
        }
    }

    let mut terms = Vec::new();
    match values.len() {
        0 => {}
        1 => terms.push(column.matches(&values[0])),
        _ => terms.push(column.in_(values)),
    }
    if has_null {
        terms.push(column.is_null());
    }

    collapse(terms)
}

fn row_conjunction(columns: &[ColumnRef], row: &[Value], active: &[usize]) -> Expr {
    let mut terms: Vec<Expr> = active
        .iter()
        .map(|&col| columns[col].matches(&row[col]))
        .collect();

    if terms.len() == 1 {
        terms.remove(0)
    } else {
        Expr::and(terms)
    }
}

fn collapse(mut terms: Vec<Expr>) -> Expr {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        Expr::or(terms)
    }
}

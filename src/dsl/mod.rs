//! Where/Order mini-language used by record traversal.
//!
//! A filter maps a field to `"<op><operand>"`:
//!
//! | op | meaning |
//! |----|---------|
//! | `=` or none | equal |
//! | `!` | not equal |
//! | `*` | `LIKE` |
//! | `<` | rendered as `` `f` > :f `` |
//! | `>` | rendered as `` `f` < :f `` |
//! | `&` `\|` `^` | bitwise, true when non-zero |
//! | `~` | `IN` over a comma separated list |

pub mod filter;
pub mod order;

pub use filter::{Condition, FilterOp, FilterSpec, WhereClause};
pub use order::{Direction, OrderSpec, OrderTerm, render_order};

/// Join a rendered `WHERE` clause and `ORDER BY` clause.
pub fn query_tail(clause: &WhereClause, order: &[OrderTerm]) -> String {
    let order = render_order(order);
    match (clause.is_empty(), order.is_empty()) {
        (true, _) => order,
        (false, true) => clause.sql.clone(),
        (false, false) => format!("{} {}", clause.sql, order),
    }
}

/// Operator precedence rungs, tightest first.
///
/// An expression rule reports the rung it produces and requests a rung for each
/// operand; the generator parenthesizes an operand whose rung is looser than the
/// one requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Order {
    Atomic,
    Member,
    FunctionCall,
    Exponentiation,
    UnarySign,
    Multiplicative,
    Additive,
    Relational,
    LogicalNot,
    LogicalAnd,
    LogicalOr,
    Lambda,
    Await,
    None,
}

const RUNGS: [Order; 14] = [
    Order::Atomic,
    Order::Member,
    Order::FunctionCall,
    Order::Exponentiation,
    Order::UnarySign,
    Order::Multiplicative,
    Order::Additive,
    Order::Relational,
    Order::LogicalNot,
    Order::LogicalAnd,
    Order::LogicalOr,
    Order::Lambda,
    Order::Await,
    Order::None,
];

impl Order {
    pub fn rank(self) -> usize {
        self as usize
    }

    /// The next rung toward `Atomic`; `Atomic` is its own tighter rung.
    pub fn tighter(self) -> Order {
        RUNGS[self.rank().saturating_sub(1)]
    }

    pub fn needs_parens(produced: Order, required: Order) -> bool {
        if produced <= required {
            return false;
        }
        // member access and calls chain left to right: f(x).y, a.b(c)
        !matches!(
            (required, produced),
            (Order::Member, Order::FunctionCall) | (Order::FunctionCall, Order::Member)
        )
    }

    pub fn wrap(code: String, produced: Order, required: Order) -> String {
        if Order::needs_parens(produced, required) {
            format!("({})", code)
        } else {
            code
        }
    }
}

pub fn arithmetic_order(op: &str) -> Option<Order> {
    match op {
        "+" | "-" => Some(Order::Additive),
        "*" | "/" | "//" | "%" => Some(Order::Multiplicative),
        "**" => Some(Order::Exponentiation),
        _ => None,
    }
}

pub fn operand_orders(order: Order) -> (Order, Order) {
    match order {
        Order::Exponentiation => (Order::FunctionCall, Order::UnarySign),
        Order::LogicalAnd | Order::LogicalOr => (order, order),
        Order::Relational => (Order::Additive, Order::Additive),
        _ => (order, order.tighter()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rungs_are_listed_in_rank_order() {
        for (index, rung) in RUNGS.iter().enumerate() {
            assert_eq!(rung.rank(), index);
        }
        assert!(Order::Exponentiation < Order::UnarySign);
        assert!(Order::UnarySign < Order::Multiplicative);
        assert!(Order::Lambda < Order::Await);
    }

    #[test]
    fn same_rung_is_not_bracketed() {
        assert!(!Order::needs_parens(Order::Additive, Order::Additive));
        assert!(Order::needs_parens(Order::Additive, Order::Multiplicative));
        assert!(!Order::needs_parens(Order::Multiplicative, Order::Additive));
    }

    #[test]
    fn calls_and_members_chain_without_brackets() {
        assert!(!Order::needs_parens(Order::FunctionCall, Order::Member));
        assert!(!Order::needs_parens(Order::Member, Order::FunctionCall));
        assert!(Order::needs_parens(Order::Additive, Order::Member));
    }

    #[test]
    fn exponent_is_right_associative() {
        let (left, right) = operand_orders(Order::Exponentiation);
        assert!(Order::needs_parens(Order::Exponentiation, left));
        assert!(!Order::needs_parens(Order::Exponentiation, right));
        assert!(!Order::needs_parens(Order::UnarySign, right));
    }

    #[test]
    fn subtraction_brackets_only_the_right_operand() {
        let (left, right) = operand_orders(Order::Additive);
        assert!(!Order::needs_parens(Order::Additive, left));
        assert!(Order::needs_parens(Order::Additive, right));
    }
}

//! Trap codes describing the reason for a trap.

use core::fmt::{self, Display, Formatter};

/// A trap code describing the reason for a trap.
///
/// All trap instructions have an explicit trap code, and the emission stage
/// records a `MachTrap` with this code at every site that can trap, so the
/// host can populate its trap tables.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum TrapCode {
    /// The current stack space was exhausted.
    StackOverflow,

    /// A `heap_addr` instruction detected an out-of-bounds error.
    HeapOutOfBounds,

    /// An indirect call to a null table entry was executed.
    IndirectCallToNull,

    /// Signature mismatch on indirect call.
    BadSignature,

    /// An integer arithmetic operation caused an overflow.
    IntegerOverflow,

    /// An integer division by zero.
    IntegerDivisionByZero,

    /// Failed float-to-int conversion.
    BadConversionToInteger,

    /// Code that was supposed to have been unreachable was reached.
    UnreachableCodeReached,

    /// A user-defined trap code.
    User(u16),
}

impl Display for TrapCode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        use self::TrapCode::*;
        let identifier = match *self {
            StackOverflow => "stk_ovf",
            HeapOutOfBounds => "heap_oob",
            IndirectCallToNull => "icall_null",
            BadSignature => "bad_sig",
            IntegerOverflow => "int_ovf",
            IntegerDivisionByZero => "int_divz",
            BadConversionToInteger => "bad_toint",
            UnreachableCodeReached => "unreachable",
            User(x) => return write!(f, "user{x}"),
        };
        f.write_str(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODES: [TrapCode; 8] = [
        TrapCode::StackOverflow,
        TrapCode::HeapOutOfBounds,
        TrapCode::IndirectCallToNull,
        TrapCode::BadSignature,
        TrapCode::IntegerOverflow,
        TrapCode::IntegerDivisionByZero,
        TrapCode::BadConversionToInteger,
        TrapCode::UnreachableCodeReached,
    ];

    #[test]
    fn display() {
        for r in &CODES {
            let tc = *r;
            assert!(!tc.to_string().is_empty());
        }
        assert_eq!(TrapCode::IntegerDivisionByZero.to_string(), "int_divz");
        assert_eq!(TrapCode::User(17).to_string(), "user17");
    }
}

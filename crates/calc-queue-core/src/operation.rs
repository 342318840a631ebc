use crate::{TaskError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Binary arithmetic operations a worker can run.
///
/// Declaration order is the order results are reported in and the order
/// failures are looked up in when a fan-out batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    Fdiv,
}

impl OpKind {
    pub const ALL: [OpKind; 7] = [
        OpKind::Add,
        OpKind::Sub,
        OpKind::Mul,
        OpKind::Div,
        OpKind::Pow,
        OpKind::Mod,
        OpKind::Fdiv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Div => "div",
            OpKind::Pow => "pow",
            OpKind::Mod => "mod",
            OpKind::Fdiv => "fdiv",
        }
    }

    /// Compute `a <op> b` with floored division semantics for `mod` and `fdiv`.
    ///
    /// Finite operands that produce an infinite result are an `Overflow`.
    pub fn apply(self, a: f64, b: f64) -> std::result::Result<f64, ComputationError> {
        let result = match self {
            OpKind::Add => a + b,
            OpKind::Sub => a - b,
            OpKind::Mul => a * b,
            OpKind::Div => {
                self.nonzero_divisor(b)?;
                a / b
            }
            OpKind::Pow => power(a, b)?,
            OpKind::Mod => {
                self.nonzero_divisor(b)?;
                floored_mod(a, b)
            }
            OpKind::Fdiv => {
                self.nonzero_divisor(b)?;
                floor_div(a, b)
            }
        };

        if result.is_infinite() && a.is_finite() && b.is_finite() {
            return Err(ComputationError::Overflow { op: self });
        }
        Ok(result)
    }

    fn nonzero_divisor(self, b: f64) -> std::result::Result<(), ComputationError> {
        if b == 0.0 {
            Err(ComputationError::DivisionByZero { op: self })
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        OpKind::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| TaskError::UnknownOperation(s.to_string()))
    }
}

/// Deterministic failure of a single operation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationError {
    #[error("{op}: division by zero")]
    DivisionByZero { op: OpKind },

    #[error("{op}: numerical result out of range")]
    Overflow { op: OpKind },

    #[error("{op}: result is not a real number")]
    ComplexResult { op: OpKind },
}

impl ComputationError {
    pub fn operation(&self) -> OpKind {
        match self {
            ComputationError::DivisionByZero { op }
            | ComputationError::Overflow { op }
            | ComputationError::ComplexResult { op } => *op,
        }
    }

    pub fn classification(&self) -> &'static str {
        match self {
            ComputationError::DivisionByZero { .. } => "DivisionByZero",
            ComputationError::Overflow { .. } => "Overflow",
            ComputationError::ComplexResult { .. } => "ComplexResult",
        }
    }
}

/// Run one unit of work: block the current thread for `duration`, then compute.
///
/// Call this from a blocking context (`spawn_blocking` or a plain thread).
pub fn execute(
    op: OpKind,
    a: f64,
    b: f64,
    duration: Duration,
) -> std::result::Result<f64, ComputationError> {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
    op.apply(a, b)
}

fn power(a: f64, b: f64) -> std::result::Result<f64, ComputationError> {
    if a == 0.0 && b < 0.0 {
        return Err(ComputationError::DivisionByZero { op: OpKind::Pow });
    }
    let result = a.powf(b);
    if result.is_nan() && !a.is_nan() && !b.is_nan() {
        return Err(ComputationError::ComplexResult { op: OpKind::Pow });
    }
    Ok(result)
}

// Remainder takes the sign of the divisor; a zero remainder keeps it too.
fn floored_mod(a: f64, b: f64) -> f64 {
    let rem = a % b;
    if rem == 0.0 {
        0.0_f64.copysign(b)
    } else if (rem < 0.0) != (b < 0.0) {
        rem + b
    } else {
        rem
    }
}

fn floor_div(a: f64, b: f64) -> f64 {
    let rem = a % b;
    let mut div = (a - rem) / b;
    if rem != 0.0 && (b < 0.0) != (rem < 0.0) {
        div -= 1.0;
    }
    if div == 0.0 {
        return 0.0_f64.copysign(a / b);
    }
    let floored = div.floor();
    if div - floored > 0.5 {
        floored + 1.0
    } else {
        floored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_operations() {
        assert_eq!(OpKind::Add.apply(10.0, 2.0).unwrap(), 12.0);
        assert_eq!(OpKind::Sub.apply(10.0, 2.0).unwrap(), 8.0);
        assert_eq!(OpKind::Mul.apply(10.0, 2.0).unwrap(), 20.0);
        assert_eq!(OpKind::Div.apply(10.0, 2.0).unwrap(), 5.0);
        assert_eq!(OpKind::Pow.apply(10.0, 2.0).unwrap(), 100.0);
        assert_eq!(OpKind::Mod.apply(10.0, 2.0).unwrap(), 0.0);
        assert_eq!(OpKind::Fdiv.apply(10.0, 2.0).unwrap(), 5.0);
    }

    #[test]
    fn test_every_operation_reports_overflow() {
        let cases = [
            (OpKind::Add, f64::MAX, f64::MAX),
            (OpKind::Sub, -f64::MAX, f64::MAX),
            (OpKind::Mul, 1e200, 1e200),
            (OpKind::Div, 1e300, 1e-300),
            (OpKind::Pow, 10.0, 400.0),
            (OpKind::Fdiv, 1e300, 1e-300),
        ];
        for (op, a, b) in cases {
            assert_eq!(
                op.apply(a, b),
                Err(ComputationError::Overflow { op }),
                "{} should overflow",
                op
            );
        }

        // The remainder is bounded by the divisor and cannot overflow
        assert!(OpKind::Mod.apply(1e300, 1e-300).unwrap().is_finite());
    }

    #[test]
    fn test_floored_division_with_negative_operands() {
        assert_eq!(OpKind::Mod.apply(-7.0, 2.0).unwrap(), 1.0);
        assert_eq!(OpKind::Mod.apply(7.0, -2.0).unwrap(), -1.0);
        assert_eq!(OpKind::Fdiv.apply(-7.0, 2.0).unwrap(), -4.0);
        assert_eq!(OpKind::Fdiv.apply(7.0, -2.0).unwrap(), -4.0);
        assert_eq!(OpKind::Fdiv.apply(7.5, 2.0).unwrap(), 3.0);
        assert_eq!(OpKind::Fdiv.apply(1.0, 0.1).unwrap(), 9.0);
    }

    #[test]
    fn test_division_family_rejects_zero_divisor() {
        for op in [OpKind::Div, OpKind::Mod, OpKind::Fdiv] {
            assert_eq!(
                op.apply(5.0, 0.0),
                Err(ComputationError::DivisionByZero { op })
            );
        }
        assert_eq!(
            OpKind::Pow.apply(0.0, -1.0),
            Err(ComputationError::DivisionByZero { op: OpKind::Pow })
        );
        assert_eq!(OpKind::Pow.apply(5.0, 0.0).unwrap(), 1.0);
    }

    #[test]
    fn test_pow_domain_errors() {
        assert_eq!(
            OpKind::Pow.apply(-8.0, 1.0 / 3.0),
            Err(ComputationError::ComplexResult { op: OpKind::Pow })
        );
        assert_eq!(
            OpKind::Pow.apply(10.0, 400.0),
            Err(ComputationError::Overflow { op: OpKind::Pow })
        );
        assert_eq!(OpKind::Pow.apply(-2.0, 3.0).unwrap(), -8.0);
    }

    #[test]
    fn test_unknown_operation_is_rejected() {
        assert_eq!("fdiv".parse::<OpKind>().unwrap(), OpKind::Fdiv);
        assert!(matches!(
            "concat".parse::<OpKind>(),
            Err(TaskError::UnknownOperation(name)) if name == "concat"
        ));
    }

    #[test]
    fn test_error_classification() {
        let err = ComputationError::DivisionByZero { op: OpKind::Mod };
        assert_eq!(err.classification(), "DivisionByZero");
        assert_eq!(err.operation(), OpKind::Mod);
        assert_eq!(err.to_string(), "mod: division by zero");
    }

    #[test]
    fn test_execute_waits_for_duration() {
        let started = std::time::Instant::now();
        let result = execute(OpKind::Add, 1.0, 2.0, Duration::from_millis(50)).unwrap();
        assert_eq!(result, 3.0);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    proptest! {
        #[test]
        fn prop_mod_follows_divisor_sign(a in -1.0e6f64..1.0e6, b in -1.0e3f64..1.0e3) {
            prop_assume!(b != 0.0);
            let rem = OpKind::Mod.apply(a, b).unwrap();
            prop_assert!(rem == 0.0 || (rem < 0.0) == (b < 0.0));
            prop_assert!(rem.abs() <= b.abs());
        }

        #[test]
        fn prop_fdiv_and_mod_recombine(a in -1.0e6f64..1.0e6, b in -1.0e3f64..1.0e3) {
            prop_assume!(b.abs() > 1.0e-3);
            let quotient = OpKind::Fdiv.apply(a, b).unwrap();
            let rem = OpKind::Mod.apply(a, b).unwrap();
            prop_assert!((quotient * b + rem - a).abs() <= 1.0e-6 * a.abs().max(1.0));
        }
    }
}

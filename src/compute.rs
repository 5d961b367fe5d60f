use crate::error::Result;
use crate::traits::DerivedFunction;
use crate::types::Index;

/// Naive recursive Fibonacci with `f(0) = f(1) = 1`.
///
/// Exponential on purpose: this is the CPU-bound unit of work the worker exists for.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fibonacci;

impl Fibonacci {
    fn fib(n: u32) -> u64 {
        if n < 2 {
            return 1;
        }
        Self::fib(n - 1) + Self::fib(n - 2)
    }
}

impl DerivedFunction for Fibonacci {
    fn name(&self) -> &'static str {
        "fibonacci"
    }

    fn compute(&self, index: Index) -> Result<u64> {
        Ok(Self::fib(index.get()))
    }
}

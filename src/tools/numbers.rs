use async_trait::async_trait;
use serde_json::Value as J;

use crate::core::content::ToolResult;
use crate::core::schema::{Field, Schema};
use crate::core::tool::{Tool, ToolSpec};

fn numeric_input_schema() -> Schema {
    Schema::object([Field::required("input", Schema::Number)])
}

fn input_of(args: &J) -> Result<f64, String> {
    args.get("input")
        .and_then(J::as_f64)
        .ok_or_else(|| "missing 'input'".to_string())
}

/// `isOdd`: parity of a number, reported as text.
pub struct IsOddTool {
    schema: Schema,
}

impl Default for IsOddTool {
    fn default() -> Self {
        Self { schema: numeric_input_schema() }
    }
}

impl ToolSpec for IsOddTool {
    fn name(&self) -> &str {
        "isOdd"
    }
    fn description(&self) -> &str {
        "check if number is odd"
    }
    fn input_schema(&self) -> &Schema {
        &self.schema
    }
}

#[async_trait]
impl Tool for IsOddTool {
    async fn call(&self, input: J) -> Result<ToolResult, String> {
        let n = input_of(&input)?;
        tracing::info!(input = n, "isOdd executed");
        let parity = if n % 2.0 == 0.0 { "even" } else { "odd" };
        Ok(ToolResult::text(format!("The number {} is {parity}", js_number(n))))
    }
}

/// `isPrime`: primality of a number, reported as text.
pub struct IsPrimeTool {
    schema: Schema,
}

impl Default for IsPrimeTool {
    fn default() -> Self {
        Self { schema: numeric_input_schema() }
    }
}

impl ToolSpec for IsPrimeTool {
    fn name(&self) -> &str {
        "isPrime"
    }
    fn description(&self) -> &str {
        "check if number is prime"
    }
    fn input_schema(&self) -> &Schema {
        &self.schema
    }
}

#[async_trait]
impl Tool for IsPrimeTool {
    async fn call(&self, input: J) -> Result<ToolResult, String> {
        let n = input_of(&input)?;
        tracing::info!(input = n, "isPrime executed");
        let prime = tokio::task::spawn_blocking(move || is_prime(n))
            .await
            .map_err(|e| format!("primality check failed: {e}"))?;
        let verdict = if prime { "prime" } else { "not prime" };
        Ok(ToolResult::text(format!("The number {} is {verdict}", js_number(n))))
    }
}

/// Renders `n` the way JavaScript's `String(n)` does: `0` for both zeros,
/// exponent form outside `[1e-6, 1e21)`.
fn js_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs.is_finite() && (abs >= 1e21 || abs < 1e-6) {
        let exp = format!("{n:e}");
        return match exp.split_once('e') {
            Some((mantissa, e)) if !e.starts_with('-') => format!("{mantissa}e+{e}"),
            _ => exp,
        };
    }
    n.to_string()
}

/// Trial division up to floor(sqrt(n)); non-integers and values below 2 are not prime.
fn is_prime(n: f64) -> bool {
    if n.fract() != 0.0 || n < 2.0 {
        return false;
    }
    let limit = n.sqrt().floor() as u64;
    let n = n as u64;
    (2..=limit).all(|i| n % i != 0)
}

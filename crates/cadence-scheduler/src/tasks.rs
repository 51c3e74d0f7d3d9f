//! Task bodies shipped with cadence.

use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};

use crate::error::TaskError;
use crate::registry::{decode_arg, TaskContext};

pub const CALC_FIB: &str = "CalcFib";

/// fib(93) overflows u64. This only guards overflow: the naive recursion
/// already occupies a blocking thread for minutes past n = 45 or so.
const MAX_FIB_INPUT: u32 = 92;

/// Naive recursive Fibonacci. Exponential on purpose: it stands in for a
/// long-running background job.
fn fibonacci(n: u32) -> u64 {
    if n <= 1 {
        return n as u64;
    }
    fibonacci(n - 1) + fibonacci(n - 2)
}

/// `CalcFib(n)`: compute fib(n) and record the execution.
///
/// `n` may arrive as an integer or a float (JSON does not distinguish); the
/// fractional part is dropped.
pub fn calc_fib(ctx: &TaskContext, args: &[Value]) -> Result<Value, TaskError> {
    let raw: f64 = decode_arg(args, 0)?;
    if !(0.0..=f64::from(MAX_FIB_INPUT)).contains(&raw) {
        return Err(TaskError::BadArgument {
            index: 0,
            reason: format!("n must be within 0..={MAX_FIB_INPUT}, got {raw}"),
        });
    }
    let n = raw as u32;

    let clock = Instant::now();
    let mut record = ctx.store().create_execution(
        CALC_FIB,
        &json!({ "n": n }).to_string(),
        &Utc::now().to_rfc3339(),
    )?;

    let fib_n = fibonacci(n);

    record.result = Some(fib_n.to_string());
    record.duration_ms = Some(clock.elapsed().as_millis() as i64);
    ctx.store().save_execution(&record)?;

    Ok(json!(fib_n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteTaskStore, TaskStore};
    use crate::types::TaskOrigin;
    use rusqlite::Connection;
    use std::sync::Arc;

    fn ctx() -> (Arc<SqliteTaskStore>, TaskContext) {
        let store = Arc::new(SqliteTaskStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let ctx = TaskContext::new(store.clone(), TaskOrigin::OneShot);
        (store, ctx)
    }

    #[test]
    fn fibonacci_small_values() {
        let got: Vec<u64> = (0..10).map(fibonacci).collect();
        assert_eq!(got, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
    }

    #[test]
    fn calc_fib_records_execution() {
        let (store, ctx) = ctx();
        let out = calc_fib(&ctx, &[json!(10)]).unwrap();
        assert_eq!(out, json!(55));

        let (total, page) = store.list_executions(0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].name, "CalcFib");
        assert_eq!(page[0].args, r#"{"n":10}"#);
        assert_eq!(page[0].result.as_deref(), Some("55"));
        assert!(page[0].duration_ms.is_some());
    }

    #[test]
    fn calc_fib_accepts_float() {
        let (_store, ctx) = ctx();
        assert_eq!(calc_fib(&ctx, &[json!(7.9)]).unwrap(), json!(13));
    }

    #[test]
    fn calc_fib_rejects_out_of_range_and_missing() {
        let (store, ctx) = ctx();
        assert!(matches!(
            calc_fib(&ctx, &[json!(-1)]),
            Err(TaskError::BadArgument { index: 0, .. })
        ));
        assert!(matches!(
            calc_fib(&ctx, &[json!(93)]),
            Err(TaskError::BadArgument { index: 0, .. })
        ));
        assert!(matches!(calc_fib(&ctx, &[]), Err(TaskError::BadArgument { .. })));
        // Nothing recorded for rejected input.
        assert_eq!(store.list_executions(0, 10).unwrap().0, 0);
    }
}

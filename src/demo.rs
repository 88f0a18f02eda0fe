//! Built-in targets served by the `poolman` binary.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use poolman::{PoolProcess, Registry};

/// Every target the binary can run.
pub fn registry() -> Registry {
    Registry::new()
        .function("square", |x: i64| Ok::<_, String>(x * x))
        .function("scale", |(x, k): (i64, i64)| Ok::<_, String>(x * k))
        .function("invert", invert)
        .function("sleep_ms", sleep_ms)
        .function("echo_log", echo_log)
        .function("pid", |_: Value| Ok::<_, String>(std::process::id()))
        .function("exit", |code: i32| -> Result<Value, String> {
            std::process::exit(code)
        })
        .function("panic", |message: String| -> Result<Value, String> {
            panic!("{}", message)
        })
        .process::<Counter>("counter")
}

fn invert(x: f64) -> Result<f64, &'static str> {
    if x == 0.0 {
        Err("division by zero")
    } else {
        Ok(1.0 / x)
    }
}

fn sleep_ms(ms: u64) -> Result<u64, String> {
    std::thread::sleep(Duration::from_millis(ms));
    Ok(ms)
}

fn echo_log(message: String) -> Result<String, String> {
    tracing::info!(target: "demo::task", "{}", message);
    tracing::debug!(target: "demo::task::detail", len = message.len(), "echoed");
    tracing::info!(target: "other", "not forwarded: {}", message);
    Ok(message)
}

/// Counts the tasks its worker has served, in steps of the static argument.
pub struct Counter {
    count: i64,
    step: i64,
}

#[derive(Serialize)]
pub struct Counted {
    item: Value,
    count: i64,
    pid: u32,
}

impl PoolProcess for Counter {
    type Args = Option<(i64,)>;
    type Input = Value;
    type Output = Counted;
    type Error = String;

    fn init(args: Self::Args) -> Result<Self, Self::Error> {
        let step = args.map_or(1, |(step,)| step);
        if step == 0 {
            return Err("step must not be zero".into());
        }
        Ok(Self { count: 0, step })
    }

    fn run(&mut self, item: Value) -> Result<Counted, String> {
        self.count += self.step;
        Ok(Counted {
            item,
            count: self.count,
            pid: std::process::id(),
        })
    }
}

//! Self-driving optimization loops over an in-memory ledger.
//!
//! The "workflow" here is evaluated immediately: each iteration's candidate
//! is scored and fed straight back into the loop.
//!
//! Run with `RUST_LOG=debug` to see every stage transition.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;
use tw_optimizer::{FnWorkflow, OptConfig, OptTask, PredictorRegistry};
use tw_store::{Ledger, MemoryStore};
use tw_types::{Dimension, Point, Scalar, Space, TwResult};

fn passthrough(x: &Point, _args: &[Value], _kwargs: &Map<String, Value>) -> TwResult<Value> {
    Ok(json!({ "_x_opt": x }))
}

fn sum_objective(x: &Point) -> f64 {
    x.iter().filter_map(Scalar::as_f64).sum()
}

/// `A² + B²/C`, plus 30 for red and minus 20 for green.
fn mixed_objective(x: &Point) -> f64 {
    let a = x[0].as_f64().unwrap_or_default();
    let b = x[1].as_f64().unwrap_or_default();
    let c = x[2].as_f64().unwrap_or(1.0);
    let mut score = a * a + b * b / c;
    match x[3].as_label() {
        Some("red") => score += 30.0,
        Some("green") => score -= 20.0,
        _ => {}
    }
    score
}

fn drive(
    title: &str,
    config: OptConfig,
    start: Point,
    iterations: usize,
    objective: fn(&Point) -> f64,
) -> TwResult<()> {
    let ledger = Ledger::new(Arc::new(MemoryStore::new("opt_default")));
    let task = OptTask::new(
        config,
        ledger,
        &PredictorRegistry::default(),
        Arc::new(FnWorkflow::new(passthrough)),
    )?;

    let mut x = start;
    for _ in 0..iterations {
        let y = objective(&x);
        x = task.run(x, y)?.x_new;
    }

    let (best, at) = task.best()?;
    println!(
        "{title}: {} evaluations with {}, best {} at {}",
        task.ledger().count()?,
        task.predictor_name(),
        best,
        at
    );
    Ok(())
}

fn main() -> TwResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let sum_space = Space::new(vec![
        Dimension::int(1, 5)?,
        Dimension::int(1, 5)?,
        Dimension::int(1, 5)?,
    ]);
    drive(
        "sum",
        OptConfig::new(sum_space)
            .with_duplicate_check(true)
            .with_seed(1),
        Point::from([5, 5, 5]),
        30,
        sum_objective,
    )?;

    let mixed_space = Space::new(vec![
        Dimension::int(1, 100)?,
        Dimension::float(9.293, 18.2838)?,
        Dimension::float(1.0, 4.0)?,
        Dimension::categorical(vec!["red", "blue", "green"])?,
    ]);
    drive(
        "mixed",
        OptConfig::new(mixed_space)
            .with_exploration_weight(0.2)
            .with_seed(7),
        Point::new(vec![
            Scalar::Int(50),
            Scalar::Float(12.0),
            Scalar::Float(2.0),
            Scalar::from("green"),
        ]),
        60,
        mixed_objective,
    )
}

//! Click-counter demo against a headless surface.
//!
//! Stands in for a real native webview backend: evaluated scripts go to
//! stdout, wake signals loop back through a channel, and the "clicks" are
//! invoke payloads a browser-side `counter.add(1)` would produce.

use serde::Serialize;
use std::process;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use webridge::{Bridge, EvalFailed, MethodSet, Surface, Ticket};

struct HeadlessSurface {
    wake_tx: Mutex<Sender<Ticket>>,
}

impl Surface for HeadlessSurface {
    fn eval(&self, script: &str) -> Result<(), EvalFailed> {
        println!("eval> {}", script.trim_end());
        Ok(())
    }

    fn wake(&self, ticket: Ticket) {
        let tx = match self.wake_tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = tx.send(ticket);
    }

    fn step(&self, _blocking: bool) -> bool {
        false
    }
}

#[derive(Serialize)]
struct Counter {
    value: i64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        eprintln!("counter-demo fatal error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Arc::new(Bridge::new());
    let (wake_tx, wake_rx): (Sender<Ticket>, Receiver<Ticket>) = channel();
    let surface = Arc::new(HeadlessSurface {
        wake_tx: Mutex::new(wake_tx),
    });
    let window = bridge.attach(surface);

    let methods = MethodSet::new()
        .op1("Add", |c: &mut Counter, n: i64| c.value += n)?
        .op0("Reset", |c: &mut Counter| c.value = 0)?;
    let counter = bridge.bind(window, "counter", Counter { value: 0 }, methods)?;

    // Script-side clicks, as the browser would serialize them.
    for _ in 0..3 {
        bridge.deliver_invoke(window, r#"{"scope":"counter","method":"add","params":[1]}"#)?;
    }

    // A background thread may not touch the surface directly; it schedules
    // work onto the surface thread instead.
    let worker = {
        let bridge = bridge.clone();
        let counter = counter.clone();
        thread::spawn(move || {
            let counter_for_task = counter.clone();
            bridge
                .dispatch(window, move || {
                    counter_for_task.update(|c| c.value += 100);
                    if let Err(err) = counter_for_task.sync() {
                        eprintln!("background sync failed: {err}");
                    }
                })
                .map(|_| ())
        })
    };
    worker.join().expect("worker thread")?;

    // Back on the surface thread: answer the wake signals.
    for ticket in wake_rx.try_iter() {
        bridge.drain(ticket)?;
    }

    println!("final value: {}", counter.update(|c| c.value));
    bridge.detach(window)?;
    Ok(())
}

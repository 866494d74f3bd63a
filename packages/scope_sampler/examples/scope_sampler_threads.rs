//! Profiling a few worker threads with the process-wide profiler.
//!
//! Each worker splits its time between two nested scopes. When a worker ends, the console
//! reporter prints its scope tree with the share of samples each scope received.
//!
//! Run with: `cargo run --example scope_sampler_threads`

use std::thread;
use std::time::Duration;

use scope_sampler::ConsoleReporter;
use testing::spin_for;

fn main() {
    scope_sampler::init(ConsoleReporter::stdout()).expect("sampler thread should start");

    let workers = (1..=3_u32)
        .map(|worker_index| {
            thread::Builder::new()
                .name(format!("worker-{worker_index}"))
                .spawn(move || worker(worker_index))
                .expect("worker thread should start")
        })
        .collect::<Vec<_>>();

    for worker in workers {
        worker.join().expect("worker thread should not panic");
    }

    {
        let _scope = scope_sampler::scope("main_summary");
        spin_for(Duration::from_millis(20));
    }

    // The main thread never ends before the process exits, so report it explicitly.
    scope_sampler::finish_current_thread();

    scope_sampler::stop();
}

fn worker(worker_index: u32) {
    let _outer = scope_sampler::scope("outer");

    {
        let _inner = scope_sampler::scope("inner1");
        spin_for(Duration::from_millis(30));
    }

    {
        let _inner = scope_sampler::scope("inner2");
        spin_for(Duration::from_millis(30_u64.saturating_mul(u64::from(worker_index))));
    }
}

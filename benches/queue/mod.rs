pub mod store;
pub mod coordinator;

use criterion::Criterion;

pub fn register_benchmarks(c: &mut Criterion) {
    store::register_benchmarks(c);
    coordinator::register_benchmarks(c);
}

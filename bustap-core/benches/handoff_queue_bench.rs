#[macro_use]
extern crate criterion;

use std::time::SystemTime;

use bytes::Bytes;
use criterion::Criterion;

use bustap_core::queue::{HandoffQueue, QueueItem};
use bustap_core::record::Record;

fn bench_handoff_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff_queue_throughput");

    for batch in [1usize, 128, 4096] {
        group.throughput(criterion::Throughput::Elements(batch as u64));
        group.bench_function(format!("batch_{}", batch), |b| {
            let queue = HandoffQueue::new();
            let record = Record::new(SystemTime::now(), Bytes::from_static(b"l\x01\x00\x01payload"));
            b.iter(|| {
                for _ in 0..batch {
                    queue.push(record.clone()).unwrap();
                }
                for _ in 0..batch {
                    match queue.pop() {
                        QueueItem::Record(r) => criterion::black_box(r),
                        QueueItem::Stop => unreachable!(),
                    };
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_handoff_push_pop);
criterion_main!(benches);

use std::net::Ipv4Addr;

use criterion::{criterion_group, criterion_main, Criterion};

use mf_core::{FlowKey, MfCookie, Packet};
use mf_sched::{ControlLaw, MfConfig, MfQdisc, ProbeRegistry};

fn flow() -> FlowKey {
    FlowKey::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 1, 1))
}

fn bench_datapath(c: &mut Criterion) {
    let options = MfCookie::default().encode();

    for law in [ControlLaw::Proportional, ControlLaw::Xcp] {
        let qdisc = MfQdisc::init(
            MfConfig::builder().limit(64).control_law(law).build(),
            ProbeRegistry::new(),
        )
        .unwrap();

        c.bench_function(&format!("enqueue_dequeue_{law:?}"), |b| {
            b.iter(|| {
                qdisc.enqueue(Packet::tcp_segment(flow(), &options, 1400));
                criterion::black_box(qdisc.dequeue());
            })
        });
    }
}

criterion_group!(benches, bench_datapath);
criterion_main!(benches);

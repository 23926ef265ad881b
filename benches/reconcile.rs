use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dice_room::client::reconcile::{read_value, reconcile, FaceLabels};
use dice_room::core::vec3::{Quat, Vec3};
use dice_room::DiceNotation;
use dice_room::DieKind;

fn bench_notation(c: &mut Criterion) {
    c.bench_function("parse_notation", |b| {
        b.iter(|| DiceNotation::parse(black_box("4d6 + 2d20 + 1d100 + 1d10 - 3")))
    });
}

fn bench_read_out(c: &mut Criterion) {
    let orientation = Quat::from_axis_angle(Vec3::new(0.3, 0.7, 0.2), 1.1);
    for kind in [DieKind::D6, DieKind::D20] {
        let labels = FaceLabels::new(kind);
        c.bench_function(&format!("read_value_{kind}"), |b| {
            b.iter(|| read_value(black_box(&labels), black_box(orientation)))
        });
    }
}

fn bench_reconcile(c: &mut Criterion) {
    c.bench_function("reconcile_d20", |b| {
        b.iter(|| {
            let mut labels = FaceLabels::new(DieKind::D20);
            reconcile(&mut labels, black_box(3), black_box(17))
        })
    });
}

criterion_group!(benches, bench_notation, bench_read_out, bench_reconcile);
criterion_main!(benches);

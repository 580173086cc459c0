use criterion::{black_box, criterion_group, criterion_main, Criterion};

use redlilium_hlms_core::math::{Mat4, Vec3};
use redlilium_hlms_core::{BufferWriter, DescBindingKind, IdString, PropertyStore, RootLayout};

// ---------------------------------------------------------------------------
// Property store
// ---------------------------------------------------------------------------

fn bench_property_store_fill(c: &mut Criterion) {
    let keys: Vec<IdString> = (0..128).map(|i| IdString::indexed("prop", i)).collect();
    c.bench_function("property_store_set_128", |b| {
        b.iter(|| {
            let mut store = PropertyStore::new();
            for (i, key) in keys.iter().enumerate() {
                store.set(*key, i as i32);
            }
            black_box(store)
        });
    });
}

fn bench_property_store_lookup(c: &mut Criterion) {
    let keys: Vec<IdString> = (0..128).map(|i| IdString::indexed("prop", i)).collect();
    let store: PropertyStore = keys.iter().map(|k| (*k, 1)).collect();
    c.bench_function("property_store_get_128", |b| {
        b.iter(|| keys.iter().map(|k| store.get(black_box(*k))).sum::<i32>());
    });
}

// ---------------------------------------------------------------------------
// Root layout
// ---------------------------------------------------------------------------

fn bench_root_layout_validate(c: &mut Criterion) {
    let mut layout = RootLayout::new();
    layout.set_range(0, DescBindingKind::ConstBuffer, 0, 7);
    layout.set_range(0, DescBindingKind::TexBuffer, 0, 1);
    layout.set_range(0, DescBindingKind::Texture, 1, 12);
    layout.set_range(0, DescBindingKind::Sampler, 1, 12);
    layout.set_range(1, DescBindingKind::Texture, 12, 20);
    layout.set_range(1, DescBindingKind::Sampler, 12, 20);
    c.bench_function("root_layout_validate", |b| {
        b.iter(|| black_box(&layout).validate("bench"));
    });
}

// ---------------------------------------------------------------------------
// Buffer writer
// ---------------------------------------------------------------------------

fn bench_buffer_writer_matrices(c: &mut Criterion) {
    let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
    let mut storage = vec![0u8; 64 * 256];
    c.bench_function("buffer_writer_256_matrices", |b| {
        b.iter(|| {
            let mut writer = BufferWriter::new(&mut storage);
            for _ in 0..256 {
                writer.write_mat4(black_box(&m));
            }
            black_box(writer.bytes_written())
        });
    });
}

criterion_group!(
    benches,
    bench_property_store_fill,
    bench_property_store_lookup,
    bench_root_layout_validate,
    bench_buffer_writer_matrices,
);
criterion_main!(benches);

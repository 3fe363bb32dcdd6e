//! Compares the wgpu passes against the CPU backend.  Needs a GPU adapter,
//! so it only runs with `cargo test -- --ignored`.

use glam::{IVec2, Vec2};
use normalmaker::arrows::NormalArrows;
use normalmaker::camera::Camera;
use normalmaker::debug_lines::DebugLines;
use normalmaker::gpu::{CpuBackend, GpuBackend};
use normalmaker::layers::LayerStore;

fn exercise(store: &mut LayerStore) -> (Vec<u8>, Vec<u8>) {
    let base: Vec<u8> = (0..32 * 24 * 4).map(|i| (i * 7 % 251) as u8).collect();
    store.add_from_rgba(32, 24, &base, false).unwrap();
    let normal = store.add_blank(32, 24).unwrap();
    store.layer_mut(normal).unwrap().position = IVec2::new(3, -2);
    store.layer_mut(normal).unwrap().alpha = 0.6;

    store
        .paint(normal, (32, 24), IVec2::new(12, 10), 7, [0.5, 0.5, 0.5, 1.0])
        .unwrap();
    store
        .paint(normal, (32, 24), IVec2::new(14, 10), 2, [0.0; 4])
        .unwrap();

    let mut arrows = NormalArrows::new();
    arrows.push(Vec2::new(8.0, 8.0)).unwrap();
    arrows.set_orientation_degrees(0, 30.0);
    arrows.set_angle_degrees(0, 40.0);
    arrows.push(Vec2::new(20.0, 12.0)).unwrap();
    arrows.set_angle_degrees(1, 70.0);
    store.generate_normals(normal, &arrows).unwrap();

    (
        store.read_layer_pixels(normal).unwrap().unwrap(),
        store.combine((32, 24)).unwrap(),
    )
}

fn max_diff(a: &[u8], b: &[u8]) -> u8 {
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
}

#[test]
#[ignore = "needs a GPU adapter"]
fn gpu_matches_cpu() {
    let gpu = match GpuBackend::new("") {
        Ok(gpu) => gpu,
        Err(e) => panic!("no usable adapter: {e}"),
    };
    let mut gpu_store = LayerStore::new(Box::new(gpu));
    let mut cpu_store = LayerStore::new(Box::new(CpuBackend::new()));

    let (gpu_layer, gpu_flat) = exercise(&mut gpu_store);
    let (cpu_layer, cpu_flat) = exercise(&mut cpu_store);

    assert_eq!(gpu_layer.len(), cpu_layer.len());
    // Float evaluation order differs slightly between shader and host.
    assert!(max_diff(&gpu_layer, &cpu_layer) <= 1);
    assert!(max_diff(&gpu_flat, &cpu_flat) <= 1);
}

#[test]
#[ignore = "needs a GPU adapter"]
fn huge_dab_then_render_on_gpu() {
    let gpu = match GpuBackend::new("") {
        Ok(gpu) => gpu,
        Err(e) => panic!("no usable adapter: {e}"),
    };
    let mut store = LayerStore::new(Box::new(gpu));
    store.add_from_rgba(16, 16, &[9; 16 * 16 * 4], false).unwrap();

    assert!(store.paint(0, (16, 16), IVec2::new(3, 3), 50_000, [1.0, 0.0, 0.0, 1.0]).unwrap());
    let red: Vec<u8> = [255, 0, 0, 255].repeat(16 * 16);
    assert_eq!(store.read_layer_pixels(0).unwrap().unwrap(), red);

    // The first frame after a write rebuilds the mip chain.
    let mut camera = Camera::new(Vec2::new(8.0, 8.0), 10.0);
    camera.resize(64, 64);
    let mut lines = [DebugLines::new(1.0)];
    let frame = store
        .render((64, 64), &camera, [0.0; 4], &mut lines)
        .unwrap()
        .unwrap();
    assert_eq!(frame.pixels.len(), 64 * 64 * 4);
    let center = (32 * 64 + 32) * 4;
    assert_eq!(&frame.pixels[center..center + 4], &[255, 0, 0, 255]);
}

use std::path::PathBuf;

use glam::{IVec2, Vec2};
use image::{Rgba, RgbaImage};
use normalmaker::arrows::NormalArrows;
use normalmaker::gpu::CpuBackend;
use normalmaker::layers::{ERASE_COLOR, LayerStore};

fn store() -> LayerStore {
    LayerStore::new(Box::new(CpuBackend::new()))
}

fn temp_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("normalmaker-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

/// Deterministic non-uniform test image.
fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 2) as u8, (y * 2) as u8, 77, 255]))
}

fn pixel(buf: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
}

#[test]
fn paint_example_on_imported_image() {
    let path = temp_file("import-100.png");
    gradient(100, 100).save(&path).unwrap();

    let mut s = store();
    assert!(s.add_from_image(&path).unwrap(), "first import fixes canvas size");
    assert_eq!(s.layer(0).unwrap().size(), (100, 100));

    assert!(s
        .paint(0, (100, 100), IVec2::new(50, 50), 5, [1.0, 0.0, 0.0, 1.0])
        .unwrap());
    let px = s.read_layer_pixels(0).unwrap().unwrap();
    assert_eq!(pixel(&px, 100, 50, 50), [255, 0, 0, 255]);
    assert_eq!(pixel(&px, 100, 50, 60), [100, 120, 77, 255]);
}

#[test]
fn second_import_does_not_fix_canvas() {
    let path = temp_file("import-small.png");
    gradient(8, 4).save(&path).unwrap();
    let mut s = store();
    assert!(s.add_from_image(&path).unwrap());
    assert!(!s.add_from_image(&path).unwrap());
    assert_eq!(s.len(), 2);
}

#[test]
fn failed_import_leaves_store_untouched() {
    let path = temp_file("not-an-image.png");
    std::fs::write(&path, b"definitely not a png").unwrap();
    let mut s = store();
    s.add_blank(4, 4).unwrap();
    assert!(s.add_from_image(&path).is_err());
    assert_eq!(s.len(), 1);
}

#[test]
fn paint_respects_radius_boundary() {
    let mut s = store();
    s.add_blank(21, 21).unwrap();
    let r = 6;
    s.paint(0, (21, 21), IVec2::new(10, 10), r, [0.0, 1.0, 0.0, 1.0])
        .unwrap();
    let px = s.read_layer_pixels(0).unwrap().unwrap();
    for y in 0..21 {
        for x in 0..21 {
            let d2 = (x as i32 - 10).pow(2) + (y as i32 - 10).pow(2);
            let expected = if d2 <= r * r { [0, 255, 0, 255] } else { [0, 0, 0, 0] };
            assert_eq!(pixel(&px, 21, x, y), expected, "texel ({x}, {y})");
        }
    }
}

#[test]
fn paint_honours_layer_position() {
    let mut s = store();
    s.add_blank(10, 10).unwrap();
    s.layer_mut(0).unwrap().position = IVec2::new(5, 5);
    s.paint(0, (20, 20), IVec2::new(5, 5), 0, [1.0; 4]).unwrap();
    let px = s.read_layer_pixels(0).unwrap().unwrap();
    assert_eq!(pixel(&px, 10, 0, 0), [255; 4]);
    assert_eq!(pixel(&px, 10, 1, 0), [0; 4]);
}

#[test]
fn erase_then_paint_restores() {
    let mut s = store();
    s.add_from_rgba(16, 16, &[40, 80, 120, 255].repeat(256), false)
        .unwrap();
    let before = s.read_layer_pixels(0).unwrap().unwrap();
    let color = [40.0 / 255.0, 80.0 / 255.0, 120.0 / 255.0, 1.0];

    s.paint(0, (16, 16), IVec2::new(7, 8), 4, ERASE_COLOR).unwrap();
    let erased = s.read_layer_pixels(0).unwrap().unwrap();
    assert_eq!(pixel(&erased, 16, 7, 8), [0, 0, 0, 0]);

    s.paint(0, (16, 16), IVec2::new(7, 8), 4, color).unwrap();
    assert_eq!(s.read_layer_pixels(0).unwrap().unwrap(), before);
}

#[test]
fn combine_of_nothing_is_transparent() {
    let mut s = store();
    let out = s.combine((7, 3)).unwrap();
    assert_eq!(out.len(), 7 * 3 * 4);
    assert!(out.iter().all(|&b| b == 0));
}

#[test]
fn combine_of_one_opaque_layer_is_identity() {
    let mut s = store();
    let img = gradient(12, 9);
    s.add_from_rgba(12, 9, img.as_raw(), false).unwrap();
    assert_eq!(s.combine((12, 9)).unwrap(), img.into_raw());
}

#[test]
fn combine_clips_offset_layers() {
    let mut s = store();
    s.add_from_rgba(4, 4, &[255, 0, 0, 255].repeat(16), false).unwrap();
    s.add_from_rgba(4, 4, &[0, 0, 255, 255].repeat(16), false).unwrap();
    s.layer_mut(1).unwrap().position = IVec2::new(2, -2);

    let out = s.combine((4, 4)).unwrap();
    assert_eq!(pixel(&out, 4, 0, 0), [255, 0, 0, 255]);
    assert_eq!(pixel(&out, 4, 3, 1), [0, 0, 255, 255]);
    assert_eq!(pixel(&out, 4, 3, 2), [255, 0, 0, 255]);
}

#[test]
fn combine_applies_layer_alpha() {
    let mut s = store();
    s.add_from_rgba(1, 1, &[0, 0, 0, 255], false).unwrap();
    s.add_from_rgba(1, 1, &[255, 255, 255, 255], false).unwrap();
    s.layer_mut(1).unwrap().alpha = 0.5;
    let out = s.combine((1, 1)).unwrap();
    assert_eq!(out[3], 255);
    assert!((127..=128).contains(&out[0]), "got {}", out[0]);
}

#[test]
fn normals_only_touch_painted_texels() {
    let mut s = store();
    s.add_blank(8, 8).unwrap();
    s.paint(0, (8, 8), IVec2::new(2, 2), 1, [0.5, 0.5, 0.5, 1.0]).unwrap();

    let mut arrows = NormalArrows::new();
    arrows.push(Vec2::new(2.0, 2.0)).unwrap();
    arrows.set_orientation_degrees(0, 0.0);
    arrows.set_angle_degrees(0, 45.0);
    assert!(s.generate_normals(0, &arrows).unwrap());

    let px = s.read_layer_pixels(0).unwrap().unwrap();
    assert_eq!(pixel(&px, 8, 7, 7), [0, 0, 0, 0]);
    let n = pixel(&px, 8, 2, 2);
    assert_eq!(n[3], 255);
    assert!(n[0] > 200, "tilted towards +x: {n:?}");
    assert!((126..=128).contains(&n[1]), "no y tilt: {n:?}");
}

#[test]
fn flat_normals_without_arrows() {
    let mut s = store();
    s.add_from_rgba(2, 1, &[1, 1, 1, 255, 0, 0, 0, 0], true).unwrap();
    s.generate_normals(0, &NormalArrows::new()).unwrap();
    let px = s.read_layer_pixels(0).unwrap().unwrap();
    assert_eq!(&px[..4], &[127, 127, 255, 255]);
    assert_eq!(&px[4..], &[0, 0, 0, 0]);
}

#[test]
fn removing_the_paint_target_then_painting_another_layer() {
    let mut s = store();
    s.add_blank(4, 4).unwrap();
    s.add_blank(4, 4).unwrap();
    s.paint(0, (4, 4), IVec2::new(1, 1), 1, [1.0; 4]).unwrap();
    s.remove_at(0);
    assert!(s.paint(0, (4, 4), IVec2::new(1, 1), 1, [1.0; 4]).unwrap());
}

#[test]
fn export_writes_a_decodable_png() {
    let mut s = store();
    let img = gradient(6, 5);
    s.add_from_rgba(6, 5, img.as_raw(), false).unwrap();
    let path = temp_file("export.png");
    s.export_png(&path, (6, 5)).unwrap();
    let back = image::open(&path).unwrap().to_rgba8();
    assert_eq!(back, img);
}

#[test]
fn serialize_round_trip_is_byte_identical() {
    let mut s = store();
    s.add_from_rgba(5, 3, gradient(5, 3).as_raw(), false).unwrap();
    s.add_blank(5, 3).unwrap();
    {
        let l = s.layer_mut(1).unwrap();
        l.name = "normals".into();
        l.position = IVec2::new(-2, 4);
        l.alpha = 0.25;
        l.z_offset = -3.5;
    }
    s.paint(1, (5, 3), IVec2::new(0, 0), 2, [0.5, 0.5, 0.5, 1.0]).unwrap();

    let mut first = Vec::new();
    s.serialize(&mut first).unwrap();

    let mut restored = store();
    restored.deserialize(&mut first.as_slice()).unwrap();
    let mut second = Vec::new();
    restored.serialize(&mut second).unwrap();
    assert_eq!(first, second);

    let l = restored.layer(1).unwrap();
    assert_eq!(l.name, "normals");
    assert_eq!(l.position, IVec2::new(-2, 4));
    assert_eq!(l.alpha, 0.25);
    assert_eq!(l.z_offset, -3.5);
    assert!(l.is_normal);
    assert_eq!(
        restored.read_layer_pixels(0).unwrap().unwrap(),
        gradient(5, 3).into_raw()
    );
}

#[test]
fn viewport_render_draws_layers() {
    let mut s = store();
    s.add_from_rgba(4, 4, &[255, 0, 0, 255].repeat(16), false).unwrap();
    let mut camera = normalmaker::camera::Camera::new(Vec2::new(2.0, 2.0), 2.0);
    camera.resize(8, 8);
    let frame = s.render((8, 8), &camera, [0.0, 0.0, 0.0, 1.0], &mut []).unwrap().unwrap();
    assert_eq!((frame.width, frame.height), (8, 8));
    assert_eq!(pixel(&frame.pixels, 8, 4, 4), [255, 0, 0, 255]);
    assert!(s.render((0, 8), &camera, [0.0; 4], &mut []).unwrap().is_none());
}

#[test]
fn deserialize_rejects_layers_placed_out_of_reach() {
    let mut s = store();
    s.add_from_rgba(4, 4, &[40, 50, 60, 255].repeat(16), false).unwrap();
    let mut bytes = Vec::new();
    s.serialize(&mut bytes).unwrap();
    // Layer count, then the first layer's position.x.
    bytes[4..8].copy_from_slice(&i32::MIN.to_le_bytes());

    let mut target = store();
    target.add_blank(4, 4).unwrap();
    let err = target.deserialize(&mut bytes.as_slice()).unwrap_err();
    assert!(matches!(err, normalmaker::Error::InvalidProject(_)), "{err}");
    assert_eq!(target.len(), 1);
    assert_eq!(target.combine((4, 4)).unwrap(), vec![0; 4 * 4 * 4]);
}

use std::path::PathBuf;

use glam::Vec2;
use normalmaker::error::Error;
use normalmaker::gpu::CpuBackend;
use normalmaker::settings::Settings;
use normalmaker::Editor;

fn editor() -> Editor {
    Editor::new(Box::new(CpuBackend::new()), &Settings::default())
}

fn temp_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("normalmaker-proj-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn seeded_editor() -> Editor {
    let img_path = temp_file("seed.png");
    image::RgbaImage::from_fn(12, 10, |x, y| image::Rgba([x as u8 * 20, y as u8 * 20, 9, 255]))
        .save(&img_path)
        .unwrap();

    let mut e = editor();
    e.import_image(&img_path).unwrap();
    assert_eq!(e.canvas(), Some((12, 10)));
    let layer = e.new_layer().unwrap().unwrap();
    assert!(e.select_layer(layer));
    e.brush.normal = true;
    e.brush.radius = 3;
    e.paint_at(Vec2::new(6.0, 5.0)).unwrap();

    e.begin_arrow(Vec2::new(3.0, 3.0)).unwrap();
    e.drag_arrow(Vec2::new(9.0, 3.0));
    e.end_arrow();
    e.set_arrow_angle(0, 30.0);
    e.begin_arrow(Vec2::new(8.0, 8.0)).unwrap();
    e.end_arrow();
    e.calculate_normals().unwrap();
    e
}

#[test]
fn save_open_save_is_byte_identical() {
    let mut e = seeded_editor();
    let first = temp_file("first.nm");
    e.save_project(&first).unwrap();
    assert!(!e.project.is_dirty);

    let mut reopened = editor();
    reopened.open_project(&first).unwrap();
    assert_eq!(reopened.canvas(), Some((12, 10)));
    assert_eq!(reopened.store.len(), 2);
    assert_eq!(reopened.arrows.len(), 2);
    assert_eq!(reopened.arrows.as_slice(), e.arrows.as_slice());

    let second = temp_file("second.nm");
    reopened.save_project(&second).unwrap();
    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
}

#[test]
fn failed_open_keeps_current_project() {
    let mut e = seeded_editor();
    let bad = temp_file("bad.nm");
    std::fs::write(&bad, [1, 0, 0, 0, 1, 0]).unwrap();

    let err = e.open_project(&bad).unwrap_err();
    assert!(matches!(err, Error::InvalidProject(_)));
    assert_eq!(e.store.len(), 2);
    assert_eq!(e.arrows.len(), 2);
    assert_eq!(e.canvas(), Some((12, 10)));
}

#[test]
fn new_project_resets_everything() {
    let mut e = seeded_editor();
    e.new_project();
    assert!(e.store.is_empty());
    assert!(e.arrows.is_empty());
    assert_eq!(e.canvas(), None);
    assert_eq!(e.selected_layer(), None);
    assert!(!e.can_add_layer());
}

#[test]
fn export_matches_combine() {
    let mut e = seeded_editor();
    let path = temp_file("flat.png");
    e.export_png(&path).unwrap();
    let png = image::open(&path).unwrap().to_rgba8();
    assert_eq!(png.dimensions(), (12, 10));
    assert_eq!(png.into_raw(), e.store.combine((12, 10)).unwrap());
}

#[test]
fn arrow_capacity_is_an_error() {
    let mut e = editor();
    for i in 0..normalmaker::arrows::MAX_ARROWS {
        e.begin_arrow(Vec2::new(i as f32, 0.0)).unwrap();
        e.end_arrow();
    }
    assert!(matches!(
        e.begin_arrow(Vec2::ZERO),
        Err(Error::ArrowCapacity { .. })
    ));
}

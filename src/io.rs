// ============================================================================
// I/O — project file format, image import / PNG export, file dialogs
// ============================================================================

use std::f32::consts::FRAC_PI_2;
use std::io::{Read, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use glam::{IVec2, Vec2};
use image::RgbaImage;
use rfd::FileDialog;

use crate::arrows::{NormalArrow, MAX_ARROWS};
use crate::error::{Error, Result};

pub const PROJECT_EXTENSION: &str = "nm";

/// Maximum supported canvas dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted project files.
pub const MAX_CANVAS_DIM: u32 = 32_768;
/// Layers may sit at most this far from the canvas origin on either axis.
pub const MAX_LAYER_OFFSET: i32 = MAX_CANVAS_DIM as i32;
/// Maximum number of layers in a project file.
const MAX_LAYERS: usize = 256;
/// Longest layer name accepted from a project file, in bytes.
const MAX_NAME_LEN: usize = 4096;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tga"];

/// Host-side copy of one layer: metadata plus tight RGBA8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerData {
    pub name: String,
    pub position: IVec2,
    pub z_offset: f32,
    pub alpha: f32,
    pub is_normal: bool,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A fully parsed project, nothing uploaded yet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectData {
    /// `(0, 0)` until an image fixes the canvas.
    pub canvas: (u32, u32),
    pub arrows: Vec<NormalArrow>,
    pub layers: Vec<LayerData>,
}

// ============================================================================
// PROJECT FILE FORMAT (little-endian)
// ============================================================================
//
//   i32 canvas_w, i32 canvas_h
//   i32 arrow_count, arrow_count × { f32 start.xy, f32 end.xy, f32 angle, 3 × f32 pad }
//   u32 layer_count, layer_count × {
//       i32 pos.x, i32 pos.y, f32 z_off,
//       u32 name_len, name bytes (UTF-8),
//       f32 alpha, u8 is_normal,
//       i32 png_len, png bytes
//   }
// ============================================================================

pub fn write_project<W: Write>(out: &mut W, project: &ProjectData) -> Result<()> {
    out.write_all(&(project.canvas.0 as i32).to_le_bytes())?;
    out.write_all(&(project.canvas.1 as i32).to_le_bytes())?;

    out.write_all(&(project.arrows.len() as i32).to_le_bytes())?;
    for arrow in &project.arrows {
        for v in [
            arrow.start.x,
            arrow.start.y,
            arrow.end.x,
            arrow.end.y,
            arrow.angle,
            0.0,
            0.0,
            0.0,
        ] {
            out.write_all(&v.to_le_bytes())?;
        }
    }

    write_layers(out, &project.layers)
}

/// Layer section only: count, then each layer's metadata and PNG blob.
pub fn write_layers<W: Write>(out: &mut W, layers: &[LayerData]) -> Result<()> {
    out.write_all(&(layers.len() as u32).to_le_bytes())?;
    for layer in layers {
        out.write_all(&layer.position.x.to_le_bytes())?;
        out.write_all(&layer.position.y.to_le_bytes())?;
        out.write_all(&layer.z_offset.to_le_bytes())?;
        out.write_all(&(layer.name.len() as u32).to_le_bytes())?;
        out.write_all(layer.name.as_bytes())?;
        out.write_all(&layer.alpha.to_le_bytes())?;
        out.write_all(&[layer.is_normal as u8])?;

        let png = encode_png(layer.width, layer.height, &layer.pixels)?;
        out.write_all(&(png.len() as i32).to_le_bytes())?;
        out.write_all(&png)?;
    }
    Ok(())
}

pub fn read_project<R: Read>(input: &mut R) -> Result<ProjectData> {
    let mut r = FieldReader { inner: input };

    let w = r.i32("canvas width")?;
    let h = r.i32("canvas height")?;
    let canvas = (
        checked_dim(w, "canvas width")?,
        checked_dim(h, "canvas height")?,
    );

    let count = r.i32("arrow count")?;
    if count < 0 || count as usize > MAX_ARROWS {
        return Err(Error::InvalidProject(format!(
            "arrow count {count} outside 0..={MAX_ARROWS}"
        )));
    }
    let mut arrows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut f = [0f32; 4];
        for v in &mut f {
            *v = r.finite_f32("arrow endpoint")?;
        }
        let angle = r.f32_in(0.0..=FRAC_PI_2, "arrow angle")?;
        for _ in 0..3 {
            r.f32("arrow record")?;
        }
        arrows.push(NormalArrow::new(
            Vec2::new(f[0], f[1]),
            Vec2::new(f[2], f[3]),
            angle,
        ));
    }

    let layers = read_layers_from(&mut r)?;
    Ok(ProjectData {
        canvas,
        arrows,
        layers,
    })
}

/// Layer section only, as written by [`write_layers`].
pub fn read_layers<R: Read>(input: &mut R) -> Result<Vec<LayerData>> {
    read_layers_from(&mut FieldReader { inner: input })
}

fn read_layers_from<R: Read>(r: &mut FieldReader<'_, R>) -> Result<Vec<LayerData>> {
    let count = r.u32("layer count")? as usize;
    if count > MAX_LAYERS {
        return Err(Error::InvalidProject(format!(
            "{count} layers exceeds the maximum of {MAX_LAYERS}"
        )));
    }

    let mut layers = Vec::with_capacity(count);
    for i in 0..count {
        let position = IVec2::new(r.offset("layer position")?, r.offset("layer position")?);
        let z_offset = r.finite_f32("layer z offset")?;

        let name_len = r.u32("layer name length")? as usize;
        if name_len > MAX_NAME_LEN {
            return Err(Error::InvalidProject(format!(
                "layer {i} name is {name_len} bytes"
            )));
        }
        let name = String::from_utf8(r.bytes(name_len, "layer name")?)
            .map_err(|_| Error::InvalidProject(format!("layer {i} name is not UTF-8")))?;

        let alpha = r.f32_in(0.0..=1.0, "layer alpha")?;
        let is_normal = r.u8("layer normal flag")? != 0;

        let png_len = r.i32("layer image length")?;
        if png_len < 0 {
            return Err(Error::InvalidProject(format!(
                "layer {i} image length {png_len} is negative"
            )));
        }
        let png = r.bytes(png_len as usize, "layer image")?;
        let image = decode_png(&png)
            .map_err(|e| Error::InvalidProject(format!("layer {i} ('{name}'): {e}")))?;

        layers.push(LayerData {
            name,
            position,
            z_offset,
            alpha,
            is_normal,
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        });
    }
    Ok(layers)
}

fn checked_dim(v: i32, what: &str) -> Result<u32> {
    if v < 0 || v as u32 > MAX_CANVAS_DIM {
        return Err(Error::InvalidProject(format!(
            "{what} {v} outside 0..={MAX_CANVAS_DIM}"
        )));
    }
    Ok(v as u32)
}

/// Little-endian field reader that names the field on truncation.
struct FieldReader<'a, R: Read> {
    inner: &'a mut R,
}

impl<R: Read> FieldReader<'_, R> {
    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf).map_err(|e| truncated(e, what))?;
        Ok(buf)
    }

    fn i32(&mut self, what: &str) -> Result<i32> {
        self.array(what).map(i32::from_le_bytes)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn f32(&mut self, what: &str) -> Result<f32> {
        self.array(what).map(f32::from_le_bytes)
    }

    fn finite_f32(&mut self, what: &str) -> Result<f32> {
        let v = self.f32(what)?;
        if !v.is_finite() {
            return Err(Error::InvalidProject(format!("{what} {v} is not finite")));
        }
        Ok(v)
    }

    /// NaN never lies in `range`.
    fn f32_in(&mut self, range: RangeInclusive<f32>, what: &str) -> Result<f32> {
        let v = self.f32(what)?;
        if !range.contains(&v) {
            return Err(Error::InvalidProject(format!(
                "{what} {v} outside {}..={}",
                range.start(),
                range.end()
            )));
        }
        Ok(v)
    }

    fn offset(&mut self, what: &str) -> Result<i32> {
        let v = self.i32(what)?;
        if v.unsigned_abs() > MAX_LAYER_OFFSET as u32 {
            return Err(Error::InvalidProject(format!(
                "{what} {v} outside ±{MAX_LAYER_OFFSET}"
            )));
        }
        Ok(v)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        self.array::<1>(what).map(|b| b[0])
    }

    /// Reads without trusting `len` for the allocation.
    fn bytes(&mut self, len: usize, what: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner
            .by_ref()
            .take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| truncated(e, what))?;
        if buf.len() != len {
            return Err(Error::InvalidProject(format!("truncated {what}")));
        }
        Ok(buf)
    }
}

fn truncated(e: std::io::Error, what: &str) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::InvalidProject(format!("truncated {what}"))
    } else {
        Error::Io(e)
    }
}

pub fn save_project_file(path: &Path, project: &ProjectData) -> Result<()> {
    let mut buf = Vec::new();
    write_project(&mut buf, project)?;
    std::fs::write(path, buf)?;
    Ok(())
}

pub fn load_project_file(path: &Path) -> Result<ProjectData> {
    let raw = std::fs::read(path)?;
    read_project(&mut raw.as_slice())
}

// ============================================================================
// IMAGES
// ============================================================================

/// Decode any supported raster file to RGBA8.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let decode_err = |reason: String| Error::Decode {
        path: path.to_path_buf(),
        reason,
    };
    let image = image::open(path).map_err(|e| decode_err(e.to_string()))?;
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 || w > MAX_CANVAS_DIM || h > MAX_CANVAS_DIM {
        return Err(decode_err(format!(
            "size {w}x{h} outside 1..={MAX_CANVAS_DIM} per axis"
        )));
    }
    Ok(image.to_rgba8())
}

/// Encode tight RGBA8 rows as an 8-bit RGBA PNG.
pub fn encode_png(width: u32, height: u32, pixels: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| Error::Encode(e.to_string()))?;
        writer
            .write_image_data(pixels)
            .map_err(|e| Error::Encode(e.to_string()))?;
        writer.finish().map_err(|e| Error::Encode(e.to_string()))?;
    }
    Ok(out)
}

pub fn decode_png(bytes: &[u8]) -> std::result::Result<RgbaImage, String> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    if image.width() > MAX_CANVAS_DIM || image.height() > MAX_CANVAS_DIM {
        return Err(format!(
            "image {}x{} exceeds {MAX_CANVAS_DIM} per axis",
            image.width(),
            image.height()
        ));
    }
    Ok(image.to_rgba8())
}

pub fn save_png(path: &Path, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
    let png = encode_png(width, height, pixels)?;
    std::fs::write(path, png)?;
    Ok(())
}

// ============================================================================
// NATIVE FILE DIALOGS
// ============================================================================

pub fn pick_image_to_import() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("All Files", &["*"])
        .pick_file()
}

pub fn pick_project_to_open() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("NormalMaker Project", &[PROJECT_EXTENSION])
        .pick_file()
}

pub fn pick_project_to_save(current: Option<&Path>) -> Option<PathBuf> {
    let mut dialog = FileDialog::new().add_filter("NormalMaker Project", &[PROJECT_EXTENSION]);
    if let Some(name) = current.and_then(|p| p.file_name()) {
        dialog = dialog.set_file_name(name.to_string_lossy());
    }
    dialog.save_file().map(|p| with_extension(p, PROJECT_EXTENSION))
}

pub fn pick_png_to_export() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("PNG", &["png"])
        .set_file_name("combined.png")
        .save_file()
        .map(|p| with_extension(p, "png"))
}

fn with_extension(path: PathBuf, ext: &str) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(ext)
    }
}

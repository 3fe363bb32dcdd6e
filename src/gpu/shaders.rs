// ============================================================================
// WGSL SHADERS — all GPU programs as inline strings
// ============================================================================
//
// Layout conventions:
//   * every compute pass runs 16×16 workgroups
//   * textures are rgba8unorm, straight (non-premultiplied) alpha
//   * canvas space is pixels, y down; the camera matrix flips it for clip space
// ============================================================================

// ============================================================================
// VIEWPORT RENDERING
// ============================================================================

/// One textured quad per layer.  Placement, depth and opacity arrive as
/// instance attributes; the per-layer bind group carries the shared camera
/// uniform and the layer texture.
pub const LAYER_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var layer_tex: texture_2d<f32>;
@group(0) @binding(2) var layer_sampler: sampler;

struct LayerInstance {
    @location(0) position: vec2<f32>,
    @location(1) size: vec2<f32>,
    @location(2) depth: f32,
    @location(3) alpha: f32,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) alpha: f32,
};

@vertex
fn vs_layer(@builtin(vertex_index) vi: u32, inst: LayerInstance) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let uv = corners[vi];
    let world = inst.position + uv * inst.size;

    var out: VertexOutput;
    out.clip_position = camera.view_proj * vec4<f32>(world, 0.0, 1.0);
    out.clip_position.z = inst.depth;
    out.uv = uv;
    out.alpha = inst.alpha;
    return out;
}

@fragment
fn fs_layer(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(layer_tex, layer_sampler, in.uv);
    if (color.a == 0.0) {
        discard;
    }
    return vec4<f32>(color.rgb, color.a * clamp(in.alpha, 0.0, 1.0));
}
"#;

/// Grid and arrow glyphs, drawn as a line list over the layers.
pub const LINE_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
};

struct LineParams {
    alpha: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var<uniform> params: LineParams;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_line(@location(0) position: vec2<f32>, @location(1) color: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = camera.view_proj * vec4<f32>(position, 0.0, 1.0);
    out.clip_position.z = 0.0;
    out.color = color;
    return out;
}

@fragment
fn fs_line(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, params.alpha);
}
"#;

// ============================================================================
// LAYER COMPUTE PASSES
// ============================================================================

/// Brush dab: overwrite every texel inside the disc with the brush color.
/// Only the dab's bounding box is dispatched; `origin`/`extent` place it.
pub const PAINT_SHADER: &str = r#"
struct PaintParams {
    color:  vec4<f32>,
    center: vec2<i32>,
    origin: vec2<u32>,
    extent: vec2<u32>,
    radius: i32,
    _pad:   u32,
};

@group(0) @binding(0) var target_tex: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(1) var<uniform> params: PaintParams;

@compute @workgroup_size(16, 16)
fn cs_paint(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.extent.x || gid.y >= params.extent.y) {
        return;
    }
    let texel = params.origin + gid.xy;
    let d = vec2<u32>(abs(vec2<i32>(texel) - params.center));
    let r = u32(params.radius);
    if (d.x * d.x + d.y * d.y > r * r) {
        return;
    }
    textureStore(target_tex, texel, params.color);
}
"#;

/// Normal generation from the arrow list.
///
/// Each arrow tilts the surface towards its direction by its inclination and
/// is weighted by `1 / (1 + distance²)` from its start.  Only texels with
/// non-zero alpha in `source_tex` (a copy of the target) are written.
pub const NORMAL_SHADER: &str = r#"
const MAX_ARROWS: u32 = 256u;

struct Arrow {
    start: vec2<f32>,
    end:   vec2<f32>,
    angle: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

struct ArrowBlock {
    arrows: array<Arrow, MAX_ARROWS>,
    count:  u32,
    _pad0:  u32,
    _pad1:  u32,
    _pad2:  u32,
};

struct NormalParams {
    layer_position: vec2<i32>,
    size:           vec2<u32>,
};

@group(0) @binding(0) var source_tex: texture_2d<f32>;
@group(0) @binding(1) var target_tex: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<uniform> block: ArrowBlock;
@group(0) @binding(3) var<uniform> params: NormalParams;

@compute @workgroup_size(16, 16)
fn cs_normals(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.size.x || gid.y >= params.size.y) {
        return;
    }
    let src = textureLoad(source_tex, vec2<i32>(gid.xy), 0);
    if (src.a == 0.0) {
        return;
    }

    let p = vec2<f32>(params.layer_position) + vec2<f32>(gid.xy) + vec2<f32>(0.5, 0.5);
    var sum = vec3<f32>(0.0, 0.0, 0.0);
    let count = min(block.count, MAX_ARROWS);
    for (var i = 0u; i < count; i = i + 1u) {
        let arrow = block.arrows[i];
        let shaft = arrow.end - arrow.start;
        var dir = vec2<f32>(0.0, 0.0);
        if (dot(shaft, shaft) > 0.0) {
            dir = normalize(shaft);
        }
        let s = sin(arrow.angle);
        let n = vec3<f32>(dir.x * s, -dir.y * s, cos(arrow.angle));
        let off = p - arrow.start;
        sum = sum + n * (1.0 / (1.0 + dot(off, off)));
    }

    var normal = vec3<f32>(0.0, 0.0, 1.0);
    if (dot(sum, sum) > 0.0) {
        normal = normalize(sum);
    }
    let encoded = floor((normal * 0.5 + vec3<f32>(0.5)) * 255.0) / 255.0;
    textureStore(target_tex, gid.xy, vec4<f32>(encoded, 1.0));
}
"#;

/// One combine step: `out = layer over accum`, straight alpha, with the
/// layer shifted by its canvas position and scaled by its opacity.
pub const COMBINE_SHADER: &str = r#"
struct CombineParams {
    position:   vec2<i32>,
    layer_size: vec2<u32>,
    canvas:     vec2<u32>,
    alpha:      f32,
    _pad:       f32,
};

@group(0) @binding(0) var accum_tex: texture_2d<f32>;
@group(0) @binding(1) var layer_tex: texture_2d<f32>;
@group(0) @binding(2) var out_tex: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(3) var<uniform> params: CombineParams;

@compute @workgroup_size(16, 16)
fn cs_combine(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.canvas.x || gid.y >= params.canvas.y) {
        return;
    }
    let dst = textureLoad(accum_tex, vec2<i32>(gid.xy), 0);
    var out = dst;

    let src_coord = vec2<i32>(gid.xy) - params.position;
    if (src_coord.x >= 0 && src_coord.y >= 0
        && u32(src_coord.x) < params.layer_size.x
        && u32(src_coord.y) < params.layer_size.y) {
        let src = textureLoad(layer_tex, src_coord, 0);
        let sa = src.a * clamp(params.alpha, 0.0, 1.0);
        let oa = sa + dst.a * (1.0 - sa);
        if (oa <= 0.0) {
            out = vec4<f32>(0.0);
        } else {
            out = vec4<f32>((src.rgb * sa + dst.rgb * dst.a * (1.0 - sa)) / oa, oa);
        }
    }
    textureStore(out_tex, gid.xy, out);
}
"#;

/// Mipmap generation: one level from the level above by 2×2 averaging.
pub const MIPMAP_SHADER: &str = r#"
@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var dst_tex: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(16, 16)
fn cs_mipmap(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dst_size = textureDimensions(dst_tex);
    if (gid.x >= dst_size.x || gid.y >= dst_size.y) {
        return;
    }

    let src_max = textureDimensions(src_tex) - vec2<u32>(1u, 1u);
    let base = gid.xy * 2u;
    let p00 = textureLoad(src_tex, min(base, src_max), 0);
    let p10 = textureLoad(src_tex, min(base + vec2<u32>(1u, 0u), src_max), 0);
    let p01 = textureLoad(src_tex, min(base + vec2<u32>(0u, 1u), src_max), 0);
    let p11 = textureLoad(src_tex, min(base + vec2<u32>(1u, 1u), src_max), 0);

    textureStore(dst_tex, gid.xy, (p00 + p10 + p01 + p11) * 0.25);
}
"#;

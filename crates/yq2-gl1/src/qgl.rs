// qgl.rs — the slice of the fixed-function GL API driven by the surface renderer
//
// The renderer never talks to a driver directly. Everything it needs from
// GL 1.x goes through `QGl`, so a context loader, a GLES1 shim or a test
// recorder can sit behind it.

use yq2_common::q_shared::Vec3;

/// Texture environment modes used by the world and model paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TexEnv {
    Replace,
    Modulate,
    /// GL_COMBINE with the given GL_RGB_SCALE.
    Combine { rgb_scale: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Blend,
    DepthTest,
    Texture2D,
    CullFace,
    PolygonOffsetFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullFace {
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeModel {
    Flat,
    Smooth,
}

/// One indexed GL_TRIANGLES submission.
#[derive(Debug, Clone, Copy)]
pub struct DrawElements<'a> {
    /// Components per vertex, 2 for screen-space geometry, 3 otherwise.
    pub vertex_size: usize,
    pub vertices: &'a [f32],
    /// Texcoord arrays for TMU 0 and TMU 1, two floats per vertex.
    pub texcoords: [Option<&'a [f32]>; 2],
    /// RGBA, four floats per vertex.
    pub colors: Option<&'a [f32]>,
    pub indices: &'a [u16],
}

impl DrawElements<'_> {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / self.vertex_size
    }
}

/// Destination of a partial texture upload. `row_length` is the pitch, in
/// texels, of the source buffer the pixels are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubImage {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub row_length: i32,
}

/// Projection used for the first-person weapon model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponProjection {
    pub fov_y: f32,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
    /// Mirror on X for left-handed weapons.
    pub mirrored: bool,
}

pub trait QGl {
    /// Select `tmu` and bind `texnum` to it.
    fn bind_texture(&mut self, tmu: usize, texnum: i32);
    fn enable_texture_unit(&mut self, tmu: usize, enable: bool);
    fn tex_env(&mut self, tmu: usize, mode: TexEnv);

    fn enable(&mut self, cap: Capability);
    fn disable(&mut self, cap: Capability);
    fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    fn depth_mask(&mut self, write: bool);
    fn depth_range(&mut self, near: f32, far: f32);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn cull_face(&mut self, face: CullFace);
    fn shade_model(&mut self, model: ShadeModel);

    // modelview stack
    fn push_matrix(&mut self);
    fn pop_matrix(&mut self);
    fn translate(&mut self, v: &Vec3);
    fn rotate(&mut self, degrees: f32, axis: &Vec3);
    fn load_world_matrix(&mut self);

    // projection stack
    fn push_weapon_projection(&mut self, proj: &WeaponProjection);
    fn pop_projection(&mut self);

    fn draw_elements(&mut self, draw: &DrawElements<'_>);
    /// Three floats per point.
    fn draw_line_strip(&mut self, points: &[f32]);

    fn tex_image_2d(&mut self, texnum: i32, width: i32, height: i32, pixels: &[u8]);
    fn tex_sub_image_2d(&mut self, texnum: i32, rect: &SubImage, pixels: &[u8]);
}

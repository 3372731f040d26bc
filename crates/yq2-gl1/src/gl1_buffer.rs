// gl1_buffer.rs — batched draw accumulator
//
// Surfaces that share the same draw mode and texture state are appended to
// one vertex/index batch; the batch is submitted as a single indexed
// GL_TRIANGLES call when any state that matters for its mode changes.

use bitflags::bitflags;

use yq2_common::q_shared::RenderFx;

use crate::gl1_local::Gl1Renderer;
use crate::gl1_model_types::{GlPoly, MSurfFlags};
use crate::qgl::{Capability, CullFace, DrawElements, QGl, ShadeModel, TexEnv, WeaponProjection};

pub const MAX_VERTICES: usize = 16384;
pub const MAX_INDICES: usize = MAX_VERTICES * 4;

/// Draw mode of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferedDraw {
    /// Screen-space pictures, two components per vertex.
    TwoD,
    #[default]
    SingleTex,
    /// Base texture on TMU 0, lightmap on TMU 1.
    MultiTex,
    /// Skinned models with per-vertex colour.
    Alias,
    /// Untextured coloured geometry.
    Flash,
    /// Translucent world surfaces.
    Alpha,
}

/// Which parts of a request, beyond mode and base texture, force a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchKey {
    pub lightmap: bool,
    pub flags: bool,
    pub alpha: bool,
}

impl BufferedDraw {
    pub const fn batch_key(self) -> BatchKey {
        match self {
            BufferedDraw::MultiTex => BatchKey { lightmap: true, flags: false, alpha: false },
            BufferedDraw::SingleTex | BufferedDraw::Alias => BatchKey { lightmap: false, flags: true, alpha: false },
            BufferedDraw::Alpha => BatchKey { lightmap: false, flags: false, alpha: true },
            BufferedDraw::TwoD | BufferedDraw::Flash => BatchKey { lightmap: false, flags: false, alpha: false },
        }
    }

    pub const fn vertex_size(self) -> usize {
        match self {
            BufferedDraw::TwoD => 2,
            _ => 3,
        }
    }

    pub const fn textured(self) -> bool {
        !matches!(self, BufferedDraw::Flash)
    }

    pub const fn colored(self) -> bool {
        matches!(self, BufferedDraw::Alias | BufferedDraw::Flash)
    }
}

bitflags! {
    /// Batch flags. Surface and entity flags are translated into these so
    /// the two never alias.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        const TURB = 0x1;
        const TRANSLUCENT = 0x2;
        const DEPTHHACK = 0x4;
        const WEAPONMODEL = 0x8;
    }
}

impl BufferFlags {
    pub fn from_surface(flags: MSurfFlags) -> Self {
        if flags.contains(MSurfFlags::DRAWTURB) {
            BufferFlags::TURB
        } else {
            BufferFlags::empty()
        }
    }

    pub fn from_render_fx(fx: RenderFx) -> Self {
        let mut out = BufferFlags::empty();
        out.set(BufferFlags::TRANSLUCENT, fx.contains(RenderFx::TRANSLUCENT));
        out.set(BufferFlags::DEPTHHACK, fx.contains(RenderFx::DEPTHHACK));
        out.set(BufferFlags::WEAPONMODEL, fx.contains(RenderFx::WEAPONMODEL));
        out
    }
}

/// Horizontal offset for SURF_FLOWING textures: a 40 second sawtooth that
/// never evaluates to exactly zero.
pub fn flowing_scroll(time: f32) -> f32 {
    let t = time / 40.0;
    let scroll = -64.0 * (t - t.trunc());
    if scroll == 0.0 {
        -64.0
    } else {
        scroll
    }
}

/// The pending batch: its state and the geometry accumulated so far.
#[derive(Debug, Clone)]
pub struct GlBuffer {
    pub kind: BufferedDraw,
    /// Base texture number, and the lightmap slot for `MultiTex`.
    pub currenttexture: [i32; 2],
    pub flags: BufferFlags,
    pub currentalpha: f32,

    vtx: Vec<f32>,
    tex: [Vec<[f32; 2]>; 2],
    clr: Vec<[f32; 4]>,
    idx: Vec<u16>,
    vt: usize, // vertices in this batch
}

impl Default for GlBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl GlBuffer {
    pub fn new() -> Self {
        Self {
            kind: BufferedDraw::default(),
            currenttexture: [0; 2],
            flags: BufferFlags::empty(),
            currentalpha: 1.0,
            vtx: Vec::with_capacity(MAX_VERTICES * 3),
            tex: [
                Vec::with_capacity(MAX_VERTICES),
                Vec::with_capacity(MAX_VERTICES),
            ],
            clr: Vec::with_capacity(MAX_VERTICES),
            idx: Vec::with_capacity(MAX_INDICES),
            vt: 0,
        }
    }

    /// Drops pending geometry and forgets the current texture.
    pub fn reset(&mut self) {
        self.clear_geometry();
        self.currenttexture[0] = 0;
    }

    fn clear_geometry(&mut self) {
        self.vtx.clear();
        self.tex[0].clear();
        self.tex[1].clear();
        self.clr.clear();
        self.idx.clear();
        self.vt = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.vtx.is_empty() || self.idx.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vt
    }

    /// True when the requested state cannot join the pending batch.
    pub fn needs_flush(
        &self,
        kind: BufferedDraw,
        colortex: i32,
        lighttex: i32,
        flags: BufferFlags,
        alpha: f32,
        multitexture: bool,
    ) -> bool {
        if self.kind != kind || self.currenttexture[0] != colortex {
            return true;
        }
        let key = kind.batch_key();
        (key.lightmap && multitexture && self.currenttexture[1] != lighttex)
            || (key.flags && self.flags != flags)
            || (key.alpha && self.currentalpha != alpha)
    }

    pub fn set_state(&mut self, kind: BufferedDraw, colortex: i32, lighttex: i32, flags: BufferFlags, alpha: f32) {
        self.kind = kind;
        self.currenttexture = [colortex, lighttex];
        self.flags = flags;
        self.currentalpha = alpha;
    }

    pub fn has_room(&self, numverts: usize) -> bool {
        let numindices = numverts.saturating_sub(2) * 3;
        self.vt + numverts <= MAX_VERTICES && self.idx.len() + numindices <= MAX_INDICES
    }

    /// Fan triangulation of the next `numverts` vertices: (0, i+1, i+2).
    pub fn push_fan_indices(&mut self, numverts: usize) {
        let base = self.vt as u16;
        for i in 0..numverts.saturating_sub(2) {
            let i = i as u16;
            self.idx.extend_from_slice(&[base, base + i + 1, base + i + 2]);
        }
        self.vt += numverts;
    }

    pub fn push_vertex(&mut self, x: f32, y: f32, z: f32) {
        self.vtx.extend_from_slice(&[x, y, z]);
    }

    pub fn push_vertex_2d(&mut self, x: f32, y: f32) {
        self.vtx.extend_from_slice(&[x, y]);
    }

    pub fn push_texcoord(&mut self, unit: usize, s: f32, t: f32) {
        self.tex[unit].push([s, t]);
    }

    pub fn push_color(&mut self, rgba: [f32; 4]) {
        self.clr.push(rgba);
    }

    /// Appends a polygon's vertices. Indices must already be reserved.
    /// `lightmapped` adds the second texcoord set.
    pub fn push_poly(&mut self, poly: &GlPoly, scroll: f32, lightmapped: bool) {
        for v in &poly.verts {
            self.push_vertex(v[0], v[1], v[2]);
            self.push_texcoord(0, v[3] + scroll, v[4]);
            if lightmapped {
                self.push_texcoord(1, v[5], v[6]);
            }
        }
    }

    fn draw_elements(&self) -> DrawElements<'_> {
        let kind = self.kind;
        let textured = kind.textured();
        DrawElements {
            vertex_size: kind.vertex_size(),
            vertices: &self.vtx,
            texcoords: [
                textured.then(|| bytemuck::cast_slice::<[f32; 2], f32>(&self.tex[0])),
                (textured && kind == BufferedDraw::MultiTex)
                    .then(|| bytemuck::cast_slice::<[f32; 2], f32>(&self.tex[1])),
            ],
            colors: kind
                .colored()
                .then(|| bytemuck::cast_slice::<[f32; 4], f32>(&self.clr)),
            indices: &self.idx,
        }
    }
}

impl Gl1Renderer {
    /// R_ApplyGLBuffer: submits the pending batch with the state its mode
    /// needs, then empties it.
    pub fn r_apply_gl_buffer(&mut self, gl: &mut dyn QGl) {
        if self.buf.is_empty() {
            return;
        }

        let kind = self.buf.kind;
        let flags = self.buf.flags;
        let mtex = kind == BufferedDraw::MultiTex;
        let alias = kind == BufferedDraw::Alias;
        let mut texenv_set = false;

        self.state.enable_multitexture(gl, &self.config, mtex);

        if alias {
            if flags.contains(BufferFlags::DEPTHHACK) {
                // hack the depth range to prevent view model from poking into walls
                let (min, max) = (self.state.depthmin, self.state.depthmax);
                gl.depth_range(min, min + 0.3 * (max - min));
            }

            if flags.contains(BufferFlags::WEAPONMODEL) {
                let fov_y = if self.config.gunfov < 0.0 {
                    self.view.fov_y
                } else {
                    self.config.gunfov
                };
                let aspect = if self.view.height > 0 {
                    self.view.width as f32 / self.view.height as f32
                } else {
                    1.0
                };
                gl.push_weapon_projection(&WeaponProjection {
                    fov_y,
                    aspect,
                    znear: 4.0,
                    zfar: if self.config.farsee { 8192.0 } else { 4096.0 },
                    mirrored: self.config.lefthand,
                });
                if self.config.lefthand {
                    gl.cull_face(CullFace::Back);
                }
            }

            gl.shade_model(ShadeModel::Smooth);
            self.state.tex_env(gl, TexEnv::Modulate);

            if flags.contains(BufferFlags::TRANSLUCENT) {
                gl.enable(Capability::Blend);
            }
        }

        if kind == BufferedDraw::Alpha {
            // the textures are prescaled up for a better
            // lighting range, so scale it back down
            let intens = self.state.inverse_intensity;
            gl.color4f(intens, intens, intens, self.buf.currentalpha);
        } else if !alias && flags.contains(BufferFlags::TURB) {
            texenv_set = true;
            if self.config.overbright_scale().is_some() {
                self.state.tex_env(gl, TexEnv::Combine { rgb_scale: 1.0 });
            } else {
                self.state.tex_env(gl, TexEnv::Modulate);
                let intens = self.state.inverse_intensity;
                gl.color4f(intens, intens, intens, 1.0);
            }
        }

        if kind.textured() {
            if mtex {
                // TMU 1: static lightmap, or this frame's dynamic copy
                let ct = self.buf.currenttexture[1].max(0) as usize;
                let mut lmtexture = self.state.lightmap_textures + ct as i32;
                if self.lms.copies && self.lms.dynamic_frame.get(ct).copied().unwrap_or(false) {
                    lmtexture = self.state.lightmap_textures
                        + self.lms.copy_texture_offset(ct, self.lms.cur_lm_copy);
                }
                self.state.mbind(gl, 1, lmtexture);

                if let Some(scale) = self.config.overbright_scale() {
                    self.state.tex_env(gl, TexEnv::Combine { rgb_scale: scale });
                }

                // TMU 0: colour texture
                self.state.mbind(gl, 0, self.buf.currenttexture[0]);
            } else {
                self.state.bind(gl, self.buf.currenttexture[0]);
            }
        }

        gl.draw_elements(&self.buf.draw_elements());

        if texenv_set {
            self.state.tex_env(gl, TexEnv::Replace);
        }

        if alias {
            // turn back everything
            if flags.contains(BufferFlags::TRANSLUCENT) {
                gl.disable(Capability::Blend);
            }

            self.state.tex_env(gl, TexEnv::Replace);
            gl.shade_model(ShadeModel::Flat);

            if flags.contains(BufferFlags::WEAPONMODEL) {
                gl.pop_projection();
                if self.config.lefthand {
                    gl.cull_face(CullFace::Front);
                }
            }

            if flags.contains(BufferFlags::DEPTHHACK) {
                gl.depth_range(self.state.depthmin, self.state.depthmax);
            }
        }

        self.buf.clear_geometry();
    }

    /// R_UpdateGLBuffer: flushes when the request cannot join the pending
    /// batch, then records the new batch state.
    pub fn r_update_gl_buffer(
        &mut self,
        gl: &mut dyn QGl,
        kind: BufferedDraw,
        colortex: i32,
        lighttex: i32,
        flags: BufferFlags,
        alpha: f32,
    ) {
        if !self
            .buf
            .needs_flush(kind, colortex, lighttex, flags, alpha, self.config.multitexture)
        {
            return;
        }
        self.r_apply_gl_buffer(gl);
        self.buf.set_state(kind, colortex, lighttex, flags, alpha);
    }

    /// R_SetBufferIndices: reserves a fan of `numverts` vertices, submitting
    /// the batch first if it would overflow.
    pub fn r_set_buffer_indices(&mut self, gl: &mut dyn QGl, numverts: usize) {
        if !self.buf.has_room(numverts) {
            self.r_apply_gl_buffer(gl);
        }
        assert!(
            self.buf.has_room(numverts),
            "polygon with {} vertices exceeds the draw buffer",
            numverts
        );
        self.buf.push_fan_indices(numverts);
    }

    /// R_DrawGLPoly / R_DrawGLFlowingPoly / lightmapped variant.
    pub fn r_draw_gl_poly(&mut self, gl: &mut dyn QGl, poly: &GlPoly, scroll: f32, lightmapped: bool) {
        if poly.numverts() < 3 {
            return;
        }
        self.r_set_buffer_indices(gl, poly.numverts());
        self.buf.push_poly(poly, scroll, lightmapped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl1_local::{Gl1Config, GlCaps};
    use crate::qgl::recorder::{GlCall, GlRecorder};

    fn renderer() -> Gl1Renderer {
        Gl1Renderer::new(GlCaps::default(), Gl1Config::default())
    }

    fn poly(n: usize) -> GlPoly {
        GlPoly {
            next: None,
            verts: (0..n)
                .map(|i| [i as f32, 0.0, 0.0, 0.1 * i as f32, 0.2, 0.3, 0.4])
                .collect(),
        }
    }

    // -------------------------------------------------------
    // Legality table
    // -------------------------------------------------------

    #[test]
    fn test_batch_key_table() {
        assert_eq!(
            BufferedDraw::MultiTex.batch_key(),
            BatchKey { lightmap: true, flags: false, alpha: false }
        );
        assert!(BufferedDraw::SingleTex.batch_key().flags);
        assert!(BufferedDraw::Alias.batch_key().flags);
        assert!(BufferedDraw::Alpha.batch_key().alpha);
        assert!(!BufferedDraw::Flash.batch_key().flags);
        assert!(!BufferedDraw::TwoD.batch_key().alpha);
    }

    #[test]
    fn test_needs_flush_rules() {
        let mut buf = GlBuffer::new();
        buf.set_state(BufferedDraw::MultiTex, 10, 1, BufferFlags::empty(), 1.0);

        assert!(!buf.needs_flush(BufferedDraw::MultiTex, 10, 1, BufferFlags::empty(), 1.0, true));
        assert!(buf.needs_flush(BufferedDraw::MultiTex, 11, 1, BufferFlags::empty(), 1.0, true));
        assert!(buf.needs_flush(BufferedDraw::MultiTex, 10, 2, BufferFlags::empty(), 1.0, true));
        // lightmap slot is irrelevant without multitexture
        assert!(!buf.needs_flush(BufferedDraw::MultiTex, 10, 2, BufferFlags::empty(), 1.0, false));
        // flags and alpha don't matter for multitexture batches
        assert!(!buf.needs_flush(BufferedDraw::MultiTex, 10, 1, BufferFlags::TURB, 0.5, true));
        assert!(buf.needs_flush(BufferedDraw::SingleTex, 10, 1, BufferFlags::empty(), 1.0, true));

        buf.set_state(BufferedDraw::SingleTex, 10, 0, BufferFlags::empty(), 1.0);
        assert!(buf.needs_flush(BufferedDraw::SingleTex, 10, 0, BufferFlags::TURB, 1.0, true));
        assert!(!buf.needs_flush(BufferedDraw::SingleTex, 10, 0, BufferFlags::empty(), 0.3, true));

        buf.set_state(BufferedDraw::Alpha, 10, 0, BufferFlags::empty(), 0.33);
        assert!(buf.needs_flush(BufferedDraw::Alpha, 10, 0, BufferFlags::empty(), 0.66, true));
        assert!(!buf.needs_flush(BufferedDraw::Alpha, 10, 0, BufferFlags::TURB, 0.33, true));
    }

    #[test]
    fn test_flags_do_not_alias() {
        // SURF_DRAWTURB and RF_DEPTHHACK share a bit value in the level format
        let from_surf = BufferFlags::from_surface(MSurfFlags::DRAWTURB);
        let from_fx = BufferFlags::from_render_fx(RenderFx::DEPTHHACK);
        assert_ne!(from_surf, from_fx);
        assert_eq!(BufferFlags::from_surface(MSurfFlags::PLANEBACK), BufferFlags::empty());
    }

    // -------------------------------------------------------
    // Geometry
    // -------------------------------------------------------

    #[test]
    fn test_fan_indices() {
        let mut buf = GlBuffer::new();
        buf.push_fan_indices(5);
        buf.push_fan_indices(3);
        assert_eq!(buf.idx, vec![0, 1, 2, 0, 2, 3, 0, 3, 4, 5, 6, 7]);
        assert_eq!(buf.vertex_count(), 8);
    }

    #[test]
    fn test_push_poly_lightmapped_and_scrolled() {
        let mut buf = GlBuffer::new();
        buf.push_fan_indices(4);
        buf.push_poly(&poly(4), -32.0, true);
        assert_eq!(buf.vtx.len(), 12);
        assert_eq!(buf.tex[0][1], [0.1 - 32.0, 0.2]);
        assert_eq!(buf.tex[1].len(), 4);
        assert_eq!(buf.tex[1][3], [0.3, 0.4]);
    }

    #[test]
    fn test_flowing_scroll_never_zero() {
        assert_eq!(flowing_scroll(0.0), -64.0);
        assert_eq!(flowing_scroll(40.0), -64.0);
        assert_eq!(flowing_scroll(80.0), -64.0);
        assert_eq!(flowing_scroll(20.0), -32.0);
        let mut t = 0.0f32;
        while t < 400.0 {
            let s = flowing_scroll(t);
            assert!(s != 0.0, "scroll was zero at {}", t);
            assert!(s >= -64.0 && s < 0.0);
            t += 0.37;
        }
    }

    // -------------------------------------------------------
    // Submission
    // -------------------------------------------------------

    #[test]
    fn test_apply_empty_buffer_is_noop() {
        let mut r = renderer();
        let mut gl = GlRecorder::new();
        r.r_apply_gl_buffer(&mut gl);
        assert!(gl.calls.is_empty());
    }

    #[test]
    fn test_mtex_batch_binds_both_units() {
        let mut r = renderer();
        let mut gl = GlRecorder::new();
        r.r_update_gl_buffer(&mut gl, BufferedDraw::MultiTex, 10, 3, BufferFlags::empty(), 1.0);
        r.r_draw_gl_poly(&mut gl, &poly(4), 0.0, true);
        r.r_apply_gl_buffer(&mut gl);

        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        let d = draws[0];
        assert_eq!(d.textures, [10, r.state.lightmap_textures + 3]);
        assert!(d.multitexture);
        assert_eq!(d.vertex_count(), 4);
        assert_eq!(d.indices.len(), 6);
        assert!(d.texcoords[1].is_some());
        assert!(r.buf.is_empty());
    }

    #[test]
    fn test_mtex_binds_dynamic_copy() {
        let mut r = renderer();
        let mut gl = GlRecorder::new();
        r.lms.copies = true;
        r.lms.cur_lm_copy = 1;
        r.lms.dynamic_frame[3] = true;
        r.r_update_gl_buffer(&mut gl, BufferedDraw::MultiTex, 10, 3, BufferFlags::empty(), 1.0);
        r.r_draw_gl_poly(&mut gl, &poly(3), 0.0, true);
        r.r_apply_gl_buffer(&mut gl);
        let expected = r.state.lightmap_textures + 3 + (r.lms.max_lightmaps * 2) as i32;
        assert_eq!(gl.draws()[0].textures[1], expected);
    }

    #[test]
    fn test_overbright_uses_combine_on_lightmap_unit() {
        let mut r = renderer();
        r.config.overbrightbits = 2.0;
        let mut gl = GlRecorder::new();
        r.r_update_gl_buffer(&mut gl, BufferedDraw::MultiTex, 10, 1, BufferFlags::empty(), 1.0);
        r.r_draw_gl_poly(&mut gl, &poly(3), 0.0, true);
        r.r_apply_gl_buffer(&mut gl);
        assert!(gl.calls.contains(&GlCall::TexEnv {
            tmu: 1,
            mode: TexEnv::Combine { rgb_scale: 2.0 }
        }));
    }

    #[test]
    fn test_batches_group_consecutive_equal_state() {
        let mut r = renderer();
        let mut gl = GlRecorder::new();
        // texture sequence: 1 1 2 2 2 1 -> three groups
        let seq = [1, 1, 2, 2, 2, 1];
        for &tex in &seq {
            r.r_update_gl_buffer(&mut gl, BufferedDraw::SingleTex, tex, 0, BufferFlags::empty(), 1.0);
            r.r_draw_gl_poly(&mut gl, &poly(4), 0.0, false);
        }
        r.r_apply_gl_buffer(&mut gl);

        let draws = gl.draws();
        let textures: Vec<i32> = draws.iter().map(|d| d.textures[0]).collect();
        assert_eq!(textures, vec![1, 2, 1]);
        let verts: Vec<usize> = draws.iter().map(|d| d.vertex_count()).collect();
        assert_eq!(verts, vec![8, 12, 4]);
        let total: usize = draws.iter().map(|d| d.indices.len()).sum();
        assert_eq!(total, seq.len() * 6);
    }

    #[test]
    fn test_capacity_flush_keeps_all_geometry() {
        let mut r = renderer();
        let mut gl = GlRecorder::new();
        r.r_update_gl_buffer(&mut gl, BufferedDraw::SingleTex, 1, 0, BufferFlags::empty(), 1.0);
        let p = poly(64);
        let count = MAX_VERTICES / 64 + 1;
        for _ in 0..count {
            r.r_draw_gl_poly(&mut gl, &p, 0.0, false);
        }
        r.r_apply_gl_buffer(&mut gl);
        let draws = gl.draws();
        assert_eq!(draws.len(), 2);
        let total: usize = draws.iter().map(|d| d.vertex_count()).sum();
        assert_eq!(total, count * 64);
        // indices restart at zero after the flush
        assert_eq!(draws[1].indices[0], 0);
    }

    #[test]
    fn test_alpha_batch_sets_color() {
        let mut r = renderer();
        let mut gl = GlRecorder::new();
        r.r_update_gl_buffer(&mut gl, BufferedDraw::Alpha, 7, 0, BufferFlags::empty(), 0.33);
        r.r_draw_gl_poly(&mut gl, &poly(3), 0.0, false);
        r.r_apply_gl_buffer(&mut gl);
        let d = gl.draws()[0];
        assert_eq!(d.color, [0.5, 0.5, 0.5, 0.33]);
    }

    #[test]
    fn test_turb_batch_modulates_and_restores() {
        let mut r = renderer();
        let mut gl = GlRecorder::new();
        r.r_update_gl_buffer(&mut gl, BufferedDraw::SingleTex, 7, 0, BufferFlags::TURB, 1.0);
        r.r_draw_gl_poly(&mut gl, &poly(3), 0.0, false);
        r.r_apply_gl_buffer(&mut gl);
        assert!(gl.calls.contains(&GlCall::TexEnv { tmu: 0, mode: TexEnv::Modulate }));
        assert_eq!(
            gl.calls.last(),
            Some(&GlCall::TexEnv { tmu: 0, mode: TexEnv::Replace })
        );
    }

    #[test]
    fn test_alias_weapon_model_lefthand() {
        let mut r = renderer();
        r.config.lefthand = true;
        r.view.width = 640;
        r.view.height = 480;
        let mut gl = GlRecorder::new();
        let flags = BufferFlags::from_render_fx(RenderFx::WEAPONMODEL | RenderFx::DEPTHHACK);
        r.r_update_gl_buffer(&mut gl, BufferedDraw::Alias, 9, 0, flags, 1.0);
        r.r_set_buffer_indices(&mut gl, 3);
        for i in 0..3 {
            r.buf.push_vertex(i as f32, 0.0, 0.0);
            r.buf.push_texcoord(0, 0.0, 0.0);
            r.buf.push_color([1.0, 1.0, 1.0, 1.0]);
        }
        r.r_apply_gl_buffer(&mut gl);

        let d = gl.draws()[0];
        assert!(d.colors.is_some());
        assert!((d.depth_range.1 - 0.3).abs() < 1e-6);
        assert!(gl.calls.contains(&GlCall::PushWeaponProjection(WeaponProjection {
            fov_y: 80.0,
            aspect: 640.0 / 480.0,
            znear: 4.0,
            zfar: 4096.0,
            mirrored: true,
        })));
        assert!(gl.calls.contains(&GlCall::CullFace(CullFace::Back)));
        assert_eq!(gl.calls.last(), Some(&GlCall::DepthRange(0.0, 1.0)));
        assert!(gl.calls.contains(&GlCall::CullFace(CullFace::Front)));
    }

    #[test]
    fn test_two_d_batch_uses_two_components() {
        let mut r = renderer();
        let mut gl = GlRecorder::new();
        r.r_update_gl_buffer(&mut gl, BufferedDraw::TwoD, 4, 0, BufferFlags::empty(), 1.0);
        r.r_set_buffer_indices(&mut gl, 4);
        for (x, y) in [(0.0, 0.0), (8.0, 0.0), (8.0, 8.0), (0.0, 8.0)] {
            r.buf.push_vertex_2d(x, y);
            r.buf.push_texcoord(0, x / 8.0, y / 8.0);
        }
        r.r_apply_gl_buffer(&mut gl);
        let d = gl.draws()[0];
        assert_eq!(d.vertex_size, 2);
        assert_eq!(d.vertex_count(), 4);
    }
}

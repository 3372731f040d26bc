// gl1_lightmap.rs — lightmap atlas packing, static build and per-frame regeneration

use rayon::prelude::*;

use yq2_common::q_shared::{LightStyle, SurfFlags, MAX_LIGHTSTYLES};

use crate::gl1_local::{
    Gl1Renderer, LightmapKind, RefError, DYNAMIC_COPIES, LIGHTMAP_BYTES, MAX_LIGHTMAP_COPIES,
};
use crate::gl1_model_types::{MSurfFlags, Model};
use crate::qgl::{QGl, SubImage};

// ============================================================
// Rectangles
// ============================================================

/// Texel rectangle inside an atlas, bottom and right exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LmRect {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl LmRect {
    pub fn of_block(s: i32, t: i32, smax: i32, tmax: i32) -> Self {
        Self {
            top: t,
            bottom: t + tmax,
            left: s,
            right: s + smax,
        }
    }

    pub fn union(self, other: LmRect) -> LmRect {
        LmRect {
            top: self.top.min(other.top),
            bottom: self.bottom.max(other.bottom),
            left: self.left.min(other.left),
            right: self.right.max(other.right),
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn overlaps(&self, other: &LmRect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }
}

fn union_opt(a: Option<LmRect>, b: Option<LmRect>) -> Option<LmRect> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

// ============================================================
// LM_AllocBlock
// ============================================================

/// Skyline packer over one atlas: `allocated[x]` is the filled height of
/// column x.
#[derive(Debug, Clone)]
pub struct LightmapAllocator {
    width: i32,
    height: i32,
    allocated: Vec<i32>,
}

impl LightmapAllocator {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            allocated: vec![0; width.max(0) as usize],
        }
    }

    /// LM_InitBlock
    pub fn init_block(&mut self) {
        self.allocated.iter_mut().for_each(|a| *a = 0);
    }

    /// Places a w*h block at the lowest skyline position, leftmost on ties.
    pub fn alloc_block(&mut self, w: i32, h: i32) -> Option<(i32, i32)> {
        if w <= 0 || h <= 0 || w > self.width || h > self.height {
            return None;
        }

        let mut best = self.height;
        let mut x = 0;

        for i in 0..=(self.width - w) {
            let mut best2 = 0;
            let mut fits = true;

            for j in 0..w {
                let a = self.allocated[(i + j) as usize];
                if a >= best {
                    fits = false;
                    break;
                }
                best2 = best2.max(a);
            }

            if fits {
                // this is a valid spot
                x = i;
                best = best2;
            }
        }

        if best + h > self.height {
            return None;
        }

        for a in &mut self.allocated[x as usize..(x + w) as usize] {
            *a = best + h;
        }

        Some((x, best))
    }

    /// Rows in use, for partial uploads.
    pub fn used_height(&self) -> i32 {
        self.allocated.iter().copied().max().unwrap_or(0)
    }
}

// ============================================================
// Atlas state
// ============================================================

pub struct LightmapState {
    pub block_width: i32,
    pub block_height: i32,
    pub max_lightmaps: usize,

    pub allocator: LightmapAllocator,
    pub current_lightmap_texture: usize,

    /// `buffers[copy][slot]` RGBA texels, allocated on first use. Copy 0 is
    /// where static slots are built and, without copies, where dynamic
    /// light is written back. With copies, copies below DYNAMIC_COPIES are
    /// per-frame working buffers and copy DYNAMIC_COPIES is the pristine
    /// static lightmap.
    pub buffers: [Vec<Option<Vec<u8>>>; MAX_LIGHTMAP_COPIES],

    /// Latched from `gl1_lightmapcopies` when the lightmaps were built.
    pub copies: bool,
    pub cur_lm_copy: usize,
    /// Slot carries dynamic light this frame, so its copy texture is bound.
    pub dynamic_frame: Vec<bool>,

    /// Region of a working buffer that differs from the pristine copy.
    buffer_dirty: [Vec<Option<LmRect>>; DYNAMIC_COPIES],
    /// Region of a copy texture that differs from the pristine copy.
    texture_dirty: [Vec<Option<LmRect>>; DYNAMIC_COPIES],
}

impl LightmapState {
    pub fn new(block_width: i32, block_height: i32, max_lightmaps: usize) -> Self {
        Self {
            block_width,
            block_height,
            max_lightmaps,
            allocator: LightmapAllocator::new(block_width, block_height),
            current_lightmap_texture: 1,
            buffers: std::array::from_fn(|_| vec![None; max_lightmaps]),
            copies: false,
            cur_lm_copy: 0,
            dynamic_frame: vec![false; max_lightmaps],
            buffer_dirty: std::array::from_fn(|_| vec![None; max_lightmaps]),
            texture_dirty: std::array::from_fn(|_| vec![None; max_lightmaps]),
        }
    }

    fn block_bytes(&self) -> usize {
        (self.block_width * self.block_height) as usize * LIGHTMAP_BYTES
    }

    pub fn row_bytes(&self) -> usize {
        self.block_width as usize * LIGHTMAP_BYTES
    }

    /// Byte offset of texel (s, t).
    pub fn texel_offset(&self, s: i32, t: i32) -> usize {
        (t * self.block_width + s) as usize * LIGHTMAP_BYTES
    }

    pub fn buffer(&self, copy: usize, slot: usize) -> Option<&[u8]> {
        self.buffers[copy][slot].as_deref()
    }

    pub fn buffer_mut(&mut self, copy: usize, slot: usize) -> &mut Vec<u8> {
        let bytes = self.block_bytes();
        self.buffers[copy][slot].get_or_insert_with(|| vec![0; bytes])
    }

    pub fn buffer_dirty(&self, copy: usize, slot: usize) -> Option<LmRect> {
        self.buffer_dirty[copy][slot]
    }

    pub fn texture_dirty(&self, copy: usize, slot: usize) -> Option<LmRect> {
        self.texture_dirty[copy][slot]
    }

    /// Texture number of a copy of `slot` relative to the lightmap base.
    pub fn copy_texture_offset(&self, slot: usize, copy: usize) -> i32 {
        (slot + self.max_lightmaps * (copy + 1)) as i32
    }

    /// Copies `rect` of the pristine static lightmap back over a working
    /// buffer.
    fn restore_rect(&mut self, copy: usize, slot: usize, rect: LmRect) {
        let row = self.row_bytes();
        let span = rect.width().max(0) as usize * LIGHTMAP_BYTES;
        let first = self.texel_offset(rect.left, rect.top);
        let (work, pristine) = self.buffers.split_at_mut(DYNAMIC_COPIES);
        let (Some(dst), Some(src)) = (work[copy][slot].as_mut(), pristine[0][slot].as_ref()) else {
            return;
        };
        for r in 0..rect.height().max(0) as usize {
            let ofs = first + r * row;
            dst[ofs..ofs + span].copy_from_slice(&src[ofs..ofs + span]);
        }
    }

    fn reset(&mut self) {
        self.allocator.init_block();
        self.current_lightmap_texture = 1;
        self.cur_lm_copy = 0;
        for copy in &mut self.buffers {
            copy.iter_mut().for_each(|b| *b = None);
        }
        self.dynamic_frame.iter_mut().for_each(|d| *d = false);
        for dirty in self.buffer_dirty.iter_mut().chain(self.texture_dirty.iter_mut()) {
            dirty.iter_mut().for_each(|d| *d = None);
        }
    }
}

/// Whether a surface gets a lightmap at all.
pub fn is_lightmapped(world: &Model, surf: usize) -> bool {
    let s = &world.surfaces[surf];
    !s.flags.intersects(MSurfFlags::DRAWSKY | MSurfFlags::DRAWTURB)
        && !world.texinfo[s.texinfo].flags.intersects(
            SurfFlags::SKY | SurfFlags::TRANS33 | SurfFlags::TRANS66 | SurfFlags::WARP,
        )
}

/// Submits `rect` of `buf` with the atlas pitch as row length.
fn upload_rect(gl: &mut dyn QGl, texnum: i32, buf: &[u8], rect: LmRect, block_width: i32) {
    let start = ((rect.top * block_width + rect.left) as usize) * LIGHTMAP_BYTES;
    let end = (((rect.bottom - 1) * block_width + rect.right) as usize) * LIGHTMAP_BYTES;
    gl.tex_sub_image_2d(
        texnum,
        &SubImage {
            x: rect.left,
            y: rect.top,
            width: rect.width(),
            height: rect.height(),
            row_length: block_width,
        },
        &buf[start..end],
    );
}

// ============================================================
// Static build
// ============================================================

impl Gl1Renderer {
    pub fn lm_init_block(&mut self) {
        self.lms.allocator.init_block();
    }

    /// LM_UploadBlock. Dynamic uploads refresh the rows in use of slot 0;
    /// static uploads create the current slot's texture (and its copies)
    /// and open the next slot.
    pub fn lm_upload_block(&mut self, gl: &mut dyn QGl, dynamic: bool) -> Result<(), RefError> {
        let base = self.state.lightmap_textures;
        let (bw, bh) = (self.lms.block_width, self.lms.block_height);

        if dynamic {
            let height = self.lms.allocator.used_height();
            if height == 0 {
                return Ok(());
            }
            let bytes = (bw * height) as usize * LIGHTMAP_BYTES;
            self.state.bind(gl, base);
            let buf = self.lms.buffer_mut(0, 0);
            gl.tex_sub_image_2d(
                base,
                &SubImage {
                    x: 0,
                    y: 0,
                    width: bw,
                    height,
                    row_length: bw,
                },
                &buf[..bytes],
            );
            return Ok(());
        }

        let slot = self.lms.current_lightmap_texture;
        let pixels = self.lms.buffer_mut(0, slot).clone();
        self.state.bind(gl, base + slot as i32);
        gl.tex_image_2d(base + slot as i32, bw, bh, &pixels);

        if self.lms.copies {
            for cc in 1..MAX_LIGHTMAP_COPIES {
                self.lms.buffers[cc][slot] = Some(pixels.clone());
            }
            for cc in 0..DYNAMIC_COPIES {
                let texnum = base + self.lms.copy_texture_offset(slot, cc);
                self.state.bind(gl, texnum);
                gl.tex_image_2d(texnum, bw, bh, &pixels);
            }
        }

        self.lms.current_lightmap_texture += 1;
        if self.lms.current_lightmap_texture == self.lms.max_lightmaps {
            return Err(RefError::TooManyLightmaps {
                max: self.lms.max_lightmaps,
            });
        }
        Ok(())
    }

    /// LM_BeginBuildingLightmaps: clears every atlas, sets the base light
    /// styles and creates the dynamic slot 0 texture.
    pub fn lm_begin_building_lightmaps(&mut self, gl: &mut dyn QGl) {
        self.lms.reset();

        // a new map, so the view clusters of the old one mean nothing
        self.r_viewcluster = -1;
        self.r_viewcluster2 = -1;
        self.r_oldviewcluster = -1;
        self.r_oldviewcluster2 = -1;
        self.lms.copies = self.config.lightmapcopies && self.config.multitexture;

        self.r_framecount = 1; // no dlightcache

        // setup the base lightstyles so the lightmaps
        // won't have to be regenerated the first time they're seen
        self.lightstyles = vec![LightStyle::uniform(1.0); MAX_LIGHTSTYLES];

        self.state.enable_multitexture(gl, &self.config, true);
        if self.config.multitexture {
            self.state.select_texture(1);
        }

        // initialize the dynamic lightmap texture
        let base = self.state.lightmap_textures;
        let (bw, bh) = (self.lms.block_width, self.lms.block_height);
        let blank = self.lms.buffer_mut(0, 0).clone();
        self.state.bind(gl, base);
        gl.tex_image_2d(base, bw, bh, &blank);
    }

    /// Places a prepared texel block for `surf` into the current static
    /// slot, opening a new slot when this one is full.
    fn lm_place_surface_lightmap(
        &mut self,
        gl: &mut dyn QGl,
        world: &mut Model,
        surf: usize,
        block: &[u8],
    ) -> Result<(), RefError> {
        let (smax, tmax) = world.surfaces[surf].lightmap_size();

        let (s, t) = match self.lms.allocator.alloc_block(smax, tmax) {
            Some(pos) => pos,
            None => {
                self.lm_upload_block(gl, false)?;
                self.lm_init_block();
                log::debug!(
                    "lightmap slot {} full, continuing in a new one",
                    self.lms.current_lightmap_texture - 1
                );
                self.lms
                    .allocator
                    .alloc_block(smax, tmax)
                    .ok_or(RefError::LightmapAllocFailed {
                        width: smax,
                        height: tmax,
                        kind: LightmapKind::Static,
                    })?
            }
        };

        let slot = self.lms.current_lightmap_texture;
        let row = self.lms.row_bytes();
        let first = self.lms.texel_offset(s, t);
        let span = smax as usize * LIGHTMAP_BYTES;
        let dst = self.lms.buffer_mut(0, slot);
        for (r, src) in block.chunks_exact(span).enumerate() {
            let ofs = first + r * row;
            dst[ofs..ofs + span].copy_from_slice(src);
        }

        let fs = &mut world.surfaces[surf];
        fs.light_s = s;
        fs.light_t = t;
        fs.lightmaptexturenum = slot;
        self.r_set_cache_state(fs);
        Ok(())
    }

    fn lm_prepare_block(&self, world: &Model, surf: usize) -> Result<Vec<u8>, RefError> {
        let (smax, tmax) = world.surfaces[surf].lightmap_size();
        let stride = smax as usize * LIGHTMAP_BYTES;
        let mut block = vec![0u8; stride * tmax as usize];
        self.r_build_light_map(world, surf, &mut block, stride)?;
        Ok(block)
    }

    /// LM_EndBuildingLightmaps: uploads the last open slot.
    pub fn lm_end_building_lightmaps(&mut self, gl: &mut dyn QGl) -> Result<(), RefError> {
        self.lm_upload_block(gl, false)?;
        self.state.enable_multitexture(gl, &self.config, false);
        log::debug!(
            "built {} static lightmaps{}",
            self.lms.current_lightmap_texture - 1,
            if self.lms.copies { " with copies" } else { "" }
        );
        Ok(())
    }

    /// Builds every static lightmap of `world`. Texel blocks are computed in
    /// parallel; placement runs in surface order so the atlas layout does
    /// not depend on scheduling.
    pub fn build_lightmaps(&mut self, gl: &mut dyn QGl, world: &mut Model) -> Result<(), RefError> {
        self.lm_begin_building_lightmaps(gl);

        let lit: Vec<usize> = (0..world.surfaces.len())
            .filter(|&i| is_lightmapped(world, i))
            .collect();

        let blocks = {
            let this = &*self;
            let model = &*world;
            lit.par_iter()
                .map(|&i| this.lm_prepare_block(model, i))
                .collect::<Result<Vec<_>, RefError>>()?
        };

        for (&surf, block) in lit.iter().zip(&blocks) {
            self.lm_place_surface_lightmap(gl, world, surf, block)?;
        }

        self.lm_end_building_lightmaps(gl)
    }

    // ============================================================
    // R_RegenAllLightmaps
    // ============================================================

    /// Rewrites the dynamic parts of every chained static slot and uploads
    /// the changed rectangle (multitexture only).
    pub fn r_regen_all_lightmaps(&mut self, gl: &mut dyn QGl, world: &mut Model) -> Result<(), RefError> {
        if !self.config.multitexture {
            return Ok(());
        }

        let mut cc = 0;
        if self.lms.copies {
            // alternate between calls
            self.lms.cur_lm_copy = (self.lms.cur_lm_copy + 1) % DYNAMIC_COPIES;
            cc = self.lms.cur_lm_copy;
        }

        let bw = self.lms.block_width;
        let row = self.lms.row_bytes();

        for i in 1..self.lms.max_lightmaps {
            self.lms.dynamic_frame[i] = false;

            if self.chains.lightmap_surfaces[i].is_none() || self.lms.buffers[0][i].is_none() {
                continue;
            }

            if self.lms.copies {
                // restore to static lightmap what the last use of this copy changed
                if let Some(rect) = self.lms.buffer_dirty[cc][i].take() {
                    self.lms.restore_rect(cc, i, rect);
                }
            }

            let Some(mut buf) = self.lms.buffers[cc][i].take() else {
                continue;
            };

            let mut changed: Option<LmRect> = None;
            let mut next = self.chains.lightmap_surfaces[i];
            let mut result = Ok(());

            while let Some(si) = next {
                next = self.chains.lightmapchain[si];

                let (dynamic, map) = self.r_has_dynamic_lights(world, si);
                if !dynamic {
                    continue;
                }

                let s = &world.surfaces[si];
                let (smax, tmax) = s.lightmap_size();
                let rect = LmRect::of_block(s.light_s, s.light_t, smax, tmax);
                let ofs = (rect.top * bw + rect.left) as usize * LIGHTMAP_BYTES;

                if let Err(e) = self.r_build_light_map(world, si, &mut buf[ofs..], row) {
                    result = Err(e);
                    break;
                }
                self.r_update_surf_cache(&mut world.surfaces[si], map);
                changed = union_opt(changed, Some(rect));
            }

            self.lms.buffers[cc][i] = Some(buf);
            result?;

            let Some(changed) = changed else {
                continue;
            };
            self.lms.dynamic_frame[i] = true;

            // a copy texture also still holds what was written the last
            // time it was used, which has to be put back to static light
            let (upload, texnum) = if self.lms.copies {
                let upload = union_opt(Some(changed), self.lms.texture_dirty[cc][i]).unwrap_or(changed);
                self.lms.texture_dirty[cc][i] = Some(changed);
                self.lms.buffer_dirty[cc][i] = Some(changed);
                (upload, self.state.lightmap_textures + self.lms.copy_texture_offset(i, cc))
            } else {
                (changed, self.state.lightmap_textures + i as i32)
            };

            self.state.bind(gl, texnum);
            if let Some(buf) = self.lms.buffer(cc, i) {
                upload_rect(gl, texnum, buf, upload, bw);
            }
        }

        Ok(())
    }
}

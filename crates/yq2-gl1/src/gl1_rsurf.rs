// gl1_rsurf.rs — surface chains, PVS marking and the world / brush model passes

use yq2_common::q_shared::{
    angle_vectors, dot_product, vector_subtract, DLight, RdFlags, RenderFx, SurfFlags, Vec3,
    CONTENTS_SOLID, MAX_DLIGHTS,
};

use crate::gl1_buffer::{flowing_scroll, BufferFlags, BufferedDraw};
use crate::gl1_local::{
    Gl1Renderer, LightmapKind, RefEntity, RefError, BACKFACE_EPSILON, LIGHTMAP_BYTES,
    MAX_LIGHTMAPS,
};
use crate::gl1_model_types::{InlineModel, MSurfFlags, Model, NodeRef, MAXLIGHTMAPS};
use crate::gl1_rmain::r_rotate_for_entity;
use crate::qgl::{BlendFactor, Capability, DrawElements, QGl, SubImage, TexEnv};

// ============================================================
// Chains
// ============================================================

/// Per-frame surface lists. Links are stored by surface index so a chain
/// never holds a reference into the model.
#[derive(Debug, Clone)]
pub struct SurfaceChains {
    /// Head per image, next per surface.
    texturechains: Vec<Option<usize>>,
    texturechain: Vec<Option<usize>>,

    /// (surface, animated image) in link order.
    alpha_surfaces: Vec<(usize, usize)>,

    /// Head per lightmap slot, next per surface. Slot 0 collects surfaces
    /// that get a dynamic lightmap in single-texture mode.
    pub lightmap_surfaces: Vec<Option<usize>>,
    pub lightmapchain: Vec<Option<usize>>,

    // a surface is linked at most once between clears
    lightmap_mark: Vec<u32>,
    lightmap_generation: u32,
}

impl Default for SurfaceChains {
    fn default() -> Self {
        Self {
            texturechains: Vec::new(),
            texturechain: Vec::new(),
            alpha_surfaces: Vec::new(),
            lightmap_surfaces: vec![None; MAX_LIGHTMAPS],
            lightmapchain: Vec::new(),
            lightmap_mark: Vec::new(),
            lightmap_generation: 1,
        }
    }
}

fn ensure_len<T: Clone>(v: &mut Vec<T>, idx: usize, fill: T) {
    if v.len() <= idx {
        v.resize(idx + 1, fill);
    }
}

fn collect_chain(head: Option<usize>, next: &[Option<usize>]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut s = head;
    while let Some(si) = s {
        out.push(si);
        s = next.get(si).copied().flatten();
    }
    out
}

impl SurfaceChains {
    pub fn clear_lightmap_chains(&mut self) {
        self.lightmap_surfaces.iter_mut().for_each(|h| *h = None);
        self.lightmap_generation = self.lightmap_generation.wrapping_add(1);
        if self.lightmap_generation == 0 {
            self.lightmap_mark.iter_mut().for_each(|m| *m = 0);
            self.lightmap_generation = 1;
        }
    }

    pub fn link_lightmap(&mut self, surf: usize, slot: usize) {
        ensure_len(&mut self.lightmap_mark, surf, 0);
        if self.lightmap_mark[surf] == self.lightmap_generation {
            return;
        }
        self.lightmap_mark[surf] = self.lightmap_generation;

        ensure_len(&mut self.lightmap_surfaces, slot, None);
        ensure_len(&mut self.lightmapchain, surf, None);
        self.lightmapchain[surf] = self.lightmap_surfaces[slot];
        self.lightmap_surfaces[slot] = Some(surf);
    }

    /// Surfaces of a lightmap slot, most recently linked first.
    pub fn lightmap_chain(&self, slot: usize) -> Vec<usize> {
        collect_chain(
            self.lightmap_surfaces.get(slot).copied().flatten(),
            &self.lightmapchain,
        )
    }

    pub fn link_texture(&mut self, surf: usize, image: usize) {
        ensure_len(&mut self.texturechains, image, None);
        ensure_len(&mut self.texturechain, surf, None);
        self.texturechain[surf] = self.texturechains[image];
        self.texturechains[image] = Some(surf);
    }

    /// Surfaces using an image, most recently linked first.
    pub fn texture_chain(&self, image: usize) -> Vec<usize> {
        collect_chain(
            self.texturechains.get(image).copied().flatten(),
            &self.texturechain,
        )
    }

    pub fn clear_texture_chain(&mut self, image: usize) {
        if let Some(head) = self.texturechains.get_mut(image) {
            *head = None;
        }
    }

    pub fn clear_texture_chains(&mut self) {
        self.texturechains.iter_mut().for_each(|h| *h = None);
    }

    pub fn link_alpha(&mut self, surf: usize, image: usize) {
        self.alpha_surfaces.push((surf, image));
    }

    /// Empties the translucent chain, returning it most recently linked
    /// first. The world walk links front to back, so this is back to front.
    pub fn take_alpha_surfaces(&mut self) -> Vec<(usize, usize)> {
        let mut chain = std::mem::take(&mut self.alpha_surfaces);
        chain.reverse();
        chain
    }

    pub fn has_alpha_surfaces(&self) -> bool {
        !self.alpha_surfaces.is_empty()
    }
}

/// R_DrawGLPolyChain: draws a poly chain straight away with the lightmap
/// coordinates, shifted by the given offset, as the only texcoords.
fn draw_gl_poly_chain(gl: &mut dyn QGl, world: &Model, first: Option<usize>, soffset: f32, toffset: f32) {
    let mut p = first;
    while let Some(pi) = p {
        let poly = &world.polys[pi];
        p = poly.next;

        let n = poly.numverts();
        if n < 3 {
            continue;
        }
        let vertices: Vec<f32> = poly.verts.iter().flat_map(|v| [v[0], v[1], v[2]]).collect();
        let texcoords: Vec<f32> = poly
            .verts
            .iter()
            .flat_map(|v| [v[5] - soffset, v[6] - toffset])
            .collect();
        let indices: Vec<u16> = (1..n as u16 - 1).flat_map(|i| [0, i, i + 1]).collect();

        gl.draw_elements(&DrawElements {
            vertex_size: 3,
            vertices: &vertices,
            texcoords: [Some(texcoords.as_slice()), None],
            colors: None,
            indices: &indices,
        });
    }
}

impl Gl1Renderer {
    fn image_texnum(&self, image: usize) -> i32 {
        self.images.get(image).map_or(0, |i| i.texnum)
    }

    /// Whether the surface's front side faces `modelorg`.
    fn r_surface_faces_eye(&self, world: &Model, surf: usize) -> bool {
        let s = &world.surfaces[surf];
        let plane = &world.planes[s.plane];
        let dot = dot_product(&self.modelorg, &plane.normal) - plane.dist;
        let back = s.flags.contains(MSurfFlags::PLANEBACK);
        (back && dot < -BACKFACE_EPSILON) || (!back && dot > BACKFACE_EPSILON)
    }

    fn r_area_visible(&self, area: i32) -> bool {
        let Some(bits) = self.view.areabits.as_ref() else {
            return true;
        };
        let Ok(area) = usize::try_from(area) else {
            return true;
        };
        bits.get(area >> 3).is_some_and(|b| b & (1 << (area & 7)) != 0)
    }

    // ============================================================
    // PVS
    // ============================================================

    /// R_MarkLeaves: stamps every leaf in the potentially visible set of
    /// the view clusters, and their ancestors, with a new visframe.
    pub fn r_mark_leaves(&mut self, world: &mut Model) {
        if self.r_oldviewcluster == self.r_viewcluster
            && self.r_oldviewcluster2 == self.r_viewcluster2
            && !self.config.novis
            && self.r_viewcluster != -1
        {
            return;
        }

        // development aid to let you run around
        // and see exactly where the pvs ends
        if self.config.lockpvs {
            return;
        }

        self.r_visframecount += 1;
        self.r_oldviewcluster = self.r_viewcluster;
        self.r_oldviewcluster2 = self.r_viewcluster2;
        let visframe = self.r_visframecount;

        if self.config.novis || self.r_viewcluster == -1 || world.vis.is_none() {
            // mark everything
            world.leafs.iter_mut().for_each(|l| l.visframe = visframe);
            world.nodes.iter_mut().for_each(|n| n.visframe = visframe);
            return;
        }

        let mut vis = world.cluster_pvs(self.r_viewcluster);

        // may have to combine two clusters because of solid water boundaries
        if self.r_viewcluster2 != self.r_viewcluster {
            let other = world.cluster_pvs(self.r_viewcluster2);
            for (a, b) in vis.iter_mut().zip(other) {
                *a |= b;
            }
        }

        for li in 0..world.leafs.len() {
            let cluster = world.leafs[li].cluster;
            let Ok(cluster) = usize::try_from(cluster) else {
                continue;
            };
            let visible = vis
                .get(cluster >> 3)
                .is_some_and(|b| b & (1 << (cluster & 7)) != 0);
            if !visible {
                continue;
            }

            let leaf = &mut world.leafs[li];
            leaf.visframe = visframe;
            let mut parent = leaf.parent;
            while let Some(ni) = parent {
                let node = &mut world.nodes[ni];
                if node.visframe == visframe {
                    break;
                }
                node.visframe = visframe;
                parent = node.parent;
            }
        }
    }

    // ============================================================
    // World walk
    // ============================================================

    /// R_RecursiveWorldNode: front to back walk that links visible
    /// surfaces into their chains and clips sky surfaces.
    pub fn r_recursive_world_node(&mut self, world: &mut Model, node: NodeRef, frame: i32) {
        let ni = match node {
            NodeRef::Leaf(li) => {
                let leaf = &world.leafs[li];
                if leaf.contents == CONTENTS_SOLID || leaf.visframe != self.r_visframecount {
                    return;
                }
                let mm = leaf.minmaxs;
                if self.r_cull_box(&[mm[0], mm[1], mm[2]], &[mm[3], mm[4], mm[5]]) {
                    return;
                }

                // check for door connected areas
                if !self.r_area_visible(leaf.area) {
                    return; // not visible
                }

                let (first, num) = (leaf.firstmarksurface, leaf.nummarksurfaces);
                for m in first..first + num {
                    if let Some(&si) = world.marksurfaces.get(m) {
                        world.surfaces[si].visframe = self.r_framecount;
                    }
                }
                return;
            }
            NodeRef::Node(ni) => ni,
        };

        let mnode = &world.nodes[ni];
        if mnode.visframe != self.r_visframecount {
            return;
        }
        let mm = mnode.minmaxs;
        if self.r_cull_box(&[mm[0], mm[1], mm[2]], &[mm[3], mm[4], mm[5]]) {
            return;
        }

        // find which side of the node we are on
        let dot = world.planes[mnode.plane].distance(&self.modelorg);
        let (side, sidebit) = if dot >= 0.0 {
            (0, MSurfFlags::empty())
        } else {
            (1, MSurfFlags::PLANEBACK)
        };
        let children = mnode.children;
        let (first, num) = (mnode.firstsurface, mnode.numsurfaces);

        // recurse down the children, front side first
        self.r_recursive_world_node(world, children[side], frame);

        for si in first..first + num {
            let s = &world.surfaces[si];
            if s.visframe != self.r_framecount {
                continue;
            }
            if (s.flags & MSurfFlags::PLANEBACK) != sidebit {
                continue; // wrong side
            }

            let texinfo = s.texinfo;
            let texflags = world.texinfo[texinfo].flags;

            if texflags.contains(SurfFlags::SKY) {
                // just adds to visible sky bounds
                self.r_add_sky_surface(world, si);
            } else if texflags.is_translucent() {
                // add to the translucent chain
                let image = world.texture_animation(texinfo, frame);
                self.chains.link_alpha(si, image);
            } else {
                let image = world.texture_animation(texinfo, frame);
                self.chains.link_texture(si, image);

                if self.config.multitexture && !texflags.contains(SurfFlags::WARP) {
                    let slot = s.lightmaptexturenum;
                    self.chains.link_lightmap(si, slot);
                }
            }
        }

        // recurse down the back side
        self.r_recursive_world_node(world, children[1 - side], frame);
    }

    // ============================================================
    // Single surfaces
    // ============================================================

    /// R_RenderBrushPoly: single-texture surface. Without multitexture the
    /// surface is also queued for the lightmap blend pass, and a changed
    /// light style is rewritten into its static slot right away.
    pub fn r_render_brush_poly(
        &mut self,
        gl: &mut dyn QGl,
        world: &mut Model,
        surf: usize,
    ) -> Result<(), RefError> {
        self.stats.brush_polys += 1;

        let s = &world.surfaces[surf];
        let texflags = world.texinfo[s.texinfo].flags;

        if s.flags.contains(MSurfFlags::DRAWTURB) {
            self.r_emit_water_polys(gl, world, surf);
            return Ok(());
        }

        if let Some(pi) = s.polys {
            let scroll = if texflags.contains(SurfFlags::FLOWING) {
                flowing_scroll(self.view.time)
            } else {
                0.0
            };
            self.r_draw_gl_poly(gl, &world.polys[pi], scroll, false);
        }

        if self.config.multitexture {
            return Ok(());
        }

        // check for lightmap modification
        let mut maps = 0;
        let mut is_dynamic = false;
        while maps < MAXLIGHTMAPS && s.styles[maps] != 255 {
            if self.lightstyle(s.styles[maps]).white != s.cached_light[maps] {
                is_dynamic = true;
                break;
            }
            maps += 1;
        }

        // dynamic this frame or dynamic previously
        if s.dlightframe == self.r_framecount {
            is_dynamic = true;
        }

        let lit = !texflags.intersects(
            SurfFlags::SKY | SurfFlags::TRANS33 | SurfFlags::TRANS66 | SurfFlags::WARP,
        );
        let slot = s.lightmaptexturenum;

        if !(is_dynamic && self.config.dynamic && lit) {
            self.chains.link_lightmap(surf, slot);
            return Ok(());
        }

        let style_changed = maps < MAXLIGHTMAPS && (s.styles[maps] >= 32 || s.styles[maps] == 0);
        if !style_changed || s.dlightframe == self.r_framecount {
            self.chains.link_lightmap(surf, 0);
            return Ok(());
        }

        let (smax, tmax) = s.lightmap_size();
        let (light_s, light_t) = (s.light_s, s.light_t);
        let texnum = self.state.lightmap_textures + slot as i32;

        // flush what is pending before binding the lightmap
        self.r_update_gl_buffer(gl, BufferedDraw::SingleTex, texnum, 0, BufferFlags::empty(), 1.0);

        let stride = smax as usize * LIGHTMAP_BYTES;
        let mut temp = vec![0u8; stride * tmax as usize];
        self.r_build_light_map(world, surf, &mut temp, stride)?;
        self.r_set_cache_state(&mut world.surfaces[surf]);

        self.state.bind(gl, texnum);
        gl.tex_sub_image_2d(
            texnum,
            &SubImage {
                x: light_s,
                y: light_t,
                width: smax,
                height: tmax,
                row_length: smax,
            },
            &temp,
        );

        self.chains.link_lightmap(surf, slot);
        Ok(())
    }

    /// R_RenderLightmappedPoly: base texture and lightmap in one pass.
    pub fn r_render_lightmapped_poly(&mut self, gl: &mut dyn QGl, world: &Model, surf: usize) {
        self.stats.brush_polys += 1;

        let s = &world.surfaces[surf];
        let scroll = if world.texinfo[s.texinfo].flags.contains(SurfFlags::FLOWING) {
            flowing_scroll(self.view.time)
        } else {
            0.0
        };

        if let Some(pi) = s.polys {
            self.r_draw_gl_poly(gl, &world.polys[pi], scroll, true);
        }
    }

    // ============================================================
    // Chain passes
    // ============================================================

    /// R_DrawTextureChains: draws every opaque chained surface grouped by
    /// texture and empties the texture chains.
    pub fn r_draw_texture_chains(&mut self, gl: &mut dyn QGl, world: &mut Model) -> Result<(), RefError> {
        self.stats.visible_textures = 0;

        if !self.config.multitexture {
            for i in 0..self.images.len() {
                if self.images[i].registration_sequence == 0 {
                    continue;
                }
                let chain = self.chains.texture_chain(i);
                if chain.is_empty() {
                    continue;
                }
                self.stats.visible_textures += 1;

                let texnum = self.images[i].texnum;
                for si in chain {
                    let flags = BufferFlags::from_surface(world.surfaces[si].flags);
                    self.r_update_gl_buffer(gl, BufferedDraw::SingleTex, texnum, 0, flags, 1.0);
                    self.r_render_brush_poly(gl, world, si)?;
                }
                self.chains.clear_texture_chain(i);
            }
            self.r_apply_gl_buffer(gl);
            return Ok(());
        }

        // lightmapped surfaces first
        for i in 0..self.images.len() {
            if self.images[i].registration_sequence == 0 {
                continue;
            }
            let chain = self.chains.texture_chain(i);
            if chain.is_empty() {
                continue;
            }
            self.stats.visible_textures += 1;

            let texnum = self.images[i].texnum;
            for si in chain {
                let s = &world.surfaces[si];
                if s.flags.contains(MSurfFlags::DRAWTURB) {
                    continue;
                }
                let lmtex = s.lightmaptexturenum as i32;
                self.r_update_gl_buffer(gl, BufferedDraw::MultiTex, texnum, lmtex, BufferFlags::empty(), 1.0);
                self.r_render_lightmapped_poly(gl, world, si);
            }
        }
        self.r_apply_gl_buffer(gl);
        self.state.enable_multitexture(gl, &self.config, false);

        // then the liquids
        for i in 0..self.images.len() {
            if self.images[i].registration_sequence == 0 {
                continue;
            }
            let chain = self.chains.texture_chain(i);
            if chain.is_empty() {
                continue;
            }

            let texnum = self.images[i].texnum;
            for si in chain {
                let s = &world.surfaces[si];
                if !s.flags.contains(MSurfFlags::DRAWTURB) {
                    continue;
                }
                let flags = BufferFlags::from_surface(s.flags);
                self.r_update_gl_buffer(gl, BufferedDraw::SingleTex, texnum, 0, flags, 1.0);
                self.r_render_brush_poly(gl, world, si)?;
            }
            self.chains.clear_texture_chain(i);
        }
        self.r_apply_gl_buffer(gl);

        Ok(())
    }

    /// R_BlendLightmaps: single-texture lightmap pass over the lightmap
    /// chains. Surfaces chained to slot 0 get their lightmap packed into
    /// the dynamic atlas, which is uploaded and drawn whenever it fills.
    pub fn r_blend_lightmaps(
        &mut self,
        gl: &mut dyn QGl,
        world: &mut Model,
        is_world: bool,
    ) -> Result<(), RefError> {
        // don't bother if we're set to fullbright or multitexture is enabled
        if self.config.multitexture || self.config.fullbright || !world.has_lightdata() {
            return Ok(());
        }

        // don't bother writing Z
        gl.depth_mask(false);

        // set the appropriate blending mode unless
        // we're only looking at the lightmaps.
        if !self.config.lightmap_only {
            gl.enable(Capability::Blend);
            if self.config.saturatelighting {
                gl.blend_func(BlendFactor::One, BlendFactor::One);
            } else {
                gl.blend_func(BlendFactor::Zero, BlendFactor::SrcColor);
            }
        }

        if is_world {
            self.stats.visible_lightmaps = 0;
        }

        let base = self.state.lightmap_textures;
        let overbright = self.config.overbright_scale();

        // render static lightmaps first
        for i in 1..self.lms.max_lightmaps {
            let chain = self.chains.lightmap_chain(i);
            if chain.is_empty() {
                continue;
            }
            if is_world {
                self.stats.visible_lightmaps += 1;
            }

            self.state.bind(gl, base + i as i32);
            for si in chain {
                let Some(p) = world.surfaces[si].polys else {
                    continue;
                };
                if let Some(scale) = overbright {
                    self.state.tex_env(gl, TexEnv::Combine { rgb_scale: scale });
                }
                draw_gl_poly_chain(gl, world, Some(p), 0.0, 0.0);
            }
        }

        // render dynamic lightmaps
        if self.config.dynamic {
            self.lm_init_block();
            self.state.bind(gl, base);
            if is_world {
                self.stats.visible_lightmaps += 1;
            }

            let chain = self.chains.lightmap_chain(0);
            let mut newdraw = 0;

            for (k, &si) in chain.iter().enumerate() {
                let (smax, tmax) = world.surfaces[si].lightmap_size();

                let (ds, dt) = match self.lms.allocator.alloc_block(smax, tmax) {
                    Some(pos) => pos,
                    None => {
                        // upload what we have so far and draw
                        // all surfaces that use it
                        self.lm_upload_block(gl, true)?;
                        self.r_draw_dynamic_lightmaps(gl, world, &chain[newdraw..k]);
                        newdraw = k;

                        self.lm_init_block();
                        self.lms.allocator.alloc_block(smax, tmax).ok_or(
                            RefError::LightmapAllocFailed {
                                width: smax,
                                height: tmax,
                                kind: LightmapKind::Dynamic,
                            },
                        )?
                    }
                };

                let s = &mut world.surfaces[si];
                s.dlight_s = ds;
                s.dlight_t = dt;

                let ofs = self.lms.texel_offset(ds, dt);
                let row = self.lms.row_bytes();
                let mut buf = std::mem::take(self.lms.buffer_mut(0, 0));
                let built = self.r_build_light_map(world, si, &mut buf[ofs..], row);
                *self.lms.buffer_mut(0, 0) = buf;
                built?;
            }

            // draw remainder of dynamic lightmaps that haven't been uploaded yet
            if newdraw < chain.len() {
                self.lm_upload_block(gl, true)?;
                self.r_draw_dynamic_lightmaps(gl, world, &chain[newdraw..]);
            }
        }

        // restore state
        if overbright.is_some() {
            self.state.tex_env(gl, TexEnv::Replace);
        }
        gl.disable(Capability::Blend);
        gl.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        gl.depth_mask(true);

        Ok(())
    }

    fn r_draw_dynamic_lightmaps(&mut self, gl: &mut dyn QGl, world: &Model, surfs: &[usize]) {
        let bw = self.lms.block_width as f32;
        let bh = self.lms.block_height as f32;
        let overbright = self.config.overbright_scale();

        for &si in surfs {
            let s = &world.surfaces[si];
            if s.polys.is_none() {
                continue;
            }
            if let Some(scale) = overbright {
                self.state.tex_env(gl, TexEnv::Combine { rgb_scale: scale });
            }
            draw_gl_poly_chain(
                gl,
                world,
                s.polys,
                (s.light_s - s.dlight_s) as f32 * (1.0 / bw),
                (s.light_t - s.dlight_t) as f32 * (1.0 / bh),
            );
        }
    }

    /// R_DrawAlphaSurfaces: draws the translucent chain back to front in
    /// world space, then empties it.
    pub fn r_draw_alpha_surfaces(&mut self, gl: &mut dyn QGl, world: &Model) {
        // go back to the world matrix
        gl.load_world_matrix();

        gl.enable(Capability::Blend);
        self.state.tex_env(gl, TexEnv::Modulate);

        for (si, image) in self.chains.take_alpha_surfaces() {
            let s = &world.surfaces[si];
            let texflags = world.texinfo[s.texinfo].flags;

            let alpha = if texflags.contains(SurfFlags::TRANS33) {
                0.33
            } else if texflags.contains(SurfFlags::TRANS66) {
                0.66
            } else {
                1.0
            };

            self.stats.brush_polys += 1;
            let texnum = self.image_texnum(image);
            self.r_update_gl_buffer(gl, BufferedDraw::Alpha, texnum, 0, BufferFlags::empty(), alpha);

            if s.flags.contains(MSurfFlags::DRAWTURB) {
                self.r_emit_water_polys(gl, world, si);
            } else if let Some(pi) = s.polys {
                let scroll = if texflags.contains(SurfFlags::FLOWING) {
                    flowing_scroll(self.view.time)
                } else {
                    0.0
                };
                self.r_draw_gl_poly(gl, &world.polys[pi], scroll, false);
            }
        }

        self.r_apply_gl_buffer(gl);

        self.state.tex_env(gl, TexEnv::Replace);
        gl.color4f(1.0, 1.0, 1.0, 1.0);
        gl.disable(Capability::Blend);
    }

    /// R_DrawTriangleOutlines: wireframe over everything in the lightmap
    /// chains.
    pub fn r_draw_triangle_outlines(&mut self, gl: &mut dyn QGl, world: &Model) {
        if !self.config.showtris {
            return;
        }

        gl.disable(Capability::Texture2D);
        gl.disable(Capability::DepthTest);
        gl.color4f(1.0, 1.0, 1.0, 1.0);

        for slot in 0..self.lms.max_lightmaps {
            for si in self.chains.lightmap_chain(slot) {
                let mut p = world.surfaces[si].polys;
                while let Some(pi) = p {
                    let poly = &world.polys[pi];
                    let v = &poly.verts;
                    for j in 2..v.len() {
                        let strip: Vec<f32> = [&v[0], &v[j - 1], &v[j], &v[0]]
                            .iter()
                            .flat_map(|x| [x[0], x[1], x[2]])
                            .collect();
                        gl.draw_line_strip(&strip);
                    }
                    p = poly.next;
                }
            }
        }

        gl.enable(Capability::DepthTest);
        gl.enable(Capability::Texture2D);
    }

    // ============================================================
    // Brush models
    // ============================================================

    /// A world-space point in the entity's local frame.
    fn r_entity_local_point(ent: &RefEntity, point: &Vec3) -> Vec3 {
        let org = vector_subtract(point, &ent.origin);
        if ent.angles == [0.0; 3] {
            return org;
        }
        let (forward, right, up) = angle_vectors(&ent.angles);
        [
            dot_product(&org, &forward),
            -dot_product(&org, &right),
            dot_product(&org, &up),
        ]
    }

    /// World-space bounds of a brush entity; rotated ones use the radius.
    fn r_entity_bounds(ent: &RefEntity, bmodel: &InlineModel) -> (Vec3, Vec3) {
        let o = ent.origin;
        if ent.angles != [0.0; 3] {
            let r = bmodel.radius;
            (
                [o[0] - r, o[1] - r, o[2] - r],
                [o[0] + r, o[1] + r, o[2] + r],
            )
        } else {
            (
                [o[0] + bmodel.mins[0], o[1] + bmodel.mins[1], o[2] + bmodel.mins[2]],
                [o[0] + bmodel.maxs[0], o[1] + bmodel.maxs[1], o[2] + bmodel.maxs[2]],
            )
        }
    }

    /// Marks the frame's dlights on a brush entity's own subtree. Lights are
    /// moved and rotated into the entity's frame first since its planes are
    /// local.
    fn r_mark_entity_lights(&self, world: &mut Model, ent: &RefEntity, bmodel: &InlineModel) {
        for (k, dl) in self.dlights.iter().take(MAX_DLIGHTS).enumerate() {
            let local = DLight {
                origin: Self::r_entity_local_point(ent, &dl.origin),
                ..*dl
            };
            self.r_mark_lights(world, &local, 1 << k, NodeRef::Node(bmodel.headnode));
        }
    }

    /// R_DrawInlineBModel
    fn r_draw_inline_bmodel(
        &mut self,
        gl: &mut dyn QGl,
        world: &mut Model,
        ent: &RefEntity,
        bmodel: &InlineModel,
    ) -> Result<(), RefError> {
        // calculate dynamic lighting for bmodel
        if !self.config.multitexture && !self.config.flashblend {
            self.r_mark_entity_lights(world, ent, bmodel);
        }

        let translucent = ent.flags.contains(RenderFx::TRANSLUCENT);
        if translucent {
            gl.enable(Capability::Blend);
            gl.color4f(1.0, 1.0, 1.0, 0.25);
            self.state.tex_env(gl, TexEnv::Modulate);
        }

        let first = bmodel.firstmodelsurface;
        for si in first..first + bmodel.nummodelsurfaces {
            // draw the polygon
            if !self.r_surface_faces_eye(world, si) {
                continue;
            }

            let s = &world.surfaces[si];
            let texinfo = s.texinfo;
            let image = world.texture_animation(texinfo, ent.frame);

            if world.texinfo[texinfo].flags.is_translucent() {
                // add to the translucent chain
                self.chains.link_alpha(si, image);
                continue;
            }

            let texnum = self.image_texnum(image);
            if self.config.multitexture && !s.flags.contains(MSurfFlags::DRAWTURB) {
                let lmtex = s.lightmaptexturenum as i32;
                self.state.enable_multitexture(gl, &self.config, true);
                self.r_update_gl_buffer(gl, BufferedDraw::MultiTex, texnum, lmtex, BufferFlags::empty(), 1.0);
                self.r_render_lightmapped_poly(gl, world, si);
            } else {
                let flags = BufferFlags::from_surface(s.flags);
                self.state.enable_multitexture(gl, &self.config, false);
                self.r_update_gl_buffer(gl, BufferedDraw::SingleTex, texnum, 0, flags, 1.0);
                self.r_render_brush_poly(gl, world, si)?;
            }
        }

        self.r_apply_gl_buffer(gl);

        if !translucent {
            self.r_blend_lightmaps(gl, world, false)?;
        } else {
            gl.disable(Capability::Blend);
            gl.color4f(1.0, 1.0, 1.0, 1.0);
            self.state.tex_env(gl, TexEnv::Replace);
        }

        Ok(())
    }

    /// R_DrawBrushModel: culls a brush entity, moves into its frame and
    /// draws its surfaces.
    pub fn r_draw_brush_model(
        &mut self,
        gl: &mut dyn QGl,
        world: &mut Model,
        ent: &RefEntity,
    ) -> Result<(), RefError> {
        let Some(bmodel) = ent.model.and_then(|m| world.submodels.get(m)).cloned() else {
            return Ok(());
        };
        if bmodel.nummodelsurfaces == 0 {
            return Ok(());
        }

        self.state.invalidate_textures();

        let (mins, maxs) = Self::r_entity_bounds(ent, &bmodel);
        if self.r_cull_box(&mins, &maxs) {
            return Ok(());
        }

        if self.config.zfix {
            gl.enable(Capability::PolygonOffsetFill);
        }

        gl.color4f(1.0, 1.0, 1.0, 1.0);
        self.chains.clear_lightmap_chains();

        self.modelorg = Self::r_entity_local_point(ent, &self.r_origin);

        gl.push_matrix();
        let angles = [-ent.angles[0], ent.angles[1], -ent.angles[2]]; // stupid quake bug
        r_rotate_for_entity(gl, &ent.origin, &angles);

        let mode = if self.config.lightmap_only {
            TexEnv::Replace
        } else {
            TexEnv::Modulate
        };
        self.state.tex_env(gl, mode);

        let drawn = self.r_draw_inline_bmodel(gl, world, ent, &bmodel);

        gl.pop_matrix();

        if self.config.zfix {
            gl.disable(Capability::PolygonOffsetFill);
        }

        drawn
    }

    /// R_GetBrushesLighting: with multitexture, brush entity surfaces are
    /// chained before the lightmap regeneration so their dynamic light is
    /// part of this frame's atlas update.
    pub fn r_get_brushes_lighting(&mut self, world: &mut Model, entities: &[RefEntity]) {
        if !self.config.multitexture || !self.config.drawentities || self.config.flashblend {
            return;
        }

        for ent in entities {
            if ent.flags.contains(RenderFx::BEAM) {
                continue;
            }
            let Some(bmodel) = ent.model.and_then(|m| world.submodels.get(m)).cloned() else {
                continue;
            };
            if bmodel.nummodelsurfaces == 0 {
                continue;
            }

            let (mins, maxs) = Self::r_entity_bounds(ent, &bmodel);
            if self.r_cull_box(&mins, &maxs) {
                continue;
            }

            self.r_mark_entity_lights(world, ent, &bmodel);
            self.modelorg = Self::r_entity_local_point(ent, &self.r_origin);

            let first = bmodel.firstmodelsurface;
            for si in first..first + bmodel.nummodelsurfaces {
                let s = &world.surfaces[si];
                if world.texinfo[s.texinfo]
                    .flags
                    .intersects(SurfFlags::TRANS33 | SurfFlags::TRANS66 | SurfFlags::WARP)
                    || s.flags.contains(MSurfFlags::DRAWTURB)
                {
                    continue;
                }
                if self.r_surface_faces_eye(world, si) {
                    let slot = s.lightmaptexturenum;
                    self.chains.link_lightmap(si, slot);
                }
            }
        }

        self.modelorg = self.r_origin;
    }

    // ============================================================
    // World
    // ============================================================

    /// R_DrawWorld: walks the visible tree and draws the opaque world,
    /// its lightmaps and the sky. Translucent surfaces stay chained for
    /// `r_draw_alpha_surfaces`.
    pub fn r_draw_world(
        &mut self,
        gl: &mut dyn QGl,
        world: &mut Model,
        entities: &[RefEntity],
    ) -> Result<(), RefError> {
        if !self.config.drawworld || self.view.rdflags.contains(RdFlags::NOWORLDMODEL) {
            return Ok(());
        }

        self.modelorg = self.r_origin;

        // auto cycle the world frame for texture animation
        let frame = (self.view.time * 2.0) as i32;

        self.state.invalidate_textures();
        self.buf.reset();
        self.buf.currenttexture = [0; 2];

        gl.color4f(1.0, 1.0, 1.0, 1.0);
        self.chains.clear_lightmap_chains();
        self.chains.clear_texture_chains();

        self.sky.clear();

        if !world.nodes.is_empty() {
            self.r_recursive_world_node(world, NodeRef::Node(0), frame);
        }

        // surfaces of brush entities get their lightmaps updated
        // together with the world's
        self.r_get_brushes_lighting(world, entities);

        self.r_regen_all_lightmaps(gl, world)?;

        self.r_draw_texture_chains(gl, world)?;
        self.r_blend_lightmaps(gl, world, true)?;

        self.r_draw_sky_box(gl);
        self.r_draw_triangle_outlines(gl, world);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl1_lightmap::{LightmapAllocator, LightmapState};
    use crate::gl1_local::{Gl1Config, GlCaps, TEXNUM_LIGHTMAPS};
    use crate::gl1_model_types::fixtures::*;
    use crate::gl1_model_types::VisData;
    use crate::qgl::recorder::{GlCall, GlRecorder};
    use yq2_common::q_shared::LightStyle;

    fn setup(config: Gl1Config, model: (Model, Vec<Vec<Vec3>>)) -> (Gl1Renderer, Model, GlRecorder) {
        load(Gl1Renderer::new(GlCaps::default(), Gl1Config { cull: false, ..config }), model)
    }

    fn load(mut r: Gl1Renderer, model: (Model, Vec<Vec<Vec3>>)) -> (Gl1Renderer, Model, GlRecorder) {
        let (mut world, verts) = model;
        r.register_image("near", 10, 64, 64);
        r.register_image("far", 11, 64, 64);
        let mut gl = GlRecorder::new();
        r.build_lightmaps(&mut gl, &mut world).unwrap();
        build_polys(&mut world, &verts, &r.images, (r.lms.block_width, r.lms.block_height));
        gl.clear();
        (r, world, gl)
    }

    fn begin_frame(r: &mut Gl1Renderer, world: &mut Model, eye: Vec3) {
        r.r_framecount += 1;
        r.r_origin = eye;
        let leaf = world.point_in_leaf(&eye);
        r.r_viewcluster = world.leafs[leaf].cluster;
        r.r_viewcluster2 = r.r_viewcluster;
        r.r_mark_leaves(world);
    }

    fn two_cluster_vis() -> VisData {
        VisData {
            numclusters: 2,
            bitofs: vec![[0, 0], [1, 0]],
            data: vec![0x01, 0x02],
        }
    }

    fn submodel() -> InlineModel {
        InlineModel {
            mins: [-32.0, -32.0, -1.0],
            maxs: [32.0, 32.0, 1.0],
            radius: 46.0,
            headnode: 0,
            firstmodelsurface: 0,
            nummodelsurfaces: 1,
        }
    }

    // -------------------------------------------------------
    // Chains
    // -------------------------------------------------------

    #[test]
    fn test_chains_are_most_recent_first() {
        let mut c = SurfaceChains::default();
        c.link_texture(3, 0);
        c.link_texture(7, 0);
        c.link_texture(5, 2);
        assert_eq!(c.texture_chain(0), vec![7, 3]);
        assert_eq!(c.texture_chain(2), vec![5]);
        assert!(c.texture_chain(1).is_empty());
        c.clear_texture_chain(0);
        assert!(c.texture_chain(0).is_empty());
    }

    #[test]
    fn test_lightmap_link_is_once_per_clear() {
        let mut c = SurfaceChains::default();
        c.link_lightmap(4, 1);
        c.link_lightmap(4, 1);
        c.link_lightmap(2, 1);
        assert_eq!(c.lightmap_chain(1), vec![2, 4]);

        c.clear_lightmap_chains();
        assert!(c.lightmap_chain(1).is_empty());
        c.link_lightmap(4, 3);
        assert_eq!(c.lightmap_chain(3), vec![4]);
    }

    #[test]
    fn test_alpha_chain_reverses_link_order() {
        let mut c = SurfaceChains::default();
        c.link_alpha(0, 5);
        c.link_alpha(1, 6);
        assert!(c.has_alpha_surfaces());
        assert_eq!(c.take_alpha_surfaces(), vec![(1, 6), (0, 5)]);
        assert!(!c.has_alpha_surfaces());
    }

    // -------------------------------------------------------
    // PVS
    // -------------------------------------------------------

    #[test]
    fn test_mark_leaves_stamps_visible_cluster_and_parents() {
        let (mut world, _) = floor_model(SurfFlags::empty());
        world.vis = Some(two_cluster_vis());
        let mut r = Gl1Renderer::new(GlCaps::default(), Gl1Config::default());

        r.r_viewcluster = 0;
        r.r_viewcluster2 = 0;
        r.r_mark_leaves(&mut world);
        assert_eq!(r.r_visframecount, 1);
        assert_eq!(world.leafs[1].visframe, 1);
        assert_eq!(world.leafs[2].visframe, 0);
        assert_eq!(world.nodes[0].visframe, 1);

        // same clusters again: nothing to redo
        r.r_mark_leaves(&mut world);
        assert_eq!(r.r_visframecount, 1);

        r.r_viewcluster = 1;
        r.r_viewcluster2 = 1;
        r.r_mark_leaves(&mut world);
        assert_eq!(r.r_visframecount, 2);
        assert_eq!(world.leafs[1].visframe, 1);
        assert_eq!(world.leafs[2].visframe, 2);
        assert_eq!(world.nodes[0].visframe, 2);
    }

    #[test]
    fn test_mark_leaves_merges_second_cluster() {
        let (mut world, _) = floor_model(SurfFlags::empty());
        world.vis = Some(two_cluster_vis());
        let mut r = Gl1Renderer::new(GlCaps::default(), Gl1Config::default());

        r.r_viewcluster = 0;
        r.r_viewcluster2 = 1;
        r.r_mark_leaves(&mut world);
        assert_eq!(world.leafs[1].visframe, 1);
        assert_eq!(world.leafs[2].visframe, 1);
    }

    #[test]
    fn test_mark_leaves_novis_marks_everything_every_call() {
        let (mut world, _) = floor_model(SurfFlags::empty());
        world.vis = Some(two_cluster_vis());
        let mut r = Gl1Renderer::new(
            GlCaps::default(),
            Gl1Config {
                novis: true,
                ..Default::default()
            },
        );
        r.r_viewcluster = 0;
        r.r_viewcluster2 = 0;
        r.r_mark_leaves(&mut world);
        r.r_mark_leaves(&mut world);
        assert_eq!(r.r_visframecount, 2);
        assert!(world.leafs.iter().all(|l| l.visframe == 2));
        assert!(world.nodes.iter().all(|n| n.visframe == 2));
    }

    #[test]
    fn test_mark_leaves_outside_the_map_marks_everything() {
        let (mut world, _) = floor_model(SurfFlags::empty());
        world.vis = Some(two_cluster_vis());
        let mut r = Gl1Renderer::new(GlCaps::default(), Gl1Config::default());
        r.r_viewcluster = -1;
        r.r_viewcluster2 = -1;
        r.r_mark_leaves(&mut world);
        assert!(world.leafs.iter().all(|l| l.visframe == 1));
    }

    #[test]
    fn test_mark_leaves_lockpvs_keeps_old_set() {
        let (mut world, _) = floor_model(SurfFlags::empty());
        world.vis = Some(two_cluster_vis());
        let mut r = Gl1Renderer::new(GlCaps::default(), Gl1Config::default());
        r.r_viewcluster = 0;
        r.r_viewcluster2 = 0;
        r.r_mark_leaves(&mut world);

        r.config.lockpvs = true;
        r.r_viewcluster = 1;
        r.r_viewcluster2 = 1;
        r.r_mark_leaves(&mut world);
        assert_eq!(r.r_visframecount, 1);
        assert_eq!(world.leafs[2].visframe, 0);
    }

    // -------------------------------------------------------
    // World walk
    // -------------------------------------------------------

    #[test]
    fn test_walk_chains_front_facing_surface() {
        let (mut r, mut world, _) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.modelorg = r.r_origin;
        r.r_recursive_world_node(&mut world, NodeRef::Node(0), 0);

        assert_eq!(world.surfaces[0].visframe, r.r_framecount);
        assert_eq!(r.chains.texture_chain(0), vec![0]);
        assert_eq!(r.chains.lightmap_chain(1), vec![0]);
    }

    #[test]
    fn test_walk_skips_surface_seen_from_behind() {
        let (mut r, mut world, _) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, -50.0]);
        r.modelorg = r.r_origin;
        r.r_recursive_world_node(&mut world, NodeRef::Node(0), 0);

        assert!(r.chains.texture_chain(0).is_empty());
        assert!(r.chains.lightmap_chain(1).is_empty());
    }

    #[test]
    fn test_walk_respects_areabits() {
        let (mut r, mut world, _) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        world.leafs[1].area = 3;
        r.view.areabits = Some(vec![0b0000_0001]);
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.modelorg = r.r_origin;
        r.r_recursive_world_node(&mut world, NodeRef::Node(0), 0);
        assert!(r.chains.texture_chain(0).is_empty());

        r.view.areabits = Some(vec![0b0000_1000]);
        r.r_recursive_world_node(&mut world, NodeRef::Node(0), 0);
        assert_eq!(r.chains.texture_chain(0), vec![0]);
    }

    #[test]
    fn test_sky_surface_only_grows_sky_bounds() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::SKY));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        assert!(r.chains.texture_chain(0).is_empty());
        assert!(r.sky.face_visible(5));
        assert!(gl.draws().is_empty());
    }

    // -------------------------------------------------------
    // Opaque world
    // -------------------------------------------------------

    #[test]
    fn test_world_multitexture_single_batch() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].textures, [10, TEXNUM_LIGHTMAPS + 1]);
        assert!(draws[0].multitexture);
        assert_eq!(draws[0].vertex_count(), 4);
        assert_eq!(draws[0].indices.len(), 6);
        assert_eq!(r.stats.brush_polys, 1);
        assert_eq!(r.stats.visible_textures, 1);
    }

    #[test]
    fn test_world_single_texture_blends_lightmaps() {
        let config = Gl1Config {
            multitexture: false,
            ..Default::default()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        let draws = gl.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].textures[0], 10);
        assert!(!draws[0].blend);
        assert_eq!(draws[1].textures[0], TEXNUM_LIGHTMAPS + 1);
        assert!(draws[1].blend);

        // lightmap coordinates are the only texcoords of the blend pass
        let poly = &world.polys[world.surfaces[0].polys.unwrap()];
        let tc = draws[1].texcoords[0].as_ref().unwrap();
        assert_eq!(tc[0], poly.verts[0][5]);
        assert_eq!(tc[1], poly.verts[0][6]);

        assert!(gl.calls.contains(&GlCall::BlendFunc(BlendFactor::Zero, BlendFactor::SrcColor)));
        let n = gl.calls.len();
        assert_eq!(
            &gl.calls[n - 3..],
            &[
                GlCall::Disable(Capability::Blend),
                GlCall::BlendFunc(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
                GlCall::DepthMask(true),
            ]
        );
        // the static slot and the dynamic one
        assert_eq!(r.stats.visible_lightmaps, 2);
    }

    #[test]
    fn test_single_texture_dlight_goes_through_dynamic_atlas() {
        let config = Gl1Config {
            multitexture: false,
            ..Default::default()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        r.dlights = vec![DLight {
            origin: [0.0, 0.0, 16.0],
            color: [1.0, 1.0, 1.0],
            intensity: 200.0,
        }];
        r.r_push_dlights(&mut world);
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        assert_eq!((world.surfaces[0].dlight_s, world.surfaces[0].dlight_t), (0, 0));
        assert_eq!(
            gl.sub_images(),
            vec![(
                TEXNUM_LIGHTMAPS,
                SubImage {
                    x: 0,
                    y: 0,
                    width: 128,
                    height: 5,
                    row_length: 128
                }
            )]
        );
        let draws = gl.draws();
        assert_eq!(draws.last().unwrap().textures[0], TEXNUM_LIGHTMAPS);
        assert!(draws.iter().all(|d| d.textures[0] != TEXNUM_LIGHTMAPS + 1));
    }

    #[test]
    fn test_single_texture_style_change_updates_static_slot() {
        let config = Gl1Config {
            multitexture: false,
            ..Default::default()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        r.lightstyles[0] = LightStyle::uniform(2.0);
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        assert_eq!(
            gl.sub_images(),
            vec![(
                TEXNUM_LIGHTMAPS + 1,
                SubImage {
                    x: 0,
                    y: 0,
                    width: 5,
                    height: 5,
                    row_length: 5
                }
            )]
        );
        assert_eq!(world.surfaces[0].cached_light[0], 6.0);
        // the base poly was flushed before the lightmap bind
        let draws = gl.draws();
        assert_eq!(draws[0].textures[0], 10);
        assert_eq!(draws.last().unwrap().textures[0], TEXNUM_LIGHTMAPS + 1);
    }

    #[test]
    fn test_liquids_drawn_after_lightmapped_pass() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::WARP));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].textures[0], 10);
        assert!(!draws[0].multitexture);
        // liquids never get a lightmap chain entry
        assert!(r.chains.lightmap_chain(1).is_empty());
    }

    #[test]
    fn test_showtris_outlines_every_triangle() {
        let config = Gl1Config {
            showtris: true,
            ..Default::default()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        let strips: Vec<&Vec<f32>> = gl
            .calls
            .iter()
            .filter_map(|c| match c {
                GlCall::LineStrip(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(strips.len(), 2);
        assert_eq!(strips[0].len(), 12);
        assert_eq!(strips[0][..3], strips[0][9..]);
        assert_eq!(gl.calls.last(), Some(&GlCall::Enable(Capability::Texture2D)));
    }

    fn single_texture() -> Gl1Config {
        Gl1Config {
            multitexture: false,
            ..Default::default()
        }
    }

    /// Reaches both corridor walls from the near side.
    fn corridor_light() -> DLight {
        DLight {
            origin: [-20.0, 0.0, 0.0],
            color: [1.0, 1.0, 1.0],
            intensity: 200.0,
        }
    }

    #[test]
    fn test_dynamic_atlas_uploads_and_restarts_when_full() {
        let mut r = Gl1Renderer::new(GlCaps::default(), Gl1Config { cull: false, ..single_texture() });
        // two 5x5 lightmaps never share an 8x8 atlas
        r.lms = LightmapState::new(8, 8, 8);
        let (mut r, mut world, mut gl) = load(r, corridor_model(SurfFlags::empty(), SurfFlags::empty()));

        r.dlights = vec![corridor_light()];
        r.r_push_dlights(&mut world);
        begin_frame(&mut r, &mut world, [-50.0, 0.0, 0.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        let rect = SubImage {
            x: 0,
            y: 0,
            width: 8,
            height: 5,
            row_length: 8,
        };
        assert_eq!(
            gl.sub_images(),
            vec![(TEXNUM_LIGHTMAPS, rect), (TEXNUM_LIGHTMAPS, rect)]
        );
        let dynamic = gl
            .draws()
            .iter()
            .filter(|d| d.textures[0] == TEXNUM_LIGHTMAPS)
            .count();
        assert_eq!(dynamic, 2);
        // both were placed at the origin of a freshly reset atlas
        for s in &world.surfaces {
            assert_eq!((s.dlight_s, s.dlight_t), (0, 0));
        }
    }

    #[test]
    fn test_dynamic_atlas_too_small_for_one_surface() {
        let (mut r, mut world, mut gl) = setup(single_texture(), floor_model(SurfFlags::empty()));
        r.lms.allocator = LightmapAllocator::new(4, 4);

        r.dlights = vec![DLight {
            origin: [0.0, 0.0, 16.0],
            color: [1.0, 1.0, 1.0],
            intensity: 200.0,
        }];
        r.r_push_dlights(&mut world);
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);

        assert_eq!(
            r.r_draw_world(&mut gl, &mut world, &[]),
            Err(RefError::LightmapAllocFailed {
                width: 5,
                height: 5,
                kind: LightmapKind::Dynamic,
            })
        );
        assert!(gl.sub_images().is_empty());
    }

    #[test]
    fn test_saturatelighting_adds_lightmaps() {
        let config = Gl1Config {
            saturatelighting: true,
            ..single_texture()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        assert!(gl.calls.contains(&GlCall::BlendFunc(BlendFactor::One, BlendFactor::One)));
        assert!(!gl.calls.contains(&GlCall::BlendFunc(BlendFactor::Zero, BlendFactor::SrcColor)));
        assert!(gl.draws()[1].blend);
    }

    #[test]
    fn test_lightmap_only_draws_lightmaps_unblended() {
        let config = Gl1Config {
            lightmap_only: true,
            ..single_texture()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        let draws = gl.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].textures[0], TEXNUM_LIGHTMAPS + 1);
        assert!(!draws[1].blend);
        assert!(!gl.calls.contains(&GlCall::Enable(Capability::Blend)));
    }

    #[test]
    fn test_lightmap_only_replaces_on_brush_models() {
        let config = Gl1Config {
            lightmap_only: true,
            ..Default::default()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        world.submodels.push(submodel());
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);

        r.r_draw_brush_model(&mut gl, &mut world, &brush_entity([0.0; 3]))
            .unwrap();
        assert!(gl.calls.contains(&GlCall::EnableTextureUnit { tmu: 1, enable: true }));
        assert!(!gl.calls.contains(&GlCall::TexEnv {
            tmu: 1,
            mode: TexEnv::Modulate
        }));
    }

    #[test]
    fn test_fullbright_skips_lightmaps() {
        let config = Gl1Config {
            fullbright: true,
            ..single_texture()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();

        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].textures[0], 10);
        assert!(!gl.calls.contains(&GlCall::DepthMask(false)));
        assert_eq!(r.stats.visible_lightmaps, 0);
    }

    #[test]
    fn test_noworldmodel_draws_nothing() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.view.rdflags = RdFlags::NOWORLDMODEL;
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();
        assert!(gl.calls.is_empty());
    }

    // -------------------------------------------------------
    // Translucency
    // -------------------------------------------------------

    #[test]
    fn test_translucent_surfaces_drawn_back_to_front() {
        let trans = SurfFlags::TRANS33;
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), corridor_model(trans, trans));
        begin_frame(&mut r, &mut world, [-50.0, 0.0, 0.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();
        assert!(gl.draws().is_empty());

        r.r_draw_alpha_surfaces(&mut gl, &world);
        let draws = gl.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].textures[0], 11);
        assert_eq!(draws[1].textures[0], 10);
        for d in &draws {
            assert!(d.blend);
            assert_eq!(d.color, [0.5, 0.5, 0.5, 0.33]);
        }
        assert!(!r.chains.has_alpha_surfaces());
        assert_eq!(gl.calls.last(), Some(&GlCall::Disable(Capability::Blend)));
    }

    #[test]
    fn test_trans66_alpha() {
        let (mut r, mut world, mut gl) = setup(
            Gl1Config::default(),
            corridor_model(SurfFlags::TRANS66, SurfFlags::empty()),
        );
        begin_frame(&mut r, &mut world, [-50.0, 0.0, 0.0]);
        r.r_draw_world(&mut gl, &mut world, &[]).unwrap();
        gl.clear();
        r.r_draw_alpha_surfaces(&mut gl, &world);
        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].color[3], 0.66);
    }

    // -------------------------------------------------------
    // Brush models
    // -------------------------------------------------------

    fn brush_entity(origin: Vec3) -> RefEntity {
        RefEntity {
            model: Some(0),
            origin,
            ..Default::default()
        }
    }

    #[test]
    fn test_brush_model_drawn_in_entity_frame() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        world.submodels.push(submodel());
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);

        r.r_draw_brush_model(&mut gl, &mut world, &brush_entity([0.0, 0.0, 10.0]))
            .unwrap();

        assert_eq!(r.modelorg, [0.0, 0.0, 40.0]);
        let push = gl.calls.iter().position(|c| *c == GlCall::PushMatrix).unwrap();
        let draw = gl.calls.iter().position(|c| matches!(c, GlCall::Draw(_))).unwrap();
        let pop = gl.calls.iter().position(|c| *c == GlCall::PopMatrix).unwrap();
        assert!(push < draw && draw < pop);
        assert_eq!(gl.calls[push + 1], GlCall::Translate([0.0, 0.0, 10.0]));

        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].textures, [10, TEXNUM_LIGHTMAPS + 1]);
    }

    #[test]
    fn test_brush_model_zfix_offsets_fill() {
        let config = Gl1Config {
            zfix: true,
            ..Default::default()
        };
        let (mut r, mut world, mut gl) = setup(config, floor_model(SurfFlags::empty()));
        world.submodels.push(submodel());
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);

        r.r_draw_brush_model(&mut gl, &mut world, &brush_entity([0.0; 3]))
            .unwrap();

        let on = gl
            .calls
            .iter()
            .position(|c| *c == GlCall::Enable(Capability::PolygonOffsetFill))
            .unwrap();
        let off = gl
            .calls
            .iter()
            .position(|c| *c == GlCall::Disable(Capability::PolygonOffsetFill))
            .unwrap();
        let push = gl.calls.iter().position(|c| *c == GlCall::PushMatrix).unwrap();
        let pop = gl.calls.iter().position(|c| *c == GlCall::PopMatrix).unwrap();
        assert!(on < push && pop < off);
    }

    #[test]
    fn test_brush_model_without_zfix_keeps_fill() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        world.submodels.push(submodel());
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);

        r.r_draw_brush_model(&mut gl, &mut world, &brush_entity([0.0; 3]))
            .unwrap();
        assert!(!gl.calls.contains(&GlCall::Enable(Capability::PolygonOffsetFill)));
    }

    #[test]
    fn test_entity_dlights_follow_rotation() {
        let (mut r, mut world, _) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        let bmodel = submodel();
        // pitched 90 degrees, the local floor normal is world +x
        let ent = RefEntity {
            angles: [90.0, 0.0, 0.0],
            ..brush_entity([0.0; 3])
        };
        let light = DLight {
            origin: [30.0, 0.0, 100.0],
            color: [1.0, 1.0, 1.0],
            intensity: 100.0,
        };

        r.r_dlightframecount = 5;
        r.dlights = vec![light];
        r.r_mark_entity_lights(&mut world, &ent, &bmodel);
        assert_eq!(world.surfaces[0].dlightframe, 5);
        assert_eq!(world.surfaces[0].dlightbits, 1);

        // on the back side of the rotated floor
        r.r_dlightframecount = 6;
        r.dlights = vec![DLight {
            origin: [-30.0, 0.0, 0.0],
            ..light
        }];
        r.r_mark_entity_lights(&mut world, &ent, &bmodel);
        assert_eq!(world.surfaces[0].dlightframe, 5);
    }

    #[test]
    fn test_brush_model_backface_culled() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        world.submodels.push(submodel());
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);

        // eye is below the entity's floor
        r.r_draw_brush_model(&mut gl, &mut world, &brush_entity([0.0, 0.0, 100.0]))
            .unwrap();
        assert!(gl.draws().is_empty());
    }

    #[test]
    fn test_brush_model_rotation_and_translucency() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        world.submodels.push(submodel());
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);

        let ent = RefEntity {
            angles: [0.0, 90.0, 0.0],
            flags: RenderFx::TRANSLUCENT,
            ..brush_entity([0.0, 0.0, 0.0])
        };
        r.r_draw_brush_model(&mut gl, &mut world, &ent).unwrap();

        assert!(gl.calls.contains(&GlCall::Rotate(90.0, [0.0, 0.0, 1.0])));
        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        assert!(draws[0].blend);
        assert_eq!(draws[0].color, [1.0, 1.0, 1.0, 0.25]);
        assert!(gl.calls.contains(&GlCall::Disable(Capability::Blend)));
    }

    #[test]
    fn test_brush_model_without_surfaces_is_skipped() {
        let (mut r, mut world, mut gl) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        world.submodels.push(InlineModel {
            nummodelsurfaces: 0,
            ..submodel()
        });
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.r_draw_brush_model(&mut gl, &mut world, &brush_entity([0.0; 3]))
            .unwrap();
        assert!(gl.calls.is_empty());
    }

    #[test]
    fn test_brushes_lighting_chains_entity_surfaces_once() {
        let (mut r, mut world, _) = setup(Gl1Config::default(), floor_model(SurfFlags::empty()));
        world.submodels.push(submodel());
        begin_frame(&mut r, &mut world, [0.0, 0.0, 50.0]);
        r.chains.clear_lightmap_chains();

        let ent = brush_entity([0.0; 3]);
        let beam = RefEntity {
            flags: RenderFx::BEAM,
            ..brush_entity([0.0; 3])
        };
        r.r_get_brushes_lighting(&mut world, &[ent.clone(), ent, beam]);
        assert_eq!(r.chains.lightmap_chain(1), vec![0]);
        assert_eq!(r.modelorg, r.r_origin);
    }
}

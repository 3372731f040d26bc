// gl1_light.rs — dynamic light marking and per-surface lightmap texel computation

use yq2_common::q_shared::{dot_product, DLight, SurfFlags, MAX_DLIGHTS};

use crate::gl1_local::{Gl1Renderer, RefError, LIGHTMAP_BYTES};
use crate::gl1_model_types::{MSurfFlags, MSurface, Model, NodeRef, MAXLIGHTMAPS};

pub const DLIGHT_CUTOFF: f32 = 16.0;

// ============================================================
// Texel helpers
// ============================================================

/// Quake 2 distance approximation: max(sd, td) + min(sd, td) / 2.
pub fn approx_distance(sd: i32, td: i32) -> f32 {
    let sd = sd.abs();
    let td = td.abs();
    if sd > td {
        sd as f32 + (td >> 1) as f32
    } else {
        td as f32 + (sd >> 1) as f32
    }
}

/// Clamps accumulated light to a texel. Negative channels become 0; if the
/// brightest channel passes 255 every channel is scaled down with it, so
/// the hue survives. Alpha carries the brightest channel.
pub fn blocklights_to_rgba(bl: &[f32]) -> [u8; 4] {
    let mut r = (bl[0] as i32).max(0);
    let mut g = (bl[1] as i32).max(0);
    let mut b = (bl[2] as i32).max(0);

    let max = r.max(g).max(b);
    let mut a = max;

    if max > 255 {
        let t = 255.0 / max as f32;
        r = (r as f32 * t) as i32;
        g = (g as f32 * t) as i32;
        b = (b as f32 * t) as i32;
        a = (a as f32 * t) as i32;
    }

    [r as u8, g as u8, b as u8, a as u8]
}

fn texinfo_is_unlit(flags: SurfFlags) -> bool {
    flags.intersects(SurfFlags::SKY | SurfFlags::TRANS33 | SurfFlags::TRANS66 | SurfFlags::WARP)
}

impl Gl1Renderer {
    // ============================================================
    // DYNAMIC LIGHTS — BSP marking
    // ============================================================

    /// R_MarkLights: stamps `bit` on the surfaces within reach of `light`
    /// that face it.
    pub fn r_mark_lights(&self, world: &mut Model, light: &DLight, bit: u32, node: NodeRef) {
        let NodeRef::Node(n) = node else {
            return;
        };

        let (plane, children, first, num) = {
            let mn = &world.nodes[n];
            (mn.plane, mn.children, mn.firstsurface, mn.numsurfaces)
        };

        let splitplane = &world.planes[plane];
        let dist = dot_product(&light.origin, &splitplane.normal) - splitplane.dist;

        if dist > light.intensity - DLIGHT_CUTOFF {
            self.r_mark_lights(world, light, bit, children[0]);
            return;
        }
        if dist < -light.intensity + DLIGHT_CUTOFF {
            self.r_mark_lights(world, light, bit, children[1]);
            return;
        }

        // mark the polygons
        for i in first..first + num {
            let p = &world.planes[world.surfaces[i].plane];
            let dist2 = dot_product(&light.origin, &p.normal) - p.dist;
            let sidebit = if dist2 >= 0.0 {
                MSurfFlags::empty()
            } else {
                MSurfFlags::PLANEBACK
            };

            let surf = &mut world.surfaces[i];
            if (surf.flags & MSurfFlags::PLANEBACK) != sidebit {
                continue;
            }

            if surf.dlightframe != self.r_dlightframecount {
                surf.dlightbits = 0;
                surf.dlightframe = self.r_dlightframecount;
            }
            surf.dlightbits |= bit;
        }

        self.r_mark_lights(world, light, bit, children[0]);
        self.r_mark_lights(world, light, bit, children[1]);
    }

    /// R_PushDlights. Runs before the frame counter advances, so the stamp
    /// is the upcoming frame.
    pub fn r_push_dlights(&mut self, world: &mut Model) {
        if self.config.flashblend || !self.config.dynamic || world.nodes.is_empty() {
            return;
        }

        self.r_dlightframecount = self.r_framecount + 1;

        for (i, dl) in self.dlights.iter().take(MAX_DLIGHTS).enumerate() {
            self.r_mark_lights(world, dl, 1 << i, NodeRef::Node(0));
        }
    }

    // ============================================================
    // Lightmap texels
    // ============================================================

    /// R_SetCacheState
    pub fn r_set_cache_state(&self, surf: &mut MSurface) {
        for maps in 0..surf.num_styles() {
            surf.cached_light[maps] = self.lightstyle(surf.styles[maps]).white;
        }
    }

    /// R_AddDynamicLights
    pub fn r_add_dynamic_lights(&self, world: &Model, surf: usize, blocklights: &mut [f32]) {
        let s = &world.surfaces[surf];
        let (smax, tmax) = s.lightmap_size();
        let tex = &world.texinfo[s.texinfo];
        let plane = &world.planes[s.plane];

        for (lnum, dl) in self.dlights.iter().take(MAX_DLIGHTS).enumerate() {
            if s.dlightbits & (1 << lnum) == 0 {
                continue; // not lit by this light
            }

            let fdist = dot_product(&dl.origin, &plane.normal) - plane.dist;
            let frad = dl.intensity - fdist.abs();
            // rad is now the highest intensity on the plane
            if frad < DLIGHT_CUTOFF {
                continue;
            }
            let fminlight = frad - DLIGHT_CUTOFF;

            let impact = [
                dl.origin[0] - plane.normal[0] * fdist,
                dl.origin[1] - plane.normal[1] * fdist,
                dl.origin[2] - plane.normal[2] * fdist,
            ];

            let local = [0, 1].map(|j| {
                dot_product(&impact, &[tex.vecs[j][0], tex.vecs[j][1], tex.vecs[j][2]])
                    + tex.vecs[j][3]
                    - s.texturemins[j] as f32
            });

            let mut bl = blocklights.chunks_exact_mut(3);
            for t in 0..tmax {
                let td = (local[1] - (t * 16) as f32) as i32;
                for si in 0..smax {
                    let sd = (local[0] - (si * 16) as f32) as i32;
                    let Some(texel) = bl.next() else {
                        return;
                    };
                    let fdist = approx_distance(sd, td);
                    if fdist < fminlight {
                        for c in 0..3 {
                            texel[c] += (fminlight - fdist) * dl.color[c];
                        }
                    }
                }
            }
        }
    }

    /// R_BuildLightMap: combines the light styles and dynamic lights of a
    /// surface into RGBA texels at `dest`, `stride` bytes per row.
    pub fn r_build_light_map(
        &self,
        world: &Model,
        surf: usize,
        dest: &mut [u8],
        stride: usize,
    ) -> Result<(), RefError> {
        let s = &world.surfaces[surf];
        if texinfo_is_unlit(world.texinfo[s.texinfo].flags) {
            return Err(RefError::NonLitSurface { surface: surf });
        }

        let (smax, tmax) = s.lightmap_size();
        let size = (smax * tmax) as usize;
        let mut blocklights = vec![0.0f32; size * 3];

        match s.samples {
            // set to full bright if no light data
            None => blocklights.iter_mut().for_each(|b| *b = 255.0),
            Some(ofs) => {
                // add all the lightmaps
                let mut lightmap = ofs;
                for map in 0..s.num_styles() {
                    let style = self.lightstyle(s.styles[map]);
                    let scale = style.rgb.map(|c| c * self.config.modulate);
                    let Some(samples) = world.lightdata.get(lightmap..lightmap + size * 3) else {
                        break;
                    };
                    for (bl, px) in blocklights.chunks_exact_mut(3).zip(samples.chunks_exact(3)) {
                        for c in 0..3 {
                            bl[c] += px[c] as f32 * scale[c];
                        }
                    }
                    lightmap += size * 3; // skip to next lightmap
                }

                // add all the dynamic lights
                if s.dlightframe == self.r_framecount {
                    self.r_add_dynamic_lights(world, surf, &mut blocklights);
                }
            }
        }

        // put into texture format
        let row = smax as usize * LIGHTMAP_BYTES;
        for (t, texels) in blocklights.chunks_exact(smax as usize * 3).enumerate() {
            let line = &mut dest[t * stride..t * stride + row];
            for (out, bl) in line.chunks_exact_mut(LIGHTMAP_BYTES).zip(texels.chunks_exact(3)) {
                out.copy_from_slice(&blocklights_to_rgba(bl));
            }
        }

        Ok(())
    }

    // ============================================================
    // Staleness
    // ============================================================

    /// R_HasDynamicLights: whether the surface's lightmap must be rebuilt
    /// this frame, and the first style index that went stale (or the style
    /// count when none did).
    pub fn r_has_dynamic_lights(&self, world: &Model, surf: usize) -> (bool, usize) {
        let s = &world.surfaces[surf];

        if self.config.fullbright
            || !self.config.dynamic
            || texinfo_is_unlit(world.texinfo[s.texinfo].flags)
        {
            return (false, 0);
        }

        // any light style changed on this surface?
        let mut map = 0;
        let mut is_dynamic = false;
        while map < MAXLIGHTMAPS && s.styles[map] != 255 {
            if self.lightstyle(s.styles[map]).white != s.cached_light[map] {
                is_dynamic = true;
                break;
            }
            map += 1;
        }

        // lit this frame, or lit last frame and has to lose that light again
        if !is_dynamic
            && (s.dlightframe == self.r_framecount || (s.dirty_lightmap && !self.lms.copies))
        {
            is_dynamic = true;
        }

        (is_dynamic, map)
    }

    /// R_UpdateSurfCache
    pub fn r_update_surf_cache(&self, surf: &mut MSurface, map: usize) {
        if map < MAXLIGHTMAPS
            && (surf.styles[map] >= 32 || surf.styles[map] == 0)
            && surf.dlightframe != self.r_framecount
        {
            self.r_set_cache_state(surf);
        }

        if !self.lms.copies {
            surf.dirty_lightmap = surf.dlightframe == self.r_framecount;
        }
    }
}

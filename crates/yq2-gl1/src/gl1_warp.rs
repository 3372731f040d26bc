// gl1_warp.rs — sky box bounds, sky drawing and turbulent liquid surfaces

use yq2_common::q_shared::{dot_product, vector_subtract, SurfFlags, Vec3};

use crate::gl1_buffer::{BufferFlags, BufferedDraw};
use crate::gl1_local::Gl1Renderer;
use crate::gl1_model_types::{GlPoly, Model, VERTEXSIZE};
use crate::qgl::QGl;

const SUBDIVIDE_SIZE: f32 = 64.0;
const ON_EPSILON: f32 = 0.1;
const MAX_CLIP_VERTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Front,
    Back,
    On,
}

// ============================================================
// Turbulence table
// ============================================================

pub static R_TURBSIN: [f32; 256] = [
    0.0, 0.19633, 0.392541, 0.588517, 0.784137, 0.979285, 1.17384, 1.3677,
    1.56072, 1.75281, 1.94384, 2.1337, 2.32228, 2.50945, 2.69512, 2.87916,
    3.06147, 3.24193, 3.42044, 3.59689, 3.77117, 3.94319, 4.11282, 4.27998,
    4.44456, 4.60647, 4.76559, 4.92185, 5.07515, 5.22538, 5.37247, 5.51632,
    5.65685, 5.79398, 5.92761, 6.05767, 6.18408, 6.30677, 6.42566, 6.54068,
    6.65176, 6.75883, 6.86183, 6.9607, 7.05537, 7.14579, 7.23191, 7.31368,
    7.39104, 7.46394, 7.53235, 7.59623, 7.65552, 7.71021, 7.76025, 7.80562,
    7.84628, 7.88222, 7.91341, 7.93984, 7.96148, 7.97832, 7.99036, 7.99759,
    8.0, 7.99759, 7.99036, 7.97832, 7.96148, 7.93984, 7.91341, 7.88222,
    7.84628, 7.80562, 7.76025, 7.71021, 7.65552, 7.59623, 7.53235, 7.46394,
    7.39104, 7.31368, 7.23191, 7.14579, 7.05537, 6.9607, 6.86183, 6.75883,
    6.65176, 6.54068, 6.42566, 6.30677, 6.18408, 6.05767, 5.92761, 5.79398,
    5.65685, 5.51632, 5.37247, 5.22538, 5.07515, 4.92185, 4.76559, 4.60647,
    4.44456, 4.27998, 4.11282, 3.94319, 3.77117, 3.59689, 3.42044, 3.24193,
    3.06147, 2.87916, 2.69512, 2.50945, 2.32228, 2.1337, 1.94384, 1.75281,
    1.56072, 1.3677, 1.17384, 0.979285, 0.784137, 0.588517, 0.392541, 0.19633,
    9.79717e-16, -0.19633, -0.392541, -0.588517, -0.784137, -0.979285, -1.17384, -1.3677,
    -1.56072, -1.75281, -1.94384, -2.1337, -2.32228, -2.50945, -2.69512, -2.87916,
    -3.06147, -3.24193, -3.42044, -3.59689, -3.77117, -3.94319, -4.11282, -4.27998,
    -4.44456, -4.60647, -4.76559, -4.92185, -5.07515, -5.22538, -5.37247, -5.51632,
    -5.65685, -5.79398, -5.92761, -6.05767, -6.18408, -6.30677, -6.42566, -6.54068,
    -6.65176, -6.75883, -6.86183, -6.9607, -7.05537, -7.14579, -7.23191, -7.31368,
    -7.39104, -7.46394, -7.53235, -7.59623, -7.65552, -7.71021, -7.76025, -7.80562,
    -7.84628, -7.88222, -7.91341, -7.93984, -7.96148, -7.97832, -7.99036, -7.99759,
    -8.0, -7.99759, -7.99036, -7.97832, -7.96148, -7.93984, -7.91341, -7.88222,
    -7.84628, -7.80562, -7.76025, -7.71021, -7.65552, -7.59623, -7.53235, -7.46394,
    -7.39104, -7.31368, -7.23191, -7.14579, -7.05537, -6.9607, -6.86183, -6.75883,
    -6.65176, -6.54068, -6.42566, -6.30677, -6.18408, -6.05767, -5.92761, -5.79398,
    -5.65685, -5.51632, -5.37247, -5.22538, -5.07515, -4.92185, -4.76559, -4.60647,
    -4.44456, -4.27998, -4.11282, -3.94319, -3.77117, -3.59689, -3.42044, -3.24193,
    -3.06147, -2.87916, -2.69512, -2.50945, -2.32228, -2.1337, -1.94384, -1.75281,
    -1.56072, -1.3677, -1.17384, -0.979285, -0.784137, -0.588517, -0.392541, -0.19633,
];

const TURBSCALE: f32 = 256.0 / (2.0 * std::f32::consts::PI);

fn turbsin(x: f32) -> f32 {
    R_TURBSIN[((x * TURBSCALE) as i32 & 255) as usize]
}

// ============================================================
// Sky tables
// ============================================================

static SKYCLIP: [Vec3; 6] = [
    [1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
];

// 1 = s, 2 = t, 3 = 2048
static ST_TO_VEC: [[i32; 3]; 6] = [
    [3, -1, 2],
    [-3, 1, 2],
    [1, 3, 2],
    [-1, -3, 2],
    [-2, -1, 3], // 0 degrees yaw, look straight up
    [2, -1, -3], // look straight down
];

// s = [0]/[2], t = [1]/[2]
static VEC_TO_ST: [[i32; 3]; 6] = [
    [-2, 3, 1],
    [2, 3, -1],
    [1, 3, 2],
    [-1, 3, -2],
    [-2, -1, 3],
    [-2, 1, -3],
];

/// Cube face order of the sky images ("rt", "bk", "lf", "ft", "up", "dn").
pub static SKYTEXORDER: [usize; 6] = [0, 2, 1, 3, 4, 5];

/// Signed 1-based component pick used by the sky tables.
fn pick(v: &Vec3, j: i32) -> f32 {
    if j < 0 {
        -v[(-j - 1) as usize]
    } else {
        v[(j - 1) as usize]
    }
}

// ============================================================
// Sky state
// ============================================================

#[derive(Debug, Clone)]
pub struct SkyState {
    /// Texture numbers in rt, bk, lf, ft, up, dn order. None until a sky is set.
    pub images: Option<[i32; 6]>,
    pub rotate: f32,
    pub axis: Vec3,

    pub skymins: [[f32; 6]; 2],
    pub skymaxs: [[f32; 6]; 2],
    pub sky_min: f32,
    pub sky_max: f32,

    /// Sky polygons projected this frame.
    pub c_sky: i32,
}

impl Default for SkyState {
    fn default() -> Self {
        let mut sky = Self {
            images: None,
            rotate: 0.0,
            axis: [0.0; 3],
            skymins: [[0.0; 6]; 2],
            skymaxs: [[0.0; 6]; 2],
            sky_min: 1.0 / 512.0,
            sky_max: 511.0 / 512.0,
            c_sky: 0,
        };
        sky.clear();
        sky
    }
}

impl SkyState {
    /// RI_SetSky. Mipped or rotating skies sample at half resolution, so the
    /// texcoord clamp moves inwards with them.
    pub fn set(&mut self, images: [i32; 6], rotate: f32, axis: Vec3, skymip: bool) {
        self.images = Some(images);
        self.rotate = rotate;
        self.axis = axis;

        if skymip || rotate != 0.0 {
            self.sky_min = 1.0 / 256.0;
            self.sky_max = 255.0 / 256.0;
        } else {
            self.sky_min = 1.0 / 512.0;
            self.sky_max = 511.0 / 512.0;
        }
    }

    /// R_ClearSkyBox
    pub fn clear(&mut self) {
        for i in 0..6 {
            self.skymins[0][i] = 9999.0;
            self.skymins[1][i] = 9999.0;
            self.skymaxs[0][i] = -9999.0;
            self.skymaxs[1][i] = -9999.0;
        }
        self.c_sky = 0;
    }

    pub fn face_visible(&self, axis: usize) -> bool {
        self.skymins[0][axis] < self.skymaxs[0][axis] && self.skymins[1][axis] < self.skymaxs[1][axis]
    }

    /// Grows the bounds of the cube face the eye-relative polygon projects on.
    fn draw_sky_polygon(&mut self, vecs: &[Vec3]) {
        self.c_sky += 1;

        // decide which face it maps to
        let mut v = [0.0f32; 3];
        for p in vecs {
            for j in 0..3 {
                v[j] += p[j];
            }
        }
        let av = v.map(f32::abs);

        let axis = if av[0] > av[1] && av[0] > av[2] {
            if v[0] < 0.0 { 1 } else { 0 }
        } else if av[1] > av[2] && av[1] > av[0] {
            if v[1] < 0.0 { 3 } else { 2 }
        } else if v[2] < 0.0 {
            5
        } else {
            4
        };

        // project new texture coords
        for p in vecs {
            let dv = pick(p, VEC_TO_ST[axis][2]);
            if dv < 0.001 {
                continue; // don't divide by zero
            }
            let s = pick(p, VEC_TO_ST[axis][0]) / dv;
            let t = pick(p, VEC_TO_ST[axis][1]) / dv;

            self.skymins[0][axis] = self.skymins[0][axis].min(s);
            self.skymins[1][axis] = self.skymins[1][axis].min(t);
            self.skymaxs[0][axis] = self.skymaxs[0][axis].max(s);
            self.skymaxs[1][axis] = self.skymaxs[1][axis].max(t);
        }
    }

    /// R_ClipSkyPolygon: splits the polygon along the cube edges until each
    /// piece lies on a single face.
    pub fn clip_sky_polygon(&mut self, vecs: &[Vec3], stage: usize) {
        if vecs.len() > MAX_CLIP_VERTS - 2 {
            log::warn!("R_ClipSkyPolygon: MAX_CLIP_VERTS");
            return;
        }

        if stage == 6 {
            // fully clipped, so draw it
            self.draw_sky_polygon(vecs);
            return;
        }

        let norm = &SKYCLIP[stage];
        let dists: Vec<f32> = vecs.iter().map(|v| dot_product(v, norm)).collect();
        let sides: Vec<Side> = dists
            .iter()
            .map(|&d| {
                if d > ON_EPSILON {
                    Side::Front
                } else if d < -ON_EPSILON {
                    Side::Back
                } else {
                    Side::On
                }
            })
            .collect();

        let front = sides.contains(&Side::Front);
        let back = sides.contains(&Side::Back);
        if !front || !back {
            // not clipped
            self.clip_sky_polygon(vecs, stage + 1);
            return;
        }

        let mut newv: [Vec<Vec3>; 2] = [Vec::new(), Vec::new()];
        let n = vecs.len();

        for i in 0..n {
            let v = vecs[i];
            match sides[i] {
                Side::Front => newv[0].push(v),
                Side::Back => newv[1].push(v),
                Side::On => {
                    newv[0].push(v);
                    newv[1].push(v);
                }
            }

            let next = (i + 1) % n;
            if sides[i] == Side::On || sides[next] == Side::On || sides[next] == sides[i] {
                continue;
            }

            let d = dists[i] / (dists[i] - dists[next]);
            let w = vecs[next];
            let e = [
                v[0] + d * (w[0] - v[0]),
                v[1] + d * (w[1] - v[1]),
                v[2] + d * (w[2] - v[2]),
            ];
            newv[0].push(e);
            newv[1].push(e);
        }

        // continue
        let [f, b] = newv;
        self.clip_sky_polygon(&f, stage + 1);
        self.clip_sky_polygon(&b, stage + 1);
    }
}

impl Gl1Renderer {
    // ============================================================
    // Sky
    // ============================================================

    /// R_AddSkySurface
    pub fn r_add_sky_surface(&mut self, world: &Model, surf: usize) {
        let mut p = world.surfaces[surf].polys;
        while let Some(pi) = p {
            let poly = &world.polys[pi];
            let verts: Vec<Vec3> = poly
                .verts
                .iter()
                .map(|v| vector_subtract(&[v[0], v[1], v[2]], &self.r_origin))
                .collect();
            self.sky.clip_sky_polygon(&verts, 0);
            p = poly.next;
        }
    }

    /// R_MakeSkyVec: position and clamped texcoords of a face corner.
    pub fn r_make_sky_vec(&self, s: f32, t: f32, axis: usize) -> ([f32; 3], [f32; 2]) {
        let dist = if self.config.farsee { 4096.0 } else { 2300.0 };
        let b = [s * dist, t * dist, dist];
        let v = [0, 1, 2].map(|j| pick(&b, ST_TO_VEC[axis][j]));

        // avoid bilerp seam
        let s = ((s + 1.0) * 0.5).clamp(self.sky.sky_min, self.sky.sky_max);
        let t = ((t + 1.0) * 0.5).clamp(self.sky.sky_min, self.sky.sky_max);

        (v, [s, 1.0 - t])
    }

    /// R_DrawSkyBox
    pub fn r_draw_sky_box(&mut self, gl: &mut dyn QGl) {
        let Some(images) = self.sky.images else {
            return;
        };

        if self.sky.rotate != 0.0 && !(0..6).any(|i| self.sky.face_visible(i)) {
            return; // nothing visible
        }

        gl.push_matrix();
        gl.translate(&self.r_origin);
        gl.rotate(self.view.time * self.sky.rotate, &self.sky.axis);

        for i in 0..6 {
            if self.sky.rotate != 0.0 {
                self.sky.skymins[0][i] = -1.0;
                self.sky.skymins[1][i] = -1.0;
                self.sky.skymaxs[0][i] = 1.0;
                self.sky.skymaxs[1][i] = 1.0;
            }

            if !self.sky.face_visible(i) {
                continue;
            }

            self.r_update_gl_buffer(
                gl,
                BufferedDraw::SingleTex,
                images[SKYTEXORDER[i]],
                0,
                BufferFlags::empty(),
                1.0,
            );

            let (mins, maxs) = (
                [self.sky.skymins[0][i], self.sky.skymins[1][i]],
                [self.sky.skymaxs[0][i], self.sky.skymaxs[1][i]],
            );
            let corners = [
                (mins[0], mins[1]),
                (mins[0], maxs[1]),
                (maxs[0], maxs[1]),
                (maxs[0], mins[1]),
            ];

            self.r_set_buffer_indices(gl, 4);
            for (s, t) in corners {
                let (v, st) = self.r_make_sky_vec(s, t, i);
                self.buf.push_vertex(v[0], v[1], v[2]);
                self.buf.push_texcoord(0, st[0], st[1]);
            }
        }

        self.r_apply_gl_buffer(gl);
        gl.pop_matrix();
    }

    // ============================================================
    // Liquids
    // ============================================================

    /// R_EmitWaterPolys: texcoords wobble with the turbulence table, flowing
    /// liquids also scroll at half speed.
    pub fn r_emit_water_polys(&mut self, gl: &mut dyn QGl, world: &Model, surf: usize) {
        let fa = &world.surfaces[surf];
        let rdt = self.view.time;

        let scroll = if world.texinfo[fa.texinfo].flags.contains(SurfFlags::FLOWING) {
            let t = rdt * 0.5;
            -64.0 * (t - t.trunc())
        } else {
            0.0
        };

        let mut bp = fa.polys;
        while let Some(pi) = bp {
            let p = &world.polys[pi];
            self.r_set_buffer_indices(gl, p.numverts());

            for v in &p.verts {
                let (os, ot) = (v[3], v[4]);

                let s = os + turbsin(ot * 0.125 + rdt) + scroll;
                let t = ot + turbsin(os * 0.125 + rdt);

                self.buf.push_vertex(v[0], v[1], v[2]);
                self.buf.push_texcoord(0, s * (1.0 / 64.0), t * (1.0 / 64.0));
            }

            bp = p.next;
        }
    }
}

// ============================================================
// Warp subdivision (load time)
// ============================================================

fn bound_poly(verts: &[Vec3]) -> (Vec3, Vec3) {
    let mut mins = [9999.0f32; 3];
    let mut maxs = [-9999.0f32; 3];
    for v in verts {
        for j in 0..3 {
            mins[j] = mins[j].min(v[j]);
            maxs[j] = maxs[j].max(v[j]);
        }
    }
    (mins, maxs)
}

fn subdivide_polygon(world: &mut Model, surf: usize, verts: &[Vec3]) {
    if verts.len() > 60 {
        log::warn!("SubdividePolygon: numverts = {}", verts.len());
        return;
    }

    let (mins, maxs) = bound_poly(verts);

    for i in 0..3 {
        let m = (mins[i] + maxs[i]) * 0.5;
        let m = SUBDIVIDE_SIZE * (m / SUBDIVIDE_SIZE + 0.5).floor();
        if maxs[i] - m < 8.0 || m - mins[i] < 8.0 {
            continue;
        }

        // cut it
        let n = verts.len();
        let dist: Vec<f32> = verts.iter().map(|v| v[i] - m).collect();
        let mut front = Vec::with_capacity(n + 2);
        let mut back = Vec::with_capacity(n + 2);

        for j in 0..n {
            let next = (j + 1) % n;
            let v = verts[j];
            if dist[j] >= 0.0 {
                front.push(v);
            }
            if dist[j] <= 0.0 {
                back.push(v);
            }
            if dist[j] == 0.0 || dist[next] == 0.0 {
                continue;
            }
            if (dist[j] > 0.0) != (dist[next] > 0.0) {
                // clip point
                let frac = dist[j] / (dist[j] - dist[next]);
                let w = verts[next];
                let e = [0, 1, 2].map(|k| v[k] + frac * (w[k] - v[k]));
                front.push(e);
                back.push(e);
            }
        }

        subdivide_polygon(world, surf, &front);
        subdivide_polygon(world, surf, &back);
        return;
    }

    // add a point in the center to help keep warp valid
    let tex = &world.texinfo[world.surfaces[surf].texinfo];
    let svec = [tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]];
    let tvec = [tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]];

    let mut out: Vec<[f32; VERTEXSIZE]> = Vec::with_capacity(verts.len() + 2);
    out.push([0.0; VERTEXSIZE]);

    let mut total = [0.0f32; 3];
    let (mut total_s, mut total_t) = (0.0f32, 0.0f32);
    for v in verts {
        let s = dot_product(v, &svec);
        let t = dot_product(v, &tvec);
        total_s += s;
        total_t += t;
        for j in 0..3 {
            total[j] += v[j];
        }
        out.push([v[0], v[1], v[2], s, t, 0.0, 0.0]);
    }

    let scale = 1.0 / verts.len() as f32;
    out[0] = [
        total[0] * scale,
        total[1] * scale,
        total[2] * scale,
        total_s * scale,
        total_t * scale,
        0.0,
        0.0,
    ];
    out.push(out[1]);

    let idx = world.polys.len();
    world.polys.push(GlPoly {
        next: world.surfaces[surf].polys,
        verts: out,
    });
    world.surfaces[surf].polys = Some(idx);
}

/// GL_SubdivideSurface: breaks a liquid surface into 64 unit cells so the
/// turbulence has vertices to move. Texcoords stay in texture space.
pub fn subdivide_surface(world: &mut Model, surf: usize, verts: &[Vec3]) {
    subdivide_polygon(world, surf, verts);
}

// q_shared.rs — foundational types and math shared by the engine and renderers

use bitflags::bitflags;

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

pub const MAX_LIGHTSTYLES: usize = 256;
pub const MAX_DLIGHTS: usize = 32;

// ============================================================
// Print levels
// ============================================================

pub const PRINT_ALL: i32 = 0;
pub const PRINT_DEVELOPER: i32 = 1; // only print when "developer 1"

// ============================================================
// Cvar flags
// ============================================================

pub const CVAR_ARCHIVE: i32 = 1; // set to cause it to be saved to vars.rc
pub const CVAR_NOSET: i32 = 8; // don't allow change from console at all
pub const CVAR_LATCH: i32 = 16; // save changes until renderer restart

// ============================================================
// Contents
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;

bitflags! {
    /// Texinfo surface flags as stored in the level file.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SurfFlags: i32 {
        const LIGHT = 0x1; // value will hold the light strength
        const SLICK = 0x2;
        const SKY = 0x4; // don't draw, but add to skybox
        const WARP = 0x8; // turbulent water warp
        const TRANS33 = 0x10;
        const TRANS66 = 0x20;
        const FLOWING = 0x40; // scroll towards angle
        const NODRAW = 0x80; // don't bother referencing the texture
    }
}

impl SurfFlags {
    /// Either of the see-through flags.
    pub fn is_translucent(self) -> bool {
        self.intersects(SurfFlags::TRANS33 | SurfFlags::TRANS66)
    }
}

bitflags! {
    /// Per-entity render effects.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RenderFx: i32 {
        const MINLIGHT = 1; // always have some light (viewmodel)
        const VIEWERMODEL = 2; // don't draw through eyes, only mirrors
        const WEAPONMODEL = 4; // only draw through eyes
        const FULLBRIGHT = 8; // always draw full intensity
        const DEPTHHACK = 16; // for view weapon Z crunching
        const TRANSLUCENT = 32;
        const FRAMELERP = 64;
        const BEAM = 128;
    }
}

bitflags! {
    /// Refdef flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RdFlags: i32 {
        const UNDERWATER = 1; // warp the screen as appropriate
        const NOWORLDMODEL = 2; // used for player configuration screen
        const IRGOGGLES = 4;
        const UVGOGGLES = 8;
    }
}

// ============================================================
// Renderer interface types
// ============================================================

/// dlight_t — dynamic light, valid for a single frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct DLight {
    pub origin: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// lightstyle_t
#[derive(Debug, Clone, Copy, Default)]
pub struct LightStyle {
    pub rgb: [f32; 3], // 0.0 - 2.0
    pub white: f32, // highest of rgb
}

impl LightStyle {
    pub fn uniform(value: f32) -> Self {
        Self {
            rgb: [value; 3],
            white: value * 3.0,
        }
    }
}

// ============================================================
// Plane
// ============================================================

// 0-2 are axial planes
pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_ANYZ: u8 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8, // for fast side tests
    pub signbits: u8, // signx + (signy<<1) + (signz<<2)
}

impl CPlane {
    /// Builds a plane. Only positive axial normals get the axial type, so
    /// `distance` never has to look at the sign.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        let plane_type = if normal[0] == 1.0 {
            PLANE_X
        } else if normal[1] == 1.0 {
            PLANE_Y
        } else if normal[2] == 1.0 {
            PLANE_Z
        } else {
            PLANE_ANYZ
        };
        let mut plane = Self {
            normal,
            dist,
            plane_type,
            signbits: 0,
        };
        plane.signbits = signbits_for_plane(&plane);
        plane
    }

    /// Signed distance from the plane, using the axial shortcut when possible.
    #[inline]
    pub fn distance(&self, p: &Vec3) -> f32 {
        match self.plane_type {
            PLANE_X | PLANE_Y | PLANE_Z => p[self.plane_type as usize] - self.dist,
            _ => dot_product(p, &self.normal) - self.dist,
        }
    }
}

pub fn signbits_for_plane(plane: &CPlane) -> u8 {
    let mut bits = 0u8;
    for j in 0..3 {
        if plane.normal[j] < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

// ============================================================
// MATHLIB — Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

fn concat_rotations(in1: &[[f32; 3]; 3], in2: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = in1[i][0] * in2[0][j] + in1[i][1] * in2[1][j] + in1[i][2] * in2[2][j];
        }
    }
    out
}

// ============================================================
// Angle functions
// ============================================================

/// Returns (forward, right, up) for a set of euler angles in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + cr * sy,
        -sr * sp * sy - cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + sr * sy,
        cr * sp * sy - sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

/// Returns 1 (front), 2 (back), or 3 (crossing) for a box vs. plane test.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if p.plane_type < 3 {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // general case: pick the nearest and farthest corners by sign bit
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for j in 0..3 {
        if p.signbits & (1 << j) != 0 {
            far[j] = emins[j];
            near[j] = emaxs[j];
        } else {
            far[j] = emaxs[j];
            near[j] = emins[j];
        }
    }
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

pub fn project_point_on_plane(p: &Vec3, normal: &Vec3) -> Vec3 {
    let inv_denom = 1.0 / dot_product(normal, normal);
    let d = dot_product(normal, p) * inv_denom;
    let n = vector_scale(normal, inv_denom);
    vector_ma(p, -d, &n)
}

/// Find a vector perpendicular to `src` (assumed normalized).
pub fn perpendicular_vector(src: &Vec3) -> Vec3 {
    let mut pos = 0;
    let mut min_elem = 1.0f32;
    for i in 0..3 {
        if src[i].abs() < min_elem {
            pos = i;
            min_elem = src[i].abs();
        }
    }
    let mut tempvec = [0.0f32; 3];
    tempvec[pos] = 1.0;

    let mut dst = project_point_on_plane(&tempvec, src);
    vector_normalize(&mut dst);
    dst
}

pub fn rotate_point_around_vector(dir: &Vec3, point: &Vec3, degrees: f32) -> Vec3 {
    let vf = *dir;
    let vr = perpendicular_vector(dir);
    let vup = cross_product(&vr, &vf);

    let m = [
        [vr[0], vup[0], vf[0]],
        [vr[1], vup[1], vf[1]],
        [vr[2], vup[2], vf[2]],
    ];
    let im = [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ];

    let (s, c) = degrees.to_radians().sin_cos();
    let zrot = [[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]];

    let rot = concat_rotations(&concat_rotations(&m, &zrot), &im);

    let mut dst = [0.0f32; 3];
    for i in 0..3 {
        dst[i] = rot[i][0] * point[0] + rot[i][1] * point[1] + rot[i][2] * point[2];
    }
    dst
}

// gl1_local.rs — renderer-wide constants, configuration, GL state cache and context

use yq2_common::common::com_set_developer;
use yq2_common::cvar::CvarContext;
use yq2_common::q_shared::{
    CPlane, DLight, LightStyle, RdFlags, RenderFx, Vec3, CVAR_ARCHIVE, CVAR_LATCH,
    MAX_LIGHTSTYLES,
};

use crate::gl1_buffer::GlBuffer;
use crate::gl1_lightmap::LightmapState;
use crate::gl1_model_types::Image;
use crate::gl1_rsurf::SurfaceChains;
use crate::gl1_warp::SkyState;
use crate::qgl::{QGl, TexEnv};

pub const BLOCK_WIDTH: i32 = 128;
pub const BLOCK_HEIGHT: i32 = 128;
pub const LIGHTMAP_BYTES: usize = 4;
pub const MAX_LIGHTMAPS: usize = 128;

/// Lightmap atlases per slot when copies are enabled; the last one is the
/// pristine static lightmap.
pub const MAX_LIGHTMAP_COPIES: usize = 3;
pub const DYNAMIC_COPIES: usize = MAX_LIGHTMAP_COPIES - 1;

pub const TEXNUM_LIGHTMAPS: i32 = 1024;

pub const BACKFACE_EPSILON: f32 = 0.01;

// ============================================================
// Errors
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightmapKind {
    Static,
    Dynamic,
}

impl std::fmt::Display for LightmapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LightmapKind::Static => f.write_str("static"),
            LightmapKind::Dynamic => f.write_str("dynamic"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RefError {
    /// The atlas cannot hold a single surface even after a reset.
    #[error("Consecutive calls to LM_AllocBlock({width},{height}) failed ({kind})")]
    LightmapAllocFailed {
        width: i32,
        height: i32,
        kind: LightmapKind,
    },

    #[error("LM_UploadBlock() - MAX_LIGHTMAPS ({max}) exceeded")]
    TooManyLightmaps { max: usize },

    #[error("R_BuildLightMap called for non-lit surface {surface}")]
    NonLitSurface { surface: usize },

    #[error("R_RenderView: NULL worldmodel")]
    NoWorldModel,
}

// ============================================================
// Configuration
// ============================================================

/// What the driver reported at context creation.
#[derive(Debug, Clone, Copy)]
pub struct GlCaps {
    pub multitexture: bool,
}

impl Default for GlCaps {
    fn default() -> Self {
        Self { multitexture: true }
    }
}

/// Per-frame snapshot of the renderer cvars.
#[derive(Debug, Clone, PartialEq)]
pub struct Gl1Config {
    pub overbrightbits: f32,
    pub dynamic: bool,
    pub multitexture: bool,
    pub lightmapcopies: bool,
    pub cull: bool,
    pub fullbright: bool,
    pub showtris: bool,
    pub lightmap_only: bool,
    pub lefthand: bool,
    pub novis: bool,
    pub lockpvs: bool,
    pub drawworld: bool,
    pub drawentities: bool,
    pub flashblend: bool,
    pub saturatelighting: bool,
    pub modulate: f32,
    pub gunfov: f32,
    pub farsee: bool,
    pub zfix: bool,
    pub intensity: f32,
}

impl Default for Gl1Config {
    fn default() -> Self {
        Self {
            overbrightbits: 0.0,
            dynamic: true,
            multitexture: true,
            lightmapcopies: true,
            cull: true,
            fullbright: false,
            showtris: false,
            lightmap_only: false,
            lefthand: false,
            novis: false,
            lockpvs: false,
            drawworld: true,
            drawentities: true,
            flashblend: false,
            saturatelighting: false,
            modulate: 1.0,
            gunfov: 80.0,
            farsee: false,
            zfix: false,
            intensity: 2.0,
        }
    }
}

impl Gl1Config {
    /// Registers the renderer cvars with their defaults.
    pub fn register(cvars: &mut CvarContext) {
        cvars.get("gl1_overbrightbits", "0", CVAR_ARCHIVE);
        cvars.get("gl1_dynamic", "1", 0);
        cvars.get("gl1_multitexture", "1", CVAR_ARCHIVE);
        cvars.get("gl1_lightmapcopies", "1", CVAR_ARCHIVE | CVAR_LATCH);
        cvars.get("r_cull", "1", 0);
        cvars.get("r_fullbright", "0", 0);
        cvars.get("gl_showtris", "0", 0);
        cvars.get("r_lightmap", "0", 0);
        cvars.get("hand", "0", CVAR_ARCHIVE);
        cvars.get("r_novis", "0", 0);
        cvars.get("r_lockpvs", "0", 0);
        cvars.get("r_drawworld", "1", 0);
        cvars.get("r_drawentities", "1", 0);
        cvars.get("gl1_flashblend", "0", 0);
        cvars.get("gl1_saturatelighting", "0", 0);
        cvars.get("r_modulate", "1", CVAR_ARCHIVE);
        cvars.get("r_gunfov", "80", CVAR_ARCHIVE);
        cvars.get("r_farsee", "0", CVAR_LATCH | CVAR_ARCHIVE);
        cvars.get("gl_zfix", "0", 0);
        cvars.get("gl1_intensity", "2", CVAR_ARCHIVE);
    }

    pub fn from_cvars(cvars: &CvarContext, caps: &GlCaps) -> Self {
        let intensity = cvars.variable_value("gl1_intensity");
        Self {
            overbrightbits: cvars.variable_value("gl1_overbrightbits"),
            dynamic: cvars.is_set("gl1_dynamic"),
            multitexture: caps.multitexture && cvars.is_set("gl1_multitexture"),
            lightmapcopies: cvars.is_set("gl1_lightmapcopies"),
            cull: cvars.is_set("r_cull"),
            fullbright: cvars.is_set("r_fullbright"),
            showtris: cvars.is_set("gl_showtris"),
            lightmap_only: cvars.is_set("r_lightmap"),
            lefthand: cvars.variable_value("hand") == 1.0,
            novis: cvars.is_set("r_novis"),
            lockpvs: cvars.is_set("r_lockpvs"),
            drawworld: cvars.is_set("r_drawworld"),
            drawentities: cvars.is_set("r_drawentities"),
            flashblend: cvars.is_set("gl1_flashblend"),
            saturatelighting: cvars.is_set("gl1_saturatelighting"),
            modulate: cvars.variable_value("r_modulate"),
            gunfov: cvars.variable_value("r_gunfov"),
            farsee: cvars.is_set("r_farsee"),
            zfix: cvars.is_set("gl_zfix"),
            intensity: if intensity < 1.0 { 1.0 } else { intensity },
        }
    }

    /// Combine scale for lightmaps, or None when overbright is off.
    pub fn overbright_scale(&self) -> Option<f32> {
        (self.overbrightbits > 0.0).then_some(self.overbrightbits)
    }
}

// ============================================================
// GL state cache
// ============================================================

/// Mirrors what has been sent to GL so redundant binds and texture
/// environment changes are skipped.
#[derive(Debug, Clone)]
pub struct GlState {
    pub currenttextures: [i32; 2],
    pub currenttmu: usize,
    texenv: [Option<TexEnv>; 2],
    multitexture_active: bool,

    pub lightmap_textures: i32,
    pub inverse_intensity: f32,
    pub depthmin: f32,
    pub depthmax: f32,
}

impl Default for GlState {
    fn default() -> Self {
        Self {
            currenttextures: [-1; 2],
            currenttmu: 0,
            texenv: [None; 2],
            multitexture_active: false,
            lightmap_textures: TEXNUM_LIGHTMAPS,
            inverse_intensity: 0.5,
            depthmin: 0.0,
            depthmax: 1.0,
        }
    }
}

impl GlState {
    pub fn select_texture(&mut self, tmu: usize) {
        self.currenttmu = tmu;
    }

    /// R_Bind: bind on the current unit.
    pub fn bind(&mut self, gl: &mut dyn QGl, texnum: i32) {
        let tmu = self.currenttmu;
        self.mbind(gl, tmu, texnum);
    }

    /// R_MBind: select `tmu` then bind.
    pub fn mbind(&mut self, gl: &mut dyn QGl, tmu: usize, texnum: i32) {
        self.select_texture(tmu);
        if self.currenttextures[tmu] == texnum {
            return;
        }
        self.currenttextures[tmu] = texnum;
        gl.bind_texture(tmu, texnum);
    }

    /// R_TexEnv on the current unit.
    pub fn tex_env(&mut self, gl: &mut dyn QGl, mode: TexEnv) {
        let tmu = self.currenttmu;
        if self.texenv[tmu] == Some(mode) {
            return;
        }
        self.texenv[tmu] = Some(mode);
        gl.tex_env(tmu, mode);
    }

    /// R_EnableMultitexture
    pub fn enable_multitexture(&mut self, gl: &mut dyn QGl, config: &Gl1Config, enable: bool) {
        if !config.multitexture || enable == self.multitexture_active {
            return;
        }
        self.multitexture_active = enable;

        self.select_texture(1);
        if enable && !config.fullbright {
            gl.enable_texture_unit(1, true);
            let mode = if config.lightmap_only {
                TexEnv::Replace
            } else {
                TexEnv::Modulate
            };
            self.tex_env(gl, mode);
        } else {
            gl.enable_texture_unit(1, false);
            self.tex_env(gl, TexEnv::Replace);
        }
        self.select_texture(0);
        self.tex_env(gl, TexEnv::Replace);
    }

    pub fn multitexture_active(&self) -> bool {
        self.multitexture_active
    }

    /// Forget bound textures so the next binds always reach GL.
    pub fn invalidate_textures(&mut self) {
        self.currenttextures = [-1; 2];
    }
}

// ============================================================
// Per-frame inputs
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct RefEntity {
    /// Inline brush model index into the world's submodels.
    pub model: Option<usize>,
    pub origin: Vec3,
    pub angles: Vec3,
    pub frame: i32,
    pub flags: RenderFx,
    pub alpha: f32,
}

#[derive(Debug, Clone, Default)]
pub struct RefDef<'a> {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub fov_x: f32,
    pub fov_y: f32,
    pub vieworg: Vec3,
    pub viewangles: Vec3,
    pub time: f32, // time is used to auto animate
    pub rdflags: RdFlags,
    pub areabits: Option<&'a [u8]>, // if non-empty, only areas with set bits will be drawn
    pub lightstyles: &'a [LightStyle],
    pub entities: &'a [RefEntity],
    pub dlights: &'a [DLight],
}

/// The scalar parts of the current refdef, kept for the whole frame.
#[derive(Debug, Clone, Default)]
pub struct FrameView {
    pub time: f32,
    pub fov_y: f32,
    pub width: i32,
    pub height: i32,
    pub rdflags: RdFlags,
    pub areabits: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub brush_polys: i32,
    pub visible_textures: i32,
    pub visible_lightmaps: i32,
}

// ============================================================
// Renderer context
// ============================================================

/// All state the surface renderer carries between calls. One per GL
/// context; every operation takes it explicitly.
pub struct Gl1Renderer {
    pub caps: GlCaps,
    pub config: Gl1Config,
    pub state: GlState,
    pub buf: GlBuffer,
    pub lms: LightmapState,
    pub chains: SurfaceChains,
    pub sky: SkyState,
    pub images: Vec<Image>,

    pub frustum: [CPlane; 4],
    pub r_origin: Vec3,
    pub vpn: Vec3,
    pub vright: Vec3,
    pub vup: Vec3,
    /// Eye position relative to the model being drawn.
    pub modelorg: Vec3,

    pub r_framecount: i32, // used for dlight push checking
    pub r_visframecount: i32, // bumped when going to a new PVS
    pub r_dlightframecount: i32,
    pub r_viewcluster: i32,
    pub r_viewcluster2: i32,
    pub r_oldviewcluster: i32,
    pub r_oldviewcluster2: i32,

    pub view: FrameView,
    pub lightstyles: Vec<LightStyle>,
    pub dlights: Vec<DLight>,
    pub stats: FrameStats,
}

impl Gl1Renderer {
    pub fn new(caps: GlCaps, config: Gl1Config) -> Self {
        let state = GlState {
            inverse_intensity: 1.0 / config.intensity,
            ..Default::default()
        };
        Self {
            caps,
            config,
            state,
            buf: GlBuffer::new(),
            lms: LightmapState::new(BLOCK_WIDTH, BLOCK_HEIGHT, MAX_LIGHTMAPS),
            chains: SurfaceChains::default(),
            sky: SkyState::default(),
            images: Vec::new(),
            frustum: [CPlane::default(); 4],
            r_origin: [0.0; 3],
            vpn: [0.0; 3],
            vright: [0.0; 3],
            vup: [0.0; 3],
            modelorg: [0.0; 3],
            r_framecount: 0,
            r_visframecount: 0,
            r_dlightframecount: 0,
            r_viewcluster: -1,
            r_viewcluster2: -1,
            r_oldviewcluster: -1,
            r_oldviewcluster2: -1,
            view: FrameView::default(),
            lightstyles: vec![LightStyle::uniform(1.0); MAX_LIGHTSTYLES],
            dlights: Vec::new(),
            stats: FrameStats::default(),
        }
    }

    /// Re-reads the cvars. Copies and block size stay as they were when
    /// the lightmaps were built.
    pub fn update_config(&mut self, cvars: &CvarContext) {
        self.config = Gl1Config::from_cvars(cvars, &self.caps);
        self.state.inverse_intensity = 1.0 / self.config.intensity;
        com_set_developer(cvars.is_set("developer"));
    }

    /// Registers an image and returns its index for texinfo references.
    pub fn register_image(&mut self, name: &str, texnum: i32, width: i32, height: i32) -> usize {
        self.images.push(Image {
            name: name.to_string(),
            width,
            height,
            registration_sequence: 1,
            texnum,
        });
        self.images.len() - 1
    }

    pub fn lightstyle(&self, style: u8) -> LightStyle {
        self.lightstyles
            .get(style as usize)
            .copied()
            .unwrap_or_default()
    }
}

// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// gl1_model_types.rs — in-memory brush model representation
//
// Everything is stored in flat vectors owned by `Model` and linked by index.
// Nodes and leaves reference their children through `NodeRef`, surfaces
// reference planes, texinfo and polys by index.

use bitflags::bitflags;

use yq2_common::q_shared::{dot_product, CPlane, SurfFlags, Vec3};

/// Light styles per surface.
pub const MAXLIGHTMAPS: usize = 4;

/// xyz s1t1 s2t2
pub const VERTEXSIZE: usize = 7;

pub const DVIS_PVS: usize = 0;
pub const DVIS_PHS: usize = 1;

bitflags! {
    /// Renderer-side surface flags, derived at load time.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MSurfFlags: i32 {
        const PLANEBACK = 2;
        const DRAWSKY = 4;
        const DRAWTURB = 0x10;
        const DRAWBACKGROUND = 0x40;
        const UNDERWATER = 0x80;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Image {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub registration_sequence: i32, // 0 = free
    pub texnum: i32, // gl texture binding
}

#[derive(Debug, Clone, Default)]
pub struct MTexInfo {
    pub vecs: [[f32; 4]; 2],
    pub flags: SurfFlags,
    pub numframes: i32,
    pub next: Option<usize>, // animation chain
    pub image: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GlPoly {
    pub next: Option<usize>,
    pub verts: Vec<[f32; VERTEXSIZE]>,
}

impl GlPoly {
    pub fn numverts(&self) -> usize {
        self.verts.len()
    }
}

#[derive(Debug, Clone)]
pub struct MSurface {
    pub visframe: i32, // should be drawn when node is crossed

    pub plane: usize,
    pub flags: MSurfFlags,

    pub texturemins: [i16; 2],
    pub extents: [i16; 2],

    pub light_s: i32,
    pub light_t: i32, // gl lightmap coordinates
    pub dlight_s: i32,
    pub dlight_t: i32, // gl lightmap coordinates for dynamic lightmaps

    pub polys: Option<usize>, // multiple if warped
    pub texinfo: usize,

    // lighting info
    pub dlightframe: i32,
    pub dlightbits: u32,
    pub dirty_lightmap: bool, // lit by a dlight last frame, rebuild to remove it

    pub lightmaptexturenum: usize,
    pub styles: [u8; MAXLIGHTMAPS],
    pub cached_light: [f32; MAXLIGHTMAPS], // values currently used in lightmap
    pub samples: Option<usize>, // offset into Model::lightdata, [numstyles*surfsize]
}

impl Default for MSurface {
    fn default() -> Self {
        Self {
            visframe: 0,
            plane: 0,
            flags: MSurfFlags::empty(),
            texturemins: [0; 2],
            extents: [0; 2],
            light_s: 0,
            light_t: 0,
            dlight_s: 0,
            dlight_t: 0,
            polys: None,
            texinfo: 0,
            dlightframe: 0,
            dlightbits: 0,
            dirty_lightmap: false,
            lightmaptexturenum: 0,
            styles: [255; MAXLIGHTMAPS],
            cached_light: [0.0; MAXLIGHTMAPS],
            samples: None,
        }
    }
}

impl MSurface {
    /// Lightmap block size in texels.
    pub fn lightmap_size(&self) -> (i32, i32) {
        (
            (self.extents[0] as i32 >> 4) + 1,
            (self.extents[1] as i32 >> 4) + 1,
        )
    }

    /// Number of light styles in use (styles are packed, 255 terminates).
    pub fn num_styles(&self) -> usize {
        self.styles.iter().take_while(|&&s| s != 255).count()
    }
}

/// Child link of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Node(usize),
    Leaf(usize),
}

#[derive(Debug, Clone)]
pub struct MNode {
    pub visframe: i32, // node needs to be traversed if current
    pub minmaxs: [f32; 6], // for bounding box culling
    pub parent: Option<usize>,

    pub plane: usize,
    pub children: [NodeRef; 2],

    pub firstsurface: usize,
    pub numsurfaces: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MLeaf {
    pub contents: i32,
    pub visframe: i32,
    pub minmaxs: [f32; 6],
    pub parent: Option<usize>,

    pub cluster: i32,
    pub area: i32,

    pub firstmarksurface: usize,
    pub nummarksurfaces: usize,
}

/// Inline brush model (doors, platforms, ...). Shares the world's nodes
/// and surfaces.
#[derive(Debug, Clone, Default)]
pub struct InlineModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,
    pub headnode: usize,
    pub firstmodelsurface: usize,
    pub nummodelsurfaces: usize,
}

/// Compressed visibility. `bitofs[cluster]` holds byte offsets into
/// `data` for the PVS and PHS rows.
#[derive(Debug, Clone, Default)]
pub struct VisData {
    pub numclusters: usize,
    pub bitofs: Vec<[usize; 2]>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,

    pub planes: Vec<CPlane>,
    pub nodes: Vec<MNode>,
    pub leafs: Vec<MLeaf>,
    pub marksurfaces: Vec<usize>,
    pub surfaces: Vec<MSurface>,
    pub texinfo: Vec<MTexInfo>,
    pub polys: Vec<GlPoly>,
    pub submodels: Vec<InlineModel>,

    pub vis: Option<VisData>,
    pub lightdata: Vec<u8>,
}

impl Model {
    pub fn has_lightdata(&self) -> bool {
        !self.lightdata.is_empty()
    }

    pub fn numclusters(&self) -> usize {
        self.vis.as_ref().map_or(0, |v| v.numclusters)
    }

    /// Mod_PointInLeaf
    pub fn point_in_leaf(&self, p: &Vec3) -> usize {
        let mut node = NodeRef::Node(0);
        loop {
            match node {
                NodeRef::Leaf(leaf) => return leaf,
                NodeRef::Node(n) => {
                    let mnode = &self.nodes[n];
                    let plane = &self.planes[mnode.plane];
                    let d = dot_product(p, &plane.normal) - plane.dist;
                    node = if d > 0.0 {
                        mnode.children[0]
                    } else {
                        mnode.children[1]
                    };
                }
            }
        }
    }

    /// Mod_ClusterPVS. Returns one bit per cluster; everything is visible
    /// for cluster -1 or when the map carries no visibility.
    pub fn cluster_pvs(&self, cluster: i32) -> Vec<u8> {
        let vis = match self.vis.as_ref() {
            Some(vis) if cluster >= 0 && (cluster as usize) < vis.numclusters => vis,
            _ => return vec![0xff; self.novis_row_len()],
        };
        let ofs = vis.bitofs[cluster as usize][DVIS_PVS];
        decompress_vis(&vis.data[ofs.min(vis.data.len())..], vis.numclusters)
    }

    fn novis_row_len(&self) -> usize {
        ((self.numclusters() + 7) >> 3).max(1)
    }

    /// R_TextureAnimation: image index for the given entity frame.
    pub fn texture_animation(&self, texinfo: usize, frame: i32) -> usize {
        let mut tex = &self.texinfo[texinfo];
        if tex.next.is_none() || tex.numframes <= 0 {
            return tex.image;
        }
        let mut c = frame.rem_euclid(tex.numframes);
        while c > 0 {
            match tex.next {
                Some(next) => tex = &self.texinfo[next],
                None => break,
            }
            c -= 1;
        }
        tex.image
    }

    /// CalcSurfaceExtents: texture-space bounds snapped to the 16 texel
    /// lightmap grid.
    pub fn calc_surface_extents(&mut self, surf: usize, verts: &[Vec3]) {
        let tex = &self.texinfo[self.surfaces[surf].texinfo];
        let mut mins = [999999.0f32; 2];
        let mut maxs = [-99999.0f32; 2];

        for v in verts {
            for j in 0..2 {
                let val = v[0] * tex.vecs[j][0]
                    + v[1] * tex.vecs[j][1]
                    + v[2] * tex.vecs[j][2]
                    + tex.vecs[j][3];
                mins[j] = mins[j].min(val);
                maxs[j] = maxs[j].max(val);
            }
        }

        let s = &mut self.surfaces[surf];
        for i in 0..2 {
            let bmin = (mins[i] / 16.0).floor() as i32;
            let bmax = (maxs[i] / 16.0).ceil() as i32;
            s.texturemins[i] = (bmin * 16) as i16;
            s.extents[i] = ((bmax - bmin) * 16) as i16;
        }
    }

    /// GL_BuildPolygonFromSurface: creates the surface polygon with base
    /// texture coordinates and lightmap coordinates. Must run after the
    /// surface has its lightmap placement.
    pub fn build_polygon_from_surface(
        &mut self,
        surf: usize,
        verts: &[Vec3],
        images: &[Image],
        block_width: i32,
        block_height: i32,
    ) -> usize {
        let s = &self.surfaces[surf];
        let tex = &self.texinfo[s.texinfo];
        let image = &images[tex.image];
        let (iw, ih) = (image.width.max(1) as f32, image.height.max(1) as f32);

        let mut poly = GlPoly {
            next: None,
            verts: Vec::with_capacity(verts.len()),
        };

        for vec in verts {
            let ds = dot_product(vec, &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]]) + tex.vecs[0][3];
            let dt = dot_product(vec, &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]]) + tex.vecs[1][3];

            // lightmap texture coordinates
            let mut ls = ds - s.texturemins[0] as f32;
            ls += (s.light_s * 16) as f32;
            ls += 8.0;
            ls /= (block_width * 16) as f32;

            let mut lt = dt - s.texturemins[1] as f32;
            lt += (s.light_t * 16) as f32;
            lt += 8.0;
            lt /= (block_height * 16) as f32;

            poly.verts.push([vec[0], vec[1], vec[2], ds / iw, dt / ih, ls, lt]);
        }

        let idx = self.polys.len();
        poly.next = self.surfaces[surf].polys;
        self.polys.push(poly);
        self.surfaces[surf].polys = Some(idx);
        idx
    }
}

/// Mod_DecompressVis: zero bytes are run-length encoded as (0, count).
pub fn decompress_vis(input: &[u8], numclusters: usize) -> Vec<u8> {
    let row = (numclusters + 7) >> 3;
    let mut out = Vec::with_capacity(row);
    let mut i = 0;

    while out.len() < row {
        let Some(&b) = input.get(i) else {
            // truncated data, the rest is invisible
            out.resize(row, 0);
            break;
        };
        if b != 0 {
            out.push(b);
            i += 1;
            continue;
        }

        let c = input.get(i + 1).copied().unwrap_or(0) as usize;
        i += 2;
        if c == 0 {
            out.resize(row, 0);
            break;
        }
        for _ in 0..c {
            if out.len() == row {
                break;
            }
            out.push(0);
        }
    }

    out
}

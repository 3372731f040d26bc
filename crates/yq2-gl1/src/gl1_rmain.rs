// gl1_rmain.rs — view setup, frustum culling and the per-frame driver

use yq2_common::common::{com_dprintf, com_printf};
use yq2_common::cvar::CvarContext;
use yq2_common::q_shared::{
    angle_vectors, box_on_plane_side, dot_product, rotate_point_around_vector, signbits_for_plane,
    RdFlags, RenderFx, Vec3, CONTENTS_SOLID, PLANE_ANYZ, PRINT_DEVELOPER,
};

use crate::gl1_local::{FrameStats, FrameView, Gl1Renderer, RefDef, RefError};
use crate::gl1_model_types::Model;
use crate::qgl::QGl;

pub fn vid_printf(level: i32, msg: &str) {
    if level == PRINT_DEVELOPER {
        com_dprintf(msg);
    } else {
        com_printf(msg);
    }
}

/// R_RotateForEntity
pub fn r_rotate_for_entity(gl: &mut dyn QGl, origin: &Vec3, angles: &Vec3) {
    gl.translate(origin);
    gl.rotate(angles[1], &[0.0, 0.0, 1.0]);
    gl.rotate(-angles[0], &[0.0, 1.0, 0.0]);
    gl.rotate(-angles[2], &[1.0, 0.0, 0.0]);
}

impl Gl1Renderer {
    /// RI_BeginRegistration: latched cvars take effect before the next map
    /// is loaded and its lightmaps built.
    pub fn r_begin_registration(&mut self, cvars: &mut CvarContext) {
        cvars.get_latched_vars();
        self.update_config(cvars);
    }

    /// R_CullBox: true if the box is completely outside the frustum.
    pub fn r_cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        if !self.config.cull {
            return false;
        }
        self.frustum
            .iter()
            .any(|plane| box_on_plane_side(mins, maxs, plane) == 2)
    }

    /// R_SetFrustum
    pub fn r_set_frustum(&mut self, fov_x: f32, fov_y: f32) {
        let normals = [
            // rotate VPN right by FOV_X/2 degrees
            rotate_point_around_vector(&self.vup, &self.vpn, -(90.0 - fov_x / 2.0)),
            // rotate VPN left by FOV_X/2 degrees
            rotate_point_around_vector(&self.vup, &self.vpn, 90.0 - fov_x / 2.0),
            // rotate VPN up by FOV_Y/2 degrees
            rotate_point_around_vector(&self.vright, &self.vpn, 90.0 - fov_y / 2.0),
            // rotate VPN down by FOV_Y/2 degrees
            rotate_point_around_vector(&self.vright, &self.vpn, -(90.0 - fov_y / 2.0)),
        ];

        for (plane, normal) in self.frustum.iter_mut().zip(normals) {
            plane.normal = normal;
            plane.plane_type = PLANE_ANYZ;
            plane.dist = dot_product(&self.r_origin, &normal);
            plane.signbits = signbits_for_plane(plane);
        }
    }

    /// R_SetupFrame: advances the frame and finds the view clusters.
    pub fn r_setup_frame(&mut self, world: &Model, fd: &RefDef<'_>) {
        self.r_framecount += 1;

        // build the transformation matrix for the given view angles
        self.r_origin = fd.vieworg;
        let (forward, right, up) = angle_vectors(&fd.viewangles);
        self.vpn = forward;
        self.vright = right;
        self.vup = up;

        // current viewcluster
        if !fd.rdflags.contains(RdFlags::NOWORLDMODEL) && !world.nodes.is_empty() {
            self.r_oldviewcluster = self.r_viewcluster;
            self.r_oldviewcluster2 = self.r_viewcluster2;

            let leaf = &world.leafs[world.point_in_leaf(&self.r_origin)];
            self.r_viewcluster = leaf.cluster;
            self.r_viewcluster2 = leaf.cluster;

            // check above and below so crossing solid water doesn't draw wrong
            let mut temp = self.r_origin;
            if leaf.contents == 0 {
                temp[2] -= 16.0; // look down a bit
            } else {
                temp[2] += 16.0; // look up a bit
            }
            let leaf2 = &world.leafs[world.point_in_leaf(&temp)];
            if leaf2.contents & CONTENTS_SOLID == 0 && leaf2.cluster != self.r_viewcluster2 {
                self.r_viewcluster2 = leaf2.cluster;
            }
        }

        self.stats = FrameStats::default();
    }

    /// R_RenderView for the world and brush entities: dynamic lights, view
    /// setup, PVS, the opaque world, brush entities and finally everything
    /// translucent, back to front.
    pub fn render_frame(
        &mut self,
        gl: &mut dyn QGl,
        world: &mut Model,
        fd: &RefDef<'_>,
    ) -> Result<(), RefError> {
        let worldmodel = !fd.rdflags.contains(RdFlags::NOWORLDMODEL);
        if worldmodel && world.nodes.is_empty() {
            return Err(RefError::NoWorldModel);
        }

        self.view = FrameView {
            time: fd.time,
            fov_y: fd.fov_y,
            width: fd.width,
            height: fd.height,
            rdflags: fd.rdflags,
            areabits: fd.areabits.map(|a| a.to_vec()),
        };
        self.lightstyles = fd.lightstyles.to_vec();
        self.dlights = fd.dlights.to_vec();

        self.r_push_dlights(world);

        self.r_setup_frame(world, fd);
        self.r_set_frustum(fd.fov_x, fd.fov_y);
        if worldmodel {
            self.r_mark_leaves(world);
        }

        let drawn = self.r_draw_world(gl, world, fd.entities);
        skip_non_lit(drawn)?;

        if self.config.drawentities {
            for ent in fd.entities {
                if ent.flags.contains(RenderFx::BEAM) || ent.model.is_none() {
                    continue;
                }
                let drawn = self.r_draw_brush_model(gl, world, ent);
                skip_non_lit(drawn)?;
            }
        }

        self.r_draw_alpha_surfaces(gl, world);

        log::trace!(
            "{} wpoly {} tex {} lmaps",
            self.stats.brush_polys,
            self.stats.visible_textures,
            self.stats.visible_lightmaps
        );
        Ok(())
    }
}

/// A non-lit surface reaching the light builder only loses that pass; the
/// rest of the frame is still drawn.
fn skip_non_lit(drawn: Result<(), RefError>) -> Result<(), RefError> {
    match drawn {
        Err(RefError::NonLitSurface { surface }) => {
            vid_printf(
                PRINT_DEVELOPER,
                &format!("R_RenderView: skipped non-lit surface {}\n", surface),
            );
            Ok(())
        }
        other => other,
    }
}

//! Fixed-function state templates shared by generic programs.
//!
//! A template is declared once in a state object description and attached by
//! [`SubobjectId`](super::SubobjectId) to every generic program that needs it.

/// How triangles are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

/// Which triangle faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// Rasterizer state for draw-capable nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RasterizerDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    /// Counter-clockwise triangles are front facing when set.
    pub front_counter_clockwise: bool,
}

impl RasterizerDesc {
    /// Solid fill, no culling, counter-clockwise front faces.
    pub fn solid_no_cull() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::None,
            front_counter_clockwise: true,
        }
    }

    pub(crate) fn primitive_state(&self) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: if self.front_counter_clockwise {
                wgpu::FrontFace::Ccw
            } else {
                wgpu::FrontFace::Cw
            },
            cull_mode: match self.cull_mode {
                CullMode::None => None,
                CullMode::Front => Some(wgpu::Face::Front),
                CullMode::Back => Some(wgpu::Face::Back),
            },
            unclipped_depth: false,
            polygon_mode: match self.fill_mode {
                FillMode::Solid => wgpu::PolygonMode::Fill,
                FillMode::Wireframe => wgpu::PolygonMode::Line,
            },
            conservative: false,
        }
    }
}

/// Depth test state for draw-capable nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
}

impl Default for DepthStencilDesc {
    /// Depth test and write enabled with a less-than comparison.
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            depth_compare: wgpu::CompareFunction::Less,
        }
    }
}

impl DepthStencilDesc {
    /// Returns whether a fragment at depth `incoming` survives against `stored`.
    pub fn passes(&self, incoming: f32, stored: f32) -> bool {
        if !self.depth_enable {
            return true;
        }
        use wgpu::CompareFunction::*;
        match self.depth_compare {
            Never => false,
            Less => incoming < stored,
            Equal => incoming == stored,
            LessEqual => incoming <= stored,
            Greater => incoming > stored,
            NotEqual => incoming != stored,
            GreaterEqual => incoming >= stored,
            Always => true,
        }
    }

    pub(crate) fn depth_stencil_state(&self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.depth_enable && self.depth_write,
            depth_compare: if self.depth_enable {
                self.depth_compare
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// Color target formats written by draw-capable nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetFormats {
    pub formats: Vec<wgpu::TextureFormat>,
}

impl RenderTargetFormats {
    /// A single color target.
    pub fn single(format: wgpu::TextureFormat) -> Self {
        Self {
            formats: vec![format],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_depth_keeps_nearer_fragments() {
        let depth = DepthStencilDesc::default();
        assert!(depth.passes(0.25, 1.0));
        assert!(depth.passes(0.25, 0.5));
        assert!(!depth.passes(0.5, 0.25));
        assert!(!depth.passes(0.5, 0.5));
    }

    #[test]
    fn disabled_depth_always_passes() {
        let depth = DepthStencilDesc {
            depth_enable: false,
            ..Default::default()
        };
        assert!(depth.passes(0.9, 0.1));
        let state = depth.depth_stencil_state(wgpu::TextureFormat::Depth32Float);
        assert!(!state.depth_write_enabled);
        assert_eq!(state.depth_compare, wgpu::CompareFunction::Always);
    }

    #[test]
    fn rasterizer_maps_to_primitive_state() {
        let state = RasterizerDesc::solid_no_cull().primitive_state();
        assert_eq!(state.front_face, wgpu::FrontFace::Ccw);
        assert_eq!(state.cull_mode, None);
        assert_eq!(state.polygon_mode, wgpu::PolygonMode::Fill);
    }
}

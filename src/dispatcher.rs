//! Per-frame graph dispatch.

use crate::binder::{SetProgramDesc, SetWorkGraphFlags};
use crate::error::Result;

/// Host input for one graph dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGraphDesc<'r> {
    pub entrypoint_index: u32,
    pub num_records: u32,
    /// Record payload; `None` for parameterless entrypoints.
    pub records: Option<&'r [u8]>,
    pub record_stride: u64,
}

impl DispatchGraphDesc<'static> {
    /// A single payload-free record launching `entrypoint_index`.
    pub fn seed(entrypoint_index: u32) -> Self {
        Self {
            entrypoint_index,
            num_records: 1,
            records: None,
            record_stride: 0,
        }
    }
}

/// The command recording surface a frame dispatch needs.
pub trait GraphCommands {
    type Buffer;
    type RootSignature;

    fn set_graphics_root_signature(&mut self, root_signature: &Self::RootSignature);
    fn set_program(&mut self, desc: &SetProgramDesc<Self::Buffer>) -> Result<()>;
    fn dispatch_graph(&mut self, desc: &DispatchGraphDesc<'_>) -> Result<()>;
}

/// Records one graph dispatch per frame from a prepared descriptor.
///
/// The descriptor starts out initializing the backing memory. Once a dispatch has
/// been recorded it switches to steady state for the rest of the session.
#[derive(Debug)]
pub struct FrameDispatcher<R, B> {
    root_signature: R,
    desc: SetProgramDesc<B>,
    frames: u64,
}

impl<R, B> FrameDispatcher<R, B> {
    pub fn new(root_signature: R, desc: SetProgramDesc<B>) -> Self {
        Self {
            root_signature,
            desc,
            frames: 0,
        }
    }

    /// Binds the root signature and program, then launches entrypoint 0 with one seed record.
    ///
    /// # Errors
    ///
    /// Whatever `commands` reports. The descriptor keeps its flag when recording fails.
    pub fn dispatch_frame<C>(&mut self, commands: &mut C) -> Result<()>
    where
        C: GraphCommands<Buffer = B, RootSignature = R>,
    {
        commands.set_graphics_root_signature(&self.root_signature);
        commands.set_program(&self.desc)?;
        commands.dispatch_graph(&DispatchGraphDesc::seed(0))?;

        if self.desc.is_initializing() {
            tracing::debug!("first dispatch recorded, backing memory is now steady state");
        }
        self.desc.flags = SetWorkGraphFlags::None;
        self.frames += 1;
        tracing::trace!(frame = self.frames, "graph dispatched");
        Ok(())
    }

    pub fn desc(&self) -> &SetProgramDesc<B> {
        &self.desc
    }

    /// Number of successfully recorded dispatches.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
